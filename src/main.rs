// ==========================================
// 数据值导入系统 - 命令行入口
// ==========================================
// 用法:
//   datavalue-import [--db <path>] [--dry-run] [--strategy <S>] [--user <name>] [--org-unit <uid>]... <file>
//   datavalue-import --export <ds> <period> <ou> [--db <path>]
// 文件按扩展名识别 (.json / .csv)，导入汇总以 JSON 输出到 stdout
// ==========================================

use anyhow::{anyhow, bail, Context};
use datavalue_import::api::DataValueSetApi;
use datavalue_import::config::{default_db_path, ImportOptions};
use datavalue_import::domain::{DataExportParams, ImportStrategy};
use datavalue_import::engine::StaticUserProvider;
use datavalue_import::{logging, APP_NAME, VERSION};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Default)]
struct CliArgs {
    db_path: Option<String>,
    dry_run: bool,
    json_logs: bool,
    strategy: Option<ImportStrategy>,
    user: Option<String>,
    org_units: Vec<String>,
    export: Option<DataExportParams>,
    file: Option<PathBuf>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<CliArgs> {
    let mut cli = CliArgs::default();
    while let Some(arg) = args.next() {
        let mut value = |name: &str| args.next().ok_or_else(|| anyhow!("{} 缺少参数值", name));
        match arg.as_str() {
            "--db" => cli.db_path = Some(value("--db")?),
            "--dry-run" => cli.dry_run = true,
            "--json-logs" => cli.json_logs = true,
            "--strategy" => {
                let raw = value("--strategy")?;
                let strategy = serde_json::from_value(serde_json::Value::String(raw.to_uppercase()))
                    .with_context(|| format!("无法识别的导入策略: {}", raw))?;
                cli.strategy = Some(strategy);
            }
            "--user" => cli.user = Some(value("--user")?),
            "--org-unit" => cli.org_units.push(value("--org-unit")?),
            "--export" => {
                cli.export = Some(DataExportParams {
                    data_sets: vec![value("--export")?],
                    periods: vec![value("--export")?],
                    org_units: vec![value("--export")?],
                })
            }
            other if other.starts_with("--") => bail!("未知参数: {}", other),
            _ => cli.file = Some(PathBuf::from(&arg)),
        }
    }
    Ok(cli)
}

fn main() -> anyhow::Result<()> {
    let cli = parse_args(std::env::args().skip(1))?;
    if cli.json_logs {
        logging::init_json();
    } else {
        logging::init();
    }
    tracing::info!(version = VERSION, "{}", APP_NAME);

    let db_path = cli.db_path.clone().unwrap_or_else(default_db_path);
    tracing::info!(db_path = %db_path, "使用数据库");

    let users = Arc::new(StaticUserProvider::new(
        cli.user.clone().unwrap_or_else(|| "admin".to_string()),
        cli.org_units.clone(),
    ));
    let api = DataValueSetApi::new(&db_path, users)?;

    if let Some(params) = cli.export.as_ref() {
        let document = api.export_data_value_set(params)?;
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    }

    let file = cli.file.ok_or_else(|| anyhow!("缺少输入文件 (.json / .csv)"))?;
    let mut options = if cli.dry_run {
        ImportOptions::dry_run()
    } else {
        ImportOptions::default()
    };
    if let Some(strategy) = cli.strategy {
        options = options.with_strategy(strategy);
    }

    let summary = api.import_file(&file, &options)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if !summary.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
