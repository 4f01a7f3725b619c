// ==========================================
// 数据值导入系统 - 日志初始化
// ==========================================
// 职责: tracing-subscriber 安装（文本 / JSON 行 / 测试）
// 说明: 日志一律写 stderr，stdout 只输出导入汇总或导出文档
// ==========================================

use tracing_subscriber::{fmt, EnvFilter};

/// 未设置 RUST_LOG 时的过滤器
///
/// 导入流水线在 info 级别输出进度与汇总，仓储层保持 warn
pub const DEFAULT_FILTER: &str = "info,datavalue_import::repository=warn";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// 安装文本格式订阅器
///
/// # 示例
/// ```no_run
/// datavalue_import::logging::init();
/// tracing::info!(file = "values.csv", "开始导入");
/// ```
pub fn init() {
    fmt()
        .with_env_filter(env_filter())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// 安装 JSON 行订阅器（字段原样输出，便于日志采集按 task_id 过滤）
pub fn init_json() {
    fmt()
        .json()
        .with_current_span(true)
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

/// 测试用订阅器，重复调用无副作用
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
