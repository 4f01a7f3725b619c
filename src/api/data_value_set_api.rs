// ==========================================
// 数据值导入系统 - 数据值集合 API
// ==========================================
// 职责: 封装导入（同步 / 后台任务）与导出
// 说明: 导入失败以 ERROR 汇总返回；只有打开输入失败才返回 ApiError
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::import_options::ImportOptions;
use crate::config::settings_manager::SettingsManager;
use crate::db::{init_schema, open_sqlite_connection};
use crate::domain::data_value::{
    DataExportParams, DataValueRecord, DataValueSetDocument, DataValueSetHeader, ImportSummary,
};
use crate::domain::metadata::Period;
use crate::domain::types::IdScheme;
use crate::engine::collaborators::{CurrentUserProvider, MetadataLookup};
use crate::engine::events::{InMemoryNotifier, Notification, Notifier, TaskId};
use crate::engine::orchestrator::ImportOrchestrator;
use crate::importer::{CsvDataValueSource, DataValueSource, ImportError, JsonDataValueSource, CSV_HEADER};
use crate::repository::{DataValueRepository, MetadataRepository, RegistrationRepository};
use futures::future::join_all;
use rusqlite::Connection;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

/// 后台导入任务句柄
pub struct ImportTask {
    pub id: TaskId,
    pub handle: JoinHandle<ImportSummary>,
}

// ==========================================
// DataValueSetApi - 数据值集合 API
// ==========================================
#[derive(Clone)]
pub struct DataValueSetApi {
    metadata: Arc<MetadataRepository>,
    values: Arc<DataValueRepository>,
    orchestrator: Arc<ImportOrchestrator>,
    notifier: InMemoryNotifier,
}

impl DataValueSetApi {
    /// 打开数据库文件（不存在的表会被创建）
    pub fn new(db_path: &str, users: Arc<dyn CurrentUserProvider>) -> ApiResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| ApiError::DatabaseConnectionError(format!("{}: {}", db_path, e)))?;
        init_schema(&conn).map_err(|e| ApiError::DatabaseError(e.to_string()))?;
        Ok(Self::from_connection(Arc::new(Mutex::new(conn)), users))
    }

    /// 使用共享连接创建
    pub fn from_connection(conn: Arc<Mutex<Connection>>, users: Arc<dyn CurrentUserProvider>) -> Self {
        let metadata = Arc::new(MetadataRepository::new(conn.clone()));
        let values = Arc::new(DataValueRepository::new(conn.clone()));
        let registrations = Arc::new(RegistrationRepository::new(conn.clone()));
        let settings = Arc::new(SettingsManager::from_connection(conn));
        let notifier = InMemoryNotifier::new();

        let orchestrator = ImportOrchestrator::new(metadata.clone(), values.clone(), registrations, settings, users)
            .with_notifier(Arc::new(notifier.clone()));

        Self {
            metadata,
            values,
            orchestrator: Arc::new(orchestrator),
            notifier,
        }
    }

    // ==========================================
    // 同步导入
    // ==========================================

    /// 从任意记录流导入
    pub fn import_source(&self, source: &mut dyn DataValueSource, options: &ImportOptions) -> ImportSummary {
        self.orchestrator.import(source, options, None)
    }

    /// 导入内存中的 dataValueSet 文档
    pub fn import_document(&self, document: DataValueSetDocument, options: &ImportOptions) -> ImportSummary {
        let mut source = JsonDataValueSource::from_document(document);
        self.import_source(&mut source, options)
    }

    /// 导入 CSV 文件（集合级上下文由调用方提供）
    pub fn import_csv(
        &self,
        path: &Path,
        header: DataValueSetHeader,
        options: &ImportOptions,
    ) -> ApiResult<ImportSummary> {
        let mut source = CsvDataValueSource::from_path(path)?.with_header(header);
        Ok(self.import_source(&mut source, options))
    }

    /// 按扩展名分派导入
    ///
    /// # 返回
    /// - `Ok(ImportSummary)`: 导入汇总（可能为 ERROR）
    /// - `Err(ApiError)`: 文件不存在 / 格式不支持 / JSON 文档格式错误
    pub fn import_file(&self, path: &Path, options: &ImportOptions) -> ApiResult<ImportSummary> {
        let mut source = open_source(path)?;
        Ok(self.import_source(source.as_mut(), options))
    }

    // ==========================================
    // 后台任务
    // ==========================================

    /// 在阻塞线程池中启动导入，进度写入内存通知器
    ///
    /// 必须在 tokio 运行时内调用
    #[instrument(skip(self, path, options), fields(path = %path.display()))]
    pub fn start_import_task(&self, path: PathBuf, options: ImportOptions) -> ImportTask {
        let id = TaskId::generate();
        let task_id = id.clone();
        let orchestrator = self.orchestrator.clone();
        let notifier = self.notifier.clone();

        let handle = tokio::task::spawn_blocking(move || match open_source(&path) {
            Ok(mut source) => orchestrator.import(source.as_mut(), &options, Some(&task_id)),
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "导入任务无法打开输入");
                let summary = ImportSummary::error(e.to_string(), Vec::new());
                notifier.complete(&task_id, &summary);
                summary
            }
        });

        info!(task_id = %id, "导入任务已启动");
        ImportTask { id, handle }
    }

    /// 并行导入多个文件，结果顺序与输入一致
    pub async fn import_files(&self, paths: Vec<PathBuf>, options: &ImportOptions) -> Vec<ApiResult<ImportSummary>> {
        let start = Instant::now();
        let tasks: Vec<ImportTask> = paths
            .into_iter()
            .map(|path| self.start_import_task(path, options.clone()))
            .collect();

        let results = join_all(tasks.into_iter().map(|task| task.handle)).await;
        info!(
            files = results.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "批量导入结束"
        );
        results
            .into_iter()
            .map(|r| r.map_err(|e| ApiError::TaskJoinError(e.to_string())))
            .collect()
    }

    /// 任务最终汇总（尚未结束或不存在时返回 TaskNotFound）
    pub fn task_summary(&self, task: &TaskId) -> ApiResult<ImportSummary> {
        self.notifier
            .summary(task)
            .ok_or_else(|| ApiError::TaskNotFound(task.to_string()))
    }

    pub fn task_notifications(&self, task: &TaskId) -> Vec<Notification> {
        self.notifier.notifications(task)
    }

    pub fn is_task_completed(&self, task: &TaskId) -> bool {
        self.notifier.is_completed(task)
    }

    // ==========================================
    // 导出
    // ==========================================

    /// 导出数据值集合（UID 标识，可原样重新导入）
    ///
    /// # 参数
    /// - `params`: 数据集 / 周期 / 组织机构（各至少一个有效项）
    #[instrument(skip(self))]
    pub fn export_data_value_set(&self, params: &DataExportParams) -> ApiResult<DataValueSetDocument> {
        params.validate().map_err(ApiError::InvalidInput)?;

        let data_sets = self.metadata.find_data_sets(IdScheme::Uid, &params.data_sets)?;
        let periods: Vec<String> = params
            .periods
            .iter()
            .filter_map(|p| Period::parse_iso(p))
            .map(|p| p.iso)
            .collect();
        let mut org_unit_ids = Vec::with_capacity(params.org_units.len());
        for uid in &params.org_units {
            if let Some(ou) = self.metadata.find_organisation_unit(IdScheme::Uid, uid)? {
                org_unit_ids.push(ou.id);
            }
        }

        // 去掉无法解析的标识后再校验一次
        let resolved = DataExportParams {
            data_sets: data_sets.iter().map(|ds| ds.uid.clone()).collect(),
            periods: periods.clone(),
            org_units: org_unit_ids.iter().map(|id| id.to_string()).collect(),
        };
        resolved.validate().map_err(ApiError::InvalidInput)?;

        let data_set_ids: Vec<i64> = data_sets.iter().map(|ds| ds.id).collect();
        let data_values = self.values.export(&data_set_ids, &periods, &org_unit_ids)?;
        info!(count = data_values.len(), "数据值导出完成");

        Ok(DataValueSetDocument {
            header: DataValueSetHeader::default(),
            data_values,
        })
    }

    /// 导出为 CSV（表头与导入一致）
    pub fn export_csv<W: Write>(&self, params: &DataExportParams, writer: W) -> ApiResult<usize> {
        let document = self.export_data_value_set(params)?;
        write_csv(&document.data_values, writer)?;
        Ok(document.data_values.len())
    }
}

/// 按扩展名打开记录流
fn open_source(path: &Path) -> Result<Box<dyn DataValueSource>, ImportError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "json" => Ok(Box::new(JsonDataValueSource::from_path(path)?)),
        "csv" => Ok(Box::new(CsvDataValueSource::from_path(path)?)),
        other => Err(ImportError::UnsupportedFormat(other.to_string())),
    }
}

/// 按 CSV_HEADER 列序写出记录
pub fn write_csv<W: Write>(records: &[DataValueRecord], writer: W) -> Result<(), ImportError> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(CSV_HEADER)?;
    for r in records {
        let followup = r.followup.map(|f| f.to_string());
        out.write_record([
            r.data_element.as_deref().unwrap_or(""),
            r.period.as_deref().unwrap_or(""),
            r.org_unit.as_deref().unwrap_or(""),
            r.category_option_combo.as_deref().unwrap_or(""),
            r.attribute_option_combo.as_deref().unwrap_or(""),
            r.value.as_deref().unwrap_or(""),
            r.stored_by.as_deref().unwrap_or(""),
            r.last_updated.as_deref().unwrap_or(""),
            r.comment.as_deref().unwrap_or(""),
            followup.as_deref().unwrap_or(""),
        ])?;
    }
    out.flush()?;
    Ok(())
}
