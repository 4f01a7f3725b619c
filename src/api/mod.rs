// ==========================================
// 数据值导入系统 - API 层
// ==========================================
// 职责: 对外业务接口（导入 / 后台任务 / 导出 / 元数据维护）
// ==========================================

pub mod data_value_set_api;
pub mod error;
pub mod metadata_api;

// 重导出核心类型
pub use data_value_set_api::{write_csv, DataValueSetApi, ImportTask};
pub use error::{ApiError, ApiResult};
pub use metadata_api::MetadataApi;
