// ==========================================
// 数据值导入系统 - 配置层
// ==========================================
// 职责: 导入选项 + 系统设置（多级覆写）
// 存储: config_kv 表
// ==========================================

pub mod import_options;
pub mod settings_manager;

// 重导出核心配置
pub use import_options::{EffectivePolicy, ImportOptions, DEFAULT_BATCH_SIZE};
pub use settings_manager::{config_keys, default_db_path, SettingsManager, SystemImportSettings, DB_PATH_ENV};
