// ==========================================
// 数据值导入系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 聚合数据值批量导入 + 分类组合维护
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 导入流水线与分类组合
pub mod engine;

// 输入层 - 记录流适配
pub mod importer;

// 配置层 - 导入选项与系统设置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{IdScheme, ImportStatus, ImportStrategy, MergeMode, PeriodType, ValueType};

// 领域实体
pub use domain::{
    Category, CategoryCombo, CategoryOption, CategoryOptionCombo, DataElement, DataSet,
    DataValue, DataValueRecord, DataValueSetDocument, DataValueSetHeader, ImportConflict,
    ImportCount, ImportSummary, OrganisationUnit, Period,
};

// 引擎
pub use engine::{CategoryCombinationEngine, CategoryService, ImportOrchestrator};

// 配置
pub use config::{ImportOptions, SettingsManager};

// API
pub use api::{DataValueSetApi, MetadataApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "数据值导入系统";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
