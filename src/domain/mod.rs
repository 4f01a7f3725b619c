// ==========================================
// 数据值导入系统 - 领域模型层
// ==========================================
// 职责: 定义元数据实体、分类维度、数据值事实与导入汇总
// 红线: 不含数据访问逻辑，不含引擎逻辑
// ==========================================

pub mod category;
pub mod data_value;
pub mod merge;
pub mod metadata;
pub mod types;

// 重导出核心类型
pub use category::{Category, CategoryCombo, CategoryOption, CategoryOptionCombo, DEFAULT_NAME};
pub use data_value::{
    CompleteDataSetRegistration, DataExportParams, DataValue, DataValueKey, DataValueRecord,
    DataValueSetDocument, DataValueSetHeader, ImportConflict, ImportCount, ImportSummary,
};
pub use merge::Mergeable;
pub use metadata::{DataElement, DataSet, OrganisationUnit, Period};
pub use types::{
    DomainType, IdScheme, ImportStatus, ImportStrategy, MergeMode, PeriodType, ValueType,
};
