// ==========================================
// 数据值导入系统 - 引擎层
// ==========================================
// 职责: 导入流水线（解析 / 校验 / 批量写入 / 完成登记 / 汇总）
//       与分类组合引擎
// 红线: Engine 不拼 SQL，所有存储访问经由 collaborators 中的 trait
// ==========================================

pub mod batch_upserter;
pub mod category_combination;
pub mod category_service;
pub mod collaborators;
pub mod completion;
pub mod events;
pub mod lookup_cache;
pub mod metadata_resolver;
pub mod orchestrator;
pub mod record_validator;
pub mod summary;
pub mod value_validation;

// 重导出核心引擎
pub use batch_upserter::{BatchUpserter, UpsertAction};
pub use category_combination::{
    generate_uid, CategoryCombinationEngine, CombinationGenerator, ComboViolation, GeneratedCombination,
};
pub use category_service::CategoryService;
pub use collaborators::{
    CurrentUserProvider, DataValueStore, HierarchyOracle, MetadataLookup, PathHierarchyOracle,
    RegistrationStore, StaticUserProvider, WriteOp,
};
pub use completion::{CompletionHandler, CompletionOutcome, CompletionRequest};
pub use events::{InMemoryNotifier, NoOpNotifier, Notification, NotificationLevel, Notifier, TaskId};
pub use lookup_cache::LookupCache;
pub use metadata_resolver::MetadataResolver;
pub use orchestrator::ImportOrchestrator;
pub use record_validator::{RecordOutcome, RecordValidator, StagedValue, ValidationContext};
pub use summary::ImportAccumulator;
pub use value_validation::{DefaultValueValidator, ValueValidator};
