// ==========================================
// 数据值导入系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod category_repo;
pub mod data_value_repo;
pub mod error;
pub mod metadata_repo;
pub mod registration_repo;

// 重导出核心仓储
pub use category_repo::CategoryRepository;
pub use data_value_repo::DataValueRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use metadata_repo::MetadataRepository;
pub use registration_repo::RegistrationRepository;
