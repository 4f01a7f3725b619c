// ==========================================
// 数据值导入系统 - 输入适配层
// ==========================================
// 职责: 把外部输入转换为拉取式数据值记录流
// 支持: JSON (dataValueSet 文档), CSV (逐行)
// ==========================================

pub mod csv_source;
pub mod error;
pub mod json_source;
pub mod source;

// 重导出核心类型
pub use csv_source::{CsvDataValueSource, CSV_HEADER};
pub use error::{ImportError, ImportResult};
pub use json_source::JsonDataValueSource;
pub use source::{DataValueSource, VecDataValueSource};
