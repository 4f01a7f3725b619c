// ==========================================
// 数据值导入系统 - 导入模块错误类型
// ==========================================
// 职责: 结构性失败（整次导入中止）与持久化失败
// 说明: 记录级问题不是错误，而是 ImportConflict
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 输入流错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件格式不支持: {0}（仅支持 .json/.csv）")]
    UnsupportedFormat(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    #[error("输入格式错误: {0}")]
    MalformedInput(String),

    // ===== 集合级引用错误 =====
    #[error("集合级{kind}无法解析: {identifier}")]
    UnresolvedReference { kind: String, identifier: String },

    // ===== 存储错误 =====
    #[error("元数据查询失败: {0}")]
    Repository(#[from] RepositoryError),

    #[error("数据值刷写失败: {0}")]
    Persistence(String),

    // ===== 通用错误 =====
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

// 实现 From<serde_json::Error>
impl From<serde_json::Error> for ImportError {
    fn from(err: serde_json::Error) -> Self {
        ImportError::MalformedInput(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
