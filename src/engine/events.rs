// ==========================================
// 数据值导入系统 - 引擎层进度通知
// ==========================================
// 职责: 定义导入进度通知 trait，实现依赖倒置
// 说明: Engine 层定义 trait，API 层注入实现；按不透明任务 ID 上报
// 红线: 通知与事务边界解耦，通知失败不影响导入
// ==========================================

use crate::domain::data_value::ImportSummary;
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

// ==========================================
// 任务标识
// ==========================================

/// 不透明任务 ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 通知级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationLevel {
    Info,
    Warn,
    Error,
}

impl NotificationLevel {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationLevel::Info => "INFO",
            NotificationLevel::Warn => "WARN",
            NotificationLevel::Error => "ERROR",
        }
    }
}

/// 一条进度消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub completed: bool,
    pub time: NaiveDateTime,
}

// ==========================================
// 通知 Trait
// ==========================================

/// 导入进度通知者
///
/// # 实现说明
/// - `NoOpNotifier`: 不需要进度的场景（命令行、单元测试）
/// - `InMemoryNotifier`: 后台任务，按任务 ID 保存消息与最终汇总
pub trait Notifier: Send + Sync {
    /// 上报一条进度消息
    fn notify(&self, task: &TaskId, level: NotificationLevel, message: &str);

    /// 上报最终汇总（任务结束）
    fn complete(&self, task: &TaskId, summary: &ImportSummary);
}

/// 空操作通知者
#[derive(Debug, Clone, Default)]
pub struct NoOpNotifier;

impl Notifier for NoOpNotifier {
    fn notify(&self, task: &TaskId, level: NotificationLevel, message: &str) {
        tracing::debug!(
            task_id = %task,
            level = level.as_str(),
            "NoOpNotifier: 跳过进度通知 - {}",
            message
        );
    }

    fn complete(&self, task: &TaskId, summary: &ImportSummary) {
        tracing::debug!(task_id = %task, status = %summary.status, "NoOpNotifier: 跳过汇总通知");
    }
}

// ==========================================
// InMemoryNotifier
// ==========================================

#[derive(Debug, Default)]
struct TaskLog {
    notifications: Vec<Notification>,
    summary: Option<ImportSummary>,
}

/// 内存通知者（进程内查询任务进度）
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    tasks: Arc<Mutex<HashMap<TaskId, TaskLog>>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// 任务的全部消息（按上报顺序）
    pub fn notifications(&self, task: &TaskId) -> Vec<Notification> {
        match self.tasks.lock() {
            Ok(tasks) => tasks
                .get(task)
                .map(|log| log.notifications.clone())
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    /// 任务最终汇总（未结束时为 None）
    pub fn summary(&self, task: &TaskId) -> Option<ImportSummary> {
        self.tasks
            .lock()
            .ok()
            .and_then(|tasks| tasks.get(task).and_then(|log| log.summary.clone()))
    }

    pub fn is_completed(&self, task: &TaskId) -> bool {
        self.summary(task).is_some()
    }

    fn push(&self, task: &TaskId, level: NotificationLevel, message: &str, completed: bool) {
        match self.tasks.lock() {
            Ok(mut tasks) => {
                tasks.entry(task.clone()).or_default().notifications.push(Notification {
                    level,
                    message: message.to_string(),
                    completed,
                    time: Utc::now().naive_utc(),
                });
            }
            Err(_) => tracing::warn!(task_id = %task, "通知锁已中毒，丢弃进度消息"),
        }
    }
}

impl Notifier for InMemoryNotifier {
    fn notify(&self, task: &TaskId, level: NotificationLevel, message: &str) {
        self.push(task, level, message, false);
    }

    fn complete(&self, task: &TaskId, summary: &ImportSummary) {
        let level = if summary.is_success() {
            NotificationLevel::Info
        } else {
            NotificationLevel::Error
        };
        self.push(task, level, &summary.description, true);
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.entry(task.clone()).or_default().summary = Some(summary.clone());
        }
    }
}
