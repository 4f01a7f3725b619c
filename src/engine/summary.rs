// ==========================================
// 数据值导入系统 - 导入汇总累加器
// ==========================================
// 职责: 以值的方式在记录流上折叠 扫描数 / 静默跳过数 / 冲突列表，
//       结束时与写入计数合并为 ImportSummary
// 公式: ignored = scanned - imported - updated - deleted - skipped
// ==========================================

use crate::domain::data_value::{ImportConflict, ImportCount, ImportSummary};
use crate::domain::types::ImportStatus;
use crate::engine::record_validator::RecordOutcome;
use chrono::NaiveDate;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportAccumulator {
    scanned: usize,
    skipped: usize,
    conflicts: Vec<ImportConflict>,
}

impl ImportAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 折叠一条记录的校验结果
    pub fn fold(mut self, outcome: &RecordOutcome) -> Self {
        self.scanned += 1;
        match outcome {
            RecordOutcome::Skipped => self.skipped += 1,
            RecordOutcome::Conflict(conflict) => self.conflicts.push(conflict.clone()),
            RecordOutcome::Staged(_) => {}
        }
        self
    }

    /// 非记录级冲突（如完成登记）
    pub fn with_conflict(mut self, conflict: ImportConflict) -> Self {
        self.conflicts.push(conflict);
        self
    }

    pub fn scanned(&self) -> usize {
        self.scanned
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn conflicts(&self) -> &[ImportConflict] {
        &self.conflicts
    }

    /// 成功汇总
    pub fn finish(self, counts: ImportCount, completion_applied: Option<NaiveDate>) -> ImportSummary {
        let counts = self.finalize_counts(counts);
        ImportSummary {
            status: ImportStatus::Success,
            description: format!(
                "导入完成: 扫描 {} 条，新增 {}，更新 {}，删除 {}，忽略 {}",
                self.scanned, counts.imported, counts.updated, counts.deleted, counts.ignored
            ),
            import_count: counts,
            scanned: self.scanned,
            conflicts: self.conflicts,
            completion_applied,
        }
    }

    /// 失败汇总: 保留已提交计数与已收集冲突
    pub fn fail(self, description: impl Into<String>, committed: ImportCount) -> ImportSummary {
        let counts = self.finalize_counts(committed);
        ImportSummary {
            status: ImportStatus::Error,
            description: description.into(),
            import_count: counts,
            scanned: self.scanned,
            conflicts: self.conflicts,
            completion_applied: None,
        }
    }

    fn finalize_counts(&self, counts: ImportCount) -> ImportCount {
        let written = counts.imported + counts.updated + counts.deleted;
        ImportCount {
            ignored: self.scanned.saturating_sub(written + self.skipped),
            ..counts
        }
    }
}
