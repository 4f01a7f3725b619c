// ==========================================
// 数据值导入系统 - 批量写入器
// ==========================================
// 职责: 按自然键探测存在性，按导入策略分类为 新增 / 更新 / 删除 / 忽略，
//       缓冲写操作并按阈值刷写（一次刷写 = 一个事务）
// 红线: 试运行不发出任何写操作；计数在刷写成功后才计入已提交
//       存在性覆盖表只保留当前刷写窗口（试运行同样按窗口清空）
// ==========================================

use crate::domain::data_value::{DataValueKey, ImportCount};
use crate::domain::types::ImportStrategy;
use crate::engine::collaborators::{DataValueStore, WriteOp};
use crate::engine::record_validator::StagedValue;
use crate::repository::error::RepositoryResult;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// 单条记录的落库分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    Inserted,
    Updated,
    Deleted,
    Ignored,
}

// ==========================================
// BatchUpserter
// ==========================================
pub struct BatchUpserter {
    store: Arc<dyn DataValueStore>,
    strategy: ImportStrategy,
    dry_run: bool,
    skip_existing_check: bool,
    batch_size: usize,

    buffer: Vec<WriteOp>,
    /// 当前窗口内已分类的写操作数（试运行时 buffer 为空）
    window_ops: usize,
    /// 当前窗口内尚未落库的存在性
    pending_exists: HashMap<DataValueKey, bool>,
    pending: ImportCount,
    committed: ImportCount,
    flushes: usize,
}

impl BatchUpserter {
    pub fn new(
        store: Arc<dyn DataValueStore>,
        strategy: ImportStrategy,
        dry_run: bool,
        skip_existing_check: bool,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            strategy,
            dry_run,
            skip_existing_check,
            batch_size: batch_size.max(1),
            buffer: Vec::new(),
            window_ops: 0,
            pending_exists: HashMap::new(),
            pending: ImportCount::default(),
            committed: ImportCount::default(),
            flushes: 0,
        }
    }

    /// 分类并缓冲一条通过校验的数据值，达到阈值时自动刷写
    pub fn stage(&mut self, staged: StagedValue) -> RepositoryResult<UpsertAction> {
        let key = staged.value.key.clone();
        let exists = self.probe_exists(&key)?;

        let (action, op) = if self.strategy.is_delete() {
            if exists {
                (UpsertAction::Deleted, Some(WriteOp::Delete(key.clone())))
            } else {
                (UpsertAction::Ignored, None)
            }
        } else if exists && self.strategy.allows_update() {
            if staged.is_delete {
                (UpsertAction::Deleted, Some(WriteOp::Delete(key.clone())))
            } else {
                (UpsertAction::Updated, Some(WriteOp::Update(staged.value)))
            }
        } else if !exists && self.strategy.allows_create() && !staged.is_delete {
            (UpsertAction::Inserted, Some(WriteOp::Insert(staged.value)))
        } else {
            (UpsertAction::Ignored, None)
        };

        match action {
            UpsertAction::Inserted => self.pending.imported += 1,
            UpsertAction::Updated => self.pending.updated += 1,
            UpsertAction::Deleted => self.pending.deleted += 1,
            UpsertAction::Ignored => {}
        }

        if let Some(op) = op {
            let now_exists = !matches!(op, WriteOp::Delete(_));
            self.pending_exists.insert(key, now_exists);
            self.window_ops += 1;
            if !self.dry_run {
                self.buffer.push(op);
            }
        }

        if self.window_ops >= self.batch_size {
            self.flush()?;
        }
        Ok(action)
    }

    /// 强制应用全部缓冲写操作
    ///
    /// 失败时本批计数不计入，已成功刷写的批次保持提交
    pub fn flush(&mut self) -> RepositoryResult<()> {
        if !self.buffer.is_empty() {
            let ops = std::mem::take(&mut self.buffer);
            let applied = self.store.apply_batch(&ops)?;
            self.flushes += 1;
            debug!(applied, flush_no = self.flushes, "数据值批量刷写完成");
        }

        self.pending_exists.clear();
        self.window_ops = 0;
        self.committed.imported += self.pending.imported;
        self.committed.updated += self.pending.updated;
        self.committed.deleted += self.pending.deleted;
        self.pending = ImportCount::default();
        Ok(())
    }

    /// 终止刷写并返回已提交计数（ignored 由汇总器计算）
    pub fn finish(mut self) -> RepositoryResult<ImportCount> {
        self.flush()?;
        Ok(self.committed)
    }

    /// 已提交计数
    pub fn committed(&self) -> ImportCount {
        self.committed
    }

    pub fn flush_count(&self) -> usize {
        self.flushes
    }

    fn probe_exists(&self, key: &DataValueKey) -> RepositoryResult<bool> {
        if let Some(exists) = self.pending_exists.get(key) {
            return Ok(*exists);
        }
        if self.skip_existing_check {
            return Ok(false);
        }
        self.store.exists(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::data_value::DataValue;
    use crate::repository::error::RepositoryError;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    /// 内存存储，可注入刷写失败
    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<HashMap<DataValueKey, DataValue>>,
        batches: Mutex<usize>,
        fail: bool,
    }

    impl DataValueStore for MemoryStore {
        fn find(&self, key: &DataValueKey) -> RepositoryResult<Option<DataValue>> {
            Ok(self.rows.lock().unwrap().get(key).cloned())
        }

        fn apply_batch(&self, ops: &[WriteOp]) -> RepositoryResult<usize> {
            if self.fail {
                return Err(RepositoryError::UniqueConstraintViolation("data_value".to_string()));
            }
            let mut rows = self.rows.lock().unwrap();
            for op in ops {
                match op {
                    WriteOp::Insert(dv) | WriteOp::Update(dv) => {
                        rows.insert(dv.key.clone(), dv.clone());
                    }
                    WriteOp::Delete(key) => {
                        rows.remove(key);
                    }
                }
            }
            *self.batches.lock().unwrap() += 1;
            Ok(ops.len())
        }
    }

    fn create_test_staged(period: &str, value: &str) -> StagedValue {
        let now = NaiveDate::from_ymd_opt(2023, 2, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let value = DataValue {
            key: DataValueKey {
                data_element_id: 1,
                period: period.to_string(),
                org_unit_id: 1,
                category_option_combo_id: 1,
                attribute_option_combo_id: 1,
            },
            value: Some(value.to_string()),
            comment: None,
            stored_by: "admin".to_string(),
            created: now,
            last_updated: now,
            followup: false,
        };
        let is_delete = value.is_null_value();
        StagedValue { value, is_delete }
    }

    #[test]
    fn test_create_then_update() {
        let store = Arc::new(MemoryStore::default());
        let mut upserter = BatchUpserter::new(store.clone(), ImportStrategy::CreateAndUpdate, false, false, 10);
        assert_eq!(upserter.stage(create_test_staged("202301", "10")).unwrap(), UpsertAction::Inserted);
        // 同一缓冲内重复键按更新处理
        assert_eq!(upserter.stage(create_test_staged("202301", "20")).unwrap(), UpsertAction::Updated);
        let counts = upserter.finish().unwrap();
        assert_eq!((counts.imported, counts.updated), (1, 1));
        assert_eq!(store.rows.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_strategy_restrictions() {
        let store = Arc::new(MemoryStore::default());
        let mut upserter = BatchUpserter::new(store.clone(), ImportStrategy::Update, false, false, 10);
        assert_eq!(upserter.stage(create_test_staged("202301", "10")).unwrap(), UpsertAction::Ignored);
        upserter.finish().unwrap();
        assert!(store.rows.lock().unwrap().is_empty());

        let mut upserter = BatchUpserter::new(store.clone(), ImportStrategy::Create, false, false, 10);
        upserter.stage(create_test_staged("202301", "10")).unwrap();
        upserter.flush().unwrap();
        assert_eq!(upserter.stage(create_test_staged("202301", "30")).unwrap(), UpsertAction::Ignored);
    }

    #[test]
    fn test_null_marker_deletes_existing_only() {
        let store = Arc::new(MemoryStore::default());
        let mut upserter = BatchUpserter::new(store.clone(), ImportStrategy::CreateAndUpdate, false, false, 10);
        assert_eq!(upserter.stage(create_test_staged("202302", "")).unwrap(), UpsertAction::Ignored);
        upserter.stage(create_test_staged("202301", "10")).unwrap();
        upserter.flush().unwrap();
        assert_eq!(upserter.stage(create_test_staged("202301", " ")).unwrap(), UpsertAction::Deleted);
        let counts = upserter.finish().unwrap();
        assert_eq!(counts.deleted, 1);
        assert!(store.rows.lock().unwrap().is_empty());
    }

    #[test]
    fn test_delete_strategy() {
        let store = Arc::new(MemoryStore::default());
        let mut upserter = BatchUpserter::new(store.clone(), ImportStrategy::CreateAndUpdate, false, false, 10);
        upserter.stage(create_test_staged("202301", "10")).unwrap();
        upserter.finish().unwrap();

        let mut upserter = BatchUpserter::new(store.clone(), ImportStrategy::Delete, false, false, 10);
        assert_eq!(upserter.stage(create_test_staged("202301", "10")).unwrap(), UpsertAction::Deleted);
        assert_eq!(upserter.stage(create_test_staged("202309", "10")).unwrap(), UpsertAction::Ignored);
        upserter.finish().unwrap();
        assert!(store.rows.lock().unwrap().is_empty());
    }

    #[test]
    fn test_dry_run_counts_without_writes() {
        let store = Arc::new(MemoryStore::default());
        let mut upserter = BatchUpserter::new(store.clone(), ImportStrategy::CreateAndUpdate, true, false, 10);
        upserter.stage(create_test_staged("202301", "10")).unwrap();
        assert_eq!(upserter.stage(create_test_staged("202301", "11")).unwrap(), UpsertAction::Updated);
        let counts = upserter.finish().unwrap();
        assert_eq!((counts.imported, counts.updated), (1, 1));
        assert!(store.rows.lock().unwrap().is_empty());
        assert_eq!(*store.batches.lock().unwrap(), 0);
    }

    #[test]
    fn test_dry_run_state_bounded_by_batch_size() {
        let store = Arc::new(MemoryStore::default());
        let mut upserter = BatchUpserter::new(store.clone(), ImportStrategy::CreateAndUpdate, true, false, 10);
        for i in 0..5_000 {
            upserter.stage(create_test_staged(&format!("P{}", i), "1")).unwrap();
            assert!(upserter.pending_exists.len() < 10);
        }
        assert_eq!(upserter.committed().imported, 5_000);
        assert_eq!(upserter.flush_count(), 0);
        assert!(store.rows.lock().unwrap().is_empty());
    }

    #[test]
    fn test_batch_size_triggers_flush() {
        let store = Arc::new(MemoryStore::default());
        let mut upserter = BatchUpserter::new(store.clone(), ImportStrategy::CreateAndUpdate, false, false, 2);
        for period in ["202301", "202302", "202303"] {
            upserter.stage(create_test_staged(period, "1")).unwrap();
        }
        assert_eq!(upserter.flush_count(), 1);
        assert_eq!(upserter.committed().imported, 2);
        upserter.finish().unwrap();
        assert_eq!(*store.batches.lock().unwrap(), 2);
    }

    #[test]
    fn test_flush_failure_keeps_pending_uncommitted() {
        let store = Arc::new(MemoryStore {
            fail: true,
            ..Default::default()
        });
        let mut upserter = BatchUpserter::new(store, ImportStrategy::CreateAndUpdate, false, false, 10);
        upserter.stage(create_test_staged("202301", "1")).unwrap();
        assert!(upserter.flush().is_err());
        assert_eq!(upserter.committed(), ImportCount::default());
    }
}
