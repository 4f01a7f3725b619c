// ==========================================
// 数据值导入系统 - 记录流接口
// ==========================================
// 职责: 拉取式数据值记录流 + 集合级上下文
// 红线: 编排器逐条拉取，不要求整体缓冲
// ==========================================

use crate::domain::data_value::{DataValueRecord, DataValueSetHeader};
use crate::importer::error::ImportResult;

// ==========================================
// DataValueSource Trait
// ==========================================
// 实现者: VecDataValueSource / CsvDataValueSource / JsonDataValueSource
pub trait DataValueSource: Send {
    /// 集合级上下文（记录未覆盖时生效）
    fn header(&self) -> &DataValueSetHeader;

    /// 拉取下一条记录
    ///
    /// # 返回
    /// - `Ok(Some(record))`: 下一条
    /// - `Ok(None)`: 流结束
    /// - `Err(...)`: 输入不可读或格式错误（结构性失败）
    fn next_record(&mut self) -> ImportResult<Option<DataValueRecord>>;
}

/// 内存记录流
pub struct VecDataValueSource {
    header: DataValueSetHeader,
    records: std::vec::IntoIter<DataValueRecord>,
}

impl VecDataValueSource {
    pub fn new(header: DataValueSetHeader, records: Vec<DataValueRecord>) -> Self {
        Self {
            header,
            records: records.into_iter(),
        }
    }

    pub fn from_records(records: Vec<DataValueRecord>) -> Self {
        Self::new(DataValueSetHeader::default(), records)
    }
}

impl DataValueSource for VecDataValueSource {
    fn header(&self) -> &DataValueSetHeader {
        &self.header
    }

    fn next_record(&mut self) -> ImportResult<Option<DataValueRecord>> {
        Ok(self.records.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_source_drains_in_order() {
        let records = vec![
            DataValueRecord {
                value: Some("1".to_string()),
                ..Default::default()
            },
            DataValueRecord {
                value: Some("2".to_string()),
                ..Default::default()
            },
        ];
        let mut source = VecDataValueSource::from_records(records);
        assert_eq!(source.next_record().unwrap().unwrap().value.as_deref(), Some("1"));
        assert_eq!(source.next_record().unwrap().unwrap().value.as_deref(), Some("2"));
        assert!(source.next_record().unwrap().is_none());
        assert!(source.header().data_set.is_none());
    }
}
