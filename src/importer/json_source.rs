// ==========================================
// 数据值导入系统 - JSON 记录流
// ==========================================
// 职责: 读取一个 dataValueSet 文档（集合级字段 + dataValues 数组）
// ==========================================

use crate::domain::data_value::{DataValueRecord, DataValueSetDocument, DataValueSetHeader};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::source::DataValueSource;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

pub struct JsonDataValueSource {
    header: DataValueSetHeader,
    records: std::vec::IntoIter<DataValueRecord>,
}

impl JsonDataValueSource {
    /// 解析文档，格式错误即结构性失败
    pub fn from_reader<R: Read>(reader: R) -> ImportResult<Self> {
        let document: DataValueSetDocument = serde_json::from_reader(reader)?;
        Ok(Self::from_document(document))
    }

    pub fn from_path(path: &Path) -> ImportResult<Self> {
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }
        if let Some(ext) = path.extension() {
            if ext != "json" {
                return Err(ImportError::UnsupportedFormat(ext.to_string_lossy().to_string()));
            }
        }
        Self::from_reader(BufReader::new(File::open(path)?))
    }

    pub fn from_document(document: DataValueSetDocument) -> Self {
        Self {
            header: document.header,
            records: document.data_values.into_iter(),
        }
    }
}

impl DataValueSource for JsonDataValueSource {
    fn header(&self) -> &DataValueSetHeader {
        &self.header
    }

    fn next_record(&mut self) -> ImportResult<Option<DataValueRecord>> {
        Ok(self.records.next())
    }
}
