// ==========================================
// 数据值导入系统 - CSV 记录流
// ==========================================
// 职责: 逐行读取 CSV 数据值（首行为表头，按列位置映射）
// 列序: dataelement, period, orgunit, categoryoptioncombo, attributeoptioncombo,
//       value, storedby, lastupdated, comment, followup
// 约定: 空单元格视为未提供
// ==========================================

use crate::domain::data_value::{DataValueRecord, DataValueSetHeader};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::source::DataValueSource;
use csv::{ReaderBuilder, StringRecord};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// 导出 / 导入共用表头
pub const CSV_HEADER: [&str; 10] = [
    "dataelement",
    "period",
    "orgunit",
    "categoryoptioncombo",
    "attributeoptioncombo",
    "value",
    "storedby",
    "lastupdated",
    "comment",
    "followup",
];

pub struct CsvDataValueSource<R: Read> {
    reader: csv::Reader<R>,
    header: DataValueSetHeader,
    row: StringRecord,
    line: usize,
}

impl CsvDataValueSource<File> {
    /// 打开 CSV 文件
    pub fn from_path(path: &Path) -> ImportResult<Self> {
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }
        if let Some(ext) = path.extension() {
            if ext != "csv" {
                return Err(ImportError::UnsupportedFormat(ext.to_string_lossy().to_string()));
            }
        }
        let file = File::open(path)?;
        Ok(Self::from_reader(file))
    }
}

impl<R: Read> CsvDataValueSource<R> {
    pub fn from_reader(reader: R) -> Self {
        let reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许尾部列缺省
            .from_reader(reader);
        Self {
            reader,
            header: DataValueSetHeader::default(),
            row: StringRecord::new(),
            line: 1,
        }
    }

    /// 附加集合级上下文（CSV 本身不携带）
    pub fn with_header(mut self, header: DataValueSetHeader) -> Self {
        self.header = header;
        self
    }
}

fn cell(row: &StringRecord, idx: usize) -> Option<String> {
    row.get(idx)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// value / comment 列: 列存在即为 Some（空串为空值标记），缺列才是 None
fn marker_cell(row: &StringRecord, idx: usize) -> Option<String> {
    row.get(idx).map(|v| v.trim().to_string())
}

fn map_row(row: &StringRecord) -> DataValueRecord {
    DataValueRecord {
        data_element: cell(row, 0),
        period: cell(row, 1),
        org_unit: cell(row, 2),
        category_option_combo: cell(row, 3),
        attribute_option_combo: cell(row, 4),
        value: marker_cell(row, 5),
        stored_by: cell(row, 6),
        last_updated: cell(row, 7),
        comment: marker_cell(row, 8),
        followup: cell(row, 9).map(|v| v.eq_ignore_ascii_case("true")),
        ..Default::default()
    }
}

impl<R: Read + Send> DataValueSource for CsvDataValueSource<R> {
    fn header(&self) -> &DataValueSetHeader {
        &self.header
    }

    fn next_record(&mut self) -> ImportResult<Option<DataValueRecord>> {
        loop {
            let has_row = self
                .reader
                .read_record(&mut self.row)
                .map_err(|e| ImportError::CsvParseError(format!("第 {} 行: {}", self.line + 1, e)))?;
            if !has_row {
                return Ok(None);
            }
            self.line += 1;

            // 跳过完全空白的行
            if self.row.iter().all(|v| v.trim().is_empty()) {
                continue;
            }
            return Ok(Some(map_row(&self.row)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "dataelement,period,orgunit,categoryoptioncombo,attributeoptioncombo,value,storedby,lastupdated,comment,followup\n\
DE1,202301,OU1,COC_DEFAULT,,10,admin,2023-02-01,first,false\n\
,,,,,,,,,\n\
DE1,202302,OU1,,, ,,,,\n\
DE2,202301,OU1\n";

    #[test]
    fn test_positional_mapping() {
        let mut source = CsvDataValueSource::from_reader(SAMPLE.as_bytes());

        let first = source.next_record().unwrap().unwrap();
        assert_eq!(first.data_element.as_deref(), Some("DE1"));
        assert_eq!(first.category_option_combo.as_deref(), Some("COC_DEFAULT"));
        assert!(first.attribute_option_combo.is_none());
        assert_eq!(first.value.as_deref(), Some("10"));
        assert_eq!(first.comment.as_deref(), Some("first"));
        assert_eq!(first.followup, Some(false));

        // 空行跳过；空的 value / comment 列保留为空值标记
        let blank = source.next_record().unwrap().unwrap();
        assert_eq!(blank.period.as_deref(), Some("202302"));
        assert_eq!(blank.value.as_deref(), Some(""));
        assert_eq!(blank.comment.as_deref(), Some(""));
        assert!(!blank.is_value_and_comment_absent());
        assert!(blank.stored_by.is_none());

        // 短行缺少的列为 None
        let second = source.next_record().unwrap().unwrap();
        assert_eq!(second.data_element.as_deref(), Some("DE2"));
        assert!(second.value.is_none());
        assert!(second.comment.is_none());

        assert!(source.next_record().unwrap().is_none());
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let mut source = CsvDataValueSource::from_path(file.path()).unwrap();
        assert!(source.next_record().unwrap().is_some());
    }

    #[test]
    fn test_rejects_missing_and_wrong_extension() {
        let missing = CsvDataValueSource::from_path(Path::new("/nonexistent/values.csv"));
        assert!(matches!(missing, Err(ImportError::FileNotFound(_))));

        let wrong = tempfile::Builder::new().suffix(".xml").tempfile().unwrap();
        assert!(matches!(
            CsvDataValueSource::from_path(wrong.path()),
            Err(ImportError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_invalid_utf8_is_structural_error() {
        let bytes: &[u8] = b"h1,h2\n\xff\xfe,1\n";
        let mut source = CsvDataValueSource::from_reader(bytes);
        assert!(matches!(source.next_record(), Err(ImportError::CsvParseError(_))));
    }
}
