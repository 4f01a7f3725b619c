// ==========================================
// 数据值导入系统 - 数据值仓储
// ==========================================
// 职责: 数据值按自然键读写 / 批量事务写入 / 导出查询
// 红线: 自然键唯一由 UNIQUE 约束保证，违反时整批回滚
// ==========================================

use crate::domain::data_value::{DataValue, DataValueKey, DataValueRecord};
use crate::engine::collaborators::{DataValueStore, WriteOp};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

/// 时间戳存储格式
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ==========================================
// DataValueRepository - 数据值仓储
// ==========================================
pub struct DataValueRepository {
    conn: Arc<Mutex<Connection>>,
}

impl DataValueRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 数据值总行数
    pub fn count(&self) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM data_value", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// 导出查询
    ///
    /// # 参数
    /// - `data_set_ids`: 数据集（取其包含的数据元）
    /// - `periods`: ISO 周期
    /// - `org_unit_ids`: 组织机构
    ///
    /// # 返回
    /// 以 UID 表示的外部记录，按自然键排序
    pub fn export(
        &self,
        data_set_ids: &[i64],
        periods: &[String],
        org_unit_ids: &[i64],
    ) -> RepositoryResult<Vec<DataValueRecord>> {
        if data_set_ids.is_empty() || periods.is_empty() || org_unit_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT de.uid, dv.period, ou.uid, coc.uid, aoc.uid,
                   dv.value, dv.comment, dv.stored_by, dv.created, dv.last_updated, dv.followup
            FROM data_value dv
            JOIN data_element de ON de.id = dv.data_element_id
            JOIN organisation_unit ou ON ou.id = dv.organisation_unit_id
            JOIN category_option_combo coc ON coc.id = dv.category_option_combo_id
            JOIN category_option_combo aoc ON aoc.id = dv.attribute_option_combo_id
            WHERE dv.data_element_id IN (
                    SELECT data_element_id FROM data_set_elements WHERE data_set_id IN ({})
                  )
              AND dv.period IN ({})
              AND dv.organisation_unit_id IN ({})
            ORDER BY de.uid, dv.period, ou.uid, coc.uid, aoc.uid
            "#,
            placeholders(data_set_ids.len()),
            placeholders(periods.len()),
            placeholders(org_unit_ids.len()),
        );

        let mut bindings: Vec<Value> = Vec::new();
        bindings.extend(data_set_ids.iter().map(|id| Value::Integer(*id)));
        bindings.extend(periods.iter().map(|p| Value::Text(p.clone())));
        bindings.extend(org_unit_ids.iter().map(|id| Value::Integer(*id)));

        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bindings), |row| {
            Ok(DataValueRecord {
                data_element: Some(row.get(0)?),
                period: Some(row.get(1)?),
                org_unit: Some(row.get(2)?),
                category_option_combo: Some(row.get(3)?),
                attribute_option_combo: Some(row.get(4)?),
                value: row.get(5)?,
                comment: row.get(6)?,
                stored_by: Some(row.get(7)?),
                created: Some(row.get(8)?),
                last_updated: Some(row.get(9)?),
                followup: Some(row.get(10)?),
                ..Default::default()
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

// ==========================================
// DataValueStore 实现
// ==========================================
impl DataValueStore for DataValueRepository {
    fn find(&self, key: &DataValueKey) -> RepositoryResult<Option<DataValue>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                r#"
                SELECT value, comment, stored_by, created, last_updated, followup
                FROM data_value
                WHERE data_element_id = ?1 AND period = ?2 AND organisation_unit_id = ?3
                  AND category_option_combo_id = ?4 AND attribute_option_combo_id = ?5
                "#,
                params![
                    key.data_element_id,
                    key.period,
                    key.org_unit_id,
                    key.category_option_combo_id,
                    key.attribute_option_combo_id,
                ],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, bool>(5)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(value, comment, stored_by, created, last_updated, followup)| {
            Ok(DataValue {
                key: key.clone(),
                value,
                comment,
                stored_by,
                created: parse_timestamp("created", &created)?,
                last_updated: parse_timestamp("last_updated", &last_updated)?,
                followup,
            })
        })
        .transpose()
    }

    fn exists(&self, key: &DataValueKey) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let found = conn
            .query_row(
                r#"
                SELECT 1 FROM data_value
                WHERE data_element_id = ?1 AND period = ?2 AND organisation_unit_id = ?3
                  AND category_option_combo_id = ?4 AND attribute_option_combo_id = ?5
                "#,
                params![
                    key.data_element_id,
                    key.period,
                    key.org_unit_id,
                    key.category_option_combo_id,
                    key.attribute_option_combo_id,
                ],
                |_row| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        Ok(found)
    }

    fn apply_batch(&self, ops: &[WriteOp]) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let mut count = 0;

        for op in ops {
            match op {
                WriteOp::Insert(dv) => {
                    tx.execute(
                        r#"
                        INSERT INTO data_value (
                            data_element_id, period, organisation_unit_id,
                            category_option_combo_id, attribute_option_combo_id,
                            value, comment, stored_by, created, last_updated, followup
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                        "#,
                        params![
                            dv.key.data_element_id,
                            dv.key.period,
                            dv.key.org_unit_id,
                            dv.key.category_option_combo_id,
                            dv.key.attribute_option_combo_id,
                            dv.value,
                            dv.comment,
                            dv.stored_by,
                            dv.created.format(TIMESTAMP_FORMAT).to_string(),
                            dv.last_updated.format(TIMESTAMP_FORMAT).to_string(),
                            dv.followup,
                        ],
                    )?;
                }
                WriteOp::Update(dv) => {
                    tx.execute(
                        r#"
                        UPDATE data_value SET
                            value = ?1, comment = ?2, stored_by = ?3, last_updated = ?4, followup = ?5
                        WHERE data_element_id = ?6 AND period = ?7 AND organisation_unit_id = ?8
                          AND category_option_combo_id = ?9 AND attribute_option_combo_id = ?10
                        "#,
                        params![
                            dv.value,
                            dv.comment,
                            dv.stored_by,
                            dv.last_updated.format(TIMESTAMP_FORMAT).to_string(),
                            dv.followup,
                            dv.key.data_element_id,
                            dv.key.period,
                            dv.key.org_unit_id,
                            dv.key.category_option_combo_id,
                            dv.key.attribute_option_combo_id,
                        ],
                    )?;
                }
                WriteOp::Delete(key) => {
                    tx.execute(
                        r#"
                        DELETE FROM data_value
                        WHERE data_element_id = ?1 AND period = ?2 AND organisation_unit_id = ?3
                          AND category_option_combo_id = ?4 AND attribute_option_combo_id = ?5
                        "#,
                        params![
                            key.data_element_id,
                            key.period,
                            key.org_unit_id,
                            key.category_option_combo_id,
                            key.attribute_option_combo_id,
                        ],
                    )?;
                }
            }
            count += 1;
        }

        tx.commit()?;
        Ok(count)
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn parse_timestamp(field: &str, raw: &str) -> RepositoryResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).map_err(|e| RepositoryError::FieldValueError {
        field: field.to_string(),
        message: format!("{} ({})", e, raw),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn setup() -> DataValueRepository {
        let conn = open_in_memory().expect("创建测试数据库失败");
        conn.execute_batch(
            r#"
            INSERT INTO category_combo (id, uid, name) VALUES (1, 'CC_DEFAULT', 'default');
            INSERT INTO category_option_combo (id, uid, name, category_combo_id) VALUES (1, 'COC_DEFAULT', 'default', 1);
            INSERT INTO organisation_unit (id, uid, name, path) VALUES (1, 'OU1', 'OU1', '/OU1');
            INSERT INTO data_element (id, uid, name, value_type, category_combo_id) VALUES (1, 'DE1', 'DE1', 'INTEGER', 1);
            INSERT INTO data_set (id, uid, name, period_type, category_combo_id) VALUES (1, 'DS1', 'DS1', 'MONTHLY', 1);
            INSERT INTO data_set_elements (data_set_id, data_element_id) VALUES (1, 1);
            "#,
        )
        .expect("初始化测试数据失败");
        DataValueRepository::new(Arc::new(Mutex::new(conn)))
    }

    fn create_test_value(value: &str) -> DataValue {
        let now = NaiveDateTime::parse_from_str("2023-02-01 08:00:00", TIMESTAMP_FORMAT).unwrap();
        DataValue {
            key: DataValueKey {
                data_element_id: 1,
                period: "202301".to_string(),
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
        }
    }

    #[test]
    fn test_insert_update_delete_batch() {
        let repo = setup();
        let dv = create_test_value("10");

        repo.apply_batch(&[WriteOp::Insert(dv.clone())]).unwrap();
        assert!(repo.exists(&dv.key).unwrap());

        let mut updated = dv.clone();
        updated.value = Some("20".to_string());
        repo.apply_batch(&[WriteOp::Update(updated)]).unwrap();
        assert_eq!(repo.find(&dv.key).unwrap().unwrap().value.as_deref(), Some("20"));

        repo.apply_batch(&[WriteOp::Delete(dv.key.clone())]).unwrap();
        assert!(!repo.exists(&dv.key).unwrap());
    }

    #[test]
    fn test_duplicate_insert_rolls_back_whole_batch() {
        let repo = setup();
        let dv = create_test_value("10");
        repo.apply_batch(&[WriteOp::Insert(dv.clone())]).unwrap();

        let mut other = create_test_value("5");
        other.key.period = "202302".to_string();
        let err = repo
            .apply_batch(&[WriteOp::Insert(other.clone()), WriteOp::Insert(dv)])
            .unwrap_err();
        assert!(matches!(err, RepositoryError::UniqueConstraintViolation(_)));
        assert!(!repo.exists(&other.key).unwrap());
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn test_export_uses_uids() {
        let repo = setup();
        repo.apply_batch(&[WriteOp::Insert(create_test_value("10"))]).unwrap();

        let records = repo.export(&[1], &["202301".to_string()], &[1]).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].data_element.as_deref(), Some("DE1"));
        assert_eq!(records[0].org_unit.as_deref(), Some("OU1"));
        assert_eq!(records[0].category_option_combo.as_deref(), Some("COC_DEFAULT"));
        assert_eq!(records[0].value.as_deref(), Some("10"));

        assert!(repo.export(&[1], &["202302".to_string()], &[1]).unwrap().is_empty());
    }
}
