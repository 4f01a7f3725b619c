// ==========================================
// 数据值导入系统 - 完成登记仓储
// ==========================================
// 职责: CompleteDataSetRegistration 按自然键查找 / 插入 / 原地更新
// 红线: (数据集, 周期, 组织机构, 属性选项组合) 唯一
// ==========================================

use crate::domain::data_value::CompleteDataSetRegistration;
use crate::engine::collaborators::RegistrationStore;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct RegistrationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl RegistrationRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 登记总行数
    pub fn count(&self) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let n: i64 =
            conn.query_row("SELECT COUNT(*) FROM complete_registration", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

impl RegistrationStore for RegistrationRepository {
    fn find_registration(
        &self,
        data_set_id: i64,
        period: &str,
        org_unit_id: i64,
        attribute_option_combo_id: i64,
    ) -> RepositoryResult<Option<CompleteDataSetRegistration>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                r#"
                SELECT id, date, stored_by, accepted
                FROM complete_registration
                WHERE data_set_id = ?1 AND period = ?2 AND organisation_unit_id = ?3
                  AND attribute_option_combo_id = ?4
                "#,
                params![data_set_id, period, org_unit_id, attribute_option_combo_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, bool>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(id, date, stored_by, accepted)| {
            let date = NaiveDate::parse_from_str(&date, DATE_FORMAT).map_err(|e| {
                RepositoryError::FieldValueError {
                    field: "date".to_string(),
                    message: e.to_string(),
                }
            })?;
            Ok(CompleteDataSetRegistration {
                id,
                data_set_id,
                period: period.to_string(),
                org_unit_id,
                attribute_option_combo_id,
                date,
                stored_by,
                accepted,
            })
        })
        .transpose()
    }

    fn insert_registration(&self, registration: &CompleteDataSetRegistration) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO complete_registration (
                data_set_id, period, organisation_unit_id, attribute_option_combo_id,
                date, stored_by, accepted
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                registration.data_set_id,
                registration.period,
                registration.org_unit_id,
                registration.attribute_option_combo_id,
                registration.date.format(DATE_FORMAT).to_string(),
                registration.stored_by,
                registration.accepted,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn update_registration(&self, registration: &CompleteDataSetRegistration) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "UPDATE complete_registration SET date = ?1, stored_by = ?2 WHERE id = ?3",
            params![
                registration.date.format(DATE_FORMAT).to_string(),
                registration.stored_by,
                registration.id,
            ],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "CompleteDataSetRegistration".to_string(),
                id: registration.id.to_string(),
            });
        }
        Ok(())
    }
}
