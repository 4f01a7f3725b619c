// ==========================================
// 数据值导入系统 - 元数据仓储
// ==========================================
// 职责: 数据元 / 数据集 / 组织机构 / 选项组合的读取与维护
// 红线: Repository 不含业务逻辑，只做数据映射
// 约束: 标识方案列名来自 IdScheme::column() 白名单，其余一律参数化
// ==========================================

use crate::domain::category::CategoryOptionCombo;
use crate::domain::metadata::{DataElement, DataSet, OrganisationUnit};
use crate::domain::types::{IdScheme, PeriodType};
use crate::engine::collaborators::MetadataLookup;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{BTreeSet, HashSet};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

const DATA_ELEMENT_COLUMNS: &str = "id, uid, code, name, value_type, domain_type, \
     category_combo_id, zero_is_significant, aggregation_levels, option_set";

const DATA_SET_COLUMNS: &str =
    "id, uid, code, name, period_type, category_combo_id, open_future_periods";

const ORG_UNIT_COLUMNS: &str = "id, uid, code, name, parent_id, path";

// ==========================================
// MetadataRepository - 元数据仓储
// ==========================================
pub struct MetadataRepository {
    conn: Arc<Mutex<Connection>>,
}

impl MetadataRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 组织机构
    // ==========================================

    /// 插入组织机构，path 由父节点推导
    pub fn insert_organisation_unit(&self, unit: &OrganisationUnit) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let path = derive_path(&conn, unit)?;
        conn.execute(
            "INSERT INTO organisation_unit (uid, code, name, parent_id, path) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![unit.uid, unit.code, unit.name, unit.parent_id, path],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_organisation_unit(&self, unit: &OrganisationUnit) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let path = derive_path(&conn, unit)?;
        let rows = conn.execute(
            "UPDATE organisation_unit SET code = ?1, name = ?2, parent_id = ?3, path = ?4 WHERE id = ?5",
            params![unit.code, unit.name, unit.parent_id, path, unit.id],
        )?;
        ensure_updated(rows, "OrganisationUnit", unit.id)
    }

    // ==========================================
    // 数据元
    // ==========================================

    pub fn insert_data_element(&self, element: &DataElement) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO data_element (
                uid, code, name, value_type, domain_type, category_combo_id,
                zero_is_significant, aggregation_levels, option_set
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                element.uid,
                element.code,
                element.name,
                element.value_type.as_str(),
                element.domain_type.to_string(),
                element.category_combo_id,
                element.zero_is_significant,
                serde_json::to_string(&element.aggregation_levels)?,
                element.option_set.as_ref().map(serde_json::to_string).transpose()?,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_data_element(&self, element: &DataElement) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            UPDATE data_element SET
                code = ?1, name = ?2, value_type = ?3, domain_type = ?4, category_combo_id = ?5,
                zero_is_significant = ?6, aggregation_levels = ?7, option_set = ?8
            WHERE id = ?9
            "#,
            params![
                element.code,
                element.name,
                element.value_type.as_str(),
                element.domain_type.to_string(),
                element.category_combo_id,
                element.zero_is_significant,
                serde_json::to_string(&element.aggregation_levels)?,
                element.option_set.as_ref().map(serde_json::to_string).transpose()?,
                element.id,
            ],
        )?;
        ensure_updated(rows, "DataElement", element.id)
    }

    // ==========================================
    // 数据集
    // ==========================================

    /// 插入数据集及其数据元 / 组织机构分配（事务）
    pub fn insert_data_set(&self, data_set: &DataSet) -> RepositoryResult<i64> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO data_set (uid, code, name, period_type, category_combo_id, open_future_periods)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                data_set.uid,
                data_set.code,
                data_set.name,
                data_set.period_type.as_str(),
                data_set.category_combo_id,
                data_set.open_future_periods,
            ],
        )?;
        let id = tx.last_insert_rowid();
        write_data_set_members(&tx, id, data_set)?;
        tx.commit()?;
        Ok(id)
    }

    /// 更新数据集，成员关系整体替换
    pub fn update_data_set(&self, data_set: &DataSet) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let rows = tx.execute(
            r#"
            UPDATE data_set SET code = ?1, name = ?2, period_type = ?3,
                category_combo_id = ?4, open_future_periods = ?5
            WHERE id = ?6
            "#,
            params![
                data_set.code,
                data_set.name,
                data_set.period_type.as_str(),
                data_set.category_combo_id,
                data_set.open_future_periods,
                data_set.id,
            ],
        )?;
        ensure_updated(rows, "DataSet", data_set.id)?;
        tx.execute("DELETE FROM data_set_elements WHERE data_set_id = ?1", [data_set.id])?;
        tx.execute("DELETE FROM data_set_sources WHERE data_set_id = ?1", [data_set.id])?;
        write_data_set_members(&tx, data_set.id, data_set)?;
        tx.commit()?;
        Ok(())
    }

    /// 按标识方案批量读取数据集（导出），无法解析的标识被忽略
    pub fn find_data_sets(&self, scheme: IdScheme, identifiers: &[String]) -> RepositoryResult<Vec<DataSet>> {
        let mut result = Vec::with_capacity(identifiers.len());
        for identifier in identifiers {
            if let Some(ds) = self.find_data_set(scheme, identifier)? {
                result.push(ds);
            }
        }
        Ok(result)
    }
}

// ==========================================
// MetadataLookup 实现
// ==========================================
impl MetadataLookup for MetadataRepository {
    fn find_data_element(&self, scheme: IdScheme, identifier: &str) -> RepositoryResult<Option<DataElement>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM data_element WHERE {} = ?1 LIMIT 1",
            DATA_ELEMENT_COLUMNS,
            scheme.column()
        );
        query_by_scheme(&conn, &sql, scheme, identifier, map_data_element)
    }

    fn find_organisation_unit(
        &self,
        scheme: IdScheme,
        identifier: &str,
    ) -> RepositoryResult<Option<OrganisationUnit>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM organisation_unit WHERE {} = ?1 LIMIT 1",
            ORG_UNIT_COLUMNS,
            scheme.column()
        );
        query_by_scheme(&conn, &sql, scheme, identifier, map_org_unit)
    }

    fn find_category_option_combo(
        &self,
        scheme: IdScheme,
        identifier: &str,
    ) -> RepositoryResult<Option<CategoryOptionCombo>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT id, uid, code, name, category_combo_id FROM category_option_combo WHERE {} = ?1 LIMIT 1",
            scheme.column()
        );
        let combo = query_by_scheme(&conn, &sql, scheme, identifier, map_option_combo_head)?;
        combo.map(|c| load_option_combo_options(&conn, c)).transpose()
    }

    fn find_data_set(&self, scheme: IdScheme, identifier: &str) -> RepositoryResult<Option<DataSet>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM data_set WHERE {} = ?1 LIMIT 1",
            DATA_SET_COLUMNS,
            scheme.column()
        );
        let data_set = query_by_scheme(&conn, &sql, scheme, identifier, map_data_set)?;
        data_set.map(|ds| load_data_set_members(&conn, ds)).transpose()
    }

    fn default_category_option_combo(&self) -> RepositoryResult<Option<CategoryOptionCombo>> {
        let conn = self.get_conn()?;
        let combo = conn
            .query_row(
                r#"
                SELECT coc.id, coc.uid, coc.code, coc.name, coc.category_combo_id
                FROM category_option_combo coc
                JOIN category_combo cc ON cc.id = coc.category_combo_id
                WHERE coc.name = 'default' AND cc.name = 'default'
                ORDER BY coc.id LIMIT 1
                "#,
                [],
                map_option_combo_head,
            )
            .optional()?;
        combo.map(|c| load_option_combo_options(&conn, c)).transpose()
    }

    fn all_data_elements(&self) -> RepositoryResult<Vec<DataElement>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM data_element ORDER BY id",
            DATA_ELEMENT_COLUMNS
        ))?;
        let rows = stmt.query_map([], map_data_element)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn all_organisation_units(&self) -> RepositoryResult<Vec<OrganisationUnit>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM organisation_unit ORDER BY id",
            ORG_UNIT_COLUMNS
        ))?;
        let rows = stmt.query_map([], map_org_unit)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn data_element_period_types(&self, data_element_id: i64) -> RepositoryResult<BTreeSet<PeriodType>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT DISTINCT ds.period_type
            FROM data_set ds
            JOIN data_set_elements dse ON dse.data_set_id = ds.id
            WHERE dse.data_element_id = ?1
            "#,
        )?;
        let rows = stmt.query_map([data_element_id], |row| {
            let raw: String = row.get(0)?;
            parse_column(0, &raw)
        })?;
        Ok(rows.collect::<Result<BTreeSet<_>, _>>()?)
    }

    fn category_option_combo_ids(&self, category_combo_id: i64) -> RepositoryResult<HashSet<i64>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT id FROM category_option_combo WHERE category_combo_id = ?1")?;
        let rows = stmt.query_map([category_combo_id], |row| row.get(0))?;
        Ok(rows.collect::<Result<HashSet<i64>, _>>()?)
    }

    fn data_set_attribute_option_combo_ids(&self, data_element_id: i64) -> RepositoryResult<HashSet<i64>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT DISTINCT coc.id
            FROM category_option_combo coc
            JOIN data_set ds ON ds.category_combo_id = coc.category_combo_id
            JOIN data_set_elements dse ON dse.data_set_id = ds.id
            WHERE dse.data_element_id = ?1
            "#,
        )?;
        let rows = stmt.query_map([data_element_id], |row| row.get(0))?;
        Ok(rows.collect::<Result<HashSet<i64>, _>>()?)
    }

    fn is_data_element_assigned(&self, data_element_id: i64, org_unit_id: i64) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let assigned = conn
            .query_row(
                r#"
                SELECT 1
                FROM data_set_elements dse
                JOIN data_set_sources dss ON dss.data_set_id = dse.data_set_id
                WHERE dse.data_element_id = ?1 AND dss.organisation_unit_id = ?2
                LIMIT 1
                "#,
                params![data_element_id, org_unit_id],
                |_row| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        Ok(assigned)
    }

    fn allows_future_periods(&self, data_element_id: i64) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let max_open: Option<i64> = conn.query_row(
            r#"
            SELECT MAX(ds.open_future_periods)
            FROM data_set ds
            JOIN data_set_elements dse ON dse.data_set_id = ds.id
            WHERE dse.data_element_id = ?1
            "#,
            [data_element_id],
            |row| row.get(0),
        )?;
        Ok(max_open.unwrap_or(0) > 0)
    }
}

// ==========================================
// 行映射
// ==========================================

/// 按标识方案执行单行查询；ID 方案下非数字标识视为未找到
fn query_by_scheme<T>(
    conn: &Connection,
    sql: &str,
    scheme: IdScheme,
    identifier: &str,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> RepositoryResult<Option<T>> {
    let result = match scheme {
        IdScheme::Id => match identifier.trim().parse::<i64>() {
            Ok(id) => conn.query_row(sql, [id], map).optional()?,
            Err(_) => None,
        },
        _ => conn.query_row(sql, [identifier], map).optional()?,
    };
    Ok(result)
}

/// 文本列解析为枚举
pub(crate) fn parse_column<T>(idx: usize, raw: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

fn json_column<T: serde::de::DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn map_data_element(row: &Row<'_>) -> rusqlite::Result<DataElement> {
    let value_type: String = row.get(4)?;
    let domain_type: String = row.get(5)?;
    let levels: String = row.get(8)?;
    let option_set: Option<String> = row.get(9)?;
    Ok(DataElement {
        id: row.get(0)?,
        uid: row.get(1)?,
        code: row.get(2)?,
        name: row.get(3)?,
        value_type: parse_column(4, &value_type)?,
        domain_type: parse_column(5, &domain_type)?,
        category_combo_id: row.get(6)?,
        zero_is_significant: row.get(7)?,
        aggregation_levels: json_column(8, &levels)?,
        option_set: option_set.map(|raw| json_column(9, &raw)).transpose()?,
    })
}

fn map_org_unit(row: &Row<'_>) -> rusqlite::Result<OrganisationUnit> {
    Ok(OrganisationUnit {
        id: row.get(0)?,
        uid: row.get(1)?,
        code: row.get(2)?,
        name: row.get(3)?,
        parent_id: row.get(4)?,
        path: row.get(5)?,
    })
}

fn map_data_set(row: &Row<'_>) -> rusqlite::Result<DataSet> {
    let period_type: String = row.get(4)?;
    Ok(DataSet {
        id: row.get(0)?,
        uid: row.get(1)?,
        code: row.get(2)?,
        name: row.get(3)?,
        period_type: parse_column(4, &period_type)?,
        category_combo_id: row.get(5)?,
        open_future_periods: row.get(6)?,
        data_element_ids: Vec::new(),
        source_ids: Vec::new(),
    })
}

pub(crate) fn map_option_combo_head(row: &Row<'_>) -> rusqlite::Result<CategoryOptionCombo> {
    Ok(CategoryOptionCombo {
        id: row.get(0)?,
        uid: row.get(1)?,
        code: row.get(2)?,
        name: row.get(3)?,
        category_combo_id: row.get(4)?,
        options: BTreeSet::new(),
    })
}

/// 补齐选项组合的选项 UID 集合
pub(crate) fn load_option_combo_options(
    conn: &Connection,
    mut combo: CategoryOptionCombo,
) -> RepositoryResult<CategoryOptionCombo> {
    let mut stmt = conn.prepare(
        r#"
        SELECT co.uid
        FROM category_option_combo_options coco
        JOIN category_option co ON co.id = coco.category_option_id
        WHERE coco.category_option_combo_id = ?1
        "#,
    )?;
    let rows = stmt.query_map([combo.id], |row| row.get::<_, String>(0))?;
    combo.options = rows.collect::<Result<BTreeSet<_>, _>>()?;
    Ok(combo)
}

fn load_data_set_members(conn: &Connection, mut data_set: DataSet) -> RepositoryResult<DataSet> {
    let mut stmt = conn.prepare(
        "SELECT data_element_id FROM data_set_elements WHERE data_set_id = ?1 ORDER BY data_element_id",
    )?;
    data_set.data_element_ids = stmt
        .query_map([data_set.id], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT organisation_unit_id FROM data_set_sources WHERE data_set_id = ?1 ORDER BY organisation_unit_id",
    )?;
    data_set.source_ids = stmt
        .query_map([data_set.id], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(data_set)
}

fn write_data_set_members(conn: &Connection, data_set_id: i64, data_set: &DataSet) -> RepositoryResult<()> {
    for element_id in &data_set.data_element_ids {
        conn.execute(
            "INSERT OR IGNORE INTO data_set_elements (data_set_id, data_element_id) VALUES (?1, ?2)",
            params![data_set_id, element_id],
        )?;
    }
    for source_id in &data_set.source_ids {
        conn.execute(
            "INSERT OR IGNORE INTO data_set_sources (data_set_id, organisation_unit_id) VALUES (?1, ?2)",
            params![data_set_id, source_id],
        )?;
    }
    Ok(())
}

/// path = 父节点 path + "/" + uid；根节点为 "/" + uid
fn derive_path(conn: &Connection, unit: &OrganisationUnit) -> RepositoryResult<String> {
    let parent_path = match unit.parent_id {
        Some(parent_id) => conn
            .query_row(
                "SELECT path FROM organisation_unit WHERE id = ?1",
                [parent_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "OrganisationUnit".to_string(),
                id: parent_id.to_string(),
            })?,
        None => String::new(),
    };
    Ok(format!("{}/{}", parent_path, unit.uid))
}

fn ensure_updated(rows: usize, entity: &str, id: i64) -> RepositoryResult<()> {
    if rows == 0 {
        return Err(RepositoryError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::domain::types::{DomainType, ValueType};

    fn setup() -> MetadataRepository {
        let conn = open_in_memory().expect("创建测试数据库失败");
        conn.execute_batch(
            r#"
            INSERT INTO category_combo (id, uid, name) VALUES (1, 'CC_DEFAULT', 'default');
            INSERT INTO category_option_combo (id, uid, name, category_combo_id) VALUES (1, 'COC_DEFAULT', 'default', 1);
            "#,
        )
        .expect("初始化测试数据失败");
        MetadataRepository::new(Arc::new(Mutex::new(conn)))
    }

    fn create_test_element(uid: &str) -> DataElement {
        DataElement {
            id: 0,
            uid: uid.to_string(),
            code: Some(format!("{}_CODE", uid)),
            name: format!("{} name", uid),
            value_type: ValueType::Integer,
            domain_type: DomainType::Aggregate,
            category_combo_id: 1,
            zero_is_significant: false,
            aggregation_levels: vec![2, 3],
            option_set: None,
        }
    }

    #[test]
    fn test_find_data_element_by_each_scheme() {
        let repo = setup();
        let id = repo.insert_data_element(&create_test_element("DE1")).unwrap();

        let by_uid = repo.find_data_element(IdScheme::Uid, "DE1").unwrap().unwrap();
        assert_eq!(by_uid.id, id);
        assert_eq!(by_uid.aggregation_levels, vec![2, 3]);
        assert!(repo.find_data_element(IdScheme::Code, "DE1_CODE").unwrap().is_some());
        assert!(repo.find_data_element(IdScheme::Name, "DE1 name").unwrap().is_some());
        assert!(repo.find_data_element(IdScheme::Id, &id.to_string()).unwrap().is_some());
        assert!(repo.find_data_element(IdScheme::Id, "not-a-number").unwrap().is_none());
        assert!(repo.find_data_element(IdScheme::Uid, "MISSING").unwrap().is_none());
    }

    #[test]
    fn test_org_unit_path_derivation() {
        let repo = setup();
        let root = OrganisationUnit {
            id: 0,
            uid: "ROOT".to_string(),
            code: None,
            name: "Root".to_string(),
            parent_id: None,
            path: String::new(),
        };
        let root_id = repo.insert_organisation_unit(&root).unwrap();
        let child = OrganisationUnit {
            uid: "OU1".to_string(),
            name: "Child".to_string(),
            parent_id: Some(root_id),
            ..root.clone()
        };
        repo.insert_organisation_unit(&child).unwrap();

        let loaded = repo.find_organisation_unit(IdScheme::Uid, "OU1").unwrap().unwrap();
        assert_eq!(loaded.path, "/ROOT/OU1");
    }

    #[test]
    fn test_data_set_derived_predicates() {
        let repo = setup();
        let de_id = repo.insert_data_element(&create_test_element("DE1")).unwrap();
        let ou_id = repo
            .insert_organisation_unit(&OrganisationUnit {
                id: 0,
                uid: "OU1".to_string(),
                code: None,
                name: "OU1".to_string(),
                parent_id: None,
                path: String::new(),
            })
            .unwrap();
        repo.insert_data_set(&DataSet {
            id: 0,
            uid: "DS1".to_string(),
            code: None,
            name: "DS1".to_string(),
            period_type: PeriodType::Monthly,
            category_combo_id: 1,
            open_future_periods: 0,
            data_element_ids: vec![de_id],
            source_ids: vec![ou_id],
        })
        .unwrap();

        let types = repo.data_element_period_types(de_id).unwrap();
        assert!(types.contains(&PeriodType::Monthly));
        assert!(repo.is_data_element_assigned(de_id, ou_id).unwrap());
        assert!(!repo.allows_future_periods(de_id).unwrap());
        assert!(repo.data_set_attribute_option_combo_ids(de_id).unwrap().contains(&1));

        let ds = repo.find_data_set(IdScheme::Uid, "DS1").unwrap().unwrap();
        assert_eq!(ds.data_element_ids, vec![de_id]);
        assert_eq!(ds.source_ids, vec![ou_id]);
    }

    #[test]
    fn test_default_option_combo() {
        let repo = setup();
        let combo = repo.default_category_option_combo().unwrap().unwrap();
        assert_eq!(combo.uid, "COC_DEFAULT");
    }
}
