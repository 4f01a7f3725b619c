// ==========================================
// 数据值导入系统 - 分类维度仓储
// ==========================================
// 职责: 分类选项 / 分类 / 分类组合 / 分类选项组合的持久化
// 红线: Repository 不做业务逻辑，只做数据映射
// 约束: 分类内选项、组合内分类均保留 sort_order
// ==========================================

use crate::domain::category::{Category, CategoryCombo, CategoryOption, CategoryOptionCombo};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::metadata_repo::{load_option_combo_options, map_option_combo_head};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

// ==========================================
// CategoryRepository - 分类维度仓储
// ==========================================
pub struct CategoryRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CategoryRepository {
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
    // 分类
    // ==========================================

    /// 保存分类（按 uid 插入或更新），选项不存在时一并创建
    ///
    /// # 返回
    /// - `Ok(category_id)`
    pub fn save_category(&self, category: &Category) -> RepositoryResult<i64> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row("SELECT id FROM category WHERE uid = ?1", [&category.uid], |row| row.get(0))
            .optional()?;

        let category_id = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE category SET code = ?1, name = ?2 WHERE id = ?3",
                    params![category.code, category.name, id],
                )?;
                tx.execute("DELETE FROM category_options WHERE category_id = ?1", [id])?;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO category (uid, code, name) VALUES (?1, ?2, ?3)",
                    params![category.uid, category.code, category.name],
                )?;
                tx.last_insert_rowid()
            }
        };

        for (sort_order, option) in category.options.iter().enumerate() {
            let option_id = upsert_option(&tx, option)?;
            tx.execute(
                "INSERT INTO category_options (category_id, category_option_id, sort_order) VALUES (?1, ?2, ?3)",
                params![category_id, option_id, sort_order as i64],
            )?;
        }

        tx.commit()?;
        Ok(category_id)
    }

    pub fn find_category_by_uid(&self, uid: &str) -> RepositoryResult<Option<Category>> {
        let conn = self.get_conn()?;
        let head = conn
            .query_row(
                "SELECT id, uid, code, name FROM category WHERE uid = ?1",
                [uid],
                |row| {
                    Ok(Category {
                        id: row.get(0)?,
                        uid: row.get(1)?,
                        code: row.get(2)?,
                        name: row.get(3)?,
                        options: Vec::new(),
                    })
                },
            )
            .optional()?;
        head.map(|c| load_category_options(&conn, c)).transpose()
    }

    // ==========================================
    // 分类组合
    // ==========================================

    /// 保存分类组合头与有序分类（分类须已存在）
    ///
    /// 选项组合不在此处写入，由 insert_option_combos 追加
    pub fn save_category_combo(&self, combo: &CategoryCombo) -> RepositoryResult<i64> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row("SELECT id FROM category_combo WHERE uid = ?1", [&combo.uid], |row| row.get(0))
            .optional()?;

        let combo_id = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE category_combo SET code = ?1, name = ?2, skip_total = ?3 WHERE id = ?4",
                    params![combo.code, combo.name, combo.skip_total, id],
                )?;
                tx.execute("DELETE FROM category_combo_categories WHERE category_combo_id = ?1", [id])?;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO category_combo (uid, code, name, skip_total) VALUES (?1, ?2, ?3, ?4)",
                    params![combo.uid, combo.code, combo.name, combo.skip_total],
                )?;
                tx.last_insert_rowid()
            }
        };

        for (sort_order, category) in combo.categories.iter().enumerate() {
            let category_id: i64 = tx
                .query_row("SELECT id FROM category WHERE uid = ?1", [&category.uid], |row| row.get(0))
                .optional()?
                .ok_or_else(|| RepositoryError::NotFound {
                    entity: "Category".to_string(),
                    id: category.uid.clone(),
                })?;
            tx.execute(
                "INSERT INTO category_combo_categories (category_combo_id, category_id, sort_order) VALUES (?1, ?2, ?3)",
                params![combo_id, category_id, sort_order as i64],
            )?;
        }

        tx.commit()?;
        Ok(combo_id)
    }

    pub fn find_category_combo_by_uid(&self, uid: &str) -> RepositoryResult<Option<CategoryCombo>> {
        let id: Option<i64> = {
            let conn = self.get_conn()?;
            conn.query_row("SELECT id FROM category_combo WHERE uid = ?1", [uid], |row| row.get(0))
                .optional()?
        };
        id.map(|id| self.find_category_combo(id)).transpose().map(Option::flatten)
    }

    pub fn find_default_category_combo(&self) -> RepositoryResult<Option<CategoryCombo>> {
        let id: Option<i64> = {
            let conn = self.get_conn()?;
            conn.query_row(
                "SELECT id FROM category_combo WHERE name = 'default' ORDER BY id LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?
        };
        id.map(|id| self.find_category_combo(id)).transpose().map(Option::flatten)
    }

    /// 读取分类组合（含有序分类、分类选项、已持久化选项组合）
    pub fn find_category_combo(&self, id: i64) -> RepositoryResult<Option<CategoryCombo>> {
        let conn = self.get_conn()?;
        let head = conn
            .query_row(
                "SELECT id, uid, code, name, skip_total FROM category_combo WHERE id = ?1",
                [id],
                |row| {
                    Ok(CategoryCombo {
                        id: row.get(0)?,
                        uid: row.get(1)?,
                        code: row.get(2)?,
                        name: row.get(3)?,
                        skip_total: row.get(4)?,
                        categories: Vec::new(),
                        option_combos: Vec::new(),
                    })
                },
            )
            .optional()?;

        let mut combo = match head {
            Some(combo) => combo,
            None => return Ok(None),
        };

        let mut stmt = conn.prepare(
            r#"
            SELECT c.id, c.uid, c.code, c.name
            FROM category c
            JOIN category_combo_categories ccc ON ccc.category_id = c.id
            WHERE ccc.category_combo_id = ?1
            ORDER BY ccc.sort_order
            "#,
        )?;
        let categories = stmt
            .query_map([id], |row| {
                Ok(Category {
                    id: row.get(0)?,
                    uid: row.get(1)?,
                    code: row.get(2)?,
                    name: row.get(3)?,
                    options: Vec::new(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        combo.categories = categories
            .into_iter()
            .map(|c| load_category_options(&conn, c))
            .collect::<RepositoryResult<Vec<_>>>()?;

        combo.option_combos = list_option_combos(&conn, id)?;
        Ok(Some(combo))
    }

    /// 全部分类组合 ID
    pub fn list_category_combo_ids(&self) -> RepositoryResult<Vec<i64>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT id FROM category_combo ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// 包含指定分类的分类组合 ID
    pub fn list_combo_ids_containing_category(&self, category_uid: &str) -> RepositoryResult<Vec<i64>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT DISTINCT ccc.category_combo_id
            FROM category_combo_categories ccc
            JOIN category c ON c.id = ccc.category_id
            WHERE c.uid = ?1
            ORDER BY ccc.category_combo_id
            "#,
        )?;
        let ids = stmt
            .query_map([category_uid], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    // ==========================================
    // 分类选项组合
    // ==========================================

    /// 追加选项组合（事务），选项按 uid 关联
    ///
    /// # 返回
    /// - `Ok(ids)`: 新组合 ID，顺序与入参一致
    pub fn insert_option_combos(
        &self,
        category_combo_id: i64,
        combos: &[CategoryOptionCombo],
    ) -> RepositoryResult<Vec<i64>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let mut ids = Vec::with_capacity(combos.len());

        for combo in combos {
            tx.execute(
                "INSERT INTO category_option_combo (uid, code, name, category_combo_id) VALUES (?1, ?2, ?3, ?4)",
                params![combo.uid, combo.code, combo.name, category_combo_id],
            )?;
            let combo_id = tx.last_insert_rowid();
            for option_uid in &combo.options {
                let option_id: i64 = tx
                    .query_row("SELECT id FROM category_option WHERE uid = ?1", [option_uid], |row| {
                        row.get(0)
                    })
                    .optional()?
                    .ok_or_else(|| RepositoryError::NotFound {
                        entity: "CategoryOption".to_string(),
                        id: option_uid.clone(),
                    })?;
                tx.execute(
                    "INSERT INTO category_option_combo_options (category_option_combo_id, category_option_id) VALUES (?1, ?2)",
                    params![combo_id, option_id],
                )?;
            }
            ids.push(combo_id);
        }

        tx.commit()?;
        Ok(ids)
    }

    pub fn list_option_combos(&self, category_combo_id: i64) -> RepositoryResult<Vec<CategoryOptionCombo>> {
        let conn = self.get_conn()?;
        list_option_combos(&conn, category_combo_id)
    }
}

fn upsert_option(conn: &Connection, option: &CategoryOption) -> RepositoryResult<i64> {
    let existing: Option<i64> = conn
        .query_row("SELECT id FROM category_option WHERE uid = ?1", [&option.uid], |row| row.get(0))
        .optional()?;
    match existing {
        Some(id) => {
            conn.execute(
                "UPDATE category_option SET code = ?1, name = ?2 WHERE id = ?3",
                params![option.code, option.name, id],
            )?;
            Ok(id)
        }
        None => {
            conn.execute(
                "INSERT INTO category_option (uid, code, name) VALUES (?1, ?2, ?3)",
                params![option.uid, option.code, option.name],
            )?;
            Ok(conn.last_insert_rowid())
        }
    }
}

fn load_category_options(conn: &Connection, mut category: Category) -> RepositoryResult<Category> {
    let mut stmt = conn.prepare(
        r#"
        SELECT co.id, co.uid, co.code, co.name
        FROM category_option co
        JOIN category_options cos ON cos.category_option_id = co.id
        WHERE cos.category_id = ?1
        ORDER BY cos.sort_order
        "#,
    )?;
    category.options = stmt
        .query_map([category.id], |row| {
            Ok(CategoryOption {
                id: row.get(0)?,
                uid: row.get(1)?,
                code: row.get(2)?,
                name: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(category)
}

fn list_option_combos(conn: &Connection, category_combo_id: i64) -> RepositoryResult<Vec<CategoryOptionCombo>> {
    let mut stmt = conn.prepare(
        "SELECT id, uid, code, name, category_combo_id FROM category_option_combo WHERE category_combo_id = ?1 ORDER BY id",
    )?;
    let heads = stmt
        .query_map([category_combo_id], map_option_combo_head)?
        .collect::<Result<Vec<_>, _>>()?;
    heads
        .into_iter()
        .map(|c| load_option_combo_options(conn, c))
        .collect()
}
