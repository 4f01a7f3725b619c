// ==========================================
// 数据值导入系统 - SQLite 连接初始化与建表
// ==========================================
// 职责:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键 / busy_timeout）
// - 幂等建表: 元数据 / 分类维度 / 数据值 / 完成登记 / 系统配置
// ==========================================

use rusqlite::Connection;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// foreign_keys 与 busy_timeout 都需要"每个连接"单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 打开内存数据库（测试 / 试运行）并建表
pub fn open_in_memory() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure_sqlite_connection(&conn)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// 幂等建表
///
/// 已存在的表不会被修改；首次建表时写入 CURRENT_SCHEMA_VERSION
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, datetime('now'))",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL DEFAULT 'global',
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

-- ===== 分类维度 =====
CREATE TABLE IF NOT EXISTS category_option (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uid TEXT NOT NULL UNIQUE,
    code TEXT UNIQUE,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS category (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uid TEXT NOT NULL UNIQUE,
    code TEXT UNIQUE,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS category_options (
    category_id INTEGER NOT NULL REFERENCES category(id) ON DELETE CASCADE,
    category_option_id INTEGER NOT NULL REFERENCES category_option(id),
    sort_order INTEGER NOT NULL,
    PRIMARY KEY (category_id, category_option_id)
);

CREATE TABLE IF NOT EXISTS category_combo (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uid TEXT NOT NULL UNIQUE,
    code TEXT UNIQUE,
    name TEXT NOT NULL,
    skip_total INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS category_combo_categories (
    category_combo_id INTEGER NOT NULL REFERENCES category_combo(id) ON DELETE CASCADE,
    category_id INTEGER NOT NULL REFERENCES category(id),
    sort_order INTEGER NOT NULL,
    PRIMARY KEY (category_combo_id, category_id)
);

CREATE TABLE IF NOT EXISTS category_option_combo (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uid TEXT NOT NULL UNIQUE,
    code TEXT UNIQUE,
    name TEXT NOT NULL,
    category_combo_id INTEGER NOT NULL REFERENCES category_combo(id),
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS category_option_combo_options (
    category_option_combo_id INTEGER NOT NULL REFERENCES category_option_combo(id) ON DELETE CASCADE,
    category_option_id INTEGER NOT NULL REFERENCES category_option(id),
    PRIMARY KEY (category_option_combo_id, category_option_id)
);

-- ===== 元数据 =====
CREATE TABLE IF NOT EXISTS organisation_unit (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uid TEXT NOT NULL UNIQUE,
    code TEXT UNIQUE,
    name TEXT NOT NULL,
    parent_id INTEGER REFERENCES organisation_unit(id),
    path TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS data_element (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uid TEXT NOT NULL UNIQUE,
    code TEXT UNIQUE,
    name TEXT NOT NULL,
    value_type TEXT NOT NULL,
    domain_type TEXT NOT NULL DEFAULT 'AGGREGATE',
    category_combo_id INTEGER NOT NULL REFERENCES category_combo(id),
    zero_is_significant INTEGER NOT NULL DEFAULT 0,
    aggregation_levels TEXT NOT NULL DEFAULT '[]',
    option_set TEXT
);

CREATE TABLE IF NOT EXISTS data_set (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uid TEXT NOT NULL UNIQUE,
    code TEXT UNIQUE,
    name TEXT NOT NULL,
    period_type TEXT NOT NULL,
    category_combo_id INTEGER NOT NULL REFERENCES category_combo(id),
    open_future_periods INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS data_set_elements (
    data_set_id INTEGER NOT NULL REFERENCES data_set(id) ON DELETE CASCADE,
    data_element_id INTEGER NOT NULL REFERENCES data_element(id),
    PRIMARY KEY (data_set_id, data_element_id)
);

CREATE TABLE IF NOT EXISTS data_set_sources (
    data_set_id INTEGER NOT NULL REFERENCES data_set(id) ON DELETE CASCADE,
    organisation_unit_id INTEGER NOT NULL REFERENCES organisation_unit(id),
    PRIMARY KEY (data_set_id, organisation_unit_id)
);

-- ===== 事实 =====
CREATE TABLE IF NOT EXISTS data_value (
    data_element_id INTEGER NOT NULL REFERENCES data_element(id),
    period TEXT NOT NULL,
    organisation_unit_id INTEGER NOT NULL REFERENCES organisation_unit(id),
    category_option_combo_id INTEGER NOT NULL REFERENCES category_option_combo(id),
    attribute_option_combo_id INTEGER NOT NULL REFERENCES category_option_combo(id),
    value TEXT,
    comment TEXT,
    stored_by TEXT NOT NULL,
    created TEXT NOT NULL,
    last_updated TEXT NOT NULL,
    followup INTEGER NOT NULL DEFAULT 0,
    UNIQUE (data_element_id, period, organisation_unit_id, category_option_combo_id, attribute_option_combo_id)
);

CREATE INDEX IF NOT EXISTS idx_data_value_period_ou
    ON data_value (period, organisation_unit_id);

CREATE TABLE IF NOT EXISTS complete_registration (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    data_set_id INTEGER NOT NULL REFERENCES data_set(id),
    period TEXT NOT NULL,
    organisation_unit_id INTEGER NOT NULL REFERENCES organisation_unit(id),
    attribute_option_combo_id INTEGER NOT NULL REFERENCES category_option_combo(id),
    date TEXT NOT NULL,
    stored_by TEXT NOT NULL,
    accepted INTEGER NOT NULL DEFAULT 0,
    UNIQUE (data_set_id, period, organisation_unit_id, attribute_option_combo_id)
);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = open_in_memory().expect("创建内存数据库失败");
        init_schema(&conn).expect("重复建表失败");
        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }
}
