// ==========================================
// 数据值导入系统 - 系统设置管理器
// ==========================================
// 职责: 系统级导入策略开关的加载、查询、覆写
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::db::open_sqlite_connection;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 严格模式
    pub const STRICT_PERIODS: &str = "keyDataImportStrictPeriods";
    pub const STRICT_CATEGORY_OPTION_COMBOS: &str = "keyDataImportStrictCategoryOptionCombos";
    pub const STRICT_ATTRIBUTE_OPTION_COMBOS: &str = "keyDataImportStrictAttributeOptionCombos";
    pub const STRICT_ORGANISATION_UNITS: &str = "keyDataImportStrictOrganisationUnits";

    // 必填选项组合
    pub const REQUIRE_CATEGORY_OPTION_COMBO: &str = "keyDataImportRequireCategoryOptionCombo";
    pub const REQUIRE_ATTRIBUTE_OPTION_COMBO: &str = "keyDataImportRequireAttributeOptionCombo";
}

// ==========================================
// SystemImportSettings - 系统级导入开关快照
// ==========================================
// 与 ImportOptions 做 OR 合并
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemImportSettings {
    pub strict_periods: bool,
    pub strict_category_option_combos: bool,
    pub strict_attribute_option_combos: bool,
    pub strict_organisation_units: bool,
    pub require_category_option_combo: bool,
    pub require_attribute_option_combo: bool,
}

// ==========================================
// SettingsManager - 系统设置管理器
// ==========================================
pub struct SettingsManager {
    conn: Arc<Mutex<Connection>>,
}

impl SettingsManager {
    /// 从数据库文件创建
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取 global scope 的配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global scope 的配置值（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO config_kv (scope_id, key, value, updated_at)
            VALUES ('global', ?1, ?2, datetime('now'))
            ON CONFLICT(scope_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            params![key, value],
        )?;
        Ok(())
    }

    /// 一次性读取全部导入开关
    pub fn load_import_settings(&self) -> RepositoryResult<SystemImportSettings> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global'")?;
        let map: HashMap<String, String> = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<_, _>>()?;

        let flag = |key: &str| map.get(key).map(|v| parse_bool(v)).unwrap_or(false);

        Ok(SystemImportSettings {
            strict_periods: flag(config_keys::STRICT_PERIODS),
            strict_category_option_combos: flag(config_keys::STRICT_CATEGORY_OPTION_COMBOS),
            strict_attribute_option_combos: flag(config_keys::STRICT_ATTRIBUTE_OPTION_COMBOS),
            strict_organisation_units: flag(config_keys::STRICT_ORGANISATION_UNITS),
            require_category_option_combo: flag(config_keys::REQUIRE_CATEGORY_OPTION_COMBO),
            require_attribute_option_combo: flag(config_keys::REQUIRE_ATTRIBUTE_OPTION_COMBO),
        })
    }
}

/// 数据库路径环境变量
pub const DB_PATH_ENV: &str = "DATAVALUE_IMPORT_DB_PATH";

/// 默认数据库路径
///
/// 优先级: 环境变量 DATAVALUE_IMPORT_DB_PATH → 用户数据目录 → 当前目录
pub fn default_db_path() -> String {
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./datavalue_import.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("datavalue-import");
        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("datavalue_import.db");
        }
    }
    path.to_string_lossy().to_string()
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn setup() -> SettingsManager {
        let conn = open_in_memory().expect("创建测试数据库失败");
        SettingsManager::from_connection(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_missing_settings_default_false() {
        let settings = setup().load_import_settings().unwrap();
        assert_eq!(settings, SystemImportSettings::default());
    }

    #[test]
    fn test_set_and_load_flags() {
        let manager = setup();
        manager.set_global_config_value(config_keys::STRICT_PERIODS, "true").unwrap();
        manager.set_global_config_value(config_keys::REQUIRE_ATTRIBUTE_OPTION_COMBO, "1").unwrap();
        manager.set_global_config_value(config_keys::STRICT_PERIODS, "false").unwrap();

        let settings = manager.load_import_settings().unwrap();
        assert!(!settings.strict_periods);
        assert!(settings.require_attribute_option_combo);
        assert_eq!(
            manager.get_global_config_value(config_keys::REQUIRE_ATTRIBUTE_OPTION_COMBO).unwrap().as_deref(),
            Some("1")
        );
    }

    #[test]
    fn test_default_db_path() {
        let path = default_db_path();
        assert!(path.ends_with(".db"));
    }
}
