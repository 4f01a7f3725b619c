// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 内存数据库初始化、元数据种子数据、数据值记录构造
// 种子:
//   组织机构  ROOT ─┬─ OU1（DS1 分配）
//                  ├─ OU2
//             OTHER（不在用户层级内）
//   数据元    DE1(INTEGER, 默认组合) DE2(INTEGER, 性别×年龄) DE_TEXT(TEXT) DE_SIG(NUMBER, 保存零值)
//   数据集    DS1(MONTHLY: DE1/DE2/DE_TEXT, 源 OU1)  DS_Q(QUARTERLY: DE_SIG, 允许未来周期)
//   用户      admin，层级根 ROOT
// ==========================================

#![allow(dead_code)]

use datavalue_import::api::{DataValueSetApi, MetadataApi};
use datavalue_import::db::open_in_memory;
use datavalue_import::domain::{
    Category, CategoryCombo, CategoryOption, DataElement, DataSet, DataValueRecord, OrganisationUnit,
};
use datavalue_import::domain::types::{DomainType, MergeMode, PeriodType, ValueType};
use datavalue_import::engine::StaticUserProvider;
use datavalue_import::repository::DataValueRepository;
use datavalue_import::SettingsManager;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

/// 种子数据中的 UID / ID
pub struct SeedIds {
    pub default_coc: String,
    /// 性别×年龄 选项组合 UID（展示顺序: M/U5, M/O5, F/U5, F/O5）
    pub sex_age_cocs: Vec<String>,
    pub root_id: i64,
    pub ou1_id: i64,
}

/// 一次测试的完整上下文（共享同一个内存连接）
pub struct TestContext {
    pub conn: Arc<Mutex<Connection>>,
    pub api: DataValueSetApi,
    pub metadata: MetadataApi,
    pub values: DataValueRepository,
    pub settings: SettingsManager,
    pub seed: SeedIds,
}

/// 创建内存数据库（已建表，未写入元数据）
pub fn create_test_conn() -> Arc<Mutex<Connection>> {
    let conn = open_in_memory().expect("创建测试数据库失败");
    Arc::new(Mutex::new(conn))
}

/// 创建带种子元数据的测试上下文
pub fn setup() -> TestContext {
    let conn = create_test_conn();
    let metadata = MetadataApi::from_connection(conn.clone());
    let seed = seed_metadata(&metadata);
    let api = DataValueSetApi::from_connection(
        conn.clone(),
        Arc::new(StaticUserProvider::new("admin", vec!["ROOT".to_string()])),
    );

    TestContext {
        values: DataValueRepository::new(conn.clone()),
        settings: SettingsManager::from_connection(conn.clone()),
        conn,
        api,
        metadata,
        seed,
    }
}

/// 写入种子元数据
pub fn seed_metadata(metadata: &MetadataApi) -> SeedIds {
    let default_combo = metadata.generate_default_dimension().expect("默认维度初始化失败");
    let sex_age = metadata
        .save_category_combo(&create_sex_age_combo(), MergeMode::Replace)
        .expect("保存性别×年龄组合失败");

    // ===== 组织机构 =====
    let root_id = save_org_unit(metadata, "ROOT", None);
    let ou1_id = save_org_unit(metadata, "OU1", Some(root_id));
    save_org_unit(metadata, "OU2", Some(root_id));
    save_org_unit(metadata, "OTHER", None);

    // ===== 数据元 =====
    let de1 = save_element(metadata, "DE1", ValueType::Integer, default_combo.id, false);
    let de2 = save_element(metadata, "DE2", ValueType::Integer, sex_age.id, false);
    let de_text = save_element(metadata, "DE_TEXT", ValueType::Text, default_combo.id, false);
    let de_sig = save_element(metadata, "DE_SIG", ValueType::Number, default_combo.id, true);

    // ===== 数据集 =====
    metadata
        .save_data_set(
            &DataSet {
                id: 0,
                uid: "DS1".to_string(),
                code: Some("DS1_CODE".to_string()),
                name: "Monthly form".to_string(),
                period_type: PeriodType::Monthly,
                category_combo_id: default_combo.id,
                open_future_periods: 0,
                data_element_ids: vec![de1, de2, de_text],
                source_ids: vec![ou1_id],
            },
            MergeMode::Replace,
        )
        .expect("保存 DS1 失败");
    metadata
        .save_data_set(
            &DataSet {
                id: 0,
                uid: "DS_Q".to_string(),
                code: None,
                name: "Quarterly form".to_string(),
                period_type: PeriodType::Quarterly,
                category_combo_id: default_combo.id,
                open_future_periods: 2,
                data_element_ids: vec![de_sig],
                source_ids: vec![ou1_id],
            },
            MergeMode::Replace,
        )
        .expect("保存 DS_Q 失败");

    SeedIds {
        default_coc: default_combo.option_combos[0].uid.clone(),
        sex_age_cocs: metadata
            .sorted_option_combos("CC_SEX_AGE")
            .expect("读取性别×年龄选项组合失败")
            .into_iter()
            .map(|c| c.uid)
            .collect(),
        root_id,
        ou1_id,
    }
}

/// 性别×年龄 2×2 组合
pub fn create_sex_age_combo() -> CategoryCombo {
    CategoryCombo::new(
        "CC_SEX_AGE",
        "Sex and age",
        vec![
            Category::new(
                "SEX",
                "Sex",
                vec![CategoryOption::new("M", "M"), CategoryOption::new("F", "F")],
            ),
            Category::new(
                "AGE",
                "Age",
                vec![CategoryOption::new("U5", "U5"), CategoryOption::new("O5", "O5")],
            ),
        ],
    )
}

fn save_org_unit(metadata: &MetadataApi, uid: &str, parent_id: Option<i64>) -> i64 {
    metadata
        .save_organisation_unit(
            &OrganisationUnit {
                id: 0,
                uid: uid.to_string(),
                code: Some(format!("{}_CODE", uid)),
                name: format!("{} name", uid),
                parent_id,
                path: String::new(),
            },
            MergeMode::Replace,
        )
        .expect("保存组织机构失败")
}

fn save_element(metadata: &MetadataApi, uid: &str, value_type: ValueType, combo_id: i64, zero_sig: bool) -> i64 {
    metadata
        .save_data_element(
            &DataElement {
                id: 0,
                uid: uid.to_string(),
                code: Some(format!("{}_CODE", uid)),
                name: format!("{} name", uid),
                value_type,
                domain_type: DomainType::Aggregate,
                category_combo_id: combo_id,
                zero_is_significant: zero_sig,
                aggregation_levels: Vec::new(),
                option_set: None,
            },
            MergeMode::Replace,
        )
        .expect("保存数据元失败")
}

/// 构造一条数据值记录
pub fn record(data_element: &str, period: &str, org_unit: &str, value: &str) -> DataValueRecord {
    DataValueRecord {
        data_element: Some(data_element.to_string()),
        period: Some(period.to_string()),
        org_unit: Some(org_unit.to_string()),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

/// 读取单个数据值（按 UID 自然键，默认 COC / AOC）
pub fn stored_value(ctx: &TestContext, data_element: &str, period: &str, org_unit: &str) -> Option<String> {
    let conn = ctx.conn.lock().expect("获取连接失败");
    conn.query_row(
        r#"
        SELECT dv.value FROM data_value dv
        JOIN data_element de ON de.id = dv.data_element_id
        JOIN organisation_unit ou ON ou.id = dv.organisation_unit_id
        WHERE de.uid = ?1 AND dv.period = ?2 AND ou.uid = ?3
        "#,
        [data_element, period, org_unit],
        |row| row.get::<_, Option<String>>(0),
    )
    .ok()
    .flatten()
}

pub fn data_value_count(ctx: &TestContext) -> usize {
    ctx.values.count().expect("统计数据值失败")
}

pub fn registration_count(ctx: &TestContext) -> i64 {
    let conn = ctx.conn.lock().expect("获取连接失败");
    conn.query_row("SELECT COUNT(*) FROM complete_registration", [], |row| row.get(0))
        .expect("统计完成登记失败")
}
