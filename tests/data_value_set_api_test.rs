// ==========================================
// DataValueSetApi 集成测试
// ==========================================
// 测试目标: 文件导入（CSV / JSON）、后台任务与通知、CSV 导出再导入
// ==========================================

mod test_helpers;

use datavalue_import::api::ApiError;
use datavalue_import::config::ImportOptions;
use datavalue_import::domain::{DataExportParams, DataValueSetHeader};
use datavalue_import::domain::types::ImportStatus;
use datavalue_import::engine::NotificationLevel;
use std::io::Write;
use tempfile::NamedTempFile;
use test_helpers::*;

const CSV_BODY: &str = "dataelement,period,orgunit,categoryoptioncombo,attributeoptioncombo,value,storedby,lastupdated,comment,followup\n\
DE1,202301,OU1,,,10,clerk,2023-02-01,,false\n\
DE1,202302,OU1,,,11,,,checked,\n\
DE_TEXT,202301,OU1,,,free text,,,,\n\
DE1,202303,OU1,,,,,,,\n\
NOPE,202301,OU1,,,1,,,,\n";

fn write_temp(suffix: &str, body: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().expect("创建临时文件失败");
    file.write_all(body.as_bytes()).expect("写入临时文件失败");
    file
}

fn json_body(period: &str) -> String {
    r#"{
        "dataSet": "DS1",
        "period": "PERIOD",
        "orgUnit": "OU1",
        "completeDate": "2023-02-03",
        "dataValues": [
            {"dataElement": "DE1", "value": "1"},
            {"dataElement": "DE_TEXT", "value": "note", "comment": "c"}
        ]
    }"#
    .replace("PERIOD", period)
}

#[test]
fn test_import_csv_file() {
    let ctx = setup();
    let file = write_temp(".csv", CSV_BODY);

    let summary = ctx
        .api
        .import_csv(file.path(), DataValueSetHeader::default(), &ImportOptions::default())
        .unwrap();

    assert_eq!(summary.status, ImportStatus::Success);
    assert_eq!(summary.scanned, 5);
    assert_eq!(summary.import_count.imported, 3);
    // 空值标记落在不存在的行上、未解析数据元，均计入 ignored
    assert_eq!(summary.import_count.ignored, 2);
    assert_eq!(summary.conflicts.len(), 1);
    assert_eq!(data_value_count(&ctx), 3);

    let conn = ctx.conn.lock().unwrap();
    let stored_by: String = conn
        .query_row(
            "SELECT stored_by FROM data_value WHERE period = '202301' AND value = '10'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(stored_by, "clerk");
}

#[test]
fn test_csv_blank_value_deletes_existing_row() {
    let ctx = setup();
    let file = write_temp(".csv", CSV_BODY);
    ctx.api
        .import_csv(file.path(), DataValueSetHeader::default(), &ImportOptions::default())
        .unwrap();
    assert_eq!(data_value_count(&ctx), 3);

    let delete = write_temp(
        ".csv",
        "dataelement,period,orgunit,categoryoptioncombo,attributeoptioncombo,value,storedby,lastupdated,comment,followup\n\
DE1,202301,OU1,,,,,,,\n",
    );
    let summary = ctx
        .api
        .import_csv(delete.path(), DataValueSetHeader::default(), &ImportOptions::default())
        .unwrap();
    assert_eq!(summary.import_count.deleted, 1);
    assert_eq!(stored_value(&ctx, "DE1", "202301", "OU1"), None);
    assert_eq!(data_value_count(&ctx), 2);
}

#[test]
fn test_import_json_file_with_completion() {
    let ctx = setup();
    let file = write_temp(".json", &json_body("202301"));

    let summary = ctx.api.import_file(file.path(), &ImportOptions::default()).unwrap();
    assert!(summary.conflicts.is_empty(), "{:?}", summary.conflicts);
    assert_eq!(summary.import_count.imported, 2);
    assert!(summary.completion_applied.is_some());
    assert_eq!(registration_count(&ctx), 1);
}

#[test]
fn test_malformed_json_is_rejected() {
    let ctx = setup();
    let file = write_temp(".json", "{\"dataValues\": [");
    assert!(matches!(
        ctx.api.import_file(file.path(), &ImportOptions::default()),
        Err(ApiError::ImportError(_))
    ));
    assert_eq!(data_value_count(&ctx), 0);
}

#[test]
fn test_csv_export_reimports_without_conflicts() {
    let ctx = setup();
    let file = write_temp(".csv", CSV_BODY);
    ctx.api
        .import_csv(file.path(), DataValueSetHeader::default(), &ImportOptions::default())
        .unwrap();

    let params = DataExportParams {
        data_sets: vec!["DS1".to_string()],
        periods: vec!["202301".to_string(), "202302".to_string()],
        org_units: vec!["OU1".to_string()],
    };
    let mut exported = Vec::new();
    assert_eq!(ctx.api.export_csv(&params, &mut exported).unwrap(), 3);

    let reimport = write_temp(".csv", &String::from_utf8(exported).unwrap());
    let summary = ctx
        .api
        .import_csv(reimport.path(), DataValueSetHeader::default(), &ImportOptions::default())
        .unwrap();
    assert!(summary.conflicts.is_empty(), "{:?}", summary.conflicts);
    assert_eq!(summary.import_count.updated, 3);
    assert_eq!(data_value_count(&ctx), 3);
}

// ==========================================
// 后台任务
// ==========================================

#[tokio::test]
async fn test_background_import_with_notifications() {
    let ctx = setup();
    let file = write_temp(".json", &json_body("202301"));

    let task = ctx
        .api
        .start_import_task(file.path().to_path_buf(), ImportOptions::default());
    let summary = task.handle.await.expect("导入任务执行失败");

    assert_eq!(summary.import_count.imported, 2);
    assert!(ctx.api.is_task_completed(&task.id));
    assert_eq!(ctx.api.task_summary(&task.id).unwrap(), summary);

    let notifications = ctx.api.task_notifications(&task.id);
    assert!(notifications.iter().all(|n| n.level == NotificationLevel::Info));
    assert!(notifications.last().map(|n| n.completed).unwrap_or(false));
}

#[tokio::test]
async fn test_import_files_in_parallel() {
    let ctx = setup();
    let csv = write_temp(".csv", CSV_BODY);
    let json = write_temp(".json", &json_body("202304"));

    let results = ctx
        .api
        .import_files(
            vec![
                csv.path().to_path_buf(),
                json.path().to_path_buf(),
                "/nonexistent/values.csv".into(),
            ],
            &ImportOptions::default(),
        )
        .await;

    assert_eq!(results.len(), 3);
    let summaries: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
    assert!(summaries[0].is_success());
    assert!(summaries[1].is_success());
    assert_eq!(summaries[2].status, ImportStatus::Error);
    assert_eq!(data_value_count(&ctx), 5);
    assert_eq!(registration_count(&ctx), 1);
}
