// ==========================================
// 数据值导入系统 - 数据集完成登记
// ==========================================
// 职责: 每次导入至多一次，按 (数据集, 周期, 组织机构, 属性选项组合) 查找登记；
//       存在则原地更新 date / stored_by（保留 ID），否则插入
// 红线: 周期或组织机构缺失只放弃完成登记，不影响其余导入
// ==========================================

use crate::domain::category::CategoryOptionCombo;
use crate::domain::data_value::{CompleteDataSetRegistration, ImportConflict};
use crate::domain::metadata::{DataSet, OrganisationUnit, Period};
use crate::engine::collaborators::RegistrationStore;
use crate::repository::error::RepositoryResult;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    Created(NaiveDate),
    Updated(NaiveDate),
    Conflict(ImportConflict),
}

/// 完成登记请求（集合级上下文）
pub struct CompletionRequest<'a> {
    pub data_set: &'a DataSet,
    pub period: Option<&'a Period>,
    pub org_unit: Option<&'a OrganisationUnit>,
    pub attribute_option_combo: &'a CategoryOptionCombo,
    pub complete_date: NaiveDate,
    pub stored_by: &'a str,
}

pub struct CompletionHandler {
    store: Arc<dyn RegistrationStore>,
}

impl CompletionHandler {
    pub fn new(store: Arc<dyn RegistrationStore>) -> Self {
        Self { store }
    }

    /// 应用完成登记
    ///
    /// # 参数
    /// - `dry_run`: 只判定 新增 / 更新，不写存储
    pub fn complete(&self, request: &CompletionRequest<'_>, dry_run: bool) -> RepositoryResult<CompletionOutcome> {
        let (period, org_unit) = match (request.period, request.org_unit) {
            (Some(p), Some(ou)) => (p, ou),
            _ => {
                return Ok(CompletionOutcome::Conflict(ImportConflict::new(
                    request.data_set.uid.clone(),
                    "完成登记需要周期与组织机构，已跳过",
                )))
            }
        };

        let existing = self.store.find_registration(
            request.data_set.id,
            &period.iso,
            org_unit.id,
            request.attribute_option_combo.id,
        )?;

        match existing {
            Some(mut registration) => {
                registration.date = request.complete_date;
                registration.stored_by = request.stored_by.to_string();
                if !dry_run {
                    self.store.update_registration(&registration)?;
                }
                info!(
                    data_set = %request.data_set.uid,
                    period = %period.iso,
                    org_unit = %org_unit.uid,
                    date = %request.complete_date,
                    dry_run,
                    "更新数据集完成登记"
                );
                Ok(CompletionOutcome::Updated(request.complete_date))
            }
            None => {
                let registration = CompleteDataSetRegistration {
                    id: 0,
                    data_set_id: request.data_set.id,
                    period: period.iso.clone(),
                    org_unit_id: org_unit.id,
                    attribute_option_combo_id: request.attribute_option_combo.id,
                    date: request.complete_date,
                    stored_by: request.stored_by.to_string(),
                    accepted: false,
                };
                if !dry_run {
                    self.store.insert_registration(&registration)?;
                }
                info!(
                    data_set = %request.data_set.uid,
                    period = %period.iso,
                    org_unit = %org_unit.uid,
                    date = %request.complete_date,
                    dry_run,
                    "新增数据集完成登记"
                );
                Ok(CompletionOutcome::Created(request.complete_date))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::domain::types::PeriodType;
    use crate::repository::RegistrationRepository;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    fn setup() -> (CompletionHandler, Arc<RegistrationRepository>) {
        let conn = open_in_memory().expect("创建测试数据库失败");
        conn.execute_batch(
            r#"
            INSERT INTO category_combo (id, uid, name) VALUES (1, 'CC_DEFAULT', 'default');
            INSERT INTO category_option_combo (id, uid, name, category_combo_id) VALUES (1, 'COC_DEFAULT', 'default', 1);
            INSERT INTO organisation_unit (id, uid, name, path) VALUES (1, 'OU1', 'OU1', '/OU1');
            INSERT INTO data_set (id, uid, name, period_type, category_combo_id) VALUES (1, 'DS1', 'DS1', 'MONTHLY', 1);
            "#,
        )
        .expect("初始化测试数据失败");
        let repo = Arc::new(RegistrationRepository::new(Arc::new(Mutex::new(conn))));
        (CompletionHandler::new(repo.clone()), repo)
    }

    fn fixtures() -> (DataSet, Period, OrganisationUnit, CategoryOptionCombo) {
        let data_set = DataSet {
            id: 1,
            uid: "DS1".to_string(),
            code: None,
            name: "DS1".to_string(),
            period_type: PeriodType::Monthly,
            category_combo_id: 1,
            open_future_periods: 0,
            data_element_ids: Vec::new(),
            source_ids: Vec::new(),
        };
        let period = Period::parse_iso("202301").unwrap();
        let org_unit = OrganisationUnit {
            id: 1,
            uid: "OU1".to_string(),
            code: None,
            name: "OU1".to_string(),
            parent_id: None,
            path: "/OU1".to_string(),
        };
        let aoc = CategoryOptionCombo {
            id: 1,
            uid: "COC_DEFAULT".to_string(),
            code: None,
            name: "default".to_string(),
            category_combo_id: 1,
            options: BTreeSet::new(),
        };
        (data_set, period, org_unit, aoc)
    }

    #[test]
    fn test_complete_twice_updates_single_row() {
        let (handler, repo) = setup();
        let (ds, period, ou, aoc) = fixtures();
        let first = NaiveDate::from_ymd_opt(2023, 2, 1).unwrap();
        let second = NaiveDate::from_ymd_opt(2023, 2, 9).unwrap();

        let mut request = CompletionRequest {
            data_set: &ds,
            period: Some(&period),
            org_unit: Some(&ou),
            attribute_option_combo: &aoc,
            complete_date: first,
            stored_by: "admin",
        };
        assert_eq!(handler.complete(&request, false).unwrap(), CompletionOutcome::Created(first));
        request.complete_date = second;
        assert_eq!(handler.complete(&request, false).unwrap(), CompletionOutcome::Updated(second));

        assert_eq!(repo.count().unwrap(), 1);
        let stored = repo.find_registration(1, "202301", 1, 1).unwrap().unwrap();
        assert_eq!(stored.date, second);
    }

    #[test]
    fn test_missing_org_unit_is_conflict() {
        let (handler, repo) = setup();
        let (ds, period, _, aoc) = fixtures();
        let request = CompletionRequest {
            data_set: &ds,
            period: Some(&period),
            org_unit: None,
            attribute_option_combo: &aoc,
            complete_date: NaiveDate::from_ymd_opt(2023, 2, 1).unwrap(),
            stored_by: "admin",
        };
        assert!(matches!(handler.complete(&request, false).unwrap(), CompletionOutcome::Conflict(_)));
        assert_eq!(repo.count().unwrap(), 0);
    }

    #[test]
    fn test_dry_run_does_not_write() {
        let (handler, repo) = setup();
        let (ds, period, ou, aoc) = fixtures();
        let request = CompletionRequest {
            data_set: &ds,
            period: Some(&period),
            org_unit: Some(&ou),
            attribute_option_combo: &aoc,
            complete_date: NaiveDate::from_ymd_opt(2023, 2, 1).unwrap(),
            stored_by: "admin",
        };
        assert!(matches!(handler.complete(&request, true).unwrap(), CompletionOutcome::Created(_)));
        assert_eq!(repo.count().unwrap(), 0);
    }
}
