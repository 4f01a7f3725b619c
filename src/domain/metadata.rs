// ==========================================
// 数据值导入系统 - 元数据领域模型
// ==========================================
// 职责: 数据元 / 数据集 / 组织机构 / 周期
// 用途: 导入时只读，由元数据维护写入
// ==========================================

use crate::domain::types::{DomainType, PeriodType, ValueType};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

// ==========================================
// DataElement - 数据元
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataElement {
    pub id: i64,
    pub uid: String,
    pub code: Option<String>,
    pub name: String,
    pub value_type: ValueType,
    pub domain_type: DomainType,
    pub category_combo_id: i64,
    pub zero_is_significant: bool,
    pub aggregation_levels: Vec<i32>,
    /// 选项集编码（None 表示不受选项集约束）
    pub option_set: Option<Vec<String>>,
}

// ==========================================
// DataSet - 数据集
// ==========================================
// 数据元的允许周期类型 / 属性组合 / 组织机构分配均经由数据集派生
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSet {
    pub id: i64,
    pub uid: String,
    pub code: Option<String>,
    pub name: String,
    pub period_type: PeriodType,
    pub category_combo_id: i64,
    pub open_future_periods: i32,
    pub data_element_ids: Vec<i64>,
    pub source_ids: Vec<i64>,
}

// ==========================================
// OrganisationUnit - 组织机构
// ==========================================
// path: 祖先链路，形如 "/ROOT/DISTRICT/FACILITY"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganisationUnit {
    pub id: i64,
    pub uid: String,
    pub code: Option<String>,
    pub name: String,
    pub parent_id: Option<i64>,
    pub path: String,
}

impl OrganisationUnit {
    /// 路径中的祖先 UID（含自身）
    pub fn ancestor_uids(&self) -> impl Iterator<Item = &str> {
        self.path.split('/').filter(|s| !s.is_empty())
    }

    /// 是否位于任一根节点之下（含根节点自身）
    pub fn is_descendant_of_any(&self, root_uids: &[String]) -> bool {
        self.ancestor_uids()
            .any(|uid| root_uids.iter().any(|root| root == uid))
    }
}

// ==========================================
// Period - 周期
// ==========================================
// ISO 表示: 20230115(日) 2023W3(周) 202301(月) 202301B(双月) 2023Q1(季) 2023S1(半年) 2023(年)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub iso: String,
    pub period_type: PeriodType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Period {
    /// 解析 ISO 周期，无法识别时返回 None
    pub fn parse_iso(iso: &str) -> Option<Period> {
        let iso = iso.trim();
        if iso.len() < 4 || !iso.is_ascii() {
            return None;
        }

        let year: i32 = iso[..4].parse().ok()?;
        let rest = &iso[4..];

        let (period_type, start, end) = if rest.is_empty() {
            let start = NaiveDate::from_ymd_opt(year, 1, 1)?;
            let end = NaiveDate::from_ymd_opt(year, 12, 31)?;
            (PeriodType::Yearly, start, end)
        } else if let Some(week) = rest.strip_prefix('W') {
            let week: u32 = week.parse().ok()?;
            let start = NaiveDate::from_isoywd_opt(year, week, chrono::Weekday::Mon)?;
            (PeriodType::Weekly, start, start + Duration::days(6))
        } else if let Some(quarter) = rest.strip_prefix('Q') {
            let quarter: u32 = quarter.parse().ok()?;
            if !(1..=4).contains(&quarter) {
                return None;
            }
            let start_month = (quarter - 1) * 3 + 1;
            let start = NaiveDate::from_ymd_opt(year, start_month, 1)?;
            (PeriodType::Quarterly, start, month_end(year, start_month + 2)?)
        } else if let Some(half) = rest.strip_prefix('S') {
            let half: u32 = half.parse().ok()?;
            if !(1..=2).contains(&half) {
                return None;
            }
            let start_month = (half - 1) * 6 + 1;
            let start = NaiveDate::from_ymd_opt(year, start_month, 1)?;
            (PeriodType::SixMonthly, start, month_end(year, start_month + 5)?)
        } else if rest.len() == 3 && rest.ends_with('B') {
            let bi_month: u32 = rest[..2].parse().ok()?;
            if !(1..=6).contains(&bi_month) {
                return None;
            }
            let start_month = (bi_month - 1) * 2 + 1;
            let start = NaiveDate::from_ymd_opt(year, start_month, 1)?;
            (PeriodType::BiMonthly, start, month_end(year, start_month + 1)?)
        } else if rest.len() == 2 {
            let month: u32 = rest.parse().ok()?;
            let start = NaiveDate::from_ymd_opt(year, month, 1)?;
            (PeriodType::Monthly, start, month_end(year, month)?)
        } else if rest.len() == 4 {
            let month: u32 = rest[..2].parse().ok()?;
            let day: u32 = rest[2..].parse().ok()?;
            let date = NaiveDate::from_ymd_opt(year, month, day)?;
            (PeriodType::Daily, date, date)
        } else {
            return None;
        };

        Some(Period {
            iso: iso.to_string(),
            period_type,
            start_date: start,
            end_date: end,
        })
    }

    /// 周期是否在未来（开始日期晚于今天）
    pub fn is_future(&self, today: NaiveDate) -> bool {
        self.start_date > today
    }
}

fn month_end(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1).and_then(|d| d.pred_opt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_monthly() {
        let p = Period::parse_iso("202302").unwrap();
        assert_eq!(p.period_type, PeriodType::Monthly);
        assert_eq!(p.start_date, NaiveDate::from_ymd_opt(2023, 2, 1).unwrap());
        assert_eq!(p.end_date, NaiveDate::from_ymd_opt(2023, 2, 28).unwrap());
    }

    #[test]
    fn test_parse_other_types() {
        assert_eq!(Period::parse_iso("2023").unwrap().period_type, PeriodType::Yearly);
        assert_eq!(Period::parse_iso("2023Q4").unwrap().end_date, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
        assert_eq!(Period::parse_iso("2023S2").unwrap().period_type, PeriodType::SixMonthly);
        assert_eq!(Period::parse_iso("202303B").unwrap().start_date, NaiveDate::from_ymd_opt(2023, 5, 1).unwrap());
        assert_eq!(Period::parse_iso("2023W1").unwrap().period_type, PeriodType::Weekly);
        assert_eq!(Period::parse_iso("20230115").unwrap().period_type, PeriodType::Daily);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(Period::parse_iso("").is_none());
        assert!(Period::parse_iso("202313").is_none());
        assert!(Period::parse_iso("2023Q5").is_none());
        assert!(Period::parse_iso("abcd").is_none());
    }

    #[test]
    fn test_is_future() {
        let today = NaiveDate::from_ymd_opt(2023, 6, 15).unwrap();
        assert!(!Period::parse_iso("202306").unwrap().is_future(today));
        assert!(Period::parse_iso("202307").unwrap().is_future(today));
    }

    #[test]
    fn test_org_unit_hierarchy() {
        let ou = OrganisationUnit {
            id: 3,
            uid: "FAC".to_string(),
            code: None,
            name: "Facility".to_string(),
            parent_id: Some(2),
            path: "/ROOT/DIST/FAC".to_string(),
        };
        assert!(ou.is_descendant_of_any(&["DIST".to_string()]));
        assert!(ou.is_descendant_of_any(&["FAC".to_string()]));
        assert!(!ou.is_descendant_of_any(&["OTHER".to_string()]));
    }
}
