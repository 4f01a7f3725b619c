// ==========================================
// 数据值导入系统 - 值 / 备注 / 录入人 语法校验
// ==========================================
// 职责: 按数据元值类型校验值格式；备注与录入人长度校验；零值有效性
// 返回: None = 合法；Some(原因) = 冲突原因
// ==========================================

use crate::domain::metadata::DataElement;
use crate::domain::types::ValueType;
use chrono::NaiveDate;

/// 备注最大长度（字符）
pub const MAX_COMMENT_LENGTH: usize = 50_000;

/// 录入人最大长度（字符）
pub const MAX_STORED_BY_LENGTH: usize = 255;

/// 文本值最大长度（字符）
pub const MAX_TEXT_LENGTH: usize = 50_000;

// ==========================================
// ValueValidator Trait
// ==========================================
// 实现者: DefaultValueValidator
pub trait ValueValidator: Send + Sync {
    /// 值是否符合数据元值类型（空值视为合法）
    fn validate_value(&self, value: Option<&str>, data_element: &DataElement) -> Option<String>;

    fn validate_comment(&self, comment: Option<&str>) -> Option<String>;

    fn validate_stored_by(&self, stored_by: Option<&str>) -> Option<String>;

    /// 数值零且数据元不保存零值
    fn is_zero_and_insignificant(&self, value: Option<&str>, data_element: &DataElement) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultValueValidator;

impl ValueValidator for DefaultValueValidator {
    fn validate_value(&self, value: Option<&str>, data_element: &DataElement) -> Option<String> {
        let value = match value.map(str::trim) {
            Some(v) if !v.is_empty() => v,
            _ => return None,
        };

        if let Some(options) = &data_element.option_set {
            if !options.iter().any(|o| o == value) {
                return Some("值不在数据元选项集中".to_string());
            }
            return None;
        }

        let valid = match data_element.value_type {
            ValueType::Number => value.parse::<f64>().map(f64::is_finite).unwrap_or(false),
            ValueType::Integer => value.parse::<i64>().is_ok(),
            ValueType::IntegerPositive => value.parse::<i64>().map(|v| v > 0).unwrap_or(false),
            ValueType::IntegerNegative => value.parse::<i64>().map(|v| v < 0).unwrap_or(false),
            ValueType::IntegerZeroOrPositive => value.parse::<i64>().map(|v| v >= 0).unwrap_or(false),
            ValueType::Percentage => value
                .parse::<f64>()
                .map(|v| (0.0..=100.0).contains(&v))
                .unwrap_or(false),
            ValueType::UnitInterval => value
                .parse::<f64>()
                .map(|v| (0.0..=1.0).contains(&v))
                .unwrap_or(false),
            ValueType::Boolean => matches!(value.to_lowercase().as_str(), "true" | "false"),
            ValueType::TrueOnly => value.eq_ignore_ascii_case("true"),
            ValueType::Date => NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok(),
            ValueType::Text => value.chars().count() <= MAX_TEXT_LENGTH,
            ValueType::LongText | ValueType::File => true,
        };

        if valid {
            None
        } else {
            Some(format!("值与数据元值类型不符: {}", data_element.value_type))
        }
    }

    fn validate_comment(&self, comment: Option<&str>) -> Option<String> {
        match comment {
            Some(c) if c.chars().count() > MAX_COMMENT_LENGTH => {
                Some(format!("备注长度超过 {} 个字符", MAX_COMMENT_LENGTH))
            }
            _ => None,
        }
    }

    fn validate_stored_by(&self, stored_by: Option<&str>) -> Option<String> {
        match stored_by {
            Some(s) if s.chars().count() > MAX_STORED_BY_LENGTH => {
                Some(format!("录入人长度超过 {} 个字符", MAX_STORED_BY_LENGTH))
            }
            _ => None,
        }
    }

    fn is_zero_and_insignificant(&self, value: Option<&str>, data_element: &DataElement) -> bool {
        if data_element.zero_is_significant || !data_element.value_type.is_numeric() {
            return false;
        }
        value
            .map(str::trim)
            .and_then(|v| v.parse::<f64>().ok())
            .map(|v| v == 0.0)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::DomainType;

    fn create_test_element(value_type: ValueType) -> DataElement {
        DataElement {
            id: 1,
            uid: "DE1".to_string(),
            code: None,
            name: "DE1".to_string(),
            value_type,
            domain_type: DomainType::Aggregate,
            category_combo_id: 1,
            zero_is_significant: false,
            aggregation_levels: Vec::new(),
            option_set: None,
        }
    }

    #[test]
    fn test_numeric_types() {
        let v = DefaultValueValidator;
        assert!(v.validate_value(Some("10"), &create_test_element(ValueType::Integer)).is_none());
        assert!(v.validate_value(Some("1.5"), &create_test_element(ValueType::Integer)).is_some());
        assert!(v.validate_value(Some("0"), &create_test_element(ValueType::IntegerPositive)).is_some());
        assert!(v.validate_value(Some("-3"), &create_test_element(ValueType::IntegerNegative)).is_none());
        assert!(v.validate_value(Some("101"), &create_test_element(ValueType::Percentage)).is_some());
        assert!(v.validate_value(Some("0.5"), &create_test_element(ValueType::UnitInterval)).is_none());
        assert!(v.validate_value(Some("abc"), &create_test_element(ValueType::Number)).is_some());
        assert!(v.validate_value(Some("NaN"), &create_test_element(ValueType::Number)).is_some());
    }

    #[test]
    fn test_other_types_and_blank() {
        let v = DefaultValueValidator;
        assert!(v.validate_value(Some("TRUE"), &create_test_element(ValueType::Boolean)).is_none());
        assert!(v.validate_value(Some("false"), &create_test_element(ValueType::TrueOnly)).is_some());
        assert!(v.validate_value(Some("2023-02-30"), &create_test_element(ValueType::Date)).is_some());
        assert!(v.validate_value(None, &create_test_element(ValueType::Integer)).is_none());
        assert!(v.validate_value(Some("  "), &create_test_element(ValueType::Integer)).is_none());
    }

    #[test]
    fn test_option_set_membership() {
        let v = DefaultValueValidator;
        let mut de = create_test_element(ValueType::Text);
        de.option_set = Some(vec!["A".to_string(), "B".to_string()]);
        assert!(v.validate_value(Some("A"), &de).is_none());
        assert!(v.validate_value(Some("C"), &de).is_some());
    }

    #[test]
    fn test_comment_and_stored_by_length() {
        let v = DefaultValueValidator;
        assert!(v.validate_comment(Some("ok")).is_none());
        assert!(v.validate_comment(Some(&"x".repeat(MAX_COMMENT_LENGTH + 1))).is_some());
        assert!(v.validate_stored_by(Some(&"u".repeat(MAX_STORED_BY_LENGTH + 1))).is_some());
        assert!(v.validate_stored_by(None).is_none());
    }

    #[test]
    fn test_zero_significance() {
        let v = DefaultValueValidator;
        let mut de = create_test_element(ValueType::Integer);
        assert!(v.is_zero_and_insignificant(Some("0"), &de));
        assert!(v.is_zero_and_insignificant(Some("0.0"), &de));
        assert!(!v.is_zero_and_insignificant(Some("3"), &de));
        de.zero_is_significant = true;
        assert!(!v.is_zero_and_insignificant(Some("0"), &de));
        assert!(!v.is_zero_and_insignificant(Some("0"), &create_test_element(ValueType::Text)));
    }
}
