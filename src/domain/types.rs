// ==========================================
// 数据值导入系统 - 领域类型定义
// ==========================================
// 职责: 标识方案、导入策略、值类型、周期类型等基础枚举
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 标识方案 (Id Scheme)
// ==========================================
// 外部记录通过哪个属性引用内部元数据
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdScheme {
    #[default]
    Uid,
    Code,
    Name,
    Id,
}

impl IdScheme {
    /// 对应的数据库列名
    pub fn column(&self) -> &'static str {
        match self {
            IdScheme::Uid => "uid",
            IdScheme::Code => "code",
            IdScheme::Name => "name",
            IdScheme::Id => "id",
        }
    }
}

impl fmt::Display for IdScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdScheme::Uid => write!(f, "UID"),
            IdScheme::Code => write!(f, "CODE"),
            IdScheme::Name => write!(f, "NAME"),
            IdScheme::Id => write!(f, "ID"),
        }
    }
}

impl FromStr for IdScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "UID" => Ok(IdScheme::Uid),
            "CODE" => Ok(IdScheme::Code),
            "NAME" => Ok(IdScheme::Name),
            "ID" => Ok(IdScheme::Id),
            other => Err(format!("未知标识方案: {}", other)),
        }
    }
}

// ==========================================
// 导入策略 (Import Strategy)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportStrategy {
    Create,
    Update,
    #[default]
    CreateAndUpdate,
    Delete,
}

impl ImportStrategy {
    /// 策略是否允许新增
    pub fn allows_create(&self) -> bool {
        matches!(self, ImportStrategy::Create | ImportStrategy::CreateAndUpdate)
    }

    /// 策略是否允许更新
    pub fn allows_update(&self) -> bool {
        matches!(self, ImportStrategy::Update | ImportStrategy::CreateAndUpdate)
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, ImportStrategy::Delete)
    }
}

impl fmt::Display for ImportStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportStrategy::Create => write!(f, "CREATE"),
            ImportStrategy::Update => write!(f, "UPDATE"),
            ImportStrategy::CreateAndUpdate => write!(f, "CREATE_AND_UPDATE"),
            ImportStrategy::Delete => write!(f, "DELETE"),
        }
    }
}

impl FromStr for ImportStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CREATE" | "NEW" => Ok(ImportStrategy::Create),
            "UPDATE" | "UPDATES" => Ok(ImportStrategy::Update),
            "CREATE_AND_UPDATE" | "NEW_AND_UPDATES" => Ok(ImportStrategy::CreateAndUpdate),
            "DELETE" | "DELETES" => Ok(ImportStrategy::Delete),
            other => Err(format!("未知导入策略: {}", other)),
        }
    }
}

// ==========================================
// 值类型 (Value Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    #[default]
    Number,
    Integer,
    IntegerPositive,
    IntegerNegative,
    IntegerZeroOrPositive,
    Percentage,
    UnitInterval,
    Text,
    LongText,
    Boolean,
    TrueOnly,
    Date,
    File,
}

impl ValueType {
    /// 是否为数值类型（参与零值有效性判定）
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ValueType::Number
                | ValueType::Integer
                | ValueType::IntegerPositive
                | ValueType::IntegerNegative
                | ValueType::IntegerZeroOrPositive
                | ValueType::Percentage
                | ValueType::UnitInterval
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Number => "NUMBER",
            ValueType::Integer => "INTEGER",
            ValueType::IntegerPositive => "INTEGER_POSITIVE",
            ValueType::IntegerNegative => "INTEGER_NEGATIVE",
            ValueType::IntegerZeroOrPositive => "INTEGER_ZERO_OR_POSITIVE",
            ValueType::Percentage => "PERCENTAGE",
            ValueType::UnitInterval => "UNIT_INTERVAL",
            ValueType::Text => "TEXT",
            ValueType::LongText => "LONG_TEXT",
            ValueType::Boolean => "BOOLEAN",
            ValueType::TrueOnly => "TRUE_ONLY",
            ValueType::Date => "DATE",
            ValueType::File => "FILE",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = match s.trim().to_uppercase().as_str() {
            "NUMBER" => ValueType::Number,
            "INTEGER" => ValueType::Integer,
            "INTEGER_POSITIVE" => ValueType::IntegerPositive,
            "INTEGER_NEGATIVE" => ValueType::IntegerNegative,
            "INTEGER_ZERO_OR_POSITIVE" => ValueType::IntegerZeroOrPositive,
            "PERCENTAGE" => ValueType::Percentage,
            "UNIT_INTERVAL" => ValueType::UnitInterval,
            "TEXT" => ValueType::Text,
            "LONG_TEXT" => ValueType::LongText,
            "BOOLEAN" => ValueType::Boolean,
            "TRUE_ONLY" => ValueType::TrueOnly,
            "DATE" => ValueType::Date,
            "FILE" => ValueType::File,
            other => return Err(format!("未知值类型: {}", other)),
        };
        Ok(value)
    }
}

// ==========================================
// 数据元域类型 (Domain Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainType {
    #[default]
    Aggregate,
    Tracker,
}

impl fmt::Display for DomainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainType::Aggregate => write!(f, "AGGREGATE"),
            DomainType::Tracker => write!(f, "TRACKER"),
        }
    }
}

impl FromStr for DomainType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "AGGREGATE" => Ok(DomainType::Aggregate),
            "TRACKER" => Ok(DomainType::Tracker),
            other => Err(format!("未知域类型: {}", other)),
        }
    }
}

// ==========================================
// 周期类型 (Period Type)
// ==========================================
// 频率类别，数据集按周期类型采集
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodType {
    Daily,
    Weekly,
    Monthly,
    BiMonthly,
    Quarterly,
    SixMonthly,
    Yearly,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Daily => "DAILY",
            PeriodType::Weekly => "WEEKLY",
            PeriodType::Monthly => "MONTHLY",
            PeriodType::BiMonthly => "BI_MONTHLY",
            PeriodType::Quarterly => "QUARTERLY",
            PeriodType::SixMonthly => "SIX_MONTHLY",
            PeriodType::Yearly => "YEARLY",
        }
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PeriodType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DAILY" => Ok(PeriodType::Daily),
            "WEEKLY" => Ok(PeriodType::Weekly),
            "MONTHLY" => Ok(PeriodType::Monthly),
            "BI_MONTHLY" | "BIMONTHLY" => Ok(PeriodType::BiMonthly),
            "QUARTERLY" => Ok(PeriodType::Quarterly),
            "SIX_MONTHLY" | "SIXMONTHLY" => Ok(PeriodType::SixMonthly),
            "YEARLY" => Ok(PeriodType::Yearly),
            other => Err(format!("未知周期类型: {}", other)),
        }
    }
}

// ==========================================
// 导入状态 (Import Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportStatus {
    Success,
    Error,
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportStatus::Success => write!(f, "SUCCESS"),
            ImportStatus::Error => write!(f, "ERROR"),
        }
    }
}

// ==========================================
// 合并模式 (Merge Mode)
// ==========================================
// REPLACE: 所有字段以传入对象为准
// MERGE: 仅覆盖传入对象显式给出的字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeMode {
    #[default]
    Replace,
    Merge,
}
