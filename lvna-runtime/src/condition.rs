//! # Condition 模块
//!
//! `case` / `or_case` 的比较运算。
//!
//! 两侧的值都是变量替换之后的文本。`is` / `is not` 按文本比较，
//! 其余运算符要求两侧都是数字，否则判定为假。

use serde::{Deserialize, Serialize};

/// 比较运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Is,
    IsNot,
    MoreThan,
    SameOrMoreThan,
    LessThan,
    SameOrLessThan,
    /// 右侧写作 `"a and b"`，闭区间
    Between,
    NotBetween,
}

impl CompareOp {
    const NAMES: [(&'static str, CompareOp); 8] = [
        ("is", CompareOp::Is),
        ("is not", CompareOp::IsNot),
        ("more than", CompareOp::MoreThan),
        ("same or more than", CompareOp::SameOrMoreThan),
        ("less than", CompareOp::LessThan),
        ("same or less than", CompareOp::SameOrLessThan),
        ("between", CompareOp::Between),
        ("not between", CompareOp::NotBetween),
    ];

    /// 解析脚本中的运算符（大小写不敏感，多余空白会被合并）
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.split_whitespace().collect::<Vec<_>>().join(" ");
        Self::NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(&normalized))
            .map(|(_, op)| *op)
    }

    pub fn as_str(&self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(_, op)| op == self)
            .map(|(n, _)| *n)
            .unwrap_or("is")
    }

    /// 计算比较结果
    pub fn evaluate(&self, left: &str, right: &str) -> bool {
        match self {
            Self::Is => left == right,
            Self::IsNot => left != right,
            Self::MoreThan => compare_numbers(left, right, |a, b| a > b),
            Self::SameOrMoreThan => compare_numbers(left, right, |a, b| a >= b),
            Self::LessThan => compare_numbers(left, right, |a, b| a < b),
            Self::SameOrLessThan => compare_numbers(left, right, |a, b| a <= b),
            Self::Between => in_range(left, right).unwrap_or(false),
            Self::NotBetween => in_range(left, right).map(|inside| !inside).unwrap_or(false),
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn compare_numbers(left: &str, right: &str, op: impl Fn(f64, f64) -> bool) -> bool {
    match (parse_number(left), parse_number(right)) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

/// 解析 `"a and b"`，返回左值是否落在闭区间内
///
/// 格式错误或非数字时返回 `None`。
fn in_range(value: &str, range: &str) -> Option<bool> {
    let value = parse_number(value)?;
    let parts: Vec<&str> = range.split_whitespace().collect();
    let [low, and, high] = parts.as_slice() else {
        return None;
    };
    if !and.eq_ignore_ascii_case("and") {
        return None;
    }
    let (low, high) = (parse_number(low)?, parse_number(high)?);
    Some(value >= low && value <= high)
}

pub(crate) fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}
