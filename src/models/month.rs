use crate::error::InvoiceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 日历月份 (按日历顺序排序)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Month {
    January,
    February,
    March,
    April,
    May,
    June,
    July,
    August,
    September,
    October,
    November,
    December,
}

impl Month {
    pub const ALL: [Month; 12] = [
        Month::January,
        Month::February,
        Month::March,
        Month::April,
        Month::May,
        Month::June,
        Month::July,
        Month::August,
        Month::September,
        Month::October,
        Month::November,
        Month::December,
    ];

    /// 1..=12
    pub fn number(self) -> u32 {
        self as u32 + 1
    }

    pub fn from_number(n: u32) -> Option<Self> {
        n.checked_sub(1)
            .and_then(|idx| Self::ALL.get(idx as usize))
            .copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Month::January => "January",
            Month::February => "February",
            Month::March => "March",
            Month::April => "April",
            Month::May => "May",
            Month::June => "June",
            Month::July => "July",
            Month::August => "August",
            Month::September => "September",
            Month::October => "October",
            Month::November => "November",
            Month::December => "December",
        }
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Month {
    type Err = InvoiceError;

    /// 英文全称, 不区分大小写
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| InvoiceError::InvalidRange(format!("unknown month name '{}'", s)))
    }
}

impl TryFrom<String> for Month {
    type Error = InvoiceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// 解析账期区间 (含首尾), 返回按日历顺序排列的月份
pub fn month_range(from: &str, to: &str) -> Result<Vec<Month>, InvoiceError> {
    let start: Month = from.parse()?;
    let end: Month = to.parse()?;
    if start > end {
        return Err(InvoiceError::InvalidRange(format!(
            "period starts in {} but ends in {}",
            start, end
        )));
    }

    Ok(Month::ALL
        .iter()
        .copied()
        .filter(|m| *m >= start && *m <= end)
        .collect())
}
