use crate::error::InvoiceError;
use crate::models::Month;
use bigdecimal::{BigDecimal, Zero};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

/// 发行明细行 (t_irec_issuance, 每设备每月一行)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct IssuanceRow {
    pub device_id: String,
    pub project: String,
    pub capacity: BigDecimal,
    pub month: i32,
    pub issued: BigDecimal,
    pub is_partial: bool,
    pub candidates: Option<String>, // 文本形式, 如 "[120.5, 80]"
}

/// 单月发行量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthIssuance {
    pub issued: BigDecimal,
    pub partial: bool,
    pub candidates: Vec<BigDecimal>,
}

impl MonthIssuance {
    pub fn settled(issued: BigDecimal) -> Self {
        Self {
            issued,
            partial: false,
            candidates: Vec::new(),
        }
    }

    pub fn partial(default: BigDecimal, candidates: Vec<BigDecimal>) -> Self {
        Self {
            issued: default,
            partial: true,
            candidates,
        }
    }
}

/// 设备在账期内的发行数据 (每个 设备+项目 一条)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceIssuance {
    pub device_id: String,
    pub capacity: BigDecimal,
    pub project: String,
    pub months: IndexMap<Month, MonthIssuance>,
}

impl DeviceIssuance {
    pub fn new(device_id: impl Into<String>, capacity: BigDecimal, project: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            capacity,
            project: project.into(),
            months: IndexMap::new(),
        }
    }

    pub fn with_month(mut self, month: Month, issued: BigDecimal) -> Self {
        self.months.insert(month, MonthIssuance::settled(issued));
        self
    }

    pub fn with_partial(mut self, month: Month, default: BigDecimal, candidates: Vec<BigDecimal>) -> Self {
        self.months.insert(month, MonthIssuance::partial(default, candidates));
        self
    }

    /// 总发行量: 始终由各月数值求和, 不单独存储
    pub fn total_issued(&self) -> BigDecimal {
        self.months
            .values()
            .fold(BigDecimal::zero(), |acc, m| acc + &m.issued)
    }

    pub fn issued_in(&self, month: Month) -> BigDecimal {
        self.months
            .get(&month)
            .map(|m| m.issued.clone())
            .unwrap_or_else(BigDecimal::zero)
    }

    /// 账期内是否存在待确认的 partial 月份
    pub fn has_partial_in(&self, months: &[Month]) -> bool {
        months
            .iter()
            .any(|m| self.months.get(m).map(|mi| mi.partial).unwrap_or(false))
    }

    pub fn validate(&self) -> Result<(), InvoiceError> {
        if self.device_id.trim().is_empty() {
            return Err(InvoiceError::InvalidDevice("device id is empty".to_string()));
        }
        if self.capacity < BigDecimal::zero() {
            return Err(InvoiceError::InvalidDevice(format!(
                "device {} has negative capacity {}",
                self.device_id, self.capacity
            )));
        }
        for (month, mi) in &self.months {
            if mi.issued < BigDecimal::zero() {
                return Err(InvoiceError::InvalidDevice(format!(
                    "device {} has negative issuance {} in {}",
                    self.device_id, mi.issued, month
                )));
            }
        }
        Ok(())
    }
}

/// 严格解析候选值文本: `[a, b, ...]`, 允许空列表
pub fn parse_candidates(raw: &str) -> Result<Vec<BigDecimal>, InvoiceError> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| InvoiceError::InvalidCandidates(format!("expected a bracketed list, got '{}'", raw)))?;

    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(',')
        .map(|part| {
            let part = part.trim();
            BigDecimal::from_str(part)
                .map_err(|_| InvoiceError::InvalidCandidates(format!("'{}' is not a decimal in '{}'", part, raw)))
        })
        .collect()
}

/// 将长表明细按 (设备, 项目) 透视为 DeviceIssuance
/// 账期内缺失的月份补 0, 同一月份多行时累加
pub fn pivot_issuance_rows(rows: Vec<IssuanceRow>, months: &[Month]) -> Result<Vec<DeviceIssuance>, InvoiceError> {
    let mut grouped: IndexMap<(String, String), DeviceIssuance> = IndexMap::new();

    for row in rows {
        let month = Month::from_number(row.month as u32).ok_or_else(|| {
            InvoiceError::InvalidRange(format!("device {} has month number {}", row.device_id, row.month))
        })?;
        if !months.contains(&month) {
            continue;
        }

        let candidates = match (&row.candidates, row.is_partial) {
            (Some(raw), true) => parse_candidates(raw)?,
            _ => Vec::new(),
        };

        let device = grouped
            .entry((row.device_id.clone(), row.project.clone()))
            .or_insert_with(|| {
                let mut d = DeviceIssuance::new(row.device_id.clone(), row.capacity.clone(), row.project.clone());
                for m in months {
                    d.months.insert(*m, MonthIssuance::settled(BigDecimal::zero()));
                }
                d
            });

        let slot = device
            .months
            .entry(month)
            .or_insert_with(|| MonthIssuance::settled(BigDecimal::zero()));
        slot.issued = &slot.issued + &row.issued;
        if row.is_partial {
            slot.partial = true;
            slot.candidates.extend(candidates);
        }
    }

    Ok(grouped.into_values().collect())
}
