pub mod csv_sink;
pub mod words;

pub use csv_sink::CsvDocumentSink;
pub use words::amount_in_words;

use crate::error::InvoiceError;
use crate::models::{DeviceIssuance, InvoiceCalculationResult, InvoiceRecord, Month, Seller};
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

/// 文档输出 (只消费计算结果, 不反馈)
pub trait DocumentSink: Send + Sync {
    fn render_worksheet(&self, doc: &WorksheetDocument) -> Result<PathBuf, InvoiceError>;

    fn render_invoice(&self, doc: &InvoiceDocument) -> Result<PathBuf, InvoiceError>;
}

/// 工作表中的单个设备行
#[derive(Debug, Clone, Serialize)]
pub struct WorksheetRow {
    pub device_id: String,
    pub project: String,
    pub capacity: BigDecimal,
    pub monthly: Vec<BigDecimal>,
    pub total_issued: BigDecimal,
}

/// 计算工作表: 按设备、按月明细 + 计算结果
#[derive(Debug, Clone, Serialize)]
pub struct WorksheetDocument {
    pub company_name: String,
    pub year: i32,
    pub months: Vec<Month>,
    pub rows: Vec<WorksheetRow>,
    pub result: InvoiceCalculationResult,
}

impl WorksheetDocument {
    pub fn build(
        company_name: &str,
        year: i32,
        months: &[Month],
        devices: &[DeviceIssuance],
        result: &InvoiceCalculationResult,
    ) -> Self {
        let rows = devices
            .iter()
            .map(|d| WorksheetRow {
                device_id: d.device_id.clone(),
                project: d.project.clone(),
                capacity: d.capacity.clone(),
                monthly: months.iter().map(|m| d.issued_in(*m)).collect(),
                total_issued: d.total_issued(),
            })
            .collect();

        Self {
            company_name: company_name.to_string(),
            year,
            months: months.to_vec(),
            rows,
            result: result.clone(),
        }
    }

    /// 每月合计
    pub fn month_totals(&self) -> Vec<BigDecimal> {
        (0..self.months.len())
            .map(|idx| {
                self.rows
                    .iter()
                    .filter_map(|r| r.monthly.get(idx))
                    .fold(BigDecimal::from(0), |acc, v| acc + v)
            })
            .collect()
    }
}

/// 税率: CGST / SGST 各 9%
fn gst_rate() -> BigDecimal {
    BigDecimal::from(9) / BigDecimal::from(100)
}

/// 开票文档 (卖方抬头 + 金额 + 税额 + 大写)
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceDocument {
    pub invoice_id: Uuid,
    pub invoice_date: NaiveDate,
    pub company_name: String,
    pub pan: String,
    pub gst: String,
    pub address_lines: Vec<String>,
    pub period_label: String,
    pub project_lines: Vec<String>,
    pub description: String,
    pub taxable_value: BigDecimal,
    pub cgst: BigDecimal,
    pub sgst: BigDecimal,
    pub total: BigDecimal,
    pub amount_in_words: String,
}

impl InvoiceDocument {
    pub fn build(record: &InvoiceRecord, seller: &Seller, invoice_date: NaiveDate) -> Result<Self, InvoiceError> {
        let taxable_value = (&record.total_issued * &record.net_rate).round(4);
        let cgst = (&taxable_value * &gst_rate()).round(4);
        let sgst = cgst.clone();
        let total = &taxable_value + &cgst + &sgst;

        Ok(Self {
            invoice_id: record.invoice_id,
            invoice_date,
            company_name: record.company_name.clone(),
            pan: seller.pan.clone(),
            gst: seller.gst.clone(),
            address_lines: address_lines(&seller.address),
            period_label: period_label(record.year, record.period_from, record.period_to)?,
            project_lines: project_lines(&record.projects),
            description: format!(
                "Sale of renewable attributes for I-REC ({} units at INR {} per unit)",
                record.total_issued.with_scale(4),
                record.net_rate.with_scale(4)
            ),
            amount_in_words: amount_in_words(&total)?,
            taxable_value,
            cgst,
            sgst,
            total,
        })
    }
}

fn last_day_of(year: i32, month: Month) -> Option<NaiveDate> {
    let (y, m) = match Month::from_number(month.number() + 1) {
        Some(next) => (year, next.number()),
        None => (year + 1, 1),
    };
    NaiveDate::from_ymd_opt(y, m, 1)?.pred_opt()
}

/// "01-MM-YYYY to DD-MM-YYYY"
pub fn period_label(year: i32, from: Month, to: Month) -> Result<String, InvoiceError> {
    let start = NaiveDate::from_ymd_opt(year, from.number(), 1);
    let end = last_day_of(year, to);
    match (start, end) {
        (Some(start), Some(end)) => Ok(format!(
            "{} to {}",
            start.format("%d-%m-%Y"),
            end.format("%d-%m-%Y")
        )),
        _ => Err(InvoiceError::Document(format!("year {} is out of range", year))),
    }
}

/// 地址按逗号拆成最多三行
pub fn address_lines(address: &str) -> Vec<String> {
    let parts: Vec<&str> = address
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() <= 2 {
        return vec![parts.join(", ")];
    }

    let chunks = [&parts[..2], &parts[2..parts.len().min(4)], &parts[parts.len().min(4)..]];
    let lines: Vec<String> = chunks
        .iter()
        .filter(|c| !c.is_empty())
        .map(|c| c.join(", "))
        .collect();

    let last = lines.len().saturating_sub(1);
    lines
        .into_iter()
        .enumerate()
        .map(|(i, line)| if i < last { format!("{},", line) } else { line })
        .collect()
}

/// 多个项目: 首行为第一个项目, 其余合并为第二行
pub fn project_lines(projects: &str) -> Vec<String> {
    let parts: Vec<&str> = projects.split(" and ").collect();
    if parts.len() > 1 {
        vec![format!("{},", parts[0]), parts[1..].join(" and ")]
    } else {
        vec![projects.to_string()]
    }
}
