use crate::models::{CommercialParameters, InvoiceCalculationResult, Month};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 开票请求 (对应原桌面表单字段)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceRequest {
    pub group_name: String,
    pub company_name: String,
    pub year: i32,
    pub period_from: String,
    pub period_to: String,
    pub device_ids: Vec<String>,
    pub params: CommercialParameters,
}

/// 发票记录表 (t_irec_invoice), 确认开票时写入
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub invoice_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub group_name: String,
    pub company_name: String,
    pub year: i32,
    pub period_from: Month,
    pub period_to: Month,
    pub device_ids: String, // 逗号分隔
    pub projects: String,   // " and " 连接
    pub unit_price: BigDecimal,
    pub success_fee_percent: BigDecimal,
    pub usd_rate: BigDecimal,
    pub eur_rate: BigDecimal,
    pub remove_fees: bool,
    pub capacity: BigDecimal,
    pub total_devices: i32,
    pub total_issued: BigDecimal,
    pub registration_fee: BigDecimal,
    pub issuance_fee: BigDecimal,
    pub gross_amount: BigDecimal,
    pub reg_fee_inr: BigDecimal,
    pub issuance_fee_inr: BigDecimal,
    pub net_revenue: BigDecimal,
    pub success_fee: BigDecimal,
    pub final_revenue: BigDecimal,
    pub net_rate: BigDecimal,
}

impl InvoiceRecord {
    /// 扁平化: 计算结果 + 身份/账期/设备元数据, 生成新的发票编号
    pub fn flatten(
        request: &InvoiceRequest,
        months: &[Month],
        device_ids: &[String],
        projects: &str,
        result: &InvoiceCalculationResult,
    ) -> Self {
        let period_from = months.first().copied().unwrap_or(Month::January);
        let period_to = months.last().copied().unwrap_or(period_from);

        Self {
            invoice_id: Uuid::new_v4(),
            created_at: Utc::now(),
            group_name: request.group_name.clone(),
            company_name: request.company_name.clone(),
            year: request.year,
            period_from,
            period_to,
            device_ids: device_ids.join(","),
            projects: projects.to_string(),
            unit_price: request.params.unit_price.clone(),
            success_fee_percent: request.params.success_fee_percent.clone(),
            usd_rate: request.params.usd_rate.clone(),
            eur_rate: request.params.eur_rate.clone(),
            remove_fees: request.params.remove_fees,
            capacity: result.total_capacity.clone(),
            total_devices: result.total_devices as i32,
            total_issued: result.total_issued.clone(),
            registration_fee: result.registration_fee.clone(),
            issuance_fee: result.issuance_fee.clone(),
            gross_amount: result.gross_amount.clone(),
            reg_fee_inr: result.reg_fee_inr.clone(),
            issuance_fee_inr: result.issuance_fee_inr.clone(),
            net_revenue: result.net_revenue.clone(),
            success_fee: result.success_fee.clone(),
            final_revenue: result.final_revenue.clone(),
            net_rate: result.net_rate.clone(),
        }
    }
}
