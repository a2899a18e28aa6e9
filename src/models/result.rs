use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

/// 发票金额计算结果 (只读, 每次计算新建)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceCalculationResult {
    pub total_capacity: BigDecimal,   // MW, 2 位小数
    pub total_devices: usize,
    pub total_issued: BigDecimal,     // 4 位小数
    pub registration_fee: BigDecimal, // EUR, 2 位小数
    pub issuance_fee: BigDecimal,     // EUR
    pub gross_amount: BigDecimal,     // INR
    pub reg_fee_inr: BigDecimal,
    pub issuance_fee_inr: BigDecimal,
    pub net_revenue: BigDecimal,
    pub success_fee: BigDecimal,
    pub final_revenue: BigDecimal,
    pub net_rate: BigDecimal, // INR / 单位
}
