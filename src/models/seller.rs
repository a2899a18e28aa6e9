use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 卖方表 (sellers)
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Seller {
    pub group_name: String,
    pub seller: String,
    pub success_fee: BigDecimal,      // 默认成功费 %
    pub indicative_price: BigDecimal, // 默认单价 USD
    pub pan: String,
    pub gst: String,
    pub registration_number: Option<String>,
    pub address: String,
}
