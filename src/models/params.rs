use crate::error::InvoiceError;
use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};

/// 商务参数 (每次计算由调用方提供)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommercialParameters {
    pub unit_price: BigDecimal,          // USD / 单位
    pub success_fee_percent: BigDecimal, // 0 - 100
    pub usd_rate: BigDecimal,            // USD -> INR
    pub eur_rate: BigDecimal,            // EUR -> INR
    #[serde(default)]
    pub remove_fees: bool,
}

impl CommercialParameters {
    pub fn validate(&self) -> Result<(), InvoiceError> {
        let zero = BigDecimal::zero();
        let hundred = BigDecimal::from(100);

        if self.unit_price < zero {
            return Err(InvoiceError::InvalidParameter(format!(
                "unit price must not be negative, got {}",
                self.unit_price
            )));
        }
        if self.success_fee_percent < zero || self.success_fee_percent > hundred {
            return Err(InvoiceError::InvalidParameter(format!(
                "success fee percent must be within 0-100, got {}",
                self.success_fee_percent
            )));
        }
        if self.usd_rate <= zero {
            return Err(InvoiceError::InvalidParameter(format!(
                "USD rate must be positive, got {}",
                self.usd_rate
            )));
        }
        if self.eur_rate <= zero {
            return Err(InvoiceError::InvalidParameter(format!(
                "EUR rate must be positive, got {}",
                self.eur_rate
            )));
        }
        Ok(())
    }
}
