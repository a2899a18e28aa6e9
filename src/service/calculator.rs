use crate::models::{CommercialParameters, DeviceIssuance, InvoiceCalculationResult};
use crate::service::fee::registration_fee;
use bigdecimal::{BigDecimal, Zero};
use std::collections::HashSet;

/// 发行费率: 总发行量的 2.5% (EUR)
fn issuance_levy() -> BigDecimal {
    BigDecimal::from(25) / BigDecimal::from(1000)
}

/// 四舍五入 (远离零), 仅在生成结果记录时调用
fn round_to(value: &BigDecimal, digits: i64) -> BigDecimal {
    value.round(digits)
}

/// 计算整张发票的全部金额字段
///
/// 步骤顺序固定, 后一步依赖前一步; 中间值保持精确, 不做舍入.
/// 调用方负责参数校验.
pub fn calculate(
    devices: &[DeviceIssuance],
    registered: &HashSet<String>,
    params: &CommercialParameters,
) -> InvoiceCalculationResult {
    let zero = BigDecimal::zero();
    let remove_fees = params.remove_fees;

    // 1. 汇总容量和发行量 + 2. 未注册设备的注册费
    let mut total_capacity = BigDecimal::zero();
    let mut total_issued = BigDecimal::zero();
    let mut reg_fee = BigDecimal::zero();

    for device in devices {
        total_capacity += &device.capacity;
        total_issued += device.total_issued();

        if !remove_fees && !registered.contains(&device.device_id) {
            reg_fee += registration_fee(&device.capacity);
        }
    }

    // 3. 发行费
    let issuance_fee = if remove_fees {
        zero.clone()
    } else {
        issuance_levy() * &total_issued
    };

    // 4. 毛收入 (USD -> INR), 与 remove_fees 无关
    let gross_amount = &total_issued * &params.unit_price * &params.usd_rate;

    // 5/6. 费用折算 INR
    let (reg_fee_inr, issuance_fee_inr) = if remove_fees {
        (zero.clone(), zero.clone())
    } else {
        (&reg_fee * &params.eur_rate, &issuance_fee * &params.eur_rate)
    };

    // 7. 净收入
    let net_revenue = &gross_amount - &(&reg_fee_inr + &issuance_fee_inr);

    // 8. 成功费
    let success_fee = if remove_fees {
        zero.clone()
    } else {
        &params.success_fee_percent / &BigDecimal::from(100) * &net_revenue
    };

    // 9. 最终收入
    let final_revenue = &net_revenue - &success_fee;

    // 10. 净单价, 发行量为 0 时定义为 0
    let net_rate = if total_issued > zero {
        &final_revenue / &total_issued
    } else {
        zero.clone()
    };

    InvoiceCalculationResult {
        total_capacity: round_to(&total_capacity, 2),
        total_devices: devices.len(),
        total_issued: round_to(&total_issued, 4),
        registration_fee: round_to(&reg_fee, 2),
        issuance_fee: round_to(&issuance_fee, 4),
        gross_amount: round_to(&gross_amount, 4),
        reg_fee_inr: round_to(&reg_fee_inr, 4),
        issuance_fee_inr: round_to(&issuance_fee_inr, 4),
        net_revenue: round_to(&net_revenue, 4),
        success_fee: round_to(&success_fee, 4),
        final_revenue: round_to(&final_revenue, 4),
        net_rate: round_to(&net_rate, 4),
    }
}
