use bigdecimal::BigDecimal;

/// 注册费档位 (EUR, 按装机容量 MW)
///
/// - `>= 3` : 1000
/// - `1 < c < 3` : 500
/// - `<= 1` : 100 (负数也落在此档, 负容量在会话准备阶段已被拒绝)
pub fn registration_fee(capacity: &BigDecimal) -> BigDecimal {
    if *capacity >= BigDecimal::from(3) {
        BigDecimal::from(1000)
    } else if *capacity > BigDecimal::from(1) {
        BigDecimal::from(500)
    } else {
        BigDecimal::from(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::str::FromStr;

    fn fee(s: &str) -> BigDecimal {
        registration_fee(&BigDecimal::from_str(s).unwrap())
    }

    #[test]
    fn tier_boundaries() {
        assert_eq!(fee("3"), BigDecimal::from(1000));
        assert_eq!(fee("1"), BigDecimal::from(100));
        assert_eq!(fee("1.0001"), BigDecimal::from(500));
        assert_eq!(fee("2.999"), BigDecimal::from(500));
        assert_eq!(fee("0"), BigDecimal::from(100));
        assert_eq!(fee("250"), BigDecimal::from(1000));
    }

    #[test]
    fn negative_capacity_falls_into_lowest_tier() {
        assert_eq!(fee("-4"), BigDecimal::from(100));
    }

    proptest! {
        /// 任意容量只会落在三个档位之一, 且随容量单调不减
        #[test]
        fn fee_is_one_of_three_tiers_and_monotonic(a in 0i64..10_000_000, b in 0i64..10_000_000) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let lo = BigDecimal::new(lo.into(), 6);
            let hi = BigDecimal::new(hi.into(), 6);

            let tiers = [BigDecimal::from(100), BigDecimal::from(500), BigDecimal::from(1000)];
            prop_assert!(tiers.contains(&registration_fee(&lo)));
            prop_assert!(registration_fee(&lo) <= registration_fee(&hi));
        }
    }
}
