use crate::error::InvoiceError;
use bigdecimal::{BigDecimal, Signed, ToPrimitive};

const CRORE: u64 = 10_000_000;
const LAKH: u64 = 100_000;
const THOUSAND: u64 = 1_000;
const HUNDRED: u64 = 100;

const UNITS: [&str; 20] = [
    "", "ONE", "TWO", "THREE", "FOUR", "FIVE", "SIX", "SEVEN", "EIGHT", "NINE", "TEN", "ELEVEN",
    "TWELVE", "THIRTEEN", "FOURTEEN", "FIFTEEN", "SIXTEEN", "SEVENTEEN", "EIGHTEEN", "NINETEEN",
];
const TENS: [&str; 10] = [
    "", "", "TWENTY", "THIRTY", "FORTY", "FIFTY", "SIXTY", "SEVENTY", "EIGHTY", "NINETY",
];

/// 印度计数法 (crore / lakh) 英文大写
fn number_words(num: u64) -> String {
    let tail = |rest: u64, sep: &str| {
        if rest == 0 {
            String::new()
        } else {
            format!("{}{}", sep, number_words(rest))
        }
    };

    if num < 20 {
        UNITS[num as usize].to_string()
    } else if num < 100 {
        format!("{}{}", TENS[(num / 10) as usize], tail(num % 10, " "))
    } else if num < THOUSAND {
        format!("{} HUNDRED{}", UNITS[(num / HUNDRED) as usize], tail(num % HUNDRED, " AND "))
    } else if num < LAKH {
        format!("{} THOUSAND{}", number_words(num / THOUSAND), tail(num % THOUSAND, " "))
    } else if num < CRORE {
        format!("{} LAKH{}", number_words(num / LAKH), tail(num % LAKH, " "))
    } else {
        format!("{} CRORE{}", number_words(num / CRORE), tail(num % CRORE, " "))
    }
}

/// 金额转大写: "... RUPEES [AND ... PAISE] ONLY", 先四舍五入到分
pub fn amount_in_words(amount: &BigDecimal) -> Result<String, InvoiceError> {
    let rounded = amount.round(2);
    let abs = rounded.abs();

    let rupees = abs
        .with_scale(0)
        .to_u64()
        .ok_or_else(|| InvoiceError::Document(format!("amount {} is too large to spell out", amount)))?;
    let paise = ((&abs - &BigDecimal::from(rupees)) * BigDecimal::from(100))
        .with_scale(0)
        .to_u64()
        .unwrap_or(0);

    let mut words = if rupees == 0 {
        "ZERO".to_string()
    } else {
        number_words(rupees)
    };
    if rounded.is_negative() {
        words = format!("MINUS {}", words);
    }
    words.push_str(" RUPEES");
    if paise > 0 {
        words.push_str(" AND ");
        words.push_str(&number_words(paise));
        words.push_str(" PAISE");
    }
    words.push_str(" ONLY");
    Ok(words)
}
