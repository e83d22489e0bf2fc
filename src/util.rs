/// Format a non-negative magnitude with thousands separators, e.g.
/// `thousands(95000.0, 0)` -> "95,000", `thousands(1234.5, 2)` -> "1,234.50".
/// Negative values keep their sign; callers that render an explicit +/-
/// prefix pass `value.abs()`.
pub fn thousands(value: f64, decimals: usize) -> String {
    let rendered = format!("{:.*}", decimals, value);
    let (sign, digits) = match rendered.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", rendered.as_str()),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (digits, None),
    };
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    match frac_part {
        Some(frac) => format!("{}{}.{}", sign, grouped, frac),
        None => format!("{}{}", sign, grouped),
    }
}

/// "+$12.34" / "-$5.00" — sign first, then the magnitude.
pub fn signed_usd(value: f64, decimals: usize) -> String {
    let sign = if value >= 0.0 { "+" } else { "-" };
    format!("{}${}", sign, thousands(value.abs(), decimals))
}

/// "+1.23%" / "-0.45%"
pub fn signed_pct(value: f64) -> String {
    let sign = if value >= 0.0 { "+" } else { "" };
    format!("{}{:.2}%", sign, value)
}
