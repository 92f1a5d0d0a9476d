//! Rupiah formatting.
//!
//! Amounts are whole rupiah held in `u64`; there is no minor unit.

/// Group digits in thousands with a dot separator, e.g. `300000` -> `"300.000"`.
pub fn group_thousands(amount: u64) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    out
}

/// Format an amount for display, e.g. `300000` -> `"Rp 300.000"`.
pub fn format_rupiah(amount: u64) -> String {
    format!("Rp {}", group_thousands(amount))
}
