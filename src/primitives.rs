//! Pure numeric helpers for user-entered amounts and on-screen figures.
//!
//! Every function here is total: malformed input degrades to zero or to the
//! original string, never to a panic.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

/// Separator inserted between thousands groups by [`format_thousands`].
///
/// Comma and dot are both read as decimal separators, so grouping uses a
/// space to stay unambiguous.
pub const GROUP_SEPARATOR: char = ' ';

/// Cleans raw input down to digits and a single `.` decimal separator.
///
/// Comma and dot are treated alike. Everything after a second separator is
/// dropped, and a leading separator gains a `0`.
pub fn sanitize_amount(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut seen_separator = false;
    for c in raw.chars() {
        match c {
            '0'..='9' => out.push(c),
            '.' | ',' if !seen_separator => {
                if out.is_empty() {
                    out.push('0');
                }
                out.push('.');
                seen_separator = true;
            }
            '.' | ',' => break,
            _ => {}
        }
    }
    out
}

/// Parses user input into a non-negative amount.
///
/// Returns zero for empty, unparseable or out-of-range input.
pub fn parse_amount(raw: &str) -> Decimal {
    let cleaned = sanitize_amount(raw);
    let cleaned = cleaned.trim_end_matches('.');
    if cleaned.is_empty() {
        return Decimal::ZERO;
    }
    Decimal::from_str(cleaned).unwrap_or(Decimal::ZERO)
}

/// Inserts [`GROUP_SEPARATOR`] every three digits of the integer part.
///
/// The fractional part, including its separator, is left exactly as typed.
/// Input whose integer part is not plain digits is returned unchanged.
pub fn format_thousands(raw: &str) -> String {
    let split = raw.find(['.', ',']).unwrap_or(raw.len());
    let (int_part, rest) = raw.split_at(split);
    if !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return raw.to_string();
    }

    let len = int_part.len();
    let mut out = String::with_capacity(raw.len() + len / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(GROUP_SEPARATOR);
        }
        out.push(c);
    }
    out.push_str(rest);
    out
}

/// Scales a figure to a K/M/B/T suffix with two decimals, for display only.
pub fn format_number(n: Decimal) -> String {
    const SCALES: [(Decimal, &str); 4] = [
        (Decimal::from_parts(0xD4A5_1000, 0xE8, 0, false, 0), "T"),
        (Decimal::from_parts(1_000_000_000, 0, 0, false, 0), "B"),
        (Decimal::from_parts(1_000_000, 0, 0, false, 0), "M"),
        (Decimal::from_parts(1_000, 0, 0, false, 0), "K"),
    ];

    let magnitude = n.abs();
    for (scale, suffix) in SCALES {
        if magnitude >= scale {
            return format!("{}{suffix}", round2(n / scale));
        }
    }
    format!("{}", round2(n))
}

/// Formats a price: two decimals at or above one unit, up to eight below.
pub fn format_price(price: Decimal) -> String {
    if price.abs() >= Decimal::ONE {
        let fixed = round2(price).to_string();
        format_thousands(&fixed)
    } else {
        price
            .round_dp_with_strategy(8, RoundingStrategy::MidpointAwayFromZero)
            .normalize()
            .to_string()
    }
}

/// Signed percentage change from `old` to `new`.
///
/// Returns `None` when `old` is zero, where the change is undefined.
pub fn percent_change(old: Decimal, new: Decimal) -> Option<Decimal> {
    if old.is_zero() {
        return None;
    }
    (new - old)
        .checked_div(old)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
}

/// Formats a percentage with an explicit sign, e.g. `+1.25%`.
pub fn format_percent(pct: Decimal) -> String {
    let rounded = round2(pct);
    if rounded > Decimal::ZERO {
        format!("+{rounded}%")
    } else {
        format!("{rounded}%")
    }
}

fn round2(n: Decimal) -> Decimal {
    let mut rounded = n.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}
