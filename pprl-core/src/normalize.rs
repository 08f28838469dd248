//! Canonicalizes a raw field value according to its declared method.
//!
//! Normalization is total: a malformed input degrades to an empty or
//! best-effort string rather than failing the record. The caller decides
//! what an empty normalized value means for the rest of the pipeline (an
//! empty value still goes through q-gram generation and simply contributes
//! the empty q-gram set).

use pprl_types::FieldMethod;

/// Normalizes `value` according to `method`.
pub fn normalize(value: &str, method: FieldMethod) -> String {
    match method {
        FieldMethod::Name => normalize_name(value),
        FieldMethod::Date => normalize_date(value),
        FieldMethod::Gender => normalize_gender(value),
        FieldMethod::Zip => normalize_zip(value),
        FieldMethod::Basic => normalize_basic(value),
    }
}

fn normalize_basic(value: &str) -> String {
    value.trim().to_lowercase()
}

fn normalize_name(value: &str) -> String {
    let lowered = value.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut last_was_space = false;
    for ch in lowered.chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            out.push(ch);
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    out.trim().to_string()
}

fn normalize_gender(value: &str) -> String {
    let lowered = value.trim().to_lowercase();
    match lowered.chars().next() {
        Some('m') => "m",
        Some('f') => "f",
        Some('n') => "nb",
        Some('o') => "o",
        _ => "u",
    }
    .to_string()
}

fn normalize_zip(value: &str) -> String {
    let digits: String = value.chars().filter(char::is_ascii_digit).collect();
    if digits.len() >= 5 {
        digits[..5].to_string()
    } else {
        digits
    }
}

fn normalize_date(value: &str) -> String {
    parse_date(value.trim()).unwrap_or_default()
}

/// Parses one of the recognized date formats and re-emits `YYYY-MM-DD`.
///
/// Recognized: `YYYY-MM-DD`, `MM/DD/YYYY`, `M/D/YYYY`, `YYYYMMDD`.
fn parse_date(value: &str) -> Option<String> {
    if let Some((y, m, d)) = split_dashed(value) {
        return format_date(y, m, d);
    }
    if let Some((y, m, d)) = split_slashed(value) {
        return format_date(y, m, d);
    }
    if value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit()) {
        let y: i32 = value[0..4].parse().ok()?;
        let m: u32 = value[4..6].parse().ok()?;
        let d: u32 = value[6..8].parse().ok()?;
        return format_date(y, m, d);
    }
    None
}

fn split_dashed(value: &str) -> Option<(i32, u32, u32)> {
    let mut parts = value.split('-');
    let y = parts.next()?;
    let m = parts.next()?;
    let d = parts.next()?;
    if parts.next().is_some() || y.len() != 4 {
        return None;
    }
    Some((y.parse().ok()?, m.parse().ok()?, d.parse().ok()?))
}

fn split_slashed(value: &str) -> Option<(i32, u32, u32)> {
    let mut parts = value.split('/');
    let m = parts.next()?;
    let d = parts.next()?;
    let y = parts.next()?;
    if parts.next().is_some() || y.len() != 4 {
        return None;
    }
    Some((y.parse().ok()?, m.parse().ok()?, d.parse().ok()?))
}

fn format_date(year: i32, month: u32, day: u32) -> Option<String> {
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) || !(0..=9999).contains(&year) {
        return None;
    }
    Some(format!("{year:04}-{month:02}-{day:02}"))
}
