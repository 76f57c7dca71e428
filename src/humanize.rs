const BYTE_UNITS: [&str; 9] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB", "ZiB", "YiB"];

/// Format a byte count with binary units.
///
/// Counts up to 1024 are printed as-is (`"512 B"`). Larger counts pick the unit from the number
/// of decimal digits, so 1 000 000 bytes is `"0.95 MiB"`.
pub fn bytes(count: u64, decimals: usize) -> String {
    if count <= 1024 {
        return format!("{} B", count);
    }
    let factor = digit_factor(count, BYTE_UNITS.len() - 1);
    format!(
        "{:.*} {}",
        decimals,
        count as f64 / 1024f64.powi(factor as i32),
        BYTE_UNITS[factor]
    )
}

/// One step per three decimal digits, capped at `max`.
fn digit_factor(value: u64, max: usize) -> usize {
    ((value.to_string().len() - 1) / 3).min(max)
}

/// Format a duration given in microseconds as μs, ms or s.
///
/// Precision grows with the magnitude: no decimals up to 1 ms, one decimal up to 1 s and two
/// decimals beyond that. The unit is picked from the number of digits, so seconds are the
/// largest unit used.
pub fn micros(us: u64) -> String {
    let decimals = match us {
        us if us > 1_000_000 => 2,
        us if us > 1_000 => 1,
        _ => 0,
    };
    let factor = digit_factor(us, 2);
    let units = ["μs", "ms", "s"];
    format!(
        "{:.*} {}",
        decimals,
        us as f64 / 1000f64.powi(factor as i32),
        units[factor]
    )
}
