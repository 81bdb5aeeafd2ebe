//! Kubernetes quantity parsing
//!
//! Converts resource quantity strings ("250m", "1.5", "512Mi", "2e3") into
//! millicores and bytes. Fractions are rounded up, as the API server does.

/// Split a quantity into its numeric part and suffix
fn split(quantity: &str) -> Option<(f64, &str)> {
    let quantity = quantity.trim();
    if quantity.is_empty() {
        return None;
    }

    let suffix_start = quantity
        .char_indices()
        .find(|(i, c)| {
            c.is_ascii_alphabetic()
                && !((*c == 'e' || *c == 'E') && is_exponent(&quantity[*i + 1..]))
        })
        .map(|(i, _)| i)
        .unwrap_or(quantity.len());

    let (number, suffix) = quantity.split_at(suffix_start);
    number.parse::<f64>().ok().map(|n| (n, suffix))
}

fn is_exponent(rest: &str) -> bool {
    let digits = rest.strip_prefix(['+', '-']).unwrap_or(rest);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

fn multiplier(suffix: &str) -> Option<f64> {
    let value = match suffix {
        "" => 1.0,
        "n" => 1e-9,
        "u" => 1e-6,
        "m" => 1e-3,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        "Ki" => 1024.0,
        "Mi" => 1024.0 * 1024.0,
        "Gi" => 1024.0 * 1024.0 * 1024.0,
        "Ti" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "Pi" => 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "Ei" => 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    Some(value)
}

fn parse_scaled(quantity: &str, scale: f64) -> Option<i64> {
    let (number, suffix) = split(quantity)?;
    let value = number * multiplier(suffix)? * scale;
    // absorb float noise such as 0.1 * 1000 = 100.00000000000001
    Some((value - 1e-9).ceil().max(0.0) as i64)
}

/// CPU quantity in millicores
pub fn parse_cpu_millis(quantity: &str) -> Option<i64> {
    parse_scaled(quantity, 1000.0)
}

/// Memory quantity in bytes
pub fn parse_memory_bytes(quantity: &str) -> Option<i64> {
    parse_scaled(quantity, 1.0)
}
