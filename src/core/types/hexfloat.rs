//! C-style hex-float (`%a`) formatting and parsing
//!
//! Hex display of float kinds uses the `printf` `%a` shape:
//! `[-]0x1.<mantissa>p<exp>`, mantissa trailing zeros trimmed. Parsing
//! reconstructs the exact bit pattern, so format/parse round-trips.

/// Formats a double as a hex-float string
pub fn format_hex_f64(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v.is_sign_negative() { "-inf" } else { "inf" }.to_string();
    }

    let bits = v.to_bits();
    let sign = if bits >> 63 == 1 { "-" } else { "" };
    let raw_exp = ((bits >> 52) & 0x7ff) as i64;
    let mantissa = bits & ((1u64 << 52) - 1);

    if raw_exp == 0 && mantissa == 0 {
        return format!("{}0x0p+0", sign);
    }

    // Subnormals have an implicit leading 0 and a fixed exponent
    let (lead, exp) = if raw_exp == 0 {
        (0u64, -1022i64)
    } else {
        (1u64, raw_exp - 1023)
    };

    let mut hex = format!("{:013x}", mantissa);
    while hex.ends_with('0') {
        hex.pop();
    }

    if hex.is_empty() {
        format!("{}0x{}p{:+}", sign, lead, exp)
    } else {
        format!("{}0x{}.{}p{:+}", sign, lead, hex, exp)
    }
}

/// Formats a float as a hex-float string (promoted to double, as in C)
pub fn format_hex_f32(v: f32) -> String {
    format_hex_f64(v as f64)
}

/// Parses a hex-float string produced by [`format_hex_f64`]
pub fn parse_hex_f64(s: &str) -> Option<f64> {
    let s = s.trim().to_ascii_lowercase();
    let (negative, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.as_str()),
    };
    let s = s.strip_prefix('+').unwrap_or(s);

    if s == "inf" || s == "infinity" {
        return Some(if negative { f64::NEG_INFINITY } else { f64::INFINITY });
    }
    if s == "nan" {
        return Some(f64::NAN);
    }

    let s = s.strip_prefix("0x")?;
    let (mantissa_str, exp_str) = s.split_once('p')?;
    let exp: i32 = exp_str.parse().ok()?;

    let (int_str, frac_str) = match mantissa_str.split_once('.') {
        Some((i, f)) => (i, f),
        None => (mantissa_str, ""),
    };
    if int_str.is_empty() || frac_str.len() > 13 {
        return None;
    }

    let mut value: u64 = u64::from_str_radix(int_str, 16).ok()?;
    for c in frac_str.chars() {
        value = value.checked_mul(16)?.checked_add(c.to_digit(16)? as u64)?;
    }

    // value * 2^(exp - 4*frac_len); both factors are exact, and the product
    // is the exactly-representable double the string was formatted from
    let scale = exp - 4 * frac_str.len() as i32;
    let magnitude = (value as f64) * 2f64.powi(scale);
    Some(if negative { -magnitude } else { magnitude })
}

/// Parses a hex-float string into a float
pub fn parse_hex_f32(s: &str) -> Option<f32> {
    parse_hex_f64(s).map(|v| v as f32)
}
