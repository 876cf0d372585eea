//! Hex-string helpers shared by the codec and the engine.
//!
//! All persisted card data travels as uppercase hex strings; offsets
//! and lengths in pipe and variable-save configurations are expressed
//! in bytes and mapped to hex-character positions here.

/// True for a non-empty string of hex digits.
pub fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// True for exactly one byte written as 2 hex digits.
pub fn is_byte(s: &str) -> bool {
    s.len() == 2 && is_hex(s)
}

/// True for an even-length hex string; the empty string counts.
pub fn is_even_hex(s: &str) -> bool {
    s.is_empty() || (s.len() % 2 == 0 && is_hex(s))
}

/// Strip whitespace and uppercase, the canonical form used everywhere.
pub fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Byte count of a hex string.
pub fn byte_len(s: &str) -> usize {
    s.len() / 2
}

/// Slice a hex string by byte offset and byte length, `length == -1`
/// meaning "to the end". Out-of-range bounds clamp to the string, so a
/// slice past the end yields an empty string rather than an error;
/// persisted graphs rely on that behavior.
pub fn slice_bytes(hex: &str, offset: usize, length: i64) -> &str {
    let start = offset.saturating_mul(2).min(hex.len());
    let end = if length < 0 {
        hex.len()
    } else {
        start
            .saturating_add((length as usize).saturating_mul(2))
            .min(hex.len())
    };
    &hex[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_clamps_out_of_range() {
        assert_eq!(slice_bytes("AABB", 8, 2), "");
        assert_eq!(slice_bytes("AABB", 1, 4), "BB");
    }

    #[test]
    fn slice_negative_length_takes_suffix() {
        assert_eq!(slice_bytes("0123456789ABCDEF", 2, -1), "456789ABCDEF");
    }

    #[test]
    fn slice_survives_extreme_bounds() {
        assert_eq!(slice_bytes("AABB", usize::MAX, 1), "");
        assert_eq!(slice_bytes("AABB", 1, i64::MAX), "BB");
        assert_eq!(slice_bytes("AABB", usize::MAX, i64::MAX), "");
    }
}
