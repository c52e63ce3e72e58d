//! MAC address normalization.
//!
//! The wire and the inventory both carry MAC addresses as text, in colon or
//! hyphen form and in any case. Everything is compared in the lower-case
//! colon form produced here.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MacError {
    #[error("empty MAC address")]
    Empty,
    #[error("malformed MAC address: {0}")]
    Malformed(String),
}

/// Lower-cases the address and turns hyphens into colons, then checks that the
/// result is six two-digit hex octets.
pub fn normalize_mac(raw: &str) -> Result<String, MacError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(MacError::Empty);
    }

    let normalized = canonical_form(trimmed);
    let octets: Vec<&str> = normalized.split(':').collect();
    let well_formed = octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));

    if well_formed {
        Ok(normalized)
    } else {
        Err(MacError::Malformed(raw.to_string()))
    }
}

/// Separator/case folding without validation, for comparing stored values that
/// may not be well formed.
pub fn canonical_form(raw: &str) -> String {
    raw.trim().to_ascii_lowercase().replace('-', ":")
}

/// Formats raw octets the same way `normalize_mac` does.
pub fn format_octets(bytes: [u8; 6]) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colon_and_hyphen_forms_agree() {
        let a = normalize_mac("00:16:3E:4F:E5:74").unwrap();
        let b = normalize_mac("00-16-3e-4f-e5-74").unwrap();
        assert_eq!(a, "00:16:3e:4f:e5:74");
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(normalize_mac("   "), Err(MacError::Empty));
        assert!(matches!(normalize_mac("00:16:3e"), Err(MacError::Malformed(_))));
        assert!(matches!(
            normalize_mac("00:16:3e:4f:e5:zz"),
            Err(MacError::Malformed(_))
        ));
        assert!(matches!(
            normalize_mac("0016.3e4f.e574"),
            Err(MacError::Malformed(_))
        ));
    }

    #[test]
    fn formats_octets_lowercase() {
        assert_eq!(
            format_octets([0xA1, 0xB2, 0xC3, 0x04, 0x05, 0xF6]),
            "a1:b2:c3:04:05:f6"
        );
    }
}
