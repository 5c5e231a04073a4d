//! Deterministic context checksums.
//!
//! An anchor stores a short checksum of `context-before ‖ text ‖
//! context-after` so that hosts can cheaply detect whether the surroundings
//! of a re-resolved span still look like they did at creation time. The
//! checksum is 32 bits of a keyed HighwayHash, rendered in base-36.

use highway::{HighwayHash, HighwayHasher, Key};

// Fixed key: checksums must be comparable across processes and versions.
const CHECKSUM_KEY: Key = Key([
    0x7469_6465_6d61_726b,
    0x616e_6368_6f72_3031,
    0x636f_6e74_6578_7401,
    0x6368_6563_6b73_756d,
]);

/// Computes the checksum over the concatenation of the three parts.
pub fn context_checksum(before: &str, text: &str, after: &str) -> String {
    let mut hasher = HighwayHasher::new(CHECKSUM_KEY);
    hasher.append(before.as_bytes());
    hasher.append(text.as_bytes());
    hasher.append(after.as_bytes());
    let hash = hasher.finalize64() as u32;
    to_base36(hash)
}

/// Whether `s` looks like a well-formed checksum (non-empty base-36).
pub fn is_well_formed(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase())
}

fn to_base36(mut value: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".into();
    }
    let mut buf = [0u8; 8];
    let mut i = buf.len();
    while value > 0 {
        i -= 1;
        buf[i] = DIGITS[(value % 36) as usize];
        value /= 36;
    }
    core::str::from_utf8(&buf[i..]).unwrap_or("0").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_deterministic() {
        let a = context_checksum("before ", "selected text", " after");
        let b = context_checksum("before ", "selected text", " after");
        assert_eq!(a, b);
        assert!(is_well_formed(&a));
    }

    #[test]
    fn test_checksum_sensitive_to_every_part() {
        let base = context_checksum("b", "t", "a");
        assert_ne!(base, context_checksum("x", "t", "a"));
        assert_ne!(base, context_checksum("b", "x", "a"));
        assert_ne!(base, context_checksum("b", "t", "x"));
    }

    #[test]
    fn test_base36_rendering() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(u32::MAX), "1z141z3");
    }

    #[test]
    fn test_well_formed() {
        assert!(is_well_formed("1z141z3"));
        assert!(!is_well_formed(""));
        assert!(!is_well_formed("HASH"));
        assert!(!is_well_formed("a-b"));
    }
}
