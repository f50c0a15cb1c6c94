use super::error::{StoreError, StoreResult, codes};
use std::fmt;

/// A key and the value stored (or to be stored) under it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl KeyValue {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Half-open key range `[begin, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub begin: Vec<u8>,
    pub end: Vec<u8>,
}

impl KeyRange {
    pub fn new(begin: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> StoreResult<Self> {
        let begin = begin.into();
        let end = end.into();
        if begin > end {
            return Err(StoreError::from_code(codes::INVERTED_RANGE));
        }
        Ok(Self { begin, end })
    }

    /// Every key that starts with `prefix`.
    ///
    /// Fails when the prefix is empty or made only of `0xff` bytes, since no
    /// finite end key exists for it.
    pub fn prefix(prefix: &[u8]) -> StoreResult<Self> {
        let end = strinc(prefix).ok_or_else(|| {
            StoreError::new(
                codes::KEY_OUTSIDE_LEGAL_RANGE,
                "Key must contain at least one byte not equal to 0xFF",
            )
        })?;
        Ok(Self {
            begin: prefix.to_vec(),
            end,
        })
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.begin.as_slice() && key < self.end.as_slice()
    }
}

/// Smallest key greater than every key with the given prefix.
fn strinc(prefix: &[u8]) -> Option<Vec<u8>> {
    let last = prefix.iter().rposition(|byte| *byte != 0xff)?;
    let mut end = prefix[..=last].to_vec();
    end[last] += 1;
    Some(end)
}

/// Renders bytes the way the store's tooling prints keys: printable ASCII
/// as-is, everything else as `\xNN`.
pub fn printable(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for byte in bytes {
        if (byte.is_ascii_graphic() && *byte != b'\\') || *byte == b' ' {
            out.push(*byte as char);
        } else {
            out.push_str(&format!("\\x{:02x}", byte));
        }
    }
    out
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}' is `{}'", printable(&self.key), printable(&self.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_range_bounds() {
        let range = KeyRange::prefix(b"\xff/conf/excluded/10.0.0.1:").unwrap();
        assert_eq!(range.end, b"\xff/conf/excluded/10.0.0.1;".to_vec());
        assert!(range.contains(b"\xff/conf/excluded/10.0.0.1:4500"));
        assert!(!range.contains(b"\xff/conf/excluded/10.0.0.12"));
        assert!(!range.contains(b"\xff/conf/excluded/10.0.0.1"));
    }

    #[test]
    fn test_prefix_range_strips_trailing_ff() {
        let range = KeyRange::prefix(b"a\xff\xff").unwrap();
        assert_eq!(range.end, b"b".to_vec());
        assert!(KeyRange::prefix(b"\xff\xff").is_err());
        assert!(KeyRange::prefix(b"").is_err());
    }

    #[test]
    fn test_inverted_range_rejected() {
        let err = KeyRange::new(b"b".to_vec(), b"a".to_vec()).unwrap_err();
        assert_eq!(err.code, codes::INVERTED_RANGE);
    }

    #[test]
    fn test_printable_escapes_system_prefix() {
        assert_eq!(printable(b"\xff/conf/log_engine"), "\\xff/conf/log_engine");
        assert_eq!(printable(b"One"), "One");
    }
}
