//! Memory Accounting Module
//!
//! Estimates the storage cost of entries, modeling two bytes per UTF-16 code
//! unit of the key and of the value's serialized form.

use crate::cache::Arbitrary;
use crate::codec::serialize;
use crate::error::Result;
use crate::worker::protocol::{ItemSize, MemoryUsageReport};

/// Bytes needed to hold `text` as UTF-16.
pub fn utf16_bytes(text: &str) -> u64 {
    text.encode_utf16().count() as u64 * 2
}

// == Item Size ==
pub fn item_size(key: &str, value: &Arbitrary) -> Result<ItemSize> {
    let key_size = utf16_bytes(key);
    let value_size = utf16_bytes(&serialize(value)?);

    Ok(ItemSize {
        key_size,
        value_size,
        total_size: key_size + value_size,
    })
}

// == Calculate Memory Usage ==
/// Sums the sizes of all entries.
///
/// A key listed twice is counted once, with its last value.
pub fn calculate_memory_usage(entries: &[(String, Arbitrary)]) -> Result<MemoryUsageReport> {
    let mut report = MemoryUsageReport::default();

    for (key, value) in entries {
        let size = item_size(key, value)?;
        report.item_sizes.insert(key.clone(), size);
    }
    report.total_size = report.item_sizes.values().map(|s| s.total_size).sum();

    Ok(report)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;

    #[test]
    fn test_utf16_bytes() {
        assert_eq!(utf16_bytes(""), 0);
        assert_eq!(utf16_bytes("abc"), 6);
        // One BMP char, one surrogate pair
        assert_eq!(utf16_bytes("é😀"), 6);
    }

    #[test]
    fn test_item_size() {
        // "42.5" is 4 code units
        let size = item_size("price", &Arbitrary::from(42.5)).unwrap();
        assert_eq!(size.key_size, 10);
        assert_eq!(size.value_size, 8);
        assert_eq!(size.total_size, 18);
    }

    #[test]
    fn test_memory_usage_totals() {
        let entries = vec![
            ("a".to_string(), Arbitrary::from("xy")),
            ("bb".to_string(), Arbitrary::Null),
        ];

        let report = calculate_memory_usage(&entries).unwrap();
        // "a" + "\"xy\"" = 2 + 8, "bb" + "null" = 4 + 8
        assert_eq!(report.item_sizes["a"].total_size, 10);
        assert_eq!(report.item_sizes["bb"].total_size, 12);
        assert_eq!(report.total_size, 22);
    }

    #[test]
    fn test_duplicate_key_counted_once() {
        let entries = vec![
            ("a".to_string(), Arbitrary::from("long value")),
            ("a".to_string(), Arbitrary::Null),
        ];

        let report = calculate_memory_usage(&entries).unwrap();
        assert_eq!(report.item_sizes.len(), 1);
        assert_eq!(report.total_size, 2 + 8);
    }

    #[test]
    fn test_unserializable_value_fails() {
        let entries = vec![("nan".to_string(), Arbitrary::Number(f64::NAN))];
        assert!(matches!(
            calculate_memory_usage(&entries),
            Err(CacheError::Serialization(_))
        ));
    }
}
