//! Internal helpers: IDs and timestamps.
//!
//! Kept dependency-free — a random v4 UUID from `OsRng` and ISO 8601
//! formatting from epoch seconds, no `uuid` or `chrono` needed.

use rand::rngs::OsRng;
use rand::RngCore;

/// Generate a random version-4 UUID string.
pub(crate) fn generate_uuid() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);

    // Set version (4) and variant (RFC 4122).
    bytes[6] = (bytes[6] & 0x0F) | 0x40;
    bytes[8] = (bytes[8] & 0x3F) | 0x80;

    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3],
        bytes[4], bytes[5],
        bytes[6], bytes[7],
        bytes[8], bytes[9],
        bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15],
    )
}

/// Current UNIX time in seconds.
pub(crate) fn now_unix_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Current UTC time as an ISO 8601 string (`YYYY-MM-DDTHH:MM:SSZ`).
pub(crate) fn now_iso8601() -> String {
    iso8601_from_epoch(now_unix_secs())
}

/// Format epoch seconds as an ISO 8601 UTC string.
pub(crate) fn iso8601_from_epoch(epoch_secs: u64) -> String {
    let (year, month, day, hour, minute, second) = epoch_to_utc(epoch_secs);
    format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}Z")
}

/// Convert epoch seconds to (year, month, day, hour, minute, second) in UTC.
///
/// Civil-calendar computation valid for years 1970–9999, adapted from
/// Howard Hinnant's `civil_from_days`.
#[allow(clippy::arithmetic_side_effects)]
const fn epoch_to_utc(epoch_secs: u64) -> (u64, u64, u64, u64, u64, u64) {
    let secs_per_day: u64 = 86_400;
    let total_days = epoch_secs / secs_per_day;
    let remaining_secs = epoch_secs % secs_per_day;

    let hour = remaining_secs / 3600;
    let minute = (remaining_secs % 3600) / 60;
    let second = remaining_secs % 60;

    // Days since 0000-03-01 (shifted epoch for leap-year handling).
    let z = total_days + 719_468;
    let era = z / 146_097;
    let doe = z % 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let year = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if month <= 2 { year + 1 } else { year };

    (year, month, day, hour, minute, second)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_uuid_format() {
        let uuid = generate_uuid();
        assert_eq!(uuid.len(), 36);
        assert_eq!(uuid.chars().nth(14), Some('4')); // version 4
        let variant_char = uuid.chars().nth(19).expect("char at pos 19");
        assert!(['8', '9', 'a', 'b'].contains(&variant_char));
    }

    #[test]
    fn generate_uuid_unique() {
        assert_ne!(generate_uuid(), generate_uuid());
    }

    #[test]
    fn iso8601_unix_epoch() {
        assert_eq!(iso8601_from_epoch(0), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn iso8601_known_date() {
        // 2026-02-09T00:00:00Z
        assert_eq!(iso8601_from_epoch(1_770_595_200), "2026-02-09T00:00:00Z");
    }

    #[test]
    fn iso8601_leap_day() {
        // 2024-02-29T12:00:00Z
        assert_eq!(iso8601_from_epoch(1_709_208_000), "2024-02-29T12:00:00Z");
    }
}
