use crate::error::{QuarryError, Result};

/// Default read chunk size: 64 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Default number of record appends between catalog commits.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default acuity threshold applied after import.
pub const DEFAULT_ACUITY: u64 = 5;

/// Encoded sources larger than this prefer an external streaming decoder
/// when one is configured in the environment.
pub const LARGE_FILE_CUTOFF: u64 = 4 * 1024 * 1024 * 1024;

/// Parse a byte-size string with an optional unit suffix.
///
/// Accepted forms: `64`, `1K`, `1KB`, `10M`, `10MB`, `2G`, `2GB`
/// (case-insensitive). A bare integer means kibibytes. Any other suffix is
/// rejected.
pub fn parse_byte_size(spec: &str) -> Result<u64> {
    let spec = spec.trim();
    let digits_end = spec
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(spec.len());
    let (number, unit) = spec.split_at(digits_end);
    if number.is_empty() {
        return Err(QuarryError::InvalidSize(spec.to_string()));
    }
    let number: u64 = number
        .parse()
        .map_err(|_| QuarryError::InvalidSize(spec.to_string()))?;

    let multiplier: u64 = match unit.trim().to_ascii_uppercase().as_str() {
        // A bare number means kibibytes.
        "" | "K" | "KB" => 1024,
        "M" | "MB" => 1024 * 1024,
        "G" | "GB" => 1024 * 1024 * 1024,
        _ => return Err(QuarryError::InvalidSize(spec.to_string())),
    };

    number
        .checked_mul(multiplier)
        .ok_or_else(|| QuarryError::InvalidSize(spec.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_number_means_kibibytes() {
        assert_eq!(parse_byte_size("64").unwrap(), 64 * 1024);
        assert_eq!(parse_byte_size("1").unwrap(), 1024);
    }

    #[test]
    fn test_unit_suffixes() {
        assert_eq!(parse_byte_size("64K").unwrap(), 64 * 1024);
        assert_eq!(parse_byte_size("64KB").unwrap(), 64 * 1024);
        assert_eq!(parse_byte_size("10MB").unwrap(), 10 * 1024 * 1024);
        assert_eq!(parse_byte_size("2gb").unwrap(), 2 * 1024 * 1024 * 1024);
        assert_eq!(parse_byte_size(" 1 mb ").unwrap(), 1024 * 1024);
    }

    #[test]
    fn test_rejects_bad_specs() {
        assert!(parse_byte_size("").is_err());
        assert!(parse_byte_size("MB").is_err());
        assert!(parse_byte_size("10TB").is_err());
        assert!(parse_byte_size("10X").is_err());
        assert!(parse_byte_size("-5K").is_err());
    }
}
