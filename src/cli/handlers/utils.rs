//! Shared helpers for command handlers

use std::io::Write;

use alloy::primitives::Address;

use crate::Result;
use crate::StakeKeysError;

/// Parse a module address given on the command line
///
/// # Errors
/// - Not a 20-byte hex address
pub fn parse_address(raw: &str) -> Result<Address> {
    raw.trim()
        .parse::<Address>()
        .map_err(|e| StakeKeysError::Custom(format!("invalid address '{raw}': {e}")))
}

/// Render a unix timestamp as UTC, falling back to the raw number
#[must_use]
pub fn format_timestamp(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
        .map_or_else(
            || timestamp.to_string(),
            |dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        )
}

/// Ask for a y/N confirmation on stdin
///
/// # Errors
/// - Stdin/stdout I/O errors
pub fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// Shorten a long hex string for tables
#[must_use]
pub fn abbreviate(hex: &str) -> String {
    if hex.len() <= 14 {
        return hex.to_string();
    }
    format!("{}…{}", &hex[..8], &hex[hex.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        let address = parse_address(" 0x595F64Ddc3856a3b5Ff4f4CC1d1fb4B46cFd2bAC ").unwrap();
        assert_eq!(
            format!("{address:#x}"),
            "0x595f64ddc3856a3b5ff4f4cc1d1fb4b46cfd2bac"
        );
        assert!(parse_address("0x1234").is_err());
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
        assert_eq!(format_timestamp(u64::MAX), u64::MAX.to_string());
    }

    #[test]
    fn test_abbreviate() {
        assert_eq!(abbreviate("0x1234"), "0x1234");
        assert_eq!(abbreviate("0xaabbccddeeff00112233"), "0xaabbcc…2233");
    }
}
