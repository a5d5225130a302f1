//! Shared helpers and error types for Stockpile.

use std::fs;
use std::path::Path;

use thiserror::Error;

/// Result type for shared helpers.
pub type UtilsResult<T> = Result<T, UtilsError>;

/// Shared error variants for cross-crate helpers.
#[derive(Debug, Error)]
pub enum UtilsError {
    /// An IO error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A parsing error occurred.
    #[error("parse error: {0}")]
    Parse(String),
}

/// Placeholder shown when a stored amount is not a number.
pub const NOT_A_NUMBER: &str = "N/A";

/// Compare two display names the way uniqueness rules do: case-insensitively,
/// ignoring surrounding whitespace.
pub fn names_match(left: &str, right: &str) -> bool {
    left.trim().to_lowercase() == right.trim().to_lowercase()
}

/// Parse a stored amount string into a finite number. Blank input counts as
/// zero.
pub fn parse_amount(raw: &str) -> UtilsResult<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(0.0);
    }
    let value: f64 = trimmed
        .parse()
        .map_err(|_| UtilsError::Parse(format!("not a number: {trimmed}")))?;
    if !value.is_finite() {
        return Err(UtilsError::Parse(format!("not a finite number: {trimmed}")));
    }
    Ok(value)
}

/// Round an amount to the nearest whole unit for display. Halves round up.
pub fn format_price(raw: &str) -> String {
    match parse_amount(raw) {
        Ok(value) => {
            let floor = value.floor();
            let rounded = if value - floor >= 0.5 { floor + 1.0 } else { floor };
            // Normalise negative zero.
            let rounded = if rounded == 0.0 { 0.0 } else { rounded };
            format!("{rounded:.0}")
        }
        Err(_) => NOT_A_NUMBER.to_string(),
    }
}

/// Write `contents` to `path` through a sibling temp file and a rename.
pub fn write_atomic(path: &Path, contents: &str) -> UtilsResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut temp_name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .ok_or_else(|| UtilsError::Parse(format!("no file name in {}", path.display())))?;
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);
    fs::write(&temp_path, contents)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_ignores_case_and_padding() {
        assert!(names_match("Shoes", "shoes"));
        assert!(names_match("  BAGS ", "bags"));
        assert!(!names_match("Shoes", "Shoe"));
    }

    #[test]
    fn price_rounds_to_whole_units() {
        assert_eq!(format_price("19.99"), "20");
        assert_eq!(format_price("19.49"), "19");
        assert_eq!(format_price("2.5"), "3");
        assert_eq!(format_price(" 7 "), "7");
        assert_eq!(format_price("0.2"), "0");
    }

    #[test]
    fn price_falls_back_to_placeholder() {
        assert_eq!(format_price("cheap"), NOT_A_NUMBER);
        assert_eq!(format_price("inf"), NOT_A_NUMBER);
        assert_eq!(format_price("NaN"), NOT_A_NUMBER);
    }

    #[test]
    fn blank_amount_parses_as_zero() {
        assert_eq!(parse_amount("").unwrap(), 0.0);
        assert!(matches!(parse_amount("abc"), Err(UtilsError::Parse(_))));
    }

    #[test]
    fn write_atomic_replaces_contents() {
        let temp = tempfile::TempDir::new().expect("temp dir");
        let path = temp.path().join("nested").join("value.json");
        write_atomic(&path, "[]").expect("first write");
        write_atomic(&path, "[1]").expect("second write");
        assert_eq!(fs::read_to_string(&path).unwrap(), "[1]");
        assert!(!temp.path().join("nested").join("value.json.tmp").exists());
    }
}
