//! Shared storage-boundary codecs: JSON string lists in TEXT columns and
//! RFC3339 timestamps. Every call site goes through these; no query
//! hand-rolls its own parsing.

use time::OffsetDateTime;

use crate::error::StoreError;

/// RFC3339 rendering of the Unix epoch, the default for timestamp columns
/// added to tables that predate them.
pub const EPOCH_RFC3339: &str = "1970-01-01T00:00:00Z";

/// Encode a string list as a JSON array for a TEXT column.
///
/// # Errors
/// Returns an error when serialization fails (practically unreachable for
/// string vectors).
pub fn encode_list(values: &[String]) -> Result<String, StoreError> {
    serde_json::to_string(values)
        .map_err(|err| StoreError::Planning(format!("failed to encode string list: {err}")))
}

/// Decode a TEXT column holding a JSON array of strings. Legacy rows may
/// hold a bare scalar instead of an array; that decodes as a one-element
/// list. NULL-equivalent blanks decode as empty.
#[must_use]
pub fn decode_list(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<String>>(trimmed) {
        Ok(values) => values,
        Err(_) => vec![trimmed.to_string()],
    }
}

/// Normalize a legacy column value to JSON-list form: already-a-list values
/// pass through, scalars are wrapped as a one-element list.
///
/// # Errors
/// Returns an error when re-encoding fails.
pub fn ensure_list(raw: &str) -> Result<String, StoreError> {
    encode_list(&decode_list(raw))
}

/// # Errors
/// Returns an error when the system clock cannot be formatted, which only
/// happens for out-of-range timestamps.
pub fn now_rfc3339() -> Result<String, StoreError> {
    rfc3339(OffsetDateTime::now_utc())
}

/// # Errors
/// Returns an error when the value is outside the RFC3339 representable range.
pub fn rfc3339(value: OffsetDateTime) -> Result<String, StoreError> {
    value
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|err| StoreError::Timestamp(err.to_string()))
}

/// # Errors
/// Returns an error when the text is not a valid RFC3339 timestamp.
pub fn parse_rfc3339(value: &str) -> Result<OffsetDateTime, StoreError> {
    OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .map_err(|err| StoreError::Timestamp(format!("invalid RFC3339 timestamp {value}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_codec_round_trips() -> Result<(), StoreError> {
        let values = vec!["geometric".to_string(), "floral".to_string()];
        let encoded = encode_list(&values)?;
        assert_eq!(decode_list(&encoded), values);
        Ok(())
    }

    #[test]
    fn legacy_scalar_decodes_as_single_item_list() {
        assert_eq!(decode_list("digital_download"), vec!["digital_download".to_string()]);
        assert_eq!(decode_list(""), Vec::<String>::new());
        assert_eq!(decode_list("   "), Vec::<String>::new());
    }

    #[test]
    fn ensure_list_wraps_scalars_and_keeps_lists() -> Result<(), StoreError> {
        assert_eq!(ensure_list("printable")?, r#"["printable"]"#);
        assert_eq!(ensure_list(r#"["a","b"]"#)?, r#"["a","b"]"#);
        assert_eq!(ensure_list("")?, "[]");
        Ok(())
    }

    #[test]
    fn epoch_constant_parses() -> Result<(), StoreError> {
        let parsed = parse_rfc3339(EPOCH_RFC3339)?;
        assert_eq!(parsed, OffsetDateTime::UNIX_EPOCH);
        Ok(())
    }
}
