use crate::traits::OrderFlowError;

pub const DEFAULT_CANCELLATION_REASON: &str = "No reason provided";

/// Trims a free-text reason, substituting the default when it is empty.
///
/// Reasons longer than `max_len` characters are refused rather than truncated.
pub fn normalize_reason(reason: Option<&str>, max_len: usize) -> Result<String, OrderFlowError> {
    let reason = reason.map(str::trim).unwrap_or_default();
    if reason.is_empty() {
        return Ok(DEFAULT_CANCELLATION_REASON.to_string());
    }
    let len = reason.chars().count();
    if len > max_len {
        return Err(OrderFlowError::validation(format!(
            "The reason is {len} characters long. The maximum is {max_len} characters."
        )));
    }
    Ok(reason.to_string())
}

/// The trimmed value, or `None` if it is missing or blank.
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reasons() {
        assert_eq!(normalize_reason(None, 500).unwrap(), DEFAULT_CANCELLATION_REASON);
        assert_eq!(normalize_reason(Some("   "), 500).unwrap(), DEFAULT_CANCELLATION_REASON);
        assert_eq!(normalize_reason(Some("  changed my mind "), 500).unwrap(), "changed my mind");
        let exactly = "é".repeat(500);
        assert_eq!(normalize_reason(Some(exactly.as_str()), 500).unwrap(), exactly);
        let too_long = "x".repeat(501);
        assert!(matches!(normalize_reason(Some(too_long.as_str()), 500), Err(OrderFlowError::ValidationError(_))));
    }

    #[test]
    fn blanks() {
        assert_eq!(non_blank(None), None);
        assert_eq!(non_blank(Some(" \t")), None);
        assert_eq!(non_blank(Some(" TRK-1 ")), Some("TRK-1".to_string()));
    }
}
