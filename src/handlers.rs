pub mod medicines_cache;
pub mod stock_adjustments;
pub mod stock_taking;

use validator::ValidationError;

use crate::common::error::field_error;

// ---
// Validações customizadas compartilhadas pelos payloads
// ---
pub(crate) fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(field_error("required", "validation.required"));
    }
    Ok(())
}

pub(crate) fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_is_rejected() {
        assert!(validate_not_blank("   ").is_err());
        assert!(validate_not_blank("MED001").is_ok());
    }

    #[test]
    fn trimmed_drops_empty_values() {
        assert_eq!(trimmed(Some("  ".into())), None);
        assert_eq!(trimmed(Some(" Filial ".into())).as_deref(), Some("Filial"));
    }
}
