use crate::errors::ToolError;
use serde_json::Value;

/// Argument extraction for tool handlers. The catalog schema has already
/// run by the time a handler sees its args; these checks keep handlers
/// honest when called directly.
#[derive(Clone, Default)]
pub struct Validation;

impl Validation {
    pub fn new() -> Self {
        Self
    }

    pub fn ensure_string(
        &self,
        value: &Value,
        label: &str,
        trim: bool,
    ) -> Result<String, ToolError> {
        let text = value.as_str().ok_or_else(|| {
            ToolError::invalid_params(format!("{} must be a non-empty string", label))
        })?;
        let normalized = text.trim();
        if normalized.is_empty() {
            return Err(ToolError::invalid_params(format!(
                "{} must be a non-empty string",
                label
            )));
        }
        Ok(if trim {
            normalized.to_string()
        } else {
            text.to_string()
        })
    }

    /// A node address usable as a single URL path segment: IPv4, IPv6 or a
    /// hostname. Dot segments and anything outside that alphabet are refused.
    pub fn ensure_node_address(&self, value: &Value, label: &str) -> Result<String, ToolError> {
        let address = self.ensure_string(value, label, true)?;
        let allowed = |ch: char| ch.is_ascii_alphanumeric() || matches!(ch, '.' | ':' | '-' | '_');
        if address == "." || address == ".." || !address.chars().all(allowed) {
            return Err(ToolError::invalid_params(format!(
                "{} must be an IP address or hostname",
                label
            ))
            .with_details(serde_json::json!({ label: address })));
        }
        Ok(address)
    }

    pub fn ensure_optional_string(
        &self,
        value: Option<&Value>,
        label: &str,
        trim: bool,
    ) -> Result<Option<String>, ToolError> {
        match value {
            None => Ok(None),
            Some(val) if val.is_null() => Ok(None),
            Some(val) => self.ensure_string(val, label, trim).map(Some),
        }
    }

    /// A string that may legitimately be empty.
    pub fn ensure_text(&self, value: Option<&Value>, label: &str) -> Result<String, ToolError> {
        match value {
            None => Ok(String::new()),
            Some(Value::Null) => Ok(String::new()),
            Some(Value::String(text)) => Ok(text.clone()),
            Some(_) => Err(ToolError::invalid_params(format!(
                "{} must be a string",
                label
            ))),
        }
    }

    /// Whole or fractional seconds, returned as milliseconds.
    pub fn ensure_timeout_ms(
        &self,
        value: Option<&Value>,
        label: &str,
        default_secs: u64,
    ) -> Result<u64, ToolError> {
        let secs = match value {
            None | Some(Value::Null) => return Ok(default_secs.saturating_mul(1000)),
            Some(val) => val.as_f64().ok_or_else(|| {
                ToolError::invalid_params(format!("{} must be a number of seconds", label))
            })?,
        };
        if !secs.is_finite() || secs <= 0.0 {
            return Err(ToolError::invalid_params(format!(
                "{} must be a positive number of seconds",
                label
            )));
        }
        Ok((secs * 1000.0).round() as u64)
    }

    pub fn ensure_object<'a>(
        &self,
        value: &'a Value,
        label: &str,
    ) -> Result<&'a serde_json::Map<String, Value>, ToolError> {
        value
            .as_object()
            .ok_or_else(|| ToolError::invalid_params(format!("{} must be an object", label)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ensure_string_rejects_blank_and_non_strings() {
        let v = Validation::new();
        assert_eq!(v.ensure_string(&json!(" 1.2.3.4 "), "ip", true).unwrap(), "1.2.3.4");
        assert!(v.ensure_string(&json!("   "), "ip", true).is_err());
        assert!(v.ensure_string(&json!(5), "ip", true).is_err());
    }

    #[test]
    fn optional_string_treats_null_as_absent() {
        let v = Validation::new();
        assert_eq!(v.ensure_optional_string(None, "country", true).unwrap(), None);
        assert_eq!(
            v.ensure_optional_string(Some(&Value::Null), "country", true).unwrap(),
            None
        );
        assert_eq!(
            v.ensure_optional_string(Some(&json!("jp")), "country", true).unwrap(),
            Some("jp".to_string())
        );
    }

    #[test]
    fn text_allows_empty() {
        let v = Validation::new();
        assert_eq!(v.ensure_text(Some(&json!("")), "command").unwrap(), "");
        assert_eq!(v.ensure_text(None, "command").unwrap(), "");
        assert!(v.ensure_text(Some(&json!(1)), "command").is_err());
    }

    #[test]
    fn timeout_is_seconds_to_millis() {
        let v = Validation::new();
        assert_eq!(v.ensure_timeout_ms(None, "timeout", 60).unwrap(), 60_000);
        assert_eq!(v.ensure_timeout_ms(Some(&json!(5)), "timeout", 60).unwrap(), 5_000);
        assert_eq!(v.ensure_timeout_ms(Some(&json!(1.5)), "timeout", 60).unwrap(), 1_500);
        assert!(v.ensure_timeout_ms(Some(&json!(0)), "timeout", 60).is_err());
        assert!(v.ensure_timeout_ms(Some(&json!("10")), "timeout", 60).is_err());
    }
}
