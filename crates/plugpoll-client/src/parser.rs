use plugpoll_core::error::AppError;
use plugpoll_core::models::Metrics;
use plugpoll_core::traits::MetricsParser;
use serde_json::Value;

/// Parser for the `Switch.GetStatus` document of Shelly Plus plugs.
///
/// Reads `voltage`, `apower` and `current` from the top level and `tC`/`tF`
/// from the `temperature` object. A missing field is `NotFound`; a field of
/// the wrong type is `InvalidInput`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellyParser;

impl ShellyParser {
    pub fn new() -> Self {
        Self
    }
}

impl MetricsParser for ShellyParser {
    fn parse(&self, body: &[u8]) -> Result<Metrics, AppError> {
        let document: Value = serde_json::from_slice(body)
            .map_err(|e| AppError::InvalidInput(format!("Failed to parse JSON: {e}")))?;

        let voltage = number_field(&document, "voltage")?;
        let power = number_field(&document, "apower")?;
        let current = number_field(&document, "current")?;

        let temperature = object_field(&document, "temperature")?;
        let temperature_c = number_field(temperature, "tC")?;
        let temperature_f = number_field(temperature, "tF")?;

        Ok(Metrics {
            power,
            voltage,
            current,
            temperature_c,
            temperature_f,
        })
    }

    fn version(&self) -> &str {
        concat!("serde_json (plugpoll-client ", env!("CARGO_PKG_VERSION"), ")")
    }
}

fn field<'a>(parent: &'a Value, name: &str) -> Result<&'a Value, AppError> {
    parent
        .get(name)
        .ok_or_else(|| AppError::NotFound(format!("Missing JSON field \"{name}\" in: {parent}")))
}

fn object_field<'a>(parent: &'a Value, name: &str) -> Result<&'a Value, AppError> {
    let value = field(parent, name)?;
    if !value.is_object() {
        return Err(AppError::InvalidInput(format!(
            "JSON field \"{name}\" is not an object: {parent}"
        )));
    }
    Ok(value)
}

fn number_field(parent: &Value, name: &str) -> Result<f64, AppError> {
    field(parent, name)?.as_f64().ok_or_else(|| {
        AppError::InvalidInput(format!("JSON field \"{name}\" is not a number: {parent}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS: &str = r#"{
        "id": 0,
        "source": "init",
        "output": true,
        "apower": 100.0,
        "voltage": 120.0,
        "current": 12.0,
        "aenergy": {"total": 1234.5, "by_minute": [0.0, 0.0, 0.0]},
        "temperature": {"tC": 28.0, "tF": 82.4}
    }"#;

    #[test]
    fn parses_switch_status() {
        let metrics = ShellyParser.parse(STATUS.as_bytes()).unwrap();

        assert_eq!(
            metrics,
            Metrics {
                power: 100.0,
                voltage: 120.0,
                current: 12.0,
                temperature_c: 28.0,
                temperature_f: 82.4,
            }
        );
    }

    #[test]
    fn integer_values_are_accepted() {
        let body = r#"{"voltage": 230, "apower": 0, "current": 0,
                       "temperature": {"tC": 30, "tF": 86}}"#;
        let metrics = ShellyParser.parse(body.as_bytes()).unwrap();
        assert_eq!(metrics.voltage, 230.0);
        assert_eq!(metrics.temperature_f, 86.0);
    }

    #[test]
    fn empty_body_is_invalid() {
        let err = ShellyParser.parse(b"").unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidInput(ref msg) if msg.starts_with("Failed to parse JSON")
        ));
    }

    #[test]
    fn non_json_is_invalid() {
        let err = ShellyParser.parse(b"not json").unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn missing_top_level_field_is_not_found() {
        let body = r#"{"apower": 100.0, "current": 12.0,
                       "temperature": {"tC": 28.0, "tF": 82.0}}"#;
        let err = ShellyParser.parse(body.as_bytes()).unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref msg) if msg.contains("\"voltage\"")));
    }

    #[test]
    fn missing_temperature_object_is_not_found() {
        let body = r#"{"voltage": 120.0, "apower": 100.0, "current": 12.0}"#;
        let err = ShellyParser.parse(body.as_bytes()).unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref msg) if msg.contains("\"temperature\"")));
    }

    #[test]
    fn missing_nested_field_is_not_found() {
        let body = r#"{"voltage": 120.0, "apower": 100.0, "current": 12.0,
                       "temperature": {"tC": 28.0}}"#;
        let err = ShellyParser.parse(body.as_bytes()).unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref msg) if msg.contains("\"tF\"")));
    }

    #[test]
    fn wrong_types_are_invalid() {
        let body = r#"{"voltage": "120", "apower": 100.0, "current": 12.0,
                       "temperature": {"tC": 28.0, "tF": 82.0}}"#;
        let err = ShellyParser.parse(body.as_bytes()).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(ref msg) if msg.contains("not a number")));

        let body = r#"{"voltage": 120.0, "apower": 100.0, "current": 12.0,
                       "temperature": 28.0}"#;
        let err = ShellyParser.parse(body.as_bytes()).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(ref msg) if msg.contains("not an object")));
    }

    #[test]
    fn non_object_document_has_no_fields() {
        let err = ShellyParser.parse(b"[1, 2, 3]").unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn version_names_json_library() {
        assert!(ShellyParser.version().starts_with("serde_json"));
    }
}
