//! Loading the target list from a JSON file.
//!
//! The file is a single object mapping target names to hostnames:
//!
//! ```json
//! { "kitchen": "192.168.1.20", "office": "plug-office.local" }
//! ```

use std::path::Path;

use serde_json::Value;

use crate::error::AppError;
use crate::models::Target;

/// Read the targets file at `path`. Targets are returned sorted by name.
pub fn load_targets(path: impl AsRef<Path>) -> Result<Vec<Target>, AppError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        AppError::InvalidInput(format!("Failed to open file {}: {e}", path.display()))
    })?;
    parse_targets(&contents).map_err(|e| e.context(path.display()))
}

/// Parse a targets document.
pub fn parse_targets(contents: &str) -> Result<Vec<Target>, AppError> {
    let document: Value = serde_json::from_str(contents)
        .map_err(|e| AppError::InvalidInput(format!("Failed to parse file as JSON: {e}")))?;

    let Value::Object(entries) = document else {
        return Err(AppError::InvalidInput(
            "Top-level configuration is not an object".into(),
        ));
    };

    let mut targets = entries
        .into_iter()
        .map(|(name, value)| match value {
            Value::String(hostname) => Ok(Target::new(name, hostname)),
            _ => Err(AppError::InvalidInput(format!(
                "Value for \"{name}\" is not a string"
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    targets.sort_by(|a, b| a.name.cmp(&b.name));

    tracing::debug!(count = targets.len(), "Loaded targets");
    Ok(targets)
}
