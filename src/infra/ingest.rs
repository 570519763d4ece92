use std::{fmt, path::Path};

use anyhow::{Context, Error};
use log::info;

use crate::domain::{
    catalog::SpecificationCatalog,
    error::{OrchestrationError, Result},
    spec::ServiceRecord,
};

/// Serialized formats a catalog file may use, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
}

impl Format {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|extension| extension.to_str())
            .unwrap_or_default();
        match extension.to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "yaml" | "yml" => Ok(Format::Yaml),
            _ => Err(OrchestrationError::UnsupportedFormat(extension.to_string())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::Json => "json",
            Format::Yaml => "yaml",
        })
    }
}

/// Raw records in file order, not yet validated.
pub fn deserialize(bytes: &[u8], format: Format) -> std::result::Result<Vec<ServiceRecord>, Error> {
    match format {
        Format::Json => serde_json::from_slice(bytes).context("Invalid JSON catalog"),
        Format::Yaml => serde_yaml::from_slice(bytes).context("Invalid YAML catalog"),
    }
}

/// Reads, deserializes and validates a catalog file.
///
/// The extension is checked before the file is opened.
pub fn load_catalog(path: impl AsRef<Path>) -> Result<SpecificationCatalog> {
    let path = path.as_ref();
    let format = Format::from_path(path)?;
    let bytes = std::fs::read(path).map_err(|source| OrchestrationError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let records =
        deserialize(&bytes, format).map_err(|e| OrchestrationError::Deserialization {
            path: path.display().to_string(),
            reason: format!("{:#}", e),
        })?;
    info!(
        "Loaded {} service record(s) from {} ({})",
        records.len(),
        path.display(),
        format
    );
    SpecificationCatalog::new(records)
}
