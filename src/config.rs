use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    error::{KvfsError, KvfsResult},
    store::{Consistency, StoreNamespace},
};

/// Where in the store a filesystem's records live, and how writes are
/// acknowledged. Block geometry is not configurable: it is part of the
/// persisted layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KvfsConfig {
    pub table: String,
    pub column_family: String,
    pub column: String,
    pub consistency: Consistency,
}

impl Default for KvfsConfig {
    fn default() -> Self {
        Self {
            table: "Keyspace1".to_string(),
            column_family: "Standard1".to_string(),
            column: "data".to_string(),
            consistency: Consistency::One,
        }
    }
}

impl KvfsConfig {
    pub fn from_json(text: &str) -> KvfsResult<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| KvfsError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> KvfsResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| KvfsError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> KvfsResult<()> {
        for (field, value) in [
            ("table", &self.table),
            ("column_family", &self.column_family),
            ("column", &self.column),
        ] {
            if value.is_empty() {
                return Err(KvfsError::Config(format!("`{}` must not be empty", field)));
            }
        }
        Ok(())
    }

    pub fn namespace(&self) -> StoreNamespace {
        StoreNamespace {
            table: self.table.clone(),
            column_family: self.column_family.clone(),
            column: self.column.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = KvfsConfig::from_json(r#"{ "table": "Fs", "consistency": "quorum" }"#).unwrap();
        assert_eq!(config.table, "Fs");
        assert_eq!(config.column_family, "Standard1");
        assert_eq!(config.column, "data");
        assert_eq!(config.consistency, Consistency::Quorum);
    }

    #[test]
    fn empty_column_is_rejected() {
        let err = KvfsConfig::from_json(r#"{ "column": "" }"#).unwrap_err();
        assert!(matches!(err, KvfsError::Config(_)));
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(
            KvfsConfig::from_json("{ table"),
            Err(KvfsError::Config(_))
        ));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kvfs.json");
        std::fs::write(&path, r#"{ "column_family": "Files" }"#).unwrap();
        let config = KvfsConfig::load(&path).unwrap();
        assert_eq!(config.column_family, "Files");
        assert_eq!(config.namespace().table, "Keyspace1");
    }
}
