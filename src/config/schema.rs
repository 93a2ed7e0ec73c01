//! Configuration schema for Holdings
//!
//! Configuration is stored at `~/.config/holdings/config.toml`

use crate::collection::SnapshotCodec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Collection index settings
    pub collection: CollectionConfig,
}

/// Collection index configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Directory holding collection snapshots. Unset means the index
    /// lives in memory only and vanishes at process end.
    pub path: Option<PathBuf>,

    /// Snapshot serialization: "json" or "compact"
    pub codec: SnapshotCodec,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_in_memory_json() {
        let config = Config::default();
        assert!(config.collection.path.is_none());
        assert_eq!(config.collection.codec, SnapshotCodec::Json);
    }

    #[test]
    fn parse_partial_config() {
        let config: Config = toml::from_str(
            r#"
            [collection]
            path = "/var/lib/holdings"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.collection.path,
            Some(PathBuf::from("/var/lib/holdings"))
        );
        assert_eq!(config.collection.codec, SnapshotCodec::Json);
    }

    #[test]
    fn parse_codec_names() {
        let config: Config = toml::from_str("collection = { codec = \"compact\" }").unwrap();
        assert_eq!(config.collection.codec, SnapshotCodec::Compact);

        assert!(toml::from_str::<Config>("collection = { codec = \"cbor\" }").is_err());
    }
}
