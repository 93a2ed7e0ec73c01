//! Cached dataset version summaries
//!
//! A [`VersionInfo`] is one row of a profile's collection: a derived,
//! rebuildable snapshot of what a dataset lineage currently looks like.
//! The listing fields are cached values gathered from other subsystems
//! and must be kept in sync as those subsystems mutate their state.

use crate::error::{HoldingsError, HoldingsResult};
use crate::identity::ProfileId;
use crate::record::{EntryRecord, EntryRecordBuilder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One cached record describing a dataset lineage for one profile
///
/// `init_id`, `profile_id`, `username`, and `name` are required and
/// validated on insert; everything else is advisory, derived data that
/// defaults to empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionInfo {
    /// Stable identifier for the dataset's lineage, unique within a
    /// profile's collection
    pub init_id: String,

    /// Owning profile
    pub profile_id: ProfileId,

    /// Handle of the user the dataset belongs to
    pub username: String,

    /// Human-readable dataset name; collections sort by this
    pub name: String,

    /// Display title from dataset metadata
    #[serde(skip_serializing_if = "String::is_empty")]
    pub meta_title: String,

    /// Theme tags from dataset metadata
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub themes: Vec<String>,

    /// Reference to the head version in the content-addressed store
    #[serde(skip_serializing_if = "String::is_empty")]
    pub head_ref: String,

    /// Filesystem path the dataset is checked out to, if linked
    #[serde(skip_serializing_if = "String::is_empty")]
    pub fsi_path: String,

    /// Body size in bytes
    pub body_size: i64,

    /// Body row count
    pub body_rows: i32,

    /// When the head version was committed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_time: Option<DateTime<Utc>>,

    /// Count of validation errors on the head version
    pub num_errors: i32,

    /// Position of the newest known version in the history sequence
    pub top_index: i32,

    /// Position of the currently selected version; never exceeds
    /// `top_index`
    pub cursor_index: i32,
}

impl VersionInfo {
    /// Create an entry with the required fields set
    pub fn new(
        profile_id: ProfileId,
        init_id: impl Into<String>,
        username: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            init_id: init_id.into(),
            profile_id,
            username: username.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Check the required fields, failing on the first one missing
    pub fn validate(&self) -> HoldingsResult<()> {
        if self.profile_id.is_zero() {
            return Err(HoldingsError::MissingField {
                field: "profile ID",
            });
        }
        if self.init_id.is_empty() {
            return Err(HoldingsError::MissingField { field: "init ID" });
        }
        if self.username.is_empty() {
            return Err(HoldingsError::MissingField { field: "username" });
        }
        if self.name.is_empty() {
            return Err(HoldingsError::MissingField { field: "name" });
        }

        // A cursor past the newest known version is a caller bug, not a
        // recoverable runtime state.
        debug_assert!(
            self.cursor_index >= 0 && self.top_index >= self.cursor_index,
            "navigation indices out of order: top {} cursor {}",
            self.top_index,
            self.cursor_index,
        );

        Ok(())
    }

    /// Encode this entry as a compact cache record
    ///
    /// Numeric fields are always materialized so they stay mutable in
    /// place; empty byte fields are left absent. The record schema has
    /// no username slot — snapshot codecs carry the username alongside.
    pub fn to_record(&self) -> EntryRecord {
        let mut b = EntryRecordBuilder::new()
            .init_id(self.init_id.as_bytes())
            .profile_id(self.profile_id.as_bytes())
            .pretty_name(self.name.as_bytes())
            .top_index(self.top_index)
            .cursor_index(self.cursor_index)
            .body_size(self.body_size)
            .body_rows(self.body_rows)
            .commit_time(self.commit_time.map(|t| t.timestamp()).unwrap_or(0))
            .num_errors(self.num_errors);

        if !self.meta_title.is_empty() {
            b = b.meta_title(self.meta_title.as_bytes());
        }
        if !self.themes.is_empty() {
            b = b.theme_list(self.themes.join(",").as_bytes());
        }
        if !self.head_ref.is_empty() {
            b = b.head_ref(self.head_ref.as_bytes());
        }
        if !self.fsi_path.is_empty() {
            b = b.fsi_path(self.fsi_path.as_bytes());
        }

        b.build()
    }

    /// Decode an entry from a compact cache record
    ///
    /// The returned entry has an empty `username`; the record schema does
    /// not carry one, so callers supply it separately.
    pub fn from_record(rec: &EntryRecord) -> HoldingsResult<Self> {
        let theme_list = utf8_field(rec.theme_list(), "theme list")?;
        let themes = if theme_list.is_empty() {
            Vec::new()
        } else {
            theme_list.split(',').map(str::to_string).collect()
        };

        Ok(Self {
            init_id: utf8_field(rec.init_id(), "init ID")?,
            profile_id: ProfileId::from_slice(rec.profile_id())?,
            username: String::new(),
            name: utf8_field(rec.pretty_name(), "pretty name")?,
            meta_title: utf8_field(rec.meta_title(), "meta title")?,
            themes,
            head_ref: utf8_field(rec.head_ref(), "head ref")?,
            fsi_path: utf8_field(rec.fsi_path(), "FSI path")?,
            body_size: rec.body_size(),
            body_rows: rec.body_rows(),
            commit_time: match rec.commit_time() {
                0 => None,
                secs => DateTime::from_timestamp(secs, 0),
            },
            num_errors: rec.num_errors(),
            top_index: rec.top_index(),
            cursor_index: rec.cursor_index(),
        })
    }
}

fn utf8_field(bytes: &[u8], field: &'static str) -> HoldingsResult<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| HoldingsError::MalformedRecord {
        reason: format!("{field} is not valid UTF-8"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn alice() -> ProfileId {
        ProfileId::from_key_digest(b"alice public key")
    }

    #[test]
    fn validate_required_fields() {
        let info = VersionInfo::new(alice(), "init-1", "alice", "temps");
        assert!(info.validate().is_ok());

        let mut missing = info.clone();
        missing.username = String::new();
        let err = missing.validate().unwrap_err();
        assert!(matches!(
            err,
            HoldingsError::MissingField { field: "username" }
        ));

        let mut missing = info.clone();
        missing.profile_id = ProfileId::default();
        assert!(missing.validate().is_err());

        let mut missing = info;
        missing.init_id = String::new();
        assert!(missing.validate().is_err());
    }

    #[test]
    fn record_roundtrip() {
        let mut info = VersionInfo::new(alice(), "init-1", "alice", "temps");
        info.meta_title = "City temperatures".to_string();
        info.themes = vec!["weather".to_string(), "climate".to_string()];
        info.head_ref = "/store/QmHead".to_string();
        info.fsi_path = "/home/alice/temps".to_string();
        info.body_size = 4096;
        info.body_rows = 120;
        info.commit_time = Some(Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap());
        info.num_errors = 1;
        info.top_index = 4;
        info.cursor_index = 2;

        let rec = info.to_record();
        let mut back = VersionInfo::from_record(&rec).unwrap();
        assert_eq!(back.username, "");

        back.username = info.username.clone();
        assert_eq!(back, info);
    }

    #[test]
    fn record_zero_fields_stay_empty() {
        let info = VersionInfo::new(alice(), "init-1", "alice", "temps");
        let rec = info.to_record();

        assert_eq!(rec.meta_title(), b"");
        assert_eq!(rec.theme_list(), b"");
        assert_eq!(rec.commit_time(), 0);

        let back = VersionInfo::from_record(&rec).unwrap();
        assert!(back.themes.is_empty());
        assert!(back.commit_time.is_none());
    }

    #[test]
    fn record_indices_mutable_after_encoding() {
        let info = VersionInfo::new(alice(), "init-1", "alice", "temps");
        let mut rec = info.to_record();

        // Freshly-encoded entries carry zero indices, but new versions
        // arrive without re-encoding the whole record.
        assert!(rec.set_top_index(1));
        assert!(rec.set_body_size(8192));

        let back = VersionInfo::from_record(&rec).unwrap();
        assert_eq!(back.top_index, 1);
        assert_eq!(back.body_size, 8192);
    }

    #[test]
    fn json_roundtrip() {
        let mut info = VersionInfo::new(alice(), "init-1", "alice", "temps");
        info.commit_time = Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap());

        let json = serde_json::to_string(&info).unwrap();
        let back: VersionInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, info);
    }
}
