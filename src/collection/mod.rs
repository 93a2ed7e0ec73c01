//! Per-profile dataset collections
//!
//! A collection is the list of datasets a profile knows about: created
//! locally, pulled from peers, or followed through the registry. It is
//! the canonical source for listing, but every field in it is a cached
//! value derived from other subsystems — the version store stays
//! authoritative, and a collection can always be rebuilt from it.
//!
//! Mutating subsystems keep the index current either by calling
//! [`WritableSet::put`] / [`WritableSet::delete`] directly or by
//! publishing on the dataset lifecycle topics, which a subscribed
//! [`LocalSet`] turns into the equivalent calls.

pub mod entry;
mod snapshot;

pub use entry::VersionInfo;

use crate::config::Config;
use crate::error::{HoldingsError, HoldingsResult};
use crate::event::{Bus, Event, Topic};
use crate::identity::ProfileId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// Announces a created or updated dataset version.
/// Payload: [`VersionInfo`]
pub const DATASET_SAVED: Topic = Topic("dataset:Saved");

/// Announces a dataset removed from a profile's collection.
/// Payload: [`DatasetRemoval`]
pub const DATASET_REMOVED: Topic = Topic("dataset:Removed");

/// Payload for [`DATASET_REMOVED`]
#[derive(Debug, Clone)]
pub struct DatasetRemoval {
    pub profile_id: ProfileId,
    pub init_id: String,
}

const COLLECTIONS_DIR_NAME: &str = "collections";

/// Pagination window for [`Set::list`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListParams {
    /// Entries to skip from the front of the collection
    pub offset: usize,
    /// Maximum entries to return; `None` returns everything after
    /// `offset`
    pub limit: Option<usize>,
}

impl ListParams {
    /// The whole collection, in order
    pub fn all() -> Self {
        Self::default()
    }

    /// A bounded page
    pub fn page(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: Some(limit),
        }
    }
}

/// On-disk serialization for collection snapshots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotCodec {
    /// One JSON array of entries per profile
    #[default]
    Json,
    /// Length-prefixed cache records, smaller and cheaper to scan
    Compact,
}

impl SnapshotCodec {
    /// Filename extension marking snapshots written with this codec
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Compact => "rec",
        }
    }
}

/// Read surface over per-profile dataset lists
pub trait Set: Send + Sync {
    /// List a profile's datasets in stored order
    ///
    /// Returns a point-in-time snapshot, not a live view; callers
    /// needing freshness must call again.
    fn list(&self, profile_id: ProfileId, params: ListParams) -> HoldingsResult<Vec<VersionInfo>>;
}

/// Extension of [`Set`] adding insertion and removal
pub trait WritableSet: Set {
    /// Insert or replace entries in a profile's collection
    ///
    /// Every entry is validated before any is committed; a validation
    /// failure leaves the collection untouched. An entry whose
    /// `init_id` already exists replaces the old one.
    fn put(&self, profile_id: ProfileId, entries: Vec<VersionInfo>) -> HoldingsResult<()>;

    /// Remove entries by lineage ID, all-or-nothing
    ///
    /// If any requested ID is missing the whole call fails and nothing
    /// is removed.
    fn delete(&self, profile_id: ProfileId, init_ids: &[&str]) -> HoldingsResult<()>;
}

type Collections = HashMap<ProfileId, Vec<VersionInfo>>;

/// Node-local collection set
///
/// One in-memory sequence per profile, guarded by a single lock; call
/// bodies are short slice operations plus (in persistent mode) one
/// synchronous snapshot write, so coarse locking holds up fine.
#[derive(Debug)]
pub struct LocalSet {
    base_path: Option<PathBuf>,
    codec: SnapshotCodec,
    collections: Mutex<Collections>,
}

impl LocalSet {
    /// Create a set that never touches the filesystem
    pub fn in_memory() -> Self {
        Self {
            base_path: None,
            codec: SnapshotCodec::default(),
            collections: Mutex::new(HashMap::new()),
        }
    }

    /// Open a persistent set rooted under `repo_dir`
    ///
    /// Creates a `collections` directory on first use; otherwise loads
    /// every snapshot in it. Any unreadable or undecodable snapshot is
    /// a hard error — the set must not start from silently partial
    /// state. Files without the codec's extension are ignored.
    pub fn open(repo_dir: &Path, codec: SnapshotCodec) -> HoldingsResult<Self> {
        let dir = repo_dir.join(COLLECTIONS_DIR_NAME);

        match fs::metadata(&dir) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                fs::create_dir_all(&dir).map_err(|e| {
                    HoldingsError::io(format!("creating collection directory {}", dir.display()), e)
                })?;
                Ok(Self {
                    base_path: Some(dir),
                    codec,
                    collections: Mutex::new(HashMap::new()),
                })
            }
            Err(e) => Err(HoldingsError::io(
                format!("checking collection directory {}", dir.display()),
                e,
            )),
            Ok(meta) if !meta.is_dir() => Err(HoldingsError::NotADirectory(dir)),
            Ok(_) => {
                let collections = Self::load_all(&dir, codec)?;
                info!(
                    profiles = collections.len(),
                    dir = %dir.display(),
                    "loaded collections"
                );
                Ok(Self {
                    base_path: Some(dir),
                    codec,
                    collections: Mutex::new(collections),
                })
            }
        }
    }

    /// Build a set from configuration: persistent when a collection
    /// path is set, in-memory otherwise
    pub fn from_config(config: &Config) -> HoldingsResult<Self> {
        match &config.collection.path {
            Some(path) => Self::open(path, config.collection.codec),
            None => Ok(Self::in_memory()),
        }
    }

    /// Wire the set to dataset lifecycle events
    ///
    /// Producers publishing on [`DATASET_SAVED`] and [`DATASET_REMOVED`]
    /// then drive the index without holding a reference to it. Handler
    /// errors (validation failures, missing IDs, persist failures)
    /// propagate to the publisher.
    pub fn subscribe(set: &Arc<Self>, bus: &dyn Bus) {
        let s = Arc::clone(set);
        bus.subscribe_topics(
            Arc::new(move |e: &Event| match e.payload.downcast_ref::<VersionInfo>() {
                Some(vi) => s.put(vi.profile_id, vec![vi.clone()]),
                None => Err(HoldingsError::UnexpectedPayload {
                    topic: DATASET_SAVED.0,
                }),
            }),
            &[DATASET_SAVED],
        );

        let s = Arc::clone(set);
        bus.subscribe_topics(
            Arc::new(move |e: &Event| match e.payload.downcast_ref::<DatasetRemoval>() {
                Some(rm) => s.delete(rm.profile_id, &[rm.init_id.as_str()]),
                None => Err(HoldingsError::UnexpectedPayload {
                    topic: DATASET_REMOVED.0,
                }),
            }),
            &[DATASET_REMOVED],
        );
    }

    fn load_all(dir: &Path, codec: SnapshotCodec) -> HoldingsResult<Collections> {
        let mut collections = HashMap::new();

        let entries = fs::read_dir(dir).map_err(|e| {
            HoldingsError::io(format!("reading collection directory {}", dir.display()), e)
        })?;

        for dir_entry in entries {
            let dir_entry = dir_entry.map_err(|e| {
                HoldingsError::io(format!("reading collection directory {}", dir.display()), e)
            })?;
            let path = dir_entry.path();

            if path.extension().and_then(OsStr::to_str) != Some(codec.extension()) {
                continue;
            }

            let stem = path
                .file_stem()
                .and_then(OsStr::to_str)
                .unwrap_or_default();
            let profile_id = ProfileId::from_str(stem)?;

            let items = Self::load_file(&path, codec)?;
            debug!(profile = %profile_id, entries = items.len(), "loaded collection snapshot");
            collections.insert(profile_id, items);
        }

        Ok(collections)
    }

    fn load_file(path: &Path, codec: SnapshotCodec) -> HoldingsResult<Vec<VersionInfo>> {
        let bytes = fs::read(path)
            .map_err(|e| HoldingsError::io(format!("reading snapshot {}", path.display()), e))?;

        match codec {
            SnapshotCodec::Json => Ok(serde_json::from_slice(&bytes)?),
            SnapshotCodec::Compact => snapshot::decode(&bytes, path),
        }
    }

    /// Persist one profile's sequence, replacing any previous snapshot
    ///
    /// Writes a sibling temp file and renames it over the target, so a
    /// crash mid-write leaves the previous snapshot intact.
    fn save_collection(&self, profile_id: ProfileId, items: &[VersionInfo]) -> HoldingsResult<()> {
        let Some(base) = &self.base_path else {
            return Ok(());
        };

        let path = base.join(format!("{profile_id}.{}", self.codec.extension()));
        let bytes = match self.codec {
            SnapshotCodec::Json => serde_json::to_vec_pretty(items)?,
            SnapshotCodec::Compact => snapshot::encode(items),
        };

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &bytes)
            .map_err(|e| HoldingsError::io(format!("writing snapshot {}", tmp.display()), e))?;
        fs::rename(&tmp, &path)
            .map_err(|e| HoldingsError::io(format!("replacing snapshot {}", path.display()), e))?;

        debug!(profile = %profile_id, entries = items.len(), "persisted collection");
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Collections> {
        self.collections.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Set for LocalSet {
    fn list(&self, profile_id: ProfileId, params: ListParams) -> HoldingsResult<Vec<VersionInfo>> {
        let collections = self.lock();

        let col = collections
            .get(&profile_id)
            .ok_or_else(|| HoldingsError::CollectionNotFound {
                profile: profile_id.to_string(),
            })?;

        let take = params.limit.unwrap_or(col.len());
        Ok(col.iter().skip(params.offset).take(take).cloned().collect())
    }
}

impl WritableSet for LocalSet {
    fn put(&self, profile_id: ProfileId, entries: Vec<VersionInfo>) -> HoldingsResult<()> {
        // Validate everything up front so a bad entry mid-batch cannot
        // leave a partial insert behind.
        for entry in &entries {
            entry.validate()?;
        }

        let mut collections = self.lock();
        let mut working = collections.get(&profile_id).cloned().unwrap_or_default();

        for entry in entries {
            debug!(profile = %profile_id, init_id = %entry.init_id, name = %entry.name, "put dataset");
            match working.iter_mut().find(|e| e.init_id == entry.init_id) {
                Some(existing) => *existing = entry,
                None => working.push(entry),
            }
        }

        working.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.init_id.cmp(&b.init_id)));

        self.save_collection(profile_id, &working)?;
        collections.insert(profile_id, working);
        Ok(())
    }

    fn delete(&self, profile_id: ProfileId, init_ids: &[&str]) -> HoldingsResult<()> {
        let mut collections = self.lock();

        let col = collections
            .get(&profile_id)
            .ok_or_else(|| HoldingsError::CollectionNotFound {
                profile: profile_id.to_string(),
            })?;

        // Removals apply to a working copy; the visible sequence only
        // changes once every requested ID has been found and the
        // snapshot is safely on disk.
        let mut working = col.clone();
        for &remove_id in init_ids {
            let idx = working
                .iter()
                .position(|e| e.init_id == remove_id)
                .ok_or_else(|| HoldingsError::DatasetNotFound {
                    init_id: remove_id.to_string(),
                })?;
            working.remove(idx);
            debug!(profile = %profile_id, init_id = remove_id, "delete dataset");
        }

        self.save_collection(profile_id, &working)?;
        collections.insert(profile_id, working);
        Ok(())
    }
}
