//! # Unit Cache
//!
//! Per-file record of the last instantiated unit and the modification time it
//! was read at. A lookup hits only when the file's current modification time
//! equals the stored one; any other value is a miss and the caller reloads.
//!
//! The cache is never patched in place across load passes. Each pass starts an
//! empty `UnitCache`, carries over the entries it confirms fresh or reloads,
//! and replaces the previous cache wholesale. Entries for deleted files
//! therefore disappear on the next pass.
//!
//! The persisted form is a [`CacheImage`]: a map from file path to
//! `{unitName, unit, mtime}`, where `unit` is the record the unit was built
//! from. On restart the image is bound back against the [`HandlerCatalog`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, warn};

use crate::handler::HandlerCatalog;
use crate::unit::{Unit, UnitDefinition};

#[derive(Debug, Clone)]
pub struct CachedUnit {
    pub name: String,
    pub unit: Arc<Unit>,
    pub mtime: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct UnitCache {
    entries: HashMap<PathBuf, CachedUnit>,
}

impl UnitCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached unit iff `mtime` equals the stored timestamp.
    pub fn lookup(&self, path: &Path, mtime: DateTime<Utc>) -> Option<&CachedUnit> {
        self.entries.get(path).filter(|cached| cached.mtime == mtime)
    }

    pub fn store(&mut self, path: impl Into<PathBuf>, unit: Arc<Unit>, mtime: DateTime<Utc>) {
        let name = unit.name().to_string();
        self.entries
            .insert(path.into(), CachedUnit { name, unit, mtime });
    }

    pub fn get(&self, path: &Path) -> Option<&CachedUnit> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_image(&self) -> CacheImage {
        let entries = self
            .entries
            .iter()
            .map(|(path, cached)| {
                (
                    path.display().to_string(),
                    CacheImageEntry {
                        unit_name: cached.name.clone(),
                        unit: cached.unit.definition().clone(),
                        mtime: cached.mtime,
                    },
                )
            })
            .collect();
        CacheImage(entries)
    }

    /// Rebuilds a cache from its persisted image. Entries whose handler is no
    /// longer registered are dropped, so the file is reloaded on the next pass.
    pub fn from_image(image: CacheImage, catalog: &HandlerCatalog) -> Self {
        let mut cache = Self::new();
        for (path, entry) in image.0 {
            match catalog.bind(entry.unit) {
                Ok(unit) => cache.store(PathBuf::from(path), Arc::new(unit), entry.mtime),
                Err(e) => {
                    warn!("Dropping cached unit {} ({}): {}", entry.unit_name, path, e);
                }
            }
        }
        debug!("Restored {} cached units", cache.len());
        cache
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheImageEntry {
    pub unit_name: String,
    pub unit: UnitDefinition,
    pub mtime: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheImage(pub BTreeMap<String, CacheImageEntry>);

impl CacheImage {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
