//! # Unit Loader
//!
//! Discovers unit records under the configured roots and builds a fresh
//! registry, unit cache and event router from them.
//!
//! A load pass:
//!
//! 1. walks every root recursively (entries sorted, so passes are
//!    deterministic), keeping files with the source suffix
//! 2. reuses the previous cache entry when the file's modification time is
//!    unchanged, otherwise reads, parses and binds the record
//! 3. registers every unit, cached or fresh, into the new registry
//! 4. installs registry, cache and router into the [`BotContext`] in one step
//!    and persists the new cache image
//!
//! A bad file is logged and skipped; only an unreadable command root aborts
//! the pass.

use async_recursion::async_recursion;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, instrument, warn};

use crate::cache::UnitCache;
use crate::context::BotContext;
use crate::events::{EventRouter, ListenerBinding};
use crate::registry::CommandRegistry;
use crate::unit::{
    EventDefinition, InvocationKind, PrefixedDefinition, StructuredDefinition, Unit,
    UnitDefinition,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("Cannot read unit root {path}: {message}")]
    RootUnreadable { path: String, message: String },
    #[error("Failed to instantiate {path}: {message}")]
    Instantiation { path: String, message: String },
    #[error("Invalid unit at {path}: {message}")]
    Validation { path: String, message: String },
}

impl LoadError {
    fn root(path: &Path, e: impl std::fmt::Display) -> Self {
        Self::RootUnreadable {
            path: path.display().to_string(),
            message: e.to_string(),
        }
    }

    fn instantiation(path: &Path, e: impl std::fmt::Display) -> Self {
        Self::Instantiation {
            path: path.display().to_string(),
            message: e.to_string(),
        }
    }

    fn validation(path: &Path, e: impl std::fmt::Display) -> Self {
        Self::Validation {
            path: path.display().to_string(),
            message: e.to_string(),
        }
    }
}

pub type LoadResult<T> = Result<T, LoadError>;

/// Counters for one load pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Units read and bound from disk during this pass.
    pub loaded: usize,
    /// Units reused from the previous cache.
    pub cached: usize,
    /// Files rejected by validation.
    pub skipped: usize,
    /// Files that could not be read or parsed.
    pub failed: usize,
    pub listeners: usize,
}

impl LoadReport {
    pub fn units(&self) -> usize {
        self.loaded + self.cached
    }
}

pub struct UnitLoader {
    context: Arc<BotContext>,
}

impl UnitLoader {
    pub fn new(context: Arc<BotContext>) -> Self {
        Self { context }
    }

    pub fn begin(&self) -> LoadPass<'_> {
        LoadPass {
            context: &self.context,
            suffix: self.context.config().source_suffix.clone(),
            registry: CommandRegistry::new(self.context.config().prefix.clone()),
            cache: UnitCache::new(),
            events: EventRouter::new(),
            report: LoadReport::default(),
        }
    }

    /// Loads every configured root and installs the result.
    #[instrument(skip(self))]
    pub async fn load_all(&self) -> LoadResult<LoadReport> {
        let config = self.context.config();
        let mut pass = self.begin();
        pass.load_root(&config.slash_dir, InvocationKind::Structured)
            .await?;
        pass.load_root(&config.message_dir, InvocationKind::Prefixed)
            .await?;
        if let Some(events_dir) = &config.events_dir {
            pass.load_listeners(events_dir).await?;
        }
        Ok(self.commit(pass).await)
    }

    /// Installs a finished pass, then persists its cache image. A failed write
    /// only costs reloads on the next start, so it is logged, not returned.
    pub async fn commit(&self, pass: LoadPass<'_>) -> LoadReport {
        let LoadPass {
            registry,
            cache,
            events,
            report,
            ..
        } = pass;

        let image = cache.to_image();
        info!(
            "Loaded {} structured and {} prefixed commands, {} listeners ({} from cache)",
            registry.structured_len(),
            registry.prefixed_len(),
            report.listeners,
            report.cached
        );
        self.context.install(registry, cache, events).await;

        if let Err(e) = self.context.cache_store().save(&image).await {
            error!("Failed to persist unit cache: {}", e);
        }
        report
    }
}

/// One in-progress load pass. Nothing is visible to dispatch until the pass
/// is committed.
pub struct LoadPass<'a> {
    context: &'a BotContext,
    suffix: String,
    registry: CommandRegistry,
    cache: UnitCache,
    events: EventRouter,
    report: LoadReport,
}

impl LoadPass<'_> {
    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    /// Loads all units of `kind` under `root`.
    #[instrument(skip(self))]
    pub async fn load_root(&mut self, root: &Path, kind: InvocationKind) -> LoadResult<()> {
        let files = self.discover(root).await?;
        debug!("{} candidate files under {}", files.len(), root.display());

        for path in files {
            let mtime = match modified_at(&path).await {
                Ok(mtime) => mtime,
                Err(e) => {
                    self.fail(LoadError::instantiation(&path, e));
                    continue;
                }
            };

            if let Some(unit) = self.cached(&path, mtime, kind).await {
                debug!("Reusing cached unit {} from {}", unit.name(), path.display());
                self.report.cached += 1;
                self.accept(path, unit, mtime);
                continue;
            }

            match self.instantiate(&path, kind).await {
                Ok(unit) => {
                    debug!("Loaded unit {} from {}", unit.name(), path.display());
                    self.report.loaded += 1;
                    self.accept(path, Arc::new(unit), mtime);
                }
                Err(e) => self.fail(e),
            }
        }
        Ok(())
    }

    /// Loads event-listener records under `root`. A missing events root is
    /// not an error.
    #[instrument(skip(self))]
    pub async fn load_listeners(&mut self, root: &Path) -> LoadResult<()> {
        if fs::metadata(root).await.is_err() {
            debug!("No events directory at {}", root.display());
            return Ok(());
        }

        for path in self.discover(root).await? {
            let bound = match read_record::<EventDefinition>(&path).await {
                Ok(definition) => ListenerBinding::bind(&definition, self.context.catalog())
                    .map_err(|e| LoadError::validation(&path, e)),
                Err(e) => Err(e),
            };
            match bound {
                Ok(binding) => {
                    debug!("Listener for {} loaded from {}", binding.event(), path.display());
                    self.events.add(binding);
                    self.report.listeners += 1;
                }
                Err(e) => self.fail(e),
            }
        }
        Ok(())
    }

    async fn discover(&self, root: &Path) -> LoadResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        collect_sources(root, &self.suffix, &mut files, true)
            .await
            .map_err(|e| LoadError::root(root, e))?;
        Ok(files)
    }

    async fn cached(
        &self,
        path: &Path,
        mtime: DateTime<Utc>,
        kind: InvocationKind,
    ) -> Option<Arc<Unit>> {
        self.context
            .with_cache(|cache| {
                cache
                    .lookup(path, mtime)
                    .filter(|cached| cached.unit.kind() == kind)
                    .map(|cached| cached.unit.clone())
            })
            .await
    }

    async fn instantiate(&self, path: &Path, kind: InvocationKind) -> LoadResult<Unit> {
        let definition = match kind {
            InvocationKind::Structured => {
                UnitDefinition::Structured(read_record::<StructuredDefinition>(path).await?)
            }
            InvocationKind::Prefixed => {
                UnitDefinition::Prefixed(read_record::<PrefixedDefinition>(path).await?)
            }
        };
        self.context
            .catalog()
            .bind(definition)
            .map_err(|e| LoadError::validation(path, e))
    }

    fn accept(&mut self, path: PathBuf, unit: Arc<Unit>, mtime: DateTime<Utc>) {
        self.registry.register(unit.clone());
        self.cache.store(path, unit, mtime);
    }

    fn fail(&mut self, e: LoadError) {
        match &e {
            LoadError::Validation { .. } => {
                warn!("{}", e);
                self.report.skipped += 1;
            }
            _ => {
                error!("{}", e);
                self.report.failed += 1;
            }
        }
    }
}

/// Reads and decodes one record. Malformed JSON is an instantiation failure;
/// well-formed JSON of the wrong shape is a validation failure.
async fn read_record<T: DeserializeOwned>(path: &Path) -> LoadResult<T> {
    let text = fs::read_to_string(path)
        .await
        .map_err(|e| LoadError::instantiation(path, e))?;
    let value: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| LoadError::instantiation(path, e))?;
    serde_json::from_value(value).map_err(|e| LoadError::validation(path, e))
}

async fn modified_at(path: &Path) -> std::io::Result<DateTime<Utc>> {
    let metadata = fs::metadata(path).await?;
    Ok(DateTime::<Utc>::from(metadata.modified()?))
}

// ディレクトリを再帰的に走査してソースファイルを集める
#[async_recursion]
async fn collect_sources(
    dir: &Path,
    suffix: &str,
    files: &mut Vec<PathBuf>,
    is_root: bool,
) -> std::io::Result<()> {
    let mut reader = match fs::read_dir(dir).await {
        Ok(reader) => reader,
        Err(e) if is_root => return Err(e),
        Err(e) => {
            warn!("Skipping unreadable directory {}: {}", dir.display(), e);
            return Ok(());
        }
    };

    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        entries.push(entry);
    }
    entries.sort_by_key(|entry| entry.path());

    for entry in entries {
        let path = entry.path();
        let file_type = match entry.file_type().await {
            Ok(file_type) => file_type,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };

        if file_type.is_dir() {
            collect_sources(&path, suffix, files, false).await?;
        } else if path.extension().is_some_and(|ext| ext == suffix) {
            files.push(path);
        }
    }
    Ok(())
}
