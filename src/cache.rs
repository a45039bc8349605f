//! The process-wide deserializer cache.
//!
//! Entries are keyed by destination type, column-shape signature, range and
//! the first-missing flag. Every entry keeps the captured [`Shape`] so a hash
//! collision is caught by comparing names and types before reuse.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use tracing::{debug, trace, warn};

use crate::cursor::Record;
use crate::error::{Error, Result, eyre};
use crate::handler::{ConversionRegistry, NoHandlers};
use crate::materialize::{self, RowFn};
use crate::shape::{self, ColumnRange, Shape};
use crate::type_map::FromRow;

pub static GLOBAL_CACHE: LazyLock<Arc<DeserializerCache>> =
    LazyLock::new(|| Arc::new(DeserializerCache::default()));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    type_id: TypeId,
    signature: u64,
    start: usize,
    length: usize,
    first_missing: bool,
}

struct CacheEntry {
    shape: Shape,
    type_name: &'static str,
    /// Holds a `RowFn<T>` for the `T` named by the key.
    deserializer: Box<dyn Any + Send + Sync>,
    hits: AtomicU64,
}

impl CacheEntry {
    fn row_fn<T: FromRow>(&self) -> Result<RowFn<T>> {
        self.deserializer
            .downcast_ref::<RowFn<T>>()
            .cloned()
            .ok_or_else(|| {
                Error::LibraryBug(eyre!(
                    "cache entry for {} holds a deserializer of another type",
                    self.type_name
                ))
            })
    }
}

/// Counters since the cache was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub builds: u64,
    pub hits: u64,
    pub purges: u64,
}

/// A deserializer handed out by the cache.
///
/// Keeps the entry alive, so it stays usable after the cache is purged.
pub struct Deserializer<T> {
    func: RowFn<T>,
    entry: Arc<CacheEntry>,
}

impl<T> Clone for Deserializer<T> {
    fn clone(&self) -> Self {
        Self {
            func: Arc::clone(&self.func),
            entry: Arc::clone(&self.entry),
        }
    }
}

impl<T> fmt::Debug for Deserializer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deserializer")
            .field("type", &self.entry.type_name)
            .field("columns", &self.entry.shape.len())
            .field("hits", &self.hits())
            .finish()
    }
}

impl<T> Deserializer<T> {
    /// Materialize the record's current row. `None` means "no object".
    pub fn deserialize(&self, record: &dyn Record) -> Result<Option<T>> {
        (self.func)(record)
    }

    /// Number of lookups served by this entry after it was built.
    pub fn hits(&self) -> u64 {
        self.entry.hits.load(Ordering::Relaxed)
    }

    pub fn shape(&self) -> &Shape {
        &self.entry.shape
    }
}

pub struct DeserializerCache {
    entries: RwLock<HashMap<CacheKey, Arc<CacheEntry>>>,
    registry: Arc<dyn ConversionRegistry>,
    builds: AtomicU64,
    hits: AtomicU64,
    purges: AtomicU64,
}

impl Default for DeserializerCache {
    fn default() -> Self {
        Self::with_registry(Arc::new(NoHandlers))
    }
}

impl fmt::Debug for DeserializerCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeserializerCache")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl DeserializerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache consulting `registry` for custom handlers.
    ///
    /// Registry changes are not observed; purge the affected types afterwards.
    pub fn with_registry(registry: Arc<dyn ConversionRegistry>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            registry,
            builds: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            purges: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<dyn ConversionRegistry> {
        &self.registry
    }

    /// Return the deserializer of `T` for `range` of `record`'s columns,
    /// building and publishing it on a miss.
    ///
    /// Build failures are returned and not cached.
    pub fn get_or_build<T: FromRow>(
        &self,
        record: &dyn Record,
        range: ColumnRange,
        first_missing: bool,
    ) -> Result<Deserializer<T>> {
        let (start, length) = range.resolve(record)?;
        let key = CacheKey {
            type_id: TypeId::of::<T>(),
            signature: shape::signature(record, start, length, first_missing),
            start,
            length,
            first_missing,
        };

        let cached = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();
        if let Some(entry) = cached {
            if entry.shape.matches(record, start, length) {
                entry.hits.fetch_add(1, Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(type_name = entry.type_name, signature = key.signature, "cache hit");
                return Ok(Deserializer {
                    func: entry.row_fn::<T>()?,
                    entry,
                });
            }
            warn!(
                type_name = entry.type_name,
                signature = key.signature,
                "column shape signature collision; rebuilding"
            );
        }

        self.build::<T>(record, key)
    }

    #[tracing::instrument(skip_all, fields(type_name = std::any::type_name::<T>()))]
    fn build<T: FromRow>(&self, record: &dyn Record, key: CacheKey) -> Result<Deserializer<T>> {
        let func = materialize::build::<T>(
            record,
            key.start,
            key.length,
            key.first_missing,
            self.registry.as_ref(),
        )?;
        let entry = Arc::new(CacheEntry {
            shape: Shape::capture(record, key.start, key.length),
            type_name: std::any::type_name::<T>(),
            deserializer: Box::new(Arc::clone(&func)),
            hits: AtomicU64::new(0),
        });
        self.builds.fetch_add(1, Ordering::Relaxed);
        debug!(
            start = key.start,
            length = key.length,
            signature = key.signature,
            "built deserializer"
        );

        // Last writer wins; concurrent builds of one shape are equivalent.
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::clone(&entry));
        Ok(Deserializer { func, entry })
    }

    /// Drop every cached shape of `T`.
    pub fn purge_type<T: 'static>(&self) -> usize {
        self.purge(Some(TypeId::of::<T>()))
    }

    /// Drop the cached shapes of one type, or of every type when `None`.
    ///
    /// Deserializers already handed out keep working.
    pub fn purge(&self, type_id: Option<TypeId>) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        match type_id {
            Some(type_id) => entries.retain(|key, _| key.type_id != type_id),
            None => entries.clear(),
        }
        let removed = before - entries.len();
        drop(entries);
        self.purges.fetch_add(1, Ordering::Relaxed);
        debug!(removed, "purged deserializer cache");
        removed
    }

    pub fn purge_all(&self) -> usize {
        self.purge(None)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            builds: self.builds.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            purges: self.purges.load(Ordering::Relaxed),
        }
    }
}
