use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use crate::dataset::{ColumnSpec, Dataset, DatasetError};

struct CachedSheet {
    loaded_at: Instant,
    modified: Option<SystemTime>,
    dataset: Arc<Dataset>,
}

/// Loaded sheets keyed by path and column spec. Entries expire after the
/// configured TTL or as soon as the file's mtime moves.
#[derive(Default)]
pub struct SheetCache {
    entries: HashMap<(PathBuf, String), CachedSheet>,
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

impl SheetCache {
    pub fn load(
        &mut self,
        path: &Path,
        spec: &ColumnSpec,
        ttl: Duration,
    ) -> Result<Arc<Dataset>, DatasetError> {
        if ttl.is_zero() {
            return Dataset::from_path(path, spec).map(Arc::new);
        }

        let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let key = (canonical, spec.fingerprint());
        let modified = modified_time(path);

        if let Some(hit) = self.entries.get(&key) {
            if hit.loaded_at.elapsed() < ttl && hit.modified == modified {
                log::debug!("sheet cache hit: {}", path.display());
                return Ok(Arc::clone(&hit.dataset));
            }
        }

        let dataset = Arc::new(Dataset::from_path(path, spec)?);
        log::info!(
            "loaded sheet {} ({} rows)",
            path.display(),
            dataset.len()
        );
        // Expired entries are only dropped here; a lookup never removes them.
        self.entries.retain(|_, e| e.loaded_at.elapsed() < ttl);
        self.entries.insert(
            key,
            CachedSheet {
                loaded_at: Instant::now(),
                modified,
                dataset: Arc::clone(&dataset),
            },
        );
        Ok(dataset)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
