//! Process-wide store of loaded shift grids.
//!
//! Each identifier gets one slot. The first caller for a slot runs the load
//! while later callers for the same identifier wait on it; other identifiers
//! are unaffected. Slots are never evicted, and a failed load stays failed.

use std::{
    collections::HashMap,
    env,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use parking_lot::Mutex;

use super::{format, ShiftGrid};
use crate::error::GridError;

/// Environment variable listing grid directories, in `PATH` syntax.
pub const GRID_PATH_ENV: &str = "PCD_GRID_PATH";

pub trait GridLoader: Send + Sync {
    fn load(&self, identifier: &str) -> Result<ShiftGrid, GridError>;
}

impl<F> GridLoader for F
where
    F: Fn(&str) -> Result<ShiftGrid, GridError> + Send + Sync,
{
    fn load(&self, identifier: &str) -> Result<ShiftGrid, GridError> {
        self(identifier)
    }
}

/// Resolves identifiers as file names under a list of directories. A
/// `#NAME` suffix selects an NTv2 sub-grid.
#[derive(Debug, Clone, Default)]
pub struct FileGridLoader {
    search_paths: Vec<PathBuf>,
}

impl FileGridLoader {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    pub fn from_env() -> Self {
        let search_paths = env::var_os(GRID_PATH_ENV)
            .map(|value| env::split_paths(&value).collect())
            .unwrap_or_default();
        Self { search_paths }
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    pub fn resolve(&self, file_name: &str) -> Option<PathBuf> {
        let path = Path::new(file_name);
        if path.is_absolute() {
            return path.is_file().then(|| path.to_path_buf());
        }
        self.search_paths
            .iter()
            .map(|dir| dir.join(path))
            .find(|candidate| candidate.is_file())
    }
}

impl GridLoader for FileGridLoader {
    fn load(&self, identifier: &str) -> Result<ShiftGrid, GridError> {
        let (file_name, subgrid) = match identifier.split_once('#') {
            Some((file_name, subgrid)) => (file_name, Some(subgrid)),
            None => (identifier, None),
        };
        let path = self
            .resolve(file_name)
            .ok_or_else(|| GridError::NotFound(identifier.to_string()))?;

        log::info!("loading shift grid {} from {}", identifier, path.display());
        let bytes = std::fs::read(&path).map_err(|e| GridError::Io {
            id: identifier.to_string(),
            message: e.to_string(),
        })?;
        format::read_grid(identifier, &bytes, subgrid)
    }
}

type Slot = Arc<OnceLock<Result<Arc<ShiftGrid>, GridError>>>;

pub struct ShiftGridCache {
    loader: Box<dyn GridLoader>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl ShiftGridCache {
    pub fn new(loader: impl GridLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// The shared cache, searching the directories in `PCD_GRID_PATH`.
    pub fn global() -> &'static ShiftGridCache {
        static GLOBAL: OnceLock<ShiftGridCache> = OnceLock::new();
        GLOBAL.get_or_init(|| ShiftGridCache::new(FileGridLoader::from_env()))
    }

    pub fn get(&self, identifier: &str) -> Result<Arc<ShiftGrid>, GridError> {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(identifier.to_string()).or_default())
        };

        slot.get_or_init(|| {
            let loaded = self.loader.load(identifier).map(Arc::new);
            if let Err(e) = &loaded {
                log::warn!("shift grid {identifier} failed to load: {e}");
            }
            loaded
        })
        .clone()
    }

    /// Whether `identifier` has been loaded successfully.
    pub fn contains(&self, identifier: &str) -> bool {
        let slots = self.slots.lock();
        slots
            .get(identifier)
            .and_then(|slot| slot.get())
            .is_some_and(|loaded| loaded.is_ok())
    }

    /// Number of identifiers requested so far, including failed ones.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ShiftGridCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShiftGridCache")
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        thread,
        time::Duration,
    };

    use super::*;
    use crate::grid::{format::tests::native_bytes, tests::pacific_grid};

    fn counting_loader(loads: Arc<AtomicUsize>) -> impl GridLoader {
        move |identifier: &str| {
            loads.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            match identifier {
                "missing" => Err(GridError::NotFound(identifier.to_string())),
                _ => Ok(pacific_grid()),
            }
        }
    }

    #[test]
    fn concurrent_requests_load_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let cache = ShiftGridCache::new(counting_loader(Arc::clone(&loads)));

        let grids: Vec<Arc<ShiftGrid>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| scope.spawn(|| cache.get("pacific").unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(grids.iter().all(|grid| Arc::ptr_eq(grid, &grids[0])));
        assert!(cache.contains("pacific"));
    }

    #[test]
    fn distinct_identifiers_load_separately() {
        let loads = Arc::new(AtomicUsize::new(0));
        let cache = ShiftGridCache::new(counting_loader(Arc::clone(&loads)));
        let a = cache.get("a").unwrap();
        let b = cache.get("b").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failed_load_is_cached_and_reported() {
        let loads = Arc::new(AtomicUsize::new(0));
        let cache = ShiftGridCache::new(counting_loader(Arc::clone(&loads)));
        for _ in 0..3 {
            assert_eq!(
                cache.get("missing").unwrap_err(),
                GridError::NotFound("missing".to_string())
            );
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(!cache.contains("missing"));
    }

    #[test]
    fn file_loader_searches_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pacific.gshf"), native_bytes(&pacific_grid())).unwrap();

        let loader = FileGridLoader::new(vec![
            dir.path().join("does-not-exist"),
            dir.path().to_path_buf(),
        ]);
        let cache = ShiftGridCache::new(loader);
        let grid = cache.get("pacific.gshf").unwrap();
        assert_eq!(grid.identifier(), "pacific.gshf");
        assert_eq!(grid.extent().columns, 11);

        assert!(matches!(
            cache.get("absent.gshf"),
            Err(GridError::NotFound(_))
        ));
    }

    #[test]
    fn corrupt_file_surfaces_as_corrupt_grid() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.gshf"), b"GSHF\x01\x00").unwrap();
        let cache = ShiftGridCache::new(FileGridLoader::new(vec![dir.path().to_path_buf()]));
        assert!(matches!(
            cache.get("broken.gshf"),
            Err(GridError::CorruptGrid { .. })
        ));
    }
}
