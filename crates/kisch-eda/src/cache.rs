//! Process-wide cache of parsed symbol libraries.
//!
//! Libraries are loaded lazily the first time one of their symbols is
//! resolved. Each library has its own [`OnceCell`], so concurrent resolvers
//! of the same library wait for a single load while other libraries proceed
//! independently. Failures are cached too and never retried.

use crate::{split_lib_id, KicadSymbolLibrary, LibraryConfig, LibraryError, SymbolDefinition};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

type LibrarySlot = Arc<OnceCell<Result<LoadedLibrary, LibraryError>>>;

#[derive(Debug, Clone)]
struct LoadedLibrary {
    library: Arc<KicadSymbolLibrary>,
    /// Paths tried before (and including) the one that was loaded
    searched: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct SymbolLibraryCache {
    config: LibraryConfig,
    libraries: Mutex<HashMap<String, LibrarySlot>>,
    loads: AtomicUsize,
}

impl Default for SymbolLibraryCache {
    fn default() -> Self {
        Self::new(LibraryConfig::default())
    }
}

impl SymbolLibraryCache {
    pub fn new(config: LibraryConfig) -> Self {
        Self {
            config,
            libraries: Mutex::new(HashMap::new()),
            loads: AtomicUsize::new(0),
        }
    }

    /// Cache configured from the environment (see [`LibraryConfig::from_env`]).
    pub fn from_env() -> Self {
        Self::new(LibraryConfig::from_env())
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    /// Number of library files read from disk so far.
    pub fn library_loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Look up `<library>:<symbol>`, loading the library on first use.
    pub fn resolve(&self, lib_id: &str) -> Result<Arc<SymbolDefinition>, LibraryError> {
        let (nickname, name) = split_lib_id(lib_id)?;
        let slot = self.slot(nickname);
        let loaded = slot.get_or_init(|| self.load_library(nickname));

        match loaded {
            Ok(loaded) => loaded.library.get_symbol(name).ok_or_else(|| {
                log::debug!("Symbol {lib_id} not present in library '{nickname}'");
                LibraryError::SymbolNotFound {
                    lib_id: lib_id.to_string(),
                    searched: loaded.searched.clone(),
                }
            }),
            Err(LibraryError::LibraryNotFound { searched, .. }) => {
                Err(LibraryError::SymbolNotFound {
                    lib_id: lib_id.to_string(),
                    searched: searched.clone(),
                })
            }
            Err(e) => Err(e.clone()),
        }
    }

    /// Register an in-memory library under `nickname`, replacing any cached
    /// entry for it.
    pub fn register_library(&self, nickname: &str, content: &str) -> Result<(), LibraryError> {
        let library = KicadSymbolLibrary::from_string(nickname, content)?;
        let cell = OnceCell::new();
        let _ = cell.set(Ok(LoadedLibrary {
            library: Arc::new(library),
            searched: vec![PathBuf::from(format!("<memory>/{nickname}.kicad_sym"))],
        }));
        self.lock().insert(nickname.to_string(), Arc::new(cell));
        log::debug!("Registered in-memory symbol library '{nickname}'");
        Ok(())
    }

    /// Whether `nickname` has been loaded (successfully or not).
    pub fn is_loaded(&self, nickname: &str) -> bool {
        self.lock()
            .get(nickname)
            .is_some_and(|slot| slot.get().is_some())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, LibrarySlot>> {
        self.libraries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, nickname: &str) -> LibrarySlot {
        self.lock().entry(nickname.to_string()).or_default().clone()
    }

    fn load_library(&self, nickname: &str) -> Result<LoadedLibrary, LibraryError> {
        let file_name = format!("{nickname}.kicad_sym");
        let mut searched = Vec::new();

        for dir in self.config.search_dirs() {
            let path = dir.join(&file_name);
            searched.push(path.clone());
            if !path.is_file() {
                continue;
            }
            log::debug!("Loading symbol library {}", path.display());
            self.loads.fetch_add(1, Ordering::SeqCst);
            let library = KicadSymbolLibrary::from_file(nickname, &path)?;
            return Ok(LoadedLibrary {
                library: Arc::new(library),
                searched,
            });
        }

        log::debug!(
            "Symbol library '{nickname}' not found in {} location(s)",
            searched.len()
        );
        Err(LibraryError::LibraryNotFound {
            nickname: nickname.to_string(),
            searched,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIB: &str = r#"(kicad_symbol_lib (symbol "R" (symbol "R_1_1" (pin passive line (at 0 3.81 270) (length 1.27) (name "~") (number "1")))))"#;

    fn isolated() -> SymbolLibraryCache {
        SymbolLibraryCache::new(LibraryConfig::with_paths(Vec::<PathBuf>::new()))
    }

    #[test]
    fn registered_library_resolves() {
        let cache = isolated();
        cache.register_library("Device", LIB).unwrap();
        let r = cache.resolve("Device:R").unwrap();
        assert_eq!(r.lib_id, "Device:R");
        assert_eq!(r.pins.len(), 1);
        assert!(Arc::ptr_eq(&r, &cache.resolve("Device:R").unwrap()));
        assert_eq!(cache.library_loads(), 0);
    }

    #[test]
    fn missing_symbol_lists_searched_paths() {
        let cache = SymbolLibraryCache::new(LibraryConfig::with_paths(["/nonexistent/a", "/nonexistent/b"]));
        match cache.resolve("Nope:X") {
            Err(LibraryError::SymbolNotFound { lib_id, searched }) => {
                assert_eq!(lib_id, "Nope:X");
                assert_eq!(
                    searched,
                    vec![
                        PathBuf::from("/nonexistent/a/Nope.kicad_sym"),
                        PathBuf::from("/nonexistent/b/Nope.kicad_sym"),
                    ]
                );
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(cache.is_loaded("Nope"));
    }

    #[test]
    fn invalid_lib_id() {
        let cache = isolated();
        assert!(matches!(
            cache.resolve("R"),
            Err(LibraryError::InvalidLibId(_))
        ));
    }

    #[test]
    fn symbol_missing_from_registered_library() {
        let cache = isolated();
        cache.register_library("Device", LIB).unwrap();
        assert!(matches!(
            cache.resolve("Device:C"),
            Err(LibraryError::SymbolNotFound { .. })
        ));
    }

    #[test]
    fn cache_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SymbolLibraryCache>();
    }
}
