use std::sync::Arc;

use semver::Version;

use crate::ENGINE_VERSION;
use crate::clock::{Clock, SystemClock};
use crate::index_cache::PackIndexCache;
use crate::registry::RegistryStore;
use crate::store::StorePaths;

/// Everything the command flows need, constructed once from the store root
/// and passed by reference. Tests inject their own clock and engine
/// version.
pub struct EngineContext {
    pub paths: StorePaths,
    pub registry: RegistryStore,
    pub cache: PackIndexCache,
    pub engine_version: Version,
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("paths", &self.paths)
            .field("engine_version", &self.engine_version)
            .finish_non_exhaustive()
    }
}

impl EngineContext {
    pub fn new(paths: StorePaths) -> Self {
        Self::with_clock(paths, Arc::new(SystemClock))
    }

    pub fn with_clock(paths: StorePaths, clock: Arc<dyn Clock>) -> Self {
        let registry = RegistryStore::with_clock(
            paths.registry_file(),
            Box::new(ArcClock(Arc::clone(&clock))),
        );
        let cache = PackIndexCache::new(paths.cache_dir());
        Self {
            paths,
            registry,
            cache,
            engine_version: Version::parse(ENGINE_VERSION)
                .expect("CARGO_PKG_VERSION is valid semver"),
            clock,
        }
    }

    /// Override the engine version reported to compatibility checks.
    #[must_use]
    pub fn with_engine_version(mut self, version: Version) -> Self {
        self.engine_version = version;
        self
    }
}

/// Adapter so the registry store can share the context's clock.
struct ArcClock(Arc<dyn Clock>);

impl Clock for ArcClock {
    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.0.now()
    }
}
