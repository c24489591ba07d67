//! Plugin loading and matched unloading
//!
//! Every instance created through [`PluginLoader`] is wrapped in a
//! [`PluginHandle`]. Dropping the handle destroys the instance through the
//! module's own `Destroy*` factory and then closes the module it came from.

use hashbrown::HashMap;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::replay::LogSink;
use crate::trace::{TraceHeader, TracerId};

use super::api::{
    Controller, Diagnostic, DiagnosticCallback, LogCallback, ReplayOptions, Replayer,
    SurfaceTarget,
};
use super::error::PluginError;
use super::module::{
    CREATE_CONTROLLER, CREATE_REPLAYER, DESTROY_CONTROLLER, DESTROY_REPLAYER, Entrypoint,
    ModuleProvider, PluginModule, module_file_name,
};
use super::settings::PluginSetting;

// =============================================================================
// Tracer → module mapping
// =============================================================================

/// Which module serves which tracer ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracerModules {
    modules: HashMap<TracerId, String>,
}

impl TracerModules {
    /// Mapping with no entries
    pub fn empty() -> Self {
        Self {
            modules: HashMap::new(),
        }
    }

    pub fn insert(&mut self, tracer: TracerId, module: impl Into<String>) {
        self.modules.insert(tracer, module.into());
    }

    pub fn module_for(&self, tracer: TracerId) -> Option<&str> {
        self.modules.get(&tracer).map(String::as_str)
    }

    /// Entries sorted by tracer ID
    pub fn entries(&self) -> Vec<(TracerId, &str)> {
        let mut entries: Vec<_> = self
            .modules
            .iter()
            .map(|(id, name)| (*id, name.as_str()))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }
}

impl Default for TracerModules {
    fn default() -> Self {
        let mut modules = Self::empty();
        modules.insert(TracerId::VULKAN, "vulkan_replay");
        modules
    }
}

// =============================================================================
// Handles
// =============================================================================

type ModuleRegistry = Arc<Mutex<HashMap<u64, LoadedModule>>>;

struct LoadedModule {
    name: String,
    path: PathBuf,
    _module: Box<dyn PluginModule>,
}

fn lock_registry(registry: &ModuleRegistry) -> MutexGuard<'_, HashMap<u64, LoadedModule>> {
    registry.lock().unwrap_or_else(|e| {
        warn!("Plugin module registry mutex poisoned; continuing");
        e.into_inner()
    })
}

/// Kind-specific teardown run before an initialized instance is destroyed
pub trait PluginKind {
    const LABEL: &'static str;

    fn teardown(&mut self) {}
}

impl PluginKind for dyn Controller {
    const LABEL: &'static str = "controller";
}

impl PluginKind for dyn Replayer {
    const LABEL: &'static str = "replayer";

    fn teardown(&mut self) {
        self.deinitialize();
    }
}

/// A live plugin instance tied to the module that created it
pub struct PluginHandle<P: ?Sized + PluginKind> {
    id: u64,
    module_name: String,
    instance: ManuallyDrop<Box<P>>,
    /// Set once `initialize` succeeded; gates the kind's teardown
    initialized: bool,
    destroy: fn(Box<P>),
    registry: ModuleRegistry,
}

impl<P: ?Sized + PluginKind> PluginHandle<P> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }
}

impl PluginHandle<dyn Replayer> {
    /// Initialize the replayer; only a successfully initialized replayer is
    /// deinitialized when the handle drops
    pub fn initialize_with(
        &mut self,
        surface: SurfaceTarget,
        options: &ReplayOptions,
        header: &TraceHeader,
    ) -> Result<(), i32> {
        self.instance.initialize(surface, options, header)?;
        self.initialized = true;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

impl<P: ?Sized + PluginKind> Deref for PluginHandle<P> {
    type Target = P;

    fn deref(&self) -> &P {
        &self.instance
    }
}

impl<P: ?Sized + PluginKind> DerefMut for PluginHandle<P> {
    fn deref_mut(&mut self) -> &mut P {
        &mut self.instance
    }
}

impl<P: ?Sized + PluginKind> Drop for PluginHandle<P> {
    fn drop(&mut self) {
        if self.initialized {
            self.instance.teardown();
        }

        // SAFETY: `instance` is taken exactly once, here, and never read again.
        let instance = unsafe { ManuallyDrop::take(&mut self.instance) };
        (self.destroy)(instance);

        let record = lock_registry(&self.registry).remove(&self.id);
        match record {
            Some(record) => debug!(
                "Unloaded {} from '{}' ({})",
                P::LABEL,
                record.name,
                record.path.display()
            ),
            None => warn!(
                "No module record for {} #{} from '{}'; module left open",
                P::LABEL,
                self.id,
                self.module_name
            ),
        }
    }
}

/// Replayers for a session, keyed by tracer ID
#[derive(Default)]
pub struct ReplayerSet {
    replayers: HashMap<TracerId, PluginHandle<dyn Replayer>>,
}

impl ReplayerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, replayer: PluginHandle<dyn Replayer>) {
        self.replayers.insert(replayer.tracer_id(), replayer);
    }

    pub fn get_mut(&mut self, tracer: TracerId) -> Option<&mut PluginHandle<dyn Replayer>> {
        self.replayers.get_mut(&tracer)
    }

    pub fn contains(&self, tracer: TracerId) -> bool {
        self.replayers.contains_key(&tracer)
    }

    pub fn tracer_ids(&self) -> Vec<TracerId> {
        let mut ids: Vec<TracerId> = self.replayers.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.replayers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replayers.is_empty()
    }
}

impl std::fmt::Debug for ReplayerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayerSet")
            .field("tracers", &self.tracer_ids())
            .finish()
    }
}

// =============================================================================
// Loader
// =============================================================================

/// Loads controllers and replayers from plugin modules
pub struct PluginLoader {
    provider: Arc<dyn ModuleProvider>,
    registry: ModuleRegistry,
    next_id: AtomicU64,
    tracer_modules: TracerModules,
    search_dirs: Vec<PathBuf>,
    settings: HashMap<String, Vec<PluginSetting>>,
}

impl PluginLoader {
    pub fn new(provider: Arc<dyn ModuleProvider>) -> Self {
        Self {
            provider,
            registry: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            tracer_modules: TracerModules::default(),
            search_dirs: Vec::new(),
            settings: HashMap::new(),
        }
    }

    pub fn with_tracer_modules(mut self, tracer_modules: TracerModules) -> Self {
        self.tracer_modules = tracer_modules;
        self
    }

    pub fn with_search_dirs(mut self, search_dirs: Vec<PathBuf>) -> Self {
        self.search_dirs = search_dirs;
        self
    }

    /// Settings applied to replayers from `module` before initialization
    pub fn with_settings(
        mut self,
        module: impl Into<String>,
        settings: Vec<PluginSetting>,
    ) -> Self {
        self.settings.insert(module.into(), settings);
        self
    }

    pub fn tracer_modules(&self) -> &TracerModules {
        &self.tracer_modules
    }

    /// Number of modules currently open
    pub fn open_modules(&self) -> usize {
        lock_registry(&self.registry).len()
    }

    /// Path for a module name: the first search dir holding it, else the bare file name
    pub fn resolve_module_path(&self, name: &str) -> PathBuf {
        let file_name = module_file_name(name);
        self.search_dirs
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|candidate| candidate.is_file())
            .unwrap_or_else(|| PathBuf::from(file_name))
    }

    /// Load a controller from the module at `path`
    pub fn load_controller(
        &self,
        path: &Path,
    ) -> Result<PluginHandle<dyn Controller>, PluginError> {
        let module = self.provider.open(path)?;
        let create = match module.symbol(CREATE_CONTROLLER) {
            Some(Entrypoint::CreateController(f)) => f,
            _ => return Err(missing(module.as_ref(), CREATE_CONTROLLER)),
        };
        let destroy = match module.symbol(DESTROY_CONTROLLER) {
            Some(Entrypoint::DestroyController(f)) => f,
            _ => return Err(missing(module.as_ref(), DESTROY_CONTROLLER)),
        };
        Ok(self.register(module, path, create(), destroy))
    }

    /// Load a replayer from the module at `path`
    pub fn load_replayer(&self, path: &Path) -> Result<PluginHandle<dyn Replayer>, PluginError> {
        let module = self.provider.open(path)?;
        let create = match module.symbol(CREATE_REPLAYER) {
            Some(Entrypoint::CreateReplayer(f)) => f,
            _ => return Err(missing(module.as_ref(), CREATE_REPLAYER)),
        };
        let destroy = match module.symbol(DESTROY_REPLAYER) {
            Some(Entrypoint::DestroyReplayer(f)) => f,
            _ => return Err(missing(module.as_ref(), DESTROY_REPLAYER)),
        };
        Ok(self.register(module, path, create(), destroy))
    }

    /// Load the controller for the first tracer in `header` that has a module
    ///
    /// At most one controller is loaded per trace.
    pub fn load_controller_for(
        &self,
        header: &TraceHeader,
    ) -> Result<Option<PluginHandle<dyn Controller>>, PluginError> {
        for tracer in header.tracer_ids() {
            let Some(name) = self.tracer_modules.module_for(tracer) else {
                continue;
            };
            let controller = self.load_controller(&self.resolve_module_path(name))?;
            check_tracer(name, tracer, controller.tracer_id())?;
            info!("Loaded controller '{}' for tracer {}", name, tracer);
            return Ok(Some(controller));
        }
        Ok(None)
    }

    /// Load and initialize one replayer per tracer that asks for one
    ///
    /// Any failure unloads the replayers loaded so far.
    pub fn load_replayers(
        &self,
        header: &TraceHeader,
        surface: SurfaceTarget,
        options: &ReplayOptions,
        sink: Arc<dyn LogSink>,
    ) -> Result<ReplayerSet, PluginError> {
        let mut set = ReplayerSet::new();

        for tracer in header.tracer_ids() {
            let wants_replayer = header
                .tracers
                .iter()
                .any(|t| t.id == tracer && t.needs_replayer());
            if !wants_replayer || set.contains(tracer) {
                continue;
            }
            let Some(name) = self.tracer_modules.module_for(tracer) else {
                warn!(
                    "No replayer module mapped for tracer {}; its packets will be skipped",
                    tracer
                );
                continue;
            };

            let mut replayer = self.load_replayer(&self.resolve_module_path(name))?;
            check_tracer(name, tracer, replayer.tracer_id())?;

            replayer.set_log_callback(log_callback(sink.clone()));
            replayer.set_log_level(options.log_level);
            replayer.register_diagnostic_callback(diagnostic_callback(sink.clone()));
            if let Some(settings) = self.settings.get(name) {
                replayer.update_from_settings(settings);
            }
            replayer
                .initialize_with(surface, options, header)
                .map_err(|status| PluginError::InitializationFailed {
                    module: name.to_string(),
                    status,
                })?;

            info!("Loaded replayer '{}' for tracer {}", name, tracer);
            set.insert(replayer);
        }

        Ok(set)
    }

    fn register<P: ?Sized + PluginKind>(
        &self,
        module: Box<dyn PluginModule>,
        path: &Path,
        instance: Box<P>,
        destroy: fn(Box<P>),
    ) -> PluginHandle<P> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let module_name = module.name().to_string();
        debug!("Loaded {} #{} from '{}'", P::LABEL, id, module_name);

        lock_registry(&self.registry).insert(
            id,
            LoadedModule {
                name: module_name.clone(),
                path: path.to_path_buf(),
                _module: module,
            },
        );

        PluginHandle {
            id,
            module_name,
            instance: ManuallyDrop::new(instance),
            initialized: false,
            destroy,
            registry: Arc::clone(&self.registry),
        }
    }

    #[cfg(test)]
    pub(crate) fn forget_module(&self, id: u64) {
        lock_registry(&self.registry).remove(&id);
    }
}

fn missing(module: &dyn PluginModule, symbol: &'static str) -> PluginError {
    PluginError::MissingEntrypoint {
        module: module.name().to_string(),
        symbol,
    }
}

/// Fail if an instance serves another tracer than the slot it was loaded for
fn check_tracer(module: &str, expected: TracerId, reported: TracerId) -> Result<(), PluginError> {
    if reported != expected {
        return Err(PluginError::Consistency {
            module: module.to_string(),
            expected,
            reported,
        });
    }
    Ok(())
}

fn log_callback(sink: Arc<dyn LogSink>) -> LogCallback {
    Arc::new(move |level, message| sink.log(level, None, message))
}

fn diagnostic_callback(sink: Arc<dyn LogSink>) -> DiagnosticCallback {
    Arc::new(move |diagnostic: &Diagnostic| {
        sink.log(diagnostic.level, diagnostic.global_index, &diagnostic.message)
    })
}

/// Initialized handle for an instance that did not come from a loader
#[cfg(test)]
pub(crate) fn detached_handle<P: ?Sized + PluginKind>(
    name: &str,
    instance: Box<P>,
    destroy: fn(Box<P>),
) -> PluginHandle<P> {
    use super::module::StaticModule;

    let registry: ModuleRegistry = Arc::new(Mutex::new(HashMap::new()));
    lock_registry(&registry).insert(
        0,
        LoadedModule {
            name: name.to_string(),
            path: PathBuf::from(name),
            _module: Box::new(StaticModule::new(name)),
        },
    );
    PluginHandle {
        id: 0,
        module_name: name.to_string(),
        instance: ManuallyDrop::new(instance),
        initialized: true,
        destroy,
        registry,
    }
}
