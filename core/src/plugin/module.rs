//! Module providers and the factory ABI
//!
//! A plugin module is looked up by path and exposes its factories as named
//! entrypoints. [`StaticModuleTable`] serves modules compiled into the host
//! binary; other providers can be plugged in through [`ModuleProvider`].

use hashbrown::HashMap;
use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::fmt;
use std::path::{Path, PathBuf};

use super::api::{Controller, Replayer};
use super::error::PluginError;

pub const CREATE_CONTROLLER: &str = "CreateController";
pub const DESTROY_CONTROLLER: &str = "DestroyController";
pub const CREATE_REPLAYER: &str = "CreateReplayer";
pub const DESTROY_REPLAYER: &str = "DestroyReplayer";

pub type CreateControllerFn = fn() -> Box<dyn Controller>;
pub type DestroyControllerFn = fn(Box<dyn Controller>);
pub type CreateReplayerFn = fn() -> Box<dyn Replayer>;
pub type DestroyReplayerFn = fn(Box<dyn Replayer>);

/// A resolved factory symbol
#[derive(Clone, Copy)]
pub enum Entrypoint {
    CreateController(CreateControllerFn),
    DestroyController(DestroyControllerFn),
    CreateReplayer(CreateReplayerFn),
    DestroyReplayer(DestroyReplayerFn),
}

impl Entrypoint {
    /// The ABI name this entrypoint is exported under
    pub fn symbol_name(&self) -> &'static str {
        match self {
            Self::CreateController(_) => CREATE_CONTROLLER,
            Self::DestroyController(_) => DESTROY_CONTROLLER,
            Self::CreateReplayer(_) => CREATE_REPLAYER,
            Self::DestroyReplayer(_) => DESTROY_REPLAYER,
        }
    }
}

impl fmt::Debug for Entrypoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol_name())
    }
}

/// An opened module; closed when dropped
pub trait PluginModule: Send {
    fn name(&self) -> &str;

    fn symbol(&self, name: &str) -> Option<Entrypoint>;
}

/// Opens modules by path
pub trait ModuleProvider: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn PluginModule>, PluginError>;
}

/// File name a module is shipped under on this platform
pub fn module_file_name(name: &str) -> String {
    format!("{DLL_PREFIX}{name}{DLL_SUFFIX}")
}

/// Module name from a path, with the platform prefix and suffix stripped
pub fn module_name_from_path(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    let name = file_name.strip_suffix(DLL_SUFFIX).unwrap_or(file_name);
    let name = if DLL_PREFIX.is_empty() {
        name
    } else {
        name.strip_prefix(DLL_PREFIX).unwrap_or(name)
    };
    Some(name.to_string())
}

/// A module compiled into the host binary
#[derive(Debug, Clone)]
pub struct StaticModule {
    name: String,
    entrypoints: HashMap<&'static str, Entrypoint>,
}

impl StaticModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entrypoints: HashMap::new(),
        }
    }

    pub fn with_entrypoint(mut self, entrypoint: Entrypoint) -> Self {
        self.entrypoints.insert(entrypoint.symbol_name(), entrypoint);
        self
    }

    /// Export both controller factories
    pub fn with_controller(self, create: CreateControllerFn, destroy: DestroyControllerFn) -> Self {
        self.with_entrypoint(Entrypoint::CreateController(create))
            .with_entrypoint(Entrypoint::DestroyController(destroy))
    }

    /// Export both replayer factories
    pub fn with_replayer(self, create: CreateReplayerFn, destroy: DestroyReplayerFn) -> Self {
        self.with_entrypoint(Entrypoint::CreateReplayer(create))
            .with_entrypoint(Entrypoint::DestroyReplayer(destroy))
    }
}

impl PluginModule for StaticModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn symbol(&self, name: &str) -> Option<Entrypoint> {
        self.entrypoints.get(name).copied()
    }
}

/// Compile-time table of plugin modules, matched by file name
#[derive(Debug, Clone, Default)]
pub struct StaticModuleTable {
    modules: Vec<StaticModule>,
}

impl StaticModuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: StaticModule) -> &mut Self {
        self.modules.retain(|m| m.name != module.name);
        self.modules.push(module);
        self
    }

    pub fn with(mut self, module: StaticModule) -> Self {
        self.register(module);
        self
    }

    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(|m| m.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl ModuleProvider for StaticModuleTable {
    fn open(&self, path: &Path) -> Result<Box<dyn PluginModule>, PluginError> {
        let name = module_name_from_path(path)
            .ok_or_else(|| PluginError::ModuleNotFound(PathBuf::from(path)))?;
        self.modules
            .iter()
            .find(|m| m.name == name)
            .map(|m| Box::new(m.clone()) as Box<dyn PluginModule>)
            .ok_or_else(|| PluginError::ModuleNotFound(PathBuf::from(path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockController, destroy_mock_controller, new_mock_controller};

    #[test]
    fn test_module_name_strips_platform_affixes() {
        let path = PathBuf::from("/opt/plugins").join(module_file_name("vulkan_replay"));
        assert_eq!(module_name_from_path(&path).as_deref(), Some("vulkan_replay"));
        assert_eq!(
            module_name_from_path(Path::new("vulkan_replay")).as_deref(),
            Some("vulkan_replay")
        );
    }

    #[test]
    fn test_static_table_resolves_symbols() {
        let table = StaticModuleTable::new().with(
            StaticModule::new("vulkan_replay")
                .with_controller(new_mock_controller, destroy_mock_controller),
        );

        let module = table.open(Path::new(&module_file_name("vulkan_replay"))).unwrap();
        assert_eq!(module.name(), "vulkan_replay");
        assert!(matches!(
            module.symbol(CREATE_CONTROLLER),
            Some(Entrypoint::CreateController(_))
        ));
        assert!(module.symbol(CREATE_REPLAYER).is_none());

        let Some(Entrypoint::CreateController(create)) = module.symbol(CREATE_CONTROLLER) else {
            panic!("controller factory missing");
        };
        assert_eq!(create().tracer_id(), MockController::TRACER);
    }

    #[test]
    fn test_unknown_module_not_found() {
        let table = StaticModuleTable::new();
        let err = table.open(Path::new("gl_replay")).err().unwrap();
        assert!(matches!(err, PluginError::ModuleNotFound(_)));
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut table = StaticModuleTable::new();
        table
            .register(StaticModule::new("a"))
            .register(StaticModule::new("b"))
            .register(StaticModule::new("a"));
        assert_eq!(table.module_names().collect::<Vec<_>>(), ["b", "a"]);
    }
}
