//! API plugins
//!
//! Each traced API is handled by a plugin module selected by tracer ID. A
//! module exports a controller factory pair (`CreateController` /
//! `DestroyController`) for decoding and a replayer factory pair
//! (`CreateReplayer` / `DestroyReplayer`) for execution.

pub mod api;
pub mod error;
pub mod loader;
pub mod module;
pub mod settings;

pub use api::{
    Controller, DecodeContext, DecodedPacket, Diagnostic, DiagnosticCallback, LogCallback,
    ReplayOptions, ReplayStatus, Replayer, StatusClass, SurfaceTarget,
};
pub use error::PluginError;
pub use loader::{PluginHandle, PluginKind, PluginLoader, ReplayerSet, TracerModules};
pub use module::{
    Entrypoint, ModuleProvider, PluginModule, StaticModule, StaticModuleTable, module_file_name,
};
pub use settings::{PluginSetting, SettingValue, settings_from_table};
