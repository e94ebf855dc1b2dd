pub mod configuration;
pub mod options;
pub mod preferences;
pub mod projects;
pub mod registry;
mod serde_path;
pub mod workspace;

pub use configuration::{
    default_group, setting, ConfigKey, Configuration, DebugLaunch, OutputKind,
};
pub use options::{BuildOptions, CopyLocal};
pub use preferences::{
    BuildPreferences, CompilerPreferences, Preferences, PreferencesError, PreferencesStore,
    Verbosity,
};
pub use projects::{ProjectRegistry, RegistryError};
pub use registry::{BuildManager, ConfigError, ConfigEvents, ConfigRegistry, FixedConfiguration};
pub use workspace::{ProjectBinding, WorkspaceDescriptor, WorkspaceError, WorkspaceStore};
