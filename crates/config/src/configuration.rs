use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use once_cell::unsync::OnceCell;
use trellis_hierarchy::{
    library_file_name, normalize_path, resolve_stored_path, ConfigurationGroup, Project,
    DEFAULT_PLATFORM,
};

/// Well-known setting names.
/// 常用設定名稱。
pub mod setting {
    pub const ASSEMBLY_NAME: &str = "AssemblyName";
    pub const OUTPUT_TYPE: &str = "OutputType";
    pub const OUTPUT_PATH: &str = "OutputPath";
    pub const ROOT_NAMESPACE: &str = "RootNamespace";
    pub const APPLICATION_ICON: &str = "ApplicationIcon";
    pub const STARTUP_OBJECT: &str = "StartupObject";
    pub const ALLOW_UNSAFE_BLOCKS: &str = "AllowUnsafeBlocks";
    pub const CHECK_FOR_OVERFLOW: &str = "CheckForOverflowUnderflow";
    pub const DEFINE_CONSTANTS: &str = "DefineConstants";
    pub const DOCUMENTATION_FILE: &str = "DocumentationFile";
    pub const DEBUG_SYMBOLS: &str = "DebugSymbols";
    pub const OPTIMIZE: &str = "Optimize";
    pub const TREAT_WARNINGS_AS_ERRORS: &str = "TreatWarningsAsErrors";
    pub const WARNING_LEVEL: &str = "WarningLevel";
    pub const INCREMENTAL_BUILD: &str = "IncrementalBuild";
    pub const START_PROGRAM: &str = "StartProgram";
    pub const WORKING_DIRECTORY: &str = "WorkingDirectory";
    pub const CMD_ARGS: &str = "CmdArgs";
}

/// `name|platform` address of a configuration. Names compare ignoring case.
/// 組態的 `名稱|平台` 位址，比較時忽略大小寫。
#[derive(Debug, Clone, Eq)]
pub struct ConfigKey {
    pub name: String,
    pub platform: String,
}

impl ConfigKey {
    pub fn new(name: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            platform: platform.into(),
        }
    }

    /// Parses `Debug|AnyCPU`; a missing platform means the default one.
    /// 解析 `Debug|AnyCPU`；未指定平台時使用預設平台。
    pub fn parse(text: &str) -> Option<Self> {
        let (name, platform) = match text.split_once('|') {
            Some((name, platform)) => (name.trim(), platform.trim()),
            None => (text.trim(), DEFAULT_PLATFORM),
        };
        if name.is_empty() || platform.is_empty() {
            return None;
        }
        Some(Self::new(name, platform))
    }

    pub fn matches(&self, group: &ConfigurationGroup) -> bool {
        group.matches(&self.name, &self.platform)
    }
}

impl Default for ConfigKey {
    fn default() -> Self {
        Self::new("Debug", DEFAULT_PLATFORM)
    }
}

impl PartialEq for ConfigKey {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
            && self.platform.eq_ignore_ascii_case(&other.platform)
    }
}

impl Hash for ConfigKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.to_ascii_lowercase().hash(state);
        self.platform.to_ascii_lowercase().hash(state);
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.name, self.platform)
    }
}

/// What the debugger launches for this configuration.
/// 此組態偵錯時要啟動的程式設定。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugLaunch {
    pub start_program: Option<PathBuf>,
    pub working_directory: Option<PathBuf>,
    pub arguments: Option<String>,
}

/// A configuration's effective settings: project-wide properties overlaid
/// by the configuration's own group.
/// 組態的有效設定：專案層級屬性再疊加組態自身的屬性群組。
#[derive(Debug, Clone)]
pub struct Configuration {
    key: ConfigKey,
    project_name: String,
    project_dir: PathBuf,
    settings: BTreeMap<String, (String, String)>,
    output_assembly: OnceCell<PathBuf>,
}

impl Configuration {
    /// Evaluates `key` against the project's persisted property groups.
    /// 依專案已儲存的屬性群組計算 `key` 的設定。
    pub fn evaluate(project: &Project, key: ConfigKey) -> Self {
        let mut configuration = Self {
            key,
            project_name: project.name(),
            project_dir: project.base_dir().to_path_buf(),
            settings: BTreeMap::new(),
            output_assembly: OnceCell::new(),
        };
        for entry in project.properties() {
            configuration.store(&entry.name, &entry.value);
        }
        let group = project
            .configuration_groups()
            .iter()
            .find(|group| configuration.key.matches(group));
        if let Some(group) = group {
            for entry in &group.properties {
                configuration.store(&entry.name, &entry.value);
            }
        }
        configuration
    }

    fn store(&mut self, name: &str, value: &str) {
        self.settings.insert(
            name.to_ascii_lowercase(),
            (name.to_string(), value.to_string()),
        );
    }

    pub fn key(&self) -> &ConfigKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn platform(&self) -> &str {
        &self.key.platform
    }

    /// `name|platform`
    pub fn display_name(&self) -> String {
        self.key.to_string()
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn is_debug_only(&self) -> bool {
        self.key.name.eq_ignore_ascii_case("Debug")
    }

    pub fn is_release_only(&self) -> bool {
        self.key.name.eq_ignore_ascii_case("Release")
    }

    /// Reads a setting by name, ignoring case. Empty values read as absent.
    /// 以名稱讀取設定（忽略大小寫）；空字串視為不存在。
    pub fn get_property(&self, name: &str) -> Option<&str> {
        self.settings
            .get(&name.to_ascii_lowercase())
            .map(|(_, value)| value.as_str())
            .filter(|value| !value.is_empty())
    }

    /// Updates a setting on this configuration and drops cached paths.
    /// 更新此組態的設定並清除快取的路徑。
    pub fn set_property(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        self.store(name, &value);
        self.output_assembly = OnceCell::new();
    }

    /// Settings in name order with their original spelling.
    /// 依名稱排序、保留原始拼寫的設定列表。
    pub fn settings(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.settings
            .values()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn flag(&self, name: &str) -> bool {
        self.get_property(name)
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("true"))
    }

    pub fn assembly_name(&self) -> &str {
        self.get_property(setting::ASSEMBLY_NAME)
            .unwrap_or(&self.project_name)
    }

    pub fn output_kind(&self) -> OutputKind {
        self.get_property(setting::OUTPUT_TYPE)
            .map(OutputKind::parse)
            .unwrap_or_default()
    }

    /// Directory build outputs land in, resolved against the project.
    /// 建置輸出所在目錄（以專案目錄為基準解析）。
    pub fn output_directory(&self) -> PathBuf {
        let raw = self
            .get_property(setting::OUTPUT_PATH)
            .map(str::to_string)
            .unwrap_or_else(|| format!("bin/{}", self.key.name));
        self.resolve(&raw)
    }

    /// Output assembly path; computed once until a setting changes. This is
    /// a pure computation and touches no files: the build's preparation pass
    /// creates the directory.
    /// 輸出組件路徑；在設定變更前只計算一次。僅為計算，不存取檔案系統，
    /// 目錄由建置的準備階段建立。
    pub fn output_assembly_path(&self) -> &Path {
        self.output_assembly.get_or_init(|| {
            let file = match self.output_kind() {
                OutputKind::Library => library_file_name(self.assembly_name()),
                OutputKind::Exe | OutputKind::WinExe => {
                    executable_file_name(self.assembly_name())
                }
            };
            self.output_directory().join(file)
        })
    }

    pub fn debug_launch(&self) -> DebugLaunch {
        DebugLaunch {
            start_program: self
                .get_property(setting::START_PROGRAM)
                .map(|raw| self.resolve(raw)),
            working_directory: self
                .get_property(setting::WORKING_DIRECTORY)
                .map(|raw| self.resolve(raw)),
            arguments: self.get_property(setting::CMD_ARGS).map(str::to_string),
        }
    }

    pub(crate) fn resolve(&self, raw: &str) -> PathBuf {
        let joined = resolve_stored_path(&self.project_dir, raw);
        normalize_path(&joined).unwrap_or(joined)
    }
}

fn executable_file_name(assembly: &str) -> String {
    if assembly.to_ascii_lowercase().ends_with(".exe") {
        assembly.to_string()
    } else {
        format!("{assembly}.exe")
    }
}

/// Kind of module the compiler produces.
/// 編譯器產生的模組種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputKind {
    #[default]
    Exe,
    WinExe,
    Library,
}

impl OutputKind {
    pub fn parse(text: &str) -> Self {
        match text.trim().to_ascii_lowercase().as_str() {
            "library" => OutputKind::Library,
            "winexe" => OutputKind::WinExe,
            _ => OutputKind::Exe,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutputKind::Exe => "exe",
            OutputKind::WinExe => "winexe",
            OutputKind::Library => "library",
        }
    }
}

/// Settings seeded into a configuration created from scratch.
/// 全新組態的預設設定。
pub fn default_group(name: &str, platform: &str) -> ConfigurationGroup {
    let mut group = ConfigurationGroup::new(name, platform);
    group.set_property(setting::OUTPUT_PATH, format!("bin/{name}"));
    if name.eq_ignore_ascii_case("Release") {
        group.set_property(setting::OPTIMIZE, "true");
        group.set_property(setting::DEBUG_SYMBOLS, "false");
        group.set_property(setting::DEFINE_CONSTANTS, "TRACE");
    } else {
        group.set_property(setting::OPTIMIZE, "false");
        group.set_property(setting::DEBUG_SYMBOLS, "true");
        group.set_property(setting::DEFINE_CONSTANTS, "DEBUG;TRACE");
    }
    group.set_property(setting::WARNING_LEVEL, "4");
    group
}
