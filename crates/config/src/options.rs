use std::path::{Path, PathBuf};

use trellis_hierarchy::Project;

use crate::configuration::{setting, ConfigKey, Configuration, OutputKind};
use crate::projects::ProjectRegistry;
use crate::registry::ConfigRegistry;

const DEFAULT_WARNING_LEVEL: u8 = 4;

/// A private reference that must be copied next to the output.
/// 需要複製到輸出目錄旁的私有參考。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyLocal {
    pub name: String,
    pub source: PathBuf,
}

/// Everything the compiler needs, derived from one configuration.
/// 由單一組態推導出、編譯器所需的全部選項。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    pub project_name: String,
    pub project_file: PathBuf,
    pub configuration: ConfigKey,
    pub output_kind: OutputKind,
    pub output_directory: PathBuf,
    pub output_assembly: PathBuf,
    pub root_namespace: Option<String>,
    pub application_icon: Option<PathBuf>,
    pub startup_object: Option<String>,
    pub allow_unsafe_blocks: bool,
    pub check_for_overflow: bool,
    pub defines: Vec<String>,
    pub documentation_file: Option<PathBuf>,
    pub debug_symbols: bool,
    pub optimize: bool,
    pub warnings_as_errors: bool,
    pub warning_level: u8,
    pub incremental: bool,
    pub referenced_assemblies: Vec<PathBuf>,
    pub copy_local: Vec<CopyLocal>,
    /// Project references whose project is not registered or has no GUID.
    pub unresolved_references: Vec<String>,
}

impl BuildOptions {
    /// Translates a configuration into build options.
    /// 將組態轉換為建置選項。
    ///
    /// Project references are resolved one hop: the referenced project is
    /// looked up by GUID and its own active configuration supplies the
    /// output path. References of that project are not followed.
    /// 專案參考只解析一層：以 GUID 找到被參考的專案，並採用其作用中組態的輸出路徑，
    /// 不再追蹤該專案本身的參考。
    pub fn translate(
        project: &Project,
        configuration: &Configuration,
        projects: &ProjectRegistry,
        configs: &ConfigRegistry,
    ) -> Self {
        let warning_level = configuration
            .get_property(setting::WARNING_LEVEL)
            .and_then(|raw| raw.trim().parse::<u8>().ok())
            .unwrap_or(DEFAULT_WARNING_LEVEL)
            .min(DEFAULT_WARNING_LEVEL);

        let defines = configuration
            .get_property(setting::DEFINE_CONSTANTS)
            .map(|raw| {
                raw.split(';')
                    .map(str::trim)
                    .filter(|define| !define.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let mut referenced = Vec::new();
        let mut copy_local = Vec::new();
        for reference in project.references() {
            push_unique(&mut referenced, reference.assembly_path());
            if let (true, Some(source)) = (reference.private, reference.hint_path.clone()) {
                copy_local.push(CopyLocal {
                    name: reference.name.clone(),
                    source,
                });
            }
        }

        let mut unresolved = Vec::new();
        for reference in project.project_references() {
            let target = reference
                .guid
                .and_then(|guid| projects.find_project_by_guid(guid));
            match target {
                Some(target) => {
                    let active = configs.resolve(target);
                    let output = active.output_assembly_path().to_path_buf();
                    push_unique(&mut referenced, output.clone());
                    copy_local.push(CopyLocal {
                        name: reference.name.clone(),
                        source: output,
                    });
                }
                None => {
                    tracing::warn!(
                        project = %project.name(),
                        reference = %reference.name,
                        "project reference could not be resolved"
                    );
                    unresolved.push(reference.name);
                }
            }
        }

        Self {
            project_name: project.name(),
            project_file: project.path().to_path_buf(),
            configuration: configuration.key().clone(),
            output_kind: configuration.output_kind(),
            output_directory: configuration.output_directory(),
            output_assembly: configuration.output_assembly_path().to_path_buf(),
            root_namespace: text(configuration, setting::ROOT_NAMESPACE),
            application_icon: configuration
                .get_property(setting::APPLICATION_ICON)
                .map(|raw| configuration.resolve(raw)),
            startup_object: text(configuration, setting::STARTUP_OBJECT),
            allow_unsafe_blocks: configuration.flag(setting::ALLOW_UNSAFE_BLOCKS),
            check_for_overflow: configuration.flag(setting::CHECK_FOR_OVERFLOW),
            defines,
            documentation_file: configuration
                .get_property(setting::DOCUMENTATION_FILE)
                .map(|raw| configuration.resolve(raw)),
            debug_symbols: configuration.flag(setting::DEBUG_SYMBOLS),
            optimize: configuration.flag(setting::OPTIMIZE),
            warnings_as_errors: configuration.flag(setting::TREAT_WARNINGS_AS_ERRORS),
            warning_level,
            incremental: configuration.flag(setting::INCREMENTAL_BUILD),
            referenced_assemblies: referenced,
            copy_local,
            unresolved_references: unresolved,
        }
    }

    /// Directory of the project file; sources and relative paths hang off it.
    /// 專案檔所在目錄。
    pub fn project_dir(&self) -> &Path {
        self.project_file.parent().unwrap_or_else(|| Path::new("."))
    }
}

fn text(configuration: &Configuration, name: &str) -> Option<String> {
    configuration.get_property(name).map(str::to_string)
}

fn push_unique(paths: &mut Vec<PathBuf>, path: PathBuf) {
    let folded = path.to_string_lossy().to_ascii_lowercase();
    if !paths
        .iter()
        .any(|existing| existing.to_string_lossy().to_ascii_lowercase() == folded)
    {
        paths.push(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_hierarchy::ConfigurationGroup;

    fn library() -> Project {
        let mut core = Project::new("/ws/core/core.proj", "core").unwrap();
        core.set_property(setting::OUTPUT_TYPE, "Library");
        let mut group = ConfigurationGroup::new("Debug", "AnyCPU");
        group.set_property(setting::OUTPUT_PATH, "bin/Debug");
        core.configuration_groups_mut().push(group);
        core
    }

    fn app(core_guid: uuid::Uuid) -> Project {
        let mut app = Project::new("/ws/app/app.proj", "app").unwrap();
        app.set_property(setting::ASSEMBLY_NAME, "App");
        app.set_property(setting::ROOT_NAMESPACE, "Acme.App");
        let mut group = ConfigurationGroup::new("Debug", "AnyCPU");
        group.set_property(setting::OUTPUT_PATH, "bin\\Debug\\");
        group.set_property(setting::DEFINE_CONSTANTS, "DEBUG; TRACE;;");
        group.set_property(setting::DEBUG_SYMBOLS, "True");
        group.set_property(setting::WARNING_LEVEL, "9");
        group.set_property(setting::DOCUMENTATION_FILE, "doc/App.xml");
        app.configuration_groups_mut().push(group);
        app.add_reference("System.Xml", None, Some(false)).unwrap();
        app.add_reference("Lib", Some(Path::new("/ws/lib/Lib.dll")), None)
            .unwrap();
        app.add_reference("lib", None, None).unwrap();
        app.add_project_reference(core_guid, "core").unwrap();
        app.add_project_reference(uuid::Uuid::new_v4(), "ghost")
            .unwrap();
        app
    }

    #[test]
    fn translate_maps_settings_and_references() {
        let mut projects = ProjectRegistry::new();
        let core_guid = projects.insert(library()).unwrap();
        let app = app(core_guid);
        let configs = ConfigRegistry::new();
        let config = configs.resolve(&app);

        let options = BuildOptions::translate(&app, &config, &projects, &configs);

        assert_eq!(options.output_kind, OutputKind::Exe);
        assert_eq!(options.output_directory, PathBuf::from("/ws/app/bin/Debug"));
        assert_eq!(options.output_assembly, PathBuf::from("/ws/app/bin/Debug/App.exe"));
        assert_eq!(options.defines, vec!["DEBUG", "TRACE"]);
        assert!(options.debug_symbols);
        assert!(!options.optimize);
        assert_eq!(options.warning_level, 4);
        assert_eq!(options.root_namespace.as_deref(), Some("Acme.App"));
        assert_eq!(
            options.documentation_file,
            Some(PathBuf::from("/ws/app/doc/App.xml"))
        );
        assert_eq!(
            options.referenced_assemblies,
            vec![
                PathBuf::from("/ws/lib/Lib.dll"),
                PathBuf::from("System.Xml.dll"),
                PathBuf::from("/ws/core/bin/Debug/core.dll"),
            ]
        );
        assert_eq!(
            options
                .copy_local
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>(),
            vec!["Lib", "core"]
        );
        assert_eq!(options.unresolved_references, vec!["ghost"]);
    }
}
