use std::path::PathBuf;

use tempfile::tempdir;
use trellis_config::{
    setting, BuildOptions, ConfigKey, ConfigRegistry, FixedConfiguration, OutputKind,
    ProjectRegistry,
};
use trellis_hierarchy::Project;

#[test]
fn created_configurations_survive_save_and_reload() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("tool/tool.proj");
    let mut project = Project::new(&path, "tool").expect("project");
    project.set_property(setting::OUTPUT_TYPE, "Library");

    let mut configs = ConfigRegistry::new();
    configs.get_or_create(&mut project, "Debug", "AnyCPU");
    let release = configs.get_or_create(&mut project, "Release", "AnyCPU");
    assert!(release.flag(setting::OPTIMIZE));

    configs
        .set_property(
            &mut project,
            &ConfigKey::new("release", "anycpu"),
            setting::DEFINE_CONSTANTS,
            "TRACE;SHIP",
        )
        .expect("set property");
    configs
        .add_platform_name(&mut project, "x64", Some("AnyCPU"))
        .expect("add platform");
    project.save().expect("save");

    let reloaded = Project::load(&path).expect("reload");
    let configs = ConfigRegistry::new();
    assert_eq!(configs.names(&reloaded), vec!["Debug", "Release"]);
    assert_eq!(configs.platforms(&reloaded), vec!["AnyCPU", "x64"]);

    let x64 = configs
        .configurations(&reloaded)
        .into_iter()
        .find(|config| config.key() == &ConfigKey::new("Release", "x64"))
        .expect("cloned platform");
    assert_eq!(x64.get_property(setting::DEFINE_CONSTANTS), Some("TRACE;SHIP"));
    assert_eq!(x64.output_kind(), OutputKind::Library);
}

#[test]
fn build_manager_selects_configuration_for_translation() {
    let temp = tempdir().expect("tempdir");
    let mut project = Project::new(temp.path().join("app/app.proj"), "app").expect("project");
    let mut configs = ConfigRegistry::with_build_manager(Box::new(FixedConfiguration(
        ConfigKey::new("Release", "AnyCPU"),
    )));
    configs.get_or_create(&mut project, "Debug", "AnyCPU");
    configs.get_or_create(&mut project, "Release", "AnyCPU");

    let active = configs.resolve(&project);
    assert_eq!(active.name(), "Release");

    let options = BuildOptions::translate(&project, &active, &ProjectRegistry::new(), &configs);
    assert!(options.optimize);
    assert!(!options.debug_symbols);
    assert_eq!(
        options.output_assembly,
        temp.path()
            .join("app")
            .join(PathBuf::from("bin/Release/app.exe"))
    );
}
