use std::error::Error;
use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn cli() -> Result<Command, Box<dyn Error>> {
    Ok(Command::cargo_bin("trellis")?)
}

fn path_arg(path: &Path) -> &str {
    path.to_str().expect("utf-8 temp path")
}

fn create_project(dir: &Path, name: &str) -> Result<std::path::PathBuf, Box<dyn Error>> {
    let project = dir.join(format!("{name}.proj"));
    cli()?
        .args(["new", path_arg(&project)])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("Created project {name}")));
    Ok(project)
}

#[test]
fn new_project_lists_default_configurations() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let project = create_project(dir.path(), "app")?;

    cli()?
        .args(["configs", path_arg(&project)])
        .assert()
        .success()
        .stdout(predicate::str::contains("* Debug|AnyCPU"))
        .stdout(predicate::str::contains("  Release|AnyCPU"));
    Ok(())
}

#[test]
fn new_refuses_to_overwrite() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let project = create_project(dir.path(), "app")?;

    cli()?
        .args(["new", path_arg(&project)])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    Ok(())
}

#[test]
fn added_files_and_references_appear_in_tree() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let project = create_project(dir.path(), "app")?;
    fs::create_dir_all(dir.path().join("src"))?;
    fs::write(dir.path().join("src/main.cs"), "class Program {}")?;

    cli()?
        .args(["add", path_arg(&project), "src/main.cs", "src/main.cs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added 1 item(s) to app"));
    cli()?
        .args(["add-ref", path_arg(&project), "System.Xml", "--no-copy"])
        .assert()
        .success();

    cli()?
        .args(["tree", path_arg(&project)])
        .assert()
        .success()
        .stdout(predicate::str::contains("app [project]"))
        .stdout(predicate::str::contains("  References [references]"))
        .stdout(predicate::str::contains("    System.Xml [reference]"))
        .stdout(predicate::str::contains("  src [folder]"))
        .stdout(predicate::str::contains("    main.cs [file]"));
    Ok(())
}

#[test]
fn project_reference_is_recorded() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let app = create_project(dir.path(), "app")?;
    let lib = create_project(dir.path(), "lib")?;

    cli()?
        .args(["add-project-ref", path_arg(&app), path_arg(&lib)])
        .assert()
        .success()
        .stdout(predicate::str::contains("Project reference lib"));
    cli()?
        .args(["tree", path_arg(&app)])
        .assert()
        .success()
        .stdout(predicate::str::contains("lib [reference]"));
    Ok(())
}

#[test]
fn missing_project_reports_error() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let missing = dir.path().join("missing.proj");

    cli()?
        .args(["tree", path_arg(&missing)])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("failed to open project"));
    Ok(())
}

#[test]
fn unknown_configuration_is_an_error() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let project = create_project(dir.path(), "app")?;

    cli()?
        .args(["build", path_arg(&project), "--config", "Profile"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("has no configuration Profile|AnyCPU"));
    Ok(())
}

#[cfg(unix)]
mod with_fake_compiler {
    use super::*;

    /// Writes a preferences file whose compiler is `sh -c <script>`.
    fn preferences(dir: &Path, script: &str) -> Result<std::path::PathBuf, Box<dyn Error>> {
        let path = dir.join("preferences.json");
        let value = serde_json::json!({
            "compiler": { "program": "sh", "args": ["-c", script, "fakec"] }
        });
        fs::write(&path, serde_json::to_string_pretty(&value)?)?;
        Ok(path)
    }

    const TOUCH_OUTPUT: &str =
        r#"for a; do case "$a" in /out:*) touch "${a#/out:}";; esac; done"#;

    #[test]
    fn build_succeeds_then_reports_up_to_date() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let project = create_project(dir.path(), "app")?;
        fs::write(dir.path().join("main.cs"), "class Program {}")?;
        cli()?
            .args(["add", path_arg(&project), "main.cs"])
            .assert()
            .success();
        let prefs = preferences(dir.path(), TOUCH_OUTPUT)?;

        cli()?
            .args(["--preferences", path_arg(&prefs), "build", path_arg(&project)])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "------ Build started: Project: app, Configuration: Debug|AnyCPU ------",
            ))
            .stdout(predicate::str::contains("Build complete -- 0 errors, 0 warnings"));
        assert!(dir.path().join("bin/Debug/app.exe").exists());

        cli()?
            .args(["--preferences", path_arg(&prefs), "build", path_arg(&project)])
            .assert()
            .success()
            .stdout(predicate::str::contains("app is up to date."));

        cli()?
            .args([
                "--preferences",
                path_arg(&prefs),
                "build",
                path_arg(&project),
                "--rebuild",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("Build complete"));
        Ok(())
    }

    #[test]
    fn compiler_errors_fail_the_build() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let project = create_project(dir.path(), "app")?;
        fs::write(dir.path().join("main.cs"), "class Program {")?;
        cli()?
            .args(["add", path_arg(&project), "main.cs"])
            .assert()
            .success();
        let prefs = preferences(
            dir.path(),
            "echo 'main.cs(1,16): error CS1513: } expected'; exit 1",
        )?;

        cli()?
            .args([
                "--preferences",
                path_arg(&prefs),
                "build",
                path_arg(&project),
                "--config",
                "Release",
            ])
            .assert()
            .code(2)
            .stdout(predicate::str::contains("error CS1513: } expected"))
            .stdout(predicate::str::contains("Build complete -- 1 errors, 0 warnings"));
        Ok(())
    }

    #[test]
    fn clean_removes_outputs() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let project = create_project(dir.path(), "app")?;
        fs::write(dir.path().join("main.cs"), "class Program {}")?;
        cli()?
            .args(["add", path_arg(&project), "main.cs"])
            .assert()
            .success();
        let prefs = preferences(dir.path(), TOUCH_OUTPUT)?;
        cli()?
            .args(["--preferences", path_arg(&prefs), "build", path_arg(&project)])
            .assert()
            .success();
        let output = dir.path().join("bin/Debug/app.exe");
        assert!(output.exists());

        cli()?
            .args(["--preferences", path_arg(&prefs), "clean", path_arg(&project)])
            .assert()
            .success();
        assert!(!output.exists());
        Ok(())
    }
}
