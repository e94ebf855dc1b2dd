use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use trellis_build::{BuildFlags, BuildState, CommandCompiler, OutputSink, Workspace};
use trellis_config::{ConfigKey, ConfigRegistry, Preferences, PreferencesStore};
use trellis_hierarchy::{Hierarchy, ItemId, Project, DEFAULT_PLATFORM};

/// Exit code for a build that ran but did not succeed.
const BUILD_FAILED_EXIT: i32 = 2;

#[derive(Parser)]
#[command(
    name = "trellis",
    about = "Inspect, edit and build Trellis projects",
    author,
    version
)]
struct Cli {
    /// 顯示除錯記錄。 / Enable debug logging.
    #[arg(long, short, global = true)]
    verbose: bool,
    /// 偏好設定檔路徑。 / Path to a preferences JSON file.
    #[arg(long, global = true, value_name = "PATH")]
    preferences: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 建立空白專案檔。 / Create an empty project file.
    New(NewArgs),
    /// 列出專案樹與各節點代號。 / Print the project tree with item handles.
    Tree(ProjectArg),
    /// 將檔案加入專案。 / Add files to a project.
    Add(AddArgs),
    /// 加入組件參考。 / Add an assembly reference.
    AddRef(AddRefArgs),
    /// 加入對其他專案的參考。 / Add a reference to another project.
    AddProjectRef(AddProjectRefArgs),
    /// 列出組態與輸出路徑。 / List configurations and their output paths.
    Configs(ProjectArg),
    /// 建置專案。 / Build a project.
    Build(BuildArgs),
    /// 清除建置輸出。 / Delete build outputs.
    Clean(TargetArgs),
}

#[derive(Args)]
struct ProjectArg {
    /// 專案檔路徑。 / Project file.
    #[arg(value_name = "PROJECT")]
    project: PathBuf,
}

#[derive(Args)]
struct NewArgs {
    /// 新專案檔路徑。 / Path of the new project file.
    #[arg(value_name = "PROJECT")]
    project: PathBuf,
    /// 專案名稱；預設取檔名。 / Project name; defaults to the file stem.
    #[arg(long)]
    name: Option<String>,
}

#[derive(Args)]
struct AddArgs {
    #[arg(value_name = "PROJECT")]
    project: PathBuf,
    /// 要加入的檔案。 / Files to add.
    #[arg(required = true, value_name = "PATH")]
    paths: Vec<PathBuf>,
}

#[derive(Args)]
struct AddRefArgs {
    #[arg(value_name = "PROJECT")]
    project: PathBuf,
    /// 組件名稱。 / Assembly name.
    name: String,
    /// 組件檔案位置。 / Where the assembly lives.
    #[arg(long, value_name = "PATH")]
    hint_path: Option<PathBuf>,
    /// 不要複製到輸出目錄。 / Do not copy the assembly beside the output.
    #[arg(long)]
    no_copy: bool,
}

#[derive(Args)]
struct AddProjectRefArgs {
    #[arg(value_name = "PROJECT")]
    project: PathBuf,
    /// 被參考的專案檔。 / Project file being referenced.
    #[arg(value_name = "REFERENCED")]
    referenced: PathBuf,
}

#[derive(Args)]
struct TargetArgs {
    #[arg(value_name = "PROJECT")]
    project: PathBuf,
    /// 組態名稱；預設為作用中組態。 / Configuration name; defaults to the active one.
    #[arg(long)]
    config: Option<String>,
    /// 平台名稱。 / Platform name.
    #[arg(long, requires = "config")]
    platform: Option<String>,
    /// 一併開啟的其他專案（供專案參考解析）。 / Extra projects to open so project references resolve.
    #[arg(long = "with", value_name = "PROJECT")]
    with: Vec<PathBuf>,
}

#[derive(Args)]
struct BuildArgs {
    #[command(flatten)]
    target: TargetArgs,
    /// 忽略是否為最新，強制重新建置。 / Rebuild even when outputs are current.
    #[arg(long)]
    rebuild: bool,
}

/// Prints build output as it arrives.
struct ConsoleOutput;

impl OutputSink for ConsoleOutput {
    fn write_line(&self, line: &str) {
        println!("{line}");
    }
}

fn main() {
    match run() {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let Cli {
        verbose,
        preferences,
        command,
    } = Cli::parse();
    init_tracing(verbose);

    match command {
        Commands::New(args) => execute_new(args).map(|()| 0),
        Commands::Tree(args) => execute_tree(&args.project).map(|()| 0),
        Commands::Add(args) => execute_add(args).map(|()| 0),
        Commands::AddRef(args) => execute_add_ref(args).map(|()| 0),
        Commands::AddProjectRef(args) => execute_add_project_ref(args).map(|()| 0),
        Commands::Configs(args) => execute_configs(&args.project).map(|()| 0),
        Commands::Build(args) => {
            let flags = if args.rebuild {
                BuildFlags::REBUILD
            } else {
                BuildFlags::empty()
            };
            execute_build(args.target, flags, false, preferences.as_deref())
        }
        Commands::Clean(args) => {
            execute_build(args, BuildFlags::CLEAN, true, preferences.as_deref())
        }
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_project(path: &Path) -> Result<Project> {
    Project::load(path).with_context(|| format!("failed to open project {}", path.display()))
}

fn execute_new(args: NewArgs) -> Result<()> {
    if args.project.exists() {
        bail!("{} already exists", args.project.display());
    }
    let name = match args.name {
        Some(name) => name,
        None => args
            .project
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .context("project path has no file name")?,
    };
    let mut project = Project::new(&args.project, &name)?;
    let mut registry = ConfigRegistry::new();
    for configuration in ["Debug", "Release"] {
        registry.get_or_create(&mut project, configuration, DEFAULT_PLATFORM);
    }
    project.save()?;
    println!("Created project {name} ({})", project.guid());
    Ok(())
}

fn execute_tree(path: &Path) -> Result<()> {
    let project = load_project(path)?;
    let tree = project.tree();
    println!(
        "{} [{}]",
        tree.caption(ItemId::ROOT).unwrap_or_default(),
        tree.kind(ItemId::ROOT).map(|kind| kind.to_string()).unwrap_or_default()
    );
    print_children(tree, ItemId::ROOT, 1);
    Ok(())
}

fn print_children(tree: &Hierarchy, parent: ItemId, depth: usize) {
    for child in tree.children(parent) {
        let (Some(caption), Some(kind)) = (tree.caption(child), tree.kind(child)) else {
            continue;
        };
        println!("{}{caption} [{kind}] #{child}", "  ".repeat(depth));
        print_children(tree, child, depth + 1);
    }
}

fn execute_add(args: AddArgs) -> Result<()> {
    let mut project = load_project(&args.project)?;
    let added = project.add_files(&args.paths)?;
    project.save()?;
    println!("Added {} item(s) to {}", added.len(), project.name());
    Ok(())
}

fn execute_add_ref(args: AddRefArgs) -> Result<()> {
    let mut project = load_project(&args.project)?;
    let private = if args.no_copy { Some(false) } else { None };
    let id = project.add_reference(&args.name, args.hint_path.as_deref(), private)?;
    project.save()?;
    println!("Reference {} is item #{id}", args.name);
    Ok(())
}

fn execute_add_project_ref(args: AddProjectRefArgs) -> Result<()> {
    let mut project = load_project(&args.project)?;
    let referenced = load_project(&args.referenced)?;
    let id = project.add_project_reference(referenced.guid(), &referenced.name())?;
    project.save()?;
    println!(
        "Project reference {} ({}) is item #{id}",
        referenced.name(),
        referenced.guid()
    );
    Ok(())
}

fn execute_configs(path: &Path) -> Result<()> {
    let project = load_project(path)?;
    let registry = ConfigRegistry::new();
    let active = registry.resolve(&project);
    let configurations = registry.configurations(&project);
    if configurations.is_empty() {
        println!(
            "* {} -> {} (default)",
            active.display_name(),
            active.output_assembly_path().display()
        );
        return Ok(());
    }
    for configuration in configurations {
        let marker = if configuration.key() == active.key() {
            '*'
        } else {
            ' '
        };
        println!(
            "{marker} {} -> {}",
            configuration.display_name(),
            configuration.output_assembly_path().display()
        );
    }
    Ok(())
}

fn execute_build(
    target: TargetArgs,
    flags: BuildFlags,
    clean_only: bool,
    preferences_path: Option<&Path>,
) -> Result<i32> {
    let preferences = match preferences_path {
        Some(path) => PreferencesStore::load(path)?.preferences().clone(),
        None => Preferences::default(),
    };
    let compiler = Arc::new(CommandCompiler::from_preferences(&preferences.compiler));
    let mut workspace = Workspace::new(compiler, preferences);

    let guid = workspace.add_project(load_project(&target.project)?)?;
    for extra in &target.with {
        workspace.add_project(load_project(extra)?)?;
    }

    let key = target.config.map(|name| {
        ConfigKey::new(
            name,
            target
                .platform
                .unwrap_or_else(|| DEFAULT_PLATFORM.to_string()),
        )
    });
    let mut session = workspace.create_session(guid, key.as_ref(), Arc::new(ConsoleOutput))?;
    if clean_only {
        session.start_clean(flags)?;
    } else {
        session.start_build(flags)?;
    }
    let state = session.wait();
    tracing::info!(session = %session.name(), %state, "done");
    Ok(match state {
        BuildState::Succeeded => 0,
        _ => BUILD_FAILED_EXIT,
    })
}
