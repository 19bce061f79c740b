//! ncvocab CLI
//!
//! Check files against project standards and product definitions, release
//! versioned definitions, generate example files and scaffold new projects.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use ncvocab::compatibility::{declared_bump, Bump};
use ncvocab::compiler::{compile_file, compile_standard};
use ncvocab::example::synthesize;
use ncvocab::project_registry::{ConventionSpec, RegisteredProject};
use ncvocab::registry::load_product_file;
use ncvocab::scaffold::init_project;
use ncvocab::{
    AttrValue, CompatibilityChecker, DataSource, Dataset, JsonDump, ProjectModelSet,
    ProjectRegistry, SourceGroup, ToolConfig, ValidateOptions, Validator, Verbosity, VersionStore,
};

#[derive(Parser)]
#[command(name = "ncvocab")]
#[command(about = "Versioned netCDF product definitions")]
#[command(version)]
struct Cli {
    /// Extra configuration file, applied over ncvocab.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a file against project standards and a product definition
    Check(CheckArgs),

    /// Register a project so files naming its conventions find it
    Register {
        /// Project directory
        project: PathBuf,
        /// Conventions the project answers to, e.g. ACME-[].[]
        #[arg(short = 'c', long = "conventions")]
        conventions: String,
        /// Definitions directory [default: project.definitions_dir]
        #[arg(short = 'd', long = "definitions")]
        definitions: Option<PathBuf>,
        /// Replace an existing registration
        #[arg(short = 'f', long = "force")]
        force: bool,
    },

    /// Compile every project definition and freeze them as a version
    #[command(name = "create-version", alias = "create_version")]
    CreateVersion {
        /// Project directory
        #[arg(short = 'd', long = "project")]
        project: PathBuf,
        /// Version tag, e.g. 1.0
        #[arg(short = 'v', long = "version")]
        version: String,
        /// Output directory [default: release.output_dir]
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },

    /// Write an example file that satisfies a definition
    #[command(name = "eg-data", alias = "eg_data")]
    EgData {
        /// Project directory [default: project.path]
        #[arg(short = 'p', long = "project")]
        project: Option<PathBuf>,
        /// Definition (YAML) or versioned product (JSON)
        #[arg(short = 'd', long = "definition")]
        definition: PathBuf,
        /// Output file
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },

    /// Create a new project
    Init {
        /// Project directory to create
        #[arg(short = 'd', long = "directory")]
        directory: PathBuf,
    },

    /// Compare two released versions
    Diff {
        /// Release directory [default: release.output_dir]
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
        #[arg(long)]
        from: String,
        #[arg(long, default_value = "latest")]
        to: String,
        /// Any change is breaking
        #[arg(long)]
        strict: bool,
        /// Print a unified diff of changed products
        #[arg(long)]
        text: bool,
    },

    /// List released versions
    List {
        /// Release directory [default: release.output_dir]
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct CheckArgs {
    /// File to check (JSON dump of the file structure)
    file: PathBuf,

    /// Project directory; repeat to check against several. Registered
    /// projects matching the file's Conventions are used when omitted,
    /// then project.path
    #[arg(short = 'p', long = "project")]
    project: Vec<PathBuf>,

    /// Definition (YAML) or versioned product (JSON); chosen by file
    /// pattern when omitted, and skipped when nothing matches
    #[arg(short = 'd', long = "definition")]
    definition: Option<PathBuf>,

    /// Show errors only
    #[arg(short = 'e', long = "errors", group = "verbosity")]
    errors: bool,

    /// Show warnings and errors
    #[arg(short = 'w', long = "warnings", group = "verbosity")]
    warnings: bool,

    /// Print nothing; exit status only
    #[arg(short = 'q', long = "quiet", group = "verbosity")]
    quiet: bool,

    /// Report elements the definition does not mention
    #[arg(long)]
    closed: bool,
}

impl CheckArgs {
    fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else if self.errors {
            Verbosity::ErrorsOnly
        } else if self.warnings {
            Verbosity::WarningsAndErrors
        } else {
            Verbosity::All
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = ToolConfig::load_from(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Check(args) => check(&config, args),

        Commands::Register {
            project,
            conventions,
            definitions,
            force,
        } => {
            let path = project
                .canonicalize()
                .with_context(|| format!("opening project {}", project.display()))?;
            let definitions =
                path.join(definitions.unwrap_or_else(|| config.project.definitions_dir.clone()));
            let entry = RegisteredProject {
                spec: ConventionSpec::parse(&conventions)?,
                path,
                definitions,
            };
            entry.open()?;

            let registry_path = registry_path(&config)?;
            let mut registry = ProjectRegistry::load(&registry_path)?;
            let name = entry.spec.name.clone();
            registry.add(entry, force)?;
            registry.save(&registry_path)?;
            println!("Registered {} in {}", name, registry_path.display());
            Ok(0)
        }

        Commands::CreateVersion {
            project,
            version,
            output,
        } => {
            let project = open_project(&config, Some(project))?;
            let products = compile_project(&project)?;
            if products.is_empty() {
                bail!("no definitions found in {}", project.definitions_dir.display());
            }

            let output = output.unwrap_or_else(|| config.release.output_dir.clone());
            let store = VersionStore::with_options(&output, config.store_options());
            let frozen = store.freeze_all(products, &version)?;

            println!("Created {} in {}", frozen, output.display());
            for name in frozen.products.keys() {
                println!("  {}", name);
            }
            Ok(0)
        }

        Commands::EgData {
            project,
            definition,
            output,
        } => {
            let project = open_project(&config, project)?;
            let dataset = load_definition(&definition, &project)?;
            let source = synthesize(&dataset, &config.example_options());
            JsonDump::write(&output, &source)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("Wrote example for {} to {}", dataset.product_name(), output.display());
            Ok(0)
        }

        Commands::Init { directory } => {
            let files = init_project(&directory)?;
            println!("Initialised project in {}", directory.display());
            for file in files {
                println!("  {}", file.display());
            }
            Ok(0)
        }

        Commands::Diff {
            output,
            from,
            to,
            strict,
            text,
        } => {
            let output = output.unwrap_or_else(|| config.release.output_dir.clone());
            let store = VersionStore::open(&output);
            let old = store.load(&from)?;
            let new = store.load(&to)?;

            let checker = if strict {
                CompatibilityChecker::new().strict()
            } else {
                CompatibilityChecker::new()
            };
            let results = checker.check_versions(&old, &new);

            println!("Comparing {} -> {}", old, new);
            let mut bump = Bump::Patch;
            for (name, result) in &results {
                let mark = if result.is_compatible { "ok" } else { "BREAKING" };
                println!("\n{} [{}]: {}", name, mark, result.summary);
                for change in &result.changes {
                    let flag = if change.is_breaking { "!" } else { " " };
                    println!("  {} {} : {}", flag, change.path, change.description);
                }
                bump = bump.max(result.required_bump());

                if text {
                    if let (Some(a), Some(b)) = (old.product(name), new.product(name)) {
                        print!("{}", ncvocab::compatibility::text_diff(a, b)?);
                    }
                }
            }

            let Some(declared) = declared_bump(&old, &new) else {
                println!("\n{} is not newer than {}", new, old);
                return Ok(if bump > Bump::Patch { 1 } else { 0 });
            };
            if declared < bump {
                warn!(required = ?bump, declared = ?declared, "version bump too small for these changes");
                println!("\nChanges need at least a {:?} version bump", bump);
                return Ok(1);
            }
            Ok(0)
        }

        Commands::List { output } => {
            let output = output.unwrap_or_else(|| config.release.output_dir.clone());
            let store = VersionStore::open(&output);
            for manifest in store.list()? {
                println!(
                    "{}\t{}\t{}",
                    manifest.tag,
                    manifest.created_at.format("%Y-%m-%d %H:%M:%S"),
                    manifest.products.keys().cloned().collect::<Vec<_>>().join(", ")
                );
            }
            Ok(0)
        }
    }
}

fn check(config: &ToolConfig, args: CheckArgs) -> anyhow::Result<i32> {
    if args.file.extension().map(|e| e == "nc").unwrap_or(false) {
        bail!(
            "{} is a netCDF file; dump its structure to JSON and check the dump",
            args.file.display()
        );
    }
    let source = JsonDump::new(&args.file);
    let root = source
        .root()
        .with_context(|| format!("reading {}", args.file.display()))?;
    let projects = check_projects(config, &args.project, &root)?;

    let mut options = config.validate_options();
    if args.closed {
        options.allow_unknown = false;
    }
    let verbosity = args.verbosity();
    let mut compliant = true;

    // The standard only covers global attributes, so the rest of the file
    // is never unknown to it
    let standard_options = ValidateOptions {
        allow_unknown: true,
        ..options
    };
    for project in &projects {
        let standard = compile_standard(project)
            .with_context(|| format!("compiling the standard of {}", project.root.display()))?;
        let report = Validator::new(standard_options).validate(&standard, &root);
        print!(
            "{}",
            report.render(
                verbosity,
                &source.describe(),
                &format!("{} standard", standard.product_name())
            )
        );
        compliant &= report.is_compliant();
    }

    let definition = match &args.definition {
        Some(path) => Some((path.clone(), &projects[0])),
        None => find_definition(&projects, &args.file)?,
    };
    match definition {
        Some((path, project)) => {
            let dataset = load_definition(&path, project)?;
            let report = Validator::new(options).validate(&dataset, &root);
            print!(
                "{}",
                report.render(verbosity, &source.describe(), dataset.product_name())
            );
            compliant &= report.is_compliant();
        }
        None => {
            debug!(file = %args.file.display(), "no product definition matches");
            if verbosity != Verbosity::Quiet {
                println!("No product definition matches; checked against project standards only");
            }
        }
    }

    Ok(if compliant { 0 } else { 1 })
}

/// Projects named with `-p`, else registered projects matching the file's
/// Conventions attribute, else the configured project
fn check_projects(
    config: &ToolConfig,
    named: &[PathBuf],
    root: &SourceGroup,
) -> anyhow::Result<Vec<ProjectModelSet>> {
    if !named.is_empty() {
        return named
            .iter()
            .map(|path| open_project(config, Some(path.clone())))
            .collect();
    }

    let conventions = match root.attribute("Conventions") {
        Some(AttrValue::Scalar(value)) => value.as_text(),
        _ => None,
    };
    if let (Some(conventions), Some(registry_path)) = (conventions, config.registry_path()) {
        let registry = ProjectRegistry::load(&registry_path)
            .with_context(|| format!("reading {}", registry_path.display()))?;
        let projects = registry
            .matching(conventions)
            .into_iter()
            .map(|entry| {
                entry
                    .open()
                    .with_context(|| format!("opening registered project {}", entry.spec.name))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        if !projects.is_empty() {
            debug!(conventions = %conventions, count = projects.len(), "using registered projects");
            return Ok(projects);
        }
    }

    Ok(vec![open_project(config, None)?])
}

fn registry_path(config: &ToolConfig) -> anyhow::Result<PathBuf> {
    config
        .registry_path()
        .context("no user config directory; set project.registry")
}

fn open_project(config: &ToolConfig, path: Option<PathBuf>) -> anyhow::Result<ProjectModelSet> {
    let path = path.unwrap_or_else(|| config.project.path.clone());
    ProjectModelSet::open_with(&path, &config.project.defaults_file, &config.project.definitions_dir)
        .with_context(|| format!("opening project {}", path.display()))
}

/// YAML definitions are compiled, JSON products are loaded as released
fn load_definition(path: &Path, project: &ProjectModelSet) -> anyhow::Result<Dataset> {
    let is_json = path.extension().map(|e| e == "json").unwrap_or(false);
    let dataset = if is_json {
        load_product_file(path)
    } else {
        compile_file(path, project)
    };
    dataset.with_context(|| format!("loading definition {}", path.display()))
}

/// First definition, across the projects in order, whose file pattern
/// matches the file
fn find_definition<'a>(
    projects: &'a [ProjectModelSet],
    file: &Path,
) -> anyhow::Result<Option<(PathBuf, &'a ProjectModelSet)>> {
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    // Dumps are usually named after the original file plus `.json`
    let candidates = [name.clone(), name.trim_end_matches(".json").to_string()];
    for project in projects {
        for candidate in &candidates {
            if let Some(path) = project.find_definition_for(candidate)? {
                debug!(file = %candidate, definition = %path.display(), "matched definition");
                return Ok(Some((path, project)));
            }
        }
    }
    Ok(None)
}

fn compile_project(project: &ProjectModelSet) -> anyhow::Result<BTreeMap<String, Dataset>> {
    let mut products = BTreeMap::new();
    for path in project.definitions()? {
        let dataset = compile_file(&path, project)
            .with_context(|| format!("compiling {}", path.display()))?;
        let name = dataset.product_name().to_string();
        if products.contains_key(&name) {
            bail!("two definitions produce the product name '{}'", name);
        }
        products.insert(name, dataset);
    }
    Ok(products)
}
