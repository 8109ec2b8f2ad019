use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};

use stratus_core::constructs;
use stratus_core::naming;
use stratus_core::resource::ResourceSpec;
use stratus_core::schema::ResourceSchema;
use stratus_core::stack::Stack;
use stratus_core::template;

#[derive(Parser)]
#[command(name = "stratus")]
#[command(about = "Assemble AWS constructs into deterministic templates", long_about = None)]
struct Cli {
    /// Log debug output (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build every construct in a stack file and report problems
    Validate {
        /// Path to the stack file
        #[arg(default_value = "stack.json")]
        file: PathBuf,
    },
    /// Render the stack as a template
    Synth {
        /// Path to the stack file
        #[arg(default_value = "stack.json")]
        file: PathBuf,

        /// Write the template here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Show changes against a previously written template
    Diff {
        /// Path to the stack file
        #[arg(default_value = "stack.json")]
        file: PathBuf,

        /// Previously synthesized template
        #[arg(long)]
        against: PathBuf,
    },
    /// Print the hyphenated form of a construct id
    Normalize {
        /// Construct id, e.g. MyServiceName
        id: String,
    },
    /// Describe the fields each construct kind accepts
    Schema {
        /// Construct kind (instance, asg_cluster, container_service, ecr_repository)
        kind: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let result = match cli.command {
        Commands::Validate { file } => run_validate(&file),
        Commands::Synth { file, output } => run_synth(&file, output.as_deref()),
        Commands::Diff { file, against } => run_diff(&file, &against),
        Commands::Normalize { id } => {
            println!("{}", naming::normalize(&id));
            Ok(())
        }
        Commands::Schema { kind } => run_schema(kind.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

fn synthesize(file: &Path) -> Result<Vec<ResourceSpec>> {
    let stack = Stack::load(file)?;
    Ok(stack.synthesize()?)
}

fn run_validate(file: &Path) -> Result<()> {
    println!("{}", "Validating...".cyan());

    let specs = synthesize(file)?;

    println!(
        "{}",
        format!("✓ {} constructs validated successfully.", specs.len())
            .green()
            .bold()
    );
    for spec in &specs {
        println!("  • {}.{}", spec.kind, spec.id);
    }

    Ok(())
}

fn run_synth(file: &Path, output: Option<&Path>) -> Result<()> {
    let specs = synthesize(file)?;
    let rendered = template::render_string(&specs).context("Failed to render template")?;

    match output {
        Some(path) => {
            fs::write(path, &rendered)
                .map_err(|e| anyhow!("Failed to write {}: {}", path.display(), e))?;
            log::info!("Wrote {} resources to {}", specs.len(), path.display());
            println!("{} {}", "Synthesized:".green(), path.display());
        }
        None => print!("{}", rendered),
    }

    Ok(())
}

fn run_diff(file: &Path, against: &Path) -> Result<()> {
    let previous = fs::read_to_string(against)
        .map_err(|e| anyhow!("Failed to read {}: {}", against.display(), e))?;
    let specs = synthesize(file)?;
    let current = template::render_string(&specs).context("Failed to render template")?;

    if previous == current {
        println!("{}", "No changes.".green());
        return Ok(());
    }

    print_diff(against, &previous, &current);
    Ok(())
}

fn run_schema(kind: Option<&str>) -> Result<()> {
    let schemas = constructs::schemas();

    let selected: Vec<&ResourceSchema> = match kind {
        Some(kind) => {
            let Some(schema) = schemas.iter().find(|s| s.resource_type == kind) else {
                let known: Vec<_> = schemas.iter().map(|s| s.resource_type.as_str()).collect();
                bail!("Unknown construct kind '{}', expected one of: {}", kind, known.join(", "));
            };
            vec![schema]
        }
        None => schemas.iter().collect(),
    };

    for schema in selected {
        print_schema(schema);
    }
    Ok(())
}

fn print_schema(schema: &ResourceSchema) {
    println!("{}", schema.resource_type.cyan().bold());
    if let Some(description) = &schema.description {
        println!("  {}", description);
    }
    println!("  {}", required_summary(schema));
    for attr in schema.attributes.values() {
        let marker = if attr.required {
            "required".red().to_string()
        } else {
            match &attr.default {
                Some(default) => format!("default {}", default.to_json()),
                None => "optional".normal().to_string(),
            }
        };
        println!(
            "  {} {} ({})",
            attr.name.bold(),
            attr.attr_type.to_string().dimmed(),
            marker
        );
        if let Some(description) = &attr.description {
            println!("      {}", description);
        }
    }
    println!();
}

fn required_summary(schema: &ResourceSchema) -> String {
    let required = schema.required_attributes();
    if required.is_empty() {
        "required: none".to_string()
    } else {
        format!("required: {}", required.join(", "))
    }
}

fn print_diff(file: &Path, previous: &str, current: &str) {
    println!("{} {}:", "Diff against".cyan().bold(), file.display());

    let diff = TextDiff::from_lines(previous, current);
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-".red(),
            ChangeTag::Insert => "+".green(),
            ChangeTag::Equal => " ".normal(),
        };
        print!("{}{}", sign, change);
    }
}
