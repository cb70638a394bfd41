use anyhow::{Context, bail};
use clap::{Parser as ClapParser, Subcommand};
use libux::diff::diff;
use libux::{Helpers, Template, TemplateSettings, Value};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(ClapParser)]
#[command(name = "libux")]
#[command(about = "Render and inspect libux templates")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a template file to stdout
    Render {
        /// Path to the template
        template: PathBuf,
        /// JSON file with the data argument
        #[arg(long)]
        data: Option<PathBuf>,
        /// Name of the data argument inside the template
        #[arg(long)]
        variable: Option<String>,
        /// JSON file with delimiter settings
        #[arg(long)]
        settings: Option<PathBuf>,
    },
    /// Check that a template compiles
    Check {
        /// Path to the template
        template: PathBuf,
        /// JSON file with delimiter settings
        #[arg(long)]
        settings: Option<PathBuf>,
    },
    /// Print the changes between two JSON documents
    Diff {
        /// The newer document
        new: PathBuf,
        /// The older document
        old: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            template,
            data,
            variable,
            settings,
        } => {
            let settings = with_variable(read_settings(settings.as_deref())?, variable);
            let data = match data {
                Some(path) => read_json(&path)?,
                None => Value::map(),
            };
            let template = compile(&template, &settings)?;
            print!("{}", template.render(&data));
        }
        Commands::Check { template, settings } => {
            let settings = read_settings(settings.as_deref())?;
            let compiled = compile(&template, &settings)?;
            eprintln!("Compile OK: {}", template.display());
            log::debug!("generated program:\n{}", compiled.source());
        }
        Commands::Diff { new, old } => {
            let new = read_json(&new)?;
            let old = read_json(&old)?;
            let lines = diff_lines(&new, &old);
            if lines.is_empty() {
                eprintln!("No changes");
            }
            for line in lines {
                println!("{line}");
            }
        }
    }
    Ok(())
}

/// `--variable` overrides the name from the settings file.
fn with_variable(settings: TemplateSettings, variable: Option<String>) -> TemplateSettings {
    match variable {
        Some(variable) => settings.with_variable(variable),
        None => settings,
    }
}

/// One `~ path = json` line per changed leaf and one `- path` line per removal.
fn diff_lines(new: &Value, old: &Value) -> Vec<String> {
    let Some(changes) = diff(new, old) else {
        return Vec::new();
    };
    changes
        .entries()
        .into_iter()
        .map(|(path, value)| {
            let path = if path.is_empty() { "<root>" } else { path.as_str() };
            match value {
                Some(value) => format!("~ {path} = {}", serde_json::Value::from(value)),
                None => format!("- {path}"),
            }
        })
        .collect()
}

fn compile(path: &Path, settings: &TemplateSettings) -> anyhow::Result<Template> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    log::info!("compiling {}", path.display());
    match Template::compile_with(&text, settings, Helpers::new()) {
        Ok(template) => Ok(template),
        Err(error) => {
            let filename = path.display().to_string();
            eprint!("{}", error.report(&filename));
            bail!("{filename}: {error}")
        }
    }
}

fn read_settings(path: Option<&Path>) -> anyhow::Result<TemplateSettings> {
    let Some(path) = path else {
        return Ok(TemplateSettings::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing settings in {}", path.display()))
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let json: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("parsing JSON in {}", path.display()))?;
    Ok(Value::from(json))
}
