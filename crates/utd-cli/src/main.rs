//! utd CLI: versioned paths and value formats for education statistics
//!
//! Commands: version, bump, period, latest, resolve, format, completions

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use utd_core::{bump_path, parse_period, parse_reference_date, parse_version, Config};
use utd_format::{import_sas_file, parse_timestamp, FormatKey, FormatStore};
use utd_storage::{latest, resolve_for_date, storage_for, Storage};

#[derive(Parser)]
#[command(name = "utd")]
#[command(version)]
#[command(about = "Versioned datasets and value formats for education statistics")]
struct Cli {
    /// TOML configuration file; the DAPLA_* environment is used otherwise
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the formats directory from the configuration
    #[arg(long, global = true)]
    formats_dir: Option<String>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Print the version number of a versioned path
    Version { path: String },
    /// Print the path with its version raised
    Bump {
        path: String,
        #[arg(short, default_value_t = 1)]
        n: u32,
    },
    /// Print the period encoded in a path
    Period { path: String },
    /// Print the newest path matching a glob
    Latest {
        pattern: String,
        /// Skip file names containing this keyword (repeatable)
        #[arg(long = "exclude")]
        exclude: Vec<String>,
    },
    /// Print the path whose period contains a reference date
    Resolve {
        date: String,
        pattern: String,
        #[arg(long = "exclude")]
        exclude: Vec<String>,
    },
    /// Stored value formats
    #[command(subcommand)]
    Format(FormatCommand),
    /// Generate shell completions
    Completions { shell: Shell },
}

#[derive(clap::Subcommand)]
enum FormatCommand {
    /// List stored formats as JSON
    List { name: Option<String> },
    /// Look a key up in a stored format
    Lookup {
        name: String,
        key: String,
        /// Use the newest version stored before this timestamp (YYYY-MM-DDTHH-MM-SS)
        #[arg(long)]
        at: Option<String>,
    },
    /// Import every `proc format` value statement of a SAS script
    ImportSas { file: String },
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load configuration {}", path.display()))?,
        None => Config::from_env()?,
    };
    if let Some(dir) = &cli.formats_dir {
        config.formats_path.clone_from(dir);
    }
    debug!(region = ?config.region, formats = %config.formats_path, "configuration loaded");
    Ok(config)
}

/// Numbers are looked up as numbers so ranges apply; everything else as text.
fn format_key(key: &str) -> FormatKey {
    if let Ok(i) = key.parse::<i64>() {
        FormatKey::from(i)
    } else if let Ok(f) = key.parse::<f64>() {
        FormatKey::from(f)
    } else {
        FormatKey::from(key)
    }
}

fn run_format(
    command: FormatCommand,
    storage: Arc<dyn Storage>,
    config: &Config,
) -> anyhow::Result<()> {
    let store = FormatStore::from_config(Arc::clone(&storage), config);
    match command {
        FormatCommand::List { name } => {
            let stored = store.info(name.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&stored)?);
        }
        FormatCommand::Lookup { name, key, at } => {
            let at = match at {
                Some(text) => match parse_timestamp(&text) {
                    Some(ts) => Some(ts),
                    None => bail!("invalid timestamp '{text}', expected YYYY-MM-DDTHH-MM-SS"),
                },
                None => None,
            };
            let Some(mut format) = store.load(&name, at)? else {
                bail!("no stored format named '{name}' in {}", store.dir());
            };
            println!("{}", format.lookup(format_key(&key))?);
        }
        FormatCommand::ImportSas { file } => {
            let written = import_sas_file(&store, storage.as_ref(), &file)?;
            println!("{}", serde_json::to_string_pretty(&written)?);
        }
    }
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let storage = storage_for(&config);

    match cli.command {
        Commands::Version { path } => {
            println!("{}", parse_version(&path)?);
        }
        Commands::Bump { path, n } => {
            println!("{}", bump_path(&path, n)?);
        }
        Commands::Period { path } => {
            println!("{}", parse_period(&path, config.default_date)?);
        }
        Commands::Latest { pattern, exclude } => {
            let exclude: Vec<&str> = exclude.iter().map(String::as_str).collect();
            println!("{}", latest(storage.as_ref(), &pattern, &exclude)?);
        }
        Commands::Resolve {
            date,
            pattern,
            exclude,
        } => {
            let reference = parse_reference_date(&date, config.default_date)?;
            let exclude: Vec<&str> = exclude.iter().map(String::as_str).collect();
            let path = resolve_for_date(
                storage.as_ref(),
                reference,
                &pattern,
                &exclude,
                config.default_date,
            )?;
            println!("{path}");
        }
        Commands::Format(command) => run_format(command, storage, &config)?,
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "utd", &mut io::stdout());
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
