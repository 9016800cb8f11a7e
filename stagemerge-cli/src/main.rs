//! stagemerge CLI
//!
//! Reads one merge configuration file and writes the incremental and target
//! merge procedures under the output directory:
//!
//! ```text
//! stagemerge orders.properties
//!   -> output/merge_into_inc_tables/<fileName>.sql
//!   -> output/merge_into_target_tables/<fileName>.sql
//! ```

use clap::error::ErrorKind;
use clap::Parser;
use stagemerge::{generate, GenerateError, MergeConfig, OutputLayout};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "stagemerge")]
#[command(about = "Generate staging-to-target merge procedures from a table configuration")]
#[command(version = "0.1.0")]
struct Cli {
    /// Configuration file (.properties, .ini, .toml, .json or .yaml)
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Root directory for the generated scripts
    #[arg(long, default_value = stagemerge::output::DEFAULT_OUTPUT_ROOT)]
    output_dir: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let err = usage_error(&e);
            eprintln!("❌ Error: {}", err);
            process::exit(exit_code(&err));
        }
    };

    // Initialize logging
    let default_filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    match run(&cli) {
        Ok(()) => process::exit(0),
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            process::exit(exit_code(&e));
        }
    }
}

fn run(cli: &Cli) -> Result<(), GenerateError> {
    let config = MergeConfig::load(&cli.config)?;
    let layout = OutputLayout::new(&cli.output_dir);

    log::debug!("Writing procedures for {} under {}", config.file_name, layout.root().display());

    let report = generate(&config, &layout)?;

    if !cli.quiet {
        for path in &report.written {
            println!("✅ Generated: {}", path.display());
        }
    }
    // Write failures do not fail the run, but always reach stderr.
    for failure in &report.failed {
        eprintln!("❌ Error: {}", failure);
    }

    Ok(())
}

fn usage_error(e: &clap::Error) -> GenerateError {
    let message = match e.kind() {
        ErrorKind::MissingRequiredArgument => "Please provide the name of properties file".to_string(),
        ErrorKind::UnknownArgument => format!("Too many arguments\n\n{}", e.render()),
        _ => e.render().to_string(),
    };
    GenerateError::Usage(message)
}

fn exit_code(e: &GenerateError) -> i32 {
    match e {
        GenerateError::Usage(_) => 2,
        _ => 1,
    }
}
