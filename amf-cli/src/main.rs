mod cli;
mod commands;
mod config;
mod output;

use crate::{
    cli::{Args, Commands, LogFormat},
    commands::CommandExecutor,
    config::AppConfig,
};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::process;
use tracing::{debug, error};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Crates whose events `--verbose` shows down to trace level.
const LOG_TARGETS: &[&str] = &["amfdump", "amf", "flex_messages"];

fn main() {
    if let Err(e) = run() {
        error!("Application error: {:#}", e);
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    // Load configuration
    let config = AppConfig::load(args.config.as_deref())?;
    debug!("Loaded config: {:?}", config);

    let options = config.context_options(args.max_allocation, args.strict);
    let executor = CommandExecutor::new(config, options)?;

    match args.command {
        Commands::Decode {
            file,
            hex,
            version,
            output,
        } => {
            let text = executor.decode_file(&file, hex, version, output)?;
            println!("{text}");
        }

        Commands::Encode {
            json,
            version,
            hex,
            output_file,
        } => {
            let bytes = executor.encode(&json, version)?;
            match output_file {
                Some(path) => std::fs::write(&path, &bytes)
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None if hex => println!("{}", hex::encode(&bytes)),
                None => std::io::stdout()
                    .write_all(&bytes)
                    .context("Failed to write to stdout")?,
            }
        }
    }

    Ok(())
}

fn log_filter(verbose: bool, quiet: bool) -> EnvFilter {
    if quiet {
        return EnvFilter::new("error");
    }
    if verbose {
        let directives: Vec<String> = LOG_TARGETS.iter().map(|t| format!("{t}=trace")).collect();
        return EnvFilter::new(directives.join(","));
    }

    // Warnings only, unless RUST_LOG is set.
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
}

fn init_logging(args: &Args) {
    let layer = match args.log_format {
        LogFormat::Text => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(args.verbose)
            .boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(log_filter(args.verbose, args.quiet)))
        .init();
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter() {
        assert_eq!(log_filter(false, true).to_string(), "error");

        let verbose = log_filter(true, false).to_string();
        for target in LOG_TARGETS {
            assert!(verbose.contains(&format!("{target}=trace")));
        }
    }
}
