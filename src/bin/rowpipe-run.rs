//! CLI tool to run the record pipeline over a delimited text file.
//!
//! Usage:
//!   rowpipe-run <input.csv>
//!   rowpipe-run <input.csv> -o <output> --format delimited
//!   rowpipe-run - --delimiter , --age-threshold 30 < input.csv
//!
//! Surviving records go to stdout as JSON lines unless `-o` is given.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, ValueEnum};
use rowpipe::{
    Completion, DelimitedSource, Driver, Logged, OutputFormat, Pipeline, PipelineConfig,
    WriteSink, default_stages,
};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    /// One JSON object per line
    Json,
    /// Delimited text with a header row, using the input delimiter
    Delimited,
}

/// Normalize and filter delimited user records.
#[derive(Parser)]
#[command(name = "rowpipe-run", version)]
struct Cli {
    /// Input file with a header row, or `-` for stdin
    input: String,

    /// Write output to file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Json)]
    format: Format,

    /// JSON config file (delimiter, ageThreshold, requireActive)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Field delimiter (default ';')
    #[arg(short, long)]
    delimiter: Option<char>,

    /// Keep records with age at most this value (default 20)
    #[arg(long)]
    age_threshold: Option<i64>,

    /// Require isActive to be true (default true)
    #[arg(long)]
    require_active: Option<bool>,

    /// Print each record's journey through the stages on stderr
    #[arg(long)]
    trace: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn init_logging(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<PipelineConfig, rowpipe::ConfigError> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(delimiter) = cli.delimiter {
        config.delimiter = delimiter;
    }
    if let Some(age_threshold) = cli.age_threshold {
        config.age_threshold = age_threshold;
    }
    if let Some(require_active) = cli.require_active {
        config.require_active = require_active;
    }
    config.validate()?;
    Ok(config)
}

fn open_input(input: &str) -> io::Result<Box<dyn Read + Send>> {
    if input == "-" {
        Ok(Box::new(io::stdin()))
    } else {
        Ok(Box::new(File::open(input)?))
    }
}

fn open_output(output: Option<&Path>) -> io::Result<Box<dyn Write + Send>> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)?;
            }
            Ok(Box::new(BufWriter::new(File::create(path)?)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout()))),
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            process::exit(1);
        }
    };
    // validate() has already checked the delimiter.
    let delimiter = config.delimiter_byte().unwrap_or(b';');

    let input = match open_input(&cli.input) {
        Ok(input) => input,
        Err(e) => {
            eprintln!("Error reading input file '{}': {e}", cli.input);
            process::exit(1);
        }
    };

    let output = match open_output(cli.output.as_deref()) {
        Ok(output) => output,
        Err(e) => {
            eprintln!("Error opening output: {e}");
            process::exit(1);
        }
    };

    let format = match cli.format {
        Format::Json => OutputFormat::JsonLines,
        Format::Delimited => OutputFormat::Delimited { delimiter },
    };

    let source = DelimitedSource::new(input, delimiter);
    let sink = Logged::new(WriteSink::new(output, format));
    let driver = Driver::new(source, Pipeline::with_stages(default_stages(&config), sink));

    let completion = if cli.trace {
        let (completion, trace) = driver.run_traced();
        eprint!("{trace}");
        completion
    } else {
        driver.run()
    };

    match completion {
        Completion::Success(report) => {
            eprintln!(
                "Processed {} -> {} records",
                report.processed, report.accepted
            );
        }
        Completion::Failure { fault, stage } => {
            eprintln!("Pipeline failed in {stage}: {fault}");
            process::exit(1);
        }
        Completion::Cancelled(_) => {
            eprintln!("Pipeline cancelled");
            process::exit(1);
        }
    }
}
