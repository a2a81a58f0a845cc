// Tabula CLI - apply edit scripts to an in-memory sheet

mod exit_codes;
mod script;

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tabula_config::{PrintMode, Settings};
use tracing_subscriber::EnvFilter;

use exit_codes::{EXIT_IO, EXIT_LINE_FAILED, EXIT_SUCCESS, EXIT_USAGE};
use script::Runner;

#[derive(Parser)]
#[command(name = "tabula")]
#[command(about = "Spreadsheet engine with live formulas, driven by edit scripts")]
#[command(version)]
#[command(long_version = long_version())]
struct Cli {
    /// Log engine activity at debug level (overrides RUST_LOG)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Settings file to use instead of the default location
    #[arg(long, global = true, value_name = "PATH", env = "TABULA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("TABULA_COMMIT"), ")",
        "\nengine:  tabula-engine ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TABULA_TARGET"),
    )
}

#[derive(Subcommand)]
enum Commands {
    /// Run an edit script, one command per line
    #[command(after_help = "\
Script commands:
  set <A1> <text>     set a cell (text may be empty or a =formula)
  clear <A1>          reset a cell to empty
  get <A1>            print <A1>\\t<text>\\t<value>
  print values|texts  print the sheet grid
  size                print <rows>\\t<cols>
  # ...               comment

Examples:
  tabula run edits.txt --print values
  printf 'set A1 2\\nset B1 =A1*21\\nget B1\\n' | tabula run")]
    Run {
        /// Script file; reads stdin when omitted or '-'
        script: Option<PathBuf>,

        /// Render the sheet after the script
        #[arg(long, value_enum)]
        print: Option<PrintArg>,

        /// Dump every stored cell as JSON after the script
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PrintArg {
    None,
    Values,
    Texts,
}

impl From<PrintArg> for PrintMode {
    fn from(arg: PrintArg) -> Self {
        match arg {
            PrintArg::None => PrintMode::None,
            PrintArg::Values => PrintMode::Values,
            PrintArg::Texts => PrintMode::Texts,
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let (settings, config_warning) = match &cli.config {
        Some(path) => match Settings::load_from(path) {
            Ok(settings) => (settings, None),
            Err(e) => {
                return report(
                    CliError::usage(e.to_string())
                        .with_hint("fix the file or drop --config to use the defaults"),
                )
            }
        },
        None => Settings::load(),
    };

    init_logging(cli.verbose, &settings.log_level);
    if let Some(e) = config_warning {
        tracing::warn!("{}; using default settings", e);
    }

    let result = match cli.command {
        Commands::Run { script, print, json } => cmd_run(script.as_deref(), print, json, &settings),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => report(e),
    }
}

fn report(e: CliError) -> ExitCode {
    eprintln!("error: {}", e.message);
    if let Some(hint) = e.hint {
        eprintln!("hint: {}", hint);
    }
    ExitCode::from(e.code)
}

/// `--verbose` wins, then RUST_LOG, then the `log.level` setting.
fn init_logging(verbose: bool, level: &str) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn read_script(path: Option<&Path>) -> Result<String, CliError> {
    match path {
        None => read_stdin(),
        Some(p) if p.as_os_str() == "-" => read_stdin(),
        Some(p) => fs::read_to_string(p).map_err(|e| {
            CliError::io(format!("cannot read {}: {}", p.display(), e))
                .with_hint("pass '-' or omit the path to read the script from stdin")
        }),
    }
}

fn read_stdin() -> Result<String, CliError> {
    let mut source = String::new();
    io::stdin()
        .read_to_string(&mut source)
        .map_err(|e| CliError::io(format!("cannot read stdin: {}", e)))?;
    Ok(source)
}

fn cmd_run(
    script: Option<&Path>,
    print: Option<PrintArg>,
    json: bool,
    settings: &Settings,
) -> Result<u8, CliError> {
    let source = read_script(script)?;
    let write_err = |e: io::Error| CliError::io(format!("write failed: {}", e));

    let mut runner = Runner::new();
    let mut out = io::BufWriter::new(io::stdout().lock());
    let mut err = io::stderr().lock();
    runner
        .run_script(&source, &mut out, &mut err)
        .map_err(write_err)?;

    let sheet = runner.sheet();
    match print.map(PrintMode::from).unwrap_or(settings.print_mode) {
        PrintMode::None => {}
        PrintMode::Values => sheet.print_values(&mut out).map_err(write_err)?,
        PrintMode::Texts => sheet.print_texts(&mut out).map_err(write_err)?,
    }

    if settings.show_size {
        let size = sheet.printable_size();
        writeln!(out, "{}\t{}", size.rows, size.cols).map_err(write_err)?;
    }

    if json {
        serde_json::to_writer_pretty(&mut out, &runner.dump())
            .map_err(|e| CliError::io(format!("write failed: {}", e)))?;
        writeln!(out).map_err(write_err)?;
    }

    out.flush().map_err(write_err)?;

    let (empty, text, formula) = sheet.kind_counts();
    tracing::debug!(
        failed = runner.failed_lines(),
        empty,
        text,
        formula,
        "script finished"
    );

    Ok(if runner.failed_lines() > 0 {
        EXIT_LINE_FAILED
    } else {
        EXIT_SUCCESS
    })
}
