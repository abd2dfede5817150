//! shapecheck CLI

mod report;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use log::{debug, info};
use miette::{NamedSource, Report};
use shapecheck_ast::Module;
use shapecheck_types::{check_module, CheckOptions, ScalarKind, TypeError, WideningTable};

#[derive(Parser)]
#[command(name = "shapecheck")]
#[command(version)]
#[command(about = "Structural type checker for record-shaped data")]
struct Cli {
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Type check a syntax tree
    Check {
        /// Syntax tree as JSON
        file: PathBuf,
        /// Source text the tree was parsed from, for labelled diagnostics
        #[arg(long)]
        source: Option<PathBuf>,
        /// Allow a scalar widening, e.g. `bool=int` (repeatable)
        #[arg(long = "widen", value_name = "FROM=TO", value_parser = parse_widening)]
        widen: Vec<(ScalarKind, ScalarKind)>,
        /// Diagnostic output format
        #[arg(long, value_enum, default_value_t = Format::Human)]
        format: Format,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Human,
    Json,
}

fn parse_widening(rule: &str) -> Result<(ScalarKind, ScalarKind), String> {
    let (from, to) = rule
        .split_once('=')
        .ok_or_else(|| format!("expected FROM=TO, got '{}'", rule))?;
    let kind = |keyword: &str| {
        ScalarKind::from_keyword(keyword.trim())
            .ok_or_else(|| format!("unknown scalar kind '{}'", keyword.trim()))
    };
    Ok((kind(from)?, kind(to)?))
}

fn main() -> ExitCode {
    // Install miette's fancy error handler for prettier diagnostics
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Check { file, source, widen, format } => {
            cmd_check(&file, source.as_deref(), &widen, format)
        }
    }
}

fn cmd_check(
    file: &Path,
    source: Option<&Path>,
    widen: &[(ScalarKind, ScalarKind)],
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(file)
        .map_err(|e| format!("cannot read {}: {}", file.display(), e))?;
    let module: Module = serde_json::from_str(&text)
        .map_err(|e| format!("{}: invalid syntax tree: {}", file.display(), e))?;

    let source = match source {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
            Some((path.display().to_string(), text))
        }
        None => None,
    };

    let mut widening = WideningTable::new();
    for (from, to) in widen {
        debug!("widening {} -> {}", from, to);
        widening.insert(*from, *to);
    }
    let options = CheckOptions::default().with_widening(widening);

    let outcome = check_module(&module, &options);
    info!("{} diagnostics", outcome.diagnostics.len());

    match format {
        Format::Json => println!("{}", report::to_json(&outcome.diagnostics)?),
        Format::Human if outcome.is_clean() => {
            println!(
                "OK: {} functions, {} records",
                module.functions().count(),
                module.records().count()
            );
        }
        Format::Human => {
            for error in &outcome.diagnostics {
                print_diagnostic(error, source.as_ref());
            }
        }
    }

    if outcome.is_clean() {
        Ok(())
    } else {
        Err(format!("{} type error(s) found", outcome.diagnostics.len()).into())
    }
}

fn print_diagnostic(error: &TypeError, source: Option<&(String, String)>) {
    match source {
        Some((name, text)) => {
            // Use miette's Report for pretty error display
            let report = Report::new(error.clone())
                .with_source_code(NamedSource::new(name, text.clone()));
            eprintln!("{:?}", report);
        }
        None => eprintln!("type error: {}", error),
    }
}
