use clap::{Parser, Subcommand};
use spl_formula_extractor::classpath::ClassPath;
use spl_formula_extractor::config::{
    ExtractConfig, DEFAULT_ANNOTATION, DEFAULT_CATALOG, DEFAULT_OUTPUT,
};
use spl_formula_extractor::report::RunMeta;
use spl_formula_extractor::{extract, read_mapping, CatalogFormat, ExtractError};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, Level};

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve formulas for every catalogued benchmark and write the mapping file.
    Extract {
        /// Benchmark catalog produced by the harness.
        #[arg(
            long,
            value_name = "FILE",
            env = "SPL_FORMULA_CATALOG",
            default_value = DEFAULT_CATALOG
        )]
        catalog: PathBuf,

        /// How catalog records are encoded.
        #[arg(long, value_enum, env = "SPL_FORMULA_CATALOG_FORMAT", default_value_t = CatalogFormat::Auto)]
        catalog_format: CatalogFormat,

        /// Mapping file to write. Its directory must exist.
        #[arg(
            short,
            long,
            value_name = "FILE",
            env = "SPL_FORMULA_OUTPUT",
            default_value = DEFAULT_OUTPUT
        )]
        output: PathBuf,

        /// Where to write the JSON run report. If omitted, prints to stdout.
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },

    /// List every formula tag found on the class path.
    Scan,

    /// Print a mapping file, one benchmark per line.
    Show {
        #[arg(value_name = "FILE", default_value = DEFAULT_OUTPUT)]
        path: PathBuf,
    },
}

#[derive(Parser, Debug)]
#[command(name = "spl-formula-extractor")]
#[command(about = "Attach SPL formulas to JMH benchmarks (line-oriented mapping output)")]
struct Args {
    /// Class directory or jar to search. Repeat the flag or separate with
    /// commas; first match wins.
    #[arg(
        long = "class-path",
        short = 'c',
        value_name = "PATH",
        action = clap::ArgAction::Append,
        env = "SPL_FORMULA_CLASS_PATH",
        value_delimiter = ',',
        global = true
    )]
    class_path: Vec<PathBuf>,

    /// Fully qualified name of the formula annotation.
    #[arg(long, env = "SPL_FORMULA_ANNOTATION", default_value = DEFAULT_ANNOTATION, global = true)]
    annotation: String,

    /// More logging (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    cmd: Command,
}

fn now_utc() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("unix:{secs}")
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (false, 0) => Level::INFO,
        (false, 1) => Level::DEBUG,
        (false, _) => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn class_path_or_default(args: &Args) -> Vec<PathBuf> {
    if args.class_path.is_empty() {
        ExtractConfig::default().class_path
    } else {
        args.class_path.clone()
    }
}

fn run(args: &Args) -> Result<(), ExtractError> {
    match &args.cmd {
        Command::Extract {
            catalog,
            catalog_format,
            output,
            report,
        } => {
            let cfg = ExtractConfig {
                catalog: catalog.clone(),
                catalog_format: *catalog_format,
                class_path: class_path_or_default(args),
                output: output.clone(),
                annotation: args.annotation.clone(),
            };

            let summary = extract(&cfg)?;
            eprintln!(
                "Resolved {} formula(s) for {} benchmark(s), {} warning(s)",
                summary.resolved(),
                summary.benchmarks,
                summary.warnings.len()
            );

            let run_report = summary.to_report(RunMeta {
                schema_version: 1,
                tool_version: env!("CARGO_PKG_VERSION").to_string(),
                timestamp_utc: now_utc(),
                catalog: cfg.catalog.display().to_string(),
                output: cfg.output.display().to_string(),
            });
            let json = serde_json::to_string_pretty(&run_report).map_err(std::io::Error::other)?;
            if let Some(out) = report {
                fs::write(out, json)?;
            } else {
                println!("{json}");
            }
        }
        Command::Scan => {
            let class_path = ClassPath::new(class_path_or_default(args), &args.annotation);
            let tags = class_path.scan()?;
            for tag in &tags {
                match &tag.method {
                    Some(method) => println!("{}.{}:{}", tag.class, method, tag.formula),
                    None => println!("{}:{} (class)", tag.class, tag.formula),
                }
            }
            eprintln!("{} formula tag(s) found", tags.len());
        }
        Command::Show { path } => {
            let mapping = read_mapping(path)?;
            eprintln!("Mapping: {}", path.display());
            for entry in &mapping {
                println!("  {:<60} {}", entry.benchmark, entry.formula);
            }
            eprintln!("  Records: {}", mapping.len());
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
