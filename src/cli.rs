use crate::matcher::Route;
use anyhow::Result;
use clap::{Parser, ValueEnum};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

/// Contract-from-source - Infer the HTTP contract of a Go Echo service from its source code
#[derive(Parser, Debug)]
#[command(name = "contract-from-source")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to the Go project directory
    #[arg(value_name = "PROJECT_PATH")]
    pub project_path: PathBuf,

    /// Source search pattern relative to the project root; append /... to
    /// scan recursively. May be repeated. Defaults to the whole project.
    #[arg(short = 's', long = "scan", value_name = "PATTERN")]
    pub scan: Vec<String>,

    /// Routes file captured from the live router (JSON array of
    /// {method, path, name}); when given, the output is the matched routes
    /// instead of the raw handler index
    #[arg(long = "routes", value_name = "FILE")]
    pub routes: Option<PathBuf>,

    /// Output format (yaml or json)
    #[arg(short = 'f', long = "format", value_enum, default_value = "yaml")]
    pub output_format: OutputFormat,

    /// Output file path (if not specified, outputs to stdout)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output_path: Option<PathBuf>,

    /// Worker-pool width for per-package analysis
    #[arg(short = 'c', long = "concurrency", default_value_t = 5)]
    pub concurrency: usize,

    /// Also harvest enumerations from const blocks
    #[arg(long = "enums")]
    pub enums: bool,

    /// Also harvest the exhaustive model inventory
    #[arg(long = "all-models")]
    pub all_models: bool,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
}

/// Parse command line arguments
pub fn parse_args() -> Result<CliArgs> {
    let args = CliArgs::parse();
    parse_args_from_parsed(args)
}

/// Validate and log already-parsed arguments
pub fn parse_args_from_parsed(args: CliArgs) -> Result<CliArgs> {
    debug!("Parsed arguments: {:?}", args);

    if !args.project_path.exists() {
        anyhow::bail!(
            "Project path does not exist: {}",
            args.project_path.display()
        );
    }

    if !args.project_path.is_dir() {
        anyhow::bail!(
            "Project path is not a directory: {}",
            args.project_path.display()
        );
    }

    if let Some(ref routes) = args.routes {
        if !routes.is_file() {
            anyhow::bail!("Routes file does not exist: {}", routes.display());
        }
    }

    info!("Project path: {}", args.project_path.display());
    info!("Output format: {:?}", args.output_format);
    if let Some(ref output) = args.output_path {
        info!("Output file: {}", output.display());
    } else {
        info!("Output: stdout");
    }

    Ok(args)
}

/// Run the main workflow
pub fn run(args: CliArgs) -> Result<()> {
    use crate::extractor::ParseOptions;
    use crate::finder::{FinderOptions, HandlerFinder};
    use crate::scanner::SearchPattern;
    use crate::serializer::{serialize_json, serialize_yaml, write_to_file};

    info!("Starting contract extraction...");

    // Step 1: resolve search patterns
    let patterns: Vec<SearchPattern> = if args.scan.is_empty() {
        vec![SearchPattern::parse("...")]
    } else {
        args.scan.iter().map(|s| SearchPattern::parse(s)).collect()
    };
    debug!("Search patterns: {:?}", patterns);

    // Step 2: discover handlers across the matched packages
    info!("Discovering handlers...");
    let mut finder = HandlerFinder::new(args.project_path.clone())?;
    let opts = FinderOptions {
        concurrency: args.concurrency,
        parse: ParseOptions {
            enums: args.enums,
            all_models: args.all_models,
            ..ParseOptions::default()
        },
    };
    finder.find(&patterns, &opts)?;
    info!("Discovered {} handlers", finder.handlers().len());

    if finder.handlers().is_empty() {
        log::warn!("No handlers found in the project");
    }

    // Step 3: serialize the handler index, or the matched routes when a
    // routes capture was supplied
    let content = match args.routes {
        Some(ref routes_path) => {
            info!("Matching routes from {}", routes_path.display());
            let routes = read_routes(routes_path)?;
            let matches = finder.match_routes(&routes);
            info!("Matched {}/{} routes", matches.len(), routes.len());

            match args.output_format {
                OutputFormat::Yaml => serialize_yaml(&matches)?,
                OutputFormat::Json => serialize_json(&matches)?,
            }
        }
        None => {
            let report = finder.report();
            match args.output_format {
                OutputFormat::Yaml => serialize_yaml(&report)?,
                OutputFormat::Json => serialize_json(&report)?,
            }
        }
    };

    // Step 4: output to file or stdout
    if let Some(output_path) = &args.output_path {
        info!("Writing output to: {}", output_path.display());
        write_to_file(&content, output_path)?;
        info!("Successfully wrote contract to {}", output_path.display());
    } else {
        println!("{}", content);
    }

    info!("Extraction complete!");

    Ok(())
}

fn read_routes(path: &Path) -> Result<Vec<Route>> {
    let content = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read routes file {}: {}", path.display(), e))?;
    let routes: Vec<Route> = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse routes file {}: {}", path.display(), e))?;
    Ok(routes)
}
