//! PDF Regroup CLI tool
//!
//! Splits the documents in a source folder into single pages, regroups the
//! pages and exports each group as its own PDF.

use std::io;
use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use glob::glob;
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pdf_regroup::edit::{run_edit_loop, EditEnd, HELP};
use pdf_regroup::export::ExportReport;
use pdf_regroup::pdf::{merge_pdfs, MergeOptions};
use pdf_regroup::report::{BatchReport, Failure};
use pdf_regroup::thumbnail::CommandRenderer;
use pdf_regroup::{Config, PageRange, Workspace};

/// PDF Regroup - Split PDFs into pages and regroup them
#[derive(Parser)]
#[command(name = "pdf-regroup")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    # Split everything in ./incoming into single pages
    pdf-regroup split

    # Export pages 1, 2-4 and 5 as three documents
    pdf-regroup export --group 1 --group 2,3,4 --group 5

    # Build documents straight from page ranges of the sources
    pdf-regroup group --range 1-2 --range 3-5

    # Group interactively
    pdf-regroup edit")]
struct Cli {
    /// Config file (default: pdf-regroup.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Source folder (overrides the config)
    #[arg(long, global = true)]
    sources: Option<PathBuf>,

    /// Working folder for split pages (overrides the config)
    #[arg(long, global = true)]
    working: Option<PathBuf>,

    /// Export destination (overrides the config)
    #[arg(long, global = true)]
    destination: Option<PathBuf>,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the source documents and their page counts
    Pages,

    /// Count the documents in each folder
    Status,

    /// Split every source page into its own PDF
    Split,

    /// Build one PDF per page range from the source documents
    Group {
        /// Inclusive page range such as "3-5" (repeatable)
        #[arg(short, long = "range", required = true, value_parser = parse_range)]
        ranges: Vec<PageRange>,
    },

    /// Assemble groups from the split pages and export them
    Export {
        /// Comma-separated pages of one group, such as "2,3,4" (repeatable)
        #[arg(short, long = "group", required = true, value_parser = parse_group)]
        groups: Vec<PageList>,
    },

    /// Export the split pages as they are
    ExportSplit,

    /// Copy a split page or group document out of the working folder
    Fetch {
        /// File name in the working folder
        filename: String,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Read from the source folder instead
        #[arg(long)]
        source: bool,
    },

    /// Merge PDF files into one
    Merge {
        /// Input PDF files (in order). Supports glob patterns like "*.pdf"
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Output PDF file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Render page previews into the thumbnails folder
    Thumbnails,

    /// Edit the grouping interactively, reading commands from stdin
    Edit,
}

/// Pages of one group, as given on the command line
#[derive(Debug, Clone)]
struct PageList(Vec<u32>);

fn parse_group(s: &str) -> Result<PageList, String> {
    s.split(',')
        .map(|part| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| format!("not a page number: {:?}", part.trim()))
        })
        .collect::<Result<Vec<u32>, String>>()
        .map(PageList)
}

fn parse_range(s: &str) -> Result<PageRange, String> {
    s.parse::<PageRange>().map_err(|e| e.to_string())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        error!("{:#}", e);
        process::exit(1);
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config =
        Config::load_or_default(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(sources) = &cli.sources {
        config.paths.sources = sources.clone();
    }
    if let Some(working) = &cli.working {
        config.paths.working = working.clone();
    }
    if let Some(destination) = &cli.destination {
        config.paths.destination = destination.clone();
    }
    Ok(config)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let workspace = Workspace::new(config).context("Invalid configuration")?;
    let json = cli.json;

    match cli.command {
        Commands::Pages => cmd_pages(&workspace, json),
        Commands::Status => {
            let status = workspace.store_status()?;
            if json {
                return print_json(&status);
            }
            let paths = &workspace.config().paths;
            println!("{:>4}  sources      {}", status.sources, paths.sources.display());
            println!("{:>4}  split pages  {}", status.working, paths.working.display());
            println!("{:>4}  exported     {}", status.destination, paths.destination.display());
            Ok(())
        }
        Commands::Split => {
            let report = workspace.split_all_pages().context("Split failed")?;
            let files: Vec<String> = report.succeeded.iter().map(|a| a.filename()).collect();
            print_batch(json, "Created", &report, &files)
        }
        Commands::Group { ranges } => {
            let report = workspace
                .create_manual_groups(&ranges)
                .context("Creating groups failed")?;
            let files: Vec<String> = report.succeeded.iter().map(|d| d.filename.clone()).collect();
            print_batch(json, "Created", &report, &files)
        }
        Commands::Export { groups } => {
            let groups: Vec<Vec<u32>> = groups.into_iter().map(|list| list.0).collect();
            let report = workspace.export_groups(&groups).context("Export failed")?;
            print_export(json, &report)
        }
        Commands::ExportSplit => {
            let report = workspace.export_split_pages().context("Export failed")?;
            print_export(json, &report)
        }
        Commands::Fetch {
            filename,
            output,
            source,
        } => {
            let bytes = if source {
                workspace.fetch_source_document(&filename)
            } else {
                workspace.fetch_single_page_document(&filename)
            }
            .with_context(|| format!("Cannot fetch {}", filename))?;
            std::fs::write(&output, bytes)
                .with_context(|| format!("Cannot write {}", output.display()))?;
            info!("Wrote {}", output.display());
            Ok(())
        }
        Commands::Merge { inputs, output } => cmd_merge(inputs, output),
        Commands::Thumbnails => {
            let inventory = workspace.inventory()?;
            let renderer = CommandRenderer::from_config(&workspace.config().thumbnails);
            let batch = workspace.render_thumbnails(&inventory, &renderer)?;
            if json {
                return print_json(&batch);
            }
            for (number, path) in &batch.rendered {
                println!("page {:>4}  {}", number, path.display());
            }
            print_failures(&batch.failed);
            Ok(())
        }
        Commands::Edit => cmd_edit(&workspace, json),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_failures(failed: &[Failure]) {
    for failure in failed {
        println!("  failed  {}: {}", failure.item, failure.reason);
    }
}

fn print_batch<T: Serialize>(
    json: bool,
    verb: &str,
    report: &BatchReport<T>,
    files: &[String],
) -> anyhow::Result<()> {
    if json {
        return print_json(report);
    }
    for file in files {
        println!("  {}", file);
    }
    print_failures(&report.failed);
    println!("{} {} files ({} failed)", verb, files.len(), report.failed.len());
    Ok(())
}

fn print_export(json: bool, report: &ExportReport) -> anyhow::Result<()> {
    if json {
        return print_json(report);
    }
    for file in report.exported() {
        println!("  {}", file);
    }
    print_failures(report.failed());
    println!(
        "Exported {} files at {} ({} replaced, {} failed)",
        report.exported().len(),
        report.exported_at.format("%Y-%m-%d %H:%M:%S"),
        report.cleared.len(),
        report.failed().len()
    );
    Ok(())
}

fn cmd_pages(workspace: &Workspace, json: bool) -> anyhow::Result<()> {
    let listing = workspace.list_pages()?;
    if json {
        return print_json(&listing);
    }
    for source in &listing.sources {
        match &source.title {
            Some(title) => println!("{:>4}  {}  ({})", source.page_count, source.filename, title),
            None => println!("{:>4}  {}", source.page_count, source.filename),
        }
    }
    print_failures(&listing.skipped);
    println!("{:>4}  total", listing.total_pages);
    Ok(())
}

/// Expand glob patterns in input paths
fn expand_globs(patterns: Vec<String>) -> anyhow::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for pattern in patterns {
        if pattern.contains(['*', '?', '[']) {
            let mut matched = Vec::new();
            for entry in glob(&pattern).with_context(|| format!("Bad pattern {}", pattern))? {
                match entry {
                    Ok(path) => matched.push(path),
                    Err(e) => warn!("glob error for {}: {}", pattern, e),
                }
            }
            if matched.is_empty() {
                bail!("No files matched pattern: {}", pattern);
            }
            matched.sort();
            paths.extend(matched);
        } else {
            paths.push(PathBuf::from(pattern));
        }
    }

    Ok(paths)
}

fn cmd_merge(inputs: Vec<String>, output: PathBuf) -> anyhow::Result<()> {
    let inputs = expand_globs(inputs)?;
    info!("Merging {} PDF files", inputs.len());

    let options = MergeOptions {
        input_paths: inputs,
        output_path: output.clone(),
    };
    merge_pdfs(&options).context("Merge failed")?;

    info!("Merged to {}", output.display());
    Ok(())
}

fn cmd_edit(workspace: &Workspace, json: bool) -> anyhow::Result<()> {
    let mut session = workspace.begin_editing().context("Cannot start editing")?;

    let thumbnails = &workspace.config().thumbnails;
    if thumbnails.enabled {
        let renderer = CommandRenderer::from_config(thumbnails);
        let batch = workspace.render_thumbnails(session.inventory(), &renderer)?;
        session
            .inventory_mut()
            .attach_thumbnails(batch.generation, &batch.rendered);
    }

    eprintln!("{}", HELP);
    let stdin = io::stdin();
    match run_edit_loop(session, stdin.lock(), io::stdout())? {
        EditEnd::Commit(session) => {
            let report = session.commit(workspace).context("Export failed")?;
            print_export(json, &report)
        }
        EditEnd::Abort => {
            info!("Left without exporting");
            Ok(())
        }
    }
}
