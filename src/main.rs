use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use tracing::{error, info};

use table_scraper::constants::DEFAULT_HTML_SELECTOR;
use table_scraper::logging;
use table_scraper::pipeline::{self, DocumentFormat, RawTable};
use table_scraper::source;
use table_scraper::{Pipeline, PipelineConfig};

#[derive(Parser)]
#[command(name = "table_scraper")]
#[command(about = "Extract a table from an HTML or XML document into CSV")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline config over one document
    Run {
        /// Pipeline config (TOML)
        #[arg(long)]
        config: PathBuf,
        /// Local document to read
        #[arg(long, conflicts_with = "url", required_unless_present = "url")]
        input: Option<PathBuf>,
        /// URL to fetch the document from
        #[arg(long)]
        url: Option<String>,
        /// Output file; stdout when omitted. Only written if the run succeeds.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Print run metrics in Prometheus text format to stderr
        #[arg(long)]
        print_metrics: bool,
    },
    /// List the tables a selector matches, to help write a config
    Tables {
        #[arg(long, conflicts_with = "url", required_unless_present = "url")]
        input: Option<PathBuf>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long, value_enum, default_value_t = FormatArg::Html)]
        format: FormatArg,
        #[arg(long, default_value = DEFAULT_HTML_SELECTOR)]
        selector: String,
        /// Strip HTML comment markers first
        #[arg(long)]
        unwrap_comments: bool,
        /// Print the previews as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Html,
    Xml,
}

impl From<FormatArg> for DocumentFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Html => DocumentFormat::Html,
            FormatArg::Xml => DocumentFormat::Xml,
        }
    }
}

#[derive(Serialize)]
struct TablePreview<'a> {
    index: usize,
    rows: usize,
    widest_row: usize,
    rectangular: bool,
    first_row: Option<&'a Vec<String>>,
}

impl<'a> TablePreview<'a> {
    fn new(index: usize, table: &'a RawTable) -> Self {
        Self {
            index,
            rows: table.row_count(),
            widest_row: table.rows.iter().map(Vec::len).max().unwrap_or(0),
            rectangular: table.is_rectangular(),
            first_row: table.rows.first(),
        }
    }
}

fn run(
    config_path: PathBuf,
    input: Option<PathBuf>,
    url: Option<String>,
    output: Option<PathBuf>,
    print_metrics: bool,
) -> Result<()> {
    let metrics_handle = if print_metrics {
        Some(
            PrometheusBuilder::new()
                .install_recorder()
                .context("installing metrics recorder")?,
        )
    } else {
        None
    };

    let config = PipelineConfig::from_file(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    let pipeline = Pipeline::new(config)?;
    let raw_text = source::read_source(input.as_deref(), url.as_deref())?;

    let result = pipeline.run(&raw_text);

    if let Some(handle) = &metrics_handle {
        eprintln!("{}", handle.render());
    }

    let out = match result {
        Ok(out) => out,
        Err(failure) => {
            error!("Pipeline failed: {}", failure);
            eprintln!("❌ Run failed at the {} stage: {}", failure.stage, failure.error);
            return Err(failure.into());
        }
    };

    match &output {
        Some(path) => {
            fs::write(path, &out.bytes)
                .with_context(|| format!("writing output {}", path.display()))?;
            info!("Wrote {} bytes to {}", out.bytes.len(), path.display());
            eprintln!("\n📊 Run {}:", out.run_id);
            eprintln!("   Rows extracted: {}", out.rows_extracted);
            eprintln!("   Records written: {}", out.records);
            eprintln!("   Input sha256: {}", out.input_sha256);
            eprintln!("   Output file: {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&out.bytes)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn tables(
    input: Option<PathBuf>,
    url: Option<String>,
    format: DocumentFormat,
    selector: &str,
    unwrap_comments: bool,
    json: bool,
) -> Result<()> {
    let raw_text = source::read_source(input.as_deref(), url.as_deref())?;
    let document = if unwrap_comments {
        pipeline::loader::load_unwrapping_comments(&raw_text, format)?
    } else {
        pipeline::load(&raw_text, format)?
    };
    let tables = pipeline::extract_all_tables(&document, selector)?;
    let previews: Vec<TablePreview> = tables
        .iter()
        .enumerate()
        .map(|(i, t)| TablePreview::new(i, t))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&previews)?);
        return Ok(());
    }

    if previews.is_empty() {
        println!("⚠️  Selector '{}' matched no tables", selector);
        return Ok(());
    }
    for preview in &previews {
        println!(
            "#{}: {} rows (widest {} cells{})",
            preview.index,
            preview.rows,
            preview.widest_row,
            if preview.rectangular { "" } else { ", ragged" }
        );
        if let Some(first) = preview.first_row {
            println!("   first row: {:?}", first);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let _log_guard = logging::init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            input,
            url,
            output,
            print_metrics,
        } => run(config, input, url, output, print_metrics),
        Commands::Tables {
            input,
            url,
            format,
            selector,
            unwrap_comments,
            json,
        } => tables(input, url, format.into(), &selector, unwrap_comments, json),
    }
}
