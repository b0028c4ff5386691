//! CLI for the benchproc filtering and grouping engine.
//!
//! Reads benchmark records as newline-delimited JSON, one record per line,
//! from a file or standard input.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use benchproc::filter::Filter;
use benchproc::kvql;
use benchproc::pipeline::{Pipeline, PipelineConfig};
use benchproc::record::Record;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// benchproc — Filter, project and group benchmark results.
#[derive(Parser)]
#[command(name = "benchproc", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Print the records matching a query, without non-matching measurements.
    Filter {
        /// Query selecting records, e.g. "goos:linux .unit:ns/op".
        query: String,

        /// NDJSON record file. Reads standard input if omitted or "-".
        file: Option<PathBuf>,
    },

    /// Group records and summarize each group's columns.
    Group {
        /// JSON pipeline configuration file. Flags override its settings.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Query selecting records.
        #[arg(long)]
        filter: Option<String>,

        /// Projection that splits records into groups, e.g. ".config".
        #[arg(long)]
        group_by: Option<String>,

        /// Projection that splits groups into columns, e.g. "/size@numeric".
        #[arg(long)]
        columns: Option<String>,

        /// Normalize pre-scaled units such as ns/op to base units.
        #[arg(long)]
        tidy: bool,

        /// Output format.
        #[arg(long, default_value = "text")]
        format: OutputFormat,

        /// NDJSON record file. Reads standard input if omitted or "-".
        file: Option<PathBuf>,
    },

    /// Parse a query and print its structure.
    Parse {
        /// The query to parse.
        query: String,

        /// Print the token stream instead of the parsed query.
        #[arg(long)]
        tokens: bool,
    },
}

/// Output format for group summaries.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Indented plain text.
    Text,
    /// A single JSON document.
    Json,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Filter { query, file } => cmd_filter(&query, file.as_deref()),
        Commands::Group {
            config,
            filter,
            group_by,
            columns,
            tidy,
            format,
            file,
        } => load_config(config.as_deref()).and_then(|mut c| {
            if let Some(filter) = filter {
                c.filter = filter;
            }
            if let Some(group_by) = group_by {
                c.group_by = group_by;
            }
            if let Some(columns) = columns {
                c.columns = columns;
            }
            c.tidy_units |= tidy;
            cmd_group(&c, &format, file.as_deref())
        }),
        Commands::Parse { query, tokens } => cmd_parse(&query, tokens),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Loads a pipeline configuration, or the defaults if no file is given.
fn load_config(path: Option<&Path>) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    let data = std::fs::read_to_string(path)
        .map_err(|e| format!("reading config '{}': {e}", path.display()))?;
    let config: PipelineConfig = serde_json::from_str(&data)
        .map_err(|e| format!("parsing config '{}': {e}", path.display()))?;
    debug!(path = %path.display(), ?config, "loaded pipeline config");
    Ok(config)
}

/// Opens `path` for reading, treating `None` and `-` as standard input.
fn open_input(path: Option<&Path>) -> Result<Box<dyn BufRead>, Box<dyn std::error::Error>> {
    match path {
        None => Ok(Box::new(io::stdin().lock())),
        Some(p) if p == Path::new("-") => Ok(Box::new(io::stdin().lock())),
        Some(p) => {
            let file =
                File::open(p).map_err(|e| format!("opening '{}': {e}", p.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
    }
}

/// Calls `f` on each record of the input, skipping blank lines.
fn for_each_record(
    path: Option<&Path>,
    mut f: impl FnMut(Record) -> Result<(), Box<dyn std::error::Error>>,
) -> Result<u64, Box<dyn std::error::Error>> {
    let input = open_input(path)?;
    let mut count = 0;
    for (i, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Record =
            serde_json::from_str(&line).map_err(|e| format!("line {}: {e}", i + 1))?;
        f(record)?;
        count += 1;
    }
    Ok(count)
}

/// Implements `benchproc filter <query> [FILE]`.
fn cmd_filter(query: &str, file: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let filter = Filter::new(query)?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    let mut kept = 0u64;
    let seen = for_each_record(file, |mut record| {
        if filter.match_record(&record).apply(&mut record) {
            serde_json::to_writer(&mut out, &record)?;
            writeln!(out)?;
            kept += 1;
        }
        Ok(())
    })?;
    out.flush()?;

    info!(seen, kept, "filtered records");
    Ok(())
}

/// Implements `benchproc group`.
fn cmd_group(
    config: &PipelineConfig,
    format: &OutputFormat,
    file: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut pipeline = Pipeline::new(config)?;
    for_each_record(file, |record| {
        pipeline.push(record);
        Ok(())
    })?;

    let stats = pipeline.stats();
    info!(seen = stats.seen, kept = stats.kept, dropped = stats.dropped, "grouped records");

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    match format {
        OutputFormat::Text => write_text(&mut out, &pipeline)?,
        OutputFormat::Json => write_json(&mut out, &pipeline)?,
    }
    out.flush()?;
    Ok(())
}

fn write_text(out: &mut impl Write, pipeline: &Pipeline) -> io::Result<()> {
    let groups = pipeline.sorted_groups();
    if groups.is_empty() {
        writeln!(out, "no records")?;
        return Ok(());
    }

    for group in groups {
        let name = pipeline.group_schema().display_row(group.row()).to_string();
        if name.is_empty() {
            writeln!(out, "(all)")?;
        } else {
            writeln!(out, "{name}")?;
        }
        for column in pipeline.sorted_columns(group) {
            let col = pipeline.column_schema().display_row(column.row()).to_string();
            writeln!(
                out,
                "  {col:<40} n={:<4} mean={:.6}",
                column.values().len(),
                column.mean()
            )?;
        }
    }
    Ok(())
}

fn write_json(out: &mut impl Write, pipeline: &Pipeline) -> io::Result<()> {
    let groups: Vec<_> = pipeline
        .sorted_groups()
        .into_iter()
        .map(|group| {
            let columns: Vec<_> = pipeline
                .sorted_columns(group)
                .into_iter()
                .map(|column| {
                    json!({
                        "column": pipeline.column_schema().display_row(column.row()).to_string(),
                        "count": column.values().len(),
                        "mean": column.mean(),
                        "values": column.values(),
                    })
                })
                .collect();
            json!({
                "group": pipeline.group_schema().display_row(group.row()).to_string(),
                "columns": columns,
            })
        })
        .collect();

    let doc = json!({
        "stats": pipeline.stats(),
        "groups": groups,
    });
    serde_json::to_writer_pretty(&mut *out, &doc)?;
    writeln!(out)
}

/// Implements `benchproc parse <query>`.
fn cmd_parse(query: &str, tokens: bool) -> Result<(), Box<dyn std::error::Error>> {
    if tokens {
        for tok in kvql::tokenize(query)? {
            let kind = format!("{:?}", tok.kind);
            println!("{:>4} {kind:<8} {tok}", tok.offset);
        }
        return Ok(());
    }
    let q = kvql::parse(query)?;
    println!("{q}");
    Ok(())
}
