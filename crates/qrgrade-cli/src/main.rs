//! `qrgrade` — scan, reconstruct and grade QR-coded answer sheets.
//!
//! Runs inside a `qrgrading-DDDDDD` workspace. Scanned (or simulated) page
//! images go through the bounded-concurrency decoder, are regrouped into
//! per-exam documents, reduced to the grading tables and finally turned into
//! annotation plans for the external PDF writer.

mod backends;
mod dir_source;

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use log::{error, info, warn, LevelFilter};

use qrgrade_core::{init_with_level, CodeRepository};
use qrgrade_decode::{PageDecoder, SymbolReader};
use qrgrade_pipeline::{
    load_json, load_native_registry, load_solutions, plan_annotations, raw_csv_path,
    reconstruct_exams, scan_pages, validate_format, write_json, write_tables, GradingConfig,
    GradingWorkspace, NullAssembler, PipelineError, RawTable, ReconstructOptions, ScanOptions,
    SimulatedSource,
};

use crate::backends::select_backends;
use crate::dir_source::DirectorySource;

/// The only answer-sheet payload template this tool understands.
const SUPPORTED_FORMAT: &str = "DDDDDDEEEQQA";

#[derive(Parser, Debug)]
#[command(name = "qrgrade", version, about = "Grade QR-coded paper exams")]
struct Cli {
    /// Workspace root (defaults to the current directory).
    #[arg(short, long)]
    workspace: Option<PathBuf>,

    /// Scan the page images and build the detected-code registry.
    #[arg(short, long)]
    process: bool,

    /// Reorient and regroup scanned pages into per-exam documents.
    #[arg(short, long)]
    reconstruct: bool,

    /// Produce the raw / nia / feedback grading tables.
    #[arg(short, long)]
    feedback: bool,

    /// Compute annotation plans for the external PDF writer.
    #[arg(short, long)]
    annotate: bool,

    /// Scan synthetic input: generated pages with random answers marked.
    #[arg(short = 'S', long)]
    simulate: bool,

    /// Seed for the simulated answers.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Raster resolution of the page images.
    #[arg(long)]
    dpi: Option<f64>,

    /// Printed code side length in millimetres.
    #[arg(long = "size-mm")]
    size_mm: Option<f64>,

    /// Patch footprint tolerance (relative).
    #[arg(long)]
    tolerance: Option<f64>,

    /// Threshold sweep values, percent (comma separated).
    #[arg(long = "threshold", value_delimiter = ',')]
    thresholds: Option<Vec<u8>>,

    /// Disable patch-based recovery.
    #[arg(long)]
    no_patches: bool,

    /// Worker thread budget for the scan phase.
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Decoder backends to enable (comma separated).
    #[arg(long, value_delimiter = ',')]
    backends: Vec<String>,

    /// First PDF page to scan (1-based).
    #[arg(long = "first-page")]
    first_page: Option<u32>,

    /// Last PDF page to scan (1-based, inclusive).
    #[arg(long = "last-page")]
    last_page: Option<u32>,

    /// Output scale for reconstructed pages.
    #[arg(long)]
    resize: Option<f64>,

    /// Print scale of the session; seeds the page ratio during annotation
    /// when a page's anchors were not detected.
    #[arg(short = 'k', long)]
    shrink: Option<f64>,

    /// Payload template; only DDDDDDEEEQQA is supported.
    #[arg(long)]
    format: Option<String>,

    /// Highest valid question number.
    #[arg(long)]
    questions: Option<u8>,

    /// Highest valid answer option.
    #[arg(long)]
    answers: Option<u8>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let _ = init_with_level(level);

    if let Err(err) = run(&cli) {
        error!("{err}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !(cli.process || cli.simulate || cli.reconstruct || cli.feedback || cli.annotate) {
        return Err("nothing to do: pass --process, --reconstruct, --feedback or --annotate".into());
    }
    if let Some(format) = &cli.format {
        if format != SUPPORTED_FORMAT {
            return Err(format!("unsupported format {format:?}, expected {SUPPORTED_FORMAT}").into());
        }
    }

    let root = match &cli.workspace {
        Some(path) => path.clone(),
        None => std::env::current_dir()?,
    };
    let workspace = GradingWorkspace::open(&root)?;
    let config = effective_config(cli, &workspace)?;
    info!(
        "session {} ({} question(s) x {} answer(s))",
        config.format.date, config.format.questions, config.format.answers
    );

    if cli.process || cli.simulate {
        run_scan(cli, &workspace, &config)?;
    }
    if cli.reconstruct {
        run_reconstruct(cli, &workspace, &config)?;
    }
    if cli.feedback {
        run_tables(&workspace, &config)?;
    }
    if cli.annotate {
        run_annotate(cli, &workspace, &config)?;
    }
    Ok(())
}

/// Stored configuration overridden by the command line.
fn effective_config(
    cli: &Cli,
    workspace: &GradingWorkspace,
) -> Result<GradingConfig, PipelineError> {
    let mut config = if workspace.config_path().is_file() {
        load_json(workspace.config_path())?
    } else {
        GradingConfig::new(workspace.date())
    };
    config.format.date = workspace.date().to_owned();

    if let Some(dpi) = cli.dpi {
        config.geometry.dpi = dpi;
    }
    if let Some(size_mm) = cli.size_mm {
        config.geometry.code_size_mm = size_mm;
    }
    if let Some(tolerance) = cli.tolerance {
        config.decode.tolerance = tolerance;
    }
    if let Some(thresholds) = &cli.thresholds {
        config.decode.thresholds = thresholds.clone();
    }
    if cli.no_patches {
        config.decode.use_patches = false;
    }
    if let Some(threads) = cli.threads {
        config.threads = threads;
    }
    if let Some(resize) = cli.resize {
        config.resize = resize;
    }
    if let Some(questions) = cli.questions {
        config.format.questions = questions;
    }
    if let Some(answers) = cli.answers {
        config.format.answers = answers;
    }
    config.decode.geometry = config.geometry;
    Ok(config)
}

fn run_scan(
    cli: &Cli,
    workspace: &GradingWorkspace,
    config: &GradingConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let readers = select_backends(&cli.backends)?;
    let reader_refs: Vec<&dyn SymbolReader> = readers.iter().map(Box::as_ref).collect();
    let decoder = PageDecoder::new(reader_refs, config.decode.clone());

    let options = ScanOptions {
        threads: config.threads,
        first_page: cli.first_page.map(|p| p.saturating_sub(1)).unwrap_or(0),
        last_page: cli.last_page,
    };

    let (repository, summary) = if cli.simulate {
        let base = DirectorySource::open(&workspace.generated_pages_dir())?;
        let native = load_native_registry(workspace.generated_txt(), &config.geometry)?;
        let source = SimulatedSource::new(&base, &native, cli.seed);
        scan_pages(&source, &decoder, &workspace.pool_dir(), &options)
    } else {
        let source = DirectorySource::open(&workspace.scanned_dir())?;
        scan_pages(&source, &decoder, &workspace.pool_dir(), &options)
    };

    for page in &summary.unidentified_pages {
        warn!("pdf page {} carries no page anchor", page + 1);
    }
    for page in &summary.failed_pages {
        warn!("pdf page {} failed and contributed no codes", page + 1);
    }

    let (repository, dropped) = validate_format(repository, &config.format);
    if dropped > 0 {
        warn!("{dropped} code(s) discarded by format validation");
    }
    repository.save(workspace.detected_txt())?;
    info!(
        "{} code(s) written to {:?}",
        repository.len(),
        workspace.detected_txt()
    );
    Ok(())
}

fn run_reconstruct(
    cli: &Cli,
    workspace: &GradingWorkspace,
    config: &GradingConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut repository = CodeRepository::load(workspace.detected_txt())?;
    let options = ReconstructOptions {
        resize: cli.resize.unwrap_or(config.resize),
    };

    let mut assembler = NullAssembler::default();
    reconstruct_exams(&mut repository, workspace, &options, &mut assembler)?;
    for (exam, pages) in &assembler.assembled {
        info!("exam {exam}: {pages} page(s) reconstructed");
    }
    Ok(())
}

fn run_tables(
    workspace: &GradingWorkspace,
    config: &GradingConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let repository = CodeRepository::load(workspace.detected_txt())?;
    let (repository, _) = validate_format(repository, &config.format);
    write_tables(&repository, &config.format, &workspace.xls_dir())?;
    Ok(())
}

fn run_annotate(
    cli: &Cli,
    workspace: &GradingWorkspace,
    config: &GradingConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let detected = CodeRepository::load(workspace.detected_txt())?;
    let (detected, _) = validate_format(detected, &config.format);
    let native = load_native_registry(workspace.generated_txt(), &config.geometry)?;

    let xls = workspace.xls_dir();
    let raw = RawTable::load(raw_csv_path(&xls, &config.format.date), &config.format)?;
    let reviewed = RawTable::load_reviewed(&xls, &config.format)?;
    let solutions = load_solutions(workspace.solutions_path())?;

    for exam in native.exams() {
        let solution = solutions.get(&exam).map(Vec::as_slice).unwrap_or(&[]);
        match plan_annotations(
            &detected,
            &native,
            &raw,
            &reviewed,
            &config.format,
            &config.geometry,
            &exam,
            solution,
            cli.shrink.unwrap_or(1.0),
        ) {
            Ok(plan) => {
                let out = workspace
                    .publish_dir()
                    .join(format!("{}_{}_annotations.json", config.format.date, exam));
                write_json(out, &plan)?;
            }
            Err(err @ PipelineError::FormatExceeded { .. }) => {
                warn!("{err}; exam skipped");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}
