//! taptap-ocr
//!
//! Command-line front end: crop screenshots into regions, extract per-image
//! records and run per-region consensus.

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use taptap_ocr::config::{ConsensusMode, PipelineConfig, load_config};
use taptap_ocr::ocr::{TesseractEngine, crop_screenshot, ensure_tesseract};
use taptap_ocr::report::{
    ConsensusReport, append_extraction_rows, export_to_json, init_extraction_csv,
    write_consensus_csv,
};
use taptap_ocr::session::catalog::crop_file_name;
use taptap_ocr::session::{RegionAnalyzer, entries_for_region, scan_directory};
use taptap_ocr::{logging, paths};

#[derive(Parser, Debug)]
#[command(name = "taptap-ocr")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to config.json next to the executable)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Locate Tesseract and download trained data if missing
    Setup,
    /// Crop every configured region out of a full screenshot
    Crop {
        screenshot: PathBuf,
        /// Output directory (defaults to a new session folder)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// OCR every image in a directory and append per-image rows to a CSV
    Extract {
        dir: PathBuf,
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Reconcile all images of each region into one consensus record
    Consensus {
        dir: PathBuf,
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long)]
        json: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Full,
    Optimized,
}

impl From<ModeArg> for ConsensusMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Full => ConsensusMode::Full,
            ModeArg::Optimized => ConsensusMode::Optimized,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    paths::ensure_directories().context("Failed to create output directories")?;
    logging::init_logging(&paths::get_logs_dir());

    // Panics go to the log file too
    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("[PANIC] {}", panic_info);
    }));

    let config_path = cli.config.unwrap_or_else(paths::get_config_path);
    let config = load_config(&config_path);

    match cli.command {
        Command::Setup => run_setup(&config),
        Command::Crop { screenshot, out } => run_crop(&config, &screenshot, out),
        Command::Extract { dir, csv } => run_extract(&config, &dir, csv),
        Command::Consensus {
            dir,
            mode,
            csv,
            json,
        } => run_consensus(&config, &dir, mode.map(Into::into), csv, json),
    }
}

fn run_setup(config: &PipelineConfig) -> Result<()> {
    let paths = ensure_tesseract(&config.ocr)?;
    log::info!(
        "Tesseract ready: {} (tessdata: {})",
        paths.executable.display(),
        paths.tessdata.display()
    );
    Ok(())
}

fn run_crop(config: &PipelineConfig, screenshot: &Path, out: Option<PathBuf>) -> Result<()> {
    let img = image::open(screenshot)
        .with_context(|| format!("Failed to open {}", screenshot.display()))?
        .to_rgba8();

    let out_dir = out.unwrap_or_else(paths::new_session_dir);
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let stem = screenshot
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("Screenshot path has no file name: {}", screenshot.display()))?;

    for (region, crop) in crop_screenshot(&img, &config.regions) {
        let path = out_dir.join(crop_file_name(stem, &region));
        crop.save(&path)
            .with_context(|| format!("Failed to save {}", path.display()))?;
        log::info!("Saved {} ({}x{})", path.display(), crop.width(), crop.height());
    }

    Ok(())
}

fn run_extract(config: &PipelineConfig, dir: &Path, csv: Option<PathBuf>) -> Result<()> {
    let engine = TesseractEngine::from_config(&config.ocr)?;
    let analyzer = RegionAnalyzer::new(&engine, config)?;
    let entries = scan_directory(dir, &config.region_names())
        .with_context(|| format!("Failed to list {}", dir.display()))?;

    let csv_path = csv.unwrap_or_else(|| dir.join("extraction.csv"));
    init_extraction_csv(&csv_path)?;

    let mut total = 0;
    for region in config.region_names() {
        let candidates = analyzer.load_candidates(&entries_for_region(&entries, region));
        let results = analyzer.extract_all(region, &candidates);
        append_extraction_rows(&csv_path, &results)?;
        log::info!("{}: {} of {} candidates extracted", region, results.len(), candidates.len());
        total += results.len();
    }

    log::info!("Wrote {} rows to {}", total, csv_path.display());
    Ok(())
}

fn run_consensus(
    config: &PipelineConfig,
    dir: &Path,
    mode: Option<ConsensusMode>,
    csv: Option<PathBuf>,
    json: Option<PathBuf>,
) -> Result<()> {
    let engine = TesseractEngine::from_config(&config.ocr)?;
    let mut analyzer = RegionAnalyzer::new(&engine, config)?;
    if let Some(mode) = mode {
        analyzer = analyzer.with_mode(mode);
    }

    let entries = scan_directory(dir, &config.region_names())
        .with_context(|| format!("Failed to list {}", dir.display()))?;

    let mut results = Vec::new();
    let mut skipped = Vec::new();
    for region in config.region_names() {
        let report = analyzer.analyze(region, &entries_for_region(&entries, region));
        match report.consensus {
            Some(result) => results.push(result),
            None => {
                log::warn!("{}: region skipped", region);
                skipped.push(region.to_string());
            }
        }
    }

    let csv_path = csv.unwrap_or_else(|| dir.join("consensus.csv"));
    write_consensus_csv(&csv_path, &results)?;
    log::info!("Consensus CSV written to {}", csv_path.display());

    let json_path = json.unwrap_or_else(|| dir.join("consensus.json"));
    export_to_json(&ConsensusReport::new(results, skipped), &json_path)?;
    log::info!("Consensus JSON written to {}", json_path.display());

    Ok(())
}
