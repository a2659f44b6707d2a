//! polsar CLI - Sequential change detection for polarimetric SAR series

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use polsar_algorithms::sar::{
    estimate_enl, hybrid_filter, sequential_omnibus, ChangeMapSet, EnlParams, HybridThreshold,
    OmnibusParams, OutputRaster,
};
use polsar_core::io::{
    read_covariance_image, read_geotiff, write_covariance_image, write_geotiff, GeoTiffOptions,
};
use polsar_core::raster::Neighborhood;
use polsar_core::{CovarianceImage, Raster, Series};
use polsar_parallel::ProcessingMode;

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "polsar")]
#[command(author, version, about = "Sequential change detection for polarimetric SAR series", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Sequential omnibus change detection over a series of covariance images
    Detect {
        /// One image per occurrence, bands as comma-separated files in layout order
        #[arg(short, long = "image", required = true)]
        images: Vec<String>,
        /// Output directory
        #[arg(short, long)]
        output_dir: PathBuf,
        /// Expected bands per image: 1, 2, 3, 4 or 9
        #[arg(short = 'b', long)]
        layout_bands: Option<usize>,
        /// Equivalent number of looks
        #[arg(short, long)]
        enl: Option<f64>,
        /// Significance level
        #[arg(short, long)]
        significance: Option<f64>,
        /// Median-smooth the p-values before thresholding
        #[arg(long)]
        median: bool,
        /// Half-width of the square median window
        #[arg(long)]
        median_radius: Option<usize>,
        /// Require the omnibus test to be significant as well
        #[arg(long)]
        omnibus_gate: bool,
        /// Classify directions from consecutive images before filtering
        #[arg(long)]
        prepass: bool,
        /// Worker threads (0 = all cores, 1 = sequential)
        #[arg(short, long)]
        threads: Option<usize>,
        /// JSON file with detection parameters, overridden by flags
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Acquisition labels, comma-separated
        #[arg(long, value_delimiter = ',')]
        labels: Option<Vec<String>>,
        /// Mask raster, outputs are cleared where it is 0
        #[arg(short, long)]
        mask: Option<PathBuf>,
    },
    /// Estimate the equivalent number of looks of one covariance image
    Enl {
        /// Bands in layout order, comma-separated
        #[arg(value_delimiter = ',', required = true)]
        bands: Vec<PathBuf>,
        /// Half-width of the square estimation window
        #[arg(short, long, default_value_t = 3)]
        radius: usize,
        /// Worker threads (0 = all cores, 1 = sequential)
        #[arg(short, long)]
        threads: Option<usize>,
    },
    /// Replace short ATSF histories by a spatially filtered image
    Hybrid {
        /// ATSF bands, comma-separated
        #[arg(long, value_delimiter = ',', required = true)]
        atsf: Vec<PathBuf>,
        /// Fallback bands (e.g. refined Lee), comma-separated
        #[arg(long, value_delimiter = ',', required = true)]
        fallback: Vec<PathBuf>,
        /// avimglog raster written by `detect`
        #[arg(short, long)]
        log: PathBuf,
        /// Fixed threshold in images
        #[arg(short, long, conflicts_with = "fraction")]
        threshold: Option<u16>,
        /// Threshold as a fraction of max(avimglog), or of the series length with --series-len
        #[arg(short, long)]
        fraction: Option<f64>,
        /// Series length for a fraction of the series
        #[arg(long, requires = "fraction")]
        series_len: Option<usize>,
        /// Output directory
        #[arg(short, long)]
        output_dir: PathBuf,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn read_bands(paths: &[PathBuf]) -> Result<CovarianceImage> {
    read_covariance_image(paths).with_context(|| {
        let names: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        format!("Failed to read covariance image from {}", names.join(", "))
    })
}

fn load_params(config: Option<&Path>) -> Result<OmnibusParams> {
    match config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Invalid config: {}", path.display()))
        }
        None => Ok(OmnibusParams::default()),
    }
}

fn read_series(
    images: &[String],
    layout_bands: Option<usize>,
    enl: f64,
    labels: Option<Vec<String>>,
) -> Result<Series> {
    let pb = spinner("Reading series...");
    let mut loaded = Vec::with_capacity(images.len());
    for (i, bands) in images.iter().enumerate() {
        let paths: Vec<PathBuf> = bands.split(',').map(|s| PathBuf::from(s.trim())).collect();
        if let Some(expected) = layout_bands
            && paths.len() != expected
        {
            bail!("Image {} has {} bands, expected {}", i + 1, paths.len(), expected);
        }
        loaded.push(read_bands(&paths)?.scaled(enl));
    }
    pb.finish_and_clear();

    let series = match labels {
        Some(labels) => Series::with_labels(loaded, labels)?,
        None => Series::new(loaded)?,
    };
    let (rows, cols) = series.shape();
    info!("Series: {} images of {} x {}, {}", series.len(), cols, rows, series.layout());
    Ok(series)
}

fn write_maps(maps: &ChangeMapSet, dir: &Path) -> Result<()> {
    let pb = spinner("Writing outputs...");
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
    for (name, raster) in maps.named_rasters() {
        let path = dir.join(format!("{}.tif", name));
        let options = Some(GeoTiffOptions::default());
        match raster {
            OutputRaster::U8(r) => write_geotiff(r, &path, options),
            OutputRaster::U16(r) => write_geotiff(r, &path, options),
            OutputRaster::F64(r) => write_geotiff(r, &path, options),
        }
        .with_context(|| format!("Failed to write output: {}", path.display()))?;
    }
    pb.finish_and_clear();
    Ok(())
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Info { input } => {
            let raster: Raster<f64> = read_geotiff(&input)
                .with_context(|| format!("Failed to read raster: {}", input.display()))?;
            let (rows, cols) = raster.shape();
            let bounds = raster.bounds();
            let transform = raster.transform();
            let stats = raster.statistics();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!(
                "Origin: ({:.6}, {:.6}), pixel size: {} x {}",
                transform.origin_x, transform.origin_y, transform.pixel_width, transform.pixel_height
            );
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            if let Some(nodata) = raster.nodata() {
                println!("NoData: {}", nodata);
            }
            println!("\nStatistics:");
            if let Some(min) = stats.min {
                println!("  Min: {:.4}", min);
            }
            if let Some(max) = stats.max {
                println!("  Max: {:.4}", max);
            }
            if let Some(mean) = stats.mean {
                println!("  Mean: {:.4}", mean);
            }
            println!(
                "  Valid cells: {} ({:.1}%)",
                stats.valid_count,
                100.0 * stats.valid_count as f64 / raster.len() as f64
            );
        }

        Commands::Detect {
            images,
            output_dir,
            layout_bands,
            enl,
            significance,
            median,
            median_radius,
            omnibus_gate,
            prepass,
            threads,
            config,
            labels,
            mask,
        } => {
            let mut params = load_params(config.as_deref())?;
            if let Some(enl) = enl {
                params.enl = enl;
            }
            if let Some(significance) = significance {
                params.significance = significance;
            }
            if let Some(radius) = median_radius {
                params.median_window = Neighborhood::Square(radius);
            }
            params.median_smoothing |= median;
            params.use_omnibus_gate |= omnibus_gate;
            params.directional_prepass |= prepass;
            if let Some(n) = threads {
                params.mode = ProcessingMode::from_threads(n);
            }
            params.validate()?;

            let series = read_series(&images, layout_bands, params.enl, labels)?;

            let start = Instant::now();
            let pb = spinner("Detecting changes...");
            let mut maps = sequential_omnibus(&series, &params).context("Change detection failed")?;
            pb.finish_and_clear();
            let elapsed = start.elapsed();

            if let Some(mask_path) = mask {
                let mask: Raster<u8> = read_geotiff(&mask_path)
                    .with_context(|| format!("Failed to read mask: {}", mask_path.display()))?;
                maps = maps.masked(&mask)?;
            }

            write_maps(&maps, &output_dir)?;

            let diag = maps.diagnostics();
            println!("Intervals:");
            for i in 0..maps.bmap().len() {
                if let Some(name) = maps.interval_name(i) {
                    println!("  bmap_{:02}: {}", i + 1, name);
                }
            }
            println!("Diagnostics:");
            println!("{}", serde_json::to_string_pretty(diag)?);
            done("Change maps", &output_dir, elapsed);
        }

        Commands::Enl {
            bands,
            radius,
            threads,
        } => {
            let image = read_bands(&bands)?;
            let params = EnlParams {
                window: Neighborhood::Square(radius),
                mode: threads.map_or(ProcessingMode::Parallel, ProcessingMode::from_threads),
                ..Default::default()
            };

            let start = Instant::now();
            let pb = spinner("Estimating looks...");
            let estimate = estimate_enl(&image, &params)?;
            pb.finish_and_clear();

            match estimate.enl {
                Some(enl) => println!("ENL: {:.1} ({} pixels estimated)", enl, estimate.estimated_pixels),
                None => println!("ENL: no estimate, the image shows no speckle"),
            }
            println!("  Processing time: {:.2?}", start.elapsed());
        }

        Commands::Hybrid {
            atsf,
            fallback,
            log,
            threshold,
            fraction,
            series_len,
            output_dir,
        } => {
            let atsf = read_bands(&atsf)?;
            let fallback = read_bands(&fallback)?;
            let avimglog: Raster<u16> = read_geotiff(&log)
                .with_context(|| format!("Failed to read avimglog: {}", log.display()))?;

            let threshold = match (threshold, fraction, series_len) {
                (Some(n), _, _) => HybridThreshold::Fixed(n),
                (None, Some(fraction), Some(series_len)) => {
                    HybridThreshold::FractionOfSeries { fraction, series_len }
                }
                (None, Some(f), None) => HybridThreshold::FractionOfMax(f),
                (None, None, _) => HybridThreshold::default(),
            };

            let start = Instant::now();
            let hybrid = hybrid_filter(&atsf, &fallback, &avimglog, threshold)?;
            let elapsed = start.elapsed();

            let written = write_covariance_image(&hybrid, &output_dir, "hybrid")
                .with_context(|| format!("Failed to write output to {}", output_dir.display()))?;
            info!("Wrote {} bands", written.len());
            done("Hybrid ATSF", &output_dir, elapsed);
        }
    }

    Ok(())
}
