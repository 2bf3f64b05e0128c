//! drainhand CLI - Height Above Nearest Drainage from DEM tiles and basins

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use drainhand_algorithms::hydrology::{
    condition_dem, flow_accumulation, flow_direction, ConditionParams, DrainageThreshold,
};
use drainhand_algorithms::pipeline::{
    compute_hand, encode_products, run_batch, BatchOptions, FailurePolicy, HandConfig,
    TileOutcome,
};
use drainhand_core::io::{
    read_basins, read_geotiff, write_geotiff, Compression, DirectorySink, GeoTiffOptions,
    GeoTiffSource, RasterSink, DEFAULT_ID_PROPERTY,
};
use drainhand_core::Raster;

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "drainhand")]
#[command(author, version, about = "Height Above Nearest Drainage from a DEM", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Pipeline options shared by `hand` and `basins`; flags override `--config`
#[derive(clap::Args)]
struct PipelineArgs {
    /// JSON file with pipeline settings
    #[arg(long)]
    config: Option<PathBuf>,
    /// Accumulation threshold in cells, or "auto" for the mean accumulation
    #[arg(short, long)]
    threshold: Option<DrainageThreshold>,
    /// Gaussian sigma for filling undefined HAND, in cells
    #[arg(short, long)]
    sigma: Option<f64>,
    /// Maximum gap-fill passes
    #[arg(long)]
    max_iterations: Option<usize>,
    /// Memory budget per tile, in MiB
    #[arg(long)]
    memory_budget_mb: Option<usize>,
    /// Treat nodata cells as interior obstacles instead of outlets
    #[arg(long)]
    nodata_not_outlet: bool,
    /// Output compression: lzw, deflate, none
    #[arg(long, default_value = "lzw")]
    compression: String,
    /// Skip the reduced-resolution overviews
    #[arg(long)]
    no_overviews: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// HAND over a whole DEM, without basin clipping
    Hand {
        /// Input DEM file
        input: PathBuf,
        /// Output directory
        out_dir: PathBuf,
        /// Name used in the output file names
        #[arg(long, default_value = "full")]
        name: String,
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
    /// HAND for every basin of a GeoJSON file
    Basins {
        /// Input DEM file covering the basins
        input: PathBuf,
        /// GeoJSON basin polygons
        basins: PathBuf,
        /// Output directory
        out_dir: PathBuf,
        /// Feature property holding the basin id
        #[arg(long, default_value = DEFAULT_ID_PROPERTY)]
        id_field: String,
        /// What to do after a basin fails: skip, abort
        #[arg(long, default_value = "skip")]
        policy: FailurePolicy,
        /// Append failing basin ids to this file
        #[arg(long)]
        error_log: Option<PathBuf>,
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
    /// Individual hydrology stages
    Hydrology {
        #[command(subcommand)]
        algorithm: HydrologyCommands,
    },
}

// ─── Hydrology subcommands ──────────────────────────────────────────────

#[derive(Subcommand)]
enum HydrologyCommands {
    /// Fill pits and depressions (conditioned elevation)
    Fill {
        /// Input DEM file
        input: PathBuf,
        /// Output file
        output: PathBuf,
        /// Treat nodata cells as interior obstacles instead of outlets
        #[arg(long)]
        nodata_not_outlet: bool,
    },
    /// D8 flow direction (ESRI codes) of the conditioned DEM
    FlowDirection {
        /// Input DEM file
        input: PathBuf,
        /// Output file
        output: PathBuf,
    },
    /// Flow accumulation from a D8 flow direction raster
    FlowAccumulation {
        /// Input flow direction file
        input: PathBuf,
        /// Output file
        output: PathBuf,
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

fn read_dem(path: &Path) -> Result<Raster<f64>> {
    let pb = spinner("Reading raster...");
    let raster: Raster<f64> = read_geotiff(path).context("Failed to read raster")?;
    pb.finish_and_clear();
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

fn read_u8(path: &Path) -> Result<Raster<u8>> {
    let pb = spinner("Reading raster...");
    let raster: Raster<u8> = read_geotiff(path).context("Failed to read raster")?;
    pb.finish_and_clear();
    Ok(raster)
}

fn write_result(raster: &Raster<f64>, path: &Path) -> Result<()> {
    let pb = spinner("Writing output...");
    write_geotiff(raster, path, None).context("Failed to write output")?;
    pb.finish_and_clear();
    Ok(())
}

fn write_result_u8(raster: &Raster<u8>, path: &Path) -> Result<()> {
    let pb = spinner("Writing output...");
    write_geotiff(raster, path, None).context("Failed to write output")?;
    pb.finish_and_clear();
    Ok(())
}

fn write_result_u32(raster: &Raster<u32>, path: &Path) -> Result<()> {
    let pb = spinner("Writing output...");
    write_geotiff(raster, path, None).context("Failed to write output")?;
    pb.finish_and_clear();
    Ok(())
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

fn parse_compression(s: &str) -> Result<Compression> {
    match s.to_lowercase().as_str() {
        "lzw" => Ok(Compression::Lzw),
        "deflate" | "zip" => Ok(Compression::Deflate),
        "none" => Ok(Compression::None),
        _ => anyhow::bail!("Unknown compression: {}. Use: lzw, deflate, none", s),
    }
}

/// Settings from `--config` (or defaults) with command-line overrides applied
fn load_config(args: &PipelineArgs) -> Result<HandConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            HandConfig::from_json(&text).context("Invalid config file")?
        }
        None => HandConfig::default(),
    };

    if let Some(threshold) = args.threshold {
        config.threshold = threshold;
    }
    if let Some(sigma) = args.sigma {
        config.sigma = sigma;
    }
    if let Some(max_iterations) = args.max_iterations {
        config.max_iterations = max_iterations;
    }
    if let Some(mb) = args.memory_budget_mb {
        config.memory_budget = Some(mb.saturating_mul(1024 * 1024));
    }
    if args.nodata_not_outlet {
        config.nodata_is_outlet = false;
    }
    config.validate().context("Invalid pipeline settings")?;
    Ok(config)
}

fn sink_for(out_dir: &Path, args: &PipelineArgs) -> Result<DirectorySink> {
    let options = GeoTiffOptions {
        compression: parse_compression(&args.compression)?,
        overviews: !args.no_overviews,
        ..Default::default()
    };
    DirectorySink::new(out_dir, options)
        .with_context(|| format!("Failed to create output directory {}", out_dir.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        // ── Info ─────────────────────────────────────────────────────
        Commands::Info { input } => {
            let raster = read_dem(&input)?;
            let (rows, cols) = raster.shape();
            let bounds = raster.bounds();
            let stats = raster.statistics();
            let gt = raster.transform().to_gdal();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Cell size: {}", raster.cell_size());
            println!(
                "Transform: [{}, {}, {}, {}, {}, {}]",
                gt[0], gt[1], gt[2], gt[3], gt[4], gt[5]
            );
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            if let Some(crs) = raster.crs() {
                println!("CRS: {}", crs);
            }
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

        // ── Whole-grid HAND ──────────────────────────────────────────
        Commands::Hand {
            input,
            out_dir,
            name,
            pipeline,
        } => {
            let config = load_config(&pipeline)?;
            let sink = sink_for(&out_dir, &pipeline)?;
            let dem = read_dem(&input)?;

            let start = Instant::now();
            let products = compute_hand(&dem, None, &config).context("Failed to compute HAND")?;
            let encoded = encode_products(&products, None, &config)?;
            let elapsed = start.elapsed();
            info!("Drainage threshold: {:.1} cells", products.threshold);

            let pb = spinner("Writing output...");
            let hand_name = config.hand_name(&name);
            sink.write(&hand_name, &encoded.hand)
                .context("Failed to write HAND")?;
            let acc_name = config.accumulation_name(&name);
            if !sink.exists(&acc_name) {
                sink.write(&acc_name, &encoded.accumulation)
                    .context("Failed to write flow accumulation")?;
            }
            pb.finish_and_clear();
            done("HAND", &sink.path_for(&hand_name), elapsed);
        }

        // ── Per-basin batch ──────────────────────────────────────────
        Commands::Basins {
            input,
            basins,
            out_dir,
            id_field,
            policy,
            error_log,
            pipeline,
        } => {
            let config = load_config(&pipeline)?;
            let sink = sink_for(&out_dir, &pipeline)?;
            let basins = read_basins(&basins, &id_field)
                .with_context(|| format!("Failed to read basins from {}", basins.display()))?;
            info!("{} basins", basins.len());

            let options = BatchOptions { policy, error_log };
            let source = GeoTiffSource::new(&input);
            let start = Instant::now();
            let reports = run_batch(&source, &basins, &config, &sink, &options)
                .context("Batch failed")?;
            let elapsed = start.elapsed();

            let mut failed = 0usize;
            let mut cancelled = 0usize;
            for report in &reports {
                match &report.outcome {
                    TileOutcome::Written(written) => {
                        println!("{}: {} ({:.2?})", report.id, written.hand, report.elapsed)
                    }
                    TileOutcome::Failed { kind, message } => {
                        failed += 1;
                        println!("{}: FAILED [{}] {}", report.id, kind, message);
                    }
                    TileOutcome::Cancelled => cancelled += 1,
                }
            }
            println!(
                "\n{} written, {} failed, {} cancelled in {:.2?}",
                reports.len() - failed - cancelled,
                failed,
                cancelled,
                elapsed
            );
            if failed > 0 && policy == FailurePolicy::Abort {
                anyhow::bail!("Batch aborted after a failed basin");
            }
        }

        // ── Hydrology ────────────────────────────────────────────────
        Commands::Hydrology { algorithm } => match algorithm {
            HydrologyCommands::Fill {
                input,
                output,
                nodata_not_outlet,
            } => {
                let dem = read_dem(&input)?;
                let start = Instant::now();
                let params = ConditionParams {
                    nodata_is_outlet: !nodata_not_outlet,
                    ..Default::default()
                };
                let result = condition_dem(&dem, &params).context("Failed to condition DEM")?;
                let elapsed = start.elapsed();
                write_result(&result.dem, &output)?;
                done("Conditioned DEM", &output, elapsed);
            }

            HydrologyCommands::FlowDirection { input, output } => {
                let dem = read_dem(&input)?;
                let start = Instant::now();
                let cond = condition_dem(&dem, &ConditionParams::default())
                    .context("Failed to condition DEM")?;
                let result = flow_direction(&cond.dem, Some(&cond.gradient))
                    .context("Failed to calculate flow direction")?;
                let elapsed = start.elapsed();
                write_result_u8(&result, &output)?;
                done("Flow direction", &output, elapsed);
            }

            HydrologyCommands::FlowAccumulation { input, output } => {
                let flow_dir = read_u8(&input)?;
                let start = Instant::now();
                let result = flow_accumulation(&flow_dir)
                    .context("Failed to calculate flow accumulation")?;
                let elapsed = start.elapsed();
                write_result_u32(&result, &output)?;
                done("Flow accumulation", &output, elapsed);
            }
        },
    }

    Ok(())
}
