//! GeoPrep CLI - geometry and raster preparation for geospatial pipelines

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use geoprep_batch::{BatchOptions, Event};
use geoprep_core::crs::{Crs, CrsResolver, TransformCache};
use geoprep_core::io::{read_geojson, read_geotiff, write_geojson, write_geotiff, VectorFormat};
use geoprep_core::{BoundingGeometry, CancelToken, Coordinate, Raster};
use geoprep_ops::bbox::{centroid_box, quad_box, CentroidBoxParams, RoundingStep};
use geoprep_ops::crop::{crop_raster, crop_vector};
use geoprep_ops::export::{export_geometry, ExportOptions};
use geoprep_ops::merge::{merge_rasters, MergeOptions, MergePolicy};
use geoprep_ops::overlap::analyze_overlap;
use geoprep_ops::reproject::{reproject_raster_file, ReprojectOptions, Resampling};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "geoprep")]
#[command(author, version, about = "Geometry and raster preparation toolkit", long_about = None)]
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
    /// Build a bounding geometry and export it
    Bbox {
        #[command(subcommand)]
        mode: BboxCommands,
    },
    /// Analyze how a footprint overlaps a reference region
    Overlap {
        /// Footprint layer (GeoJSON, first polygon feature)
        footprint: PathBuf,
        /// Reference region layer (GeoJSON, first polygon feature)
        region: PathBuf,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Crop a raster or vector layer to a bounding geometry
    Crop {
        /// Input file (GeoTIFF or GeoJSON)
        input: PathBuf,
        /// Clip geometry (GeoJSON, first polygon feature)
        geometry: PathBuf,
        /// Output file
        output: PathBuf,
    },
    /// Reproject rasters into a target CRS
    Reproject {
        /// Input GeoTIFF files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Target CRS, e.g. EPSG:32633
        #[arg(long)]
        to: String,
        /// Resampling method: nearest, bilinear, cubic
        #[arg(short, long, default_value = "nearest")]
        resampling: String,
        /// Output cell size as "w,h" or a single value
        #[arg(long)]
        resolution: Option<String>,
        /// Output file (single input only)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Output directory, one file per input
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Worker cap for multi-file runs
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Merge rasters into one grid
    Merge {
        /// Input GeoTIFF files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Output file
        #[arg(short, long)]
        output: PathBuf,
        /// Overlap policy: first, last, min, max, sum
        #[arg(short, long, default_value = "first")]
        policy: String,
        /// Output cell size as "w,h" or a single value
        #[arg(long)]
        resolution: Option<String>,
        /// Output nodata sentinel
        #[arg(long)]
        nodata: Option<f32>,
    },
}

#[derive(Subcommand)]
enum BboxCommands {
    /// Metric box around a center point
    Centroid {
        /// Center as "x,y" (lon,lat for geographic CRS)
        #[arg(long)]
        center: String,
        /// CRS of the center point
        #[arg(long, default_value = "EPSG:4326")]
        crs: String,
        /// Box width in meters
        #[arg(long)]
        width: f64,
        /// Box height in meters
        #[arg(long)]
        height: f64,
        /// Snap the projected center to a grid: 10, 100, 1000, 10000
        #[arg(long)]
        round: Option<String>,
        /// CRS of the output geometry; the center's CRS when absent
        #[arg(long)]
        output_crs: Option<String>,
        /// Output path without extension
        stem: PathBuf,
        /// Comma-separated formats: geojson, shapefile, kml
        #[arg(short, long, default_value = "geojson")]
        formats: String,
        /// Keep the projected CRS instead of converting to WGS84
        #[arg(long)]
        keep_crs: bool,
    },
    /// Quadrilateral from four explicit corners
    Quad {
        /// Corners as "x,y;x,y;x,y;x,y" in SW, SE, NE, NW order
        #[arg(long)]
        corners: String,
        /// CRS of the corners
        #[arg(long, default_value = "EPSG:4326")]
        crs: String,
        /// Output path without extension
        stem: PathBuf,
        /// Comma-separated formats: geojson, shapefile, kml
        #[arg(short, long, default_value = "geojson")]
        formats: String,
        /// Keep the projected CRS instead of converting to WGS84
        #[arg(long)]
        keep_crs: bool,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn parse_crs(s: &str) -> Result<Crs> {
    CrsResolver::new()
        .resolve(s)
        .with_context(|| format!("Cannot resolve CRS '{s}'"))
}

fn parse_point(s: &str) -> Result<(f64, f64)> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| anyhow!("Point must be 'x,y', got: {s}"))?;
    Ok((
        x.trim().parse().context("Invalid x coordinate")?,
        y.trim().parse().context("Invalid y coordinate")?,
    ))
}

fn parse_corners(s: &str) -> Result<[(f64, f64); 4]> {
    let points: Vec<(f64, f64)> = s
        .split(';')
        .map(parse_point)
        .collect::<Result<_>>()?;
    points
        .try_into()
        .map_err(|v: Vec<_>| anyhow!("Expected 4 corners, got {}", v.len()))
}

fn parse_resolution(s: &str) -> Result<(f64, f64)> {
    match s.split_once(',') {
        Some((w, h)) => Ok((
            w.trim().parse().context("Invalid cell width")?,
            h.trim().parse().context("Invalid cell height")?,
        )),
        None => {
            let v: f64 = s.trim().parse().context("Invalid cell size")?;
            Ok((v, v))
        }
    }
}

fn parse_formats(s: &str) -> Result<Vec<VectorFormat>> {
    s.split(',')
        .map(|part| part.trim().parse::<VectorFormat>().map_err(Into::into))
        .collect()
}

/// First polygon feature of a GeoJSON layer as a bounding geometry
fn load_boundary(path: &PathBuf) -> Result<BoundingGeometry> {
    let collection =
        read_geojson(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let crs = collection.crs.unwrap_or_else(Crs::wgs84);
    let polygon = collection
        .features
        .iter()
        .find_map(|f| match &f.geometry {
            geo_types::Geometry::Polygon(p) => Some(p),
            _ => None,
        })
        .ok_or_else(|| anyhow!("No polygon feature in {}", path.display()))?;
    let vertices: Vec<(f64, f64)> = polygon.exterior().0.iter().map(|c| (c.x, c.y)).collect();
    BoundingGeometry::new(vertices, crs)
        .with_context(|| format!("Invalid boundary in {}", path.display()))
}

fn is_raster(path: &PathBuf) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some(ext) if ext.eq_ignore_ascii_case("tif") || ext.eq_ignore_ascii_case("tiff")
    )
}

fn export_and_report(
    geometry: &BoundingGeometry,
    stem: &PathBuf,
    formats: &str,
    keep_crs: bool,
    cache: &TransformCache,
) -> Result<()> {
    let opts = ExportOptions {
        formats: parse_formats(formats)?,
        keep_crs,
    };
    let written = export_geometry(geometry, stem, &opts, cache)?;
    let extent = geometry.extent();
    println!("Geometry CRS: {}", geometry.crs());
    println!(
        "Extent: ({:.6}, {:.6}) - ({:.6}, {:.6})",
        extent.min_x, extent.min_y, extent.max_x, extent.max_y
    );
    for path in &written {
        println!("Wrote: {}", path.display());
    }
    Ok(())
}

fn done(name: &str, path: &PathBuf, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    let cache = TransformCache::new();

    match cli.command {
        // ── Info ─────────────────────────────────────────────────────
        Commands::Info { input } => {
            let raster: Raster<f32> =
                read_geotiff(&input).with_context(|| format!("Failed to read {}", input.display()))?;
            let (rows, cols) = raster.shape();
            let extent = raster.extent();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!(
                "Cell size: {} x {}",
                raster.transform().cell_width(),
                raster.transform().cell_height()
            );
            println!(
                "Extent: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                extent.min_x, extent.min_y, extent.max_x, extent.max_y
            );
            if let Some(crs) = raster.crs() {
                println!("CRS: {}", crs);
            }
            if let Some(nodata) = raster.nodata() {
                println!("NoData: {}", nodata);
            }
            let valid = raster.valid_count();
            println!(
                "Valid cells: {} ({:.1}%)",
                valid,
                100.0 * valid as f64 / raster.len() as f64
            );
        }

        // ── Bbox ─────────────────────────────────────────────────────
        Commands::Bbox { mode } => match mode {
            BboxCommands::Centroid {
                center,
                crs,
                width,
                height,
                round,
                output_crs,
                stem,
                formats,
                keep_crs,
            } => {
                let center_crs = parse_crs(&crs)?;
                let (x, y) = parse_point(&center)?;
                let output = match output_crs {
                    Some(s) => parse_crs(&s)?,
                    None => center_crs,
                };
                let round_to = round
                    .as_deref()
                    .map(str::parse::<RoundingStep>)
                    .transpose()?;
                let params = CentroidBoxParams {
                    center: Coordinate::new(x, y, center_crs)?,
                    width_m: width,
                    height_m: height,
                    round_to,
                    output_crs: output,
                };
                let geometry = centroid_box(&params, &cache)?;
                export_and_report(&geometry, &stem, &formats, keep_crs, &cache)?;
            }

            BboxCommands::Quad {
                corners,
                crs,
                stem,
                formats,
                keep_crs,
            } => {
                let geometry = quad_box(parse_corners(&corners)?, parse_crs(&crs)?)?;
                export_and_report(&geometry, &stem, &formats, keep_crs, &cache)?;
            }
        },

        // ── Overlap ──────────────────────────────────────────────────
        Commands::Overlap {
            footprint,
            region,
            json,
        } => {
            let fp = load_boundary(&footprint)?;
            let rg = load_boundary(&region)?;
            let result = analyze_overlap(&fp, &rg, &cache)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Containment: {:?}", result.containment);
                println!("Coverage: {:.2}%", result.percentage);
                println!("Footprint area: {:.1} m²", result.footprint_area_m2);
                println!("Intersection area: {:.1} m²", result.intersection_area_m2);
                println!("Analysis CRS: {}", result.analysis_crs);
                let o = result.overshoot;
                if o.is_zero() {
                    println!("Overshoot: none");
                } else {
                    println!(
                        "Overshoot: west {:.1} m, east {:.1} m, south {:.1} m, north {:.1} m",
                        o.west_m, o.east_m, o.south_m, o.north_m
                    );
                }
            }
        }

        // ── Crop ─────────────────────────────────────────────────────
        Commands::Crop {
            input,
            geometry,
            output,
        } => {
            let boundary = load_boundary(&geometry)?;
            let start = Instant::now();
            if is_raster(&input) {
                let raster: Raster<f32> = read_geotiff(&input)
                    .with_context(|| format!("Failed to read {}", input.display()))?;
                let cropped = crop_raster(&raster, &boundary, &cache)?;
                write_geotiff(&cropped, &output)?;
                info!(
                    rows = cropped.rows(),
                    cols = cropped.cols(),
                    "cropped raster"
                );
            } else {
                let collection = read_geojson(&input)
                    .with_context(|| format!("Failed to read {}", input.display()))?;
                let clipped = crop_vector(&collection, &boundary, &cache)?;
                write_geojson(&clipped, &output)?;
                info!(
                    kept = clipped.features.len(),
                    of = collection.features.len(),
                    "cropped vector layer"
                );
            }
            done("Crop", &output, start.elapsed());
        }

        // ── Reproject ────────────────────────────────────────────────
        Commands::Reproject {
            inputs,
            to,
            resampling,
            resolution,
            output,
            output_dir,
            workers,
        } => {
            let target = parse_crs(&to)?;
            let opts = ReprojectOptions {
                resampling: resampling.parse::<Resampling>()?,
                resolution: resolution.as_deref().map(parse_resolution).transpose()?,
            };

            match (output, output_dir) {
                (Some(output), None) => {
                    if inputs.len() != 1 {
                        anyhow::bail!("--output takes exactly one input; use --output-dir for many");
                    }
                    let start = Instant::now();
                    reproject_raster_file(&inputs[0], &output, target, &opts, &cache)?;
                    done("Reproject", &output, start.elapsed());
                }
                (None, Some(dir)) => {
                    std::fs::create_dir_all(&dir)
                        .with_context(|| format!("Cannot create {}", dir.display()))?;
                    let batch = BatchOptions {
                        max_workers: workers,
                    };
                    let cancel = CancelToken::new();

                    let pb = ProgressBar::new(inputs.len() as u64);
                    pb.set_style(
                        ProgressStyle::default_bar()
                            .template("{bar:40.cyan/blue} {pos}/{len} {msg}")
                            .unwrap()
                            .progress_chars("##-"),
                    );
                    let (tx, rx) = mpsc::channel();
                    let bar = pb.clone();
                    let feeder = std::thread::spawn(move || {
                        for event in rx {
                            match event {
                                Event::Started { total } => bar.set_length(total as u64),
                                Event::ItemDone { item, .. } => {
                                    bar.inc(1);
                                    bar.set_message(item);
                                }
                                Event::Finished => bar.finish_and_clear(),
                                Event::Progress { .. } => {}
                            }
                        }
                    });

                    let start = Instant::now();
                    let result = geoprep_batch::reproject_files(
                        &inputs,
                        &dir,
                        target,
                        &opts,
                        &batch,
                        &cache,
                        &cancel,
                        Some(tx),
                    )?;
                    feeder.join().expect("progress thread panicked");

                    println!(
                        "Reprojected {} of {} files to {} in {:.2?}",
                        result.succeeded(),
                        result.outcomes.len(),
                        dir.display(),
                        start.elapsed()
                    );
                    for outcome in &result.outcomes {
                        if let Err(e) = &outcome.result {
                            eprintln!(
                                "  failed ({}): {}: {}",
                                e.kind,
                                outcome.input.display(),
                                e.message
                            );
                        }
                    }
                    if !result.is_all_ok() {
                        anyhow::bail!("{} of {} inputs failed", result.failed(), result.outcomes.len());
                    }
                }
                _ => anyhow::bail!("Exactly one of --output or --output-dir is required"),
            }
        }

        // ── Merge ────────────────────────────────────────────────────
        Commands::Merge {
            inputs,
            output,
            policy,
            resolution,
            nodata,
        } => {
            let policy = policy.parse::<MergePolicy>()?;
            let opts = MergeOptions {
                resolution: resolution.as_deref().map(parse_resolution).transpose()?,
                output_nodata: nodata,
            };

            let pb = spinner("Reading rasters...");
            let mut rasters: Vec<Raster<f32>> = Vec::with_capacity(inputs.len());
            for input in &inputs {
                rasters.push(
                    read_geotiff(input)
                        .with_context(|| format!("Failed to read {}", input.display()))?,
                );
            }
            pb.finish_and_clear();

            let start = Instant::now();
            let merged = merge_rasters(&rasters, policy, &opts, &cache, &CancelToken::new())?;
            let elapsed = start.elapsed();
            write_geotiff(&merged, &output)?;
            let (rows, cols) = merged.shape();
            println!("Merged {} inputs into {} x {}", inputs.len(), cols, rows);
            done("Merge", &output, elapsed);
        }
    }

    Ok(())
}
