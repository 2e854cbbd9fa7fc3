use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Datelike as _, Local};
use clap::{Args, Parser, Subcommand};
use coordinate_transformer::{CoordinateTransformer, PointTransformer, TransformError};
use env_logger::Builder;
use glob::glob;
use log::LevelFilter;
use serde::Serialize;

use pcd_core::{
    header::{vlr::Vlr, Header},
    pointcloud::{point::BoundingVolume, point::Point, record::PointRecord},
};
use pcd_exporter::LasPointWriter;
use pcd_parser::{LasPointReader, PointIterator};
use projection_transform::{
    crs::{Crs, CrsKind, EpsgCode},
    grid::cache::{FileGridLoader, ShiftGridCache},
    gridshift::DatumShiftRegistry,
};

#[derive(Parser, Debug)]
#[command(
    name = "pcdtool",
    about = "Inspect LAS point clouds and transform them between coordinate reference systems",
    author = "MIERUNE Inc.",
    version = "0.0.1"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print header summaries
    Info {
        #[arg(required = true, num_args = 1.., value_name = "FILE")]
        input: Vec<String>,

        #[arg(long)]
        json: bool,
    },
    /// Transform point coordinates into another CRS
    Transform(TransformArgs),
}

#[derive(Args, Debug)]
struct TransformArgs {
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Source EPSG code; read from the file when omitted
    #[arg(long)]
    from: Option<EpsgCode>,

    #[arg(long)]
    to: EpsgCode,

    /// Directories searched for shift grids before PCD_GRID_PATH
    #[arg(long = "grid-dir", value_name = "DIR")]
    grid_dirs: Vec<PathBuf>,

    /// Extra datum shift, e.g. TOKYO:JGD2000:tky2jgd.gsb
    #[arg(long = "grid", value_name = "SRC:DST:ID[,ID..]")]
    grids: Vec<String>,

    /// Output coordinate scale; defaults to 1e-7 for geographic and 0.001 otherwise
    #[arg(long)]
    scale: Option<f64>,

    #[arg(long, default_value_t = 1_000_000)]
    chunk_size: usize,

    /// Drop records that fail to decode instead of aborting
    #[arg(long)]
    skip_invalid: bool,
}

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Las(#[from] pcd_core::Error),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("invalid glob pattern `{0}`")]
    Glob(String),
    #[error("{0} has no EPSG code, pass --from")]
    MissingCrs(PathBuf),
    #[error("invalid grid spec `{0}`, expected SRC:DST:ID[,ID..]")]
    GridSpec(String),
    #[error("scale {0} must be positive")]
    Scale(f64),
}

fn expand_globs(input_patterns: &[String]) -> Result<Vec<PathBuf>, AppError> {
    let mut paths = Vec::new();
    for pattern in input_patterns {
        if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
            let entries = glob(pattern).map_err(|_| AppError::Glob(pattern.clone()))?;
            for entry in entries {
                match entry {
                    Ok(path) => paths.push(path),
                    Err(e) => log::warn!("skipping {:?}", e),
                }
            }
        } else {
            paths.push(PathBuf::from(pattern));
        }
    }
    Ok(paths)
}

/// `SRC:DST:ID[,ID..]` into its datum pair and grid identifiers.
fn parse_grid_spec(spec: &str) -> Result<(String, String, Vec<String>), AppError> {
    let invalid = || AppError::GridSpec(spec.to_string());
    let mut parts = spec.splitn(3, ':');
    let (Some(source), Some(target), Some(ids)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };
    let ids: Vec<String> = ids
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect();
    if source.is_empty() || target.is_empty() || ids.is_empty() {
        return Err(invalid());
    }
    Ok((source.to_string(), target.to_string(), ids))
}

#[derive(Debug, Serialize)]
struct InfoSummary<'a> {
    path: &'a Path,
    version: String,
    point_layout: u8,
    point_record_length: u16,
    point_count: u64,
    point_count_by_return: Vec<u64>,
    scale: [f64; 3],
    offset: [f64; 3],
    bounding_volume: Option<BoundingVolume>,
    crs: Option<String>,
    extra_attributes: Vec<&'a str>,
    vlrs: &'a [Vlr],
}

impl<'a> InfoSummary<'a> {
    fn new(path: &'a Path, header: &'a Header) -> Self {
        let returns = header
            .point_count_by_return
            .iter()
            .rposition(|&n| n > 0)
            .map_or(0, |last| last + 1);
        Self {
            path,
            version: header.version.to_string(),
            point_layout: header.layout().id,
            point_record_length: header.layout().total_width(),
            point_count: header.point_count,
            point_count_by_return: header.point_count_by_return[..returns].to_vec(),
            scale: header.scale,
            offset: header.offset,
            bounding_volume: (!header.bounding_volume.is_empty()).then_some(header.bounding_volume),
            crs: header.crs().map(|crs| crs.to_string()),
            extra_attributes: header
                .layout()
                .extra_attributes
                .iter()
                .map(|a| a.name.as_str())
                .collect(),
            vlrs: &header.vlrs,
        }
    }

    fn print(&self) {
        println!("{}", self.path.display());
        println!("  version:        LAS {}", self.version);
        println!(
            "  point layout:   {} ({} bytes)",
            self.point_layout, self.point_record_length
        );
        println!("  points:         {}", self.point_count);
        println!("  by return:      {:?}", self.point_count_by_return);
        println!("  scale:          {:?}", self.scale);
        println!("  offset:         {:?}", self.offset);
        match &self.bounding_volume {
            Some(b) => println!("  bounds:         {:?} - {:?}", b.min, b.max),
            None => println!("  bounds:         (empty)"),
        }
        println!("  crs:            {}", self.crs.as_deref().unwrap_or("(none)"));
        if !self.extra_attributes.is_empty() {
            println!("  extra bytes:    {}", self.extra_attributes.join(", "));
        }
        for vlr in self.vlrs {
            println!(
                "  vlr:            {}/{} {:?} ({} bytes)",
                vlr.user_id,
                vlr.record_id,
                vlr.description,
                vlr.data.len()
            );
        }
    }
}

fn run_info(input: &[String], json: bool) -> Result<(), AppError> {
    let paths = expand_globs(input)?;
    let headers = paths
        .iter()
        .map(|path| Ok(LasPointReader::from_path(path)?.header().clone()))
        .collect::<Result<Vec<_>, AppError>>()?;
    let summaries: Vec<_> = paths
        .iter()
        .zip(&headers)
        .map(|(path, header)| InfoSummary::new(path, header))
        .collect();

    if json {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        serde_json::to_writer_pretty(&mut out, &summaries)?;
        writeln!(out)?;
    } else {
        for summary in &summaries {
            summary.print();
        }
    }
    Ok(())
}

fn default_scale(target: &Crs) -> f64 {
    match target.kind {
        CrsKind::Geographic => 1e-7,
        CrsKind::Geocentric | CrsKind::Projected(_) => 0.001,
    }
}

/// Reads every record of `args.input`, transforms its coordinates and writes
/// them with their other attributes to `args.output`. Returns the number of
/// points written.
fn run_transform(args: &TransformArgs) -> Result<u64, AppError> {
    let start = std::time::Instant::now();
    let reader = LasPointReader::from_path(&args.input)?;
    let source_epsg = match args.from.or_else(|| reader.header().epsg()) {
        Some(epsg) => epsg,
        None => return Err(AppError::MissingCrs(args.input.clone())),
    };
    let target = Crs::from_epsg(args.to).map_err(|_| TransformError::UnsupportedCrs(args.to))?;
    let scale = args.scale.unwrap_or_else(|| default_scale(&target));
    if !(scale > 0.0 && scale.is_finite()) {
        return Err(AppError::Scale(scale));
    }

    log::info!("input file: {:?}", args.input);
    log::info!("output file: {:?}", args.output);
    log::info!("EPSG:{} -> EPSG:{}", source_epsg, args.to);

    let owned_cache;
    let cache = if args.grid_dirs.is_empty() {
        ShiftGridCache::global()
    } else {
        let mut search_paths = args.grid_dirs.clone();
        search_paths.extend_from_slice(FileGridLoader::from_env().search_paths());
        owned_cache = ShiftGridCache::new(FileGridLoader::new(search_paths));
        &owned_cache
    };
    let mut registry = DatumShiftRegistry::with_published_grids();
    for spec in &args.grids {
        let (source, target, ids) = parse_grid_spec(spec)?;
        registry.register(&source, &target, ids);
    }
    let transformer = CoordinateTransformer::new(cache, registry);
    let point_transformer = PointTransformer::new(&transformer, source_epsg, args.to)?;

    let input_header = reader.header().clone();
    let mut records: Vec<PointRecord> = Vec::new();
    let mut points: Vec<Point> = Vec::new();
    let mut skipped = 0u64;
    for chunk in PointIterator::new(reader, args.chunk_size) {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err @ (pcd_core::Error::MalformedRecord(_) | pcd_core::Error::FieldOutOfRange { .. }))
                if args.skip_invalid =>
            {
                log::warn!("skipping record {}: {err}", records.len() as u64 + skipped);
                skipped += 1;
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        let mut chunk_points: Vec<Point> = chunk.iter().map(|r| input_header.to_point(r)).collect();
        point_transformer.transform_points_in_place(&mut chunk_points)?;
        records.extend(chunk);
        points.extend(chunk_points);
    }
    if skipped > 0 {
        log::warn!(
            "skipped {} of {} records that failed to decode",
            skipped,
            input_header.point_count
        );
    }
    log::info!("transformed {} points in {:?}", points.len(), start.elapsed());

    let bounds: BoundingVolume = points.iter().copied().collect();
    let mut header = input_header;
    header.scale = [scale; 3];
    // recomputed by the writer from the quantized records
    header.bounding_volume = BoundingVolume::empty();
    header.offset = if bounds.is_empty() {
        [0.0; 3]
    } else {
        bounds.min.map(f64::floor)
    };
    header.set_epsg(args.to);
    let today = Local::now();
    header.creation_day = today.ordinal() as u16;
    header.creation_year = today.year() as u16;
    header.generating_software = concat!("pcdtool ", env!("CARGO_PKG_VERSION")).to_string();

    let mut writer = LasPointWriter::from_path(&args.output, header)?;
    for (point, record) in points.iter().zip(&records) {
        writer.write_point(point, record)?;
    }
    writer.finalize()?;
    log::info!("wrote {:?} in {:?}", args.output, start.elapsed());
    Ok(writer.len())
}

fn main() {
    let args = Cli::parse();

    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(
            None,
            if args.verbose {
                LevelFilter::Debug
            } else {
                LevelFilter::Info
            },
        )
        .init();

    let result = match &args.command {
        Command::Info { input, json } => run_info(input, *json),
        Command::Transform(transform) => run_transform(transform).map(|_| ()),
    };
    if let Err(err) = result {
        log::error!("{err}");
        std::process::exit(1);
    }
}
