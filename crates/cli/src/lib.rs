use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use image::{imageops, Rgb, RgbImage};
use serde::Serialize;
use std::convert::Infallible;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tilecache_cache::CacheConfig;
use tilecache_compositor::{DrawStats, RedrawDriver, ViewportCompositor};
use tilecache_render::{DataRect, TileRequest, Viewport};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "tilecache")]
#[command(about = "Tile cache diagnostics")]
pub struct Cli {
    /// Configuration file of `key = value` lines.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Maximum cached tiles; zero or negative for unbounded.
    #[arg(long, global = true, allow_negative_numbers = true)]
    capacity: Option<i64>,

    /// Square tile size in pixels.
    #[arg(long, global = true, value_name = "PX")]
    tile_size: Option<i32>,

    /// Log cache activity to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Render a synthetic heat map through the tile cache into a PNG.
    Render {
        #[command(flatten)]
        view: ViewArgs,
        #[arg(long)]
        output: PathBuf,
    },
    /// Pan the viewport by whole tiles and report per-frame cache activity.
    Pan {
        #[command(flatten)]
        view: ViewArgs,
        #[arg(long, default_value_t = 4)]
        frames: u32,
        /// Horizontal step in tiles per frame.
        #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
        step_x: i32,
        /// Vertical step in tiles per frame.
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        step_y: i32,
    },
    /// Print the resolved configuration as JSON.
    Config,
    /// Print CLI version.
    Version,
}

#[derive(Debug, Args)]
struct ViewArgs {
    #[arg(long, default_value_t = 512)]
    width: i32,
    #[arg(long, default_value_t = 512)]
    height: i32,
    /// Data window as MIN_X,MIN_Y,MAX_X,MAX_Y.
    #[arg(
        long,
        value_delimiter = ',',
        allow_hyphen_values = true,
        default_values_t = [0.0, 0.0, 10.0, 10.0]
    )]
    bounds: Vec<f64>,
    #[arg(long)]
    x_reversed: bool,
    #[arg(long)]
    y_reversed: bool,
}

impl ViewArgs {
    fn viewport(&self) -> Result<Viewport> {
        let &[min_x, min_y, max_x, max_y] = self.bounds.as_slice() else {
            anyhow::bail!("--bounds takes exactly four values");
        };
        let data = DataRect::new(min_x, min_y, max_x, max_y);
        let viewport = Viewport::new(self.width, self.height, data)
            .with_x_reversed(self.x_reversed)
            .with_y_reversed(self.y_reversed);
        viewport.validate()?;
        Ok(viewport)
    }
}

#[derive(Debug, Serialize)]
struct RenderOutput {
    output: String,
    width: i32,
    height: i32,
    tile_width: i32,
    tile_height: i32,
    #[serde(flatten)]
    stats: DrawStats,
}

#[derive(Debug, Serialize)]
struct FrameOutput {
    frame: u64,
    bounds: DataRect,
    #[serde(flatten)]
    stats: DrawStats,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_logging(cli.verbose);

    match &cli.command {
        Commands::Render { view, output } => run_render(&resolve_config(&cli)?, view, output),
        Commands::Pan { view, frames, step_x, step_y } => {
            run_pan(&resolve_config(&cli)?, view, *frames, *step_x, *step_y)
        }
        Commands::Config => {
            let json = serde_json::to_string_pretty(&resolve_config(&cli)?)?;
            println!("{json}");
            Ok(())
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    // Stdout carries the JSON output
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// File, then environment, then command line flags.
fn resolve_config(cli: &Cli) -> Result<CacheConfig> {
    let config = match &cli.config {
        Some(path) => CacheConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => CacheConfig::default(),
    };
    let mut config = config.merge_env().context("invalid TILECACHE_* environment")?;

    if let Some(capacity) = cli.capacity {
        config = config.with_capacity(capacity);
    }
    if let Some(size) = cli.tile_size {
        config = config.with_tile_size(size, size);
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn field_value(x: f64, y: f64) -> f64 {
    x.sin() * y.cos()
}

fn heat_color(value: f64) -> Rgb<u8> {
    let t = ((value + 1.0) / 2.0).clamp(0.0, 1.0);
    let green = 96.0 * (1.0 - (2.0 * t - 1.0).abs());
    Rgb([(255.0 * t) as u8, green as u8, (255.0 * (1.0 - t)) as u8])
}

/// Rasterize the field over one tile, honouring axis reversal
fn render_tile(req: &TileRequest, viewport: &Viewport) -> RgbImage {
    let bounds = req.bounds;
    let (w, h) = (req.pixel_width as u32, req.pixel_height as u32);

    RgbImage::from_fn(w, h, |px, py| {
        let tx = (px as f64 + 0.5) / w as f64;
        let ty = (py as f64 + 0.5) / h as f64;
        let x = if viewport.x_reversed {
            bounds.max_x - tx * bounds.width()
        } else {
            bounds.min_x + tx * bounds.width()
        };
        let y = if viewport.y_reversed {
            bounds.max_y - ty * bounds.height()
        } else {
            bounds.min_y + ty * bounds.height()
        };
        heat_color(field_value(x, y))
    })
}

fn run_render(config: &CacheConfig, view: &ViewArgs, output: &Path) -> Result<()> {
    let viewport = view.viewport()?;
    let compositor: ViewportCompositor<RgbImage> = ViewportCompositor::from_config(config)?;
    let mut canvas = RgbImage::new(viewport.pixel_width as u32, viewport.pixel_height as u32);

    let stats = compositor
        .draw(
            &viewport,
            |req: &TileRequest| Ok::<_, Infallible>(render_tile(req, &viewport)),
            |x, y, tile| imageops::replace(&mut canvas, tile, x as i64, y as i64),
        )
        .context("failed to render viewport")?;

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    canvas
        .save(output)
        .with_context(|| format!("failed to write image to {}", output.display()))?;

    let (tile_width, tile_height) = compositor.tile_size();
    let payload = RenderOutput {
        output: output.display().to_string(),
        width: viewport.pixel_width,
        height: viewport.pixel_height,
        tile_width,
        tile_height,
        stats,
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);

    Ok(())
}

fn run_pan(
    config: &CacheConfig,
    view: &ViewArgs,
    frames: u32,
    step_x: i32,
    step_y: i32,
) -> Result<()> {
    let start = view.viewport()?;
    let compositor: ViewportCompositor<f64> = ViewportCompositor::from_config(config)?;
    let (tile_width, tile_height) = compositor.tile_size();
    let (dx, dy) = (step_x as f64 * tile_width as f64, step_y as f64 * tile_height as f64);

    let (tx, rx) = mpsc::channel();
    let driver = RedrawDriver::spawn(
        compositor,
        |req: &TileRequest| {
            let (cx, cy) = req.bounds.center();
            Ok::<_, Infallible>(field_value(cx, cy))
        },
        |_, _, _| {},
        move |report| {
            let _ = tx.send(report);
        },
    )
    .context("failed to start redraw thread")?;

    let mut results = Vec::with_capacity(frames as usize + 1);
    let mut viewport = start;
    for _ in 0..=frames {
        driver.request_redraw(viewport);
        let report = rx.recv().context("redraw thread stopped")?;
        let stats = report.result.with_context(|| format!("frame {} failed", report.frame))?;
        results.push(FrameOutput { frame: report.frame, bounds: report.viewport.data, stats });
        viewport = viewport.pan_pixels(dx, dy);
    }

    if let Some(compositor) = driver.shutdown() {
        tracing::debug!(hit_rate = compositor.stats().hit_rate(), "pan finished");
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heat_color_extremes() {
        assert_eq!(heat_color(-1.0), Rgb([0, 0, 255]));
        assert_eq!(heat_color(1.0), Rgb([255, 0, 0]));
        assert_eq!(heat_color(5.0), heat_color(1.0));
    }

    #[test]
    fn test_render_tile_matches_request_size() {
        let viewport = Viewport::new(100, 100, DataRect::new(0.0, 0.0, 1.0, 1.0));
        let req = TileRequest {
            key: (0, 0).into(),
            bounds: DataRect::new(0.0, 0.0, 0.5, 0.25),
            pixel_width: 32,
            pixel_height: 16,
        };
        let tile = render_tile(&req, &viewport);
        assert_eq!(tile.dimensions(), (32, 16));
    }

    #[test]
    fn test_render_tile_reversal_mirrors_pixels() {
        let viewport = Viewport::new(100, 100, DataRect::new(0.0, 0.0, 4.0, 4.0));
        let req = TileRequest {
            key: (0, 0).into(),
            bounds: DataRect::new(0.0, 0.0, 4.0, 4.0),
            pixel_width: 8,
            pixel_height: 8,
        };

        let plain = render_tile(&req, &viewport);
        let mirrored = render_tile(&req, &viewport.with_x_reversed(true));
        for y in 0..8 {
            for x in 0..8 {
                let (a, b) = (plain.get_pixel(x, y), mirrored.get_pixel(7 - x, y));
                for channel in 0..3 {
                    let diff = a[channel].abs_diff(b[channel]);
                    assert!(diff <= 1, "pixel ({x}, {y}): {a:?} vs {b:?}");
                }
            }
        }
    }

    #[test]
    fn test_bounds_arity_checked() {
        let view = ViewArgs {
            width: 10,
            height: 10,
            bounds: vec![0.0, 1.0],
            x_reversed: false,
            y_reversed: false,
        };
        assert!(view.viewport().is_err());
    }
}
