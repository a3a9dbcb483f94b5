//! Closing-price chart written as `{ticker}_chart.png`.
//!
//! The image is drawn into a temporary file next to the target and renamed
//! into place once complete, so an aborted run leaves no partial chart.

use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use anyhow::{Context, Result, anyhow};
use plotters::prelude::*;
use plotters::style::{FontStyle, register_font};
use tempfile::Builder;
use tracing::{debug, info, warn};

use crate::market::PriceSeries;

const WIDTH: u32 = 1200;
const HEIGHT: u32 = 600;
const FONT_FAMILY: &str = "sans-serif";

const FONT_CANDIDATES: [&str; 4] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

pub fn chart_filename(ticker: &str) -> String {
    format!("{ticker}_chart.png")
}

/// Renders the close series somewhere the user can look at it.
pub trait ChartRenderer {
    /// Returns the written file, or `None` when nothing was rendered.
    fn render(&self, series: &PriceSeries, out_dir: &Path) -> Result<Option<PathBuf>>;
}

/// Headless runs.
pub struct NoChart;

impl ChartRenderer for NoChart {
    fn render(&self, _series: &PriceSeries, _out_dir: &Path) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}

/// PNG line chart with a marker on the latest close.
#[derive(Default)]
pub struct PngChart;

impl ChartRenderer for PngChart {
    fn render(&self, series: &PriceSeries, out_dir: &Path) -> Result<Option<PathBuf>> {
        fs::create_dir_all(out_dir).context("create chart dir")?;
        let target = out_dir.join(chart_filename(series.symbol()));
        let tmp = Builder::new()
            .prefix(".chart-")
            .suffix(".png")
            .tempfile_in(out_dir)
            .context("create temp chart file")?;

        draw(series, tmp.path(), font_available())?;
        tmp.persist(&target)
            .with_context(|| format!("move chart into {}", target.display()))?;
        info!("wrote {}", target.display());
        Ok(Some(target))
    }
}

/// Registers a TrueType font once per process. Text is skipped without one.
fn font_available() -> bool {
    static LOADED: OnceLock<bool> = OnceLock::new();
    *LOADED.get_or_init(|| {
        let from_env = env::var("CHART_FONT").ok().map(PathBuf::from);
        let candidates = from_env
            .into_iter()
            .chain(FONT_CANDIDATES.iter().map(PathBuf::from));
        for path in candidates {
            let Ok(bytes) = fs::read(&path) else { continue };
            let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
            if register_font(FONT_FAMILY, FontStyle::Normal, bytes).is_ok() {
                debug!("chart font {}", path.display());
                return true;
            }
        }
        warn!("no usable font found (set CHART_FONT); chart will have no labels");
        false
    })
}

fn price_bounds(closes: &[f64]) -> (f64, f64) {
    let lo = closes.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = closes.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let pad = ((hi - lo) * 0.05).max(1.0);
    (lo - pad, hi + pad)
}

fn draw(series: &PriceSeries, path: &Path, with_text: bool) -> Result<()> {
    let closes = series.closes();
    let dates = series.dates();
    let (lo, hi) = price_bounds(&closes);
    let x_max = (closes.len().saturating_sub(1)).max(1) as f64;

    let root = BitMapBackend::new(path, (WIDTH, HEIGHT)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| anyhow!("chart fill: {e}"))?;

    let mut builder = ChartBuilder::on(&root);
    builder.margin(15);
    if with_text {
        builder
            .caption(
                format!("{} Stock Price Chart", series.symbol()),
                (FONT_FAMILY, 24),
            )
            .x_label_area_size(40)
            .y_label_area_size(70);
    }
    let mut chart = builder
        .build_cartesian_2d(0f64..x_max, lo..hi)
        .map_err(|e| anyhow!("chart axes: {e}"))?;

    if with_text {
        let date_label = |x: &f64| {
            dates
                .get(x.round().max(0.0) as usize)
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default()
        };
        chart
            .configure_mesh()
            .x_desc("Date")
            .y_desc("Price")
            .x_labels(8)
            .x_label_formatter(&date_label)
            .y_label_formatter(&|y| format!("{y:.2}"))
            .draw()
            .map_err(|e| anyhow!("chart mesh: {e}"))?;
    }

    let line = chart
        .draw_series(LineSeries::new(
            closes.iter().enumerate().map(|(i, &c)| (i as f64, c)),
            &BLUE,
        ))
        .map_err(|e| anyhow!("chart line: {e}"))?;

    let last_x = closes.len().saturating_sub(1) as f64;
    let last = series.last();
    if with_text {
        line.label("Closing Price")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));

        let note = format!(
            "{}  Closing Price: ${:.2}",
            last.date.format("%Y-%m-%d"),
            last.close
        );
        chart
            .draw_series(std::iter::once(
                EmptyElement::at((last_x, last.close))
                    + Circle::new((0, 0), 4, RED.filled())
                    + Text::new(note, (-260, -20), (FONT_FAMILY, 14).into_font()),
            ))
            .map_err(|e| anyhow!("chart marker: {e}"))?;
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(|e| anyhow!("chart legend: {e}"))?;
    } else {
        chart
            .draw_series(std::iter::once(Circle::new(
                (last_x, last.close),
                4,
                RED.filled(),
            )))
            .map_err(|e| anyhow!("chart marker: {e}"))?;
    }

    root.present().map_err(|e| anyhow!("chart write: {e}"))?;
    Ok(())
}
