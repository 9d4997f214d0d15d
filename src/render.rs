//! # Chart rendering
//!
//! Scatter plots of projected documents and line charts of sweep scores,
//! drawn with plotters into an in-memory bitmap and returned as a PNG data URI.

use std::collections::BTreeSet;
use std::fmt::Display;
use std::io::Cursor;
use std::ops::Range;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::{ImageFormat, RgbImage};
use plotters::prelude::*;

use crate::error::{AnalyticsError, Result};
use crate::projection::Projection;
use crate::topic::OUTLIER;

const OUTLIER_COLOR: RGBColor = RGBColor(160, 160, 160);
const PNG_URI_PREFIX: &str = "data:image/png;base64,";

/// Parallel (topic count, score) sequences for one line chart.
#[derive(Debug, Clone, Copy)]
pub struct ScoreSeries<'a> {
    pub title: &'a str,
    pub metric: &'a str,
    pub topic_counts: &'a [usize],
    pub scores: &'a [f64],
}

/// Produces the image strings placed in a response.
pub trait ChartRenderer: Send + Sync {
    fn scatter(&self, projection: &Projection, title: &str) -> Result<String>;

    fn line(&self, series: &ScoreSeries<'_>) -> Result<String>;
}

/// Renders nothing. For callers that only need the numbers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRenderer;

impl ChartRenderer for NullRenderer {
    fn scatter(&self, _projection: &Projection, _title: &str) -> Result<String> {
        Ok(String::new())
    }

    fn line(&self, _series: &ScoreSeries<'_>) -> Result<String> {
        Ok(String::new())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PlottersRenderer {
    width: u32,
    height: u32,
}

impl Default for PlottersRenderer {
    fn default() -> Self {
        Self { width: 1000, height: 600 }
    }
}

impl PlottersRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn canvas(&self) -> Vec<u8> {
        vec![0u8; self.width as usize * self.height as usize * 3]
    }
}

impl ChartRenderer for PlottersRenderer {
    fn scatter(&self, projection: &Projection, title: &str) -> Result<String> {
        let mut buffer = self.canvas();
        {
            let root = BitMapBackend::with_buffer(&mut buffer, (self.width, self.height)).into_drawing_area();
            root.fill(&WHITE).map_err(render_error)?;

            let xs: Vec<f64> = projection.points.iter().map(|p| p.0).collect();
            let ys: Vec<f64> = projection.points.iter().map(|p| p.1).collect();
            let mut chart = ChartBuilder::on(&root)
                .caption(title, ("sans-serif", 24))
                .margin(15)
                .x_label_area_size(40)
                .y_label_area_size(50)
                .build_cartesian_2d(padded(&xs), padded(&ys))
                .map_err(render_error)?;
            chart
                .configure_mesh()
                .x_desc("Component 1")
                .y_desc("Component 2")
                .draw()
                .map_err(render_error)?;

            let labels: BTreeSet<i64> = projection.labels.iter().copied().collect();
            for label in labels {
                let color = label_color(label);
                let name = if label == OUTLIER { "Outliers".to_string() } else { format!("Topic {}", label + 1) };
                chart
                    .draw_series(
                        projection
                            .points
                            .iter()
                            .zip(&projection.labels)
                            .filter(|&(_, &l)| l == label)
                            .map(|(&(x, y), _)| Circle::new((x, y), 4, color.filled())),
                    )
                    .map_err(render_error)?
                    .label(name)
                    .legend(move |(x, y)| Circle::new((x, y), 4, color.filled()));
            }
            chart
                .configure_series_labels()
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .draw()
                .map_err(render_error)?;
            root.present().map_err(render_error)?;
        }
        encode_png(buffer, self.width, self.height)
    }

    fn line(&self, series: &ScoreSeries<'_>) -> Result<String> {
        if series.topic_counts.len() != series.scores.len() {
            return Err(AnalyticsError::Render(format!(
                "{} topic counts but {} scores",
                series.topic_counts.len(),
                series.scores.len()
            )));
        }
        let points: Vec<(f64, f64)> =
            series.topic_counts.iter().zip(series.scores).map(|(&k, &s)| (k as f64, s)).collect();
        let xs: Vec<f64> = points.iter().map(|p| p.0).collect();

        let mut buffer = self.canvas();
        {
            let root = BitMapBackend::with_buffer(&mut buffer, (self.width, self.height)).into_drawing_area();
            root.fill(&WHITE).map_err(render_error)?;
            let mut chart = ChartBuilder::on(&root)
                .caption(series.title, ("sans-serif", 24))
                .margin(15)
                .x_label_area_size(40)
                .y_label_area_size(60)
                .build_cartesian_2d(padded(&xs), padded(series.scores))
                .map_err(render_error)?;
            chart
                .configure_mesh()
                .x_desc("Number of Topics")
                .y_desc(series.metric)
                .draw()
                .map_err(render_error)?;
            chart
                .draw_series(LineSeries::new(points.iter().copied(), &BLUE))
                .map_err(render_error)?;
            chart
                .draw_series(points.iter().map(|&(x, y)| Circle::new((x, y), 4, BLUE.filled())))
                .map_err(render_error)?;
            root.present().map_err(render_error)?;
        }
        encode_png(buffer, self.width, self.height)
    }
}

/// Wrap an RGB pixel buffer as a PNG data URI.
pub fn encode_png(buffer: Vec<u8>, width: u32, height: u32) -> Result<String> {
    let image = RgbImage::from_raw(width, height, buffer)
        .ok_or_else(|| AnalyticsError::Render("pixel buffer does not match the image size".into()))?;
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(render_error)?;
    Ok(format!("{}{}", PNG_URI_PREFIX, STANDARD.encode(&bytes)))
}

fn render_error<E: Display>(e: E) -> AnalyticsError {
    AnalyticsError::Render(e.to_string())
}

fn label_color(label: i64) -> RGBColor {
    if label == OUTLIER {
        return OUTLIER_COLOR;
    }
    let RGBAColor(r, g, b, _) = Palette99::pick(label as usize).to_rgba();
    RGBColor(r, g, b)
}

/// Value range with 5% headroom; a flat range is widened by one.
fn padded(values: &[f64]) -> Range<f64> {
    let (lo, hi) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return -1.0..1.0;
    }
    if (hi - lo).abs() < f64::EPSILON {
        return (lo - 1.0)..(hi + 1.0);
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad)..(hi + pad)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_png_data_uri() {
        let uri = encode_png(vec![255; 4 * 3 * 3], 4, 3).unwrap();
        let payload = uri.strip_prefix(PNG_URI_PREFIX).unwrap();
        let bytes = STANDARD.decode(payload).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn mismatched_buffer_is_a_render_error() {
        let err = encode_png(vec![0; 5], 4, 3).unwrap_err();
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn null_renderer_returns_empty_images() {
        let projection = Projection { points: vec![(0.0, 0.0)], labels: vec![0] };
        assert_eq!(NullRenderer.scatter(&projection, "t").unwrap(), "");
        let series = ScoreSeries { title: "t", metric: "Coherence", topic_counts: &[1], scores: &[0.5] };
        assert_eq!(NullRenderer.line(&series).unwrap(), "");
    }

    #[test]
    fn ranges_are_padded() {
        assert_eq!(padded(&[2.0, 2.0]), 1.0..3.0);
        assert_eq!(padded(&[]), -1.0..1.0);
        let r = padded(&[0.0, 10.0]);
        assert!(r.start < 0.0 && r.end > 10.0);
    }

    #[test]
    fn outliers_are_grey() {
        assert_eq!(label_color(OUTLIER), OUTLIER_COLOR);
        assert_ne!(label_color(0), label_color(1));
    }

    fn png_bytes(uri: &str) -> Vec<u8> {
        let payload = uri.strip_prefix(PNG_URI_PREFIX).expect("png data uri");
        STANDARD.decode(payload).unwrap()
    }

    #[test]
    fn scatter_renders_a_png_data_uri() {
        let projection = Projection {
            points: vec![(-1.0, 0.5), (0.2, -0.3), (1.4, 0.9), (0.0, 0.0)],
            labels: vec![0, 1, 1, OUTLIER],
        };
        let uri = PlottersRenderer::new(320, 240).scatter(&projection, "LDA Document Clusters").unwrap();
        let bytes = png_bytes(&uri);
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
        let image = image::load_from_memory_with_format(&bytes, ImageFormat::Png).unwrap();
        assert_eq!((image.width(), image.height()), (320, 240));
    }

    #[test]
    fn line_renders_a_png_data_uri() {
        let series = ScoreSeries {
            title: "Coherence Score vs. Number of Topics",
            metric: "Coherence Score",
            topic_counts: &[2, 3, 4],
            scores: &[0.41, 0.47, 0.44],
        };
        let uri = PlottersRenderer::default().line(&series).unwrap();
        let bytes = png_bytes(&uri);
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
        let image = image::load_from_memory_with_format(&bytes, ImageFormat::Png).unwrap();
        assert_eq!((image.width(), image.height()), (1000, 600));
    }

    #[test]
    fn mismatched_series_is_rejected() {
        let series = ScoreSeries { title: "t", metric: "SSE", topic_counts: &[1, 2], scores: &[0.5] };
        assert!(PlottersRenderer::new(10, 10).line(&series).is_err());
    }
}
