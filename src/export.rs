// src/export.rs
use crate::acquisition::Series;
use crate::error::{TenzoError, TenzoResult};
use chrono::Local;
use plotters::prelude::*;
use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub size: (u32, u32),
    pub caption: String,
    pub x_label: String,
    pub y_label: String,
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            size: (1000, 500),
            caption: "Tribometer run".to_owned(),
            x_label: "Time, s".to_owned(),
            y_label: "Load on sensor, g".to_owned(),
        }
    }
}

fn render_err(e: impl std::fmt::Display) -> TenzoError {
    TenzoError::Render(e.to_string())
}

/// Value range for the y axis with a 10% margin; flat series get a fixed band.
fn y_range(series: &Series) -> (f64, f64) {
    let (min, max) = series
        .values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    if max - min < f64::EPSILON {
        return (min - 1.0, max + 1.0);
    }
    let margin = (max - min) * 0.1;
    (min - margin, max + margin)
}

/// Renders the run as a line chart and returns PNG bytes.
pub fn render_series_png(series: &Series, style: &PlotStyle) -> TenzoResult<Vec<u8>> {
    if series.is_empty() {
        return Err(TenzoError::NothingToExport);
    }
    let (w, h) = style.size;
    let mut rgb = vec![0u8; w as usize * h as usize * 3];
    {
        let root = BitMapBackend::with_buffer(&mut rgb, (w, h)).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        let (y_min, y_max) = y_range(series);
        let x_max = series.time_span().max(1.0);
        let mut chart = ChartBuilder::on(&root)
            .caption(&style.caption, ("sans-serif", 22).into_font())
            .margin(12)
            .x_label_area_size(40)
            .y_label_area_size(70)
            .build_cartesian_2d(0f64..x_max, y_min..y_max)
            .map_err(render_err)?;

        chart
            .configure_mesh()
            .x_desc(style.x_label.as_str())
            .y_desc(style.y_label.as_str())
            .axis_desc_style(("sans-serif", 16))
            .draw()
            .map_err(render_err)?;

        chart
            .draw_series(LineSeries::new(series.points().map(|[t, v]| (t, v)), &BLACK))
            .map_err(render_err)?;

        root.present().map_err(render_err)?;
    }

    let img = image::RgbImage::from_raw(w, h, rgb)
        .ok_or_else(|| TenzoError::Render("pixel buffer size mismatch".to_owned()))?;
    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(render_err)?;
    Ok(png)
}

/// Writes `time_s,load_g` rows, one per sample.
pub fn write_csv<W: io::Write>(writer: W, series: &Series) -> TenzoResult<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["time_s", "load_g"])?;
    for [t, v] in series.points() {
        wtr.write_record([format!("{t:.3}"), format!("{v:.3}")])?;
    }
    wtr.flush()?;
    Ok(())
}

fn timestamped(dir: &Path, ext: &str) -> TenzoResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let ts = Local::now().format("%Y-%m-%d_%H-%M-%S");
    Ok(dir.join(format!("run_{ts}.{ext}")))
}

pub fn save_csv(dir: &Path, series: &Series) -> TenzoResult<PathBuf> {
    if series.is_empty() {
        return Err(TenzoError::NothingToExport);
    }
    let path = timestamped(dir, "csv")?;
    let file = fs::File::create(&path)?;
    write_csv(file, series)?;
    log::info!("CSV exported to {}", path.display());
    Ok(path)
}

pub fn save_png(dir: &Path, series: &Series, style: &PlotStyle) -> TenzoResult<PathBuf> {
    let png = render_series_png(series, style)?;
    let path = timestamped(dir, "png")?;
    fs::write(&path, png)?;
    log::info!("plot saved to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: &[f64]) -> Series {
        let mut s = Series::default();
        for (i, v) in values.iter().enumerate() {
            s.push(i as f64 * 0.1, *v);
        }
        s
    }

    #[test]
    fn csv_has_header_and_rows() {
        let mut out = Vec::new();
        write_csv(&mut out, &series(&[125.0, 70.5])).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "time_s,load_g\n0.000,125.000\n0.100,70.500\n");
    }

    #[test]
    fn save_csv_creates_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("exports");
        let path = save_csv(&target, &series(&[1.0])).unwrap();
        assert!(path.starts_with(&target));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("csv"));
        let text = fs::read_to_string(path).unwrap();
        assert!(text.starts_with("time_s,load_g\n"));
    }

    #[test]
    fn empty_series_is_not_exported() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            save_csv(dir.path(), &Series::default()),
            Err(TenzoError::NothingToExport)
        ));
        assert!(matches!(
            save_png(dir.path(), &Series::default(), &PlotStyle::default()),
            Err(TenzoError::NothingToExport)
        ));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn png_has_the_requested_size() {
        let style = PlotStyle {
            size: (320, 200),
            ..PlotStyle::default()
        };
        let png = render_series_png(&series(&[0.0, 12.5, 30.0, 28.0]), &style).unwrap();
        assert_eq!(
            image::guess_format(&png).unwrap(),
            image::ImageFormat::Png
        );
        let img = image::load_from_memory(&png).unwrap();
        assert_eq!((img.width(), img.height()), (320, 200));
    }

    #[test]
    fn save_png_writes_a_readable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_png(dir.path(), &series(&[1.0, 2.0]), &PlotStyle::default()).unwrap();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("png"));
        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), PlotStyle::default().size);
    }

    #[test]
    fn y_range_pads_flat_and_spread_series() {
        assert_eq!(y_range(&series(&[5.0, 5.0])), (4.0, 6.0));
        let (lo, hi) = y_range(&series(&[0.0, 10.0]));
        assert!((lo + 1.0).abs() < 1e-9 && (hi - 11.0).abs() < 1e-9);
    }
}
