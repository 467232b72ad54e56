// src/visualizer.rs
use crate::acquisition::Readings;
use eframe::egui;
use egui::{Color32, Rect, Rounding, Stroke, Vec2};

pub struct ReadingLabels<'a> {
    pub current: &'a str,
    pub max: &'a str,
    pub min: &'a str,
    pub mean: &'a str,
    pub count: &'a str,
    pub unit: &'a str,
}

fn fmt_value(v: Option<f64>, unit: &str) -> String {
    match v {
        Some(v) => format!("{v:.1} {unit}"),
        None => "—".to_owned(),
    }
}

/// Current / max / min / mean / count of the running test.
pub fn readings_table(ui: &mut egui::Ui, readings: &Readings, labels: &ReadingLabels) {
    egui::Grid::new("readings_table")
        .num_columns(2)
        .striped(true)
        .spacing([24.0, 6.0])
        .show(ui, |ui| {
            ui.label(labels.current);
            ui.label(
                egui::RichText::new(fmt_value(readings.current, labels.unit))
                    .strong()
                    .size(18.0),
            );
            ui.end_row();

            ui.label(labels.max);
            ui.label(egui::RichText::new(fmt_value(readings.max, labels.unit)).strong());
            ui.end_row();

            ui.label(labels.min);
            ui.label(fmt_value(readings.min, labels.unit));
            ui.end_row();

            ui.label(labels.mean);
            ui.label(fmt_value(readings.mean(), labels.unit));
            ui.end_row();

            ui.label(labels.count);
            ui.label(readings.count.to_string());
            ui.end_row();
        });
}

/// Horizontal bar of the current load with a marker at the run maximum.
pub fn draw_load_gauge(ui: &mut egui::Ui, readings: &Readings, dark: bool) {
    let track_color = if dark {
        Color32::from_rgb(60, 60, 65)
    } else {
        Color32::from_rgb(225, 225, 230)
    };
    let fill_color = Color32::from_rgb(40, 90, 200);
    let max_color = Color32::from_rgb(200, 50, 50);

    let width = ui.available_width().clamp(120.0, 320.0);
    let (response, painter) = ui.allocate_painter(Vec2::new(width, 22.0), egui::Sense::hover());
    let rect = response.rect;
    painter.rect_filled(rect, Rounding::same(4.0), track_color);

    let full_scale = readings.max.map(f64::abs).unwrap_or(0.0).max(1.0) * 1.2;
    let frac = |v: f64| ((v / full_scale).clamp(0.0, 1.0)) as f32;

    if let Some(current) = readings.current {
        let bar = Rect::from_min_size(rect.min, Vec2::new(rect.width() * frac(current), rect.height()));
        painter.rect_filled(bar, Rounding::same(4.0), fill_color);
    }
    if let Some(max) = readings.max {
        let x = rect.left() + rect.width() * frac(max);
        painter.line_segment(
            [egui::pos2(x, rect.top()), egui::pos2(x, rect.bottom())],
            Stroke::new(2.0, max_color),
        );
    }
    painter.rect_stroke(rect, Rounding::same(4.0), Stroke::new(1.0, Color32::GRAY));
}
