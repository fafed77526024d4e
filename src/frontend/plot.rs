//! Voltage chart using egui_plot
//!
//! Draws one line series from the snapshot returned by
//! `AcquisitionController::current_samples`. X is the sample tick, Y the
//! decoded voltage. While following, the view tracks the newest sample.

use crate::config::UiConfig;
use crate::types::Sample;
use egui::{Color32, Ui};
use egui_plot::{Corner, Legend, Line, Plot, PlotBounds, PlotPoints};

/// Chart settings and interaction state
#[derive(Debug, Clone)]
pub struct PlotView {
    pub show_grid: bool,
    pub line_width: f32,
    /// Track the newest sample; dragging the chart turns this off
    pub follow_latest: bool,
    /// Ticks shown while following (the buffer capacity)
    pub window: u64,
    pub color: Color32,
}

impl Default for PlotView {
    fn default() -> Self {
        Self {
            show_grid: true,
            line_width: 1.5,
            follow_latest: true,
            window: crate::backend::DEFAULT_BUFFER_CAPACITY as u64,
            color: Color32::from_rgb(80, 200, 120),
        }
    }
}

impl PlotView {
    pub fn from_config(config: &UiConfig, window: usize) -> Self {
        Self {
            line_width: config.line_width,
            window: window.max(1) as u64,
            ..Default::default()
        }
    }

    /// Draw `samples`, labelled with the port they came from
    pub fn render(&mut self, ui: &mut Ui, samples: &[Sample], series_name: &str) {
        let follow = self.follow_latest;
        let bounds = follow_bounds(samples, self.window);

        let response = Plot::new("voltage_plot")
            .allow_zoom(!follow)
            .allow_drag(true)
            .allow_scroll(!follow)
            .show_axes(true)
            .show_grid(self.show_grid)
            .x_axis_label("Time")
            .y_axis_label("Voltage")
            .legend(Legend::default().position(Corner::RightTop))
            .show(ui, |plot_ui| {
                if follow {
                    if let Some(bounds) = bounds {
                        plot_ui.set_plot_bounds(bounds);
                    }
                }

                if samples.is_empty() {
                    return;
                }
                let points: PlotPoints = samples.iter().map(Sample::as_plot_point).collect();
                let line = Line::new(series_name, points)
                    .color(self.color)
                    .width(self.line_width);
                plot_ui.line(line);
            });

        if response.response.dragged() {
            self.follow_latest = false;
        }
        if response.response.double_clicked() {
            self.follow_latest = true;
        }
    }
}

/// Bounds showing the last `window` ticks, Y padded around the data
fn follow_bounds(samples: &[Sample], window: u64) -> Option<PlotBounds> {
    let last = samples.last()?;
    let x_max = last.tick as f64;
    let x_min = last.tick.saturating_sub(window.saturating_sub(1)) as f64;
    let (y_min, y_max) = y_range(samples);
    Some(PlotBounds::from_min_max([x_min, y_min], [x_max.max(x_min + 1.0), y_max]))
}

/// Y extent of the samples plus 10% padding; (-1, 1) when empty
fn y_range(samples: &[Sample]) -> (f64, f64) {
    let mut y_min = f64::MAX;
    let mut y_max = f64::MIN;
    for sample in samples {
        y_min = y_min.min(sample.value);
        y_max = y_max.max(sample.value);
    }

    if y_min <= y_max {
        let range = y_max - y_min;
        let padding = if range > 0.0 { range * 0.1 } else { 1.0 };
        (y_min - padding, y_max + padding)
    } else {
        (-1.0, 1.0)
    }
}
