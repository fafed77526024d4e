//! Status bar panel: bottom bar showing connection state, stats and the latest message.

use chrono::{DateTime, Local};
use egui::{Color32, RichText, Ui};

use crate::types::{AcquisitionState, PortId, Sample, StatsSnapshot, StatusLevel, StatusReport};

/// Context needed to render the status bar.
pub struct StatusBarContext<'a> {
    pub state: AcquisitionState,
    pub port: Option<&'a PortId>,
    pub stats: StatsSnapshot,
    pub latest: Option<Sample>,
    /// Latest status message and when it arrived
    pub last_report: Option<(&'a DateTime<Local>, &'a StatusReport)>,
}

fn state_color(state: AcquisitionState) -> Color32 {
    match state {
        AcquisitionState::Streaming => Color32::GREEN,
        AcquisitionState::Connecting | AcquisitionState::Stopping => Color32::YELLOW,
        AcquisitionState::Idle => Color32::GRAY,
        AcquisitionState::Failed => Color32::RED,
    }
}

fn level_color(level: StatusLevel) -> Color32 {
    match level {
        StatusLevel::Info => Color32::LIGHT_GRAY,
        StatusLevel::Warning => Color32::YELLOW,
        StatusLevel::Error => Color32::LIGHT_RED,
    }
}

/// Human-readable byte count
fn format_bytes(bytes: u64) -> String {
    let kb = bytes as f64 / 1024.0;
    if kb > 1024.0 {
        format!("{:.2} MB", kb / 1024.0)
    } else {
        format!("{:.2} KB", kb)
    }
}

/// Render the status bar.
pub fn render_status_bar(ui: &mut Ui, ctx: &StatusBarContext<'_>) {
    ui.horizontal(|ui| {
        ui.spacing_mut().item_spacing.x = 8.0;

        ui.colored_label(state_color(ctx.state), "●");
        let label = match ctx.port {
            Some(port) => format!("{}: {}", ctx.state, port),
            None => ctx.state.to_string(),
        };
        ui.label(RichText::new(label).small());

        ui.separator();

        let value = ctx
            .latest
            .map(|s| format!("{:.3} V", s.value))
            .unwrap_or_else(|| "-".to_string());
        ui.label(RichText::new(format!("Last: {}", value)).small());

        ui.separator();

        ui.label(RichText::new(format!("Samples: {}", ctx.stats.samples)).small());

        ui.separator();

        let error_color = if ctx.stats.decode_errors > 0 {
            Color32::LIGHT_RED
        } else {
            Color32::GRAY
        };
        ui.colored_label(
            error_color,
            RichText::new(format!("Bad frames: {}", ctx.stats.decode_errors)).small(),
        );

        ui.separator();

        ui.label(RichText::new(format!("Data: {}", format_bytes(ctx.stats.bytes))).small());

        if let Some((at, report)) = ctx.last_report {
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.colored_label(
                    level_color(report.level()),
                    RichText::new(format!("{} {}", at.format("%H:%M:%S"), report)).small(),
                );
            });
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "0.50 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn test_state_colors() {
        assert_eq!(state_color(AcquisitionState::Streaming), Color32::GREEN);
        assert_eq!(state_color(AcquisitionState::Failed), Color32::RED);
        assert_eq!(level_color(StatusLevel::Error), Color32::LIGHT_RED);
    }
}
