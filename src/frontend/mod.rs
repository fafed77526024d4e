//! Desktop shell built on eframe/egui
//!
//! The shell owns no acquisition logic. Every frame it drains the status
//! channel, lets the controller service its session, and draws the latest
//! sample snapshot.
//!
//! # Layout
//!
//! - Menu bar with the **Port** menu (one radio item per port, Refresh,
//!   Disconnect) and a **View** menu
//! - Central voltage chart ([`PlotView`])
//! - Bottom status bar ([`render_status_bar`])

mod plot;
mod status_bar;

pub use plot::PlotView;
pub use status_bar::{render_status_bar, StatusBarContext};

use crate::backend::{AcquisitionController, StatusReceiver};
use crate::config::{AppConfig, AppState};
use crate::types::{AcquisitionState, PortId, StatusReport};
use chrono::{DateTime, Local};
use std::time::Duration;

/// Main application state implementing [`eframe::App`]
pub struct ScopeApp {
    controller: AcquisitionController,
    status: StatusReceiver,
    config: AppConfig,
    app_state: AppState,
    ports: Vec<PortId>,
    plot: PlotView,
    last_report: Option<(DateTime<Local>, StatusReport)>,
}

impl ScopeApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        controller: AcquisitionController,
        status: StatusReceiver,
        config: AppConfig,
        app_state: AppState,
    ) -> Self {
        apply_theme(&cc.egui_ctx, config.ui.dark_mode);

        let ports = controller.list_ports();
        if let Some(port) = app_state.restorable_port(&ports) {
            tracing::info!("Restoring last port {}", port);
            controller.select_port(port.clone());
        }

        let plot = PlotView::from_config(&config.ui, controller.buffer_capacity());
        Self {
            controller,
            status,
            config,
            app_state,
            ports,
            plot,
            last_report: None,
        }
    }

    fn process_status(&mut self) -> bool {
        let reports = self.status.drain();
        let had_reports = !reports.is_empty();
        for report in reports {
            tracing::trace!("status: {}", report);
            self.last_report = Some((Local::now(), report));
        }
        had_reports
    }

    fn refresh_ports(&mut self) {
        self.ports = self.controller.list_ports();
        tracing::debug!("Port list refreshed: {:?}", self.ports);
    }

    fn render_menu(&mut self, ui: &mut egui::Ui) {
        egui::MenuBar::new().ui(ui, |ui| {
            ui.menu_button("Port", |ui| {
                let active = self.controller.active_port();
                if self.ports.is_empty() {
                    ui.label("No ports found");
                }
                for port in self.ports.clone() {
                    let selected = active.as_ref() == Some(&port);
                    if ui.radio(selected, port.as_str()).clicked() {
                        self.plot.follow_latest = true;
                        self.controller.select_port(port);
                        ui.close();
                    }
                }

                ui.separator();
                if ui.button("Refresh").clicked() {
                    self.refresh_ports();
                    ui.close();
                }
                let connected = self.controller.state() != AcquisitionState::Idle;
                if ui
                    .add_enabled(connected, egui::Button::new("Disconnect"))
                    .clicked()
                {
                    self.controller.stop();
                    ui.close();
                }
            });

            ui.menu_button("View", |ui| {
                if ui
                    .checkbox(&mut self.config.ui.dark_mode, "Dark mode")
                    .changed()
                {
                    apply_theme(ui.ctx(), self.config.ui.dark_mode);
                }
                ui.checkbox(&mut self.plot.follow_latest, "Follow latest");
                ui.checkbox(&mut self.plot.show_grid, "Grid");
            });

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.label(self.config.port.to_string());
            });
        });
    }
}

fn apply_theme(ctx: &egui::Context, dark_mode: bool) {
    if dark_mode {
        ctx.set_visuals(egui::Visuals::dark());
    } else {
        ctx.set_visuals(egui::Visuals::light());
    }
}

impl eframe::App for ScopeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.controller.service();
        let had_reports = self.process_status();

        if had_reports {
            ctx.request_repaint();
        } else {
            ctx.request_repaint_after(Duration::from_millis(self.config.ui.repaint_ms));
        }

        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            self.render_menu(ui);
        });

        let port = self.controller.active_port();
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            render_status_bar(
                ui,
                &StatusBarContext {
                    state: self.controller.state(),
                    port: port.as_ref(),
                    stats: self.controller.stats(),
                    latest: self.controller.latest_sample(),
                    last_report: self.last_report.as_ref().map(|(at, report)| (at, report)),
                },
            );
        });

        let samples = self.controller.current_samples();
        let series_name = port
            .as_ref()
            .map(PortId::to_string)
            .unwrap_or_else(|| "Voltage".to_string());
        egui::CentralPanel::default().show(ctx, |ui| {
            self.plot.render(ui, &samples, &series_name);
        });
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.app_state.last_port = self.controller.active_port();
        self.controller.stop();

        if let Err(e) = self.app_state.save() {
            tracing::warn!("Failed to save app state: {}", e);
        }
    }
}
