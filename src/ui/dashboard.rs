use std::path::PathBuf;
use std::sync::Arc;

use chrono::Datelike;
use egui::{Align, Color32, Frame, Layout, Margin, RichText, ScrollArea, Ui};
use egui_dropdown::DropDownBox;
use itertools::Itertools;
use log::{error, info, warn};

use super::view::SessionView;
use super::worker::{LoadRequest, LoadResult, LoadWorker};
use super::{PALETTE_ORANGE, dashboard_visuals, panels};
use crate::cache::SessionStore;
use crate::config::{AppConfig, LastSelection};
use crate::loader::SessionLoader;
use crate::provider::SessionProvider;
use crate::session::{EventInfo, SessionKey, SessionKind};

const FIRST_SEASON: i32 = 2023;

/// What the dashboard loads as soon as it opens
pub enum Startup {
    Nothing,
    Session(SessionKey),
    File(PathBuf),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Tab {
    Overview,
    Pace,
    Telemetry,
    Strategy,
}

impl Tab {
    const ALL: [Tab; 4] = [Tab::Overview, Tab::Pace, Tab::Telemetry, Tab::Strategy];

    fn label(&self) -> &'static str {
        match self {
            Tab::Overview => "Overview",
            Tab::Pace => "Pace",
            Tab::Telemetry => "Telemetry",
            Tab::Strategy => "Strategy",
        }
    }
}

enum UiState {
    Idle,
    Loading,
    Error { message: String },
    Display(Box<SessionView>),
}

pub struct DashboardApp<P, S> {
    config: AppConfig,
    worker: LoadWorker<P, S>,
    state: UiState,
    tab: Tab,
    year: i32,
    events_year: Option<i32>,
    events: Vec<EventInfo>,
    events_error: Option<String>,
    selected_event: String,
    selected_kind: String,
    driver_a: String,
    driver_b: String,
}

fn non_empty(value: &str) -> Option<&str> {
    Some(value.trim()).filter(|v| !v.is_empty())
}

impl<P, S> DashboardApp<P, S>
where
    P: SessionProvider + 'static,
    S: SessionStore + 'static,
{
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        loader: Arc<SessionLoader<P, S>>,
        config: AppConfig,
        startup: Startup,
    ) -> Self {
        cc.egui_ctx.set_visuals(dashboard_visuals());

        let last = config.last_selection.clone();
        let mut app = Self {
            worker: LoadWorker::new(loader),
            state: UiState::Idle,
            tab: Tab::Overview,
            year: last
                .as_ref()
                .map(|l| l.year)
                .unwrap_or_else(|| chrono::Local::now().year()),
            events_year: None,
            events: Vec::new(),
            events_error: None,
            selected_event: last.as_ref().map(|l| l.event.clone()).unwrap_or_default(),
            selected_kind: last
                .as_ref()
                .map(|l| l.session)
                .unwrap_or(SessionKind::Race)
                .code()
                .to_string(),
            driver_a: last
                .as_ref()
                .and_then(|l| l.driver_a.clone())
                .unwrap_or_default(),
            driver_b: last
                .as_ref()
                .and_then(|l| l.driver_b.clone())
                .unwrap_or_default(),
            config,
        };

        match startup {
            Startup::Nothing => {}
            Startup::Session(key) => {
                app.year = key.year;
                app.selected_event = key.event.clone();
                app.selected_kind = key.kind.code().to_string();
                app.request(LoadRequest::Session(key), &cc.egui_ctx);
            }
            Startup::File(path) => app.request(LoadRequest::File(path), &cc.egui_ctx),
        }
        app
    }

    fn request(&mut self, request: LoadRequest, ctx: &egui::Context) {
        if !matches!(request, LoadRequest::Events(_)) {
            self.state = UiState::Loading;
        }
        self.worker.submit(request, ctx);
    }

    fn selected_key(&self) -> Result<SessionKey, String> {
        let event = non_empty(&self.selected_event).ok_or("Pick an event first")?;
        let kind: SessionKind = self.selected_kind.parse().map_err(|e| format!("{}", e))?;
        Ok(SessionKey::new(self.year, event, kind))
    }

    fn handle_results(&mut self) {
        for result in self.worker.poll() {
            match result {
                LoadResult::Session(Ok(session)) => {
                    info!("Showing {}", session.key);
                    self.year = session.key.year;
                    self.selected_event = session.key.event.clone();
                    self.selected_kind = session.key.kind.code().to_string();
                    let view = SessionView::build(
                        session,
                        non_empty(&self.driver_a),
                        non_empty(&self.driver_b),
                        &self.config,
                    );
                    self.show_view(view);
                }
                LoadResult::Session(Err(e)) => {
                    self.state = UiState::Error {
                        message: e.to_string(),
                    };
                }
                LoadResult::Events { year, events } => {
                    if year != self.year {
                        continue;
                    }
                    match events {
                        Ok(events) => {
                            self.events = events;
                            self.events_error = None;
                        }
                        Err(e) => {
                            warn!("Could not list events for {}: {}", year, e);
                            self.events.clear();
                            self.events_error = Some(e.to_string());
                        }
                    }
                }
            }
        }
    }

    fn show_view(&mut self, view: SessionView) {
        self.driver_a = view.driver_a.clone().unwrap_or_default();
        self.driver_b = view.driver_b.clone().unwrap_or_default();
        self.state = UiState::Display(Box::new(view));
    }

    fn show_selectors(&mut self, ui: &mut Ui) {
        let ctx = ui.ctx().clone();
        ui.with_layout(Layout::left_to_right(Align::Center), |ui| {
            ui.label(RichText::new("Season: ").color(Color32::WHITE));
            ui.add(
                egui::DragValue::new(&mut self.year)
                    .range(FIRST_SEASON..=chrono::Local::now().year()),
            );
            if self.events_year != Some(self.year) {
                self.events_year = Some(self.year);
                self.events.clear();
                self.worker.submit(LoadRequest::Events(self.year), &ctx);
            }

            ui.separator();
            ui.label(RichText::new("Event: ").color(Color32::WHITE));
            let events = self.events.iter().map(|e| e.name.as_str()).collect_vec();
            ui.add(
                DropDownBox::from_iter(
                    events,
                    "event_dropbox",
                    &mut self.selected_event,
                    |ui, text| ui.selectable_label(false, text),
                )
                .filter_by_input(false),
            );
            if let Some(message) = &self.events_error {
                ui.label(RichText::new("⚠").color(PALETTE_ORANGE))
                    .on_hover_text(message);
            }

            ui.separator();
            ui.label(RichText::new("Session: ").color(Color32::WHITE));
            ui.add(
                DropDownBox::from_iter(
                    SessionKind::ALL.iter().map(|k| k.code()),
                    "session_dropbox",
                    &mut self.selected_kind,
                    |ui, text| ui.selectable_label(false, text),
                )
                .filter_by_input(false),
            );

            ui.separator();
            let busy = self.worker.is_busy();
            if ui.add_enabled(!busy, egui::Button::new("Load")).clicked() {
                match self.selected_key() {
                    Ok(key) => self.request(LoadRequest::Session(key), &ctx),
                    Err(message) => self.state = UiState::Error { message },
                }
            }
            if ui
                .add_enabled(!busy, egui::Button::new("⟳ Refresh"))
                .on_hover_text("Fetch again, ignoring the cache")
                .clicked()
            {
                match self.selected_key() {
                    Ok(key) => self.request(LoadRequest::Refresh(key), &ctx),
                    Err(message) => self.state = UiState::Error { message },
                }
            }
            if ui.add_enabled(!busy, egui::Button::new("📂 Open file")).clicked()
                && let Some(path) = rfd::FileDialog::new()
                    .add_filter("Session", &["jsonl"])
                    .pick_file()
            {
                self.request(LoadRequest::File(path), &ctx);
            }
        });
    }

    fn show_driver_selectors(&mut self, ui: &mut Ui) {
        let UiState::Display(view) = &self.state else {
            return;
        };
        let codes = view.session.driver_codes();
        ui.with_layout(Layout::left_to_right(Align::Center), |ui| {
            ui.label(RichText::new("Driver A: ").color(Color32::WHITE));
            ui.add(
                DropDownBox::from_iter(
                    codes.iter().map(String::as_str),
                    "driver_a_dropbox",
                    &mut self.driver_a,
                    |ui, text| ui.selectable_label(false, text),
                )
                .filter_by_input(false),
            );
            ui.label(RichText::new("Driver B: ").color(Color32::WHITE));
            ui.add(
                DropDownBox::from_iter(
                    codes.iter().map(String::as_str),
                    "driver_b_dropbox",
                    &mut self.driver_b,
                    |ui, text| ui.selectable_label(false, text),
                )
                .filter_by_input(false),
            );
            ui.separator();
            for tab in Tab::ALL {
                ui.selectable_value(&mut self.tab, tab, tab.label());
            }
        });

        let changed = view.driver_a.as_deref() != Some(self.driver_a.as_str())
            || view.driver_b.as_deref() != Some(self.driver_b.as_str());
        let valid = codes.contains(&self.driver_a) && codes.contains(&self.driver_b);
        if changed && valid {
            let session = view.session.clone();
            let view = SessionView::build(
                session,
                Some(&self.driver_a),
                Some(&self.driver_b),
                &self.config,
            );
            self.show_view(view);
        }
    }

    fn remember_selection(&mut self) {
        if let UiState::Display(view) = &self.state {
            let key = &view.session.key;
            self.config.last_selection = Some(LastSelection {
                year: key.year,
                event: key.event.clone(),
                session: key.kind,
                driver_a: view.driver_a.clone(),
                driver_b: view.driver_b.clone(),
            });
        }
    }
}

impl<P, S> eframe::App for DashboardApp<P, S>
where
    P: SessionProvider + 'static,
    S: SessionStore + 'static,
{
    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.remember_selection();
        if let Err(e) = self.config.save() {
            error!("Error while saving config file: {}", e);
        }
    }

    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_results();

        egui::TopBottomPanel::top("session_selector")
            .frame(Frame::default().inner_margin(Margin::same(5)))
            .resizable(false)
            .show(ctx, |ui| {
                self.show_selectors(ui);
                self.show_driver_selectors(ui);
            });

        egui::CentralPanel::default().show(ctx, |ui| match &self.state {
            UiState::Idle => {
                ui.centered_and_justified(|ui| {
                    ui.label("Pick a season, event and session, then press Load");
                });
            }
            UiState::Loading => {
                ui.centered_and_justified(|ui| {
                    ui.spinner();
                });
            }
            UiState::Error { message } => {
                ui.heading(RichText::new(message).color(Color32::RED).strong());
            }
            UiState::Display(view) => {
                ScrollArea::vertical().show(ui, |ui| match self.tab {
                    Tab::Overview => panels::overview(ui, view),
                    Tab::Pace => panels::pace(ui, view),
                    Tab::Telemetry => panels::telemetry(ui, view),
                    Tab::Strategy => panels::strategy(ui, view),
                });
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty("  "), None);
        assert_eq!(non_empty(" VER "), Some("VER"));
    }

    #[test]
    fn test_tab_labels_are_unique() {
        let labels = Tab::ALL.iter().map(|t| t.label()).unique().count();
        assert_eq!(labels, Tab::ALL.len());
    }
}
