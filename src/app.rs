//! quick-ai window: egui/eframe application.
//!
//! # Architecture
//!
//! [`QuickAiApp`] is the top-level [`eframe::App`].  It owns all UI state and
//! two channel endpoints:
//!
//! * `command_tx`: sends [`PipelineCommand`] to the pipeline orchestrator.
//! * `result_rx` : receives [`PipelineResult`] from the orchestrator; drained
//!   with `try_recv` every frame.
//!
//! # Views
//!
//! | View | Shows |
//! |------|-------|
//! | `Idle` | Run panel: query, field, preset, Run |
//! | `Running` | Spinner, waiting hint, Stop |
//! | `Result` | Chosen values and every prompt/response, Copy, Copy HTML, Close |
//! | `Error` | Failure message, Close |
//!
//! The settings panel is a side panel toggled from the top bar.  Connection
//! edits (provider, key, base URL) are handed to the orchestrator with
//! `ApplySettings` before every model refresh and on Save.

use std::path::PathBuf;
use std::time::Duration;

use eframe::egui;
use tokio::sync::mpsc;

use crate::config::{AppConfig, LlmProvider, PromptConfig};
use crate::pipeline::{PipelineCommand, PipelineResult, RunRequest};
use crate::present::{self, Transcript};
use crate::speech::KNOWN_VOICES;

const WAITING_HINT: &str = "It may take seconds for AI to generate contents";

const HEADING: egui::Color32 = egui::Color32::from_rgb(60, 170, 90);
const ERROR: egui::Color32 = egui::Color32::from_rgb(255, 136, 68);
const DIM: egui::Color32 = egui::Color32::from_rgb(140, 140, 140);

// ---------------------------------------------------------------------------
// Shortcut parsing
// ---------------------------------------------------------------------------

/// Parse `"Ctrl+Shift+A"` style text into an egui shortcut.
///
/// Modifier names are case-insensitive (`Ctrl`, `Control`, `Cmd`, `Command`,
/// `Shift`, `Alt`, `Option`); the final part must be an egui key name.
pub fn parse_shortcut(text: &str) -> Option<egui::KeyboardShortcut> {
    let mut modifiers = egui::Modifiers::NONE;
    let mut key = None;

    for part in text.split('+').map(str::trim) {
        if key.is_some() {
            // The key must be the last part.
            return None;
        }
        match part.to_ascii_lowercase().as_str() {
            "ctrl" | "control" => modifiers = modifiers | egui::Modifiers::CTRL,
            "cmd" | "command" => modifiers = modifiers | egui::Modifiers::COMMAND,
            "shift" => modifiers = modifiers | egui::Modifiers::SHIFT,
            "alt" | "option" => modifiers = modifiers | egui::Modifiers::ALT,
            "" => return None,
            _ => key = Some(key_from_name(part)?),
        }
    }

    key.map(|k| egui::KeyboardShortcut::new(modifiers, k))
}

/// egui key names are capitalised (`A`, `F5`, `Enter`, `PageUp`); accept any
/// case for the common ones.
fn key_from_name(name: &str) -> Option<egui::Key> {
    let mut chars = name.chars();
    let capitalised: String = chars
        .next()
        .map(|first| first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase())
        .unwrap_or_default();

    egui::Key::from_name(name)
        .or_else(|| egui::Key::from_name(&capitalised))
        .or_else(|| egui::Key::from_name(&name.to_ascii_uppercase()))
}

// ---------------------------------------------------------------------------
// View state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum View {
    Idle,
    Running,
    Result(Transcript),
    Error(String),
}

// ---------------------------------------------------------------------------
// QuickAiApp
// ---------------------------------------------------------------------------

pub struct QuickAiApp {
    pub view: View,

    // ── Run panel ────────────────────────────────────────────────────────
    query: String,
    note_field: String,
    preset: String,

    // ── Settings ─────────────────────────────────────────────────────────
    show_settings: bool,
    models: Vec<String>,
    /// Feedback shown under the settings panel (save result, model refresh).
    settings_status: Option<String>,
    /// Narration progress shown in the bottom bar.
    narration_status: Option<String>,
    shortcut: Option<egui::KeyboardShortcut>,
    /// API key or base URL edited since the last model refresh.
    connection_edited: bool,

    // ── Channels ─────────────────────────────────────────────────────────
    command_tx: mpsc::Sender<PipelineCommand>,
    result_rx: mpsc::Receiver<PipelineResult>,

    // ── Configuration ────────────────────────────────────────────────────
    config: AppConfig,
    settings_path: PathBuf,
}

impl QuickAiApp {
    /// Create the app.  With `start_now` a run with the configured query is
    /// sent before the first frame.
    pub fn new(
        command_tx: mpsc::Sender<PipelineCommand>,
        result_rx: mpsc::Receiver<PipelineResult>,
        config: AppConfig,
        settings_path: PathBuf,
        preset: Option<String>,
        start_now: bool,
    ) -> Self {
        let shortcut = parse_shortcut(&config.general.shortcut);
        if shortcut.is_none() {
            log::warn!("ui: unrecognised shortcut {:?}", config.general.shortcut);
        }

        let mut app = Self {
            view: View::Idle,
            query: config.general.query.clone(),
            note_field: config.general.note_field.clone(),
            preset: preset.unwrap_or_else(|| PromptConfig::DEFAULT_PRESET.to_string()),
            show_settings: false,
            models: Vec::new(),
            settings_status: None,
            narration_status: None,
            shortcut,
            connection_edited: false,
            command_tx,
            result_rx,
            config,
            settings_path,
        };

        if start_now {
            app.start_run();
        }
        app
    }

    // ── Commands ─────────────────────────────────────────────────────────

    fn build_request(&self) -> Option<RunRequest> {
        let preset = self.config.prompt.preset(Some(&self.preset))?;
        Some(RunRequest {
            query: self.query.clone(),
            note_field: self.note_field.clone(),
            placeholder: self.config.prompt.placeholder.clone(),
            preset,
            params: self.config.ai.completion_params(),
            play_sound: self.config.general.play_sound,
        })
    }

    fn start_run(&mut self) {
        if self.view == View::Running {
            return;
        }
        let Some(request) = self.build_request() else {
            self.view = View::Error(format!("Unknown prompt preset {:?}", self.preset));
            return;
        };
        match self.command_tx.try_send(PipelineCommand::Run(request)) {
            Ok(()) => {
                self.view = View::Running;
                self.narration_status = None;
            }
            Err(e) => self.view = View::Error(format!("Pipeline unavailable: {e}")),
        }
    }

    fn send(&self, command: PipelineCommand) {
        if let Err(e) = self.command_tx.try_send(command) {
            log::warn!("ui: could not send command: {e}");
        }
    }

    // ── Channel polling ──────────────────────────────────────────────────

    /// Drain all pending pipeline results (non-blocking).
    fn poll_results(&mut self) {
        while let Ok(result) = self.result_rx.try_recv() {
            match result {
                PipelineResult::Started => self.view = View::Running,
                PipelineResult::ChainComplete(outcome) => {
                    self.view = match present::render(
                        &outcome.field_values,
                        &outcome.prompts,
                        &outcome.responses,
                    ) {
                        Ok(transcript) => View::Result(transcript),
                        Err(e) => View::Error(e.to_string()),
                    };
                    if self.config.general.play_sound {
                        self.narration_status = Some("Playing narration…".into());
                    }
                }
                PipelineResult::Cancelled => self.view = View::Idle,
                PipelineResult::Failed(message) => self.view = View::Error(message),
                PipelineResult::NarrationFinished => self.narration_status = None,
                PipelineResult::NarrationFailed(message) => {
                    self.narration_status = Some(format!("Narration failed: {message}"));
                }
                PipelineResult::Models(models) => {
                    self.settings_status = Some(format!("{} models available", models.len()));
                    self.models = models;
                }
                PipelineResult::ModelsFailed(message) => {
                    self.settings_status = Some(format!("Could not list models: {message}"));
                }
            }
        }
    }

    // ── Top bar ──────────────────────────────────────────────────────────

    fn draw_top_bar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.heading("quick-ai");
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let label = if self.show_settings { "Close settings" } else { "Settings" };
                if ui.button(label).clicked() {
                    self.show_settings = !self.show_settings;
                }
                if let Some(status) = &self.narration_status {
                    ui.label(egui::RichText::new(status).color(DIM).size(11.0));
                }
            });
        });
    }

    // ── View renderers ───────────────────────────────────────────────────

    fn draw_idle(&mut self, ui: &mut egui::Ui) {
        egui::Grid::new("run_panel").num_columns(2).show(ui, |ui| {
            ui.label("Search");
            ui.add(egui::TextEdit::singleline(&mut self.query).desired_width(f32::INFINITY));
            ui.end_row();

            ui.label("Field");
            ui.text_edit_singleline(&mut self.note_field);
            ui.end_row();

            ui.label("Preset");
            let names = self.config.prompt.preset_names();
            egui::ComboBox::from_id_salt("preset")
                .selected_text(self.preset.as_str())
                .show_ui(ui, |ui| {
                    for name in names {
                        ui.selectable_value(&mut self.preset, name.clone(), name);
                    }
                });
            ui.end_row();
        });

        ui.add_space(8.0);
        ui.horizontal(|ui| {
            if ui.button("Run").clicked() {
                self.start_run();
            }
            if let Some(shortcut) = &self.shortcut {
                ui.label(
                    egui::RichText::new(ui.ctx().format_shortcut(shortcut))
                        .color(DIM)
                        .size(11.0),
                );
            }
        });
    }

    fn draw_running(&mut self, ui: &mut egui::Ui) {
        ui.add_space(12.0);
        ui.vertical_centered(|ui| {
            ui.spinner();
            ui.add_space(6.0);
            ui.label(WAITING_HINT);
            ui.add_space(6.0);
            if ui.button("Stop").clicked() {
                self.send(PipelineCommand::Stop);
            }
        });
    }

    fn draw_result(&mut self, ui: &mut egui::Ui, transcript: &Transcript) {
        ui.horizontal(|ui| {
            if ui.button("Copy").clicked() {
                ui.ctx().copy_text(transcript.to_plain());
            }
            if ui.button("Copy HTML").clicked() {
                ui.ctx().copy_text(transcript.to_html());
            }
            if ui.button("Close").clicked() {
                self.view = View::Idle;
            }
        });
        ui.separator();

        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .show(ui, |ui| {
                ui.label(egui::RichText::new("Chosen values:").color(HEADING).strong());
                for value in &transcript.values {
                    ui.label(value);
                }
                for exchange in &transcript.exchanges {
                    ui.add_space(8.0);
                    ui.label(
                        egui::RichText::new(format!("Prompt: {}:", exchange.prompt))
                            .color(HEADING),
                    );
                    ui.label(format!("Response: {}", exchange.response));
                }
            });
    }

    fn draw_error(&mut self, ui: &mut egui::Ui, message: &str) {
        ui.add_space(8.0);
        ui.label(egui::RichText::new(message).color(ERROR));
        ui.add_space(8.0);
        if ui.button("Close").clicked() {
            self.view = View::Idle;
        }
    }

    // ── Settings panel ───────────────────────────────────────────────────

    fn draw_settings(&mut self, ui: &mut egui::Ui) {
        egui::ScrollArea::vertical().show(ui, |ui| {
            self.draw_general_settings(ui);
            ui.separator();
            self.draw_ai_settings(ui);
            ui.separator();
            self.draw_prompt_settings(ui);

            ui.separator();
            if ui.button("Save").clicked() {
                self.settings_status = Some(self.save_settings());
            }
            if let Some(status) = &self.settings_status {
                ui.label(egui::RichText::new(status).color(DIM).size(11.0));
            }
        });
    }

    fn draw_general_settings(&mut self, ui: &mut egui::Ui) {
        let general = &mut self.config.general;

        ui.label(egui::RichText::new("General").strong());
        ui.checkbox(&mut general.automatic_display, "Run automatically on launch");
        ui.horizontal(|ui| {
            ui.label("Shortcut");
            ui.text_edit_singleline(&mut general.shortcut);
        });
        if parse_shortcut(&general.shortcut).is_none() {
            ui.label(
                egui::RichText::new("Unrecognised shortcut")
                    .color(ERROR)
                    .size(11.0),
            );
        }

        ui.add_space(6.0);
        ui.label(egui::RichText::new("Sound").strong());
        ui.checkbox(&mut general.play_sound, "Generate and play sound for every response");
        ui.horizontal(|ui| {
            ui.label("Default language");
            ui.add(
                egui::TextEdit::singleline(&mut general.default_sound_language)
                    .desired_width(80.0),
            );
        });
        ui.horizontal(|ui| {
            ui.label("Default voice");
            egui::ComboBox::from_id_salt("default_voice")
                .selected_text(general.default_voice.as_str())
                .show_ui(ui, |ui| {
                    for voice in KNOWN_VOICES {
                        ui.selectable_value(&mut general.default_voice, voice.to_string(), *voice);
                    }
                });
        });
    }

    fn draw_ai_settings(&mut self, ui: &mut egui::Ui) {
        let mut provider_changed = false;
        let mut edited = false;
        let mut focus_left = false;
        let mut refresh = false;

        let ai = &mut self.config.ai;
        ui.label(egui::RichText::new("AI").strong());

        egui::Grid::new("ai_settings").num_columns(2).show(ui, |ui| {
            ui.label("Provider");
            egui::ComboBox::from_id_salt("provider")
                .selected_text(ai.provider.label())
                .show_ui(ui, |ui| {
                    for provider in LlmProvider::ALL {
                        provider_changed |= ui
                            .selectable_value(&mut ai.provider, provider, provider.label())
                            .changed();
                    }
                });
            ui.end_row();

            ui.label("API key");
            let response = ui.add(egui::TextEdit::singleline(&mut ai.api_key).password(true));
            edited |= response.changed();
            focus_left |= response.lost_focus();
            ui.end_row();

            ui.label("Base URL");
            let mut base_url = ai.base_url.clone().unwrap_or_default();
            let response = ui.add(
                egui::TextEdit::singleline(&mut base_url)
                    .hint_text(ai.provider.default_api_base()),
            );
            if response.changed() {
                ai.base_url = Some(base_url).filter(|url| !url.trim().is_empty());
                edited = true;
            }
            focus_left |= response.lost_focus();
            ui.end_row();

            ui.label("Model");
            ui.horizontal(|ui| {
                ui.text_edit_singleline(&mut ai.model);
                refresh |= ui.button("Refresh models").clicked();
            });
            ui.end_row();
        });

        if !self.models.is_empty() {
            let models = &self.models;
            let model = &mut ai.model;
            egui::ComboBox::from_id_salt("models")
                .selected_text(model.as_str())
                .show_ui(ui, |ui| {
                    for id in models {
                        ui.selectable_value(&mut *model, id.clone(), id);
                    }
                });
        }

        ui.add(egui::Slider::new(&mut ai.temperature, 0.0..=2.0).text("temperature"));
        ui.add(
            egui::DragValue::new(&mut ai.max_tokens)
                .range(1..=32_768)
                .prefix("max tokens: "),
        );
        ui.add(egui::Slider::new(&mut ai.presence_penalty, -2.0..=2.0).text("presence penalty"));
        ui.add(
            egui::Slider::new(&mut ai.frequency_penalty, -2.0..=2.0).text("frequency penalty"),
        );

        // Key and URL edits refresh once the field loses focus.
        self.connection_edited |= edited;
        if provider_changed || refresh || (focus_left && self.connection_edited) {
            self.refresh_models();
        }
    }

    fn draw_prompt_settings(&mut self, ui: &mut egui::Ui) {
        let mut remove = None;
        let mut add = false;

        let default_language = self.config.general.default_sound_language.clone();
        let selected = &mut self.preset;
        let prompt = &mut self.config.prompt;

        ui.label(egui::RichText::new("Prompts").strong());
        ui.horizontal(|ui| {
            ui.label("Placeholder");
            ui.text_edit_singleline(&mut prompt.placeholder);
        });

        egui::CollapsingHeader::new(PromptConfig::DEFAULT_PRESET)
            .id_salt("preset_default")
            .default_open(true)
            .show(ui, |ui| {
                prompt_list_editor(
                    ui,
                    &mut prompt.prompt_list,
                    &mut prompt.sound_language_list,
                    &default_language,
                );
            });

        for (i, preset) in prompt.presets.iter_mut().enumerate() {
            let was_selected = *selected == preset.name;
            egui::CollapsingHeader::new(preset.name.clone())
                .id_salt(("preset", i))
                .show(ui, |ui| {
                    ui.horizontal(|ui| {
                        ui.label("Name");
                        if ui.text_edit_singleline(&mut preset.name).changed() && was_selected {
                            *selected = preset.name.clone();
                        }
                    });
                    ui.push_id(i, |ui| {
                        prompt_list_editor(
                            ui,
                            &mut preset.prompt_list,
                            &mut preset.sound_language_list,
                            &default_language,
                        );
                    });
                    if ui.button("Remove preset").clicked() {
                        remove = Some(i);
                    }
                });
        }

        if ui.button("Add preset").clicked() {
            add = true;
        }

        if let Some(i) = remove {
            self.remove_preset(i);
        }
        if add {
            self.config.prompt.add_preset();
        }
    }

    fn remove_preset(&mut self, index: usize) {
        if index >= self.config.prompt.presets.len() {
            return;
        }
        let removed = self.config.prompt.presets.remove(index);
        if removed.name == self.preset {
            self.preset = PromptConfig::DEFAULT_PRESET.to_string();
        }
    }

    /// Hand the edited connection to the orchestrator, then list its models.
    fn refresh_models(&mut self) {
        self.connection_edited = false;
        self.settings_status = Some("Fetching models…".into());
        self.send(PipelineCommand::ApplySettings(Box::new(self.config.clone())));
        self.send(PipelineCommand::ListModels);
    }

    fn save_settings(&mut self) -> String {
        self.config.general.query = self.query.clone();
        self.config.general.note_field = self.note_field.clone();

        let Some(shortcut) = parse_shortcut(&self.config.general.shortcut) else {
            return format!(
                "Not saved: unrecognised shortcut {:?}",
                self.config.general.shortcut
            );
        };

        let result = self
            .config
            .validate()
            .and_then(|()| self.config.save_to(&self.settings_path));
        match result {
            Ok(()) => {
                log::info!("ui: settings saved to {}", self.settings_path.display());
                self.shortcut = Some(shortcut);
                self.send(PipelineCommand::ApplySettings(Box::new(self.config.clone())));
                "Saved.".into()
            }
            Err(e) => {
                log::warn!("ui: settings not saved: {e:#}");
                format!("Not saved: {e:#}")
            }
        }
    }
}

/// Editable prompt list; each prompt carries its sound language.
fn prompt_list_editor(
    ui: &mut egui::Ui,
    prompts: &mut Vec<String>,
    languages: &mut Vec<String>,
    default_language: &str,
) {
    let mut remove = None;

    for (i, text) in prompts.iter_mut().enumerate() {
        ui.label(format!("Prompt {}", i + 1));
        ui.add(egui::TextEdit::multiline(text).desired_rows(2));
        ui.horizontal(|ui| {
            if let Some(language) = languages.get_mut(i) {
                ui.label("Sound language");
                ui.add(egui::TextEdit::singleline(language).desired_width(80.0));
            }
            if ui.small_button("Remove").clicked() {
                remove = Some(i);
            }
        });
    }

    if let Some(i) = remove {
        prompts.remove(i);
        if i < languages.len() {
            languages.remove(i);
        }
    }
    if ui.button("Add prompt").clicked() {
        prompts.push(String::new());
        while languages.len() < prompts.len() {
            languages.push(default_language.to_string());
        }
    }
}

// ---------------------------------------------------------------------------
// eframe::App impl
// ---------------------------------------------------------------------------

impl eframe::App for QuickAiApp {
    /// Polls the result channel, handles the shortcut, then renders.
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_results();

        if let Some(shortcut) = self.shortcut {
            if self.view != View::Running && ctx.input_mut(|i| i.consume_shortcut(&shortcut)) {
                self.start_run();
            }
        }

        // Keep polling the channel while nothing else triggers a repaint.
        let interval = if self.view == View::Running { 100 } else { 250 };
        ctx.request_repaint_after(Duration::from_millis(interval));

        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| self.draw_top_bar(ui));

        if self.show_settings {
            egui::SidePanel::right("settings")
                .resizable(true)
                .default_width(300.0)
                .show(ctx, |ui| self.draw_settings(ui));
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            // Clone the view so renderers can replace it.
            let view = self.view.clone();
            match view {
                View::Idle => self.draw_idle(ui),
                View::Running => self.draw_running(ui),
                View::Result(transcript) => self.draw_result(ui, &transcript),
                View::Error(message) => self.draw_error(ui, &message),
            }
        });
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        log::info!("quick-ai window closing");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
