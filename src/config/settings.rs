//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.
//! Every section is `#[serde(default)]`, so a hand-written file only needs the
//! keys it wants to change.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::llm::CompletionParams;

// ---------------------------------------------------------------------------
// LlmProvider
// ---------------------------------------------------------------------------

/// Selects which chat-completion service handles the prompt chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LlmProvider {
    /// api.openai.com
    OpenAi,
    /// Groq's OpenAI-compatible endpoint.
    Groq,
    /// Any other server speaking the OpenAI wire format (Ollama, LM Studio,
    /// vLLM …).  Requires `base_url`.
    OpenAiCompatible,
}

impl LlmProvider {
    /// All selectable providers, in the order the settings panel lists them.
    pub const ALL: [LlmProvider; 3] = [
        LlmProvider::OpenAi,
        LlmProvider::Groq,
        LlmProvider::OpenAiCompatible,
    ];

    /// API root (including the version segment) used when `base_url` is not
    /// set.
    pub fn default_api_base(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "https://api.openai.com/v1",
            LlmProvider::Groq => "https://api.groq.com/openai/v1",
            LlmProvider::OpenAiCompatible => "http://localhost:11434/v1",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "OpenAI",
            LlmProvider::Groq => "Groq",
            LlmProvider::OpenAiCompatible => "OpenAI-compatible",
        }
    }
}

impl Default for LlmProvider {
    fn default() -> Self {
        Self::OpenAi
    }
}

/// Join an optional user-supplied base URL onto the provider default.
///
/// `base_url` is the server root (e.g. `http://localhost:11434`); `/v1` is
/// appended unless the URL already ends with a version segment.
pub fn resolve_api_base(provider: LlmProvider, base_url: Option<&str>) -> String {
    match base_url.map(str::trim).filter(|s| !s.is_empty()) {
        Some(url) => {
            let url = url.trim_end_matches('/');
            if url.ends_with("/v1") {
                url.to_string()
            } else {
                format!("{url}/v1")
            }
        }
        None => provider.default_api_base().to_string(),
    }
}

// ---------------------------------------------------------------------------
// GeneralConfig
// ---------------------------------------------------------------------------

/// Run-time behaviour: which notes to pick, narration, start-up behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default search expression shown in the run panel.
    pub query: String,
    /// Field read from every matched note.
    pub note_field: String,
    /// Start a run with `query` as soon as the window opens.
    pub automatic_display: bool,
    /// Keyboard shortcut that starts a run (e.g. `"Ctrl+Shift+A"`).
    pub shortcut: String,
    /// Narrate every response after a successful chain.
    pub play_sound: bool,
    /// Language tag used when a preset has fewer sound languages than
    /// prompts.
    pub default_sound_language: String,
    /// Voice used for `default_sound_language` and for unknown tags.
    #[serde(alias = "default_edge_tts_voice")]
    pub default_voice: String,
    /// Path to the collection file.  `None` means it must be given on the
    /// command line.
    pub collection_path: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            query: "added:1".into(),
            note_field: "Front".into(),
            automatic_display: false,
            shortcut: "Ctrl+Shift+A".into(),
            play_sound: false,
            default_sound_language: "en-US".into(),
            default_voice: "alloy".into(),
            collection_path: None,
        }
    }
}

// ---------------------------------------------------------------------------
// LlmConfig
// ---------------------------------------------------------------------------

/// Settings for the chat-completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Which service to call.
    pub provider: LlmProvider,
    /// API key: empty for local providers.
    pub api_key: String,
    /// Server root overriding the provider default.
    pub base_url: Option<String>,
    /// Model identifier (e.g. `"gpt-3.5-turbo"`).
    pub model: String,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f32,
    /// Upper bound on generated tokens per stage.
    pub max_tokens: u32,
    /// -2.0 – 2.0; positive values push towards new topics.
    pub presence_penalty: f32,
    /// -2.0 – 2.0; positive values discourage verbatim repetition.
    pub frequency_penalty: f32,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            api_key: String::new(),
            base_url: None,
            model: "gpt-3.5-turbo".into(),
            temperature: 1.0,
            max_tokens: 1024,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    /// Full API root including the `/v1` segment.
    pub fn api_base(&self) -> String {
        resolve_api_base(self.provider, self.base_url.as_deref())
    }

    /// Snapshot of the per-request sampling parameters.
    pub fn completion_params(&self) -> CompletionParams {
        CompletionParams {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            presence_penalty: self.presence_penalty,
            frequency_penalty: self.frequency_penalty,
        }
    }
}

// ---------------------------------------------------------------------------
// PromptConfig
// ---------------------------------------------------------------------------

/// A named prompt chain with its per-response narration languages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptPreset {
    pub name: String,
    pub prompt_list: Vec<String>,
    #[serde(default)]
    pub sound_language_list: Vec<String>,
}

/// The default chain plus any number of named presets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Token replaced by the note values (stage 0) or the previous response.
    pub placeholder: String,
    pub prompt_list: Vec<String>,
    pub sound_language_list: Vec<String>,
    pub presets: Vec<PromptPreset>,
}

impl PromptConfig {
    /// Name under which the top-level `prompt_list` is offered.
    pub const DEFAULT_PRESET: &'static str = "Default";

    /// Names of every selectable chain, default first.
    pub fn preset_names(&self) -> Vec<String> {
        std::iter::once(Self::DEFAULT_PRESET.to_string())
            .chain(self.presets.iter().map(|p| p.name.clone()))
            .collect()
    }

    /// Look up a chain by name.  `None` or the default name selects the
    /// top-level list; an unknown name returns `None`.
    pub fn preset(&self, name: Option<&str>) -> Option<PromptPreset> {
        match name {
            None => Some(self.default_preset()),
            Some(n) if n == Self::DEFAULT_PRESET => Some(self.default_preset()),
            Some(n) => self.presets.iter().find(|p| p.name == n).cloned(),
        }
    }

    /// Append a preset seeded with the default chain under the first free
    /// `Preset N` name, and return that name.
    pub fn add_preset(&mut self) -> String {
        let name = (1..)
            .map(|n| format!("Preset {n}"))
            .find(|name| self.presets.iter().all(|p| &p.name != name))
            .unwrap_or_default();
        self.presets.push(PromptPreset {
            name: name.clone(),
            ..self.default_preset()
        });
        name
    }

    fn default_preset(&self) -> PromptPreset {
        PromptPreset {
            name: Self::DEFAULT_PRESET.to_string(),
            prompt_list: self.prompt_list.clone(),
            sound_language_list: self.sound_language_list.clone(),
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            placeholder: "#response#".into(),
            prompt_list: vec![
                "Write a short story of no more than 120 words that uses every one of \
                 these words: #response#"
                    .into(),
                "Translate the following story into Chinese: #response#".into(),
            ],
            sound_language_list: vec!["en-US".into(), "zh-CN".into()],
            presets: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// SpeechConfig
// ---------------------------------------------------------------------------

/// Settings for the text-to-speech endpoint used by narration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Server root; `None` reuses the completion provider's API root.
    pub base_url: Option<String>,
    /// Key for the speech endpoint; `None` reuses `ai.api_key`.
    pub api_key: Option<String>,
    /// Speech model identifier (e.g. `"tts-1"`).
    pub model: String,
    /// Language tag → voice name.
    pub voices: BTreeMap<String, String>,
    /// Where `response_{i}.mp3` files are written; `None` uses the platform
    /// data dir.
    pub output_dir: Option<PathBuf>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            model: "tts-1".into(),
            voices: BTreeMap::new(),
            output_dir: None,
        }
    }
}

// ---------------------------------------------------------------------------
// UiConfig
// ---------------------------------------------------------------------------

/// eframe window settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Initial inner size of the window.
    pub window_size: (f32, f32),
    /// Last saved window position; `None` lets the window manager decide.
    pub window_position: Option<(f32, f32)>,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            window_size: (560.0, 480.0),
            window_position: None,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use quick_ai::config::{AppConfig, AppPaths};
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load_from(&AppPaths::new().settings_file).unwrap();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub ai: LlmConfig,
    pub prompt: PromptConfig,
    pub speech: SpeechConfig,
    pub ui: UiConfig,
}

impl AppConfig {
    /// Load from `path`; returns `Ok(AppConfig::default())` when the file
    /// does not exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings that would make every run fail.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.prompt.placeholder.is_empty(),
            "prompt.placeholder must not be empty"
        );
        ensure!(
            !self.prompt.prompt_list.is_empty(),
            "prompt.prompt_list must contain at least one prompt"
        );
        let mut names = std::collections::BTreeSet::new();
        for preset in &self.prompt.presets {
            ensure!(!preset.name.trim().is_empty(), "prompt presets need a name");
            ensure!(
                preset.name != PromptConfig::DEFAULT_PRESET,
                "prompt preset name {:?} is reserved",
                preset.name
            );
            ensure!(
                names.insert(preset.name.as_str()),
                "prompt preset {:?} is defined twice",
                preset.name
            );
            ensure!(
                !preset.prompt_list.is_empty(),
                "prompt preset {:?} has no prompts",
                preset.name
            );
        }
        ensure!(
            (0.0..=2.0).contains(&self.ai.temperature),
            "ai.temperature must be between 0 and 2 (got {})",
            self.ai.temperature
        );
        ensure!(
            (-2.0..=2.0).contains(&self.ai.presence_penalty),
            "ai.presence_penalty must be between -2 and 2 (got {})",
            self.ai.presence_penalty
        );
        ensure!(
            (-2.0..=2.0).contains(&self.ai.frequency_penalty),
            "ai.frequency_penalty must be between -2 and 2 (got {})",
            self.ai.frequency_penalty
        );
        Ok(())
    }

    /// Directory narration audio is written to.
    pub fn output_dir(&self) -> PathBuf {
        self.speech
            .output_dir
            .clone()
            .unwrap_or_else(|| AppPaths::new().output_dir)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modified.toml");

        let mut cfg = AppConfig::default();
        cfg.general.query = "deck:Japanese tag:verb".into();
        cfg.general.play_sound = true;
        cfg.ai.provider = LlmProvider::Groq;
        cfg.ai.api_key = "gsk-test".into();
        cfg.ai.model = "llama3-8b-8192".into();
        cfg.ai.max_tokens = 300;
        cfg.prompt.presets.push(PromptPreset {
            name: "Quiz".into(),
            prompt_list: vec!["Quiz me on #response#".into()],
            sound_language_list: vec!["ja-JP".into()],
        });
        cfg.speech.voices.insert("ja-JP".into(), "shimmer".into());
        cfg.ui.window_position = Some((100.0, 200.0));

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded.general.query, "deck:Japanese tag:verb");
        assert!(loaded.general.play_sound);
        assert_eq!(loaded.ai.provider, LlmProvider::Groq);
        assert_eq!(loaded.ai.api_key, "gsk-test");
        assert_eq!(loaded.ai.model, "llama3-8b-8192");
        assert_eq!(loaded.ai.max_tokens, 300);
        assert_eq!(loaded.prompt.presets, cfg.prompt.presets);
        assert_eq!(
            loaded.speech.voices.get("ja-JP").map(String::as_str),
            Some("shimmer")
        );
        assert_eq!(loaded.ui.window_position, Some((100.0, 200.0)));
    }

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config.general.note_field, "Front");
        assert_eq!(config.prompt.placeholder, "#response#");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(
            &path,
            "[general]\nnote_field = \"Back\"\ndefault_edge_tts_voice = \"nova\"\n\n[ai]\nmodel = \"gpt-4o-mini\"\n",
        )
        .unwrap();

        let cfg = AppConfig::load_from(&path).expect("load");
        assert_eq!(cfg.general.note_field, "Back");
        assert_eq!(cfg.general.default_voice, "nova");
        assert_eq!(cfg.general.query, GeneralConfig::default().query);
        assert_eq!(cfg.ai.model, "gpt-4o-mini");
        assert_eq!(cfg.ai.timeout_secs, 60);
        assert_eq!(cfg.prompt.prompt_list.len(), 2);
    }

    #[test]
    fn default_config_is_valid() {
        AppConfig::default().validate().expect("defaults must validate");
    }

    #[test]
    fn validate_rejects_empty_placeholder() {
        let mut cfg = AppConfig::default();
        cfg.prompt.placeholder.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_prompt_list() {
        let mut cfg = AppConfig::default();
        cfg.prompt.prompt_list.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_sampling() {
        let mut cfg = AppConfig::default();
        cfg.ai.temperature = 2.5;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.ai.frequency_penalty = -3.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_preset_names() {
        let mut cfg = AppConfig::default();
        cfg.prompt.add_preset();
        cfg.validate().expect("a fresh preset is valid");

        let mut dup = cfg.clone();
        let copy = dup.prompt.presets[0].clone();
        dup.prompt.presets.push(copy);
        assert!(dup.validate().is_err());

        let mut reserved = cfg.clone();
        reserved.prompt.presets[0].name = PromptConfig::DEFAULT_PRESET.into();
        assert!(reserved.validate().is_err());

        let mut blank = cfg;
        blank.prompt.presets[0].name = "  ".into();
        assert!(blank.validate().is_err());
    }

    #[test]
    fn add_preset_picks_a_free_name_and_copies_default_chain() {
        let mut prompt = PromptConfig::default();
        assert_eq!(prompt.add_preset(), "Preset 1");
        prompt.presets[0].name = "Quiz".into();
        assert_eq!(prompt.add_preset(), "Preset 1");
        assert_eq!(prompt.add_preset(), "Preset 2");
        assert_eq!(prompt.presets[2].prompt_list, prompt.prompt_list);
        assert_eq!(prompt.presets[2].sound_language_list, prompt.sound_language_list);
    }

    #[test]
    fn provider_api_bases() {
        assert_eq!(
            resolve_api_base(LlmProvider::OpenAi, None),
            "https://api.openai.com/v1"
        );
        assert_eq!(
            resolve_api_base(LlmProvider::Groq, Some("  ")),
            "https://api.groq.com/openai/v1"
        );
        assert_eq!(
            resolve_api_base(LlmProvider::OpenAiCompatible, Some("http://localhost:1234/")),
            "http://localhost:1234/v1"
        );
        assert_eq!(
            resolve_api_base(LlmProvider::OpenAi, Some("https://proxy.example/v1")),
            "https://proxy.example/v1"
        );
    }

    #[test]
    fn preset_lookup() {
        let mut prompt = PromptConfig::default();
        prompt.presets.push(PromptPreset {
            name: "Quiz".into(),
            prompt_list: vec!["Q #response#".into()],
            sound_language_list: Vec::new(),
        });

        assert_eq!(prompt.preset_names(), vec!["Default", "Quiz"]);
        assert_eq!(prompt.preset(None).unwrap().prompt_list, prompt.prompt_list);
        assert_eq!(
            prompt.preset(Some("Default")).unwrap().prompt_list,
            prompt.prompt_list
        );
        assert_eq!(
            prompt.preset(Some("Quiz")).unwrap().prompt_list,
            vec!["Q #response#".to_string()]
        );
        assert!(prompt.preset(Some("Missing")).is_none());
    }
}
