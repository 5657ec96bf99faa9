//! Command-line arguments.
//!
//! Flags override the settings file for this launch only; nothing given here
//! is saved back.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{AppConfig, AppPaths};

/// quick-ai: run a chain of AI prompts over flashcard notes.
#[derive(Parser, Debug, Default)]
#[command(name = "quick-ai", version, about)]
pub struct CliArgs {
    /// Path to the settings file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Collection file to read notes from.
    #[arg(long = "collection")]
    pub collection: Option<PathBuf>,

    /// Search expression; starts a run immediately.
    #[arg(short = 'q', long = "query")]
    pub query: Option<String>,

    /// Note field to read.
    #[arg(short = 'f', long = "field")]
    pub field: Option<String>,

    /// Prompt preset to run.
    #[arg(short = 'p', long = "preset")]
    pub preset: Option<String>,

    /// Run without a window and print the transcript to stdout.
    #[arg(long = "print")]
    pub print: bool,

    /// With `--print`, print the transcript as HTML markup.
    #[arg(long = "html", requires = "print")]
    pub html: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,
}

impl CliArgs {
    /// `--config` or the platform default.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| AppPaths::new().settings_file)
    }

    /// Apply the overrides to a loaded config.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(path) = &self.collection {
            config.general.collection_path = Some(path.clone());
        }
        if let Some(query) = &self.query {
            config.general.query = query.clone();
        }
        if let Some(field) = &self.field {
            config.general.note_field = field.clone();
        }
    }

    /// Whether a run should start without waiting for the user.
    pub fn starts_immediately(&self, config: &AppConfig) -> bool {
        self.print || self.query.is_some() || config.general.automatic_display
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_flags() {
        let args = CliArgs::try_parse_from([
            "quick-ai",
            "--config",
            "/tmp/s.toml",
            "--collection",
            "/tmp/c.anki2",
            "--query",
            "deck:Verbs",
            "--field",
            "Back",
            "--preset",
            "Quiz",
            "--print",
            "--html",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(args.config_path(), PathBuf::from("/tmp/s.toml"));
        assert_eq!(args.preset.as_deref(), Some("Quiz"));
        assert!(args.print);
        assert!(args.html);
        assert_eq!(args.log_level.as_deref(), Some("debug"));

        let mut config = AppConfig::default();
        args.apply(&mut config);
        assert_eq!(config.general.query, "deck:Verbs");
        assert_eq!(config.general.note_field, "Back");
        assert_eq!(
            config.general.collection_path,
            Some(PathBuf::from("/tmp/c.anki2"))
        );
    }

    #[test]
    fn html_needs_print() {
        assert!(CliArgs::try_parse_from(["quick-ai", "--html"]).is_err());
    }

    #[test]
    fn no_flags_keep_config() {
        let args = CliArgs::try_parse_from(["quick-ai"]).unwrap();
        let mut config = AppConfig::default();
        args.apply(&mut config);
        assert_eq!(config.general.query, AppConfig::default().general.query);
        assert!(!args.starts_immediately(&config));

        config.general.automatic_display = true;
        assert!(args.starts_immediately(&config));
    }
}
