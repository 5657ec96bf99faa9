//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\quick-ai\
//!   macOS:   ~/Library/Application Support/quick-ai/
//!   Linux:   ~/.config/quick-ai/
//!
//! Data dir (narration audio):
//!   Windows: %LOCALAPPDATA%\quick-ai\output\
//!   macOS:   ~/Library/Application Support/quick-ai/output/
//!   Linux:   ~/.local/share/quick-ai/output/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory holding `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Directory the narration runner writes `response_{i}.mp3` into.
    pub output_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "quick-ai";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let settings_file = config_dir.join("settings.toml");
        let output_dir = data_dir.join("output");

        Self {
            config_dir,
            settings_file,
            output_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
