//! Application entry point: quick-ai.
//!
//! # Startup sequence
//!
//! 1. Parse the command line.
//! 2. Initialise logging.
//! 3. Load [`AppConfig`] (defaults on first run), apply CLI overrides and
//!    validate.
//! 4. Open the collection file read-only.
//! 5. Create the [`tokio`] runtime (multi-thread, 2 workers).
//! 6. Build the services and spawn the pipeline orchestrator.
//! 7. Either run headless (`--print`) or hand the channels to
//!    [`eframe::run_native`], which blocks until the window is closed.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use eframe::egui;
use tokio::sync::mpsc;

use quick_ai::{
    app::QuickAiApp,
    cli::CliArgs,
    collection::AnkiCollection,
    config::AppConfig,
    pipeline::{
        ApiServices, PipelineCommand, PipelineContext, PipelineOrchestrator, PipelineResult,
        RunRequest,
    },
    present,
    speech::RodioPlayer,
};

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

fn init_logging(level: Option<&str>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = level {
        builder.parse_filters(level);
    }
    builder.init();
}

// ---------------------------------------------------------------------------
// Service wiring
// ---------------------------------------------------------------------------

fn build_context(config: &AppConfig) -> Result<PipelineContext> {
    let Some(path) = config.general.collection_path.as_ref() else {
        bail!("no collection file: set general.collection_path or pass --collection");
    };
    let store = AnkiCollection::open(path)
        .with_context(|| format!("opening collection {}", path.display()))?;

    log::info!(
        "{} via {} (model {})",
        config.ai.provider.label(),
        config.ai.api_base(),
        config.ai.model
    );

    Ok(PipelineContext::new(
        config,
        Arc::new(store),
        Arc::new(RodioPlayer),
        Arc::new(ApiServices),
    ))
}

// ---------------------------------------------------------------------------
// Headless mode
// ---------------------------------------------------------------------------

/// Run once, print the transcript, and wait for narration to finish.
async fn run_headless(
    command_tx: mpsc::Sender<PipelineCommand>,
    mut result_rx: mpsc::Receiver<PipelineResult>,
    request: RunRequest,
    html: bool,
) -> Result<()> {
    let play_sound = request.play_sound;
    command_tx
        .send(PipelineCommand::Run(request))
        .await
        .map_err(|_| anyhow!("pipeline stopped before the run started"))?;

    while let Some(result) = result_rx.recv().await {
        match result {
            PipelineResult::Started => log::info!("running prompt chain"),
            PipelineResult::ChainComplete(outcome) => {
                let transcript =
                    present::render(&outcome.field_values, &outcome.prompts, &outcome.responses)?;
                if html {
                    println!("{}", transcript.to_html());
                } else {
                    println!("{}", transcript.to_plain());
                }
                if !play_sound || outcome.responses.is_empty() {
                    break;
                }
            }
            PipelineResult::NarrationFinished => break,
            PipelineResult::NarrationFailed(message) => {
                log::warn!("narration failed: {message}");
                break;
            }
            PipelineResult::Cancelled => bail!("run cancelled"),
            PipelineResult::Failed(message) => bail!(message),
            PipelineResult::Models(_) | PipelineResult::ModelsFailed(_) => {}
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Native options builder
// ---------------------------------------------------------------------------

fn native_options(config: &AppConfig) -> eframe::NativeOptions {
    let (width, height) = config.ui.window_size;
    let mut vp = egui::ViewportBuilder::default()
        .with_title("quick-ai")
        .with_inner_size([width, height])
        .with_min_inner_size([360.0, 240.0]);

    if let Some((x, y)) = config.ui.window_position {
        vp = vp.with_position(egui::pos2(x, y));
    }

    eframe::NativeOptions {
        viewport: vp,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // 1. Command line
    let args = CliArgs::parse();

    // 2. Logging
    init_logging(args.log_level.as_deref());
    log::info!("quick-ai starting up");

    // 3. Configuration
    let settings_path = args.config_path();
    let mut config = AppConfig::load_from(&settings_path)
        .with_context(|| format!("loading {}", settings_path.display()))?;
    args.apply(&mut config);
    config.validate().context("invalid settings")?;

    let preset = args.preset.clone();
    if config.prompt.preset(preset.as_deref()).is_none() {
        bail!("unknown prompt preset {:?}", preset.unwrap_or_default());
    }

    // 4. Services
    let context = build_context(&config)?;

    // 5. Tokio runtime (2 worker threads: the chain and narration each take one)
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    // 6. Channels + orchestrator
    let (command_tx, command_rx) = mpsc::channel::<PipelineCommand>(16);
    let (result_tx, result_rx) = mpsc::channel::<PipelineResult>(32);
    rt.spawn(PipelineOrchestrator::new(context, result_tx).run(command_rx));

    // 7a. Headless
    if args.print {
        let request = RunRequest::from_config(&config, preset.as_deref())
            .ok_or_else(|| anyhow!("unknown prompt preset"))?;
        return rt.block_on(run_headless(command_tx, result_rx, request, args.html));
    }

    // 7b. Window (blocks until closed)
    let start_now = args.starts_immediately(&config);
    let options = native_options(&config);
    let app = QuickAiApp::new(
        command_tx,
        result_rx,
        config,
        settings_path,
        preset,
        start_now,
    );

    eframe::run_native("quick-ai", options, Box::new(move |_cc| Ok(Box::new(app))))
        .map_err(|e| anyhow!("window error: {e}"))?;

    log::info!("quick-ai shut down");
    Ok(())
}
