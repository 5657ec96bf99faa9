//! Pipeline orchestrator: drives query → prompt chain → narration.
//!
//! [`PipelineOrchestrator`] owns every service and responds to
//! [`PipelineCommand`]s received over a `tokio::sync::mpsc` channel.  Progress
//! goes back to the UI as [`PipelineResult`]s on a second channel; the two
//! sides share nothing else.
//!
//! # Pipeline flow
//!
//! ```text
//! PipelineCommand::Run(request)
//!   └─▶ Started
//!       spawn task: spawn_blocking(resolve_field_values) → run_chain
//!         ├─ Ok  → ChainComplete(outcome)
//!         │        └─ play_sound → spawn narrate()  → NarrationFinished | NarrationFailed
//!         │                        (after any earlier narration has finished)
//!         ├─ Cancelled → Cancelled
//!         └─ Err → Failed(message)
//!
//! PipelineCommand::Stop           └─▶ raise the running chain's StopSignal
//! PipelineCommand::ListModels     └─▶ Models(ids) | ModelsFailed(message)
//! PipelineCommand::ApplySettings  └─▶ rebuild the completion and speech clients
//! ```
//!
//! Collection reads are blocking and go through `spawn_blocking`; the chain
//! runs on its own task so `Stop` is handled while a request is in flight.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::collection::{resolve_field_values, CollectionError, NoteStore};
use crate::config::{AppConfig, PromptPreset};
use crate::llm::{ApiCompletion, ChatCompletion, CompletionParams, PromptTemplate};
use crate::speech::{ApiSpeech, AudioPlayer, SpeechSynthesizer};

use super::chain::{run_chain, ChainError, ChainOutcome};
use super::narration::{narrate, NarrationRequest};
use super::state::StopSignal;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Everything one run needs, snapshotted from the UI when Run is pressed.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub query: String,
    pub note_field: String,
    pub placeholder: String,
    pub preset: PromptPreset,
    pub params: CompletionParams,
    pub play_sound: bool,
}

impl RunRequest {
    /// Request built from the saved configuration.
    ///
    /// Returns `None` when `preset` names a preset that does not exist.
    pub fn from_config(config: &AppConfig, preset: Option<&str>) -> Option<Self> {
        Some(Self {
            query: config.general.query.clone(),
            note_field: config.general.note_field.clone(),
            placeholder: config.prompt.placeholder.clone(),
            preset: config.prompt.preset(preset)?,
            params: config.ai.completion_params(),
            play_sound: config.general.play_sound,
        })
    }

    pub fn template(&self) -> PromptTemplate {
        PromptTemplate::new(self.placeholder.clone(), self.preset.prompt_list.clone())
    }
}

/// Commands sent from the UI to the orchestrator.
#[derive(Debug, Clone)]
pub enum PipelineCommand {
    /// Resolve the query and run the prompt chain.
    Run(RunRequest),
    /// Stop the running chain before its next stage.
    Stop,
    /// Fetch the provider's chat models.
    ListModels,
    /// Rebuild the network clients from edited settings.  A run already in
    /// flight keeps the clients it started with.
    ApplySettings(Box<AppConfig>),
}

/// Progress and results delivered back to the UI.
#[derive(Debug, Clone)]
pub enum PipelineResult {
    /// A run was accepted and is in progress.
    Started,
    /// The chain finished; the outcome is ready to present.
    ChainComplete(ChainOutcome),
    /// The run ended early because of `Stop`.
    Cancelled,
    /// The run failed; nothing is presented.
    Failed(String),
    NarrationFinished,
    NarrationFailed(String),
    Models(Vec<String>),
    ModelsFailed(String),
}

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

/// Why a run ended without an outcome.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Collection(#[from] CollectionError),

    #[error("{0}")]
    Chain(#[from] ChainError),

    /// A background task panicked or was aborted.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Chain(ChainError::Cancelled { .. }))
    }
}

// ---------------------------------------------------------------------------
// ServiceFactory
// ---------------------------------------------------------------------------

/// Builds the clients that depend on connection settings.
pub trait ServiceFactory: Send + Sync {
    fn completion(&self, config: &AppConfig) -> Arc<dyn ChatCompletion>;
    fn speech(&self, config: &AppConfig) -> Arc<dyn SpeechSynthesizer>;
}

/// The OpenAI-compatible HTTP clients.
pub struct ApiServices;

impl ServiceFactory for ApiServices {
    fn completion(&self, config: &AppConfig) -> Arc<dyn ChatCompletion> {
        let completion = ApiCompletion::from_config(&config.ai);
        log::debug!("pipeline: completion endpoint {}", completion.api_base());
        Arc::new(completion)
    }

    fn speech(&self, config: &AppConfig) -> Arc<dyn SpeechSynthesizer> {
        let speech = ApiSpeech::from_config(config);
        log::debug!("pipeline: speech endpoint {}", speech.api_base());
        Arc::new(speech)
    }
}

// ---------------------------------------------------------------------------
// PipelineContext
// ---------------------------------------------------------------------------

/// The services a run depends on.
#[derive(Clone)]
pub struct PipelineContext {
    pub store: Arc<dyn NoteStore>,
    pub completion: Arc<dyn ChatCompletion>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub player: Arc<dyn AudioPlayer>,
    /// Rebuilds `completion` and `speech` on `ApplySettings`.
    pub services: Arc<dyn ServiceFactory>,
    /// Where narration audio is written.
    pub output_dir: PathBuf,
    /// Language used when a preset lists fewer languages than stages.
    pub default_language: String,
}

impl PipelineContext {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn NoteStore>,
        player: Arc<dyn AudioPlayer>,
        services: Arc<dyn ServiceFactory>,
    ) -> Self {
        Self {
            store,
            completion: services.completion(config),
            speech: services.speech(config),
            player,
            services,
            output_dir: config.output_dir(),
            default_language: config.general.default_sound_language.clone(),
        }
    }

    fn apply(&mut self, config: &AppConfig) {
        self.completion = self.services.completion(config);
        self.speech = self.services.speech(config);
        self.output_dir = config.output_dir();
        self.default_language = config.general.default_sound_language.clone();
    }
}

// ---------------------------------------------------------------------------
// PipelineOrchestrator
// ---------------------------------------------------------------------------

/// The chain currently running, with what is needed to finish it.
struct ActiveRun {
    handle: JoinHandle<Result<ChainOutcome, PipelineError>>,
    stop: StopSignal,
    request: RunRequest,
}

/// Drives the whole pipeline.
///
/// Create with [`PipelineOrchestrator::new`], then call [`run`](Self::run)
/// inside a tokio task.  `run` returns once the command channel is closed and
/// any in-flight run and narration have finished.
pub struct PipelineOrchestrator {
    context: PipelineContext,
    result_tx: mpsc::Sender<PipelineResult>,
    active: Option<ActiveRun>,
    /// Latest narration; each one chains onto its predecessor.
    narration: Option<JoinHandle<()>>,
}

impl PipelineOrchestrator {
    pub fn new(context: PipelineContext, result_tx: mpsc::Sender<PipelineResult>) -> Self {
        Self {
            context,
            result_tx,
            active: None,
            narration: None,
        }
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    pub async fn run(mut self, mut command_rx: mpsc::Receiver<PipelineCommand>) {
        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                joined = Self::join_active(&mut self.active) => {
                    self.finish_run(joined).await;
                }
            }
        }

        log::info!("pipeline: command channel closed, orchestrator shutting down");

        if self.active.is_some() {
            let joined = Self::join_active(&mut self.active).await;
            self.finish_run(joined).await;
        }
        if let Some(narration) = self.narration.take() {
            let _ = narration.await;
        }
    }

    /// Wait for the active chain; pending forever when nothing is running.
    async fn join_active(
        active: &mut Option<ActiveRun>,
    ) -> Result<Result<ChainOutcome, PipelineError>, tokio::task::JoinError> {
        match active.as_mut() {
            Some(run) => (&mut run.handle).await,
            None => std::future::pending().await,
        }
    }

    // -----------------------------------------------------------------------
    // Command handlers
    // -----------------------------------------------------------------------

    async fn handle_command(&mut self, command: PipelineCommand) {
        match command {
            PipelineCommand::Run(request) => self.handle_run(request).await,
            PipelineCommand::Stop => {
                if let Some(run) = &self.active {
                    log::debug!("pipeline: stop requested");
                    run.stop.stop();
                }
            }
            PipelineCommand::ListModels => self.handle_list_models(),
            PipelineCommand::ApplySettings(config) => {
                self.context.apply(&config);
                log::info!(
                    "pipeline: settings applied ({} via {}, model {})",
                    config.ai.provider.label(),
                    config.ai.api_base(),
                    config.ai.model
                );
            }
        }
    }

    async fn handle_run(&mut self, request: RunRequest) {
        if self.active.is_some() {
            log::warn!("pipeline: run requested while another is in progress; ignored");
            return;
        }

        log::debug!(
            "pipeline: run query={:?} field={:?} preset={:?} stages={}",
            request.query,
            request.note_field,
            request.preset.name,
            request.preset.prompt_list.len()
        );
        self.send(PipelineResult::Started).await;

        let stop = StopSignal::new();
        let store = Arc::clone(&self.context.store);
        let completion = Arc::clone(&self.context.completion);
        let task_request = request.clone();
        let task_stop = stop.clone();

        let handle = tokio::spawn(async move {
            let query = task_request.query.clone();
            let field = task_request.note_field.clone();
            let values = tokio::task::spawn_blocking(move || {
                resolve_field_values(store.as_ref(), &query, &field)
            })
            .await
            .map_err(|e| PipelineError::Internal(e.to_string()))??;

            let outcome = run_chain(
                completion.as_ref(),
                &task_request.template(),
                values,
                &task_request.params,
                task_stop,
            )
            .await?;
            Ok::<_, PipelineError>(outcome)
        });

        self.active = Some(ActiveRun {
            handle,
            stop,
            request,
        });
    }

    fn handle_list_models(&mut self) {
        let completion = Arc::clone(&self.context.completion);
        let result_tx = self.result_tx.clone();
        tokio::spawn(async move {
            let result = match completion.list_models().await {
                Ok(models) => PipelineResult::Models(models),
                Err(e) => {
                    log::warn!("pipeline: listing models failed: {e}");
                    PipelineResult::ModelsFailed(e.to_string())
                }
            };
            let _ = result_tx.send(result).await;
        });
    }

    // -----------------------------------------------------------------------
    // Completion
    // -----------------------------------------------------------------------

    async fn finish_run(
        &mut self,
        joined: Result<Result<ChainOutcome, PipelineError>, tokio::task::JoinError>,
    ) {
        let Some(run) = self.active.take() else {
            return;
        };

        let outcome = match joined {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) if e.is_cancelled() => {
                log::info!("pipeline: run cancelled");
                self.send(PipelineResult::Cancelled).await;
                return;
            }
            Ok(Err(e)) => {
                log::error!("pipeline error: {e}");
                self.send(PipelineResult::Failed(e.to_string())).await;
                return;
            }
            Err(e) => {
                let e = PipelineError::Internal(e.to_string());
                log::error!("pipeline error: {e}");
                self.send(PipelineResult::Failed(e.to_string())).await;
                return;
            }
        };

        log::info!(
            "pipeline: chain complete ({} values, {} responses)",
            outcome.field_values.len(),
            outcome.responses.len()
        );

        if run.request.play_sound && !outcome.responses.is_empty() {
            self.spawn_narration(NarrationRequest {
                responses: outcome.responses.clone(),
                languages: run.request.preset.sound_language_list.clone(),
                default_language: self.context.default_language.clone(),
                output_dir: self.context.output_dir.clone(),
            });
        }

        self.send(PipelineResult::ChainComplete(outcome)).await;
    }

    fn spawn_narration(&mut self, request: NarrationRequest) {
        let speech = Arc::clone(&self.context.speech);
        let player = Arc::clone(&self.context.player);
        let result_tx = self.result_tx.clone();

        // Every run writes the same response_{i}.mp3 files, so a new
        // narration waits for the previous one to finish playing.
        let previous = self.narration.take();
        self.narration = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            let result = match narrate(speech, player, request).await {
                Ok(_) => PipelineResult::NarrationFinished,
                Err(e) => {
                    log::warn!("pipeline: narration failed: {e}");
                    PipelineResult::NarrationFailed(e.to_string())
                }
            };
            let _ = result_tx.send(result).await;
        }));
    }

    async fn send(&self, result: PipelineResult) {
        if self.result_tx.send(result).await.is_err() {
            log::debug!("pipeline: result receiver dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::collection::MockNoteStore;
    use crate::config::LlmProvider;
    use crate::llm::MockCompletion;
    use crate::speech::playback::RecordingPlayer;
    use crate::speech::{MockSpeech, SpeechError};

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Mock clients whose model list names the provider and model they were
    /// built for.
    struct MockServices;

    impl ServiceFactory for MockServices {
        fn completion(&self, config: &AppConfig) -> Arc<dyn ChatCompletion> {
            Arc::new(MockCompletion {
                models: vec![format!("{}/{}", config.ai.provider.label(), config.ai.model)],
                ..MockCompletion::default()
            })
        }

        fn speech(&self, _config: &AppConfig) -> Arc<dyn SpeechSynthesizer> {
            Arc::new(MockSpeech::new())
        }
    }

    /// Reads the file when playback starts and again when it ends.
    #[derive(Default)]
    struct SlowReadingPlayer {
        heard: Mutex<Vec<String>>,
    }

    impl AudioPlayer for SlowReadingPlayer {
        fn play(&self, path: &Path) -> Result<(), SpeechError> {
            let start = std::fs::read_to_string(path)?;
            std::thread::sleep(Duration::from_millis(50));
            let end = std::fs::read_to_string(path)?;
            self.heard.lock().unwrap().push(format!("{start} -> {end}"));
            Ok(())
        }
    }

    struct Harness {
        player: Arc<RecordingPlayer>,
        output_dir: PathBuf,
        _dir: tempfile::TempDir,
    }

    fn make_context(completion: MockCompletion) -> (PipelineContext, Harness) {
        let dir = tempfile::tempdir().unwrap();
        let output_dir = dir.path().join("output");
        let player = Arc::new(RecordingPlayer::default());
        let context = PipelineContext {
            store: Arc::new(MockNoteStore::with_field("Front", &["dog", "cat"])),
            completion: Arc::new(completion),
            speech: Arc::new(MockSpeech::new()),
            player: player.clone(),
            services: Arc::new(MockServices),
            output_dir: output_dir.clone(),
            default_language: "en-US".into(),
        };
        (
            context,
            Harness {
                player,
                output_dir,
                _dir: dir,
            },
        )
    }

    fn make_request(query: &str, field: &str, play_sound: bool) -> RunRequest {
        RunRequest {
            query: query.into(),
            note_field: field.into(),
            placeholder: "#response#".into(),
            preset: PromptPreset {
                name: "Default".into(),
                prompt_list: vec!["Story with #response#".into(), "Translate #response#".into()],
                sound_language_list: vec!["en-US".into(), "zh-CN".into()],
            },
            params: CompletionParams::default(),
            play_sound,
        }
    }

    /// Send `commands`, close the channel, run the orchestrator to the end
    /// and collect every result.
    async fn drive(context: PipelineContext, commands: Vec<PipelineCommand>) -> Vec<PipelineResult> {
        let (command_tx, command_rx) = mpsc::channel(8);
        let (result_tx, mut result_rx) = mpsc::channel(32);

        for command in commands {
            command_tx.send(command).await.unwrap();
        }
        drop(command_tx);

        PipelineOrchestrator::new(context, result_tx).run(command_rx).await;

        let mut results = Vec::new();
        while let Ok(result) = result_rx.try_recv() {
            results.push(result);
        }
        results
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn run_completes_chain_without_sound() {
        let (context, harness) = make_context(MockCompletion::default());
        let results = drive(
            context,
            vec![PipelineCommand::Run(make_request("deck:*", "Front", false))],
        )
        .await;

        assert!(matches!(results[0], PipelineResult::Started));
        match &results[1] {
            PipelineResult::ChainComplete(outcome) => {
                assert_eq!(outcome.field_values, vec!["dog", "cat"]);
                assert_eq!(
                    outcome.prompts,
                    vec!["Story with ['dog', 'cat']", "Translate reply 0"]
                );
                assert_eq!(outcome.responses, vec!["reply 0", "reply 1"]);
            }
            other => panic!("expected ChainComplete, got {other:?}"),
        }
        assert_eq!(results.len(), 2);
        assert!(harness.player.played.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn successful_run_with_sound_narrates_in_order() {
        let (context, harness) = make_context(MockCompletion::default());
        let results = drive(
            context,
            vec![PipelineCommand::Run(make_request("", "Front", true))],
        )
        .await;

        assert!(results
            .iter()
            .any(|r| matches!(r, PipelineResult::ChainComplete(_))));
        assert!(results
            .iter()
            .any(|r| matches!(r, PipelineResult::NarrationFinished)));
        assert_eq!(
            *harness.player.played.lock().unwrap(),
            vec![
                harness.output_dir.join("response_0.mp3"),
                harness.output_dir.join("response_1.mp3"),
            ]
        );
    }

    #[tokio::test]
    async fn unknown_field_fails_the_run() {
        let (context, harness) = make_context(MockCompletion::default());
        let results = drive(
            context,
            vec![PipelineCommand::Run(make_request("", "Back", true))],
        )
        .await;

        match results.last() {
            Some(PipelineResult::Failed(message)) => assert!(message.contains("Back")),
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(harness.player.played.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn completion_failure_presents_nothing_and_skips_narration() {
        let (context, harness) = make_context(MockCompletion::failing_on(1));
        let results = drive(
            context,
            vec![PipelineCommand::Run(make_request("", "Front", true))],
        )
        .await;

        assert!(matches!(results.last(), Some(PipelineResult::Failed(_))));
        assert!(!results
            .iter()
            .any(|r| matches!(r, PipelineResult::ChainComplete(_))));
        assert!(harness.player.played.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_search_still_runs_chain_with_empty_list() {
        let (context, _harness) = make_context(MockCompletion::default());
        let results = drive(
            context,
            vec![PipelineCommand::Run(make_request("none", "Front", false))],
        )
        .await;

        match &results[1] {
            PipelineResult::ChainComplete(outcome) => {
                assert!(outcome.field_values.is_empty());
                assert_eq!(outcome.prompts[0], "Story with []");
            }
            other => panic!("expected ChainComplete, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stop_cancels_running_chain() {
        let (context, harness) = make_context(MockCompletion::slow(Duration::from_millis(100)));
        let results = drive(
            context,
            vec![
                PipelineCommand::Run(make_request("", "Front", true)),
                PipelineCommand::Stop,
            ],
        )
        .await;

        assert!(matches!(results.last(), Some(PipelineResult::Cancelled)));
        assert!(harness.player.played.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_models_reports_provider_models() {
        let completion = MockCompletion {
            models: vec!["gpt-4o".into(), "gpt-4o-mini".into()],
            ..MockCompletion::default()
        };
        let (context, _harness) = make_context(completion);

        let (command_tx, command_rx) = mpsc::channel(4);
        let (result_tx, mut result_rx) = mpsc::channel(4);
        let task = tokio::spawn(PipelineOrchestrator::new(context, result_tx).run(command_rx));

        command_tx.send(PipelineCommand::ListModels).await.unwrap();
        match result_rx.recv().await {
            Some(PipelineResult::Models(models)) => {
                assert_eq!(models, vec!["gpt-4o", "gpt-4o-mini"])
            }
            other => panic!("expected Models, got {other:?}"),
        }

        drop(command_tx);
        task.await.unwrap();
    }

    /// Run once and wait for the chain to complete.
    async fn run_to_completion(
        command_tx: &mpsc::Sender<PipelineCommand>,
        result_rx: &mut mpsc::Receiver<PipelineResult>,
        request: RunRequest,
    ) {
        command_tx.send(PipelineCommand::Run(request)).await.unwrap();
        loop {
            match result_rx.recv().await {
                Some(PipelineResult::ChainComplete(_)) => return,
                Some(PipelineResult::Failed(message)) => panic!("run failed: {message}"),
                Some(_) => {}
                None => panic!("orchestrator stopped"),
            }
        }
    }

    #[tokio::test]
    async fn second_run_waits_for_earlier_narration() {
        let (mut context, _harness) = make_context(MockCompletion::default());
        let player = Arc::new(SlowReadingPlayer::default());
        context.player = player.clone();

        let (command_tx, command_rx) = mpsc::channel(8);
        let (result_tx, mut result_rx) = mpsc::channel(32);
        let task = tokio::spawn(PipelineOrchestrator::new(context, result_tx).run(command_rx));

        // The second chain completes while the first narration is playing.
        run_to_completion(&command_tx, &mut result_rx, make_request("", "Front", true)).await;
        run_to_completion(&command_tx, &mut result_rx, make_request("", "Front", true)).await;
        drop(command_tx);
        task.await.unwrap();

        assert_eq!(
            *player.heard.lock().unwrap(),
            vec![
                "en-US:reply 0 -> en-US:reply 0",
                "zh-CN:reply 1 -> zh-CN:reply 1",
                "en-US:reply 2 -> en-US:reply 2",
                "zh-CN:reply 3 -> zh-CN:reply 3",
            ]
        );
    }

    #[tokio::test]
    async fn applied_settings_switch_the_model_listing_client() {
        let (context, _harness) = make_context(MockCompletion::default());
        let (command_tx, command_rx) = mpsc::channel(4);
        let (result_tx, mut result_rx) = mpsc::channel(4);
        let task = tokio::spawn(PipelineOrchestrator::new(context, result_tx).run(command_rx));

        let mut config = AppConfig::default();
        config.ai.provider = LlmProvider::Groq;
        config.ai.model = "llama-3.1-8b-instant".into();
        command_tx
            .send(PipelineCommand::ApplySettings(Box::new(config)))
            .await
            .unwrap();
        command_tx.send(PipelineCommand::ListModels).await.unwrap();

        match result_rx.recv().await {
            Some(PipelineResult::Models(models)) => {
                assert_eq!(models, vec!["Groq/llama-3.1-8b-instant"])
            }
            other => panic!("expected Models, got {other:?}"),
        }

        drop(command_tx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn applied_settings_change_default_language_and_output_dir() {
        let (context, harness) = make_context(MockCompletion::default());
        let output_dir = harness.output_dir.join("narration");

        let mut config = AppConfig::default();
        config.general.default_sound_language = "fr-FR".into();
        config.speech.output_dir = Some(output_dir.clone());

        let mut request = make_request("", "Front", true);
        request.preset.sound_language_list.clear();

        drive(
            context,
            vec![
                PipelineCommand::ApplySettings(Box::new(config)),
                PipelineCommand::Run(request),
            ],
        )
        .await;

        let audio = std::fs::read_to_string(output_dir.join("response_0.mp3")).unwrap();
        assert_eq!(audio, "fr-FR:reply 0");
        assert_eq!(
            *harness.player.played.lock().unwrap(),
            vec![output_dir.join("response_0.mp3"), output_dir.join("response_1.mp3")]
        );
    }

    #[test]
    fn request_from_config_uses_named_preset() {
        let mut config = AppConfig::default();
        config.prompt.presets.push(PromptPreset {
            name: "Quiz".into(),
            prompt_list: vec!["Quiz me on #response#".into()],
            sound_language_list: Vec::new(),
        });

        let request = RunRequest::from_config(&config, Some("Quiz")).unwrap();
        assert_eq!(request.preset.prompt_list.len(), 1);
        assert_eq!(request.query, config.general.query);
        assert!(RunRequest::from_config(&config, Some("Missing")).is_none());
        assert_eq!(
            RunRequest::from_config(&config, None).unwrap().preset.name,
            "Default"
        );
    }
}
