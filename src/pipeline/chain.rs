//! Completion runner: feeds a prompt chain to the completion endpoint one
//! stage at a time.
//!
//! Stage `i + 1` is only built once stage `i` has answered, because its
//! prompt embeds that answer.  The chain is all-or-nothing: any failure
//! discards every response gathered so far.

use thiserror::Error;

use crate::llm::{ChatCompletion, CompletionParams, LlmError, PromptTemplate};

use super::state::{ChainState, StopSignal};

// ---------------------------------------------------------------------------
// ChainError / ChainOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("the prompt chain has no stages")]
    EmptyChain,

    #[error("prompt {index} failed: {source}")]
    Stage {
        index: usize,
        #[source]
        source: LlmError,
    },

    #[error("stopped before prompt {next}")]
    Cancelled { next: usize },
}

/// Everything a finished chain produced, ready for presentation.
///
/// `prompts` and `responses` always have the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutcome {
    pub field_values: Vec<String>,
    pub prompts: Vec<String>,
    pub responses: Vec<String>,
}

// ---------------------------------------------------------------------------
// CompletionRunner
// ---------------------------------------------------------------------------

/// Runs one chain against a [`ChatCompletion`] backend.
pub struct CompletionRunner<'a> {
    completion: &'a dyn ChatCompletion,
    template: &'a PromptTemplate,
    params: &'a CompletionParams,
    stop: StopSignal,
    state: ChainState,
}

impl<'a> CompletionRunner<'a> {
    pub fn new(
        completion: &'a dyn ChatCompletion,
        template: &'a PromptTemplate,
        params: &'a CompletionParams,
        stop: StopSignal,
    ) -> Self {
        Self {
            completion,
            template,
            params,
            stop,
            state: ChainState::Idle,
        }
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    /// Run every stage in order, starting from the note values.
    pub async fn run(&mut self, field_values: Vec<String>) -> Result<ChainOutcome, ChainError> {
        let result = self.run_stages(&field_values).await;
        self.state = if result.is_ok() {
            ChainState::Done
        } else {
            ChainState::Failed
        };

        let (prompts, responses) = result?;
        Ok(ChainOutcome {
            field_values,
            prompts,
            responses,
        })
    }

    async fn run_stages(
        &mut self,
        field_values: &[String],
    ) -> Result<(Vec<String>, Vec<String>), ChainError> {
        let mut prompt = self
            .template
            .first(field_values)
            .ok_or(ChainError::EmptyChain)?;

        let total = self.template.len();
        let mut prompts = Vec::with_capacity(total);
        let mut responses = Vec::with_capacity(total);

        for index in 0..total {
            if self.stop.is_stopped() {
                log::info!("chain: stopped before prompt {index}");
                return Err(ChainError::Cancelled { next: index });
            }

            self.state = ChainState::Requesting(index);
            log::debug!("chain: prompt {}/{} ({} chars)", index + 1, total, prompt.len());

            let response = self
                .completion
                .complete(&prompt, self.params)
                .await
                .map_err(|source| ChainError::Stage { index, source })?;
            self.state = ChainState::Idle;

            let next = self.template.next(index + 1, &response);
            prompts.push(prompt);
            responses.push(response);

            match next {
                Some(p) => prompt = p,
                None => break,
            }
        }

        Ok((prompts, responses))
    }
}

/// Convenience wrapper: build a [`CompletionRunner`] and run it.
pub async fn run_chain(
    completion: &dyn ChatCompletion,
    template: &PromptTemplate,
    field_values: Vec<String>,
    params: &CompletionParams,
    stop: StopSignal,
) -> Result<ChainOutcome, ChainError> {
    CompletionRunner::new(completion, template, params, stop)
        .run(field_values)
        .await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::llm::MockCompletion;

    fn template(stages: &[&str]) -> PromptTemplate {
        PromptTemplate::new("#r#", stages.iter().map(|s| s.to_string()).collect())
    }

    fn values() -> Vec<String> {
        vec!["dog".into(), "cat".into()]
    }

    #[tokio::test]
    async fn each_prompt_embeds_previous_response() {
        let completion = MockCompletion::default();
        let template = template(&["Story: #r#", "Translate: #r#", "Summarize: #r#"]);
        let params = CompletionParams::default();

        let outcome = run_chain(&completion, &template, values(), &params, StopSignal::new())
            .await
            .unwrap();

        assert_eq!(
            outcome.prompts,
            vec![
                "Story: ['dog', 'cat']",
                "Translate: reply 0",
                "Summarize: reply 1"
            ]
        );
        assert_eq!(outcome.responses, vec!["reply 0", "reply 1", "reply 2"]);
        assert_eq!(outcome.field_values, values());
        assert_eq!(completion.seen_prompts(), outcome.prompts);
    }

    #[tokio::test]
    async fn failure_at_any_stage_discards_everything() {
        for k in 0..3 {
            let completion = MockCompletion::failing_on(k);
            let template = template(&["a #r#", "b #r#", "c #r#"]);
            let params = CompletionParams::default();
            let mut runner =
                CompletionRunner::new(&completion, &template, &params, StopSignal::new());

            let err = runner.run(values()).await.unwrap_err();
            match err {
                ChainError::Stage { index, .. } => assert_eq!(index, k),
                other => panic!("expected Stage error, got {other:?}"),
            }
            assert_eq!(runner.state(), ChainState::Failed);
            // No stage after the failing one is attempted.
            assert_eq!(completion.seen_prompts().len(), k + 1);
        }
    }

    #[tokio::test]
    async fn successful_run_ends_done() {
        let completion = MockCompletion::default();
        let template = template(&["only #r#"]);
        let params = CompletionParams::default();
        let mut runner = CompletionRunner::new(&completion, &template, &params, StopSignal::new());

        assert_eq!(runner.state(), ChainState::Idle);
        runner.run(Vec::new()).await.unwrap();
        assert_eq!(runner.state(), ChainState::Done);
        assert_eq!(completion.seen_prompts(), vec!["only []"]);
    }

    #[tokio::test]
    async fn empty_chain_is_an_error() {
        let completion = MockCompletion::default();
        let params = CompletionParams::default();
        let err = run_chain(&completion, &template(&[]), values(), &params, StopSignal::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::EmptyChain));
        assert!(completion.seen_prompts().is_empty());
    }

    /// Raises the stop signal while answering its first prompt.
    struct StopsDuringFirstCall {
        stop: StopSignal,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl ChatCompletion for StopsDuringFirstCall {
        async fn complete(&self, _prompt: &str, _p: &CompletionParams) -> Result<String, LlmError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.stop.stop();
            Ok("answer".into())
        }
    }

    #[tokio::test]
    async fn stop_signal_ends_chain_between_stages() {
        let stop = StopSignal::new();
        let completion = StopsDuringFirstCall {
            stop: stop.clone(),
            calls: Default::default(),
        };
        let template = template(&["a #r#", "b #r#", "c #r#"]);
        let params = CompletionParams::default();

        let err = run_chain(&completion, &template, values(), &params, stop)
            .await
            .unwrap_err();

        assert!(matches!(err, ChainError::Cancelled { next: 1 }));
        assert_eq!(completion.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
