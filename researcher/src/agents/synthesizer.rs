//! Synthesis: turns every completed finding of the run into the final report.

use anyhow::{Context, Result, bail};
use tracing::{info, instrument};

use crate::core::digest::findings_for_synthesis;
use crate::core::types::Plan;
use crate::io::oracle::{Answer, Oracle, ask_text};
use crate::io::prompt::{PromptEngine, SynthesizerPrompt};

#[derive(Debug, Clone, Copy)]
pub struct SynthesizerAgent {
    temperature: f32,
}

impl SynthesizerAgent {
    pub fn new(temperature: f32) -> Self {
        Self { temperature }
    }

    /// Write the report from the findings of all plans in `history`.
    #[instrument(skip_all, fields(plans = history.len()))]
    pub async fn run(
        &self,
        oracle: &dyn Oracle,
        prompts: &PromptEngine,
        query: &str,
        history: &[Plan],
    ) -> Result<Answer<String>> {
        let phases = findings_for_synthesis(history);
        let strategy_rationale = history
            .last()
            .map(|plan| plan.strategy_rationale.as_str())
            .unwrap_or_default();
        let messages = prompts.synthesizer_messages(&SynthesizerPrompt {
            query,
            strategy_rationale,
            phases: &phases,
        })?;

        let answer = ask_text(oracle, "synthesizer", messages, self.temperature)
            .await
            .context("synthesis request")?;
        if answer.value.trim().is_empty() {
            bail!("synthesizer returned an empty report");
        }
        info!(
            phases = phases.len(),
            chars = answer.value.chars().count(),
            "report synthesized"
        );
        Ok(answer)
    }
}
