//! Research configuration stored in `researcher.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::budget::{PlanBudget, WorkerLimits};
use crate::core::retry::RetryPolicy;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "researcher.toml";
/// Exclusive upper bound for worker jitter.
const MAX_JITTER_MS: u64 = 1000;

/// Research configuration (TOML).
///
/// Missing fields default to the values the research loop was tuned with.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResearchConfig {
    pub oracle: OracleConfig,
    pub budget: BudgetConfig,
    pub worker: WorkerConfig,
    pub retry: RetryConfig,
    pub digest: DigestConfig,
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OracleConfig {
    pub model: String,
    /// Base URL of an OpenAI-compatible chat completions API.
    pub api_base: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub request_timeout_secs: u64,
    pub planning_temperature: f32,
    pub evaluation_temperature: f32,
    pub synthesis_temperature: f32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            model: "gpt-5-nano".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            request_timeout_secs: 120,
            planning_temperature: 0.0,
            evaluation_temperature: 0.0,
            synthesis_temperature: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BudgetConfig {
    pub max_phases_per_plan: usize,
    pub max_tasks_per_phase: usize,
    /// Ceiling on phases across every planning iteration of a run.
    pub max_total_phases: usize,
    pub max_planning_iterations: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        let budget = PlanBudget::default();
        Self {
            max_phases_per_plan: budget.max_phases_per_plan,
            max_tasks_per_phase: budget.max_tasks_per_phase,
            max_total_phases: budget.max_total_phases,
            max_planning_iterations: budget.max_planning_iterations,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkerConfig {
    pub max_iterations: u32,
    pub max_tool_calls: u32,
    /// Workers running at once within a phase.
    pub concurrency: usize,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let limits = WorkerLimits::default();
        Self {
            max_iterations: limits.max_iterations,
            max_tool_calls: limits.max_tool_calls,
            concurrency: 3,
            jitter_min_ms: 100,
            jitter_max_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    /// Rate-limit backoff is `rate_limit_unit_ms * attempt`.
    pub rate_limit_unit_ms: u64,
    pub api_error_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limit_unit_ms: 2000,
            api_error_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DigestConfig {
    /// Characters of each task output shown to the evaluation gate.
    pub evaluation_preview_chars: usize,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            evaluation_preview_chars: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolsConfig {
    pub search_max_results: usize,
    pub fetch_max_results: usize,
    pub fetch_timeout_secs: u64,
    /// Truncate fetched page text beyond this many characters.
    pub fetch_limit_chars: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            search_max_results: 5,
            fetch_max_results: 3,
            fetch_timeout_secs: 15,
            fetch_limit_chars: 20_000,
        }
    }
}

impl ResearchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.oracle.model.trim().is_empty() {
            return Err(anyhow!("oracle.model must be non-empty"));
        }
        if self.oracle.api_key_env.trim().is_empty() {
            return Err(anyhow!("oracle.api_key_env must be non-empty"));
        }
        if self.oracle.request_timeout_secs == 0 {
            return Err(anyhow!("oracle.request_timeout_secs must be > 0"));
        }
        for (name, value) in [
            ("oracle.planning_temperature", self.oracle.planning_temperature),
            ("oracle.evaluation_temperature", self.oracle.evaluation_temperature),
            ("oracle.synthesis_temperature", self.oracle.synthesis_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(anyhow!("{name} must be within [0, 2]"));
            }
        }
        if self.budget.max_phases_per_plan == 0 {
            return Err(anyhow!("budget.max_phases_per_plan must be > 0"));
        }
        if self.budget.max_tasks_per_phase == 0 {
            return Err(anyhow!("budget.max_tasks_per_phase must be > 0"));
        }
        if self.budget.max_total_phases == 0 {
            return Err(anyhow!("budget.max_total_phases must be > 0"));
        }
        if self.budget.max_planning_iterations == 0 {
            return Err(anyhow!("budget.max_planning_iterations must be > 0"));
        }
        if self.worker.max_iterations == 0 {
            return Err(anyhow!("worker.max_iterations must be > 0"));
        }
        if self.worker.concurrency == 0 {
            return Err(anyhow!("worker.concurrency must be > 0"));
        }
        if self.worker.jitter_min_ms > self.worker.jitter_max_ms {
            return Err(anyhow!("worker.jitter_min_ms must be <= worker.jitter_max_ms"));
        }
        if self.worker.jitter_max_ms >= MAX_JITTER_MS {
            return Err(anyhow!("worker.jitter_max_ms must be < {MAX_JITTER_MS}"));
        }
        if self.retry.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be > 0"));
        }
        if self.digest.evaluation_preview_chars == 0 {
            return Err(anyhow!("digest.evaluation_preview_chars must be > 0"));
        }
        if self.tools.fetch_timeout_secs == 0 {
            return Err(anyhow!("tools.fetch_timeout_secs must be > 0"));
        }
        Ok(())
    }

    pub fn plan_budget(&self) -> PlanBudget {
        PlanBudget {
            max_phases_per_plan: self.budget.max_phases_per_plan,
            max_tasks_per_phase: self.budget.max_tasks_per_phase,
            max_total_phases: self.budget.max_total_phases,
            max_planning_iterations: self.budget.max_planning_iterations,
        }
    }

    pub fn worker_limits(&self) -> WorkerLimits {
        WorkerLimits {
            max_iterations: self.worker.max_iterations,
            max_tool_calls: self.worker.max_tool_calls,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            rate_limit_unit: Duration::from_millis(self.retry.rate_limit_unit_ms),
            api_error_delay: Duration::from_millis(self.retry.api_error_delay_ms),
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ResearchConfig::default()`.
pub fn load_config(path: &Path) -> Result<ResearchConfig> {
    if !path.exists() {
        let cfg = ResearchConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ResearchConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ResearchConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

/// Resolve the oracle API key through `lookup` (normally `std::env::var`).
///
/// A missing or blank value is a startup error.
pub fn resolve_api_key<F>(cfg: &OracleConfig, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let key = lookup(&cfg.api_key_env)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .with_context(|| format!("{} is not set", cfg.api_key_env))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, ResearchConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("researcher.toml");
        let mut cfg = ResearchConfig::default();
        cfg.budget.max_total_phases = 6;
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("researcher.toml");
        fs::write(&path, "[worker]\nconcurrency = 5\n").expect("write");

        let cfg = load_config(&path).expect("load");

        assert_eq!(cfg.worker.concurrency, 5);
        assert_eq!(cfg.worker.max_iterations, 15);
        assert_eq!(cfg.budget, BudgetConfig::default());
        assert_eq!(cfg.plan_budget(), PlanBudget::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut cfg = ResearchConfig::default();
        cfg.worker.concurrency = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = ResearchConfig::default();
        cfg.worker.jitter_min_ms = 900;
        assert!(cfg.validate().is_err());

        let mut cfg = ResearchConfig::default();
        cfg.worker.jitter_max_ms = 1000;
        assert!(cfg.validate().is_err());
        cfg.worker.jitter_max_ms = 999;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn retry_policy_converts_milliseconds() {
        let cfg = ResearchConfig::default();
        assert_eq!(cfg.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn missing_or_blank_key_is_an_error() {
        let cfg = OracleConfig::default();
        assert!(resolve_api_key(&cfg, |_| None).is_err());
        assert!(resolve_api_key(&cfg, |_| Some("  ".to_string())).is_err());

        let key = resolve_api_key(&cfg, |name| {
            (name == "OPENAI_API_KEY").then(|| "sk-test".to_string())
        })
        .expect("key");
        assert_eq!(key, "sk-test");
    }
}
