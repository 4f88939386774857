//! Oracle-facing roles: planner, worker, evaluator and synthesizer.
//!
//! Agents own their prompts and per-role settings. They never touch
//! `RunState`; the orchestrator applies their results.

pub mod evaluator;
pub mod planner;
pub mod synthesizer;
pub mod worker;
