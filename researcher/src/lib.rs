//! Multi-round research orchestration.
//!
//! A query is answered by repeatedly planning phases of research tasks,
//! executing each phase on a bounded worker pool, and judging whether the
//! findings suffice. Once they do, or a budget runs out, the findings are
//! synthesized into a report.
//!
//! - **[`core`]**: Pure, deterministic logic (budgets, governance, routing,
//!   run state). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting collaborators (the oracle, web tools, prompts,
//!   configuration, run artifacts).
//! - **[`agents`]**: The planner, worker, evaluator and synthesizer roles.
//!
//! [`orchestrator`] sequences them; [`scheduler`] runs one phase at a time.

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod scheduler;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
