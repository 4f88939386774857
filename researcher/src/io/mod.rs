//! Side-effecting collaborators: configuration, the oracle, tools, prompts and
//! run artifacts.

pub mod config;
pub mod openai;
pub mod oracle;
pub mod prompt;
pub mod run_log;
pub mod tools;
pub mod web;
