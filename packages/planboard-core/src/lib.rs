//! Core of the feature plan board: the plan document codec, card diffing,
//! per-card audit logs, storage backends and the session that ties them
//! together. Hosts (the `planboard` CLI, a board view) talk to a
//! `PlanSession` through the messages in `protocol`.
pub mod actor;
pub mod audit_log;
pub mod config;
pub mod diff;
pub mod parser;
pub mod protocol;
pub mod session;
pub mod storage;
pub mod types;
pub mod watcher;
