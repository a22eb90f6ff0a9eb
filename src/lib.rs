//! Outreach Dispatch: quota-bounded, at-most-once outreach email sender.

pub mod config;
pub mod delivery;
pub mod error;
pub mod llm;
pub mod outreach;
pub mod retry;
pub mod store;
