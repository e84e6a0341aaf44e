//! Subcommand implementations

pub mod alerts;
pub mod detect;
pub mod health;
