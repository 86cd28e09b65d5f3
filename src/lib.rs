//! Git workflow automation for locally registered repositories.
//!
//! Registers working trees and detects their GitHub remote, drives the
//! stage → commit → push → pull request pipeline, caches pull requests
//! locally and turns a selection of them into a weekly report.

pub mod config;
pub mod db;
pub mod error;
pub mod git;
pub mod host;
pub mod services;
pub mod state;
pub mod textgen;

#[cfg(test)]
mod test_support;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use state::AppState;

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the INFO default.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .try_init();
}
