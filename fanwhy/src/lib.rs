//! # fanwhy
//!
//! Explains why a Linux machine's fans are running: overall CPU usage, the
//! processes consuming it, and the hottest temperature sensor, either as a
//! single snapshot or over a monitoring session.
//!
//! ```rust,no_run
//! use fanwhy::{render, Sampler};
//! use fanwhy_core::{CancelToken, SnapshotRequest};
//!
//! let sampler = Sampler::system(CancelToken::new());
//! let result = sampler.snapshot(&SnapshotRequest::new())?;
//! println!("{}", render::snapshot_text(&result));
//! # Ok::<(), fanwhy_core::SensorError>(())
//! ```

pub mod monitor;
pub mod render;
pub mod sampler;

pub use monitor::{MonitorSession, SessionSummary};
pub use sampler::{Sampler, SnapshotResult};

/// Initialise `env_logger`.
///
/// `RUST_LOG` is honoured; without it only warnings are shown. `verbose`
/// raises the level to debug regardless.
pub fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    let _ = builder.try_init();
}
