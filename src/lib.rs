pub mod action;
pub mod agent_engine;
pub mod config;
pub mod device;
pub mod errors;
pub mod executor;
pub mod fallback;
pub mod launcher;
pub mod perception;

pub use action::{parse, Action, ParsedTurn};
pub use agent_engine::{AgentEngine, DecisionModel, StepReport};
pub use config::{load_config, AppConfig};
pub use device::{adb::AdbDevice, DeviceLink};
pub use errors::{MobileClawError, MobileClawResult};
pub use executor::{ActionExecutor, ExecutionResult};

/// Installs the global `tracing` subscriber (filter from `RUST_LOG`, default
/// `info`) and loads `.env` if present. Call once at startup.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    // Load .env file if present (ignore error if not found)
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!(error = %e, "no .env loaded");
    }
}
