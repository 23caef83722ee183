//! RTM bot - main library
//!
//! ## Architecture
//!
//! - **rtmsockets**: session engine (re-exported from workspace)
//! - **chat_client**: Web API client and `rtm.start` handshake (re-exported from workspace)
//! - **config / logging / shutdown**: process-level plumbing shared by binaries
//! - **bin_common**: CLI and runner helpers for binaries
//!
//! ## Usage in Binaries
//!
//! ```rust,ignore
//! use rtm_bot::bin_common::{load_config_from_env, ConfigType};
//! use rtm_bot::config::BotConfig;
//! ```

// Re-export workspace libraries for convenience
pub use chat_client;
pub use rtmsockets;

pub mod config;
pub mod logging;
pub mod shutdown;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod runner;

    pub use cli::{load_config_from_env, ConfigType};
    pub use runner::{BinaryRunner, RunConfig};
}

pub use config::{BotConfig, ConfigError};
pub use shutdown::ShutdownManager;
