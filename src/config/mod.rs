//! Configuration for launching and talking to the remote application.
//!
//! This module provides:
//!
//! - [`BridgeConfig`] and [`BridgeConfigBuilder`] for launching a process
//! - [`ProtocolOptions`] for channels obtained some other way
//! - [`RequestOrdering`] and the launch defaults
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use libbridge::config::{BridgeConfig, RequestOrdering};
//!
//! let config = BridgeConfig::builder()
//!     .executable("blender")
//!     .call_timeout(Duration::from_secs(30))
//!     .ordering(RequestOrdering::Serialized)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.call_timeout(), Some(Duration::from_secs(30)));
//! ```

pub mod builder;
pub mod options;

pub use builder::{BridgeConfig, BridgeConfigBuilder};
pub use options::{
    ProtocolOptions, RequestOrdering, DEFAULT_EXECUTABLE, DEFAULT_LAUNCH_ARGS,
    DEFAULT_READY_TIMEOUT, DEFAULT_SCRIPT_FLAG, DEFAULT_SHUTDOWN_GRACE, ENV_EXECUTABLE,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_exports_accessible() {
        let _: RequestOrdering = RequestOrdering::Pipelined;
        let _: ProtocolOptions = ProtocolOptions::default();
        let _: &str = ENV_EXECUTABLE;
        let _: &str = DEFAULT_EXECUTABLE;
    }

    #[test]
    fn builder_accessible() {
        let _ = BridgeConfig::builder();
    }
}
