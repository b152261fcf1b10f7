pub mod config;
pub mod error;

pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult};
