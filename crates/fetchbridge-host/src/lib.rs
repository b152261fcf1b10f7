//! Host side of the fetch bridge.
//!
//! [`Runtime`] owns the guest event loop and promise bridge. Each inbound
//! request gets its own [`IoContext`] and a [`Fetcher`] bound to it, and is
//! handed to a guest [`Handler`] through the promise bridge. The actual
//! network call is delegated to a [`HostTransport`].

pub mod config;
pub mod fetch;
pub mod io_context;
pub mod runtime;
pub mod transport;

pub use config::HostConfig;
pub use fetch::Fetcher;
pub use io_context::{ExtendGuard, FetchToken, IoContext};
pub use runtime::{GuestRequest, Handler, Runtime};
pub use transport::{FetchRequest, FetchResult, HostTransport, TransportFuture};

use fetchbridge_core::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured filter. Does nothing if
/// a subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.filter()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if config.json() {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
