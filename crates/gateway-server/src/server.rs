//! HTTP server lifecycle: bind, serve, and graceful shutdown.

use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use crate::{routes::create_router, state::AppState};

/// Server errors
#[derive(Debug, Error)]
pub enum ServerError {
    /// Listen address could not be parsed
    #[error("Invalid listen address {address}: {message}")]
    InvalidAddress {
        /// Offending address
        address: String,
        /// Parse error
        message: String,
    },

    /// Socket could not be bound
    #[error("Failed to bind to {address}: {source}")]
    Bind {
        /// Address being bound
        address: SocketAddr,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Server loop failed
    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// The gateway HTTP server
#[derive(Debug)]
pub struct Server {
    addr: SocketAddr,
    state: AppState,
}

impl Server {
    /// Create a server for `host:port`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address does not parse.
    pub fn new(host: &str, port: u16, state: AppState) -> Result<Self, ServerError> {
        let address = format!("{host}:{port}");
        let addr = address
            .parse()
            .map_err(|e: std::net::AddrParseError| ServerError::InvalidAddress {
                address,
                message: e.to_string(),
            })?;
        Ok(Self { addr, state })
    }

    /// Listen address
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve until a shutdown signal arrives, letting in-flight requests finish.
    ///
    /// # Errors
    ///
    /// Returns an error if binding or serving fails.
    pub async fn run(self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|source| ServerError::Bind {
                address: self.addr,
                source,
            })?;

        info!(addr = %self.addr, "Gateway listening");

        axum::serve(listener, create_router(self.state))
            .with_graceful_shutdown(async {
                let signal_name = shutdown_signal().await;
                info!(signal = signal_name, "Draining connections");
            })
            .await
            .map_err(ServerError::Serve)?;

        info!("Gateway stopped");
        Ok(())
    }
}

/// Wait for Ctrl+C or, on unix, SIGTERM/SIGINT/SIGQUIT.
///
/// A handler that fails to install is logged and never fires.
pub async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        "ctrl+c"
    };

    #[cfg(unix)]
    let sigterm = unix_signal(signal::unix::SignalKind::terminate(), "sigterm");
    #[cfg(unix)]
    let sigint = unix_signal(signal::unix::SignalKind::interrupt(), "sigint");
    #[cfg(unix)]
    let sigquit = unix_signal(signal::unix::SignalKind::quit(), "sigquit");

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<&'static str>();
    #[cfg(not(unix))]
    let sigint = std::future::pending::<&'static str>();
    #[cfg(not(unix))]
    let sigquit = std::future::pending::<&'static str>();

    let signal_name = tokio::select! {
        name = ctrl_c => name,
        name = sigterm => name,
        name = sigint => name,
        name = sigquit => name,
    };

    info!(signal = signal_name, "Received shutdown signal");
    signal_name
}

#[cfg(unix)]
async fn unix_signal(kind: signal::unix::SignalKind, name: &'static str) -> &'static str {
    match signal::unix::signal(kind) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            error!(signal = name, error = %e, "Failed to install signal handler");
            std::future::pending::<()>().await;
        }
    }
    name
}
