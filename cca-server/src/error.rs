//! Error types for the HTTP server

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("Failed to start server runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("Server stopped before it was ready")]
    Startup,
}

pub type Result<T> = std::result::Result<T, ServerError>;
