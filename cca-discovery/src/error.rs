//! Discovery errors

use std::fmt;

#[derive(Debug)]
pub enum DiscoveryError {
    /// The mDNS daemon could not be started or refused the browse
    Mdns { action: &'static str, reason: String },
    /// A resolved cast service has no IPv4 address to connect to
    NoAddress(String),
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryError::Mdns { action, reason } => write!(f, "Failed to {}: {}", action, reason),
            DiscoveryError::NoAddress(service) => write!(f, "{} has no IPv4 address", service),
        }
    }
}

impl std::error::Error for DiscoveryError {}

pub type Result<T> = std::result::Result<T, DiscoveryError>;
