// src/export/transport.rs
//! Collaborators consumed by the pipeline
//!
//! The transport protocol and network reachability detection live outside
//! this crate. Hosts plug them in through [`SpanSender`] and
//! [`ConnectivityOracle`].

use crate::export::record::EncodedBatch;
use crate::utils::errors::Result;

/// Synchronous delivery of one encoded batch to the collector
///
/// Connection timeouts are the sender's responsibility; the pipeline never
/// interrupts an in-flight send.
pub trait SpanSender: Send + Sync {
    fn send(&self, batch: &EncodedBatch) -> Result<()>;

    /// Release transport resources
    fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// Result of a reachability probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkStatus {
    online: bool,
}

impl NetworkStatus {
    pub const ONLINE: NetworkStatus = NetworkStatus { online: true };
    pub const OFFLINE: NetworkStatus = NetworkStatus { online: false };

    pub fn is_online(&self) -> bool {
        self.online
    }
}

/// Network reachability source
pub trait ConnectivityOracle: Send + Sync {
    /// Re-probe the network and return the current status
    fn refresh_network_status(&self) -> NetworkStatus;
}

/// Oracle for hosts without reachability detection
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl ConnectivityOracle for AlwaysOnline {
    fn refresh_network_status(&self) -> NetworkStatus {
        NetworkStatus::ONLINE
    }
}
