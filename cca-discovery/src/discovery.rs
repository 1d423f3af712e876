//! Browse loop and iterator implementation.
//!
//! The iterator starts an mDNS daemon, browses for `_googlecast._tcp`
//! services until the deadline passes, and yields every resolved service
//! that describes an audio device or a cast group, once per device id.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use mdns_sd::{Receiver, ServiceDaemon, ServiceEvent};
use tracing::{debug, warn};

use crate::device::ServiceRecord;
use crate::error::{DiscoveryError, Result};
use crate::{CastKind, DeviceEvent};

/// mDNS service type advertised by every cast receiver.
pub const CAST_SERVICE_TYPE: &str = "_googlecast._tcp.local.";

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Iterator that discovers cast devices on the local network.
///
/// Video-capable Chromecasts are filtered out; duplicates (the same device
/// resolved on several interfaces) are yielded once.
pub struct DiscoveryIterator {
    daemon: Option<ServiceDaemon>,
    events: Option<Receiver<ServiceEvent>>,
    deadline: Instant,
    seen_ids: HashSet<String>,
}

impl DiscoveryIterator {
    /// Create a new discovery iterator that browses for `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let daemon = ServiceDaemon::new().map_err(|e| DiscoveryError::Mdns {
            action: "start mDNS daemon",
            reason: e.to_string(),
        })?;
        let events = match daemon.browse(CAST_SERVICE_TYPE) {
            Ok(events) => events,
            Err(e) => {
                let _ = daemon.shutdown();
                return Err(DiscoveryError::Mdns {
                    action: "browse for cast devices",
                    reason: e.to_string(),
                });
            }
        };

        Ok(Self {
            daemon: Some(daemon),
            events: Some(events),
            deadline: Instant::now() + timeout,
            seen_ids: HashSet::new(),
        })
    }

    /// Create an empty iterator that yields no results
    pub(crate) fn empty() -> Self {
        Self {
            daemon: None,
            events: None,
            deadline: Instant::now(),
            seen_ids: HashSet::new(),
        }
    }

    fn shutdown(&mut self) {
        self.events = None;
        if let Some(daemon) = self.daemon.take() {
            if let Err(e) = daemon.stop_browse(CAST_SERVICE_TYPE) {
                debug!("failed to stop mDNS browse cleanly: {}", e);
            }
            let _ = daemon.shutdown();
        }
    }
}

impl Iterator for DiscoveryIterator {
    type Item = DeviceEvent;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let events = self.events.as_ref()?;
            let now = Instant::now();
            if now >= self.deadline {
                self.shutdown();
                return None;
            }

            let wait = self.deadline.saturating_duration_since(now).min(POLL_INTERVAL);
            let Ok(event) = events.recv_timeout(wait) else {
                continue;
            };
            let ServiceEvent::ServiceResolved(info) = event else {
                continue;
            };

            let record = ServiceRecord::from_service_info(&info);
            let device = match record.to_descriptor() {
                Ok(device) => device,
                Err(e) => {
                    warn!("skipping cast service: {}", e);
                    continue;
                }
            };

            if device.kind == CastKind::Video {
                debug!(name = %device.name, model = %device.model_name, "ignoring video device");
                continue;
            }
            if !self.seen_ids.insert(device.id.clone()) {
                continue;
            }

            debug!(name = %device.name, kind = ?device.kind, ip = %device.ip_address, "found cast device");
            return Some(DeviceEvent::Found(device));
        }
    }
}

impl Drop for DiscoveryIterator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
