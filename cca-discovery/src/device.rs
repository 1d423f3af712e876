//! Cast service record parsing and classification.
//!
//! A resolved `_googlecast._tcp` service carries its identity in TXT
//! properties: `fn` (friendly name), `md` (model), `id` (device id) and
//! `ca` (capability bit mask). This module turns those into a
//! [`DeviceDescriptor`] and decides whether the device is an audio-only
//! endpoint, a cast group, or something we ignore.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use crate::error::{DiscoveryError, Result};
use crate::{CastKind, DeviceDescriptor};

/// Model string advertised by speaker groups.
pub const GROUP_MODEL: &str = "Google Cast Group";

/// Model string advertised by Chromecast Audio pucks.
pub const AUDIO_MODEL: &str = "Chromecast Audio";

/// Capability bit for video output.
const CAPABILITY_VIDEO_OUT: u32 = 0x01;

/// A resolved mDNS service, reduced to the parts discovery cares about.
#[derive(Debug, Clone, Default)]
pub struct ServiceRecord {
    pub fullname: String,
    pub hostname: String,
    pub addresses: Vec<Ipv4Addr>,
    pub port: u16,
    pub properties: HashMap<String, String>,
}

impl ServiceRecord {
    /// Build a record from an mdns-sd resolved service.
    pub(crate) fn from_service_info(info: &mdns_sd::ServiceInfo) -> Self {
        let properties = ["fn", "md", "id", "ca"]
            .iter()
            .filter_map(|key| {
                info.get_property_val_str(key)
                    .map(|value| (key.to_string(), value.to_string()))
            })
            .collect();

        Self {
            fullname: info.get_fullname().to_string(),
            hostname: info.get_hostname().to_string(),
            addresses: info.get_addresses_v4().into_iter().copied().collect(),
            port: info.get_port(),
            properties,
        }
    }

    fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Convert the record into a device descriptor.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::NoAddress` when the record has no IPv4
    /// address to connect to.
    pub fn to_descriptor(&self) -> Result<DeviceDescriptor> {
        let mut addresses = self.addresses.clone();
        addresses.sort();
        let address = addresses
            .first()
            .ok_or_else(|| DiscoveryError::NoAddress(self.fullname.clone()))?;

        let name = self
            .property("fn")
            .map(ToString::to_string)
            .unwrap_or_else(|| instance_name(&self.fullname));
        let model_name = self.property("md").unwrap_or_default().to_string();
        let id = self
            .property("id")
            .map(ToString::to_string)
            .unwrap_or_else(|| format!("{}:{}:{}", self.hostname.trim_end_matches('.'), address, self.port));
        let capabilities = self.property("ca").and_then(|ca| ca.parse::<u32>().ok());

        Ok(DeviceDescriptor {
            kind: classify(&model_name, capabilities),
            id,
            name,
            model_name,
            ip_address: address.to_string(),
            port: self.port,
        })
    }
}

/// Decide what kind of cast endpoint a model/capability pair describes.
///
/// Groups are recognised by model name. Anything without video output, or
/// that calls itself a Chromecast Audio, is an audio device. The rest are
/// video Chromecasts and TVs.
pub fn classify(model_name: &str, capabilities: Option<u32>) -> CastKind {
    if model_name == GROUP_MODEL {
        return CastKind::Group;
    }
    if model_name == AUDIO_MODEL {
        return CastKind::Audio;
    }
    match capabilities {
        Some(ca) if ca & CAPABILITY_VIDEO_OUT == 0 => CastKind::Audio,
        _ => CastKind::Video,
    }
}

/// Extract the instance part of an mDNS full name.
///
/// `Kitchen-abc123._googlecast._tcp.local.` becomes `Kitchen-abc123`.
fn instance_name(fullname: &str) -> String {
    fullname
        .split("._googlecast.")
        .next()
        .filter(|value| !value.is_empty())
        .unwrap_or(fullname)
        .trim_matches('.')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn record(props: &[(&str, &str)]) -> ServiceRecord {
        ServiceRecord {
            fullname: "Chromecast-Audio-1234._googlecast._tcp.local.".to_string(),
            hostname: "1234.local.".to_string(),
            addresses: vec![Ipv4Addr::new(192, 168, 1, 40)],
            port: 8009,
            properties: props
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[rstest]
    #[case("Google Cast Group", Some(4), CastKind::Group)]
    #[case("Chromecast Audio", Some(4), CastKind::Audio)]
    #[case("Chromecast Audio", None, CastKind::Audio)]
    #[case("Google Home Mini", Some(2052), CastKind::Audio)]
    #[case("Chromecast", Some(5), CastKind::Video)]
    #[case("Chromecast Ultra", None, CastKind::Video)]
    fn test_classify(
        #[case] model: &str,
        #[case] capabilities: Option<u32>,
        #[case] expected: CastKind,
    ) {
        assert_eq!(classify(model, capabilities), expected);
    }

    #[test]
    fn test_to_descriptor_reads_txt_properties() {
        let rec = record(&[
            ("fn", "Living Room"),
            ("md", "Chromecast Audio"),
            ("id", "abcdef0123"),
            ("ca", "2052"),
        ]);

        let device = rec.to_descriptor().unwrap();
        assert_eq!(device.name, "Living Room");
        assert_eq!(device.model_name, "Chromecast Audio");
        assert_eq!(device.id, "abcdef0123");
        assert_eq!(device.kind, CastKind::Audio);
        assert_eq!(device.ip_address, "192.168.1.40");
        assert_eq!(device.port, 8009);
    }

    #[test]
    fn test_to_descriptor_falls_back_to_instance_name() {
        let rec = record(&[("md", "Google Cast Group"), ("fn", "  ")]);

        let device = rec.to_descriptor().unwrap();
        assert_eq!(device.name, "Chromecast-Audio-1234");
        assert_eq!(device.kind, CastKind::Group);
        assert_eq!(device.id, "1234.local:192.168.1.40:8009");
    }

    #[test]
    fn test_to_descriptor_picks_lowest_address() {
        let mut rec = record(&[("fn", "Den")]);
        rec.addresses = vec![Ipv4Addr::new(10, 0, 0, 9), Ipv4Addr::new(10, 0, 0, 3)];

        assert_eq!(rec.to_descriptor().unwrap().ip_address, "10.0.0.3");
    }

    #[test]
    fn test_to_descriptor_without_address() {
        let mut rec = record(&[("fn", "Den")]);
        rec.addresses.clear();

        assert!(matches!(
            rec.to_descriptor(),
            Err(DiscoveryError::NoAddress(_))
        ));
    }

    #[test]
    fn test_instance_name() {
        assert_eq!(instance_name("Office._googlecast._tcp.local."), "Office");
        assert_eq!(instance_name("plain"), "plain");
    }
}
