//! Device identity and the feature bitmap advertised to API clients.
//!
//! Grounded on `device_info.py`, with one deliberate divergence: MAC
//! discovery here is strict. The original fabricates a MAC from a
//! UUID5 hash of the device name; this daemon instead requires a real
//! hardware address and refuses to start without one (see
//! `resolve_mac` and DESIGN.md's Open Questions).

use bitflags::bitflags;

use crate::proto::messages::DeviceInfoResponse;

bitflags! {
    /// Matches `BluetoothProxyFeature` in the source this was distilled
    /// from; values are part of the wire contract and must not change.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FeatureFlags: u32 {
        const PASSIVE_SCAN        = 1 << 0;
        const ACTIVE_CONNECTIONS  = 1 << 1;
        const REMOTE_CACHING      = 1 << 2;
        const PAIRING             = 1 << 3;
        const CACHE_CLEARING      = 1 << 4;
        const RAW_ADVERTISEMENTS  = 1 << 5;
        const STATE_AND_MODE      = 1 << 6;
    }
}

/// A platform-specific way to discover the host's Bluetooth hardware
/// address when the BLE backend itself can't report one. No concrete
/// implementation ships here (out of scope, like the concrete BLE
/// backends); tests use a stub.
pub trait MacProbe: Send + Sync {
    fn probe(&self) -> Option<String>;
}

/// Everything this daemon reports about itself in `DeviceInfoResponse`.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub friendly_name: String,
    pub uses_password: bool,
    pub active_connections: bool,
    pub mac_address: String,
    pub bluetooth_mac_address: String,
    pub esphome_version: String,
    pub compilation_time: String,
}

pub struct DeviceInfoProvider {
    name: String,
    friendly_name: String,
    uses_password: bool,
    active_connections: bool,
}

impl DeviceInfoProvider {
    pub fn new(
        name: impl Into<String>,
        friendly_name: impl Into<String>,
        uses_password: bool,
        active_connections: bool,
    ) -> Self {
        Self {
            name: name.into(),
            friendly_name: friendly_name.into(),
            uses_password,
            active_connections,
        }
    }

    pub fn feature_flags(&self) -> FeatureFlags {
        let mut flags =
            FeatureFlags::PASSIVE_SCAN | FeatureFlags::RAW_ADVERTISEMENTS | FeatureFlags::STATE_AND_MODE;
        if self.active_connections {
            flags |= FeatureFlags::ACTIVE_CONNECTIONS
                | FeatureFlags::REMOTE_CACHING
                | FeatureFlags::PAIRING
                | FeatureFlags::CACHE_CLEARING;
        }
        flags
    }

    /// Discover the host's Bluetooth hardware address, or exit the
    /// process. Tries the BLE backend first, then `probe`; fabricating
    /// an address is never an option here, unlike the source this
    /// provider is modeled on.
    pub fn resolve_mac(adapter_mac: Option<String>, probe: &dyn MacProbe) -> String {
        if let Some(mac) = adapter_mac {
            return mac;
        }
        if let Some(mac) = probe.probe() {
            return mac;
        }
        log::error!("could not discover a Bluetooth hardware address from the backend or the host; refusing to start with a fabricated one");
        std::process::exit(1);
    }

    pub fn build(&self, mac_address: String, bluetooth_mac_address: String) -> DeviceInfo {
        DeviceInfo {
            name: self.name.clone(),
            friendly_name: self.friendly_name.clone(),
            uses_password: self.uses_password,
            active_connections: self.active_connections,
            mac_address,
            bluetooth_mac_address,
            esphome_version: env!("CARGO_PKG_VERSION").to_string(),
            compilation_time: String::new(),
        }
    }
}

impl DeviceInfo {
    pub fn to_response(&self) -> DeviceInfoResponse {
        DeviceInfoResponse {
            uses_password: self.uses_password,
            name: self.name.clone(),
            mac_address: self.mac_address.clone(),
            esphome_version: self.esphome_version.clone(),
            compilation_time: self.compilation_time.clone(),
            model: "Rust Bluetooth Proxy".to_string(),
            has_deep_sleep: false,
            project_name: "esphome.rust-bluetooth-proxy".to_string(),
            project_version: env!("CARGO_PKG_VERSION").to_string(),
            webserver_port: 0,
            manufacturer: "ESPHome Community".to_string(),
            friendly_name: self.friendly_name.clone(),
            bluetooth_proxy_feature_flags: feature_flags_for(self.active_connections).bits(),
            bluetooth_mac_address: self.bluetooth_mac_address.clone(),
        }
    }
}

fn feature_flags_for(active_connections: bool) -> FeatureFlags {
    let mut flags =
        FeatureFlags::PASSIVE_SCAN | FeatureFlags::RAW_ADVERTISEMENTS | FeatureFlags::STATE_AND_MODE;
    if active_connections {
        flags |= FeatureFlags::ACTIVE_CONNECTIONS
            | FeatureFlags::REMOTE_CACHING
            | FeatureFlags::PAIRING
            | FeatureFlags::CACHE_CLEARING;
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysNone;
    impl MacProbe for AlwaysNone {
        fn probe(&self) -> Option<String> {
            None
        }
    }

    struct AlwaysSome;
    impl MacProbe for AlwaysSome {
        fn probe(&self) -> Option<String> {
            Some("AA:BB:CC:DD:EE:FF".to_string())
        }
    }

    #[test]
    fn feature_flags_without_active_connections_is_97() {
        let provider = DeviceInfoProvider::new("dev", "Dev", false, false);
        assert_eq!(provider.feature_flags().bits(), 97);
    }

    #[test]
    fn feature_flags_with_active_connections_is_127() {
        let provider = DeviceInfoProvider::new("dev", "Dev", false, true);
        assert_eq!(provider.feature_flags().bits(), 127);
    }

    #[test]
    fn resolve_mac_prefers_adapter_over_probe() {
        let mac = DeviceInfoProvider::resolve_mac(Some("11:22:33:44:55:66".to_string()), &AlwaysSome);
        assert_eq!(mac, "11:22:33:44:55:66");
    }

    #[test]
    fn resolve_mac_falls_back_to_probe() {
        let mac = DeviceInfoProvider::resolve_mac(None, &AlwaysSome);
        assert_eq!(mac, "AA:BB:CC:DD:EE:FF");
    }
}
