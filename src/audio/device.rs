use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host, SupportedStreamConfig};
use log::{debug, warn};
use std::collections::BTreeMap;
use crate::error::AudioError;

const COMMON_RATES: [u32; 6] = [44_100, 48_000, 88_200, 96_000, 176_400, 192_000];

/// Information about an audio device's capabilities
#[derive(Debug, Clone)]
pub struct DeviceCapabilities {
    pub name: String,
    pub supported_sample_rates: Vec<u32>,
    pub max_channels: u16,
    pub default_config: SupportedStreamConfig,
}

/// Manages output device enumeration and selection
pub struct DeviceManager {
    host: Host,
    devices: BTreeMap<String, Device>,
    capabilities: BTreeMap<String, DeviceCapabilities>,
    current_device: Option<Device>,
}

impl DeviceManager {
    pub fn new() -> Result<Self, AudioError> {
        let mut manager = DeviceManager {
            host: cpal::default_host(),
            devices: BTreeMap::new(),
            capabilities: BTreeMap::new(),
            current_device: None,
        };
        manager.refresh_devices()?;
        Ok(manager)
    }

    /// Re-enumerate output devices; devices that cannot report a
    /// configuration are skipped
    pub fn refresh_devices(&mut self) -> Result<(), AudioError> {
        self.devices.clear();
        self.capabilities.clear();

        let devices = self.host.output_devices()
            .map_err(|e| AudioError::InitializationFailed(format!("Failed to enumerate devices: {}", e)))?;

        for device in devices {
            let name = match device.name() {
                Ok(name) => name,
                Err(e) => {
                    warn!("Skipping unnamed output device: {}", e);
                    continue;
                }
            };
            match Self::device_capabilities(&name, &device) {
                Ok(capabilities) => {
                    self.capabilities.insert(name.clone(), capabilities);
                    self.devices.insert(name, device);
                }
                Err(e) => warn!("Skipping output device '{}': {}", name, e),
            }
        }

        debug!("Found {} output devices", self.devices.len());
        Ok(())
    }

    /// Names of all usable output devices, sorted
    pub fn list_devices(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    pub fn get_capabilities(&self, device_name: &str) -> Option<&DeviceCapabilities> {
        self.capabilities.get(device_name)
    }

    pub fn default_device_name(&self) -> Option<String> {
        self.host.default_output_device().and_then(|device| device.name().ok())
    }

    /// Select a device by name, or the default device when the name is
    /// missing or unknown
    pub fn select_device_with_fallback(&mut self, device_name: Option<&str>) -> Result<(), AudioError> {
        if let Some(name) = device_name {
            if let Some(device) = self.devices.get(name).cloned() {
                self.current_device = Some(device);
                return Ok(());
            }
            warn!("Output device '{}' not found, using the default device", name);
            return self.select_default_device()
                .map_err(|_| AudioError::DeviceNotFound { device: name.to_string() });
        }
        self.select_default_device()
    }

    pub fn select_default_device(&mut self) -> Result<(), AudioError> {
        let default_device = self.host.default_output_device()
            .ok_or_else(|| AudioError::InitializationFailed("No default output device available".to_string()))?;
        self.current_device = Some(default_device);
        Ok(())
    }

    pub fn current_device(&self) -> Option<&Device> {
        self.current_device.as_ref()
    }

    pub fn current_device_name(&self) -> Option<String> {
        self.current_device.as_ref().and_then(|device| device.name().ok())
    }

    fn device_capabilities(name: &str, device: &Device) -> Result<DeviceCapabilities, AudioError> {
        let default_config = device.default_output_config()
            .map_err(|e| AudioError::InitializationFailed(format!("Failed to get default config for {}: {}", name, e)))?;
        let ranges = device.supported_output_configs()
            .map_err(|e| AudioError::InitializationFailed(format!("Failed to get supported configs for {}: {}", name, e)))?;

        let mut sample_rates = Vec::new();
        let mut max_channels = 0;
        for range in ranges {
            for rate in rates_in_range(range.min_sample_rate().0, range.max_sample_rate().0) {
                if !sample_rates.contains(&rate) {
                    sample_rates.push(rate);
                }
            }
            max_channels = max_channels.max(range.channels());
        }

        let default_rate = default_config.sample_rate().0;
        if !sample_rates.contains(&default_rate) {
            sample_rates.push(default_rate);
        }
        sample_rates.sort_unstable();

        Ok(DeviceCapabilities {
            name: name.to_string(),
            supported_sample_rates: sample_rates,
            max_channels: max_channels.max(default_config.channels()),
            default_config,
        })
    }
}

/// Common rates inside an inclusive supported range
fn rates_in_range(min: u32, max: u32) -> Vec<u32> {
    COMMON_RATES.iter().copied().filter(|rate| (min..=max).contains(rate)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates_in_range() {
        assert_eq!(rates_in_range(44_100, 48_000), vec![44_100, 48_000]);
        assert_eq!(rates_in_range(8_000, 22_050), Vec::<u32>::new());
        assert_eq!(rates_in_range(1, 384_000).len(), COMMON_RATES.len());
    }

    // Hosts without audio hardware may fail enumeration; only check
    // consistency when a manager can be built.
    #[test]
    fn test_listed_devices_have_capabilities() {
        if let Ok(manager) = DeviceManager::new() {
            for name in manager.list_devices() {
                let caps = manager.get_capabilities(&name).unwrap();
                assert_eq!(caps.name, name);
                assert!(!caps.supported_sample_rates.is_empty());
                assert!(caps.max_channels > 0);
            }
        }
    }

    #[test]
    fn test_unknown_device_never_selects_it() {
        if let Ok(mut manager) = DeviceManager::new() {
            match manager.select_device_with_fallback(Some("NonExistentDevice")) {
                Ok(()) => assert_ne!(manager.current_device_name().as_deref(), Some("NonExistentDevice")),
                Err(e) => assert!(matches!(e, AudioError::DeviceNotFound { .. })),
            }
        }
    }
}
