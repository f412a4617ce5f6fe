//! Input device enumeration

use std::path::{Path, PathBuf};

use evdev::{Device, EventType, Key};

use crate::error::HookInstallationError;
use crate::injector::VIRTUAL_DEVICE_NAME;

/// Information about an input device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub path: PathBuf,
    pub name: String,
    pub vendor: u16,
    pub product: u16,
    pub keyboard: bool,
}

impl DeviceInfo {
    /// Get vendor:product string (e.g., "3434:0361")
    pub fn vendor_product(&self) -> String {
        format!("{:04x}:{:04x}", self.vendor, self.product)
    }
}

/// Enumerate the input devices under `/dev/input`, sorted by path.
pub fn enumerate_devices() -> std::io::Result<Vec<DeviceInfo>> {
    enumerate_devices_in(Path::new("/dev/input"))
}

fn enumerate_devices_in(dir: &Path) -> std::io::Result<Vec<DeviceInfo>> {
    let mut devices = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();

        // Only look at event* devices
        let is_event_node = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("event"));
        if !is_event_node {
            continue;
        }

        match Device::open(&path) {
            Ok(device) => {
                let id = device.input_id();
                devices.push(DeviceInfo {
                    name: device.name().unwrap_or("Unknown").to_string(),
                    vendor: id.vendor(),
                    product: id.product(),
                    keyboard: is_keyboard(&device),
                    path,
                });
            }
            Err(e) => {
                tracing::debug!("Could not open {}: {}", path.display(), e);
            }
        }
    }

    devices.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(devices)
}

/// Check if a device is a keyboard
pub fn is_keyboard(device: &Device) -> bool {
    device.supported_events().contains(EventType::KEY)
        && device
            .supported_keys()
            .is_some_and(|keys| keys.contains(Key::KEY_A) && keys.contains(Key::KEY_SPACE))
}

/// Keep the keyboards to listen to: every keyboard when `wanted` is empty,
/// otherwise those whose name is listed. Our own virtual keyboard is never
/// selected.
pub fn select_keyboards(devices: Vec<DeviceInfo>, wanted: &[String]) -> Vec<DeviceInfo> {
    devices
        .into_iter()
        .filter(|d| d.keyboard && d.name != VIRTUAL_DEVICE_NAME)
        .filter(|d| wanted.is_empty() || wanted.iter().any(|w| *w == d.name))
        .collect()
}

/// The keyboards to hook.
pub fn find_keyboards(wanted: &[String]) -> Result<Vec<DeviceInfo>, HookInstallationError> {
    let devices = enumerate_devices().map_err(HookInstallationError::Enumerate)?;
    let keyboards = select_keyboards(devices, wanted);
    if keyboards.is_empty() {
        return Err(HookInstallationError::NoKeyboards);
    }

    for name in wanted {
        if !keyboards.iter().any(|k| k.name == *name) {
            tracing::warn!("Configured keyboard '{}' not found", name);
        }
    }
    Ok(keyboards)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(name: &str, keyboard: bool) -> DeviceInfo {
        DeviceInfo {
            path: PathBuf::from(format!("/dev/input/event-{}", name)),
            name: name.to_string(),
            vendor: 0x3434,
            product: 0x0361,
            keyboard,
        }
    }

    #[test]
    fn test_vendor_product() {
        assert_eq!(device("k", true).vendor_product(), "3434:0361");
    }

    #[test]
    fn test_select_all_keyboards() {
        let devices = vec![
            device("Keychron K3 Pro", true),
            device("Logitech G502", false),
            device(VIRTUAL_DEVICE_NAME, true),
            device("AT Translated Set 2 keyboard", true),
        ];
        let names: Vec<String> = select_keyboards(devices, &[])
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["Keychron K3 Pro", "AT Translated Set 2 keyboard"]);
    }

    #[test]
    fn test_select_named_keyboards() {
        let devices = vec![
            device("Keychron K3 Pro", true),
            device("AT Translated Set 2 keyboard", true),
        ];
        let selected = select_keyboards(devices, &["Keychron K3 Pro".to_string()]);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name, "Keychron K3 Pro");
    }

    #[test]
    fn test_missing_directory() {
        assert!(enumerate_devices_in(Path::new("/nonexistent/input")).is_err());
    }
}
