//! Keystroke event source
//!
//! Every selected keyboard is grabbed, so nothing it produces reaches other
//! applications unless the engine forwards it. Each device gets its own
//! reader task and [`KeyTranslator`]; events go into the engine channel in
//! the order the kernel delivers them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use evdev::{Device, InputEventKind, LedType};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::device::DeviceInfo;
use crate::engine::EngineEvent;
use crate::error::HookInstallationError;
use crate::input::KeyTranslator;

/// Longest wait for keys held at startup to be released before grabbing.
const RELEASE_WAIT: Duration = Duration::from_secs(2);

/// Readers for the grabbed keyboards. Dropping the handle stops them, which
/// closes the devices and releases the grabs.
pub struct HookHandle {
    devices: Vec<DeviceInfo>,
    tasks: Vec<JoinHandle<()>>,
}

impl HookHandle {
    pub fn devices(&self) -> &[DeviceInfo] {
        &self.devices
    }

    /// Number of readers still running.
    pub fn active(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_finished()).count()
    }
}

impl Drop for HookHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Grab `keyboards` and feed their key events to `events`.
///
/// Any keyboard that cannot be opened or grabbed fails the whole
/// installation; devices grabbed so far are released.
pub async fn install(
    keyboards: Vec<DeviceInfo>,
    events: mpsc::UnboundedSender<EngineEvent>,
) -> Result<HookHandle, HookInstallationError> {
    if keyboards.is_empty() {
        return Err(HookInstallationError::NoKeyboards);
    }

    let mut grabbed = Vec::with_capacity(keyboards.len());
    for info in &keyboards {
        grabbed.push(open_and_grab(info).await?);
    }

    let mut tasks = Vec::with_capacity(grabbed.len());
    for (device, info) in grabbed.into_iter().zip(&keyboards) {
        let caps_lock = device
            .get_led_state()
            .map(|leds| leds.contains(LedType::LED_CAPSL))
            .unwrap_or(false);
        let stream = device.into_event_stream().map_err(|source| HookInstallationError::Open {
            path: info.path.clone(),
            source,
        })?;
        tracing::info!("Listening to '{}' ({})", info.name, info.path.display());
        tasks.push(tokio::spawn(read_events(
            stream,
            info.path.clone(),
            KeyTranslator::with_caps_lock(caps_lock),
            events.clone(),
        )));
    }

    Ok(HookHandle {
        devices: keyboards,
        tasks,
    })
}

async fn open_and_grab(info: &DeviceInfo) -> Result<Device, HookInstallationError> {
    let mut device = Device::open(&info.path).map_err(|source| HookInstallationError::Open {
        path: info.path.clone(),
        source,
    })?;

    wait_for_release(&device, &info.path).await;

    device.grab().map_err(|source| HookInstallationError::Grab {
        name: info.name.clone(),
        source,
    })?;
    tracing::debug!("Grabbed '{}'", info.name);
    Ok(device)
}

/// A key held while grabbing would never see its release on the other side.
async fn wait_for_release(device: &Device, path: &Path) {
    let deadline = tokio::time::Instant::now() + RELEASE_WAIT;
    loop {
        match device.get_key_state() {
            Ok(keys) if keys.iter().next().is_none() => return,
            Ok(_) if tokio::time::Instant::now() >= deadline => {
                tracing::warn!("Keys still held on {}, grabbing anyway", path.display());
                return;
            }
            Ok(_) => tokio::time::sleep(Duration::from_millis(20)).await,
            Err(e) => {
                tracing::debug!("Could not read key state of {}: {}", path.display(), e);
                return;
            }
        }
    }
}

async fn read_events(
    mut stream: evdev::EventStream,
    path: PathBuf,
    mut translator: KeyTranslator,
    events: mpsc::UnboundedSender<EngineEvent>,
) {
    loop {
        let event = match stream.next_event().await {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Stopped reading {}: {}", path.display(), e);
                return;
            }
        };

        let InputEventKind::Key(key) = event.kind() else {
            continue;
        };
        let Some(key_event) = translator.translate(key, event.value()) else {
            continue;
        };
        if events.send(EngineEvent::Key(key_event)).is_err() {
            tracing::debug!("Engine gone, closing {}", path.display());
            return;
        }
    }
}
