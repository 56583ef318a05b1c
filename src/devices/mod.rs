//! Device-collaborator boundary.
//!
//! The sink core never talks to platform capture APIs; it sees devices
//! only through the interfaces here. Platform backends implement
//! [`DeviceEnumerator`] and feed plug/unplug signals into
//! [`DeviceManager::notify_devices_changed`]; everything else in this
//! module is mechanical glue.

pub mod whitelist;

use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::devices::whitelist::MaxFormatTable;
use crate::frame::{PixelFormat, VideoFormat};

/// Class of capture hardware to enumerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    VideoCapture,
    AudioCapture,
    AudioRender,
}

/// A physical device as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    pub id: String,
}

impl Device {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }
}

/// One capture mode a device supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureCapability {
    pub width: u32,
    pub height: u32,
    pub max_fps: u32,
    pub pixel_format: PixelFormat,
}

/// Platform enumeration boundary.
#[async_trait]
pub trait DeviceEnumerator: Send + Sync {
    /// Enumerate devices of one class as `(name, id)` pairs.
    async fn list_devices(&self, class: DeviceClass) -> anyhow::Result<Vec<Device>>;

    /// The capability list of one device.
    async fn capabilities(&self, device_id: &str) -> anyhow::Result<Vec<CaptureCapability>>;
}

/// Receiver of device plug/unplug notifications.
pub trait DeviceObserver: Send + Sync {
    fn on_devices_changed(&self);
}

/// Device ids under this prefix identify USB cameras, preferred as the
/// default capture device.
const USB_DEVICE_PATH_PREFIX: &str = r"\\?\usb";

/// Opaque handle for an initialized capture connection to one device.
#[derive(Debug)]
pub struct CaptureSession {
    device_id: String,
}

impl CaptureSession {
    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}

/// Explicitly owned cache of per-device capture sessions.
///
/// Lifetime is tied to the owning [`DeviceManager`] (`init`/`terminate`),
/// not to first use.
#[derive(Debug, Default)]
pub struct CaptureSessionRegistry {
    sessions: Mutex<HashMap<String, Arc<CaptureSession>>>,
}

impl CaptureSessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached session for a device, created on first request.
    pub fn session(&self, device_id: &str) -> Arc<CaptureSession> {
        Arc::clone(
            self.sessions
                .lock()
                .unwrap()
                .entry(device_id.to_owned())
                .or_insert_with(|| {
                    Arc::new(CaptureSession {
                        device_id: device_id.to_owned(),
                    })
                }),
        )
    }

    pub fn remove(&self, device_id: &str) -> Option<Arc<CaptureSession>> {
        self.sessions.lock().unwrap().remove(device_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().unwrap().is_empty()
    }

    pub fn clear(&self) {
        self.sessions.lock().unwrap().clear();
    }
}

/// Owns the enumeration collaborator, the session registry, the maximum-
/// format whitelist and the device-change observer list.
pub struct DeviceManager<E: DeviceEnumerator> {
    enumerator: E,
    registry: CaptureSessionRegistry,
    max_formats: Mutex<MaxFormatTable>,
    observers: Mutex<Vec<Arc<dyn DeviceObserver>>>,
    initialized: AtomicBool,
}

impl<E: DeviceEnumerator> DeviceManager<E> {
    pub fn new(enumerator: E) -> Self {
        Self {
            enumerator,
            registry: CaptureSessionRegistry::new(),
            max_formats: Mutex::new(MaxFormatTable::default()),
            observers: Mutex::new(Vec::new()),
            initialized: AtomicBool::new(false),
        }
    }

    /// Start the manager. Idempotent.
    pub fn init(&self) {
        if !self.initialized.swap(true, Ordering::SeqCst) {
            info!("device manager: initialized");
        }
    }

    /// Stop the manager and tear the session cache down. Idempotent.
    pub fn terminate(&self) {
        if self.initialized.swap(false, Ordering::SeqCst) {
            self.registry.clear();
            info!("device manager: terminated");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> &CaptureSessionRegistry {
        &self.registry
    }

    pub async fn video_capture_devices(&self) -> anyhow::Result<Vec<Device>> {
        self.enumerator.list_devices(DeviceClass::VideoCapture).await
    }

    pub async fn audio_input_devices(&self) -> anyhow::Result<Vec<Device>> {
        self.enumerator.list_devices(DeviceClass::AudioCapture).await
    }

    pub async fn audio_output_devices(&self) -> anyhow::Result<Vec<Device>> {
        self.enumerator.list_devices(DeviceClass::AudioRender).await
    }

    pub async fn capabilities(
        &self,
        device_id: &str,
    ) -> anyhow::Result<Vec<CaptureCapability>> {
        self.enumerator.capabilities(device_id).await
    }

    /// The first USB-attached camera, falling back to the first enumerated
    /// device.
    pub async fn default_video_device(&self) -> anyhow::Result<Option<Device>> {
        let devices = self.video_capture_devices().await?;
        Ok(devices
            .iter()
            .find(|d| {
                d.id.to_ascii_lowercase()
                    .starts_with(USB_DEVICE_PATH_PREFIX)
            })
            .cloned()
            .or_else(|| devices.into_iter().next()))
    }

    /// Replace the configured maximum-format table.
    pub fn set_max_formats(&self, table: MaxFormatTable) {
        *self.max_formats.lock().unwrap() = table;
    }

    /// The configured format cap for a device, matched by id first and
    /// display name second.
    pub fn max_format(&self, device: &Device) -> Option<VideoFormat> {
        self.max_formats.lock().unwrap().max_format(device).cloned()
    }

    pub fn add_observer(&self, observer: Arc<dyn DeviceObserver>) {
        self.observers.lock().unwrap().push(observer);
    }

    /// Fan a platform device-change signal out to registered observers.
    pub fn notify_devices_changed(&self) {
        let observers = self.observers.lock().unwrap().clone();
        for observer in observers {
            observer.on_devices_changed();
        }
    }
}
