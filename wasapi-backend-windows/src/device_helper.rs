//! Enumeration and activation of WASAPI endpoints, and default-device
//! change notification. All methods here are meant to be invoked from the
//! Proxy Thread (`proxy::call`), never directly from a caller's thread.
//!
//! Grounded in the teacher's `DeviceEnumerator` (enumeration, friendly
//! name / transport-type property reads) and in the original's
//! `DeviceHelper` (probe-devices-into-a-`DevMap`-vector,
//! `IMMNotificationClient` dispatching `DefaultDeviceChanged` only for
//! `eMultimedia`).

use windows::core::{implement, Interface, PCWSTR};
use windows::Win32::Devices::FunctionDiscovery::PKEY_Device_FriendlyName;
use windows::Win32::Foundation::PROPERTYKEY;
use windows::Win32::Media::Audio::{
    eCapture, eMultimedia, eRender, EDataFlow, EndpointFormFactor, ERole, IMMDevice, IMMDeviceEnumerator,
    IMMNotificationClient, IMMNotificationClient_Impl, MMDeviceEnumerator, DEVICE_STATE, DEVICE_STATE_ACTIVE,
    PKEY_AudioEndpoint_FormFactor, PKEY_AudioEndpoint_GUID,
};
use windows::Win32::System::Com::StructuredStorage::{PropVariantToStringAlloc, PropVariantToUInt32};
use windows::Win32::System::Com::{CoCreateInstance, CoTaskMemFree, CLSCTX_ALL, STGM_READ};
use windows::Win32::UI::Shell::PropertiesSystem::IPropertyStore;

const UNKNOWN_DEVICE_NAME: &str = "Unknown Device Name";
const UNKNOWN_DEVICE_GUID: &str = "Unknown Device GUID";

/// Broad hardware category of an endpoint (§4.2, GLOSSARY). Drives the
/// "direct-ear" hint used elsewhere in the library to bias processing
/// for headphones/headsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFormFactor {
    Speakers,
    Headphones,
    Headset,
    Microphone,
    LineLevel,
    Other,
}

impl DeviceFormFactor {
    pub fn is_direct_ear(self) -> bool {
        matches!(self, DeviceFormFactor::Headphones | DeviceFormFactor::Headset)
    }

    fn from_os(value: EndpointFormFactor) -> Self {
        match value {
            windows::Win32::Media::Audio::Speakers => DeviceFormFactor::Speakers,
            windows::Win32::Media::Audio::Headphones => DeviceFormFactor::Headphones,
            windows::Win32::Media::Audio::Headset => DeviceFormFactor::Headset,
            windows::Win32::Media::Audio::Microphone => DeviceFormFactor::Microphone,
            windows::Win32::Media::Audio::LineLevel => DeviceFormFactor::LineLevel,
            _ => DeviceFormFactor::Other,
        }
    }
}

use wasapi_backend_core::device::{DeviceMapEntry, DeviceRegistry};
use wasapi_backend_core::event::{default_device_changed_message, EventBus, EventSubject};

/// Direction an endpoint serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Playback,
    Capture,
}

impl Direction {
    fn data_flow(self) -> EDataFlow {
        match self {
            Direction::Playback => eRender,
            Direction::Capture => eCapture,
        }
    }

    fn event_subject(self) -> EventSubject {
        match self {
            Direction::Playback => EventSubject::Playback,
            Direction::Capture => EventSubject::Capture,
        }
    }
}

pub struct DeviceHelper {
    enumerator: IMMDeviceEnumerator,
    notification_client: Option<IMMNotificationClient>,
    pub playback: DeviceRegistry,
    pub capture: DeviceRegistry,
}

impl DeviceHelper {
    /// Must be called on the Proxy Thread. Only verifies that COM can
    /// construct the enumerator; registration for notifications happens
    /// separately via `register_notifications`.
    pub fn new() -> windows::core::Result<Self> {
        let enumerator: IMMDeviceEnumerator = unsafe { CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)? };
        Ok(Self {
            enumerator,
            notification_client: None,
            playback: DeviceRegistry::new(),
            capture: DeviceRegistry::new(),
        })
    }

    /// Subscribe `bus` to `DefaultDeviceChanged` (multimedia role only,
    /// §4.2). Must be called on the Proxy Thread; the registration is
    /// torn down when the `DeviceHelper` is dropped.
    pub fn register_notifications(&mut self, bus: std::sync::Arc<dyn EventBus>) -> windows::core::Result<()> {
        let client: IMMNotificationClient = NotificationClient { bus }.into();
        unsafe { self.enumerator.RegisterEndpointNotificationCallback(&client)? };
        self.notification_client = Some(client);
        Ok(())
    }

    /// Re-enumerate active endpoints for `direction` and replace the
    /// matching registry's contents, default device first.
    pub fn probe_devices(&mut self, direction: Direction) -> windows::core::Result<()> {
        let data_flow = direction.data_flow();
        let collection = unsafe { self.enumerator.EnumAudioEndpoints(data_flow, DEVICE_STATE_ACTIVE)? };
        let count = unsafe { collection.GetCount()? };

        let default_id = unsafe {
            self.enumerator
                .GetDefaultAudioEndpoint(data_flow, eMultimedia)
                .ok()
                .and_then(|d| d.GetId().ok())
                .and_then(|id| id.to_string().ok())
        };

        let mut entries = Vec::new();
        for i in 0..count {
            let device = match unsafe { collection.Item(i) } {
                Ok(d) => d,
                Err(e) => {
                    log::warn!("device enumeration: skipping index {i}: {e}");
                    continue;
                }
            };
            let id = match unsafe { device.GetId() } {
                Ok(id) => unsafe { id.to_string() }.unwrap_or_default(),
                Err(_) => continue,
            };
            let name = Self::friendly_name(&device).unwrap_or_else(|| format!("Device {i}"));
            let guid = Self::read_string_property(&device, &PKEY_AudioEndpoint_GUID).unwrap_or_else(|| id.clone());
            entries.push(DeviceMapEntry {
                name,
                endpoint_guid: guid,
                device_id: id,
            });
        }

        let registry = match direction {
            Direction::Playback => &mut self.playback,
            Direction::Capture => &mut self.capture,
        };
        registry.probe(entries, default_id.as_deref());
        Ok(())
    }

    /// Open a device by name/guid/id (lookup precedence per the
    /// registry), or the direction's default when `key` is `None`.
    pub fn open_device(&self, direction: Direction, key: Option<&str>) -> windows::core::Result<IMMDevice> {
        let registry = match direction {
            Direction::Playback => &self.playback,
            Direction::Capture => &self.capture,
        };

        let device_id = match key {
            Some(k) => registry.find(k).map(|e| e.device_id.clone()),
            None => registry.default_device().map(|e| e.device_id.clone()),
        };

        match device_id {
            Some(id) => {
                let wide: Vec<u16> = id.encode_utf16().chain(std::iter::once(0)).collect();
                unsafe { self.enumerator.GetDevice(PCWSTR(wide.as_ptr())) }
            }
            None => unsafe { self.enumerator.GetDefaultAudioEndpoint(direction.data_flow(), eMultimedia) },
        }
    }

    fn read_string_property(device: &IMMDevice, key: &PROPERTYKEY) -> Option<String> {
        unsafe {
            let store: IPropertyStore = device.OpenPropertyStore(STGM_READ).ok()?;
            let prop = store.GetValue(key).ok()?;
            let pwstr = PropVariantToStringAlloc(&prop).ok()?;
            let name = pwstr.to_string().ok()?;
            CoTaskMemFree(Some(pwstr.0 as *const _));
            Some(name)
        }
    }

    fn friendly_name(device: &IMMDevice) -> Option<String> {
        Self::read_string_property(device, &PKEY_Device_FriendlyName)
    }

    /// Read the endpoint's friendly name and GUID. Never fails: on property
    /// read failure, returns the documented placeholders (§4.2) rather than
    /// propagating an error.
    pub fn get_device_name_and_guid(device: &IMMDevice) -> (String, String) {
        let name = Self::friendly_name(device).unwrap_or_else(|| UNKNOWN_DEVICE_NAME.to_string());
        let guid = Self::read_string_property(device, &PKEY_AudioEndpoint_GUID).unwrap_or_else(|| UNKNOWN_DEVICE_GUID.to_string());
        (name, guid)
    }

    /// Read the endpoint's hardware form factor, used to drive the
    /// "direct-ear" hint (GLOSSARY). Unreadable or unrecognized values
    /// normalize to `DeviceFormFactor::Other`.
    pub fn get_device_form_factor(device: &IMMDevice) -> DeviceFormFactor {
        let Ok(store) = (unsafe { device.OpenPropertyStore(STGM_READ) }) else {
            return DeviceFormFactor::Other;
        };
        let Ok(prop) = (unsafe { store.GetValue(&PKEY_AudioEndpoint_FormFactor) }) else {
            return DeviceFormFactor::Other;
        };
        let Ok(raw) = (unsafe { PropVariantToUInt32(&prop) }) else {
            return DeviceFormFactor::Other;
        };
        DeviceFormFactor::from_os(EndpointFormFactor(raw as i32))
    }
}

impl Drop for DeviceHelper {
    fn drop(&mut self) {
        if let Some(client) = self.notification_client.take() {
            unsafe {
                let _ = self.enumerator.UnregisterEndpointNotificationCallback(&client);
            }
        }
    }
}

#[implement(IMMNotificationClient)]
struct NotificationClient {
    bus: std::sync::Arc<dyn EventBus>,
}

#[allow(non_snake_case)]
impl IMMNotificationClient_Impl for NotificationClient_Impl {
    fn OnDefaultDeviceChanged(
        &self,
        flow: EDataFlow,
        role: ERole,
        default_device_id: &PCWSTR,
    ) -> windows::core::Result<()> {
        if role != eMultimedia {
            return Ok(());
        }
        let direction = if flow == eRender { Direction::Playback } else { Direction::Capture };
        let device_id = if default_device_id.is_null() {
            String::new()
        } else {
            default_device_id.to_string().unwrap_or_default()
        };
        let message = default_device_changed_message(direction.event_subject(), &device_id);
        self.bus.default_device_changed(direction.event_subject(), message);
        Ok(())
    }

    fn OnDeviceAdded(&self, _device_id: &PCWSTR) -> windows::core::Result<()> {
        Ok(())
    }

    fn OnDeviceRemoved(&self, _device_id: &PCWSTR) -> windows::core::Result<()> {
        Ok(())
    }

    fn OnDeviceStateChanged(&self, _device_id: &PCWSTR, _new_state: DEVICE_STATE) -> windows::core::Result<()> {
        Ok(())
    }

    fn OnPropertyValueChanged(&self, _device_id: &PCWSTR, _key: &PROPERTYKEY) -> windows::core::Result<()> {
        Ok(())
    }
}
