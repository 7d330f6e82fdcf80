//! Backend factory: the library's single entry point. Confirms COM can
//! produce an enumerator (on a detached, throwaway worker, so the caller's
//! own thread is never forced into an apartment), builds the shared
//! [`DeviceHelper`], and constructs engines bound to a caller-supplied
//! [`DeviceContext`].
//!
//! Grounded in the original's `WasapiFactory` (`initialize`'s
//! throwaway-thread COM probe, `probe(direction)`'s double-null-terminated
//! name list, `createBackend(direction)`).
//!
//! §4.5 describes a single `createBackend(direction)` entry point; this
//! crate splits it into [`Factory::create_playback`] and
//! [`Factory::create_capture`] because the two engines take different
//! external collaborators (a mixer callback and sample-rate converter
//! factory for playback; a channel converter factory and a sample
//! converter factory for capture) that a single signature can't express
//! without an enum of bundles. Both still take the shared device context
//! the spec describes, and `probe` and the device-naming contract are
//! unchanged. See DESIGN.md.

use std::sync::Arc;

use parking_lot::Mutex as PlMutex;
use windows::Win32::Media::Audio::MMDeviceEnumerator;
use windows::Win32::System::Com::{CoCreateInstance, CoInitializeEx, CoUninitialize, CLSCTX_ALL, COINIT_MULTITHREADED};

use wasapi_backend_core::converter::{ChannelConverterFactory, SampleConverterFactory};
use wasapi_backend_core::error::BackendError;
use wasapi_backend_core::event::EventBus;
use wasapi_backend_core::mixer::MixerCallback;
use wasapi_backend_core::ConfigSource;

use crate::capture::CaptureEngine;
use crate::device_helper::{DeviceHelper, Direction};
use crate::playback::{DeviceContext, PlaybackEngine};
use crate::proxy;

const DEVICE_PREFIX: &str = "OpenAL Soft on ";

/// Confirms the WASAPI stack is usable and owns the shared device
/// registries. One instance is expected to live for the process's audio
/// lifetime; dropping it releases the Proxy Thread reference it holds.
pub struct Factory {
    device_helper: Arc<PlMutex<DeviceHelper>>,
}

impl Factory {
    /// Spawns a detached worker that initializes COM and constructs an
    /// `IMMDeviceEnumerator` purely to confirm the platform supports
    /// WASAPI before committing to starting the Proxy Thread (§4.5).
    /// `event_bus` receives `DefaultDeviceChanged` notifications (§4.2, §6)
    /// for the lifetime of the returned `Factory`.
    pub fn new(event_bus: Arc<dyn EventBus>) -> Result<Self, BackendError> {
        let probe = std::thread::Builder::new()
            .name("wasapi-probe".into())
            .spawn(com_round_trip)
            .map_err(|e| BackendError::DeviceError(format!("failed to spawn COM probe thread: {e}")))?;

        match probe.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(BackendError::DeviceError(e)),
            Err(_) => return Err(BackendError::DeviceError("COM probe thread panicked".into())),
        }

        proxy::init_thread();
        let device_helper = proxy::call(move || {
            let mut helper = DeviceHelper::new().map_err(|e| format!("DeviceHelper::new failed: {e}"))?;
            if let Err(e) = helper.register_notifications(event_bus) {
                log::warn!("RegisterEndpointNotificationCallback failed: {e}");
            }
            Ok::<DeviceHelper, String>(helper)
        });
        match device_helper {
            Ok(helper) => Ok(Self { device_helper: Arc::new(PlMutex::new(helper)) }),
            Err(e) => {
                proxy::deinit_thread();
                Err(BackendError::DeviceError(e))
            }
        }
    }

    /// Re-enumerate `direction`'s endpoints and return the double-null
    /// terminated `"OpenAL Soft on <name>\0" ... "\0"` probe list (§6). An
    /// empty registry yields a single `"\0"`.
    pub fn probe(&self, direction: Direction) -> String {
        let helper = self.device_helper.clone();
        let names: Vec<String> = proxy::call(move || -> Result<Vec<String>, String> {
            let mut helper = helper.lock();
            if let Err(e) = helper.probe_devices(direction) {
                log::warn!("probe failed for {direction:?}: {e}");
            }
            let registry = match direction {
                Direction::Playback => &helper.playback,
                Direction::Capture => &helper.capture,
            };
            Ok(registry.devices().iter().map(|d| d.name.clone()).collect())
        })
        .unwrap_or_else(|_: String| Vec::new());

        let mut out = String::new();
        for name in names {
            out.push_str(DEVICE_PREFIX);
            out.push_str(&name);
            out.push('\0');
        }
        out.push('\0');
        out
    }

    /// Construct a fresh [`PlaybackEngine`] sharing this factory's device
    /// registries, bound to `device_context`.
    pub fn create_playback(
        &self,
        mixer_callback: MixerCallback,
        config: Arc<dyn ConfigSource>,
        converter_factory: Arc<dyn SampleConverterFactory>,
        device_context: Arc<dyn DeviceContext>,
    ) -> PlaybackEngine {
        PlaybackEngine::new(self.device_helper.clone(), mixer_callback, config, converter_factory, device_context)
    }

    /// Construct a fresh [`CaptureEngine`] sharing this factory's device
    /// registries, bound to `device_context`.
    pub fn create_capture(
        &self,
        channel_converter_factory: Arc<dyn ChannelConverterFactory>,
        sample_converter_factory: Arc<dyn SampleConverterFactory>,
        device_context: Arc<dyn DeviceContext>,
    ) -> CaptureEngine {
        CaptureEngine::new(self.device_helper.clone(), channel_converter_factory, sample_converter_factory, device_context)
    }
}

impl Drop for Factory {
    fn drop(&mut self) {
        proxy::deinit_thread();
    }
}

fn com_round_trip() -> Result<(), String> {
    unsafe {
        CoInitializeEx(None, COINIT_MULTITHREADED)
            .ok()
            .map_err(|e| format!("CoInitializeEx failed: {e}"))?;
        let result: windows::core::Result<windows::Win32::Media::Audio::IMMDeviceEnumerator> =
            CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL);
        CoUninitialize();
        result.map(|_| ()).map_err(|e| format!("CoCreateInstance(MMDeviceEnumerator) failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_prefix_matches_naming_contract() {
        assert_eq!(DEVICE_PREFIX, "OpenAL Soft on ");
    }

    #[test]
    fn empty_probe_list_is_single_null() {
        let out: String = {
            let names: Vec<String> = Vec::new();
            let mut out = String::new();
            for name in names {
                out.push_str(DEVICE_PREFIX);
                out.push_str(&name);
                out.push('\0');
            }
            out.push('\0');
            out
        };
        assert_eq!(out, "\0");
    }
}
