//! Capture engine: the record-side state machine. Symmetric to
//! [`crate::playback::PlaybackEngine`] per spec §4.4, with three real
//! differences: a 100ms minimum buffer duration, no ambisonic support, and
//! format negotiation that never downgrades the caller's requested layout
//! (it validates instead of rewriting).
//!
//! Grounded in the original's `WasapiCapture` (`open`/`openProxy`,
//! `reset`/`resetProxy`, `start`/`startProxy`, `stop`/`stopProxy`,
//! `recordProc`) and, for the record-thread shape (poll `GetNextPacketSize`,
//! drain packets, `GetBuffer`/`ReleaseBuffer`), the teacher's
//! `wasapi_mic.rs` capture loop — reworked here to be event-driven instead
//! of polling on a sleep, per §4.4/§5's notification-event contract.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex as PlMutex;
use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, E_OUTOFMEMORY, WAIT_OBJECT_0};
use windows::Win32::Media::Audio::{
    AUDCLNT_BUFFERFLAGS_SILENT, AUDCLNT_SHAREMODE_SHARED, AUDCLNT_STREAMFLAGS_EVENTCALLBACK, IAudioCaptureClient,
    IAudioClient,
};
use windows::Win32::System::Com::{CoInitializeEx, COINIT_MULTITHREADED};
use windows::Win32::System::Threading::{AvSetMmThreadCharacteristicsW, CreateEventW, ResetEvent, WaitForSingleObject};

use wasapi_backend_core::converter::{ChannelConverter, ChannelConverterFactory, SampleConverter, SampleConverterFactory};
use wasapi_backend_core::error::BackendError;
use wasapi_backend_core::format::{infer_layout_from_mask, validate_capture_fmt, ChannelLayout, FormatDescriptor, SampleType};
use wasapi_backend_core::ring_buffer::{RingBuffer, SpscRingBuffer};
use wasapi_backend_core::state::EngineState;

use crate::com_util::{CoUninitializeGuard, SendHandle};
use crate::device_helper::{DeviceHelper, Direction};
use crate::playback::{DeviceContext, RequestedFormat};
use crate::proxy;
use crate::wave_format::{build_wfx, normalize};

const DEVICE_PREFIX: &str = "OpenAL Soft on ";
const MIN_BUFFER_TIME: Duration = Duration::from_millis(100);
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(2);
const RECORD_THREAD_NAME: &str = "wasapi-record";

struct StreamState {
    channel_converter: Option<Box<dyn ChannelConverter>>,
    sample_converter: Option<Box<dyn SampleConverter>>,
    device_frame_size: usize,
    /// Channel count and per-frame byte size downstream of channel
    /// conversion (or identical to the device's if no converter is used).
    post_channel_channels: u16,
    post_channel_frame_size: usize,
    final_frame_size: usize,
}

impl Default for StreamState {
    fn default() -> Self {
        Self {
            channel_converter: None,
            sample_converter: None,
            device_frame_size: 0,
            post_channel_channels: 0,
            post_channel_frame_size: 0,
            final_frame_size: 0,
        }
    }
}

pub struct CaptureEngine {
    device_helper: Arc<PlMutex<DeviceHelper>>,
    channel_converter_factory: Arc<dyn ChannelConverterFactory>,
    sample_converter_factory: Arc<dyn SampleConverterFactory>,
    device_context: Arc<dyn DeviceContext>,

    state: PlMutex<EngineState>,
    device_name: PlMutex<String>,
    mm_device: PlMutex<Option<windows::Win32::Media::Audio::IMMDevice>>,
    client: PlMutex<Option<IAudioClient>>,
    capture: PlMutex<Option<IAudioCaptureClient>>,
    notify_event: PlMutex<Option<SendHandle>>,

    requested: PlMutex<RequestedFormat>,
    format: PlMutex<Option<FormatDescriptor>>,

    stream: PlMutex<StreamState>,
    ring: PlMutex<Option<Box<dyn RingBuffer>>>,

    kill: Arc<AtomicBool>,
    thread: PlMutex<Option<JoinHandle<()>>>,
}

// All COM handles are only ever touched from the Proxy Thread or from
// `record_loop`, which runs on a thread spawned by the Proxy Thread.
unsafe impl Send for CaptureEngine {}
unsafe impl Sync for CaptureEngine {}

impl CaptureEngine {
    pub fn new(
        device_helper: Arc<PlMutex<DeviceHelper>>,
        channel_converter_factory: Arc<dyn ChannelConverterFactory>,
        sample_converter_factory: Arc<dyn SampleConverterFactory>,
        device_context: Arc<dyn DeviceContext>,
    ) -> Self {
        Self {
            device_helper,
            channel_converter_factory,
            sample_converter_factory,
            device_context,
            state: PlMutex::new(EngineState::Closed),
            device_name: PlMutex::new(String::new()),
            mm_device: PlMutex::new(None),
            client: PlMutex::new(None),
            capture: PlMutex::new(None),
            notify_event: PlMutex::new(None),
            requested: PlMutex::new(RequestedFormat::default()),
            format: PlMutex::new(None),
            stream: PlMutex::new(StreamState::default()),
            ring: PlMutex::new(None),
            kill: Arc::new(AtomicBool::new(false)),
            thread: PlMutex::new(None),
        }
    }

    /// §4.3.1 (symmetric for capture, per §4.4 intro).
    pub fn open(&self, name: Option<&str>) -> Result<(), BackendError> {
        if *self.state.lock() != EngineState::Closed {
            return Err(BackendError::DeviceError("capture engine already open".into()));
        }

        let stripped = name.map(|n| n.strip_prefix(DEVICE_PREFIX).unwrap_or(n).to_string());
        let key = stripped.filter(|s| !s.is_empty());

        proxy::init_thread();

        let event = unsafe { CreateEventW(None, false, false, None) }
            .map_err(|e| BackendError::DeviceError(format!("CreateEventW failed: {e}")))?;
        *self.notify_event.lock() = Some(SendHandle(event));

        let helper = self.device_helper.clone();
        let key_for_proxy = key.clone();
        let result = proxy::call(move || -> Result<(String, windows::Win32::Media::Audio::IMMDevice), String> {
            let mut helper = helper.lock();
            if helper.capture.devices().is_empty() {
                if let Err(e) = helper.probe_devices(Direction::Capture) {
                    log::warn!("capture enumeration failed: {e}");
                }
            }
            let device = helper
                .open_device(Direction::Capture, key_for_proxy.as_deref())
                .map_err(|e| format!("OpenDevice failed: {e}"))?;
            let name = key_for_proxy.unwrap_or_else(|| "Default Capture Device".to_string());
            Ok((name, device))
        });

        match result {
            Ok((name, device)) => {
                *self.device_name.lock() = name;
                *self.mm_device.lock() = Some(device);
                *self.state.lock() = EngineState::Opened;
                Ok(())
            }
            Err(e) => {
                proxy::deinit_thread();
                Err(BackendError::DeviceError(e))
            }
        }
    }

    /// §4.4 format negotiation: enforces a 100ms minimum buffer, rejects
    /// ambisonic requests, and never downgrades the requested layout.
    pub fn reset(&self, requested: RequestedFormat, buffer_time: Duration) -> Result<(), BackendError> {
        if !self.state.lock().can_reset() {
            return Err(BackendError::DeviceError("reset called before open".into()));
        }
        if requested.channels == Some(ChannelLayout::Ambi3D) {
            return Err(BackendError::DeviceError("ambisonic capture is unsupported".into()));
        }
        *self.requested.lock() = requested;

        let device = self.mm_device.lock().clone().ok_or_else(|| BackendError::DeviceError("no device".into()))?;
        let buffer_time = buffer_time.max(MIN_BUFFER_TIME);

        let outcome = proxy::call(move || -> Result<CaptureResetOutcome, NegotiationFailure> {
            negotiate_and_initialize(&device, requested, buffer_time)
        });

        match outcome {
            Ok(outcome) => {
                *self.client.lock() = Some(outcome.client);
                *self.capture.lock() = Some(outcome.capture);
                *self.format.lock() = Some(outcome.caller_format);

                let channel_converter = outcome.channel_conversion_target.and_then(|target| {
                    self.channel_converter_factory.create(
                        outcome.device_format.sample_type,
                        outcome.device_format.channels,
                        outcome.device_format.channel_mask,
                        target,
                    )
                });

                let post_channel_channels = outcome.channel_conversion_target.map(|l| l.wire_channels_and_mask(false).0).unwrap_or(outcome.device_format.channels);
                let post_channel_type = if channel_converter.is_some() { SampleType::Float } else { outcome.device_format.sample_type };
                let post_channel_frame_size = post_channel_channels as usize * post_channel_type.bits_per_sample() as usize / 8;

                let sample_converter = if post_channel_type != outcome.caller_format.sample_type
                    || outcome.device_format.samples_per_sec != outcome.caller_format.samples_per_sec
                {
                    self.sample_converter_factory.create(
                        post_channel_type,
                        outcome.caller_format.sample_type,
                        post_channel_channels,
                        outcome.device_format.samples_per_sec,
                        outcome.caller_format.samples_per_sec,
                    )
                } else {
                    None
                };

                let final_frame_size = outcome.caller_format.block_align() as usize;
                let mut stream = self.stream.lock();
                stream.channel_converter = channel_converter;
                stream.sample_converter = sample_converter;
                stream.device_frame_size = outcome.device_format.block_align() as usize;
                stream.post_channel_channels = post_channel_channels;
                stream.post_channel_frame_size = post_channel_frame_size;
                stream.final_frame_size = final_frame_size;
                drop(stream);

                let ring_capacity = outcome.os_buffer_frames.max(1) as usize;
                *self.ring.lock() = Some(Box::new(SpscRingBuffer::new(ring_capacity, final_frame_size)));

                if let Some(event) = *self.notify_event.lock() {
                    if let Some(client) = self.client.lock().as_ref() {
                        let _ = unsafe { client.SetEventHandle(event.0) };
                    }
                }

                *self.state.lock() = EngineState::Configured;
                Ok(())
            }
            Err(e) => {
                log::error!("capture reset failed: {e}");
                // The OS's out-of-memory status is the one error code this
                // backend maps to a dedicated variant rather than a generic
                // `DeviceError` (§7).
                match e.hresult {
                    Some(code) => Err(BackendError::from_status(&e.message, code, E_OUTOFMEMORY.0)),
                    None => Err(BackendError::DeviceError(e.message)),
                }
            }
        }
    }

    pub fn start(&self) -> Result<(), BackendError> {
        if !self.state.lock().can_start() {
            return Err(BackendError::DeviceError("start called before reset".into()));
        }

        if let Some(event) = *self.notify_event.lock() {
            unsafe {
                let _ = ResetEvent(event.0);
            }
        }

        let client = self.client.lock().clone().ok_or_else(|| BackendError::DeviceError("no audio client".into()))?;
        let start_result: Result<(), String> = proxy::call({
            let client = client.clone();
            move || unsafe { client.Start().map_err(|e| format!("IAudioClient::Start failed: {e}")) }
        });

        if let Err(e) = start_result {
            return Err(BackendError::DeviceError(e));
        }

        self.kill.store(false, Ordering::Release);

        let capture_client = self.capture.lock().clone().expect("capture client set by reset");
        let notify_event = self.notify_event.lock().expect("notify event set");
        let device_context = self.device_context.clone();
        let kill = self.kill.clone();

        let mut stream = self.stream.lock();
        let channel_converter = stream.channel_converter.take();
        let sample_converter = stream.sample_converter.take();
        let device_frame_size = stream.device_frame_size;
        let post_channel_channels = stream.post_channel_channels;
        let post_channel_frame_size = stream.post_channel_frame_size;
        drop(stream);

        // SAFETY: `self` outlives the record thread because `stop` always
        // joins it before the engine can be dropped or reset again.
        let ring_ptr = &self.ring as *const PlMutex<Option<Box<dyn RingBuffer>>> as usize;

        let handle = std::thread::Builder::new()
            .name(RECORD_THREAD_NAME.into())
            .spawn(move || {
                let ring = unsafe { &*(ring_ptr as *const PlMutex<Option<Box<dyn RingBuffer>>>) };
                record_loop(
                    capture_client,
                    notify_event,
                    device_context,
                    channel_converter,
                    sample_converter,
                    device_frame_size,
                    post_channel_channels,
                    post_channel_frame_size,
                    ring,
                    kill,
                );
            })
            .map_err(|e| format!("failed to spawn record thread: {e}"));

        match handle {
            Ok(h) => {
                *self.thread.lock() = Some(h);
                *self.state.lock() = EngineState::Running;
                Ok(())
            }
            Err(e) => {
                let client = self.client.lock().clone();
                if let Some(client) = client {
                    proxy::call(move || unsafe {
                        let _ = client.Stop();
                    });
                }
                Err(BackendError::DeviceError(e))
            }
        }
    }

    pub fn stop(&self) {
        if self.thread.lock().is_none() {
            return;
        }
        self.kill.store(true, Ordering::Release);
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }

        let client = self.client.lock().clone();
        if let Some(client) = client {
            proxy::call(move || unsafe {
                let _ = client.Stop();
            });
        }
        *self.state.lock() = EngineState::Configured;
    }

    /// Drains up to `frames` frames from the ring buffer into `dst`
    /// (`dst.len() >= frames * frame_size`). Underruns are zero-filled
    /// rather than shrinking the returned range (§4.4).
    pub fn capture_samples(&self, dst: &mut [u8], frames: usize) {
        let frame_size = self.format.lock().as_ref().map(|f| f.block_align() as usize).unwrap_or(1);
        let mut ring = self.ring.lock();
        let Some(ring) = ring.as_mut() else {
            dst[..frames * frame_size].fill(0);
            return;
        };
        let got = ring.read(dst, frames);
        if got < frames {
            let start = got * frame_size;
            dst[start..frames * frame_size].fill(0);
        }
    }

    pub fn available_samples(&self) -> usize {
        self.ring.lock().as_ref().map(|r| r.read_space()).unwrap_or(0)
    }
}

struct CaptureResetOutcome {
    client: IAudioClient,
    capture: IAudioCaptureClient,
    device_format: FormatDescriptor,
    caller_format: FormatDescriptor,
    channel_conversion_target: Option<ChannelLayout>,
    os_buffer_frames: u32,
}

/// A negotiation failure crossing the Proxy Thread boundary. Carries the
/// raw HRESULT (when the failure came from a COM call) so `reset` can
/// special-case the OS out-of-memory status per §7; failures with no
/// underlying HRESULT (e.g. the `validate_capture_fmt` rejection) map to
/// a plain `DeviceError`.
struct NegotiationFailure {
    message: String,
    hresult: Option<i32>,
}

impl NegotiationFailure {
    fn from_win_err(context: &str, e: windows::core::Error) -> Self {
        Self { message: format!("{context}: {e}"), hresult: Some(e.code().0) }
    }

    fn plain(message: String) -> Self {
        Self { message, hresult: None }
    }
}

impl From<String> for NegotiationFailure {
    fn from(message: String) -> Self {
        Self::plain(message)
    }
}

impl std::fmt::Display for NegotiationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// The core of `resetProxy` for capture: activate, validate (no
/// downgrading), initialize against the device's own mix format, and work
/// out what channel/sample conversion (if any) bridges it to the caller's
/// requested format.
fn negotiate_and_initialize(
    device: &windows::Win32::Media::Audio::IMMDevice,
    requested: RequestedFormat,
    buffer_time: Duration,
) -> Result<CaptureResetOutcome, NegotiationFailure> {
    let client: IAudioClient = unsafe {
        device
            .Activate(windows::Win32::System::Com::CLSCTX_ALL, None)
            .map_err(|e| NegotiationFailure::from_win_err("Activate failed", e))?
    };

    let mix_format_ptr = unsafe {
        client.GetMixFormat().map_err(|e| NegotiationFailure::from_win_err("GetMixFormat failed", e))?
    };
    let (device_channels, device_mask, device_bits, device_valid_bits, device_is_float) = unsafe { normalize(mix_format_ptr) };
    let device_rate = unsafe { (*mix_format_ptr).nSamplesPerSec };
    let (device_sample_type, _) = SampleType::from_wire(device_is_float, device_bits);

    let (inferred_layout, _) = infer_layout_from_mask(device_channels as u32, device_mask).unwrap_or((ChannelLayout::Stereo, false));
    let layout = requested.channels.unwrap_or(inferred_layout);

    if !validate_capture_fmt(layout, device_channels as u32, device_mask) {
        return Err(NegotiationFailure::plain(format!(
            "requested layout {layout:?} not supported by device (channels={device_channels}, mask=0x{device_mask:08x})"
        )));
    }

    let device_format = FormatDescriptor {
        channels: device_channels,
        channel_mask: device_mask,
        samples_per_sec: device_rate,
        bits_per_sample: device_bits,
        valid_bits_per_sample: device_valid_bits,
        sample_type: device_sample_type,
    };

    // Initialize against the device's own format; capture cannot ask the
    // OS to convert, unlike playback (§4.4).
    let wfx_ext = build_wfx(&device_format);
    let buffer_duration_100ns = (buffer_time.as_nanos() / 100) as i64;
    unsafe {
        client
            .Initialize(
                AUDCLNT_SHAREMODE_SHARED,
                AUDCLNT_STREAMFLAGS_EVENTCALLBACK,
                buffer_duration_100ns,
                0,
                &wfx_ext.Format,
                None,
            )
            .map_err(|e| NegotiationFailure::from_win_err("IAudioClient::Initialize failed", e))?;
    }

    let os_buffer_frames =
        unsafe { client.GetBufferSize().map_err(|e| NegotiationFailure::from_win_err("GetBufferSize failed", e))? };
    let capture: IAudioCaptureClient =
        unsafe { client.GetService().map_err(|e| NegotiationFailure::from_win_err("GetService failed", e))? };

    // Channel conversion: downmix to mono, or broadcast mono to stereo.
    let channel_conversion_target = if layout == ChannelLayout::Mono && device_channels > 1 {
        Some(ChannelLayout::Mono)
    } else if layout == ChannelLayout::Stereo && device_channels == 1 {
        Some(ChannelLayout::Stereo)
    } else {
        None
    };

    let caller_rate = requested.frequency.unwrap_or(device_rate);
    let caller_sample_type = requested.sample_type.map(|t| t.widen()).unwrap_or(SampleType::Float);
    let (caller_channels, caller_mask) = layout.wire_channels_and_mask(false);
    let caller_format = FormatDescriptor {
        channels: caller_channels,
        channel_mask: caller_mask,
        samples_per_sec: caller_rate,
        bits_per_sample: caller_sample_type.bits_per_sample(),
        valid_bits_per_sample: caller_sample_type.bits_per_sample(),
        sample_type: caller_sample_type,
    };

    Ok(CaptureResetOutcome {
        client,
        capture,
        device_format,
        caller_format,
        channel_conversion_target,
        os_buffer_frames,
    })
}

#[allow(clippy::too_many_arguments)]
fn record_loop(
    capture_client: IAudioCaptureClient,
    notify_event: SendHandle,
    device_context: Arc<dyn DeviceContext>,
    mut channel_converter: Option<Box<dyn ChannelConverter>>,
    mut sample_converter: Option<Box<dyn SampleConverter>>,
    device_frame_size: usize,
    post_channel_channels: u16,
    post_channel_frame_size: usize,
    ring: &PlMutex<Option<Box<dyn RingBuffer>>>,
    kill: Arc<AtomicBool>,
) {
    unsafe {
        let _ = CoInitializeEx(None, COINIT_MULTITHREADED);
    }
    let _com_guard = CoUninitializeGuard;
    set_realtime_priority();
    log::trace!("{RECORD_THREAD_NAME} started");

    let mut scratch: Vec<f32> = Vec::new();

    'outer: while !kill.load(Ordering::Acquire) {
        if !wait_notify(notify_event) {
            continue;
        }

        loop {
            let mut packet_frames: u32 = 0;
            if let Err(e) = unsafe { capture_client.GetNextPacketSize(&mut packet_frames) } {
                device_context.handle_disconnect(&format!("GetNextPacketSize failed: {e}"));
                break 'outer;
            }
            if packet_frames == 0 {
                break;
            }

            let mut buffer_ptr: *mut u8 = std::ptr::null_mut();
            let mut frames_read: u32 = 0;
            let mut flags: u32 = 0;
            if let Err(e) = unsafe { capture_client.GetBuffer(&mut buffer_ptr, &mut frames_read, &mut flags, None, None) } {
                device_context.handle_disconnect(&format!("GetBuffer failed: {e}"));
                break 'outer;
            }

            let byte_len = frames_read as usize * device_frame_size;
            let silent = flags & AUDCLNT_BUFFERFLAGS_SILENT.0 as u32 != 0;
            let zeros = vec![0u8; byte_len];
            let device_bytes: &[u8] = if silent || buffer_ptr.is_null() {
                &zeros
            } else {
                unsafe { std::slice::from_raw_parts(buffer_ptr, byte_len) }
            };

            let post_channel_bytes: &[u8] = if let Some(conv) = channel_converter.as_mut() {
                let needed = frames_read as usize * post_channel_channels as usize;
                scratch.resize(needed, 0.0);
                conv.convert(device_bytes, &mut scratch);
                unsafe { std::slice::from_raw_parts(scratch.as_ptr() as *const u8, needed * 4) }
            } else {
                device_bytes
            };

            {
                let mut ring_slot = ring.lock();
                if let Some(ring) = ring_slot.as_mut() {
                    write_to_ring(
                        ring.as_mut(),
                        post_channel_bytes,
                        post_channel_frame_size,
                        sample_converter.as_deref_mut(),
                    );
                }
            }

            if let Err(e) = unsafe { capture_client.ReleaseBuffer(frames_read) } {
                device_context.handle_disconnect(&format!("ReleaseBuffer failed: {e}"));
                break 'outer;
            }
        }
    }

    log::trace!("{RECORD_THREAD_NAME} exiting");
}

/// Writes `src` (in `src_frame_size`-byte frames) into the ring buffer's
/// two-segment write vector, optionally sample-converting first. Overruns
/// silently drop whatever didn't fit (§4.4).
fn write_to_ring(ring: &mut dyn RingBuffer, src: &[u8], src_frame_size: usize, converter: Option<&mut dyn SampleConverter>) {
    let mut produced_total = 0usize;
    let mut consumed_bytes = 0usize;

    match converter {
        Some(conv) => {
            let wv = ring.write_vector();
            let (c1, p1) = conv.convert(&src[consumed_bytes..], wv.first.buf);
            consumed_bytes += c1 * src_frame_size;
            produced_total += p1;
            if wv.second.len > 0 && consumed_bytes < src.len() {
                let (c2, p2) = conv.convert(&src[consumed_bytes..], wv.second.buf);
                consumed_bytes += c2 * src_frame_size;
                produced_total += p2;
            }
        }
        None => {
            let wv = ring.write_vector();
            let src_frames = src.len() / src_frame_size.max(1);
            let first_frames = src_frames.min(wv.first.len);
            let first_bytes = first_frames * src_frame_size;
            wv.first.buf[..first_bytes].copy_from_slice(&src[..first_bytes]);
            let remaining_frames = (src_frames - first_frames).min(wv.second.len);
            if remaining_frames > 0 {
                let remaining_bytes = remaining_frames * src_frame_size;
                wv.second.buf[..remaining_bytes].copy_from_slice(&src[first_bytes..first_bytes + remaining_bytes]);
            }
            produced_total = first_frames + remaining_frames;
        }
    }

    ring.write_advance(produced_total);
}

fn wait_notify(event: SendHandle) -> bool {
    let result = unsafe { WaitForSingleObject(event.0, NOTIFY_TIMEOUT.as_millis() as u32) };
    if result != WAIT_OBJECT_0 {
        log::warn!("record thread notification wait timed out");
        false
    } else {
        true
    }
}

fn set_realtime_priority() {
    unsafe {
        let mut task_index: u32 = 0;
        let name: Vec<u16> = "Pro Audio\0".encode_utf16().collect();
        let _ = AvSetMmThreadCharacteristicsW(PCWSTR(name.as_ptr()), &mut task_index);
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        self.stop();
        if *self.state.lock() != EngineState::Closed {
            let mm_device = self.mm_device.lock().take();
            let client = self.client.lock().take();
            let capture = self.capture.lock().take();
            proxy::call(move || {
                drop(capture);
                drop(client);
                drop(mm_device);
            });
            proxy::deinit_thread();
        }
        if let Some(event) = self.notify_event.lock().take() {
            unsafe {
                let _ = CloseHandle(event.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_prefix_is_stripped() {
        let name = "OpenAL Soft on USB Microphone";
        assert_eq!(name.strip_prefix(DEVICE_PREFIX), Some("USB Microphone"));
    }

    #[test]
    fn min_buffer_time_floor_applies() {
        assert_eq!(Duration::from_millis(20).max(MIN_BUFFER_TIME), MIN_BUFFER_TIME);
        assert_eq!(Duration::from_millis(200).max(MIN_BUFFER_TIME), Duration::from_millis(200));
    }

    #[test]
    fn negotiation_failure_plain_has_no_hresult() {
        let failure = NegotiationFailure::plain("unsupported layout".into());
        assert_eq!(failure.hresult, None);
        assert_eq!(failure.to_string(), "unsupported layout");
    }

    #[test]
    fn out_of_memory_hresult_maps_to_out_of_memory_error() {
        let failure = NegotiationFailure { message: "IAudioClient::Initialize failed".into(), hresult: Some(E_OUTOFMEMORY.0) };
        let mapped = match failure.hresult {
            Some(code) => BackendError::from_status(&failure.message, code, E_OUTOFMEMORY.0),
            None => BackendError::DeviceError(failure.message),
        };
        assert_eq!(mapped, BackendError::OutOfMemory);
    }
}
