//! Playback engine: the render-side state machine (`Closed -> Opened ->
//! Configured -> Running`), its format negotiation, and its mixer thread.
//!
//! Grounded in the original's `WasapiPlayback` (`open`/`openProxy`,
//! `reset`/`resetProxy`, `start`/`startProxy`, `stop`/`stopProxy`,
//! `mixerProc`, `getClockLatency`). Every privileged step runs through
//! `proxy::call`, matching §4.1/§5's COM-apartment rule; the mixer thread
//! is spawned by `startProxy` and joined by `stopProxy`, also per spec.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex as PlMutex;
use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, WAIT_OBJECT_0};
use windows::Win32::Media::Audio::{
    eRender, AudioSessionDisconnectReason, AUDCLNT_SHAREMODE_SHARED, AUDCLNT_STREAMFLAGS_EVENTCALLBACK,
    IAudioClient, IAudioRenderClient,
};
use windows::Win32::System::Com::{CoInitializeEx, COINIT_MULTITHREADED};
use windows::Win32::System::Threading::{AvSetMmThreadCharacteristicsW, CreateEventW, ResetEvent, WaitForSingleObject};

use wasapi_backend_core::converter::{SampleConverter, SampleConverterFactory};
use wasapi_backend_core::error::BackendError;
use wasapi_backend_core::format::{
    infer_layout_from_mask, mask_satisfies_request, ChannelLayout, FormatDescriptor, RequestedSampleType, SampleType,
};
use wasapi_backend_core::mixer::MixerCallback;
use wasapi_backend_core::state::EngineState;
use wasapi_backend_core::{ConfigSource, RingBuffer};

use crate::com_util::{CoUninitializeGuard, SendHandle};
use crate::device_helper::{DeviceHelper, Direction};
use crate::proxy;
use crate::wave_format::{build_wfx, normalize};

const DEVICE_PREFIX: &str = "OpenAL Soft on ";
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(2);
const MIXER_THREAD_NAME: &str = "wasapi-mixer";

/// External collaborator used by the mixer thread for disconnect
/// reporting and by `getClockLatency` for the device-side clock
/// component (§4.3.4, §7).
pub trait DeviceContext: Send + Sync {
    fn device_clock_time(&self) -> Duration;
    fn handle_disconnect(&self, message: &str);
}

/// What the caller requested before `reset`; `None` fields mean "let the
/// negotiation infer this from the mix format" (§4.3.2 step 3).
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestedFormat {
    pub channels: Option<ChannelLayout>,
    pub frequency: Option<u32>,
    pub sample_type: Option<RequestedSampleType>,
}

pub struct ClockLatency {
    pub clock_time: Duration,
    pub latency: Duration,
}

struct StreamState {
    resampler: Option<Box<dyn SampleConverter>>,
    resample_buffer: Vec<u8>,
    buffer_filled: usize,
}

pub struct PlaybackEngine {
    device_helper: Arc<PlMutex<DeviceHelper>>,
    mixer_callback: MixerCallback,
    config: Arc<dyn ConfigSource>,
    converter_factory: Arc<dyn SampleConverterFactory>,
    device_context: Arc<dyn DeviceContext>,

    state: PlMutex<EngineState>,
    device_name: PlMutex<String>,
    mm_device: PlMutex<Option<windows::Win32::Media::Audio::IMMDevice>>,
    client: PlMutex<Option<IAudioClient>>,
    render: PlMutex<Option<IAudioRenderClient>>,
    notify_event: PlMutex<Option<SendHandle>>,

    requested: PlMutex<RequestedFormat>,
    format: PlMutex<Option<FormatDescriptor>>,
    is_rear_51: AtomicBool,

    orig_buffer_size: AtomicU32,
    orig_update_size: AtomicU32,
    update_size: AtomicU32,
    buffer_size: AtomicU32,

    stream: PlMutex<StreamState>,
    padding: AtomicU32,

    kill: Arc<AtomicBool>,
    thread: PlMutex<Option<JoinHandle<()>>>,
}

// All COM handles are only ever touched from the Proxy Thread or from
// `mixer_loop`, which runs on a thread spawned by the Proxy Thread.
unsafe impl Send for PlaybackEngine {}
unsafe impl Sync for PlaybackEngine {}

impl PlaybackEngine {
    pub fn new(
        device_helper: Arc<PlMutex<DeviceHelper>>,
        mixer_callback: MixerCallback,
        config: Arc<dyn ConfigSource>,
        converter_factory: Arc<dyn SampleConverterFactory>,
        device_context: Arc<dyn DeviceContext>,
    ) -> Self {
        Self {
            device_helper,
            mixer_callback,
            config,
            converter_factory,
            device_context,
            state: PlMutex::new(EngineState::Closed),
            device_name: PlMutex::new(String::new()),
            mm_device: PlMutex::new(None),
            client: PlMutex::new(None),
            render: PlMutex::new(None),
            notify_event: PlMutex::new(None),
            requested: PlMutex::new(RequestedFormat::default()),
            format: PlMutex::new(None),
            is_rear_51: AtomicBool::new(false),
            orig_buffer_size: AtomicU32::new(0),
            orig_update_size: AtomicU32::new(0),
            update_size: AtomicU32::new(0),
            buffer_size: AtomicU32::new(0),
            stream: PlMutex::new(StreamState { resampler: None, resample_buffer: Vec::new(), buffer_filled: 0 }),
            padding: AtomicU32::new(0),
            kill: Arc::new(AtomicBool::new(false)),
            thread: PlMutex::new(None),
        }
    }

    /// §4.3.1. `name` may carry the `"OpenAL Soft on "` prefix; an empty
    /// residue after stripping it means "default device".
    pub fn open(&self, name: Option<&str>) -> Result<(), BackendError> {
        if *self.state.lock() != EngineState::Closed {
            return Err(BackendError::DeviceError("playback engine already open".into()));
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
            if helper.playback.devices().is_empty() {
                if let Err(e) = helper.probe_devices(Direction::Playback) {
                    log::warn!("playback enumeration failed: {e}");
                }
            }
            let device = helper
                .open_device(Direction::Playback, key_for_proxy.as_deref())
                .map_err(|e| format!("OpenDevice failed: {e}"))?;
            let name = key_for_proxy.unwrap_or_else(|| "Default Playback Device".to_string());
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

    /// §4.3.2: format negotiation. May be called repeatedly.
    pub fn reset(&self, requested: RequestedFormat, buffer_time: Duration) -> Result<(), BackendError> {
        if !self.state.lock().can_reset() {
            return Err(BackendError::DeviceError("reset called before open".into()));
        }
        *self.requested.lock() = requested;

        let device = self.mm_device.lock().clone().ok_or_else(|| BackendError::DeviceError("no device".into()))?;
        let config = self.config.clone();
        let converter_factory = self.converter_factory.clone();
        let device_name = self.device_name.lock().clone();

        let outcome = proxy::call(move || -> Result<ResetOutcome, String> {
            negotiate_and_initialize(&device, requested, buffer_time, &*config, &device_name)
        });

        match outcome {
            Ok(outcome) => {
                *self.client.lock() = Some(outcome.client);
                *self.format.lock() = Some(outcome.format);
                self.is_rear_51.store(outcome.is_rear_51, Ordering::Relaxed);
                self.orig_buffer_size.store(outcome.orig_buffer_size, Ordering::Relaxed);
                self.orig_update_size.store(outcome.orig_update_size, Ordering::Relaxed);
                self.update_size.store(outcome.update_size, Ordering::Relaxed);
                self.buffer_size.store(outcome.buffer_size, Ordering::Relaxed);

                let resampler = outcome
                    .resampler_rates
                    .map(|(src_rate, dst_rate)| {
                        converter_factory
                            .create(outcome.format.sample_type, outcome.format.sample_type, outcome.format.channels, src_rate, dst_rate)
                    })
                    .flatten();
                let resample_buffer_len =
                    outcome.update_size as usize * outcome.format.channels as usize * (outcome.format.bits_per_sample as usize / 8);
                let mut stream = self.stream.lock();
                stream.resampler = resampler;
                stream.resample_buffer = vec![0u8; resample_buffer_len];
                stream.buffer_filled = 0;

                if let Some(event) = *self.notify_event.lock() {
                    if let Some(client) = self.client.lock().as_ref() {
                        let _ = unsafe { client.SetEventHandle(event.0) };
                    }
                }

                *self.state.lock() = EngineState::Configured;
                Ok(())
            }
            Err(e) => {
                log::error!("playback reset failed: {e}");
                Err(BackendError::DeviceError(e))
            }
        }
    }

    /// §4.3.3 start.
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

        let start_result: Result<IAudioRenderClient, String> = proxy::call({
            let client = client.clone();
            move || unsafe {
                client.Start().map_err(|e| format!("IAudioClient::Start failed: {e}"))?;
                client.GetService::<IAudioRenderClient>().map_err(|e| format!("GetService failed: {e}"))
            }
        });

        let render = match start_result {
            Ok(r) => r,
            Err(e) => {
                let client = self.client.lock().clone();
                if let Some(client) = client {
                    proxy::call(move || unsafe {
                        let _ = client.Stop();
                    });
                }
                return Err(BackendError::DeviceError(e));
            }
        };

        *self.render.lock() = Some(render);
        self.kill.store(false, Ordering::Release);

        let mixer_callback = self.mixer_callback.clone();
        let render_for_thread = self.render.lock().clone();
        let notify_event = self.notify_event.lock().clone();
        let device_context = self.device_context.clone();
        let format = self.format.lock().expect("format set by reset");
        let kill = self.kill.clone();
        let padding = &self.padding as *const AtomicU32 as usize;
        let update_size = self.update_size.load(Ordering::Relaxed);
        let client_for_thread = client;

        // SAFETY: `self` outlives the mixer thread because `stop` always
        // joins it before the engine can be dropped or reset again.
        let stream_ptr = &self.stream as *const PlMutex<StreamState> as usize;

        let handle = std::thread::Builder::new()
            .name(MIXER_THREAD_NAME.into())
            .spawn(move || {
                let padding = unsafe { &*(padding as *const AtomicU32) };
                let stream = unsafe { &*(stream_ptr as *const PlMutex<StreamState>) };
                mixer_loop(
                    client_for_thread,
                    render_for_thread.expect("render client set"),
                    notify_event.expect("notify event set"),
                    mixer_callback,
                    device_context,
                    format,
                    update_size,
                    stream,
                    padding,
                    kill,
                );
            })
            .map_err(|e| format!("failed to spawn mixer thread: {e}"));

        match handle {
            Ok(h) => {
                *self.thread.lock() = Some(h);
                *self.state.lock() = EngineState::Running;
                Ok(())
            }
            Err(e) => {
                *self.render.lock() = None;
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

    /// §4.3.3 stop.
    pub fn stop(&self) {
        if self.render.lock().is_none() || self.thread.lock().is_none() {
            return;
        }
        self.kill.store(true, Ordering::Release);
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
        *self.render.lock() = None;

        let client = self.client.lock().clone();
        if let Some(client) = client {
            proxy::call(move || unsafe {
                let _ = client.Stop();
            });
        }
        *self.state.lock() = EngineState::Configured;
    }

    /// §4.3.4.
    pub fn get_clock_latency(&self) -> ClockLatency {
        let stream = self.stream.lock();
        let format = self.format.lock();
        let rate = format.as_ref().map(|f| f.samples_per_sec).unwrap_or(1).max(1);
        let padding = self.padding.load(Ordering::Relaxed);

        let mut latency = Duration::from_secs_f64(padding as f64 / rate as f64);
        if let Some(resampler) = stream.resampler.as_ref() {
            let delay_frames = resampler.current_input_delay() as f64 + stream.buffer_filled as f64;
            latency += Duration::from_secs_f64(delay_frames / rate as f64);
        }

        ClockLatency { clock_time: self.device_context.device_clock_time(), latency }
    }
}

struct ResetOutcome {
    client: IAudioClient,
    format: FormatDescriptor,
    is_rear_51: bool,
    orig_buffer_size: u32,
    orig_update_size: u32,
    update_size: u32,
    buffer_size: u32,
    resampler_rates: Option<(u32, u32)>,
}

/// The core of `resetProxy` for playback: steps 1-10 of §4.3.2.
fn negotiate_and_initialize(
    device: &windows::Win32::Media::Audio::IMMDevice,
    requested: RequestedFormat,
    buffer_time: Duration,
    config: &dyn ConfigSource,
    device_name: &str,
) -> Result<ResetOutcome, String> {
    use windows::Win32::Media::Audio::IAudioClient;

    let client: IAudioClient = unsafe {
        device.Activate(windows::Win32::System::Com::CLSCTX_ALL, None).map_err(|e| format!("Activate failed: {e}"))?
    };

    let mix_format_ptr = unsafe { client.GetMixFormat().map_err(|e| format!("GetMixFormat failed: {e}"))? };
    let (mix_channels, mix_mask, mix_bits, _mix_valid_bits, mix_is_float) = unsafe { normalize(mix_format_ptr) };
    let mix_rate = unsafe { (*mix_format_ptr).nSamplesPerSec };

    // Step 3: choose desired channel layout.
    let (mut layout, mut is_rear_51) = match requested.channels {
        Some(ChannelLayout::Ambi3D) => (ChannelLayout::Stereo, false),
        Some(layout) => (layout, false),
        None => infer_layout_from_mask(mix_channels as u32, mix_mask).unwrap_or_else(|| {
            log::warn!("unhandled mix format channel mask 0x{mix_mask:08x} ({mix_channels} channels), defaulting to stereo");
            (ChannelLayout::Stereo, false)
        }),
    };

    let frequency = requested.frequency.unwrap_or(mix_rate);
    let requested_type = requested.sample_type.unwrap_or(RequestedSampleType::Float);
    let mut sample_type = requested_type.widen();

    let (channels, mut mask) = layout.wire_channels_and_mask(is_rear_51);
    let mut desired = FormatDescriptor {
        channels,
        channel_mask: mask,
        samples_per_sec: frequency,
        bits_per_sample: sample_type.bits_per_sample(),
        valid_bits_per_sample: sample_type.bits_per_sample(),
        sample_type,
    };

    // Step 4: ask the OS.
    let mut wfx_ext = build_wfx(&desired);
    let mut supported_ptr: *mut windows::Win32::Media::Audio::WAVEFORMATEX = std::ptr::null_mut();
    let supported = unsafe {
        client.IsFormatSupported(AUDCLNT_SHAREMODE_SHARED, &wfx_ext.Format, Some(&mut supported_ptr))
    };

    let (returned_channels, returned_mask, returned_bits, returned_valid_bits, returned_is_float) =
        if supported.is_ok() && supported_ptr.is_null() {
            // Exact match: the format we asked for is supported as-is.
            (desired.channels, desired.channel_mask, desired.bits_per_sample, desired.valid_bits_per_sample, sample_type == SampleType::Float)
        } else if !supported_ptr.is_null() {
            let r = unsafe { normalize(supported_ptr) };
            unsafe { windows::Win32::System::Com::CoTaskMemFree(Some(supported_ptr as *const _)) };
            r
        } else {
            // Re-query the mix format and treat it as the match.
            (mix_channels, mix_mask, mix_bits, mix_bits, mix_is_float)
        };

    // Step 5: re-derive the caller-visible format from the match.
    if requested.channels.is_some() && mask_satisfies_request(layout, returned_channels as u32, returned_mask) {
        // keep the request
    } else if let Some((inferred, rear)) = infer_layout_from_mask(returned_channels as u32, returned_mask) {
        layout = inferred;
        is_rear_51 = rear;
    } else {
        log::warn!("returned format has no recognized layout, falling back to stereo");
        layout = ChannelLayout::Stereo;
        is_rear_51 = false;
    }
    let (final_channels, final_mask) = layout.wire_channels_and_mask(is_rear_51);
    mask = final_mask;

    let (normalized_type, _rewritten) = SampleType::from_wire(returned_is_float, returned_bits);
    sample_type = normalized_type;

    // Step 6: allow-resampler config. The device's running rate is the
    // mix format's rate — GetMixFormat and IsFormatSupported agree on it
    // in shared mode.
    let allow_resampler = config.get_bool(device_name, "allow-resampler").unwrap_or(true);
    let device_rate = mix_rate;
    let negotiated_rate = if allow_resampler { frequency.min(device_rate) } else { device_rate };

    desired = FormatDescriptor {
        channels: final_channels,
        channel_mask: mask,
        samples_per_sec: negotiated_rate,
        bits_per_sample: sample_type.bits_per_sample(),
        valid_bits_per_sample: returned_valid_bits.max(1),
        sample_type,
    };

    let device_format = FormatDescriptor { samples_per_sec: device_rate, ..desired };
    wfx_ext = build_wfx(&device_format);

    // Step 7: initialize event-driven shared mode.
    let buffer_duration_100ns = duration_to_100ns(buffer_time);
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
            .map_err(|e| format!("IAudioClient::Initialize failed: {e}"))?;
    }

    // Step 8: device period / buffer size.
    let mut default_period: i64 = 0;
    let mut min_period: i64 = 0;
    unsafe {
        client
            .GetDevicePeriod(Some(&mut default_period), Some(&mut min_period))
            .map_err(|e| format!("GetDevicePeriod failed: {e}"))?;
    }
    let buffer_len = unsafe { client.GetBufferSize().map_err(|e| format!("GetBufferSize failed: {e}"))? };

    let per_time = buffer_duration_100ns.max(1);
    let mut rounded_min_period = min_period;
    if rounded_min_period < per_time {
        let multiple = ((per_time + rounded_min_period / 2) / rounded_min_period).max(1);
        rounded_min_period *= multiple;
    }

    let samples_for_period = ref_time_to_samples(rounded_min_period, device_rate);
    let orig_update_size = samples_for_period.min(buffer_len / 2);
    let orig_buffer_size = buffer_len;

    let caller_rate = desired.samples_per_sec;
    let update_size = rescale(orig_update_size, device_rate, caller_rate);
    let buffer_size = rescale(orig_buffer_size, device_rate, caller_rate);

    // Step 9: resampler if rates differ.
    let resampler_rates = if caller_rate != device_rate { Some((caller_rate, device_rate)) } else { None };

    Ok(ResetOutcome {
        client,
        format: desired,
        is_rear_51,
        orig_buffer_size,
        orig_update_size,
        update_size,
        buffer_size,
        resampler_rates,
    })
}

fn duration_to_100ns(d: Duration) -> i64 {
    (d.as_nanos() / 100) as i64
}

fn ref_time_to_samples(ref_time_100ns: i64, rate: u32) -> u32 {
    ((ref_time_100ns as i128 * rate as i128) / 10_000_000) as u32
}

fn rescale(value: u32, from_rate: u32, to_rate: u32) -> u32 {
    if from_rate == 0 {
        return value;
    }
    ((value as u64 * to_rate as u64) / from_rate as u64) as u32
}

#[allow(clippy::too_many_arguments)]
fn mixer_loop(
    client: IAudioClient,
    render: IAudioRenderClient,
    notify_event: SendHandle,
    mixer_callback: MixerCallback,
    device_context: Arc<dyn DeviceContext>,
    format: FormatDescriptor,
    update_size: u32,
    stream: &PlMutex<StreamState>,
    padding: &AtomicU32,
    kill: Arc<AtomicBool>,
) {
    unsafe {
        let _ = CoInitializeEx(None, COINIT_MULTITHREADED);
    }
    let _com_guard = CoUninitializeGuard;
    set_realtime_priority();
    log::trace!("{MIXER_THREAD_NAME} started");

    let frame_size = format.block_align() as u32;

    while !kill.load(Ordering::Acquire) {
        // Read the OS's current padding (frames still queued, not yet
        // played) and republish it for `getClockLatency` before deciding
        // how much free space there is to fill (§4.3.3).
        let current_padding = match unsafe { client.GetCurrentPadding() } {
            Ok(p) => p,
            Err(e) => {
                device_context.handle_disconnect(&format!("GetCurrentPadding failed: {e}"));
                break;
            }
        };
        padding.store(current_padding, Ordering::Relaxed);

        let buffer_len = self_buffer_len(&client).unwrap_or(update_size);
        let free = buffer_len.saturating_sub(current_padding);
        if free < update_size {
            let _ = wait_notify(notify_event);
            continue;
        }

        let len = free.min(buffer_len);
        let buffer = unsafe { render.GetBuffer(len) };
        let buffer_ptr = match buffer {
            Ok(p) => p,
            Err(e) => {
                device_context.handle_disconnect(&format!("GetBuffer failed: {e}"));
                break;
            }
        };

        let byte_len = (len * frame_size) as usize;
        let out = unsafe { std::slice::from_raw_parts_mut(buffer_ptr, byte_len) };

        {
            let mut stream_state = stream.lock();
            if stream_state.resampler.is_some() {
                fill_with_resampler(&mut stream_state, &mixer_callback, out, update_size, format.channels, frame_size);
            } else {
                mixer_callback(out, len, format.channels);
            }
            padding.store(current_padding + len, Ordering::Relaxed);
        }

        if let Err(e) = unsafe { render.ReleaseBuffer(len, 0) } {
            device_context.handle_disconnect(&format!("ReleaseBuffer failed: {e}"));
            break;
        }
    }

    padding.store(0, Ordering::Relaxed);
    log::trace!("{MIXER_THREAD_NAME} exiting");
}

fn self_buffer_len(client: &IAudioClient) -> windows::core::Result<u32> {
    unsafe { client.GetBufferSize() }
}

fn fill_with_resampler(
    stream: &mut StreamState,
    mixer_callback: &MixerCallback,
    mut out: &mut [u8],
    update_size: u32,
    channels: u16,
    frame_size: u32,
) {
    while !out.is_empty() {
        if stream.buffer_filled == 0 {
            mixer_callback(&mut stream.resample_buffer, update_size, channels);
            stream.buffer_filled = update_size as usize;
        }

        let filled_bytes = stream.buffer_filled * frame_size as usize;
        let src = stream.resample_buffer[..filled_bytes].to_vec();
        let (consumed, produced) = stream
            .resampler
            .as_mut()
            .expect("resampler present")
            .convert(&src, out);

        if produced == 0 && consumed == 0 {
            break;
        }

        let consumed_bytes = consumed * frame_size as usize;
        let remaining = stream.buffer_filled - consumed;
        stream.resample_buffer.copy_within(consumed_bytes..filled_bytes, 0);
        stream.buffer_filled = remaining;

        let produced_bytes = produced * frame_size as usize;
        out = &mut out[produced_bytes.min(out.len())..];
    }
}

fn wait_notify(event: SendHandle) -> bool {
    let result = unsafe { WaitForSingleObject(event.0, NOTIFY_TIMEOUT.as_millis() as u32) };
    if result != WAIT_OBJECT_0 {
        log::warn!("mixer thread notification wait timed out");
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

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.stop();
        if *self.state.lock() != EngineState::Closed {
            let mm_device = self.mm_device.lock().take();
            let client = self.client.lock().take();
            proxy::call(move || {
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

// Kept to document the disconnect-reason type this backend expects from
// the session notification client, consumed by `DeviceContext` implementors.
pub type DisconnectReason = AudioSessionDisconnectReason;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_prefix_is_stripped() {
        let name = "OpenAL Soft on Speakers (Realtek)";
        assert_eq!(name.strip_prefix(DEVICE_PREFIX), Some("Speakers (Realtek)"));
    }

    #[test]
    fn ref_time_to_samples_matches_rate() {
        // 1,000,000 * 100ns units == 100ms; at 48kHz that's 4800 frames.
        assert_eq!(ref_time_to_samples(1_000_000, 48_000), 4800);
    }

    #[test]
    fn rescale_identity_when_rates_match() {
        assert_eq!(rescale(480, 48_000, 48_000), 480);
    }

    #[test]
    fn rescale_scales_proportionally() {
        assert_eq!(rescale(480, 48_000, 44_100), 441);
    }
}
