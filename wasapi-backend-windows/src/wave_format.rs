//! Conversion between the core crate's direction-agnostic
//! `FormatDescriptor` and the OS `WAVEFORMATEXTENSIBLE` structure.
//!
//! Grounded in the original's `MakeExtensible()` (normalize a raw
//! `WAVEFORMATEX` returned by `GetMixFormat`/`IsFormatSupported` into an
//! extensible struct we can read channel mask and subtype off of) and the
//! `OutputType`/`InputType` construction in `resetProxy()`.

use windows::Win32::Media::Audio::{
    WAVEFORMATEX, WAVEFORMATEXTENSIBLE, WAVE_FORMAT_EXTENSIBLE, WAVE_FORMAT_IEEE_FLOAT, WAVE_FORMAT_PCM,
};
use windows::Win32::Media::KernelStreaming::{KSDATAFORMAT_SUBTYPE_IEEE_FLOAT, KSDATAFORMAT_SUBTYPE_PCM};

use wasapi_backend_core::format::{FormatDescriptor, SampleType};

/// Build a `WAVEFORMATEXTENSIBLE` for the given descriptor, ready to pass
/// to `IsFormatSupported`/`Initialize`.
pub fn build_wfx(fmt: &FormatDescriptor) -> WAVEFORMATEXTENSIBLE {
    let is_float = fmt.sample_type == SampleType::Float;
    let block_align = fmt.block_align();

    let mut wfx = WAVEFORMATEXTENSIBLE::default();
    wfx.Format.wFormatTag = WAVE_FORMAT_EXTENSIBLE as u16;
    wfx.Format.nChannels = fmt.channels;
    wfx.Format.nSamplesPerSec = fmt.samples_per_sec;
    wfx.Format.wBitsPerSample = fmt.bits_per_sample;
    wfx.Format.nBlockAlign = block_align;
    wfx.Format.nAvgBytesPerSec = fmt.avg_bytes_per_sec();
    wfx.Format.cbSize = (std::mem::size_of::<WAVEFORMATEXTENSIBLE>() - std::mem::size_of::<WAVEFORMATEX>()) as u16;
    wfx.Samples.wValidBitsPerSample = fmt.valid_bits_per_sample;
    wfx.dwChannelMask = fmt.channel_mask;
    wfx.SubFormat = if is_float {
        KSDATAFORMAT_SUBTYPE_IEEE_FLOAT
    } else {
        KSDATAFORMAT_SUBTYPE_PCM
    };
    wfx
}

/// Normalize a raw `WAVEFORMATEX*` (as returned by `GetMixFormat` or
/// filled in by `IsFormatSupported`) into channel count, channel mask,
/// and whether the subtype is IEEE float, handling the three shapes the
/// OS can hand back: plain PCM/float `WAVEFORMATEX`, and the extensible
/// variant that actually carries a channel mask.
pub unsafe fn normalize(wfx: *const WAVEFORMATEX) -> (u16, u32, u16, u16, bool) {
    let base = &*wfx;
    let channels = base.nChannels;
    let bits_per_sample = base.wBitsPerSample;

    if base.wFormatTag as u32 == WAVE_FORMAT_EXTENSIBLE && base.cbSize as usize >= 22 {
        let ext = &*(wfx as *const WAVEFORMATEXTENSIBLE);
        let is_float = ext.SubFormat == KSDATAFORMAT_SUBTYPE_IEEE_FLOAT;
        (channels, ext.dwChannelMask, bits_per_sample, ext.Samples.wValidBitsPerSample, is_float)
    } else {
        let is_float = base.wFormatTag as u32 == WAVE_FORMAT_IEEE_FLOAT;
        let default_mask = match channels {
            1 => wasapi_backend_core::format::speaker::FRONT_CENTER,
            2 => wasapi_backend_core::format::speaker::FRONT_LEFT | wasapi_backend_core::format::speaker::FRONT_RIGHT,
            _ => 0,
        };
        let _ = WAVE_FORMAT_PCM;
        (channels, default_mask, bits_per_sample, bits_per_sample, is_float)
    }
}
