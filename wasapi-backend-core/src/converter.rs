//! External collaborator traits for sample-rate and channel conversion.
//! Neither is implemented by this crate — both are supplied by the host
//! application (spec §1 Out-of-scope) — but the engines need a narrow,
//! stable contract to call through, matching the original's
//! `SampleConverter`/`ChannelConverter` interfaces.

use crate::format::SampleType;

/// A resampling/format-widening converter created for a specific
/// src-type/dst-type/channel-count/src-rate/dst-rate combination.
pub trait SampleConverter: Send {
    /// Convert as much of `src` into `dst` as will fit, returning
    /// `(frames_consumed, frames_produced)`.
    fn convert(&mut self, src: &[u8], dst: &mut [u8]) -> (usize, usize);

    /// Frames of input currently buffered inside the converter and not
    /// yet reflected in its output (used for clock-latency accounting).
    fn current_input_delay(&self) -> u32;
}

/// Constructs `SampleConverter` instances. Supplied externally.
pub trait SampleConverterFactory: Send + Sync {
    fn create(
        &self,
        src_type: SampleType,
        dst_type: SampleType,
        channels: u16,
        src_rate: u32,
        dst_rate: u32,
    ) -> Option<Box<dyn SampleConverter>>;
}

/// A channel up/down-mixing converter (e.g. 5.1 -> mono with the LFE bit
/// cleared, or mono -> stereo broadcast). Always produces `f32` output,
/// matching the original, since channel conversion happens upstream of
/// any sample-rate resampling.
pub trait ChannelConverter: Send {
    fn convert(&mut self, src: &[u8], dst: &mut [f32]);
}

/// Constructs `ChannelConverter` instances for a specific source type,
/// source channel count/mask, and destination layout.
pub trait ChannelConverterFactory: Send + Sync {
    fn create(
        &self,
        src_type: SampleType,
        src_channels: u16,
        src_mask: u32,
        dst_layout: crate::format::ChannelLayout,
    ) -> Option<Box<dyn ChannelConverter>>;
}
