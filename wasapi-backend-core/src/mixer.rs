//! The playback-side external collaborator: a callback that fills a
//! render buffer with interleaved samples (`renderSamples` in the
//! original). Supplied by the host application, not implemented here.

use std::sync::Arc;

/// `callback(dst, frames, channels)` must fill exactly `frames` frames
/// (`dst.len() == frames * channels * bytes_per_sample`) of interleaved
/// audio in the engine's negotiated sample type.
pub type MixerCallback = Arc<dyn Fn(&mut [u8], u32, u16) + Send + Sync>;
