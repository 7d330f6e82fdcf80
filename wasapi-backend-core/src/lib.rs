//! # wasapi-backend-core
//!
//! Platform-agnostic core of a WASAPI audio backend: device registry,
//! channel/sample format negotiation, the engine lifecycle state machine,
//! a lock-free SPSC ring buffer, and the external collaborator traits
//! (mixer callback, sample/channel converter factories) the Windows-side
//! engines are built against.
//!
//! ## Architecture
//!
//! ```text
//! wasapi-backend-core (this crate)
//! ├── device     ← DeviceMapEntry, DeviceRegistry
//! ├── event      ← EventBus, EventSubject, default-device-changed message
//! ├── format     ← ChannelLayout, SampleType, mask negotiation table
//! ├── state      ← EngineState lifecycle
//! ├── config     ← ConfigSource
//! ├── future     ← Promise/Future (Proxy Thread request/response)
//! ├── ring_buffer← RingBuffer trait, SpscRingBuffer
//! ├── converter  ← SampleConverter(Factory), ChannelConverter(Factory)
//! ├── mixer      ← MixerCallback
//! └── error      ← BackendError
//! ```

pub mod config;
pub mod converter;
pub mod device;
pub mod error;
pub mod event;
pub mod format;
pub mod future;
pub mod mixer;
pub mod ring_buffer;
pub mod state;

pub use config::{ConfigSource, NoConfig};
pub use converter::{ChannelConverter, ChannelConverterFactory, SampleConverter, SampleConverterFactory};
pub use device::{DeviceMapEntry, DeviceRegistry};
pub use error::BackendError;
pub use event::{default_device_changed_message, EventBus, EventSubject};
pub use format::{ChannelLayout, FormatDescriptor, RequestedSampleType, SampleType};
pub use future::{channel as future_channel, Future, Promise};
pub use mixer::MixerCallback;
pub use ring_buffer::{RingBuffer, SpscRingBuffer, WriteSegment, WriteVector};
pub use state::EngineState;
