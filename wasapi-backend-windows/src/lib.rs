//! # wasapi-backend-windows
//!
//! Windows side of the WASAPI audio backend: the COM Proxy Thread, the
//! Device Helper, the Playback and Capture engines, and the backend
//! Factory. Everything here runs only on Windows; the format/negotiation
//! tables and external collaborator traits it builds on live in
//! `wasapi-backend-core` so they can be tested off-platform.
//!
//! ## Platform requirements
//! - Windows 10 1703+ (build 15063) for event-driven shared-mode streams.
//! - Visual Studio Build Tools + Windows SDK for linking against the
//!   `windows` crate's COM bindings.
//!
//! ## Usage
//! ```ignore
//! use wasapi_backend_windows::factory::Factory;
//! use wasapi_backend_windows::device_helper::Direction;
//!
//! let factory = Factory::new(event_bus)?;
//! let names = factory.probe(Direction::Playback);
//! let mut engine = factory.create_playback(mixer_callback, config, converter_factory, device_context);
//! engine.open(None)?;
//! ```

#[cfg(target_os = "windows")]
pub mod capture;
#[cfg(target_os = "windows")]
pub mod com_util;
#[cfg(target_os = "windows")]
pub mod device_helper;
#[cfg(target_os = "windows")]
pub mod factory;
#[cfg(target_os = "windows")]
pub mod playback;
#[cfg(target_os = "windows")]
pub mod proxy;
#[cfg(target_os = "windows")]
pub mod wave_format;

#[cfg(target_os = "windows")]
pub use capture::CaptureEngine;
#[cfg(target_os = "windows")]
pub use device_helper::{DeviceHelper, Direction};
#[cfg(target_os = "windows")]
pub use factory::Factory;
#[cfg(target_os = "windows")]
pub use playback::{DeviceContext, PlaybackEngine, RequestedFormat};
