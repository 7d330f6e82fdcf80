//! Small COM helpers shared by the mixer and record threads.
//!
//! `CoUninitializeGuard` is lifted straight from the teacher's
//! `wasapi_mic.rs`; `SendHandle` lets a raw `HANDLE` live inside a struct
//! that must be `Send`/`Sync` even though the Windows types themselves
//! carry no such marker — every use of the wrapped handle in this crate
//! happens either on the Proxy Thread or on the worker thread that owns
//! it, per the ownership rule in the data model.

use windows::Win32::Foundation::HANDLE;
use windows::Win32::System::Com::CoUninitialize;

pub struct CoUninitializeGuard;

impl Drop for CoUninitializeGuard {
    fn drop(&mut self) {
        unsafe {
            CoUninitialize();
        }
    }
}

#[derive(Clone, Copy)]
pub struct SendHandle(pub HANDLE);

unsafe impl Send for SendHandle {}
unsafe impl Sync for SendHandle {}
