//! The COM Proxy Thread: every call into an `IAudioClient`/`IMMDevice`
//! happens on one dedicated, ref-counted, COM-initialized thread, so the
//! engines never have to worry about apartment affinity.
//!
//! Grounded in the original's `WasapiProxy`: a `std::deque<Msg>` behind a
//! mutex and condvar, `pushMessage` returning a `std::future`, and a
//! single `messageHandler` thread that loops `popMessage`/dispatch/repeat
//! until a `QuitThread` message arrives. Reworked here with
//! `wasapi_backend_core::future::{Promise, Future}` in place of
//! `std::promise`/`std::future`, and a boxed closure in place of the
//! original's `switch` over an enum + stored param, since the dispatch
//! target varies per engine instance rather than per fixed message kind.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, OnceLock};
use std::thread::JoinHandle;

use windows::Win32::System::Com::{CoInitializeEx, CoUninitialize, COINIT_MULTITHREADED};

use wasapi_backend_core::future::{channel, Future, Promise};

type Job = Box<dyn FnOnce() + Send>;

struct Queue {
    jobs: Mutex<VecDeque<Job>>,
    not_empty: Condvar,
}

struct ProxyState {
    queue: std::sync::Arc<Queue>,
    thread: Mutex<Option<JoinHandle<()>>>,
    ref_count: Mutex<u32>,
}

static PROXY: OnceLock<ProxyState> = OnceLock::new();

fn proxy() -> &'static ProxyState {
    PROXY.get_or_init(|| ProxyState {
        queue: std::sync::Arc::new(Queue {
            jobs: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
        }),
        thread: Mutex::new(None),
        ref_count: Mutex::new(0),
    })
}

fn push_job(job: Job) {
    let state = proxy();
    let mut jobs = state.queue.jobs.lock().unwrap();
    jobs.push_back(job);
    state.queue.not_empty.notify_one();
}

fn pop_job(queue: &Queue) -> Option<Job> {
    let mut jobs = queue.jobs.lock().unwrap();
    while jobs.is_empty() {
        jobs = queue.not_empty.wait(jobs).unwrap();
    }
    jobs.pop_front()
}

fn message_loop(queue: std::sync::Arc<Queue>, started: Promise<()>) {
    unsafe {
        if let Err(e) = CoInitializeEx(None, COINIT_MULTITHREADED).ok() {
            log::error!("proxy thread CoInitializeEx failed: {e}");
        }
    }
    log::trace!("wasapi proxy thread started");
    started.set_value(());

    loop {
        let Some(job) = pop_job(&queue) else { continue };
        // A `None` sentinel job (see `quit`) signals shutdown.
        job();
        if QUIT.with(|q| q.get()) {
            break;
        }
    }

    unsafe {
        CoUninitialize();
    }
    log::trace!("wasapi proxy thread exiting");
}

thread_local! {
    static QUIT: std::cell::Cell<bool> = const { std::cell::Cell::new(false) };
}

/// Reference-counted start: the first caller spawns the thread and blocks
/// until COM is initialized on it; subsequent callers just bump the count.
pub fn init_thread() {
    let state = proxy();
    let mut count = state.ref_count.lock().unwrap();
    *count += 1;
    if *count == 1 {
        let queue = state.queue.clone();
        let (promise, future) = channel::<()>();
        let handle = std::thread::Builder::new()
            .name("wasapi-proxy".into())
            .spawn(move || message_loop(queue, promise))
            .expect("failed to spawn wasapi proxy thread");
        *state.thread.lock().unwrap() = Some(handle);
        drop(count);
        future.get();
    }
}

/// Decrement the ref count; when it reaches zero, push a quit job and
/// join the thread. Matches the original's `DeinitThread`.
pub fn deinit_thread() {
    let state = proxy();
    let mut count = state.ref_count.lock().unwrap();
    if *count == 0 {
        return;
    }
    *count -= 1;
    if *count == 0 {
        drop(count);
        push_job(Box::new(|| {
            QUIT.with(|q| q.set(true));
        }));
        if let Some(handle) = state.thread.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

/// A request-handler return type that can stand in for itself when the
/// handler panics. Every call site returns either `()` (fire-and-forget
/// teardown calls) or a `Result<_, E>` with a string-constructible error,
/// so a blanket impl covers the whole crate.
pub trait ProxyOutcome: Send + 'static {
    fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self;
}

impl ProxyOutcome for () {
    fn from_panic(_payload: Box<dyn std::any::Any + Send>) -> Self {}
}

impl<T, E> ProxyOutcome for Result<T, E>
where
    T: Send + 'static,
    E: From<String> + Send + 'static,
{
    fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        Err(E::from(panic_message(payload)))
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("request handler panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("request handler panicked: {s}")
    } else {
        "request handler panicked".to_string()
    }
}

/// Run `f` on the proxy thread and block on its result. This is the
/// analogue of `pushMessage(type, param).get()`: FIFO per caller, one
/// request in flight at a time from the queue's perspective.
///
/// Per §4.1's failure semantics, an exception (panic) escaping the handler
/// is caught on the proxy thread, converted to a generic failure value via
/// `ProxyOutcome::from_panic`, and surfaced through the future exactly as
/// any other error would be — the loop itself never exits on a per-request
/// error, only on `deinit_thread`'s quit job.
pub fn call<T, F>(f: F) -> T
where
    T: ProxyOutcome,
    F: FnOnce() -> T + Send + 'static,
{
    let (promise, future): (Promise<T>, Future<T>) = channel();
    push_job(Box::new(move || {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)).unwrap_or_else(T::from_panic);
        promise.set_value(result);
    }));
    future.get()
}
