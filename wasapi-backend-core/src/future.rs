//! A minimal `Promise`/`Future` pair backed by a mutex and condvar,
//! standing in for `std::promise`/`std::future` from the original. Each
//! Proxy Thread request gets exactly one of these; the caller blocks on
//! `Future::get` while the proxy thread fulfills the matching `Promise`.

use std::sync::{Arc, Condvar, Mutex};

struct Shared<T> {
    value: Mutex<Option<T>>,
    ready: Condvar,
}

/// The write half, held by the proxy thread's message loop.
pub struct Promise<T> {
    shared: Arc<Shared<T>>,
}

/// The read half, held by the caller that pushed the request.
pub struct Future<T> {
    shared: Arc<Shared<T>>,
}

/// Create a connected `(Promise, Future)` pair.
pub fn channel<T>() -> (Promise<T>, Future<T>) {
    let shared = Arc::new(Shared {
        value: Mutex::new(None),
        ready: Condvar::new(),
    });
    (
        Promise { shared: shared.clone() },
        Future { shared },
    )
}

impl<T> Promise<T> {
    /// Fulfill the promise. Panics if called more than once.
    pub fn set_value(self, value: T) {
        let mut slot = self.shared.value.lock().unwrap();
        assert!(slot.is_none(), "promise already fulfilled");
        *slot = Some(value);
        self.shared.ready.notify_one();
    }
}

impl<T> Future<T> {
    /// Block until the promise is fulfilled and return the value.
    pub fn get(self) -> T {
        let mut slot = self.shared.value.lock().unwrap();
        while slot.is_none() {
            slot = self.shared.ready.wait(slot).unwrap();
        }
        slot.take().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn get_returns_set_value() {
        let (promise, future) = channel::<i32>();
        promise.set_value(42);
        assert_eq!(future.get(), 42);
    }

    #[test]
    fn get_blocks_until_fulfilled_from_another_thread() {
        let (promise, future) = channel::<&'static str>();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            promise.set_value("done");
        });
        assert_eq!(future.get(), "done");
        handle.join().unwrap();
    }

    #[test]
    #[should_panic(expected = "promise already fulfilled")]
    fn double_set_value_panics() {
        let (promise, _future) = channel::<i32>();
        let shared = promise.shared.clone();
        promise.set_value(1);
        Promise { shared }.set_value(2);
    }
}
