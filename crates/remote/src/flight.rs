//! Single-flight guard for the per-client request state machine.
//!
//! A client instance is either `Idle` or `Requesting`; nothing may start
//! while a request is outstanding. The guard is a busy check, not a queue:
//! a caller that loses the race gets an immediate refusal and decides for
//! itself whether to retry later.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Tracks whether a request is in flight on one client instance.
#[derive(Debug, Default, Clone)]
pub(crate) struct Flight {
    busy: Arc<AtomicBool>,
}

impl Flight {
    /// Attempt the `Idle -> Requesting` transition.
    ///
    /// Returns a permit on success; the permit moves into the request's
    /// continuation chain and transitions back to `Idle` when dropped, on
    /// success and failure alike.
    pub(crate) fn try_begin(&self) -> Option<FlightPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightPermit { busy: Arc::clone(&self.busy) })
    }

    /// Whether a request is currently outstanding.
    pub(crate) fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Held for the duration of one request.
#[derive(Debug)]
pub(crate) struct FlightPermit {
    busy: Arc<AtomicBool>,
}

impl Drop for FlightPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_begin_is_refused_while_permit_lives() {
        let flight = Flight::default();
        let permit = flight.try_begin().expect("idle client accepts a request");
        assert!(flight.is_busy());
        assert!(flight.try_begin().is_none(), "overlapping request must fail fast");
        drop(permit);
        assert!(!flight.is_busy());
        assert!(flight.try_begin().is_some(), "client is reusable once idle again");
    }

    #[test]
    fn test_permit_release_survives_panic_paths() {
        let flight = Flight::default();
        let result = std::panic::catch_unwind({
            let flight = flight.clone();
            move || {
                let _permit = flight.try_begin().unwrap();
                panic!("request blew up");
            }
        });
        assert!(result.is_err());
        // Unwinding dropped the permit; the client is idle again.
        assert!(flight.try_begin().is_some());
    }
}
