//! Presentation clock driving sink lifecycle transitions.

use log::debug;
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use crate::error::SinkResult;
use crate::frame::Timestamp;
use crate::sink::stream::StartPosition;

/// Observer of presentation-clock state changes.
///
/// At most one observer is registered on a clock at a time; registering a
/// new one replaces the previous registration.
pub trait ClockObserver: Send + Sync {
    fn on_clock_start(&self, position: StartPosition) -> SinkResult<()>;
    fn on_clock_stop(&self) -> SinkResult<()>;
    fn on_clock_pause(&self) -> SinkResult<()>;
    fn on_clock_restart(&self) -> SinkResult<()>;
    fn on_clock_set_rate(&self, rate: f32) -> SinkResult<()>;
}

struct ClockState {
    started_at: Option<Instant>,
    rate: f32,
    observer: Option<Weak<dyn ClockObserver>>,
}

/// Presentation timeline and lifecycle driver.
///
/// The clock forwards start/stop (and the transitions a sink may reject)
/// to its registered observer and measures elapsed presentation time from
/// the most recent start.
pub struct PresentationClock {
    state: Mutex<ClockState>,
}

impl PresentationClock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ClockState {
                started_at: None,
                rate: 1.0,
                observer: None,
            }),
        }
    }

    /// Register the state observer, replacing any previous one.
    pub fn set_observer(&self, observer: Weak<dyn ClockObserver>) {
        self.state.lock().unwrap().observer = Some(observer);
    }

    /// Deregister the current observer, if any.
    pub fn clear_observer(&self) {
        self.state.lock().unwrap().observer = None;
    }

    fn observer(&self) -> Option<Arc<dyn ClockObserver>> {
        self.state.lock().unwrap().observer.as_ref()?.upgrade()
    }

    /// Start the timeline and notify the observer.
    pub fn start(&self, position: StartPosition) -> SinkResult<()> {
        self.state.lock().unwrap().started_at = Some(Instant::now());
        debug!("presentation clock: start {position:?}");
        match self.observer() {
            Some(observer) => observer.on_clock_start(position),
            None => Ok(()),
        }
    }

    /// Stop the timeline and notify the observer.
    pub fn stop(&self) -> SinkResult<()> {
        self.state.lock().unwrap().started_at = None;
        debug!("presentation clock: stop");
        match self.observer() {
            Some(observer) => observer.on_clock_stop(),
            None => Ok(()),
        }
    }

    /// Forward a pause to the observer; the observer decides whether the
    /// transition is supported.
    pub fn pause(&self) -> SinkResult<()> {
        match self.observer() {
            Some(observer) => observer.on_clock_pause(),
            None => Ok(()),
        }
    }

    /// Forward a restart to the observer.
    pub fn restart(&self) -> SinkResult<()> {
        match self.observer() {
            Some(observer) => observer.on_clock_restart(),
            None => Ok(()),
        }
    }

    /// Change the clock rate and notify the observer.
    pub fn set_rate(&self, rate: f32) -> SinkResult<()> {
        self.state.lock().unwrap().rate = rate;
        match self.observer() {
            Some(observer) => observer.on_clock_set_rate(rate),
            None => Ok(()),
        }
    }

    pub fn rate(&self) -> f32 {
        self.state.lock().unwrap().rate
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().started_at.is_some()
    }

    /// Elapsed presentation time since the most recent start; zero while
    /// the clock is stopped.
    pub fn now(&self) -> Timestamp {
        match self.state.lock().unwrap().started_at {
            Some(started_at) => Timestamp::from_micros(started_at.elapsed().as_micros() as i64),
            None => Timestamp::ZERO,
        }
    }
}

impl Default for PresentationClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingObserver {
        starts: AtomicUsize,
        stops: AtomicUsize,
    }

    impl ClockObserver for CountingObserver {
        fn on_clock_start(&self, _position: StartPosition) -> SinkResult<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn on_clock_stop(&self) -> SinkResult<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn on_clock_pause(&self) -> SinkResult<()> {
            Err(SinkError::UnsupportedTransition)
        }

        fn on_clock_restart(&self) -> SinkResult<()> {
            Err(SinkError::UnsupportedTransition)
        }

        fn on_clock_set_rate(&self, _rate: f32) -> SinkResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_timeline() {
        let clock = PresentationClock::new();
        assert!(!clock.is_running());
        assert_eq!(clock.now(), Timestamp::ZERO);

        clock.start(StartPosition::FromFirstSample).unwrap();
        assert!(clock.is_running());
        std::thread::sleep(Duration::from_millis(5));
        let first = clock.now();
        assert!(first.micros > 0);
        let second = clock.now();
        assert!(second >= first);

        clock.stop().unwrap();
        assert_eq!(clock.now(), Timestamp::ZERO);
    }

    #[test]
    fn test_observer_forwarding_and_replacement() {
        let clock = PresentationClock::new();
        let first = Arc::new(CountingObserver::default());
        let second = Arc::new(CountingObserver::default());

        let weak_first: Weak<dyn ClockObserver> =
            Arc::<CountingObserver>::downgrade(&first);
        clock.set_observer(weak_first);
        clock.start(StartPosition::FromFirstSample).unwrap();
        assert_eq!(first.starts.load(Ordering::SeqCst), 1);

        // Unsupported transitions surface from the observer.
        assert_eq!(clock.pause(), Err(SinkError::UnsupportedTransition));
        assert_eq!(clock.restart(), Err(SinkError::UnsupportedTransition));

        let weak_second: Weak<dyn ClockObserver> =
            Arc::<CountingObserver>::downgrade(&second);
        clock.set_observer(weak_second);
        clock.stop().unwrap();
        assert_eq!(first.stops.load(Ordering::SeqCst), 0);
        assert_eq!(second.stops.load(Ordering::SeqCst), 1);

        // A dropped observer just stops receiving notifications.
        drop(second);
        clock.start(StartPosition::FromFirstSample).unwrap();

        clock.clear_observer();
        clock.set_rate(0.5).unwrap();
        assert_eq!(clock.rate(), 0.5);
    }
}
