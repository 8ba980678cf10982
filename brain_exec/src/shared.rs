//! # Shared state
//!
//! Primitives shared between the brain's threads:
//!
//! - [`SensorCache`] holds the latest hardware readings. It is written by the event pump and
//!   read by the control loop, which takes one [`SensorSnapshot`] per cycle.
//! - [`Mailbox`] holds the latest sample of the external coordinate sensor, written by the
//!   sensor bridge.
//! - [`CancelToken`] lets a caller interrupt long running operations.
//! - [`TouchSignal`] hands touch events from the arm controller to a blocked caller.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Condvar, Mutex, MutexGuard, PoisonError,
};
use std::time::{Duration, Instant};

// Internal
use comms_if::eqpt::{HwEvent, OdomReading, NUM_BELLOWS, NUM_STRING_POTS};
use util::time;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A value along with the time it was last written and the number of writes so far.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct Stamped<T> {
    pub value: T,

    /// Time of the last write, `None` if never written.
    pub updated: Option<Instant>,

    /// Incremented on every write.
    pub seq: u64,
}

/// State of the bumper.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct BumperReading {
    pub contact: bool,

    /// Last time contact was registered.
    pub last_contact: Option<Instant>,
}

/// Latest hardware readings.
#[derive(Debug, Default)]
pub struct SensorCache {
    odometry: Mutex<Stamped<OdomReading>>,
    pressures: Mutex<Stamped<[f64; NUM_BELLOWS]>>,
    string_pots: Mutex<Stamped<[f64; NUM_STRING_POTS]>>,
    foil_pot: Mutex<Stamped<f64>>,
    bumper: Mutex<Stamped<BumperReading>>,
    pressure_sensor: AtomicBool,
}

/// Copy of the sensor cache taken at the start of a control cycle.
#[derive(Debug, Copy, Clone)]
pub struct SensorSnapshot {
    pub taken: Instant,
    pub odometry: Stamped<OdomReading>,
    pub pressures: Stamped<[f64; NUM_BELLOWS]>,
    pub string_pots: Stamped<[f64; NUM_STRING_POTS]>,
    pub foil_pot: Stamped<f64>,
    pub bumper: Stamped<BumperReading>,
    pub pressure_sensor: bool,
}

/// A coordinate measured by the external sensor, in meters in the robot's odometry frame
/// convention (x forward, y left, z up).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ExternalSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,

    /// Time at which the coordinate was published.
    pub captured: Instant,

    /// Time of the last click reported by the sensor.
    pub last_click: Option<Instant>,
}

/// Single slot holding the latest external sample.
///
/// Writes overwrite the slot and raise the updated flag, [`Mailbox::take`] reads the slot and
/// clears the flag.
#[derive(Debug, Default)]
pub struct Mailbox {
    inner: Mutex<MailboxInner>,
}

#[derive(Debug, Default)]
struct MailboxInner {
    coord: Option<([f64; 3], Instant)>,
    last_click: Option<Instant>,
    updated: bool,
}

/// Cooperative cancellation flag, cheap to clone.
#[derive(Debug, Default, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

/// Rendezvous between the producer of touch events and callers waiting for one.
#[derive(Debug, Default)]
pub struct TouchSignal {
    state: Mutex<TouchState>,
    cond: Condvar,
}

#[derive(Debug, Default)]
struct TouchState {
    waiters: usize,
    touches: u64,
}

/// Registration of a caller waiting on a [`TouchSignal`].
///
/// The caller counts as a waiter until the registration is dropped, so touches arriving between
/// two calls to [`TouchWaiter::wait`] are neither missed nor handed to the arm controller.
#[derive(Debug)]
pub struct TouchWaiter<'a> {
    signal: &'a TouchSignal,
    seen: u64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<T> Stamped<T> {
    /// Time since the last write, `Duration::MAX` if never written.
    pub fn age(&self, now: Instant) -> Duration {
        time::age_or_max(now, self.updated)
    }
}

impl SensorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the value carried by a hardware event.
    ///
    /// Returns `false` if the event carries no sensor value.
    pub fn apply_event(&self, event: &HwEvent, now: Instant) -> bool {
        match event {
            HwEvent::PressuresChanged(p) => self.set_pressures(*p, now),
            HwEvent::PressureSensorChanged(s) => self.set_pressure_sensor(*s),
            HwEvent::StringPotsChanged(p) => self.set_string_pots(*p, now),
            HwEvent::FoilPotChanged(p) => self.set_foil_pot(*p, now),
            HwEvent::OdometryChanged(o) => self.set_odometry(*o, now),
            HwEvent::BumperChanged(b) => self.set_bumper(*b, now),
            _ => return false,
        }

        true
    }

    pub fn set_odometry(&self, reading: OdomReading, now: Instant) {
        write(&self.odometry, reading, now);
    }

    pub fn odometry(&self) -> Stamped<OdomReading> {
        *lock(&self.odometry)
    }

    pub fn set_pressures(&self, pressures: [f64; NUM_BELLOWS], now: Instant) {
        write(&self.pressures, pressures, now);
    }

    pub fn pressures(&self) -> Stamped<[f64; NUM_BELLOWS]> {
        *lock(&self.pressures)
    }

    pub fn set_string_pots(&self, pots: [f64; NUM_STRING_POTS], now: Instant) {
        write(&self.string_pots, pots, now);
    }

    pub fn string_pots(&self) -> Stamped<[f64; NUM_STRING_POTS]> {
        *lock(&self.string_pots)
    }

    pub fn set_foil_pot(&self, value: f64, now: Instant) {
        write(&self.foil_pot, value, now);
    }

    pub fn foil_pot(&self) -> Stamped<f64> {
        *lock(&self.foil_pot)
    }

    /// Store the bumper state, registering the contact time if in contact.
    pub fn set_bumper(&self, contact: bool, now: Instant) {
        let mut slot = lock(&self.bumper);
        slot.value.contact = contact;
        if contact {
            slot.value.last_contact = Some(now);
        }
        slot.updated = Some(now);
        slot.seq = slot.seq.wrapping_add(1);
    }

    pub fn bumper(&self) -> Stamped<BumperReading> {
        *lock(&self.bumper)
    }

    pub fn set_pressure_sensor(&self, at_pressure: bool) {
        self.pressure_sensor.store(at_pressure, Ordering::Release);
    }

    pub fn pressure_sensor(&self) -> bool {
        self.pressure_sensor.load(Ordering::Acquire)
    }

    /// Copy every cached value.
    pub fn snapshot(&self, now: Instant) -> SensorSnapshot {
        SensorSnapshot {
            taken: now,
            odometry: self.odometry(),
            pressures: self.pressures(),
            string_pots: self.string_pots(),
            foil_pot: self.foil_pot(),
            bumper: self.bumper(),
            pressure_sensor: self.pressure_sensor(),
        }
    }
}

impl ExternalSample {
    /// Time since the sample was published.
    pub fn age(&self, now: Instant) -> Duration {
        time::age(now, self.captured)
    }
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a new coordinate, raising the updated flag.
    pub fn post_coordinate(&self, x: f64, y: f64, z: f64, now: Instant) {
        let mut inner = lock(&self.inner);
        inner.coord = Some(([x, y, z], now));
        inner.updated = true;
    }

    /// Register a click. The coordinate and the updated flag are left untouched.
    pub fn post_click(&self, now: Instant) {
        lock(&self.inner).last_click = Some(now);
    }

    /// True if a coordinate was published since the last [`Mailbox::take`].
    pub fn is_updated(&self) -> bool {
        lock(&self.inner).updated
    }

    /// Read the latest sample and clear the updated flag.
    pub fn take(&self) -> Option<ExternalSample> {
        let mut inner = lock(&self.inner);
        inner.updated = false;
        Self::sample(&inner)
    }

    /// Read the latest sample without clearing the updated flag.
    pub fn latest(&self) -> Option<ExternalSample> {
        Self::sample(&lock(&self.inner))
    }

    /// Time since the last coordinate was published, `None` if there never was one.
    pub fn data_age(&self, now: Instant) -> Option<Duration> {
        lock(&self.inner).coord.map(|(_, t)| time::age(now, t))
    }

    /// Time since the last click, `None` if there never was one.
    pub fn click_age(&self, now: Instant) -> Option<Duration> {
        lock(&self.inner).last_click.map(|t| time::age(now, t))
    }

    fn sample(inner: &MailboxInner) -> Option<ExternalSample> {
        inner.coord.map(|(c, captured)| ExternalSample {
            x: c[0],
            y: c[1],
            z: c[2],
            captured,
            last_click: inner.last_click,
        })
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl TouchSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if a caller is currently registered as a waiter.
    pub fn has_waiter(&self) -> bool {
        lock(&self.state).waiters > 0
    }

    /// Wake every waiting caller.
    pub fn notify(&self) {
        let mut state = lock(&self.state);
        state.touches = state.touches.wrapping_add(1);
        self.cond.notify_all();
    }

    /// Register as a waiter. Only touches notified after this call are reported.
    pub fn register(&self) -> TouchWaiter<'_> {
        let mut state = lock(&self.state);
        state.waiters += 1;
        TouchWaiter {
            signal: self,
            seen: state.touches,
        }
    }

    /// Block until the next touch, see [`TouchWaiter::wait`].
    pub fn wait(&self, cancel: &CancelToken, poll: Duration) -> bool {
        self.register().wait(cancel, poll)
    }
}

impl<'a> TouchWaiter<'a> {
    /// Block until a touch not yet reported to this waiter.
    ///
    /// The cancel token is checked every `poll`. Returns `true` on touch, `false` if cancelled.
    pub fn wait(&mut self, cancel: &CancelToken, poll: Duration) -> bool {
        let signal = self.signal;
        let mut state = lock(&signal.state);

        loop {
            if state.touches != self.seen {
                self.seen = state.touches;
                return true;
            }
            if cancel.is_cancelled() {
                return false;
            }
            state = match signal.cond.wait_timeout(state, poll) {
                Ok((g, _)) => g,
                Err(e) => e.into_inner().0,
            };
        }
    }
}

impl<'a> Drop for TouchWaiter<'a> {
    fn drop(&mut self) {
        lock(&self.signal.state).waiters -= 1;
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Lock a mutex, recovering the data if another thread panicked while holding it. Every guarded
/// value here is a plain reading which is valid whatever the panic.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(slot: &Mutex<Stamped<T>>, value: T, now: Instant) {
    let mut slot = lock(slot);
    slot.value = value;
    slot.updated = Some(now);
    slot.seq = slot.seq.wrapping_add(1);
}

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;

    #[test]
    fn test_cache_events() {
        let cache = SensorCache::new();
        let now = Instant::now();

        assert_eq!(cache.odometry().seq, 0);
        assert_eq!(cache.odometry().age(now), Duration::MAX);

        let odom = OdomReading {
            x: 1.0,
            ..Default::default()
        };
        assert!(cache.apply_event(&HwEvent::OdometryChanged(odom), now));
        assert!(cache.apply_event(&HwEvent::PressureSensorChanged(true), now));
        assert!(!cache.apply_event(&HwEvent::Connected, now));

        let snap = cache.snapshot(now);
        assert_eq!(snap.odometry.value.x, 1.0);
        assert_eq!(snap.odometry.seq, 1);
        assert!(snap.pressure_sensor);
    }

    #[test]
    fn test_bumper_last_contact() {
        let cache = SensorCache::new();
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_millis(100);

        cache.set_bumper(true, t0);
        cache.set_bumper(false, t1);

        let b = cache.bumper();
        assert!(!b.value.contact);
        assert_eq!(b.value.last_contact, Some(t0));
        assert_eq!(b.updated, Some(t1));
    }

    #[test]
    fn test_mailbox_click_keeps_coordinate() {
        let mailbox = Mailbox::new();
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_millis(40);

        mailbox.post_coordinate(1.0, 2.0, 0.3, t0);
        let before = mailbox.latest().unwrap();
        assert!(mailbox.is_updated());
        assert!(mailbox.take().is_some());
        assert!(!mailbox.is_updated());

        mailbox.post_click(t1);
        let after = mailbox.latest().unwrap();
        assert_eq!((after.x, after.y, after.z), (before.x, before.y, before.z));
        assert_eq!(after.captured, t0);
        assert_eq!(after.last_click, Some(t1));
        assert!(!mailbox.is_updated());
        assert_eq!(mailbox.click_age(t1), Some(Duration::from_millis(0)));
        assert_eq!(mailbox.data_age(t1), Some(Duration::from_millis(40)));
    }

    #[test]
    fn test_touch_signal() {
        let signal = Arc::new(TouchSignal::new());
        let cancel = CancelToken::new();

        let s = signal.clone();
        let c = cancel.clone();
        let jh = thread::spawn(move || s.wait(&c, Duration::from_millis(5)));

        while !signal.has_waiter() {
            thread::sleep(Duration::from_millis(1));
        }
        signal.notify();
        assert!(jh.join().unwrap());
        assert!(!signal.has_waiter());

        cancel.cancel();
        assert!(!signal.wait(&cancel, Duration::from_millis(5)));
        cancel.reset();
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn test_touch_waiter_keeps_registration() {
        let signal = TouchSignal::new();
        let cancel = CancelToken::new();
        let poll = Duration::from_millis(5);

        let mut waiter = signal.register();
        assert!(signal.has_waiter());

        // Touches arriving while the waiter is not blocked are still delivered, one wakeup each
        // time the count moved
        signal.notify();
        assert!(signal.has_waiter());
        assert!(waiter.wait(&cancel, poll));

        signal.notify();
        signal.notify();
        assert!(waiter.wait(&cancel, poll));

        cancel.cancel();
        assert!(!waiter.wait(&cancel, poll));
        assert!(signal.has_waiter());

        drop(waiter);
        assert!(!signal.has_waiter());
    }
}
