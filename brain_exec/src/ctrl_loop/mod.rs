//! # Control Loop
//!
//! Runs the cyclic modules at a fixed period on a dedicated thread. Each cycle:
//!
//! 1. drains the hardware link's events into the sensor cache,
//! 2. stops the drive outright if the bumper is in contact,
//! 3. runs `analyze` then `apply` on the position tracker and the arm controller,
//! 4. runs the drive controller, unless the bumper is in contact.
//!
//! The next cycle starts one period after the start of the previous one.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, error, info, warn};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

// Internal
use crate::{
    data_store::{ControlCtx, CycleCtx, DataStore},
    event_pump::pump_once,
    shared::{SensorCache, SensorSnapshot},
};
use comms_if::eqpt::HardwareLink;
pub use params::*;
use util::module::State;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The control loop.
pub struct CtrlLoop {
    state: LoopState,
    params: Params,

    link: Arc<dyn HardwareLink>,
    cache: Arc<SensorCache>,
    store: Option<Arc<Mutex<DataStore>>>,

    bg_jh: Option<JoinHandle<()>>,
    bg_run: Arc<AtomicBool>,
}

/// Everything the loop thread needs.
struct LoopCtx {
    params: Params,
    link: Arc<dyn HardwareLink>,
    cache: Arc<SensorCache>,
    store: Arc<Mutex<DataStore>>,
    run: Arc<AtomicBool>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// State of the control loop. A stopped loop is started again on a new thread.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LoopState {
    NotInitialised,
    Initialised,
    Running,
    Stopped,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CtrlLoop {
    pub fn new(link: Arc<dyn HardwareLink>, cache: Arc<SensorCache>, params: Params) -> Self {
        Self {
            state: LoopState::NotInitialised,
            params,
            link,
            cache,
            store: None,
            bg_jh: None,
            bg_run: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Give the loop the modules to run.
    pub fn init(&mut self, store: Arc<Mutex<DataStore>>) {
        if self.state == LoopState::Running {
            warn!("Cannot initialise the control loop while it is running");
            return;
        }

        self.store = Some(store);
        self.state = LoopState::Initialised;
    }

    /// Start the loop thread. Does nothing if not initialised or already running.
    pub fn start(&mut self) {
        let store = match (self.state, &self.store) {
            (LoopState::Running, _) => {
                warn!("Control loop already running");
                return;
            }
            (LoopState::NotInitialised, _) | (_, None) => {
                warn!("Control loop not initialised, cannot start");
                return;
            }
            (_, Some(s)) => s.clone(),
        };

        self.bg_run.store(true, Ordering::Release);

        let ctx = LoopCtx {
            params: self.params.clone(),
            link: self.link.clone(),
            cache: self.cache.clone(),
            store,
            run: self.bg_run.clone(),
        };

        self.bg_jh = Some(thread::spawn(move || bg_thread(ctx)));
        self.state = LoopState::Running;
    }

    /// Stop the loop and wait for its thread to exit.
    pub fn stop(&mut self) {
        if self.state != LoopState::Running {
            return;
        }

        self.bg_run.store(false, Ordering::Release);

        if let Some(jh) = self.bg_jh.take() {
            if jh.join().is_err() {
                error!("Control loop thread panicked");
            }
        }

        self.state = LoopState::Stopped;
        info!("Control loop stopped");
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    pub fn state(&self) -> LoopState {
        self.state
    }
}

impl Drop for CtrlLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run one control cycle on the given sensor snapshot.
///
/// Module errors are logged and never interrupt the cycle.
pub fn run_cycle(ds: &mut DataStore, snapshot: &SensorSnapshot, now: Instant) {
    let DataStore {
        num_cycles,
        pos_track,
        bumper,
        drive_ctrl,
        arm_ctrl,
        sensor,
        ..
    } = ds;

    // ---- SAFETY ----

    let contact = bumper.contact(now);
    if contact {
        debug!("Bumper contact, stopping");
        if let Err(e) = drive_ctrl.full_stop() {
            error!("Could not stop on bumper contact: {}", e);
        }
    }

    let cycle = CycleCtx {
        now,
        snapshot,
        sensor: sensor.as_ref(),
    };

    // ---- POSITION ----

    if let Err(e) = pos_track.analyze(&cycle) {
        warn!("PosTrack analyze error: {}", e);
    }
    if let Err(e) = pos_track.apply(&cycle) {
        warn!("PosTrack apply error: {}", e);
    }

    let ctx = ControlCtx {
        cycle: &cycle,
        pos_track: &*pos_track,
    };

    // ---- ARM ----

    if let Err(e) = arm_ctrl.analyze(&ctx) {
        warn!("ArmCtrl analyze error: {}", e);
    }
    if let Err(e) = arm_ctrl.apply(&ctx) {
        warn!("ArmCtrl apply error: {}", e);
    }

    // ---- DRIVE ----

    if !contact {
        if let Err(e) = drive_ctrl.analyze(&ctx) {
            warn!("DriveCtrl analyze error: {}", e);
        }
        if let Err(e) = drive_ctrl.apply(&ctx) {
            warn!("DriveCtrl apply error: {}", e);
        }
    }

    *num_cycles += 1;
}

fn bg_thread(ctx: LoopCtx) {
    info!("Control loop thread started");

    // Drop the readings taken while starting up
    for _ in 0..ctx.params.flush_count {
        if !ctx.run.load(Ordering::Acquire) {
            info!("Control loop thread exited");
            return;
        }
        pump_once(ctx.link.as_ref(), &ctx.cache);
        thread::sleep(Duration::from_millis(ctx.params.flush_interval_ms));
    }

    let period = Duration::from_millis(ctx.params.period_ms);

    while ctx.run.load(Ordering::Acquire) {
        let cycle_start = Instant::now();

        pump_once(ctx.link.as_ref(), &ctx.cache);
        let snapshot = ctx.cache.snapshot(cycle_start);

        {
            let mut ds = lock(&ctx.store);
            run_cycle(&mut ds, &snapshot, cycle_start);

            let cycle_dur = cycle_start.elapsed();
            if cycle_dur > period {
                ds.num_consec_cycle_overruns += 1;
                warn!(
                    "Cycle overran by {:.06} s ({} consecutive)",
                    (cycle_dur - period).as_secs_f64(),
                    ds.num_consec_cycle_overruns
                );
            } else {
                ds.num_consec_cycle_overruns = 0;
            }
        }

        // Pace from the start of the cycle to avoid drift
        let wake = cycle_start + period;
        let now = Instant::now();
        if wake > now {
            thread::sleep(wake - now);
        }
    }

    info!("Control loop thread exited");
}

/// Lock the data store, recovering it if a cycle panicked.
pub(crate) fn lock(store: &Mutex<DataStore>) -> MutexGuard<DataStore> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}
