//! # Brain
//!
//! The entry point of the control core. The brain connects the hardware link, starts the event
//! pump and owns the modules, the control loop and the optional sensor bridge.
//!
//! Commands are forwarded to the modules under the data store lock, so they take effect on the
//! next control cycle. Dropping the brain tears everything down in order: control loop, sensor
//! bridge, hardware link, event pump.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, warn};
use nalgebra::Vector2;
use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

// Internal
use crate::{
    arm_ctrl::{ArmCtrl, ArmCtrlError, CalibrationAbort, GripState},
    bumper::Bumper,
    ctrl_loop::{self, CtrlLoop, LoopState},
    data_store::{ControlCtx, CycleCtx, DataStore},
    drive_ctrl::{DriveCtrl, DriveCtrlError, DriveMode, VelocityCommand},
    event_pump::EventPump,
    params::BrainParams,
    pos_track::{PosTrack, PosTrackError, Pose},
    sensor_bridge::{SensorBridge, SensorBridgeError},
    shared::{CancelToken, ExternalSample, SensorCache, TouchSignal},
};
use comms_if::eqpt::{HardwareLink, LinkError, NUM_BELLOWS};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The robot control core.
pub struct Brain {
    params: BrainParams,

    link: Arc<dyn HardwareLink>,
    cache: Arc<SensorCache>,
    touch: Arc<TouchSignal>,
    store: Arc<Mutex<DataStore>>,

    ctrl_loop: CtrlLoop,
    sensor_bridge: Option<SensorBridge>,
    event_pump: Option<EventPump>,

    /// Set once torn down
    shut_down: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum BrainError {
    #[error("Hardware link error: {0}")]
    LinkError(#[from] LinkError),

    #[error("Position tracking error: {0}")]
    PosTrackError(#[from] PosTrackError),

    #[error("Drive control error: {0}")]
    DriveCtrlError(#[from] DriveCtrlError),

    #[error("Arm control error: {0}")]
    ArmCtrlError(#[from] ArmCtrlError),

    #[error("Sensor bridge error: {0}")]
    SensorBridgeError(#[from] SensorBridgeError),

    #[error("No external sensor has been enabled")]
    NoSensor,
}

/// Reasons `get_touch_coordinate` returned without a coordinate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TouchWaitError {
    #[error("No external sensor is running")]
    NoSensor,

    #[error("Waiting for a touch was cancelled")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Brain {
    /// Connect to the hardware at `address` and initialise every module.
    ///
    /// The odometry is reset to the origin. The control loop is initialised but not started.
    pub fn new(
        link: Arc<dyn HardwareLink>,
        address: &str,
        params: BrainParams,
    ) -> Result<Self, BrainError> {
        info!("Connecting to the hardware at {}", address);
        link.connect(address)?;

        let cache = Arc::new(SensorCache::new());
        let event_pump = EventPump::start(
            link.clone(),
            cache.clone(),
            Duration::from_micros(params.ctrl_loop.event_pump_interval_us),
        );

        let pos_track = PosTrack::new(link.clone(), cache.clone(), params.pos_track.clone())?;
        let pose = pos_track.set(0.0, 0.0, 0.0)?;

        let touch = Arc::new(TouchSignal::new());

        let store = Arc::new(Mutex::new(DataStore::new(
            pos_track,
            Bumper::new(link.clone(), cache.clone(), params.bumper.clone()),
            DriveCtrl::new(link.clone(), params.drive_ctrl.clone(), pose.position_m),
            ArmCtrl::new(link.clone(), params.arm_ctrl.clone(), touch.clone()),
        )));

        let mut ctrl_loop = CtrlLoop::new(link.clone(), cache.clone(), params.ctrl_loop.clone());
        ctrl_loop.init(store.clone());

        info!("Brain initialised");

        Ok(Self {
            params,
            link,
            cache,
            touch,
            store,
            ctrl_loop,
            sensor_bridge: None,
            event_pump: Some(event_pump),
            shut_down: false,
        })
    }

    /// Connect with the default parameters.
    pub fn with_defaults(link: Arc<dyn HardwareLink>, address: &str) -> Result<Self, BrainError> {
        Self::new(link, address, BrainParams::default())
    }

    // ---- CONTROL LOOP ----

    /// Start the control loop, does nothing if it is already running.
    pub fn start(&mut self) {
        self.ctrl_loop.start();
    }

    /// Stop the control loop and wait for its thread to exit.
    pub fn stop(&mut self) {
        self.ctrl_loop.stop();
    }

    pub fn is_running(&self) -> bool {
        self.ctrl_loop.is_running()
    }

    pub fn loop_state(&self) -> LoopState {
        self.ctrl_loop.state()
    }

    /// Number of control cycles run so far.
    pub fn num_cycles(&self) -> u64 {
        self.lock().num_cycles
    }

    // ---- EXTERNAL SENSOR ----

    /// Start reading the external coordinate sensor at `address`, replacing any previous one.
    pub fn enable_sensor(&mut self, address: &str) {
        if let Some(old) = self.sensor_bridge.take() {
            info!("Replacing the running sensor bridge");
            old.stop();
        }

        let bridge = SensorBridge::start(address, self.params.sensor_bridge.clone());
        self.lock().sensor = Some(bridge.handle());
        self.sensor_bridge = Some(bridge);
    }

    /// Set the external sensor's height above the floor.
    pub fn set_sensor_height(&self, height_m: f64) -> Result<(), BrainError> {
        match &self.sensor_bridge {
            Some(b) => Ok(b.set_height(height_m)?),
            None => Err(BrainError::NoSensor),
        }
    }

    /// True if the external sensor is enabled and its reader is running.
    pub fn sensor_available(&self) -> bool {
        self.lock().sensor_available()
    }

    /// The latest external sample, without marking it as read.
    pub fn sensor_sample(&self) -> Option<ExternalSample> {
        self.lock().sensor.as_ref().and_then(|s| s.mailbox().latest())
    }

    // ---- DRIVE ----

    pub fn set_destination(&self, x: f64, y: f64) {
        self.lock().drive_ctrl.set_destination(x, y);
    }

    pub fn destination(&self) -> Vector2<f64> {
        self.lock().drive_ctrl.destination()
    }

    pub fn set_point_at(&self, x: f64, y: f64) {
        self.lock().drive_ctrl.set_point_at(x, y);
    }

    pub fn point_at(&self) -> Vector2<f64> {
        self.lock().drive_ctrl.point_at()
    }

    pub fn pointing_active(&self) -> bool {
        self.lock().drive_ctrl.pointing_active()
    }

    pub fn stop_pointing(&self) {
        self.lock().drive_ctrl.stop_pointing();
    }

    pub fn set_stop_within(&self, distance_m: f64) {
        self.lock().drive_ctrl.set_stop_within(distance_m);
    }

    pub fn stop_within(&self) -> f64 {
        self.lock().drive_ctrl.stop_within()
    }

    pub fn set_manouvre_only(&self, manouvre_only: bool) {
        self.lock().drive_ctrl.set_manouvre_only(manouvre_only);
    }

    pub fn set_velocity(&self, vx: f64, vy: f64, omega: f64) {
        self.lock().drive_ctrl.set_velocity(vx, vy, omega);
    }

    pub fn go(&self) {
        self.lock().drive_ctrl.go();
    }

    pub fn nice_stop(&self) {
        self.lock().drive_ctrl.nice_stop();
    }

    pub fn full_stop(&self) -> Result<(), BrainError> {
        Ok(self.lock().drive_ctrl.full_stop()?)
    }

    pub fn stop_is_set(&self) -> bool {
        self.lock().drive_ctrl.stop_is_set()
    }

    pub fn velocity_command(&self) -> VelocityCommand {
        self.lock().drive_ctrl.command()
    }

    pub fn drive_mode(&self) -> DriveMode {
        self.lock().drive_ctrl.mode()
    }

    // ---- POSITION ----

    pub fn get_position(&self) -> Result<Pose, BrainError> {
        Ok(self.lock().pos_track.get_position(Instant::now())?)
    }

    /// Overwrite the odometry pose.
    pub fn set_position(&self, x: f64, y: f64, heading_rad: f64) -> Result<Pose, BrainError> {
        Ok(self.lock().pos_track.set(x, y, heading_rad)?)
    }

    pub fn current_abs_speed(&self) -> f64 {
        self.lock().pos_track.current_abs_speed()
    }

    pub fn current_abs_omega(&self) -> f64 {
        self.lock().pos_track.current_abs_omega()
    }

    // ---- BUMPER ----

    pub fn bumper_contact(&self) -> bool {
        self.lock().bumper.contact(Instant::now())
    }

    pub fn last_contact(&self) -> Option<Duration> {
        self.lock().bumper.last_contact(Instant::now())
    }

    // ---- ARM ----

    pub fn inner_to_coordinate(&self, x: f64, y: f64) {
        self.lock().arm_ctrl.inner_to_coordinate(x, y);
    }

    pub fn outer_to_coordinate(&self, x: f64, y: f64) {
        self.lock().arm_ctrl.outer_to_coordinate(x, y);
    }

    pub fn rotate_horizontal(&self) {
        self.lock().arm_ctrl.rotate_horizontal();
    }

    pub fn rotate_vertical(&self) {
        self.lock().arm_ctrl.rotate_vertical();
    }

    pub fn rotate_relax(&self) {
        self.lock().arm_ctrl.rotate_relax();
    }

    pub fn arm_relax(&self) {
        self.lock().arm_ctrl.arm_relax();
    }

    pub fn set_target_pressure(&self, channel: usize, pressure_bar: f64) -> Result<(), BrainError> {
        Ok(self.lock().arm_ctrl.set_target_pressure(channel, pressure_bar)?)
    }

    pub fn target_pressures(&self) -> [f64; NUM_BELLOWS] {
        self.lock().arm_ctrl.target_pressures()
    }

    pub fn grip(&self) -> Result<(), BrainError> {
        Ok(self.lock().arm_ctrl.grip()?)
    }

    pub fn release(&self) -> Result<(), BrainError> {
        Ok(self.lock().arm_ctrl.release()?)
    }

    pub fn is_holding(&self) -> bool {
        self.lock().arm_ctrl.is_holding()
    }

    pub fn grip_state(&self) -> GripState {
        self.lock().arm_ctrl.grip_state()
    }

    pub fn set_max_arm_speed(&self, max_adjust_per_cycle: f64) {
        self.lock().arm_ctrl.set_max_arm_speed(max_adjust_per_cycle);
    }

    pub fn arm_total_pressure_diff(&self) -> f64 {
        self.lock().arm_ctrl.arm_total_pressure_diff()
    }

    pub fn set_drain_valve(&self, open: bool) {
        self.lock().arm_ctrl.set_drain_valve(open);
    }

    /// True if the compressor reports it is at pressure.
    pub fn pressure_sensor(&self) -> bool {
        self.cache.pressure_sensor()
    }

    /// Correct the odometry from the external sensor now, as a touch of the relaxed arm would.
    pub fn calibrate_odometry(&self) -> Result<Pose, CalibrationAbort> {
        let now = Instant::now();
        let snapshot = self.cache.snapshot(now);
        let ds = self.lock();

        let cycle = CycleCtx {
            now,
            snapshot: &snapshot,
            sensor: ds.sensor.as_ref(),
        };
        let ctx = ControlCtx {
            cycle: &cycle,
            pos_track: &ds.pos_track,
        };

        ds.arm_ctrl.calibrate_odometry(&ctx)
    }

    /// Block until the arm is touched while a fresh external sample is available, then return
    /// that sample.
    ///
    /// While a caller waits here touches are not used for calibration.
    pub fn get_touch_coordinate(&self, cancel: &CancelToken) -> Result<ExternalSample, TouchWaitError> {
        let sensor = self.lock().sensor.clone();
        let sensor = match sensor {
            Some(s) if s.is_running() => s,
            _ => return Err(TouchWaitError::NoSensor),
        };

        let poll = Duration::from_millis(self.params.arm_ctrl.touch_poll_interval_ms);
        let max_age = Duration::from_millis(self.params.arm_ctrl.touch_coord_max_age_ms);

        let mut waiter = self.touch.register();

        loop {
            if !waiter.wait(cancel, poll) {
                return Err(TouchWaitError::Cancelled);
            }

            let mailbox = sensor.mailbox();
            let fresh = mailbox
                .data_age(Instant::now())
                .map_or(false, |age| age < max_age);

            if mailbox.is_updated() && fresh {
                if let Some(sample) = mailbox.take() {
                    info!(
                        "Touched at ({:.3}, {:.3}, {:.3})",
                        sample.x, sample.y, sample.z
                    );
                    return Ok(sample);
                }
            }

            debug!("Touch without a fresh sample, waiting for the next one");
        }
    }

    // ---- TEARDOWN ----

    /// Tear down the brain: stop the control loop, stop the sensor bridge, disconnect from the
    /// hardware, then stop the event pump.
    pub fn shutdown(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        info!("Brain shutting down");

        self.ctrl_loop.stop();

        if let Some(bridge) = self.sensor_bridge.take() {
            bridge.stop();
        }
        self.lock().sensor = None;

        self.link.disconnect();
        info!("Hardware link disconnected");

        if let Some(pump) = self.event_pump.take() {
            pump.stop();
        }

        info!("Brain shut down");
    }

    fn lock(&self) -> MutexGuard<DataStore> {
        ctrl_loop::lock(&self.store)
    }
}

impl Drop for Brain {
    fn drop(&mut self) {
        if !self.shut_down {
            warn!("Brain dropped without shutdown, tearing down");
        }
        self.teardown();
    }
}
