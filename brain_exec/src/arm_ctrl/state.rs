//! Implementations for the ArmCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

// Internal
use super::{ArmCtrlError, ArmEvents, DeltaHistory, GripState, Params};
use crate::{
    data_store::ControlCtx,
    shared::{SensorSnapshot, Stamped, TouchSignal},
};
use comms_if::eqpt::{
    HardwareLink, INNER_LEFT, INNER_OVER, INNER_RIGHT, NUM_ARM_BELLOWS, NUM_BELLOWS,
    NUM_STRING_POTS, OUTER_LEFT, OUTER_OVER, OUTER_RIGHT, ROTATE_HORIZONTAL, ROTATE_VERTICAL,
};
use util::{
    maths::{clamp, step_towards},
    module::State,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Arm control module state
pub struct ArmCtrl {
    link: Arc<dyn HardwareLink>,

    pub(crate) params: Params,

    /// Touch rendezvous shared with callers of `get_touch_coordinate`
    touch: Arc<TouchSignal>,

    // ---- PRESSURES ----
    pub(crate) target: [f64; NUM_BELLOWS],
    pub(crate) applied: [f64; NUM_BELLOWS],
    pub(crate) read: [f64; NUM_BELLOWS],
    pub(crate) max_arm_speed: f64,

    pub(crate) arm_pressure_required: bool,
    pub(crate) rotate_pressure_required: bool,

    // ---- READINGS ----
    read_pots: [f64; NUM_STRING_POTS],
    read_foil_pot: f64,
    pressures_seq: Option<u64>,
    pots_seq: Option<u64>,
    foil_pot_seq: Option<u64>,

    pub(crate) pressure_deltas: DeltaHistory,
    pub(crate) pot_deltas: DeltaHistory,
    pub(crate) foil_pot_deltas: DeltaHistory,

    // ---- GRIPPER ----
    pub(crate) grip: GripState,

    /// End of the last release, receives are ignored until it has passed.
    pub(crate) release_done: Option<Instant>,

    // ---- OUTPUTS ----
    pub(crate) events: ArmEvents,
    compressor: bool,
    drain_valve: bool,
    pressure_sensor: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ArmCtrl {
    pub fn new(link: Arc<dyn HardwareLink>, params: Params, touch: Arc<TouchSignal>) -> Self {
        let depth = params.delta_depth;
        let max_arm_speed = params.pressure_max_adjust_bar;

        Self {
            link,
            params,
            touch,
            target: [0.0; NUM_BELLOWS],
            applied: [0.0; NUM_BELLOWS],
            read: [0.0; NUM_BELLOWS],
            max_arm_speed,
            arm_pressure_required: false,
            rotate_pressure_required: false,
            read_pots: [0.0; NUM_STRING_POTS],
            read_foil_pot: 0.0,
            pressures_seq: None,
            pots_seq: None,
            foil_pot_seq: None,
            pressure_deltas: DeltaHistory::new(NUM_BELLOWS, depth),
            pot_deltas: DeltaHistory::new(NUM_STRING_POTS, depth),
            foil_pot_deltas: DeltaHistory::new(1, depth),
            grip: GripState::Relaxed,
            release_done: None,
            events: ArmEvents::default(),
            compressor: false,
            drain_valve: false,
            pressure_sensor: false,
        }
    }

    /// The touch rendezvous used by this controller.
    pub fn touch_signal(&self) -> Arc<TouchSignal> {
        self.touch.clone()
    }

    // ---- POSITIONING ----

    /// Move the tip of the inner segment to the given position relative to its relaxed position.
    pub fn inner_to_coordinate(&mut self, x: f64, y: f64) {
        let p = self.link.xy_to_pressure(x, y);
        self.set_segment([INNER_OVER, INNER_RIGHT, INNER_LEFT], p);
    }

    /// Move the tip of the outer segment to the given position relative to its relaxed position.
    pub fn outer_to_coordinate(&mut self, x: f64, y: f64) {
        let p = self.link.xy_to_pressure(x, y);
        self.set_segment([OUTER_OVER, OUTER_RIGHT, OUTER_LEFT], p);
    }

    fn set_segment(&mut self, channels: [usize; 3], pressures: [f64; 3]) {
        for (c, p) in channels.iter().zip(pressures.iter()) {
            self.target[*c] = self.limit_pressure(*p);
        }
    }

    /// Set the target pressure of a single channel.
    pub fn set_target_pressure(&mut self, channel: usize, pressure_bar: f64) -> Result<(), ArmCtrlError> {
        if channel >= NUM_BELLOWS {
            return Err(ArmCtrlError::InvalidChannel(channel));
        }
        if !pressure_bar.is_finite() {
            return Err(ArmCtrlError::InvalidPressure(pressure_bar));
        }

        self.target[channel] = self.limit_pressure(pressure_bar);

        if channel == ROTATE_HORIZONTAL || channel == ROTATE_VERTICAL {
            self.rotate_pressure_required = self.target[ROTATE_HORIZONTAL] > 0.0
                || self.target[ROTATE_VERTICAL] > 0.0;
        }

        Ok(())
    }

    /// Release all pressure from the arm bellows.
    pub fn arm_relax(&mut self) {
        for p in self.target.iter_mut().take(NUM_ARM_BELLOWS) {
            *p = 0.0;
        }
    }

    pub fn rotate_horizontal(&mut self) {
        self.target[ROTATE_VERTICAL] = 0.0;
        self.target[ROTATE_HORIZONTAL] = self.params.max_pressure_bar;
        self.rotate_pressure_required = true;
    }

    pub fn rotate_vertical(&mut self) {
        self.target[ROTATE_VERTICAL] = self.params.max_pressure_bar;
        self.target[ROTATE_HORIZONTAL] = 0.0;
        self.rotate_pressure_required = true;
    }

    pub fn rotate_relax(&mut self) {
        self.target[ROTATE_VERTICAL] = 0.0;
        self.target[ROTATE_HORIZONTAL] = 0.0;
        self.rotate_pressure_required = false;
    }

    /// Set the maximum pressure change per cycle of the arm bellows, limited to the configured
    /// range.
    pub fn set_max_arm_speed(&mut self, max_adjust_per_cycle: f64) {
        self.max_arm_speed = clamp(
            &max_adjust_per_cycle,
            &self.params.pressure_min_adjust_bar,
            &self.params.pressure_max_adjust_bar,
        );
    }

    pub fn max_arm_speed(&self) -> f64 {
        self.max_arm_speed
    }

    /// Sum of the differences between target and read pressure over the arm bellows.
    pub fn arm_total_pressure_diff(&self) -> f64 {
        (0..NUM_ARM_BELLOWS)
            .map(|i| (self.target[i] - self.read[i]).abs())
            .sum()
    }

    pub fn target_pressures(&self) -> [f64; NUM_BELLOWS] {
        self.target
    }

    pub fn applied_pressures(&self) -> [f64; NUM_BELLOWS] {
        self.applied
    }

    pub fn read_pressures(&self) -> [f64; NUM_BELLOWS] {
        self.read
    }

    /// True if any arm bellow was commanded a significant pressure on the last cycle.
    pub fn arm_pressure_required(&self) -> bool {
        self.arm_pressure_required
    }

    // ---- GRIPPER ----

    /// Start gripping. Does nothing if already gripping or holding.
    pub fn grip(&mut self) -> Result<(), ArmCtrlError> {
        self.grip_at(Instant::now())
    }

    pub(crate) fn grip_at(&mut self, now: Instant) -> Result<(), ArmCtrlError> {
        match self.grip {
            GripState::Relaxed => (),
            _ => return Ok(()),
        }

        info!("Gripping");

        self.grip = GripState::Gripping {
            deadline: now + Duration::from_millis(self.params.grip_time_ms),
        };
        self.release_done = None;

        // Open intake, close outlet
        self.link.set_gripper_valve1(true)?;
        self.link.set_gripper_valve2(true)?;

        Ok(())
    }

    /// Start releasing. Does nothing unless holding.
    pub fn release(&mut self) -> Result<(), ArmCtrlError> {
        self.release_at(Instant::now())
    }

    pub(crate) fn release_at(&mut self, now: Instant) -> Result<(), ArmCtrlError> {
        match self.grip {
            GripState::Holding => (),
            _ => return Ok(()),
        }

        info!("Releasing");

        let deadline = now + Duration::from_millis(self.params.release_time_ms);
        self.grip = GripState::Releasing { deadline };
        self.release_done = Some(deadline);

        // Close intake, open outlet
        self.link.set_gripper_valve1(false)?;
        self.link.set_gripper_valve2(false)?;

        Ok(())
    }

    /// True if an object is held, including while it is being released.
    pub fn is_holding(&self) -> bool {
        matches!(self.grip, GripState::Holding | GripState::Releasing { .. })
    }

    pub fn grip_state(&self) -> GripState {
        self.grip
    }

    /// Advance the timed gripper transitions.
    fn update_grip(&mut self, now: Instant) -> Result<(), ArmCtrlError> {
        match self.grip {
            GripState::Gripping { deadline } if now >= deadline => {
                self.link.set_gripper_valve1(false)?;
                self.grip = GripState::Holding;
                info!("Gripping complete, holding");
            }
            GripState::Releasing { deadline } if now >= deadline => {
                self.grip = GripState::Relaxed;
                info!("Releasing complete");
            }
            _ => (),
        }

        Ok(())
    }

    // ---- PNEUMATICS ----

    pub fn set_drain_valve(&mut self, open: bool) {
        self.drain_valve = open;
    }

    pub fn compressor_enabled(&self) -> bool {
        self.compressor
    }

    /// State of the compressor's pressure sensor on the last cycle.
    pub fn pressure_sensor(&self) -> bool {
        self.pressure_sensor
    }

    /// The events detected on the last cycle.
    pub fn events(&self) -> ArmEvents {
        self.events
    }

    fn limit_pressure(&self, pressure_bar: f64) -> f64 {
        clamp(&pressure_bar, &0.0, &self.params.max_pressure_bar)
    }

    // ---- ANALYSIS ----

    /// Push one delta per channel from the snapshot into the histories.
    fn update_histories(&mut self, snapshot: &SensorSnapshot) {
        update_channels(
            &snapshot.pressures,
            &mut self.pressures_seq,
            &mut self.read,
            &mut self.pressure_deltas,
        );
        update_channels(
            &snapshot.string_pots,
            &mut self.pots_seq,
            &mut self.read_pots,
            &mut self.pot_deltas,
        );

        let foil = Stamped {
            value: [snapshot.foil_pot.value],
            updated: snapshot.foil_pot.updated,
            seq: snapshot.foil_pot.seq,
        };
        let mut read_foil = [self.read_foil_pot];
        update_channels(&foil, &mut self.foil_pot_seq, &mut read_foil, &mut self.foil_pot_deltas);
        self.read_foil_pot = read_foil[0];
    }

    /// Ramp the arm bellows towards their targets, and drive the rotation bellows directly.
    fn ramp_pressures(&mut self) {
        for i in 0..NUM_ARM_BELLOWS {
            self.applied[i] = step_towards(self.applied[i], self.target[i], self.max_arm_speed);
        }
        for i in NUM_ARM_BELLOWS..NUM_BELLOWS {
            self.applied[i] = self.target[i];
        }

        self.arm_pressure_required = self.applied[..NUM_ARM_BELLOWS]
            .iter()
            .any(|p| *p > self.params.pressure_required_threshold_bar);
    }

    /// True if the arm is moving under its own pressure changes.
    fn arm_activity(&self) -> bool {
        (0..NUM_ARM_BELLOWS).any(|i| {
            (self.read[i] - self.target[i]).abs() > self.params.arm_activity_threshold
                || self.pressure_deltas.mean(i).abs() > self.params.arm_activity_deltas_threshold
        })
    }
}

impl<'a> State<ControlCtx<'a>> for ArmCtrl {
    type ProcError = ArmCtrlError;

    /// Update the delta histories, plan this cycle's pressures and detect interaction events.
    fn analyze(&mut self, ctx: &ControlCtx<'a>) -> Result<(), Self::ProcError> {
        self.update_histories(ctx.cycle.snapshot);
        self.pressure_sensor = ctx.cycle.snapshot.pressure_sensor;

        self.events = ArmEvents::default();

        self.ramp_pressures();

        if self.arm_activity() {
            debug!("Arm active, interaction detection skipped");
        } else {
            self.events = self.detect_events(ctx.cycle.now);
        }

        Ok(())
    }

    /// React to the detected events and send the pneumatic commands.
    fn apply(&mut self, ctx: &ControlCtx<'a>) -> Result<(), Self::ProcError> {
        let now = ctx.cycle.now;

        if self.events.receive {
            self.grip_at(now)?;
        }
        if self.events.deliver {
            self.release_at(now)?;
        }
        if self.events.touch {
            if self.touch.has_waiter() {
                self.touch.notify();
            } else {
                // Outcome is logged by the calibration itself
                self.calibrate_odometry(ctx).ok();
            }
        }

        self.update_grip(now)?;

        self.compressor = self.arm_pressure_required
            || self.rotate_pressure_required
            || matches!(self.grip, GripState::Gripping { .. });

        self.link.set_compressor(self.compressor)?;
        self.link.set_drain_valve(self.drain_valve)?;
        self.link.set_pressures(&self.applied)?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Push the delta between a stamped reading and the last seen reading, or zero if the reading
/// has not changed since the last cycle.
///
/// The first reading seen only initialises the stored values.
fn update_channels<const N: usize>(
    reading: &Stamped<[f64; N]>,
    last_seq: &mut Option<u64>,
    stored: &mut [f64; N],
    history: &mut DeltaHistory,
) {
    let fresh = reading.updated.is_some() && *last_seq != Some(reading.seq);

    if !fresh {
        history.push_zero();
        return;
    }

    if last_seq.is_some() {
        let mut deltas = [0.0; N];
        for i in 0..N {
            deltas[i] = reading.value[i] - stored[i];
        }
        history.push(&deltas);
    } else {
        history.push_zero();
    }

    *stored = reading.value;
    *last_seq = Some(reading.seq);
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::{
        data_store::CycleCtx,
        pos_track::{self, PosTrack},
        sensor_bridge::SensorHandle,
        shared::SensorCache,
    };
    use comms_if::eqpt::sim::SimLink;

    /// Test rig driving an ArmCtrl through cycles with hand-written sensor readings.
    pub(crate) struct Rig {
        pub sim: Arc<SimLink>,
        pub cache: Arc<SensorCache>,
        pub pos_track: PosTrack,
        pub arm: ArmCtrl,
        pub sensor: Option<SensorHandle>,
        pub now: Instant,
    }

    impl Rig {
        pub fn new() -> Self {
            let sim = Arc::new(SimLink::manual());
            sim.connect("sim").unwrap();
            let cache = Arc::new(SensorCache::new());
            let pos_track =
                PosTrack::new(sim.clone(), cache.clone(), pos_track::Params::default()).unwrap();
            let arm = ArmCtrl::new(sim.clone(), Params::default(), Arc::new(TouchSignal::new()));

            Self {
                sim,
                cache,
                pos_track,
                arm,
                sensor: None,
                now: Instant::now(),
            }
        }

        /// Run one cycle 50 ms after the previous one.
        pub fn cycle(&mut self) {
            self.now += Duration::from_millis(50);
            let now = self.now;

            // Stand in for the event pump
            self.cache.set_odometry(self.sim.odometry().unwrap(), now);

            let snapshot = self.cache.snapshot(now);
            let cycle = CycleCtx {
                now,
                snapshot: &snapshot,
                sensor: self.sensor.as_ref(),
            };
            self.pos_track.analyze(&cycle).unwrap();

            let ctx = ControlCtx {
                cycle: &cycle,
                pos_track: &self.pos_track,
            };
            self.arm.analyze(&ctx).unwrap();
            self.arm.apply(&ctx).unwrap();
        }

        /// Set the string pots, stamped with the time of the next cycle.
        pub fn set_pots(&self, pots: [f64; NUM_STRING_POTS]) {
            self.cache.set_string_pots(pots, self.now + Duration::from_millis(50));
        }

        /// Set the read pressures, stamped with the time of the next cycle.
        pub fn set_pressures(&self, pressures: [f64; NUM_BELLOWS]) {
            self.cache.set_pressures(pressures, self.now + Duration::from_millis(50));
        }
    }

    #[test]
    fn test_pressure_ramp() {
        let mut rig = Rig::new();
        rig.arm.set_max_arm_speed(0.5);
        rig.arm.set_target_pressure(INNER_OVER, 1.5).unwrap();

        rig.cycle();
        assert!((rig.arm.applied_pressures()[INNER_OVER] - 0.5).abs() < 1e-9);
        rig.cycle();
        assert!((rig.arm.applied_pressures()[INNER_OVER] - 1.0).abs() < 1e-9);
        rig.cycle();
        assert!((rig.arm.applied_pressures()[INNER_OVER] - 1.5).abs() < 1e-9);
        rig.cycle();
        assert!((rig.arm.applied_pressures()[INNER_OVER] - 1.5).abs() < 1e-9);

        assert_eq!(rig.sim.pneumatics().pressure_cmd[INNER_OVER], 1.5);
        assert!(rig.arm.arm_pressure_required());
        assert!(rig.sim.pneumatics().compressor);
    }

    #[test]
    fn test_ramp_step_bounded() {
        let mut rig = Rig::new();
        rig.arm.set_max_arm_speed(0.2);
        rig.arm.outer_to_coordinate(-0.3, 0.0);
        let target = rig.arm.target_pressures();

        let mut prev = rig.arm.applied_pressures();
        for _ in 0..20 {
            rig.cycle();
            let applied = rig.arm.applied_pressures();
            for i in 0..NUM_ARM_BELLOWS {
                assert!((applied[i] - prev[i]).abs() <= 0.2 + 1e-12);
                assert!(applied[i] >= 0.0 && applied[i] <= 1.5);
            }
            prev = applied;
        }
        for i in 0..NUM_ARM_BELLOWS {
            assert!((prev[i] - target[i]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_rotation_unramped() {
        let mut rig = Rig::new();
        rig.arm.rotate_horizontal();
        rig.cycle();

        let applied = rig.arm.applied_pressures();
        assert_eq!(applied[ROTATE_HORIZONTAL], 1.5);
        assert_eq!(applied[ROTATE_VERTICAL], 0.0);
        assert!(rig.arm.compressor_enabled());
        assert!(!rig.arm.arm_pressure_required());

        rig.arm.rotate_vertical();
        rig.cycle();
        let applied = rig.arm.applied_pressures();
        assert_eq!(applied[ROTATE_HORIZONTAL], 0.0);
        assert_eq!(applied[ROTATE_VERTICAL], 1.5);

        rig.arm.rotate_relax();
        rig.cycle();
        assert!(!rig.arm.compressor_enabled());
    }

    #[test]
    fn test_target_limits() {
        let mut rig = Rig::new();
        rig.arm.set_target_pressure(INNER_LEFT, 3.0).unwrap();
        rig.arm.set_target_pressure(INNER_RIGHT, -1.0).unwrap();
        assert_eq!(rig.arm.target_pressures()[INNER_LEFT], 1.5);
        assert_eq!(rig.arm.target_pressures()[INNER_RIGHT], 0.0);

        assert!(matches!(
            rig.arm.set_target_pressure(8, 1.0),
            Err(ArmCtrlError::InvalidChannel(8))
        ));
        assert!(matches!(
            rig.arm.set_target_pressure(0, f64::NAN),
            Err(ArmCtrlError::InvalidPressure(_))
        ));

        rig.arm.arm_relax();
        assert_eq!(rig.arm.target_pressures(), [0.0; NUM_BELLOWS]);
    }

    #[test]
    fn test_max_arm_speed_limits() {
        let mut rig = Rig::new();
        rig.arm.set_max_arm_speed(2.0);
        assert_eq!(rig.arm.max_arm_speed(), 0.5);
        rig.arm.set_max_arm_speed(0.0);
        assert_eq!(rig.arm.max_arm_speed(), 0.05);
        rig.arm.set_max_arm_speed(0.2);
        assert_eq!(rig.arm.max_arm_speed(), 0.2);
    }

    #[test]
    fn test_grip_timing() {
        let mut rig = Rig::new();
        rig.arm.grip_at(rig.now).unwrap();

        assert!(!rig.arm.is_holding());
        assert!(rig.sim.pneumatics().gripper_valve1);
        assert!(rig.sim.pneumatics().gripper_valve2);

        // Compressor runs while gripping
        rig.cycle();
        assert!(rig.sim.pneumatics().compressor);

        // 79 cycles of 50 ms is 3.95 s
        for _ in 0..78 {
            rig.cycle();
        }
        assert!(!rig.arm.is_holding());

        rig.cycle();
        rig.cycle();
        assert!(rig.arm.is_holding());
        assert_eq!(rig.arm.grip_state(), GripState::Holding);
        assert!(!rig.sim.pneumatics().gripper_valve1);
        assert!(!rig.sim.pneumatics().compressor);
    }

    #[test]
    fn test_grip_while_holding_ignored() {
        let mut rig = Rig::new();
        rig.arm.grip = GripState::Holding;

        rig.arm.grip_at(rig.now).unwrap();
        assert_eq!(rig.arm.grip_state(), GripState::Holding);
        assert!(!rig.sim.pneumatics().gripper_valve1);

        // Gripping twice keeps the first deadline
        let mut rig = Rig::new();
        rig.arm.grip_at(rig.now).unwrap();
        let first = rig.arm.grip_state();
        rig.arm.grip_at(rig.now + Duration::from_secs(1)).unwrap();
        assert_eq!(rig.arm.grip_state(), first);
    }

    #[test]
    fn test_release_timing() {
        let mut rig = Rig::new();

        // Not holding, nothing to release
        rig.arm.release_at(rig.now).unwrap();
        assert_eq!(rig.arm.grip_state(), GripState::Relaxed);

        rig.arm.grip = GripState::Holding;
        rig.arm.release_at(rig.now).unwrap();
        assert!(rig.arm.is_holding());
        assert!(!rig.sim.pneumatics().gripper_valve2);

        for _ in 0..39 {
            rig.cycle();
        }
        assert!(rig.arm.is_holding());
        rig.cycle();
        rig.cycle();
        assert!(!rig.arm.is_holding());
    }

    #[test]
    fn test_total_pressure_diff() {
        let mut rig = Rig::new();
        rig.arm.set_target_pressure(INNER_OVER, 1.0).unwrap();
        rig.arm.set_target_pressure(OUTER_LEFT, 0.5).unwrap();
        rig.arm.set_target_pressure(ROTATE_VERTICAL, 1.5).unwrap();

        let mut read = [0.0; NUM_BELLOWS];
        read[INNER_OVER] = 0.25;
        rig.set_pressures(read);
        rig.cycle();

        assert!((rig.arm.arm_total_pressure_diff() - 1.25).abs() < 1e-9);
    }

    #[test]
    fn test_drain_valve_applied() {
        let mut rig = Rig::new();
        rig.arm.set_drain_valve(true);
        rig.cycle();
        assert!(rig.sim.pneumatics().drain_valve);
    }
}
