//! Implementations for the DriveCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info};
use nalgebra::Vector2;
use std::sync::Arc;

// Internal
use super::{
    Destination, DriveCtrlError, DriveMode, Params, PointingTarget, VelocityCommand,
};
use crate::data_store::ControlCtx;
use comms_if::eqpt::HardwareLink;
use util::{
    maths::{clamp, step_towards},
    module::State,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Drive control module state
pub struct DriveCtrl {
    link: Arc<dyn HardwareLink>,

    pub(crate) params: Params,

    pub(crate) destination: Destination,
    pub(crate) point_at: PointingTarget,

    /// If set the robot does not move.
    stop: bool,

    /// Forces manouvre mode regardless of the distance to the destination.
    manouvre_only: bool,

    /// Operator velocity which overrides automatic driving.
    manual: Option<VelocityCommand>,

    /// Command sent on the last cycle.
    cmd: VelocityCommand,

    mode: DriveMode,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DriveCtrl {
    /// Create a new drive controller.
    ///
    /// The destination is set to the robot's current position and the stop flag is set, so the
    /// robot stays put until [`DriveCtrl::go`] is called.
    pub fn new(link: Arc<dyn HardwareLink>, params: Params, position_m: Vector2<f64>) -> Self {
        let stop_within_m = params.min_acceptable_distance_m;

        Self {
            link,
            params,
            destination: Destination {
                position_m,
                stop_within_m,
            },
            point_at: PointingTarget {
                position_m: Vector2::zeros(),
                active: false,
            },
            stop: true,
            manouvre_only: false,
            manual: None,
            cmd: VelocityCommand::default(),
            mode: DriveMode::Stopped,
        }
    }

    /// Set a new destination, cancelling any manual velocity.
    pub fn set_destination(&mut self, x: f64, y: f64) {
        self.destination.position_m = Vector2::new(x, y);
        self.manual = None;
        info!("Destination set to ({:.3}, {:.3})", x, y);
    }

    pub fn destination(&self) -> Vector2<f64> {
        self.destination.position_m
    }

    /// Turn to face the given target once near the destination.
    pub fn set_point_at(&mut self, x: f64, y: f64) {
        self.point_at = PointingTarget {
            position_m: Vector2::new(x, y),
            active: true,
        };
        info!("Pointing at ({:.3}, {:.3})", x, y);
    }

    pub fn point_at(&self) -> Vector2<f64> {
        self.point_at.position_m
    }

    pub fn pointing_active(&self) -> bool {
        self.point_at.active
    }

    pub fn stop_pointing(&mut self) {
        self.point_at.active = false;
    }

    /// Set the arrival tolerance, which cannot be lower than the minimum acceptable distance.
    pub fn set_stop_within(&mut self, distance_m: f64) {
        self.destination.stop_within_m = distance_m.max(self.params.min_acceptable_distance_m);
    }

    pub fn stop_within(&self) -> f64 {
        self.destination.stop_within_m
    }

    /// Force manouvre mode regardless of the distance to the destination.
    pub fn set_manouvre_only(&mut self, manouvre_only: bool) {
        self.manouvre_only = manouvre_only;
    }

    /// Hold the given velocity instead of driving to the destination.
    ///
    /// Each axis is limited to the manual maximum speed, and is still soft accelerated. Setting
    /// a new destination resumes automatic driving.
    pub fn set_velocity(&mut self, vx: f64, vy: f64, omega: f64) {
        let max = self.params.manual_max_speed;

        self.manual = Some(VelocityCommand {
            vx: clamp(&vx, &-max, &max),
            vy: clamp(&vy, &-max, &max),
            omega: clamp(&omega, &-max, &max),
        });
    }

    /// Clear the stop flag.
    pub fn go(&mut self) {
        self.stop = false;
    }

    /// Set the stop flag, the robot decelerates at the normal rate.
    pub fn nice_stop(&mut self) {
        self.stop = true;
    }

    /// Stop immediately, bypassing the acceleration limits.
    ///
    /// The stop flag is set and any manual velocity cleared, so a new command is needed before
    /// the robot moves again.
    pub fn full_stop(&mut self) -> Result<(), DriveCtrlError> {
        self.cmd = VelocityCommand::default();
        self.manual = None;
        self.stop = true;
        self.mode = DriveMode::Stopped;

        self.link.set_velocity(0.0, 0.0, 0.0)?;

        Ok(())
    }

    pub fn stop_is_set(&self) -> bool {
        self.stop
    }

    /// The velocity command sent on the last cycle.
    pub fn command(&self) -> VelocityCommand {
        self.cmd
    }

    /// The mode used on the last cycle.
    pub fn mode(&self) -> DriveMode {
        self.mode
    }

    /// Limit the change of each axis from the previous command.
    fn soft_accelerate(&self, target: VelocityCommand) -> VelocityCommand {
        let prev = self.cmd;

        VelocityCommand {
            vx: step_towards(prev.vx, target.vx, self.params.velocity_max_adjust_ms),
            vy: step_towards(prev.vy, target.vy, self.params.velocity_max_adjust_ms),
            omega: step_towards(prev.omega, target.omega, self.params.rotate_max_adjust_rads),
        }
    }
}

impl<'a> State<ControlCtx<'a>> for DriveCtrl {
    type ProcError = DriveCtrlError;

    /// Drive control has nothing to analyse.
    fn analyze(&mut self, _ctx: &ControlCtx<'a>) -> Result<(), Self::ProcError> {
        Ok(())
    }

    /// Compute and send the velocity command for this cycle.
    fn apply(&mut self, ctx: &ControlCtx<'a>) -> Result<(), Self::ProcError> {
        let mut target = VelocityCommand::default();

        if self.stop {
            self.mode = DriveMode::Stopped;
        }
        else if let Some(manual) = self.manual {
            self.mode = DriveMode::Manual;
            target = manual;
        }
        else {
            let pose = ctx.pos_track.cycle_pose();
            let dest_vec = pose.vector_to(&self.destination.position_m);
            let dist = dest_vec.norm();

            if self.manouvre_only || dist < self.params.travel_min_distance_m {
                self.mode = DriveMode::Manouvre;
                target = self.calc_manouvre(&pose, &dest_vec);
            } else {
                self.mode = DriveMode::Travel;
                target = self.calc_travel(&pose, &dest_vec);
            }

            if self.point_at.active
                && dist
                    < self.params.pointing_destination_max_distance_m
                        + self.destination.stop_within_m
            {
                if let Some(omega) = self.calc_point(&pose) {
                    target.omega = omega;
                }
            }
        }

        self.cmd = self.soft_accelerate(target);

        debug!(
            "DriveCtrl {:?}: ({:.3}, {:.3}, {:.3})",
            self.mode, self.cmd.vx, self.cmd.vy, self.cmd.omega
        );

        self.link.set_velocity(self.cmd.vx, self.cmd.vy, self.cmd.omega)?;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        data_store::CycleCtx,
        pos_track::{self, PosTrack},
        shared::SensorCache,
    };
    use comms_if::eqpt::{sim::SimLink, OdomReading};
    use std::time::Instant;

    struct Rig {
        sim: Arc<SimLink>,
        cache: Arc<SensorCache>,
        pos_track: PosTrack,
        drive: DriveCtrl,
    }

    impl Rig {
        fn new() -> Self {
            let sim = Arc::new(SimLink::manual());
            sim.connect("sim").unwrap();
            let cache = Arc::new(SensorCache::new());
            let pos_track =
                PosTrack::new(sim.clone(), cache.clone(), pos_track::Params::default()).unwrap();
            let drive = DriveCtrl::new(sim.clone(), Params::default(), Vector2::zeros());

            Self {
                sim,
                cache,
                pos_track,
                drive,
            }
        }

        fn set_pose(&self, x: f64, y: f64, phi: f64) {
            self.cache.set_odometry(
                OdomReading {
                    x,
                    y,
                    phi,
                    ..Default::default()
                },
                Instant::now(),
            );
        }

        fn cycle(&mut self) -> VelocityCommand {
            let now = Instant::now();
            let snapshot = self.cache.snapshot(now);
            let cycle = CycleCtx {
                now,
                snapshot: &snapshot,
                sensor: None,
            };
            self.pos_track.analyze(&cycle).unwrap();

            let ctx = ControlCtx {
                cycle: &cycle,
                pos_track: &self.pos_track,
            };
            self.drive.analyze(&ctx).unwrap();
            self.drive.apply(&ctx).unwrap();

            let (vx, vy, omega) = self.sim.last_velocity();
            VelocityCommand { vx, vy, omega }
        }
    }

    #[test]
    fn test_travel_towards_far_destination() {
        let mut rig = Rig::new();
        rig.set_pose(0.0, 0.0, 0.0);
        rig.drive.set_destination(2.0, 0.0);
        rig.drive.go();

        let cmd = rig.cycle();
        assert_eq!(rig.drive.mode(), DriveMode::Travel);
        assert!(cmd.vx > 0.0);
        assert!(cmd.omega.abs() < 1e-9);
        assert_eq!(cmd.vy, 0.0);

        // Speed ramps up to the travel maximum
        let mut cmd = cmd;
        for _ in 0..50 {
            cmd = rig.cycle();
        }
        assert!((cmd.vx - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_manouvre_when_close() {
        let mut rig = Rig::new();
        rig.set_pose(0.0, 0.0, 0.0);
        rig.drive.set_destination(2.0, 0.0);
        rig.drive.go();
        rig.cycle();
        assert_eq!(rig.drive.mode(), DriveMode::Travel);

        rig.set_pose(1.96, 0.0, 0.0);
        let cmd = rig.cycle();
        assert_eq!(rig.drive.mode(), DriveMode::Manouvre);
        assert!(cmd.vx > 0.0);
        assert_eq!(cmd.omega, 0.0);
    }

    #[test]
    fn test_manouvre_in_body_frame() {
        let mut rig = Rig::new();

        // Facing +y, destination on the robot's right
        rig.set_pose(0.0, 0.0, std::f64::consts::FRAC_PI_2);
        rig.drive.set_destination(0.05, 0.0);
        rig.drive.go();

        let cmd = rig.cycle();
        assert_eq!(rig.drive.mode(), DriveMode::Manouvre);
        assert!(cmd.vx.abs() < 1e-9);
        assert!(cmd.vy < 0.0);
    }

    #[test]
    fn test_arrived_within_stop_distance() {
        let mut rig = Rig::new();
        rig.set_pose(1.0, 1.0, 0.0);
        rig.drive.set_destination(1.01, 1.0);
        rig.drive.go();

        assert_eq!(rig.cycle(), VelocityCommand::default());
    }

    #[test]
    fn test_stop_within_floor() {
        let mut rig = Rig::new();
        rig.drive.set_stop_within(0.001);
        assert_eq!(rig.drive.stop_within(), 0.02);
        rig.drive.set_stop_within(0.3);
        assert_eq!(rig.drive.stop_within(), 0.3);
    }

    #[test]
    fn test_turn_on_spot_when_behind() {
        let mut rig = Rig::new();
        rig.set_pose(0.0, 0.0, 0.0);
        rig.drive.set_destination(-2.0, 0.1);
        rig.drive.go();

        let mut cmd = rig.cycle();
        for _ in 0..10 {
            cmd = rig.cycle();
        }
        assert_eq!(cmd.vx, 0.0);
        assert!((cmd.omega - 1.8).abs() < 1e-9);
    }

    #[test]
    fn test_acceleration_limits() {
        let mut rig = Rig::new();
        let params = Params::default();
        rig.set_pose(0.0, 0.0, 0.0);
        rig.drive.set_destination(0.0, 3.0);
        rig.drive.go();

        let mut prev = VelocityCommand::default();
        for i in 0..40 {
            // Move the robot around so the targets keep changing
            rig.set_pose(0.01 * i as f64, 0.0, 0.2 * i as f64);
            let cmd = rig.cycle();

            assert!((cmd.vx - prev.vx).abs() <= params.velocity_max_adjust_ms + 1e-12);
            assert!((cmd.vy - prev.vy).abs() <= params.velocity_max_adjust_ms + 1e-12);
            assert!((cmd.omega - prev.omega).abs() <= params.rotate_max_adjust_rads + 1e-12);
            assert!(cmd.vx.abs() <= params.travel_max_speed_ms + 1e-12);
            assert!(cmd.omega.abs() <= params.rotate_max_speed_rads + 1e-12);
            prev = cmd;
        }
    }

    #[test]
    fn test_full_stop_bypasses_limits() {
        let mut rig = Rig::new();
        rig.set_pose(0.0, 0.0, 0.0);
        rig.drive.set_destination(5.0, 0.0);
        rig.drive.go();
        for _ in 0..30 {
            rig.cycle();
        }
        assert!(rig.drive.command().vx > 0.1);

        rig.drive.full_stop().unwrap();
        assert_eq!(rig.sim.last_velocity(), (0.0, 0.0, 0.0));
        assert!(rig.drive.stop_is_set());

        // Stays stopped until told to go
        assert_eq!(rig.cycle(), VelocityCommand::default());
        rig.drive.go();
        assert!((rig.cycle().vx - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_nice_stop_decelerates() {
        let mut rig = Rig::new();
        rig.set_pose(0.0, 0.0, 0.0);
        rig.drive.set_destination(5.0, 0.0);
        rig.drive.go();
        for _ in 0..30 {
            rig.cycle();
        }
        let before = rig.drive.command().vx;

        rig.drive.nice_stop();
        let after = rig.cycle().vx;
        assert!((before - after - 0.02).abs() < 1e-9);
        assert_eq!(rig.drive.mode(), DriveMode::Stopped);
    }

    #[test]
    fn test_pointing() {
        let mut rig = Rig::new();
        rig.set_pose(1.0, 0.0, 0.0);
        rig.drive.set_destination(1.0, 0.0);
        rig.drive.set_point_at(1.0, 1.0);
        rig.drive.go();

        // At the destination, turn to face the target
        let cmd = rig.cycle();
        assert!(cmd.omega > 0.0);
        assert!(rig.drive.pointing_active());

        // Once facing the target pointing deactivates
        rig.set_pose(1.0, 0.0, std::f64::consts::FRAC_PI_2);
        rig.cycle();
        assert!(!rig.drive.pointing_active());
    }

    #[test]
    fn test_pointing_band_widens_with_stop_within() {
        // Band is pointing_destination_max_distance_m + stop_within_m = 0.15 m
        let mut rig = Rig::new();
        rig.drive.set_stop_within(0.1);
        rig.drive.set_destination(1.0, 0.0);
        rig.drive.set_point_at(0.88, 1.0);
        rig.drive.go();

        // 0.12 m out, beyond 0.05 - 0.1 but inside 0.05 + 0.1
        rig.set_pose(0.88, 0.0, 0.0);
        let cmd = rig.cycle();
        assert_eq!(rig.drive.mode(), DriveMode::Travel);
        assert!(cmd.omega > 0.0);

        // 0.16 m out, outside the band, no turn towards the target
        let mut rig = Rig::new();
        rig.drive.set_stop_within(0.1);
        rig.drive.set_destination(1.0, 0.0);
        rig.drive.set_point_at(0.84, 1.0);
        rig.drive.go();

        rig.set_pose(0.84, 0.0, 0.0);
        let cmd = rig.cycle();
        assert!(cmd.omega.abs() < 1e-9);
        assert!(rig.drive.pointing_active());
    }

    #[test]
    fn test_pointing_only_near_destination() {
        let mut rig = Rig::new();
        rig.set_pose(0.0, 0.0, 0.0);
        rig.drive.set_destination(2.0, 0.0);
        rig.drive.set_point_at(0.0, 5.0);
        rig.drive.go();

        let cmd = rig.cycle();
        assert!(cmd.omega.abs() < 1e-9);
        assert!(rig.drive.pointing_active());
    }

    #[test]
    fn test_manual_velocity() {
        let mut rig = Rig::new();
        rig.drive.go();
        rig.drive.set_velocity(2.0, 0.0, -0.1);

        let mut cmd = rig.cycle();
        assert_eq!(rig.drive.mode(), DriveMode::Manual);
        for _ in 0..100 {
            cmd = rig.cycle();
        }
        assert!((cmd.vx - 0.7).abs() < 1e-9);
        assert!((cmd.omega + 0.1).abs() < 1e-9);

        rig.drive.set_destination(0.0, 0.0);
        rig.cycle();
        assert_ne!(rig.drive.mode(), DriveMode::Manual);
    }

    #[test]
    fn test_manouvre_only() {
        let mut rig = Rig::new();
        rig.set_pose(0.0, 0.0, 0.0);
        rig.drive.set_destination(2.0, 2.0);
        rig.drive.set_manouvre_only(true);
        rig.drive.go();

        let cmd = rig.cycle();
        assert_eq!(rig.drive.mode(), DriveMode::Manouvre);
        assert!(cmd.vx > 0.0 && cmd.vy > 0.0);
        assert_eq!(cmd.omega, 0.0);
    }
}
