//! Odometry recalibration from the external coordinate sensor
//!
//! When the relaxed arm is touched while the robot is stationary, the external sensor's latest
//! coordinate is assumed to be the gripper's position. The robot's centre then lies a fixed
//! distance behind it along the current heading.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::info;
use nalgebra::{Rotation2, Vector2};
use std::time::Duration;

// Internal
use super::ArmCtrl;
use crate::{
    data_store::ControlCtx,
    pos_track::{PosTrackError, Pose},
};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Reasons a recalibration was not performed. The pose is never modified when aborting.
#[derive(Debug, thiserror::Error)]
pub enum CalibrationAbort {
    #[error("No external sensor is running")]
    NoSensor,

    #[error("The arm is not relaxed")]
    ArmNotRelaxed,

    #[error("The latest external sample is too old ({0:?})")]
    SampleTooOld(Option<Duration>),

    #[error("The robot is driving ({0:.3} m/s)")]
    Driving(f64),

    #[error("The robot is turning ({0:.3} rad/s)")]
    Turning(f64),

    #[error("The sample height {0:.3} m is outside the accepted band")]
    HeightOutOfBand(f64),

    #[error("The correction ({0:.3}, {1:.3}) m is outside the accepted envelope")]
    OutOfEnvelope(f64, f64),

    #[error("Could not update the odometry: {0}")]
    PosTrackError(#[from] PosTrackError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ArmCtrl {
    /// Correct the odometry position from the external sensor's latest sample.
    ///
    /// The heading is kept. Returns the new pose. The sample is only consumed when the pose is
    /// updated.
    pub fn calibrate_odometry(&self, ctx: &ControlCtx) -> Result<Pose, CalibrationAbort> {
        let result = self.try_calibrate(ctx);

        match result {
            Ok(ref pose) => info!(
                "Odometry calibrated to ({:.3}, {:.3})",
                pose.x(),
                pose.y()
            ),
            Err(ref abort) => info!("Calibration aborted: {}", abort),
        }

        result
    }

    fn try_calibrate(&self, ctx: &ControlCtx) -> Result<Pose, CalibrationAbort> {
        let now = ctx.cycle.now;

        let sensor = match ctx.cycle.sensor {
            Some(s) if s.is_running() => s,
            _ => return Err(CalibrationAbort::NoSensor),
        };

        if self.arm_pressure_required {
            return Err(CalibrationAbort::ArmNotRelaxed);
        }

        let mailbox = sensor.mailbox();
        let age = mailbox.data_age(now);
        match age {
            Some(a) if a <= Duration::from_millis(self.params.calibrate_coord_max_age_ms) => (),
            _ => return Err(CalibrationAbort::SampleTooOld(age)),
        }

        let speed = ctx.pos_track.current_abs_speed();
        if speed > self.params.calibrate_max_drive_velocity_ms {
            return Err(CalibrationAbort::Driving(speed));
        }
        let omega = ctx.pos_track.current_abs_omega();
        if omega > self.params.calibrate_max_rotation_velocity_rads {
            return Err(CalibrationAbort::Turning(omega));
        }

        let sample = mailbox.latest().ok_or(CalibrationAbort::SampleTooOld(None))?;
        if sample.z < self.params.calibrate_min_height_m
            || sample.z > self.params.calibrate_max_height_m
        {
            return Err(CalibrationAbort::HeightOutOfBand(sample.z));
        }

        let pose = ctx.pos_track.get_position(now)?;

        let offset = Rotation2::new(pose.heading_rad)
            * Vector2::new(self.params.relaxed_distance_from_centre_m, 0.0);
        let centre = Vector2::new(sample.x, sample.y) - offset;

        let deviation = centre - pose.position_m;
        let max_dev = self.params.calibrate_max_xy_deviation_m;
        if deviation.x.abs() > max_dev || deviation.y.abs() > max_dev {
            return Err(CalibrationAbort::OutOfEnvelope(deviation.x, deviation.y));
        }

        let pose = ctx.pos_track.set(centre.x, centre.y, pose.heading_rad)?;
        mailbox.take();

        Ok(pose)
    }
}

#[cfg(test)]
mod test {
    use super::super::state::test::Rig;
    use super::*;
    use crate::{
        data_store::CycleCtx,
        sensor_bridge::SensorHandle,
    };
    use comms_if::eqpt::{HardwareLink, OdomReading, INNER_OVER};
    use std::f64::consts::FRAC_PI_2;
    use std::time::Instant;

    fn with_sensor(rig: &mut Rig) -> SensorHandle {
        let handle = SensorHandle::new();
        handle.set_running(true);
        rig.sensor = Some(handle.clone());
        handle
    }

    /// Run the calibration against the rig's current state at `now`.
    fn calibrate(rig: &Rig, now: Instant) -> Result<Pose, CalibrationAbort> {
        let snapshot = rig.cache.snapshot(now);
        let cycle = CycleCtx {
            now,
            snapshot: &snapshot,
            sensor: rig.sensor.as_ref(),
        };
        let ctx = ControlCtx {
            cycle: &cycle,
            pos_track: &rig.pos_track,
        };
        rig.arm.calibrate_odometry(&ctx)
    }

    fn odom_x(rig: &Rig) -> f64 {
        rig.sim.odometry().unwrap().x
    }

    #[test]
    fn test_calibration_success() {
        let mut rig = Rig::new();
        let sensor = with_sensor(&mut rig);
        rig.sim.set_odometry(1.0, 1.0, FRAC_PI_2).unwrap();
        rig.cycle();

        let now = rig.now;
        sensor.mailbox().post_coordinate(1.1, 1.6, 0.2, now);

        let pose = calibrate(&rig, now).unwrap();
        assert!((pose.x() - 1.1).abs() < 1e-9);
        assert!((pose.y() - 1.13).abs() < 1e-9);
        assert!((pose.heading_rad - FRAC_PI_2).abs() < 1e-9);
        assert!(!sensor.mailbox().is_updated());
    }

    #[test]
    fn test_no_sensor() {
        let mut rig = Rig::new();
        rig.cycle();
        assert!(matches!(calibrate(&rig, rig.now), Err(CalibrationAbort::NoSensor)));

        // A stopped bridge counts as no sensor
        let sensor = with_sensor(&mut rig);
        sensor.set_running(false);
        sensor.mailbox().post_coordinate(0.47, 0.0, 0.2, rig.now);
        assert!(matches!(calibrate(&rig, rig.now), Err(CalibrationAbort::NoSensor)));
        assert_eq!(odom_x(&rig), 0.0);
    }

    #[test]
    fn test_arm_not_relaxed() {
        let mut rig = Rig::new();
        let sensor = with_sensor(&mut rig);
        rig.arm.set_target_pressure(INNER_OVER, 1.0).unwrap();
        rig.cycle();

        sensor.mailbox().post_coordinate(1.0, 0.0, 0.2, rig.now);
        assert!(matches!(calibrate(&rig, rig.now), Err(CalibrationAbort::ArmNotRelaxed)));
        assert_eq!(odom_x(&rig), 0.0);
    }

    #[test]
    fn test_sample_too_old() {
        let mut rig = Rig::new();
        let sensor = with_sensor(&mut rig);
        rig.cycle();

        assert!(matches!(
            calibrate(&rig, rig.now),
            Err(CalibrationAbort::SampleTooOld(None))
        ));

        sensor.mailbox().post_coordinate(1.0, 0.0, 0.2, rig.now);
        let later = rig.now + Duration::from_millis(301);
        assert!(matches!(
            calibrate(&rig, later),
            Err(CalibrationAbort::SampleTooOld(Some(_)))
        ));
        assert_eq!(odom_x(&rig), 0.0);
    }

    #[test]
    fn test_moving() {
        let mut rig = Rig::new();
        let sensor = with_sensor(&mut rig);
        rig.cycle();
        sensor.mailbox().post_coordinate(1.0, 0.0, 0.2, rig.now);

        rig.cache.set_odometry(
            OdomReading {
                vx: 0.05,
                ..Default::default()
            },
            rig.now,
        );
        assert!(matches!(calibrate(&rig, rig.now), Err(CalibrationAbort::Driving(_))));

        rig.cache.set_odometry(
            OdomReading {
                omega: -0.05,
                ..Default::default()
            },
            rig.now,
        );
        assert!(matches!(calibrate(&rig, rig.now), Err(CalibrationAbort::Turning(_))));
        assert_eq!(odom_x(&rig), 0.0);
    }

    #[test]
    fn test_height_out_of_band() {
        let mut rig = Rig::new();
        let sensor = with_sensor(&mut rig);
        rig.cycle();

        sensor.mailbox().post_coordinate(1.0, 0.0, 0.05, rig.now);
        assert!(matches!(
            calibrate(&rig, rig.now),
            Err(CalibrationAbort::HeightOutOfBand(_))
        ));

        sensor.mailbox().post_coordinate(1.0, 0.0, 0.5, rig.now);
        assert!(matches!(
            calibrate(&rig, rig.now),
            Err(CalibrationAbort::HeightOutOfBand(_))
        ));
        assert_eq!(odom_x(&rig), 0.0);
    }

    #[test]
    fn test_out_of_envelope() {
        let mut rig = Rig::new();
        let sensor = with_sensor(&mut rig);
        rig.cycle();

        sensor.mailbox().post_coordinate(3.0, 0.0, 0.2, rig.now);
        assert!(matches!(
            calibrate(&rig, rig.now),
            Err(CalibrationAbort::OutOfEnvelope(_, _))
        ));
        assert_eq!(odom_x(&rig), 0.0);
    }

    #[test]
    fn test_abort_keeps_sample_unconsumed() {
        let mut rig = Rig::new();
        let sensor = with_sensor(&mut rig);
        rig.cycle();

        sensor.mailbox().post_coordinate(1.0, 0.0, 0.05, rig.now);
        assert!(calibrate(&rig, rig.now).is_err());
        assert!(sensor.mailbox().is_updated());

        sensor.mailbox().post_coordinate(3.0, 0.0, 0.2, rig.now);
        assert!(calibrate(&rig, rig.now).is_err());
        assert!(sensor.mailbox().is_updated());

        sensor.mailbox().post_coordinate(0.47, 0.0, 0.2, rig.now);
        assert!(calibrate(&rig, rig.now).is_ok());
        assert!(!sensor.mailbox().is_updated());
    }

    #[test]
    fn test_touch_calibrates_without_waiter() {
        let mut rig = Rig::new();
        let sensor = with_sensor(&mut rig);
        rig.set_pots([0.0; comms_if::eqpt::NUM_STRING_POTS]);
        rig.cycle();

        let mut pots = [0.0; comms_if::eqpt::NUM_STRING_POTS];
        pots[1] = 0.008;
        pots[4] = 0.008;
        rig.set_pots(pots);
        sensor
            .mailbox()
            .post_coordinate(0.67, 0.1, 0.2, rig.now + Duration::from_millis(50));
        rig.cycle();

        assert!(rig.arm.events().touch);
        let odom = rig.sim.odometry().unwrap();
        assert!((odom.x - 0.2).abs() < 1e-9);
        assert!((odom.y - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_touch_wakes_waiter() {
        let mut rig = Rig::new();
        let sensor = with_sensor(&mut rig);
        rig.set_pots([0.0; comms_if::eqpt::NUM_STRING_POTS]);
        rig.cycle();

        let signal = rig.arm.touch_signal();
        let cancel = crate::shared::CancelToken::new();
        let c = cancel.clone();
        let s = signal.clone();
        let jh = std::thread::spawn(move || s.wait(&c, Duration::from_millis(5)));
        while !signal.has_waiter() {
            std::thread::sleep(Duration::from_millis(1));
        }

        let mut pots = [0.0; comms_if::eqpt::NUM_STRING_POTS];
        pots[0] = 0.012;
        rig.set_pots(pots);
        sensor
            .mailbox()
            .post_coordinate(0.67, 0.1, 0.2, rig.now + Duration::from_millis(50));
        rig.cycle();

        assert!(jh.join().unwrap());

        // The touch went to the waiter, the odometry is untouched
        assert_eq!(odom_x(&rig), 0.0);
        assert!(sensor.mailbox().is_updated());
    }
}
