//! Implementations for the PosTrack state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, warn};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

// Internal
use super::{Params, PosTrackError, Pose};
use crate::{data_store::CycleCtx, shared::SensorCache};
use comms_if::eqpt::{HardwareLink, OdomReading};
use util::{maths::wrap_pi, module::State};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Position tracking module state
pub struct PosTrack {
    link: Arc<dyn HardwareLink>,
    cache: Arc<SensorCache>,

    pub(crate) params: Params,

    /// Pose used during the current cycle
    cycle_pose: Pose,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PosTrack {
    /// Create a new position tracker reading from the given cache, which is refreshed through the
    /// link when stale.
    pub fn new(
        link: Arc<dyn HardwareLink>,
        cache: Arc<SensorCache>,
        params: Params,
    ) -> Result<Self, PosTrackError> {
        if !(params.adjustment_factor.is_finite() && params.adjustment_factor > 0.0) {
            return Err(PosTrackError::InvalidParams(format!(
                "adjustment_factor must be positive, found {}",
                params.adjustment_factor
            )));
        }

        Ok(Self {
            link,
            cache,
            params,
            cycle_pose: Pose::default(),
        })
    }

    /// Overwrite the odometry pose, then read it back to confirm the drive base accepted it.
    ///
    /// Returns the pose read back.
    pub fn set(&self, x: f64, y: f64, heading_rad: f64) -> Result<Pose, PosTrackError> {
        let factor = self.params.adjustment_factor;
        let heading_rad = wrap_pi(heading_rad);

        self.link.set_odometry(x / factor, y / factor, heading_rad)?;

        let pose = self.pose_from(&self.refresh(Instant::now())?);

        let dx = pose.x() - x;
        let dy = pose.y() - y;
        if dx.hypot(dy) > self.params.set_verify_tolerance_m {
            warn!(
                "Odometry set to ({:.3}, {:.3}, {:.3}) but reads back ({:.3}, {:.3}, {:.3})",
                x, y, heading_rad,
                pose.x(), pose.y(), pose.heading_rad
            );
        } else {
            info!(
                "Odometry set to ({:.3}, {:.3}, {:.3}) (adjusted by {})",
                x, y, heading_rad,
                1.0 / factor
            );
        }

        Ok(pose)
    }

    /// Get the latest pose, forcing a read from the drive base if the cached odometry is older
    /// than the maximum data age.
    pub fn get_position(&self, now: Instant) -> Result<Pose, PosTrackError> {
        let odom = self.cache.odometry();

        let reading = if odom.age(now) > self.max_age() {
            self.refresh(now)?
        } else {
            odom.value
        };

        Ok(self.pose_from(&reading))
    }

    /// Magnitude of the latest reported linear velocity, as the link reports it. The adjustment
    /// factor only applies to positions.
    ///
    /// Units: meters/second
    pub fn current_abs_speed(&self) -> f64 {
        let odom = self.cache.odometry().value;
        odom.vx.hypot(odom.vy)
    }

    /// Magnitude of the latest reported angular velocity.
    ///
    /// Units: radians/second
    pub fn current_abs_omega(&self) -> f64 {
        self.cache.odometry().value.omega.abs()
    }

    /// The pose established by the last call to `analyze`.
    pub fn cycle_pose(&self) -> Pose {
        self.cycle_pose
    }

    fn max_age(&self) -> Duration {
        Duration::from_millis(self.params.data_max_age_ms)
    }

    /// Read the odometry from the link and store it in the cache.
    fn refresh(&self, now: Instant) -> Result<OdomReading, PosTrackError> {
        let reading = self.link.odometry()?;
        self.cache.set_odometry(reading, now);
        Ok(reading)
    }

    fn pose_from(&self, reading: &OdomReading) -> Pose {
        Pose::new(
            reading.x * self.params.adjustment_factor,
            reading.y * self.params.adjustment_factor,
            reading.phi,
        )
    }
}

impl<'a> State<CycleCtx<'a>> for PosTrack {
    type ProcError = PosTrackError;

    /// Establish the pose for this cycle from the snapshot, refreshing stale odometry.
    fn analyze(&mut self, ctx: &CycleCtx<'a>) -> Result<(), Self::ProcError> {
        let odom = &ctx.snapshot.odometry;

        let reading = if odom.age(ctx.now) > self.max_age() {
            debug!("Odometry is {:?} old, refreshing", odom.age(ctx.now));
            self.refresh(ctx.now)?
        } else {
            odom.value
        };

        self.cycle_pose = self.pose_from(&reading);

        Ok(())
    }

    /// Position tracking has no outputs.
    fn apply(&mut self, _ctx: &CycleCtx<'a>) -> Result<(), Self::ProcError> {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::eqpt::sim::SimLink;
    use std::f64::consts::PI;

    fn setup(factor: f64) -> (Arc<SimLink>, Arc<SensorCache>, PosTrack) {
        let sim = Arc::new(SimLink::manual());
        sim.connect("sim").unwrap();
        let cache = Arc::new(SensorCache::new());
        let pos_track = PosTrack::new(
            sim.clone(),
            cache.clone(),
            Params {
                adjustment_factor: factor,
                ..Default::default()
            },
        )
        .unwrap();
        (sim, cache, pos_track)
    }

    #[test]
    fn test_set_applies_factor() {
        let (sim, cache, pos_track) = setup(2.0);

        let pose = pos_track.set(1.0, -2.0, 0.5).unwrap();
        assert!((pose.x() - 1.0).abs() < 1e-9);
        assert!((pose.y() + 2.0).abs() < 1e-9);

        let raw = sim.odometry().unwrap();
        assert!((raw.x - 0.5).abs() < 1e-9);
        assert!((raw.y + 1.0).abs() < 1e-9);

        // The read back value is cached
        assert_eq!(cache.odometry().value, raw);
    }

    #[test]
    fn test_heading_wrapped() {
        let (_, _, pos_track) = setup(1.0);

        let pose = pos_track.set(0.0, 0.0, 3.0 * PI / 2.0).unwrap();
        assert!((pose.heading_rad + PI / 2.0).abs() < 1e-9);
        assert!(pose.heading_rad > -PI && pose.heading_rad <= PI);
    }

    #[test]
    fn test_get_position_refreshes_stale() {
        let (sim, cache, pos_track) = setup(1.0);
        let now = Instant::now();

        // Nothing cached, forces a read
        sim.set_odometry(0.3, 0.0, 0.0).unwrap();
        assert!((pos_track.get_position(now).unwrap().x() - 0.3).abs() < 1e-9);
        assert_eq!(cache.odometry().seq, 1);

        // Fresh cache is used as is
        sim.set_odometry(0.6, 0.0, 0.0).unwrap();
        assert!((pos_track.get_position(now).unwrap().x() - 0.3).abs() < 1e-9);

        // Stale cache is refreshed
        let later = now + Duration::from_millis(250);
        assert!((pos_track.get_position(later).unwrap().x() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_speeds() {
        let (_, cache, pos_track) = setup(1.0);
        cache.set_odometry(
            OdomReading {
                vx: 0.3,
                vy: -0.4,
                omega: -0.2,
                ..Default::default()
            },
            Instant::now(),
        );

        assert!((pos_track.current_abs_speed() - 0.5).abs() < 1e-9);
        assert!((pos_track.current_abs_omega() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_speed_ignores_factor() {
        let (_, cache, pos_track) = setup(2.0);
        cache.set_odometry(
            OdomReading {
                x: 1.0,
                vx: 0.3,
                vy: 0.4,
                ..Default::default()
            },
            Instant::now(),
        );

        assert!((pos_track.current_abs_speed() - 0.5).abs() < 1e-9);
        assert!((pos_track.get_position(Instant::now()).unwrap().x() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_factor() {
        let sim = Arc::new(SimLink::manual());
        let cache = Arc::new(SensorCache::new());
        assert!(PosTrack::new(
            sim,
            cache,
            Params {
                adjustment_factor: 0.0,
                ..Default::default()
            }
        )
        .is_err());
    }
}
