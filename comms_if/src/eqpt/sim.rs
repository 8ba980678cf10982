//! # Simulated hardware link
//!
//! A stand-in for the vendor link used by the demo executable and by tests. The drive base is
//! modelled as an ideal holonomic platform integrating the commanded velocity, and each bellow's
//! pressure follows its command with a first-order lag. String pots track the arm bellow
//! pressures.
//!
//! Tests can inject events and inspect the last commands sent to the link.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use log::{debug, info};
use serde::Deserialize;

use super::{
    HardwareLink, HwEvent, LinkError, OdomReading, NUM_ARM_BELLOWS, NUM_BELLOWS,
    NUM_SEGMENT_BELLOWS, NUM_STRING_POTS,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Smallest change in a simulated value which is reported as an event.
const REPORT_EPSILON: f64 = 1e-6;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of the simulated link.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimParams {
    /// Time constant of the bellow pressure response.
    ///
    /// Units: seconds
    pub pressure_time_const_s: f64,

    /// String pot reading per bar of bellow pressure.
    pub pot_gain: f64,

    /// Pressure per meter of tip displacement used by the inverse kinematics.
    ///
    /// Units: bar/meter
    pub ik_gain: f64,

    /// If true the simulation advances with wall clock time whenever events are processed,
    /// otherwise only [`SimLink::step`] advances it.
    pub realtime: bool,
}

/// Simulated hardware link.
pub struct SimLink {
    params: SimParams,
    inner: Mutex<SimLinkInner>,
}

struct SimLinkInner {
    connected: bool,
    fail_connect: bool,
    last_step: Option<Instant>,

    events: VecDeque<HwEvent>,

    velocity: (f64, f64, f64),
    odom: OdomReading,

    pressure_cmd: [f64; NUM_BELLOWS],
    pressures: [f64; NUM_BELLOWS],
    string_pots: [f64; NUM_STRING_POTS],
    foil_pot: f64,

    bumper: bool,
    pressure_sensor: bool,
    compressor: bool,
    drain_valve: bool,
    gripper_valve1: bool,
    gripper_valve2: bool,

    num_velocity_cmds: u64,
}

/// Snapshot of the pneumatic commands last sent to the simulated link.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct SimPneumatics {
    pub pressure_cmd: [f64; NUM_BELLOWS],
    pub compressor: bool,
    pub drain_valve: bool,
    pub gripper_valve1: bool,
    pub gripper_valve2: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for SimParams {
    fn default() -> Self {
        Self {
            pressure_time_const_s: 0.2,
            pot_gain: 0.02,
            ik_gain: 5.0,
            realtime: true,
        }
    }
}

impl SimLink {
    /// Create a new simulated link, which must still be connected.
    pub fn new(params: SimParams) -> Self {
        Self {
            params,
            inner: Mutex::new(SimLinkInner {
                connected: false,
                fail_connect: false,
                last_step: None,
                events: VecDeque::new(),
                velocity: (0.0, 0.0, 0.0),
                odom: OdomReading::default(),
                pressure_cmd: [0.0; NUM_BELLOWS],
                pressures: [0.0; NUM_BELLOWS],
                string_pots: [0.0; NUM_STRING_POTS],
                foil_pot: 0.0,
                bumper: false,
                pressure_sensor: false,
                compressor: false,
                drain_valve: false,
                gripper_valve1: false,
                gripper_valve2: false,
                num_velocity_cmds: 0,
            }),
        }
    }

    /// Create a simulated link which only advances when stepped explicitly.
    pub fn manual() -> Self {
        Self::new(SimParams {
            realtime: false,
            ..Default::default()
        })
    }

    /// Make subsequent connection attempts fail.
    pub fn set_fail_connect(&self, fail: bool) {
        self.lock().fail_connect = fail;
    }

    /// Queue an event to be delivered on the next call to `process_events`.
    pub fn inject(&self, event: HwEvent) {
        self.lock().events.push_back(event);
    }

    /// Set the bumper state, queuing the matching event.
    pub fn set_bumper(&self, contact: bool) {
        let mut inner = self.lock();
        inner.bumper = contact;
        inner.events.push_back(HwEvent::BumperChanged(contact));
    }

    /// The last velocity commanded, as `(vx, vy, omega)`.
    pub fn last_velocity(&self) -> (f64, f64, f64) {
        self.lock().velocity
    }

    /// Number of velocity commands received since creation.
    pub fn num_velocity_cmds(&self) -> u64 {
        self.lock().num_velocity_cmds
    }

    /// The pneumatic commands last received.
    pub fn pneumatics(&self) -> SimPneumatics {
        let inner = self.lock();
        SimPneumatics {
            pressure_cmd: inner.pressure_cmd,
            compressor: inner.compressor,
            drain_valve: inner.drain_valve,
            gripper_valve1: inner.gripper_valve1,
            gripper_valve2: inner.gripper_valve2,
        }
    }

    /// Advance the simulation by `dt_s` seconds, queuing events for every changed value.
    pub fn step(&self, dt_s: f64) {
        let mut inner = self.lock();
        Self::step_inner(&self.params, &mut inner, dt_s);
    }

    fn step_inner(params: &SimParams, inner: &mut SimLinkInner, dt_s: f64) {
        if !inner.connected || dt_s <= 0.0 {
            return;
        }

        // ---- DRIVE BASE ----

        let (vx, vy, omega) = inner.velocity;
        if vx != 0.0 || vy != 0.0 || omega != 0.0 || inner.odom.vx != 0.0
            || inner.odom.vy != 0.0 || inner.odom.omega != 0.0
        {
            let (sin, cos) = inner.odom.phi.sin_cos();
            inner.odom.x += (vx * cos - vy * sin) * dt_s;
            inner.odom.y += (vx * sin + vy * cos) * dt_s;
            let phi = inner.odom.phi + omega * dt_s;
            inner.odom.phi = phi.sin().atan2(phi.cos());
            inner.odom.vx = vx;
            inner.odom.vy = vy;
            inner.odom.omega = omega;

            let odom = inner.odom;
            inner.events.push_back(HwEvent::OdometryChanged(odom));
        }

        // ---- PNEUMATICS ----

        let alpha = dt_s / (params.pressure_time_const_s + dt_s);
        let mut pressures_changed = false;
        for i in 0..NUM_BELLOWS {
            let delta = (inner.pressure_cmd[i] - inner.pressures[i]) * alpha;
            if delta.abs() > REPORT_EPSILON {
                inner.pressures[i] += delta;
                pressures_changed = true;
            }
        }

        if pressures_changed {
            let pressures = inner.pressures;
            inner.events.push_back(HwEvent::PressuresChanged(pressures));

            let mut pots = [0.0; NUM_STRING_POTS];
            for i in 0..NUM_ARM_BELLOWS.min(NUM_STRING_POTS) {
                pots[i] = pressures[i] * params.pot_gain;
            }
            inner.string_pots = pots;
            inner.events.push_back(HwEvent::StringPotsChanged(pots));
        }

        let sensor = inner.compressor;
        if sensor != inner.pressure_sensor {
            inner.pressure_sensor = sensor;
            inner.events.push_back(HwEvent::PressureSensorChanged(sensor));
        }
    }

    fn lock(&self) -> MutexGuard<SimLinkInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_connected(&self) -> Result<MutexGuard<SimLinkInner>, LinkError> {
        let inner = self.lock();
        if inner.connected {
            Ok(inner)
        } else {
            Err(LinkError::NotConnected)
        }
    }
}

impl Default for SimLink {
    fn default() -> Self {
        Self::new(SimParams::default())
    }
}

impl HardwareLink for SimLink {
    fn connect(&self, address: &str) -> Result<(), LinkError> {
        let mut inner = self.lock();

        if inner.fail_connect {
            return Err(LinkError::ConnectFailed(
                address.into(),
                "simulated connection failure".into(),
            ));
        }

        inner.connected = true;
        inner.last_step = None;
        inner.events.push_back(HwEvent::Connected);
        inner.events.push_back(HwEvent::Log(format!("Simulated link connected to {}", address)));

        let odom = inner.odom;
        let bumper = inner.bumper;
        inner.events.push_back(HwEvent::OdometryChanged(odom));
        inner.events.push_back(HwEvent::BumperChanged(bumper));

        info!("SimLink connected ({})", address);
        Ok(())
    }

    fn disconnect(&self) {
        let mut inner = self.lock();
        if inner.connected {
            inner.connected = false;
            inner.velocity = (0.0, 0.0, 0.0);
            inner.events.push_back(HwEvent::ConnectionClosed);
            info!("SimLink disconnected");
        }
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    fn process_events(&self) -> Vec<HwEvent> {
        let mut inner = self.lock();

        if self.params.realtime {
            let now = Instant::now();
            if let Some(last) = inner.last_step {
                let dt_s = now.saturating_duration_since(last).as_secs_f64();
                Self::step_inner(&self.params, &mut inner, dt_s);
            }
            inner.last_step = Some(now);
        }

        inner.events.drain(..).collect()
    }

    fn set_velocity(&self, vx: f64, vy: f64, omega: f64) -> Result<(), LinkError> {
        let mut inner = self.lock_connected()?;
        inner.velocity = (vx, vy, omega);
        inner.num_velocity_cmds += 1;
        Ok(())
    }

    fn pressures(&self) -> Result<[f64; NUM_BELLOWS], LinkError> {
        Ok(self.lock_connected()?.pressures)
    }

    fn set_pressures(&self, pressures: &[f64; NUM_BELLOWS]) -> Result<(), LinkError> {
        let mut inner = self.lock_connected()?;
        if pressures.iter().any(|p| !p.is_finite()) {
            return Err(LinkError::CommandRejected(format!(
                "non-finite pressure in {:?}",
                pressures
            )));
        }
        inner.pressure_cmd = *pressures;
        Ok(())
    }

    fn string_pots(&self) -> Result<[f64; NUM_STRING_POTS], LinkError> {
        Ok(self.lock_connected()?.string_pots)
    }

    fn foil_pot(&self) -> Result<f64, LinkError> {
        Ok(self.lock_connected()?.foil_pot)
    }

    fn pressure_sensor(&self) -> Result<bool, LinkError> {
        Ok(self.lock_connected()?.pressure_sensor)
    }

    fn odometry(&self) -> Result<OdomReading, LinkError> {
        Ok(self.lock_connected()?.odom)
    }

    fn set_odometry(&self, x: f64, y: f64, phi: f64) -> Result<(), LinkError> {
        let mut inner = self.lock_connected()?;
        inner.odom.x = x;
        inner.odom.y = y;
        inner.odom.phi = phi;
        let odom = inner.odom;
        inner.events.push_back(HwEvent::OdometryChanged(odom));
        debug!("SimLink odometry set to ({:.3}, {:.3}, {:.3})", x, y, phi);
        Ok(())
    }

    fn bumper(&self) -> Result<bool, LinkError> {
        Ok(self.lock_connected()?.bumper)
    }

    fn set_compressor(&self, on: bool) -> Result<(), LinkError> {
        self.lock_connected()?.compressor = on;
        Ok(())
    }

    fn set_drain_valve(&self, open: bool) -> Result<(), LinkError> {
        self.lock_connected()?.drain_valve = open;
        Ok(())
    }

    fn set_gripper_valve1(&self, open: bool) -> Result<(), LinkError> {
        self.lock_connected()?.gripper_valve1 = open;
        Ok(())
    }

    fn set_gripper_valve2(&self, open: bool) -> Result<(), LinkError> {
        self.lock_connected()?.gripper_valve2 = open;
        Ok(())
    }

    fn xy_to_pressure(&self, x: f64, y: f64) -> [f64; NUM_SEGMENT_BELLOWS] {
        // Bellows sit 120 degrees apart, the over bellow pointing along +x. Each bellow inflates
        // in proportion to the displacement away from it.
        let mut out = [0.0; NUM_SEGMENT_BELLOWS];
        let angles = [0.0f64, 2.0 * std::f64::consts::FRAC_PI_3, -2.0 * std::f64::consts::FRAC_PI_3];
        for (p, a) in out.iter_mut().zip(angles.iter()) {
            let (sin, cos) = a.sin_cos();
            *p = (-(x * cos + y * sin) * self.params.ik_gain).max(0.0);
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_commands_require_connection() {
        let link = SimLink::manual();
        assert!(matches!(link.set_velocity(0.1, 0.0, 0.0), Err(LinkError::NotConnected)));

        link.set_fail_connect(true);
        assert!(matches!(link.connect("sim"), Err(LinkError::ConnectFailed(_, _))));

        link.set_fail_connect(false);
        link.connect("sim").unwrap();
        assert!(link.set_velocity(0.1, 0.0, 0.0).is_ok());
        assert_eq!(link.last_velocity(), (0.1, 0.0, 0.0));

        let events = link.process_events();
        assert_eq!(events[0], HwEvent::Connected);
        assert!(link.process_events().is_empty());
    }

    #[test]
    fn test_drive_integration() {
        let link = SimLink::manual();
        link.connect("sim").unwrap();
        link.set_odometry(0.0, 0.0, std::f64::consts::FRAC_PI_2).unwrap();
        link.set_velocity(1.0, 0.0, 0.0).unwrap();
        link.step(0.5);

        let odom = link.odometry().unwrap();
        assert!(odom.x.abs() < 1e-9);
        assert!((odom.y - 0.5).abs() < 1e-9);
        assert_eq!(odom.vx, 1.0);
    }

    #[test]
    fn test_pressure_lag() {
        let link = SimLink::manual();
        link.connect("sim").unwrap();
        link.process_events();

        let mut cmd = [0.0; NUM_BELLOWS];
        cmd[0] = 1.0;
        link.set_pressures(&cmd).unwrap();
        link.step(0.2);

        let p = link.pressures().unwrap();
        assert!(p[0] > 0.0 && p[0] < 1.0);

        let events = link.process_events();
        assert!(events.iter().any(|e| matches!(e, HwEvent::PressuresChanged(_))));
        assert!(events.iter().any(|e| matches!(e, HwEvent::StringPotsChanged(_))));
    }
}
