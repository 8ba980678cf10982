//! # Sensor Bridge
//!
//! Reads the stream of the external 3D coordinate sensor on a background thread and publishes
//! the remapped coordinates into a [`Mailbox`].
//!
//! The sensor sends millimeters in its own frame (x right, y up, z away from the sensor). The
//! published samples are in meters in the robot frame (x forward, y left, z up), with the sensor's
//! height added to z.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod reader;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{error, info, warn};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

// Internal
use crate::shared::Mailbox;
pub use params::*;
pub use reader::{remap, Averager};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Cloneable view of a sensor bridge, given to the modules consuming its samples.
#[derive(Debug, Clone, Default)]
pub struct SensorHandle {
    mailbox: Arc<Mailbox>,
    running: Arc<AtomicBool>,
}

/// The sensor bridge, owning the reader thread. The thread is stopped when the bridge is dropped.
pub struct SensorBridge {
    handle: SensorHandle,

    /// Sensor height, as `f64` bits
    height: Arc<AtomicU64>,
    min_height_m: f64,

    bg_jh: Option<JoinHandle<()>>,
    bg_run: Arc<AtomicBool>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SensorBridgeError {
    #[error("Could not connect to the sensor at {0}: {1}")]
    Connect(String, std::io::Error),

    #[error("The sensor address {0} could not be resolved")]
    Unresolved(String),

    #[error("Lost the connection to the sensor: {0}")]
    Disconnected(std::io::Error),

    #[error("The sensor closed the connection")]
    Closed,

    #[error("Cannot set the sensor height to {0} m, it must be above {1} m")]
    InvalidHeight(f64, f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SensorHandle {
    /// A handle to a sensor which is not running.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// True while the reader thread is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }
}

impl SensorBridge {
    /// Start reading from the sensor at `address` (`host:port`).
    ///
    /// The bridge is running until it is stopped or gives up connecting.
    pub fn start(address: &str, params: Params) -> Self {
        let handle = SensorHandle::new();
        handle.set_running(true);

        let height = Arc::new(AtomicU64::new(params.height_m.to_bits()));
        let min_height_m = params.min_height_m;

        let bg_run = Arc::new(AtomicBool::new(true));

        let ctx = reader::ReaderCtx {
            address: address.into(),
            params,
            handle: handle.clone(),
            height: height.clone(),
            run: bg_run.clone(),
        };

        let bg_jh = Some(thread::spawn(move || reader::bg_thread(ctx)));

        info!("SensorBridge started for {}", address);

        Self {
            handle,
            height,
            min_height_m,
            bg_jh,
            bg_run,
        }
    }

    pub fn handle(&self) -> SensorHandle {
        self.handle.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    /// Current sensor height.
    ///
    /// Units: meters
    pub fn height(&self) -> f64 {
        f64::from_bits(self.height.load(Ordering::Acquire))
    }

    /// Set the height of the sensor above the floor, applied to every following sample.
    pub fn set_height(&self, height_m: f64) -> Result<(), SensorBridgeError> {
        if !(height_m > self.min_height_m) {
            warn!(
                "Could not set the sensor height to {} m, it must be above {} m",
                height_m, self.min_height_m
            );
            return Err(SensorBridgeError::InvalidHeight(height_m, self.min_height_m));
        }

        self.height.store(height_m.to_bits(), Ordering::Release);
        info!("Sensor height set to {} m", height_m);
        Ok(())
    }

    /// Stop the reader thread and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.bg_run.store(false, Ordering::Release);

        if let Some(jh) = self.bg_jh.take() {
            if jh.join().is_err() {
                error!("SensorBridge thread panicked");
            }
            info!("SensorBridge stopped");
        }

        self.handle.set_running(false);
    }
}

impl Drop for SensorBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::{
        io::Write,
        net::TcpListener,
        time::{Duration, Instant},
    };

    fn fast_params() -> Params {
        Params {
            reconnect_delay_ms: 10,
            connect_timeout_ms: 200,
            read_timeout_ms: 10,
            ..Default::default()
        }
    }

    /// Wait until `cond` holds, failing the test after two seconds.
    fn wait_for<F: Fn() -> bool>(cond: F) {
        let start = Instant::now();
        while !cond() {
            assert!(start.elapsed() < Duration::from_secs(2), "timed out");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_publishes_remapped_sample() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"0,0,0.05\n250,100,1500\n").unwrap();
            thread::sleep(Duration::from_millis(200));
        });

        let bridge = SensorBridge::start(
            &addr,
            Params {
                height_m: 0.3,
                ..fast_params()
            },
        );
        let handle = bridge.handle();

        wait_for(|| handle.mailbox().is_updated());
        let sample = handle.mailbox().take().unwrap();

        // The null reading is dropped, only the second line is published
        assert!((sample.x - 1.4).abs() < 1e-9);
        assert!((sample.y + 0.25).abs() < 1e-9);
        assert!((sample.z - 0.4).abs() < 1e-9);

        server.join().unwrap();
        bridge.stop();
        assert!(!handle.is_running());
    }

    #[test]
    fn test_click_keeps_coordinate() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"0,0,1000\n").unwrap();
            rx.recv().unwrap();
            stream.write_all(b"Click\n").unwrap();
            thread::sleep(Duration::from_millis(200));
        });

        let bridge = SensorBridge::start(&addr, fast_params());
        let handle = bridge.handle();

        wait_for(|| handle.mailbox().is_updated());
        let before = handle.mailbox().take().unwrap();
        assert_eq!(before.last_click, None);

        tx.send(()).unwrap();
        wait_for(|| handle.mailbox().click_age(Instant::now()).is_some());

        let after = handle.mailbox().latest().unwrap();
        assert_eq!((after.x, after.y, after.z), (before.x, before.y, before.z));
        assert_eq!(after.captured, before.captured);
        assert!(!handle.mailbox().is_updated());

        server.join().unwrap();
    }

    #[test]
    fn test_gives_up_after_connect_failures() {
        // Bind then drop to get a port nobody listens on
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().to_string()
        };

        let bridge = SensorBridge::start(
            &addr,
            Params {
                max_connect_failures: 3,
                ..fast_params()
            },
        );

        let handle = bridge.handle();
        wait_for(|| !handle.is_running());
        assert!(!bridge.is_running());
    }

    #[test]
    fn test_reconnects_after_loss() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = thread::spawn(move || {
            // First connection drops after one sample
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"0,0,1000\n").unwrap();
            drop(stream);

            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"0,0,2000\n").unwrap();
            thread::sleep(Duration::from_millis(200));
        });

        let bridge = SensorBridge::start(&addr, fast_params());
        let handle = bridge.handle();

        wait_for(|| {
            handle
                .mailbox()
                .latest()
                .map_or(false, |s| (s.x - 1.9).abs() < 1e-9)
        });
        assert!(bridge.is_running());

        server.join().unwrap();
        bridge.stop();
    }

    #[test]
    fn test_height_rejected() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let bridge = SensorBridge::start(&addr, fast_params());

        assert!(matches!(
            bridge.set_height(0.05),
            Err(SensorBridgeError::InvalidHeight(_, _))
        ));
        assert!(bridge.set_height(-1.0).is_err());
        assert_eq!(bridge.height(), 0.05);

        bridge.set_height(0.8).unwrap();
        assert_eq!(bridge.height(), 0.8);
    }
}
