//! Sensor stream reader thread

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, error, info, warn};
use std::{
    io::{BufRead, BufReader, ErrorKind},
    net::{TcpStream, ToSocketAddrs},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use super::{Params, SensorBridgeError, SensorHandle};
use comms_if::net::{RawPoint, SensorLine, SensorLineError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Everything the reader thread needs.
pub(super) struct ReaderCtx {
    pub address: String,
    pub params: Params,
    pub handle: SensorHandle,
    pub height: Arc<AtomicU64>,
    pub run: Arc<AtomicBool>,
}

/// Accumulates raw samples and yields their mean once enough have been collected.
#[derive(Debug, Clone)]
pub struct Averager {
    sum: RawPoint,
    count: usize,
    target: usize,
}

/// Why a connection stopped being read.
enum StreamEnd {
    /// The bridge was asked to stop.
    Stopped,

    /// The connection dropped.
    Lost(SensorBridgeError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Averager {
    /// Average over `target` samples, at least one.
    pub fn new(target: usize) -> Self {
        Self {
            sum: RawPoint::default(),
            count: 0,
            target: target.max(1),
        }
    }

    /// Add a sample, returning the mean and starting over when the target count is reached.
    pub fn push(&mut self, point: &RawPoint) -> Option<RawPoint> {
        self.sum.x_mm += point.x_mm;
        self.sum.y_mm += point.y_mm;
        self.sum.z_mm += point.z_mm;
        self.count += 1;

        if self.count < self.target {
            return None;
        }

        let n = self.count as f64;
        let mean = RawPoint {
            x_mm: self.sum.x_mm / n,
            y_mm: self.sum.y_mm / n,
            z_mm: self.sum.z_mm / n,
        };
        self.reset();

        Some(mean)
    }

    /// Drop any partial accumulation.
    pub fn reset(&mut self) {
        self.sum = RawPoint::default();
        self.count = 0;
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Convert a raw sensor point into the robot frame, returning `[x, y, z]` in meters.
pub fn remap(point: &RawPoint, height_m: f64, params: &Params) -> [f64; 3] {
    let lateral = if params.invert_lateral { -1.0 } else { 1.0 };

    [
        point.z_mm / 1000.0 + params.depth_offset_m,
        lateral * point.x_mm / 1000.0,
        point.y_mm / 1000.0 + height_m,
    ]
}

/// Feed a raw sample to the averager, returning the mean to publish, if any.
///
/// Both the sample and the mean must reach the noise floor, samples on opposite sides of the
/// sensor can average out to nothing.
pub fn average_sample(
    point: &RawPoint,
    averager: &mut Averager,
    noise_floor_mm: f64,
) -> Option<RawPoint> {
    if point.abs_sum() < noise_floor_mm {
        debug!("Sensor sample {:?} below the noise floor, discarded", point);
        return None;
    }

    let mean = averager.push(point)?;

    if mean.abs_sum() < noise_floor_mm {
        debug!("Averaged sensor sample {:?} below the noise floor, discarded", mean);
        return None;
    }

    Some(mean)
}

pub(super) fn bg_thread(ctx: ReaderCtx) {
    info!("SensorBridge thread started");

    let mut failures = 0u32;

    while ctx.run.load(Ordering::Acquire) {
        let stream = match connect(&ctx.address, &ctx.params) {
            Ok(s) => s,
            Err(e) => {
                failures += 1;
                warn!(
                    "Sensor connection attempt {}/{} failed: {}",
                    failures, ctx.params.max_connect_failures, e
                );

                if failures >= ctx.params.max_connect_failures {
                    error!("Could not connect to the sensor, giving up");
                    break;
                }

                sleep_while_running(&ctx.run, ctx.params.reconnect_delay_ms);
                continue;
            }
        };

        info!("Connected to the sensor at {}", ctx.address);

        match read_stream(stream, &ctx, &mut failures) {
            StreamEnd::Stopped => break,
            StreamEnd::Lost(e) => {
                warn!("{}, reconnecting", e);
                sleep_while_running(&ctx.run, ctx.params.reconnect_delay_ms);
            }
        }
    }

    ctx.handle.set_running(false);
    info!("SensorBridge thread exited");
}

fn connect(address: &str, params: &Params) -> Result<TcpStream, SensorBridgeError> {
    let addrs = address
        .to_socket_addrs()
        .map_err(|e| SensorBridgeError::Connect(address.into(), e))?;

    let timeout = Duration::from_millis(params.connect_timeout_ms);
    let mut last_err = None;

    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(s) => {
                s.set_read_timeout(Some(Duration::from_millis(params.read_timeout_ms.max(1))))
                    .map_err(|e| SensorBridgeError::Connect(address.into(), e))?;
                return Ok(s);
            }
            Err(e) => last_err = Some(e),
        }
    }

    Err(match last_err {
        Some(e) => SensorBridgeError::Connect(address.into(), e),
        None => SensorBridgeError::Unresolved(address.into()),
    })
}

/// Read lines until the connection drops or the bridge is stopped.
///
/// Every line read resets the consecutive failure count.
fn read_stream(stream: TcpStream, ctx: &ReaderCtx, failures: &mut u32) -> StreamEnd {
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    let mut averager = Averager::new(ctx.params.average);

    loop {
        if !ctx.run.load(Ordering::Acquire) {
            return StreamEnd::Stopped;
        }

        match reader.read_until(b'\n', &mut line) {
            Ok(0) => return StreamEnd::Lost(SensorBridgeError::Closed),
            Ok(_) => {
                // A timeout may have split the line, wait for the rest
                if line.last() != Some(&b'\n') {
                    continue;
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                continue
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return StreamEnd::Lost(SensorBridgeError::Disconnected(e)),
        }

        *failures = 0;

        let text = String::from_utf8_lossy(&line).into_owned();
        line.clear();

        handle_line(&text, ctx, &mut averager);
    }
}

fn handle_line(text: &str, ctx: &ReaderCtx, averager: &mut Averager) {
    let now = Instant::now();

    match SensorLine::parse(text, &ctx.params.click_token) {
        Ok(SensorLine::Click) => {
            debug!("Sensor click");
            ctx.handle.mailbox().post_click(now);
        }
        Ok(SensorLine::Point(point)) => {
            if let Some(mean) = average_sample(&point, averager, ctx.params.noise_floor_mm) {
                let height = f64::from_bits(ctx.height.load(Ordering::Acquire));
                let [x, y, z] = remap(&mean, height, &ctx.params);
                ctx.handle.mailbox().post_coordinate(x, y, z, now);
            }
        }
        Err(SensorLineError::Empty) => (),
        Err(e) => warn!("Discarded sensor line: {}", e),
    }
}

/// Sleep for up to `ms` milliseconds, returning early once the run flag is cleared.
fn sleep_while_running(run: &AtomicBool, ms: u64) {
    let deadline = Instant::now() + Duration::from_millis(ms);

    while run.load(Ordering::Acquire) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep((deadline - now).min(Duration::from_millis(10)));
    }
}
