//! Main brain executable entry point.
//!
//! # Architecture
//!
//! The executable drives the robot through the brain library:
//!
//!     - Connect to the hardware link and initialise all modules
//!     - Optionally enable the external coordinate sensor
//!     - Optionally command a destination
//!     - Run the control loop for the requested duration, reporting the pose each second
//!     - Shut down: control loop, sensor bridge, hardware link, event pump
//!
//! The hardware link is the simulated link from `comms_if`, configured from `sim_link.toml`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{info, warn};
use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};
use structopt::StructOpt;

// Internal
use brain_lib::{brain::Brain, params::BrainParams};
use comms_if::{
    eqpt::sim::{SimLink, SimParams},
    tc::Coordinate,
};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Modules logging for every hardware event or sensor line, held at info unless `-vv` is given.
const NOISY_TARGETS: [(&str, LevelFilter); 2] = [
    ("brain_lib::event_pump", LevelFilter::Info),
    ("brain_lib::sensor_bridge", LevelFilter::Info),
];

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Command line arguments of the brain executable.
#[derive(Debug, StructOpt)]
#[structopt(name = "brain_exec", about = "Robot control core")]
struct Args {
    /// Address of the hardware link.
    #[structopt(long, default_value = "sim")]
    address: String,

    /// Address of the external coordinate sensor, as host:port.
    #[structopt(long)]
    sensor: Option<String>,

    /// Height of the external sensor above the floor in meters.
    #[structopt(long)]
    sensor_height: Option<f64>,

    /// Destination to drive to, written x:y in meters.
    #[structopt(long)]
    goto: Option<Coordinate>,

    /// Time to run the control loop for, in seconds.
    #[structopt(long, default_value = "10")]
    duration_s: f64,

    /// Log at debug level. Given twice, also debug the per-event and per-line modules.
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u8,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let args = Args::from_args();

    // ---- EARLY INITIALISATION ----

    let session = Session::new("brain_exec", "sessions").wrap_err("Failed to create the session")?;

    let level = if args.verbose > 0 {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let overrides: &[(&'static str, LevelFilter)] = if args.verbose > 1 {
        &[]
    } else {
        &NOISY_TARGETS
    };
    logger_init(level, overrides, &session).wrap_err("Failed to initialise logging")?;

    info!("Brain Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let params = BrainParams::load().wrap_err("Could not load the brain parameters")?;
    let sim_params: SimParams =
        util::params::load_or_default("sim_link.toml").wrap_err("Could not load sim params")?;

    // ---- INITIALISE BRAIN ----

    let link = Arc::new(SimLink::new(sim_params));
    let mut brain =
        Brain::new(link, &args.address, params).wrap_err("Failed to initialise the brain")?;

    if let Some(ref address) = args.sensor {
        info!("Enabling the external sensor at {}", address);
        brain.enable_sensor(address);

        if let Some(height_m) = args.sensor_height {
            brain
                .set_sensor_height(height_m)
                .wrap_err("Invalid sensor height")?;
        }
    } else if args.sensor_height.is_some() {
        warn!("--sensor-height given without --sensor, ignored");
    }

    if let Some(dest) = args.goto {
        info!("Driving to {}", dest);
        brain.set_destination(dest.x, dest.y);
        brain.go();
    }

    // ---- MAIN LOOP ----

    brain.start();

    let run_for = Duration::from_secs_f64(args.duration_s.max(0.0));
    let start = Instant::now();

    while start.elapsed() < run_for {
        thread::sleep(Duration::from_secs(1).min(run_for - start.elapsed().min(run_for)));

        match brain.get_position() {
            Ok(pose) => info!(
                "Pose: ({:.3}, {:.3}) m, {:.3} rad, {:?}, speed {:.3} m/s",
                pose.x(),
                pose.y(),
                pose.heading_rad,
                brain.drive_mode(),
                brain.current_abs_speed()
            ),
            Err(e) => warn!("Could not read the pose: {}", e),
        }
    }

    // ---- SHUTDOWN ----

    info!("Ran {} cycles", brain.num_cycles());
    brain.shutdown();

    info!("End of execution");

    Ok(())
}
