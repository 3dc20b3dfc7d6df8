use clap::{Parser, Subcommand};
use garage_parking_assistant::api;
use garage_parking_assistant::bus::{self, Telemetry};
use garage_parking_assistant::config::{self, Config};
use garage_parking_assistant::controller::{Bay, ControllerParts, ProcessController};
use garage_parking_assistant::detection::camera::save_frame;
use garage_parking_assistant::detection::{
    CommandCamera, DifferenceClassifier, FrameSource, SharedCamera, VoteCoordinator,
};
use garage_parking_assistant::error::AppError;
use garage_parking_assistant::fusion::Rgb;
use garage_parking_assistant::gateway::Gateway;
use garage_parking_assistant::led::Indicator;
use garage_parking_assistant::led::ws2812::Ws2812Strip;
use garage_parking_assistant::sensor::{self, SensorArray, SensorId};
use std::error::Error;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

const CAPTURE_BRIGHTNESS: u8 = 20;
const CAPTURE_WARMUP: Duration = Duration::from_secs(2);
const CAPTURE_HOLD: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "garage-parking-assistant", version, about = "Garage parking assistant")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the parking assistant (default)
    Run,
    /// Capture the empty-bay reference frame used by obstacle detection
    CaptureBackground {
        /// Where to write the frame; defaults to the configured background path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = config::load_from_path(&cli.config)?;
    init_tracing(&config.logging.level);
    tracing::info!(
        config_path = %cli.config.display(),
        app = %config.app.name,
        "garage-parking-assistant starting"
    );

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::CaptureBackground { output } => {
            let output = output.unwrap_or_else(|| config.background_path().to_path_buf());
            tokio::task::spawn_blocking(move || capture_background(&config, &output))
                .await?
                .map_err(|err| err as Box<dyn Error>)
        }
    }
}

async fn run(config: Config) -> Result<(), Box<dyn Error>> {
    let topics = config.topics();
    let bay = build_bay(&config)?;
    let detection = build_detection(&config)?;

    let settings = config.mqtt();
    let subscriptions: Vec<String> = topics.inbound().iter().map(|t| t.to_string()).collect();
    let (publisher, inbox) =
        tokio::task::spawn_blocking(move || bus::mqtt::connect(&settings, subscriptions)).await??;

    let controller = ProcessController::new(ControllerParts {
        bay,
        detection,
        telemetry: Telemetry::new(Arc::new(publisher.clone()), topics.clone()),
        thresholds: config.thresholds()?,
        timing: config.timing(),
        settings_enabled: config.system_enabled(),
    });

    let stop_flag = Arc::new(AtomicBool::new(false));
    let gateway = Gateway::new(controller.clone(), &topics);
    let _delivery_handle = inbox.spawn_delivery(
        move |topic, payload| gateway.handle(topic, payload),
        Arc::clone(&stop_flag),
    );

    let (fatal_tx, fatal_rx) = oneshot::channel::<AppError>();
    let loop_handle = controller.spawn_loop(Arc::clone(&stop_flag), move |err| {
        let _ = fatal_tx.send(err);
    });

    let fatal = Arc::new(Mutex::new(None));
    let app = api::router(controller.clone());
    let port = config.server_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(fatal_rx, Arc::clone(&fatal)))
        .await?;

    stop_flag.store(true, Ordering::Relaxed);
    if let Err(err) = controller.shutdown() {
        tracing::warn!(error = %err, "Controller shutdown incomplete");
    }
    publisher.disconnect();
    if loop_handle.join().is_err() {
        tracing::error!("Control loop panicked");
    }

    let failure = fatal.lock().map_err(|_| AppError::StateLock)?.take();
    match failure {
        Some(err) => Err(err.into()),
        None => {
            tracing::info!("garage-parking-assistant stopped");
            Ok(())
        }
    }
}

async fn shutdown_signal(fatal_rx: oneshot::Receiver<AppError>, slot: Arc<Mutex<Option<AppError>>>) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => tracing::info!("Shutdown requested"),
            Err(err) => tracing::warn!(error = %err, "Signal handler failed, shutting down"),
        },
        received = fatal_rx => {
            if let Ok(err) = received {
                tracing::error!(error = %err, "Control loop failed, shutting down");
                if let Ok(mut guard) = slot.lock() {
                    *guard = Some(err);
                }
            }
        }
    }
}

/// Sensors, LED strip and the last snapshot. Unconfigured or unbuildable sensors
/// are left out and report as unavailable.
fn build_bay(config: &Config) -> Result<Bay, AppError> {
    let mut sensors = SensorArray::new(config.retry_policy());
    for id in SensorId::ALL {
        let Some(settings) = config.sensor(id) else {
            tracing::warn!(sensor = %id, "Sensor not configured");
            continue;
        };
        match sensor::build_sensor(id, settings) {
            Ok(driver) => sensors = sensors.with_sensor(id, driver),
            Err(err) => tracing::error!(sensor = %id, error = %err, "Sensor driver unavailable"),
        }
    }
    sensors.setup_all()?;

    let strip = Ws2812Strip::new(config.spi_bus(), config.led_layout())?;
    Ok(Bay::new(sensors, Indicator::new(Box::new(strip))))
}

fn build_detection(config: &Config) -> Result<VoteCoordinator, Box<dyn Error>> {
    let backend = CommandCamera::from_command_line(config.camera_command())?;
    tracing::info!(program = backend.program(), "Camera capture command configured");
    let camera = SharedCamera::new(Box::new(backend), config.camera_rotate_180());
    let classifier =
        DifferenceClassifier::from_path(config.background_path(), config.difference_settings());
    Ok(VoteCoordinator::new(
        Arc::new(camera),
        Arc::new(classifier),
        config.vote_settings(),
    ))
}

fn capture_background(config: &Config, output: &Path) -> Result<(), Box<dyn Error + Send + Sync>> {
    let strip = Ws2812Strip::new(config.spi_bus(), config.led_layout())?;
    let mut indicator = Indicator::new(Box::new(strip));
    indicator.fill(Rgb::GREEN, CAPTURE_BRIGHTNESS)?;
    std::thread::sleep(CAPTURE_WARMUP);

    let backend = CommandCamera::from_command_line(config.camera_command())?;
    let camera = SharedCamera::new(Box::new(backend), config.camera_rotate_180());
    let captured = camera.capture().and_then(|frame| save_frame(&frame, output));
    match &captured {
        Ok(()) => tracing::info!(path = %output.display(), "Background frame saved"),
        Err(err) => tracing::error!(error = %err, "Background capture failed"),
    }

    std::thread::sleep(CAPTURE_HOLD);
    indicator.clear()?;
    captured?;
    Ok(())
}
