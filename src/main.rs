//! Pothole Watch: live MJPEG pothole detection with an SDL2 preview

use std::path::PathBuf;

use color_eyre::{eyre::eyre, Result};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use pothole_watch::capture;
use pothole_watch::display::Sdl2Display;
use pothole_watch::inference::OnnxClassifier;
use pothole_watch::{Config, Session, StopSignal};

const DEFAULT_CONFIG: &str = "pothole.toml";

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pothole_watch=info"));
    let registry = tracing_subscriber::registry().with(filter).with(
        tracing_subscriber::fmt::layer().with_timer(tracing_subscriber::fmt::time::uptime()),
    );

    #[cfg(feature = "profiling")]
    let registry = registry.with(tracing_tracy::TracyLayer::default());

    registry.init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    init_tracing();

    info!("Pothole Watch launching...");

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = Config::load(&config_path)?;
    info!(
        "Configuration: endpoint={} model={} skip_interval={} threshold={}",
        config.stream.endpoint,
        config.model.path.display(),
        config.scheduler.skip_interval,
        config.scheduler.confidence_threshold
    );

    // Fatal startup steps: model first, then the stream
    let classifier = OnnxClassifier::load(&config.model)?;
    let source = capture::open_source(&config.stream)?;

    let stop = StopSignal::new();
    let interrupt = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Application interrupted by user");
            interrupt.trigger();
        }
    });

    // SDL must live on the main thread, so the session blocks it
    let summary = tokio::task::block_in_place(|| {
        let sdl_context = sdl2::init().map_err(|e| eyre!(e))?;
        let display = Sdl2Display::new(&sdl_context, &config.display)?;
        let mut session = Session::new(&config.scheduler, source, classifier, display);
        Ok::<_, color_eyre::Report>(session.run(&stop)?)
    })?;

    info!(
        reason = ?summary.reason,
        frames = summary.stats.frames_displayed,
        inferences = summary.stats.inferences,
        "Stream closed and application terminated."
    );
    Ok(())
}
