use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use hivemind::analysis::AnalysisClient;
use hivemind::api::{self, AppContext};
use hivemind::config::Config;
use hivemind::session::{PushedFrameCapture, RandomTelemetry, SessionController};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let config = Config::from_env();
    if let Err(e) = config.session.validate() {
        tracing::error!(error = %e, "Refusing to start");
        std::process::exit(1);
    }

    let analysis = match AnalysisClient::new(config.analysis.clone()) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize analysis client");
            std::process::exit(1);
        }
    };
    tracing::info!(url = %analysis.url(), "Attentiveness analysis configured");

    let frames = PushedFrameCapture::new(config.session.capture_enabled);
    let controller = Arc::new(SessionController::new(
        config.session.clone(),
        Arc::new(RandomTelemetry),
        Arc::new(analysis),
        Arc::new(frames.clone()),
    ));

    let routes = api::routes(AppContext {
        controller,
        frames,
        analysis_url: config.analysis.url.clone(),
    });

    let addr = config.bind_address();
    tracing::info!(host = ?addr.0, port = addr.1, "HiveMind server listening");

    warp::serve(routes)
        .run(addr)
        .await;
}
