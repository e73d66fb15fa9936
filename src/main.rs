mod app;
mod canvas;
mod chat;
mod config;
mod error;
mod event;
mod lifecycle;
mod list;
mod session;
mod stream;
mod theme;
mod transport;
mod workflow;

use app::ScribeApp;
use config::Settings;
use eframe::egui;
use std::sync::{mpsc, Arc};
use tracing_subscriber::EnvFilter;
use transport::{ChatBackend, EchoBackend};

fn init_tracing(fallback: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("scribe=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut startup_warnings = Vec::new();
    let settings = match Settings::load_from(&Settings::default_path()) {
        Ok(settings) => settings,
        Err(err) => {
            startup_warnings.push(format!("{err}; using default settings"));
            Settings::default()
        }
    };
    init_tracing(&settings.log_filter);
    for warning in &startup_warnings {
        tracing::warn!("{warning}");
    }

    let (tx, rx) = mpsc::channel();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("scribe-runtime")
        .build()?;

    let backend: Arc<dyn ChatBackend> = Arc::new(EchoBackend::new(
        runtime.handle().clone(),
        settings.chat.echo_delay(),
    ));
    tracing::info!(sessions = %settings.sessions_dir().display(), "starting scribe");
    let app = ScribeApp::new(
        rx,
        tx,
        backend,
        runtime.handle().clone(),
        settings,
        startup_warnings,
    );
    let _runtime = runtime;

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_min_inner_size([1024.0, 640.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Scribe",
        native_options,
        Box::new(move |_creation_context| Ok(Box::new(app))),
    )?;

    Ok(())
}
