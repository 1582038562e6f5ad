mod app;
mod arrow;
mod composite;
mod config;
mod error;
mod geometry;
mod marks;
mod orchestrator;
mod service;
mod worker;

use std::path::PathBuf;
use std::sync::Arc;

use eframe::egui;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use crate::arrow::ArrowStyle;
use crate::config::GeneratorConfig;
use crate::orchestrator::Orchestrator;
use crate::service::GeminiClient;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vantage=info")),
        )
        .init();

    let initial = std::env::args().nth(1).map(PathBuf::from);
    if let Some(path) = &initial {
        if !path.exists() {
            eprintln!("File not found: {}", path.display());
            eprintln!("Usage: vantage [map.png|jpg|webp]");
            std::process::exit(1);
        }
    }

    let config = GeneratorConfig::from_env();
    if config.api_key.is_none() {
        warn!("config: no API key set, generation will fail until one is provided");
    }

    let generator = match GeminiClient::new(&config) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(error = %e, "service: cannot build client");
            std::process::exit(1);
        }
    };
    let orchestrator = Orchestrator::new(
        ArrowStyle::default(),
        config.export_format,
        config.prompt.clone(),
    );

    let title = match &initial {
        Some(path) => format!(
            "vantage — {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        ),
        None => "vantage".to_string(),
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_min_inner_size([480.0, 360.0])
            .with_drag_and_drop(true)
            .with_title(&title),
        ..Default::default()
    };

    let result = eframe::run_native(
        &title,
        options,
        Box::new(move |cc| {
            Ok(Box::new(app::VantageApp::new(
                cc,
                orchestrator,
                generator,
                initial,
            )))
        }),
    );
    if let Err(e) = result {
        error!(error = %e, "app: window closed with error");
        std::process::exit(1);
    }
}
