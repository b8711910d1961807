// Web server entry point
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use env_logger::Env;

use news_classifier::config::ServerConfig;
use news_classifier::models::{select_device, MultimodalModel};
use news_classifier::{api, AppState};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let config = ServerConfig::parse();

    // The server does not start unless the model loads.
    let checkpoint = config.checkpoint()?;
    let device = select_device(config.cpu)?;
    let model = MultimodalModel::load(&checkpoint, &config.encoder_source(), device)
        .context("failed to load model")?;
    let state = web::Data::new(AppState::with_timeout(model, config.image_timeout())?);

    log::info!("listening on {}:{}", config.host, config.port);
    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(api::cors())
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(api::configure)
    });
    if let Some(workers) = config.workers {
        server = server.workers(workers);
    }
    server
        .bind((config.host.as_str(), config.port))?
        .run()
        .await?;
    Ok(())
}
