use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;

mod agents;
mod arguments;
mod config;
mod controllers;
mod error;
mod format;
mod http;
mod llm;
mod mcp;
mod sse;

use config::Config;

pub struct AppState {
    pub config: Config,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    let port = config.port;

    if config.openai_api_key.is_none() {
        log::warn!("OPENAI_API_KEY is not set; chat requests will fail until it is configured");
    }
    log::info!("Tool host endpoint: {}", config.local_mcp_endpoint);
    log::info!("Default paths: {:?}", config.default_paths);
    log::info!("Starting local-mcp-bridge on port {}", port);

    HttpServer::new(move || {
        let cors = match config.front_origin.as_deref() {
            Some(origin) => Cors::default()
                .allowed_origin(origin)
                .allow_any_method()
                .allow_any_header()
                .max_age(3600),
            None => Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600),
        };

        App::new()
            .app_data(web::Data::new(AppState {
                config: config.clone(),
            }))
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::health::config)
            .configure(controllers::chat::config)
            .configure(controllers::query::config)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
