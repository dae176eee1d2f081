use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use article_harvester::api::{self, AppState};
use article_harvester::browser::engine_from_settings;
use article_harvester::config::{EngineKind, ServiceConfig};
use article_harvester::scraper::WebScraper;

#[derive(Parser, Debug)]
#[command(name = "article-harvester", version, about = "Article extraction service for JavaScript-rendered index pages")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "SCRAPER_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind, overrides the config file
    #[arg(long, env = "HOST")]
    host: Option<String>,

    /// Port to bind, overrides the config file
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Use plain HTTP fetches instead of Chrome
    #[arg(long)]
    no_browser: bool,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let args = Args::parse();
    let mut config = ServiceConfig::load_or_default(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.no_browser {
        config.browser.engine = EngineKind::Http;
    }

    let engine = engine_from_settings(&config.browser)?;
    let host = config.server.host.clone();
    let port = config.server.port;

    log::info!("🚀 Starting article harvester v{}", env!("CARGO_PKG_VERSION"));
    log::info!("🧭 Rendering engine: {}", engine.name());
    log::info!("🌐 Server running at http://{}:{}", host, port);
    log::info!("📖 Health check at http://{}:{}/api/health", host, port);

    let state = web::Data::new(AppState {
        scraper: Arc::new(WebScraper::new(engine, config)),
    });

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .wrap(cors)
            .configure(api::configure)
    })
    .bind((host.as_str(), port))
    .with_context(|| format!("Failed to bind {}:{}", host, port))?
    .run()
    .await
    .context("Server terminated with an error")
}
