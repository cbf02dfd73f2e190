use actix_web::{middleware, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use std::{env, process};
use tracing::info;
use tracing_subscriber::EnvFilter;
use woundrelay::config::{Config, CONFIG_FILE};
use woundrelay::inference::GeminiClient;
use woundrelay::server::{self, Server};

const USAGE: &str = "usage: ./woundrelay [config file]";

fn get_args() -> String {
    let args: Vec<String> = env::args().collect();
    match args.len() {
        1 => CONFIG_FILE.to_string(),
        2 => args[1].clone(),
        _ => {
            println!("{USAGE}");
            process::exit(1);
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();
    let config = Config::load(&get_args())?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("cannot create {}", config.upload_dir.display()))?;

    let api = Arc::new(GeminiClient::new(&config)?);
    info!("relaying to {} (model {})", api.url(), config.model);

    let addr = config.bind_addr();
    let server = Server::new(config, api);

    info!("listening on http://{addr}");
    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .configure(server::configure(server.clone()))
    })
    .bind(addr)?
    .run()
    .await?;

    Ok(())
}
