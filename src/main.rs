use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use std::io;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ocp_checklist_server::{routes, storage::Storage};

#[actix_web::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(3000);
    let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| String::from("./data"));
    let uploads_dir = std::env::var("UPLOADS_DIR").unwrap_or_else(|_| String::from("./uploads"));

    let storage = web::Data::new(Storage::create(data_dir.into(), uploads_dir.into())?);
    info!(
        data_dir = %storage.data_dir.display(),
        uploads_dir = %storage.uploads_dir.display(),
        port,
        "OCP Checklist API en cours de démarrage"
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(storage.clone())
            .app_data(web::JsonConfig::default().limit(50 * 1024 * 1024))
            .configure(routes::configure)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
