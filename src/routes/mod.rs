use actix_web::{get, web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::storage::Storage;

pub mod photo;
pub mod report;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub data_dir: String,
    pub uploads_dir: String,
}

#[get("/health")]
pub async fn health(storage: web::Data<Storage>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "OK".to_string(),
        message: "OCP Checklist API is running".to_string(),
        timestamp: Utc::now(),
        data_dir: storage.data_dir.display().to_string(),
        uploads_dir: storage.uploads_dir.display().to_string(),
    })
}

/// Registers every handler under `/api`. Shared by the binary and the tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(health)
            // Fixed report paths must come before the `{id}` matcher.
            .service(report::get_reports)
            .service(report::export_reports_csv)
            .service(report::export_report_csv)
            .service(report::save_report)
            .service(report::get_report)
            .service(report::update_report)
            .service(report::delete_report)
            .service(photo::list_photos)
            .service(photo::download_photo)
            .service(photo::get_photo)
            .service(photo::delete_photo),
    );
}
