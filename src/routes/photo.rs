use actix_web::http::header;
use actix_web::{delete, get, web, HttpResponse};
use serde::Serialize;

use crate::error::StoreError;
use crate::models::photo::PhotoInfo;
use crate::models::{ApiError, ApiMessage};
use crate::storage::Storage;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoListResponse {
    pub success: bool,
    pub photos: Vec<PhotoInfo>,
    pub count: usize,
    pub total_size: u64,
}

#[get("/photos")]
pub async fn list_photos(storage: web::Data<Storage>) -> HttpResponse {
    match storage.photos.list() {
        Ok(photos) => HttpResponse::Ok().json(PhotoListResponse {
            success: true,
            count: photos.len(),
            total_size: photos.iter().map(|photo| photo.size).sum(),
            photos,
        }),
        Err(e) => HttpResponse::InternalServerError().json(ApiError::with_detail(
            "Erreur lors du listage des photos",
            e,
        )),
    }
}

#[get("/photos/{filename}")]
pub async fn get_photo(filename: web::Path<String>, storage: web::Data<Storage>) -> HttpResponse {
    match storage.photos.read(&filename) {
        Ok((bytes, mime)) => HttpResponse::Ok()
            .content_type(mime)
            .insert_header((header::CACHE_CONTROL, "public, max-age=86400"))
            .body(bytes),
        Err(StoreError::NotFound) => {
            HttpResponse::NotFound().json(ApiError::new("Photo non trouvée"))
        }
        Err(e) => HttpResponse::InternalServerError().json(ApiError::with_detail(
            "Erreur lors du chargement de la photo",
            e,
        )),
    }
}

#[get("/photos/download/{filename}")]
pub async fn download_photo(
    filename: web::Path<String>,
    storage: web::Data<Storage>,
) -> HttpResponse {
    let filename = filename.into_inner();
    match storage.photos.read(&filename) {
        Ok((bytes, mime)) => HttpResponse::Ok()
            .content_type(mime)
            .insert_header((
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ))
            .body(bytes),
        Err(StoreError::NotFound) => {
            HttpResponse::NotFound().json(ApiError::new("Photo non trouvée"))
        }
        Err(e) => HttpResponse::InternalServerError().json(ApiError::with_detail(
            "Erreur lors du téléchargement",
            e,
        )),
    }
}

#[delete("/photos/{filename}")]
pub async fn delete_photo(
    filename: web::Path<String>,
    storage: web::Data<Storage>,
) -> HttpResponse {
    match storage.photos.delete(&filename) {
        Ok(()) => HttpResponse::Ok().json(ApiMessage::new("Photo supprimée avec succès")),
        Err(StoreError::NotFound) => {
            HttpResponse::NotFound().json(ApiError::new("Photo non trouvée"))
        }
        Err(e) => HttpResponse::InternalServerError().json(ApiError::with_detail(
            "Erreur lors de la suppression de la photo",
            e,
        )),
    }
}
