use actix_multipart::Multipart;
use actix_web::http::header;
use actix_web::{delete, get, post, put, web, HttpResponse};
use chrono::Utc;
use futures::StreamExt;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::error::StoreError;
use crate::export;
use crate::models::photo::{parse_photo_field, PhotoField, PhotoRef, UploadedFile, MAX_FILES_PER_REQUEST};
use crate::models::report::{
    FormData, PhotoMap, Report, ReportDraft, ReportSummary, ReportQuery, Stats,
};
use crate::models::{ApiError, ApiMessage};
use crate::storage::Storage;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedReport {
    pub id: u64,
    pub form_data: FormData,
    pub stats: Stats,
    pub created_at: chrono::DateTime<Utc>,
    pub files_count: u64,
    pub photos_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReportResponse {
    pub success: bool,
    pub message: String,
    pub report_id: u64,
    pub report: SavedReport,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportListResponse {
    pub success: bool,
    pub reports: Vec<ReportSummary>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
}

#[derive(Debug, Serialize)]
pub struct ReportDetailResponse {
    pub success: bool,
    pub report: Report,
}

#[derive(Debug, Serialize)]
pub struct ReportUpdateResponse {
    pub success: bool,
    pub message: String,
    pub report: Report,
}

/// Multipart save: one optional text field `report` carrying the JSON draft,
/// plus any number of photo file fields named `photos[<taskId>][<type>]` (or
/// the hyphenated fallback). Files whose field name decodes to nothing stay
/// on disk and count toward `filesCount` but never enter the photos map.
#[post("/reports/save")]
pub async fn save_report(mut payload: Multipart, storage: web::Data<Storage>) -> HttpResponse {
    let mut draft_bytes: Option<web::BytesMut> = None;
    let mut files: Vec<UploadedFile> = Vec::new();

    while let Some(item) = payload.next().await {
        let mut field = match item {
            Ok(field) => field,
            Err(error) => {
                storage.photos.discard(&files);
                return HttpResponse::BadRequest()
                    .json(ApiError::with_detail("Requête multipart invalide", error));
            }
        };

        let is_file = field.content_disposition().get_filename().is_some();

        if !is_file {
            if field.name() != "report" {
                continue;
            }
            let mut bytes = web::BytesMut::new();
            while let Some(chunk) = field.next().await {
                match chunk {
                    Ok(chunk) => bytes.extend_from_slice(&chunk),
                    Err(error) => {
                        storage.photos.discard(&files);
                        return HttpResponse::BadRequest()
                            .json(ApiError::with_detail("Requête multipart invalide", error));
                    }
                }
            }
            draft_bytes = Some(bytes);
            continue;
        }

        if files.len() >= MAX_FILES_PER_REQUEST {
            storage.photos.discard(&files);
            return HttpResponse::BadRequest()
                .json(ApiError::new("Trop de fichiers (maximum 50 par requête)"));
        }

        match storage.photos.receive(&mut field).await {
            Ok(file) => files.push(file),
            Err(StoreError::Validation(message)) => {
                storage.photos.discard(&files);
                return HttpResponse::BadRequest().json(ApiError::new(&message));
            }
            Err(e) => {
                storage.photos.discard(&files);
                return HttpResponse::InternalServerError().json(ApiError::with_detail(
                    "Erreur lors de la sauvegarde du rapport",
                    e,
                ));
            }
        }
    }

    let draft: ReportDraft = match &draft_bytes {
        Some(bytes) => match serde_json::from_slice(bytes) {
            Ok(draft) => draft,
            Err(error) => {
                storage.photos.discard(&files);
                return HttpResponse::BadRequest()
                    .json(ApiError::with_detail("Données du rapport illisibles", error));
            }
        },
        None => ReportDraft::default(),
    };

    let files_count = files.len() as u64;
    let mut photos = PhotoMap::new();
    for file in files {
        match parse_photo_field(&file.fieldname) {
            PhotoField::Matched { task_id, kind } => {
                photos.entry(task_id).or_default().insert(
                    kind,
                    PhotoRef {
                        path: format!("/api/photos/{}", file.filename),
                        filename: file.filename,
                        originalname: file.originalname,
                        mimetype: file.mimetype,
                        size: file.size,
                        uploaded_at: Utc::now(),
                        fieldname: file.fieldname,
                    },
                );
            }
            PhotoField::Unmatched => {
                debug!(fieldname = %file.fieldname, "champ photo non reconnu, fichier ignoré");
            }
        }
    }

    match storage.reports.append(Report::compose(draft, photos, files_count)) {
        Ok(report) => {
            info!(id = report.id, files = report.files_count, "rapport sauvegardé");
            HttpResponse::Ok().json(SaveReportResponse {
                success: true,
                message: "Rapport sauvegardé avec succès".to_string(),
                report_id: report.id,
                report: SavedReport {
                    id: report.id,
                    photos_count: report.photos_count(),
                    form_data: report.form_data,
                    stats: report.stats,
                    created_at: report.created_at,
                    files_count: report.files_count,
                },
            })
        }
        Err(e) => {
            error!(error = %e, "échec de la sauvegarde du rapport");
            HttpResponse::InternalServerError().json(ApiError::with_detail(
                "Erreur lors de la sauvegarde du rapport",
                e,
            ))
        }
    }
}

#[get("/reports/all")]
pub async fn get_reports(
    query: web::Query<ReportQuery>,
    storage: web::Data<Storage>,
) -> HttpResponse {
    let document = storage.reports.read_all();
    let page = query.run(document.reports);

    HttpResponse::Ok().json(ReportListResponse {
        success: true,
        reports: page.reports.into_iter().map(ReportSummary::from).collect(),
        total: page.total,
        page: page.page,
        limit: page.limit,
        total_pages: page.total_pages,
    })
}

#[get("/reports/{id}")]
pub async fn get_report(id: web::Path<u64>, storage: web::Data<Storage>) -> HttpResponse {
    match storage.reports.find_by_id(id.into_inner()) {
        Some(report) => HttpResponse::Ok().json(ReportDetailResponse {
            success: true,
            report,
        }),
        None => HttpResponse::NotFound().json(ApiError::new("Rapport non trouvé")),
    }
}

#[put("/reports/{id}")]
pub async fn update_report(
    id: web::Path<u64>,
    patch: web::Json<Map<String, Value>>,
    storage: web::Data<Storage>,
) -> HttpResponse {
    match storage.reports.update(id.into_inner(), patch.into_inner()) {
        Ok(report) => HttpResponse::Ok().json(ReportUpdateResponse {
            success: true,
            message: "Rapport mis à jour avec succès".to_string(),
            report,
        }),
        Err(StoreError::NotFound) => {
            HttpResponse::NotFound().json(ApiError::new("Rapport non trouvé"))
        }
        Err(StoreError::Validation(message)) => HttpResponse::BadRequest()
            .json(ApiError::with_detail("Mise à jour invalide", message)),
        Err(e) => HttpResponse::InternalServerError().json(ApiError::with_detail(
            "Erreur lors de la mise à jour du rapport",
            e,
        )),
    }
}

#[delete("/reports/{id}")]
pub async fn delete_report(id: web::Path<u64>, storage: web::Data<Storage>) -> HttpResponse {
    match storage.reports.delete(id.into_inner()) {
        Ok(()) => HttpResponse::Ok().json(ApiMessage::new("Rapport supprimé avec succès")),
        Err(StoreError::NotFound) => {
            HttpResponse::NotFound().json(ApiError::new("Rapport non trouvé"))
        }
        Err(e) => HttpResponse::InternalServerError().json(ApiError::with_detail(
            "Erreur lors de la suppression du rapport",
            e,
        )),
    }
}

#[get("/reports/export/csv")]
pub async fn export_reports_csv(storage: web::Data<Storage>) -> HttpResponse {
    let document = storage.reports.read_all();
    let csv = export::all_reports_csv(&document.reports);
    let filename = format!("rapports_ocp_{}.csv", Utc::now().format("%Y-%m-%d"));

    HttpResponse::Ok()
        .content_type("text/csv")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ))
        .body(csv)
}

#[get("/reports/{id}/export/csv")]
pub async fn export_report_csv(id: web::Path<u64>, storage: web::Data<Storage>) -> HttpResponse {
    let report = match storage.reports.find_by_id(id.into_inner()) {
        Some(report) => report,
        None => return HttpResponse::NotFound().json(ApiError::new("Rapport non trouvé")),
    };

    let csv = export::report_tasks_csv(&report);
    let filename = format!(
        "checklist_{}_{}.csv",
        report.form_data.date.as_deref().unwrap_or(""),
        report.form_data.hall.as_deref().unwrap_or("")
    );

    HttpResponse::Ok()
        .content_type("text/csv")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ))
        .body(csv)
}
