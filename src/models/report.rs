use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::StoreError;
use crate::models::photo::PhotoRef;

/// Whole persisted store: `<DATA_DIR>/reports.json`.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDocument {
    pub reports: Vec<Report>,
    pub next_id: u64,
}

impl Default for ReportDocument {
    fn default() -> ReportDocument {
        ReportDocument {
            reports: Vec::new(),
            next_id: 1,
        }
    }
}

/// Free-form header block of the inspection form. Nothing is enforced; any
/// field may be absent and unknown fields are kept as-is.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormData {
    pub hall: Option<String>,
    pub date: Option<String>,
    pub responsible: Option<String>,
    pub staff_count: Option<Value>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Client-computed snapshot, trusted as submitted.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stats {
    pub planning_rate: Option<String>,
    pub tasks_done: Option<u64>,
    pub tasks_planned: Option<u64>,
    pub total_tasks: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One checklist line as snapshotted by the client at save time. Task ids are
/// client-derived (`<hall>-<circuit>-<index>`) and never recomputed here.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Task {
    pub id: Option<String>,
    pub hall: Option<String>,
    pub circuit: Option<String>,
    pub designation: Option<String>,
    pub planned: Option<String>,
    pub status: Option<String>,
    pub photo_before: Option<String>,
    pub photo_after: Option<String>,
    pub comment: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub type PhotoMap = BTreeMap<String, BTreeMap<String, PhotoRef>>;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: u64,
    #[serde(default)]
    pub form_data: FormData,
    #[serde(default)]
    pub checklist_data: Vec<Task>,
    #[serde(default)]
    pub photos: PhotoMap,
    #[serde(default)]
    pub stats: Stats,
    #[serde(default)]
    pub files_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// JSON payload of the multipart `report` field: a report before the server
/// stamps id, photos and timestamps onto it.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportDraft {
    pub form_data: FormData,
    pub checklist_data: Vec<Task>,
    pub stats: Stats,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// Top-level keys the server owns; client copies are discarded so the
// server-set values always win.
const RESERVED_KEYS: [&str; 5] = ["id", "photos", "filesCount", "createdAt", "updatedAt"];

impl Report {
    /// Composes a storable report from a client draft plus the photos map
    /// built from this request's uploads. The id is assigned on append.
    pub fn compose(draft: ReportDraft, photos: PhotoMap, files_count: u64) -> Report {
        let now = Utc::now();
        let mut extra = draft.extra;
        for key in RESERVED_KEYS {
            extra.remove(key);
        }

        Report {
            id: 0,
            form_data: draft.form_data,
            checklist_data: draft.checklist_data,
            photos,
            stats: draft.stats,
            files_count,
            created_at: now,
            updated_at: now,
            extra,
        }
    }

    /// Number of tasks with at least one photo attached.
    pub fn photos_count(&self) -> usize {
        self.photos.len()
    }
}

/// Summary shape returned by the list endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub id: u64,
    pub form_data: FormData,
    pub stats: Stats,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub files_count: u64,
    pub checklist_count: usize,
}

impl From<Report> for ReportSummary {
    fn from(report: Report) -> ReportSummary {
        ReportSummary {
            id: report.id,
            form_data: report.form_data,
            stats: report.stats,
            created_at: report.created_at,
            updated_at: report.updated_at,
            files_count: report.files_count,
            checklist_count: report.checklist_data.len(),
        }
    }
}

fn default_page() -> usize {
    1
}
fn default_limit() -> usize {
    20
}

/// Filter + sort + paginate parameters of the list endpoint. All predicates
/// combine with AND; every query is a linear scan over the full array.
#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
    pub search: Option<String>,
    pub date: Option<String>,
    pub hall: Option<String>,
}

#[derive(Debug)]
pub struct ReportPage {
    pub reports: Vec<Report>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
}

impl ReportQuery {
    pub fn run(&self, reports: Vec<Report>) -> ReportPage {
        let page = self.page.max(1);
        let limit = self.limit.max(1);

        let mut filtered: Vec<Report> = reports
            .into_iter()
            .filter(|report| self.matches(report))
            .collect();

        // Newest first; ties keep insertion order (sort_by is stable).
        filtered.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = filtered.len();
        let total_pages = total.div_ceil(limit);
        let start = (page - 1).saturating_mul(limit).min(total);
        let end = (start + limit).min(total);

        ReportPage {
            reports: filtered.drain(start..end).collect(),
            total,
            page,
            limit,
            total_pages,
        }
    }

    fn matches(&self, report: &Report) -> bool {
        if let Some(search) = &self.search {
            let search = search.to_lowercase();
            let hall_hit = report
                .form_data
                .hall
                .as_deref()
                .is_some_and(|hall| hall.to_lowercase().contains(&search));
            let responsible_hit = report
                .form_data
                .responsible
                .as_deref()
                .is_some_and(|responsible| responsible.to_lowercase().contains(&search));
            if !hall_hit && !responsible_hit {
                return false;
            }
        }
        if let Some(date) = &self.date {
            if report.form_data.date.as_deref() != Some(date.as_str()) {
                return false;
            }
        }
        if let Some(hall) = &self.hall {
            if report.form_data.hall.as_deref() != Some(hall.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Repository over the single JSON document. Every read-modify-write cycle
/// holds the guard so concurrent saves cannot lose updates or hand out the
/// same id twice.
pub struct ReportStore {
    file: PathBuf,
    uploads_dir: PathBuf,
    guard: Mutex<()>,
}

impl ReportStore {
    pub fn new(file: PathBuf, uploads_dir: PathBuf) -> ReportStore {
        ReportStore {
            file,
            uploads_dir,
            guard: Mutex::new(()),
        }
    }

    /// Whole document; a missing or unparsable file yields the empty default
    /// rather than an error.
    pub fn read_all(&self) -> ReportDocument {
        match fs::read(&self.file) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => ReportDocument::default(),
        }
    }

    fn persist(&self, document: &ReportDocument) -> Result<(), StoreError> {
        let file = fs::File::create(&self.file)?;
        serde_json::to_writer_pretty(file, document)?;
        Ok(())
    }

    pub fn find_by_id(&self, id: u64) -> Option<Report> {
        self.read_all().reports.into_iter().find(|r| r.id == id)
    }

    /// Assigns the next id, appends and persists. Returns the stored report.
    pub fn append(&self, mut report: Report) -> Result<Report, StoreError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);

        let mut document = self.read_all();
        report.id = document.next_id;
        document.next_id += 1;
        document.reports.push(report.clone());
        self.persist(&document)?;
        Ok(report)
    }

    /// Shallow-merges arbitrary patch keys over the stored report: each patch
    /// field fully replaces the same-named field, nested objects are not deep
    /// merged. `id` is re-forced and `updatedAt` refreshed server-side; a
    /// patch that breaks the report shape is rejected instead of stored.
    pub fn update(&self, id: u64, patch: Map<String, Value>) -> Result<Report, StoreError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);

        let mut document = self.read_all();
        let report = document
            .reports
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::NotFound)?;

        let mut merged = serde_json::to_value(&*report)?;
        if let Some(fields) = merged.as_object_mut() {
            for (key, value) in patch {
                fields.insert(key, value);
            }
            fields.insert("id".to_string(), Value::from(id));
            fields.insert("updatedAt".to_string(), serde_json::to_value(Utc::now())?);
        }

        *report = serde_json::from_value(merged)
            .map_err(|error| StoreError::Validation(error.to_string()))?;
        let updated = report.clone();
        self.persist(&document)?;
        Ok(updated)
    }

    /// Removes the report and best-effort deletes every backing photo file.
    /// Individual file-delete failures are logged, never surfaced.
    pub fn delete(&self, id: u64) -> Result<(), StoreError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);

        let mut document = self.read_all();
        let position = document
            .reports
            .iter()
            .position(|r| r.id == id)
            .ok_or(StoreError::NotFound)?;
        let report = document.reports.remove(position);

        for photos in report.photos.values() {
            for photo in photos.values() {
                let path = self.uploads_dir.join(&photo.filename);
                if path.is_file() {
                    if let Err(error) = fs::remove_file(&path) {
                        warn!(filename = %photo.filename, %error, "échec de suppression de la photo");
                    }
                }
            }
        }

        self.persist(&document)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::photo::PhotoRef;

    fn store_in(dir: &std::path::Path) -> ReportStore {
        ReportStore::new(dir.join("reports.json"), dir.to_path_buf())
    }

    fn draft(hall: &str, date: &str, responsible: &str) -> ReportDraft {
        ReportDraft {
            form_data: FormData {
                hall: Some(hall.to_string()),
                date: Some(date.to_string()),
                responsible: Some(responsible.to_string()),
                ..FormData::default()
            },
            ..ReportDraft::default()
        }
    }

    fn photo_ref(filename: &str) -> PhotoRef {
        PhotoRef {
            filename: filename.to_string(),
            path: format!("/api/photos/{filename}"),
            originalname: "photo.jpg".to_string(),
            mimetype: "image/jpeg".to_string(),
            size: 3,
            uploaded_at: Utc::now(),
            fieldname: "photos[t][before]".to_string(),
        }
    }

    #[test]
    fn appends_assign_sequential_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        for i in 1..=5u64 {
            let report = store
                .append(Report::compose(draft("HE03", "2024-01-01", "A"), PhotoMap::new(), 0))
                .unwrap();
            assert_eq!(report.id, i);
        }

        let document = store.read_all();
        let ids: Vec<u64> = document.reports.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(document.next_id, 6);
    }

    #[test]
    fn ids_are_never_reused_after_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        store
            .append(Report::compose(ReportDraft::default(), PhotoMap::new(), 0))
            .unwrap();
        store
            .append(Report::compose(ReportDraft::default(), PhotoMap::new(), 0))
            .unwrap();
        store.delete(2).unwrap();

        let next = store
            .append(Report::compose(ReportDraft::default(), PhotoMap::new(), 0))
            .unwrap();
        assert_eq!(next.id, 3);
    }

    #[test]
    fn delete_cascades_to_photo_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        fs::write(dir.path().join("a.jpg"), b"abc").unwrap();
        fs::write(dir.path().join("b.jpg"), b"abc").unwrap();

        let mut photos = PhotoMap::new();
        let mut by_type = BTreeMap::new();
        by_type.insert("before".to_string(), photo_ref("a.jpg"));
        by_type.insert("after".to_string(), photo_ref("b.jpg"));
        photos.insert("task-1".to_string(), by_type);

        let report = store
            .append(Report::compose(ReportDraft::default(), photos, 2))
            .unwrap();
        store.delete(report.id).unwrap();

        assert!(store.read_all().reports.is_empty());
        assert!(!dir.path().join("a.jpg").exists());
        assert!(!dir.path().join("b.jpg").exists());
    }

    #[test]
    fn delete_missing_id_is_not_found_and_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        store
            .append(Report::compose(ReportDraft::default(), PhotoMap::new(), 0))
            .unwrap();
        assert!(matches!(store.delete(42), Err(StoreError::NotFound)));
        assert_eq!(store.read_all().reports.len(), 1);
    }

    #[test]
    fn disjoint_patches_union() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let report = store
            .append(Report::compose(draft("HE03", "2024-01-01", "A"), PhotoMap::new(), 0))
            .unwrap();

        let mut first = Map::new();
        first.insert(
            "formData".to_string(),
            serde_json::json!({ "hall": "HE06 JFC2" }),
        );
        let after_first = store.update(report.id, first).unwrap();
        // Shallow merge: the whole formData object was replaced.
        assert_eq!(after_first.form_data.hall.as_deref(), Some("HE06 JFC2"));
        assert_eq!(after_first.form_data.date, None);

        let mut second = Map::new();
        second.insert("stats".to_string(), serde_json::json!({ "tasksDone": 7 }));
        let after_second = store.update(report.id, second).unwrap();

        assert_eq!(after_second.form_data.hall.as_deref(), Some("HE06 JFC2"));
        assert_eq!(after_second.stats.tasks_done, Some(7));
        assert!(after_second.updated_at >= after_first.updated_at);
        assert_eq!(after_second.id, report.id);
    }

    #[test]
    fn update_missing_id_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(matches!(
            store.update(1, Map::new()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn shape_breaking_patch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let report = store
            .append(Report::compose(ReportDraft::default(), PhotoMap::new(), 0))
            .unwrap();

        let mut patch = Map::new();
        patch.insert("formData".to_string(), Value::from(42));
        assert!(matches!(
            store.update(report.id, patch),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn corrupt_document_reads_as_empty_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        fs::write(dir.path().join("reports.json"), b"{not json").unwrap();
        let document = store.read_all();
        assert!(document.reports.is_empty());
        assert_eq!(document.next_id, 1);

        // And the store recovers on the next write.
        let report = store
            .append(Report::compose(ReportDraft::default(), PhotoMap::new(), 0))
            .unwrap();
        assert_eq!(report.id, 1);
    }

    #[test]
    fn concurrent_appends_assign_unique_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store_in(dir.path()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..5 {
                        store
                            .append(Report::compose(ReportDraft::default(), PhotoMap::new(), 0))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut ids: Vec<u64> = store.read_all().reports.iter().map(|r| r.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=40).collect::<Vec<u64>>());
    }

    fn report_at(hall: &str, responsible: &str, date: &str, offset_secs: i64) -> Report {
        let mut report =
            Report::compose(draft(hall, date, responsible), PhotoMap::new(), 0);
        report.created_at += chrono::Duration::seconds(offset_secs);
        report
    }

    #[test]
    fn query_filters_are_combined_with_and() {
        let reports = vec![
            report_at("HE03", "Amine", "2024-01-01", 0),
            report_at("HE06 JFC4", "Sara", "2024-01-01", 1),
            report_at("HE06 JFC4", "Amine", "2024-01-02", 2),
        ];

        let query = ReportQuery {
            page: 1,
            limit: 20,
            search: Some("amine".to_string()),
            date: None,
            hall: Some("HE06 JFC4".to_string()),
        };
        let page = query.run(reports);
        assert_eq!(page.total, 1);
        assert_eq!(page.reports[0].form_data.date.as_deref(), Some("2024-01-02"));
    }

    #[test]
    fn search_matches_hall_or_responsible_case_insensitively() {
        let reports = vec![
            report_at("HE03", "Amine", "2024-01-01", 0),
            report_at("HE06 JFC4", "Sara", "2024-01-01", 1),
        ];

        let query = ReportQuery {
            page: 1,
            limit: 20,
            search: Some("he06".to_string()),
            date: None,
            hall: None,
        };
        assert_eq!(query.run(reports).total, 1);
    }

    #[test]
    fn results_are_sorted_newest_first_and_paged() {
        let reports: Vec<Report> = (0..7)
            .map(|i| report_at("HE03", "A", "2024-01-01", i))
            .collect();

        let query = ReportQuery {
            page: 2,
            limit: 3,
            search: None,
            date: None,
            hall: None,
        };
        let page = query.run(reports);

        assert_eq!(page.total, 7);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.reports.len(), 3);
        // Page 2 of newest-first: offsets 3..6 from the top.
        assert!(page.reports[0].created_at > page.reports[1].created_at);
    }

    #[test]
    fn page_past_the_end_is_empty_but_keeps_totals() {
        let reports: Vec<Report> = (0..4)
            .map(|i| report_at("HE03", "A", "2024-01-01", i))
            .collect();

        let query = ReportQuery {
            page: 9,
            limit: 2,
            search: None,
            date: None,
            hall: None,
        };
        let page = query.run(reports);
        assert!(page.reports.is_empty());
        assert_eq!(page.total, 4);
        assert_eq!(page.total_pages, 2);
    }

    #[test]
    fn zero_limit_is_clamped() {
        let query = ReportQuery {
            page: 1,
            limit: 0,
            search: None,
            date: None,
            hall: None,
        };
        let page = query.run(vec![report_at("HE03", "A", "2024-01-01", 0)]);
        assert_eq!(page.limit, 1);
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn compose_strips_server_owned_keys_from_the_draft() {
        let draft: ReportDraft = serde_json::from_value(serde_json::json!({
            "formData": { "hall": "HE03" },
            "createdAt": "2020-01-01T00:00:00Z",
            "id": 999,
            "note": "libre"
        }))
        .unwrap();

        let report = Report::compose(draft, PhotoMap::new(), 0);
        assert_eq!(report.id, 0);
        assert!(report.created_at.timestamp() > 1_500_000_000);
        assert!(!report.extra.contains_key("createdAt"));
        assert_eq!(report.extra.get("note"), Some(&Value::from("libre")));
    }
}
