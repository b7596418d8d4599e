use std::fs::create_dir_all;
use std::io;
use std::path::PathBuf;

use crate::models::photo::PhotoStore;
use crate::models::report::ReportStore;

/// On-disk layout of the whole service: one JSON document for reports and one
/// flat directory of uploaded photos. Handed to handlers through `web::Data`.
pub struct Storage {
    pub data_dir: PathBuf,
    pub uploads_dir: PathBuf,
    pub reports: ReportStore,
    pub photos: PhotoStore,
}

impl Storage {
    pub fn create(data_dir: PathBuf, uploads_dir: PathBuf) -> io::Result<Storage> {
        create_dir_all(&data_dir)?;
        create_dir_all(&uploads_dir)?;

        Ok(Storage {
            reports: ReportStore::new(data_dir.join("reports.json"), uploads_dir.clone()),
            photos: PhotoStore::new(uploads_dir.clone()),
            data_dir,
            uploads_dir,
        })
    }
}
