pub mod error;
pub mod export;
pub mod models;
pub mod routes;
pub mod storage;
