mod reading_ingestion_service;

pub use reading_ingestion_service::*;
