pub mod docker;
pub mod ingest;
