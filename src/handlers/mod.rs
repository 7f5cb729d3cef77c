pub mod artifact_handlers;
pub mod bucket_handlers;
pub mod health_handlers;
