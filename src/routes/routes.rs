//! Defines routes for all bucket and artifact operations.
//!
//! ## Structure
//! - **Bucket-level endpoints**
//!   - `GET    /buckets` — list buckets
//!   - `POST   /buckets` — create bucket
//!   - `GET    /buckets/{id}` — fetch bucket
//!   - `POST   /buckets/{id}/close` — close bucket, cascading to artifacts
//!
//! - **Artifact-level endpoints**
//!   - `GET    /buckets/{id}/artifacts` — list artifacts
//!   - `POST   /buckets/{id}/artifacts` — create artifact
//!   - `GET    /buckets/{id}/artifacts/{name}` — fetch artifact
//!   - `POST   /buckets/{id}/artifacts/{name}` — upload body or append chunk
//!   - `POST   /buckets/{id}/artifacts/{name}/close` — finalize (merge)
//!   - `GET    /buckets/{id}/artifacts/{name}/content` — read content

use crate::{
    handlers::{
        artifact_handlers::{
            close_artifact, create_artifact, get_artifact, get_artifact_content, list_artifacts,
            post_artifact,
        },
        bucket_handlers::{close_bucket, create_bucket, get_bucket, list_buckets},
        health_handlers::{healthz, readyz},
    },
    services::artifact_service::ArtifactService,
};
use axum::{
    routing::{get, post},
    Router,
};

/// Build and return the router for the whole HTTP surface.
///
/// The router carries shared state (`ArtifactService`) to all handlers.
pub fn routes() -> Router<ArtifactService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Bucket-level routes
        .route("/buckets", get(list_buckets).post(create_bucket))
        .route("/buckets/{id}", get(get_bucket))
        .route("/buckets/{id}/close", post(close_bucket))
        // Artifact-level routes
        .route(
            "/buckets/{id}/artifacts",
            get(list_artifacts).post(create_artifact),
        )
        .route(
            "/buckets/{id}/artifacts/{name}",
            get(get_artifact).post(post_artifact),
        )
        .route("/buckets/{id}/artifacts/{name}/close", post(close_artifact))
        .route(
            "/buckets/{id}/artifacts/{name}/content",
            get(get_artifact_content),
        )
}
