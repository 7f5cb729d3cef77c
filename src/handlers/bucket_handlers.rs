//! HTTP handlers for bucket operations.

use axum::{
    extract::{Path, State},
    Json,
};
use bytes::Bytes;
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::bucket::Bucket;
use crate::services::artifact_service::ArtifactService;

/// Request body for `POST /buckets`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateBucketReq {
    #[serde(rename = "ID", alias = "Id")]
    pub id: String,
    #[serde(rename = "Owner")]
    pub owner: String,
}

/// GET `/buckets`
pub async fn list_buckets(
    State(service): State<ArtifactService>,
) -> Result<Json<Vec<Bucket>>, AppError> {
    Ok(Json(service.list_buckets().await?))
}

/// POST `/buckets`
pub async fn create_bucket(
    State(service): State<ArtifactService>,
    body: Bytes,
) -> Result<Json<Bucket>, AppError> {
    let req: CreateBucketReq = serde_json::from_slice(&body)
        .map_err(|_| AppError::bad_request("malformed JSON request"))?;
    let bucket = service.create_bucket(&req.id, &req.owner).await?;
    Ok(Json(bucket))
}

/// GET `/buckets/{id}`
pub async fn get_bucket(
    State(service): State<ArtifactService>,
    Path(id): Path<String>,
) -> Result<Json<Bucket>, AppError> {
    Ok(Json(service.get_bucket(&id).await?))
}

/// POST `/buckets/{id}/close` — cascades into every contained artifact.
pub async fn close_bucket(
    State(service): State<ArtifactService>,
    Path(id): Path<String>,
) -> Result<Json<Bucket>, AppError> {
    Ok(Json(service.close_bucket(&id).await?))
}
