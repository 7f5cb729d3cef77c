//! HTTP handlers for artifact operations.
//!
//! Upload bodies stream to the object store without buffering in
//! memory; downloads of merged artifacts relay the object-store reader
//! the same way.

use std::io;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Response,
    Json,
};
use futures::StreamExt;
use serde_json::json;
use tokio_util::io::{ReaderStream, StreamReader};

use crate::errors::AppError;
use crate::models::artifact::{Artifact, ArtifactState};
use crate::objectstore::BINARY_CONTENT_TYPE;
use crate::services::artifact_service::{
    AppendChunkReq, ArtifactContent, ArtifactService, CreateArtifactReq,
};

/// GET `/buckets/{id}/artifacts`
pub async fn list_artifacts(
    State(service): State<ArtifactService>,
    Path(bucket_id): Path<String>,
) -> Result<Json<Vec<Artifact>>, AppError> {
    service.get_bucket(&bucket_id).await?;
    Ok(Json(service.list_artifacts(&bucket_id).await?))
}

/// POST `/buckets/{id}/artifacts`
pub async fn create_artifact(
    State(service): State<ArtifactService>,
    Path(bucket_id): Path<String>,
    body: axum::body::Bytes,
) -> Result<Json<Artifact>, AppError> {
    let req: CreateArtifactReq = serde_json::from_slice(&body)
        .map_err(|_| AppError::bad_request("malformed JSON request"))?;
    let bucket = service.get_bucket(&bucket_id).await?;
    let artifact = service.create_artifact(&bucket, req).await?;
    Ok(Json(artifact))
}

/// GET `/buckets/{id}/artifacts/{name}`
pub async fn get_artifact(
    State(service): State<ArtifactService>,
    Path((bucket_id, name)): Path<(String, String)>,
) -> Result<Json<Artifact>, AppError> {
    Ok(Json(service.get_artifact(&bucket_id, &name).await?))
}

/// POST `/buckets/{id}/artifacts/{name}` — dispatched on artifact state.
///
/// A `WAITING_FOR_UPLOAD` artifact takes its raw body as the fixed-size
/// upload; an `APPENDING` artifact takes a JSON chunk. Anything else is
/// a client error.
pub async fn post_artifact(
    State(service): State<ArtifactService>,
    Path((bucket_id, name)): Path<(String, String)>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<Artifact>, AppError> {
    let artifact = service.get_artifact(&bucket_id, &name).await?;

    match artifact.state {
        ArtifactState::WaitingForUpload => {
            let content_length = headers
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string());
            let stream = body
                .into_data_stream()
                .map(|chunk| chunk.map_err(io::Error::other));
            let updated = service
                .put_artifact(
                    &artifact,
                    content_length.as_deref(),
                    Box::new(StreamReader::new(stream)),
                )
                .await?;
            Ok(Json(updated))
        }
        ArtifactState::Appending => {
            let bytes = axum::body::to_bytes(body, usize::MAX)
                .await
                .map_err(|_| AppError::bad_request("could not read request body"))?;
            let req: AppendChunkReq = serde_json::from_slice(&bytes)
                .map_err(|_| AppError::bad_request("malformed JSON request"))?;
            let updated = service.append_log_chunk(&artifact, req).await?;
            Ok(Json(updated))
        }
        ArtifactState::Uploading => Err(AppError::bad_request(
            "artifact is currently being uploaded",
        )),
        ArtifactState::Uploaded => Err(AppError::bad_request("artifact already uploaded")),
        _ => Err(AppError::bad_request("artifact is closed for further appends")),
    }
}

/// POST `/buckets/{id}/artifacts/{name}/close` — triggers the merge for
/// chunked artifacts.
pub async fn close_artifact(
    State(service): State<ArtifactService>,
    Path((bucket_id, name)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    let artifact = service.get_artifact(&bucket_id, &name).await?;
    service.close_artifact(&artifact, true).await?;
    Ok(Json(json!({})))
}

/// GET `/buckets/{id}/artifacts/{name}/content`
pub async fn get_artifact_content(
    State(service): State<ArtifactService>,
    Path((bucket_id, name)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let artifact = service.get_artifact(&bucket_id, &name).await?;

    let mut response = match service.get_content(&artifact).await? {
        ArtifactContent::Stored { reader, size } => {
            let mut response = Response::new(Body::from_stream(ReaderStream::new(reader)));
            set_content_length(response.headers_mut(), size);
            response
        }
        ArtifactContent::Chunked(bytes) => {
            let len = bytes.len() as i64;
            let mut response = Response::new(Body::from(bytes));
            set_content_length(response.headers_mut(), len);
            response
        }
    };

    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(BINARY_CONTENT_TYPE),
    );
    *response.status_mut() = StatusCode::OK;
    Ok(response)
}

fn set_content_length(headers: &mut HeaderMap, length: i64) {
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&length.max(0).to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );
}
