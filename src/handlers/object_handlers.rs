//! HTTP handlers for upload, presigned listing and bucket download.
//! Every handler takes the target bucket from the `bucket` query parameter and
//! delegates storage concerns to `GatewayService`.

use crate::{
    errors::AppError,
    models::{bucket::BucketName, object::ObjectKey},
    services::gateway::GatewayService,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Query, State, multipart::MultipartRejection},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use serde::{Deserialize, Serialize};

/// Form field that carries the uploaded file.
const FILE_FIELD: &str = "file";
/// Content type stored when the upload part does not declare one.
const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";
const ARCHIVE_FILENAME: &str = "images.zip";

#[derive(Debug, Deserialize)]
pub struct BucketQuery {
    pub bucket: Option<String>,
}

impl BucketQuery {
    fn bucket(self) -> Result<BucketName, AppError> {
        let name = self
            .bucket
            .filter(|name| !name.is_empty())
            .ok_or_else(|| AppError::bad_request("missing `bucket` query parameter"))?;
        Ok(BucketName::parse(name)?)
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ImagesResponse {
    pub images: Vec<String>,
}

/// `POST /upload?bucket=...` with a multipart `file` field.
///
/// The part's file name (without any directory) becomes the object key.
pub async fn upload_object(
    State(service): State<GatewayService>,
    Query(query): Query<BucketQuery>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let bucket = query.bucket()?;
    receive_upload(&service, &bucket, multipart)
        .await
        .map_err(|err| err.in_bucket(&bucket))
}

async fn receive_upload(
    service: &GatewayService,
    bucket: &BucketName,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let mut multipart = multipart?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = field
            .file_name()
            .map(base_name)
            .ok_or_else(|| AppError::bad_request("uploaded file has no file name"))?;
        let key = ObjectKey::parse(file_name)?;
        let content_type = field
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let body = field
            .bytes()
            .await
            .map_err(|err| AppError::from(err).for_key(&key))?;

        service
            .upload(bucket, &key, body, &content_type)
            .await
            .map_err(|err| AppError::from(err).for_key(&key))?;
        return Ok(Json(UploadResponse {
            message: "Upload successful",
        }));
    }

    Err(AppError::bad_request("missing `file` form field"))
}

/// `GET /images?bucket=...`: presigned GET URLs for every object.
pub async fn list_images(
    State(service): State<GatewayService>,
    Query(query): Query<BucketQuery>,
) -> Result<Json<ImagesResponse>, AppError> {
    let bucket = query.bucket()?;
    let images = service
        .presigned_urls(&bucket)
        .await
        .map_err(|err| AppError::from(err).in_bucket(&bucket))?;
    Ok(Json(ImagesResponse { images }))
}

/// `GET /download?bucket=...`: the whole bucket as a zip attachment.
pub async fn download_all(
    State(service): State<GatewayService>,
    Query(query): Query<BucketQuery>,
) -> Result<Response, AppError> {
    let bucket = query.bucket()?;
    let archive = service
        .download_archive(&bucket)
        .await
        .map_err(|err| AppError::from(err).in_bucket(&bucket))?;

    let mut response = Response::new(Body::from(archive.bytes));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/zip"),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename={}", ARCHIVE_FILENAME))
            .map_err(|err| AppError::internal(err.to_string()))?,
    );
    Ok(response)
}

/// Strip any client-side directory from an uploaded file name.
fn base_name(file_name: &str) -> String {
    file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{archive::ArchiveLimits, memory_store::MemoryStore};
    use std::{sync::Arc, time::Duration};
    use url::Url;

    fn service() -> GatewayService {
        let store = MemoryStore::new(Url::parse("http://localhost:5000").unwrap());
        GatewayService::new(
            Arc::new(store),
            Duration::from_secs(60),
            ArchiveLimits::default(),
        )
    }

    fn query(bucket: &str) -> Query<BucketQuery> {
        Query(BucketQuery {
            bucket: Some(bucket.to_string()),
        })
    }

    #[test]
    fn base_name_drops_directories() {
        assert_eq!(base_name("smile.jpg"), "smile.jpg");
        assert_eq!(base_name("photos/2025/smile.jpg"), "smile.jpg");
        assert_eq!(base_name("C:\\Users\\me\\smile.jpg"), "smile.jpg");
        assert_eq!(base_name("dir/"), "");
    }

    #[test]
    fn bucket_query_requires_a_value() {
        let missing = BucketQuery { bucket: None }.bucket().unwrap_err();
        assert_eq!(missing.status, StatusCode::BAD_REQUEST);

        let empty = BucketQuery {
            bucket: Some(String::new()),
        }
        .bucket()
        .unwrap_err();
        assert_eq!(empty.status, StatusCode::BAD_REQUEST);

        let ok = BucketQuery {
            bucket: Some("images".into()),
        }
        .bucket()
        .unwrap();
        assert_eq!(ok.as_str(), "images");
    }

    #[tokio::test]
    async fn download_failure_names_the_bucket() {
        let Err(err) = download_all(State(service()), query("nobody")).await else {
            panic!("download of a missing bucket should fail");
        };
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.bucket.as_deref(), Some("nobody"));
        assert_eq!(err.key, None);
    }

    #[tokio::test]
    async fn listing_missing_bucket_is_empty() {
        let Json(response) = list_images(State(service()), query("nobody")).await.unwrap();
        assert!(response.images.is_empty());
    }
}
