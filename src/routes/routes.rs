//! Defines the gateway's HTTP surface.
//!
//! - `GET  /health`             liveness
//! - `POST /upload?bucket=`     multipart upload of one `file` field
//! - `GET  /images?bucket=`     presigned GET URLs for every object
//! - `GET  /download?bucket=`   every object zipped into `images.zip`
//!
//! Every response carries permissive CORS headers and `OPTIONS` is answered
//! with 204 before routing.

use crate::{
    handlers::{
        health_handlers::health,
        object_handlers::{download_all, list_images, upload_object},
    },
    middleware::cors::cors_middleware,
    services::gateway::GatewayService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Build the router for all gateway routes.
///
/// The router carries shared state (`GatewayService`) to all handlers.
pub fn routes() -> Router<GatewayService> {
    Router::new()
        .route("/health", get(health))
        .route("/upload", post(upload_object))
        .route("/images", get(list_images))
        .route("/download", get(download_all))
}

/// Attach state and the cross-cutting layers to [`routes`].
pub fn app(service: GatewayService, max_upload_bytes: usize) -> Router {
    routes()
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(service)
        .layer(middleware::from_fn(cors_middleware))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{archive::ArchiveLimits, memory_store::MemoryStore};
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode, header},
        response::Response,
    };
    use serde_json::{Value, json};
    use std::{io::Read, sync::Arc, time::Duration};
    use tower::ServiceExt;
    use url::Url;

    const BOUNDARY: &str = "gateway-test-boundary";

    fn setup_test_app() -> Router {
        setup_test_app_with_limit(1024 * 1024)
    }

    fn setup_test_app_with_limit(max_upload_bytes: usize) -> Router {
        let store = MemoryStore::new(Url::parse("http://localhost:5000").unwrap());
        let service = GatewayService::new(
            Arc::new(store),
            Duration::from_secs(86_400),
            ArchiveLimits::default(),
        );
        app(service, max_upload_bytes)
    }

    fn multipart_body(field: &str, file_name: Option<&str>, content: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match file_name {
            Some(name) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{field}\"; filename=\"{name}\"\r\n\
                     Content-Type: image/png\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{field}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn upload(app: &Router, bucket: &str, file_name: &str, content: &[u8]) -> Response {
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("/upload?bucket={bucket}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body("file", Some(file_name), content)))
            .unwrap();
        app.clone().oneshot(request).await.unwrap()
    }

    async fn get(app: &Router, uri: &str) -> Response {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        app.clone().oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = setup_test_app();
        let response = get(&app, "/health").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
        assert_eq!(json_body(response).await, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_options_short_circuits() {
        let app = setup_test_app();
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/upload")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "*");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "*");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_upload_then_list() {
        let app = setup_test_app();

        let response = upload(&app, "photos", "smile.png", b"png-bytes").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({ "message": "Upload successful" })
        );

        let response = get(&app, "/images?bucket=photos").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let images = body["images"].as_array().unwrap();
        assert_eq!(images.len(), 1);
        let url = Url::parse(images[0].as_str().unwrap()).unwrap();
        assert_eq!(url.path(), "/photos/smile.png");
        assert_eq!(url.query(), Some("X-Amz-Expires=86400"));
    }

    #[tokio::test]
    async fn test_list_unknown_bucket_is_empty() {
        let app = setup_test_app();
        let response = get(&app, "/images?bucket=nobody").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "images": [] }));
    }

    #[tokio::test]
    async fn test_upload_without_file_field() {
        let app = setup_test_app();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/upload?bucket=photos")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body("note", None, b"hello")))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await,
            json!({ "error": "missing `file` form field" })
        );
    }

    #[tokio::test]
    async fn test_upload_not_multipart() {
        let app = setup_test_app();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/upload?bucket=photos")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_upload_requires_bucket() {
        let app = setup_test_app();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body("file", Some("a.jpg"), b"x")))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = upload(&app, "Not_Valid", "a.jpg", b"x").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_rejects_unsafe_file_name() {
        let app = setup_test_app();
        let response = upload(&app, "photos", "..", b"x").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_accepts_dots_in_file_name() {
        let app = setup_test_app();
        for name in ["IMG..0001.jpg", "wait...png"] {
            let response = upload(&app, "photos", name, b"x").await;
            assert_eq!(response.status(), StatusCode::OK, "{name} should upload");
        }

        let body = json_body(get(&app, "/images?bucket=photos").await).await;
        let paths: Vec<String> = body["images"]
            .as_array()
            .unwrap()
            .iter()
            .map(|u| Url::parse(u.as_str().unwrap()).unwrap().path().to_string())
            .collect();
        assert_eq!(paths, ["/photos/IMG..0001.jpg", "/photos/wait...png"]);
    }

    #[tokio::test]
    async fn test_upload_over_body_limit() {
        let app = setup_test_app_with_limit(1024);
        let response = upload(&app, "photos", "big.jpg", &[0u8; 4096]).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_download_bucket_as_zip() {
        let app = setup_test_app();
        for (name, content) in [("a.jpg", &b"first"[..]), ("b.jpg", &b"second"[..])] {
            let response = upload(&app, "photos", name, content).await;
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = get(&app, "/download?bucket=photos").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=images.zip"
        );
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.to_vec())).unwrap();
        assert_eq!(archive.len(), 2);
        let mut content = String::new();
        archive
            .by_name("b.jpg")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "second");
    }

    #[tokio::test]
    async fn test_download_unknown_bucket_is_server_error() {
        let app = setup_test_app();
        let response = get(&app, "/download?bucket=nobody").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await,
            json!({ "error": "bucket `nobody` not found" })
        );
    }

    #[tokio::test]
    async fn test_concurrent_uploads_same_bucket() {
        let app = setup_test_app();
        let (first, second) = tokio::join!(
            upload(&app, "party", "one.jpg", b"1"),
            upload(&app, "party", "two.jpg", b"2"),
        );
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::OK);

        let body = json_body(get(&app, "/images?bucket=party").await).await;
        let paths: Vec<String> = body["images"]
            .as_array()
            .unwrap()
            .iter()
            .map(|u| Url::parse(u.as_str().unwrap()).unwrap().path().to_string())
            .collect();
        assert_eq!(paths, ["/party/one.jpg", "/party/two.jpg"]);
    }
}
