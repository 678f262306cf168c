pub mod handlers;
pub mod types;

use axum::{
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::reveal::GenderReveal;

#[derive(Clone)]
pub struct AppState {
    pub reveal: Arc<GenderReveal>,
}

/// Browsers may only call the service from the listed origins, and only with GET.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring CORS origin that is not a valid header value: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET])
}

pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/gender-reveal", get(handlers::gender_reveal))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(allowed_origins))
        .with_state(state)
}

pub async fn start_server(
    addr: std::net::SocketAddr,
    state: AppState,
    allowed_origins: &[String],
) -> Result<(), std::io::Error> {
    let app = build_router(state, allowed_origins);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Gender reveal service listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::{RevealResponse, StatusMessage};
    use crate::document::{Document, Layout, Page, TextSegment};
    use crate::reveal::fakes::{FakeClassifier, FakeParser, FakeStorage};
    use crate::reveal::{DocumentLocation, LabelPolicy};
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    const ORIGIN: &str = "https://courtneyperigo.com";

    fn document() -> Document {
        Document {
            text: "NIPT report. Fetal sex: male.".to_string(),
            pages: vec![
                Page {
                    page_number: 1,
                    layout: Layout::new(vec![TextSegment::new(0, 12)]),
                },
                Page {
                    page_number: 2,
                    layout: Layout::new(vec![TextSegment::new(12, 29)]),
                },
            ],
        }
    }

    fn app(storage: FakeStorage, classifier: FakeClassifier) -> Router {
        let reveal = GenderReveal::new(
            Arc::new(storage),
            Arc::new(FakeParser(Ok(document()))),
            Arc::new(classifier),
            DocumentLocation {
                bucket: "gender-reveal-documents".to_string(),
                object: "gender-reveal.pdf".to_string(),
            },
            LabelPolicy::Strict,
        );
        build_router(
            AppState {
                reveal: Arc::new(reveal),
            },
            &[ORIGIN.to_string()],
        )
    }

    fn working_app() -> Router {
        app(
            FakeStorage(Ok(b"%PDF-1.5".to_vec())),
            FakeClassifier::answering("male"),
        )
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn root_reports_service_is_working() {
        let response = working_app().oneshot(get_request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: StatusMessage = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(body.message, "Gender Reveal Service is working.");
    }

    #[tokio::test]
    async fn gender_reveal_returns_label() {
        let response = working_app().oneshot(get_request("/gender-reveal")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: RevealResponse = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(body.gender, "male");
    }

    #[tokio::test]
    async fn failures_have_structured_bodies() {
        let app = app(
            FakeStorage(Err("HTTP Status: 404 Not Found".to_string())),
            FakeClassifier::answering("male"),
        );
        let response = app.oneshot(get_request("/gender-reveal")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "storage_fetch_error");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("404 Not Found"));
    }

    #[tokio::test]
    async fn unexpected_label_is_reported() {
        let app = app(
            FakeStorage(Ok(b"%PDF-1.5".to_vec())),
            FakeClassifier::answering("I'm sorry, I can't help with that."),
        );
        let response = app.oneshot(get_request("/gender-reveal")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_json(response).await["error"]["code"], "unexpected_label");
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let response = working_app().oneshot(get_request("/reveal")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn post_is_not_allowed() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/gender-reveal")
            .body(Body::empty())
            .unwrap();
        let response = working_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn cors_allows_listed_origin() {
        let request = Request::builder()
            .uri("/")
            .header(header::ORIGIN, ORIGIN)
            .body(Body::empty())
            .unwrap();
        let response = working_app().oneshot(request).await.unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            ORIGIN
        );
    }

    #[tokio::test]
    async fn cors_ignores_other_origins() {
        let request = Request::builder()
            .uri("/")
            .header(header::ORIGIN, "https://evil.example")
            .body(Body::empty())
            .unwrap();
        let response = working_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }

    #[tokio::test]
    async fn preflight_only_offers_get() {
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/gender-reveal")
            .header(header::ORIGIN, ORIGIN)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .body(Body::empty())
            .unwrap();
        let response = working_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS],
            "GET"
        );
    }
}
