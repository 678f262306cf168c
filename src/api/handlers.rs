use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use super::types::{RevealResponse, StatusMessage, SERVICE_MESSAGE};
use super::AppState;
use crate::error::RevealError;
use crate::utils::content_guard::build_error_payload;

pub async fn root() -> Json<StatusMessage> {
    Json(StatusMessage {
        message: SERVICE_MESSAGE.to_string(),
    })
}

pub async fn gender_reveal(
    State(state): State<AppState>,
) -> Result<Json<RevealResponse>, RevealError> {
    let request_id = Uuid::new_v4();
    let span = info_span!("gender_reveal", %request_id);

    async move {
        let location = state.reveal.location();
        info!(
            "Revealing from gs://{}/{}",
            location.bucket, location.object
        );
        match state.reveal.reveal().await {
            Ok(gender) => Ok(Json(RevealResponse { gender })),
            Err(e) => {
                error!("Gender reveal failed ({}): {}", e.code(), e);
                Err(e)
            }
        }
    }
    .instrument(span)
    .await
}

impl IntoResponse for RevealError {
    fn into_response(self) -> Response {
        let body = build_error_payload(self.code(), &self.to_string());
        (self.status(), Json(body)).into_response()
    }
}
