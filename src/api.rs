// API routes and handlers
use actix_cors::Cors;
use actix_web::error::JsonPayloadError;
use actix_web::{get, post, web, HttpRequest, HttpResponse, ResponseError};

use crate::error::ServiceError;
use crate::pipeline::{ClassificationRequest, PredictionResult};
use crate::state::AppState;

#[post("/predict")]
pub async fn predict(
    state: web::Data<AppState>,
    payload: web::Json<ClassificationRequest>,
) -> Result<web::Json<PredictionResult>, ServiceError> {
    let request = payload.into_inner();
    log::info!(
        "prediction request: text {:?}, image_url {:?}",
        request.text.chars().take(50).collect::<String>(),
        request.image_url
    );

    match state.pipeline.predict(request).await {
        Ok(result) => Ok(web::Json(result)),
        Err(e) => {
            log::error!("prediction failed: {}", e);
            Err(e)
        }
    }
}

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

/// Malformed bodies (bad JSON, missing `text`) become 422 with a `detail` message.
fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = ServiceError::Validation(err.to_string()).error_response();
    actix_web::error::InternalError::from_response(err, response).into()
}

pub fn cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allow_any_method()
        .allow_any_header()
        .supports_credentials()
}

/// Registers routes and the JSON extractor config on an app or scope.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .service(predict)
        .service(health);
}
