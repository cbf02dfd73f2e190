use crate::config::Config;
use crate::inference::InferenceApi;
use crate::upload::ValidationError;
use actix_cors::Cors;
use actix_web::http::header::ContentType;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use std::collections::HashMap;
use std::sync::Arc;

pub mod protocol;
pub mod routes;

/// Per-process state shared by every request. Immutable after startup
#[derive(Clone)]
pub struct Server {
    pub config: Arc<Config>,
    pub api: Arc<dyn InferenceApi>,
}

impl Server {
    pub fn new(config: Config, api: Arc<dyn InferenceApi>) -> Self {
        Server {
            config: Arc::new(config),
            api,
        }
    }
}

/// Register the relay's routes on an actix `App`. CORS is open so a client
/// served from another origin can post to the API
pub fn configure(server: Server) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg: &mut web::ServiceConfig| {
        cfg.app_data(web::Data::new(server)).service(
            web::scope("")
                .wrap(Cors::permissive())
                .service(routes::index)
                .service(routes::health)
                .service(routes::wound_detection),
        );
    }
}

/// A request rejected before any inference was attempted
#[derive(Debug)]
pub struct WebError {
    err: ValidationError,
}

impl std::fmt::Display for WebError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.err)
    }
}

impl actix_web::error::ResponseError for WebError {
    fn error_response(&self) -> HttpResponse {
        let err = HashMap::from([("errors", vec![self.to_string()])]);

        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .json(err)
    }

    fn status_code(&self) -> StatusCode {
        match self.err {
            ValidationError::UnsupportedType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ValidationError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

impl From<ValidationError> for WebError {
    fn from(err: ValidationError) -> WebError {
        WebError { err }
    }
}
