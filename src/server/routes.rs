//! The user-facing web server. Uploaded images are relayed to the remote
//! inference API and its answer is returned as wound records.

use super::protocol::{DetectionResponse, DetectionStatus};
use super::{Server, WebError};
use crate::adapter;
use crate::upload::{self, TransientFile, UploadError, UploadedImage};
use actix_multipart::Multipart;
use actix_web::http::header::ContentType;
use actix_web::{get, post, web, HttpResponse, Responder};
use futures_util::TryStreamExt;
use tracing::*;

type Result<T> = std::result::Result<T, WebError>;

/// Name of the multipart field holding the image
const IMAGE_FIELD: &str = "image";

const INDEX: &str = include_str!("../../static/index.html");

/// The upload form
#[get("/")]
pub async fn index() -> impl Responder {
    HttpResponse::Ok()
        .content_type(ContentType::html())
        .body(INDEX)
}

/// Liveness probe
#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok()
        .content_type(ContentType::plaintext())
        .body("ok")
}

/// Relay one uploaded image to the inference API. Only validation failures
/// are reported as errors; a missing image or any downstream failure still
/// answers 200 with an empty `data` list
#[post("/api/wound-detection")]
pub async fn wound_detection(
    payload: Multipart,
    state: web::Data<Server>,
) -> Result<impl Responder> {
    let (transient, image) = match receive_image(payload, &state).await? {
        Upload::Stored(transient, image) => (transient, image),
        Upload::Missing => {
            info!("request carried no image");
            return Ok(web::Json(DetectionResponse::empty(DetectionStatus::NoImage)));
        }
        Upload::Failed => {
            return Ok(web::Json(DetectionResponse::empty(DetectionStatus::Failed)));
        }
    };

    info!(
        "relaying '{}' ({} bytes, {})",
        image.file_name, image.size, image.mime_type
    );

    let response = match state.api.generate(&image.bytes, &image.mime_type).await {
        Ok(raw) => match adapter::parse_reply(&raw) {
            Ok(records) => DetectionResponse::detected(records),
            Err(e) => {
                warn!("could not parse inference response: {e}");
                DetectionResponse::empty(DetectionStatus::Failed)
            }
        },
        Err(e) => {
            error!("inference call failed: {e}");
            DetectionResponse::empty(DetectionStatus::Failed)
        }
    };

    // The upload is no longer needed once the remote call has returned
    drop(transient);

    info!(
        "finished serving detection request: {:?}, {} record(s)",
        response.status,
        response.data.len()
    );
    Ok(web::Json(response))
}

enum Upload {
    Stored(TransientFile, UploadedImage),
    Missing,
    Failed,
}

/// Find the `image` field and store it. Validation errors are returned,
/// anything else is logged and reported as `Upload::Failed`
async fn receive_image(mut payload: Multipart, state: &Server) -> Result<Upload> {
    let config = &state.config;

    loop {
        let field = match payload.try_next().await {
            Ok(Some(field)) => field,
            Ok(None) => return Ok(Upload::Missing),
            Err(e) => {
                warn!("unreadable multipart body: {e}");
                return Ok(Upload::Missing);
            }
        };

        let disposition = field.content_disposition();
        if disposition.get_name() != Some(IMAGE_FIELD) {
            debug!("skipping field {:?}", disposition.get_name());
            continue;
        }
        // A plain form value, or the empty file name browsers send when no
        // file was picked
        if matches!(disposition.get_filename(), None | Some("")) {
            return Ok(Upload::Missing);
        }

        return match upload::store_field(field, &config.upload_dir, config.max_upload_bytes).await
        {
            Ok((transient, image)) => Ok(Upload::Stored(transient, image)),
            Err(UploadError::Invalid(e)) => {
                warn!("rejected upload: {e}");
                Err(e.into())
            }
            Err(e) => {
                error!("failed to store upload: {e}");
                Ok(Upload::Failed)
            }
        };
    }
}
