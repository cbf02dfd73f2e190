use crate::adapter::WoundRecord;
use serde::{Deserialize, Serialize};

/// How a detection request ended. Every variant is served with HTTP 200
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStatus {
    /// The model found at least one wound
    Detected,

    /// The model answered and found nothing
    NoWounds,

    /// The request carried no image
    NoImage,

    /// Storage, transport or parsing failed. Details are only logged
    Failed,
}

/// Body of `POST /api/wound-detection`
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct DetectionResponse {
    pub data: Vec<WoundRecord>,
    pub status: DetectionStatus,
}

impl DetectionResponse {
    pub fn detected(data: Vec<WoundRecord>) -> Self {
        let status = match data.is_empty() {
            true => DetectionStatus::NoWounds,
            false => DetectionStatus::Detected,
        };
        DetectionResponse { data, status }
    }

    pub fn empty(status: DetectionStatus) -> Self {
        DetectionResponse {
            data: Vec::new(),
            status,
        }
    }
}
