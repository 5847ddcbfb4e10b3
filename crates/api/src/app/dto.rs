use serde::Serialize;

use jobwire_core::JobId;

// -------------------------
// Response DTOs
// -------------------------

/// `202 Accepted` body for a published job.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedResponse {
    pub status: &'static str,
    pub job_id: JobId,
}

impl QueuedResponse {
    pub fn queued(job_id: JobId) -> Self {
        Self {
            status: "queued",
            job_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub broker: &'static str,
}
