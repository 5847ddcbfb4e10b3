//! Job payload schema.
//!
//! `JobRequest` is what producers send (every field optional on the wire);
//! `JobPayload` is the validated form that is allowed onto the exchange.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{DomainError, DomainResult};
use crate::id::{JobId, UserId};

/// A validated job message body.
///
/// Invariants:
/// - `user_id` is non-blank
/// - `job_id` is always present (producer-supplied or generated)
/// - `data` is arbitrary JSON and defaults to `{}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    job_id: JobId,
    user_id: UserId,
    #[serde(default = "empty_object")]
    data: JsonValue,
}

impl JobPayload {
    pub fn new(job_id: JobId, user_id: UserId, data: JsonValue) -> Self {
        Self {
            job_id,
            user_id,
            data,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn data(&self) -> &JsonValue {
        &self.data
    }

    pub fn into_data(self) -> JsonValue {
        self.data
    }
}

/// Producer-facing request body (`{jobId?, userId, data?}`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub data: Option<JsonValue>,
}

impl JobRequest {
    /// Validate the request and fill in defaults.
    ///
    /// Fails with `DomainError::MissingField("userId")` when `userId` is absent
    /// or blank; no id is generated in that case.
    pub fn into_payload(self) -> DomainResult<JobPayload> {
        let user_id = match self.user_id {
            Some(raw) => UserId::try_from(raw)?,
            None => return Err(DomainError::missing("userId")),
        };

        let data = match self.data {
            Some(JsonValue::Null) | None => empty_object(),
            Some(v) => v,
        };

        Ok(JobPayload::new(JobId::or_generate(self.job_id), user_id, data))
    }
}

fn empty_object() -> JsonValue {
    JsonValue::Object(Default::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn payload_serializes_with_camel_case_keys() {
        let payload = JobPayload::new("j1".into(), "u1".parse().unwrap(), json!({}));
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({ "jobId": "j1", "userId": "u1", "data": {} })
        );
    }

    #[test]
    fn request_without_user_id_is_rejected() {
        let req: JobRequest = serde_json::from_value(json!({ "jobId": "j1" })).unwrap();
        assert_eq!(req.into_payload(), Err(DomainError::missing("userId")));
    }

    #[test]
    fn request_with_empty_user_id_is_rejected() {
        let req: JobRequest = serde_json::from_value(json!({ "userId": "" })).unwrap();
        assert_eq!(req.into_payload(), Err(DomainError::missing("userId")));
    }

    #[test]
    fn request_defaults_job_id_and_data() {
        let req: JobRequest = serde_json::from_value(json!({ "userId": "u1" })).unwrap();
        let payload = req.into_payload().unwrap();
        assert!(!payload.job_id().as_str().is_empty());
        assert_eq!(payload.data(), &json!({}));
    }

    #[test]
    fn null_data_becomes_empty_object() {
        let req: JobRequest =
            serde_json::from_value(json!({ "userId": "u1", "data": null })).unwrap();
        assert_eq!(req.into_payload().unwrap().data(), &json!({}));
    }

    #[test]
    fn payload_without_data_deserializes() {
        let payload: JobPayload =
            serde_json::from_value(json!({ "jobId": "abc", "userId": "u1" })).unwrap();
        assert_eq!(payload.data(), &json!({}));
    }

    proptest! {
        #[test]
        fn supplied_ids_survive_validation(
            job_id in "[a-zA-Z0-9-]{1,36}",
            user_id in "[a-zA-Z0-9-]{1,36}",
            n in any::<i64>(),
        ) {
            let req = JobRequest {
                job_id: Some(job_id.clone()),
                user_id: Some(user_id.clone()),
                data: Some(json!({ "n": n })),
            };
            let payload = req.into_payload().unwrap();
            prop_assert_eq!(payload.job_id().as_str(), job_id.as_str());
            prop_assert_eq!(payload.user_id().as_str(), user_id.as_str());
            prop_assert_eq!(payload.data(), &json!({ "n": n }));
        }
    }
}
