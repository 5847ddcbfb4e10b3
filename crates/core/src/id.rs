//! Strongly-typed identifiers carried by job messages.
//!
//! Both identifiers are opaque strings on the wire. `JobId` may be supplied by
//! the producer or generated here; `UserId` must be non-blank.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a job (unique per submission).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

/// Identifier of the user a job is submitted for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

macro_rules! impl_string_newtype {
    ($t:ty) => {
        impl $t {
            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }
    };
}

impl_string_newtype!(JobId);
impl_string_newtype!(UserId);

impl JobId {
    /// Generate a fresh identifier.
    ///
    /// Uses UUIDv7 (time-ordered) so generated ids sort by submission time.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Wrap a producer-supplied id, generating one when it is absent or blank.
    pub fn or_generate(supplied: Option<String>) -> Self {
        match supplied {
            Some(id) if !id.trim().is_empty() => Self(id),
            _ => Self::generate(),
        }
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl TryFrom<String> for UserId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim().is_empty() {
            return Err(DomainError::missing("userId"));
        }
        Ok(Self(value))
    }
}

impl FromStr for UserId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_job_ids_are_uuids() {
        let id = JobId::generate();
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn supplied_job_id_is_kept() {
        assert_eq!(JobId::or_generate(Some("j1".into())).as_str(), "j1");
    }

    #[test]
    fn blank_job_id_is_replaced() {
        let id = JobId::or_generate(Some("   ".into()));
        assert_ne!(id.as_str().trim(), "");
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn blank_user_id_is_rejected() {
        assert_eq!(
            "".parse::<UserId>().unwrap_err(),
            DomainError::missing("userId")
        );
        assert!(" \t".parse::<UserId>().is_err());
        assert_eq!("u1".parse::<UserId>().unwrap().as_str(), "u1");
    }

    #[test]
    fn user_id_deserialization_validates() {
        assert!(serde_json::from_str::<UserId>("\"\"").is_err());
        let id: UserId = serde_json::from_str("\"user-1\"").unwrap();
        assert_eq!(id.as_str(), "user-1");
    }
}
