//! Job messages exchanged on the pipeline queues.
//!
//! Each stage consumes one message and publishes a *new* value to the next
//! queue; messages are never mutated in place. Acknowledgment of the
//! consumed message happens only after the outgoing message is durably
//! published.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::BlobId;

/// Unique identifier for a pipeline job, carried across stages for
/// correlation in logs and the dead-letter queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job for the `conversion` queue: extract the audio track of a stored
/// source video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertAudioJob {
    /// Unique job ID
    pub job_id: JobId,
    /// Blob holding the uploaded source video
    pub source_blob_id: BlobId,
    /// Principal to notify once the result is ready. Opaque to the
    /// pipeline (typically an address).
    pub owner: String,
    /// Enqueue time
    pub created_at: DateTime<Utc>,
}

impl ConvertAudioJob {
    pub fn new(source_blob_id: BlobId, owner: impl Into<String>) -> Self {
        Self {
            job_id: JobId::new(),
            source_blob_id,
            owner: owner.into(),
            created_at: Utc::now(),
        }
    }
}

/// Job for the `notification` queue: tell the owner their audio is ready.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyOwnerJob {
    /// Job ID inherited from the conversion stage
    pub job_id: JobId,
    /// Blob holding the extracted audio
    pub derived_blob_id: BlobId,
    /// Principal to notify
    pub owner: String,
    /// Enqueue time
    pub created_at: DateTime<Utc>,
}

impl NotifyOwnerJob {
    pub fn new(job_id: JobId, derived_blob_id: BlobId, owner: impl Into<String>) -> Self {
        Self {
            job_id,
            derived_blob_id,
            owner: owner.into(),
            created_at: Utc::now(),
        }
    }
}

/// Wire envelope for queue messages.
///
/// Unknown fields in a payload are ignored on deserialization, so new
/// fields can be added without breaking older consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueJob {
    ConvertAudio(ConvertAudioJob),
    NotifyOwner(NotifyOwnerJob),
}

impl QueueJob {
    pub fn job_id(&self) -> &JobId {
        match self {
            QueueJob::ConvertAudio(j) => &j.job_id,
            QueueJob::NotifyOwner(j) => &j.job_id,
        }
    }

    pub fn owner(&self) -> &str {
        match self {
            QueueJob::ConvertAudio(j) => &j.owner,
            QueueJob::NotifyOwner(j) => &j.owner,
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            QueueJob::ConvertAudio(_) => "convert_audio",
            QueueJob::NotifyOwner(_) => "notify_owner",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_job_wire_format_is_tagged() {
        let job = ConvertAudioJob::new(BlobId::from("blob-1"), "user@example.com");
        let json = serde_json::to_value(QueueJob::ConvertAudio(job)).unwrap();

        assert_eq!(json["type"], "convert_audio");
        assert_eq!(json["source_blob_id"], "blob-1");
        assert_eq!(json["owner"], "user@example.com");
    }

    #[test]
    fn notify_job_round_trips() {
        let job = NotifyOwnerJob::new(JobId::new(), BlobId::from("mp3-9"), "user@example.com");
        let wire = serde_json::to_string(&QueueJob::NotifyOwner(job.clone())).unwrap();
        let back: QueueJob = serde_json::from_str(&wire).unwrap();

        assert_eq!(back, QueueJob::NotifyOwner(job));
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        // A payload from a newer producer with an extra field must still parse.
        let wire = r#"{
            "type": "notify_owner",
            "job_id": "j-1",
            "derived_blob_id": "b-2",
            "owner": "user@example.com",
            "created_at": "2025-01-01T00:00:00Z",
            "priority": "high"
        }"#;

        let job: QueueJob = serde_json::from_str(wire).unwrap();
        match job {
            QueueJob::NotifyOwner(j) => assert_eq!(j.derived_blob_id.as_str(), "b-2"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
