//! Domain models for durable job records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which source adapter a job runs through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    FileUpload,
    SecEdgar,
    UrlScrape,
    ApiFetch,
    DatabaseQuery,
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file_upload" => Ok(Self::FileUpload),
            "sec_edgar" => Ok(Self::SecEdgar),
            "url_scrape" => Ok(Self::UrlScrape),
            "api_fetch" => Ok(Self::ApiFetch),
            "database_query" => Ok(Self::DatabaseQuery),
            _ => Err(format!("Invalid source: {s}")),
        }
    }
}

impl From<String> for SourceKind {
    fn from(s: String) -> Self {
        s.as_str().parse().unwrap_or(Self::FileUpload)
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match self {
            Self::FileUpload => "file_upload",
            Self::SecEdgar => "sec_edgar",
            Self::UrlScrape => "url_scrape",
            Self::ApiFetch => "api_fetch",
            Self::DatabaseQuery => "database_query",
        };
        write!(f, "{source}")
    }
}

/// Lifecycle status of an ingestion job
///
/// Status only ever advances along the stage order
/// (FETCHING < CLEANING < CHUNKING < EMBEDDING < STORING) or jumps to a
/// terminal failure state. [`JobStatus::can_transition_to`] encodes the
/// legal moves; the orchestrator refuses anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Fetching,
    Cleaning,
    Chunking,
    Embedding,
    Storing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Position along the in-progress stage order; `None` for terminal
    /// states
    pub const fn stage_rank(self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Fetching => Some(1),
            Self::Cleaning => Some(2),
            Self::Chunking => Some(3),
            Self::Embedding => Some(4),
            Self::Storing => Some(5),
            Self::Completed | Self::Failed | Self::Cancelled => None,
        }
    }

    /// Whether the job has reached a final state
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether moving from `self` to `next` respects the state machine
    pub fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Failed | Self::Cancelled => true,
            Self::Completed => matches!(self, Self::Storing),
            _ => match (self.stage_rank(), next.stage_rank()) {
                (Some(from), Some(to)) => to > from,
                _ => false,
            },
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "FETCHING" => Ok(Self::Fetching),
            "CLEANING" => Ok(Self::Cleaning),
            "CHUNKING" => Ok(Self::Chunking),
            "EMBEDDING" => Ok(Self::Embedding),
            "STORING" => Ok(Self::Storing),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid job status: {s}")),
        }
    }
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        s.as_str().parse().unwrap_or(Self::Pending)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            Self::Pending => "PENDING",
            Self::Fetching => "FETCHING",
            Self::Cleaning => "CLEANING",
            Self::Chunking => "CHUNKING",
            Self::Embedding => "EMBEDDING",
            Self::Storing => "STORING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        };
        write!(f, "{status}")
    }
}

/// Durable record for one ingestion job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionJob {
    pub job_id: Uuid,
    pub correlation_id: String,
    pub tenant_id: String,
    pub source: SourceKind,
    pub status: JobStatus,

    /// Opaque adapter parameters exactly as submitted
    pub source_params: serde_json::Value,
    /// Caller-supplied metadata stored as-is
    pub metadata: serde_json::Value,

    // Cumulative counters (monotonically non-decreasing within a job)
    pub documents_stored: i64,
    pub chunks_created: i64,
    pub embeddings_generated: i64,

    /// Stage names completed so far, in execution order
    pub stages_completed: Vec<String>,
    pub error_message: Option<String>,

    // Timestamps
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

impl IngestionJob {
    /// Fresh `PENDING` record for a new submission
    pub fn new(
        job_id: Uuid,
        correlation_id: String,
        tenant_id: String,
        source: SourceKind,
        source_params: serde_json::Value,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            job_id,
            correlation_id,
            tenant_id,
            source,
            status: JobStatus::Pending,
            source_params,
            metadata,
            documents_stored: 0,
            chunks_created: 0,
            embeddings_generated: 0,
            stages_completed: Vec::new(),
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
        }
    }

    /// Apply a partial update in memory (mirrors the SQL UPDATE; used by
    /// the in-memory store and by tests)
    pub fn apply(&mut self, patch: &JobPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(message) = &patch.error_message {
            self.error_message = Some(message.clone());
        }
        if let Some(completed_at) = patch.completed_at {
            self.completed_at = Some(completed_at);
        }
        if let Some(duration_ms) = patch.duration_ms {
            self.duration_ms = Some(duration_ms);
        }
        if let Some(documents_stored) = patch.documents_stored {
            self.documents_stored = documents_stored;
        }
        if let Some(chunks_created) = patch.chunks_created {
            self.chunks_created = chunks_created;
        }
        if let Some(embeddings_generated) = patch.embeddings_generated {
            self.embeddings_generated = embeddings_generated;
        }
        if let Some(stage) = &patch.push_stage {
            self.stages_completed.push(stage.clone());
        }
    }
}

/// Partial update for a job record; unset fields are left untouched
///
/// There is deliberately no `tenant_id` field: tenant ownership is
/// immutable after creation.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub error_message: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub documents_stored: Option<i64>,
    pub chunks_created: Option<i64>,
    pub embeddings_generated: Option<i64>,
    /// Appends one stage name to `stages_completed`
    pub push_stage: Option<String>,
}

impl JobPatch {
    /// Patch that only moves the status
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Filter for job listings; any subset of fields may be set
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub tenant_id: Option<String>,
    pub status: Option<JobStatus>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

impl JobFilter {
    /// Whether a job matches every set field
    pub fn matches(&self, job: &IngestionJob) -> bool {
        if let Some(tenant_id) = &self.tenant_id {
            if &job.tenant_id != tenant_id {
                return false;
            }
        }
        if let Some(status) = self.status {
            if job.status != status {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if job.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if job.created_at > before {
                return false;
            }
        }
        true
    }
}

/// One page of a job listing plus the unpaginated total
#[derive(Debug, Clone)]
pub struct JobPage {
    pub jobs: Vec<IngestionJob>,
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_advances_only_forward() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Fetching));
        assert!(JobStatus::Fetching.can_transition_to(JobStatus::Cleaning));
        assert!(JobStatus::Storing.can_transition_to(JobStatus::Completed));
        // Skipping ahead is forward, so allowed
        assert!(JobStatus::Fetching.can_transition_to(JobStatus::Chunking));

        assert!(!JobStatus::Cleaning.can_transition_to(JobStatus::Fetching));
        assert!(!JobStatus::Chunking.can_transition_to(JobStatus::Chunking));
        assert!(!JobStatus::Fetching.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn failure_and_cancellation_reachable_from_any_in_progress_state() {
        for status in [
            JobStatus::Pending,
            JobStatus::Fetching,
            JobStatus::Cleaning,
            JobStatus::Chunking,
            JobStatus::Embedding,
            JobStatus::Storing,
        ] {
            assert!(status.can_transition_to(JobStatus::Failed));
            assert!(status.can_transition_to(JobStatus::Cancelled));
        }
    }

    #[test]
    fn terminal_states_never_transition() {
        for status in [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled] {
            assert!(!status.can_transition_to(JobStatus::Fetching));
            assert!(!status.can_transition_to(JobStatus::Failed));
        }
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            JobStatus::Pending,
            JobStatus::Fetching,
            JobStatus::Cleaning,
            JobStatus::Chunking,
            JobStatus::Embedding,
            JobStatus::Storing,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(status.to_string().parse::<JobStatus>().ok(), Some(status));
        }
    }

    #[test]
    fn patch_applies_partially() {
        let mut job = IngestionJob::new(
            Uuid::new_v4(),
            "corr".to_string(),
            "tenant-a".to_string(),
            SourceKind::FileUpload,
            serde_json::json!({}),
            serde_json::json!({}),
        );

        let patch = JobPatch {
            status: Some(JobStatus::Fetching),
            documents_stored: Some(3),
            push_stage: Some("fetch".to_string()),
            ..JobPatch::default()
        };
        job.apply(&patch);

        assert_eq!(job.status, JobStatus::Fetching);
        assert_eq!(job.documents_stored, 3);
        assert_eq!(job.stages_completed, vec!["fetch".to_string()]);
        assert_eq!(job.chunks_created, 0);
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn filter_matches_subset_of_fields() {
        let job = IngestionJob::new(
            Uuid::new_v4(),
            "corr".to_string(),
            "tenant-a".to_string(),
            SourceKind::UrlScrape,
            serde_json::json!({}),
            serde_json::json!({}),
        );

        let filter = JobFilter {
            tenant_id: Some("tenant-a".to_string()),
            ..JobFilter::default()
        };
        assert!(filter.matches(&job));

        let filter = JobFilter {
            tenant_id: Some("tenant-b".to_string()),
            ..JobFilter::default()
        };
        assert!(!filter.matches(&job));

        let filter = JobFilter {
            status: Some(JobStatus::Pending),
            created_before: Some(Utc::now() + chrono::Duration::minutes(1)),
            ..JobFilter::default()
        };
        assert!(filter.matches(&job));
    }
}
