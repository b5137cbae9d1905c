//! The five pipeline stages

use docflow_job_data::JobStatus;

/// One of the five ordered stages a job passes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Fetch,
    Clean,
    Chunk,
    Embed,
    Store,
}

impl StageKind {
    /// Every stage in execution order
    pub const ALL: [Self; 5] = [Self::Fetch, Self::Clean, Self::Chunk, Self::Embed, Self::Store];

    /// Stage name recorded in `stages_completed` and telemetry
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Clean => "clean",
            Self::Chunk => "chunk",
            Self::Embed => "embed",
            Self::Store => "store",
        }
    }

    /// The in-progress job status for this stage
    pub const fn in_progress_status(self) -> JobStatus {
        match self {
            Self::Fetch => JobStatus::Fetching,
            Self::Clean => JobStatus::Cleaning,
            Self::Chunk => JobStatus::Chunking,
            Self::Embed => JobStatus::Embedding,
            Self::Store => JobStatus::Storing,
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_statuses_follow_the_state_machine_order() {
        let statuses: Vec<JobStatus> = StageKind::ALL
            .iter()
            .map(|stage| stage.in_progress_status())
            .collect();
        for pair in statuses.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]));
        }
    }
}
