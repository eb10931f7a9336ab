use std::fmt;

use serde::Serialize;

use vecload_core::types::{ProvisionAction, RecordId};

/// How a run that got past provisioning ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    /// No valid record survived parsing and encoding; no upsert was made.
    NothingToUpsert,
    /// A batch exhausted its retries and the failure policy stopped the run.
    Halted,
    CompletedWithFailures,
    Cancelled,
}

impl RunOutcome {
    /// Process exit code for this outcome.
    pub fn exit_code(self) -> u8 {
        match self {
            RunOutcome::Completed | RunOutcome::NothingToUpsert => 0,
            RunOutcome::Halted | RunOutcome::CompletedWithFailures | RunOutcome::Cancelled => 2,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunOutcome::Completed => "completed",
            RunOutcome::NothingToUpsert => "nothing to upsert",
            RunOutcome::Halted => "halted",
            RunOutcome::CompletedWithFailures => "completed with failures",
            RunOutcome::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchFailure {
    pub batch: usize,
    pub ids: Vec<RecordId>,
    pub attempts: u32,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub index: String,
    pub records_seen: usize,
    pub skipped_missing_id: usize,
    pub skipped_duplicate_id: usize,
    pub skipped_encode: usize,
    pub upserted: usize,
    pub batches_flushed: usize,
    pub failed_batches: Vec<BatchFailure>,
    pub provision_action: Option<ProvisionAction>,
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            records_seen: 0,
            skipped_missing_id: 0,
            skipped_duplicate_id: 0,
            skipped_encode: 0,
            upserted: 0,
            batches_flushed: 0,
            failed_batches: Vec::new(),
            provision_action: None,
            outcome: RunOutcome::Completed,
        }
    }

    pub fn skipped(&self) -> usize {
        self.skipped_missing_id + self.skipped_duplicate_id + self.skipped_encode
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "index '{}': {} ({} seen, {} upserted in {} batches, {} skipped",
            self.index,
            self.outcome,
            self.records_seen,
            self.upserted,
            self.batches_flushed,
            self.skipped()
        )?;
        if !self.failed_batches.is_empty() {
            let ids: Vec<String> = self.failed_batches.iter().map(|b| b.batch.to_string()).collect();
            write!(f, ", failed batches: {}", ids.join(", "))?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_line_mentions_failures() {
        let mut report = RunReport::new("banners");
        report.records_seen = 5;
        report.upserted = 3;
        report.batches_flushed = 1;
        report.skipped_missing_id = 1;
        report.failed_batches.push(BatchFailure { batch: 2, ids: vec!["x".into()], attempts: 3, error: "boom".into() });
        report.outcome = RunOutcome::CompletedWithFailures;
        assert_eq!(
            report.to_string(),
            "index 'banners': completed with failures (5 seen, 3 upserted in 1 batches, 1 skipped, failed batches: 2)"
        );
        assert_eq!(report.outcome.exit_code(), 2);
    }

    #[test]
    fn outcome_serializes_snake_case() {
        let v = serde_json::to_value(RunOutcome::NothingToUpsert).unwrap();
        assert_eq!(v, serde_json::json!("nothing_to_upsert"));
    }
}
