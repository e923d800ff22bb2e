//! Result aggregator
//!
//! Sole writer of the client-side `AnalysisResult`. Fragments are merged by
//! column name, a `done` payload replaces everything, an `error` keeps what has
//! been accumulated and flags the document.

use crate::model::{AnalysisResult, AnalysisStatus, ColumnAnalysis, RunSeed, Summary};
use crate::protocol::{ErrorPayload, ServerEvent};

/// What applying an event did to the aggregate
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Progress(f64),
    Merged { added: usize, replaced: usize },
    Replaced,
    Failed(ErrorPayload),
}

/// Cumulative result of the current run
#[derive(Debug, Default)]
pub struct ResultAggregator {
    result: Option<AnalysisResult>,
    progress: Option<f64>,
    error: Option<ErrorPayload>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        self.result.as_ref()
    }

    pub fn progress(&self) -> Option<f64> {
        self.progress
    }

    /// Payload of the failure that ended the run, if any
    pub fn error(&self) -> Option<&ErrorPayload> {
        self.error.as_ref()
    }

    /// Reset to an empty result for a new run
    pub fn begin_run(&mut self, seed: &RunSeed) {
        self.result = Some(AnalysisResult::skeleton(seed));
        self.progress = None;
        self.error = None;
    }

    /// Fold one server event into the aggregate
    pub fn apply(&mut self, event: &ServerEvent) -> Applied {
        match event {
            ServerEvent::Progress { value } => {
                self.progress = Some(*value);
                Applied::Progress(*value)
            }
            ServerEvent::PartialResult { payload } => {
                let (added, replaced) = self.merge(payload);
                Applied::Merged { added, replaced }
            }
            ServerEvent::Done { payload } => {
                self.result = Some(payload.as_ref().clone());
                Applied::Replaced
            }
            ServerEvent::Error { payload } => {
                self.fail(payload.clone());
                Applied::Failed(payload.clone())
            }
        }
    }

    /// Flag the run as failed, keeping accumulated columns
    pub fn fail(&mut self, payload: ErrorPayload) {
        if let Some(result) = self.result.as_mut() {
            result.status = AnalysisStatus::Error;
        }
        self.error = Some(payload);
    }

    fn merge(&mut self, fragment: &[ColumnAnalysis]) -> (usize, usize) {
        // Fragments only arrive after begin_run; guard anyway for a stray event
        let Some(result) = self.result.as_mut() else {
            tracing::warn!(columns = fragment.len(), "fragment without an active run dropped");
            return (0, 0);
        };

        let columns = &mut result.data.columns_analysis;
        let mut added = 0;
        let mut replaced = 0;

        for incoming in fragment {
            match columns
                .iter_mut()
                .find(|c| c.column_name == incoming.column_name)
            {
                Some(existing) => {
                    *existing = incoming.clone();
                    replaced += 1;
                }
                None => {
                    columns.push(incoming.clone());
                    added += 1;
                }
            }
        }

        result.data.summary = Summary::from_columns(columns);
        let analyzed = columns.len() as u32;
        let table_info = &mut result.data.table_info;
        table_info.analyzed_columns = analyzed;
        table_info.total_columns = table_info.total_columns.max(analyzed);

        (added, replaced)
    }
}
