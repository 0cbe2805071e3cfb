use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::invocation::InvocationResult;
use crate::error::ErrorKind;

/// How many recent records are included in [`ExecutionStats`]
const RECENT_RECORDS: usize = 10;

/// Record of one finished invocation
#[derive(Debug, Clone, Serialize)]
pub struct InvocationRecord {
    pub invocation_id: String,
    pub tool_name: String,
    pub started_at: DateTime<Utc>,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Caller-facing error text; internal failures carry the generic message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl InvocationRecord {
    pub fn from_result(
        invocation_id: impl Into<String>,
        started_at: DateTime<Utc>,
        result: &InvocationResult,
    ) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            tool_name: result.tool_name.clone(),
            started_at,
            duration: result.duration,
            success: result.is_success(),
            error_kind: result.error_kind(),
            error_message: result.error().map(|e| e.message.clone()),
        }
    }
}

fn as_millis<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Aggregate statistics over the retained history
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionStats {
    pub total_executions: usize,
    pub successful_executions: usize,
    pub failed_executions: usize,
    pub success_rate: f64,
    pub average_duration_ms: f64,
    pub tool_usage: BTreeMap<String, usize>,
    pub errors_by_kind: BTreeMap<String, usize>,
    pub recent_executions: Vec<InvocationRecord>,
}

/// Bounded, append-only log of invocation records
pub struct ExecutionHistory {
    capacity: usize,
    records: Mutex<VecDeque<InvocationRecord>>,
}

impl ExecutionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub fn record(&self, record: InvocationRecord) {
        let mut records = self.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the retained records, oldest first
    pub fn records(&self) -> Vec<InvocationRecord> {
        self.lock().iter().cloned().collect()
    }

    pub fn stats(&self) -> ExecutionStats {
        let records = self.lock();
        if records.is_empty() {
            return ExecutionStats::default();
        }

        let total = records.len();
        let successful = records.iter().filter(|r| r.success).count();
        let total_ms: f64 = records
            .iter()
            .map(|r| r.duration.as_secs_f64() * 1000.0)
            .sum();

        let mut tool_usage = BTreeMap::new();
        let mut errors_by_kind = BTreeMap::new();
        for record in records.iter() {
            *tool_usage.entry(record.tool_name.clone()).or_insert(0) += 1;
            if let Some(kind) = record.error_kind {
                *errors_by_kind.entry(kind.to_string()).or_insert(0) += 1;
            }
        }

        ExecutionStats {
            total_executions: total,
            successful_executions: successful,
            failed_executions: total - successful,
            success_rate: successful as f64 / total as f64,
            average_duration_ms: total_ms / total as f64,
            tool_usage,
            errors_by_kind,
            recent_executions: records.iter().rev().take(RECENT_RECORDS).rev().cloned().collect(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<InvocationRecord>> {
        // A panic while holding the lock cannot leave a record half-written
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tool: &str, success: bool, millis: u64) -> InvocationRecord {
        InvocationRecord {
            invocation_id: uuid::Uuid::new_v4().to_string(),
            tool_name: tool.to_string(),
            started_at: Utc::now(),
            duration: Duration::from_millis(millis),
            success,
            error_kind: (!success).then_some(ErrorKind::UpstreamError),
            error_message: (!success).then(|| "graph: 503 Service Unavailable".to_string()),
        }
    }

    #[test]
    fn empty_history_has_zero_stats() {
        let stats = ExecutionHistory::new(10).stats();
        assert_eq!(stats.total_executions, 0);
        assert_eq!(stats.success_rate, 0.0);
    }

    #[test]
    fn history_is_bounded_and_drops_oldest() {
        let history = ExecutionHistory::new(3);
        for i in 0..5 {
            history.record(record(&format!("tool_{}", i), true, 1));
        }

        let names: Vec<String> = history.records().into_iter().map(|r| r.tool_name).collect();
        assert_eq!(names, vec!["tool_2", "tool_3", "tool_4"]);
    }

    #[test]
    fn stats_aggregate_outcomes() {
        let history = ExecutionHistory::new(100);
        history.record(record("m365_user_management", true, 10));
        history.record(record("m365_user_management", false, 30));
        history.record(record("cost_analysis", true, 20));
        history.record(record("cost_analysis", true, 20));

        let stats = history.stats();
        assert_eq!(stats.total_executions, 4);
        assert_eq!(stats.successful_executions, 3);
        assert_eq!(stats.failed_executions, 1);
        assert_eq!(stats.success_rate, 0.75);
        assert_eq!(stats.average_duration_ms, 20.0);
        assert_eq!(stats.tool_usage["m365_user_management"], 2);
        assert_eq!(stats.errors_by_kind["UPSTREAM_ERROR"], 1);
        assert_eq!(stats.recent_executions.len(), 4);

        let failed = &stats.recent_executions[1];
        assert!(!failed.success);
        assert_eq!(
            failed.error_message.as_deref(),
            Some("graph: 503 Service Unavailable")
        );
        assert_eq!(stats.recent_executions[0].error_message, None);

        let rendered = serde_json::to_value(&stats).unwrap();
        assert_eq!(
            rendered["recent_executions"][1]["error_message"],
            "graph: 503 Service Unavailable"
        );
        assert!(rendered["recent_executions"][0].get("error_message").is_none());
    }

    #[test]
    fn recent_executions_are_capped() {
        let history = ExecutionHistory::new(100);
        for i in 0..15 {
            history.record(record(&format!("tool_{}", i), true, 1));
        }

        let recent = history.stats().recent_executions;
        assert_eq!(recent.len(), RECENT_RECORDS);
        assert_eq!(recent.first().unwrap().tool_name, "tool_5");
        assert_eq!(recent.last().unwrap().tool_name, "tool_14");
    }
}
