//! Health reports and their line-oriented JSON encoding.
//!
//! A report carries one observer's view of one subject: a set of named
//! metrics, each with a [`Status`] and a score. Report files hold one JSON
//! object per line; blank lines and lines starting with `#` are skipped.
//!
//! ```text
//! {"observer":"peer@1","subject":"peer@2","time_ms":1700000000000,
//!  "metrics":{"cpu":{"status":"healthy","score":0.9}}}
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::status::Status;

/// Errors that can occur while decoding a report line.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("line {line}: malformed report: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("line {line}: empty subject")]
    EmptySubject { line: usize },

    #[error("line {line}: report carries no metrics")]
    NoMetrics { line: usize },

    #[error("line {line}: empty metric name")]
    EmptyMetricName { line: usize },

    #[error("line {line}: metric {name}: non-finite score {score}")]
    NonFiniteScore {
        line: usize,
        name: String,
        score: f32,
    },
}

impl ReportError {
    /// Short label for the error kind, used as a metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed { .. } => "malformed",
            Self::EmptySubject { .. } => "empty_subject",
            Self::NoMetrics { .. } => "no_metrics",
            Self::EmptyMetricName { .. } => "empty_metric_name",
            Self::NonFiniteScore { .. } => "non_finite_score",
        }
    }

    /// 1-based input line the error refers to.
    pub fn line(&self) -> usize {
        match self {
            Self::Malformed { line, .. }
            | Self::EmptySubject { line }
            | Self::NoMetrics { line }
            | Self::EmptyMetricName { line }
            | Self::NonFiniteScore { line, .. } => *line,
        }
    }
}

/// A single observed metric within a report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub status: Status,
    pub score: f32,
}

/// One observer's report about one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    #[serde(default)]
    pub observer: String,
    pub subject: String,
    /// Observation time in milliseconds since the Unix epoch, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_ms: Option<u64>,
    pub metrics: BTreeMap<String, Metric>,
}

impl Report {
    /// Creates a report with a single metric.
    pub fn single(
        observer: impl Into<String>,
        subject: impl Into<String>,
        name: impl Into<String>,
        status: Status,
        score: f32,
    ) -> Self {
        let mut metrics = BTreeMap::new();
        metrics.insert(name.into(), Metric { status, score });

        Self {
            observer: observer.into(),
            subject: subject.into(),
            time_ms: None,
            metrics,
        }
    }

    /// Checks the fields a buffer insert relies on.
    pub fn validate(&self, line: usize) -> Result<(), ReportError> {
        if self.subject.is_empty() {
            return Err(ReportError::EmptySubject { line });
        }

        if self.metrics.is_empty() {
            return Err(ReportError::NoMetrics { line });
        }

        for (name, metric) in &self.metrics {
            if name.is_empty() {
                return Err(ReportError::EmptyMetricName { line });
            }
            if !metric.score.is_finite() {
                return Err(ReportError::NonFiniteScore {
                    line,
                    name: name.clone(),
                    score: metric.score,
                });
            }
        }

        Ok(())
    }

    /// Whether the report is older than `cutoff` at `now_ms`.
    ///
    /// A zero cutoff disables the check, and reports without a timestamp are
    /// never stale.
    pub fn is_stale(&self, now_ms: u64, cutoff: Duration) -> bool {
        if cutoff.is_zero() {
            return false;
        }

        match self.time_ms {
            Some(ts) => now_ms.saturating_sub(ts) > cutoff.as_millis() as u64,
            None => false,
        }
    }
}

/// Decode and validate a single report line.
pub fn parse_line(line: usize, text: &str) -> Result<Report, ReportError> {
    let report: Report = serde_json::from_str(text)
        .map_err(|source| ReportError::Malformed { line, source })?;

    report.validate(line)?;

    Ok(report)
}

/// Decode every report line in `input`, skipping blank and `#` lines.
///
/// Errors are returned in place so callers can count them and keep going.
pub fn parse_lines(input: &str) -> Vec<Result<Report, ReportError>> {
    input
        .lines()
        .enumerate()
        .filter(|(_, text)| {
            let trimmed = text.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .map(|(idx, text)| parse_line(idx + 1, text))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_line() {
        let text = r#"{"observer":"peer@1","subject":"peer@2","time_ms":1000,"metrics":{"cpu":{"status":"healthy","score":0.9},"disk":{"status":"unhealthy","score":0.1}}}"#;
        let report = parse_line(1, text).expect("valid report");

        assert_eq!(report.observer, "peer@1");
        assert_eq!(report.subject, "peer@2");
        assert_eq!(report.time_ms, Some(1000));
        assert_eq!(report.metrics.len(), 2);
        assert_eq!(
            report.metrics["disk"],
            Metric {
                status: Status::Unhealthy,
                score: 0.1
            }
        );
    }

    #[test]
    fn test_parse_observer_and_time_optional() {
        let text = r#"{"subject":"s","metrics":{"n":{"status":"dying","score":0}}}"#;
        let report = parse_line(3, text).expect("valid report");
        assert!(report.observer.is_empty());
        assert_eq!(report.time_ms, None);
    }

    #[test]
    fn test_parse_malformed() {
        let err = parse_line(7, "{not json").expect_err("should fail");
        assert_eq!(err.kind(), "malformed");
        assert_eq!(err.line(), 7);
        assert!(err.to_string().starts_with("line 7: malformed report"));
    }

    #[test]
    fn test_parse_unknown_status_is_malformed() {
        let text = r#"{"subject":"s","metrics":{"n":{"status":"fine","score":1}}}"#;
        let err = parse_line(1, text).expect_err("should fail");
        assert_eq!(err.kind(), "malformed");
    }

    #[test]
    fn test_parse_empty_subject() {
        let text = r#"{"subject":"","metrics":{"n":{"status":"healthy","score":1}}}"#;
        let err = parse_line(2, text).expect_err("should fail");
        assert!(matches!(err, ReportError::EmptySubject { line: 2 }));
    }

    #[test]
    fn test_parse_no_metrics() {
        let text = r#"{"subject":"s","metrics":{}}"#;
        let err = parse_line(1, text).expect_err("should fail");
        assert!(matches!(err, ReportError::NoMetrics { .. }));
    }

    #[test]
    fn test_parse_empty_metric_name() {
        let text = r#"{"subject":"s","metrics":{"":{"status":"healthy","score":1}}}"#;
        let err = parse_line(1, text).expect_err("should fail");
        assert_eq!(err.kind(), "empty_metric_name");
    }

    #[test]
    fn test_validate_non_finite_score() {
        let report = Report::single("o", "s", "cpu", Status::Healthy, f32::NAN);
        let err = report.validate(4).expect_err("should fail");
        assert_eq!(err.kind(), "non_finite_score");
        assert!(err.to_string().contains("metric cpu"));
    }

    #[test]
    fn test_parse_overflowing_score() {
        let text = r#"{"subject":"s","metrics":{"n":{"status":"healthy","score":1e300}}}"#;
        let err = parse_line(1, text).expect_err("should fail");
        assert_eq!(err.kind(), "non_finite_score");
    }

    #[test]
    fn test_parse_lines_skips_blank_and_comments() {
        let input = "\n# header\n{\"subject\":\"a\",\"metrics\":{\"x\":{\"status\":\"healthy\",\"score\":1}}}\n   \nbroken\n";
        let results = parse_lines(input);
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());

        let err = results[1].as_ref().expect_err("line 5 is broken");
        assert_eq!(err.line(), 5);
    }

    #[test]
    fn test_is_stale() {
        let mut report = Report::single("o", "s", "cpu", Status::Healthy, 1.0);
        let cutoff = Duration::from_secs(300);

        assert!(!report.is_stale(1_000_000, cutoff));

        report.time_ms = Some(1_000_000);
        assert!(!report.is_stale(1_000_000 + 300_000, cutoff));
        assert!(report.is_stale(1_000_000 + 300_001, cutoff));
        assert!(!report.is_stale(1_000_000 + 300_001, Duration::ZERO));

        // Timestamps from the future are not stale.
        assert!(!report.is_stale(10, cutoff));
    }
}
