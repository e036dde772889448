//! Append-only per-project iteration history, the sole resume source of
//! truth.
//!
//! Format: one line per completed iteration,
//! `iteration|startTime|endTime|evaluationString|parameterString` with
//! exactly five pipe-delimited fields. Lines with any other field count are
//! skipped silently on read.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use kt_types::{Evaluation, TuneResult};
use tracing::{debug, warn};

/// On-disk timestamp format of log entries.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One completed iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub iteration: u32,
    pub start_time: String,
    pub end_time: String,
    pub evaluation: String,
    pub candidate: String,
}

impl LogEntry {
    fn to_line(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.iteration, self.start_time, self.end_time, self.evaluation, self.candidate
        )
    }
}

/// History recovered from the log when resuming an interrupted run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogRecovery {
    /// Candidate history, one `name=value` vector per iteration.
    pub x_ref: Vec<Vec<String>>,
    /// Objective history matching `x_ref`.
    pub y_ref: Vec<String>,
    /// Objective of the first logged iteration.
    pub base_objective: Option<f64>,
    /// Running minimum across all logged iterations.
    pub min_objective: f64,
    /// Accumulated (end - start) wall-clock seconds.
    pub total_secs: f64,
    /// Highest iteration number seen.
    pub iterations: u32,
}

/// The per-project tuning log file.
#[derive(Debug, Clone)]
pub struct TuningLog {
    path: PathBuf,
    project: String,
}

impl TuningLog {
    pub fn new<P: AsRef<Path>>(temp_path: P, project: &str) -> Self {
        Self {
            path: temp_path.as_ref().join(format!("{project}_tuning.log")),
            project: project.to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the log (and its directory) and append the project header.
    pub fn create_header(&self) -> TuneResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "project {}", self.project)?;
        Ok(())
    }

    /// Append one completed iteration. Entries are strictly append-ordered;
    /// the write happens before the next remote submission.
    pub fn append(&self, entry: &LogEntry) -> TuneResult<()> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", entry.to_line())?;
        debug!(iteration = entry.iteration, path = %self.path.display(), "log entry appended");
        Ok(())
    }

    /// Replay the log into resume history. Malformed lines (wrong field
    /// count, unparsable objective) are skipped; a missing file yields an
    /// empty recovery.
    pub fn recover(&self) -> LogRecovery {
        let mut recovery = LogRecovery::default();
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "no tuning log to recover");
                return recovery;
            }
        };

        for line in raw.lines() {
            let fields: Vec<&str> = line.split('|').collect();
            if fields.len() != 5 {
                continue;
            }
            let Ok(iteration) = fields[0].parse::<u32>() else {
                continue;
            };
            let Ok(evaluation) = Evaluation::parse(fields[3]) else {
                continue;
            };
            let objective = evaluation.objective();

            recovery.iterations = iteration;
            if iteration == 1 {
                recovery.base_objective = Some(objective);
                recovery.min_objective = objective;
            } else if objective < recovery.min_objective {
                recovery.min_objective = objective;
            }

            if let (Ok(start), Ok(end)) = (
                NaiveDateTime::parse_from_str(fields[1], TIME_FORMAT),
                NaiveDateTime::parse_from_str(fields[2], TIME_FORMAT),
            ) {
                recovery.total_secs += (end - start).num_seconds() as f64;
            }

            recovery
                .x_ref
                .push(fields[4].split(',').map(str::to_string).collect());
            recovery.y_ref.push(objective.to_string());
        }
        recovery
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(iteration: u32, evaluation: &str, candidate: &str) -> LogEntry {
        LogEntry {
            iteration,
            start_time: "2026-08-26 10:00:00".into(),
            end_time: "2026-08-26 10:00:30".into(),
            evaluation: evaluation.into(),
            candidate: candidate.into(),
        }
    }

    #[test]
    fn write_then_recover_round_trip() {
        let dir = tempdir().unwrap();
        let log = TuningLog::new(dir.path(), "web");
        log.create_header().unwrap();
        log.append(&entry(1, "cpu=10,mem=5", "a=1,b=2")).unwrap();
        log.append(&entry(2, "cpu=8,mem=4", "a=3,b=4")).unwrap();
        log.append(&entry(3, "cpu=9,mem=9", "a=5,b=6")).unwrap();

        let recovery = log.recover();
        assert_eq!(recovery.x_ref.len(), 3);
        assert_eq!(recovery.y_ref.len(), 3);
        assert_eq!(recovery.x_ref[1], ["a=3", "b=4"]);
        assert_eq!(recovery.base_objective, Some(15.0));
        assert_eq!(recovery.min_objective, 12.0);
        assert_eq!(recovery.iterations, 3);
        assert_eq!(recovery.total_secs, 90.0);
    }

    #[test]
    fn header_and_malformed_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let log = TuningLog::new(dir.path(), "web");
        log.create_header().unwrap();
        log.append(&entry(1, "cpu=10", "a=1")).unwrap();
        std::fs::write(
            log.path(),
            std::fs::read_to_string(log.path()).unwrap() + "only|three|fields\n",
        )
        .unwrap();

        let recovery = log.recover();
        assert_eq!(recovery.y_ref.len(), 1);
    }

    #[test]
    fn missing_file_recovers_empty() {
        let dir = tempdir().unwrap();
        let log = TuningLog::new(dir.path(), "never-run");
        let recovery = log.recover();
        assert!(recovery.x_ref.is_empty());
        assert_eq!(recovery.iterations, 0);
    }

    #[test]
    fn running_minimum_tracks_first_iteration_base() {
        let dir = tempdir().unwrap();
        let log = TuningLog::new(dir.path(), "web");
        log.create_header().unwrap();
        // First objective is the base even when later ones are higher.
        log.append(&entry(1, "lat=20", "a=1")).unwrap();
        log.append(&entry(2, "lat=35", "a=2")).unwrap();

        let recovery = log.recover();
        assert_eq!(recovery.base_objective, Some(20.0));
        assert_eq!(recovery.min_objective, 20.0);
    }
}
