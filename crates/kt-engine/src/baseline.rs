//! Baseline capture and restore.
//!
//! The baseline file holds the pre-tuning value of every tunable parameter
//! as a single comma-joined `name=value` line. It is truncated on every
//! write, never appended, and must exist before a restore can succeed.

use std::path::{Path, PathBuf};

use kt_project::ProjectRuntime;
use kt_types::{CandidateSetting, TuneError, TuneResult};
use tracing::info;

/// Manages one project's baseline snapshot.
#[derive(Debug, Clone)]
pub struct BaselineManager {
    path: PathBuf,
    project: String,
    taken: bool,
}

impl BaselineManager {
    pub fn new<P: AsRef<Path>>(temp_path: P, project: &str) -> Self {
        Self {
            path: temp_path.as_ref().join(format!("{project}-baseline.conf")),
            project: project.to_string(),
            taken: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this process already snapshotted the project.
    pub fn taken(&self) -> bool {
        self.taken
    }

    /// Snapshot the live value of every non-skipped knob. A second call in
    /// the same process is a no-op so later cycles cannot overwrite the
    /// true pre-tuning state.
    pub async fn backup(&mut self, runtime: &ProjectRuntime<'_>) -> TuneResult<()> {
        if self.taken {
            return Ok(());
        }
        let values = runtime.read_values().await?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, values.to_string())?;
        self.taken = true;
        info!(project = %self.project, path = %self.path.display(), "baseline captured");
        Ok(())
    }

    /// Read the persisted baseline. Fails with a descriptive error when the
    /// project was never tuned on this node.
    pub fn read(&self) -> TuneResult<CandidateSetting> {
        if !self.path.exists() {
            return Err(TuneError::BaselineMissing(self.project.clone()));
        }
        let raw = std::fs::read_to_string(&self.path)?;
        Ok(CandidateSetting::parse(raw.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kt_project::{ProjectDefinition, ScriptRunner};
    use kt_types::Knob;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::tempdir;

    struct CountingRunner {
        calls: AtomicU32,
    }

    #[async_trait]
    impl ScriptRunner for CountingRunner {
        async fn exec(&self, command: &str) -> TuneResult<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{command}-{n}"))
        }
    }

    fn project() -> ProjectDefinition {
        let mut prj = ProjectDefinition::new("web", 10);
        prj.knobs = vec![
            Knob::named("a").with_scripts("get-a", "set-a $value"),
            Knob::named("b").with_scripts("get-b", "set-b $value").with_skip(true),
            Knob::named("c").with_scripts("get-c", "set-c $value"),
        ];
        prj
    }

    #[tokio::test]
    async fn backup_writes_non_skipped_pairs_once() {
        let dir = tempdir().unwrap();
        let prj = project();
        let runner = CountingRunner {
            calls: AtomicU32::new(0),
        };
        let runtime = ProjectRuntime::new(&prj, &runner);
        let mut baseline = BaselineManager::new(dir.path(), "web");

        baseline.backup(&runtime).await.unwrap();
        assert!(baseline.taken());
        assert_eq!(
            std::fs::read_to_string(baseline.path()).unwrap(),
            "a=get-a-0,c=get-c-1"
        );

        // Second call must not re-read or overwrite.
        baseline.backup(&runtime).await.unwrap();
        assert_eq!(runner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn backup_truncates_previous_content() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("web-baseline.conf"), "stale=1,stale=2").unwrap();
        let prj = project();
        let runner = CountingRunner {
            calls: AtomicU32::new(0),
        };
        let runtime = ProjectRuntime::new(&prj, &runner);
        let mut baseline = BaselineManager::new(dir.path(), "web");

        baseline.backup(&runtime).await.unwrap();
        let content = std::fs::read_to_string(baseline.path()).unwrap();
        assert!(!content.contains("stale"));
    }

    #[test]
    fn read_without_baseline_is_never_tuned_error() {
        let dir = tempdir().unwrap();
        let baseline = BaselineManager::new(dir.path(), "mysql");
        let err = baseline.read().unwrap_err();
        assert!(matches!(err, TuneError::BaselineMissing(p) if p == "mysql"));
    }

    #[test]
    fn read_parses_pairs() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("web-baseline.conf"), "a=1,b=2\n").unwrap();
        let baseline = BaselineManager::new(dir.path(), "web");
        let values = baseline.read().unwrap();
        assert_eq!(values.value_of("b"), Some("2"));
    }
}
