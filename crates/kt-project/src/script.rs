//! External script hooks: reading a knob's live value, applying a candidate,
//! and restarting the tuned workload.

use async_trait::async_trait;
use kt_types::{CandidateSetting, TuneError, TuneResult};
use tracing::{debug, info};

use crate::definition::ProjectDefinition;

/// Seam for executing external shell hooks, so the engine can run without a
/// shell in tests.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Execute `command` and return its trimmed stdout.
    async fn exec(&self, command: &str) -> TuneResult<String>;
}

/// Runs hooks through `sh -c`.
#[derive(Debug, Default, Clone)]
pub struct ShellRunner;

#[async_trait]
impl ScriptRunner for ShellRunner {
    async fn exec(&self, command: &str) -> TuneResult<String> {
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await
            .map_err(|e| TuneError::script(command, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TuneError::script(command, stderr.trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// A project bound to a script runner: the apply/restart/read-value surface
/// the iteration engine drives.
pub struct ProjectRuntime<'a> {
    project: &'a ProjectDefinition,
    runner: &'a dyn ScriptRunner,
}

impl<'a> ProjectRuntime<'a> {
    pub fn new(project: &'a ProjectDefinition, runner: &'a dyn ScriptRunner) -> Self {
        Self { project, runner }
    }

    /// Apply a candidate: every knob, in definition order, runs its `set`
    /// hook with `$value` substituted from the candidate. Returns the
    /// executed commands joined for peer propagation.
    ///
    /// Walking knobs in order (not the candidate) is what makes the merge
    /// policy hold: the later duplicate of a name applies last and wins.
    pub async fn apply(&self, candidate: &CandidateSetting) -> TuneResult<String> {
        let mut scripts = Vec::new();
        for knob in self.project.knobs.iter() {
            let Some(value) = candidate.value_of(&knob.name) else {
                continue;
            };
            if knob.set.is_empty() {
                continue;
            }
            let command = knob.set.replace("$value", value);
            debug!(knob = %knob.name, %command, "applying knob");
            self.runner.exec(&command).await?;
            scripts.push(command);
        }
        info!(project = %self.project.project, knobs = scripts.len(), "candidate applied");
        Ok(scripts.join(","))
    }

    /// Run the project's restart hook, returning the command for propagation
    /// (empty when the project declares none).
    pub async fn restart(&self) -> TuneResult<String> {
        if self.project.restart.is_empty() {
            return Ok(String::new());
        }
        self.runner.exec(&self.project.restart).await?;
        info!(project = %self.project.project, "workload restarted");
        Ok(self.project.restart.clone())
    }

    /// Read the live value of every non-skipped knob via its `get` hook.
    pub async fn read_values(&self) -> TuneResult<CandidateSetting> {
        let mut pairs = Vec::new();
        for knob in self.project.active_knobs() {
            if knob.get.is_empty() {
                continue;
            }
            let value = self.runner.exec(&knob.get).await?;
            pairs.push((knob.name.clone(), value));
        }
        Ok(CandidateSetting { pairs })
    }
}

/// Execute a comma-joined list of peer-propagated commands locally.
pub async fn scripts_for_sync(runner: &dyn ScriptRunner, scripts: &str) -> TuneResult<()> {
    for command in scripts.split(',').filter(|c| !c.trim().is_empty()) {
        runner.exec(command).await?;
    }
    info!("set the parameter success");
    Ok(())
}
