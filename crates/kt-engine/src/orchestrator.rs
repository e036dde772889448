//! Per-connection session loop: message dispatch, cycle accounting and
//! ordered teardown.

use std::sync::Arc;

use kt_optimizer::SearchService;
use kt_project::{scripts_for_sync, ProjectStore, ScriptRunner};
use kt_types::{SessionStart, TuneError, TuneResult, TuningMessage};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cluster::{ClusterSync, PeerLink};
use crate::config::DaemonConfig;
use crate::run::{StepOutcome, TuningRun};
use crate::session::{spawn_forwarder, MessageSink, Outbound, SessionLock};

/// Shared daemon state driving one session per client connection.
pub struct Orchestrator {
    config: Arc<DaemonConfig>,
    service: Arc<dyn SearchService>,
    runner: Arc<dyn ScriptRunner>,
    link: Arc<dyn PeerLink>,
    lock: Arc<SessionLock>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<DaemonConfig>,
        service: Arc<dyn SearchService>,
        runner: Arc<dyn ScriptRunner>,
        link: Arc<dyn PeerLink>,
        lock: Arc<SessionLock>,
    ) -> Self {
        Self {
            config,
            service,
            runner,
            lock,
            link,
        }
    }

    fn build_run(&self, start: &SessionStart) -> TuneResult<TuningRun> {
        let store = ProjectStore::new(&self.config.project_path);
        let project = store.resolve(&start.projects)?;
        let cluster = ClusterSync::from_config(&self.config, Arc::clone(&self.link));
        Ok(TuningRun::new(
            project,
            start,
            Arc::clone(&self.service),
            Arc::clone(&self.runner),
            cluster,
            &self.config.temp_path,
            self.config.skip_percentage,
        ))
    }

    /// Drive one duplex session to completion. Claims the daemon-wide
    /// session lock; a busy daemon replies with an ending status and bails.
    /// All queued messages are flushed before this returns.
    pub async fn run_session<S>(
        &self,
        mut inbound: mpsc::Receiver<TuningMessage>,
        sink: S,
    ) -> TuneResult<()>
    where
        S: MessageSink + 'static,
    {
        let session = Uuid::new_v4();
        let (out, forwarder) = spawn_forwarder(sink);

        let Some(_guard) = self.lock.try_acquire() else {
            let busy = TuneError::SessionBusy;
            out.send(TuningMessage::ending(busy.to_string()))?;
            drop(out);
            let _ = forwarder.await;
            return Err(TuneError::SessionBusy);
        };

        info!(%session, "tuning session opened");
        let mut run: Option<TuningRun> = None;
        // Remaining feature-filter cycles before the full tuning pass.
        let mut cycles: u32 = 0;
        let mut step = 0u32;

        let result = loop {
            let Some(message) = inbound.recv().await else {
                info!(%session, "session channel closed by client");
                break Ok(());
            };

            let outcome = match message {
                TuningMessage::SessionStart(start) => {
                    step += 1;
                    out.display(format!(
                        " {step}.Loading its corresponding tuning project: {}",
                        start.projects
                    ))?;
                    cycles = start.feature_filter_cycles;
                    let mut new_run = match self.build_run(&start) {
                        Ok(run) => run,
                        Err(e) => break Err(e),
                    };
                    step += 1;
                    let begun = if cycles > 0 {
                        out.display(format!(
                            " {step}.Starting to select the important parameters......"
                        ))?;
                        new_run.init_feature_sel(&out).await
                    } else if start.restart {
                        out.display(format!(" {step}.Continue to tuning the system......"))?;
                        new_run.init_tuned(&out).await
                    } else {
                        out.display(format!(" {step}.Start to tuning the system......"))?;
                        new_run.init_tuned(&out).await
                    };
                    run = Some(new_run);
                    begun
                }
                TuningMessage::BenchmarkResult { evaluation } => match run.as_mut() {
                    Some(run) => run.dynamic_tuned(&out, Some(&evaluation)).await,
                    None => break Err(TuneError::Internal("no session in progress".into())),
                },
                TuningMessage::RestartCycle => match run.as_mut() {
                    Some(run) => {
                        step += 1;
                        if cycles > 0 {
                            out.display(format!(
                                " {step}.Starting the next cycle of parameter selection......"
                            ))?;
                            run.init_feature_sel(&out).await
                        } else {
                            out.display(format!(" {step}.Start to tuning the system......"))?;
                            run.init_tuned(&out).await
                        }
                    }
                    None => break Err(TuneError::Internal("no session in progress".into())),
                },
                TuningMessage::SyncConfig { scripts } => {
                    let result = scripts_for_sync(self.runner.as_ref(), &scripts).await;
                    match result {
                        Ok(()) => {
                            out.send(TuningMessage::ending("sync config success"))?;
                            break Ok(());
                        }
                        Err(e) => break Err(e),
                    }
                }
                TuningMessage::Restore { project } => {
                    let start = SessionStart {
                        projects: project,
                        engine: String::new(),
                        iterations: 0,
                        restart: false,
                        random_starts: 0,
                        feature_filter_engine: String::new(),
                        feature_filter_iters: 0,
                        feature_filter_cycles: 0,
                    };
                    let mut restore_run = match self.build_run(&start) {
                        Ok(run) => run,
                        Err(e) => break Err(e),
                    };
                    let result = restore_run.restore_config(&out).await;
                    break result;
                }
                other => {
                    warn!(?other, "unexpected client message, ignoring");
                    continue;
                }
            };

            match outcome {
                Ok(StepOutcome::Continue) | Ok(StepOutcome::Threshold) => {}
                Ok(StepOutcome::Finished) => {
                    if cycles > 0 {
                        cycles -= 1;
                        out.send(TuningMessage::CycleRestart)?;
                    } else {
                        out.send(TuningMessage::ending("tuning finished"))?;
                        break Ok(());
                    }
                }
                Err(e) => break Err(e),
            }
        };

        if let Some(mut run) = run.take() {
            run.delete_task().await;
        }
        if let Err(e) = &result {
            error!(%session, error = %e, "session failed");
            let _ = out.send(TuningMessage::ending(format!("error: {e}")));
        }

        // Ordered teardown: close the queue, then wait for the forwarder to
        // drain it before releasing the session.
        drop(out);
        let _ = forwarder.await;
        result
    }
}
