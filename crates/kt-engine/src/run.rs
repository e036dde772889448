//! One tuning run: the iteration state machine driving the remote search
//! service, the local apply path, the tuning log and cluster propagation.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use kt_optimizer::{CreateTaskRequest, SearchService, SubmitRequest, TaskHandle};
use kt_project::{ProjectDefinition, ProjectRuntime, ScriptRunner};
use kt_types::{CandidateSetting, Evaluation, SessionStart, TuneError, TuneResult, TuningMessage, TuningSummary};
use tracing::{info, warn};

use crate::baseline::BaselineManager;
use crate::cluster::ClusterSync;
use crate::filter::partition;
use crate::session::Outbound;
use crate::tuning_log::{LogEntry, TuningLog, TIME_FORMAT};

/// What one benchmark-result step decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A new candidate was applied and sent for benchmarking.
    Continue,
    /// The candidate violated a relation; the client must re-benchmark
    /// without the run advancing.
    Threshold,
    /// The search finished and the remote task was released.
    Finished,
}

/// Mutable state of one session's tuning run over a resolved project.
pub struct TuningRun {
    project: ProjectDefinition,
    service: Arc<dyn SearchService>,
    runner: Arc<dyn ScriptRunner>,
    cluster: ClusterSync,
    log: TuningLog,
    baseline: BaselineManager,
    skip_percentage: f64,

    engine: String,
    requested_iterations: u32,
    restart: bool,
    random_starts: u32,
    feature_filter_engine: String,
    feature_filter_iters: u32,

    task: Option<TaskHandle>,
    feature_filter: bool,
    /// Names pruned by earlier filter cycles; excluded from new tasks.
    filtered_out: HashSet<String>,
    iteration: u32,
    max_iterations: u32,
    iter_start: NaiveDateTime,
    total_secs: f64,
    min_objective: f64,
    base_eval: String,
    min_eval: String,
    best_eval: String,
    last_param: String,
}

impl TuningRun {
    pub fn new(
        project: ProjectDefinition,
        start: &SessionStart,
        service: Arc<dyn SearchService>,
        runner: Arc<dyn ScriptRunner>,
        cluster: ClusterSync,
        temp_path: &Path,
        skip_percentage: f64,
    ) -> Self {
        let log = TuningLog::new(temp_path, &project.project);
        let baseline = BaselineManager::new(temp_path, &project.project);
        Self {
            project,
            service,
            runner,
            cluster,
            log,
            baseline,
            skip_percentage,
            engine: start.engine.clone(),
            requested_iterations: start.iterations,
            restart: start.restart,
            random_starts: start.random_starts,
            feature_filter_engine: start.feature_filter_engine.clone(),
            feature_filter_iters: start.feature_filter_iters,
            task: None,
            feature_filter: false,
            filtered_out: HashSet::new(),
            iteration: 0,
            max_iterations: 0,
            iter_start: Local::now().naive_local(),
            total_secs: 0.0,
            min_objective: 0.0,
            base_eval: String::new(),
            min_eval: String::new(),
            best_eval: String::new(),
            last_param: String::new(),
        }
    }

    pub fn project_name(&self) -> &str {
        &self.project.project
    }

    /// Begin the full tuning pass: clamp the budget to the project maximum,
    /// snapshot the baseline, create the remote task and request the first
    /// benchmark.
    pub async fn init_tuned(&mut self, out: &Outbound) -> TuneResult<StepOutcome> {
        self.feature_filter = false;
        let mut iterations = self.requested_iterations;
        if iterations > self.project.max_iterations {
            out.display(format!(
                "server project {} max iterations {}, use {} instead of {}",
                self.project.project, self.project.max_iterations, self.project.max_iterations, iterations
            ))?;
            iterations = self.project.max_iterations;
        }
        self.max_iterations = iterations;

        self.log.create_header()?;
        let runtime = ProjectRuntime::new(&self.project, self.runner.as_ref());
        self.baseline.backup(&runtime).await?;

        self.create_task(self.max_iterations, self.engine.clone())
            .await?;
        self.dynamic_tuned(out, None).await
    }

    /// Begin one feature-filter cycle against the filter engine.
    pub async fn init_feature_sel(&mut self, out: &Outbound) -> TuneResult<StepOutcome> {
        self.feature_filter = true;
        self.max_iterations = self.feature_filter_iters;

        self.log.create_header()?;
        let runtime = ProjectRuntime::new(&self.project, self.runner.as_ref());
        self.baseline.backup(&runtime).await?;

        self.create_task(self.feature_filter_iters, self.feature_filter_engine.clone())
            .await?;
        self.dynamic_tuned(out, None).await
    }

    /// Create the remote task, seeding it from the tuning log when resuming.
    async fn create_task(&mut self, iterations: u32, engine: String) -> TuneResult<()> {
        let mut request = CreateTaskRequest {
            max_eval: iterations,
            engine,
            random_starts: self.random_starts,
            knobs: self.search_knobs(),
            ..Default::default()
        };

        if self.restart {
            let recovery = self.log.recover();
            let history = recovery.y_ref.len() as u32;
            if iterations <= history {
                return Err(TuneError::BudgetExhausted);
            }
            request.max_eval = iterations - history;
            info!(
                history,
                remaining = request.max_eval,
                "resuming tuning from persisted log"
            );
            self.iteration = recovery.iterations;
            self.total_secs = recovery.total_secs;
            self.min_objective = recovery.min_objective;
            self.min_eval = format!("min={:.2}", recovery.min_objective);
            if let Some(base) = recovery.base_objective {
                self.base_eval = format!("base={base:.2}");
            }
            request.x_ref = recovery.x_ref;
            request.y_ref = recovery.y_ref;
        }

        let handle = self.service.create_task(request).await?;
        self.task = Some(handle);
        Ok(())
    }

    /// Advance the run by one step. `evaluation` carries the client's
    /// benchmark result for the previous candidate, absent on the very first
    /// call after task creation.
    pub async fn dynamic_tuned(
        &mut self,
        out: &Outbound,
        evaluation: Option<&str>,
    ) -> TuneResult<StepOutcome> {
        let value = match evaluation {
            Some(eval) => self.eval_parsing(eval)?,
            None => String::new(),
        };
        let task = self
            .task
            .clone()
            .ok_or_else(|| TuneError::Internal("no active optimizer task".into()))?;

        let response = self
            .service
            .submit(
                &task,
                SubmitRequest {
                    iterations: self.iteration,
                    value,
                },
            )
            .await?;
        self.last_param = response.param.clone();

        let candidate = CandidateSetting::parse(&response.param);
        if !response.finished && !self.project.match_relations(&candidate) {
            info!(param = %response.param, "candidate rejected by relation check");
            out.send(TuningMessage::Threshold)?;
            return Ok(StepOutcome::Threshold);
        }

        let runtime = ProjectRuntime::new(&self.project, self.runner.as_ref());
        let scripts = runtime.apply(&candidate).await?;
        self.cluster.propagate(&scripts).await?;
        let restart_cmd = runtime.restart().await?;
        self.cluster.propagate(&restart_cmd).await?;
        self.iter_start = Local::now().naive_local();

        if response.finished {
            let final_eval = self.best_eval.replace("=-", "=");
            out.display(format!(
                "\n The optimization result is: {}\n The evaluation value is: {}",
                response.param, final_eval
            ))?;
            self.filter_params(out, &response.rank)?;
            self.delete_task().await;
            self.iteration = 0;
            return Ok(StepOutcome::Finished);
        }

        self.iteration += 1;
        if self.iteration <= self.max_iterations {
            out.display(format!(
                "Current Tuning Progress......({}/{})",
                self.iteration, self.max_iterations
            ))?;
        }
        out.send(TuningMessage::BenchmarkRequest {
            candidate: response.param,
            summary: TuningSummary {
                base_eval: self.base_eval.clone(),
                min_eval: self.min_eval.clone(),
                total_time_secs: self.total_secs as i64,
                iteration: self.iteration,
            },
        })?;
        Ok(StepOutcome::Continue)
    }

    /// Log the client's evaluation and fold it into the running minimum.
    /// Returns the bare metric values for the next remote submission.
    fn eval_parsing(&mut self, eval: &str) -> TuneResult<String> {
        let end = Local::now().naive_local();
        self.log.append(&LogEntry {
            iteration: self.iteration,
            start_time: self.iter_start.format(TIME_FORMAT).to_string(),
            end_time: end.format(TIME_FORMAT).to_string(),
            evaluation: eval.to_string(),
            candidate: self.last_param.clone(),
        })?;
        self.total_secs += (end - self.iter_start).num_seconds() as f64;

        let evaluation = Evaluation::parse(eval)?;
        let objective = evaluation.objective();
        if self.iteration == 1 || objective < self.min_objective {
            self.min_objective = objective;
            self.min_eval = format!("min={objective:.2}");
            self.best_eval = eval.to_string();
        }
        if self.iteration == 1 {
            self.base_eval = format!("base={objective:.2}");
        }
        Ok(evaluation.submit_values())
    }

    /// Fold the finish-time importance ranking into the pruned set.
    fn filter_params(&mut self, out: &Outbound, rank: &str) -> TuneResult<()> {
        if rank.is_empty() {
            return Ok(());
        }
        let before = self.search_knobs().len();
        let outcome = partition(rank, self.skip_percentage);
        self.filtered_out.extend(outcome.skipped.iter().cloned());
        let after = self.search_knobs().len();

        if self.feature_filter {
            out.display(format!(
                "The important parameters are: {} ({before} -> {after})",
                outcome.summary()
            ))?;
        }
        Ok(())
    }

    /// Knobs offered to the next remote task: statically active and not
    /// pruned by an earlier filter cycle.
    fn search_knobs(&self) -> Vec<kt_types::Knob> {
        self.project
            .active_knobs()
            .filter(|k| !self.filtered_out.contains(&k.name))
            .cloned()
            .collect()
    }

    /// Revert the project to its baseline snapshot and propagate the revert.
    pub async fn restore_config(&mut self, out: &Outbound) -> TuneResult<()> {
        let values = self.baseline.read()?;
        let runtime = ProjectRuntime::new(&self.project, self.runner.as_ref());
        let scripts = runtime.apply(&values).await?;
        self.cluster.propagate(&scripts).await?;
        out.send(TuningMessage::ending(format!(
            "restore {} project params success",
            self.project.project
        )))?;
        Ok(())
    }

    /// Release the remote task. Best-effort: a delete failure is logged and
    /// swallowed so teardown always completes.
    pub async fn delete_task(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = self.service.delete_task(&task).await {
                warn!(task_id = %task.task_id, error = %e, "failed to delete optimizer task");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kt_optimizer::SubmitResponse;
    use kt_types::Knob;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::{tempdir, TempDir};
    use tokio::sync::mpsc;

    use crate::config::DaemonConfig;
    use crate::session::spawn_forwarder;

    struct ScriptedService {
        responses: Mutex<VecDeque<SubmitResponse>>,
        created: Mutex<Vec<CreateTaskRequest>>,
        submitted: Mutex<Vec<SubmitRequest>>,
        deletes: AtomicU32,
    }

    impl ScriptedService {
        fn new(responses: Vec<SubmitResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                created: Mutex::new(Vec::new()),
                submitted: Mutex::new(Vec::new()),
                deletes: AtomicU32::new(0),
            })
        }

        fn next(param: &str) -> SubmitResponse {
            SubmitResponse {
                param: param.into(),
                ..Default::default()
            }
        }

        fn finished(param: &str, rank: &str) -> SubmitResponse {
            SubmitResponse {
                param: param.into(),
                finished: true,
                rank: rank.into(),
            }
        }
    }

    #[async_trait]
    impl SearchService for ScriptedService {
        async fn create_task(&self, request: CreateTaskRequest) -> TuneResult<TaskHandle> {
            self.created.lock().unwrap().push(request);
            Ok(TaskHandle {
                task_id: "task-1".into(),
            })
        }

        async fn submit(
            &self,
            _task: &TaskHandle,
            request: SubmitRequest,
        ) -> TuneResult<SubmitResponse> {
            self.submitted.lock().unwrap().push(request);
            Ok(self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default())
        }

        async fn delete_task(&self, _task: &TaskHandle) -> TuneResult<()> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct NullRunner;

    #[async_trait]
    impl ScriptRunner for NullRunner {
        async fn exec(&self, command: &str) -> TuneResult<String> {
            Ok(format!("out:{command}"))
        }
    }

    fn project(max_iterations: u32) -> ProjectDefinition {
        let mut prj = ProjectDefinition::new("web", max_iterations);
        prj.knobs = vec![
            Knob::named("a").with_scripts("get-a", "set-a $value"),
            Knob::named("b").with_scripts("get-b", "set-b $value"),
        ];
        prj
    }

    fn start(iterations: u32) -> SessionStart {
        SessionStart {
            projects: "web".into(),
            engine: "bayes".into(),
            iterations,
            restart: false,
            random_starts: 2,
            feature_filter_engine: "lhs".into(),
            feature_filter_iters: 3,
            feature_filter_cycles: 0,
        }
    }

    struct Harness {
        run: TuningRun,
        service: Arc<ScriptedService>,
        _dir: TempDir,
    }

    fn harness(prj: ProjectDefinition, start: SessionStart, responses: Vec<SubmitResponse>) -> Harness {
        let dir = tempdir().unwrap();
        let service = ScriptedService::new(responses);
        let cluster = ClusterSync::from_config(
            &DaemonConfig::default(),
            Arc::new(crate::cluster::TcpPeerLink::new(60001)),
        );
        let run = TuningRun::new(
            prj,
            &start,
            service.clone(),
            Arc::new(NullRunner),
            cluster,
            dir.path(),
            0.6,
        );
        Harness {
            run,
            service,
            _dir: dir,
        }
    }

    async fn drain(
        out: crate::session::Outbound,
        handle: tokio::task::JoinHandle<()>,
        rx: &mut mpsc::UnboundedReceiver<TuningMessage>,
    ) -> Vec<TuningMessage> {
        drop(out);
        handle.await.unwrap();
        let mut messages = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            messages.push(msg);
        }
        messages
    }

    #[tokio::test]
    async fn init_clamps_budget_to_project_maximum() {
        let mut h = harness(project(5), start(50), vec![ScriptedService::next("a=1,b=2")]);
        let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
        let (out, handle) = spawn_forwarder(sink_tx);

        let outcome = h.run.init_tuned(&out).await.unwrap();
        assert_eq!(outcome, StepOutcome::Continue);
        assert_eq!(h.service.created.lock().unwrap()[0].max_eval, 5);

        let messages = drain(out, handle, &mut sink_rx).await;
        assert!(matches!(
            &messages[0],
            TuningMessage::Display { text } if text.contains("max iterations 5")
        ));
        // First candidate goes out with iteration 1.
        assert!(matches!(
            messages.last(),
            Some(TuningMessage::BenchmarkRequest { candidate, summary })
                if candidate == "a=1,b=2" && summary.iteration == 1
        ));
    }

    #[tokio::test]
    async fn first_evaluation_sets_base_and_submits_bare_values() {
        let mut h = harness(
            project(10),
            start(10),
            vec![
                ScriptedService::next("a=1,b=2"),
                ScriptedService::next("a=3,b=4"),
            ],
        );
        let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
        let (out, handle) = spawn_forwarder(sink_tx);

        h.run.init_tuned(&out).await.unwrap();
        let outcome = h.run.dynamic_tuned(&out, Some("cpu=10,mem=5")).await.unwrap();
        assert_eq!(outcome, StepOutcome::Continue);

        let submitted = h.service.submitted.lock().unwrap().clone();
        assert_eq!(submitted[0].value, "");
        assert_eq!(submitted[1].value, "10,5");
        assert_eq!(submitted[1].iterations, 1);

        let messages = drain(out, handle, &mut sink_rx).await;
        let request = messages
            .iter()
            .filter_map(|m| match m {
                TuningMessage::BenchmarkRequest { summary, .. } => Some(summary),
                _ => None,
            })
            .last()
            .unwrap();
        assert_eq!(request.base_eval, "base=15.00");
        assert_eq!(request.min_eval, "min=15.00");
        assert_eq!(request.iteration, 2);
    }

    #[tokio::test]
    async fn relation_violation_yields_threshold_without_advancing() {
        let mut prj = project(10);
        prj.relations = vec![kt_project::Relation {
            left: "a".into(),
            op: kt_project::RelationOp::Le,
            right: "b".into(),
        }];
        let mut h = harness(
            prj,
            start(10),
            vec![ScriptedService::next("a=9,b=1")],
        );
        let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
        let (out, handle) = spawn_forwarder(sink_tx);

        let outcome = h.run.init_tuned(&out).await.unwrap();
        assert_eq!(outcome, StepOutcome::Threshold);
        assert_eq!(h.run.iteration, 0);

        let messages = drain(out, handle, &mut sink_rx).await;
        assert!(messages.iter().any(|m| matches!(m, TuningMessage::Threshold)));
        assert!(!messages
            .iter()
            .any(|m| matches!(m, TuningMessage::BenchmarkRequest { .. })));
    }

    #[tokio::test]
    async fn finish_releases_task_and_resets_iteration() {
        let mut h = harness(
            project(10),
            start(10),
            vec![
                ScriptedService::next("a=1,b=2"),
                ScriptedService::finished("a=1,b=2", ""),
            ],
        );
        let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
        let (out, handle) = spawn_forwarder(sink_tx);

        h.run.init_tuned(&out).await.unwrap();
        let outcome = h.run.dynamic_tuned(&out, Some("lat=20")).await.unwrap();
        assert_eq!(outcome, StepOutcome::Finished);
        assert_eq!(h.run.iteration, 0);
        assert_eq!(h.service.deletes.load(Ordering::SeqCst), 1);

        let messages = drain(out, handle, &mut sink_rx).await;
        assert!(messages.iter().any(|m| matches!(
            m,
            TuningMessage::Display { text } if text.contains("The optimization result is: a=1,b=2")
        )));
    }

    #[tokio::test]
    async fn restart_seeds_history_and_shrinks_budget() {
        let dir = tempdir().unwrap();
        let log = TuningLog::new(dir.path(), "web");
        log.create_header().unwrap();
        for (i, eval) in [(1u32, "lat=20"), (2, "lat=18")] {
            log.append(&LogEntry {
                iteration: i,
                start_time: "2026-08-26 10:00:00".into(),
                end_time: "2026-08-26 10:00:30".into(),
                evaluation: eval.into(),
                candidate: "a=1,b=2".into(),
            })
            .unwrap();
        }

        let service = ScriptedService::new(vec![ScriptedService::next("a=5,b=6")]);
        let cluster = ClusterSync::from_config(
            &DaemonConfig::default(),
            Arc::new(crate::cluster::TcpPeerLink::new(60001)),
        );
        let mut begin = start(5);
        begin.restart = true;
        let mut run = TuningRun::new(
            project(10),
            &begin,
            service.clone(),
            Arc::new(NullRunner),
            cluster,
            dir.path(),
            0.6,
        );
        let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
        let (out, handle) = spawn_forwarder(sink_tx);

        run.init_tuned(&out).await.unwrap();
        let created = service.created.lock().unwrap();
        assert_eq!(created[0].max_eval, 3);
        assert_eq!(created[0].x_ref.len(), 2);
        assert_eq!(created[0].y_ref, ["20", "18"]);
        drop(created);

        let messages = drain(out, handle, &mut sink_rx).await;
        let request = messages
            .iter()
            .find_map(|m| match m {
                TuningMessage::BenchmarkRequest { summary, .. } => Some(summary),
                _ => None,
            })
            .unwrap();
        assert_eq!(request.base_eval, "base=20.00");
        assert_eq!(request.min_eval, "min=18.00");
        assert_eq!(request.iteration, 3);
    }

    #[tokio::test]
    async fn restart_with_exhausted_budget_fails() {
        let dir = tempdir().unwrap();
        let log = TuningLog::new(dir.path(), "web");
        log.create_header().unwrap();
        log.append(&LogEntry {
            iteration: 1,
            start_time: "2026-08-26 10:00:00".into(),
            end_time: "2026-08-26 10:00:30".into(),
            evaluation: "lat=20".into(),
            candidate: "a=1".into(),
        })
        .unwrap();

        let service = ScriptedService::new(vec![]);
        let cluster = ClusterSync::from_config(
            &DaemonConfig::default(),
            Arc::new(crate::cluster::TcpPeerLink::new(60001)),
        );
        let mut begin = start(1);
        begin.restart = true;
        let mut run = TuningRun::new(
            project(10),
            &begin,
            service,
            Arc::new(NullRunner),
            cluster,
            dir.path(),
            0.6,
        );
        let (sink_tx, _sink_rx) = mpsc::unbounded_channel();
        let (out, _handle) = spawn_forwarder(sink_tx);

        let err = run.init_tuned(&out).await.unwrap_err();
        assert!(matches!(err, TuneError::BudgetExhausted));
    }

    #[tokio::test]
    async fn filter_cycle_prunes_knobs_for_next_task() {
        let mut prj = ProjectDefinition::new("web", 50);
        prj.knobs = (1..=12)
            .map(|i| Knob::named(format!("p{i}")).with_scripts("get", "set $value"))
            .collect();
        let rank: String = (1..=12)
            .map(|i| format!("p{i}:{:.2}", 1.0 - i as f64 / 100.0))
            .collect::<Vec<_>>()
            .join(",");
        let mut h = harness(
            prj,
            start(5),
            vec![
                ScriptedService::next("p1=1"),
                ScriptedService::finished("p1=1", &rank),
                ScriptedService::next("p1=2"),
            ],
        );
        let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
        let (out, handle) = spawn_forwarder(sink_tx);

        h.run.init_feature_sel(&out).await.unwrap();
        let outcome = h.run.dynamic_tuned(&out, Some("lat=9")).await.unwrap();
        assert_eq!(outcome, StepOutcome::Finished);

        // 12 knobs at 0.6 keeps 7; the next task sees only the survivors.
        h.run.init_tuned(&out).await.unwrap();
        let created = h.service.created.lock().unwrap();
        assert_eq!(created[0].knobs.len(), 12);
        assert_eq!(created[1].knobs.len(), 7);
        drop(created);

        let messages = drain(out, handle, &mut sink_rx).await;
        assert!(messages.iter().any(|m| matches!(
            m,
            TuningMessage::Display { text } if text.contains("The important parameters are:")
        )));
    }

    #[tokio::test]
    async fn restore_applies_baseline_and_reports() {
        let mut h = harness(project(10), start(10), vec![ScriptedService::next("a=1,b=2")]);
        let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
        let (out, handle) = spawn_forwarder(sink_tx);

        // Never tuned: restore must fail with the descriptive error.
        let err = h.run.restore_config(&out).await.unwrap_err();
        assert!(matches!(err, TuneError::BaselineMissing(_)));

        h.run.init_tuned(&out).await.unwrap();
        h.run.restore_config(&out).await.unwrap();

        let messages = drain(out, handle, &mut sink_rx).await;
        assert!(messages.iter().any(|m| matches!(
            m,
            TuningMessage::Ending { status } if status == "restore web project params success"
        )));
    }
}
