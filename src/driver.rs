//! Record-at-a-time pipeline driver.
//!
//! The driver pulls one record from the source, pushes it through every
//! stage and into the sink, and only then pulls the next record. Nothing is
//! buffered between stages, so at most one record is in flight.
//!
//! A run ends in exactly one [`Completion`]: `Success` after the source is
//! exhausted and the sink has finished, `Failure` as soon as any part of the
//! chain faults, or `Cancelled` when the [`CancelToken`] is set.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crate::debug_trace::{RecordTrace, RunTrace};
use crate::error::Fault;
use crate::record::Record;
use crate::sink::Sink;
use crate::source::Source;
use crate::stage::Stage;

/// Lifecycle of a driver. Terminal states have no transitions out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Running,
    Completed,
    Faulted,
    Cancelled,
}

impl DriverState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DriverState::Completed | DriverState::Faulted | DriverState::Cancelled
        )
    }

    fn can_enter(self, next: DriverState) -> bool {
        match self {
            DriverState::Idle => next == DriverState::Running,
            DriverState::Running => next.is_terminal(),
            _ => false,
        }
    }
}

/// Record counts of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Records pulled from the source and pushed through the chain.
    pub processed: usize,
    /// Records accepted by the sink.
    pub accepted: usize,
}

/// The single outcome of a pipeline run.
#[derive(Debug)]
pub enum Completion {
    Success(RunReport),
    /// The run halted on `fault`, raised by the stage named `stage`.
    Failure { fault: Fault, stage: String },
    /// The run was cancelled; the report covers records fully handled before
    /// the cancellation was observed.
    Cancelled(RunReport),
}

impl Completion {
    pub fn is_success(&self) -> bool {
        matches!(self, Completion::Success(_))
    }

    /// Terminal driver state this completion corresponds to.
    pub fn state(&self) -> DriverState {
        match self {
            Completion::Success(_) => DriverState::Completed,
            Completion::Failure { .. } => DriverState::Faulted,
            Completion::Cancelled(_) => DriverState::Cancelled,
        }
    }

    /// Counts of a successful run. Faulted and cancelled runs claim none.
    pub fn report(&self) -> Option<RunReport> {
        match self {
            Completion::Success(report) => Some(*report),
            _ => None,
        }
    }

    pub fn fault(&self) -> Option<(&Fault, &str)> {
        match self {
            Completion::Failure { fault, stage } => Some((fault, stage.as_str())),
            _ => None,
        }
    }
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::Success(report) => write!(
                f,
                "completed: {} processed, {} accepted",
                report.processed, report.accepted
            ),
            Completion::Failure { fault, stage } => write!(f, "failed in {stage}: {fault}"),
            Completion::Cancelled(report) => {
                write!(f, "cancelled after {} records", report.processed)
            }
        }
    }
}

/// Cooperative cancellation flag shared between a driver and its controller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// An ordered list of stages ending in a sink.
///
/// Stage order is fixed once the pipeline is handed to a [`Driver`].
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    sink: Box<dyn Sink>,
}

impl Pipeline {
    pub fn new(sink: impl Sink + 'static) -> Self {
        Self {
            stages: Vec::new(),
            sink: Box::new(sink),
        }
    }

    pub fn with_stages(stages: Vec<Box<dyn Stage>>, sink: impl Sink + 'static) -> Self {
        Self {
            stages,
            sink: Box::new(sink),
        }
    }

    /// Append a stage.
    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn stage_names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn sink_name(&self) -> &str {
        self.sink.name()
    }
}

type CompletionCallback = Box<dyn FnOnce(&Completion) + Send>;

/// Runs one pipeline over one source, exactly once.
pub struct Driver {
    source: Box<dyn Source>,
    pipeline: Pipeline,
    state: DriverState,
    cancel: CancelToken,
    on_complete: Option<CompletionCallback>,
}

impl Driver {
    pub fn new(source: impl Source + 'static, pipeline: Pipeline) -> Self {
        Self {
            source: Box::new(source),
            pipeline,
            state: DriverState::Idle,
            cancel: CancelToken::new(),
            on_complete: None,
        }
    }

    /// Use an externally created cancellation token.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Register the completion notification. It fires exactly once, after
    /// the run reaches a terminal state.
    pub fn on_complete(mut self, callback: impl FnOnce(&Completion) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the pipeline to completion on the calling thread.
    pub fn run(mut self) -> Completion {
        let completion = self.execute(None);
        self.notify(&completion);
        completion
    }

    /// Like [`run`](Self::run), also capturing each record's journey.
    pub fn run_traced(mut self) -> (Completion, RunTrace) {
        let mut trace = RunTrace {
            stage_names: self.pipeline.stage_names(),
            record_traces: Vec::new(),
        };
        let completion = self.execute(Some(&mut trace.record_traces));
        self.notify(&completion);
        (completion, trace)
    }

    /// Run the pipeline on a dedicated worker thread.
    pub fn spawn(self) -> std::io::Result<RunHandle> {
        let cancel = self.cancel.clone();
        let worker = thread::Builder::new()
            .name("rowpipe-driver".to_string())
            .spawn(move || self.run())?;
        Ok(RunHandle { cancel, worker })
    }

    fn transition(&mut self, next: DriverState) {
        debug_assert!(
            self.state.can_enter(next),
            "illegal driver transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::debug!(from = ?self.state, to = ?next, "driver state");
        self.state = next;
    }

    fn notify(&mut self, completion: &Completion) {
        if let Some(callback) = self.on_complete.take() {
            callback(completion);
        }
    }

    fn execute(&mut self, mut traces: Option<&mut Vec<RecordTrace>>) -> Completion {
        self.transition(DriverState::Running);
        tracing::info!(
            source = self.source.name(),
            stages = ?self.pipeline.stage_names(),
            sink = self.pipeline.sink_name(),
            "pipeline run started"
        );

        let mut report = RunReport::default();
        loop {
            if self.cancel.is_cancelled() {
                self.transition(DriverState::Cancelled);
                tracing::warn!(processed = report.processed, "pipeline run cancelled");
                return Completion::Cancelled(report);
            }

            let record = match self.source.pull() {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(e) => {
                    let stage = self.source.name().to_string();
                    return self.fail(Fault::Source(e), stage);
                }
            };
            report.processed += 1;

            let mut trace = traces.as_ref().map(|_| RecordTrace {
                pipe_points: vec![Some(record.clone())],
                accepted: false,
            });
            let pushed = self.push(record, trace.as_mut());
            if let (Some(traces), Some(trace)) = (traces.as_deref_mut(), trace) {
                traces.push(trace);
            }

            match pushed {
                Ok(true) => report.accepted += 1,
                Ok(false) => tracing::trace!(position = report.processed - 1, "record dropped"),
                Err((fault, stage)) => return self.fail(fault, stage),
            }
        }

        // Drain: the last record is sunk before the sink is finished.
        if let Err(e) = self.pipeline.sink.finish() {
            let stage = self.pipeline.sink_name().to_string();
            return self.fail(Fault::Sink(e), stage);
        }

        self.transition(DriverState::Completed);
        tracing::info!(
            processed = report.processed,
            accepted = report.accepted,
            "pipeline run completed"
        );
        Completion::Success(report)
    }

    /// Push one record through every stage and into the sink.
    ///
    /// Returns whether the sink accepted it; `false` means a stage dropped it.
    fn push(
        &mut self,
        record: Record,
        mut trace: Option<&mut RecordTrace>,
    ) -> Result<bool, (Fault, String)> {
        let mut current = Some(record);
        for stage in self.pipeline.stages.iter_mut() {
            if let Some(record) = current.take() {
                current = match stage.process(record) {
                    Ok(out) => out,
                    Err(e) => return Err((Fault::Transform(e), stage.name().to_string())),
                };
            }
            if let Some(trace) = trace.as_deref_mut() {
                trace.pipe_points.push(current.clone());
            }
        }

        let Some(record) = current else {
            return Ok(false);
        };
        let sink = &mut self.pipeline.sink;
        if let Err(e) = sink.accept(record) {
            return Err((Fault::Sink(e), sink.name().to_string()));
        }
        if let Some(trace) = trace {
            trace.accepted = true;
        }
        Ok(true)
    }

    fn fail(&mut self, fault: Fault, stage: String) -> Completion {
        self.transition(DriverState::Faulted);
        tracing::warn!(
            stage = %stage,
            kind = fault.kind(),
            error = %fault.cause(),
            "pipeline run faulted"
        );
        Completion::Failure { fault, stage }
    }
}

/// Handle to a driver running on its own thread.
pub struct RunHandle {
    cancel: CancelToken,
    worker: thread::JoinHandle<Completion>,
}

impl RunHandle {
    /// Request cancellation. The record in flight, if any, is finished first.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Wait for the run's completion. `Err` carries a worker panic.
    pub fn join(self) -> thread::Result<Completion> {
        self.worker.join()
    }
}

/// Run independent pipelines concurrently, one worker each.
///
/// Completions are returned in the order of `drivers`.
pub fn run_all(drivers: Vec<Driver>) -> Vec<Completion> {
    thread::scope(|scope| {
        let workers: Vec<_> = drivers
            .into_iter()
            .map(|driver| scope.spawn(move || driver.run()))
            .collect();
        workers
            .into_iter()
            .map(|worker| {
                worker
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
            })
            .collect()
    })
}
