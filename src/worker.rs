use crate::detection::Detection;
use crate::snapshot::{SnapshotCell, SnapshotReader, TrackingSnapshot};
use crate::trackers::multi_target::MultiTargetTracker;
use crate::Errors;
use anyhow::Result;
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Name of the background thread
pub const DEFAULT_THREAD_NAME: &str = "tracking-worker";

/// Producer of the per-frame detections, polled once per worker iteration.
///
/// The call may block (e.g. on network I/O); an error is logged and the frame is processed
/// as a frame without detections.
///
pub trait DetectionSource: Send + 'static {
    fn poll(&mut self) -> Result<Vec<Detection>>;
}

impl<F> DetectionSource for F
where
    F: FnMut() -> Result<Vec<Detection>> + Send + 'static,
{
    fn poll(&mut self) -> Result<Vec<Detection>> {
        self()
    }
}

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Minimal duration of an iteration, `None` runs as fast as the source responds
    pub min_period: Option<Duration>,
    pub thread_name: String,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            min_period: None,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

enum WorkerCommands {
    Exit,
}

/// Tracker, source and the instant of the last poll, if any
type WorkerState<S> = (MultiTargetTracker, S, Option<Instant>);

/// Runs a [`MultiTargetTracker`] fed by a [`DetectionSource`] on a background thread and
/// publishes a [`TrackingSnapshot`] after every iteration.
///
/// The tracker and the source are owned by the thread while the worker runs and are handed
/// back on [`TrackingWorker::stop`], so the worker can be restarted. The first step after a
/// restart covers the time the worker was stopped, so tracks unseen for longer than the
/// timeout are aged out before anything is published. Readers never block:
/// [`TrackingWorker::current_state`] and the [`SnapshotReader`] handles load the latest
/// snapshot from a lock-free cell.
///
pub struct TrackingWorker<S: DetectionSource> {
    opts: WorkerOptions,
    cell: Arc<SnapshotCell>,
    idle: Option<WorkerState<S>>,
    running: Option<(Sender<WorkerCommands>, JoinHandle<WorkerState<S>>)>,
}

impl<S: DetectionSource> TrackingWorker<S> {
    pub fn new(tracker: MultiTargetTracker, source: S, opts: WorkerOptions) -> Self {
        Self {
            opts,
            cell: Arc::new(SnapshotCell::new()),
            idle: Some((tracker, source, None)),
            running: None,
        }
    }

    /// `false` once the thread exited, either stopped or after a failed step
    ///
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .map(|(_, handle)| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Starts the background thread
    ///
    /// Fails with [`Errors::WorkerAlreadyRunning`] when the thread is running and with
    /// [`Errors::WorkerPoisoned`] when a previous run panicked and the tracker was lost.
    ///
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(Errors::WorkerAlreadyRunning.into());
        }
        // collects the state of a thread which exited on its own
        self.stop();

        let (tracker, source, last_poll) = self.idle.take().ok_or(Errors::WorkerPoisoned)?;
        let (tx, rx) = bounded(1);
        let cell = self.cell.clone();
        let min_period = self.opts.min_period;

        let handle = thread::Builder::new()
            .name(self.opts.thread_name.clone())
            .spawn(move || run(tracker, source, last_poll, cell, rx, min_period))?;

        self.running = Some((tx, handle));
        Ok(())
    }

    /// Requests the thread to exit and waits until it finishes the current iteration.
    ///
    /// Does nothing when the worker is not running. After the call the cell holds the empty
    /// snapshot.
    ///
    pub fn stop(&mut self) {
        let (tx, handle) = match self.running.take() {
            Some(r) => r,
            None => return,
        };
        // the loop also exits when the channel is disconnected
        let _ = tx.send(WorkerCommands::Exit);
        drop(tx);

        match handle.join() {
            Ok(state) => self.idle = Some(state),
            Err(e) => {
                error!("Tracking worker panicked: {:?}", e);
                self.cell.clear();
            }
        }
    }

    /// Latest published snapshot, the empty one when nothing was published yet
    ///
    pub fn current_state(&self) -> Arc<TrackingSnapshot> {
        self.cell.load()
    }

    /// Read handle which can be moved to other threads
    ///
    pub fn handle(&self) -> SnapshotReader {
        SnapshotReader::new(self.cell.clone())
    }

    /// The tracker while the worker is stopped
    ///
    pub fn tracker(&self) -> Option<&MultiTargetTracker> {
        self.idle.as_ref().map(|(t, _, _)| t)
    }
}

impl<S: DetectionSource> Drop for TrackingWorker<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<S: DetectionSource>(
    mut tracker: MultiTargetTracker,
    mut source: S,
    last_poll: Option<Instant>,
    cell: Arc<SnapshotCell>,
    commands: Receiver<WorkerCommands>,
    min_period: Option<Duration>,
) -> WorkerState<S> {
    info!(
        "Tracking worker started for class {}, min period {:?}",
        tracker.target_class(),
        min_period
    );

    let mut published = cell.load();
    let mut last_poll = last_poll.unwrap_or_else(Instant::now);

    loop {
        match commands.try_recv() {
            Ok(WorkerCommands::Exit) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }
        let started = Instant::now();

        let detections = source.poll().unwrap_or_else(|e| {
            warn!("Detection source failed, the frame is empty: {:?}", e);
            Vec::new()
        });
        let now = Instant::now();
        let dt = now.duration_since(last_poll).as_secs_f32();
        last_poll = now;

        if let Err(e) = tracker.step(&detections, dt) {
            error!("Tracker step {} failed: {:?}", tracker.sequence(), e);
            break;
        }
        let lost = tracker.update();
        if lost > 0 {
            debug!("{} tracks lost at step {}", lost, tracker.sequence());
        }

        let snapshot = Arc::new(tracker.snapshot());
        match cell.compare_and_publish(&published, snapshot.clone()) {
            Ok(()) => published = snapshot,
            Err(e) => {
                warn!(
                    "Snapshot of step {} is not published: {:?}",
                    tracker.sequence(),
                    e
                );
                published = cell.load();
            }
        }

        match min_period.and_then(|p| p.checked_sub(started.elapsed())) {
            Some(rest) => match commands.recv_timeout(rest) {
                Ok(WorkerCommands::Exit) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            },
            None => thread::yield_now(),
        }
    }

    cell.clear();
    info!(
        "Tracking worker stopped after {} steps, {} active tracks",
        tracker.sequence(),
        tracker.active_count()
    );
    (tracker, source, Some(last_poll))
}
