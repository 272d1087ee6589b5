//! Sync engine task
//!
//! One engine runs per open project. It owns the last written snapshot and
//! the accumulated payload, and it is the only code that writes the project
//! file. Callers talk to it through a cloneable [`SyncHandle`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::merge::merge;
use super::schedule::{cancel, schedule, TaskHandle};
use crate::error::{Error, Result};
use crate::models::{ProjectFile, ProjectPatch};
use crate::storage::{ProjectFiles, StorageError};

/// Outcome of an explicit flush: the written record, or `None` when there
/// was nothing to write
pub type FlushResult = std::result::Result<Option<ProjectFile>, StorageError>;

/// Where the engine is in its write cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Nothing scheduled
    Idle,
    /// Debounce timer running
    PendingWrite,
    /// A write is in flight
    Writing,
}

/// Events emitted by the engine
#[derive(Debug)]
pub enum SyncEvent {
    StateChanged(SyncState),
    /// A write succeeded; carries the record now on disk
    Written(ProjectFile),
    /// A write failed; the payload is kept for the next attempt
    Failed {
        message: String,
        retained: Vec<&'static str>,
    },
}

/// Commands sent to the engine task
#[derive(Debug)]
enum SyncCommand {
    /// Fold a partial update into the pending payload
    Request(ProjectPatch),
    /// Write the pending payload now
    Flush(oneshot::Sender<FlushResult>),
    /// Write the pending payload, then stop
    Shutdown(oneshot::Sender<FlushResult>),
}

/// Handle to a running sync engine
#[derive(Debug, Clone)]
pub struct SyncHandle {
    command_tx: mpsc::UnboundedSender<SyncCommand>,
    state_rx: watch::Receiver<SyncState>,
}

impl SyncHandle {
    /// Queue a partial update; never blocks
    ///
    /// Returns `false` if the engine has stopped.
    pub fn request(&self, patch: ProjectPatch) -> bool {
        self.command_tx.send(SyncCommand::Request(patch)).is_ok()
    }

    /// Write whatever is pending without waiting for the debounce
    ///
    /// This is also the retry trigger after a failed write.
    pub async fn flush(&self) -> Result<Option<ProjectFile>> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(SyncCommand::Flush(tx))
            .map_err(|_| engine_stopped())?;
        rx.await
            .map_err(|_| engine_stopped())?
            .map_err(Error::WriteFailure)
    }

    /// Write whatever is pending, then stop the engine
    ///
    /// Stopping an engine that already stopped is not an error.
    pub async fn shutdown(&self) -> Result<Option<ProjectFile>> {
        let (tx, rx) = oneshot::channel();
        if self.command_tx.send(SyncCommand::Shutdown(tx)).is_err() {
            return Ok(None);
        }
        match rx.await {
            Ok(result) => result.map_err(Error::WriteFailure),
            Err(_) => Ok(None),
        }
    }

    /// Current state
    pub fn state(&self) -> SyncState {
        *self.state_rx.borrow()
    }

    /// Watch state changes
    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state_rx.clone()
    }

    /// Whether the engine task is still running
    pub fn is_running(&self) -> bool {
        !self.command_tx.is_closed()
    }
}

fn engine_stopped() -> Error {
    Error::Unexpected("sync engine has stopped".to_string())
}

/// Spawn a sync engine for the project file at `path`
///
/// `snapshot` must be what is currently on disk; it is the merge base for
/// the first write. Returns the handle and the event stream.
pub fn spawn_sync_engine(
    files: Arc<dyn ProjectFiles>,
    path: PathBuf,
    snapshot: ProjectFile,
    delay: Duration,
) -> (SyncHandle, mpsc::UnboundedReceiver<SyncEvent>) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (timer_tx, timer_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(SyncState::Idle);

    let engine = SyncEngine {
        files,
        path,
        delay,
        snapshot,
        pending: None,
        timer: None,
        generation: 0,
        timer_tx,
        state_tx,
        event_tx,
        waiting_flush: Vec::new(),
        shutdown: None,
        closed: false,
    };
    tokio::spawn(engine.run(command_rx, timer_rx));

    (
        SyncHandle {
            command_tx,
            state_rx,
        },
        event_rx,
    )
}

struct SyncEngine {
    files: Arc<dyn ProjectFiles>,
    path: PathBuf,
    delay: Duration,
    /// Last record known to be on disk
    snapshot: ProjectFile,
    /// Changes not yet written
    pending: Option<ProjectPatch>,
    timer: Option<TaskHandle>,
    /// Tags timer deliveries so a cancelled timer that already fired is ignored
    generation: u64,
    timer_tx: mpsc::UnboundedSender<u64>,
    state_tx: watch::Sender<SyncState>,
    event_tx: mpsc::UnboundedSender<SyncEvent>,
    waiting_flush: Vec<oneshot::Sender<FlushResult>>,
    shutdown: Option<oneshot::Sender<FlushResult>>,
    /// Every handle is gone
    closed: bool,
}

impl SyncEngine {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<SyncCommand>,
        mut timer_rx: mpsc::UnboundedReceiver<u64>,
    ) {
        debug!(path = %self.path.display(), "Sync engine started");

        loop {
            self.answer_flushes(&mut commands).await;
            if self.shutdown.is_some() || self.closed {
                break;
            }

            tokio::select! {
                cmd = commands.recv() => self.handle_command(cmd),
                Some(generation) = timer_rx.recv() => {
                    if generation == self.generation && self.timer.take().is_some() {
                        // Failures are reported through events and kept pending
                        let _ = self.write_pending(&mut commands).await;
                    }
                }
            }
        }

        // Write out anything left before stopping
        self.cancel_timer();
        let mut result = self.write_pending(&mut commands).await;
        while matches!(result, Ok(Some(_))) && self.pending.is_some() {
            self.cancel_timer();
            result = self.write_pending(&mut commands).await;
        }
        self.cancel_timer();

        match self.shutdown.take() {
            Some(reply) => {
                let _ = reply.send(result);
            }
            None => {
                if let Err(e) = result {
                    warn!(error = %e, "Final write failed; unsaved changes lost");
                }
            }
        }

        self.set_state(SyncState::Idle);
        debug!(path = %self.path.display(), "Sync engine stopped");
    }

    fn handle_command(&mut self, cmd: Option<SyncCommand>) {
        match cmd {
            Some(SyncCommand::Request(patch)) => self.accumulate(patch),
            Some(SyncCommand::Flush(reply)) => self.waiting_flush.push(reply),
            Some(SyncCommand::Shutdown(reply)) => {
                if self.shutdown.is_none() {
                    self.shutdown = Some(reply);
                }
            }
            None => self.closed = true,
        }
    }

    fn accumulate(&mut self, patch: ProjectPatch) {
        debug!(keys = ?patch.keys(), "Sync requested");
        match &mut self.pending {
            Some(pending) => pending.absorb(patch),
            None => self.pending = Some(patch),
        }
        self.restart_timer();
    }

    fn restart_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            debug!("Debounce restarted");
            cancel(timer);
        }
        self.generation += 1;
        self.timer = Some(schedule(self.delay, self.generation, self.timer_tx.clone()));

        if *self.state_tx.borrow() != SyncState::Writing {
            self.set_state(SyncState::PendingWrite);
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            cancel(timer);
        }
    }

    async fn answer_flushes(&mut self, commands: &mut mpsc::UnboundedReceiver<SyncCommand>) {
        while !self.waiting_flush.is_empty() {
            let waiting = std::mem::take(&mut self.waiting_flush);
            for reply in waiting {
                self.cancel_timer();
                let result = self.write_pending(commands).await;
                let _ = reply.send(result);
            }
        }
    }

    /// Merge the pending payload onto the snapshot and write it
    ///
    /// Commands keep being taken while the write runs, so new edits extend
    /// the payload for the next cycle instead of starting a second write.
    async fn write_pending(&mut self, commands: &mut mpsc::UnboundedReceiver<SyncCommand>) -> FlushResult {
        let Some(payload) = self.pending.take() else {
            if self.timer.is_none() {
                self.set_state(SyncState::Idle);
            }
            return Ok(None);
        };

        let merged = merge(&self.snapshot, &payload);
        self.set_state(SyncState::Writing);

        let files = Arc::clone(&self.files);
        let path = self.path.clone();
        let record = merged.clone();
        let write = async move { files.write_project_file(&path, &record).await };
        tokio::pin!(write);

        let result = loop {
            tokio::select! {
                result = &mut write => break result,
                cmd = commands.recv(), if !self.closed => self.handle_command(cmd),
            }
        };

        let outcome = match result {
            Ok(()) => {
                info!(path = %self.path.display(), keys = ?payload.keys(), "Project saved");
                self.snapshot = merged.clone();
                let _ = self.event_tx.send(SyncEvent::Written(merged.clone()));
                Ok(Some(merged))
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Project save failed; keeping changes");
                let mut retained = payload;
                if let Some(later) = self.pending.take() {
                    retained.absorb(later);
                }
                let _ = self.event_tx.send(SyncEvent::Failed {
                    message: e.to_string(),
                    retained: retained.keys(),
                });
                self.pending = Some(retained);
                Err(e)
            }
        };

        if self.timer.is_some() {
            self.set_state(SyncState::PendingWrite);
        } else {
            self.set_state(SyncState::Idle);
        }
        outcome
    }

    fn set_state(&self, state: SyncState) {
        if self.state_tx.send_replace(state) != state {
            let _ = self.event_tx.send(SyncEvent::StateChanged(state));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Node, NodeTree};
    use crate::models::{Metadata, Page};
    use crate::storage::StorageResult;
    use crate::store::Store;
    use async_trait::async_trait;
    use std::io;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory bridge that records writes and how many overlap
    #[derive(Default)]
    struct RecordingFiles {
        writes: Mutex<Vec<ProjectFile>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        fail_next: AtomicBool,
        write_time: Duration,
    }

    impl RecordingFiles {
        fn slow(write_time: Duration) -> Self {
            Self {
                write_time,
                ..Self::default()
            }
        }

        fn writes(&self) -> Vec<ProjectFile> {
            self.writes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProjectFiles for RecordingFiles {
        async fn read_project_file(&self, path: &Path) -> StorageResult<ProjectFile> {
            Err(StorageError::NotFound {
                path: path.to_path_buf(),
            })
        }

        async fn write_project_file(&self, path: &Path, record: &ProjectFile) -> StorageResult<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if !self.write_time.is_zero() {
                tokio::time::sleep(self.write_time).await;
            }

            let result = if self.fail_next.swap(false, Ordering::SeqCst) {
                Err(StorageError::DiskFull {
                    path: path.to_path_buf(),
                    source: io::Error::new(io::ErrorKind::Other, "No space left on device"),
                })
            } else {
                self.writes.lock().unwrap().push(record.clone());
                Ok(())
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }

        async fn create_project_file(&self, path: &Path, initial: &ProjectFile) -> StorageResult<()> {
            self.write_project_file(path, initial).await
        }
    }

    const DELAY: Duration = Duration::from_secs(1);

    fn snapshot() -> ProjectFile {
        let mut file = ProjectFile::new(Metadata::new("Book", "en"));
        file.pages = vec![Page::new("existing")];
        file
    }

    fn start(
        files: &Arc<RecordingFiles>,
        snapshot: ProjectFile,
    ) -> (SyncHandle, mpsc::UnboundedReceiver<SyncEvent>) {
        let files: Arc<dyn ProjectFiles> = files.clone();
        spawn_sync_engine(files, PathBuf::from("book.ketabi"), snapshot, DELAY)
    }

    async fn next_written(events: &mut mpsc::UnboundedReceiver<SyncEvent>) -> ProjectFile {
        loop {
            match events.recv().await {
                Some(SyncEvent::Written(file)) => return file,
                Some(_) => continue,
                None => panic!("engine stopped before writing"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_edits_in_window_coalesce_into_one_write() {
        let files = Arc::new(RecordingFiles::default());
        let base = snapshot();
        let (handle, mut events) = start(&files, base.clone());

        let mut store = Store::from_project(base);
        store.attach_sync(handle.clone());

        store.create_page("A");
        tokio::time::sleep(Duration::from_millis(200)).await;
        store.edit_active_page_title("Alpha").unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        store
            .edit_active_page_content(NodeTree::with_children(vec![Node::paragraph("hi")]))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        store.create_page("B");

        assert_eq!(handle.state(), SyncState::PendingWrite);
        assert!(files.writes().is_empty());

        let written = next_written(&mut events).await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        let writes = files.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(written.pages, store.pages());
        assert_eq!(writes[0].pages[1].title, "Alpha");
        assert_eq!(handle.state(), SyncState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_restarts_on_each_request() {
        let files = Arc::new(RecordingFiles::default());
        let (handle, _events) = start(&files, snapshot());

        for i in 0..5 {
            handle.request(ProjectPatch::pages(vec![Page::new(format!("p{}", i))]));
            tokio::time::sleep(Duration::from_millis(900)).await;
        }
        // 4.5s have passed but the timer kept restarting
        assert!(files.writes().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        let writes = files.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].pages[0].title, "p4");
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_one_write_in_flight() {
        let files = Arc::new(RecordingFiles::slow(Duration::from_secs(3)));
        let (handle, mut events) = start(&files, snapshot());
        let mut state = handle.subscribe_state();

        handle.request(ProjectPatch::pages(vec![Page::new("first")]));
        state.wait_for(|s| *s == SyncState::Writing).await.unwrap();

        // Edits during the write extend the next payload
        handle.request(ProjectPatch::pages(vec![Page::new("second")]));
        handle.request(ProjectPatch::meta(Metadata::new("Renamed", "en")));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(files.in_flight.load(Ordering::SeqCst), 1);

        let first = next_written(&mut events).await;
        let second = next_written(&mut events).await;

        assert_eq!(files.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(files.writes().len(), 2);
        assert_eq!(first.pages[0].title, "first");
        assert_eq!(second.pages[0].title, "second");
        assert_eq!(second.meta.title, "Renamed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_pages_patch_keeps_snapshot_meta() {
        let files = Arc::new(RecordingFiles::default());
        let base = snapshot();
        let (handle, _events) = start(&files, base.clone());

        let new_pages = vec![Page::new("replacement")];
        handle.request(ProjectPatch::pages(new_pages.clone()));
        let written = handle.flush().await.unwrap().unwrap();

        assert_eq!(written.pages, new_pages);
        assert_eq!(written.meta.identifier, base.meta.identifier);
        assert_eq!(written.meta.title, base.meta.title);
        assert_eq!(written.meta.language, base.meta.language);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_keeps_payload() {
        let files = Arc::new(RecordingFiles::default());
        files.fail_next.store(true, Ordering::SeqCst);
        let (handle, mut events) = start(&files, snapshot());

        handle.request(ProjectPatch::meta(Metadata::new("Retitled", "en")));

        let retained = loop {
            match events.recv().await {
                Some(SyncEvent::Failed { retained, .. }) => break retained,
                Some(_) => continue,
                None => panic!("engine stopped"),
            }
        };
        assert_eq!(retained, vec!["meta"]);
        assert!(files.writes().is_empty());

        // No automatic retry
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(files.writes().is_empty());
        assert_eq!(handle.state(), SyncState::Idle);

        // The next edit carries the failed payload along with it
        handle.request(ProjectPatch::pages(vec![Page::new("new")]));
        let written = next_written(&mut events).await;
        assert_eq!(written.meta.title, "Retitled");
        assert_eq!(written.pages[0].title, "new");
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_reports_failure_and_retries() {
        let files = Arc::new(RecordingFiles::default());
        files.fail_next.store(true, Ordering::SeqCst);
        let (handle, _events) = start(&files, snapshot());

        handle.request(ProjectPatch::pages(vec![]));
        let err = handle.flush().await.unwrap_err();
        assert!(matches!(err, Error::WriteFailure(StorageError::DiskFull { .. })));

        let written = handle.flush().await.unwrap().unwrap();
        assert!(written.pages.is_empty());
        assert_eq!(files.writes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_with_nothing_pending() {
        let files = Arc::new(RecordingFiles::default());
        let (handle, _events) = start(&files, snapshot());

        assert!(handle.flush().await.unwrap().is_none());
        assert!(files.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_writes_pending() {
        let files = Arc::new(RecordingFiles::default());
        let (handle, _events) = start(&files, snapshot());

        handle.request(ProjectPatch::pages(vec![Page::new("last")]));
        let written = handle.shutdown().await.unwrap().unwrap();

        assert_eq!(written.pages[0].title, "last");
        assert_eq!(files.writes().len(), 1);
        assert!(!handle.request(ProjectPatch::pages(vec![])));
        assert!(handle.shutdown().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handles_writes_pending() {
        let files = Arc::new(RecordingFiles::default());
        let (handle, mut events) = start(&files, snapshot());

        handle.request(ProjectPatch::pages(vec![Page::new("orphan")]));
        drop(handle);

        let written = next_written(&mut events).await;
        assert_eq!(written.pages[0].title, "orphan");
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_changes_are_reported() {
        let files = Arc::new(RecordingFiles::default());
        let (handle, mut events) = start(&files, snapshot());

        handle.request(ProjectPatch::pages(vec![]));
        next_written(&mut events).await;
        handle.shutdown().await.unwrap();

        let mut seen = Vec::new();
        while let Some(event) = events.recv().await {
            if let SyncEvent::StateChanged(state) = event {
                seen.push(state);
            }
        }
        // PendingWrite and Writing came before Written; Idle after
        assert!(seen.contains(&SyncState::Idle));
        assert_eq!(handle.state(), SyncState::Idle);
    }
}
