//! Debounced persistence of an open diagram.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::diagram::DiagramContent;
use crate::*;

pub const AUTOSAVE_DELAY: Duration = Duration::from_secs(2);

/// How a save request should travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTransport {
    Standard,
    /// Best effort, expected to outlive the session that sent it.
    Keepalive,
}

impl SaveTransport {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaveTransport::Standard => "standard",
            SaveTransport::Keepalive => "keepalive",
        }
    }
}

/// Where diagrams are written to.
pub trait DiagramBackend: Send + Sync + 'static {
    fn save(
        &self,
        diagram_id: &str,
        content: &DiagramContent,
        transport: SaveTransport,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Watches an editor's content and writes it back after each quiet period.
pub struct Autosave<B: DiagramBackend> {
    diagram_id: String,
    content: watch::Receiver<DiagramContent>,
    backend: Arc<B>,
    task: Option<JoinHandle<()>>,
}

impl<B: DiagramBackend> Autosave<B> {
    /// Starts the debounce task. Must be called inside a tokio runtime.
    pub fn spawn(
        diagram_id: impl Into<String>,
        content: watch::Receiver<DiagramContent>,
        backend: Arc<B>,
        delay: Duration,
    ) -> Self {
        let diagram_id = diagram_id.into();
        let task = tokio::spawn(debounce(
            diagram_id.clone(),
            content.clone(),
            Arc::clone(&backend),
            delay,
        ));
        Self {
            diagram_id,
            content,
            backend,
            task: Some(task),
        }
    }

    pub fn diagram_id(&self) -> &str {
        &self.diagram_id
    }

    /// Saves the current content right away. The pending debounce, if any,
    /// keeps running.
    pub async fn save_now(&self) -> Result<()> {
        let snapshot = self.content.borrow().clone();
        self.backend
            .save(&self.diagram_id, &snapshot, SaveTransport::Standard)
            .await
            .with_context(|| format!("Failed to save diagram '{}'", self.diagram_id))
    }

    /// Cancels any pending save and issues one final keepalive save.
    /// Failures are not reported.
    pub async fn teardown(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let snapshot = self.content.borrow().clone();
        if let Err(err) = self
            .backend
            .save(&self.diagram_id, &snapshot, SaveTransport::Keepalive)
            .await
        {
            tracing::debug!(diagram = %self.diagram_id, error = %err, "final save failed");
        }
    }
}

impl<B: DiagramBackend> Drop for Autosave<B> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn debounce<B: DiagramBackend>(
    diagram_id: String,
    mut content: watch::Receiver<DiagramContent>,
    backend: Arc<B>,
    delay: Duration,
) {
    let mut closed = false;
    while !closed {
        if content.changed().await.is_err() {
            break;
        }

        // every further change restarts the quiet period
        loop {
            tokio::select! {
                changed = content.changed() => {
                    if changed.is_err() {
                        closed = true;
                        break;
                    }
                }
                _ = tokio::time::sleep(delay) => break,
            }
        }

        let snapshot = content.borrow_and_update().clone();
        match backend
            .save(&diagram_id, &snapshot, SaveTransport::Standard)
            .await
        {
            Ok(()) => tracing::info!(
                diagram = %diagram_id,
                nodes = snapshot.nodes.len(),
                connections = snapshot.connections.len(),
                "autosaved"
            ),
            // the next edit schedules another attempt
            Err(err) => tracing::warn!(diagram = %diagram_id, error = %err, "autosave failed"),
        }
    }
    tracing::debug!(diagram = %diagram_id, "autosave stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::{Editor, EditorSettings};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::time::{Instant, sleep};

    struct Recorder {
        started: Instant,
        saves: Mutex<Vec<(Duration, SaveTransport, usize)>>,
        fail: AtomicBool,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                started: Instant::now(),
                saves: Mutex::new(Vec::new()),
                fail: AtomicBool::new(false),
            })
        }

        fn saves(&self) -> Vec<(Duration, SaveTransport, usize)> {
            self.saves.lock().unwrap().clone()
        }
    }

    impl DiagramBackend for Recorder {
        async fn save(
            &self,
            _diagram_id: &str,
            content: &DiagramContent,
            transport: SaveTransport,
        ) -> Result<()> {
            self.saves
                .lock()
                .unwrap()
                .push((self.started.elapsed(), transport, content.nodes.len()));
            if self.fail.load(Ordering::SeqCst) {
                bail!("backend unavailable");
            }
            Ok(())
        }
    }

    fn editor() -> Editor {
        Editor::new(DiagramContent::default(), EditorSettings::default())
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_edits_saves_once_after_the_last() {
        let backend = Recorder::new();
        let mut editor = editor();
        let _autosave = Autosave::spawn("d1", editor.subscribe(), backend.clone(), AUTOSAVE_DELAY);

        for _ in 0..5 {
            editor.add_node();
            sleep(Duration::from_millis(200)).await;
        }
        // last edit at 800ms
        sleep(Duration::from_millis(1700)).await;
        assert!(backend.saves().is_empty());

        sleep(Duration::from_millis(200)).await;
        let saves = backend.saves();
        assert_eq!(saves.len(), 1);
        let (at, transport, nodes) = saves[0];
        assert!(at >= Duration::from_millis(2800) && at < Duration::from_millis(2900), "{at:?}");
        assert_eq!(transport, SaveTransport::Standard);
        assert_eq!(nodes, 5);

        sleep(Duration::from_secs(10)).await;
        assert_eq!(backend.saves().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_replaces_the_pending_save() {
        let backend = Recorder::new();
        let mut editor = editor();
        let autosave = Autosave::spawn("d1", editor.subscribe(), backend.clone(), AUTOSAVE_DELAY);

        editor.add_node();
        sleep(Duration::from_millis(500)).await;
        autosave.teardown().await;
        sleep(Duration::from_secs(5)).await;

        let saves = backend.saves();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].1, SaveTransport::Keepalive);
        assert_eq!(saves[0].2, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_retry_on_the_next_edit() {
        let backend = Recorder::new();
        backend.fail.store(true, Ordering::SeqCst);
        let mut editor = editor();
        let autosave = Autosave::spawn("d1", editor.subscribe(), backend.clone(), AUTOSAVE_DELAY);

        editor.add_node();
        sleep(Duration::from_secs(3)).await;
        assert_eq!(backend.saves().len(), 1);
        assert!(autosave.save_now().await.is_err());

        backend.fail.store(false, Ordering::SeqCst);
        editor.add_node();
        sleep(Duration::from_secs(3)).await;
        let saves = backend.saves();
        assert_eq!(saves.len(), 3);
        assert_eq!(saves[2].2, 2);
        assert!(autosave.save_now().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn closing_the_editor_flushes_the_pending_change() {
        let backend = Recorder::new();
        let mut editor = editor();
        let _autosave = Autosave::spawn("d1", editor.subscribe(), backend.clone(), AUTOSAVE_DELAY);

        editor.add_node();
        sleep(Duration::from_millis(100)).await;
        drop(editor);
        sleep(Duration::from_millis(100)).await;

        let saves = backend.saves();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].1, SaveTransport::Standard);
    }
}
