use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use log::{info, warn};
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::control::error::{ControlError, Result};
use crate::control::types::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Deleted,
    Modified,
    Moved,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeKind::Created => "created",
            ChangeKind::Deleted => "deleted",
            ChangeKind::Modified => "modified",
            ChangeKind::Moved => "moved",
        })
    }
}

/// Evento normalizzato prodotto da un watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
    pub destination: Option<PathBuf>,
}

impl WatchEvent {
    pub fn describe(&self) -> String {
        match &self.destination {
            Some(dest) => format!(
                "👁️ Directory Change: {} {} -> {}",
                self.kind,
                self.path.display(),
                dest.display()
            ),
            None => format!("👁️ Directory Change: {} {}", self.kind, self.path.display()),
        }
    }
}

pub type WatchId = u64;
pub type EventSink = mpsc::UnboundedSender<WatchEvent>;

struct ActiveWatcher {
    root: PathBuf,
    owner: UserId,
    // il drop del watcher ferma il thread di notify e rilascia il sink
    _watcher: RecommendedWatcher,
}

/// Registro dei watcher attivi; le radici sovrapposte non vengono deduplicate.
pub struct WatchRegistry {
    next_id: AtomicU64,
    watchers: parking_lot::Mutex<HashMap<WatchId, ActiveWatcher>>,
}

impl Default for WatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            watchers: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Avvia un watcher ricorsivo su `path`.
    ///
    /// Gli eventi vengono inviati a `sink` dal thread di notify; un invio fallito
    /// viene solo registrato nel log.
    pub fn start(&self, path: &Path, owner: &UserId, sink: EventSink) -> Result<WatchId> {
        let root = path
            .canonicalize()
            .map_err(|e| ControlError::from_io(path, e))?;
        if !root.is_dir() {
            return Err(ControlError::NotADirectory(root));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handler = move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for change in normalize(event) {
                    if let Err(e) = sink.send(change) {
                        warn!("watcher {}: event dropped, sink closed ({:?})", id, e.0.path);
                    }
                }
            }
            Err(e) => warn!("watcher {}: {}", id, e),
        };

        let mut watcher = RecommendedWatcher::new(handler, NotifyConfig::default())
            .map_err(|e| ControlError::CollaboratorFailure(format!("watcher init failed: {e}")))?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| ControlError::CollaboratorFailure(format!("watch failed: {e}")))?;

        info!("Started watching directory {:?} for {} (id {})", root, owner, id);
        self.watchers.lock().insert(
            id,
            ActiveWatcher {
                root,
                owner: owner.clone(),
                _watcher: watcher,
            },
        );
        Ok(id)
    }

    pub fn stop(&self, id: WatchId) -> bool {
        match self.watchers.lock().remove(&id) {
            Some(active) => {
                info!("Stopped watching directory {:?} (id {})", active.root, id);
                true
            }
            None => false,
        }
    }

    /// Ferma tutti i watcher; restituisce quanti erano attivi.
    pub fn stop_all(&self) -> usize {
        let ids: Vec<WatchId> = self.watchers.lock().keys().copied().collect();
        let count = ids.into_iter().filter(|id| self.stop(*id)).count();
        info!("Stopped all directory watchers ({})", count);
        count
    }

    pub fn active(&self) -> Vec<(WatchId, PathBuf, UserId)> {
        let mut list: Vec<_> = self
            .watchers
            .lock()
            .iter()
            .map(|(id, w)| (*id, w.root.clone(), w.owner.clone()))
            .collect();
        list.sort_by_key(|(id, _, _)| *id);
        list
    }
}

fn normalize(event: Event) -> Vec<WatchEvent> {
    let single = |kind: ChangeKind, paths: Vec<PathBuf>| -> Vec<WatchEvent> {
        paths
            .into_iter()
            .map(|path| WatchEvent {
                kind,
                path,
                destination: None,
            })
            .collect()
    };

    match event.kind {
        EventKind::Create(_) => single(ChangeKind::Created, event.paths),
        EventKind::Remove(_) => single(ChangeKind::Deleted, event.paths),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.into_iter();
            match (paths.next(), paths.next()) {
                (Some(from), to) => vec![WatchEvent {
                    kind: ChangeKind::Moved,
                    path: from,
                    destination: to,
                }],
                _ => Vec::new(),
            }
        }
        // le metà di una rinomina arrivano anche come `Both`
        EventKind::Modify(ModifyKind::Name(_)) => Vec::new(),
        EventKind::Modify(_) => single(ChangeKind::Modified, event.paths),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use notify::event::{AccessKind, CreateKind, DataChange};

    use super::*;

    #[test]
    fn notify_events_are_normalized() {
        let created = Event::new(EventKind::Create(CreateKind::File)).add_path("/w/a".into());
        assert_eq!(
            normalize(created),
            vec![WatchEvent {
                kind: ChangeKind::Created,
                path: "/w/a".into(),
                destination: None
            }]
        );

        let renamed = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path("/w/a".into())
            .add_path("/w/b".into());
        let moved = normalize(renamed);
        assert_eq!(moved[0].kind, ChangeKind::Moved);
        assert_eq!(moved[0].describe(), "👁️ Directory Change: moved /w/a -> /w/b");

        let half = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path("/w/a".into());
        assert!(normalize(half).is_empty());

        let written = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path("/w/a".into());
        assert_eq!(normalize(written)[0].kind, ChangeKind::Modified);

        let read = Event::new(EventKind::Access(AccessKind::Any)).add_path("/w/a".into());
        assert!(normalize(read).is_empty());
    }

    #[test]
    fn start_requires_existing_directory() {
        let registry = WatchRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = registry
            .start(Path::new("/no/such/dir"), &UserId::new("u"), tx)
            .unwrap_err();
        assert!(matches!(err, ControlError::NotFound(_)));
        assert!(registry.active().is_empty());
    }

    #[test]
    fn stop_all_is_idempotent() {
        let registry = WatchRegistry::new();
        assert_eq!(registry.stop_all(), 0);

        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let user = UserId::new("u");
        let first = registry.start(dir.path(), &user, tx.clone()).unwrap();
        registry.start(dir.path(), &user, tx).unwrap();
        assert_eq!(registry.active().len(), 2);

        assert!(registry.stop(first));
        assert!(!registry.stop(first));
        assert_eq!(registry.stop_all(), 1);
        assert_eq!(registry.stop_all(), 0);
    }

    #[tokio::test]
    async fn creating_a_file_delivers_one_created_event() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let registry = WatchRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.start(&root, &UserId::new("u"), tx).unwrap();

        let target = root.join("new.txt");
        std::fs::File::create(&target).unwrap();

        let mut created = 0;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let wait = if created == 0 {
                deadline.saturating_duration_since(tokio::time::Instant::now())
            } else {
                Duration::from_millis(500)
            };
            match tokio::time::timeout(wait, rx.recv()).await {
                Ok(Some(event)) => {
                    if event.kind == ChangeKind::Created && event.path == target {
                        created += 1;
                    }
                }
                _ => break,
            }
        }
        assert_eq!(created, 1);
        assert_eq!(registry.stop_all(), 1);
    }
}
