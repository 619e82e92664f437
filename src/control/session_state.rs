use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::info;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;

use crate::control::types::{Outbox, Response, UserId};
use crate::control::utils::path_token::TokenCache;

/// Chiavi ricorrenti dello scratch.
pub mod scratch {
    pub const FILE_PATH: &str = "file_path";
    pub const DIR_PATH: &str = "dir_path";
}

pub type Scratch = BTreeMap<String, String>;

/// Continuazione in attesa del prossimo messaggio di testo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PendingAction {
    AuthPassword,
    RunProcess,
    KillProcess,
    RestartProcess,
    ChangePriority,
    WatchProcess,
    PingHost,
    DnsLookup,
    ExecuteCommand,
    SetClipboard,
    OpenUrl,
    ChangePassword,
    RenameFile,
    MoveFile,
    CopyFile,
    CreateDirectory,
    WatchDirectory,
    ConfirmShutdown,
    ConfirmRestart,
}

impl PendingAction {
    pub fn name(self) -> &'static str {
        match self {
            PendingAction::AuthPassword => "auth_password",
            PendingAction::RunProcess => "run_process",
            PendingAction::KillProcess => "kill_process",
            PendingAction::RestartProcess => "restart_process",
            PendingAction::ChangePriority => "change_priority",
            PendingAction::WatchProcess => "watch_process",
            PendingAction::PingHost => "ping_host",
            PendingAction::DnsLookup => "dns_lookup",
            PendingAction::ExecuteCommand => "execute_cmd",
            PendingAction::SetClipboard => "set_clipboard",
            PendingAction::OpenUrl => "open_url",
            PendingAction::ChangePassword => "change_password",
            PendingAction::RenameFile => "rename_file",
            PendingAction::MoveFile => "move_file",
            PendingAction::CopyFile => "copy_file",
            PendingAction::CreateDirectory => "create_directory",
            PendingAction::WatchDirectory => "watch_directory",
            PendingAction::ConfirmShutdown => "confirm_shutdown",
            PendingAction::ConfirmRestart => "confirm_restart",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    Sleep,
    Shutdown,
}

impl TimerAction {
    pub fn name(self) -> &'static str {
        match self {
            TimerAction::Sleep => "sleep",
            TimerAction::Shutdown => "shutdown",
        }
    }
}

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

/// Azione ritardata annullabile; al più una per utente.
#[derive(Debug)]
pub struct ActiveTimer {
    pub id: u64,
    pub action: TimerAction,
    handle: Option<JoinHandle<()>>,
}

impl ActiveTimer {
    pub fn new(action: TimerAction) -> Self {
        Self {
            id: NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed),
            action,
            handle: None,
        }
    }

    pub fn with_task(mut self, handle: JoinHandle<()>) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn cancel(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[derive(Debug, Default)]
pub struct Session {
    pub pending: Option<PendingAction>,
    pub scratch: Scratch,
    pub timer: Option<ActiveTimer>,
    pub tokens: TokenCache,
    pub outbox: Option<Outbox>,
}

impl Session {
    /// Imposta la continuazione; quella precedente viene sovrascritta.
    pub fn set_pending(&mut self, action: PendingAction, scratch: Scratch) {
        self.pending = Some(action);
        self.scratch = scratch;
    }

    /// Preleva continuazione e scratch riportando la sessione a Idle.
    pub fn take_pending(&mut self) -> Option<(PendingAction, Scratch)> {
        let action = self.pending.take()?;
        Some((action, std::mem::take(&mut self.scratch)))
    }

    pub fn clear(&mut self) {
        self.pending = None;
        self.scratch.clear();
        self.cancel_timer();
    }

    /// Aggancia un timer annullando quello eventualmente già presente.
    pub fn attach_timer(&mut self, timer: ActiveTimer) -> bool {
        let replaced = self.cancel_timer();
        self.timer = Some(timer);
        replaced
    }

    pub fn cancel_timer(&mut self) -> bool {
        match self.timer.take() {
            Some(timer) => {
                timer.cancel();
                true
            }
            None => false,
        }
    }

    /// Rimuove il timer `id` se è ancora quello agganciato.
    pub fn finish_timer(&mut self, id: u64) -> Option<ActiveTimer> {
        if self.timer.as_ref().is_some_and(|t| t.id == id) {
            let mut timer = self.timer.take()?;
            // il timer che scatta rimuove se stesso: niente abort
            timer.handle = None;
            Some(timer)
        } else {
            None
        }
    }

    /// Invia una risposta fuori banda; `false` se il canale non c'è più.
    pub fn deliver(&self, response: Response) -> bool {
        match &self.outbox {
            Some(outbox) => outbox.send(response).is_ok(),
            None => false,
        }
    }
}

/// Vista di sola lettura dello stato di una sessione.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub pending: Option<PendingAction>,
    pub scratch: Scratch,
    pub timer: Option<(u64, TimerAction)>,
}

/// Archivio delle sessioni con un lock per utente.
///
/// La mappa esterna viene bloccata solo per ottenere l'`Arc` della sessione;
/// tutto il lavoro avviene sotto il mutex del singolo utente.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: parking_lot::Mutex<HashMap<UserId, Arc<Mutex<Session>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, user: &UserId) -> Arc<Mutex<Session>> {
        let mut sessions = self.sessions.lock();
        sessions.entry(user.clone()).or_default().clone()
    }

    pub async fn lock(&self, user: &UserId) -> OwnedMutexGuard<Session> {
        self.slot(user).lock_owned().await
    }

    pub async fn get(&self, user: &UserId) -> Option<SessionView> {
        let slot = self.sessions.lock().get(user).cloned()?;
        let session = slot.lock().await;
        Some(SessionView {
            pending: session.pending,
            scratch: session.scratch.clone(),
            timer: session.timer.as_ref().map(|t| (t.id, t.action)),
        })
    }

    pub async fn set_pending(&self, user: &UserId, action: PendingAction, scratch: Scratch) {
        info!("user {}: pending -> {}", user, action.name());
        self.lock(user).await.set_pending(action, scratch);
    }

    pub async fn clear(&self, user: &UserId) {
        info!("user {}: session cleared", user);
        self.lock(user).await.clear();
    }

    pub async fn attach_timer(&self, user: &UserId, timer: ActiveTimer) -> bool {
        self.lock(user).await.attach_timer(timer)
    }

    pub async fn cancel_timer(&self, user: &UserId) -> bool {
        self.lock(user).await.cancel_timer()
    }

    pub async fn attach_outbox(&self, user: &UserId, outbox: Outbox) {
        self.lock(user).await.outbox = Some(outbox);
    }

    pub async fn deliver(&self, user: &UserId, response: Response) -> bool {
        self.lock(user).await.deliver(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserId {
        UserId::new("alice")
    }

    async fn settle(probe: &tokio::task::AbortHandle) {
        for _ in 0..100 {
            if probe.is_finished() {
                break;
            }
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn pending_action_is_overwritten_and_taken_once() {
        let store = SessionStore::new();
        assert_eq!(store.get(&user()).await, None);

        let mut scratch = Scratch::new();
        scratch.insert(scratch::FILE_PATH.into(), "/tmp/a.txt".into());
        store.set_pending(&user(), PendingAction::RenameFile, scratch).await;
        store
            .set_pending(&user(), PendingAction::KillProcess, Scratch::new())
            .await;

        let view = store.get(&user()).await.unwrap();
        assert_eq!(view.pending, Some(PendingAction::KillProcess));
        assert!(view.scratch.is_empty());

        let mut session = store.lock(&user()).await;
        assert_eq!(
            session.take_pending().map(|(a, _)| a),
            Some(PendingAction::KillProcess)
        );
        assert!(session.take_pending().is_none());
    }

    #[tokio::test]
    async fn second_timer_cancels_the_first() {
        let store = SessionStore::new();
        let first = tokio::spawn(std::future::pending::<()>());
        let probe = first.abort_handle();
        let second = tokio::spawn(std::future::pending::<()>());

        assert!(!store
            .attach_timer(&user(), ActiveTimer::new(TimerAction::Sleep).with_task(first))
            .await);
        let timer = ActiveTimer::new(TimerAction::Shutdown).with_task(second);
        let second_id = timer.id;
        assert!(store.attach_timer(&user(), timer).await);

        settle(&probe).await;
        assert!(probe.is_finished());
        let view = store.get(&user()).await.unwrap();
        assert_eq!(view.timer, Some((second_id, TimerAction::Shutdown)));

        // un timer superato non può rimuovere quello attivo
        let mut session = store.lock(&user()).await;
        assert!(session.finish_timer(second_id + 1000).is_none());
        assert!(session.finish_timer(second_id).is_some());
        assert!(session.timer.is_none());
    }

    #[tokio::test]
    async fn clear_discards_scratch_and_timer() {
        let store = SessionStore::new();
        let task = tokio::spawn(std::future::pending::<()>());
        let probe = task.abort_handle();
        store
            .attach_timer(&user(), ActiveTimer::new(TimerAction::Sleep).with_task(task))
            .await;
        store
            .set_pending(&user(), PendingAction::MoveFile, Scratch::new())
            .await;

        store.clear(&user()).await;
        settle(&probe).await;

        let view = store.get(&user()).await.unwrap();
        assert_eq!(view.pending, None);
        assert_eq!(view.timer, None);
        assert!(probe.is_finished());
    }

    #[tokio::test]
    async fn delivery_reports_closed_outbox() {
        let store = SessionStore::new();
        assert!(!store.deliver(&user(), Response::text("hi")).await);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        store.attach_outbox(&user(), tx).await;
        assert!(store.deliver(&user(), Response::text("hi")).await);
        assert_eq!(rx.recv().await.unwrap().text, "hi");

        drop(rx);
        assert!(!store.deliver(&user(), Response::text("lost")).await);
    }
}
