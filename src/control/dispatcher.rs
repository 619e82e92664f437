//! Macchina a stati della conversazione.
//!
//! Ogni segnale in ingresso produce esattamente una risposta; le consegne
//! fuori banda (timer, watcher, avvisi di attesa) passano dalla coda di uscita
//! registrata nella sessione dell'utente.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use tokio::sync::mpsc;

use crate::control::controls::{Control, Menu, PathVerb, Prompt};
use crate::control::error::Result;
use crate::control::handlers::file_ops::Relocation;
use crate::control::handlers::{dir_ops, file_ops, menus, process_ops, system_ops};
use crate::control::session_state::{PendingAction, Scratch, SessionStore};
use crate::control::types::{Button, Outbox, Response, Signal, UserId};
use crate::control::watch::{WatchEvent, WatchId, WatchRegistry};
use crate::control::ControlConfig;
use crate::host::{ActionOutcome, HostAction, HostActions};
use crate::state_store::StateStore;

pub const ACCESS_DENIED: &str = "🚫 Access Denied! Please use /auth to enter the password.";

const HELP: &str = "🤖 Remote Control\n\n\
📋 Available Commands:\n\
/start - Show main menu\n\
/help - Show this help\n\
/status - Show system status\n\
/auth - Authenticate with password\n\
/cancel - Cancel the current action\n\n\
🔘 Everything else is available through the numbered controls.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    Help,
    Status,
    Auth,
    Cancel,
}

impl Command {
    /// Solo i comandi noti: `/tmp/x` resta testo libero.
    fn parse(text: &str) -> Option<Command> {
        let word = text.split_whitespace().next()?;
        match word.strip_prefix('/')? {
            "start" => Some(Command::Start),
            "help" => Some(Command::Help),
            "status" => Some(Command::Status),
            "auth" => Some(Command::Auth),
            "cancel" => Some(Command::Cancel),
            _ => None,
        }
    }
}

fn denied() -> Response {
    Response::text(ACCESS_DENIED)
}

fn stale() -> Response {
    Response::with_controls(
        "❌ This item is no longer available.",
        vec![
            Button::new("🏠 Root", Control::Roots.token()),
            Button::new("📋 Main Menu", Control::Menu(Menu::Main).token()),
        ],
    )
}

fn outcome_response(outcome: ActionOutcome) -> Response {
    let response = Response::text(outcome.message);
    match outcome.payload {
        Some(payload) => response.attach(payload),
        None => response,
    }
}

pub struct Dispatcher {
    pub(crate) config: ControlConfig,
    pub(crate) store: Arc<StateStore>,
    pub(crate) sessions: Arc<SessionStore>,
    pub(crate) watchers: Arc<WatchRegistry>,
    pub(crate) host: Arc<dyn HostActions>,
}

impl Dispatcher {
    pub fn new(config: ControlConfig, store: Arc<StateStore>, host: Arc<dyn HostActions>) -> Self {
        Self {
            config,
            store,
            sessions: Arc::new(SessionStore::new()),
            watchers: Arc::new(WatchRegistry::new()),
            host,
        }
    }

    /// Registra la coda di uscita della conversazione dell'utente.
    pub async fn attach_outbox(&self, user: &UserId, outbox: Outbox) {
        info!("user {}: conversation attached", user);
        self.sessions.attach_outbox(user, outbox).await;
    }

    pub async fn handle(&self, user: &UserId, signal: Signal) -> Response {
        match signal {
            Signal::Text(text) => {
                let text = text.trim();
                match Command::parse(text) {
                    Some(command) => self.on_command(user, command).await,
                    None => self.on_text(user, text).await,
                }
            }
            Signal::Control(token) => self.on_control(user, token.trim()).await,
            Signal::Document { name, bytes } => {
                if !self.store.is_allowed(user) {
                    warn!("user {}: upload denied", user);
                    return denied();
                }
                file_ops::upload(self, user, &name, &bytes).await
            }
        }
    }

    async fn on_command(&self, user: &UserId, command: Command) -> Response {
        info!("user {}: command {:?}", user, command);
        match command {
            Command::Start if self.store.is_allowed(user) => menus::main_menu(format!(
                "👋 Welcome, {user}!\n\nUse the controls below to manage the system."
            )),
            Command::Start => Response::text(format!(
                "👋 Welcome, {user}!\n\n🔐 You need to authenticate first.\n\
                 Use /auth and enter the password to access all functions."
            )),
            Command::Help => Response::text(HELP),
            Command::Status if self.store.is_allowed(user) => {
                self.perform(user, HostAction::StatusReport).await
            }
            Command::Status => denied(),
            Command::Auth => {
                self.sessions
                    .set_pending(user, PendingAction::AuthPassword, Scratch::new())
                    .await;
                Response::text(
                    "🔐 Enter the password to authenticate:\n\nSend the password as a message.",
                )
            }
            Command::Cancel => self.cancel(user).await,
        }
    }

    async fn cancel(&self, user: &UserId) -> Response {
        self.sessions.clear(user).await;
        menus::main_menu("❌ Action cancelled.")
    }

    async fn on_text(&self, user: &UserId, text: &str) -> Response {
        let taken = self.sessions.lock(user).await.take_pending();
        match taken {
            Some((PendingAction::AuthPassword, _)) => self.authenticate(user, text),
            _ if !self.store.is_allowed(user) => {
                warn!("user {}: text denied", user);
                denied()
            }
            None => menus::main_menu("Use the menu buttons to interact."),
            Some((action, scratch)) => {
                info!("user {}: resuming {}", user, action.name());
                self.resume(user, action, scratch, text).await
            }
        }
    }

    fn authenticate(&self, user: &UserId, password: &str) -> Response {
        if !self.store.verify_password(password) {
            warn!("user {}: wrong password", user);
            return Response::text("❌ Wrong password. Try again with /auth or /cancel.");
        }
        match self.store.allow(user) {
            Ok(_) => {
                info!("user {}: authenticated", user);
                menus::main_menu(
                    "✅ Authentication successful!\nYou now have access to all functions.",
                )
            }
            Err(e) => Response::text(e.user_message()),
        }
    }

    /// Esegue la continuazione; la sessione è già tornata a Idle.
    async fn resume(
        &self,
        user: &UserId,
        action: PendingAction,
        scratch: Scratch,
        text: &str,
    ) -> Response {
        match action {
            PendingAction::AuthPassword => self.authenticate(user, text),
            PendingAction::RunProcess => process_ops::run(self, user, text).await,
            PendingAction::KillProcess => process_ops::kill(self, user, text).await,
            PendingAction::RestartProcess => process_ops::restart(self, user, text).await,
            PendingAction::ChangePriority => process_ops::change_priority(self, user, text).await,
            PendingAction::WatchProcess => process_ops::watch(self, user, text).await,
            PendingAction::PingHost => system_ops::ping(self, user, text).await,
            PendingAction::DnsLookup => system_ops::dns_lookup(self, user, text).await,
            PendingAction::ExecuteCommand => system_ops::execute(self, user, text).await,
            PendingAction::SetClipboard => system_ops::set_clipboard(self, user, text).await,
            PendingAction::OpenUrl => system_ops::open_url(self, user, text).await,
            PendingAction::ChangePassword => system_ops::change_password(self, user, text),
            PendingAction::RenameFile => file_ops::rename(self, user, &scratch, text).await,
            PendingAction::MoveFile => {
                file_ops::relocate(self, user, &scratch, text, Relocation::Move).await
            }
            PendingAction::CopyFile => {
                file_ops::relocate(self, user, &scratch, text, Relocation::Copy).await
            }
            PendingAction::CreateDirectory => {
                file_ops::create_directory(self, user, &scratch, text).await
            }
            PendingAction::WatchDirectory => system_ops::watch_directory(self, user, text).await,
            PendingAction::ConfirmShutdown => {
                system_ops::confirm_by_reply(self, user, HostAction::Shutdown, "Shutdown", text)
                    .await
            }
            PendingAction::ConfirmRestart => {
                system_ops::confirm_by_reply(self, user, HostAction::Restart, "Restart", text)
                    .await
            }
        }
    }

    async fn on_control(&self, user: &UserId, token: &str) -> Response {
        if !self.store.is_allowed(user) {
            warn!("user {}: control {:?} denied", user, token);
            return denied();
        }
        let Some(control) = Control::parse(token) else {
            warn!("user {}: unknown control {:?}", user, token);
            return menus::main_menu("❓ Unknown control.");
        };
        let scope = if control.is_navigation() { "navigation" } else { "action" };
        info!("user {}: {} control {}", user, scope, token);

        match control {
            Control::Menu(Menu::Files) | Control::Roots => dir_ops::roots_view(self, user).await,
            Control::Menu(menu) => menus::show(menu),
            Control::ProcessList => process_ops::list(self, user).await,
            Control::Prompt(prompt) => self.ask(user, prompt).await,
            Control::ProcessActions(pid) => process_ops::actions(pid),
            Control::ProcessKill(pid) => process_ops::kill_pid(self, user, pid).await,
            Control::ProcessRestart(pid) => process_ops::restart_pid(self, user, pid).await,
            Control::Refresh => dir_ops::refresh(self, user).await,
            Control::Drive(label) => dir_ops::open_drive(self, user, &label).await,
            Control::Up => dir_ops::up(self, user).await,
            Control::Path(verb, token) => match self.resolve(user, &token).await {
                Ok(path) => self.on_path(user, verb, &path).await,
                Err(e) => {
                    warn!("user {}: stale control {:?}: {}", user, token, e);
                    stale()
                }
            },
            Control::AskShutdown | Control::AskRestart => {
                system_ops::ask_power(self, user, &control).await
            }
            Control::ConfirmShutdown | Control::ConfirmRestart => {
                system_ops::confirm_power(self, user, &control).await
            }
            Control::Direct(direct) => system_ops::direct(self, user, direct).await,
            Control::TimerMenu => system_ops::timer_menu(),
            Control::Timer(action, minutes) => {
                system_ops::start_timer(self, user, action, minutes).await
            }
            Control::TimerCancel => system_ops::cancel_timer(self, user).await,
            Control::StopWatchers => system_ops::stop_watchers(self, user),
            Control::ShowUsers => system_ops::show_users(self),
            Control::Logout => system_ops::logout(self, user).await,
            Control::Cancel => self.cancel(user).await,
        }
    }

    async fn on_path(&self, user: &UserId, verb: PathVerb, path: &Path) -> Response {
        match verb {
            PathVerb::Browse => dir_ops::directory_view(self, user, path).await,
            PathVerb::Details => dir_ops::file_view(self, user, path).await,
            PathVerb::Download => file_ops::download(self, user, path).await,
            PathVerb::Delete => file_ops::delete(self, user, path).await,
            PathVerb::Rename => file_ops::ask_rename(self, user, path).await,
            PathVerb::Move => file_ops::ask_relocation(self, user, path, Relocation::Move).await,
            PathVerb::Copy => file_ops::ask_relocation(self, user, path, Relocation::Copy).await,
            PathVerb::NewFolder => file_ops::ask_new_folder(self, user, path).await,
            PathVerb::Watch => system_ops::watch_path(self, user, path).await,
        }
    }

    async fn resolve(&self, user: &UserId, token: &str) -> Result<PathBuf> {
        self.sessions.lock(user).await.tokens.resolve(token)
    }

    async fn ask(&self, user: &UserId, prompt: Prompt) -> Response {
        let (action, text) = match prompt {
            Prompt::RunProcess => (
                PendingAction::RunProcess,
                "▶️ Run Process\n\nSend the full path of the program to execute:",
            ),
            Prompt::KillProcess => (
                PendingAction::KillProcess,
                "❌ Kill Process\n\nSend the PID of the process to kill.",
            ),
            Prompt::RestartProcess => (
                PendingAction::RestartProcess,
                "🔄 Restart Process\n\nSend the PID of the process to restart.",
            ),
            Prompt::ChangePriority => (
                PendingAction::ChangePriority,
                "🎯 Change Priority\n\nSend PID and priority (low/normal/high/realtime):\nExample: 1234 high",
            ),
            Prompt::WatchProcess => (
                PendingAction::WatchProcess,
                "👁️ Watch Process\n\nSend the PID to inspect.",
            ),
            Prompt::Ping => (
                PendingAction::PingHost,
                "📡 Ping Host\n\nSend the hostname or IP to ping:",
            ),
            Prompt::Dns => (
                PendingAction::DnsLookup,
                "🔍 DNS Lookup\n\nSend the hostname to look up:",
            ),
            Prompt::WatchDirectory => (
                PendingAction::WatchDirectory,
                "👁️ Watch Directory\n\nSend the directory path to monitor:",
            ),
            Prompt::ExecuteCommand => (
                PendingAction::ExecuteCommand,
                "💻 Execute Command\n\nSend the command to execute:",
            ),
            Prompt::OpenUrl => (
                PendingAction::OpenUrl,
                "🌐 Open URL\n\nSend the URL to open (e.g., example.com or https://example.com):",
            ),
            Prompt::SetClipboard => (
                PendingAction::SetClipboard,
                "📋 Set Clipboard\n\nSend the text to set:",
            ),
            Prompt::ChangePassword => (
                PendingAction::ChangePassword,
                "🔑 Change Password\n\nSend the new password:",
            ),
        };
        self.sessions.set_pending(user, action, Scratch::new()).await;
        Response::with_controls(text, vec![menus::cancel_button()])
    }

    /// Chiama il collaboratore; per le azioni lente avvisa prima l'utente.
    pub(crate) async fn perform(&self, user: &UserId, action: HostAction) -> Response {
        if action.is_slow() {
            self.sessions
                .deliver(user, Response::text("⏳ Working on it, this may take a while..."))
                .await;
        }
        info!("user {}: performing {:?}", user, action);
        outcome_response(self.host.perform(action).await)
    }

    /// Avvia un watcher e il task che inoltra i suoi eventi alla coda dell'utente.
    pub(crate) fn start_watch(&self, user: &UserId, path: &Path) -> Result<WatchId> {
        let (sink, mut events) = mpsc::unbounded_channel::<WatchEvent>();
        let id = self.watchers.start(path, user, sink)?;

        let sessions = self.sessions.clone();
        let owner = user.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if !sessions.deliver(&owner, Response::text(event.describe())).await {
                    warn!(
                        "watch {}: event for {} dropped, no open conversation",
                        id, owner
                    );
                }
            }
            info!("watch {}: forwarder finished", id);
        });
        Ok(id)
    }
}
