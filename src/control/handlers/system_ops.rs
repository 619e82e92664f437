use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};

use crate::control::Dispatcher;
use crate::control::controls::{Control, Direct, Menu};
use crate::control::handlers::menus;
use crate::control::navigation;
use crate::control::session_state::{ActiveTimer, PendingAction, Scratch, TimerAction};
use crate::control::types::{Button, Response, UserId};
use crate::host::HostAction;

const MIC_SECONDS: u32 = 10;

fn with_menu(mut response: Response, direct: Direct) -> Response {
    response.controls = Some(menus::buttons(direct.menu()));
    response
}

pub async fn direct(d: &Dispatcher, user: &UserId, direct: Direct) -> Response {
    let action = match direct {
        Direct::Sleep => HostAction::Sleep,
        Direct::Lock => HostAction::Lock,
        Direct::Screenshot => HostAction::Screenshot,
        Direct::Webcam => HostAction::WebcamCapture,
        Direct::MicRecord => HostAction::MicRecord {
            seconds: MIC_SECONDS,
        },
        Direct::Clipboard => HostAction::ClipboardGet,
        Direct::Cleanup => HostAction::CleanupTemp,
        Direct::DiskTop => HostAction::LargestFolders(disk_scan_root(d, user)),
        Direct::MonitorOff => HostAction::MonitorOff,
        Direct::ShowIp => HostAction::PublicIp,
        Direct::Netstat => HostAction::Netstat,
        Direct::SpeedTest => HostAction::SpeedTest,
        Direct::Cpu => HostAction::CpuUsage,
        Direct::Ram => HostAction::RamUsage,
        Direct::Status => HostAction::StatusReport,
    };
    with_menu(d.perform(user, action).await, direct)
}

/// L'analisi parte dalla directory corrente, altrimenti dalla prima radice.
fn disk_scan_root(d: &Dispatcher, user: &UserId) -> PathBuf {
    d.store
        .current_dir(user)
        .or_else(|| navigation::list_roots().into_iter().next().map(|r| r.path))
        .unwrap_or_else(|| PathBuf::from("/"))
}

fn power_action(control: &Control) -> Option<(PendingAction, HostAction, &'static str)> {
    match control {
        Control::AskShutdown | Control::ConfirmShutdown => Some((
            PendingAction::ConfirmShutdown,
            HostAction::Shutdown,
            "Shutdown",
        )),
        Control::AskRestart | Control::ConfirmRestart => Some((
            PendingAction::ConfirmRestart,
            HostAction::Restart,
            "Restart",
        )),
        _ => None,
    }
}

pub async fn ask_power(d: &Dispatcher, user: &UserId, control: &Control) -> Response {
    let Some((pending, _, name)) = power_action(control) else {
        return menus::main_menu("❓ Unknown control.");
    };
    d.sessions.set_pending(user, pending, Scratch::new()).await;
    let confirm = match pending {
        PendingAction::ConfirmRestart => Control::ConfirmRestart,
        _ => Control::ConfirmShutdown,
    };
    Response::with_controls(
        format!("⚠️ Confirm {}?\n\nReply 'yes' or press Confirm.", name.to_lowercase()),
        menus::confirm_buttons(confirm),
    )
}

/// Pulsante di conferma: valido solo se la conferma è ancora in attesa.
pub async fn confirm_power(d: &Dispatcher, user: &UserId, control: &Control) -> Response {
    let Some((pending, action, name)) = power_action(control) else {
        return menus::main_menu("❓ Unknown control.");
    };
    let confirmed = {
        let mut session = d.sessions.lock(user).await;
        if session.pending == Some(pending) {
            session.take_pending();
            true
        } else {
            false
        }
    };
    if confirmed {
        info!("user {}: {} confirmed", user, name);
        d.perform(user, action).await
    } else {
        Response::text(format!("❌ No {} awaiting confirmation.", name.to_lowercase()))
    }
}

pub async fn confirm_by_reply(
    d: &Dispatcher,
    user: &UserId,
    action: HostAction,
    name: &str,
    reply: &str,
) -> Response {
    if matches!(reply.trim().to_lowercase().as_str(), "yes" | "confirm") {
        info!("user {}: {} confirmed", user, name);
        d.perform(user, action).await
    } else {
        Response::text(format!("❌ {name} cancelled."))
    }
}

pub fn timer_menu() -> Response {
    Response::with_controls(
        "⏰ Select timer duration and action:",
        menus::timer_buttons(),
    )
}

fn timer_host_action(action: TimerAction) -> HostAction {
    match action {
        TimerAction::Sleep => HostAction::Sleep,
        TimerAction::Shutdown => HostAction::Shutdown,
    }
}

/// Avvia un timer; quello eventualmente già attivo viene annullato.
pub async fn start_timer(
    d: &Dispatcher,
    user: &UserId,
    action: TimerAction,
    minutes: u64,
) -> Response {
    let timer = ActiveTimer::new(action);
    let id = timer.id;
    let sessions = d.sessions.clone();
    let host = d.host.clone();
    let owner = user.clone();

    // il lock è preso prima dello spawn: il task non può scattare
    // prima di essere agganciato alla sessione
    let mut session = d.sessions.lock(user).await;
    let task = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(minutes * 60)).await;
        if sessions.lock(&owner).await.finish_timer(id).is_none() {
            return;
        }
        info!("user {}: timer {} fired ({})", owner, id, action.name());
        let outcome = host.perform(timer_host_action(action)).await;
        let message = format!("⏰ Timer finished: {}", outcome.message);
        if !sessions.deliver(&owner, Response::text(message)).await {
            warn!("user {}: timer result not delivered, no open conversation", owner);
        }
    });
    let replaced = session.attach_timer(timer.with_task(task));
    drop(session);

    info!(
        "user {}: timer {} set, {} in {} minutes",
        user,
        id,
        action.name(),
        minutes
    );
    let mut text = format!("⏰ Timer set: {} in {} minutes.", action.name(), minutes);
    if replaced {
        text.push_str("\nThe previous timer was cancelled.");
    }
    Response::with_controls(text, menus::timer_buttons())
}

pub async fn cancel_timer(d: &Dispatcher, user: &UserId) -> Response {
    let text = if d.sessions.cancel_timer(user).await {
        info!("user {}: timer cancelled", user);
        "⏰ Timer cancelled."
    } else {
        "⏰ No active timer."
    };
    Response::with_controls(text, menus::timer_buttons())
}

pub async fn ping(d: &Dispatcher, user: &UserId, host: &str) -> Response {
    d.perform(user, HostAction::Ping(host.trim().to_string())).await
}

pub async fn dns_lookup(d: &Dispatcher, user: &UserId, host: &str) -> Response {
    d.perform(user, HostAction::DnsLookup(host.trim().to_string()))
        .await
}

pub async fn execute(d: &Dispatcher, user: &UserId, command: &str) -> Response {
    if command.trim().is_empty() {
        return Response::text("❌ Please send a command.");
    }
    d.perform(user, HostAction::ExecuteCommand(command.to_string()))
        .await
}

pub async fn open_url(d: &Dispatcher, user: &UserId, url: &str) -> Response {
    d.perform(user, HostAction::OpenUrl(url.trim().to_string()))
        .await
}

pub async fn set_clipboard(d: &Dispatcher, user: &UserId, text: &str) -> Response {
    d.perform(user, HostAction::ClipboardSet(text.to_string()))
        .await
}

pub fn show_users(d: &Dispatcher) -> Response {
    let users = d.store.allowed_users();
    let list = if users.is_empty() {
        "None".to_string()
    } else {
        users
            .iter()
            .map(|u| u.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };
    Response::with_controls(
        format!("👥 Allowed Users:\n\n{list}"),
        menus::buttons(Menu::Settings),
    )
}

/// Revoca l'accesso di chi lo chiede e azzera la sua sessione.
pub async fn logout(d: &Dispatcher, user: &UserId) -> Response {
    d.sessions.clear(user).await;
    match d.store.revoke(user) {
        Ok(_) => {
            info!("user {}: logged out", user);
            Response::text("👋 Access revoked. Use /auth to sign in again.")
        }
        Err(e) => Response::text(e.user_message()),
    }
}

pub fn change_password(d: &Dispatcher, user: &UserId, password: &str) -> Response {
    match d.store.change_password(password) {
        Ok(()) => {
            info!("user {}: password changed", user);
            Response::text("✅ Password changed successfully.")
        }
        Err(e) => Response::text(e.user_message()),
    }
}

/// Avvia un watcher i cui eventi arrivano alla coda di uscita dell'utente.
pub async fn watch_path(d: &Dispatcher, user: &UserId, path: &Path) -> Response {
    match d.start_watch(user, path) {
        Ok(id) => Response::with_controls(
            format!("✅ Started watching: {} (watch #{id})", path.display()),
            vec![Button::new("⏹️ Stop Monitoring", Control::StopWatchers.token())],
        ),
        Err(e) => {
            warn!("user {}: cannot watch {:?}: {}", user, path, e);
            Response::text(format!("❌ Failed to watch: {}\n{}", path.display(), e))
        }
    }
}

/// Percorsi relativi partono dalla directory di lavoro corrente.
pub async fn watch_directory(d: &Dispatcher, user: &UserId, reply: &str) -> Response {
    let reply = Path::new(reply.trim());
    let path = match d.store.current_dir(user) {
        Some(cwd) if reply.is_relative() => cwd.join(reply),
        _ => reply.to_path_buf(),
    };
    watch_path(d, user, &path).await
}

pub fn stop_watchers(d: &Dispatcher, user: &UserId) -> Response {
    let stopped = d.watchers.stop_all();
    info!("user {}: stopped {} watchers", user, stopped);
    Response::with_controls(
        format!("⏹️ All monitoring stopped ({stopped})."),
        menus::buttons(Menu::Monitor),
    )
}
