use log::warn;

use crate::control::Dispatcher;
use crate::control::controls::{Control, Menu};
use crate::control::types::{Button, Response, UserId};
use crate::control::utils::metadata::MetadataConverter;
use crate::host::{HostAction, ProcessSummary};

fn back_to_list() -> Button {
    Button::new("🔙 Back", Control::ProcessList.token())
}

fn parse_pid(text: &str) -> Option<u32> {
    text.trim().parse().ok()
}

fn invalid_pid() -> Response {
    Response::text("❌ Please send a valid PID number.")
}

pub async fn list(d: &Dispatcher, user: &UserId) -> Response {
    let processes = match d.host.list_processes().await {
        Ok(processes) => processes,
        Err(e) => {
            warn!("user {}: process listing failed: {}", user, e);
            return Response::with_controls(
                e.user_message(),
                vec![Button::new("🔙 Back", Control::Menu(Menu::Process).token())],
            );
        }
    };
    render(&processes, d.config.limits.inline, d.config.limits.selectable)
}

fn render(processes: &[ProcessSummary], inline: usize, selectable: usize) -> Response {
    let back = Button::new("🔙 Back", Control::Menu(Menu::Process).token());
    if processes.is_empty() {
        return Response::with_controls("❌ No processes found.", vec![back]);
    }

    let mut text = String::from("📋 Running Processes (sorted by RAM):\n\n");
    for (i, proc) in processes.iter().take(inline).enumerate() {
        text.push_str(&format!(
            "{}. {} (PID: {} | RAM: {:.1} MB)\n",
            i + 1,
            proc.name,
            proc.pid,
            proc.ram_mb
        ));
    }
    if processes.len() > inline {
        text.push_str(&format!("\n... and {} more", processes.len() - inline));
    }

    let mut controls: Vec<Button> = processes
        .iter()
        .take(selectable)
        .map(|proc| {
            Button::new(
                format!(
                    "{} | {:.0}MB",
                    MetadataConverter::short_label(&proc.name, 25),
                    proc.ram_mb
                ),
                Control::ProcessActions(proc.pid).token(),
            )
        })
        .collect();
    controls.push(back);
    Response::with_controls(text.trim_end(), controls)
}

pub fn actions(pid: u32) -> Response {
    Response::with_controls(
        format!("Process PID: {pid}\n\nSelect action:"),
        vec![
            Button::new("❌ Kill", Control::ProcessKill(pid).token()),
            Button::new("🔄 Restart", Control::ProcessRestart(pid).token()),
            back_to_list(),
        ],
    )
}

pub async fn kill_pid(d: &Dispatcher, user: &UserId, pid: u32) -> Response {
    let mut response = d.perform(user, HostAction::KillProcess(pid)).await;
    response.controls = Some(vec![back_to_list()]);
    response
}

pub async fn restart_pid(d: &Dispatcher, user: &UserId, pid: u32) -> Response {
    let mut response = d.perform(user, HostAction::RestartProcess(pid)).await;
    response.controls = Some(vec![back_to_list()]);
    response
}

pub async fn run(d: &Dispatcher, user: &UserId, text: &str) -> Response {
    if text.trim().is_empty() {
        return Response::text("❌ Please send a program path.");
    }
    d.perform(user, HostAction::RunProgram(text.trim().to_string()))
        .await
}

pub async fn kill(d: &Dispatcher, user: &UserId, text: &str) -> Response {
    match parse_pid(text) {
        Some(pid) => d.perform(user, HostAction::KillProcess(pid)).await,
        None => invalid_pid(),
    }
}

pub async fn restart(d: &Dispatcher, user: &UserId, text: &str) -> Response {
    match parse_pid(text) {
        Some(pid) => d.perform(user, HostAction::RestartProcess(pid)).await,
        None => invalid_pid(),
    }
}

pub async fn watch(d: &Dispatcher, user: &UserId, text: &str) -> Response {
    match parse_pid(text) {
        Some(pid) => d.perform(user, HostAction::ProcessInfo(pid)).await,
        None => invalid_pid(),
    }
}

/// Risposta nel formato `PID priorità`.
pub async fn change_priority(d: &Dispatcher, user: &UserId, text: &str) -> Response {
    let parts: Vec<&str> = text.split_whitespace().collect();
    let [pid, priority] = parts.as_slice() else {
        return Response::text("❌ Format: PID priority (e.g., 1234 high)");
    };
    let Some(pid) = parse_pid(pid) else {
        return Response::text("❌ Invalid format. Use: PID priority");
    };
    match priority.parse() {
        Ok(priority) => d.perform(user, HostAction::SetPriority(pid, priority)).await,
        Err(e) => Response::text(format!("❌ {e}. Use low, normal, high or realtime.")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn procs(count: u32) -> Vec<ProcessSummary> {
        (0..count)
            .map(|i| ProcessSummary {
                pid: 100 + i,
                name: format!("proc-{i}"),
                ram_mb: f64::from(count - i),
            })
            .collect()
    }

    #[test]
    fn process_list_is_paginated_independently() {
        let response = render(&procs(25), 20, 15);
        assert!(response.text.contains("20. proc-19"));
        assert!(!response.text.contains("21. proc-20"));
        assert!(response.text.ends_with("... and 5 more"));

        let tokens = response.tokens();
        assert_eq!(tokens.len(), 16);
        assert_eq!(tokens[0], "proc_action_100");
        assert_eq!(tokens[15], "menu_process");
    }

    #[test]
    fn short_lists_have_no_suffix() {
        let response = render(&procs(3), 20, 15);
        assert!(!response.text.contains("more"));
        assert_eq!(response.tokens().len(), 4);
        assert_eq!(render(&[], 20, 15).text, "❌ No processes found.");
    }
}
