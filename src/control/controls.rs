//! Tabella dei token di controllo: parsing e formattazione.

use crate::control::session_state::TimerAction;

/// Lunghezza massima di un token di controllo accettata dal front-end.
pub const CONTROL_BUDGET: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Menu {
    Main,
    Process,
    Files,
    System,
    Network,
    Monitor,
    Extra,
    Settings,
}

impl Menu {
    const ALL: [Menu; 8] = [
        Menu::Main,
        Menu::Process,
        Menu::Files,
        Menu::System,
        Menu::Network,
        Menu::Monitor,
        Menu::Extra,
        Menu::Settings,
    ];

    pub fn token(self) -> &'static str {
        match self {
            Menu::Main => "menu_main",
            Menu::Process => "menu_process",
            Menu::Files => "menu_files",
            Menu::System => "menu_system",
            Menu::Network => "menu_network",
            Menu::Monitor => "menu_monitor",
            Menu::Extra => "menu_extra",
            Menu::Settings => "menu_settings",
        }
    }
}

/// Verbi che portano con sé un token di percorso.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathVerb {
    Browse,
    Details,
    Download,
    Delete,
    Rename,
    Move,
    Copy,
    NewFolder,
    Watch,
}

impl PathVerb {
    const ALL: [PathVerb; 9] = [
        PathVerb::Browse,
        PathVerb::Details,
        PathVerb::Download,
        PathVerb::Delete,
        PathVerb::Rename,
        PathVerb::Move,
        PathVerb::Copy,
        PathVerb::NewFolder,
        PathVerb::Watch,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            PathVerb::Browse => "cd_",
            PathVerb::Details => "fi_",
            PathVerb::Download => "dl_",
            PathVerb::Delete => "rm_",
            PathVerb::Rename => "rn_",
            PathVerb::Move => "mv_",
            PathVerb::Copy => "cp_",
            PathVerb::NewFolder => "mk_",
            PathVerb::Watch => "wd_",
        }
    }
}

/// Controlli che chiedono un argomento di testo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    RunProcess,
    KillProcess,
    RestartProcess,
    ChangePriority,
    WatchProcess,
    Ping,
    Dns,
    WatchDirectory,
    ExecuteCommand,
    OpenUrl,
    SetClipboard,
    ChangePassword,
}

impl Prompt {
    const ALL: [Prompt; 12] = [
        Prompt::RunProcess,
        Prompt::KillProcess,
        Prompt::RestartProcess,
        Prompt::ChangePriority,
        Prompt::WatchProcess,
        Prompt::Ping,
        Prompt::Dns,
        Prompt::WatchDirectory,
        Prompt::ExecuteCommand,
        Prompt::OpenUrl,
        Prompt::SetClipboard,
        Prompt::ChangePassword,
    ];

    pub fn token(self) -> &'static str {
        match self {
            Prompt::RunProcess => "proc_run",
            Prompt::KillProcess => "proc_kill",
            Prompt::RestartProcess => "proc_restart",
            Prompt::ChangePriority => "proc_priority",
            Prompt::WatchProcess => "proc_watch",
            Prompt::Ping => "net_ping",
            Prompt::Dns => "net_dns",
            Prompt::WatchDirectory => "mon_watch_dir",
            Prompt::ExecuteCommand => "extra_cmd",
            Prompt::OpenUrl => "extra_open_url",
            Prompt::SetClipboard => "extra_clipboard_set",
            Prompt::ChangePassword => "set_password",
        }
    }
}

/// Azioni eseguite subito, senza argomenti.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direct {
    Sleep,
    Lock,
    Screenshot,
    Webcam,
    MicRecord,
    Clipboard,
    Cleanup,
    DiskTop,
    MonitorOff,
    ShowIp,
    Netstat,
    SpeedTest,
    Cpu,
    Ram,
    Status,
}

impl Direct {
    const ALL: [Direct; 15] = [
        Direct::Sleep,
        Direct::Lock,
        Direct::Screenshot,
        Direct::Webcam,
        Direct::MicRecord,
        Direct::Clipboard,
        Direct::Cleanup,
        Direct::DiskTop,
        Direct::MonitorOff,
        Direct::ShowIp,
        Direct::Netstat,
        Direct::SpeedTest,
        Direct::Cpu,
        Direct::Ram,
        Direct::Status,
    ];

    pub fn token(self) -> &'static str {
        match self {
            Direct::Sleep => "sys_sleep",
            Direct::Lock => "sys_lock",
            Direct::Screenshot => "sys_screenshot",
            Direct::Webcam => "sys_webcam",
            Direct::MicRecord => "sys_mic_record",
            Direct::Clipboard => "sys_clipboard",
            Direct::Cleanup => "sys_cleanup",
            Direct::DiskTop => "sys_disk_top",
            Direct::MonitorOff => "sys_monitor_off",
            Direct::ShowIp => "net_show_ip",
            Direct::Netstat => "net_netstat",
            Direct::SpeedTest => "net_speedtest",
            Direct::Cpu => "mon_cpu",
            Direct::Ram => "mon_ram",
            Direct::Status => "set_status",
        }
    }

    /// Menu da cui l'azione viene lanciata.
    pub fn menu(self) -> Menu {
        match self {
            Direct::ShowIp | Direct::Netstat | Direct::SpeedTest => Menu::Network,
            Direct::Cpu | Direct::Ram => Menu::Monitor,
            Direct::Status => Menu::Settings,
            _ => Menu::System,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    Menu(Menu),
    ProcessList,
    Prompt(Prompt),
    ProcessActions(u32),
    ProcessKill(u32),
    ProcessRestart(u32),
    Roots,
    Refresh,
    Drive(String),
    Up,
    Path(PathVerb, String),
    AskShutdown,
    AskRestart,
    ConfirmShutdown,
    ConfirmRestart,
    Direct(Direct),
    TimerMenu,
    Timer(TimerAction, u64),
    TimerCancel,
    StopWatchers,
    ShowUsers,
    Logout,
    Cancel,
}

impl Control {
    pub fn parse(token: &str) -> Option<Control> {
        if token.is_empty() || token.len() > CONTROL_BUDGET {
            return None;
        }
        let fixed = match token {
            "proc_list" => Some(Control::ProcessList),
            "file_root" => Some(Control::Roots),
            "file_refresh" => Some(Control::Refresh),
            "up" => Some(Control::Up),
            "sys_shutdown" => Some(Control::AskShutdown),
            "sys_restart" => Some(Control::AskRestart),
            "confirm_shutdown" => Some(Control::ConfirmShutdown),
            "confirm_restart" => Some(Control::ConfirmRestart),
            "sys_set_timer" => Some(Control::TimerMenu),
            "timer_cancel" => Some(Control::TimerCancel),
            "mon_stop" => Some(Control::StopWatchers),
            "set_users" => Some(Control::ShowUsers),
            "set_logout" => Some(Control::Logout),
            "cancel" => Some(Control::Cancel),
            _ => None,
        };
        if fixed.is_some() {
            return fixed;
        }
        if let Some(menu) = Menu::ALL.into_iter().find(|m| m.token() == token) {
            return Some(Control::Menu(menu));
        }
        if let Some(prompt) = Prompt::ALL.into_iter().find(|p| p.token() == token) {
            return Some(Control::Prompt(prompt));
        }
        if let Some(direct) = Direct::ALL.into_iter().find(|d| d.token() == token) {
            return Some(Control::Direct(direct));
        }
        for verb in PathVerb::ALL {
            if let Some(path_token) = token.strip_prefix(verb.prefix()) {
                return (!path_token.is_empty())
                    .then(|| Control::Path(verb, path_token.to_string()));
            }
        }

        let pid = |rest: &str| rest.parse::<u32>().ok();
        if let Some(rest) = token.strip_prefix("proc_action_") {
            return pid(rest).map(Control::ProcessActions);
        }
        if let Some(rest) = token.strip_prefix("proc_kill_pid_") {
            return pid(rest).map(Control::ProcessKill);
        }
        if let Some(rest) = token.strip_prefix("proc_restart_pid_") {
            return pid(rest).map(Control::ProcessRestart);
        }
        if let Some(label) = token.strip_prefix("drive_") {
            return (!label.is_empty()).then(|| Control::Drive(label.to_string()));
        }

        let minutes = |rest: &str| rest.parse::<u64>().ok().filter(|m| (1..=24 * 60).contains(m));
        if let Some(rest) = token.strip_prefix("timer_sleep_") {
            return minutes(rest).map(|m| Control::Timer(TimerAction::Sleep, m));
        }
        if let Some(rest) = token.strip_prefix("timer_shutdown_") {
            return minutes(rest).map(|m| Control::Timer(TimerAction::Shutdown, m));
        }
        None
    }

    pub fn token(&self) -> String {
        match self {
            Control::Menu(menu) => menu.token().to_string(),
            Control::ProcessList => "proc_list".to_string(),
            Control::Prompt(prompt) => prompt.token().to_string(),
            Control::ProcessActions(pid) => format!("proc_action_{pid}"),
            Control::ProcessKill(pid) => format!("proc_kill_pid_{pid}"),
            Control::ProcessRestart(pid) => format!("proc_restart_pid_{pid}"),
            Control::Roots => "file_root".to_string(),
            Control::Refresh => "file_refresh".to_string(),
            Control::Drive(label) => format!("drive_{label}"),
            Control::Up => "up".to_string(),
            Control::Path(verb, token) => format!("{}{token}", verb.prefix()),
            Control::AskShutdown => "sys_shutdown".to_string(),
            Control::AskRestart => "sys_restart".to_string(),
            Control::ConfirmShutdown => "confirm_shutdown".to_string(),
            Control::ConfirmRestart => "confirm_restart".to_string(),
            Control::Direct(direct) => direct.token().to_string(),
            Control::TimerMenu => "sys_set_timer".to_string(),
            Control::Timer(action, minutes) => format!("timer_{}_{minutes}", action.name()),
            Control::TimerCancel => "timer_cancel".to_string(),
            Control::StopWatchers => "mon_stop".to_string(),
            Control::ShowUsers => "set_users".to_string(),
            Control::Logout => "set_logout".to_string(),
            Control::Cancel => "cancel".to_string(),
        }
    }

    /// Controlli di pura navigazione, validi in qualsiasi stato.
    pub fn is_navigation(&self) -> bool {
        matches!(
            self,
            Control::Menu(_)
                | Control::Roots
                | Control::Refresh
                | Control::Drive(_)
                | Control::Up
                | Control::Path(PathVerb::Browse | PathVerb::Details, _)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::utils::path_token::TOKEN_BUDGET;

    #[test]
    fn every_fixed_token_parses_back() {
        let mut controls = vec![
            Control::ProcessList,
            Control::ProcessActions(42),
            Control::ProcessKill(7),
            Control::ProcessRestart(9),
            Control::Roots,
            Control::Refresh,
            Control::Drive("C".into()),
            Control::Up,
            Control::AskShutdown,
            Control::AskRestart,
            Control::ConfirmShutdown,
            Control::ConfirmRestart,
            Control::TimerMenu,
            Control::Timer(TimerAction::Sleep, 30),
            Control::Timer(TimerAction::Shutdown, 120),
            Control::TimerCancel,
            Control::StopWatchers,
            Control::ShowUsers,
            Control::Logout,
            Control::Cancel,
        ];
        controls.extend(Menu::ALL.map(Control::Menu));
        controls.extend(Prompt::ALL.map(Control::Prompt));
        controls.extend(Direct::ALL.map(Control::Direct));
        controls.extend(PathVerb::ALL.map(|v| Control::Path(v, "pL3RtcA".into())));

        for control in controls {
            assert_eq!(Control::parse(&control.token()), Some(control.clone()));
        }
    }

    #[test]
    fn path_controls_fit_the_budget() {
        let longest_verb = PathVerb::ALL.iter().map(|v| v.prefix().len()).max().unwrap();
        assert!(longest_verb + TOKEN_BUDGET <= CONTROL_BUDGET);
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        for token in [
            "",
            "menu_nope",
            "proc_action_abc",
            "proc_kill_pid_-1",
            "timer_sleep_0",
            "timer_sleep_99999",
            "cd_",
            "drive_",
            &"x".repeat(CONTROL_BUDGET + 1),
        ] {
            assert_eq!(Control::parse(token), None, "{token}");
        }
    }

    #[test]
    fn navigation_is_classified() {
        assert!(Control::Up.is_navigation());
        assert!(Control::Path(PathVerb::Browse, "p".into()).is_navigation());
        assert!(!Control::Path(PathVerb::Delete, "p".into()).is_navigation());
        assert!(!Control::Cancel.is_navigation());
    }
}
