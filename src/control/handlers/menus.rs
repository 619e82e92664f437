use crate::control::controls::{Control, Direct, Menu, Prompt};
use crate::control::session_state::TimerAction;
use crate::control::types::{Button, Response};

fn button(label: &str, control: Control) -> Button {
    Button::new(label, control.token())
}

fn back(to: Menu) -> Button {
    button("🔙 Back", Control::Menu(to))
}

pub fn buttons(menu: Menu) -> Vec<Button> {
    match menu {
        Menu::Main => vec![
            button("📋 Process Manager", Control::Menu(Menu::Process)),
            button("📁 File Explorer", Control::Menu(Menu::Files)),
            button("⚙️ System Control", Control::Menu(Menu::System)),
            button("🌐 Network Tools", Control::Menu(Menu::Network)),
            button("📊 Monitoring", Control::Menu(Menu::Monitor)),
            button("🛠️ Extra Tools", Control::Menu(Menu::Extra)),
            button("🔒 Settings", Control::Menu(Menu::Settings)),
        ],
        Menu::Process => vec![
            button("📋 List Processes", Control::ProcessList),
            button("▶️ Run Process", Control::Prompt(Prompt::RunProcess)),
            button("❌ Kill Process", Control::Prompt(Prompt::KillProcess)),
            button("🔄 Restart Process", Control::Prompt(Prompt::RestartProcess)),
            button("🎯 Change Priority", Control::Prompt(Prompt::ChangePriority)),
            button("👁️ Watch Process", Control::Prompt(Prompt::WatchProcess)),
            back(Menu::Main),
        ],
        // il menu file è l'elenco delle radici, costruito da dir_ops
        Menu::Files => vec![button("🏠 Root", Control::Roots), back(Menu::Main)],
        Menu::System => vec![
            button("🔴 Shutdown PC", Control::AskShutdown),
            button("🔄 Restart PC", Control::AskRestart),
            button("😴 Sleep", Control::Direct(Direct::Sleep)),
            button("🔒 Lock PC", Control::Direct(Direct::Lock)),
            button("📸 Screenshot", Control::Direct(Direct::Screenshot)),
            button("📷 Webcam Capture", Control::Direct(Direct::Webcam)),
            button("🎤 Mic Record", Control::Direct(Direct::MicRecord)),
            button("📋 Clipboard View", Control::Direct(Direct::Clipboard)),
            button("🧹 Cleanup Temp", Control::Direct(Direct::Cleanup)),
            button("📊 Disk Analysis", Control::Direct(Direct::DiskTop)),
            button("🔴 Monitor Off", Control::Direct(Direct::MonitorOff)),
            button("⏰ Set Timer", Control::TimerMenu),
            back(Menu::Main),
        ],
        Menu::Network => vec![
            button("🌐 Show IP", Control::Direct(Direct::ShowIp)),
            button("📡 Ping Host", Control::Prompt(Prompt::Ping)),
            button("📊 Netstat", Control::Direct(Direct::Netstat)),
            button("🔍 DNS Lookup", Control::Prompt(Prompt::Dns)),
            button("⚡ Speedtest", Control::Direct(Direct::SpeedTest)),
            back(Menu::Main),
        ],
        Menu::Monitor => vec![
            button("📈 Monitor CPU", Control::Direct(Direct::Cpu)),
            button("💾 Monitor RAM", Control::Direct(Direct::Ram)),
            button("👁️ Watch Directory", Control::Prompt(Prompt::WatchDirectory)),
            button("⏹️ Stop Monitoring", Control::StopWatchers),
            back(Menu::Main),
        ],
        Menu::Extra => vec![
            button("💻 Execute CMD", Control::Prompt(Prompt::ExecuteCommand)),
            button("🌐 Open URL", Control::Prompt(Prompt::OpenUrl)),
            button("📋 Set Clipboard", Control::Prompt(Prompt::SetClipboard)),
            back(Menu::Main),
        ],
        Menu::Settings => vec![
            button("👥 Allowed Users", Control::ShowUsers),
            button("🔑 Change Password", Control::Prompt(Prompt::ChangePassword)),
            button("📊 System Status", Control::Direct(Direct::Status)),
            button("🚪 Log Out", Control::Logout),
            back(Menu::Main),
        ],
    }
}

pub fn title(menu: Menu) -> &'static str {
    match menu {
        Menu::Main => "📋 Main Menu",
        Menu::Process => "📋 Process Manager",
        Menu::Files => "📁 File Explorer",
        Menu::System => "⚙️ System Control",
        Menu::Network => "🌐 Network Tools",
        Menu::Monitor => "📊 Monitoring",
        Menu::Extra => "🛠️ Extra Tools",
        Menu::Settings => "🔒 Settings",
    }
}

pub fn show(menu: Menu) -> Response {
    Response::with_controls(title(menu), buttons(menu))
}

/// Risposta con testo libero e i controlli del menu principale.
pub fn main_menu(text: impl Into<String>) -> Response {
    Response::with_controls(text, buttons(Menu::Main))
}

pub fn timer_buttons() -> Vec<Button> {
    let mut list: Vec<Button> = [10, 30, 60, 120]
        .into_iter()
        .map(|m| {
            button(
                &format!("{m} min (Sleep)"),
                Control::Timer(TimerAction::Sleep, m),
            )
        })
        .collect();
    list.extend([10, 30].into_iter().map(|m| {
        button(
            &format!("{m} min (Shutdown)"),
            Control::Timer(TimerAction::Shutdown, m),
        )
    }));
    list.push(button("🚫 Cancel Timer", Control::TimerCancel));
    list.push(back(Menu::System));
    list
}

pub fn cancel_button() -> Button {
    button("❌ Cancel", Control::Cancel)
}

pub fn confirm_buttons(confirm: Control) -> Vec<Button> {
    vec![button("✅ Confirm", confirm), cancel_button()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::controls::CONTROL_BUDGET;
    use crate::control::MAX_CONTROLS;

    #[test]
    fn menu_tokens_are_valid_controls() {
        let menus = [
            Menu::Main,
            Menu::Process,
            Menu::Files,
            Menu::System,
            Menu::Network,
            Menu::Monitor,
            Menu::Extra,
            Menu::Settings,
        ];
        for menu in menus {
            let list = buttons(menu);
            assert!(list.len() <= MAX_CONTROLS);
            for b in list {
                assert!(b.token.len() <= CONTROL_BUDGET);
                assert!(Control::parse(&b.token).is_some(), "{}", b.token);
            }
        }
        for b in timer_buttons() {
            assert!(Control::parse(&b.token).is_some(), "{}", b.token);
        }
    }
}
