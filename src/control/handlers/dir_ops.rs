use std::path::Path;

use log::{info, warn};

use crate::control::Dispatcher;
use crate::control::controls::{Control, Menu, PathVerb};
use crate::control::navigation::{self, Entry};
use crate::control::types::{Button, Response, UserId};
use crate::control::utils::metadata::MetadataConverter;
use crate::file_info::FileInfo;

const LABEL_CHARS: usize = 30;

fn nav_buttons() -> Vec<Button> {
    vec![
        Button::new("🔙 Back", Control::Menu(Menu::Main).token()),
        Button::new("🏠 Root", Control::Roots.token()),
        Button::new("🔄 Refresh", Control::Refresh.token()),
    ]
}

fn remember(d: &Dispatcher, user: &UserId, dir: &Path) {
    if let Err(e) = d.store.set_current_dir(user, dir) {
        warn!("user {}: cannot record working directory: {}", user, e);
    }
}

pub async fn roots_view(d: &Dispatcher, user: &UserId) -> Response {
    remember(d, user, Path::new(""));
    let roots = navigation::list_roots();
    if roots.is_empty() {
        return Response::with_controls(
            "❌ No drives found.",
            vec![Button::new("🔙 Back", Control::Menu(Menu::Main).token())],
        );
    }

    let mut text = String::from("📁 File Explorer\n\nSelect a drive:\n");
    let mut controls = Vec::with_capacity(roots.len() + 1);
    for root in &roots {
        text.push_str(&format!("💿 {} ({})\n", root.label, root.path.display()));
        controls.push(Button::new(
            format!("💿 {}", root.label),
            Control::Drive(root.label.clone()).token(),
        ));
    }
    controls.push(Button::new("🔙 Back", Control::Menu(Menu::Main).token()));
    Response::with_controls(text.trim_end(), controls)
}

pub async fn open_drive(d: &Dispatcher, user: &UserId, label: &str) -> Response {
    match navigation::resolve_root(label) {
        Some(root) => directory_view(d, user, &root).await,
        None => {
            warn!("user {}: unknown drive {:?}", user, label);
            Response::with_controls(format!("❌ Unknown drive: {label}"), nav_buttons())
        }
    }
}

/// Vista di una directory; il percorso vuoto mostra le radici.
pub async fn directory_view(d: &Dispatcher, user: &UserId, path: &Path) -> Response {
    if path.as_os_str().is_empty() {
        return roots_view(d, user).await;
    }
    let entries = match navigation::list_directory(path).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!("user {}: cannot browse {:?}: {}", user, path, e);
            return Response::with_controls(e.user_message(), nav_buttons());
        }
    };
    remember(d, user, path);
    info!("user {}: browsing {:?}", user, path);

    let limits = d.config.limits;
    let text = render_listing(path, &entries, limits.inline);

    let mut controls = Vec::new();
    {
        let mut session = d.sessions.lock(user).await;
        for entry in &entries {
            if controls.len() >= limits.selectable {
                break;
            }
            // i percorsi non UTF-8 restano solo nel testo
            let Some(token) = session.tokens.issue(&entry.path) else {
                continue;
            };
            let name = MetadataConverter::short_label(&entry.name, LABEL_CHARS);
            let button = if entry.is_dir {
                Button::new(
                    format!("📁 {name}"),
                    Control::Path(PathVerb::Browse, token).token(),
                )
            } else {
                Button::new(
                    format!("📄 {name} ({})", MetadataConverter::format_size(entry.size)),
                    Control::Path(PathVerb::Details, token).token(),
                )
            };
            controls.push(button);
        }

        controls.push(Button::new("📁 ..", Control::Up.token()));
        if let Some(token) = session.tokens.issue(path) {
            controls.push(Button::new(
                "➕ New Folder",
                Control::Path(PathVerb::NewFolder, token.clone()).token(),
            ));
            controls.push(Button::new(
                "👁️ Watch",
                Control::Path(PathVerb::Watch, token).token(),
            ));
        }
    }
    controls.extend(nav_buttons());
    Response::with_controls(text, controls)
}

fn render_listing(path: &Path, entries: &[Entry], inline: usize) -> String {
    let mut text = format!("📂 {}\n\n", path.display());
    if entries.is_empty() {
        text.push_str("📁 Empty directory");
        return text;
    }

    let folders = entries.iter().filter(|e| e.is_dir).count();
    text.push_str(&format!(
        "📁 Folders: {} | 📄 Files: {}\n\n",
        folders,
        entries.len() - folders
    ));
    for entry in entries.iter().take(inline) {
        if entry.is_dir {
            text.push_str(&format!("  📁 {}\n", entry.name));
        } else {
            text.push_str(&format!(
                "  📄 {} ({})\n",
                entry.name,
                MetadataConverter::format_size(entry.size)
            ));
        }
    }
    if entries.len() > inline {
        text.push_str(&format!("  ... and {} more\n", entries.len() - inline));
    }
    text.trim_end().to_string()
}

pub async fn refresh(d: &Dispatcher, user: &UserId) -> Response {
    match d.store.current_dir(user) {
        Some(dir) => directory_view(d, user, &dir).await,
        None => roots_view(d, user).await,
    }
}

pub async fn up(d: &Dispatcher, user: &UserId) -> Response {
    match d.store.current_dir(user) {
        Some(dir) => directory_view(d, user, &navigation::parent_of(&dir)).await,
        None => roots_view(d, user).await,
    }
}

/// Controlli per tornare alla cartella che contiene `path`.
pub async fn folder_controls(d: &Dispatcher, user: &UserId, dir: &Path) -> Vec<Button> {
    let mut controls = Vec::new();
    if let Some(token) = d.sessions.lock(user).await.tokens.issue(dir) {
        controls.push(Button::new(
            "📂 Back to folder",
            Control::Path(PathVerb::Browse, token).token(),
        ));
    }
    controls.push(Button::new("🏠 Root", Control::Roots.token()));
    controls
}

pub async fn file_view(d: &Dispatcher, user: &UserId, path: &Path) -> Response {
    let info = match FileInfo::inspect(path).await {
        Ok(info) => info,
        Err(e) => return Response::with_controls(e.user_message(), nav_buttons()),
    };
    if info.is_dir {
        return directory_view(d, user, path).await;
    }

    let text = format!(
        "📄 File Info\n\nName: {}\nPath: {}\nSize: {}\nModified: {}\nType: {}",
        info.name,
        info.path.display(),
        MetadataConverter::format_size(info.size),
        MetadataConverter::format_modified(info.modified),
        info.kind()
    );

    let mut controls = Vec::new();
    if let Some(token) = d.sessions.lock(user).await.tokens.issue(path) {
        let actions = [
            ("💾 Download", PathVerb::Download),
            ("🗑️ Delete", PathVerb::Delete),
            ("✏️ Rename", PathVerb::Rename),
            ("📦 Move", PathVerb::Move),
            ("📄 Copy", PathVerb::Copy),
        ];
        for (label, verb) in actions {
            controls.push(Button::new(label, Control::Path(verb, token.clone()).token()));
        }
    }
    controls.extend(folder_controls(d, user, &navigation::parent_of(path)).await);
    Response::with_controls(text, controls)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::SystemTime;

    use super::*;

    fn entry(name: &str, is_dir: bool, size: u64) -> Entry {
        Entry {
            name: name.to_string(),
            path: PathBuf::from("/x").join(name),
            is_dir,
            size,
            modified: Some(SystemTime::UNIX_EPOCH),
        }
    }

    #[test]
    fn listing_truncates_with_suffix() {
        let mut entries = vec![entry("docs", true, 0)];
        entries.extend((0..4).map(|i| entry(&format!("f{i}.txt"), false, 2048)));

        let text = render_listing(Path::new("/x"), &entries, 3);
        assert!(text.starts_with("📂 /x\n\n📁 Folders: 1 | 📄 Files: 4"));
        assert!(text.contains("  📁 docs\n"));
        assert!(text.contains("  📄 f1.txt (2.0 KB)"));
        assert!(!text.contains("f2.txt"));
        assert!(text.ends_with("... and 2 more"));
    }

    #[test]
    fn empty_listing_says_so() {
        assert_eq!(
            render_listing(Path::new("/x"), &[], 20),
            "📂 /x\n\n📁 Empty directory"
        );
    }
}
