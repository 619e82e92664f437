use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::control::Dispatcher;
use crate::control::error::{ControlError, Result};
use crate::control::fs_ops;
use crate::control::handlers::{dir_ops, menus};
use crate::control::navigation;
use crate::control::session_state::{PendingAction, Scratch, scratch};
use crate::control::types::{Response, UserId};
use crate::control::utils::metadata::MetadataConverter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relocation {
    Move,
    Copy,
}

fn outcome(result: Result<String>) -> String {
    result.unwrap_or_else(|e| e.user_message())
}

fn scratch_path(scratch: &Scratch, key: &str) -> Result<PathBuf> {
    scratch
        .get(key)
        .map(PathBuf::from)
        .ok_or_else(|| ControlError::InvalidInput("Missing selection, start again.".to_string()))
}

async fn with_folder(d: &Dispatcher, user: &UserId, text: String, dir: &Path) -> Response {
    Response::with_controls(text, dir_ops::folder_controls(d, user, dir).await)
}

pub async fn download(d: &Dispatcher, user: &UserId, path: &Path) -> Response {
    match fs_ops::read_for_send(path, d.config.max_send_size).await {
        Ok(attachment) => {
            info!("user {}: sending {:?} ({} bytes)", user, path, attachment.bytes.len());
            Response::text(format!(
                "📄 {} ({})",
                attachment.name,
                MetadataConverter::format_size(attachment.bytes.len() as u64)
            ))
            .attach(attachment)
        }
        Err(e) => {
            warn!("user {}: cannot send {:?}: {}", user, path, e);
            Response::text(e.user_message())
        }
    }
}

pub async fn delete(d: &Dispatcher, user: &UserId, path: &Path) -> Response {
    let text = outcome(fs_ops::delete(path).await);
    with_folder(d, user, text, &navigation::parent_of(path)).await
}

fn path_scratch(key: &str, path: &Path) -> Scratch {
    let mut scratch = Scratch::new();
    scratch.insert(key.to_string(), path.to_string_lossy().into_owned());
    scratch
}

pub async fn ask_rename(d: &Dispatcher, user: &UserId, path: &Path) -> Response {
    d.sessions
        .set_pending(user, PendingAction::RenameFile, path_scratch(scratch::FILE_PATH, path))
        .await;
    Response::with_controls(
        format!("✏️ Rename\n\nCurrent: {}\n\nSend the new name:", path.display()),
        vec![menus::cancel_button()],
    )
}

pub async fn ask_relocation(
    d: &Dispatcher,
    user: &UserId,
    path: &Path,
    kind: Relocation,
) -> Response {
    let (action, title) = match kind {
        Relocation::Move => (PendingAction::MoveFile, "📦 Move"),
        Relocation::Copy => (PendingAction::CopyFile, "📄 Copy"),
    };
    d.sessions
        .set_pending(user, action, path_scratch(scratch::FILE_PATH, path))
        .await;
    Response::with_controls(
        format!(
            "{title}\n\nItem: {}\n\nSend the destination path (a folder or a new full path):",
            path.display()
        ),
        vec![menus::cancel_button()],
    )
}

pub async fn ask_new_folder(d: &Dispatcher, user: &UserId, dir: &Path) -> Response {
    d.sessions
        .set_pending(
            user,
            PendingAction::CreateDirectory,
            path_scratch(scratch::DIR_PATH, dir),
        )
        .await;
    Response::with_controls(
        format!("📁 New Folder\n\nIn: {}\n\nSend the folder name:", dir.display()),
        vec![menus::cancel_button()],
    )
}

pub async fn rename(d: &Dispatcher, user: &UserId, scratch: &Scratch, new_name: &str) -> Response {
    let path = match scratch_path(scratch, scratch::FILE_PATH) {
        Ok(path) => path,
        Err(e) => return Response::text(e.user_message()),
    };
    let text = outcome(fs_ops::rename(&path, new_name).await);
    with_folder(d, user, text, &navigation::parent_of(&path)).await
}

/// Destinazioni relative si intendono rispetto alla cartella dell'elemento.
fn destination_for(source: &Path, reply: &str) -> PathBuf {
    let reply = Path::new(reply.trim());
    if reply.is_absolute() {
        reply.to_path_buf()
    } else {
        navigation::parent_of(source).join(reply)
    }
}

pub async fn relocate(
    d: &Dispatcher,
    user: &UserId,
    scratch: &Scratch,
    reply: &str,
    kind: Relocation,
) -> Response {
    let source = match scratch_path(scratch, scratch::FILE_PATH) {
        Ok(path) => path,
        Err(e) => return Response::text(e.user_message()),
    };
    if reply.trim().is_empty() {
        return Response::text(
            ControlError::InvalidInput("Destination cannot be empty.".to_string()).user_message(),
        );
    }
    let destination = destination_for(&source, reply);
    let result = match kind {
        Relocation::Move => fs_ops::move_to(&source, &destination).await,
        Relocation::Copy => fs_ops::copy_to(&source, &destination).await,
    };
    let text = outcome(result);
    with_folder(d, user, text, &navigation::parent_of(&source)).await
}

pub async fn create_directory(
    d: &Dispatcher,
    user: &UserId,
    scratch: &Scratch,
    name: &str,
) -> Response {
    let dir = match scratch_path(scratch, scratch::DIR_PATH) {
        Ok(dir) => dir,
        Err(e) => return Response::text(e.user_message()),
    };
    let text = outcome(fs_ops::create_directory(&dir, name).await);
    with_folder(d, user, text, &dir).await
}

/// Documento caricato: finisce nella directory di lavoro corrente.
pub async fn upload(d: &Dispatcher, user: &UserId, name: &str, bytes: &[u8]) -> Response {
    let Some(dir) = d.store.current_dir(user) else {
        return Response::text("❌ Please open a directory first using File Explorer.");
    };
    let text = outcome(fs_ops::save_upload(&dir, name, bytes).await);
    with_folder(d, user, text, &dir).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_destinations_resolve_next_to_the_source() {
        let source = Path::new("/data/in/a.txt");
        assert_eq!(
            destination_for(source, "b.txt"),
            PathBuf::from("/data/in/b.txt")
        );
        assert_eq!(
            destination_for(source, " /backup "),
            PathBuf::from("/backup")
        );
    }
}
