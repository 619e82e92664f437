use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{info, warn};
use tokio::fs;
use walkdir::WalkDir;

use crate::control::error::{ControlError, Result};
use crate::control::types::{Attachment, AttachmentKind};
use crate::control::utils::metadata::MetadataConverter;

async fn require_exists(path: &Path) -> Result<std::fs::Metadata> {
    fs::metadata(path)
        .await
        .map_err(|e| ControlError::from_io(path, e))
}

async fn require_absent(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path).await {
        Ok(_) => Err(ControlError::Collision(path.to_path_buf())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ControlError::from_io(path, e)),
    }
}

async fn require_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            let metadata = fs::metadata(parent)
                .await
                .map_err(|e| ControlError::from_io(parent, e))?;
            if metadata.is_dir() {
                Ok(())
            } else {
                Err(ControlError::NotADirectory(parent.to_path_buf()))
            }
        }
        _ => Err(ControlError::InvalidInput(format!(
            "Destination has no parent directory: {}",
            path.display()
        ))),
    }
}

/// Percorso con la directory madre risolta; l'ultimo componente resta com'è,
/// così un link simbolico non viene seguito.
async fn anchored(path: &Path) -> Result<PathBuf> {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => fs::canonicalize(parent)
            .await
            .map(|parent| parent.join(name))
            .map_err(|e| ControlError::from_io(parent, e)),
        _ => fs::canonicalize(path)
            .await
            .map_err(|e| ControlError::from_io(path, e)),
    }
}

/// Una directory non può finire dentro se stessa.
async fn require_outside(source: &Path, target: &Path) -> Result<()> {
    let source_abs = anchored(source).await?;
    let target_abs = anchored(target).await?;
    if target_abs.starts_with(&source_abs) {
        return Err(ControlError::InvalidInput(format!(
            "Cannot place {} inside itself",
            source.display()
        )));
    }
    Ok(())
}

fn plain_name(name: &str) -> Result<&str> {
    let name = name.trim();
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\');
    if invalid {
        Err(ControlError::InvalidInput(format!("Invalid name: {name:?}")))
    } else {
        Ok(name)
    }
}

/// Destinazione effettiva: se `destination` è una directory esistente
/// l'elemento finisce al suo interno.
async fn effective_destination(source: &Path, destination: &Path) -> PathBuf {
    match fs::metadata(destination).await {
        Ok(metadata) if metadata.is_dir() => match source.file_name() {
            Some(name) => destination.join(name),
            None => destination.to_path_buf(),
        },
        _ => destination.to_path_buf(),
    }
}

pub async fn delete(path: &Path) -> Result<String> {
    let metadata = require_exists(path).await?;
    let message = if metadata.is_dir() {
        fs::remove_dir_all(path)
            .await
            .map_err(|e| ControlError::from_io(path, e))?;
        format!("✅ Directory deleted: {}", path.display())
    } else {
        fs::remove_file(path)
            .await
            .map_err(|e| ControlError::from_io(path, e))?;
        format!("✅ File deleted: {}", path.display())
    };
    info!("{}", message);
    Ok(message)
}

pub async fn rename(path: &Path, new_name: &str) -> Result<String> {
    let new_name = plain_name(new_name)?;
    require_exists(path).await?;
    let target = match path.parent() {
        Some(parent) => parent.join(new_name),
        None => PathBuf::from(new_name),
    };
    require_absent(&target).await?;

    fs::rename(path, &target)
        .await
        .map_err(|e| ControlError::from_io(path, e))?;
    info!("Renamed {:?} to {:?}", path, target);
    Ok(format!("✅ Renamed to: {new_name}"))
}

pub async fn move_to(source: &Path, destination: &Path) -> Result<String> {
    require_exists(source).await?;
    let target = effective_destination(source, destination).await;
    require_parent(&target).await?;
    require_absent(&target).await?;
    require_outside(source, &target).await?;

    match fs::rename(source, &target).await {
        Ok(()) => {}
        Err(e) if e.kind() != ErrorKind::CrossesDevices => {
            return Err(ControlError::from_io(source, e));
        }
        Err(e) => {
            // volume diverso: copia e poi rimuovi l'originale
            warn!("rename {:?} -> {:?} failed ({}), copying instead", source, target, e);
            copy_any(source, &target).await?;
            let metadata = fs::symlink_metadata(source)
                .await
                .map_err(|e| ControlError::from_io(source, e))?;
            let removed = if metadata.is_dir() {
                fs::remove_dir_all(source).await
            } else {
                fs::remove_file(source).await
            };
            removed.map_err(|e| ControlError::from_io(source, e))?;
        }
    }
    info!("Moved {:?} to {:?}", source, target);
    Ok(format!("✅ Moved to: {}", target.display()))
}

pub async fn copy_to(source: &Path, destination: &Path) -> Result<String> {
    require_exists(source).await?;
    let target = effective_destination(source, destination).await;
    require_parent(&target).await?;
    require_absent(&target).await?;
    require_outside(source, &target).await?;

    copy_any(source, &target).await?;
    info!("Copied {:?} to {:?}", source, target);
    Ok(format!("✅ Copied to: {}", target.display()))
}

/// Copia ricorsiva in un task bloccante; in caso di errore la copia parziale
/// viene rimossa.
async fn copy_any(source: &Path, target: &Path) -> Result<()> {
    let source = source.to_path_buf();
    let target = target.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let copied = copy_tree(&source, &target);
        if copied.is_err() {
            discard(&target);
        }
        copied
    })
    .await
    .map_err(|e| ControlError::CollaboratorFailure(format!("copy task failed: {e}")))?
}

fn walk_error(err: walkdir::Error) -> ControlError {
    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
    match err.into_io_error() {
        Some(io) => ControlError::from_io(path, io),
        None => ControlError::InvalidInput(format!("Filesystem loop at {}", path.display())),
    }
}

fn copy_tree(source: &Path, target: &Path) -> Result<()> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(walk_error)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|_| ControlError::InvalidInput(format!("Unexpected entry {}", entry.path().display())))?;
        let dest = if relative.as_os_str().is_empty() {
            target.to_path_buf()
        } else {
            target.join(relative)
        };

        let kind = entry.file_type();
        let copied = if kind.is_dir() {
            std::fs::create_dir(&dest)
        } else if kind.is_symlink() {
            copy_link(entry.path(), &dest)
        } else {
            std::fs::copy(entry.path(), &dest).map(|_| ())
        };
        copied.map_err(|e| ControlError::from_io(entry.path(), e))?;
    }
    Ok(())
}

#[cfg(unix)]
fn copy_link(link: &Path, dest: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(std::fs::read_link(link)?, dest)
}

#[cfg(windows)]
fn copy_link(link: &Path, dest: &Path) -> std::io::Result<()> {
    let points_to = std::fs::read_link(link)?;
    if std::fs::metadata(link).map(|m| m.is_dir()).unwrap_or(false) {
        std::os::windows::fs::symlink_dir(points_to, dest)
    } else {
        std::os::windows::fs::symlink_file(points_to, dest)
    }
}

#[cfg(not(any(unix, windows)))]
fn copy_link(link: &Path, _dest: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        ErrorKind::Unsupported,
        format!("cannot copy symlink {}", link.display()),
    ))
}

fn discard(target: &Path) {
    let removed = match std::fs::symlink_metadata(target) {
        Ok(metadata) if metadata.is_dir() => std::fs::remove_dir_all(target),
        Ok(_) => std::fs::remove_file(target),
        Err(_) => return,
    };
    match removed {
        Ok(()) => info!("Removed partial copy {:?}", target),
        Err(e) => warn!("cannot remove partial copy {:?}: {}", target, e),
    }
}

pub async fn create_directory(parent: &Path, name: &str) -> Result<String> {
    let name = plain_name(name)?;
    let metadata = require_exists(parent).await?;
    if !metadata.is_dir() {
        return Err(ControlError::NotADirectory(parent.to_path_buf()));
    }
    let target = parent.join(name);
    require_absent(&target).await?;

    fs::create_dir(&target)
        .await
        .map_err(|e| ControlError::from_io(&target, e))?;
    info!("Created directory {:?}", target);
    Ok(format!("✅ Directory created: {}", target.display()))
}

/// Salva un documento caricato nella directory di lavoro dell'utente.
pub async fn save_upload(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<String> {
    let name = Path::new(file_name.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ControlError::InvalidInput(format!("Invalid file name: {file_name:?}")))?;
    let name = plain_name(name)?;
    let metadata = require_exists(dir).await?;
    if !metadata.is_dir() {
        return Err(ControlError::NotADirectory(dir.to_path_buf()));
    }
    let target = dir.join(name);
    require_absent(&target).await?;

    fs::write(&target, bytes)
        .await
        .map_err(|e| ControlError::from_io(&target, e))?;
    info!("Saved upload {:?} ({} bytes)", target, bytes.len());
    Ok(format!("✅ File saved: {}", target.display()))
}

/// Legge un file da inviare, rifiutandolo se supera `max_size`.
pub async fn read_for_send(path: &Path, max_size: u64) -> Result<Attachment> {
    let metadata = require_exists(path).await?;
    if metadata.is_dir() {
        return Err(ControlError::InvalidInput(format!(
            "Cannot send a directory: {}",
            path.display()
        )));
    }
    if metadata.len() > max_size {
        return Err(ControlError::InvalidInput(format!(
            "File too large ({}). Maximum size is {}.",
            MetadataConverter::format_size(metadata.len()),
            MetadataConverter::format_size(max_size)
        )));
    }
    let bytes = fs::read(path)
        .await
        .map_err(|e| ControlError::from_io(path, e))?;
    Ok(Attachment {
        kind: AttachmentKind::Document,
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string()),
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rename_refuses_collision_and_keeps_original() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        std::fs::write(&a, "a").unwrap();

        let msg = rename(&a, "b.txt").await.unwrap();
        assert!(msg.contains("b.txt"));
        assert!(dir.path().join("b.txt").exists());

        std::fs::write(&a, "again").unwrap();
        let err = rename(&a, "b.txt").await.unwrap_err();
        assert!(matches!(err, ControlError::Collision(_)));
        assert_eq!(std::fs::read_to_string(&a).unwrap(), "again");
    }

    #[tokio::test]
    async fn rename_rejects_path_like_names() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        std::fs::write(&a, "").unwrap();
        for bad in ["", "..", "x/y", "x\\y"] {
            assert!(matches!(
                rename(&a, bad).await,
                Err(ControlError::InvalidInput(_))
            ));
        }
    }

    #[tokio::test]
    async fn move_and_copy_validate_both_ends() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.txt");
        std::fs::write(&src, "data").unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();

        let missing_parent = dir.path().join("nope").join("x.txt");
        assert!(matches!(
            copy_to(&src, &missing_parent).await,
            Err(ControlError::NotFound(_))
        ));
        assert!(matches!(
            move_to(&dir.path().join("ghost"), &sub).await,
            Err(ControlError::NotFound(_))
        ));

        copy_to(&src, &sub).await.unwrap();
        assert_eq!(std::fs::read_to_string(sub.join("src.txt")).unwrap(), "data");
        assert!(matches!(
            copy_to(&src, &sub).await,
            Err(ControlError::Collision(_))
        ));

        let moved = dir.path().join("moved.txt");
        move_to(&src, &moved).await.unwrap();
        assert!(!src.exists());
        assert!(moved.exists());
    }

    #[tokio::test]
    async fn copies_directory_trees() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("tree");
        std::fs::create_dir_all(tree.join("inner")).unwrap();
        std::fs::write(tree.join("inner").join("leaf"), "leaf").unwrap();

        copy_to(&tree, &dir.path().join("clone")).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("clone/inner/leaf")).unwrap(),
            "leaf"
        );

        delete(&tree).await.unwrap();
        assert!(!tree.exists());
        assert!(matches!(delete(&tree).await, Err(ControlError::NotFound(_))));
    }

    #[tokio::test]
    async fn directories_cannot_go_inside_themselves() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(src.join("nested")).unwrap();
        std::fs::write(src.join("nested").join("f"), "f").unwrap();

        for target in [src.join("sub"), src.join("nested"), src.clone()] {
            assert!(matches!(
                move_to(&src, &target).await,
                Err(ControlError::InvalidInput(_))
            ));
            assert!(matches!(
                copy_to(&src, &target).await,
                Err(ControlError::InvalidInput(_))
            ));
        }
        assert!(!src.join("sub").exists());
        assert!(!src.join("nested").join("src").exists());
        assert_eq!(std::fs::read_to_string(src.join("nested/f")).unwrap(), "f");

        // una sorella con lo stesso prefisso non è contenuta
        let sibling = dir.path().join("src-copy");
        copy_to(&src, &sibling).await.unwrap();
        assert!(sibling.join("nested/f").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinks_are_copied_as_links() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("tree");
        std::fs::create_dir(&tree).unwrap();
        std::fs::write(tree.join("leaf"), "leaf").unwrap();
        std::os::unix::fs::symlink(&tree, tree.join("loop")).unwrap();

        let clone = dir.path().join("clone");
        copy_to(&tree, &clone).await.unwrap();
        let link = std::fs::symlink_metadata(clone.join("loop")).unwrap();
        assert!(link.file_type().is_symlink());
        assert_eq!(std::fs::read_link(clone.join("loop")).unwrap(), tree);
        assert_eq!(std::fs::read_to_string(clone.join("leaf")).unwrap(), "leaf");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_copies_leave_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("tree");
        std::fs::create_dir_all(tree.join("a")).unwrap();
        std::fs::write(tree.join("a").join("f"), "f").unwrap();
        // un socket non si può aprire in lettura
        let _listener = std::os::unix::net::UnixListener::bind(tree.join("sock")).unwrap();

        let clone = dir.path().join("clone");
        assert!(copy_to(&tree, &clone).await.is_err());
        assert!(std::fs::symlink_metadata(&clone).is_err());
        assert!(tree.join("a/f").exists());
    }

    #[tokio::test]
    async fn create_directory_and_uploads() {
        let dir = tempfile::tempdir().unwrap();
        create_directory(dir.path(), "new").await.unwrap();
        assert!(dir.path().join("new").is_dir());
        assert!(matches!(
            create_directory(dir.path(), "new").await,
            Err(ControlError::Collision(_))
        ));

        let msg = save_upload(dir.path(), "../../etc/evil.txt", b"x").await.unwrap();
        assert!(msg.contains("evil.txt"));
        assert!(dir.path().join("evil.txt").exists());
    }

    #[tokio::test]
    async fn oversized_files_are_not_sent() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("big.bin");
        std::fs::write(&file, vec![7u8; 2048]).unwrap();

        let err = read_for_send(&file, 1024).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "File too large (2.0 KB). Maximum size is 1.0 KB."
        );

        let attachment = read_for_send(&file, 4096).await.unwrap();
        assert_eq!(attachment.name, "big.bin");
        assert_eq!(attachment.bytes.len(), 2048);
    }
}
