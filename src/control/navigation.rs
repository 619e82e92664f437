use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::{info, warn};
use tokio::fs;

use crate::control::error::{ControlError, Result};

/// Radice di archiviazione selezionabile (un disco, `/`, la home).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootEntry {
    pub label: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

#[cfg(windows)]
pub fn list_roots() -> Vec<RootEntry> {
    (b'A'..=b'Z')
        .map(char::from)
        .map(|letter| RootEntry {
            label: letter.to_string(),
            path: PathBuf::from(format!("{letter}:\\")),
        })
        .filter(|root| root.path.exists())
        .collect()
}

#[cfg(not(windows))]
pub fn list_roots() -> Vec<RootEntry> {
    let mut roots = vec![RootEntry {
        label: "root".to_string(),
        path: PathBuf::from("/"),
    }];
    if let Some(home) = dirs::home_dir() {
        if home.is_dir() && home != Path::new("/") {
            roots.push(RootEntry {
                label: "home".to_string(),
                path: home,
            });
        }
    }
    roots
}

pub fn resolve_root(label: &str) -> Option<PathBuf> {
    list_roots()
        .into_iter()
        .find(|root| root.label.eq_ignore_ascii_case(label))
        .map(|root| root.path)
}

/// Contenuto di una directory: cartelle prima, poi nome senza distinzione di maiuscole.
///
/// Gli elementi illeggibili vengono saltati; fallisce solo se la directory
/// stessa non esiste, non è una directory o non è accessibile.
pub async fn list_directory(path: &Path) -> Result<Vec<Entry>> {
    let metadata = fs::metadata(path)
        .await
        .map_err(|e| ControlError::from_io(path, e))?;
    if !metadata.is_dir() {
        return Err(ControlError::NotADirectory(path.to_path_buf()));
    }

    let mut read_dir = fs::read_dir(path)
        .await
        .map_err(|e| ControlError::from_io(path, e))?;

    let mut entries = Vec::new();
    loop {
        match read_dir.next_entry().await {
            Ok(Some(entry)) => {
                let entry_path = entry.path();
                match fs::metadata(&entry_path).await {
                    Ok(metadata) => entries.push(Entry {
                        name: entry.file_name().to_string_lossy().into_owned(),
                        is_dir: metadata.is_dir(),
                        size: if metadata.is_file() { metadata.len() } else { 0 },
                        modified: metadata.modified().ok(),
                        path: entry_path,
                    }),
                    Err(e) => warn!("Skipping {:?}: {}", entry_path, e),
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read an entry of {:?}: {}", path, e);
                continue;
            }
        }
    }

    entries.sort_by(compare_entries);
    info!("Listed {:?}: {} entries", path, entries.len());
    Ok(entries)
}

fn compare_entries(a: &Entry, b: &Entry) -> Ordering {
    b.is_dir
        .cmp(&a.is_dir)
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
}

/// Directory genitore; il percorso vuoto è la sentinella "sopra le radici".
pub fn parent_of(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_stops_at_root_sentinel() {
        assert_eq!(parent_of(Path::new("/tmp/a")), Path::new("/tmp"));
        assert_eq!(parent_of(Path::new("/tmp")), Path::new("/"));
        let top = parent_of(Path::new("/"));
        assert_eq!(top, PathBuf::new());
        assert_eq!(parent_of(&parent_of(&top)), parent_of(&top));
        assert_eq!(parent_of(Path::new("relative")), PathBuf::new());
    }

    #[cfg(windows)]
    #[test]
    fn drive_parent_is_sentinel() {
        assert_eq!(parent_of(Path::new("C:\\Users")), Path::new("C:\\"));
        assert_eq!(parent_of(Path::new("C:\\")), PathBuf::new());
    }

    #[test]
    fn roots_resolve_by_label() {
        let roots = list_roots();
        assert!(!roots.is_empty());
        assert_eq!(parent_of(&roots[0].path), PathBuf::new());
        for root in roots {
            assert_eq!(resolve_root(&root.label), Some(root.path.clone()));
        }
        assert_eq!(resolve_root("no-such-volume"), None);
    }

    #[cfg(not(windows))]
    #[test]
    fn home_root_follows_the_user_home() {
        let home = dirs::home_dir().filter(|h| h.is_dir() && h != Path::new("/"));
        assert_eq!(resolve_root("HOME"), home);
        assert_eq!(resolve_root("root"), Some(PathBuf::from("/")));
    }

    #[tokio::test]
    async fn listing_sorts_directories_first_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("zeta")).unwrap();
        std::fs::create_dir(dir.path().join("Alpha")).unwrap();
        std::fs::write(dir.path().join("b.txt"), "12345").unwrap();
        std::fs::write(dir.path().join("A.txt"), "").unwrap();

        let entries = list_directory(dir.path()).await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Alpha", "zeta", "A.txt", "b.txt"]);
        assert_eq!(entries[3].size, 5);
        assert!(entries[0].is_dir);
    }

    #[tokio::test]
    async fn listing_errors_are_classified() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            list_directory(&missing).await,
            Err(ControlError::NotFound(_))
        ));

        let file = dir.path().join("file");
        std::fs::write(&file, "x").unwrap();
        assert!(matches!(
            list_directory(&file).await,
            Err(ControlError::NotADirectory(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn broken_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ok"), "x").unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("dangling")).unwrap();

        let entries = list_directory(dir.path()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "ok");
    }
}
