use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::info;
use tokio::{fs, io::AsyncReadExt};

use crate::control::error::{ControlError, Result};

/// Dettagli di un singolo elemento, per la scheda "File Info".
#[derive(Debug)]
pub struct FileInfo {
    pub path: PathBuf,
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub is_binary: bool,
}

impl FileInfo {
    pub async fn inspect(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path)
            .await
            .map_err(|e| ControlError::from_io(path, e))?;
        let is_dir = metadata.is_dir();
        let is_binary = !is_dir && Self::detect_binary_file(path).await;

        info!("Inspected: {:?}, dir: {}, binary: {}", path, is_dir, is_binary);

        Ok(Self {
            path: path.to_path_buf(),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            is_dir,
            size: metadata.len(),
            modified: metadata.modified().ok(),
            is_binary,
        })
    }

    pub fn kind(&self) -> String {
        if self.is_dir {
            return "Folder".to_string();
        }
        let flavour = if self.is_binary { "binary" } else { "text" };
        match self.path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("File .{ext} ({flavour})"),
            None => format!("File ({flavour})"),
        }
    }

    async fn detect_binary_file(path: &Path) -> bool {
        // Controllo basato sull'estensione del file
        if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
            let binary_extensions = [
                "exe", "dll", "so", "dylib", "bin", "dat", "db", "sqlite", "sqlite3", "jpg",
                "jpeg", "png", "gif", "bmp", "tiff", "webp", "ico", "mp3", "wav", "ogg", "flac",
                "aac", "m4a", "mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "pdf", "doc",
                "docx", "xls", "xlsx", "ppt", "pptx", "zip", "rar", "7z", "tar", "gz", "bz2", "xz",
                "obj", "lib", "a", "deb", "rpm", "dmg", "iso",
            ];

            if binary_extensions.contains(&extension.to_lowercase().as_str()) {
                return true;
            }
        }

        // Controllo del contenuto del file (primi 512 bytes)
        if let Ok(mut file) = fs::File::open(path).await {
            let mut buffer = [0u8; 512];
            if let Ok(bytes_read) = file.read(&mut buffer).await {
                if bytes_read == 0 {
                    return false;
                }
                let sample = &buffer[..bytes_read];

                if sample.contains(&0) {
                    return true;
                }

                // Oltre il 30% di byte non-ASCII: probabilmente binario
                let non_ascii_count = sample.iter().filter(|&&b| b > 127).count();
                let non_ascii_percentage = (non_ascii_count as f32 / bytes_read as f32) * 100.0;
                if non_ascii_percentage > 30.0 {
                    return true;
                }
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sniffs_text_and_binary_content() {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("notes");
        let blob = dir.path().join("blob");
        let image = dir.path().join("photo.PNG");
        std::fs::write(&text, "plain words\n").unwrap();
        std::fs::write(&blob, [1u8, 0, 2, 3]).unwrap();
        std::fs::write(&image, "not really a png").unwrap();

        let info = FileInfo::inspect(&text).await.unwrap();
        assert!(!info.is_binary);
        assert_eq!(info.size, 12);
        assert_eq!(info.kind(), "File (text)");

        assert!(FileInfo::inspect(&blob).await.unwrap().is_binary);
        assert_eq!(
            FileInfo::inspect(&image).await.unwrap().kind(),
            "File .PNG (binary)"
        );
        assert_eq!(FileInfo::inspect(dir.path()).await.unwrap().kind(), "Folder");
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let err = FileInfo::inspect(Path::new("/definitely/not/here"))
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::NotFound(_)));
    }
}
