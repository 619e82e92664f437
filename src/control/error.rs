use std::io::ErrorKind;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ControlError>;

/// Errori del core di controllo.
///
/// Nessuna variante è fatale: al massimo produce una singola risposta di errore
/// per l'utente che ha inviato il segnale.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Path does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Access denied to: {}", .0.display())]
    AccessDenied(PathBuf),

    #[error("Destination already exists: {}", .0.display())]
    Collision(PathBuf),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Control token could not be decoded")]
    TokenDecode,

    #[error("{0}")]
    CollaboratorFailure(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ControlError {
    /// Converte un errore di I/O nella tassonomia, legandolo al percorso coinvolto.
    pub fn from_io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            ErrorKind::NotFound => ControlError::NotFound(path),
            ErrorKind::PermissionDenied => ControlError::AccessDenied(path),
            ErrorKind::AlreadyExists => ControlError::Collision(path),
            ErrorKind::NotADirectory => ControlError::NotADirectory(path),
            _ => ControlError::Io { path, source: err },
        }
    }

    /// Messaggio da mostrare all'utente.
    pub fn user_message(&self) -> String {
        format!("❌ {self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_kinds_map_onto_taxonomy() {
        let err = ControlError::from_io("/x", std::io::Error::from(ErrorKind::NotFound));
        assert!(matches!(err, ControlError::NotFound(_)));

        let err = ControlError::from_io("/x", std::io::Error::from(ErrorKind::PermissionDenied));
        assert!(matches!(err, ControlError::AccessDenied(_)));
        assert_eq!(err.user_message(), "❌ Access denied to: /x");

        let err = ControlError::from_io("/x", std::io::Error::other("disk on fire"));
        assert!(matches!(err, ControlError::Io { .. }));
    }
}
