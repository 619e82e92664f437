use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Identità stabile di un utente (per il front-end SSH è lo username).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Segnale in ingresso da un front-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Testo libero; se inizia con `/` è un comando.
    Text(String),
    /// Token opaco di un pulsante.
    Control(String),
    /// Documento caricato dall'utente.
    Document { name: String, bytes: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub token: String,
}

impl Button {
    pub fn new(label: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            token: token.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Document,
    Photo,
    Voice,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Risposta in uscita: testo, controlli opzionali e un eventuale allegato.
///
/// Una risposta con `controls` sostituisce i controlli attivi del client,
/// una senza li lascia invariati.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Response {
    pub text: String,
    pub controls: Option<Vec<Button>>,
    pub attachment: Option<Attachment>,
}

impl Response {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_controls(text: impl Into<String>, controls: Vec<Button>) -> Self {
        Self {
            text: text.into(),
            controls: Some(controls),
            attachment: None,
        }
    }

    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn tokens(&self) -> Vec<&str> {
        self.controls
            .iter()
            .flatten()
            .map(|b| b.token.as_str())
            .collect()
    }
}

/// Coda di uscita di una conversazione; l'invio è sicuro da qualsiasi thread.
pub type Outbox = mpsc::UnboundedSender<Response>;
