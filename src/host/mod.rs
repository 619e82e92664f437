//! Azioni sul sistema ospite invocate dal core di controllo.
//!
//! Il core le tratta come operazioni opache con un contratto uniforme:
//! `(success, message, payload opzionale)`.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;

use crate::control::error::Result;
use crate::control::types::Attachment;

pub mod shell;

pub use shell::ShellHost;

/// Limite del testo restituito all'utente per output di comandi.
pub const MAX_OUTPUT_CHARS: usize = 4000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub success: bool,
    pub message: String,
    pub payload: Option<Attachment>,
}

impl ActionOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            payload: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Attachment) -> Self {
        self.payload = Some(payload);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Low,
    Normal,
    High,
    Realtime,
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "realtime" => Ok(Priority::Realtime),
            other => Err(format!("Invalid priority: {other}")),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Realtime => "realtime",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAction {
    Shutdown,
    Restart,
    Sleep,
    Lock,
    MonitorOff,
    Screenshot,
    WebcamCapture,
    MicRecord { seconds: u32 },
    ClipboardGet,
    ClipboardSet(String),
    CleanupTemp,
    LargestFolders(PathBuf),
    OpenUrl(String),
    RunProgram(String),
    ExecuteCommand(String),
    KillProcess(u32),
    RestartProcess(u32),
    SetPriority(u32, Priority),
    ProcessInfo(u32),
    PublicIp,
    Ping(String),
    Netstat,
    DnsLookup(String),
    SpeedTest,
    CpuUsage,
    RamUsage,
    StatusReport,
}

impl HostAction {
    /// Azioni che possono durare a lungo e meritano un messaggio di attesa.
    pub fn is_slow(&self) -> bool {
        matches!(
            self,
            HostAction::SpeedTest
                | HostAction::LargestFolders(_)
                | HostAction::MicRecord { .. }
                | HostAction::CleanupTemp
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSummary {
    pub pid: u32,
    pub name: String,
    pub ram_mb: f64,
}

#[async_trait]
pub trait HostActions: Send + Sync {
    async fn perform(&self, action: HostAction) -> ActionOutcome;

    /// Processi ordinati per memoria residente decrescente.
    async fn list_processes(&self) -> Result<Vec<ProcessSummary>>;
}

/// Tronca l'output di un comando al limite mostrabile.
pub fn clip_output(output: &str) -> String {
    if output.chars().count() <= MAX_OUTPUT_CHARS {
        output.to_string()
    } else {
        let mut clipped: String = output.chars().take(MAX_OUTPUT_CHARS).collect();
        clipped.push_str("... (truncated)");
        clipped
    }
}
