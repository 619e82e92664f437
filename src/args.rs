use std::path::PathBuf;

use clap::Parser;
use log::LevelFilter;

/// Configurazione da linea di comando
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Indirizzo IP su cui ascoltare
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    pub host: String,

    /// Porta su cui ascoltare
    #[arg(short, long, default_value = "2222")]
    pub port: u16,

    /// File JSON con utenti autorizzati, password e directory correnti
    #[arg(long, default_value = "remote_state.json")]
    pub state_file: PathBuf,

    /// Dimensione massima dei file inviati o ricevuti (in bytes)
    #[arg(long, default_value = "52428800")]
    pub max_send_size: u64,

    /// Righe di elenco mostrate nel testo di una risposta
    #[arg(long, default_value = "20")]
    pub inline_lines: usize,

    /// Elementi selezionabili per elenco
    #[arg(long, default_value = "15")]
    pub selectable_controls: usize,

    /// Timeout dei comandi eseguiti sull'host (in secondi)
    #[arg(long, default_value = "30")]
    pub action_timeout_secs: u64,

    /// Livello di log (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: LevelFilter,
}
