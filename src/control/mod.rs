pub mod controls;
pub mod dispatcher;
pub mod error;
pub mod fs_ops;
pub mod handlers;
pub mod navigation;
pub mod session_state;
pub mod types;
pub mod utils;
pub mod watch;

pub use dispatcher::Dispatcher;

/// Numero massimo di controlli che il front-end mostra in una risposta.
pub const MAX_CONTROLS: usize = 40;

/// Controlli fissi di una vista elenco (navigazione, azioni sulla directory).
const RESERVED_CONTROLS: usize = 6;

/// Limiti di paginazione per le risposte a elenco.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingLimits {
    pub inline: usize,
    pub selectable: usize,
}

impl Default for ListingLimits {
    fn default() -> Self {
        Self {
            inline: 20,
            selectable: 15,
        }
    }
}

impl ListingLimits {
    /// Porta `selectable` entro il limite di controlli del front-end.
    pub fn new(inline: usize, selectable: usize) -> Self {
        Self {
            inline: inline.max(1),
            selectable: selectable.clamp(1, MAX_CONTROLS - RESERVED_CONTROLS),
        }
    }
}

/// Parametri del core di controllo.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    pub limits: ListingLimits,
    pub max_send_size: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            limits: ListingLimits::default(),
            max_send_size: 50 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectable_count_is_clamped() {
        let limits = ListingLimits::new(0, 500);
        assert_eq!(limits.inline, 1);
        assert_eq!(limits.selectable, MAX_CONTROLS - RESERVED_CONTROLS);
        assert_eq!(ListingLimits::new(20, 15), ListingLimits::default());
    }
}
