use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

use crate::control::error::{ControlError, Result};

/// Lunghezza massima di un token di percorso.
pub const TOKEN_BUDGET: usize = 60;

const INLINE_TAG: char = 'p';
const DIGEST_TAG: char = 'h';
const DIGEST_BYTES: usize = 12;

/// Token digest ricordati per utente; oltre si dimenticano i più vecchi.
pub const MAX_DIGESTS: usize = 512;

/// Codifica deterministica di un percorso.
///
/// I percorsi brevi diventano `p<base64url>` e si decodificano senza stato.
/// Quelli che sforerebbero il budget diventano `h<sha256 troncato>` e vanno
/// registrati in una [`TokenCache`] per essere risolti.
/// Restituisce `None` se il percorso non è UTF-8.
pub fn encode(path: &Path) -> Option<String> {
    let raw = path.to_str()?;
    let inline = URL_SAFE_NO_PAD.encode(raw.as_bytes());
    if inline.len() < TOKEN_BUDGET {
        Some(format!("{INLINE_TAG}{inline}"))
    } else {
        let digest = Sha256::digest(raw.as_bytes());
        Some(format!("{DIGEST_TAG}{}", hex::encode(&digest[..DIGEST_BYTES])))
    }
}

/// Decodifica un token in forma inline.
pub fn decode(token: &str) -> Result<PathBuf> {
    let body = token
        .strip_prefix(INLINE_TAG)
        .ok_or(ControlError::TokenDecode)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(body)
        .map_err(|_| ControlError::TokenDecode)?;
    let raw = String::from_utf8(bytes).map_err(|_| ControlError::TokenDecode)?;
    Ok(PathBuf::from(raw))
}

fn is_digest(token: &str) -> bool {
    token
        .strip_prefix(DIGEST_TAG)
        .is_some_and(|h| h.len() == DIGEST_BYTES * 2 && h.bytes().all(|b| b.is_ascii_hexdigit()))
}

/// Cache per utente dei token in forma digest.
///
/// Vive dentro la sessione, quindi condivide il lock per utente.
/// Tiene al più [`MAX_DIGESTS`] voci, scartando quelle emesse da più tempo.
#[derive(Debug, Default)]
pub struct TokenCache {
    entries: HashMap<String, PathBuf>,
    order: VecDeque<String>,
}

impl TokenCache {
    /// Emette il token per `path`, registrandolo se è in forma digest.
    pub fn issue(&mut self, path: &Path) -> Option<String> {
        let token = encode(path)?;
        if token.starts_with(DIGEST_TAG) {
            if self.entries.insert(token.clone(), path.to_path_buf()).is_some() {
                self.order.retain(|t| t != &token);
            }
            self.order.push_back(token.clone());
            while self.order.len() > MAX_DIGESTS {
                if let Some(oldest) = self.order.pop_front() {
                    self.entries.remove(&oldest);
                }
            }
        }
        Some(token)
    }

    pub fn resolve(&self, token: &str) -> Result<PathBuf> {
        if is_digest(token) {
            self.entries
                .get(token)
                .cloned()
                .ok_or(ControlError::TokenDecode)
        } else {
            decode(token)
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
