//! Conversazione a righe su un terminale: editing dell'input e resa delle risposte.

use crate::control::types::{AttachmentKind, Response, Signal};
use crate::control::utils::metadata::MetadataConverter;

pub const PROMPT: &str = "> ";

const CTRL_C: u8 = 0x03;
const CTRL_D: u8 = 0x04;
const BACKSPACE: u8 = 0x08;
const ESC: u8 = 0x1b;
const DEL: u8 = 0x7f;

/// Evento prodotto dall'editor di riga.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Line(String),
    Interrupt,
    Eof,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Fed {
    pub echo: Vec<u8>,
    pub inputs: Vec<Input>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Escape {
    #[default]
    None,
    Started,
    Sequence,
}

/// Editor di riga minimale: eco, backspace, CR/LF, Ctrl-C e Ctrl-D.
/// Le sequenze di escape (frecce, tasti funzione) vengono scartate.
#[derive(Debug, Default)]
pub struct LineEditor {
    buffer: Vec<u8>,
    last_cr: bool,
    escape: Escape,
}

impl LineEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, data: &[u8]) -> Fed {
        let mut fed = Fed::default();
        for &byte in data {
            let after_cr = std::mem::replace(&mut self.last_cr, false);
            match self.escape {
                Escape::Started => {
                    self.escape = if byte == b'[' || byte == b'O' {
                        Escape::Sequence
                    } else {
                        Escape::None
                    };
                    continue;
                }
                Escape::Sequence => {
                    if (0x40..=0x7e).contains(&byte) {
                        self.escape = Escape::None;
                    }
                    continue;
                }
                Escape::None => {}
            }

            match byte {
                b'\n' if after_cr => {}
                b'\r' | b'\n' => {
                    self.last_cr = byte == b'\r';
                    fed.echo.extend_from_slice(b"\r\n");
                    let line = String::from_utf8_lossy(&self.buffer).into_owned();
                    self.buffer.clear();
                    fed.inputs.push(Input::Line(line));
                }
                DEL | BACKSPACE => {
                    if self.pop_char() {
                        fed.echo.extend_from_slice(b"\x08 \x08");
                    }
                }
                CTRL_C => {
                    self.buffer.clear();
                    fed.echo.extend_from_slice(b"^C\r\n");
                    fed.inputs.push(Input::Interrupt);
                }
                CTRL_D if self.buffer.is_empty() => fed.inputs.push(Input::Eof),
                ESC => self.escape = Escape::Started,
                b if b < 0x20 => {}
                b => {
                    self.buffer.push(b);
                    fed.echo.push(b);
                }
            }
        }
        fed
    }

    /// Rimuove l'ultimo carattere UTF-8 completo.
    fn pop_char(&mut self) -> bool {
        let Some(mut byte) = self.buffer.pop() else {
            return false;
        };
        while byte & 0b1100_0000 == 0b1000_0000 {
            match self.buffer.pop() {
                Some(previous) => byte = previous,
                None => break,
            }
        }
        true
    }
}

/// Interpretazione di una riga completa.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Signal(Signal),
    Hint(String),
    Empty,
}

/// `#N` preme il controllo N dell'ultimo elenco, `!token` invia un token grezzo,
/// il resto è testo.
pub fn parse_line(line: &str, controls: &[String]) -> Line {
    let line = line.trim();
    if line.is_empty() {
        return Line::Empty;
    }
    if let Some(index) = line.strip_prefix('#').and_then(|n| n.parse::<usize>().ok()) {
        return match index.checked_sub(1).and_then(|i| controls.get(i)) {
            Some(token) => Line::Signal(Signal::Control(token.clone())),
            None => Line::Hint(format!(
                "❓ No control #{index}. Use /start for the main menu."
            )),
        };
    }
    match line.strip_prefix('!') {
        Some(token) if !token.trim().is_empty() => {
            Line::Signal(Signal::Control(token.trim().to_string()))
        }
        _ => Line::Signal(Signal::Text(line.to_string())),
    }
}

fn attachment_icon(kind: AttachmentKind) -> &'static str {
    match kind {
        AttachmentKind::Document => "📎",
        AttachmentKind::Photo => "🖼️",
        AttachmentKind::Voice => "🎤",
    }
}

/// Testo da scrivere sul canale, con `\r\n` e il prompt finale.
pub fn render(response: &Response) -> String {
    let mut text = response.text.clone();
    if let Some(attachment) = &response.attachment {
        text.push_str(&format!(
            "\n{} {} ({})",
            attachment_icon(attachment.kind),
            attachment.name,
            MetadataConverter::format_size(attachment.bytes.len() as u64)
        ));
    }
    if let Some(controls) = &response.controls {
        text.push('\n');
        for (i, button) in controls.iter().enumerate() {
            text.push_str(&format!("\n[#{}] {}", i + 1, button.label));
        }
    }
    format!("\r\n{}\r\n{PROMPT}", text.replace('\n', "\r\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::types::{Attachment, Button};

    fn line(text: &str) -> Input {
        Input::Line(text.to_string())
    }

    #[test]
    fn editor_echoes_and_splits_lines() {
        let mut editor = LineEditor::new();
        let fed = editor.feed(b"ab");
        assert_eq!(fed.echo, b"ab");
        assert!(fed.inputs.is_empty());

        let fed = editor.feed(b"c\r\n#2\n");
        assert_eq!(fed.inputs, vec![line("abc"), line("#2")]);
        assert_eq!(fed.echo, b"c\r\n#2\r\n");
    }

    #[test]
    fn backspace_removes_whole_characters() {
        let mut editor = LineEditor::new();
        editor.feed("sì".as_bytes());
        let fed = editor.feed(&[DEL, DEL, DEL]);
        assert_eq!(fed.echo, b"\x08 \x08\x08 \x08");
        let fed = editor.feed(b"no\r");
        assert_eq!(fed.inputs, vec![line("no")]);
    }

    #[test]
    fn control_keys_and_escapes() {
        let mut editor = LineEditor::new();
        let fed = editor.feed(b"half\x03");
        assert_eq!(fed.inputs, vec![Input::Interrupt]);

        // freccia su: ignorata
        let fed = editor.feed(b"\x1b[Aok\r");
        assert_eq!(fed.inputs, vec![line("ok")]);

        assert_eq!(editor.feed(&[CTRL_D]).inputs, vec![Input::Eof]);
        editor.feed(b"x");
        assert!(editor.feed(&[CTRL_D]).inputs.is_empty());
    }

    #[test]
    fn lines_map_onto_signals() {
        let controls = vec!["menu_main".to_string(), "file_root".to_string()];
        assert_eq!(
            parse_line(" #2 ", &controls),
            Line::Signal(Signal::Control("file_root".into()))
        );
        assert!(matches!(parse_line("#3", &controls), Line::Hint(_)));
        assert!(matches!(parse_line("#0", &controls), Line::Hint(_)));
        assert_eq!(
            parse_line("!sys_lock", &controls),
            Line::Signal(Signal::Control("sys_lock".into()))
        );
        assert_eq!(
            parse_line("#tag", &controls),
            Line::Signal(Signal::Text("#tag".into()))
        );
        assert_eq!(
            parse_line("/tmp/x", &controls),
            Line::Signal(Signal::Text("/tmp/x".into()))
        );
        assert_eq!(parse_line("   ", &controls), Line::Empty);
    }

    #[test]
    fn responses_render_with_numbered_controls() {
        let response = Response::with_controls(
            "📂 /x\nline",
            vec![Button::new("🔙 Back", "menu_main"), Button::new("🏠 Root", "file_root")],
        );
        assert_eq!(
            render(&response),
            "\r\n📂 /x\r\nline\r\n\r\n[#1] 🔙 Back\r\n[#2] 🏠 Root\r\n> "
        );

        let response = Response::text("📄 a.bin (2.0 KB)").attach(Attachment {
            kind: AttachmentKind::Document,
            name: "a.bin".into(),
            bytes: vec![0; 2048],
        });
        assert_eq!(
            render(&response),
            "\r\n📄 a.bin (2.0 KB)\r\n📎 a.bin (2.0 KB)\r\n> "
        );
    }
}
