use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info, warn};
use russh::server::{Auth, Handle, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec};
use tokio::sync::mpsc;

use crate::control::types::{Outbox, Response, Signal, UserId};
use crate::control::Dispatcher;
use crate::server::ServerConfig;
use crate::terminal::{self, Input, Line, LineEditor};

type ActiveControls = Arc<parking_lot::Mutex<Vec<String>>>;

/// Conversazione interattiva legata a un canale shell.
struct Conversation {
    channel: ChannelId,
    editor: LineEditor,
    signals: mpsc::UnboundedSender<Signal>,
    outbox: Outbox,
    controls: ActiveControls,
}

/// Caricamento via `exec upload <nome>`: i dati arrivano fino all'EOF.
struct Upload {
    name: String,
    bytes: Vec<u8>,
}

pub struct SshSession {
    dispatcher: Arc<Dispatcher>,
    config: Arc<ServerConfig>,
    peer: Option<SocketAddr>,
    user: Option<UserId>,
    conversation: Option<Conversation>,
    uploads: HashMap<ChannelId, Upload>,
}

impl SshSession {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        config: Arc<ServerConfig>,
        peer: Option<SocketAddr>,
    ) -> Self {
        Self {
            dispatcher,
            config,
            peer,
            user: None,
            conversation: None,
            uploads: HashMap::new(),
        }
    }

    fn accept(&mut self, user: &str) -> Auth {
        info!("{:?}: ssh login as {:?}", self.peer, user);
        self.user = Some(UserId::new(user));
        Auth::Accept
    }

    fn user(&self) -> anyhow::Result<UserId> {
        self.user
            .clone()
            .ok_or_else(|| anyhow::anyhow!("channel request before authentication"))
    }

    /// L'annullamento scavalca la coda, così non resta dietro un'azione lenta.
    fn interrupt(&self, user: UserId, outbox: Outbox) {
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            let response = dispatcher
                .handle(&user, Signal::Text("/cancel".to_string()))
                .await;
            if outbox.send(response).is_err() {
                warn!("user {}: response dropped, conversation closed", user);
            }
        });
    }

    async fn start_conversation(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> anyhow::Result<()> {
        let user = self.user()?;
        let (outbox, responses) = mpsc::unbounded_channel();
        let (signals, queue) = mpsc::unbounded_channel();
        let controls = ActiveControls::default();

        tokio::spawn(write_responses(
            session.handle(),
            channel,
            responses,
            controls.clone(),
        ));
        self.dispatcher.attach_outbox(&user, outbox.clone()).await;
        tokio::spawn(serve_signals(
            self.dispatcher.clone(),
            user,
            queue,
            outbox.clone(),
        ));
        signals.send(Signal::Text("/start".to_string()))?;

        self.conversation = Some(Conversation {
            channel,
            editor: LineEditor::new(),
            signals,
            outbox,
            controls,
        });
        Ok(())
    }

    fn on_input(&mut self, input: Input, session: &mut Session) -> anyhow::Result<()> {
        let user = self.user()?;
        let Some(conversation) = &self.conversation else {
            return Ok(());
        };
        let signal = match input {
            Input::Interrupt => {
                self.interrupt(user, conversation.outbox.clone());
                return Ok(());
            }
            Input::Eof => {
                info!("user {}: conversation closed by client", user);
                session.close(conversation.channel)?;
                return Ok(());
            }
            Input::Line(line) => {
                let controls = conversation.controls.lock().clone();
                match terminal::parse_line(&line, &controls) {
                    Line::Signal(signal) => signal,
                    Line::Hint(hint) => {
                        if conversation.outbox.send(Response::text(hint)).is_err() {
                            warn!("user {}: hint dropped, conversation closed", user);
                        }
                        return Ok(());
                    }
                    Line::Empty => {
                        session.data(
                            conversation.channel,
                            CryptoVec::from_slice(terminal::PROMPT.as_bytes()),
                        )?;
                        return Ok(());
                    }
                }
            }
        };
        if is_cancel(&signal) {
            self.interrupt(user, conversation.outbox.clone());
        } else if conversation.signals.send(signal).is_err() {
            warn!("user {}: signal dropped, conversation closed", user);
        }
        Ok(())
    }

    async fn finish_upload(
        &mut self,
        channel: ChannelId,
        upload: Upload,
        session: &mut Session,
    ) -> anyhow::Result<()> {
        let user = self.user()?;
        info!(
            "user {}: upload {:?} received ({} bytes)",
            user,
            upload.name,
            upload.bytes.len()
        );
        let response = self
            .dispatcher
            .handle(
                &user,
                Signal::Document {
                    name: upload.name,
                    bytes: upload.bytes,
                },
            )
            .await;
        let status = if response.text.starts_with('✅') { 0 } else { 1 };
        session.data(
            channel,
            CryptoVec::from_slice(format!("{}\r\n", response.text).as_bytes()),
        )?;
        session.exit_status_request(channel, status)?;
        session.eof(channel)?;
        session.close(channel)?;
        Ok(())
    }
}

fn is_cancel(signal: &Signal) -> bool {
    match signal {
        Signal::Text(text) => text.trim() == "/cancel",
        Signal::Control(token) => token == "cancel",
        _ => false,
    }
}

/// Esegue i segnali di una conversazione uno alla volta, nell'ordine di arrivo.
async fn serve_signals(
    dispatcher: Arc<Dispatcher>,
    user: UserId,
    mut queue: mpsc::UnboundedReceiver<Signal>,
    outbox: Outbox,
) {
    while let Some(signal) = queue.recv().await {
        let response = dispatcher.handle(&user, signal).await;
        if outbox.send(response).is_err() {
            warn!("user {}: response dropped, conversation closed", user);
            break;
        }
    }
    info!("user {}: signal queue closed", user);
}

/// Svuota la coda della conversazione sul canale SSH.
async fn write_responses(
    handle: Handle,
    channel: ChannelId,
    mut responses: mpsc::UnboundedReceiver<Response>,
    controls: ActiveControls,
) {
    while let Some(response) = responses.recv().await {
        if let Some(buttons) = &response.controls {
            *controls.lock() = buttons.iter().map(|b| b.token.clone()).collect();
        }
        let text = terminal::render(&response);
        if handle
            .data(channel, CryptoVec::from_slice(text.as_bytes()))
            .await
            .is_err()
        {
            warn!("channel {:?}: client gone, writer stopped", channel);
            break;
        }
    }
}

impl russh::server::Handler for SshSession {
    type Error = anyhow::Error;

    // l'autorizzazione vera avviene in conversazione con /auth
    async fn auth_password(&mut self, user: &str, _password: &str) -> Result<Auth, Self::Error> {
        Ok(self.accept(user))
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        _public_key: &russh::keys::PublicKey,
    ) -> Result<Auth, Self::Error> {
        Ok(self.accept(user))
    }

    // tutto passa dai callback: il Channel non letto riempirebbe la sua coda
    // e bloccherebbe la connessione, quindi viene lasciato cadere
    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        info!("{:?}: session channel {:?} opened", self.peer, channel.id());
        Ok(true)
    }

    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(russh::Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        info!("pty {}: {}x{}", term, col_width, row_height);
        session.channel_success(channel)?;
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if self.conversation.is_some() {
            warn!("{:?}: second shell on one connection refused", self.peer);
            session.channel_failure(channel)?;
            return Ok(());
        }
        session.channel_success(channel)?;
        self.start_conversation(channel, session).await
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let command = String::from_utf8_lossy(data);
        info!("exec: {}", command);

        match command.trim().strip_prefix("upload ") {
            Some(name) if !name.trim().is_empty() => {
                self.uploads.insert(
                    channel,
                    Upload {
                        name: name.trim().to_string(),
                        bytes: Vec::new(),
                    },
                );
                session.channel_success(channel)?;
            }
            _ => {
                session.channel_failure(channel)?;
            }
        }
        Ok(())
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(upload) = self.uploads.get_mut(&channel) {
            if (upload.bytes.len() + data.len()) as u64 > self.config.max_upload_size {
                error!("upload {:?} exceeds {} bytes", upload.name, self.config.max_upload_size);
                self.uploads.remove(&channel);
                session.data(channel, CryptoVec::from_slice(b"File too large.\r\n"))?;
                session.exit_status_request(channel, 1)?;
                session.close(channel)?;
                return Ok(());
            }
            upload.bytes.extend_from_slice(data);
            return Ok(());
        }

        let fed = match &mut self.conversation {
            Some(conversation) if conversation.channel == channel => {
                conversation.editor.feed(data)
            }
            _ => return Ok(()),
        };
        if !fed.echo.is_empty() {
            session.data(channel, CryptoVec::from_slice(&fed.echo))?;
        }
        for input in fed.inputs {
            self.on_input(input, session)?;
        }
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        match self.uploads.remove(&channel) {
            Some(upload) => self.finish_upload(channel, upload, session).await,
            None => {
                session.close(channel)?;
                Ok(())
            }
        }
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.uploads.remove(&channel);
        if self
            .conversation
            .as_ref()
            .is_some_and(|c| c.channel == channel)
        {
            // il writer si ferma al primo invio fallito sul canale chiuso
            self.conversation = None;
            info!("{:?}: conversation channel closed", self.peer);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use russh::ChannelMsg;
    use russh::keys::ssh_key::rand_core::OsRng;

    use super::*;
    use crate::control::ControlConfig;
    use crate::control::controls::{Control, PathVerb};
    use crate::control::utils::path_token;
    use crate::host::testing::RecordingHost;
    use crate::state_store::{PersistedState, StateStore};

    fn alice() -> UserId {
        UserId::new("alice")
    }

    fn dispatcher(workdir: Option<&Path>) -> Arc<Dispatcher> {
        let store = StateStore::in_memory(PersistedState {
            allowed_users: vec![alice()],
            current_directories: workdir
                .map(|dir| (alice(), dir.to_path_buf()))
                .into_iter()
                .collect(),
            ..Default::default()
        });
        Arc::new(Dispatcher::new(
            ControlConfig::default(),
            Arc::new(store),
            Arc::new(RecordingHost::default()),
        ))
    }

    fn browse(path: &Path) -> Signal {
        Signal::Control(Control::Path(PathVerb::Browse, path_token::encode(path).unwrap()).token())
    }

    struct AcceptAnyKey;

    impl russh::client::Handler for AcceptAnyKey {
        type Error = russh::Error;

        async fn check_server_key(
            &mut self,
            _server_public_key: &russh::keys::PublicKey,
        ) -> Result<bool, Self::Error> {
            Ok(true)
        }
    }

    /// Client autenticato come alice su una connessione in memoria.
    async fn connect(
        dispatcher: Arc<Dispatcher>,
        max_upload_size: u64,
    ) -> russh::client::Handle<AcceptAnyKey> {
        let key = russh::keys::PrivateKey::random(&mut OsRng, russh::keys::Algorithm::Ed25519)
            .unwrap();
        let config = Arc::new(russh::server::Config {
            keys: vec![key],
            ..Default::default()
        });
        let handler = SshSession::new(dispatcher, Arc::new(ServerConfig { max_upload_size }), None);
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        tokio::spawn(async move {
            if let Ok(running) = russh::server::run_stream(config, server_io, handler).await {
                let _ = running.await;
            }
        });

        let mut client = russh::client::connect_stream(
            Arc::new(russh::client::Config::default()),
            client_io,
            AcceptAnyKey,
        )
        .await
        .unwrap();
        let auth = client.authenticate_password("alice", "-").await.unwrap();
        assert!(auth.success());
        client
    }

    async fn read_until(channel: &mut Channel<russh::client::Msg>, needle: &str) -> String {
        let mut transcript = String::new();
        let found = tokio::time::timeout(Duration::from_secs(10), async {
            while !transcript.contains(needle) {
                match channel.wait().await {
                    Some(ChannelMsg::Data { data }) => {
                        transcript.push_str(&String::from_utf8_lossy(&data))
                    }
                    Some(_) => {}
                    None => break,
                }
            }
        })
        .await;
        assert!(found.is_ok(), "no {needle:?} in {transcript:?}");
        transcript
    }

    #[tokio::test]
    async fn queued_signals_are_answered_in_order() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let (signals, queue) = mpsc::unbounded_channel();
        let (outbox, mut responses) = mpsc::unbounded_channel();
        tokio::spawn(serve_signals(dispatcher(None), alice(), queue, outbox));

        for _ in 0..10 {
            signals.send(browse(a.path())).unwrap();
            signals.send(browse(b.path())).unwrap();
        }
        drop(signals);

        for _ in 0..10 {
            for dir in [&a, &b] {
                let response = responses.recv().await.unwrap();
                let header = format!("📂 {}\n", dir.path().display());
                assert!(response.text.starts_with(&header), "{}", response.text);
            }
        }
        assert!(responses.recv().await.is_none());
    }

    #[test]
    fn cancel_lines_skip_the_queue() {
        assert!(is_cancel(&Signal::Text(" /cancel ".into())));
        assert!(is_cancel(&Signal::Control("cancel".into())));
        assert!(!is_cancel(&Signal::Control("timer_cancel".into())));
        assert!(!is_cancel(&Signal::Text("cancel".into())));
    }

    #[tokio::test]
    async fn long_uploads_stream_through_the_channel() {
        let dir = tempfile::tempdir().unwrap();
        let client = connect(dispatcher(Some(dir.path())), 16 * 1024 * 1024).await;
        let mut channel = client.channel_open_session().await.unwrap();
        channel.exec(true, "upload big.bin").await.unwrap();

        // molti più pacchetti di quanti ne contenga la coda di un canale
        let payload: Vec<u8> = (0..4 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
        channel.data(&payload[..]).await.unwrap();
        channel.eof().await.unwrap();

        let mut status = None;
        let mut output = Vec::new();
        let drained = tokio::time::timeout(Duration::from_secs(30), async {
            while let Some(msg) = channel.wait().await {
                match msg {
                    ChannelMsg::Data { data } => output.extend_from_slice(&data),
                    ChannelMsg::ExitStatus { exit_status } => status = Some(exit_status),
                    _ => {}
                }
            }
        })
        .await;
        assert!(drained.is_ok(), "upload channel stalled");
        assert_eq!(status, Some(0), "{}", String::from_utf8_lossy(&output));
        assert_eq!(std::fs::read(dir.path().join("big.bin")).unwrap(), payload);
    }

    #[tokio::test]
    async fn oversized_uploads_fail_with_status() {
        let dir = tempfile::tempdir().unwrap();
        let client = connect(dispatcher(Some(dir.path())), 1024).await;
        let mut channel = client.channel_open_session().await.unwrap();
        channel.exec(true, "upload big.bin").await.unwrap();
        channel.data(&[7u8; 4096][..]).await.unwrap();

        let mut status = None;
        let drained = tokio::time::timeout(Duration::from_secs(10), async {
            while let Some(msg) = channel.wait().await {
                if let ChannelMsg::ExitStatus { exit_status } = msg {
                    status = Some(exit_status);
                }
            }
        })
        .await;
        assert!(drained.is_ok());
        assert_eq!(status, Some(1));
        assert!(!dir.path().join("big.bin").exists());
    }

    #[tokio::test]
    async fn shell_conversation_over_a_channel() {
        let dir = tempfile::tempdir().unwrap();
        let client = connect(dispatcher(None), 1024).await;
        let mut channel = client.channel_open_session().await.unwrap();
        channel.request_shell(true).await.unwrap();
        read_until(&mut channel, terminal::PROMPT).await;

        let line = format!("!{}\r", browse_token(dir.path()));
        channel.data(line.as_bytes()).await.unwrap();
        let listing = read_until(&mut channel, "Empty directory").await;
        assert!(listing.contains(&format!("📂 {}", dir.path().display())));

        // Ctrl-C annulla e riporta al menu
        channel.data(&[0x03u8][..]).await.unwrap();
        read_until(&mut channel, "Action cancelled.").await;
    }

    fn browse_token(path: &Path) -> String {
        match browse(path) {
            Signal::Control(token) => token,
            other => panic!("unexpected {other:?}"),
        }
    }
}
