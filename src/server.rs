use std::{net::SocketAddr, sync::Arc};

use log::error;

use crate::control::Dispatcher;
use crate::ssh_session::SshSession;

#[derive(Clone)]
pub struct Server {
    pub dispatcher: Arc<Dispatcher>,
    pub config: Arc<ServerConfig>,
}

#[derive(Debug)]
pub struct ServerConfig {
    pub max_upload_size: u64,
}

impl russh::server::Server for Server {
    type Handler = SshSession;

    fn new_client(&mut self, peer: Option<SocketAddr>) -> Self::Handler {
        SshSession::new(self.dispatcher.clone(), self.config.clone(), peer)
    }

    fn handle_session_error(&mut self, error: <Self::Handler as russh::server::Handler>::Error) {
        error!("ssh session error: {:#}", error);
    }
}
