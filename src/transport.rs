//! The seam between the client state machine and the network
//!
//! A [`Connector`] turns a [`ConnectRequest`] into a live [`TransportSession`]:
//! the transport is set up, the handshake is done, and messages flow over a
//! pair of channels. The client never touches sockets itself.

use crate::config::TransportOptions;
use crate::error::Result;
use crate::messages::{ClientMessage, ServerMessage};

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use url::Url;

/// Everything needed for one connection attempt
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub url: Url,
    /// Token current at the time of the attempt
    pub access_token: Option<String>,
    pub options: TransportOptions,
}

/// An established, handshaken session
///
/// Dropping `outbound` asks the transport to close. The transport closes
/// `inbound` when the session ends for any reason.
#[derive(Debug)]
pub struct TransportSession {
    pub outbound: mpsc::Sender<ClientMessage>,
    pub inbound: mpsc::Receiver<ServerMessage>,
}

impl TransportSession {
    /// Create a session together with the transport-side ends of its channels
    pub fn channel(
        capacity: usize,
    ) -> (
        Self,
        mpsc::Receiver<ClientMessage>,
        mpsc::Sender<ServerMessage>,
    ) {
        let (outbound, outbound_rx) = mpsc::channel(capacity);
        let (inbound_tx, inbound) = mpsc::channel(capacity);
        (Self { outbound, inbound }, outbound_rx, inbound_tx)
    }
}

/// Opens transport sessions
///
/// Errors for which [`HubError::is_retryable`](crate::HubError::is_retryable)
/// is false end the connect cycle immediately.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, request: ConnectRequest) -> BoxFuture<'static, Result<TransportSession>>;
}
