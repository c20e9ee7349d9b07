//! Default connector: hub protocol over a WebTransport bidirectional stream

use crate::codec::{encode_frame, FrameDecoder};
use crate::error::{HubError, Result};
use crate::messages::{ClientMessage, ServerMessage};
use crate::transport::{ConnectRequest, Connector, TransportSession};

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use wtransport::endpoint::endpoint_side::Client;
use wtransport::endpoint::ConnectOptions;
use wtransport::{ClientConfig, Connection, Endpoint, RecvStream, SendStream};

const CHANNEL_CAPACITY: usize = 100;
const READ_BUFFER_LEN: usize = 64 * 1024;

/// Connects to a hub over WebTransport (HTTP/3)
#[derive(Debug, Clone, Copy, Default)]
pub struct WebTransportConnector;

impl Connector for WebTransportConnector {
    fn connect(&self, request: ConnectRequest) -> BoxFuture<'static, Result<TransportSession>> {
        Box::pin(async move {
            let limit = request.options.handshake_timeout;
            match tokio::time::timeout(limit, open_session(request)).await {
                Ok(result) => result,
                Err(_) => Err(HubError::Connection(format!(
                    "handshake not completed within {:?}",
                    limit
                ))),
            }
        })
    }
}

fn transport_error(e: impl std::fmt::Display) -> HubError {
    HubError::Transport(e.to_string())
}

async fn open_session(request: ConnectRequest) -> Result<TransportSession> {
    if request.url.scheme() != "https" {
        return Err(HubError::Configuration(format!(
            "WebTransport requires an https URL, got '{}'",
            request.url
        )));
    }

    let config = if request.options.dangerous_skip_cert_verify {
        ClientConfig::builder()
            .with_bind_default()
            .with_no_cert_validation()
            .build()
    } else {
        ClientConfig::builder()
            .with_bind_default()
            .with_native_certs()
            .build()
    };

    let endpoint: Endpoint<Client> =
        Endpoint::client(config).map_err(|e| HubError::Connection(e.to_string()))?;

    let mut options = ConnectOptions::builder(request.url.as_str());
    if let Some(token) = &request.access_token {
        options = options.add_header("Authorization", format!("Bearer {}", token));
    }
    for (name, value) in &request.options.headers {
        options = options.add_header(name, value);
    }

    debug!(url = %request.url, "Opening WebTransport session");
    let connection = endpoint
        .connect(options.build())
        .await
        .map_err(|e| HubError::Connection(e.to_string()))?;

    let (mut send, mut recv) = connection
        .open_bi()
        .await
        .map_err(transport_error)?
        .await
        .map_err(transport_error)?;

    send.write_all(&encode_frame(&ClientMessage::handshake())?)
        .await
        .map_err(transport_error)?;

    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; READ_BUFFER_LEN];
    let frame = loop {
        if let Some(frame) = decoder.next_frame() {
            break frame;
        }
        if decoder.is_overflowing() {
            return Err(HubError::Handshake("handshake response too large".into()));
        }
        let n = recv
            .read(&mut buf)
            .await
            .map_err(transport_error)?
            .ok_or_else(|| HubError::Connection("session closed during handshake".into()))?;
        decoder.extend(&buf[..n]);
    };

    match serde_json::from_slice::<ServerMessage>(&frame) {
        Ok(ServerMessage::HandshakeOk) => debug!("Handshake accepted"),
        Ok(ServerMessage::HandshakeError { message }) => return Err(HubError::Handshake(message)),
        Ok(other) => {
            return Err(HubError::Handshake(format!(
                "unexpected handshake response: {:?}",
                other
            )))
        }
        Err(e) => {
            return Err(HubError::Handshake(format!(
                "malformed handshake response: {}",
                e
            )))
        }
    }

    let (session, outbound_rx, inbound_tx) = TransportSession::channel(CHANNEL_CAPACITY);
    tokio::spawn(pump(connection, send, recv, decoder, outbound_rx, inbound_tx));
    Ok(session)
}

/// Moves frames between the stream and the session channels until either side ends
async fn pump(
    _connection: Connection,
    mut send: SendStream,
    mut recv: RecvStream,
    mut decoder: FrameDecoder,
    mut outbound: mpsc::Receiver<ClientMessage>,
    inbound: mpsc::Sender<ServerMessage>,
) {
    let mut buf = vec![0u8; READ_BUFFER_LEN];

    'session: loop {
        while let Some(frame) = decoder.next_frame() {
            match serde_json::from_slice::<ServerMessage>(&frame) {
                Ok(message) => {
                    if inbound.send(message).await.is_err() {
                        break 'session;
                    }
                }
                Err(e) => warn!(error = %e, "Failed to parse hub frame"),
            }
        }
        if decoder.is_overflowing() {
            warn!(pending = decoder.pending_len(), "Hub frame exceeds size limit");
            break;
        }

        tokio::select! {
            message = outbound.recv() => {
                match message {
                    Some(message) => {
                        let closing = matches!(message, ClientMessage::Close);
                        let bytes = match encode_frame(&message) {
                            Ok(bytes) => bytes,
                            Err(e) => {
                                warn!(error = %e, "Failed to encode client message");
                                continue;
                            }
                        };
                        if let Err(e) = send.write_all(&bytes).await {
                            debug!(error = %e, "Stream write failed");
                            break;
                        }
                        if closing {
                            break;
                        }
                    }
                    None => break,
                }
            }

            read = recv.read(&mut buf) => {
                match read {
                    Ok(Some(n)) => decoder.extend(&buf[..n]),
                    Ok(None) => {
                        debug!("Hub closed the stream");
                        break;
                    }
                    Err(e) => {
                        debug!(error = %e, "Stream read failed");
                        break;
                    }
                }
            }
        }
    }

    debug!("WebTransport session ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportOptions;
    use url::Url;

    #[tokio::test]
    async fn test_rejects_non_https_scheme() {
        let request = ConnectRequest {
            url: Url::parse("http://localhost:4433/hub").unwrap(),
            access_token: None,
            options: TransportOptions::default(),
        };

        let err = WebTransportConnector.connect(request).await.err().unwrap();
        assert!(matches!(err, HubError::Configuration(_)));
        assert!(!err.is_retryable());
    }
}
