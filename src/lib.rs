//! hublink
//!
//! A persistent hub client: one logical connection to a remote hub with automatic
//! reconnection, typed method invocation (awaited and fire-and-forget), and
//! dispatch of hub-to-client invocations to named handlers.
//!
//! # Example
//!
//! ```no_run
//! use hublink::{HubClient, HubConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = HubClient::new(HubConfig::new("https://localhost:4433/hub"))?;
//!     client.set_token("your-token");
//!
//!     client.on_message_received(|text| println!("Received: {}", text));
//!     client.on("ScoreChanged", |score: u32| println!("Score: {}", score));
//!
//!     client.connect().await?;
//!
//!     // Fire-and-forget; failures are reported through `on_error`
//!     client.send_message("hello");
//!
//!     // Awaited call with a typed result
//!     let players: Vec<String> = client.invoke_async("ListPlayers", ("lobby",)).await?;
//!     println!("{} players online", players.len());
//!
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```

mod client;
mod codec;
mod config;
mod error;
mod events;
mod handlers;
mod messages;
mod retry;
mod transport;
mod webtransport;

pub use client::{ConnectionState, HubClient, INITIAL_LATENCY};
pub use codec::{encode_frame, FrameDecoder, MAX_FRAME_LEN, RECORD_SEPARATOR};
pub use config::{HubConfig, TransportOptions};
pub use error::{HubError, Result};
pub use events::{ClientEvent, EventListener, EventListeners, ListenerId};
pub use handlers::{HandlerRegistry, MessageHandler};
pub use messages::{
    ClientMessage, IntoArguments, MessageEnvelope, ServerMessage, PROTOCOL_NAME, PROTOCOL_VERSION,
    RECEIVE_MESSAGE_METHOD, SEND_CALLER_METHOD, SEND_MESSAGE_METHOD,
};
pub use retry::{ExponentialBackoff, FixedDelays, NoRetry, RetryContext, RetryPolicy};
pub use transport::{ConnectRequest, Connector, TransportSession};
pub use webtransport::WebTransportConnector;
