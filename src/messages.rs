//! Message types for the hub protocol
//!
//! Messages are JSON objects tagged by `type`. See [`crate::codec`] for framing.

use crate::error::Result;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol name announced in the handshake
pub const PROTOCOL_NAME: &str = "json";

/// Protocol version announced in the handshake
pub const PROTOCOL_VERSION: u32 = 1;

/// Hub method that pushes plain text messages to clients
pub const RECEIVE_MESSAGE_METHOD: &str = "ReceiveMessage";

/// Hub method that echoes a message back to the caller
pub const SEND_CALLER_METHOD: &str = "SendCaller";

/// Hub method that relays a message
pub const SEND_MESSAGE_METHOD: &str = "SendMessage";

/// Messages sent from client to hub
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Negotiate the protocol; must be the first frame on a session
    Handshake { protocol: String, version: u32 },

    /// Call a hub method; the hub answers with a completion when an id is present
    Invocation {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        invocation_id: Option<String>,
        target: String,
        arguments: Vec<Value>,
    },

    /// Keepalive, answered with a pong
    Ping { seq: u64 },

    /// Orderly shutdown from the client side
    Close,
}

impl ClientMessage {
    pub fn handshake() -> Self {
        ClientMessage::Handshake {
            protocol: PROTOCOL_NAME.to_string(),
            version: PROTOCOL_VERSION,
        }
    }
}

/// Messages received from the hub
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Handshake accepted
    HandshakeOk,

    /// Handshake refused
    HandshakeError { message: String },

    /// The hub calls a client method
    Invocation {
        target: String,
        #[serde(default)]
        arguments: Vec<Value>,
    },

    /// Result of an awaited invocation
    Completion {
        invocation_id: String,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<String>,
    },

    /// Hub keepalive
    Ping,

    /// Answer to a client ping
    Pong { seq: u64 },

    /// The hub is closing the session
    Close {
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        allow_reconnect: bool,
    },
}

/// Single-field wrapper applied to outbound text messages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageEnvelope {
    pub message: String,
}

impl MessageEnvelope {
    /// Encode `message` as the JSON text the hub expects as the sole argument
    pub fn encode(message: &str) -> Result<String> {
        Ok(serde_json::to_string(&MessageEnvelope {
            message: message.to_string(),
        })?)
    }
}

/// Positional arguments for a hub invocation
///
/// Implemented for `()`, tuples of up to three serializable values, and
/// pre-built `Vec<Value>` argument lists.
pub trait IntoArguments {
    fn into_arguments(self) -> Result<Vec<Value>>;
}

impl IntoArguments for () {
    fn into_arguments(self) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }
}

impl IntoArguments for Vec<Value> {
    fn into_arguments(self) -> Result<Vec<Value>> {
        Ok(self)
    }
}

macro_rules! impl_into_arguments {
    ($($arg:ident),+) => {
        impl<$($arg: Serialize),+> IntoArguments for ($($arg,)+) {
            #[allow(non_snake_case)]
            fn into_arguments(self) -> Result<Vec<Value>> {
                let ($($arg,)+) = self;
                Ok(vec![$(serde_json::to_value($arg)?),+])
            }
        }
    };
}

impl_into_arguments!(A);
impl_into_arguments!(A, B);
impl_into_arguments!(A, B, C);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_message_handshake_serialization() {
        let json = serde_json::to_string(&ClientMessage::handshake()).unwrap();
        assert_eq!(json, r#"{"type":"handshake","protocol":"json","version":1}"#);
    }

    #[test]
    fn test_client_message_invocation_serialization() {
        let msg = ClientMessage::Invocation {
            invocation_id: Some("7".to_string()),
            target: "MovePlayer".to_string(),
            arguments: vec![json!(3), json!("north")],
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(
            json,
            r#"{"type":"invocation","invocation_id":"7","target":"MovePlayer","arguments":[3,"north"]}"#
        );
    }

    #[test]
    fn test_client_message_invocation_without_id_omits_field() {
        let msg = ClientMessage::Invocation {
            invocation_id: None,
            target: "Heartbeat".to_string(),
            arguments: vec![],
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"invocation","target":"Heartbeat","arguments":[]}"#);
    }

    #[test]
    fn test_client_message_ping_and_close_serialization() {
        let json = serde_json::to_string(&ClientMessage::Ping { seq: 42 }).unwrap();
        assert_eq!(json, r#"{"type":"ping","seq":42}"#);

        let json = serde_json::to_string(&ClientMessage::Close).unwrap();
        assert_eq!(json, r#"{"type":"close"}"#);
    }

    #[test]
    fn test_server_message_handshake_deserialization() {
        let msg: ServerMessage = serde_json::from_str(r#"{"type":"handshake_ok"}"#).unwrap();
        assert_eq!(msg, ServerMessage::HandshakeOk);

        let msg: ServerMessage =
            serde_json::from_str(r#"{"type":"handshake_error","message":"version 2 required"}"#)
                .unwrap();
        assert_eq!(
            msg,
            ServerMessage::HandshakeError {
                message: "version 2 required".to_string()
            }
        );
    }

    #[test]
    fn test_server_message_invocation_defaults_arguments() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"type":"invocation","target":"RoundStarted"}"#).unwrap();
        assert_eq!(
            msg,
            ServerMessage::Invocation {
                target: "RoundStarted".to_string(),
                arguments: vec![],
            }
        );
    }

    #[test]
    fn test_server_message_completion_variants() {
        let ok: ServerMessage = serde_json::from_str(
            r#"{"type":"completion","invocation_id":"1","result":{"score":10}}"#,
        )
        .unwrap();
        assert_eq!(
            ok,
            ServerMessage::Completion {
                invocation_id: "1".to_string(),
                result: Some(json!({"score": 10})),
                error: None,
            }
        );

        let failed: ServerMessage = serde_json::from_str(
            r#"{"type":"completion","invocation_id":"2","error":"no such room"}"#,
        )
        .unwrap();
        assert_eq!(
            failed,
            ServerMessage::Completion {
                invocation_id: "2".to_string(),
                result: None,
                error: Some("no such room".to_string()),
            }
        );
    }

    #[test]
    fn test_server_message_close_defaults() {
        let msg: ServerMessage = serde_json::from_str(r#"{"type":"close"}"#).unwrap();
        assert_eq!(
            msg,
            ServerMessage::Close {
                error: None,
                allow_reconnect: false,
            }
        );
    }

    #[test]
    fn test_server_message_unknown_type_rejected() {
        let result = serde_json::from_str::<ServerMessage>(r#"{"type":"stream_item"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_envelope_encode() {
        let text = MessageEnvelope::encode("hello \"world\"").unwrap();
        assert_eq!(text, r#"{"message":"hello \"world\""}"#);
    }

    #[test]
    fn test_into_arguments_tuples() {
        assert_eq!(().into_arguments().unwrap(), Vec::<Value>::new());
        assert_eq!(("a",).into_arguments().unwrap(), vec![json!("a")]);
        assert_eq!(
            (1, "two", [3.5]).into_arguments().unwrap(),
            vec![json!(1), json!("two"), json!([3.5])]
        );
        assert_eq!(
            vec![json!(null)].into_arguments().unwrap(),
            vec![Value::Null]
        );
    }
}
