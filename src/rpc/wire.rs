//! Frame format and codec helpers for the RPC wire.
//!
//! Every frame on the wire is length-prefixed JSON. After an initial
//! `Hello`, peers exchange [`Envelope`]s whose `body` carries a
//! [`Request`] or [`Reply`]; the correlation id links the two so a client
//! may keep any number of calls in flight.

use crate::types::{AgentError, Call, CallResult, Result};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_util::bytes::{Bytes, BytesMut};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use uuid::Uuid;

/// An identity-addressed message. The broker routes on `to` and delivers
/// with `from` intact; `body` is opaque to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Identity of the sending peer.
    pub from: String,
    /// Identity of the receiving peer.
    pub to: String,
    /// JSON payload, a [`Request`] or [`Reply`].
    pub body: Value,
}

/// One frame on a broker connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Frame {
    /// First frame of every connection: the peer announces its identity.
    Hello {
        /// The peer's unique identity.
        id: String,
    },
    /// An addressed message to route.
    Message(Envelope),
}

/// A call tagged with a correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id, echoed unchanged in the matching [`Reply`].
    pub call_id: Uuid,
    /// The call itself.
    #[serde(flatten)]
    pub call: Call,
}

/// A call outcome tagged with its originating correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// The id of the [`Request`] this answers.
    pub call_id: Uuid,
    /// The outcome.
    #[serde(flatten)]
    pub result: CallResult,
}

/// A TCP connection speaking length-prefixed frames.
pub type WireStream = Framed<TcpStream, LengthDelimitedCodec>;

/// Wrap a TCP stream into a [`WireStream`].
pub fn frame_stream(stream: TcpStream) -> WireStream {
    Framed::new(stream, LengthDelimitedCodec::new())
}

pub(crate) async fn send_frame<S>(sink: &mut S, frame: &Frame) -> Result<()>
where
    S: Sink<Bytes, Error = std::io::Error> + Unpin,
{
    let encoded = serde_json::to_vec(frame)?;
    sink.send(Bytes::from(encoded)).await.map_err(AgentError::Io)
}

pub(crate) async fn recv_frame<S>(stream: &mut S) -> Result<Option<Frame>>
where
    S: Stream<Item = std::io::Result<BytesMut>> + Unpin,
{
    match stream.next().await {
        None => Ok(None),
        Some(raw) => {
            let raw = raw.map_err(AgentError::Io)?;
            Ok(Some(serde_json::from_slice(&raw)?))
        }
    }
}
