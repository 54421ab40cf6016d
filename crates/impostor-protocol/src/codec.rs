//! Codec trait and implementations for serializing/deserializing messages.
//!
//! The server never calls `serde_json` directly; it goes through a
//! [`Codec`] so the wire format can change without touching the handler.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Converts protocol values to bytes and back.
///
/// ## Trait bounds
///
/// - `Send + Sync`: one codec instance is shared by every connection task,
///   and Tokio may poll those tasks on any worker thread.
/// - `'static`: the codec lives inside the server state for the lifetime
///   of the process and borrows nothing.
///
/// ## Generic methods
///
/// `encode` and `decode` are generic over the value type, so the same
/// codec handles envelopes, views, or anything else with serde derives:
///
/// - `encode<T: Serialize>` turns any serializable `T` into bytes.
/// - `decode<T: DeserializeOwned>` builds a `T` that owns all its data, so
///   the frame buffer can be dropped right after decoding.
///
/// Because the methods are generic the trait is not object safe; the
/// server takes the codec as a type parameter instead of a `dyn Codec`.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value cannot be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or do not
    /// match the expected shape.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// JSON is what the mobile client speaks natively, so this is the only
/// codec shipped today. Behind the `json` feature (on by default).
///
/// ```rust
/// use impostor_protocol::{ClientMessage, Codec, Envelope, JsonCodec, Payload};
///
/// let codec = JsonCodec;
/// let envelope = Envelope {
///     seq: 1,
///     timestamp: 0,
///     payload: Payload::Client(ClientMessage::JoinSession { code: "AB3X7Q".into() }),
/// };
///
/// let bytes = codec.encode(&envelope).unwrap();
/// let decoded: Envelope = codec.decode(&bytes).unwrap();
/// assert_eq!(envelope, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
