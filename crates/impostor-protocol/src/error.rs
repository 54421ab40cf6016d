//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding protocol messages.
///
/// Each crate in Impostor owns its own error enum, so a `ProtocolError`
/// always means "the bytes were wrong", never "the game rejected you".
///
/// `thiserror` derives `std::error::Error` and `Display` from the
/// `#[error("...")]` attributes; the server lifts this type into
/// `ImpostorError` with `?` and reports it to the client as `BadRequest`.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    ///
    /// Rare with JSON: it takes a map with non-string keys or a custom
    /// `Serialize` impl that errors. The inner error is kept as-is so the
    /// log line shows serde's own message.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, missing fields, unknown
    /// message `type`, or a truncated frame.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message decoded fine but breaks a protocol rule, e.g. a
    /// handshake that is not the first message on a connection.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
