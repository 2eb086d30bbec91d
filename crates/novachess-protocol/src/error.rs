//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding packets.
///
/// A decode failure never tears down a connection — the handler logs it
/// and answers with a `server_err` packet whose `debug_msg` is built from
/// the error's display form, which is why the inner serde error is kept
/// rather than flattened to a unit variant.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a packet into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, an unknown command tag, a
    /// payload that doesn't match the tag's shape, an out-of-range
    /// square, or a negative time-control value.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),
}
