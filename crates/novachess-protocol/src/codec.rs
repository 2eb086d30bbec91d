//! Codec trait and the default JSON implementation.
//!
//! The connection layer doesn't care how packets become bytes — it goes
//! through the [`Codec`] trait, so a binary codec can be swapped in later
//! without touching the handlers. Encoding and decoding are pure: no side
//! effects beyond validation.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Converts packets to and from bytes.
///
/// `Send + Sync + 'static` because the codec is shared across every
/// connection task for the life of the server. The methods are generic so
/// one codec handles both [`ClientPacket`](crate::ClientPacket) and
/// [`ServerPacket`](crate::ServerPacket).
pub trait Codec: Send + Sync + 'static {
    /// Serializes a packet into bytes.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a packet, validating that the
    /// command tag is one of the closed set and that the payload matches
    /// the tag's shape. Range checks (square indices, unsigned time
    /// controls) happen here too, via the types' own deserializers.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] with enough detail to build a
    /// `server_err` debug message.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// The default [`Codec`]: JSON via `serde_json`, matching the shapes the
/// browser client speaks. Behind the `json` feature flag (on by default).
///
/// ## Example
///
/// ```rust
/// use novachess_protocol::{ClientBody, ClientPacket, Codec, JsonCodec, PacketId};
///
/// let codec = JsonCodec;
/// let packet = ClientPacket {
///     id: PacketId(1),
///     body: ClientBody::LogonAnon {},
/// };
///
/// let bytes = codec.encode(&packet).unwrap();
/// let decoded: ClientPacket = codec.decode(&bytes).unwrap();
/// assert_eq!(packet, decoded);
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
