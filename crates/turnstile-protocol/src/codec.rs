//! Codec trait and the JSON implementation.
//!
//! The bus moves bytes; everything above it works with typed payloads.
//! A [`Codec`] is the single place where one becomes the other, so the
//! session service, the responder, and the peer bridge all agree on the
//! encoding.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes Rust types to bytes and decodes bytes back.
///
/// `Send + Sync + 'static` because one codec is shared by every task of
/// the server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected shape.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] backed by `serde_json`. The auth protocol is JSON on the
/// wire, so this is the only codec the server uses.
///
/// ## Example
///
/// ```rust
/// use turnstile_protocol::{Codec, JsonCodec, Reply, ResError};
///
/// let codec = JsonCodec;
/// let bytes = codec.encode(&Reply::from(ResError::invalid_params())).unwrap();
/// let decoded: Reply = codec.decode(&bytes).unwrap();
/// assert_eq!(decoded, Reply::Error(ResError::invalid_params()));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AuthRequest, ConnectionId};

    #[test]
    fn test_decode_garbage_returns_decode_error() {
        let result: Result<AuthRequest, _> = JsonCodec.decode(b"not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_missing_cid_returns_error() {
        let result: Result<AuthRequest, _> =
            JsonCodec.decode(br#"{"params":{}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_encode_auth_request_skips_absent_fields() {
        let req = AuthRequest {
            cid: ConnectionId::from("c1"),
            params: None,
            token: None,
        };
        let bytes = JsonCodec.encode(&req).unwrap();
        assert_eq!(bytes, br#"{"cid":"c1"}"#);
    }
}
