use bytes::{Bytes, BytesMut};

use crate::{
    codec::{decode_flow_id, encode_flow_id, encoded_len},
    error::FramingError,
    flow::FlowId,
};

/// One transport message: `varint(flow_id) || payload`.
///
/// There is no length field; the transport's message boundary is the
/// payload boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub flow_id: FlowId,
    pub payload: Bytes,
}

impl Datagram {
    pub fn new(flow_id: FlowId, payload: Bytes) -> Self {
        Self { flow_id, payload }
    }

    /// Length of the datagram on the wire.
    pub fn encoded_len(&self) -> usize {
        encoded_len(self.flow_id) + self.payload.len()
    }

    pub fn encode(&self) -> Bytes {
        Self::encode_parts(self.flow_id, &[&self.payload[..]])
    }

    /// Frames the concatenation of `parts` for `flow_id` in one allocation.
    pub fn encode_parts(flow_id: FlowId, parts: &[&[u8]]) -> Bytes {
        let payload_len: usize = parts.iter().map(|p| p.len()).sum();
        let mut buf = BytesMut::with_capacity(encoded_len(flow_id) + payload_len);
        encode_flow_id(flow_id, &mut buf);
        for part in parts {
            buf.extend_from_slice(part);
        }
        buf.freeze()
    }

    /// Splits a received message into flow ID and payload without copying.
    pub fn decode(mut message: Bytes) -> Result<Self, FramingError> {
        let (flow_id, len) = decode_flow_id(&message)?;
        let payload = message.split_off(len);
        Ok(Self { flow_id, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datagram_to_bytes_and_back() {
        let datagram = Datagram::new(FlowId::new(1_000), Bytes::from_static(b"test-data"));
        let bytes = datagram.encode();
        assert_eq!(bytes.len(), datagram.encoded_len());
        assert_eq!(&bytes[..2], &[0x43, 0xe8]);

        let parsed = Datagram::decode(bytes).expect("decode failed");
        assert_eq!(parsed, datagram);
    }

    #[test]
    fn test_encode_parts_concatenates() {
        let bytes = Datagram::encode_parts(FlowId::new(7), &[&b"hel"[..], &b""[..], &b"lo"[..]]);
        assert_eq!(&bytes[..], b"\x07hello");
    }

    #[test]
    fn test_empty_payload() {
        let parsed = Datagram::decode(Bytes::from_static(&[0x05])).unwrap();
        assert_eq!(parsed.flow_id, FlowId::new(5));
        assert!(parsed.payload.is_empty());
    }

    #[test]
    fn test_decode_malformed_prefix() {
        assert!(Datagram::decode(Bytes::new()).is_err());
        assert!(Datagram::decode(Bytes::from_static(&[0x80, 0x01])).is_err());
    }
}
