//! Flow identifier framing.
//!
//! Every datagram starts with its flow ID encoded as a QUIC variable-length
//! integer (RFC 9000, section 16). The two most significant bits of the first
//! byte give the length of the encoding:
//!
//! | prefix | length  | usable bits | range                 |
//! |--------|---------|-------------|-----------------------|
//! | `00`   | 1 byte  | 6           | 0 - 63                |
//! | `01`   | 2 bytes | 14          | 0 - 16383             |
//! | `10`   | 4 bytes | 30          | 0 - 1073741823        |
//! | `11`   | 8 bytes | 62          | 0 - 4611686018427387903 |
//!
//! The encoder always picks the shortest form and the decoder rejects longer
//! ones, so every flow ID has exactly one wire representation.

use bytes::BufMut;

use crate::{error::FramingError, flow::FlowId};

/// Maximum length of an encoded flow ID.
pub const MAX_FLOW_ID_LEN: usize = 8;

/// Number of bytes `id` occupies on the wire.
pub fn encoded_len(id: FlowId) -> usize {
    match id.id() {
        0..=0x3f => 1,
        0x40..=0x3fff => 2,
        0x4000..=0x3fff_ffff => 4,
        _ => MAX_FLOW_ID_LEN,
    }
}

/// Writes the shortest encoding of `id` into `dst`.
pub fn encode_flow_id<B: BufMut>(id: FlowId, dst: &mut B) {
    let value = id.id();
    match encoded_len(id) {
        1 => dst.put_u8(value as u8),
        2 => dst.put_u16(0x4000 | value as u16),
        4 => dst.put_u32(0x8000_0000 | value as u32),
        _ => dst.put_u64(0xc000_0000_0000_0000 | value),
    }
}

pub fn encode_flow_id_to_vec(id: FlowId) -> Vec<u8> {
    let mut buf = Vec::with_capacity(encoded_len(id));
    encode_flow_id(id, &mut buf);
    buf
}

/// Decodes the flow ID at the start of `src`.
///
/// Returns the ID together with the number of bytes it occupied; the payload
/// begins right after.
pub fn decode_flow_id(src: &[u8]) -> Result<(FlowId, usize), FramingError> {
    let first = *src.first().ok_or(FramingError::Truncated {
        needed: 1,
        available: 0,
    })?;
    let len = 1usize << (first >> 6);
    if src.len() < len {
        return Err(FramingError::Truncated {
            needed: len,
            available: src.len(),
        });
    }

    let mut value = (first & 0x3f) as u64;
    for byte in &src[1..len] {
        value = (value << 8) | *byte as u64;
    }

    // At most 62 significant bits remain, so the ID never saturates.
    let id = FlowId::new(value);
    if encoded_len(id) != len {
        return Err(FramingError::NonCanonical { value, len });
    }
    Ok((id, len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rfc9000_sample_encodings() {
        let samples: [(&[u8], u64); 4] = [
            (&[0x25], 37),
            (&[0x7b, 0xbd], 15_293),
            (&[0x9d, 0x7f, 0x3e, 0x7d], 494_878_333),
            (
                &[0xc2, 0x19, 0x7c, 0x5e, 0xff, 0x14, 0xe8, 0x8c],
                151_288_809_941_952_652,
            ),
        ];
        for (bytes, value) in samples {
            assert_eq!(decode_flow_id(bytes), Ok((FlowId::new(value), bytes.len())));
            assert_eq!(encode_flow_id_to_vec(FlowId::new(value)), bytes);
        }
    }

    #[test]
    fn test_round_trip_at_length_boundaries() {
        let ids = [
            0,
            1,
            0x3f,
            0x40,
            0x3fff,
            0x4000,
            0x3fff_ffff,
            0x4000_0000,
            FlowId::MAX.id(),
        ];
        for id in ids {
            let id = FlowId::new(id);
            let encoded = encode_flow_id_to_vec(id);
            assert_eq!(encoded.len(), encoded_len(id));
            assert_eq!(decode_flow_id(&encoded), Ok((id, encoded.len())));
        }
    }

    #[test]
    fn test_decode_ignores_trailing_payload() {
        let mut buf = encode_flow_id_to_vec(FlowId::new(300));
        buf.extend_from_slice(b"payload");
        let (id, len) = decode_flow_id(&buf).unwrap();
        assert_eq!(id, FlowId::new(300));
        assert_eq!(&buf[len..], b"payload");
    }

    #[test]
    fn test_decode_truncated() {
        assert_eq!(
            decode_flow_id(&[]),
            Err(FramingError::Truncated { needed: 1, available: 0 })
        );
        assert_eq!(
            decode_flow_id(&[0x9d, 0x7f]),
            Err(FramingError::Truncated { needed: 4, available: 2 })
        );
    }

    #[test]
    fn test_decode_rejects_non_canonical() {
        // 37 fits a single byte.
        assert_eq!(
            decode_flow_id(&[0x40, 0x25]),
            Err(FramingError::NonCanonical { value: 37, len: 2 })
        );
        assert_eq!(
            decode_flow_id(&[0xc0, 0, 0, 0, 0, 0, 0, 0x01]),
            Err(FramingError::NonCanonical { value: 1, len: 8 })
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(2048))]

        /// Every valid flow ID survives encoding, in its shortest form.
        #[test]
        fn prop_round_trip_any_flow_id(
            value in 0..=FlowId::MAX.id(),
            tail in prop::collection::vec(any::<u8>(), 0..16),
        ) {
            let id = FlowId::try_from(value).unwrap();
            let mut encoded = encode_flow_id_to_vec(id);
            prop_assert_eq!(encoded.len(), encoded_len(id));
            prop_assert!(encoded.len() <= MAX_FLOW_ID_LEN);

            encoded.extend_from_slice(&tail);
            prop_assert_eq!(decode_flow_id(&encoded), Ok((id, encoded_len(id))));
        }

        /// Decoding arbitrary bytes never panics, and whatever it accepts
        /// re-encodes to the same prefix.
        #[test]
        fn prop_decode_arbitrary_bytes(data in prop::collection::vec(any::<u8>(), 0..12)) {
            if let Ok((id, len)) = decode_flow_id(&data) {
                prop_assert_eq!(encode_flow_id_to_vec(id), data[..len].to_vec());
            }
        }
    }
}
