use merkle_crypto::{Digest, DIGEST_LEN};

/// Kind tag byte written first in every on-disk object.
const KIND_INTERIOR: u8 = 0x01;
const KIND_LEAF: u8 = 0x02;
const KIND_ROOT_INTERIOR: u8 = 0x03;

const INTERIOR_BODY_LEN: usize = DIGEST_LEN * 2;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("empty object has no kind tag")]
    Empty,
    #[error("unknown kind tag {0:#04x}")]
    UnknownKind(u8),
    #[error("interior body must be {INTERIOR_BODY_LEN} bytes, got {0}")]
    ShortWrite(usize),
}

/// A decoded node, tagged by the kind byte it was read under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// `is_root` distinguishes kind `0x03` from plain `0x01`.
    Interior {
        left: Digest,
        right: Digest,
        is_root: bool,
    },
    Leaf(Vec<u8>),
}

impl Node {
    pub fn is_root(&self) -> bool {
        matches!(self, Node::Interior { is_root: true, .. })
    }
}

/// Prepends the leaf kind tag to `payload`.
///
/// If `payload` is empty the encoded bytes are also empty: this is the
/// detail that lets the `put` loop in `merkle-store` detect stream end
/// without ever writing a one-byte "empty leaf" object.
pub fn encode_leaf(payload: &[u8]) -> Vec<u8> {
    if payload.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(KIND_LEAF);
    out.extend_from_slice(payload);
    out
}

/// Encodes an interior node. `left` must not be [`Digest::ZERO`]; `right`
/// may be zero on the spine of an odd-leaf tree.
pub fn encode_interior(left: &Digest, right: &Digest, is_root: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + INTERIOR_BODY_LEN);
    out.push(if is_root { KIND_ROOT_INTERIOR } else { KIND_INTERIOR });
    out.extend_from_slice(left.as_bytes());
    out.extend_from_slice(right.as_bytes());
    out
}

/// Decodes a full on-disk object (kind tag plus body) into a [`Node`].
pub fn decode_node(bytes: &[u8]) -> Result<Node, CodecError> {
    let (&kind, body) = bytes.split_first().ok_or(CodecError::Empty)?;
    match kind {
        KIND_LEAF => Ok(Node::Leaf(body.to_vec())),
        KIND_INTERIOR | KIND_ROOT_INTERIOR => {
            let (left, right) = decode_interior_body(body)?;
            Ok(Node::Interior {
                left,
                right,
                is_root: kind == KIND_ROOT_INTERIOR,
            })
        }
        other => Err(CodecError::UnknownKind(other)),
    }
}

fn decode_interior_body(body: &[u8]) -> Result<(Digest, Digest), CodecError> {
    if body.len() != INTERIOR_BODY_LEN {
        return Err(CodecError::ShortWrite(body.len()));
    }
    let mut left = [0u8; DIGEST_LEN];
    let mut right = [0u8; DIGEST_LEN];
    left.copy_from_slice(&body[..DIGEST_LEN]);
    right.copy_from_slice(&body[DIGEST_LEN..]);
    Ok((Digest::from_bytes(left), Digest::from_bytes(right)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_encodes_to_empty_bytes() {
        assert!(encode_leaf(&[]).is_empty());
    }

    #[test]
    fn leaf_round_trips() {
        let encoded = encode_leaf(b"hello");
        assert_eq!(encoded[0], KIND_LEAF);
        match decode_node(&encoded).unwrap() {
            Node::Leaf(payload) => assert_eq!(payload, b"hello"),
            other => panic!("expected leaf, got {other:?}"),
        }
    }

    #[test]
    fn interior_round_trips_with_zero_right() {
        let left = Digest::of(b"left");
        let encoded = encode_interior(&left, &Digest::ZERO, false);
        match decode_node(&encoded).unwrap() {
            Node::Interior { left: l, right, is_root } => {
                assert_eq!(l, left);
                assert!(right.is_zero());
                assert!(!is_root);
            }
            other => panic!("expected interior, got {other:?}"),
        }
    }

    #[test]
    fn root_mark_uses_distinct_kind_tag() {
        let left = Digest::of(b"left");
        let right = Digest::of(b"right");
        let plain = encode_interior(&left, &right, false);
        let root = encode_interior(&left, &right, true);
        assert_ne!(plain[0], root[0]);
        assert!(decode_node(&root).unwrap().is_root());
        assert!(!decode_node(&plain).unwrap().is_root());
    }

    #[test]
    fn rejects_unknown_kind() {
        assert_eq!(decode_node(&[0x00]), Err(CodecError::UnknownKind(0x00)));
        assert_eq!(decode_node(&[0x7f]), Err(CodecError::UnknownKind(0x7f)));
    }

    #[test]
    fn rejects_empty_object() {
        assert_eq!(decode_node(&[]), Err(CodecError::Empty));
    }

    #[test]
    fn rejects_short_interior_body() {
        let bytes = vec![KIND_INTERIOR, 0u8, 1u8];
        assert_eq!(decode_node(&bytes), Err(CodecError::ShortWrite(2)));
    }
}
