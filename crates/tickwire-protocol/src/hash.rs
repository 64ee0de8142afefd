//! State-hash messages used for desync detection.
//!
//! ```text
//! raw:      [tag = 0][hash: u32 LE]
//! labelled: [tag = 1][label_len: u32 LE][label: UTF-8][hash: u32 LE]
//! ```
//!
//! The labelled form is a debugging aid: the client sends the text it
//! fingerprinted (for example a rounded position plus a frame number)
//! and the hash of that text, so a mismatch can be logged with both
//! sides' inputs.

use crate::ProtocolError;

const TAG_RAW: u8 = 0;
const TAG_LABELLED: u8 = 1;

/// Stable 32-bit fingerprint of a byte string.
///
/// Identical on every platform and process, unlike `std`'s hashers.
pub fn stable_hash(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

/// A decoded state-hash submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateHash {
    Raw(u32),
    Labelled { label: String, hash: u32 },
}

impl StateHash {
    /// Builds a labelled hash, fingerprinting the label itself.
    pub fn labelled(label: impl Into<String>) -> Self {
        let label = label.into();
        let hash = stable_hash(label.as_bytes());
        Self::Labelled { label, hash }
    }

    pub fn hash(&self) -> u32 {
        match self {
            Self::Raw(hash) | Self::Labelled { hash, .. } => *hash,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Raw(_) => None,
            Self::Labelled { label, .. } => Some(label),
        }
    }

    /// Number of bytes [`encode_into`](Self::encode_into) will write.
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Raw(_) => 1 + 4,
            Self::Labelled { label, .. } => 1 + 4 + label.len() + 4,
        }
    }

    /// Writes the wire form into `buf`, returning the bytes used.
    ///
    /// # Errors
    /// [`ProtocolError::ContentTooLarge`] if `buf` is too small.
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let len = self.encoded_len();
        if len > buf.len() {
            return Err(ProtocolError::ContentTooLarge {
                len,
                max: buf.len(),
            });
        }
        match self {
            Self::Raw(hash) => {
                buf[0] = TAG_RAW;
                buf[1..5].copy_from_slice(&hash.to_le_bytes());
            }
            Self::Labelled { label, hash } => {
                let label_len = u32::try_from(label.len()).map_err(|_| {
                    ProtocolError::InvalidMessage("hash label too long".into())
                })?;
                buf[0] = TAG_LABELLED;
                buf[1..5].copy_from_slice(&label_len.to_le_bytes());
                let end = 5 + label.len();
                buf[5..end].copy_from_slice(label.as_bytes());
                buf[end..end + 4].copy_from_slice(&hash.to_le_bytes());
            }
        }
        Ok(len)
    }

    /// Encodes into a freshly allocated buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.encoded_len()];
        // The buffer is sized by `encoded_len`, so only an absurd label
        // length can fail here; fall back to the raw form in that case.
        match self.encode_into(&mut buf) {
            Ok(_) => buf,
            Err(_) => Self::Raw(self.hash()).to_bytes(),
        }
    }

    /// Parses the content of a [`SystemMessage::StateHash`](crate::SystemMessage::StateHash)
    /// envelope.
    ///
    /// # Errors
    /// - [`ProtocolError::Truncated`] if the content ends early.
    /// - [`ProtocolError::InvalidMessage`] for unknown tags, non-UTF-8
    ///   labels, or trailing bytes.
    pub fn decode(content: &[u8]) -> Result<Self, ProtocolError> {
        let Some((&tag, rest)) = content.split_first() else {
            return Err(ProtocolError::Truncated { len: 0, needed: 5 });
        };
        match tag {
            TAG_RAW => {
                let hash = read_u32(rest, content.len(), 5)?;
                if rest.len() != 4 {
                    return Err(ProtocolError::InvalidMessage(
                        "trailing bytes after raw hash".into(),
                    ));
                }
                Ok(Self::Raw(hash))
            }
            TAG_LABELLED => {
                let label_len = read_u32(rest, content.len(), 9)? as usize;
                let needed = 1 + 4 + label_len + 4;
                if content.len() < needed {
                    return Err(ProtocolError::Truncated {
                        len: content.len(),
                        needed,
                    });
                }
                if content.len() > needed {
                    return Err(ProtocolError::InvalidMessage(
                        "trailing bytes after labelled hash".into(),
                    ));
                }
                let label_bytes = &rest[4..4 + label_len];
                let label = std::str::from_utf8(label_bytes)
                    .map_err(|e| ProtocolError::InvalidMessage(format!("hash label: {e}")))?
                    .to_owned();
                let hash = read_u32(&rest[4 + label_len..], content.len(), needed)?;
                Ok(Self::Labelled { label, hash })
            }
            other => Err(ProtocolError::InvalidMessage(format!(
                "unknown hash tag {other}"
            ))),
        }
    }
}

fn read_u32(bytes: &[u8], total: usize, needed: usize) -> Result<u32, ProtocolError> {
    bytes
        .first_chunk::<4>()
        .map(|b| u32::from_le_bytes(*b))
        .ok_or(ProtocolError::Truncated { len: total, needed })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_hash_layout() {
        let bytes = StateHash::Raw(0xAABB_CCDD).to_bytes();
        assert_eq!(bytes, vec![0, 0xDD, 0xCC, 0xBB, 0xAA]);
        assert_eq!(StateHash::decode(&bytes).unwrap(), StateHash::Raw(0xAABB_CCDD));
    }

    #[test]
    fn test_labelled_hash_fingerprints_label() {
        let h = StateHash::labelled("pos:1,2,3@120");
        assert_eq!(h.hash(), stable_hash(b"pos:1,2,3@120"));
        assert_eq!(h.label(), Some("pos:1,2,3@120"));

        let decoded = StateHash::decode(&h.to_bytes()).unwrap();
        assert_eq!(decoded, h);
    }

    #[test]
    fn test_stable_hash_is_deterministic() {
        assert_eq!(stable_hash(b"abc"), stable_hash(b"abc"));
        assert_ne!(stable_hash(b"abc"), stable_hash(b"abd"));
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert!(StateHash::decode(&[]).is_err());
        assert!(StateHash::decode(&[0, 1, 2]).is_err());
        assert!(StateHash::decode(&[9, 0, 0, 0, 0]).is_err());
        assert!(StateHash::decode(&[0, 1, 2, 3, 4, 5]).is_err());
        // Label length claims more bytes than present.
        assert!(StateHash::decode(&[1, 50, 0, 0, 0, b'a']).is_err());
    }

    #[test]
    fn test_decode_rejects_non_utf8_label() {
        let mut bytes = vec![1, 1, 0, 0, 0, 0xFF];
        bytes.extend_from_slice(&0u32.to_le_bytes());
        assert!(matches!(
            StateHash::decode(&bytes),
            Err(ProtocolError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_encode_into_small_buffer() {
        let mut buf = [0u8; 3];
        assert!(StateHash::Raw(1).encode_into(&mut buf).is_err());
    }
}
