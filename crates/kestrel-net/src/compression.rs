//! Size-gated LZ4 pass over binary message bodies.
//!
//! Snapshots of a busy world compress well; handshakes and pongs do not and
//! are sent as-is. A one-byte flag in front of the body tells the receiver
//! which case it is looking at.

use lz4_flex::{compress_prepend_size, decompress_size_prepended};

/// Body follows uncompressed.
pub const FLAG_RAW: u8 = 0x00;

/// Body is LZ4 with a prepended little-endian size.
pub const FLAG_LZ4: u8 = 0x01;

/// How many times larger than its frame an LZ4 body may claim to expand.
pub const MAX_EXPANSION: usize = 16;

/// When to compress, and how much a received body may inflate to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compression {
    /// Bodies shorter than this are sent raw. Default: 256.
    pub threshold: usize,
    /// Master switch. Default: on.
    pub enabled: bool,
    /// Largest uncompressed size accepted from a peer. Checked against the
    /// LZ4 size prefix before anything is allocated.
    pub max_unpacked_size: usize,
}

impl Default for Compression {
    fn default() -> Self {
        Self {
            threshold: 256,
            enabled: true,
            max_unpacked_size: Self::limit_for_frame(crate::framing::DEFAULT_MAX_FRAME_SIZE),
        }
    }
}

impl Compression {
    /// Never compress.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Prefixes `body` with a flag byte, compressing it first if it is large
    /// enough and compression actually shrinks it.
    pub fn pack(&self, body: &[u8]) -> Vec<u8> {
        if self.enabled && body.len() >= self.threshold {
            let compressed = compress_prepend_size(body);
            if compressed.len() < body.len() {
                let mut out = Vec::with_capacity(1 + compressed.len());
                out.push(FLAG_LZ4);
                out.extend_from_slice(&compressed);
                return out;
            }
        }
        let mut out = Vec::with_capacity(1 + body.len());
        out.push(FLAG_RAW);
        out.extend_from_slice(body);
        out
    }

    /// Unpack ceiling matching a transport frame limit.
    pub fn limit_for_frame(max_frame_size: u32) -> usize {
        usize::try_from(max_frame_size)
            .unwrap_or(usize::MAX)
            .saturating_mul(MAX_EXPANSION)
    }

    /// Reverses [`Compression::pack`]. The flag byte decides whether to
    /// decompress; only `max_unpacked_size` is read from `self`.
    pub fn unpack(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        let (&flag, rest) = data.split_first().ok_or(CompressionError::MissingFlag)?;
        match flag {
            FLAG_RAW => Ok(rest.to_vec()),
            FLAG_LZ4 => {
                let prefix: [u8; 4] = rest
                    .get(..4)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(|| CompressionError::Corrupt("missing size prefix".into()))?;
                let size = usize::try_from(u32::from_le_bytes(prefix)).unwrap_or(usize::MAX);
                if size > self.max_unpacked_size {
                    return Err(CompressionError::TooLarge {
                        size,
                        max: self.max_unpacked_size,
                    });
                }
                decompress_size_prepended(rest)
                    .map_err(|e| CompressionError::Corrupt(e.to_string()))
            }
            other => Err(CompressionError::UnknownFlag(other)),
        }
    }
}

/// Failures unpacking a flagged body.
#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    /// Zero-length input.
    #[error("missing compression flag")]
    MissingFlag,
    /// LZ4 data did not decode.
    #[error("corrupt LZ4 body: {0}")]
    Corrupt(String),
    /// Flag byte is neither raw nor LZ4.
    #[error("unknown compression flag 0x{0:02X}")]
    UnknownFlag(u8),
    /// The declared uncompressed size exceeds the configured ceiling.
    #[error("declared size {size} exceeds limit {max}")]
    TooLarge {
        /// Size claimed by the LZ4 prefix.
        size: usize,
        /// Configured ceiling.
        max: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_body_sent_raw() {
        let packed = Compression::default().pack(b"pong");
        assert_eq!(packed[0], FLAG_RAW);
        assert_eq!(&packed[1..], b"pong");
    }

    #[test]
    fn test_repetitive_body_compressed() {
        let body = vec![0u8; 4096];
        let packed = Compression::default().pack(&body);
        assert_eq!(packed[0], FLAG_LZ4);
        assert!(packed.len() < body.len() / 4);
        assert_eq!(Compression::default().unpack(&packed).unwrap(), body);
    }

    #[test]
    fn test_incompressible_body_falls_back_to_raw() {
        // Pseudo-random bytes do not shrink under LZ4.
        let mut state = 0x1234_5678u32;
        let body: Vec<u8> = (0..512)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect();
        let packed = Compression::default().pack(&body);
        assert_eq!(packed[0], FLAG_RAW);
        assert_eq!(Compression::default().unpack(&packed).unwrap(), body);
    }

    #[test]
    fn test_disabled_never_compresses() {
        let body = vec![7u8; 2048];
        let packed = Compression::disabled().pack(&body);
        assert_eq!(packed[0], FLAG_RAW);
        assert_eq!(packed.len(), body.len() + 1);
    }

    #[test]
    fn test_unpack_errors() {
        assert!(matches!(
            Compression::default().unpack(&[]),
            Err(CompressionError::MissingFlag)
        ));
        assert!(matches!(
            Compression::default().unpack(&[0x7F, 1, 2]),
            Err(CompressionError::UnknownFlag(0x7F))
        ));
        assert!(matches!(
            Compression::default().unpack(&[FLAG_LZ4, 10, 0, 0, 0, 0xF0]),
            Err(CompressionError::Corrupt(_))
        ));
        assert!(matches!(
            Compression::default().unpack(&[FLAG_LZ4, 10]),
            Err(CompressionError::Corrupt(_))
        ));
    }

    #[test]
    fn test_declared_size_over_limit_rejected() {
        // Eight bytes claiming a 4 GiB body.
        let hostile = [FLAG_LZ4, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00];
        assert!(matches!(
            Compression::default().unpack(&hostile),
            Err(CompressionError::TooLarge { max, .. }) if max == 16 << 20
        ));

        let body = vec![3u8; 4096];
        let packed = Compression::default().pack(&body);
        let tight = Compression {
            max_unpacked_size: 1024,
            ..Compression::default()
        };
        assert!(matches!(
            tight.unpack(&packed),
            Err(CompressionError::TooLarge { size: 4096, max: 1024 })
        ));
        assert_eq!(Compression::default().unpack(&packed).unwrap(), body);
    }
}
