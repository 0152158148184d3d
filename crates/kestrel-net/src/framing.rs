//! Length-prefixed frames over a byte stream.
//!
//! Each frame is a `u32` little-endian length followed by that many bytes.
//! The length excludes the prefix itself. Zero-length frames are legal and
//! are skipped by the connection loops.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default upper bound on a single frame: 1 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 1 << 20;

/// Framing limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    /// Largest accepted or emitted frame body, in bytes.
    pub max_frame_size: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Framing failures. All of them end the connection.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Declared or actual body size is over the limit.
    #[error("frame of {size} bytes exceeds limit {max}")]
    TooLarge {
        /// Offending size.
        size: u64,
        /// Configured limit.
        max: u32,
    },
    /// The stream ended inside a frame.
    #[error("stream ended mid-frame")]
    Truncated,
    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Reads frames from an async byte stream.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    config: FrameConfig,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wraps `inner`.
    pub fn new(inner: R, config: FrameConfig) -> Self {
        Self { inner, config }
    }

    /// Reads the next frame. `Ok(None)` means the peer closed the stream
    /// cleanly on a frame boundary.
    pub async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let mut prefix = [0u8; 4];
        let mut filled = 0;
        while filled < prefix.len() {
            let n = self.inner.read(&mut prefix[filled..]).await?;
            if n == 0 {
                return if filled == 0 {
                    Ok(None)
                } else {
                    Err(FrameError::Truncated)
                };
            }
            filled += n;
        }

        let len = u32::from_le_bytes(prefix);
        if len > self.config.max_frame_size {
            return Err(FrameError::TooLarge {
                size: u64::from(len),
                max: self.config.max_frame_size,
            });
        }

        let mut body = vec![0u8; len as usize];
        self.inner.read_exact(&mut body).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                FrameError::Truncated
            } else {
                FrameError::Io(e)
            }
        })?;
        Ok(Some(body))
    }
}

/// Writes frames to an async byte stream.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
    config: FrameConfig,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Wraps `inner`.
    pub fn new(inner: W, config: FrameConfig) -> Self {
        Self { inner, config }
    }

    /// Writes one frame and flushes.
    pub async fn send(&mut self, body: &[u8]) -> Result<(), FrameError> {
        let len = u32::try_from(body.len())
            .ok()
            .filter(|&len| len <= self.config.max_frame_size)
            .ok_or(FrameError::TooLarge {
                size: body.len() as u64,
                max: self.config.max_frame_size,
            })?;

        self.inner.write_all(&len.to_le_bytes()).await?;
        self.inner.write_all(body).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Flushes and shuts down the write side.
    pub async fn close(&mut self) -> Result<(), FrameError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}
