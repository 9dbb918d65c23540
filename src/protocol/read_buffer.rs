//! Suspend-capable read side of the buffered transport.
//!
//! Bytes are pulled from the stream into a `BytesMut` backlog only inside
//! [`ReadBuffer::ensure`]; every `read_*` call consumes from the front of the
//! backlog. A fill that has to wait for the network therefore never moves the
//! cursor, and resuming after a suspension continues at the same byte.

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::BufferConfig;
use crate::error::{PgError, PgResult};

/// Buffered reader over an async byte source.
pub struct ReadBuffer {
    stream: Box<dyn AsyncRead + Send + Unpin>,
    buffer: BytesMut,
    fill_size: usize,
    consumed: usize,
    broken: bool,
}

impl ReadBuffer {
    /// Wrap an async byte source.
    pub fn new<S>(stream: S, config: &BufferConfig) -> Self
    where
        S: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            stream: Box::new(stream),
            buffer: BytesMut::with_capacity(config.read_buffer_size),
            fill_size: config.read_buffer_size,
            consumed: 0,
            broken: false,
        }
    }

    /// A buffer pre-filled with `bytes` and nothing behind it.
    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Self {
        let mut buf = Self::new(tokio::io::empty(), &BufferConfig::default());
        buf.buffer.extend_from_slice(bytes.as_ref());
        buf
    }

    /// Bytes buffered and not yet consumed.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes consumed since the buffer was created.
    #[inline]
    pub fn position(&self) -> usize {
        self.consumed
    }

    /// Big-endian i32 at `offset` into the buffered bytes, without consuming.
    pub fn peek_i32(&self, offset: usize) -> Option<i32> {
        let mut bytes = self.buffer.get(offset..offset.checked_add(4)?)?;
        Some(bytes.get_i32())
    }

    /// Whether a fatal protocol or transport error poisoned this stream.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Poison the stream. Every later `ensure` fails.
    pub fn mark_broken(&mut self) {
        if !self.broken {
            tracing::warn!(buffered = self.buffer.len(), "read stream marked broken");
            self.broken = true;
        }
    }

    /// Called once part of a frame has been consumed. A suspension from here
    /// on would resume mid-frame, so it poisons the stream instead.
    pub fn abort_frame(&mut self, err: PgError) -> PgError {
        match err {
            PgError::WouldSuspend { .. } => {
                self.mark_broken();
                PgError::Connection(format!("read abandoned mid-frame: {}", err))
            }
            other => other,
        }
    }

    /// Make at least `count` bytes available.
    ///
    /// With `may_suspend == false` this never awaits: it succeeds if the bytes
    /// are already buffered and fails with [`PgError::WouldSuspend`] otherwise.
    pub async fn ensure(&mut self, count: usize, may_suspend: bool) -> PgResult<()> {
        if self.broken {
            return Err(PgError::Connection("connection is broken".to_string()));
        }
        if self.buffer.len() >= count {
            return Ok(());
        }
        if !may_suspend {
            return Err(PgError::WouldSuspend {
                needed: count,
                available: self.buffer.len(),
            });
        }

        while self.buffer.len() < count {
            let missing = count - self.buffer.len();
            if self.buffer.capacity() - self.buffer.len() < missing {
                self.buffer.reserve(missing.max(self.fill_size));
            }

            let n = match self.stream.read_buf(&mut self.buffer).await {
                Ok(n) => n,
                Err(e) => {
                    self.mark_broken();
                    return Err(e.into());
                }
            };
            if n == 0 {
                self.mark_broken();
                return Err(PgError::Connection("Connection closed".to_string()));
            }
            tracing::trace!(read = n, buffered = self.buffer.len(), needed = count, "filled read buffer");
        }
        Ok(())
    }

    // ==================== Consuming reads ====================
    //
    // Callers `ensure` first; reading past the buffered bytes panics.

    #[inline]
    pub fn read_u8(&mut self) -> u8 {
        self.consumed += 1;
        self.buffer.get_u8()
    }

    #[inline]
    pub fn read_i16(&mut self) -> i16 {
        self.consumed += 2;
        self.buffer.get_i16()
    }

    #[inline]
    pub fn read_u32(&mut self) -> u32 {
        self.consumed += 4;
        self.buffer.get_u32()
    }

    #[inline]
    pub fn read_i32(&mut self) -> i32 {
        self.consumed += 4;
        self.buffer.get_i32()
    }

    #[inline]
    pub fn read_i64(&mut self) -> i64 {
        self.consumed += 8;
        self.buffer.get_i64()
    }

    #[inline]
    pub fn read_f32(&mut self) -> f32 {
        self.consumed += 4;
        self.buffer.get_f32()
    }

    #[inline]
    pub fn read_f64(&mut self) -> f64 {
        self.consumed += 8;
        self.buffer.get_f64()
    }

    /// Discard the next `count` bytes, filling first if needed.
    pub async fn skip(&mut self, count: usize, may_suspend: bool) -> PgResult<()> {
        self.ensure(count, may_suspend).await?;
        self.consumed += count;
        self.buffer.advance(count);
        Ok(())
    }

    /// Split off the next `len` bytes without copying.
    #[inline]
    pub fn read_bytes(&mut self, len: usize) -> Bytes {
        self.consumed += len;
        self.buffer.split_to(len).freeze()
    }
}
