//! Suspend-capable write side of the buffered transport.
//!
//! Writes land in a pending segment (NO SYSCALL) bounded by the configured
//! size; [`WriteBuffer::flush`] is the only point that touches the stream.

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::config::BufferConfig;
use crate::error::{PgError, PgResult};

/// Buffered writer over an async byte sink.
pub struct WriteBuffer {
    stream: Box<dyn AsyncWrite + Send + Unpin>,
    buffer: BytesMut,
    segment_size: usize,
    broken: bool,
}

impl WriteBuffer {
    /// Wrap an async byte sink.
    pub fn new<S>(stream: S, config: &BufferConfig) -> Self
    where
        S: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            stream: Box::new(stream),
            buffer: BytesMut::with_capacity(config.write_buffer_size),
            segment_size: config.write_buffer_size,
            broken: false,
        }
    }

    /// Bytes free in the current unflushed segment.
    #[inline]
    pub fn space_left(&self) -> usize {
        self.segment_size.saturating_sub(self.buffer.len())
    }

    /// Bytes written but not yet flushed.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Poison the stream, e.g. after a write cycle was cancelled mid-field.
    pub fn mark_broken(&mut self) {
        if !self.broken {
            tracing::warn!(pending = self.buffer.len(), "write stream marked broken");
            self.broken = true;
        }
    }

    /// Called once part of a frame sits in the segment. A suspension from
    /// here on would leave a truncated frame to be flushed later, so it
    /// poisons the stream instead.
    pub fn abort_frame(&mut self, err: PgError) -> PgError {
        match err {
            PgError::WouldSuspend { .. } => {
                self.mark_broken();
                PgError::Connection(format!("write abandoned mid-frame: {}", err))
            }
            other => other,
        }
    }

    /// Transmit the pending segment.
    ///
    /// With `may_suspend == false` a non-empty segment fails with
    /// [`PgError::WouldSuspend`] instead of awaiting the stream.
    pub async fn flush(&mut self, may_suspend: bool) -> PgResult<()> {
        if self.broken {
            return Err(PgError::Connection("connection is broken".to_string()));
        }
        if self.buffer.is_empty() {
            return Ok(());
        }
        if !may_suspend {
            return Err(PgError::WouldSuspend {
                needed: self.buffer.len(),
                available: self.space_left(),
            });
        }

        // Dropping this future mid-write leaves a partial segment on the wire;
        // the broken flag is the only record of it.
        self.broken = true;
        self.stream.write_all(&self.buffer).await?;
        self.stream.flush().await?;
        self.broken = false;

        tracing::trace!(flushed = self.buffer.len(), "flushed write buffer");
        self.buffer.clear();
        Ok(())
    }

    /// Flush first if fewer than `count` bytes are free in the segment.
    pub async fn reserve(&mut self, count: usize, may_suspend: bool) -> PgResult<()> {
        if self.space_left() < count {
            self.flush(may_suspend).await?;
        }
        Ok(())
    }

    // ==================== Header writes ====================
    //
    // Callers check `space_left` first; the segment grows rather than fail.

    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.put_u8(value);
    }

    #[inline]
    pub fn write_i16(&mut self, value: i16) {
        self.buffer.put_i16(value);
    }

    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.buffer.put_u32(value);
    }

    #[inline]
    pub fn write_i32(&mut self, value: i32) {
        self.buffer.put_i32(value);
    }

    #[inline]
    pub fn write_i64(&mut self, value: i64) {
        self.buffer.put_i64(value);
    }

    #[inline]
    pub fn write_f32(&mut self, value: f32) {
        self.buffer.put_f32(value);
    }

    #[inline]
    pub fn write_f64(&mut self, value: f64) {
        self.buffer.put_f64(value);
    }

    /// NULL: length = -1, no payload.
    #[inline]
    pub fn write_null(&mut self) {
        self.buffer.put_i32(-1);
    }

    /// Copy `data` into the segment, flushing whenever it fills up.
    pub async fn write_bytes(&mut self, mut data: &[u8], may_suspend: bool) -> PgResult<()> {
        while !data.is_empty() {
            if self.space_left() == 0 {
                self.flush(may_suspend).await?;
            }
            let n = self.space_left().min(data.len());
            self.buffer.extend_from_slice(&data[..n]);
            data = &data[n..];
        }
        Ok(())
    }
}
