//! Binary codecs for the built-in scalar types.
//!
//! Only the binary format is spoken here: composite members always travel in
//! binary, big-endian.

use async_trait::async_trait;

use super::handler::PgTypeHandler;
use super::length_cache::LengthCache;
use crate::error::{PgError, PgResult};
use crate::protocol::types::oid;
use crate::protocol::{ReadBuffer, WriteBuffer};

/// Consume a payload of the wrong size so the stream stays aligned, then fail.
async fn reject_length(
    buf: &mut ReadBuffer,
    pg_name: &str,
    expected: usize,
    got: usize,
    may_suspend: bool,
) -> PgError {
    if let Err(e) = buf.ensure(got, may_suspend).await {
        return e;
    }
    let _ = buf.read_bytes(got);
    PgError::InvalidData(format!("Expected {} bytes for {}, got {}", expected, pg_name, got))
}

// ==================== Fixed-size Types ====================

macro_rules! fixed_size_handler {
    ($(#[$doc:meta])* $handler:ident, $ty:ty, $oid:expr, $name:literal, $size:literal, $read:ident, $write:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $handler;

        #[async_trait]
        impl PgTypeHandler<$ty> for $handler {
            fn pg_name(&self) -> &str {
                $name
            }

            fn oid(&self) -> u32 {
                $oid
            }

            async fn read(&self, buf: &mut ReadBuffer, len: usize, may_suspend: bool) -> PgResult<$ty> {
                if len != $size {
                    return Err(reject_length(buf, $name, $size, len, may_suspend).await);
                }
                buf.ensure($size, may_suspend).await?;
                Ok(buf.$read())
            }

            fn validate_and_get_length(&self, _value: &$ty, _cache: &mut LengthCache) -> PgResult<usize> {
                Ok($size)
            }

            async fn write(
                &self,
                value: &$ty,
                buf: &mut WriteBuffer,
                _cache: &mut LengthCache,
                may_suspend: bool,
            ) -> PgResult<()> {
                buf.reserve($size, may_suspend).await?;
                buf.$write(*value);
                Ok(())
            }
        }
    };
}

fixed_size_handler!(
    /// `int2` ⇄ `i16`
    Int2Handler, i16, oid::INT2, "int2", 2, read_i16, write_i16
);
fixed_size_handler!(
    /// `int4` ⇄ `i32`
    Int4Handler, i32, oid::INT4, "int4", 4, read_i32, write_i32
);
fixed_size_handler!(
    /// `int8` ⇄ `i64`
    Int8Handler, i64, oid::INT8, "int8", 8, read_i64, write_i64
);
fixed_size_handler!(
    /// `float4` ⇄ `f32`, IEEE 754
    Float4Handler, f32, oid::FLOAT4, "float4", 4, read_f32, write_f32
);
fixed_size_handler!(
    /// `float8` ⇄ `f64`, IEEE 754
    Float8Handler, f64, oid::FLOAT8, "float8", 8, read_f64, write_f64
);

// ==================== Boolean ====================

/// `bool` ⇄ `bool`, one byte: 0 or 1
#[derive(Debug, Clone, Copy, Default)]
pub struct BoolHandler;

#[async_trait]
impl PgTypeHandler<bool> for BoolHandler {
    fn pg_name(&self) -> &str {
        "bool"
    }

    fn oid(&self) -> u32 {
        oid::BOOL
    }

    async fn read(&self, buf: &mut ReadBuffer, len: usize, may_suspend: bool) -> PgResult<bool> {
        if len != 1 {
            return Err(reject_length(buf, "bool", 1, len, may_suspend).await);
        }
        buf.ensure(1, may_suspend).await?;
        Ok(buf.read_u8() != 0)
    }

    fn validate_and_get_length(&self, _value: &bool, _cache: &mut LengthCache) -> PgResult<usize> {
        Ok(1)
    }

    async fn write(
        &self,
        value: &bool,
        buf: &mut WriteBuffer,
        _cache: &mut LengthCache,
        may_suspend: bool,
    ) -> PgResult<()> {
        buf.reserve(1, may_suspend).await?;
        buf.write_u8(u8::from(*value));
        Ok(())
    }
}

// ==================== String Types ====================

/// `text` ⇄ `String`, UTF-8 without terminator
#[derive(Debug, Clone, Copy, Default)]
pub struct TextHandler;

#[async_trait]
impl PgTypeHandler<String> for TextHandler {
    fn pg_name(&self) -> &str {
        "text"
    }

    fn oid(&self) -> u32 {
        oid::TEXT
    }

    async fn read(&self, buf: &mut ReadBuffer, len: usize, may_suspend: bool) -> PgResult<String> {
        buf.ensure(len, may_suspend).await?;
        let bytes = buf.read_bytes(len);
        String::from_utf8(bytes.to_vec())
            .map_err(|e| PgError::InvalidData(format!("Invalid UTF-8: {}", e)))
    }

    fn validate_and_get_length(&self, value: &String, cache: &mut LengthCache) -> PgResult<usize> {
        Ok(cache.get_or_insert_with(|| value.len()))
    }

    async fn write(
        &self,
        value: &String,
        buf: &mut WriteBuffer,
        _cache: &mut LengthCache,
        may_suspend: bool,
    ) -> PgResult<()> {
        buf.write_bytes(value.as_bytes(), may_suspend).await
    }
}

// ==================== Bytes ====================

/// `bytea` ⇄ `Vec<u8>`, raw
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteaHandler;

#[async_trait]
impl PgTypeHandler<Vec<u8>> for ByteaHandler {
    fn pg_name(&self) -> &str {
        "bytea"
    }

    fn oid(&self) -> u32 {
        oid::BYTEA
    }

    async fn read(&self, buf: &mut ReadBuffer, len: usize, may_suspend: bool) -> PgResult<Vec<u8>> {
        buf.ensure(len, may_suspend).await?;
        Ok(buf.read_bytes(len).to_vec())
    }

    fn validate_and_get_length(&self, value: &Vec<u8>, _cache: &mut LengthCache) -> PgResult<usize> {
        Ok(value.len())
    }

    async fn write(
        &self,
        value: &Vec<u8>,
        buf: &mut WriteBuffer,
        _cache: &mut LengthCache,
        may_suspend: bool,
    ) -> PgResult<()> {
        buf.write_bytes(value, may_suspend).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BufferConfig;

    fn sink() -> WriteBuffer {
        WriteBuffer::new(tokio::io::sink(), &BufferConfig::default())
    }

    #[tokio::test]
    async fn test_i32_binary() {
        let mut buf = ReadBuffer::from_bytes(42i32.to_be_bytes());
        assert_eq!(Int4Handler.read(&mut buf, 4, false).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_wrong_length_consumes_payload() {
        let mut buf = ReadBuffer::from_bytes([0, 0, 1, 0xAA]);
        let err = Int2Handler.read(&mut buf, 3, false).await.unwrap_err();
        assert!(matches!(err, PgError::InvalidData(_)));
        assert_eq!(buf.remaining(), 1);
        assert_eq!(buf.read_u8(), 0xAA);
    }

    #[tokio::test]
    async fn test_bool_binary() {
        let mut buf = ReadBuffer::from_bytes([1, 0]);
        assert!(BoolHandler.read(&mut buf, 1, false).await.unwrap());
        assert!(!BoolHandler.read(&mut buf, 1, false).await.unwrap());
    }

    #[tokio::test]
    async fn test_float8_with_length() {
        let mut buf = sink();
        let mut cache = LengthCache::new();
        Float8Handler
            .write_with_length(&1.5, &mut buf, &mut cache, false)
            .await
            .unwrap();
        let mut expected = vec![0, 0, 0, 8];
        expected.extend_from_slice(&1.5f64.to_be_bytes());
        assert_eq!(buf.pending(), expected.as_slice());
    }

    #[tokio::test]
    async fn test_text_invalid_utf8() {
        let mut buf = ReadBuffer::from_bytes([0xC3, 0x28]);
        let err = TextHandler.read(&mut buf, 2, false).await.unwrap_err();
        assert!(err.to_string().contains("Invalid UTF-8"));
    }

    #[tokio::test]
    async fn test_text_length_replayed_from_cache() {
        let value = "héllo".to_string();
        let mut cache = LengthCache::new();
        assert_eq!(TextHandler.validate_and_get_length(&value, &mut cache).unwrap(), 6);
        cache.rewind();

        let mut buf = sink();
        TextHandler
            .write_with_length(&value, &mut buf, &mut cache, false)
            .await
            .unwrap();
        assert_eq!(&buf.pending()[..4], &[0, 0, 0, 6]);
        assert_eq!(&buf.pending()[4..], value.as_bytes());
    }

    #[tokio::test]
    async fn test_bytea_round_trip() {
        let mut out = sink();
        let mut cache = LengthCache::new();
        let payload = vec![0u8, 1, 2, 255];
        ByteaHandler.write(&payload, &mut out, &mut cache, false).await.unwrap();

        let mut buf = ReadBuffer::from_bytes(out.pending());
        assert_eq!(ByteaHandler.read(&mut buf, 4, false).await.unwrap(), payload);
    }
}
