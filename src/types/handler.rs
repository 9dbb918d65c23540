//! Primitive codec contract and the shape of member types.

use std::any::TypeId;
use std::sync::Arc;

use async_trait::async_trait;

use super::length_cache::LengthCache;
use super::nullable::NullableHandler;
use crate::error::{PgError, PgResult};
use crate::protocol::{ReadBuffer, WriteBuffer};

/// Binary codec for one PostgreSQL type, producing and consuming `V`.
#[async_trait]
pub trait PgTypeHandler<V>: Send + Sync
where
    V: Send + Sync,
{
    /// PostgreSQL type name (e.g. `int4`).
    fn pg_name(&self) -> &str;

    /// Type OID written in front of every composite member of this type.
    fn oid(&self) -> u32;

    /// Decode exactly `len` payload bytes.
    async fn read(&self, buf: &mut ReadBuffer, len: usize, may_suspend: bool) -> PgResult<V>;

    /// Payload length `write` will emit. Variable-length codecs go through `cache`.
    fn validate_and_get_length(&self, value: &V, cache: &mut LengthCache) -> PgResult<usize>;

    /// Emit the payload only.
    async fn write(
        &self,
        value: &V,
        buf: &mut WriteBuffer,
        cache: &mut LengthCache,
        may_suspend: bool,
    ) -> PgResult<()>;

    /// Emit the 4-byte length, then the payload.
    ///
    /// Without `may_suspend` the whole frame must fit in the segment up front,
    /// otherwise nothing is written.
    async fn write_with_length(
        &self,
        value: &V,
        buf: &mut WriteBuffer,
        cache: &mut LengthCache,
        may_suspend: bool,
    ) -> PgResult<()> {
        let len = self.validate_and_get_length(value, cache)?;
        let prefix = i32::try_from(len).map_err(|_| {
            PgError::InvalidData(format!("{} value of {} bytes exceeds i32::MAX", self.pg_name(), len))
        })?;
        if !may_suspend && buf.space_left() < 4 + len {
            return Err(PgError::WouldSuspend {
                needed: 4 + len,
                available: buf.space_left(),
            });
        }

        buf.reserve(4, may_suspend).await?;
        buf.write_i32(prefix);
        match self.write(value, buf, cache, may_suspend).await {
            Ok(()) => Ok(()),
            Err(e) => Err(buf.abort_frame(e)),
        }
    }
}

/// Identity of the value type wrapped by an optional member type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnderlyingType {
    pub id: TypeId,
    pub name: &'static str,
}

impl UnderlyingType {
    pub fn of<V: 'static>() -> Self {
        Self {
            id: TypeId::of::<V>(),
            name: std::any::type_name::<V>(),
        }
    }
}

/// A type that can sit in a composite member or be dispatched by the
/// nullable handler.
///
/// Plain value types are their own `Underlying` (use [`impl_pg_member!`]).
/// `Option<V>` has `Underlying = V` and is the only shape with a null channel.
///
/// [`impl_pg_member!`]: crate::impl_pg_member
pub trait PgMember: Sized + Send + Sync + 'static {
    type Underlying: Send + Sync + 'static;

    /// `Some` iff `Self` carries a null channel around another value type.
    fn underlying_type() -> Option<UnderlyingType> {
        None
    }

    fn from_underlying(value: Self::Underlying) -> Self;

    /// `None` means "no value".
    fn as_underlying(&self) -> Option<&Self::Underlying>;

    /// Build a dispatcher bound to the underlying type. Called at most a few
    /// times per type; the result is cached by [`super::nullable`].
    fn create_nullable_handler() -> Option<Arc<dyn NullableHandler<Self>>> {
        None
    }
}

/// Implement [`PgMember`] for plain (non-optional) value types.
///
/// ```ignore
/// #[derive(Debug, Clone, Default)]
/// struct Point { x: i32, y: i32 }
/// qail_pg_types::impl_pg_member!(Point);
/// ```
#[macro_export]
macro_rules! impl_pg_member {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::types::PgMember for $ty {
                type Underlying = $ty;

                #[inline]
                fn from_underlying(value: $ty) -> Self {
                    value
                }

                #[inline]
                fn as_underlying(&self) -> Option<&$ty> {
                    Some(self)
                }
            }
        )*
    };
}

impl_pg_member!(bool, i16, i32, i64, f32, f64, String, Vec<u8>);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_shape() {
        assert!(i32::underlying_type().is_none());
        assert_eq!(i32::from_underlying(7), 7);
        assert_eq!(7i32.as_underlying(), Some(&7));
        assert!(i32::create_nullable_handler().is_none());
    }

    #[test]
    fn test_optional_shape() {
        let underlying = Option::<i64>::underlying_type().unwrap();
        assert_eq!(underlying, UnderlyingType::of::<i64>());
        assert_eq!(Option::<i64>::from_underlying(3), Some(3));
        assert_eq!(None::<i64>.as_underlying(), None);
    }

    #[tokio::test]
    async fn test_write_with_length_checks_whole_frame_first() {
        use crate::config::BufferConfig;
        use crate::types::primitives::TextHandler;

        let config = BufferConfig::builder().write_buffer_size(16).build().unwrap();
        let mut buf = WriteBuffer::new(tokio::io::sink(), &config);
        buf.write_u32(25);

        let mut cache = LengthCache::new();
        let err = TextHandler
            .write_with_length(&"twelve bytes".to_string(), &mut buf, &mut cache, false)
            .await
            .unwrap_err();
        assert!(matches!(err, PgError::WouldSuspend { needed: 16, available: 12 }));
        assert_eq!(buf.pending(), &[0, 0, 0, 25]);
        assert!(!buf.is_broken());
    }
}
