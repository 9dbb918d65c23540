//! Null channel around a primitive codec for `Option<V>` members.
//!
//! Generic call sites only know the logical type `T`. Whether `T` wraps some
//! value type `V` is decided by [`PgMember::underlying_type`]; when it does, one
//! dispatcher bound to `V` is built on first use and cached process-wide, keyed
//! by `TypeId::of::<T>()`.
//!
//! The cache is an `ArcSwap<HashMap>` filled with compare-and-swap, never a lock.
//! Two threads racing on a cold `T` may each build a dispatcher; whichever swap
//! lands first is kept and the other is dropped. That is only sound while
//! dispatchers hold nothing but their binding to `V`. A dispatcher that grows
//! mutable state needs a real once-cell here.
//!
//! Callers check [`exists`] first. Every other function panics for a `T` with
//! no underlying type.
//!
//! ```ignore
//! let value: M = if nullable::exists::<M>() {
//!     nullable::read_async::<M>(codec, &mut buf, len, true).await?
//! } else {
//!     M::from_underlying(codec.read(&mut buf, len, true).await?)
//! };
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, LazyLock};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use futures::FutureExt;

use super::handler::{PgMember, PgTypeHandler, UnderlyingType};
use super::length_cache::LengthCache;
use crate::error::{PgError, PgResult};
use crate::protocol::{ReadBuffer, WriteBuffer};

/// Dispatcher for one optional logical type `T`, bound to its underlying type.
#[async_trait]
pub trait NullableHandler<T: PgMember>: Send + Sync {
    fn underlying(&self) -> UnderlyingType;

    async fn read(
        &self,
        codec: &dyn PgTypeHandler<T::Underlying>,
        buf: &mut ReadBuffer,
        len: usize,
        may_suspend: bool,
    ) -> PgResult<T>;

    fn validate_and_get_length(
        &self,
        codec: &dyn PgTypeHandler<T::Underlying>,
        value: &T,
        cache: &mut LengthCache,
    ) -> PgResult<usize>;

    async fn write(
        &self,
        codec: &dyn PgTypeHandler<T::Underlying>,
        value: &T,
        buf: &mut WriteBuffer,
        cache: &mut LengthCache,
        may_suspend: bool,
    ) -> PgResult<()>;
}

// ==================== Option<V> ====================

struct UnderlyingHandler<V> {
    _marker: PhantomData<fn() -> V>,
}

#[async_trait]
impl<V> NullableHandler<Option<V>> for UnderlyingHandler<V>
where
    V: PgMember<Underlying = V>,
{
    fn underlying(&self) -> UnderlyingType {
        UnderlyingType::of::<V>()
    }

    // NULL never reaches here: the framing layer skips the read on length -1.
    async fn read(
        &self,
        codec: &dyn PgTypeHandler<V>,
        buf: &mut ReadBuffer,
        len: usize,
        may_suspend: bool,
    ) -> PgResult<Option<V>> {
        codec.read(buf, len, may_suspend).await.map(Some)
    }

    fn validate_and_get_length(
        &self,
        codec: &dyn PgTypeHandler<V>,
        value: &Option<V>,
        cache: &mut LengthCache,
    ) -> PgResult<usize> {
        match value {
            Some(v) => codec.validate_and_get_length(v, cache),
            None => Ok(0),
        }
    }

    async fn write(
        &self,
        codec: &dyn PgTypeHandler<V>,
        value: &Option<V>,
        buf: &mut WriteBuffer,
        cache: &mut LengthCache,
        may_suspend: bool,
    ) -> PgResult<()> {
        match value {
            Some(v) => codec.write_with_length(v, buf, cache, may_suspend).await,
            None => {
                buf.reserve(4, may_suspend).await?;
                buf.write_null();
                Ok(())
            }
        }
    }
}

impl<V> PgMember for Option<V>
where
    V: PgMember<Underlying = V>,
{
    type Underlying = V;

    fn underlying_type() -> Option<UnderlyingType> {
        Some(UnderlyingType::of::<V>())
    }

    #[inline]
    fn from_underlying(value: V) -> Self {
        Some(value)
    }

    #[inline]
    fn as_underlying(&self) -> Option<&V> {
        self.as_ref()
    }

    fn create_nullable_handler() -> Option<Arc<dyn NullableHandler<Self>>> {
        Some(Arc::new(UnderlyingHandler::<V> {
            _marker: PhantomData,
        }))
    }
}

// ==================== Dispatcher table ====================

type DispatcherTable = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

static DISPATCHERS: LazyLock<ArcSwap<DispatcherTable>> =
    LazyLock::new(|| ArcSwap::from_pointee(HashMap::new()));

fn lookup<T: PgMember>(table: &DispatcherTable) -> Option<Arc<dyn NullableHandler<T>>> {
    table
        .get(&TypeId::of::<T>())
        .and_then(|entry| entry.downcast_ref::<Arc<dyn NullableHandler<T>>>())
        .cloned()
}

/// The cached dispatcher for `T`, building it on first use.
/// `None` when `T` has no underlying type.
pub fn dispatcher<T: PgMember>() -> Option<Arc<dyn NullableHandler<T>>> {
    let underlying = T::underlying_type()?;

    if let Some(handler) = lookup::<T>(&DISPATCHERS.load()) {
        return Some(handler);
    }

    let created = T::create_nullable_handler()?;
    tracing::debug!(
        logical = std::any::type_name::<T>(),
        underlying = underlying.name,
        "built nullable dispatcher"
    );
    let entry: Arc<dyn Any + Send + Sync> = Arc::new(created.clone());

    loop {
        let current = DISPATCHERS.load_full();
        if let Some(existing) = lookup::<T>(&current) {
            return Some(existing);
        }

        let mut next = (*current).clone();
        next.insert(TypeId::of::<T>(), entry.clone());
        let previous = DISPATCHERS.compare_and_swap(&current, Arc::new(next));
        if Arc::ptr_eq(&previous, &current) {
            return Some(created);
        }
    }
}

fn instance<T: PgMember>() -> Arc<dyn NullableHandler<T>> {
    match dispatcher::<T>() {
        Some(handler) => handler,
        None => panic!(
            "{} is not an optional value type; check nullable::exists first",
            std::any::type_name::<T>()
        ),
    }
}

// ==================== Call-site API ====================

/// True iff `T` is an optional value type.
#[inline]
pub fn exists<T: PgMember>() -> bool {
    T::underlying_type().is_some()
}

/// Decode `len` bytes without suspending. Fails with
/// [`PgError::WouldSuspend`] when the bytes are not buffered yet.
pub fn read<T: PgMember>(
    codec: &dyn PgTypeHandler<T::Underlying>,
    buf: &mut ReadBuffer,
    len: usize,
) -> PgResult<T> {
    let available = buf.remaining();
    read_async::<T>(codec, buf, len, false)
        .now_or_never()
        .unwrap_or(Err(PgError::WouldSuspend { needed: len, available }))
}

pub async fn read_async<T: PgMember>(
    codec: &dyn PgTypeHandler<T::Underlying>,
    buf: &mut ReadBuffer,
    len: usize,
    may_suspend: bool,
) -> PgResult<T> {
    instance::<T>().read(codec, buf, len, may_suspend).await
}

/// `0` for "no value"; the framing layer then emits the NULL sentinel.
pub fn validate_and_get_length<T: PgMember>(
    codec: &dyn PgTypeHandler<T::Underlying>,
    value: &T,
    cache: &mut LengthCache,
) -> PgResult<usize> {
    instance::<T>().validate_and_get_length(codec, value, cache)
}

pub async fn write_async<T: PgMember>(
    codec: &dyn PgTypeHandler<T::Underlying>,
    value: &T,
    buf: &mut WriteBuffer,
    cache: &mut LengthCache,
    may_suspend: bool,
) -> PgResult<()> {
    instance::<T>().write(codec, value, buf, cache, may_suspend).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BufferConfig;
    use crate::types::primitives::{Int4Handler, TextHandler};
    use pretty_assertions::assert_eq;

    fn sink() -> WriteBuffer {
        WriteBuffer::new(tokio::io::sink(), &BufferConfig::default())
    }

    #[test]
    fn test_exists() {
        assert!(exists::<Option<i32>>());
        assert!(exists::<Option<String>>());
        assert!(!exists::<i32>());
        assert!(!exists::<String>());
        assert!(!exists::<Vec<u8>>());
    }

    #[test]
    fn test_dispatcher_is_cached() {
        let first = dispatcher::<Option<i16>>().unwrap();
        let second = dispatcher::<Option<i16>>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.underlying(), UnderlyingType::of::<i16>());
        assert!(dispatcher::<i16>().is_none());
    }

    #[test]
    fn test_concurrent_first_use() {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| {
                    let handler = dispatcher::<Option<f32>>().unwrap();
                    let mut cache = LengthCache::new();
                    let codec = crate::types::primitives::Float4Handler;
                    handler
                        .validate_and_get_length(&codec, &Some(1.5), &mut cache)
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 4);
        }
        let cached = dispatcher::<Option<f32>>().unwrap();
        assert!(Arc::ptr_eq(&cached, &dispatcher::<Option<f32>>().unwrap()));
    }

    #[test]
    fn test_sync_read() {
        let mut buf = ReadBuffer::from_bytes(42i32.to_be_bytes());
        let value = read::<Option<i32>>(&Int4Handler, &mut buf, 4).unwrap();
        assert_eq!(value, Some(42));
    }

    #[test]
    fn test_sync_read_would_suspend() {
        let mut buf = ReadBuffer::from_bytes([0, 0]);
        let err = read::<Option<i32>>(&Int4Handler, &mut buf, 4).unwrap_err();
        assert!(matches!(err, PgError::WouldSuspend { needed: 4, available: 2 }));
    }

    #[test]
    fn test_length_of_none_is_zero() {
        let mut cache = LengthCache::new();
        assert_eq!(validate_and_get_length::<Option<String>>(&TextHandler, &None, &mut cache).unwrap(), 0);
        assert_eq!(
            validate_and_get_length::<Option<String>>(&TextHandler, &Some("hello".into()), &mut cache)
                .unwrap(),
            5
        );
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_write_none_emits_null_sentinel() {
        let mut buf = sink();
        let mut cache = LengthCache::new();
        write_async::<Option<i32>>(&Int4Handler, &None, &mut buf, &mut cache, true)
            .await
            .unwrap();
        assert_eq!(buf.pending(), &[0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[tokio::test]
    async fn test_write_some_is_length_prefixed() {
        let mut buf = sink();
        let mut cache = LengthCache::new();
        write_async::<Option<i32>>(&Int4Handler, &Some(3), &mut buf, &mut cache, false)
            .await
            .unwrap();
        assert_eq!(buf.pending(), &[0, 0, 0, 4, 0, 0, 0, 3]);
    }

    #[test]
    #[should_panic(expected = "not an optional value type")]
    fn test_precondition_violation_panics() {
        let mut cache = LengthCache::new();
        let _ = validate_and_get_length::<i32>(&Int4Handler, &1, &mut cache);
    }
}
