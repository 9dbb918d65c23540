//! One declared member of a composite whose host is a plain Rust struct.
//!
//! Wire frame per member:
//! - type OID (4 bytes, u32)
//! - length (4 bytes, i32, -1 for NULL)
//! - payload (`length` bytes, absent for NULL)
//!
//! The host has no shared identity, so reads only ever go through `&mut C`.
//! Accessors are bound once at registration and called directly afterwards.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Accessor, PgError, PgResult};
use crate::protocol::{ReadBuffer, WriteBuffer, oid_to_name};
use crate::types::handler::{PgMember, PgTypeHandler};
use crate::types::length_cache::LengthCache;
use crate::types::nullable;

/// Size of the OID + length header in front of every member payload.
pub const MEMBER_HEADER_LEN: usize = 8;

pub type Getter<C, M> = Box<dyn Fn(&C) -> M + Send + Sync>;
pub type Setter<C, M> = Box<dyn Fn(&mut C, M) + Send + Sync>;

/// Type-erased member codec, driven in declaration order by
/// [`super::CompositeHandler`].
#[async_trait]
pub trait CompositeMemberHandler<C>: Send + Sync
where
    C: Send + Sync,
{
    fn name(&self) -> &str;

    /// OID every frame of this member must carry.
    fn type_oid(&self) -> u32;

    /// Decode one member frame into `composite` in place.
    async fn read(&self, composite: &mut C, buf: &mut ReadBuffer, may_suspend: bool) -> PgResult<()>;

    /// Reading into an owned copy would drop the result on the floor, so this
    /// always fails. Use [`read`](Self::read).
    fn read_by_value(&self, composite: C, buf: &mut ReadBuffer) -> PgResult<()>;

    /// Emit OID, length and payload for this member of `composite`.
    async fn write(
        &self,
        composite: &C,
        buf: &mut WriteBuffer,
        cache: &mut LengthCache,
        may_suspend: bool,
    ) -> PgResult<()>;

    /// Payload bytes `write` will emit, header excluded.
    fn validate_and_get_length(&self, composite: &C, cache: &mut LengthCache) -> PgResult<usize>;
}

/// Codec for member `M` of host `C`.
pub struct CompositeStructMember<C, M: PgMember> {
    composite: &'static str,
    name: String,
    type_oid: u32,
    get: Option<Getter<C, M>>,
    set: Option<Setter<C, M>>,
    codec: Arc<dyn PgTypeHandler<M::Underlying>>,
}

impl<C, M> CompositeStructMember<C, M>
where
    C: Send + Sync + 'static,
    M: PgMember,
{
    /// Bind a directly addressable field. Both accessors are derived here,
    /// once, from the field projection.
    pub fn field(
        name: impl Into<String>,
        codec: Arc<dyn PgTypeHandler<M::Underlying>>,
        get: fn(&C) -> &M,
        get_mut: fn(&mut C) -> &mut M,
    ) -> Self
    where
        M: Clone,
    {
        Self {
            composite: short_type_name::<C>(),
            name: name.into(),
            type_oid: codec.oid(),
            get: Some(Box::new(move |c: &C| get(c).clone())),
            set: Some(Box::new(move |c: &mut C, value: M| *get_mut(c) = value)),
            codec,
        }
    }

    /// Bind an independent getter/setter pair. At least one must be present.
    pub fn property(
        name: impl Into<String>,
        codec: Arc<dyn PgTypeHandler<M::Underlying>>,
        get: Option<Getter<C, M>>,
        set: Option<Setter<C, M>>,
    ) -> PgResult<Self> {
        let name = name.into();
        let composite = short_type_name::<C>();
        if get.is_none() && set.is_none() {
            return Err(PgError::Registration {
                composite,
                member: name,
                reason: "member has neither getter nor setter",
            });
        }
        Ok(Self {
            composite,
            name,
            type_oid: codec.oid(),
            get,
            set,
            codec,
        })
    }

    fn getter(&self) -> PgResult<&Getter<C, M>> {
        self.get
            .as_ref()
            .ok_or_else(|| PgError::missing(self.composite, self.name.as_str(), Accessor::Getter))
    }

    fn setter(&self) -> PgResult<&Setter<C, M>> {
        self.set
            .as_ref()
            .ok_or_else(|| PgError::missing(self.composite, self.name.as_str(), Accessor::Setter))
    }
}

#[async_trait]
impl<C, M> CompositeMemberHandler<C> for CompositeStructMember<C, M>
where
    C: Send + Sync + 'static,
    M: PgMember,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn type_oid(&self) -> u32 {
        self.type_oid
    }

    async fn read(&self, composite: &mut C, buf: &mut ReadBuffer, may_suspend: bool) -> PgResult<()> {
        buf.ensure(MEMBER_HEADER_LEN, may_suspend).await?;
        if !may_suspend {
            // Nothing is consumed unless the whole frame is already buffered.
            if let Some(length) = buf.peek_i32(4).and_then(|l| usize::try_from(l).ok()) {
                buf.ensure(MEMBER_HEADER_LEN + length, false).await?;
            }
        }

        let oid = buf.read_u32();
        if oid != self.type_oid {
            tracing::error!(
                composite = self.composite,
                member = %self.name,
                expected = self.type_oid,
                expected_type = oid_to_name(self.type_oid),
                actual = oid,
                actual_type = oid_to_name(oid),
                "type OID mismatch in composite member"
            );
            buf.mark_broken();
            return Err(PgError::ProtocolAssertion {
                composite: self.composite,
                member: self.name.clone(),
                expected: self.type_oid,
                actual: oid,
            });
        }

        let length = buf.read_i32();
        if length == -1 {
            return Ok(());
        }
        let Ok(length) = usize::try_from(length) else {
            buf.mark_broken();
            return Err(PgError::Protocol(format!(
                "negative length {} for '{}.{}'",
                length, self.composite, self.name
            )));
        };

        let decoded = if nullable::exists::<M>() {
            nullable::read_async::<M>(&*self.codec, buf, length, may_suspend).await
        } else {
            self.codec
                .read(buf, length, may_suspend)
                .await
                .map(M::from_underlying)
        };
        let value = decoded.map_err(|e| buf.abort_frame(e))?;

        let set = self.setter()?;
        set(composite, value);
        Ok(())
    }

    fn read_by_value(&self, _composite: C, _buf: &mut ReadBuffer) -> PgResult<()> {
        Err(PgError::NotSupported(format!(
            "member {} of '{}' can only be read into a record passed by reference",
            self.name, self.composite
        )))
    }

    async fn write(
        &self,
        composite: &C,
        buf: &mut WriteBuffer,
        cache: &mut LengthCache,
        may_suspend: bool,
    ) -> PgResult<()> {
        let get = self.getter()?;

        if buf.space_left() < 4 {
            buf.flush(may_suspend).await?;
        }
        buf.write_u32(self.type_oid);

        let value = get(composite);
        let written = if nullable::exists::<M>() {
            nullable::write_async::<M>(&*self.codec, &value, buf, cache, may_suspend).await
        } else {
            match value.as_underlying() {
                Some(v) => self.codec.write_with_length(v, buf, cache, may_suspend).await,
                None => buf.reserve(4, may_suspend).await.map(|()| buf.write_null()),
            }
        };
        written.map_err(|e| buf.abort_frame(e))
    }

    fn validate_and_get_length(&self, composite: &C, cache: &mut LengthCache) -> PgResult<usize> {
        let get = self.getter()?;
        let value = get(composite);
        if nullable::exists::<M>() {
            nullable::validate_and_get_length::<M>(&*self.codec, &value, cache)
        } else {
            match value.as_underlying() {
                Some(v) => self.codec.validate_and_get_length(v, cache),
                None => Ok(0),
            }
        }
    }
}

/// `my_crate::model::Point` → `Point`, `Wrapper<T>` → `Wrapper`.
fn short_type_name<C>() -> &'static str {
    let full = std::any::type_name::<C>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
