//! Composite (row) types mapped onto plain Rust structs.
//!
//! Binary record format:
//! - member count (4 bytes, i32)
//! - per member, in declaration order: OID (4), length (4, -1 = NULL), payload
//!
//! [`CompositeHandler`] is itself a [`PgTypeHandler`], so a composite can be a
//! member of another composite, optionally wrapped in `Option`.
//!
//! ```ignore
//! #[derive(Debug, Clone, Default)]
//! struct Point { x: i32, y: i32 }
//! impl_pg_member!(Point);
//!
//! let handler = CompositeHandler::<Point>::builder("point_t", point_oid)
//!     .field("x", Int4Handler, |p| &p.x, |p| &mut p.x)
//!     .field("y", Int4Handler, |p| &p.y, |p| &mut p.y)
//!     .build()?;
//! ```

pub mod member;

pub use member::{CompositeMemberHandler, CompositeStructMember, Getter, MEMBER_HEADER_LEN, Setter};

use std::sync::Arc;

use async_trait::async_trait;

use super::handler::{PgMember, PgTypeHandler};
use super::length_cache::LengthCache;
use crate::error::{PgError, PgResult};
use crate::protocol::{ReadBuffer, WriteBuffer};

/// Codec for a whole composite record of host type `C`.
pub struct CompositeHandler<C> {
    pg_name: String,
    oid: u32,
    members: Vec<Box<dyn CompositeMemberHandler<C>>>,
}

impl<C> CompositeHandler<C>
where
    C: Default + Send + Sync + 'static,
{
    pub fn builder(pg_name: impl Into<String>, oid: u32) -> CompositeHandlerBuilder<C> {
        CompositeHandlerBuilder {
            pg_name: pg_name.into(),
            oid,
            members: Vec::new(),
            error: None,
        }
    }

    pub fn members(&self) -> impl Iterator<Item = &dyn CompositeMemberHandler<C>> {
        self.members.iter().map(|m| m.as_ref())
    }

    /// Read one length-prefixed record. `None` for a NULL record.
    pub async fn read_record(&self, buf: &mut ReadBuffer, may_suspend: bool) -> PgResult<Option<C>> {
        buf.ensure(4, may_suspend).await?;
        if !may_suspend {
            if let Some(len) = buf.peek_i32(0).and_then(|l| usize::try_from(l).ok()) {
                buf.ensure(4 + len, false).await?;
            }
        }
        let len = buf.read_i32();
        if len == -1 {
            return Ok(None);
        }
        let Ok(len) = usize::try_from(len) else {
            buf.mark_broken();
            return Err(PgError::Protocol(format!("negative record length {}", len)));
        };
        self.read(buf, len, may_suspend).await.map(Some)
    }

    /// Probe, rewind, then write one length-prefixed record.
    /// Returns the payload length (prefix excluded).
    pub async fn write_record(&self, value: &C, buf: &mut WriteBuffer, may_suspend: bool) -> PgResult<usize> {
        let mut cache = LengthCache::new();
        let len = self.validate_and_get_length(value, &mut cache)?;
        cache.rewind();
        self.write_with_length(value, buf, &mut cache, may_suspend).await?;
        Ok(len)
    }
}

#[async_trait]
impl<C> PgTypeHandler<C> for CompositeHandler<C>
where
    C: Default + Send + Sync + 'static,
{
    fn pg_name(&self) -> &str {
        &self.pg_name
    }

    fn oid(&self) -> u32 {
        self.oid
    }

    async fn read(&self, buf: &mut ReadBuffer, len: usize, may_suspend: bool) -> PgResult<C> {
        if !may_suspend {
            buf.ensure(len, false).await?;
        }
        buf.ensure(4, may_suspend).await?;
        let start = buf.position();
        let count = buf.read_i32();
        if usize::try_from(count).ok() != Some(self.members.len()) {
            buf.mark_broken();
            return Err(PgError::Protocol(format!(
                "composite {} has {} members, record carries {}",
                self.pg_name,
                self.members.len(),
                count
            )));
        }
        tracing::trace!(composite = %self.pg_name, len, count, "reading composite record");

        let mut composite = C::default();
        for member in &self.members {
            if let Err(e) = member.read(&mut composite, buf, may_suspend).await {
                let e = buf.abort_frame(e);
                if !e.is_fatal() {
                    // Member frames so far are intact: drop the rest of the record.
                    let consumed = buf.position() - start;
                    let Some(rest) = len.checked_sub(consumed) else {
                        buf.mark_broken();
                        return Err(e);
                    };
                    if let Err(skip) = buf.skip(rest, may_suspend).await {
                        return Err(buf.abort_frame(skip));
                    }
                }
                return Err(e);
            }
        }

        let consumed = buf.position() - start;
        if consumed != len {
            buf.mark_broken();
            return Err(PgError::Protocol(format!(
                "composite {} record declared {} bytes, members consumed {}",
                self.pg_name, len, consumed
            )));
        }
        Ok(composite)
    }

    fn validate_and_get_length(&self, value: &C, cache: &mut LengthCache) -> PgResult<usize> {
        if cache.is_populated() {
            if let Some(len) = cache.get() {
                return Ok(len);
            }
        }

        let slot = cache.placeholder();
        let mut len = 4;
        for member in &self.members {
            len += MEMBER_HEADER_LEN + member.validate_and_get_length(value, cache)?;
        }
        Ok(cache.fill(slot, len))
    }

    async fn write(
        &self,
        value: &C,
        buf: &mut WriteBuffer,
        cache: &mut LengthCache,
        may_suspend: bool,
    ) -> PgResult<()> {
        let count = i32::try_from(self.members.len()).map_err(|_| {
            PgError::InvalidData(format!("composite {} has too many members", self.pg_name))
        })?;
        buf.reserve(4, may_suspend).await?;
        buf.write_i32(count);
        for member in &self.members {
            if let Err(e) = member.write(value, buf, cache, may_suspend).await {
                return Err(buf.abort_frame(e));
            }
        }
        Ok(())
    }
}

/// Registers members in declaration order. The first registration error is
/// kept and reported by [`build`](Self::build).
pub struct CompositeHandlerBuilder<C> {
    pg_name: String,
    oid: u32,
    members: Vec<Box<dyn CompositeMemberHandler<C>>>,
    error: Option<PgError>,
}

impl<C> CompositeHandlerBuilder<C>
where
    C: Default + Send + Sync + 'static,
{
    /// A directly addressable struct field.
    pub fn field<M, H>(
        mut self,
        name: impl Into<String>,
        codec: H,
        get: fn(&C) -> &M,
        get_mut: fn(&mut C) -> &mut M,
    ) -> Self
    where
        M: PgMember + Clone,
        H: PgTypeHandler<M::Underlying> + 'static,
    {
        let member = CompositeStructMember::<C, M>::field(name, Arc::new(codec), get, get_mut);
        self.members.push(Box::new(member));
        self
    }

    /// Computed member with both accessors.
    pub fn property<M, H>(
        self,
        name: impl Into<String>,
        codec: H,
        get: impl Fn(&C) -> M + Send + Sync + 'static,
        set: impl Fn(&mut C, M) + Send + Sync + 'static,
    ) -> Self
    where
        M: PgMember,
        H: PgTypeHandler<M::Underlying> + 'static,
    {
        self.accessors::<M, H>(name, codec, Some(Box::new(get)), Some(Box::new(set)))
    }

    /// Member that can be written but never read back.
    pub fn getter_only<M, H>(
        self,
        name: impl Into<String>,
        codec: H,
        get: impl Fn(&C) -> M + Send + Sync + 'static,
    ) -> Self
    where
        M: PgMember,
        H: PgTypeHandler<M::Underlying> + 'static,
    {
        self.accessors::<M, H>(name, codec, Some(Box::new(get)), None)
    }

    /// Member that can be read but never written.
    pub fn setter_only<M, H>(
        self,
        name: impl Into<String>,
        codec: H,
        set: impl Fn(&mut C, M) + Send + Sync + 'static,
    ) -> Self
    where
        M: PgMember,
        H: PgTypeHandler<M::Underlying> + 'static,
    {
        self.accessors::<M, H>(name, codec, None, Some(Box::new(set)))
    }

    /// Raw accessor pair, either side optional.
    pub fn accessors<M, H>(
        mut self,
        name: impl Into<String>,
        codec: H,
        get: Option<Getter<C, M>>,
        set: Option<Setter<C, M>>,
    ) -> Self
    where
        M: PgMember,
        H: PgTypeHandler<M::Underlying> + 'static,
    {
        match CompositeStructMember::<C, M>::property(name, Arc::new(codec), get, set) {
            Ok(member) => self.members.push(Box::new(member)),
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
        self
    }

    /// A hand-written member codec.
    pub fn member(mut self, member: Box<dyn CompositeMemberHandler<C>>) -> Self {
        self.members.push(member);
        self
    }

    pub fn build(self) -> PgResult<CompositeHandler<C>> {
        if let Some(e) = self.error {
            return Err(e);
        }
        tracing::debug!(
            composite = %self.pg_name,
            oid = self.oid,
            members = self.members.len(),
            "registered composite type"
        );
        Ok(CompositeHandler {
            pg_name: self.pg_name,
            oid: self.oid,
            members: self.members,
        })
    }
}
