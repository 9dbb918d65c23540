//! Type handlers: primitive codecs, nullable dispatch and composite members.
//!
//! Control flow for a composite record: [`CompositeHandler`] drives one
//! [`CompositeStructMember`] per declared field, in order; each member either
//! goes through [`nullable`] (for `Option<V>` members) or straight to its
//! [`PgTypeHandler`].

pub mod composite;
pub mod handler;
pub mod length_cache;
pub mod nullable;
pub mod primitives;

pub use composite::{
    CompositeHandler, CompositeHandlerBuilder, CompositeMemberHandler, CompositeStructMember,
};
pub use handler::{PgMember, PgTypeHandler, UnderlyingType};
pub use length_cache::LengthCache;
pub use nullable::NullableHandler;
pub use primitives::{
    BoolHandler, ByteaHandler, Float4Handler, Float8Handler, Int2Handler, Int4Handler,
    Int8Handler, TextHandler,
};
