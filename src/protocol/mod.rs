//! Buffered transport and OID table.
//!
//! The buffers are the only place this crate awaits: `ReadBuffer::ensure` and
//! `WriteBuffer::flush`.

pub mod read_buffer;
pub mod types;
pub mod write_buffer;

pub use read_buffer::ReadBuffer;
pub use types::{oid, oid_to_name};
pub use write_buffer::WriteBuffer;
