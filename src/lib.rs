//! # qail-pg-types
//!
//! Binary marshaling of PostgreSQL values for the QAIL driver: a null channel
//! for `Option<V>` members and composite (row) types mapped onto plain structs.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use qail_pg_types::prelude::*;
//!
//! #[derive(Debug, Clone, Default, PartialEq)]
//! struct Point { x: i32, y: Option<i32> }
//! qail_pg_types::impl_pg_member!(Point);
//!
//! let point = CompositeHandler::<Point>::builder("point_t", 16_384)
//!     .field("x", Int4Handler, |p| &p.x, |p| &mut p.x)
//!     .field("y", Int4Handler, |p| &p.y, |p| &mut p.y)
//!     .build()?;
//!
//! point.write_record(&Point { x: 3, y: None }, &mut write_buf, true).await?;
//! let decoded = point.read_record(&mut read_buf, true).await?;
//! ```
//!
//! ## Member wire frame
//!
//! | Bytes | Field    | Notes                 |
//! |-------|----------|-----------------------|
//! | 4     | type OID | must match the member |
//! | 4     | length   | `-1` = NULL           |
//! | n     | payload  | omitted for NULL      |

pub mod config;
pub mod error;
pub mod protocol;
pub mod types;

pub mod prelude {
    pub use crate::config::BufferConfig;
    pub use crate::error::*;
    pub use crate::protocol::{ReadBuffer, WriteBuffer, oid};
    pub use crate::types::nullable;
    pub use crate::types::*;
}

pub use config::BufferConfig;
pub use error::{Accessor, PgError, PgResult};
pub use protocol::{ReadBuffer, WriteBuffer};
pub use types::{CompositeHandler, LengthCache, PgMember, PgTypeHandler};
