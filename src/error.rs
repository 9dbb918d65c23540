//! Error types for binary value marshaling.

use thiserror::Error;

/// Which half of a member's accessor pair was missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accessor {
    Getter,
    Setter,
}

impl Accessor {
    fn verb(self) -> &'static str {
        match self {
            Accessor::Getter => "write",
            Accessor::Setter => "read",
        }
    }

    fn noun(self) -> &'static str {
        match self {
            Accessor::Getter => "getter",
            Accessor::Setter => "setter",
        }
    }
}

/// The main error type for marshaling operations.
#[derive(Debug, Error)]
pub enum PgError {
    /// A read targeted a member without a setter, or a write/length probe
    /// sourced a member without a getter.
    #[error("Can't {} type '{composite}' because member {member} has no {}", .accessor.verb(), .accessor.noun())]
    MissingAccessor {
        composite: &'static str,
        member: String,
        accessor: Accessor,
    },

    /// The type OID on the wire does not match the member's bound type.
    /// The connection that produced it must be discarded.
    #[error(
        "Protocol assertion failed reading '{composite}.{member}': expected OID {expected}, got {actual}"
    )]
    ProtocolAssertion {
        composite: &'static str,
        member: String,
        expected: u32,
        actual: u32,
    },

    /// A member was registered with neither getter nor setter.
    #[error("Invalid mapping for '{composite}.{member}': {reason}")]
    Registration {
        composite: &'static str,
        member: String,
        reason: &'static str,
    },

    /// Operation is not supported for this host kind.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// A non-suspending call would have had to wait on the transport.
    #[error("Operation would suspend: needs {needed} bytes, {available} available")]
    WouldSuspend { needed: usize, available: usize },

    /// Invalid binary data for a primitive type.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Framing error above the member level.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Closed or broken transport.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PgError {
    /// Create a missing accessor error.
    pub fn missing(composite: &'static str, member: impl Into<String>, accessor: Accessor) -> Self {
        Self::MissingAccessor {
            composite,
            member: member.into(),
            accessor,
        }
    }

    /// True when the owning connection can no longer be used.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PgError::ProtocolAssertion { .. }
                | PgError::Protocol(_)
                | PgError::Connection(_)
                | PgError::Io(_)
        )
    }
}

/// Result type alias for marshaling operations.
pub type PgResult<T> = Result<T, PgError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_setter_display() {
        let err = PgError::missing("Point", "y", Accessor::Setter);
        assert_eq!(
            err.to_string(),
            "Can't read type 'Point' because member y has no setter"
        );
    }

    #[test]
    fn test_missing_getter_display() {
        let err = PgError::missing("Point", "x", Accessor::Getter);
        assert_eq!(
            err.to_string(),
            "Can't write type 'Point' because member x has no getter"
        );
    }

    #[test]
    fn test_fatal_classification() {
        let assertion = PgError::ProtocolAssertion {
            composite: "Point",
            member: "x".into(),
            expected: 23,
            actual: 25,
        };
        assert!(assertion.is_fatal());
        assert!(!PgError::missing("Point", "x", Accessor::Getter).is_fatal());
        assert!(!PgError::WouldSuspend { needed: 8, available: 2 }.is_fatal());
    }
}
