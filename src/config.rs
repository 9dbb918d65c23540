//! Buffer configuration

use serde::Deserialize;
use std::path::Path;

use crate::error::{PgError, PgResult};

/// Default size of both the read and the write buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Smallest write buffer that can hold a member header in one segment.
pub const MIN_WRITE_BUFFER_SIZE: usize = 16;

/// Sizing for the buffered transport
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Bytes reserved per fill of the read buffer
    pub read_buffer_size: usize,

    /// Bytes held before a flush is required
    pub write_buffer_size: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_BUFFER_SIZE,
            write_buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl BufferConfig {
    /// Create a new configuration builder
    pub fn builder() -> BufferConfigBuilder {
        BufferConfigBuilder::default()
    }

    /// Parse from a TOML document. Missing keys keep their defaults.
    ///
    /// ```toml
    /// read_buffer_size = 16384
    /// write_buffer_size = 16384
    /// ```
    pub fn from_toml_str(input: &str) -> PgResult<Self> {
        let config: BufferConfig =
            toml::from_str(input).map_err(|e| PgError::Config(e.to_string()))?;
        config.validate()
    }

    /// Load from a TOML file on disk.
    pub async fn from_file(path: impl AsRef<Path>) -> PgResult<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_toml_str(&content)
    }

    fn validate(self) -> PgResult<Self> {
        if self.read_buffer_size == 0 {
            return Err(PgError::Config("read_buffer_size must be non-zero".to_string()));
        }
        if self.write_buffer_size < MIN_WRITE_BUFFER_SIZE {
            return Err(PgError::Config(format!(
                "write_buffer_size must be at least {} bytes, got {}",
                MIN_WRITE_BUFFER_SIZE, self.write_buffer_size
            )));
        }
        Ok(self)
    }
}

/// Builder for BufferConfig
#[derive(Debug, Default)]
pub struct BufferConfigBuilder {
    config: BufferConfig,
}

impl BufferConfigBuilder {
    /// Set the read buffer size
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Set the write buffer size
    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.config.write_buffer_size = size;
        self
    }

    /// Build the configuration
    pub fn build(self) -> PgResult<BufferConfig> {
        self.config.validate()
    }
}
