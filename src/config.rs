//! Configuration for mapkv
//!
//! Store creation options and network front-end settings, both with
//! builder-style setters and sensible defaults.

use std::path::PathBuf;

use crate::error::{KvError, Result};

/// Options used when opening a store
///
/// `tables` and `buckets` only matter when the store is created; an existing
/// store keeps the layout it was created with. `read_only` applies to every open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Number of independent hash tables (fixed for the lifetime of the store)
    pub tables: u64,

    /// Initial bucket count of every table
    pub buckets: u64,

    /// Map read-only and reject every mutating call
    pub read_only: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            tables: 256,
            buckets: 256,
            read_only: false,
        }
    }
}

impl Options {
    /// Create a new options builder
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    /// Shorthand for default options opened read-only
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    /// Check the creation parameters
    pub fn validate(&self) -> Result<()> {
        if self.tables == 0 {
            return Err(KvError::Config("table count must be at least 1".to_string()));
        }
        if self.buckets == 0 {
            return Err(KvError::Config("bucket count must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Builder for Options
#[derive(Default)]
pub struct OptionsBuilder {
    options: Options,
}

impl OptionsBuilder {
    /// Set the number of hash tables
    pub fn tables(mut self, tables: u64) -> Self {
        self.options.tables = tables;
        self
    }

    /// Set the initial bucket count per table
    pub fn buckets(mut self, buckets: u64) -> Self {
        self.options.buckets = buckets;
        self
    }

    /// Open the store read-only
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.options.read_only = read_only;
        self
    }

    pub fn build(self) -> Options {
        self.options
    }
}

/// Configuration for the network front-end
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Data file (also holds the index in combined mode)
    pub data_path: PathBuf,

    /// Separate index file; `None` selects combined mode
    pub index_path: Option<PathBuf>,

    /// Creation options for a fresh store
    pub options: Options,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds, 0 = none)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds, 0 = none)
    pub write_timeout_ms: u64,

    /// Largest value accepted by `set` (bytes)
    pub max_value_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("./mapkv.db"),
            index_path: None,
            options: Options::default(),
            listen_addr: "0.0.0.0:11211".to_string(),
            max_connections: 1024,
            read_timeout_ms: 0,
            write_timeout_ms: 5000,
            max_value_size: 64 * 1024 * 1024, // 64 MB
        }
    }
}

impl ServerConfig {
    /// Create a new config builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }
}

/// Builder for ServerConfig
#[derive(Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Set the data file path
    pub fn data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_path = path.into();
        self
    }

    /// Set a separate index file path (split mode)
    pub fn index_path(mut self, path: Option<PathBuf>) -> Self {
        self.config.index_path = path;
        self
    }

    /// Set store creation options
    pub fn options(mut self, options: Options) -> Self {
        self.config.options = options;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set the largest accepted value size (in bytes)
    pub fn max_value_size(mut self, size: usize) -> Self {
        self.config.max_value_size = size;
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_defaults() {
        let options = Options::default();
        assert_eq!(options.tables, 256);
        assert_eq!(options.buckets, 256);
        assert!(!options.read_only);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_options_builder_rejects_zero() {
        let options = Options::builder().tables(0).build();
        assert!(matches!(options.validate(), Err(KvError::Config(_))));

        let options = Options::builder().buckets(0).build();
        assert!(matches!(options.validate(), Err(KvError::Config(_))));
    }

    #[test]
    fn test_server_config_builder() {
        let config = ServerConfig::builder()
            .data_path("/tmp/data.db")
            .index_path(Some(PathBuf::from("/tmp/index.db")))
            .listen_addr("127.0.0.1:0")
            .max_value_size(1024)
            .build();

        assert_eq!(config.data_path, PathBuf::from("/tmp/data.db"));
        assert_eq!(config.index_path, Some(PathBuf::from("/tmp/index.db")));
        assert_eq!(config.listen_addr, "127.0.0.1:0");
        assert_eq!(config.max_value_size, 1024);
        assert_eq!(config.max_connections, 1024);
    }
}
