//! Default configuration values
//!
//! These are embedded in the binary and used when no config file exists.

/// Default configuration as TOML (for reference/documentation)
pub const DEFAULT_CONFIG_TOML: &str = r##"
# dvap configuration

[websocket]
host = "127.0.0.1"
port = 9000
tick_interval_ms = 50
read_buffer_size = 4096

[events]
enabled = true
host = "127.0.0.1"
port = 8000
poll_interval_ms = 50
max_queued = 1024
"##;
