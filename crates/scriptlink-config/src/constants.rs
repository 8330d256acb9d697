//! Default constants for scriptlink configuration
//!
//! Single source of truth for default values. Everything that is
//! configurable has its default here.

// ============================================================================
// HOSTS
// ============================================================================

/// Default host the runtime's debug endpoint listens on
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default host as IPv4 address (for direct socket connections)
pub const LOCALHOST_IPV4: std::net::Ipv4Addr = std::net::Ipv4Addr::new(127, 0, 0, 1);

// ============================================================================
// ENVIRONMENT VARIABLES
// ============================================================================

/// Config file path override
pub const ENV_SCRIPTLINK_CONFIG: &str = "SCRIPTLINK_CONFIG";

/// Config file name looked up in the working directory
pub const DEFAULT_CONFIG_FILENAME: &str = "scriptlink.toml";

// ============================================================================
// PORTS
// ============================================================================

/// First port probed when choosing a debug port for a launched runtime
pub const DEFAULT_PORT_RANGE_START: u16 = 5858;

/// Last port probed when choosing a debug port
pub const DEFAULT_PORT_RANGE_END: u16 = 5958;

// ============================================================================
// RETRY / TIMEOUTS
// ============================================================================

/// Connection attempts made after spawning the runtime before giving up
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 20;

/// Initial sleep between connection attempts (ms)
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 100;

/// Upper bound for the backoff between connection attempts (ms)
pub const DEFAULT_MAX_RETRY_INTERVAL_MS: u64 = 1_000;

/// Random jitter added to each retry sleep (ms, exclusive upper bound)
pub const DEFAULT_RETRY_JITTER_MS: u64 = 50;

/// Time allowed for the runtime process to exit after a kill (ms)
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 2_000;

// ============================================================================
// TCP
// ============================================================================

/// Idle time before TCP keep-alive probes start (seconds)
pub const DEFAULT_TCP_KEEPALIVE_SECS: u64 = 15;

// ============================================================================
// CHANNEL CAPACITIES
// ============================================================================

/// Capacity of each host event subscriber channel
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

// ============================================================================
// DISPLAY
// ============================================================================

/// Default recursion budget when rendering values
pub const DEFAULT_RENDER_DEPTH: usize = 2;

/// Rendered strings longer than this are truncated with "..."
pub const DEFAULT_MAX_VALUE_LENGTH: usize = 100;

// ============================================================================
// LOGGING
// ============================================================================

/// Default log level when RUST_LOG is not set
pub const DEFAULT_LOG_LEVEL: &str = "info";
