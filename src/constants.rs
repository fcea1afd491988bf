// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3030;
pub const WS_PATH: &str = "ws";
pub const HEALTH_PATH: &str = "health";

// Hub and connection defaults
pub const DEFAULT_MAX_CONNECTIONS_PER_USER: usize = 5;
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 54;
pub const DEFAULT_HEARTBEAT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

// Rate limiter defaults (tokens per second, burst)
pub const DEFAULT_AUTH_RATE: (f64, u32) = (0.1, 5);
pub const DEFAULT_API_RATE: (f64, u32) = (10.0, 50);
pub const DEFAULT_UPLOAD_RATE: (f64, u32) = (0.5, 10);
pub const DEFAULT_MESSAGING_RATE: (f64, u32) = (5.0, 30);
pub const DEFAULT_RECLAIM_INTERVAL_SECS: u64 = 60;

// Rate limit response headers
pub const HEADER_RATE_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_RATE_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RETRY_AFTER: &str = "retry-after";
