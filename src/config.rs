// ─── Rule service ─────────────────────────────────────────────────────────────
/// Default base URL of the local rule service; override with RULE_SERVICE_URL.
pub const RULE_SERVICE_URL: &str = "http://127.0.0.1:5000";

/// Public Bybit REST host, used unauthenticated for the BTC reference price.
pub const BYBIT_PUBLIC_URL: &str = "https://api.bybit.com";

// ─── Polling ──────────────────────────────────────────────────────────────────
/// Position snapshot poll cadence. The poll runs only while positions exist
/// and stops on error; the BTC ticker below keeps its own independent timer.
pub const POLL_INTERVAL_SECS: u64 = 2;
pub const PRICE_INTERVAL_SECS: u64 = 2;

pub const HTTP_TIMEOUT_SECS: u64 = 10;
pub const HTTP_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Category filter applied at startup: "all" | "linear" | "spot".
pub const DEFAULT_CATEGORY: &str = "all";
