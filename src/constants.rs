/// Constants module to avoid magic numbers in the codebase

// Access control
pub const AUTH_FLOOR_MS: u64 = 100;
pub const REPORT_PASSWORD_LEN: usize = 64;

// Remote defaults
pub const DEFAULT_COGNOS_NAMESPACE: &str = "esp";
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;
pub const DEFAULT_RETRY_COUNT: i64 = 3;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 600; // report generation runs inside the request
pub const DEFAULT_CONCURRENT_REQUESTS: usize = 1;
pub const USER_AGENT: &str = concat!("reportgate/", env!("CARGO_PKG_VERSION"));

// Cognos RDS endpoints
pub const LOGIN_ENDPOINT: &str = "/ibmcognos/bi/v1/login";
pub const WSIL_ENDPOINT: &str = "/ibmcognos/bi/v1/disp/rds/wsil";
pub const OUTPUT_ENDPOINT: &str = "/ibmcognos/bi/v1/disp/rds/outputFormat/path";
pub const PROMPTS_ENDPOINT: &str = "/ibmcognos/bi/v1/disp/rds/reportPrompts/path";
pub const MY_FOLDERS: &str = "My Folders";
pub const PUBLIC_FOLDERS: &str = "Public Folders";

// Logical path markers
pub const PUBLIC_ROOT: &str = "public";
pub const CURRENT_USER_MARKER: &str = "~";

// Cache defaults
pub const DEFAULT_MAX_AGE_SECS: u64 = 3600;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;
pub const LEDGER_ATTEMPTS: usize = 3;
pub const LEDGER_RETRY_DELAY_MS: u64 = 1000;
pub const LEDGER_BUSY_TIMEOUT_MS: u64 = 250;

// Front door
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";
pub const API_KEY_HEADER: &str = "x-api-key";
pub const AUTH_REALM: &str = "reportgate";
pub const MAX_BODY_BYTES: usize = 10 * 1000 * 1000;
