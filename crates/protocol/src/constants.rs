use std::time::Duration;

/// Hard timeout for a single upload request.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_millis(300_000);

/// Largest file the backend accepts (500 MiB).
pub const MAX_UPLOAD_SIZE: u64 = 500 * 1024 * 1024;

/// File extensions accepted by the upload endpoint (lowercase, no dot).
pub const ALLOWED_EXTENSIONS: &[&str] = &["ifc"];

/// Multipart field name carrying the file body.
pub const UPLOAD_FIELD: &str = "file";

/// Number of leading bytes inspected by the content sniff.
pub const SNIFF_WINDOW: usize = 1024;

/// Tokens of which at least one must appear in the sniff window.
pub const SNIFF_TOKENS: &[&str] = &["ISO-10303-21", "FILE_DESCRIPTION"];

/// Structural markers required in the analyzed prefix.
pub const STRUCTURE_MARKERS: &[&str] = &["ISO-10303-21", "HEADER;", "ENDSEC;", "DATA;"];

/// Bytes read for a full content preview.
pub const FULL_PREVIEW_BYTES: usize = 100_000;

/// Bytes read for a quick content preview.
pub const QUICK_PREVIEW_BYTES: usize = 10_000;

/// Time to wait for any incoming frame before the push channel is
/// considered dead.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(60);

/// How often the client pings the push channel.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(20);

/// Largest push message accepted (1 MiB).
pub const WS_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Path prefix of the push endpoint; the client id is appended.
pub const WS_PATH: &str = "/ws";
