/// Version advertised by the relay on `/health`.
pub const PROTOCOL_VERSION: &str = "/courier/1.0.0";

/// Largest inbound text frame accepted over a push connection (64 KiB).
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Pending push frames buffered per connection before delivery fails.
pub const DEFAULT_PUSH_BUFFER: usize = 64;

/// Maximum accepted upload size (50 MiB).
pub const DEFAULT_MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024;

/// Public URL prefix under which stored uploads are served.
pub const UPLOADS_URL_PREFIX: &str = "/uploads/";
