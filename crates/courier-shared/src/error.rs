use thiserror::Error;

/// Reasons an inbound push frame is rejected as malformed.
///
/// None of these terminate the connection that produced the frame.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Frame is not a valid JSON object: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Frame exceeds {max} bytes ({size})")]
    TooLarge { size: usize, max: usize },

    #[error("Binary frames are not supported")]
    Binary,

    #[error("Missing receiver_id")]
    MissingReceiver,

    #[error("Frame has neither content nor file_url")]
    EmptyPayload,

    #[error("Unknown file_type: {0}")]
    UnknownFileKind(String),
}
