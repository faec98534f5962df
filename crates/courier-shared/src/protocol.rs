use serde::Deserialize;

use crate::constants::MAX_FRAME_BYTES;
use crate::error::FrameError;
use crate::types::{FileKind, FileRef, UserId};

/// Frame as it arrives on the wire, before validation.
///
/// Every field is optional here so that a missing field is reported as a
/// specific [`FrameError`] rather than a generic decode failure. A field
/// with the wrong JSON type still fails decoding.
#[derive(Debug, Default, Deserialize)]
struct RawFrame {
    #[serde(default)]
    receiver_id: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    file_url: Option<String>,
    #[serde(default)]
    file_type: Option<String>,
    #[serde(default)]
    file_name: Option<String>,
}

/// A validated inbound push frame: `{receiver_id, content, file fields...}`.
///
/// The sender is never taken from the frame; it is the user that owns the
/// connection the frame arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    pub receiver_id: UserId,
    pub content: Option<String>,
    pub file: Option<FileRef>,
}

impl InboundFrame {
    /// Parse and validate a text frame.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        if text.len() > MAX_FRAME_BYTES {
            return Err(FrameError::TooLarge {
                size: text.len(),
                max: MAX_FRAME_BYTES,
            });
        }

        let raw: RawFrame = serde_json::from_str(text)?;

        let receiver_id = raw
            .receiver_id
            .as_deref()
            .and_then(|r| UserId::new(r))
            .ok_or(FrameError::MissingReceiver)?;

        let content = raw.content.filter(|c| !c.is_empty());

        let file = match raw.file_url.filter(|u| !u.is_empty()) {
            Some(url) => {
                let kind = match raw.file_type.as_deref() {
                    None | Some("") => FileKind::File,
                    Some(s) => FileKind::parse(s)
                        .ok_or_else(|| FrameError::UnknownFileKind(s.to_string()))?,
                };
                Some(FileRef {
                    url,
                    kind,
                    name: raw.file_name.filter(|n| !n.is_empty()),
                })
            }
            None => None,
        };

        if content.is_none() && file.is_none() {
            return Err(FrameError::EmptyPayload);
        }

        Ok(Self {
            receiver_id,
            content,
            file,
        })
    }
}
