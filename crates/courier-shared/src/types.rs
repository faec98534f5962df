use serde::{Deserialize, Serialize};

/// Opaque user identifier handed to the relay by the identity layer.
///
/// The relay never interprets it beyond equality; surrounding whitespace
/// is stripped and empty identifiers are rejected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Declared kind of a message payload, persisted in the `file_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Text,
    Image,
    Video,
    File,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::File => "file",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "file" => Some(Self::File),
            _ => None,
        }
    }

    /// Classify an upload by its MIME type. Anything that is not an image
    /// or a video is a plain file.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type {
            Some(ct) if ct.starts_with("image") => Self::Image,
            Some(ct) if ct.starts_with("video") => Self::Video,
            _ => Self::File,
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a file held by the file-storage layer. Only the reference
/// is stored with a message, never the bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRef {
    pub url: String,
    pub kind: FileKind,
    /// Name of the file as uploaded by the sender.
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_trims_and_rejects_empty() {
        assert_eq!(UserId::new("  bob ").unwrap().as_str(), "bob");
        assert!(UserId::new("   ").is_none());
        assert!(UserId::new("").is_none());
    }

    #[test]
    fn test_file_kind_from_content_type() {
        assert_eq!(FileKind::from_content_type(Some("image/png")), FileKind::Image);
        assert_eq!(FileKind::from_content_type(Some("video/mp4")), FileKind::Video);
        assert_eq!(
            FileKind::from_content_type(Some("application/pdf")),
            FileKind::File
        );
        assert_eq!(FileKind::from_content_type(None), FileKind::File);
    }

    #[test]
    fn test_file_kind_parse() {
        assert_eq!(FileKind::parse("video"), Some(FileKind::Video));
        assert_eq!(FileKind::parse("VIDEO"), None);
    }
}
