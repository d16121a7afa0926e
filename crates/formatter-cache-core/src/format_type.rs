use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::Error;

/// Output type produced by a formatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatType {
    Html,
    Xml,
    Pdf,
    Txt,
    Json,
}

impl FormatType {
    pub const ALL: [Self; 5] = [Self::Html, Self::Xml, Self::Pdf, Self::Txt, Self::Json];

    /// Value for the `Content-Type` response header.
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Html => "text/html; charset=utf-8",
            Self::Xml => "application/xml",
            Self::Pdf => "application/pdf",
            Self::Txt => "text/plain; charset=utf-8",
            Self::Json => "application/json",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Xml => "xml",
            Self::Pdf => "pdf",
            Self::Txt => "txt",
            Self::Json => "json",
        }
    }

    /// File name offered in `Content-Disposition`.
    pub fn file_name(self) -> String {
        format!("metadata.{}", self.as_str())
    }
}

impl std::fmt::Display for FormatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormatType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == lower)
            .ok_or_else(|| Error::UnsupportedFormatType(s.to_string()))
    }
}
