use serde::{Deserialize, Serialize};

use crate::config::Lang;
use crate::format_type::FormatType;

/// Identity of one cacheable rendered output.
///
/// Two keys are equal iff all five fields are equal, so the withheld and
/// the full rendering of the same record are always distinct entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    pub record_id: u64,
    pub language: Lang,
    pub format_type: FormatType,
    /// Formatter bundle; `None` selects the default bundle
    pub formatter_id: Option<String>,
    /// Whether withheld (restricted) content is suppressed in the output
    pub hide_withheld: bool,
}

impl Key {
    pub fn new(
        record_id: u64,
        language: impl Into<Lang>,
        format_type: FormatType,
        formatter_id: Option<String>,
        hide_withheld: bool,
    ) -> Self {
        Self {
            record_id,
            language: language.into(),
            format_type,
            formatter_id,
            hide_withheld,
        }
    }

    /// The key anonymous users are served from.
    #[must_use]
    pub fn public_variant(&self) -> Self {
        Self {
            hide_withheld: true,
            ..self.clone()
        }
    }

    /// Stable key for persistent storage.
    ///
    /// All variants of one record share the `"{record_id}/"` prefix so they
    /// can be removed together; the remaining fields are hashed so formatter
    /// ids containing separators cannot collide.
    pub fn storage_key(&self) -> String {
        // Null bytes keep ("a", "bc") and ("ab", "c") apart.
        let formatter = match self.formatter_id {
            Some(ref id) => format!("={id}"),
            None => String::new(),
        };
        let combined = format!(
            "{}\0{}\0{}\0{}",
            self.language.as_str(),
            self.format_type.as_str(),
            formatter,
            u8::from(self.hide_withheld),
        );

        format!(
            "{}{:x}",
            Self::record_prefix(self.record_id),
            md5::compute(combined.as_bytes())
        )
    }

    /// Storage prefix shared by all entries of a record
    pub fn record_prefix(record_id: u64) -> String {
        format!("{record_id}/")
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "md {} [{}/{}/{}{}]",
            self.record_id,
            self.language,
            self.format_type,
            self.formatter_id.as_deref().unwrap_or("default"),
            if self.hide_withheld { ", withheld hidden" } else { "" }
        )
    }
}
