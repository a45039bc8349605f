use std::sync::Arc;

use smart_default::SmartDefault;

use crate::cache::{DeserializerCache, GLOBAL_CACHE};
use crate::constant::RewriteFlags;
use crate::error::Error;

/// Configuration for rewriting and materialization
///
/// ```rs
/// let mut opts1 = Opts::default();
/// opts1.list_separator = ", ".to_owned();
///
/// let opts2 = Opts::try_from("pad_lists=true;list_padding_threshold=20")?;
/// ```
#[derive(Debug, Clone, SmartDefault)]
pub struct Opts {
    /// Joins the placeholders of an expanded list
    #[default(",".to_owned())]
    pub list_separator: String,

    /// Substituted for `IN @list` when the list is empty. Must match no rows.
    #[default("(SELECT NULL WHERE 1 = 0)".to_owned())]
    pub empty_list_sql: String,

    pub flags: RewriteFlags,

    /// Lists at least this long are padded to the next multiple of 10 when
    /// `RewriteFlags::PAD_LISTS` is set
    #[default(10)]
    pub list_padding_threshold: usize,

    #[default(Arc::clone(&GLOBAL_CACHE))]
    pub cache: Arc<DeserializerCache>,
}

fn parse_bool(key: &str, value: &str) -> Result<bool, Error> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(Error::InvalidInput(format!(
            "Invalid boolean for '{}': {}",
            key, value
        ))),
    }
}

impl TryFrom<&str> for Opts {
    type Error = Error;

    /// Parse `key=value` pairs separated by `;`.
    ///
    /// Keys: `list_separator`, `empty_list_sql`, `list_padding_threshold`,
    /// `pad_lists`, `legacy_markers`, `literal_tokens`.
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let mut opts = Self::default();
        for pair in s.split(';').map(str::trim).filter(|pair| !pair.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                Error::InvalidInput(format!("Expected key=value, got '{}'", pair))
            })?;
            let key = key.trim();
            let value = value.trim();
            match key {
                "list_separator" => opts.list_separator = value.to_owned(),
                "empty_list_sql" => opts.empty_list_sql = value.to_owned(),
                "list_padding_threshold" => {
                    opts.list_padding_threshold = value.parse().map_err(|e| {
                        Error::InvalidInput(format!(
                            "Invalid list_padding_threshold '{}': {}",
                            value, e
                        ))
                    })?;
                }
                "pad_lists" => opts
                    .flags
                    .set(RewriteFlags::PAD_LISTS, parse_bool(key, value)?),
                "legacy_markers" => opts
                    .flags
                    .set(RewriteFlags::ALLOW_LEGACY_MARKERS, parse_bool(key, value)?),
                "literal_tokens" => opts
                    .flags
                    .set(RewriteFlags::LITERAL_TOKENS, parse_bool(key, value)?),
                _ => {
                    return Err(Error::InvalidInput(format!("Unknown option '{}'", key)));
                }
            }
        }
        Ok(opts)
    }
}
