//! Payload format detection

use super::csv_feed::CsvExtractor;
use super::json_feed::JsonExtractor;
use super::source::FeedExtractor;
use super::xml_feed::XmlExtractor;
use crate::types::FeedFormat;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Classify a payload by its first meaningful byte.
///
/// A declared hint is trusted as-is. Otherwise a leading `<` means XML,
/// `[` or `{` means JSON, and anything else (including an empty payload)
/// is treated as CSV. This is a heuristic: extractors handed the wrong
/// format return zero records instead of failing.
pub fn detect_format(data: &[u8], hint: Option<FeedFormat>) -> FeedFormat {
    if let Some(format) = hint {
        return format;
    }

    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
    match data.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'<') => FeedFormat::Xml,
        Some(b'[') | Some(b'{') => FeedFormat::Json,
        _ => FeedFormat::Csv,
    }
}

/// Extractor for a format; `item_element` only matters for XML
pub fn extractor_for(format: FeedFormat, item_element: &str) -> Box<dyn FeedExtractor> {
    match format {
        FeedFormat::Xml => Box::new(XmlExtractor::new(item_element)),
        FeedFormat::Json => Box::new(JsonExtractor::new()),
        FeedFormat::Csv => Box::new(CsvExtractor::new()),
    }
}
