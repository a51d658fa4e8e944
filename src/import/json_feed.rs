//! JSON feed extractor
//!
//! The payload is walked with serde visitors rather than parsed into a
//! `Value` tree: every item is counted, but only the items that will be
//! returned are materialized. Items past the limit are skipped with
//! `IgnoredAny`.

use serde::de::{DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde_json::Value;
use std::fmt;
use tracing::debug;

use super::source::{FeedExtractor, ScanResult};
use crate::types::{FeedFormat, RawRecord, RawValue};

/// Top-level keys whose array value holds the items, in priority order
pub const WRAPPER_KEYS: &[&str] = &["products", "items", "data", "results", "offers"];

/// Accepts a top-level array of objects, or an object wrapping one under
/// a well-known key. Any other shape yields zero records.
#[derive(Debug, Clone, Default)]
pub struct JsonExtractor;

impl JsonExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl FeedExtractor for JsonExtractor {
    fn format(&self) -> FeedFormat {
        FeedFormat::Json
    }

    fn scan(&self, data: &[u8], limit: Option<usize>) -> ScanResult {
        let mut deserializer = serde_json::Deserializer::from_slice(data);
        let scanned = Root { limit }
            .deserialize(&mut deserializer)
            .and_then(|result| deserializer.end().map(|_| result));
        match scanned {
            Ok(result) => result,
            Err(e) => {
                debug!("JSON payload rejected: {}", e);
                ScanResult::default()
            }
        }
    }
}

/// Scalar visits that carry no items
macro_rules! skip_scalars {
    ($value:expr) => {
        fn visit_bool<E: serde::de::Error>(self, _: bool) -> Result<Self::Value, E> {
            Ok($value)
        }

        fn visit_i64<E: serde::de::Error>(self, _: i64) -> Result<Self::Value, E> {
            Ok($value)
        }

        fn visit_u64<E: serde::de::Error>(self, _: u64) -> Result<Self::Value, E> {
            Ok($value)
        }

        fn visit_f64<E: serde::de::Error>(self, _: f64) -> Result<Self::Value, E> {
            Ok($value)
        }

        fn visit_str<E: serde::de::Error>(self, _: &str) -> Result<Self::Value, E> {
            Ok($value)
        }

        fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
            Ok($value)
        }
    };
}

/// Whole document: an item array, or an object wrapping one
struct Root {
    limit: Option<usize>,
}

impl<'de> DeserializeSeed<'de> for Root {
    type Value = ScanResult;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for Root {
    type Value = ScanResult;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON array or object")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, seq: A) -> Result<Self::Value, A::Error> {
        Items { limit: self.limit }.visit_seq(seq).map(Option::unwrap_or_default)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        // Lowest rank in WRAPPER_KEYS wins, wherever it appears in the object
        let mut best: Option<(usize, ScanResult)> = None;
        while let Some(key) = map.next_key::<String>()? {
            match WRAPPER_KEYS.iter().position(|k| *k == key) {
                Some(rank) if best.as_ref().map_or(true, |(held, _)| rank < *held) => {
                    if let Some(result) = map.next_value_seed(Items { limit: self.limit })? {
                        best = Some((rank, result));
                    }
                }
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(best.map(|(_, result)| result).unwrap_or_default())
    }

    skip_scalars!(ScanResult::default());
}

/// An item array; `None` when the value turns out not to be an array
struct Items {
    limit: Option<usize>,
}

impl<'de> DeserializeSeed<'de> for Items {
    type Value = Option<ScanResult>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for Items {
    type Value = Option<ScanResult>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an array of items")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut result = ScanResult::default();
        loop {
            let keep = self.limit.map_or(true, |max| result.records.len() < max);
            match seq.next_element_seed(Item { keep })? {
                None => break,
                Some(Scanned::Record(record)) => {
                    result.total += 1;
                    result.records.push(record);
                }
                Some(Scanned::Counted) => result.total += 1,
                Some(Scanned::NotObject) => {}
            }
        }
        Ok(Some(result))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(None)
    }

    skip_scalars!(None);
}

/// What one array element turned out to be
enum Scanned {
    Record(RawRecord),
    /// An object past the limit, counted but not kept
    Counted,
    NotObject,
}

struct Item {
    keep: bool,
}

impl<'de> DeserializeSeed<'de> for Item {
    type Value = Scanned;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for Item {
    type Value = Scanned;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a feed item")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        if !self.keep {
            while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
            return Ok(Scanned::Counted);
        }

        let mut record = RawRecord::new();
        while let Some((key, value)) = map.next_entry::<String, Value>()? {
            if let Some(raw) = scalar(value) {
                record.insert_first(key, raw);
            }
        }
        Ok(Scanned::Record(record))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(Scanned::NotObject)
    }

    skip_scalars!(Scanned::NotObject);
}

/// Nested structures and nulls are not scalar fields
fn scalar(value: Value) -> Option<RawValue> {
    match value {
        Value::String(s) => Some(RawValue::Text(s)),
        Value::Number(n) => Some(match n.as_f64() {
            Some(f) => RawValue::Number(f),
            None => RawValue::Text(n.to_string()),
        }),
        Value::Bool(b) => Some(RawValue::Text(b.to_string())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_level_array() {
        let data = br#"[{"title":"A","price":10.5},{"title":"B","price":"7,20"}]"#;
        let records = JsonExtractor::new().extract(data);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("price"), Some(&RawValue::Number(10.5)));
        assert_eq!(records[1].get("price"), Some(&RawValue::Text("7,20".into())));
    }

    #[test]
    fn test_wrapper_keys() {
        for key in WRAPPER_KEYS {
            let data = format!(r#"{{"meta":{{"page":1}},"{}":[{{"name":"x"}}]}}"#, key);
            let records = JsonExtractor::new().extract(data.as_bytes());
            assert_eq!(records.len(), 1, "wrapper key {}", key);
        }
    }

    #[test]
    fn test_unknown_shapes_yield_nothing() {
        let extractor = JsonExtractor::new();
        assert!(extractor.extract(br#"{"catalog":[{"name":"x"}]}"#).is_empty());
        assert!(extractor.extract(br#"{"products":{"name":"x"}}"#).is_empty());
        assert!(extractor.extract(b"42").is_empty());
        assert!(extractor.extract(b"[{\"name\": ").is_empty());
        assert!(extractor.extract(b"<SHOP/>").is_empty());
    }

    #[test]
    fn test_non_scalar_values_skipped() {
        let data = br#"[{"name":"x","tags":["a"],"dims":{"w":1},"gone":null,"sale":true}, 5]"#;
        let scan = JsonExtractor::new().scan(data, None);

        assert_eq!(scan.total, 1);
        let record = &scan.records[0];
        assert_eq!(record.fields.len(), 2);
        assert_eq!(record.get("sale"), Some(&RawValue::Text("true".into())));
    }

    #[test]
    fn test_preview_bound() {
        let items: Vec<String> = (0..10_000)
            .map(|i| format!(r#"{{"sku":"S{}","price":{}}}"#, i, i + 1))
            .collect();
        let data = format!(r#"{{"items":[{}]}}"#, items.join(","));
        let preview = JsonExtractor::new().preview(data.as_bytes());

        assert_eq!(preview.total_items, 10_000);
        assert_eq!(preview.sample.len(), 5);
        assert_eq!(preview.fields, vec!["price", "sku"]);
    }

    #[test]
    fn test_scan_counts_past_the_sample() {
        // Items past the sample are counted even when they are bulky
        let mut items: Vec<String> = (0..3).map(|i| format!(r#"{{"sku":"S{}"}}"#, i)).collect();
        items.push(r#"{"sku":"S3","variants":[{"size":"M","stock":[1,2,3]}],"meta":{"deep":{"x":null}}}"#.into());
        items.push(r#"[1,2]"#.into());
        items.push(r#"{"sku":"S4"}"#.into());
        let data = format!("[{}]", items.join(","));

        let scan = JsonExtractor::new().scan(data.as_bytes(), Some(2));
        assert_eq!(scan.total, 5);
        assert_eq!(scan.records.len(), 2);
        assert_eq!(scan.records[1].get("sku"), Some(&RawValue::Text("S1".into())));
    }

    #[test]
    fn test_wrapper_priority_ignores_key_order() {
        let data = br#"{"offers":[{"sku":"late"}],"note":"x","products":[{"sku":"first"},{"sku":"second"}]}"#;
        let scan = JsonExtractor::new().scan(data, None);
        assert_eq!(scan.total, 2);
        assert_eq!(scan.records[0].get("sku"), Some(&RawValue::Text("first".into())));

        // A wrapper key holding a non-array does not shadow a lower-priority array
        let data = br#"{"products":{"sku":"x"},"items":[{"sku":"y"}]}"#;
        assert_eq!(JsonExtractor::new().extract(data).len(), 1);
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        assert!(JsonExtractor::new().extract(br#"[{"sku":"a"}] [1]"#).is_empty());
    }
}
