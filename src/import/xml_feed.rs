//! Streaming XML feed extractor
//!
//! Walks the document with a quick-xml tokenizer. Every repeated item
//! element (default `SHOPITEM`) becomes one record; its immediate child
//! elements become raw fields. `PARAM` blocks and alternate image
//! elements are collected into the record's side lists.
//!
//! A field's value is all of its text, including text inside inline markup
//! (`Fast <b>dual-SIM</b> phone`), trimmed once when the field closes. A
//! child that holds only nested elements and no text of its own is a
//! structured block, not a field, and is skipped.

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use tracing::debug;

use super::source::{FeedExtractor, ScanResult};
use crate::types::{FeedFormat, Param, RawRecord, RawValue, DEFAULT_ITEM_ELEMENT};

const PARAM_ELEMENT: &str = "PARAM";
const PARAM_NAME_ELEMENT: &str = "PARAM_NAME";
const PARAM_VALUE_ELEMENT: &str = "VAL";

/// Child elements that carry additional product images
const ALTERNATE_IMAGE_ELEMENTS: &[&str] = &["IMGURL_ALTERNATIVE", "IMAGE_ALTERNATIVE", "additional_image_link"];

/// XML extractor keyed on a configurable item element
#[derive(Debug, Clone)]
pub struct XmlExtractor {
    item_element: String,
}

impl Default for XmlExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_ITEM_ELEMENT)
    }
}

impl XmlExtractor {
    pub fn new(item_element: impl Into<String>) -> Self {
        let item_element = item_element.into();
        let item_element = if item_element.trim().is_empty() {
            DEFAULT_ITEM_ELEMENT.to_string()
        } else {
            item_element.trim().to_string()
        };
        Self { item_element }
    }

    pub fn item_element(&self) -> &str {
        &self.item_element
    }

    fn is_item(&self, qname: &str) -> bool {
        qname == self.item_element || local_name(qname) == self.item_element
    }
}

/// Strip a namespace prefix (`g:price` -> `price`)
fn local_name(qname: &str) -> &str {
    qname.rsplit(':').next().unwrap_or(qname)
}

/// Which part of an item the parser is currently inside
#[derive(Debug, Default)]
enum Capture {
    #[default]
    None,
    /// Text of an immediate child element and its descendants
    Field {
        name: String,
        text: String,
        /// Non-whitespace text appeared directly inside the element
        direct: bool,
        /// The element contains child elements
        nested: bool,
    },
    /// Inside a PARAM block, optionally inside one of its parts
    Param {
        name: String,
        value: String,
        part: Option<ParamPart>,
    },
}

#[derive(Debug, Clone, Copy)]
enum ParamPart {
    Name,
    Value,
}

/// Parser state for the item currently being assembled
struct ItemState {
    /// Absolute depth of the item element
    depth: usize,
    record: RawRecord,
    capture: Capture,
}

impl ItemState {
    fn push_text(&mut self, depth: usize, text: &str) {
        match &mut self.capture {
            Capture::Field { text: buf, direct, .. } if depth > self.depth => {
                if depth == self.depth + 1 && !text.trim().is_empty() {
                    *direct = true;
                }
                buf.push_str(text);
            }
            Capture::Param {
                name,
                value,
                part: Some(part),
            } if depth >= self.depth + 2 => match part {
                ParamPart::Name => name.push_str(text),
                ParamPart::Value => value.push_str(text),
            },
            _ => {}
        }
    }

    fn start_child(&mut self, depth: usize, qname: &str) {
        if depth == self.depth + 1 {
            self.capture = if qname == PARAM_ELEMENT {
                Capture::Param {
                    name: String::new(),
                    value: String::new(),
                    part: None,
                }
            } else {
                Capture::Field {
                    name: qname.to_string(),
                    text: String::new(),
                    direct: false,
                    nested: false,
                }
            };
            return;
        }

        match &mut self.capture {
            Capture::Field { nested, .. } => *nested = true,
            Capture::Param { part, .. } if depth == self.depth + 2 => {
                *part = match qname {
                    PARAM_NAME_ELEMENT => Some(ParamPart::Name),
                    PARAM_VALUE_ELEMENT => Some(ParamPart::Value),
                    _ => None,
                };
            }
            _ => {}
        }
    }

    /// Close the element at `depth` (the depth it was opened at)
    fn end_child(&mut self, depth: usize) {
        if depth == self.depth + 2 {
            if let Capture::Param { part, .. } = &mut self.capture {
                *part = None;
            }
            return;
        }
        if depth != self.depth + 1 {
            return;
        }

        match std::mem::take(&mut self.capture) {
            Capture::Field {
                name,
                text,
                direct,
                nested,
            } => {
                let text = text.trim();
                if text.is_empty() || (nested && !direct) {
                    return;
                }
                if ALTERNATE_IMAGE_ELEMENTS.contains(&name.as_str()) {
                    self.record.images.push(text.to_string());
                } else {
                    self.record.insert_first(name, RawValue::Text(text.to_string()));
                }
            }
            Capture::Param { name, value, .. } => {
                let (name, value) = (name.trim(), value.trim());
                if !name.is_empty() && !value.is_empty() {
                    self.record.params.push(Param::new(name, value));
                }
            }
            Capture::None => {}
        }
    }
}

impl FeedExtractor for XmlExtractor {
    fn format(&self) -> FeedFormat {
        FeedFormat::Xml
    }

    fn scan(&self, data: &[u8], limit: Option<usize>) -> ScanResult {
        let mut reader = Reader::from_reader(data);
        reader.trim_text(false);
        reader.check_end_names(false);

        let mut result = ScanResult::default();
        let mut buf = Vec::with_capacity(8192);
        let mut depth: usize = 0;
        let mut item: Option<ItemState> = None;

        loop {
            buf.clear();
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    depth += 1;
                    let qname = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    match item.as_mut() {
                        Some(state) => state.start_child(depth, &qname),
                        None if self.is_item(&qname) => {
                            item = Some(ItemState {
                                depth,
                                record: RawRecord::new(),
                                capture: Capture::None,
                            });
                        }
                        None => {}
                    }
                }
                Ok(Event::Text(ref e)) => {
                    if let Some(state) = item.as_mut() {
                        match e.unescape() {
                            Ok(text) => state.push_text(depth, &text),
                            Err(_) => state.push_text(depth, &String::from_utf8_lossy(e)),
                        }
                    }
                }
                Ok(Event::CData(ref e)) => {
                    if let Some(state) = item.as_mut() {
                        let bytes = e.to_vec();
                        state.push_text(depth, &String::from_utf8_lossy(&bytes));
                    }
                }
                Ok(Event::End(_)) => {
                    let closes_item = matches!(&item, Some(state) if state.depth == depth);
                    if closes_item {
                        if let Some(state) = item.take() {
                            result.total += 1;
                            if limit.map_or(true, |max| result.records.len() < max) {
                                result.records.push(state.record);
                            }
                        }
                    } else if let Some(state) = item.as_mut() {
                        state.end_child(depth);
                    }
                    depth = depth.saturating_sub(1);
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(
                        "XML tokenizer stopped at byte {}: {} ({} items kept)",
                        reader.buffer_position(),
                        e,
                        result.total
                    );
                    break;
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shop_item(id: u32) -> String {
        format!(
            r#"<SHOPITEM>
                <ITEM_ID>{id}</ITEM_ID>
                <PRODUCTNAME><![CDATA[Phone {id} & case]]></PRODUCTNAME>
                <EAN>85901234{id:05}</EAN>
                <PRICE_VAT>199,90</PRICE_VAT>
                <IMGURL>https://img.example.com/{id}.jpg</IMGURL>
                <IMGURL_ALTERNATIVE>https://img.example.com/{id}-b.jpg</IMGURL_ALTERNATIVE>
                <IMGURL_ALTERNATIVE>https://img.example.com/{id}-c.jpg</IMGURL_ALTERNATIVE>
                <PARAM><PARAM_NAME>Color</PARAM_NAME><VAL>Black</VAL></PARAM>
                <PARAM><PARAM_NAME>Memory</PARAM_NAME><VAL>128 GB</VAL></PARAM>
            </SHOPITEM>"#
        )
    }

    fn shop(items: &[String]) -> Vec<u8> {
        format!("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<SHOP>{}</SHOP>", items.concat()).into_bytes()
    }

    #[test]
    fn test_three_items_with_params() {
        let data = shop(&[shop_item(1), shop_item(2), shop_item(3)]);
        let records = XmlExtractor::default().extract(&data);

        assert_eq!(records.len(), 3);
        for (i, record) in records.iter().enumerate() {
            let id = i + 1;
            assert_eq!(
                record.get("PRODUCTNAME"),
                Some(&RawValue::Text(format!("Phone {} & case", id)))
            );
            assert_eq!(
                record.get("EAN"),
                Some(&RawValue::Text(format!("85901234{:05}", id)))
            );
            assert_eq!(record.params.len(), 2);
            assert_eq!(record.params[0], Param::new("Color", "Black"));
            assert_eq!(record.params[1], Param::new("Memory", "128 GB"));
            assert_eq!(record.images.len(), 2);
            assert!(record.get("PARAM").is_none());
            assert!(record.get("IMGURL_ALTERNATIVE").is_none());
        }
    }

    #[test]
    fn test_entities_unescaped() {
        let data = b"<SHOP><SHOPITEM><PRODUCTNAME>Salt &amp; Pepper</PRODUCTNAME></SHOPITEM></SHOP>";
        let records = XmlExtractor::default().extract(data);
        assert_eq!(
            records[0].get("PRODUCTNAME"),
            Some(&RawValue::Text("Salt & Pepper".into()))
        );
    }

    #[test]
    fn test_empty_and_nested_children_omitted() {
        let data = br#"<SHOP><SHOPITEM>
            <PRODUCTNAME>Lamp</PRODUCTNAME>
            <DESCRIPTION></DESCRIPTION>
            <MANUFACTURER/>
            <DELIVERY><DELIVERY_ID>DPD</DELIVERY_ID></DELIVERY>
        </SHOPITEM></SHOP>"#;
        let records = XmlExtractor::default().extract(data);

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.fields.len(), 1);
        assert!(record.get("DESCRIPTION").is_none());
        assert!(record.get("DELIVERY").is_none());
        assert!(record.get("DELIVERY_ID").is_none());
    }

    #[test]
    fn test_inline_markup_keeps_all_words() {
        let data = br#"<SHOP><SHOPITEM>
            <DESCRIPTION>Fast <b>dual-SIM</b> phone with 5G</DESCRIPTION>
            <PRODUCTNAME>Foo <![CDATA[& Bar]]></PRODUCTNAME>
            <SHORT_DESCRIPTION><![CDATA[<p>Rich</p>]]> text</SHORT_DESCRIPTION>
        </SHOPITEM></SHOP>"#;
        let records = XmlExtractor::default().extract(data);

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(
            record.get("DESCRIPTION"),
            Some(&RawValue::Text("Fast dual-SIM phone with 5G".into()))
        );
        assert_eq!(record.get("PRODUCTNAME"), Some(&RawValue::Text("Foo & Bar".into())));
        assert_eq!(
            record.get("SHORT_DESCRIPTION"),
            Some(&RawValue::Text("<p>Rich</p> text".into()))
        );
        assert!(record.get("b").is_none());
    }

    #[test]
    fn test_param_values_keep_inner_spaces() {
        let data = b"<SHOP><SHOPITEM><PARAM><PARAM_NAME> Size </PARAM_NAME><VAL>EU <i>42</i></VAL></PARAM></SHOPITEM></SHOP>";
        let records = XmlExtractor::default().extract(data);
        assert_eq!(records[0].params, vec![Param::new("Size", "EU 42")]);
    }

    #[test]
    fn test_custom_item_element() {
        let data = b"<rss><channel><item><title>A</title></item><item><title>B</title></item></channel></rss>";
        let records = XmlExtractor::new("item").extract(data);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("title"), Some(&RawValue::Text("B".into())));
    }

    #[test]
    fn test_namespaced_item_element() {
        let data = b"<feed><g:entry><g:price>10</g:price></g:entry></feed>";
        let records = XmlExtractor::new("entry").extract(data);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("g:price"), Some(&RawValue::Text("10".into())));
    }

    #[test]
    fn test_truncated_document_keeps_complete_items() {
        let mut data = shop(&[shop_item(1), shop_item(2)]);
        data.extend_from_slice(b"<SHOPITEM><PRODUCTNAME>cut off");
        // Drop the closing </SHOP> so the tail is unterminated
        let text = String::from_utf8(data).unwrap().replace("</SHOP>", "");
        let records = XmlExtractor::default().extract(text.as_bytes());
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_wrong_format_yields_nothing() {
        assert!(XmlExtractor::default().extract(b"name,price\nfoo,1\n").is_empty());
        assert!(XmlExtractor::default().extract(b"{\"products\": []}").is_empty());
    }

    #[test]
    fn test_preview_counts_everything() {
        let items: Vec<String> = (1..=40).map(shop_item).collect();
        let preview = XmlExtractor::default().preview(&shop(&items));

        assert_eq!(preview.detected_type, FeedFormat::Xml);
        assert_eq!(preview.total_items, 40);
        assert_eq!(preview.sample.len(), 5);
        assert!(preview.fields.contains(&"PRODUCTNAME".to_string()));
        assert!(preview.fields.contains(&"PRICE_VAT".to_string()));
    }
}
