//! Delimited-text feed extractor

use tracing::debug;

use super::source::{FeedExtractor, ScanResult};
use crate::types::{FeedFormat, RawRecord, RawValue};

/// Candidate delimiters, in tie-break order
const DELIMITERS: [u8; 3] = [b',', b';', b'\t'];

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// CSV extractor with delimiter auto-detection
///
/// The first line is the header. Rows with a wrong field count are kept
/// (missing trailing fields are simply absent); rows the reader cannot
/// decode at all are skipped.
#[derive(Debug, Clone, Default)]
pub struct CsvExtractor {
    delimiter: Option<u8>,
}

impl CsvExtractor {
    pub fn new() -> Self {
        Self { delimiter: None }
    }

    /// Force a delimiter instead of detecting one
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }
}

/// Pick the most frequent of comma, semicolon and tab in the header line.
/// Ties go to the earlier candidate; no candidate at all means comma.
pub fn detect_delimiter(data: &[u8]) -> u8 {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
    let header = data.split(|&b| b == b'\n').next().unwrap_or_default();

    let mut best = DELIMITERS[0];
    let mut best_count = 0;
    for delimiter in DELIMITERS {
        let count = header.iter().filter(|&&b| b == delimiter).count();
        if count > best_count {
            best = delimiter;
            best_count = count;
        }
    }
    best
}

impl FeedExtractor for CsvExtractor {
    fn format(&self) -> FeedFormat {
        FeedFormat::Csv
    }

    fn scan(&self, data: &[u8], limit: Option<usize>) -> ScanResult {
        let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
        let delimiter = self.delimiter.unwrap_or_else(|| detect_delimiter(data));

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(data);

        let header: Vec<String> = match reader.byte_headers() {
            Ok(headers) => headers
                .iter()
                .map(|h| String::from_utf8_lossy(h).trim().to_string())
                .collect(),
            Err(e) => {
                debug!("CSV header unreadable: {}", e);
                return ScanResult::default();
            }
        };
        if header.iter().all(|h| h.is_empty()) {
            return ScanResult::default();
        }

        let mut result = ScanResult {
            header: header.iter().filter(|h| !h.is_empty()).cloned().collect(),
            ..Default::default()
        };

        for row in reader.byte_records() {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    debug!("Skipping unreadable CSV row: {}", e);
                    continue;
                }
            };
            if row.iter().all(|field| field.iter().all(u8::is_ascii_whitespace)) {
                continue;
            }

            result.total += 1;
            if limit.is_some_and(|max| result.records.len() >= max) {
                continue;
            }

            let mut record = RawRecord::new();
            for (name, value) in header.iter().zip(row.iter()) {
                if name.is_empty() {
                    continue;
                }
                let value = String::from_utf8_lossy(value);
                record.insert_first(name.clone(), RawValue::Text(value.trim().to_string()));
            }
            result.records.push(record);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delimiter_detection() {
        assert_eq!(detect_delimiter(b"a;b;c\n1;2;3"), b';');
        assert_eq!(detect_delimiter(b"a,b,c\n1,2,3"), b',');
        assert_eq!(detect_delimiter(b"a\tb\tc\n"), b'\t');
        assert_eq!(detect_delimiter(b"name;desc,with,commas\n"), b',');
        assert_eq!(detect_delimiter(b"single\n1\n"), b',');
        // Tie: comma wins over semicolon
        assert_eq!(detect_delimiter(b"a,b;c\n"), b',');
    }

    #[test]
    fn test_semicolon_feed() {
        let data = "\u{feff}NAZOV;CENA;EAN\nStolička;49,90;8590000000011\nLampa;12,00;8590000000028\n";
        let scan = CsvExtractor::new().scan(data.as_bytes(), None);

        assert_eq!(scan.header, vec!["NAZOV", "CENA", "EAN"]);
        assert_eq!(scan.total, 2);
        assert_eq!(
            scan.records[0].get("NAZOV"),
            Some(&RawValue::Text("Stolička".into()))
        );
        assert_eq!(scan.records[0].get("CENA"), Some(&RawValue::Text("49,90".into())));
    }

    #[test]
    fn test_ragged_rows_tolerated() {
        let data = b"name,price,ean\nshort,1\nlong,2,123,extra\n,,\nquoted \"inch\" tv,3,456\n";
        let scan = CsvExtractor::new().scan(data, None);

        assert_eq!(scan.total, 3);
        assert_eq!(scan.records[0].fields.len(), 2);
        assert_eq!(scan.records[1].get("ean"), Some(&RawValue::Text("123".into())));
        assert_eq!(
            scan.records[2].get("name"),
            Some(&RawValue::Text("quoted \"inch\" tv".into()))
        );
    }

    #[test]
    fn test_quoted_delimiters() {
        let data = b"title,description,price\n\"Desk, oak\",\"Solid, heavy\",\"1 299,00\"\n";
        let records = CsvExtractor::new().extract(data);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("title"), Some(&RawValue::Text("Desk, oak".into())));
        assert_eq!(records[0].get("price"), Some(&RawValue::Text("1 299,00".into())));
    }

    #[test]
    fn test_preview_uses_header_fields() {
        let mut data = String::from("sku\tname\tprice\n");
        for i in 0..100 {
            data.push_str(&format!("S{}\tItem {}\t{}\n", i, i, i + 1));
        }
        let preview = CsvExtractor::new().preview(data.as_bytes());
        assert_eq!(preview.total_items, 100);
        assert_eq!(preview.sample.len(), 5);
        assert_eq!(preview.fields, vec!["name", "price", "sku"]);
    }

    #[test]
    fn test_empty_input() {
        let scan = CsvExtractor::new().scan(b"", None);
        assert_eq!(scan.total, 0);
        assert!(scan.records.is_empty());
    }
}
