//! Field mapping: vendor field names to the canonical record shape
//!
//! Mapping happens in two passes. Explicit per-feed entries are applied
//! first; every canonical field still empty afterwards is filled from the
//! first present, non-empty raw name in that field's synonym list.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use super::slug::truncate_chars;
use crate::types::{NormalizedRecord, RawRecord, RawValue};

/// Length of the short description derived from a long one
const SHORT_DESCRIPTION_CHARS: usize = 200;

/// Target attributes every vendor field is mapped onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    Title,
    Description,
    ShortDescription,
    Ean,
    Sku,
    Brand,
    ImageUrl,
    AffiliateUrl,
    CategoryPath,
    Price,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 10] = [
        CanonicalField::Title,
        CanonicalField::Description,
        CanonicalField::ShortDescription,
        CanonicalField::Ean,
        CanonicalField::Sku,
        CanonicalField::Brand,
        CanonicalField::ImageUrl,
        CanonicalField::AffiliateUrl,
        CanonicalField::CategoryPath,
        CanonicalField::Price,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::Title => "title",
            CanonicalField::Description => "description",
            CanonicalField::ShortDescription => "short_description",
            CanonicalField::Ean => "ean",
            CanonicalField::Sku => "sku",
            CanonicalField::Brand => "brand",
            CanonicalField::ImageUrl => "image_url",
            CanonicalField::AffiliateUrl => "affiliate_url",
            CanonicalField::CategoryPath => "category_path",
            CanonicalField::Price => "price",
        }
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CanonicalField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        if name == "category" {
            return Ok(CanonicalField::CategoryPath);
        }
        CanonicalField::ALL
            .into_iter()
            .find(|f| f.as_str() == name)
            .ok_or_else(|| format!("unknown canonical field: {}", s))
    }
}

/// Ordered raw-name candidates per canonical field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynonymTable {
    entries: HashMap<CanonicalField, Vec<String>>,
}

impl Default for SynonymTable {
    fn default() -> Self {
        let defaults: [(CanonicalField, &[&str]); 9] = [
            (
                CanonicalField::Title,
                &["PRODUCTNAME", "PRODUCT", "NAME", "NAZOV", "TITLE", "title", "name", "product_name"],
            ),
            (
                CanonicalField::Description,
                &["DESCRIPTION", "POPIS", "DESC", "description", "desc"],
            ),
            (
                CanonicalField::ShortDescription,
                &["SHORT_DESCRIPTION", "SHORT_DESC", "short_description"],
            ),
            (
                CanonicalField::Ean,
                &["EAN", "EAN13", "GTIN", "BARCODE", "ean", "gtin"],
            ),
            (
                CanonicalField::Sku,
                &["SKU", "ITEM_ID", "PRODUCTNO", "KOD", "sku", "item_id", "id"],
            ),
            (
                CanonicalField::Brand,
                &["MANUFACTURER", "BRAND", "VYROBCE", "ZNACKA", "brand", "manufacturer"],
            ),
            (
                CanonicalField::ImageUrl,
                &["IMGURL", "IMG_URL", "IMAGE", "OBRAZOK", "image_url", "imgurl", "image", "image_link"],
            ),
            (
                CanonicalField::AffiliateUrl,
                &["URL", "ITEM_URL", "PRODUCT_URL", "url", "link"],
            ),
            (
                CanonicalField::CategoryPath,
                &["CATEGORYTEXT", "CATEGORY", "KATEGORIA", "category", "category_path"],
            ),
        ];

        let mut entries: HashMap<CanonicalField, Vec<String>> = defaults
            .into_iter()
            .map(|(field, names)| (field, names.iter().map(|n| n.to_string()).collect()))
            .collect();
        entries.insert(
            CanonicalField::Price,
            ["PRICE_VAT", "PRICE", "CENA", "price", "price_vat", "sale_price"]
                .iter()
                .map(|n| n.to_string())
                .collect(),
        );

        Self { entries }
    }
}

impl SynonymTable {
    /// Built-in table with per-field lists replaced by `overrides`
    /// (keys are canonical field names)
    pub fn with_overrides(overrides: &HashMap<String, Vec<String>>) -> Result<Self, String> {
        let mut table = Self::default();
        for (field, names) in overrides {
            let field: CanonicalField = field.parse()?;
            table.entries.insert(field, names.clone());
        }
        Ok(table)
    }

    pub fn candidates(&self, field: CanonicalField) -> &[String] {
        self.entries.get(&field).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Coerce a raw price into a number.
///
/// Numbers pass through. Text has comma decimal separators turned into
/// dots, then everything but digits and dots removed. Anything that
/// still does not parse is zero.
pub fn coerce_price(value: &RawValue) -> f64 {
    match value {
        RawValue::Number(n) if n.is_finite() => *n,
        RawValue::Number(_) => 0.0,
        RawValue::Text(text) => {
            let cleaned: String = text
                .replace(',', ".")
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            cleaned.parse::<f64>().ok().filter(|n| n.is_finite()).unwrap_or(0.0)
        }
    }
}

/// Applies a feed's explicit mapping plus the synonym fallback
#[derive(Debug, Clone)]
pub struct FieldMapper {
    /// Raw field name -> canonical target, unknown targets dropped
    explicit: Vec<(String, CanonicalField)>,
    synonyms: SynonymTable,
}

impl FieldMapper {
    /// Build a mapper from a feed's mapping table. Entries whose target
    /// is not a canonical field are ignored.
    pub fn new(mapping: &HashMap<String, String>, synonyms: SynonymTable) -> Self {
        let mut explicit: Vec<(String, CanonicalField)> = mapping
            .iter()
            .filter_map(|(raw, target)| target.parse().ok().map(|field| (raw.clone(), field)))
            .collect();
        // HashMap order is arbitrary; keep results stable when two raw names target one field
        explicit.sort();
        Self { explicit, synonyms }
    }

    pub fn map(&self, raw: &RawRecord) -> NormalizedRecord {
        let mut values: HashMap<CanonicalField, &RawValue> = HashMap::new();

        for (raw_name, field) in &self.explicit {
            if values.contains_key(field) {
                continue;
            }
            if let Some(value) = raw.get(raw_name).filter(|v| !v.is_empty()) {
                values.insert(*field, value);
            }
        }

        for field in CanonicalField::ALL {
            if values.contains_key(&field) {
                continue;
            }
            let found = self
                .synonyms
                .candidates(field)
                .iter()
                .find_map(|name| raw.get(name).filter(|v| !v.is_empty()));
            if let Some(value) = found {
                values.insert(field, value);
            }
        }

        let text = |field: CanonicalField| values.get(&field).map(|v| v.as_text()).unwrap_or_default();

        let description = text(CanonicalField::Description);
        let mut short_description = text(CanonicalField::ShortDescription);
        if short_description.is_empty() && !description.is_empty() {
            short_description = truncate_chars(&description, SHORT_DESCRIPTION_CHARS).to_string();
        }

        let image_url = text(CanonicalField::ImageUrl);
        let gallery = raw
            .images
            .iter()
            .map(|url| url.trim())
            .filter(|url| !url.is_empty() && *url != image_url)
            .map(str::to_string)
            .collect();

        NormalizedRecord {
            title: text(CanonicalField::Title),
            description,
            short_description,
            ean: text(CanonicalField::Ean),
            sku: text(CanonicalField::Sku),
            brand: text(CanonicalField::Brand),
            image_url,
            affiliate_url: text(CanonicalField::AffiliateUrl),
            category_path: text(CanonicalField::CategoryPath),
            price: values.get(&CanonicalField::Price).map(|v| coerce_price(v)).unwrap_or(0.0),
            attributes: raw.params.clone(),
            gallery,
        }
    }
}
