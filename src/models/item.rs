//! Item record model.
//!
//! The serialized field names are read by the enrichment job and the query
//! pipeline (`wine_description`, `vinification`, `sensory_profile.*`,
//! `info_table.variety_table`) and must not change.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tasting aspect of the sensory profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SensoryAspect {
    #[serde(rename = "cata_visual")]
    Visual,
    #[serde(rename = "cata_olfativa")]
    Olfactory,
    #[serde(rename = "cata_gustativa")]
    Gustatory,
    #[serde(rename = "maridaje")]
    Pairing,
}

impl SensoryAspect {
    pub const ALL: [SensoryAspect; 4] = [
        SensoryAspect::Visual,
        SensoryAspect::Olfactory,
        SensoryAspect::Gustatory,
        SensoryAspect::Pairing,
    ];

    /// Heading label that introduces this aspect on an item page (lowercase).
    pub fn label(&self) -> &'static str {
        match self {
            SensoryAspect::Visual => "cata visual",
            SensoryAspect::Olfactory => "cata olfativa",
            SensoryAspect::Gustatory => "cata gustativa",
            SensoryAspect::Pairing => "maridaje",
        }
    }

    /// Match a heading text against the known labels (case-insensitive substring).
    pub fn from_heading(text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|aspect| lower.contains(aspect.label()))
    }
}

/// Attribute names recognized in the info table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKey {
    #[serde(rename = "denominacion")]
    Appellation,
    #[serde(rename = "ubicacion")]
    Location,
    #[serde(rename = "coordenadas")]
    Coordinates,
    VarietyTable,
    #[serde(rename = "crianza")]
    Aged,
    #[serde(rename = "tiempo_barrica")]
    BarrelMonths,
    #[serde(rename = "tipo_barrica")]
    BarrelType,
    #[serde(rename = "grado")]
    AlcoholGrade,
    #[serde(rename = "temperatura")]
    ServingTemperature,
    #[serde(rename = "botella")]
    BottleSize,
}

/// Approximate coordinate pair attached to a location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// Typed info-table value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Flag(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
    Coordinates(Coordinates),
}

impl AttributeValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            AttributeValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

pub type Attributes = BTreeMap<AttributeKey, AttributeValue>;

/// Awards block: structured rows, or a free-text fallback when no rows parsed.
/// Rows are nested under `rows`, apart from the fallback `summary`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Awards {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rows: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Awards {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.summary.is_none()
    }
}

/// Result of one extraction pass over a rendered item page.
///
/// Every field except `url` is independently optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedItem {
    pub url: String,
    #[serde(rename = "wine_name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "winery", default, skip_serializing_if = "Option::is_none")]
    pub producer: Option<String>,
    #[serde(rename = "wine_description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appellation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sensory_profile: BTreeMap<SensoryAspect, String>,
    #[serde(rename = "vinification", default, skip_serializing_if = "Option::is_none")]
    pub production_notes: Option<String>,
    #[serde(rename = "info_table", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "Awards::is_empty")]
    pub awards: Awards,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

impl ExtractedItem {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Location text from the info table, if the page had one.
    pub fn location(&self) -> Option<&str> {
        self.attributes
            .get(&AttributeKey::Location)
            .and_then(AttributeValue::as_text)
    }
}

/// An extracted item with its identity assigned; the unit submitted to the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: String,
    pub captured_at: DateTime<Utc>,
    #[serde(flatten)]
    pub item: ExtractedItem,
}
