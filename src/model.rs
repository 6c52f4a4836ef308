//! Input-side data model: tally categories and the per-table unit descriptor.
//!
//! A [`UnitDescriptor`] is produced once by the directory crawl (see
//! [`crate::directory`]) and is never mutated afterwards. Everything the
//! extraction pipeline needs to locate and identify one mesa lives here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One row of the tally table: a party code or an aggregate.
///
/// Declaration order is document order (top to bottom on the acta), and the
/// derived `Ord` follows it, so a `BTreeMap<Category, _>` iterates rows in
/// the order they are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "DC")]
    Dc,
    #[serde(rename = "LIBRE")]
    Libre,
    #[serde(rename = "PINU")]
    Pinu,
    #[serde(rename = "PLH")]
    Plh,
    #[serde(rename = "PNH")]
    Pnh,
    #[serde(rename = "BLANCO")]
    Blanco,
    #[serde(rename = "NULOS")]
    Nulos,
    #[serde(rename = "TOTAL")]
    Total,
}

impl Category {
    /// Every category, in document order.
    pub const ALL: [Category; 8] = [
        Category::Dc,
        Category::Libre,
        Category::Pinu,
        Category::Plh,
        Category::Pnh,
        Category::Blanco,
        Category::Nulos,
        Category::Total,
    ];

    /// The code printed on the acta and used as the JSON key / CSV header.
    pub fn code(self) -> &'static str {
        match self {
            Category::Dc => "DC",
            Category::Libre => "LIBRE",
            Category::Pinu => "PINU",
            Category::Plh => "PLH",
            Category::Pnh => "PNH",
            Category::Blanco => "BLANCO",
            Category::Nulos => "NULOS",
            Category::Total => "TOTAL",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Category::ALL
            .into_iter()
            .find(|c| c.code() == upper)
            .ok_or_else(|| format!("unknown category '{s}'"))
    }
}

/// Identifies one table ("mesa") to process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitDescriptor {
    pub department: String,
    pub municipality: String,
    pub zone: String,
    pub center: String,
    /// Table number, unique within its polling center.
    pub table_number: u32,
    /// Stable identifier assigned by the electoral authority.
    pub unit_id: String,
    /// Source document reference (usually an absolute URL), if published.
    pub document: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl UnitDescriptor {
    /// Whether the unit carries something that looks like a document reference.
    ///
    /// A reference qualifies when it contains `.pdf` (case-insensitive);
    /// query strings and odd URL shapes are accepted as long as that holds.
    pub fn has_document(&self) -> bool {
        self.document
            .as_deref()
            .map(looks_like_document)
            .unwrap_or(false)
    }
}

/// Returns `true` if `reference` looks like a PDF document reference.
pub fn looks_like_document(reference: &str) -> bool {
    !reference.trim().is_empty() && reference.to_lowercase().contains(".pdf")
}
