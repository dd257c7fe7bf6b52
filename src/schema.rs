//! Canonical schema: the fixed set of semantic fields every source file is
//! reconciled against.
//!
//! A [`CanonicalField`] carries a stable key, the display label used for
//! canonical output columns and an ordered list of known spellings. The
//! [`CanonicalSchema`] is immutable reference data; field order drives both
//! mapping order and canonical column order.

use serde::{Deserialize, Serialize};

pub const PLANT_CODE: &str = "plant_code";
pub const COST_CENTER_CODE: &str = "cost_center_code";
pub const MACHINE_CODE: &str = "machine_code";
pub const MACHINE_NAME: &str = "machine_name";
pub const MATERIAL_NAME: &str = "material_name";

/// Keys the engine tries to autofill from freshly loaded data.
pub const AUTOFILL_KEYS: &[&str] = &[PLANT_CODE, COST_CENTER_CODE, MACHINE_CODE];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalField {
    pub key: String,
    pub label: String,
    pub synonyms: Vec<String>,
}

impl CanonicalField {
    pub fn new(key: &str, label: &str, synonyms: &[&str]) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Key followed by synonyms, the candidate order used by the column mapper.
    pub fn mapping_candidates(&self) -> Vec<&str> {
        std::iter::once(self.key.as_str())
            .chain(self.synonyms.iter().map(String::as_str))
            .collect()
    }

    /// Label, synonyms, then key: the candidate order used when the engine
    /// looks up a key column inside raw data.
    pub fn lookup_candidates(&self) -> Vec<&str> {
        std::iter::once(self.label.as_str())
            .chain(self.synonyms.iter().map(String::as_str))
            .chain(std::iter::once(self.key.as_str()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalSchema {
    fields: Vec<CanonicalField>,
}

impl CanonicalSchema {
    pub fn new(fields: Vec<CanonicalField>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[CanonicalField] {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&CanonicalField> {
        self.fields.iter().find(|field| field.key == key)
    }

    /// Display label for `key`, falling back to the key itself.
    pub fn label<'a>(&'a self, key: &'a str) -> &'a str {
        self.field(key)
            .map(|field| field.label.as_str())
            .unwrap_or(key)
    }

    pub fn labels(&self) -> Vec<&str> {
        self.fields.iter().map(|field| field.label.as_str()).collect()
    }
}

impl Default for CanonicalSchema {
    fn default() -> Self {
        Self::new(vec![
            CanonicalField::new(
                PLANT_CODE,
                "İş Yeri Kodu",
                &[
                    "iş yeri kodu",
                    "is yeri",
                    "iş yeri",
                    "plant",
                    "site",
                    "plant code",
                    "işyeri",
                    "isyeri",
                ],
            ),
            CanonicalField::new(
                COST_CENTER_CODE,
                "Masraf Yeri Kodu",
                &[
                    "masraf yeri kodu",
                    "masraf yeri",
                    "cost center",
                    "cost centre",
                    "cc",
                    "masraf kodu",
                ],
            ),
            CanonicalField::new(
                MACHINE_CODE,
                "Makine Kodu",
                &[
                    "makine kodu",
                    "makina kodu",
                    "ekipman kodu",
                    "equipment code",
                    "asset code",
                ],
            ),
            CanonicalField::new(
                MACHINE_NAME,
                "Makine Adı",
                &[
                    "makine adı",
                    "makina adi",
                    "ekipman adı",
                    "equipment name",
                    "asset name",
                ],
            ),
            CanonicalField::new(
                MATERIAL_NAME,
                "Malzeme Adı",
                &[
                    "malzeme adı",
                    "malzeme adi",
                    "stok adı",
                    "material name",
                    "item name",
                ],
            ),
        ])
    }
}
