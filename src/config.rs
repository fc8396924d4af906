//! Engine Configuration
//!
//! Immutable configuration handed to every engine entry point: brand
//! alias tables, synthetic labels, the long-tail threshold and the
//! dimension filters applied while normalizing records.

use crate::error::{IntelError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Brand alias table
///
/// Keys are matched case-insensitively after trimming. Substring rules are
/// consulted when no exact alias matches. Unrecognized names fall into
/// `catch_all` when set, otherwise the trimmed name is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrandAliases {
    /// Exact aliases: upper-cased source name -> canonical brand
    pub aliases: BTreeMap<String, String>,

    /// Substring rules: (upper-cased needle, canonical brand)
    pub contains: Vec<(String, String)>,

    /// Label for names that match nothing
    pub catch_all: Option<String>,
}

impl Default for BrandAliases {
    fn default() -> Self {
        Self::market_groups()
    }
}

impl BrandAliases {
    /// Fold to the tracked brand set; everything else becomes "Others"
    pub fn market_groups() -> Self {
        let mut aliases = BTreeMap::new();
        for parent in ["OPPO", "ONEPLUS", "REALME"] {
            aliases.insert(parent.to_string(), "Oppo".to_string());
        }
        for (key, canonical) in [
            ("APPLE", "Apple"),
            ("GOOGLE", "Google"),
            ("HONOR", "Honor"),
            ("HUAWEI", "Huawei"),
            ("SAMSUNG", "Samsung"),
            ("XIAOMI", "Xiaomi"),
            ("VIVO", "vivo"),
        ] {
            aliases.insert(key.to_string(), canonical.to_string());
        }
        Self {
            aliases,
            contains: Vec::new(),
            catch_all: Some("Others".to_string()),
        }
    }

    /// Fold sub-brands into their parent and keep every other name as-is
    pub fn parent_folding() -> Self {
        let aliases = ["OPPO", "REALME", "ONEPLUS"]
            .iter()
            .map(|k| (k.to_string(), "Oppo".to_string()))
            .collect();
        Self {
            aliases,
            contains: Vec::new(),
            catch_all: None,
        }
    }

    /// Sell-in grouping: Samsung reports as "MX", Transsion brands fold by substring
    pub fn sell_in_groups() -> Self {
        let mut aliases = BTreeMap::new();
        aliases.insert("SAMSUNG".to_string(), "MX".to_string());
        for parent in ["OPPO", "REALME", "ONEPLUS"] {
            aliases.insert(parent.to_string(), "Oppo".to_string());
        }
        for (key, canonical) in [
            ("APPLE", "Apple"),
            ("XIAOMI", "Xiaomi"),
            ("VIVO", "Vivo"),
            ("HONOR", "Honor"),
            ("HUAWEI", "Huawei"),
        ] {
            aliases.insert(key.to_string(), canonical.to_string());
        }
        Self {
            aliases,
            contains: vec![("TRANSSION".to_string(), "Transsion".to_string())],
            catch_all: Some("Others_Calc".to_string()),
        }
    }

    /// Map a raw brand name to its canonical label
    pub fn canonicalize(&self, name: &str) -> String {
        let trimmed = name.trim();
        let upper = trimmed.to_uppercase();

        if let Some(canonical) = self.aliases.get(&upper) {
            return canonical.clone();
        }

        if let Some((_, canonical)) = self
            .contains
            .iter()
            .find(|(needle, _)| upper.contains(needle.as_str()))
        {
            return canonical.clone();
        }

        match &self.catch_all {
            Some(bucket) => bucket.clone(),
            None => trimmed.to_string(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Brand alias table used by the record normalizer
    pub brands: BrandAliases,

    /// Label of the synthetic total row/column
    pub total_label: String,

    /// Label of the long-tail bucket
    pub others_label: String,

    /// Rows strictly below this baseline value are folded into Others
    pub others_threshold: f64,

    /// Dimension values dropped during normalization
    pub excluded_dimensions: Vec<String>,

    /// Source sheet name -> dimension value, for rows that carry no dimension column
    pub sheet_dimensions: BTreeMap<String, String>,

    /// Separator used when flattening multi-level pivot labels
    pub label_separator: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let sheet_dimensions = [
            ("Basefile_US", "US"),
            ("Basefile_China", "China"),
            ("Basefile_Japan", "Japan"),
            ("Basefile_Europe", "Europe"),
            ("Basefile_India", "India"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            brands: BrandAliases::market_groups(),
            total_label: "Total".to_string(),
            others_label: "Others".to_string(),
            others_threshold: 1_000_000.0,
            excluded_dimensions: vec![
                "East Europe".to_string(),
                "E.Europe".to_string(),
                "E. Europe".to_string(),
            ],
            sheet_dimensions,
            label_separator: " | ".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file; absent fields keep their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Same configuration with a different brand table
    pub fn with_brands(mut self, brands: BrandAliases) -> Self {
        self.brands = brands;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.total_label.trim().is_empty() || self.others_label.trim().is_empty() {
            return Err(IntelError::Config(
                "total_label and others_label must be non-empty".to_string(),
            ));
        }
        if self.total_label == self.others_label {
            return Err(IntelError::Config(format!(
                "total_label and others_label must differ (both are '{}')",
                self.total_label
            )));
        }
        if !self.others_threshold.is_finite() {
            return Err(IntelError::Config(format!(
                "others_threshold must be finite, got {}",
                self.others_threshold
            )));
        }
        if self.label_separator.is_empty() {
            return Err(IntelError::Config("label_separator must be non-empty".to_string()));
        }
        Ok(())
    }

    /// Whether a dimension value is on the exclusion list
    pub fn is_excluded_dimension(&self, value: &str) -> bool {
        let value = value.trim();
        self.excluded_dimensions
            .iter()
            .any(|excluded| excluded.trim().eq_ignore_ascii_case(value))
    }

    /// Dimension value implied by a source sheet name
    pub fn dimension_for_sheet(&self, sheet: &str) -> String {
        self.sheet_dimensions
            .get(sheet)
            .cloned()
            .unwrap_or_else(|| sheet.to_string())
    }

    pub fn is_synthetic(&self, label: &str) -> bool {
        label == self.total_label || label == self.others_label
    }
}
