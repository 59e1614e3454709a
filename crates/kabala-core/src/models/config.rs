//! Configuration structures for the receipt pipeline.
//!
//! Every policy constant (tolerances, thresholds, windows, retry budget)
//! lives here so it can be overridden from a config file.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::receipt::{Category, CategoryCatalog};

/// Main configuration for kabala.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KabalaConfig {
    /// Field extraction configuration.
    pub extraction: ExtractionConfig,

    /// Confidence band values.
    pub confidence: ConfidenceConfig,

    /// Soft validation rules.
    pub validation: ValidationConfig,

    /// Duplicate detection policy.
    pub duplicate: DuplicateConfig,

    /// Search limits.
    pub search: SearchConfig,

    /// Background pipeline and OCR retry budget.
    pub pipeline: PipelineConfig,

    /// Category list.
    pub categories: Vec<Category>,
}

/// Field extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Canonical tax rate used to split a bare total (0.17 = 17%).
    pub tax_rate: Decimal,

    /// Currency symbol used for display.
    pub currency_symbol: String,

    /// Recognized text beyond this many characters is ignored.
    pub max_text_length: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(17, 2),
            currency_symbol: "₪".to_string(),
            max_text_length: 64 * 1024,
        }
    }
}

/// Confidence assigned to each match kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    /// Labelled match with checksum or structural confirmation (>= 0.85).
    pub validated: f32,

    /// Plain labelled match (0.70 - 0.84).
    pub pattern: f32,

    /// Arithmetically derived value (0.70 - 0.84).
    pub calculated: f32,

    /// Heuristic guess (< 0.70).
    pub fallback: f32,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            validated: 0.95,
            pattern: 0.80,
            calculated: 0.75,
            fallback: 0.50,
        }
    }
}

/// Soft validation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Allowed absolute difference between pre-tax + tax and total.
    pub tax_tolerance: Decimal,

    /// Fields below this confidence are flagged for review.
    pub review_confidence_threshold: f32,

    /// Oldest accepted document date, in years before today.
    pub retention_years: u32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            tax_tolerance: Decimal::new(2, 2),
            review_confidence_threshold: 0.80,
            retention_years: 7,
        }
    }
}

/// Duplicate detection policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateConfig {
    /// Minimum score (0 - 100) to call a duplicate.
    pub threshold: f64,

    /// Relative amount window for pre-filtering (0.05 = 5%).
    pub amount_window: Decimal,

    /// Date window in days for pre-filtering.
    pub date_window_days: i64,

    /// Relative difference below which amounts count as close.
    pub close_amount_ratio: Decimal,

    /// Bonus for close amounts.
    pub close_amount_bonus: f64,

    /// Bonus for the same calendar day.
    pub same_day_bonus: f64,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            threshold: 80.0,
            amount_window: Decimal::new(5, 2),
            date_window_days: 1,
            close_amount_ratio: Decimal::new(1, 2),
            close_amount_bonus: 5.0,
            same_day_bonus: 5.0,
        }
    }
}

/// Search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub max_limit: usize,
    pub min_query_len: usize,
    pub max_query_len: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
            min_query_len: 2,
            max_query_len: 100,
        }
    }
}

/// Background pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Retries after the first OCR attempt.
    pub max_retries: u32,

    /// Delay before the first retry.
    pub initial_backoff_ms: u64,

    /// Factor applied to the delay after each retry.
    pub backoff_multiplier: u32,

    /// Time budget for a single OCR attempt.
    pub attempt_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 2000,
            backoff_multiplier: 2,
            attempt_timeout_ms: 10_000,
        }
    }
}

impl PipelineConfig {
    /// Delay before retry number `retry` (1-based): 2s, 4s, 8s with defaults.
    pub fn backoff_ms(&self, retry: u32) -> u64 {
        let factor = u64::from(self.backoff_multiplier).saturating_pow(retry.saturating_sub(1));
        self.initial_backoff_ms.saturating_mul(factor)
    }
}

fn default_categories() -> Vec<Category> {
    [
        (1, "מזון ומשקאות"),
        (2, "תחבורה"),
        (3, "ציוד משרדי"),
        (4, "תקשורת"),
        (5, "מסעדות ואירוח"),
        (6, "שירותים מקצועיים"),
        (7, "אחזקה"),
        (8, "אחר"),
    ]
    .into_iter()
    .map(|(id, name)| Category {
        id,
        display_name: name.to_string(),
    })
    .collect()
}

impl KabalaConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }

    /// Category catalog, falling back to the built-in list when none is configured.
    pub fn category_catalog(&self) -> CategoryCatalog {
        if self.categories.is_empty() {
            CategoryCatalog::new(default_categories())
        } else {
            CategoryCatalog::new(self.categories.clone())
        }
    }
}
