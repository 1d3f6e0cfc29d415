//! Transform chain definition
//!
//! The chain holds, per column, an ordered list of compiled rules plus a
//! catch-all list applied to every column afterwards. It is built once at
//! startup and shared read-only by the normalizer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::rules::{RuleSpec, TransformRule, MAX_PASSES};
use crate::error::RuleError;
use crate::models::{InventoryColumn, COLUMN_COUNT};

/// Serializable rule set, as stored in a rule file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSetConfig {
    /// Version of the rule file format
    #[serde(default = "default_version")]
    pub version: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Per-column rules: key = column index or field name
    #[serde(default)]
    pub columns: BTreeMap<String, Vec<RuleSpec>>,

    /// Rules applied to every column after its own rules
    #[serde(default)]
    pub catch_all: Vec<RuleSpec>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl RuleSetConfig {
    /// Parse from JSON string
    pub fn from_json(json: &str) -> Result<Self, RuleError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Compiled, immutable per-column rule chain
#[derive(Debug, Clone, Default)]
pub struct TransformChain {
    columns: BTreeMap<usize, Vec<TransformRule>>,
    catch_all: Vec<TransformRule>,
}

impl TransformChain {
    /// Chain with no rules at all (identity on every column)
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule to a column's list
    pub fn with_rule(mut self, column: InventoryColumn, rule: TransformRule) -> Self {
        self.columns.entry(column.index()).or_default().push(rule);
        self
    }

    /// Append a rule to the catch-all list
    pub fn with_catch_all(mut self, rule: TransformRule) -> Self {
        self.catch_all.push(rule);
        self
    }

    /// Compile a rule set, resolving column keys
    pub fn from_config(config: &RuleSetConfig) -> Result<Self, RuleError> {
        let mut columns: BTreeMap<usize, Vec<TransformRule>> = BTreeMap::new();

        for (key, specs) in &config.columns {
            let column = InventoryColumn::parse_key(key)
                .ok_or_else(|| RuleError::UnknownColumn(key.clone()))?;
            let compiled = specs
                .iter()
                .map(RuleSpec::compile)
                .collect::<Result<Vec<_>, _>>()?;
            // "4" and "mileage" name the same column; keep key order
            columns.entry(column.index()).or_default().extend(compiled);
        }

        let catch_all = config
            .catch_all
            .iter()
            .map(RuleSpec::compile)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { columns, catch_all })
    }

    /// Parse and compile a JSON rule set
    pub fn from_json(json: &str) -> Result<Self, RuleError> {
        Self::from_config(&RuleSetConfig::from_json(json)?)
    }

    /// Load and compile a rule file
    pub fn from_file(path: &Path) -> Result<Self, RuleError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// The default inventory rules
    pub fn inventory_defaults() -> Self {
        // The default rule set only holds literal rules over known columns.
        Self::from_config(&default_rule_set()).unwrap_or_default()
    }

    /// Normalize one cell: column rules first, then the catch-all rules.
    ///
    /// The whole sequence is repeated until the value stops changing, so a
    /// later rule can never leave behind input for an earlier one.
    pub fn apply(&self, column: usize, raw: &str) -> String {
        let specific = self.columns.get(&column).map(Vec::as_slice).unwrap_or(&[]);

        let mut current = raw.to_string();
        for _ in 0..MAX_PASSES {
            let next = specific
                .iter()
                .chain(self.catch_all.iter())
                .fold(current.clone(), |acc, rule| rule.apply(&acc));
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    /// Number of rules configured for a column (excluding catch-all)
    pub fn rule_count(&self, column: usize) -> usize {
        self.columns.get(&column).map_or(0, Vec::len)
    }

    /// Number of catch-all rules
    pub fn catch_all_count(&self) -> usize {
        self.catch_all.len()
    }

    /// Total rules across the chain
    pub fn len(&self) -> usize {
        self.columns.values().map(Vec::len).sum::<usize>() + self.catch_all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Rule set used when no rule file is configured
pub fn default_rule_set() -> RuleSetConfig {
    let mut columns = BTreeMap::new();

    let mut column = |c: InventoryColumn, rules: Vec<RuleSpec>| {
        columns.insert(c.index().to_string(), rules);
    };

    column(InventoryColumn::Year, vec![RuleSpec::Trim]);
    column(
        InventoryColumn::Mileage,
        vec![RuleSpec::Trim, RuleSpec::remove_chars(",")],
    );
    column(
        InventoryColumn::Transmission,
        vec![RuleSpec::replace("CVT", "Automatic")],
    );
    column(
        InventoryColumn::DriveTrain,
        vec![
            RuleSpec::replace("Four-Wheel Drive", "4WD"),
            RuleSpec::replace("All-Wheel Drive", "AWD"),
            RuleSpec::replace("Rear-Wheel Drive", "RWD"),
            RuleSpec::replace("Front-Wheel Drive", "FWD"),
        ],
    );
    column(
        InventoryColumn::FuelType,
        vec![RuleSpec::replace("Plug-in Hybrid", "Hybrid")],
    );
    column(
        InventoryColumn::BodyStyle,
        vec![RuleSpec::replace("Pickup Truck", "Pickup")],
    );
    column(InventoryColumn::NumberOfSeats, vec![RuleSpec::Trim]);
    column(InventoryColumn::Doors, vec![RuleSpec::Trim]);
    column(InventoryColumn::Notes, vec![RuleSpec::Trim]);

    RuleSetConfig {
        version: default_version(),
        description: format!("Default vehicle inventory normalization ({COLUMN_COUNT} columns)"),
        columns,
        catch_all: Vec::new(),
    }
}
