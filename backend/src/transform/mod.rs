//! Transformation module.
//!
//! This module turns raw source cells into typed records:
//! - Rules: serializable rule specs and their compiled form
//! - Chain: per-column rule lists plus catch-all rules
//! - Normalizer: fixed-width rows through the chain
//! - Mapper: normalized rows to inventory records

pub mod chain;
pub mod mapper;
pub mod normalizer;
pub mod rules;

pub use chain::{default_rule_set, RuleSetConfig, TransformChain};
pub use mapper::map_record;
pub use normalizer::RowNormalizer;
pub use rules::{rules_description, RuleSpec, TransformRule};
