//! Transform rules for cell normalization
//!
//! A [`RuleSpec`] is the serializable description of a rule (what a rule file
//! contains). Compiling it yields a [`TransformRule`], a total string-to-string
//! function that never fails at apply time.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::RuleError;

/// Upper bound on repeated passes when applying a rule or chain to a fixpoint
pub(crate) const MAX_PASSES: usize = 16;

/// All available rule kinds, as written in rule files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleSpec {
    /// Remove leading and trailing whitespace
    Trim,

    /// Replace every occurrence of a literal substring, until none is left
    Replace {
        from: String,
        #[serde(default)]
        to: String,
    },

    /// Delete every occurrence of the listed characters
    RemoveChars {
        chars: String,
    },

    /// Replace using regex pattern, until the value stops changing
    RegexReplace {
        pattern: String,
        #[serde(default)]
        value: String,
    },

    /// Replace the whole value using a lookup table; unmapped values pass through
    Map {
        mapping: BTreeMap<String, String>,
        #[serde(default)]
        case_insensitive: bool,
    },

    /// Convert to uppercase
    Uppercase,

    /// Convert to lowercase
    Lowercase,

    /// Collapse runs of whitespace into a single space
    CollapseWhitespace,

    /// Remove all non-digit characters
    DigitsOnly,
}

impl RuleSpec {
    pub fn replace(from: &str, to: &str) -> Self {
        RuleSpec::Replace {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn remove_chars(chars: &str) -> Self {
        RuleSpec::RemoveChars {
            chars: chars.to_string(),
        }
    }

    /// Validate and compile into an applicable rule.
    pub fn compile(&self) -> Result<TransformRule, RuleError> {
        let rule = match self {
            RuleSpec::Trim => TransformRule::Trim,
            RuleSpec::Replace { from, to } => {
                // An empty pattern matches everywhere, and a replacement that
                // contains the pattern grows the value on every pass.
                if from.is_empty() || to.contains(from.as_str()) {
                    return Err(RuleError::NotIdempotent {
                        from: from.clone(),
                        to: to.clone(),
                    });
                }
                TransformRule::Replace {
                    from: from.clone(),
                    to: to.clone(),
                }
            }
            RuleSpec::RemoveChars { chars } => TransformRule::RemoveChars(chars.chars().collect()),
            RuleSpec::RegexReplace { pattern, value } => {
                let regex = Regex::new(pattern).map_err(|e| RuleError::InvalidPattern {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })?;
                TransformRule::RegexReplace {
                    regex,
                    value: value.clone(),
                }
            }
            RuleSpec::Map {
                mapping,
                case_insensitive,
            } => {
                // A target that is itself mapped elsewhere would move again on the next pass
                for (source, target) in mapping {
                    if TransformRule::apply_map(target, mapping, *case_insensitive) != *target {
                        return Err(RuleError::NotIdempotent {
                            from: source.clone(),
                            to: target.clone(),
                        });
                    }
                }
                TransformRule::Map {
                    mapping: mapping.clone(),
                    case_insensitive: *case_insensitive,
                }
            }
            RuleSpec::Uppercase => TransformRule::Uppercase,
            RuleSpec::Lowercase => TransformRule::Lowercase,
            RuleSpec::CollapseWhitespace => TransformRule::CollapseWhitespace,
            RuleSpec::DigitsOnly => TransformRule::DigitsOnly,
        };
        Ok(rule)
    }
}

/// A compiled rule. Applying it cannot fail.
#[derive(Debug, Clone)]
pub enum TransformRule {
    Trim,
    Replace { from: String, to: String },
    RemoveChars(Vec<char>),
    RegexReplace { regex: Regex, value: String },
    Map {
        mapping: BTreeMap<String, String>,
        case_insensitive: bool,
    },
    Uppercase,
    Lowercase,
    CollapseWhitespace,
    DigitsOnly,
}

impl TransformRule {
    /// Apply this rule to a value
    pub fn apply(&self, value: &str) -> String {
        match self {
            TransformRule::Trim => value.trim().to_string(),
            TransformRule::Replace { from, to } => {
                let mut current = value.to_string();
                for _ in 0..MAX_PASSES {
                    if !current.contains(from.as_str()) {
                        break;
                    }
                    current = current.replace(from.as_str(), to);
                }
                current
            }
            TransformRule::RemoveChars(chars) => {
                value.chars().filter(|c| !chars.contains(c)).collect()
            }
            TransformRule::RegexReplace { regex, value: replacement } => {
                let mut current = value.to_string();
                for _ in 0..MAX_PASSES {
                    let next = regex.replace_all(&current, replacement.as_str()).into_owned();
                    if next == current {
                        break;
                    }
                    current = next;
                }
                current
            }
            TransformRule::Map {
                mapping,
                case_insensitive,
            } => Self::apply_map(value, mapping, *case_insensitive),
            TransformRule::Uppercase => value.to_uppercase(),
            TransformRule::Lowercase => value.to_lowercase(),
            TransformRule::CollapseWhitespace => value.split_whitespace().collect::<Vec<_>>().join(" "),
            TransformRule::DigitsOnly => value.chars().filter(|c| c.is_ascii_digit()).collect(),
        }
    }

    fn apply_map(value: &str, mapping: &BTreeMap<String, String>, case_insensitive: bool) -> String {
        let found = if case_insensitive {
            mapping
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(value))
                .map(|(_, v)| v)
        } else {
            mapping.get(value)
        };

        found.cloned().unwrap_or_else(|| value.to_string())
    }
}

/// Get a description of all rule kinds, for `--help`-style output
pub fn rules_description() -> String {
    r#"Available transform rules:

| Rule | Description | Parameters |
|------|-------------|------------|
| trim | Remove leading/trailing whitespace | - |
| replace | Literal substring replacement | from, to |
| remove_chars | Delete listed characters | chars |
| regex_replace | Regex replacement | pattern, value |
| map | Whole-value lookup table | mapping: {source: target}, case_insensitive |
| uppercase | Convert to uppercase | - |
| lowercase | Convert to lowercase | - |
| collapse_whitespace | Collapse whitespace runs | - |
| digits_only | Keep only digits | - |

Example rules in JSON:
[
  {"type": "trim"},
  {"type": "remove_chars", "chars": ","},
  {"type": "replace", "from": "Four-Wheel Drive", "to": "4WD"},
  {"type": "map", "mapping": {"Used": "Pre-Owned"}, "case_insensitive": true}
]"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(spec: RuleSpec, value: &str) -> String {
        spec.compile().unwrap().apply(value)
    }

    #[test]
    fn test_trim() {
        assert_eq!(apply(RuleSpec::Trim, "  hello  "), "hello");
    }

    #[test]
    fn test_replace_is_literal() {
        assert_eq!(apply(RuleSpec::replace("CVT", "Automatic"), "CVT"), "Automatic");
        assert_eq!(apply(RuleSpec::replace("a.b", "x"), "a.b acb"), "x acb");
    }

    #[test]
    fn test_remove_chars() {
        assert_eq!(apply(RuleSpec::remove_chars(",$"), "$12,345"), "12345");
    }

    #[test]
    fn test_regex_replace() {
        let spec = RuleSpec::RegexReplace {
            pattern: r"\s*cyl(inder)?s?$".to_string(),
            value: "-cyl".to_string(),
        };
        assert_eq!(apply(spec, "V8 cylinders"), "V8-cyl");
    }

    #[test]
    fn test_map() {
        let mut mapping = BTreeMap::new();
        mapping.insert("Used".to_string(), "Pre-Owned".to_string());

        let spec = RuleSpec::Map {
            mapping: mapping.clone(),
            case_insensitive: true,
        };
        assert_eq!(apply(spec, "used"), "Pre-Owned");

        // Unmapped values pass through unchanged
        let spec = RuleSpec::Map {
            mapping,
            case_insensitive: false,
        };
        assert_eq!(apply(spec.clone(), "used"), "used");
        assert_eq!(apply(spec, "New"), "New");
    }

    #[test]
    fn test_collapse_whitespace_and_digits() {
        assert_eq!(apply(RuleSpec::CollapseWhitespace, " 2.0L   Turbo  I4 "), "2.0L Turbo I4");
        assert_eq!(apply(RuleSpec::DigitsOnly, "4 doors"), "4");
    }

    #[test]
    fn test_non_idempotent_replace_rejected() {
        assert!(matches!(
            RuleSpec::replace("AWD", "AWD (All)").compile(),
            Err(RuleError::NotIdempotent { .. })
        ));
        assert!(matches!(
            RuleSpec::replace("", "x").compile(),
            Err(RuleError::NotIdempotent { .. })
        ));
    }

    #[test]
    fn test_shrinking_replace_reaches_fixpoint() {
        let rule = RuleSpec::replace("ab", "a").compile().unwrap();
        let once = rule.apply("abb");
        assert_eq!(once, "a");
        assert_eq!(rule.apply(&once), once);

        let rule = RuleSpec::replace("xy", "").compile().unwrap();
        assert_eq!(rule.apply("xxyy"), "");
    }

    #[test]
    fn test_regex_replace_reaches_fixpoint() {
        let spec = RuleSpec::RegexReplace {
            pattern: "--".to_string(),
            value: "-".to_string(),
        };
        let rule = spec.compile().unwrap();
        let once = rule.apply("a----b");
        assert_eq!(once, "a-b");
        assert_eq!(rule.apply(&once), once);
    }

    #[test]
    fn test_chained_map_rejected() {
        let mut mapping = BTreeMap::new();
        mapping.insert("Used".to_string(), "Pre-Owned".to_string());
        mapping.insert("Pre-Owned".to_string(), "Certified".to_string());
        let spec = RuleSpec::Map {
            mapping,
            case_insensitive: false,
        };
        assert!(matches!(
            spec.compile(),
            Err(RuleError::NotIdempotent { from, .. }) if from == "Used"
        ));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let spec = RuleSpec::RegexReplace {
            pattern: "(".to_string(),
            value: String::new(),
        };
        assert!(matches!(spec.compile(), Err(RuleError::InvalidPattern { .. })));
    }

    #[test]
    fn test_spec_json_shape() {
        let spec: RuleSpec =
            serde_json::from_str(r#"{"type": "replace", "from": "Pickup Truck", "to": "Pickup"}"#).unwrap();
        assert_eq!(spec, RuleSpec::replace("Pickup Truck", "Pickup"));

        let spec: RuleSpec = serde_json::from_str(r#"{"type": "trim"}"#).unwrap();
        assert_eq!(spec, RuleSpec::Trim);
    }
}
