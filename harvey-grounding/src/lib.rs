//! # harvey-grounding — grounding layer (C6)
//!
//! Maps free-form filter names supplied by a user or the LLM onto the
//! canonical feature/usage-limit names declared in an authoritative
//! pricing YAML, before any of it reaches the CSP solver. A name that
//! cannot be grounded never reaches `harvey-adapters`; it comes back as
//! a structured [`GroundingFailure`] the agent loop turns into a tool
//! observation.

#![deny(missing_docs)]

use std::collections::BTreeMap;

use harvey_types::GroundingError;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Crate-level error: either one of the taxonomy's [`GroundingError`]
/// variants, or the YAML failing to parse at all (a precondition
/// failure rather than a grounding rejection, but handled the same way
/// by callers, since the authoritative YAML is otherwise treated as
/// opaque-but-well-formed).
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GroundingFailure {
    /// A filter name or value was rejected against the YAML.
    #[error(transparent)]
    Grounding(#[from] GroundingError),

    /// The supplied text did not parse as the expected pricing YAML shape.
    #[error("malformed pricing yaml: {0}")]
    InvalidYaml(String),
}

/// A canonical usage limit declared by the pricing YAML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalUsageLimit {
    /// Canonical name as declared in the YAML.
    pub name: String,
    /// Declared unit, if any (e.g. `"users"`, `"requests"`).
    pub unit: Option<String>,
}

/// Canonical names parsed out of a pricing YAML document: the only
/// part of its (otherwise opaque) structure the grounding layer reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PricingSpec {
    /// Boolean feature names.
    pub features: Vec<String>,
    /// Numeric usage-limit names, with their declared unit.
    pub usage_limits: Vec<CanonicalUsageLimit>,
}

/// Parse the subset of a Pricing2Yaml document the grounding layer
/// needs: the top-level `features` and `usageLimits` (or `usage_limits`)
/// mappings/sequences. Everything else in the document is left opaque.
pub fn parse_spec(yaml: &str) -> Result<PricingSpec, GroundingFailure> {
    let doc: serde_yaml::Value =
        serde_yaml::from_str(yaml).map_err(|e| GroundingFailure::InvalidYaml(e.to_string()))?;

    let Some(mapping) = doc.as_mapping() else {
        return Err(GroundingFailure::InvalidYaml(
            "top-level document is not a mapping".to_string(),
        ));
    };

    let features = extract_names(mapping, &["features", "Features"]);
    let usage_limits = extract_usage_limits(mapping, &["usageLimits", "usage_limits", "UsageLimits"]);

    Ok(PricingSpec {
        features,
        usage_limits,
    })
}

fn lookup<'a>(mapping: &'a serde_yaml::Mapping, keys: &[&str]) -> Option<&'a serde_yaml::Value> {
    keys.iter()
        .find_map(|k| mapping.get(serde_yaml::Value::String((*k).to_string())))
}

fn extract_names(mapping: &serde_yaml::Mapping, keys: &[&str]) -> Vec<String> {
    let Some(value) = lookup(mapping, keys) else {
        return Vec::new();
    };
    match value {
        serde_yaml::Value::Mapping(m) => m
            .keys()
            .filter_map(|k| k.as_str().map(str::to_string))
            .collect(),
        serde_yaml::Value::Sequence(seq) => seq
            .iter()
            .filter_map(|item| match item {
                serde_yaml::Value::String(s) => Some(s.clone()),
                serde_yaml::Value::Mapping(m) => m
                    .get(serde_yaml::Value::String("name".to_string()))
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn extract_usage_limits(mapping: &serde_yaml::Mapping, keys: &[&str]) -> Vec<CanonicalUsageLimit> {
    let Some(value) = lookup(mapping, keys) else {
        return Vec::new();
    };
    let unit_of = |def: &serde_yaml::Value| -> Option<String> {
        def.as_mapping()
            .and_then(|m| m.get(serde_yaml::Value::String("unit".to_string())))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };
    match value {
        serde_yaml::Value::Mapping(m) => m
            .iter()
            .filter_map(|(k, v)| {
                k.as_str().map(|name| CanonicalUsageLimit {
                    name: name.to_string(),
                    unit: unit_of(v),
                })
            })
            .collect(),
        serde_yaml::Value::Sequence(seq) => seq
            .iter()
            .filter_map(|item| {
                let m = item.as_mapping()?;
                let name = m
                    .get(serde_yaml::Value::String("name".to_string()))?
                    .as_str()?
                    .to_string();
                Some(CanonicalUsageLimit {
                    name,
                    unit: unit_of(item),
                })
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Maximum Levenshtein distance at which a fuzzy name match is still
/// accepted. Exposed as a policy constant rather than a hardcoded
/// magic number at each call site.
pub const MAX_NAME_DISTANCE: usize = 3;

/// Find the canonical name matching `requested`, or `None` if no
/// candidate is within [`MAX_NAME_DISTANCE`].
///
/// Matching order: exact, case-insensitive, normalized (strip
/// non-alphanumerics + lowercase); ties among normalized candidates are
/// broken by closest Levenshtein distance.
fn ground_name<'a>(requested: &str, candidates: &'a [String]) -> Option<&'a str> {
    if let Some(exact) = candidates.iter().find(|c| c.as_str() == requested) {
        return Some(exact);
    }
    let lower = requested.to_lowercase();
    if let Some(ci) = candidates.iter().find(|c| c.to_lowercase() == lower) {
        return Some(ci);
    }

    let normalize = |s: &str| -> String {
        s.chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect()
    };
    let norm_requested = normalize(requested);
    if let Some(n) = candidates.iter().find(|c| normalize(c) == norm_requested) {
        return Some(n);
    }

    candidates
        .iter()
        .map(|c| (c, strsim::levenshtein(&norm_requested, &normalize(c))))
        .filter(|(_, dist)| *dist <= MAX_NAME_DISTANCE)
        .min_by_key(|(_, dist)| *dist)
        .map(|(c, _)| c.as_str())
}

/// One usage-limit constraint as supplied by a caller, before grounding.
///
/// The wire shape is a single-entry map, `{name: number}` — the
/// caller's usage-limit name is the map's one key, the requested bound
/// is its value. `unit` has no wire representation; it's only ever set
/// by code constructing one of these directly.
#[derive(Debug, Clone)]
pub struct UsageLimitFilter {
    /// Free-form name as typed by the user/LLM.
    pub name: String,
    /// The requested numeric bound.
    pub value: f64,
    /// Unit the caller believes `name` is denominated in, if known.
    /// Absent means "trust the canonical unit", so only an explicit
    /// mismatch is ever rejected.
    pub unit: Option<String>,
}

impl Serialize for UsageLimitFilter {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.name, &self.value)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for UsageLimitFilter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let map = BTreeMap::<String, f64>::deserialize(deserializer)?;
        let mut entries = map.into_iter();
        let (name, value) = entries
            .next()
            .ok_or_else(|| D::Error::custom("usage limit entry must have exactly one name"))?;
        if entries.next().is_some() {
            return Err(D::Error::custom("usage limit entry must have exactly one name"));
        }
        Ok(UsageLimitFilter { name, value, unit: None })
    }
}

/// The subset of a tool call's `filters` argument the grounding layer
/// normalizes. `minPrice`/`maxPrice` pass through
/// unchanged apart from the non-negativity check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterInput {
    /// Lower price bound, if any.
    #[serde(rename = "minPrice", default)]
    pub min_price: Option<f64>,
    /// Upper price bound, if any.
    #[serde(rename = "maxPrice", default)]
    pub max_price: Option<f64>,
    /// Free-form feature names; presence means "required true".
    #[serde(default)]
    pub features: Vec<String>,
    /// Free-form usage-limit constraints.
    #[serde(rename = "usageLimits", default)]
    pub usage_limits: Vec<UsageLimitFilter>,
}

/// A filter after every name has been verified against the YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundedFilter {
    /// Unchanged lower price bound.
    #[serde(rename = "minPrice")]
    pub min_price: Option<f64>,
    /// Unchanged upper price bound.
    #[serde(rename = "maxPrice")]
    pub max_price: Option<f64>,
    /// Canonical feature names, required true.
    pub features: Vec<String>,
    /// Canonical usage-limit name paired with its requested bound.
    #[serde(rename = "usageLimits")]
    pub usage_limits: Vec<(String, f64)>,
}

/// Ground `filter` against `spec`. Every name in the returned filter is
/// guaranteed to appear in `spec` — no hallucinated name ever
/// reaches the solver.
pub fn ground(spec: &PricingSpec, filter: &FilterInput) -> Result<GroundedFilter, GroundingFailure> {
    if matches!(filter.min_price, Some(p) if p < 0.0) || matches!(filter.max_price, Some(p) if p < 0.0) {
        return Err(GroundingError::InvalidRange("price bound must be non-negative".to_string()).into());
    }
    if let (Some(min), Some(max)) = (filter.min_price, filter.max_price) {
        if min > max {
            return Err(GroundingError::InvalidRange(format!(
                "minPrice {min} exceeds maxPrice {max}"
            ))
            .into());
        }
    }

    let mut features = Vec::with_capacity(filter.features.len());
    for requested in &filter.features {
        let canonical = ground_name(requested, &spec.features)
            .ok_or_else(|| GroundingError::UnknownFeature(requested.clone()))?;
        features.push(canonical.to_string());
    }

    let usage_limit_names: Vec<String> = spec.usage_limits.iter().map(|l| l.name.clone()).collect();
    let mut usage_limits = Vec::with_capacity(filter.usage_limits.len());
    for requested in &filter.usage_limits {
        let canonical = ground_name(&requested.name, &usage_limit_names)
            .ok_or_else(|| GroundingError::UnknownUsageLimit(requested.name.clone()))?
            .to_string();

        if let Some(provided_unit) = &requested.unit {
            let declared = spec
                .usage_limits
                .iter()
                .find(|l| l.name == canonical)
                .and_then(|l| l.unit.as_deref());
            if let Some(declared_unit) = declared {
                if declared_unit != provided_unit {
                    return Err(GroundingError::UnitMismatch {
                        name: canonical,
                        expected: declared_unit.to_string(),
                        provided: provided_unit.clone(),
                    }
                    .into());
                }
            }
        }

        usage_limits.push((canonical, requested.value));
    }

    // Dedup repeated canonical feature names deterministically, preserving
    // first-seen order so the downstream argument list stays stable.
    let mut seen: BTreeMap<String, ()> = BTreeMap::new();
    features.retain(|f| seen.insert(f.clone(), ()).is_none());

    Ok(GroundedFilter {
        min_price: filter.min_price,
        max_price: filter.max_price,
        features,
        usage_limits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_spec() -> PricingSpec {
        PricingSpec {
            features: vec!["SSO".to_string(), "Audit Log".to_string()],
            usage_limits: vec![CanonicalUsageLimit {
                name: "Users".to_string(),
                unit: Some("users".to_string()),
            }],
        }
    }

    #[test]
    fn parses_mapping_shaped_spec() {
        let yaml = "features:\n  SSO: {}\n  Audit Log: {}\nusageLimits:\n  Users:\n    unit: users\n";
        let spec = parse_spec(yaml).unwrap();
        assert_eq!(spec.features, vec!["SSO", "Audit Log"]);
        assert_eq!(spec.usage_limits[0].name, "Users");
        assert_eq!(spec.usage_limits[0].unit.as_deref(), Some("users"));
    }

    #[test]
    fn filter_input_accepts_documented_usage_limit_wire_shape() {
        let filter: FilterInput = serde_json::from_value(serde_json::json!({
            "features": ["SSO"],
            "usageLimits": [{"users": 10}],
        }))
        .unwrap();
        assert_eq!(filter.usage_limits[0].name, "users");
        assert_eq!(filter.usage_limits[0].value, 10.0);
        assert_eq!(filter.usage_limits[0].unit, None);
    }

    #[test]
    fn usage_limit_wire_shape_rejects_multi_key_entry() {
        let result: Result<FilterInput, _> = serde_json::from_value(serde_json::json!({
            "usageLimits": [{"users": 10, "seats": 5}],
        }));
        assert!(result.is_err());
    }

    #[test]
    fn exact_match_grounds_unchanged() {
        let spec = sample_spec();
        let filter = FilterInput {
            features: vec!["SSO".to_string()],
            ..Default::default()
        };
        let grounded = ground(&spec, &filter).unwrap();
        assert_eq!(grounded.features, vec!["SSO"]);
    }

    #[test]
    fn case_insensitive_and_normalized_match() {
        let spec = sample_spec();
        let filter = FilterInput {
            features: vec!["sso".to_string(), "auditlog".to_string()],
            ..Default::default()
        };
        let grounded = ground(&spec, &filter).unwrap();
        assert_eq!(grounded.features, vec!["SSO", "Audit Log"]);
    }

    #[test]
    fn unknown_feature_is_rejected_within_distance_cap() {
        let spec = sample_spec();
        let filter = FilterInput {
            features: vec!["SsoPlus".to_string()],
            ..Default::default()
        };
        let err = ground(&spec, &filter).unwrap_err();
        assert_eq!(
            err,
            GroundingFailure::Grounding(GroundingError::UnknownFeature("SsoPlus".to_string()))
        );
    }

    #[test]
    fn unit_mismatch_is_rejected() {
        let spec = sample_spec();
        let filter = FilterInput {
            usage_limits: vec![UsageLimitFilter {
                name: "Users".to_string(),
                value: 10.0,
                unit: Some("seats".to_string()),
            }],
            ..Default::default()
        };
        let err = ground(&spec, &filter).unwrap_err();
        assert!(matches!(
            err,
            GroundingFailure::Grounding(GroundingError::UnitMismatch { .. })
        ));
    }

    #[test]
    fn negative_price_is_rejected() {
        let spec = sample_spec();
        let filter = FilterInput {
            min_price: Some(-1.0),
            ..Default::default()
        };
        assert!(ground(&spec, &filter).is_err());
    }

    #[test]
    fn usage_limit_without_unit_passes_through() {
        let spec = sample_spec();
        let filter = FilterInput {
            usage_limits: vec![UsageLimitFilter {
                name: "users".to_string(),
                value: 10.0,
                unit: None,
            }],
            ..Default::default()
        };
        let grounded = ground(&spec, &filter).unwrap();
        assert_eq!(grounded.usage_limits, vec![("Users".to_string(), 10.0)]);
    }
}
