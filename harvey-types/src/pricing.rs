//! Pricing-context items, the cache key they resolve through, and the
//! cache entry state machine.

use crate::id::{BlobId, ItemId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a [`PricingContextItem`]'s raw value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// `value` is a URL to be resolved through the cache.
    Url,
    /// `value` is raw YAML text.
    Yaml,
}

/// Who placed an item into the working set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemOrigin {
    /// Supplied directly by the end user.
    User,
    /// Inferred from page content the user referenced.
    Detected,
    /// Drawn from a known preset.
    Preset,
    /// Added by the agent itself during a turn.
    Agent,
    /// Carried over from a related "sphere" of pricing pages.
    Sphere,
}

/// Transformation status of a `kind=url` item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum TransformState {
    /// No resolution attempted yet.
    NotStarted,
    /// Resolution is underway (waiting on the cache/extractor).
    Pending,
    /// Resolution succeeded.
    Done,
    /// Resolution failed terminally for this item.
    Failed {
        /// Human-readable cause.
        cause: String,
    },
}

/// An entity in the agent's working set: a pricing URL or an inline
/// YAML blob, plus its resolution state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingContextItem {
    /// Unique within the owning session.
    pub id: ItemId,
    /// Whether `value` is a URL or raw YAML.
    pub kind: ItemKind,
    /// Who added this item.
    pub origin: ItemOrigin,
    /// Raw URL or YAML text, depending on `kind`.
    pub value: String,
    /// Resolution state; always `Done` immediately for `kind=Yaml`.
    pub transform: TransformState,
    /// Reference into the blob store once a URL has been transformed.
    pub artifact_ref: Option<BlobId>,
    /// Optional human label shown in the UI.
    pub label: Option<String>,
    /// Whether this item arrived via `/upload`.
    pub uploaded: bool,
}

impl PricingContextItem {
    /// Build a `kind=yaml` item, which is immediately `Done` since no
    /// transformation is required.
    pub fn from_yaml(id: ItemId, origin: ItemOrigin, yaml: impl Into<String>) -> Self {
        Self {
            id,
            kind: ItemKind::Yaml,
            origin,
            value: yaml.into(),
            transform: TransformState::Done,
            artifact_ref: None,
            label: None,
            uploaded: false,
        }
    }

    /// Build a `kind=url` item, not yet resolved.
    pub fn from_url(id: ItemId, origin: ItemOrigin, url: impl Into<String>) -> Self {
        Self {
            id,
            kind: ItemKind::Url,
            origin,
            value: url.into(),
            transform: TransformState::NotStarted,
            artifact_ref: None,
            label: None,
            uploaded: false,
        }
    }

    /// `kind=yaml` items carry a non-empty value and url items with a
    /// `Done` transform carry an artifact reference; violating either
    /// is a bug at the construction site rather than a recoverable error.
    pub fn check_invariants(&self) -> Result<(), &'static str> {
        match self.kind {
            ItemKind::Yaml if self.value.is_empty() => {
                Err("yaml item must have non-empty value")
            }
            ItemKind::Url if matches!(self.transform, TransformState::Done) && self.artifact_ref.is_none() => {
                Err("done url item must carry an artifact_ref")
            }
            _ => Ok(()),
        }
    }
}

/// Canonical form of a URL, used as the cache key for C4. Two raw URLs
/// with distinct casing/ports/fragments but the same canonical form
/// collide deliberately.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct TransformationRequest {
    canonical_url: String,
}

impl TransformationRequest {
    /// Canonicalize `raw`: lowercase scheme+host, strip a default port
    /// for the scheme, drop the fragment. Falls back to a lowercased
    /// copy of the input if it isn't a well-formed `scheme://host/...`
    /// URL, so an unusual but non-empty string still yields a stable key.
    pub fn canonicalize(raw: &str) -> Self {
        let without_fragment = raw.split('#').next().unwrap_or(raw);

        let Some((scheme, rest)) = without_fragment.split_once("://") else {
            return Self {
                canonical_url: without_fragment.to_lowercase(),
            };
        };
        let scheme = scheme.to_lowercase();

        let (authority, path_and_query) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((h, p)) if p.chars().all(|c| c.is_ascii_digit()) => (h, Some(p)),
            _ => (authority, None),
        };
        let host = host.to_lowercase();

        let default_port = match scheme.as_str() {
            "http" => Some("80"),
            "https" => Some("443"),
            _ => None,
        };
        let keep_port = match (port, default_port) {
            (Some(p), Some(d)) if p == d => None,
            (Some(p), _) => Some(p),
            (None, _) => None,
        };

        let canonical_url = match keep_port {
            Some(p) => format!("{scheme}://{host}:{p}{path_and_query}"),
            None => format!("{scheme}://{host}{path_and_query}"),
        };

        Self { canonical_url }
    }

    /// The canonical string, suitable for use as a cache/map key.
    pub fn as_str(&self) -> &str {
        &self.canonical_url
    }
}

impl std::fmt::Display for TransformationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical_url)
    }
}

/// The cause of a failed cache-entry transformation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheErrorCause(pub String);

impl std::fmt::Display for CacheErrorCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of a single canonical-URL entry in the pricing-context cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum CacheEntry {
    /// No attempt has been made, or a prior `ready` entry expired.
    Empty,
    /// A transformation is underway; waiters attach here.
    InFlight {
        /// When the transformation started.
        started_at: DateTime<Utc>,
    },
    /// A transformation succeeded and is fresh (subject to TTL).
    Ready {
        /// The resolved YAML text.
        yaml: String,
        /// When it was fetched.
        fetched_at: DateTime<Utc>,
    },
    /// The most recent transformation failed.
    Error {
        /// Failure cause.
        cause: CacheErrorCause,
        /// When it failed.
        at: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_default_port_and_fragment() {
        let a = TransformationRequest::canonicalize("https://Example.com:443/pricing#plans");
        let b = TransformationRequest::canonicalize("https://example.com/pricing");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "https://example.com/pricing");
    }

    #[test]
    fn keeps_non_default_port() {
        let a = TransformationRequest::canonicalize("http://example.com:8080/x");
        assert_eq!(a.as_str(), "http://example.com:8080/x");
    }

    #[test]
    fn yaml_item_rejects_empty_value() {
        let item = PricingContextItem::from_yaml(ItemId::new("i1"), ItemOrigin::User, "");
        assert!(item.check_invariants().is_err());
    }
}
