//! Typed ID wrappers so session, item, job and request identifiers can't
//! be mixed up at a call site.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new typed ID from anything that converts to a `String`.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

typed_id!(SessionId, "Unique identifier for a chat session/conversation.");
typed_id!(ItemId, "Unique identifier for a PricingContextItem within a session.");
typed_id!(JobId, "Unique identifier for a remote analysis job.");
typed_id!(BlobId, "Opaque identifier for a stored YAML blob.");

/// Generate an opaque id. Not a UUID requirement of the protocol — just
/// a convenient, collision-resistant default for callers that don't
/// supply their own.
pub fn new_opaque_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_ids_display_inner_string() {
        let s = SessionId::new("abc-123");
        assert_eq!(s.to_string(), "abc-123");
        assert_eq!(s.as_str(), "abc-123");
    }

    #[test]
    fn opaque_ids_are_not_trivially_equal() {
        assert_ne!(new_opaque_id(), new_opaque_id());
    }
}
