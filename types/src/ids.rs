//! Branded string identifiers.
//!
//! Sessions, windows, snapshot refs, and confirmations are all addressed by
//! short strings on the wire. Distinct newtypes keep them from being mixed
//! up inside the runtime.

use std::fmt;

macro_rules! branded_string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            #[must_use]
            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

branded_string_id!(
    /// Identifier of one tracked automation session.
    SessionId
);

branded_string_id!(
    /// Identifier of a window surface within a session.
    WindowId
);

branded_string_id!(
    /// Short identifier for an element within a snapshot.
    ///
    /// Only valid within the ref-map epoch that produced it.
    RefId
);

branded_string_id!(
    /// Identifier of a pending confirmation token.
    ConfirmationId
);

#[cfg(test)]
mod tests {
    use super::{RefId, SessionId, WindowId};

    #[test]
    fn ids_round_trip_through_serde_as_plain_strings() {
        let id = SessionId::new("s-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"s-1\"");
        let back: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn distinct_brands_display_their_inner_string() {
        assert_eq!(WindowId::new("w-9").to_string(), "w-9");
        assert_eq!(RefId::from("e3").as_str(), "e3");
    }
}
