use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! newtype_string {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Return the inner string as a str slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(
    RelyingParty,
    "The organization requesting access to a subject's records."
);
newtype_string!(CaseId, "A unit of work at a relying party.");
newtype_string!(
    SubjectId,
    "The individual whose records are being shared."
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_from_str() {
        let rp = RelyingParty::from("dwp");
        assert_eq!(rp.as_str(), "dwp");
        assert_eq!(&*rp, "dwp");
    }

    #[test]
    fn newtype_from_string() {
        let case = CaseId::from("4711".to_string());
        assert_eq!(case.to_string(), "4711");
    }

    #[test]
    fn newtype_serializes_transparently() {
        let id = SubjectId::new("nhs-999");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"nhs-999\"");
    }

    #[test]
    fn newtypes_order_lexically() {
        let mut ids = vec![CaseId::new("4712"), CaseId::new("4711")];
        ids.sort();
        assert_eq!(ids, vec![CaseId::new("4711"), CaseId::new("4712")]);
    }
}
