use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(ResourceId);
string_id!(FieldId);

/// The owner of every top-level resource in a workspace.
pub const ROOT_ID: &str = "_root";

impl ResourceId {
    pub fn root() -> Self {
        Self::new(ROOT_ID)
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT_ID
    }

    /// Allocate a fresh, time-ordered resource id.
    pub fn generate() -> Self {
        Self(format!("c{}", Uuid::now_v7().simple()))
    }
}

/// Principals (users, groups) are themselves resources.
pub type PrincipalId = ResourceId;

/// Marks a write that is visible before its version number is indexed.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommitMarker(Uuid);

impl CommitMarker {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for CommitMarker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CommitMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitMarker({})", &self.0.to_string()[..8])
    }
}

impl fmt::Display for CommitMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_not_root() {
        let a = ResourceId::generate();
        let b = ResourceId::generate();
        assert_ne!(a, b);
        assert!(!a.is_root());
        assert!(a.as_str().starts_with('c'));
    }

    #[test]
    fn root_is_well_known() {
        assert!(ResourceId::root().is_root());
        assert_eq!(ResourceId::from(ROOT_ID), ResourceId::root());
    }

    #[test]
    fn marker_bytes_roundtrip() {
        let marker = CommitMarker::new();
        assert_eq!(CommitMarker::from_bytes(*marker.as_bytes()), marker);
    }
}
