//! Identifier value objects
//!
//! All identifiers are opaque strings. Freshly allocated identifiers are
//! UUID v4 strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Allocate a new random identifier
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Borrow the raw identifier
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Value object: Project ID
    ProjectId
);
string_id!(
    /// Value object: Flow ID
    FlowId
);
string_id!(
    /// Value object: Flow version ID
    FlowVersionId
);
string_id!(
    /// Value object: Folder ID
    FolderId
);
string_id!(
    /// Value object: Flow instance ID
    FlowInstanceId
);
string_id!(
    /// Value object: Flow run ID
    FlowRunId
);
