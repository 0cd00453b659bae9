//! Typed ID wrappers for sessions, work orders, ledger entries, and friends.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed ID wrappers prevent mixing up session IDs, work-order IDs, etc.
/// These are just strings underneath — the kernel's ID *formats*
/// (`SES-<8 hex>`, `WO-<session>-<NNN>`, `LED-<8 hex>`) are produced by the
/// components that mint them, not enforced here.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new typed ID from anything that converts to String.
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

typed_id!(SessionId, "Unique identifier for a conversation session.");
typed_id!(WorkOrderId, "Unique identifier for a work order.");
typed_id!(LedgerId, "Unique identifier for a ledger entry.");
typed_id!(ProviderId, "Unique identifier for an LLM provider.");
typed_id!(ContractId, "Unique identifier for a prompt contract.");
typed_id!(ToolId, "Unique identifier for a registered tool handler.");
