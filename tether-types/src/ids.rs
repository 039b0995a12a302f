use serde::{Deserialize, Serialize};
use smartstring::alias::String as SmartString;
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(SmartString);

        impl $name {
            pub fn new(id: impl Into<SmartString>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.into())
            }
        }
    };
}

string_id!(
    /// Client-visible identifier of a node, unique within its window
    RenderId
);

string_id!(
    /// Identifier of a window (session root) within an application
    WindowId
);

string_id!(
    /// Identifier of a top-level user session
    SessionId
);

impl RenderId {
    /// Render ids are `c_<sequence>`
    pub fn from_sequence(seq: u64) -> Self {
        let mut id = SmartString::new();
        id.push_str("c_");
        id.push_str(itoa::Buffer::new().format(seq));
        Self(id)
    }
}
