//! Type-safe identifier wrappers.
//!
//! Campaigns are identified by UUID v7 (time-ordered, assigned by the
//! collaborator that creates the campaign). Entities and quests inside a
//! document use stable, human-readable slug identifiers (`npc_goblin_1`,
//! `quest_missing_caravan`) because they appear verbatim in patches,
//! turn orders, and operator recovery directives. A slug, once assigned,
//! is never reused within a session.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Errors produced when constructing a slug identifier from raw text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The identifier was empty after trimming.
    #[error("identifier is empty")]
    Empty,

    /// The identifier contained a character outside `[a-z0-9_-]`.
    #[error("identifier {0:?} contains invalid characters (allowed: lowercase ascii, digits, '_', '-')")]
    InvalidCharacters(String),
}

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_uuid_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_uuid_id! {
    /// Unique identifier for a campaign (one authoritative document each).
    CampaignId
}

/// Generates a validated slug newtype used for in-document identifiers.
macro_rules! define_slug_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate raw text as a slug identifier.
            ///
            /// # Errors
            ///
            /// Returns [`IdError`] if the text is empty or contains
            /// characters outside `[a-z0-9_-]`.
            pub fn new(raw: &str) -> Result<Self, IdError> {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(IdError::Empty);
                }
                if !trimmed
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
                {
                    return Err(IdError::InvalidCharacters(trimmed.to_owned()));
                }
                Ok(Self(trimmed.to_owned()))
            }

            /// Derive a slug from free-form display text.
            ///
            /// Lowercases, maps whitespace runs to `_`, and drops every
            /// other disallowed character. Returns `None` when nothing
            /// usable remains (e.g. punctuation-only input).
            pub fn from_display_name(name: &str) -> Option<Self> {
                let mut slug = String::with_capacity(name.len());
                let mut last_was_sep = true;
                for c in name.trim().chars() {
                    if c.is_whitespace() {
                        if !last_was_sep {
                            slug.push('_');
                            last_was_sep = true;
                        }
                    } else if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                        slug.push(c.to_ascii_lowercase());
                        last_was_sep = false;
                    }
                }
                while slug.ends_with('_') {
                    slug.pop();
                }
                if slug.is_empty() { None } else { Some(Self(slug)) }
            }

            /// View the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(raw: String) -> Result<Self, Self::Error> {
                Self::new(&raw)
            }
        }

        impl core::str::FromStr for $name {
            type Err = IdError;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                Self::new(raw)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_slug_id! {
    /// Stable identifier for a narrative entity (actor, item, or location).
    EntityId
}

define_slug_id! {
    /// Stable identifier for a quest.
    QuestId
}
