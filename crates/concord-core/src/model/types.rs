//! Identifier types shared by every engine.
//!
//! Two families of identifiers live here:
//!
//! - **Validated names** supplied by collaborators: [`AgentId`] and
//!   [`DocumentPath`]. They are checked on construction and on
//!   deserialization.
//! - **Opaque ids** generated by the core: [`OperationId`], [`LockId`],
//!   [`ConflictId`] and [`ChangeId`]. Collaborators must treat them as
//!   unstructured keys. `ChangeId`s may also be supplied by agents so that
//!   `depends_on` can reference them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// Which identifier failed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IdentifierKind {
    /// An [`AgentId`].
    Agent,
    /// A [`DocumentPath`].
    Document,
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agent => write!(f, "agent id"),
            Self::Document => write!(f, "document path"),
        }
    }
}

/// A collaborator-supplied identifier was rejected.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} '{value}': {reason}")]
pub struct ValidationError {
    /// What was being validated.
    pub kind: IdentifierKind,
    /// The rejected value.
    pub value: String,
    /// Why it was rejected.
    pub reason: String,
}

const MAX_AGENT_ID_LEN: usize = 128;

fn validate_name(kind: IdentifierKind, s: &str, max_len: Option<usize>) -> Result<(), ValidationError> {
    let reject = |reason: String| ValidationError {
        kind,
        value: s.to_owned(),
        reason,
    };
    if s.trim().is_empty() {
        return Err(reject("must not be empty".to_owned()));
    }
    if let Some(max) = max_len
        && s.chars().count() > max
    {
        return Err(reject(format!("must be at most {max} characters")));
    }
    if s.chars().any(char::is_control) {
        return Err(reject("must not contain control characters".to_owned()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// AgentId
// ---------------------------------------------------------------------------

/// Identity of a submitting agent (e.g. `"typist"`, `"assistant"`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentId(String);

impl AgentId {
    /// Create a validated agent id.
    ///
    /// # Errors
    /// Returns an error if the id is blank, longer than 128 characters, or
    /// contains control characters.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        validate_name(IdentifierKind::Agent, s, Some(MAX_AGENT_ID_LEN))?;
        Ok(Self(s.to_owned()))
    }

    /// Return the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AgentId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for AgentId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        validate_name(IdentifierKind::Agent, &s, Some(MAX_AGENT_ID_LEN))?;
        Ok(Self(s))
    }
}

impl From<AgentId> for String {
    fn from(id: AgentId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// DocumentPath
// ---------------------------------------------------------------------------

/// The document an operation targets. Each path owns an independent queue,
/// lock and activity history.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentPath(String);

impl DocumentPath {
    /// Create a validated document path.
    ///
    /// # Errors
    /// Returns an error if the path is blank or contains control characters.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        validate_name(IdentifierKind::Document, s, None)?;
        Ok(Self(s.to_owned()))
    }

    /// Return the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DocumentPath {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for DocumentPath {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        validate_name(IdentifierKind::Document, &s, None)?;
        Ok(Self(s))
    }
}

impl From<DocumentPath> for String {
    fn from(path: DocumentPath) -> Self {
        path.0
    }
}

// ---------------------------------------------------------------------------
// Opaque ids
// ---------------------------------------------------------------------------

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing identifier string.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a fresh random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(format!(concat!($prefix, "-{:016x}"), rand::random::<u64>()))
            }

            /// Return the identifier as a string slice.
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

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

opaque_id!(
    /// Identifier of a submitted [`Operation`](super::operation::Operation).
    OperationId,
    "op"
);
opaque_id!(
    /// Identifier of a [`Change`](super::change::Change) within an operation.
    ChangeId,
    "chg"
);
opaque_id!(
    /// Identifier of a document lock.
    LockId,
    "lock"
);
opaque_id!(
    /// Identifier of a detected [`Conflict`](super::conflict::Conflict).
    ConflictId,
    "conflict"
);
