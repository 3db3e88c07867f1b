//! Error types for resolution, registration and lifecycle operations

use thiserror::Error;

/// The ordered stack of keys that were being constructed when an error
/// surfaced, rendered as `A → B → C` in error messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionChain {
    keys: Vec<String>,
}

impl ResolutionChain {
    /// An empty chain (no resolution in flight).
    #[inline]
    pub fn empty() -> Self {
        Self { keys: Vec::new() }
    }

    /// Build a chain from already-rendered key names.
    #[inline]
    pub fn from_keys(keys: Vec<String>) -> Self {
        Self { keys }
    }

    /// The rendered key names, outermost first.
    #[inline]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }
}

impl std::fmt::Display for ResolutionChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.keys.join(" → "))
    }
}

/// Render the optional chain suffix used by several error messages.
fn chain_suffix(chain: &ResolutionChain) -> String {
    if chain.is_empty() {
        String::new()
    } else {
        format!(" (resolution chain: {chain})")
    }
}

/// Render the optional free-form detail suffix.
fn detail_suffix(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!("; {detail}")
    }
}

/// Render accumulated validation problems as a numbered list.
fn numbered(problems: &[String]) -> String {
    problems
        .iter()
        .enumerate()
        .map(|(i, p)| format!("  {}. {}", i + 1, p))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Errors surfaced by container, scope and dispatcher operations.
///
/// Every error carries the implicated key and, where one was available,
/// the resolution chain that led to it.
#[derive(Error, Debug, Clone)]
pub enum DiError {
    /// The dependency graph loops back onto a key already under construction.
    #[error("marionette: circular dependency detected: {chain}")]
    CircularDependency { chain: ResolutionChain },

    /// No registration exists for the requested key.
    #[error("marionette: no registration for {key}{}{}", chain_suffix(chain), detail_suffix(detail))]
    MissingRegistration {
        key: String,
        chain: ResolutionChain,
        detail: String,
    },

    /// A token was not minted by the reflection registry in use.
    #[error("marionette: invalid token: {detail}")]
    InvalidToken { detail: String },

    /// A lifetime rule was broken (scoped resolve without a scope, warmup on
    /// a non-singleton, operations on a destroyed scope, ...).
    #[error("marionette: lifetime violation on {key}: {detail}")]
    LifetimeViolation { key: String, detail: String },

    /// A constructor failed. The failure is wrapped exactly once; an error
    /// that is already a `ConstructorError` is rethrown untouched.
    #[error("marionette: constructor of {key} failed: {reason}{}", chain_suffix(chain))]
    ConstructorError {
        key: String,
        chain: ResolutionChain,
        reason: String,
    },

    /// A second single/scoped/factory registration was inserted for a key
    /// that already has one.
    #[error("marionette: duplicate registration for {key}")]
    DuplicateRegistration { key: String },

    /// A checked downcast failed (wrong type requested for a slot or token).
    #[error("marionette: type mismatch in {context}: expected {expected}, found {found}")]
    TypeMismatch {
        context: String,
        expected: &'static str,
        found: &'static str,
    },

    /// The accumulated report of a failed validation pass.
    #[error("marionette: validation failed with {} problem(s):\n{}", problems.len(), numbered(problems))]
    ValidationFailed { problems: Vec<String> },
}

impl DiError {
    /// A `MissingRegistration` without extra detail.
    #[inline]
    pub(crate) fn missing(key: impl Into<String>, chain: ResolutionChain) -> Self {
        Self::MissingRegistration {
            key: key.into(),
            chain,
            detail: String::new(),
        }
    }

    #[inline]
    pub(crate) fn lifetime(key: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::LifetimeViolation {
            key: key.into(),
            detail: detail.into(),
        }
    }

    /// Wrap a constructor failure, unless it is already wrapped. A bare
    /// [`DiError::failure`] gets the key and chain filled in; anything
    /// already carrying them is rethrown untouched.
    pub(crate) fn wrap_constructor(self, key: impl Into<String>, chain: ResolutionChain) -> Self {
        match self {
            Self::ConstructorError {
                key: k,
                chain: c,
                reason,
            } if k.is_empty() => Self::ConstructorError {
                key: key.into(),
                chain: if c.is_empty() { chain } else { c },
                reason,
            },
            already @ Self::ConstructorError { .. } => already,
            other => Self::ConstructorError {
                key: key.into(),
                chain,
                reason: other.to_string(),
            },
        }
    }

    /// A constructor failure with a free-form reason, for use inside
    /// [`Inject::construct`](crate::Inject::construct) implementations.
    #[inline]
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::ConstructorError {
            key: String::new(),
            chain: ResolutionChain::empty(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for DI operations
pub type DiResult<T> = std::result::Result<T, DiError>;
