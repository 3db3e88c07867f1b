//! Opaque identity tokens for interface-style bindings
//!
//! A [`Token`] stands in for an interface at runtime: registrations can bind
//! an implementation under a token, and resolution looks the token up the
//! same way it looks up a concrete type. Tokens are minted by a
//! [`Reflection`](crate::Reflection) registry which records every id it
//! hands out; identity is the id, never the description.

use std::sync::Arc;

/// An opaque identity handle with a human-readable description.
///
/// Two tokens minted from the same description are distinct values:
///
/// ```rust
/// use marionette_di::create_token;
///
/// let a = create_token("Weapon");
/// let b = create_token("Weapon");
/// assert_ne!(a, b);
/// assert_eq!(a, a.clone());
/// ```
#[derive(Clone)]
pub struct Token {
    id: u64,
    description: Arc<str>,
}

impl Token {
    /// Built by [`Reflection::create_token`](crate::Reflection::create_token).
    #[inline]
    pub(crate) fn mint(id: u64, description: Arc<str>) -> Self {
        Self { id, description }
    }

    /// The registry-assigned id. Identity equality compares only this.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The human-readable description supplied at mint time.
    #[inline]
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl PartialEq for Token {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Token {}

impl std::hash::Hash for Token {
    #[inline]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("id", &self.id)
            .field("description", &self.description)
            .finish()
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description)
    }
}

/// Mint a token from the process-global [`Reflection`](crate::Reflection)
/// registry.
#[inline]
pub fn create_token(description: &str) -> Token {
    crate::Reflection::global().create_token(description)
}

/// Check whether a token was minted by the process-global registry.
#[inline]
pub fn is_token(token: &Token) -> bool {
    crate::Reflection::global().is_token(token)
}
