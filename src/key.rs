//! Lookup keys: tokens and concrete types, interchangeable in every table

use crate::Token;
use std::any::TypeId;

/// A registration/resolution key.
///
/// Tokens and concrete types are interchangeable everywhere a key is
/// accepted: the registration table, scope caches, externals and the
/// resolution chain all use `Key`.
#[derive(Clone)]
pub enum Key {
    /// An interface-style token binding.
    Token(Token),
    /// A concrete implementation type.
    Type { id: TypeId, name: &'static str },
}

impl Key {
    /// The key for a concrete type.
    #[inline]
    pub fn of<T: 'static>() -> Self {
        Key::Type {
            id: TypeId::of::<T>(),
            name: short_type_name::<T>(),
        }
    }

    /// Rendered name used in error messages and debug snapshots.
    pub fn render(&self) -> String {
        match self {
            Key::Token(token) => token.description().to_string(),
            Key::Type { name, .. } => (*name).to_string(),
        }
    }

    #[inline]
    pub fn as_token(&self) -> Option<&Token> {
        match self {
            Key::Token(token) => Some(token),
            Key::Type { .. } => None,
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Key::Token(a), Key::Token(b)) => a == b,
            (Key::Type { id: a, .. }, Key::Type { id: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl Eq for Key {}

impl std::hash::Hash for Key {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            Key::Token(token) => {
                0u8.hash(state);
                token.hash(state);
            }
            Key::Type { id, .. } => {
                1u8.hash(state);
                id.hash(state);
            }
        }
    }
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Token(token) => write!(f, "Key::Token({})", token.description()),
            Key::Type { name, .. } => write!(f, "Key::Type({name})"),
        }
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl From<Token> for Key {
    #[inline]
    fn from(token: Token) -> Self {
        Key::Token(token)
    }
}

impl From<&Token> for Key {
    #[inline]
    fn from(token: &Token) -> Self {
        Key::Token(token.clone())
    }
}

/// Trailing segment of `std::any::type_name`, without module path noise.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}
