//! Symbol identifier
//!
//! Symbols are exchange-native instrument names (e.g. `XBTUSD`). The newtype
//! keeps map keys honest and implements `Ord` so shared caches can use
//! `BTreeMap` for deterministic iteration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Exchange-native instrument symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a symbol from an exchange-native name
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the symbol as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_roundtrip() {
        let s = Symbol::new("XBTUSD");
        assert_eq!(s.as_str(), "XBTUSD");
        assert_eq!(s.to_string(), "XBTUSD");
    }

    #[test]
    fn test_symbol_serde_transparent() {
        let s = Symbol::new("ETHUSD");
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, "\"ETHUSD\"");
        let back: Symbol = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_symbol_ordering() {
        let mut v = vec![Symbol::new("XBTUSD"), Symbol::new("ADAUSD")];
        v.sort();
        assert_eq!(v[0].as_str(), "ADAUSD");
    }
}
