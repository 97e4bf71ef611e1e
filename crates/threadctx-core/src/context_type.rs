//! Context type identifiers and definition selectors

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Identifier of a context category
///
/// Built-in categories are available as associated constants. Third-party
/// categories are created with [`ContextType::new`] and only need to be
/// unique within a registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextType(Cow<'static, str>);

impl ContextType {
    /// Lookup namespace of the application component
    pub const NAMING: ContextType = ContextType::from_static("Naming");
    /// Class resolution scope of the application component
    pub const CLASS_RESOLUTION: ContextType = ContextType::from_static("ClassResolution");
    /// Caller security principal
    pub const SECURITY: ContextType = ContextType::from_static("Security");
    /// Active transaction
    pub const TRANSACTION: ContextType = ContextType::from_static("Transaction");

    /// Create a context type from a static name
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Create a context type from any name
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// The category name
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is one of the categories shipped with the engine
    pub fn is_builtin(&self) -> bool {
        [
            Self::NAMING,
            Self::CLASS_RESOLUTION,
            Self::SECURITY,
            Self::TRANSACTION,
        ]
        .contains(self)
    }
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContextType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ContextType {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// One entry of a propagated/cleared/unchanged list in a definition
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSelector {
    /// A single named category
    Type(ContextType),
    /// The application component's naming and class resolution scopes
    Application,
    /// Every category not named explicitly anywhere in the definition
    AllRemaining,
}

impl TypeSelector {
    /// Definition token for the remaining-types wildcard
    pub const ALL_REMAINING: &'static str = "Remaining";
    /// Accepted spelling of the wildcard in hand-written configuration
    pub const ALL_REMAINING_ALIAS: &'static str = "ALL_REMAINING";
    /// Definition token for the application alias
    pub const APPLICATION: &'static str = "Application";

    /// Parse a definition token
    pub fn parse(token: &str) -> Self {
        match token.trim() {
            Self::ALL_REMAINING | Self::ALL_REMAINING_ALIAS => TypeSelector::AllRemaining,
            Self::APPLICATION => TypeSelector::Application,
            other => TypeSelector::Type(ContextType::new(other)),
        }
    }

    /// The concrete categories this selector names
    ///
    /// Empty for the wildcard, which is resolved against whatever is left.
    pub fn expand(&self) -> Vec<ContextType> {
        match self {
            TypeSelector::Type(ty) => vec![ty.clone()],
            TypeSelector::Application => {
                vec![ContextType::NAMING, ContextType::CLASS_RESOLUTION]
            }
            TypeSelector::AllRemaining => Vec::new(),
        }
    }
}

impl fmt::Display for TypeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSelector::Type(ty) => write!(f, "{}", ty),
            TypeSelector::Application => f.write_str(Self::APPLICATION),
            TypeSelector::AllRemaining => f.write_str(Self::ALL_REMAINING),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_constants() {
        assert_eq!(ContextType::SECURITY.as_str(), "Security");
        assert!(ContextType::TRANSACTION.is_builtin());
        assert!(!ContextType::new("IntContext").is_builtin());
    }

    #[test]
    fn test_static_and_owned_compare_equal() {
        assert_eq!(ContextType::new("Naming"), ContextType::NAMING);
    }

    #[test]
    fn test_selector_parsing() {
        assert_eq!(TypeSelector::parse("Remaining"), TypeSelector::AllRemaining);
        assert_eq!(TypeSelector::parse("ALL_REMAINING"), TypeSelector::AllRemaining);
        assert_eq!(TypeSelector::parse(" Application "), TypeSelector::Application);
        assert_eq!(
            TypeSelector::parse("IntContext"),
            TypeSelector::Type(ContextType::new("IntContext"))
        );
    }

    #[test]
    fn test_application_expands_to_scopes() {
        assert_eq!(
            TypeSelector::Application.expand(),
            vec![ContextType::NAMING, ContextType::CLASS_RESOLUTION]
        );
        assert!(TypeSelector::AllRemaining.expand().is_empty());
    }

    #[test]
    fn test_serde_is_transparent() {
        let json = serde_json::to_string(&ContextType::SECURITY).unwrap();
        assert_eq!(json, "\"Security\"");
        let back: ContextType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ContextType::SECURITY);
    }
}
