use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{AppResult, NonEmptyString};

/// Opaque user identifier supplied by the identity layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(NonEmptyString);

impl UserId {
    /// Creates a validated user identifier.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        NonEmptyString::new(value).map(Self)
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for UserId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Opaque organization or workspace identifier an assignment can be bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(NonEmptyString);

impl ScopeId {
    /// Creates a validated scope identifier.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        NonEmptyString::new(value).map(Self)
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for ScopeId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Boundary within which a role assignment applies.
///
/// Serialized as a nullable scope id where `null` is the global scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "Option<ScopeId>", into = "Option<ScopeId>")]
pub enum Scope {
    /// Platform-wide scope, folded into every scoped resolution.
    Global,
    /// A single organization or workspace.
    Scoped(ScopeId),
}

impl Scope {
    /// Builds a scope from a nullable scope id.
    #[must_use]
    pub fn from_option(scope_id: Option<ScopeId>) -> Self {
        scope_id.map_or(Self::Global, Self::Scoped)
    }

    /// Parses an optional raw scope id; `None` means global.
    pub fn parse(value: Option<&str>) -> AppResult<Self> {
        value.map(ScopeId::new).transpose().map(Self::from_option)
    }

    /// Returns the scope id, or `None` for the global scope.
    #[must_use]
    pub fn scope_id(&self) -> Option<&ScopeId> {
        match self {
            Self::Global => None,
            Self::Scoped(scope_id) => Some(scope_id),
        }
    }

    /// Returns whether this is the global scope.
    #[must_use]
    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global)
    }

    /// Returns whether an assignment made in this scope applies to a request in `requested`.
    ///
    /// Global assignments apply everywhere; scoped assignments only to the same scope.
    #[must_use]
    pub fn applies_to(&self, requested: &Scope) -> bool {
        match self {
            Self::Global => true,
            Self::Scoped(_) => self == requested,
        }
    }
}

impl From<Option<ScopeId>> for Scope {
    fn from(value: Option<ScopeId>) -> Self {
        Self::from_option(value)
    }
}

impl From<Scope> for Option<ScopeId> {
    fn from(value: Scope) -> Self {
        match value {
            Scope::Global => None,
            Scope::Scoped(scope_id) => Some(scope_id),
        }
    }
}

impl Display for Scope {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => formatter.write_str("global"),
            Self::Scoped(scope_id) => write!(formatter, "scope '{scope_id}'"),
        }
    }
}

/// Principal performing an administrative operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    user_id: UserId,
    scope: Scope,
    is_system: bool,
}

impl Actor {
    /// Subject recorded for operations run by deployment tooling.
    pub const SYSTEM_SUBJECT: &'static str = "system";

    /// Creates an actor for a user acting within a scope.
    #[must_use]
    pub fn user(user_id: UserId, scope: Scope) -> Self {
        Self {
            user_id,
            scope,
            is_system: false,
        }
    }

    /// Creates the built-in system actor used by seeding and operator tooling.
    ///
    /// The system actor bypasses privilege checks.
    #[must_use]
    pub fn system() -> Self {
        Self {
            user_id: UserId(NonEmptyString(Self::SYSTEM_SUBJECT.to_owned())),
            scope: Scope::Global,
            is_system: true,
        }
    }

    /// Returns the acting user id.
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Returns the scope the actor is operating in.
    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Returns whether this is the system actor.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.is_system
    }
}

#[cfg(test)]
mod tests {
    use super::{Actor, Scope, ScopeId, UserId};

    fn scope(value: &str) -> Scope {
        Scope::Scoped(ScopeId::new(value).unwrap_or_else(|_| unreachable!()))
    }

    #[test]
    fn global_scope_applies_everywhere() {
        assert!(Scope::Global.applies_to(&Scope::Global));
        assert!(Scope::Global.applies_to(&scope("org-1")));
    }

    #[test]
    fn scoped_assignment_applies_only_to_same_scope() {
        assert!(scope("org-1").applies_to(&scope("org-1")));
        assert!(!scope("org-1").applies_to(&scope("org-2")));
        assert!(!scope("org-1").applies_to(&Scope::Global));
    }

    #[test]
    fn scope_parse_treats_none_as_global() {
        assert_eq!(Scope::parse(None).ok(), Some(Scope::Global));
        assert_eq!(Scope::parse(Some("org-1")).ok(), Some(scope("org-1")));
        assert!(Scope::parse(Some("  ")).is_err());
    }

    #[test]
    fn scope_serializes_as_nullable_id() {
        assert_eq!(
            serde_json::to_string(&Scope::Global).unwrap_or_default(),
            "null"
        );
        assert_eq!(
            serde_json::to_string(&scope("org-1")).unwrap_or_default(),
            "\"org-1\""
        );
    }

    #[test]
    fn user_id_rejects_blank_values() {
        assert!(UserId::new("").is_err());
        assert!(!Actor::user(
            UserId::new("alice").unwrap_or_else(|_| unreachable!()),
            Scope::Global
        )
        .is_system());
        assert!(Actor::system().is_system());
    }
}
