//! Constraint policies applied to dependents when a parent is deleted.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigurationError;

/// Behavior applied to dependent records when their parent is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConstraintPolicy {
    /// Block the deletion while dependents exist.
    #[default]
    Protect,
    /// Delete dependents; individual failures do not block the parent.
    Destroy,
    /// Delete dependents; any failure aborts the whole deletion.
    DestroyStrict,
    /// Set the dependents' foreign key to null.
    SetNil,
    /// Leave dependents untouched (orphans allowed).
    Skip,
}

/// Referential action of a native foreign-key constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferentialAction {
    /// `NO ACTION`
    NoAction,
    /// `CASCADE`
    Cascade,
    /// `SET NULL`
    SetNull,
}

impl ReferentialAction {
    /// SQL keyword(s) for this action.
    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
        }
    }
}

impl ConstraintPolicy {
    /// All policies, in declaration order.
    pub const ALL: [ConstraintPolicy; 5] = [
        ConstraintPolicy::Protect,
        ConstraintPolicy::Destroy,
        ConstraintPolicy::DestroyStrict,
        ConstraintPolicy::SetNil,
        ConstraintPolicy::Skip,
    ];

    /// The token this policy is configured with.
    pub fn token(&self) -> &'static str {
        match self {
            ConstraintPolicy::Protect => "protect",
            ConstraintPolicy::Destroy => "destroy",
            ConstraintPolicy::DestroyStrict => "destroy!",
            ConstraintPolicy::SetNil => "set_nil",
            ConstraintPolicy::Skip => "skip",
        }
    }

    /// Whether a failed dependent mutation must abort the whole deletion.
    pub fn is_strict(&self) -> bool {
        matches!(self, ConstraintPolicy::DestroyStrict | ConstraintPolicy::SetNil)
    }

    /// Whether dependents are deleted under this policy.
    pub fn destroys_dependents(&self) -> bool {
        matches!(self, ConstraintPolicy::Destroy | ConstraintPolicy::DestroyStrict)
    }

    /// The native constraint action mirroring this policy.
    ///
    /// `Skip` has no native counterpart, so no constraint is created for it.
    pub fn native_action(&self) -> Option<ReferentialAction> {
        match self {
            ConstraintPolicy::Protect => Some(ReferentialAction::NoAction),
            ConstraintPolicy::Destroy | ConstraintPolicy::DestroyStrict => {
                Some(ReferentialAction::Cascade)
            }
            ConstraintPolicy::SetNil => Some(ReferentialAction::SetNull),
            ConstraintPolicy::Skip => None,
        }
    }
}

impl FromStr for ConstraintPolicy {
    type Err = ConfigurationError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token.trim().trim_start_matches(':') {
            "protect" => Ok(ConstraintPolicy::Protect),
            "destroy" => Ok(ConstraintPolicy::Destroy),
            "destroy!" | "destroy_strict" => Ok(ConstraintPolicy::DestroyStrict),
            "set_nil" | "set_null" => Ok(ConstraintPolicy::SetNil),
            "skip" => Ok(ConstraintPolicy::Skip),
            _ => Err(ConfigurationError::UnknownPolicy(token.to_string())),
        }
    }
}

impl fmt::Display for ConstraintPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}
