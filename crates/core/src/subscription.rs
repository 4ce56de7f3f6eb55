//! Subscription plans and the modification quota.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Maximum number of modifications allowed on the free plan.
pub const MAX_FREE_MODIFICATIONS: u32 = 3;

/// Plan name that unlocks unlimited modifications and 8K output.
pub const PLAN_PRO: &str = "pro";
/// Plan name for everyone else.
pub const PLAN_FREE: &str = "free";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionPlan {
    #[default]
    Free,
    Pro,
}

impl SubscriptionPlan {
    /// Map a backend plan name onto a plan. Anything other than `pro` is
    /// treated as free.
    pub fn from_plan_name(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case(PLAN_PRO) {
            Self::Pro
        } else {
            Self::Free
        }
    }

    pub fn is_pro(self) -> bool {
        matches!(self, Self::Pro)
    }

    /// `None` means unlimited.
    pub fn modification_limit(self) -> Option<u32> {
        match self {
            Self::Pro => None,
            Self::Free => Some(MAX_FREE_MODIFICATIONS),
        }
    }

    /// Gate a modification before any request is sent.
    pub fn check_modification(self, used: u32) -> Result<(), CoreError> {
        match self.modification_limit() {
            Some(limit) if used >= limit => Err(CoreError::QuotaExhausted { used, limit }),
            _ => Ok(()),
        }
    }

    /// Human-readable remaining quota: `∞` on pro, `left/limit` otherwise.
    pub fn remaining_label(self, used: u32) -> String {
        match self.modification_limit() {
            None => "∞".to_string(),
            Some(limit) => format!("{}/{limit}", limit.saturating_sub(used)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => PLAN_FREE,
            Self::Pro => PLAN_PRO,
        }
    }
}

impl fmt::Display for SubscriptionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionPlan {
    type Err = CoreError;

    /// Strict parse for configuration values.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            PLAN_FREE => Ok(Self::Free),
            PLAN_PRO => Ok(Self::Pro),
            other => Err(CoreError::Validation(format!(
                "Unknown subscription plan '{other}'. Must be one of: {PLAN_FREE}, {PLAN_PRO}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn free_plan_allows_three_modifications() {
        let plan = SubscriptionPlan::Free;
        assert!(plan.check_modification(0).is_ok());
        assert!(plan.check_modification(2).is_ok());
        assert_matches!(
            plan.check_modification(3),
            Err(CoreError::QuotaExhausted { used: 3, limit: 3 })
        );
    }

    #[test]
    fn pro_plan_is_unlimited() {
        let plan = SubscriptionPlan::Pro;
        assert!(plan.check_modification(10_000).is_ok());
        assert!(plan.check_modification(u32::MAX).is_ok());
        assert_eq!(plan.modification_limit(), None);
    }

    #[test]
    fn remaining_labels() {
        assert_eq!(SubscriptionPlan::Pro.remaining_label(7), "∞");
        assert_eq!(SubscriptionPlan::Free.remaining_label(0), "3/3");
        assert_eq!(SubscriptionPlan::Free.remaining_label(2), "1/3");
        assert_eq!(SubscriptionPlan::Free.remaining_label(5), "0/3");
    }

    #[test]
    fn backend_plan_names_are_lenient() {
        assert_eq!(SubscriptionPlan::from_plan_name("Pro"), SubscriptionPlan::Pro);
        assert_eq!(SubscriptionPlan::from_plan_name("basic"), SubscriptionPlan::Free);
        assert_eq!(SubscriptionPlan::from_plan_name(""), SubscriptionPlan::Free);
    }

    #[test]
    fn config_plan_names_are_strict() {
        assert_eq!("PRO".parse::<SubscriptionPlan>().unwrap(), SubscriptionPlan::Pro);
        assert_eq!(" free ".parse::<SubscriptionPlan>().unwrap(), SubscriptionPlan::Free);
        assert_matches!("gold".parse::<SubscriptionPlan>(), Err(CoreError::Validation(_)));
    }
}
