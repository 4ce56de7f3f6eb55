//! Output resolutions offered at finalization.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::subscription::SubscriptionPlan;

/* --------------------------------------------------------------------------
Named constants
-------------------------------------------------------------------------- */

/// Square edge lengths, in pixels, the upscaler can produce.
pub const SUPPORTED_RESOLUTIONS: &[u32] = &[64, 128, 256, 512, 1024, 2048, 4096, 8192];

/// Resolution preselected for a new session.
pub const DEFAULT_RESOLUTION: u32 = 2048;

/// Resolutions at or above this edge length require the pro plan.
const PRO_ONLY_RESOLUTION: u32 = 8192;

/// A validated output resolution (square, edge length in pixels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Resolution(u32);

impl Resolution {
    pub fn new(pixels: u32) -> Result<Self, CoreError> {
        if SUPPORTED_RESOLUTIONS.contains(&pixels) {
            Ok(Self(pixels))
        } else {
            let supported: Vec<String> = SUPPORTED_RESOLUTIONS.iter().map(u32::to_string).collect();
            Err(CoreError::Validation(format!(
                "Unsupported resolution {pixels}. Must be one of: {}",
                supported.join(", ")
            )))
        }
    }

    pub fn pixels(self) -> u32 {
        self.0
    }

    /// Short label shown next to the resolution, e.g. `2K` or `512px`.
    pub fn label(self) -> String {
        match self.0 {
            1024 => "1K".to_string(),
            2048 => "2K".to_string(),
            4096 => "4K".to_string(),
            8192 => "8K".to_string(),
            px => format!("{px}px"),
        }
    }

    pub fn is_available(self, plan: SubscriptionPlan) -> bool {
        self.0 < PRO_ONLY_RESOLUTION || plan.is_pro()
    }

    /// Reject resolutions the plan does not include.
    pub fn check_available(self, plan: SubscriptionPlan) -> Result<(), CoreError> {
        if self.is_available(plan) {
            Ok(())
        } else {
            Err(CoreError::Validation(format!(
                "{} output requires the {} plan",
                self.label(),
                SubscriptionPlan::Pro
            )))
        }
    }

    /// All resolutions, in ascending order.
    pub fn all() -> impl Iterator<Item = Resolution> {
        SUPPORTED_RESOLUTIONS.iter().map(|&px| Resolution(px))
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self(DEFAULT_RESOLUTION)
    }
}

impl TryFrom<u32> for Resolution {
    type Error = CoreError;

    fn try_from(pixels: u32) -> Result<Self, Self::Error> {
        Self::new(pixels)
    }
}

impl From<Resolution> for u32 {
    fn from(resolution: Resolution) -> Self {
        resolution.0
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/* --------------------------------------------------------------------------
Tests
-------------------------------------------------------------------------- */
