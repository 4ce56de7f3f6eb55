use crate::lifecycle::PollPhase;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Modification limit reached: {used} of {limit} used")]
    QuotaExhausted { used: u32, limit: u32 },

    #[error("Invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition { from: PollPhase, to: PollPhase },
}
