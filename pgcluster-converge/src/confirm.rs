//! Operator confirmation
//!
//! The engine never reads stdin itself; the binary supplies a [`Prompt`] and
//! tests supply scripted answers.

use std::io;

use crate::error::UserDeclinedConfirmation;

/// Attempts before an unrecognized answer counts as "no"
pub const MAX_CONFIRM_ATTEMPTS: usize = 3;

/// Source of operator answers. The engine only asks while nothing else is
/// converging (before replicas start, or from single-server operations), so
/// an implementation may block the calling thread.
pub trait Prompt: Send + Sync {
    /// Show `question` and return one line of input, or `None` at end of input
    fn ask(&self, question: &str) -> io::Result<Option<String>>;
}

/// Ask a yes/no question. `Ok(false)` is an explicit "no"; end of input, a
/// broken terminal or too many unrecognized answers decline.
pub fn confirm(prompt: &dyn Prompt, question: &str) -> Result<bool, UserDeclinedConfirmation> {
    for _ in 0..MAX_CONFIRM_ATTEMPTS {
        let answer = match prompt.ask(question) {
            Ok(Some(answer)) => answer,
            Ok(None) => return Err(UserDeclinedConfirmation),
            Err(err) => {
                tracing::warn!("Failed to read answer: {}", err);
                return Err(UserDeclinedConfirmation);
            }
        };
        match answer.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" => return Ok(true),
            "no" | "n" => return Ok(false),
            _ => tracing::warn!("Please enter 'yes' or 'no'"),
        }
    }
    Err(UserDeclinedConfirmation)
}

/// Like [`confirm`], but "no" also declines
pub fn require_confirmation(prompt: &dyn Prompt, question: &str) -> Result<(), UserDeclinedConfirmation> {
    if confirm(prompt, question)? {
        Ok(())
    } else {
        Err(UserDeclinedConfirmation)
    }
}
