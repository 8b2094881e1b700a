//! Eligibility engine
//!
//! Pure functions turning a claim window and the current time into a
//! tri-state verdict. Called once per countdown tick, so nothing here
//! allocates or performs I/O.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::window::{ClaimWindow, Countdown};

/// Whether an account may submit a claim right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "countdown", rename_all = "snake_case")]
pub enum Eligibility {
    Eligible,
    Ineligible(Countdown),
    /// Account, chain or contract data not resolved yet
    Unknown,
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Eligibility::Unknown)
    }

    pub fn countdown(&self) -> Option<Countdown> {
        match self {
            Eligibility::Ineligible(countdown) => Some(*countdown),
            _ => None,
        }
    }

    pub fn kind(&self) -> EligibilityKind {
        match self {
            Eligibility::Eligible => EligibilityKind::Eligible,
            Eligibility::Ineligible(_) => EligibilityKind::Ineligible,
            Eligibility::Unknown => EligibilityKind::Unknown,
        }
    }
}

impl fmt::Display for Eligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Eligibility::Eligible => write!(f, "eligible"),
            Eligibility::Ineligible(countdown) => write!(f, "next claim in {}", countdown),
            Eligibility::Unknown => write!(f, "unknown"),
        }
    }
}

/// Eligibility without the countdown payload, for edge detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EligibilityKind {
    Eligible,
    Ineligible,
    Unknown,
}

/// Preconditions the caller resolved before evaluating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Disconnected,
    WrongChain,
    Ready,
}

/// Evaluate a claim window at `now`.
///
/// `None` means the window has not been loaded for the connected account.
pub fn evaluate(window: Option<&ClaimWindow>, now: u64) -> Eligibility {
    let Some(window) = window else {
        return Eligibility::Unknown;
    };

    let Some(next_eligible) = window.next_eligible_timestamp() else {
        return Eligibility::Eligible;
    };

    if now >= next_eligible {
        Eligibility::Eligible
    } else {
        Eligibility::Ineligible(Countdown::from_seconds(next_eligible - now))
    }
}

/// Fold wallet readiness into the verdict: anything short of `Ready` is `Unknown`.
pub fn evaluate_for(readiness: Readiness, window: Option<&ClaimWindow>, now: u64) -> Eligibility {
    match readiness {
        Readiness::Ready => evaluate(window, now),
        Readiness::Disconnected | Readiness::WrongChain => Eligibility::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DAY: u64 = 86_400;

    #[test]
    fn test_unloaded_window_is_unknown() {
        assert_eq!(evaluate(None, 1_000), Eligibility::Unknown);
        assert!(!Eligibility::Unknown.is_known());
    }

    #[test]
    fn test_cooldown_boundary() {
        let t = 1_700_000_000;
        let window = ClaimWindow::new(t, DAY);

        let one_second_left = evaluate(Some(&window), t + DAY - 1);
        match one_second_left {
            Eligibility::Ineligible(c) => assert_eq!(c.to_string(), "0h 0m 1s"),
            other => panic!("expected ineligible, got {other:?}"),
        }

        assert_eq!(evaluate(Some(&window), t + DAY), Eligibility::Eligible);
    }

    #[test]
    fn test_readiness_gates_to_unknown() {
        let window = ClaimWindow::new(0, DAY);
        assert_eq!(
            evaluate_for(Readiness::WrongChain, Some(&window), 5),
            Eligibility::Unknown
        );
        assert_eq!(
            evaluate_for(Readiness::Disconnected, Some(&window), 5),
            Eligibility::Unknown
        );
        assert_eq!(
            evaluate_for(Readiness::Ready, Some(&window), 5),
            Eligibility::Eligible
        );
    }

    proptest! {
        #[test]
        fn first_claim_is_never_gated(now in any::<u64>(), cooldown in 0u64..=10 * DAY) {
            let window = ClaimWindow::new(0, cooldown);
            prop_assert_eq!(evaluate(Some(&window), now), Eligibility::Eligible);
        }

        #[test]
        fn remaining_time_decomposes_exactly(
            last in 1u64..=u32::MAX as u64,
            cooldown in 1u64..=10 * DAY,
            elapsed_frac in 0.0f64..1.0,
        ) {
            let elapsed = ((cooldown as f64) * elapsed_frac) as u64;
            let now = last + elapsed.min(cooldown - 1);
            let expected = last + cooldown - now;

            match evaluate(Some(&ClaimWindow::new(last, cooldown)), now) {
                Eligibility::Ineligible(c) => {
                    prop_assert_eq!(c.total_seconds, expected);
                    prop_assert_eq!(c.hours * 3600 + c.minutes * 60 + c.seconds, expected);
                    prop_assert!(c.minutes < 60 && c.seconds < 60);
                }
                other => prop_assert!(false, "expected ineligible, got {:?}", other),
            }
        }

        #[test]
        fn window_reopens_after_cooldown(
            last in 1u64..=u32::MAX as u64,
            cooldown in 0u64..=10 * DAY,
            extra in 0u64..=DAY,
        ) {
            let window = ClaimWindow::new(last, cooldown);
            prop_assert_eq!(evaluate(Some(&window), last + cooldown + extra), Eligibility::Eligible);
        }
    }
}
