//! Credit request lifecycle.
//!
//! A request starts in `New`. The only automatic move is `New -> InProgress`;
//! every other move is requested from outside and must appear in the
//! transition table below.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::StatusError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditRequestStatus {
    /// Request created.
    #[default]
    New,
    /// Being worked on until it is sent to the financial institutions.
    InProgress,
    /// Every institution declined.
    Rejected,
    /// At least one institution approved.
    Approved,
    /// Contract signed, uploaded and sent.
    Signed,
    /// Closed manually.
    Done,
    Canceled,
    /// Need more info.
    Nmi,
}

impl CreditRequestStatus {
    pub const ALL: [CreditRequestStatus; 8] = [
        CreditRequestStatus::New,
        CreditRequestStatus::InProgress,
        CreditRequestStatus::Rejected,
        CreditRequestStatus::Approved,
        CreditRequestStatus::Signed,
        CreditRequestStatus::Done,
        CreditRequestStatus::Canceled,
        CreditRequestStatus::Nmi,
    ];

    /// States a request may be canceled from.
    pub const CANCELABLE: [CreditRequestStatus; 5] = [
        CreditRequestStatus::New,
        CreditRequestStatus::InProgress,
        CreditRequestStatus::Approved,
        CreditRequestStatus::Signed,
        CreditRequestStatus::Nmi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CreditRequestStatus::New => "new",
            CreditRequestStatus::InProgress => "in_progress",
            CreditRequestStatus::Rejected => "rejected",
            CreditRequestStatus::Approved => "approved",
            CreditRequestStatus::Signed => "signed",
            CreditRequestStatus::Done => "done",
            CreditRequestStatus::Canceled => "canceled",
            CreditRequestStatus::Nmi => "nmi",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            CreditRequestStatus::New => "New",
            CreditRequestStatus::InProgress => "In progress",
            CreditRequestStatus::Rejected => "Rejected",
            CreditRequestStatus::Approved => "Approved",
            CreditRequestStatus::Signed => "Signed",
            CreditRequestStatus::Done => "Done",
            CreditRequestStatus::Canceled => "Cancelled",
            CreditRequestStatus::Nmi => "Need More Info",
        }
    }

    /// Name of the transition that lands in this state.
    pub fn transition_name(&self) -> &'static str {
        match self {
            CreditRequestStatus::New => "to_new",
            CreditRequestStatus::InProgress => "to_in_progress",
            CreditRequestStatus::Rejected => "to_rejected",
            CreditRequestStatus::Approved => "to_approved",
            CreditRequestStatus::Signed => "to_signed",
            CreditRequestStatus::Done => "to_done",
            CreditRequestStatus::Canceled => "to_cancelled",
            CreditRequestStatus::Nmi => "to_nmi",
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CreditRequestStatus::Rejected | CreditRequestStatus::Done | CreditRequestStatus::Canceled
        )
    }

    /// States reachable from `self` by an externally requested transition.
    pub fn allowed_targets(&self) -> &'static [CreditRequestStatus] {
        use CreditRequestStatus::*;
        match self {
            New => &[InProgress, Canceled],
            InProgress => &[Approved, Rejected, Nmi, Canceled],
            Nmi => &[InProgress, Canceled],
            Approved => &[Signed, Canceled],
            Signed => &[Done, Canceled],
            Rejected | Done | Canceled => &[],
        }
    }

    pub fn can_transition_to(&self, target: CreditRequestStatus) -> bool {
        self.allowed_targets().contains(&target)
    }

    /// Validates a move and returns the target state.
    pub fn transition(self, target: CreditRequestStatus) -> Result<Self, StatusError> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(StatusError::IllegalTransition {
                from: self.as_str(),
                to: target.as_str(),
            })
        }
    }

    /// `New` becomes `InProgress`; every other state is returned unchanged.
    pub fn auto_advanced(self) -> Self {
        match self {
            CreditRequestStatus::New => CreditRequestStatus::InProgress,
            other => other,
        }
    }
}

impl fmt::Display for CreditRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CreditRequestStatus {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CreditRequestStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| StatusError::UnknownStatus(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_advance() {
        assert_eq!(
            CreditRequestStatus::New.auto_advanced(),
            CreditRequestStatus::InProgress
        );
        assert_eq!(
            CreditRequestStatus::Approved.auto_advanced(),
            CreditRequestStatus::Approved
        );
        assert_eq!(
            CreditRequestStatus::InProgress.auto_advanced(),
            CreditRequestStatus::InProgress
        );
    }

    #[test]
    fn test_cancel_reachability() {
        for status in CreditRequestStatus::ALL {
            let expected = CreditRequestStatus::CANCELABLE.contains(&status);
            assert_eq!(
                status.can_transition_to(CreditRequestStatus::Canceled),
                expected,
                "cancel from {}",
                status
            );
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for status in CreditRequestStatus::ALL {
            if status.is_terminal() {
                assert!(status.allowed_targets().is_empty(), "{} has exits", status);
            }
        }
    }

    #[test]
    fn test_illegal_transition_is_rejected() {
        let err = CreditRequestStatus::Done
            .transition(CreditRequestStatus::Canceled)
            .unwrap_err();
        assert_eq!(
            err,
            StatusError::IllegalTransition {
                from: "done",
                to: "canceled"
            }
        );
        assert!(CreditRequestStatus::Rejected
            .transition(CreditRequestStatus::Canceled)
            .is_err());
        assert_eq!(
            CreditRequestStatus::Approved.transition(CreditRequestStatus::Signed),
            Ok(CreditRequestStatus::Signed)
        );
    }

    #[test]
    fn test_parse_round_trip_and_unknown() {
        for status in CreditRequestStatus::ALL {
            assert_eq!(status.as_str().parse::<CreditRequestStatus>(), Ok(status));
        }
        assert_eq!(
            "paid".parse::<CreditRequestStatus>(),
            Err(StatusError::UnknownStatus("paid".to_string()))
        );
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_string(&CreditRequestStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let parsed: CreditRequestStatus = serde_json::from_str("\"canceled\"").unwrap();
        assert_eq!(parsed, CreditRequestStatus::Canceled);
        assert!(serde_json::from_str::<CreditRequestStatus>("\"archived\"").is_err());
    }

    #[test]
    fn test_labels_and_transition_names() {
        assert_eq!(CreditRequestStatus::Nmi.label(), "Need More Info");
        assert_eq!(CreditRequestStatus::Canceled.transition_name(), "to_cancelled");
    }
}
