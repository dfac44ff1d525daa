//! Event watcher - diffs consecutive PR observations into auto-merge events

use super::state::AutoMergeEvent;
use crate::types::{MergeState, PrState, PullRequestDetails, ReviewDecision};

/// PR details and merge state fetched together in one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// PR details
    pub pr: PullRequestDetails,
    /// Merge state
    pub merge_state: MergeState,
}

/// Events implied by the change from `prev` to `current`, in a stable order.
pub fn detect_events(prev: &Observation, current: &Observation) -> Vec<AutoMergeEvent> {
    let mut events = Vec::new();

    if prev.pr.state != PrState::Merged && current.pr.state == PrState::Merged {
        events.push(AutoMergeEvent::MergedExternally);
    }
    if prev.pr.state == PrState::Open && current.pr.state == PrState::Closed {
        events.push(AutoMergeEvent::Closed);
    }
    if prev.pr.base_ref != current.pr.base_ref {
        events.push(AutoMergeEvent::BaseRetargeted {
            from: prev.pr.base_ref.clone(),
            to: current.pr.base_ref.clone(),
        });
    }
    if prev.pr.head_sha != current.pr.head_sha {
        events.push(AutoMergeEvent::HeadPushed {
            from: prev.pr.head_sha.clone(),
            to: current.pr.head_sha.clone(),
        });
    }
    if prev.merge_state.review_decision == ReviewDecision::Approved
        && matches!(
            current.merge_state.review_decision,
            ReviewDecision::ReviewRequired | ReviewDecision::ChangesRequested
        )
    {
        events.push(AutoMergeEvent::ApprovalDismissed);
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MergeStateStatus;

    fn observation() -> Observation {
        Observation {
            pr: PullRequestDetails {
                number: 7,
                title: "Fix flaky test".to_string(),
                state: PrState::Open,
                head_ref: "fix/flaky".to_string(),
                head_sha: "aaaaaaa".to_string(),
                base_ref: "main".to_string(),
                html_url: "https://github.com/octo/widgets/pull/7".to_string(),
            },
            merge_state: MergeState {
                status: MergeStateStatus::Blocked,
                review_decision: ReviewDecision::Approved,
                unresolved_thread_count: 0,
                is_draft: false,
                auto_merge: None,
            },
        }
    }

    #[test]
    fn test_no_change_no_events() {
        let obs = observation();
        assert!(detect_events(&obs, &obs.clone()).is_empty());
    }

    #[test]
    fn test_merge_state_churn_is_not_an_event() {
        let prev = observation();
        let mut current = prev.clone();
        current.merge_state.status = MergeStateStatus::Mergeable;
        current.merge_state.unresolved_thread_count = 2;
        assert!(detect_events(&prev, &current).is_empty());
    }

    #[test]
    fn test_detects_retarget_and_push() {
        let prev = observation();
        let mut current = prev.clone();
        current.pr.base_ref = "release/1.x".to_string();
        current.pr.head_sha = "bbbbbbb".to_string();

        assert_eq!(
            detect_events(&prev, &current),
            vec![
                AutoMergeEvent::BaseRetargeted {
                    from: "main".to_string(),
                    to: "release/1.x".to_string(),
                },
                AutoMergeEvent::HeadPushed {
                    from: "aaaaaaa".to_string(),
                    to: "bbbbbbb".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_detects_close_and_external_merge() {
        let prev = observation();
        let mut closed = prev.clone();
        closed.pr.state = PrState::Closed;
        assert_eq!(detect_events(&prev, &closed), vec![AutoMergeEvent::Closed]);

        let mut merged = prev.clone();
        merged.pr.state = PrState::Merged;
        assert_eq!(
            detect_events(&prev, &merged),
            vec![AutoMergeEvent::MergedExternally]
        );
    }

    #[test]
    fn test_detects_dismissed_approval() {
        let prev = observation();
        let mut current = prev.clone();
        current.merge_state.review_decision = ReviewDecision::ReviewRequired;
        assert_eq!(
            detect_events(&prev, &current),
            vec![AutoMergeEvent::ApprovalDismissed]
        );

        let mut no_policy = prev.clone();
        no_policy.merge_state.review_decision = ReviewDecision::None;
        assert!(detect_events(&prev, &no_policy).is_empty());
    }
}
