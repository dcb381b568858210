use serde::Serialize;
use serde_json::json;

use crate::error::{Failure, FailureKind};

/// Legal outbound transitions from an entity's current stage, as read from
/// the remote API for a single invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageTransitionSet {
    pub current_stage: String,
    pub legal_stages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionDecision {
    Allow,
    Reject {
        current_stage: String,
        legal_stages: Vec<String>,
    },
}

impl StageTransitionSet {
    pub fn allows(&self, requested_stage: &str) -> bool {
        self.legal_stages
            .iter()
            .any(|stage| stage == requested_stage)
    }

    pub fn check(&self, requested_stage: &str) -> TransitionDecision {
        if self.allows(requested_stage) {
            TransitionDecision::Allow
        } else {
            TransitionDecision::Reject {
                current_stage: self.current_stage.clone(),
                legal_stages: self.legal_stages.clone(),
            }
        }
    }
}

/// Failure for a stage change the workflow does not allow. Lists the legal
/// targets so the caller can pick one without another round trip.
pub fn rejection_failure(
    entity_id: &str,
    requested_stage: &str,
    current_stage: &str,
    legal_stages: &[String],
) -> Failure {
    let legal = if legal_stages.is_empty() {
        "none".to_string()
    } else {
        legal_stages.join(", ")
    };
    Failure::new(
        FailureKind::StageTransitionRejected,
        format!(
            "Cannot move {entity_id} from stage '{current_stage}' to '{requested_stage}'. Legal next stages: {legal}"
        ),
    )
    .with_field("stage")
    .with_docs_hint("Retry with one of the legal stages, or call valid_stage_transition.")
    .with_details(json!({
        "requested_stage": requested_stage,
        "current_stage": current_stage,
        "legal_stages": legal_stages,
    }))
}
