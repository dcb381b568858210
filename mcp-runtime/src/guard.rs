//! Stage-transition guard.
//!
//! Legal transitions are read fresh for every check; workflows can change
//! between calls, so nothing is cached.

use devrev_core::stage::{StageTransitionSet, TransitionDecision};
use devrev_core::tools::{StageChange, StageEntityType};
use devrev_core::{Failure, FailureKind};
use serde_json::Value;

use crate::normalize;
use crate::remote::stage_transitions_request;
use crate::transport::RemoteTransport;

/// One read of the entity's current stage and its legal targets. Remote
/// failures are normalized like any other call.
pub async fn fetch_transitions(
    transport: &dyn RemoteTransport,
    entity_type: StageEntityType,
    entity_id: &str,
) -> Result<StageTransitionSet, Failure> {
    let response = transport
        .submit(stage_transitions_request(entity_type, entity_id))
        .await
        .map_err(|err| normalize::from_transport(&err))?;
    if !response.is_success() {
        return Err(normalize::normalize(response.status, &response.body));
    }
    transition_set_from_body(&response.body)
}

pub async fn check_transition(
    transport: &dyn RemoteTransport,
    change: StageChange<'_>,
) -> Result<TransitionDecision, Failure> {
    let transitions = fetch_transitions(transport, change.entity_type, change.entity_id).await?;
    let decision = transitions.check(change.requested_stage);
    tracing::debug!(
        entity_id = change.entity_id,
        current_stage = %transitions.current_stage,
        requested_stage = change.requested_stage,
        allowed = matches!(decision, TransitionDecision::Allow),
        "stage transition checked"
    );
    Ok(decision)
}

/// Accepts `{current_stage: {name}, transitions: [{target_stage: {name}}]}`,
/// plus bare stage-name strings in either position.
pub fn transition_set_from_body(body: &Value) -> Result<StageTransitionSet, Failure> {
    let current_stage = body
        .get("current_stage")
        .and_then(stage_name)
        .ok_or_else(|| malformed("current_stage"))?;
    let legal_stages = match body.get("transitions") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(transitions)) => transitions
            .iter()
            .map(|transition| {
                transition
                    .get("target_stage")
                    .and_then(stage_name)
                    .or_else(|| stage_name(transition))
                    .ok_or_else(|| malformed("transitions"))
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(malformed("transitions")),
    };
    Ok(StageTransitionSet {
        current_stage,
        legal_stages,
    })
}

fn stage_name(value: &Value) -> Option<String> {
    match value {
        Value::String(name) => Some(name.clone()),
        Value::Object(stage) => stage.get("name").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn malformed(field: &str) -> Failure {
    Failure::new(
        FailureKind::RemoteServerError,
        format!("Stage transition response is missing a usable '{field}'"),
    )
}
