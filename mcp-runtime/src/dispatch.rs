//! Invocation dispatcher: one tool call from name and raw arguments to a
//! single `InvocationResult`.
//!
//! Received -> Validated -> [Paginated] -> [StageChecked] -> RequestBuilt
//! -> RemoteCalled -> (Mapped | Normalized) -> Done. Local failures stop
//! before any remote call.

use std::sync::Arc;

use devrev_core::catalog;
use devrev_core::stage::{TransitionDecision, rejection_failure};
use devrev_core::validate::validate_call;
use devrev_core::{Failure, InvocationResult};
use serde_json::{Map, Value};
use tracing::Instrument;
use uuid::Uuid;

use crate::transport::RemoteTransport;
use crate::{guard, normalize, remote};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InvocationState {
    Received,
    Validated,
    Paginated,
    StageChecked,
    RequestBuilt,
    RemoteCalled,
    Mapped,
    Normalized,
    Done,
}

impl InvocationState {
    fn as_str(self) -> &'static str {
        match self {
            InvocationState::Received => "received",
            InvocationState::Validated => "validated",
            InvocationState::Paginated => "paginated",
            InvocationState::StageChecked => "stage_checked",
            InvocationState::RequestBuilt => "request_built",
            InvocationState::RemoteCalled => "remote_called",
            InvocationState::Mapped => "mapped",
            InvocationState::Normalized => "normalized",
            InvocationState::Done => "done",
        }
    }
}

fn enter(state: InvocationState) {
    tracing::debug!(state = state.as_str(), "invocation state");
}

pub struct Dispatcher {
    transport: Arc<dyn RemoteTransport>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn RemoteTransport>) -> Self {
        Self { transport }
    }

    /// Invocations share nothing but the transport and may run concurrently.
    pub async fn dispatch(&self, tool_name: &str, arguments: &Map<String, Value>) -> InvocationResult {
        let invocation_id = Uuid::now_v7();
        let span = tracing::info_span!("invocation", tool = tool_name, %invocation_id);

        async {
            let result = InvocationResult::from(self.run(tool_name, arguments).await);
            match result.failure() {
                None => {}
                Some(failure) if failure.kind.is_local() => {
                    tracing::info!(kind = %failure.kind, field = ?failure.field, "invocation rejected locally");
                }
                Some(failure) => {
                    tracing::warn!(
                        kind = %failure.kind,
                        remote_status = ?failure.remote_status,
                        message = %failure.message,
                        "invocation failed"
                    );
                }
            }
            enter(InvocationState::Done);
            result
        }
        .instrument(span)
        .await
    }

    async fn run(&self, tool_name: &str, arguments: &Map<String, Value>) -> Result<Value, Failure> {
        enter(InvocationState::Received);
        let spec = catalog::lookup(tool_name).ok_or_else(|| Failure::unknown_tool(tool_name))?;
        let call = validate_call(spec, arguments)?;
        enter(InvocationState::Validated);

        if call.is_paginated() {
            tracing::debug!(first_page = call.cursor().is_none(), "paginated listing");
            enter(InvocationState::Paginated);
        }

        if let Some(change) = call.requested_stage() {
            match guard::check_transition(self.transport.as_ref(), change).await? {
                TransitionDecision::Allow => enter(InvocationState::StageChecked),
                TransitionDecision::Reject {
                    current_stage,
                    legal_stages,
                } => {
                    return Err(rejection_failure(
                        change.entity_id,
                        change.requested_stage,
                        &current_stage,
                        &legal_stages,
                    ));
                }
            }
        }

        let request = remote::build(&call);
        enter(InvocationState::RequestBuilt);

        let response = self
            .transport
            .submit(request)
            .await
            .map_err(|err| normalize::from_transport(&err))?;
        enter(InvocationState::RemoteCalled);

        if !response.is_success() {
            enter(InvocationState::Normalized);
            return Err(normalize::normalize(response.status, &response.body));
        }

        let payload = remote::map_response(&call, response.body)?;
        enter(InvocationState::Mapped);
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeTransport;
    use crate::transport::TransportError;
    use devrev_core::{FailureKind, ToolName};
    use serde_json::json;

    fn dispatcher(transport: &Arc<FakeTransport>) -> Dispatcher {
        Dispatcher::new(transport.clone())
    }

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("arguments must be an object"),
        }
    }

    fn failure(result: InvocationResult) -> Failure {
        match result {
            InvocationResult::Failure(failure) => failure,
            InvocationResult::Success { payload } => panic!("expected failure, got {payload}"),
        }
    }

    fn payload(result: InvocationResult) -> Value {
        match result {
            InvocationResult::Success { payload } => payload,
            InvocationResult::Failure(failure) => panic!("expected success, got {failure}"),
        }
    }

    #[tokio::test]
    async fn unknown_tool_makes_no_remote_call() {
        let transport = Arc::new(FakeTransport::new());
        let result = dispatcher(&transport)
            .dispatch("delete_everything", &Map::new())
            .await;
        assert_eq!(failure(result).kind, FailureKind::UnknownTool);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn missing_required_parameter_makes_no_remote_call_for_any_tool() {
        for spec in catalog::catalog() {
            let Some(required) = spec.parameters.iter().find(|param| param.required) else {
                continue;
            };
            let transport = Arc::new(FakeTransport::new());
            let result = dispatcher(&transport).dispatch(spec.name(), &Map::new()).await;
            let failure = failure(result);
            assert_eq!(failure.kind, FailureKind::MissingParameter, "{}", spec.name());
            assert_eq!(failure.field.as_deref(), Some(required.name));
            assert!(transport.requests().is_empty(), "{} hit the remote", spec.name());
        }
    }

    #[tokio::test]
    async fn enum_outside_domain_makes_no_remote_call() {
        let transport = Arc::new(FakeTransport::new());
        let result = dispatcher(&transport)
            .dispatch("search", &args(json!({"query": "crash", "namespace": "bogus"})))
            .await;
        let failure = failure(result);
        assert_eq!(failure.kind, FailureKind::InvalidParameterType);
        assert_eq!(failure.field.as_deref(), Some("namespace"));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn create_work_returns_the_created_entity() {
        let transport = Arc::new(FakeTransport::new().respond(201, json!({"work": {"id": "ISS-1"}})));
        let result = dispatcher(&transport)
            .dispatch(
                "create_work",
                &args(json!({"type": "issue", "title": "Crash", "applies_to_part": "PROD-1"})),
            )
            .await;
        assert_eq!(payload(result), json!({"id": "ISS-1"}));
        assert_eq!(transport.paths(), vec!["works.create"]);
    }

    #[tokio::test]
    async fn empty_listing_is_a_final_page() {
        let transport = Arc::new(FakeTransport::new().respond(200, json!({"works": []})));
        let result = dispatcher(&transport).dispatch("list_works", &Map::new()).await;
        assert_eq!(payload(result), json!({"items": []}));
    }

    #[tokio::test]
    async fn pagination_walks_until_the_token_runs_out() {
        let transport = Arc::new(
            FakeTransport::new()
                .respond(200, json!({"works": [{"id": "ISS-1"}], "next_cursor": "T1"}))
                .respond(200, json!({"works": [{"id": "ISS-2"}], "next_cursor": "T2"}))
                .respond(200, json!({"works": [{"id": "ISS-3"}]})),
        );
        let dispatcher = dispatcher(&transport);

        let mut collected = Vec::new();
        let mut arguments = Map::new();
        loop {
            let page = payload(dispatcher.dispatch("list_works", &arguments).await);
            collected.extend(page["items"].as_array().cloned().unwrap_or_default());
            match page.get("next_cursor") {
                Some(cursor) => {
                    arguments.insert("cursor".to_string(), cursor.clone());
                }
                None => break,
            }
        }

        assert_eq!(
            collected,
            vec![json!({"id": "ISS-1"}), json!({"id": "ISS-2"}), json!({"id": "ISS-3"})]
        );
        let cursors: Vec<Option<Value>> = transport
            .requests()
            .into_iter()
            .map(|request| request.body.and_then(|body| body.get("cursor").cloned()))
            .collect();
        assert_eq!(cursors, vec![None, Some(json!("T1")), Some(json!("T2"))]);
    }

    #[tokio::test]
    async fn illegal_stage_change_never_issues_the_mutation() {
        let transport = Arc::new(FakeTransport::new().respond(
            200,
            json!({
                "current_stage": {"name": "open"},
                "transitions": [{"target_stage": {"name": "in_progress"}}, {"target_stage": {"name": "closed"}}],
            }),
        ));
        let result = dispatcher(&transport)
            .dispatch(
                "update_work",
                &args(json!({"id": "ISS-1", "type": "issue", "stage": "archived"})),
            )
            .await;

        let failure = failure(result);
        assert_eq!(failure.kind, FailureKind::StageTransitionRejected);
        assert!(failure.message.contains("open"));
        assert!(failure.message.contains("archived"));
        assert_eq!(
            failure.details.expect("details")["legal_stages"],
            json!(["in_progress", "closed"])
        );
        assert_eq!(transport.paths(), vec!["stage-transitions.get"]);
    }

    #[tokio::test]
    async fn legal_stage_change_is_checked_then_sent() {
        let transport = Arc::new(
            FakeTransport::new()
                .respond(200, json!({"current_stage": {"name": "open"}, "transitions": [{"target_stage": {"name": "closed"}}]}))
                .respond(200, json!({"part": {"id": "ENH-1", "stage": {"name": "closed"}}})),
        );
        let result = dispatcher(&transport)
            .dispatch(
                "update_part",
                &args(json!({"id": "ENH-1", "type": "enhancement", "stage": "closed"})),
            )
            .await;
        assert_eq!(payload(result)["id"], "ENH-1");
        assert_eq!(transport.paths(), vec!["stage-transitions.get", "parts.update"]);
    }

    #[tokio::test]
    async fn padded_stage_is_checked_and_sent_trimmed() {
        let transport = Arc::new(
            FakeTransport::new()
                .respond(200, json!({"current_stage": {"name": "open"}, "transitions": [{"target_stage": {"name": "closed"}}]}))
                .respond(200, json!({"work": {"id": "ISS-1", "stage": {"name": "closed"}}})),
        );
        let result = dispatcher(&transport)
            .dispatch(
                "update_work",
                &args(json!({"id": "ISS-1", "type": "issue", "stage": " closed "})),
            )
            .await;
        assert_eq!(payload(result)["id"], "ISS-1");

        let requests = transport.requests();
        assert_eq!(requests[1].path, "works.update");
        let body = requests[1].body.as_ref().expect("update body");
        assert_eq!(body["stage"], json!({"name": "closed"}));
    }

    #[tokio::test]
    async fn update_without_stage_skips_the_guard() {
        let transport = Arc::new(FakeTransport::new().respond(200, json!({"work": {"id": "ISS-1"}})));
        let result = dispatcher(&transport)
            .dispatch("update_work", &args(json!({"id": "ISS-1", "type": "issue", "title": "New"})))
            .await;
        assert!(result.is_success());
        assert_eq!(transport.paths(), vec!["works.update"]);
    }

    #[tokio::test]
    async fn failed_stage_read_surfaces_without_mutation() {
        let transport = Arc::new(FakeTransport::new().respond(404, json!({"message": "not found"})));
        let result = dispatcher(&transport)
            .dispatch(
                "update_work",
                &args(json!({"id": "ISS-404", "type": "issue", "stage": "closed"})),
            )
            .await;
        assert_eq!(failure(result).kind, FailureKind::NotFound);
        assert_eq!(transport.paths(), vec!["stage-transitions.get"]);
    }

    #[tokio::test]
    async fn remote_status_maps_to_failure_kind() {
        let cases = [
            (401, FailureKind::Unauthorized),
            (400, FailureKind::InvalidRequest),
            (404, FailureKind::NotFound),
            (500, FailureKind::RemoteServerError),
        ];
        for (status, kind) in cases {
            let transport = Arc::new(FakeTransport::new().respond(status, json!({"message": "nope"})));
            let result = dispatcher(&transport)
                .dispatch("get_work", &args(json!({"id": "ISS-1"})))
                .await;
            let failure = failure(result);
            assert_eq!(failure.kind, kind, "status {status}");
            assert_eq!(failure.remote_status, Some(status));
        }
    }

    #[tokio::test]
    async fn no_response_is_a_transport_failure() {
        let transport = Arc::new(FakeTransport::new().fail(TransportError::Timeout {
            path: "works.get".to_string(),
        }));
        let result = dispatcher(&transport)
            .dispatch("get_work", &args(json!({"id": "ISS-1"})))
            .await;
        let failure = failure(result);
        assert_eq!(failure.kind, FailureKind::TransportError);
        assert_eq!(failure.remote_status, None);
    }

    #[tokio::test]
    async fn missing_credential_surfaces_at_first_remote_call() {
        let transport = Arc::new(FakeTransport::new().fail(TransportError::MissingCredential));
        let result = dispatcher(&transport).dispatch("get_current_user", &Map::new()).await;
        let failure = failure(result);
        assert_eq!(failure.kind, FailureKind::Unauthorized);
        assert_eq!(failure.remote_status, None);
    }

    #[tokio::test]
    async fn stage_lookup_tool_uses_the_guard_read() {
        let transport = Arc::new(FakeTransport::new().respond(
            200,
            json!({"current_stage": {"name": "triage"}, "transitions": [{"target_stage": {"name": "backlog"}}]}),
        ));
        let result = dispatcher(&transport)
            .dispatch(
                ToolName::ValidStageTransition.as_str(),
                &args(json!({"type": "ticket", "id": "TKT-1"})),
            )
            .await;
        assert_eq!(
            payload(result),
            json!({"id": "TKT-1", "current_stage": "triage", "legal_stages": ["backlog"]})
        );
    }
}
