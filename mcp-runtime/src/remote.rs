//! Request building and response mapping for each tool.

use devrev_core::pagination::{from_remote_page, to_remote_query};
use devrev_core::stage::StageTransitionSet;
use devrev_core::tools::{
    CreatePartArgs, CreateWorkArgs, DateRange, GetSprintsArgs, ListMeetingsArgs, ListPartsArgs,
    ListWorksArgs, StageEntityType, UpdatePartArgs, UpdateWorkArgs,
};
use devrev_core::{Cursor, Failure, ToolCall};
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::guard::transition_set_from_body;
use crate::transport::RemoteRequest;

pub mod endpoints {
    pub const SEARCH: &str = "search.hybrid";
    pub const DEV_USERS_SELF: &str = "dev-users.self";
    pub const WORKS_GET: &str = "works.get";
    pub const WORKS_CREATE: &str = "works.create";
    pub const WORKS_UPDATE: &str = "works.update";
    pub const WORKS_LIST: &str = "works.list";
    pub const PARTS_GET: &str = "parts.get";
    pub const PARTS_CREATE: &str = "parts.create";
    pub const PARTS_UPDATE: &str = "parts.update";
    pub const PARTS_LIST: &str = "parts.list";
    pub const MEETINGS_LIST: &str = "meetings.list";
    pub const STAGE_TRANSITIONS_GET: &str = "stage-transitions.get";
    pub const TIMELINE_ENTRIES_CREATE: &str = "timeline-entries.create";
    pub const VISTA_GROUPS_LIST: &str = "vistas.groups.list";
}

/// Remote request for a validated call.
pub fn build(call: &ToolCall) -> RemoteRequest {
    match call {
        ToolCall::Search(args) => RemoteRequest::post(
            endpoints::SEARCH,
            json!({ "query": args.query, "namespace": args.namespace }),
        ),
        ToolCall::GetCurrentUser => RemoteRequest::get(endpoints::DEV_USERS_SELF),
        ToolCall::GetWork(args) => {
            RemoteRequest::post(endpoints::WORKS_GET, json!({ "id": args.id }))
        }
        ToolCall::CreateWork(args) => RemoteRequest::post(endpoints::WORKS_CREATE, create_work(args)),
        ToolCall::UpdateWork(args) => RemoteRequest::post(endpoints::WORKS_UPDATE, update_work(args)),
        ToolCall::ListWorks(args) => RemoteRequest::post(endpoints::WORKS_LIST, list_works(args)),
        ToolCall::GetPart(args) => {
            RemoteRequest::post(endpoints::PARTS_GET, json!({ "id": args.id }))
        }
        ToolCall::CreatePart(args) => RemoteRequest::post(endpoints::PARTS_CREATE, create_part(args)),
        ToolCall::UpdatePart(args) => RemoteRequest::post(endpoints::PARTS_UPDATE, update_part(args)),
        ToolCall::ListParts(args) => RemoteRequest::post(endpoints::PARTS_LIST, list_parts(args)),
        ToolCall::ListMeetings(args) => {
            RemoteRequest::post(endpoints::MEETINGS_LIST, list_meetings(args))
        }
        ToolCall::ValidStageTransition(args) => stage_transitions_request(args.entity_type, &args.id),
        ToolCall::AddTimelineEntry(args) => RemoteRequest::post(
            endpoints::TIMELINE_ENTRIES_CREATE,
            json!({
                "object": args.id,
                "type": "timeline_comment",
                "body": args.timeline_entry,
            }),
        ),
        ToolCall::GetSprints(args) => RemoteRequest::post(endpoints::VISTA_GROUPS_LIST, get_sprints(args)),
    }
}

/// The single read behind both the stage guard and `valid_stage_transition`.
pub fn stage_transitions_request(entity_type: StageEntityType, id: &str) -> RemoteRequest {
    RemoteRequest::post(
        endpoints::STAGE_TRANSITIONS_GET,
        json!({ "object": id, "object_type": entity_type }),
    )
}

/// Caller-facing payload for a successful response.
pub fn map_response(call: &ToolCall, body: Value) -> Result<Value, Failure> {
    let payload = match call {
        ToolCall::Search(_) => json!({ "results": unwrap_envelope(body, "results") }),
        ToolCall::GetCurrentUser => unwrap_envelope(body, "dev_user"),
        ToolCall::GetWork(_) | ToolCall::CreateWork(_) | ToolCall::UpdateWork(_) => {
            unwrap_envelope(body, "work")
        }
        ToolCall::GetPart(_) | ToolCall::CreatePart(_) | ToolCall::UpdatePart(_) => {
            unwrap_envelope(body, "part")
        }
        ToolCall::ListWorks(_) => page(body, "works"),
        ToolCall::ListParts(_) => page(body, "parts"),
        ToolCall::ListMeetings(_) => page(body, "meetings"),
        ToolCall::ValidStageTransition(args) => {
            let StageTransitionSet {
                current_stage,
                legal_stages,
            } = transition_set_from_body(&body)?;
            json!({
                "id": args.id,
                "current_stage": current_stage,
                "legal_stages": legal_stages,
            })
        }
        ToolCall::AddTimelineEntry(_) => unwrap_envelope(body, "timeline_entry"),
        ToolCall::GetSprints(_) => json!({ "sprints": unwrap_envelope(body, "vista_group") }),
    };
    Ok(payload)
}

/// Missing envelope key passes the whole body through.
fn unwrap_envelope(body: Value, key: &str) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key(key) => map.remove(key).unwrap_or(Value::Null),
        other => other,
    }
}

fn page(body: Value, items_key: &str) -> Value {
    let items = match body.get(items_key) {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    };
    let page = from_remote_page(items, body.get("next_cursor").and_then(Value::as_str))
        .with_prev_token(body.get("prev_cursor").and_then(Value::as_str));
    json!(page)
}

#[derive(Default)]
struct Body(Map<String, Value>);

impl Body {
    fn set(mut self, key: &str, value: impl Serialize) -> Self {
        self.0.insert(key.to_string(), json!(value));
        self
    }

    fn set_opt(self, key: &str, value: Option<impl Serialize>) -> Self {
        match value {
            Some(value) => self.set(key, value),
            None => self,
        }
    }

    /// Empty lists are omitted: the remote API treats an empty filter as
    /// "match nothing" for some fields.
    fn set_list<T: Serialize>(self, key: &str, values: &[T]) -> Self {
        if values.is_empty() { self } else { self.set(key, values) }
    }

    fn set_range(self, key: &str, range: Option<&DateRange>) -> Self {
        match range {
            Some(range) if range.after.is_some() || range.before.is_some() => self.set(key, range),
            _ => self,
        }
    }

    fn page(mut self, cursor: Option<&Cursor>, limit: Option<u64>) -> Self {
        self.0.extend(to_remote_query(cursor));
        self.set_opt("limit", limit)
    }

    fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

fn create_work(args: &CreateWorkArgs) -> Value {
    Body::default()
        .set("type", args.work_type)
        .set("title", &args.title)
        .set("applies_to_part", &args.applies_to_part)
        .set_opt("body", args.body.as_deref())
        .set_list("owned_by", &args.owned_by)
        .into_value()
}

fn update_work(args: &UpdateWorkArgs) -> Value {
    Body::default()
        .set("id", &args.id)
        .set("type", args.work_type)
        .set_opt("title", args.title.as_deref())
        .set_opt("body", args.body.as_deref())
        .set_opt("applies_to_part", args.applies_to_part.as_deref())
        .set_opt("owned_by", args.owned_by.as_ref().map(|ids| json!({ "set": ids })))
        .set_opt("stage", args.stage.as_deref().map(|name| json!({ "name": name })))
        .into_value()
}

fn list_works(args: &ListWorksArgs) -> Value {
    let stage = (!args.stage.is_empty()).then(|| json!({ "name": args.stage }));
    Body::default()
        .set_list("type", &args.types)
        .set_list("applies_to_part", &args.applies_to_part)
        .set_list("created_by", &args.created_by)
        .set_list("owned_by", &args.owned_by)
        .set_opt("stage", stage)
        .set_list("state", &args.state)
        .set_range("created_date", args.created_date.as_ref())
        .set_range("modified_date", args.modified_date.as_ref())
        .page(args.cursor.as_ref(), args.limit)
        .into_value()
}

fn create_part(args: &CreatePartArgs) -> Value {
    Body::default()
        .set("type", args.part_type)
        .set("name", &args.name)
        .set("owned_by", &args.owned_by)
        .set("parent_part", &args.parent_part)
        .set_opt("description", args.description.as_deref())
        .into_value()
}

fn update_part(args: &UpdatePartArgs) -> Value {
    Body::default()
        .set("id", &args.id)
        .set("type", args.part_type)
        .set_opt("name", args.name.as_deref())
        .set_opt("description", args.description.as_deref())
        .set_opt("owned_by", args.owned_by.as_ref().map(|ids| json!({ "set": ids })))
        .set_opt("target_close_date", args.target_close_date)
        .set_opt("target_start_date", args.target_start_date)
        .set_opt("stage", args.stage.as_deref().map(|name| json!({ "name": name })))
        .into_value()
}

fn list_parts(args: &ListPartsArgs) -> Value {
    let parent_part = (!args.parent_part.is_empty()).then(|| json!({ "parts": args.parent_part }));
    Body::default()
        .set("type", [args.part_type])
        .set_list("owned_by", &args.owned_by)
        .set_opt("parent_part", parent_part)
        .set_list("created_by", &args.created_by)
        .page(args.cursor.as_ref(), args.limit)
        .into_value()
}

fn list_meetings(args: &ListMeetingsArgs) -> Value {
    Body::default()
        .set_list("channel", &args.channel)
        .set_list("state", &args.state)
        .set_list("created_by", &args.created_by)
        .set_list("organizer", &args.organizer)
        .set_range("created_date", args.created_date.as_ref())
        .set_range("scheduled_date", args.scheduled_date.as_ref())
        .page(args.cursor.as_ref(), args.limit)
        .into_value()
}

fn get_sprints(args: &GetSprintsArgs) -> Value {
    Body::default()
        .set("ancestor_part", [&args.ancestor_part_id])
        .set("group_object_type", ["work"])
        .set_opt("state", args.state.map(|state| [state]))
        .into_value()
}

#[cfg(test)]
mod tests {
    use super::*;
    use devrev_core::catalog::lookup;
    use devrev_core::validate::validate_call;
    use reqwest::Method;

    fn call(tool: &str, args: Value) -> ToolCall {
        let spec = lookup(tool).expect("catalog tool");
        let Value::Object(args) = args else {
            panic!("arguments must be an object");
        };
        validate_call(spec, &args).expect("valid arguments")
    }

    #[test]
    fn get_current_user_is_a_bodyless_get() {
        let request = build(&ToolCall::GetCurrentUser);
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.path, endpoints::DEV_USERS_SELF);
        assert_eq!(request.body, None);
    }

    #[test]
    fn create_work_omits_unset_optionals() {
        let request = build(&call(
            "create_work",
            json!({"type": "issue", "title": "Crash on save", "applies_to_part": "PROD-1", "body": ""}),
        ));
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.path, endpoints::WORKS_CREATE);
        assert_eq!(
            request.body,
            Some(json!({"type": "issue", "title": "Crash on save", "applies_to_part": "PROD-1"}))
        );
    }

    #[test]
    fn update_work_wraps_owners_and_stage() {
        let request = build(&call(
            "update_work",
            json!({"id": "ISS-1", "type": "issue", "owned_by": ["DEVU-1"], "stage": "in_development"}),
        ));
        assert_eq!(
            request.body,
            Some(json!({
                "id": "ISS-1",
                "type": "issue",
                "owned_by": {"set": ["DEVU-1"]},
                "stage": {"name": "in_development"},
            }))
        );
    }

    #[test]
    fn list_works_first_page_has_no_cursor_fields() {
        let request = build(&call("list_works", json!({"type": ["issue"], "limit": 10})));
        let body = request.body.expect("list body");
        assert_eq!(body["type"], json!(["issue"]));
        assert_eq!(body["limit"], json!(10));
        assert!(body.get("cursor").is_none());
        assert!(body.get("mode").is_none());
    }

    #[test]
    fn list_works_passes_cursor_and_stage_filter() {
        let request = build(&call(
            "list_works",
            json!({
                "cursor": {"next_cursor": "T1", "mode": "after"},
                "stage": ["triage", "backlog"],
                "created_date": {"after": "2024-01-01T00:00:00Z"},
            }),
        ));
        let body = request.body.expect("list body");
        assert_eq!(body["cursor"], "T1");
        assert_eq!(body["mode"], "after");
        assert_eq!(body["stage"], json!({"name": ["triage", "backlog"]}));
        assert_eq!(body["created_date"], json!({"after": "2024-01-01T00:00:00Z"}));
    }

    #[test]
    fn list_parts_wraps_type_and_parent() {
        let request = build(&call(
            "list_parts",
            json!({"type": "enhancement", "parent_part": ["PROD-1"]}),
        ));
        assert_eq!(
            request.body,
            Some(json!({"type": ["enhancement"], "parent_part": {"parts": ["PROD-1"]}}))
        );
    }

    #[test]
    fn timeline_entry_targets_the_object() {
        let request = build(&call(
            "add_timeline_entry",
            json!({"id": "ISS-1", "timeline_entry": "Reproduced on 1.4"}),
        ));
        assert_eq!(request.path, endpoints::TIMELINE_ENTRIES_CREATE);
        assert_eq!(
            request.body,
            Some(json!({"object": "ISS-1", "type": "timeline_comment", "body": "Reproduced on 1.4"}))
        );
    }

    #[test]
    fn get_sprints_filters_by_ancestor_and_state() {
        let request = build(&call(
            "get_sprints",
            json!({"ancestor_part_id": "PROD-1", "state": "active"}),
        ));
        assert_eq!(
            request.body,
            Some(json!({
                "ancestor_part": ["PROD-1"],
                "group_object_type": ["work"],
                "state": ["active"],
            }))
        );
    }

    #[test]
    fn envelope_is_unwrapped_or_passed_through() {
        let get = call("get_work", json!({"id": "ISS-1"}));
        assert_eq!(
            map_response(&get, json!({"work": {"id": "ISS-1"}})).unwrap(),
            json!({"id": "ISS-1"})
        );
        assert_eq!(
            map_response(&get, json!({"id": "ISS-1"})).unwrap(),
            json!({"id": "ISS-1"})
        );
    }

    #[test]
    fn list_response_becomes_a_page() {
        let list = call("list_works", json!({}));
        let payload = map_response(
            &list,
            json!({"works": [{"id": "ISS-1"}], "next_cursor": "T2", "prev_cursor": ""}),
        )
        .unwrap();
        assert_eq!(
            payload,
            json!({
                "items": [{"id": "ISS-1"}],
                "next_cursor": {"next_cursor": "T2", "mode": "after"},
            })
        );
    }

    #[test]
    fn empty_list_response_is_an_empty_final_page() {
        let list = call("list_meetings", json!({}));
        assert_eq!(map_response(&list, json!({})).unwrap(), json!({"items": []}));
    }

    #[test]
    fn stage_lookup_maps_to_current_and_legal_stages() {
        let lookup_call = call("valid_stage_transition", json!({"type": "issue", "id": "ISS-1"}));
        let request = build(&lookup_call);
        assert_eq!(
            request.body,
            Some(json!({"object": "ISS-1", "object_type": "issue"}))
        );

        let payload = map_response(
            &lookup_call,
            json!({
                "current_stage": {"name": "triage"},
                "transitions": [{"target_stage": {"name": "backlog"}}],
            }),
        )
        .unwrap();
        assert_eq!(
            payload,
            json!({"id": "ISS-1", "current_stage": "triage", "legal_stages": ["backlog"]})
        );
    }
}
