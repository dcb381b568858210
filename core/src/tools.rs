//! Strongly-typed tool invocations.
//!
//! A validated invocation is one `ToolCall` variant per tool, so request
//! building can match exhaustively on the tool's own argument shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::pagination::Cursor;
use crate::validate::NormalizedArgs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    Search,
    GetCurrentUser,
    GetWork,
    CreateWork,
    UpdateWork,
    ListWorks,
    GetPart,
    CreatePart,
    UpdatePart,
    ListParts,
    ListMeetings,
    ValidStageTransition,
    AddTimelineEntry,
    GetSprints,
}

impl ToolName {
    pub const ALL: &'static [ToolName] = &[
        ToolName::Search,
        ToolName::GetCurrentUser,
        ToolName::GetWork,
        ToolName::CreateWork,
        ToolName::UpdateWork,
        ToolName::ListWorks,
        ToolName::GetPart,
        ToolName::CreatePart,
        ToolName::UpdatePart,
        ToolName::ListParts,
        ToolName::ListMeetings,
        ToolName::ValidStageTransition,
        ToolName::AddTimelineEntry,
        ToolName::GetSprints,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolName::Search => "search",
            ToolName::GetCurrentUser => "get_current_user",
            ToolName::GetWork => "get_work",
            ToolName::CreateWork => "create_work",
            ToolName::UpdateWork => "update_work",
            ToolName::ListWorks => "list_works",
            ToolName::GetPart => "get_part",
            ToolName::CreatePart => "create_part",
            ToolName::UpdatePart => "update_part",
            ToolName::ListParts => "list_parts",
            ToolName::ListMeetings => "list_meetings",
            ToolName::ValidStageTransition => "valid_stage_transition",
            ToolName::AddTimelineEntry => "add_timeline_entry",
            ToolName::GetSprints => "get_sprints",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|tool| tool.as_str() == raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchNamespace {
    Article,
    Issue,
    Ticket,
    Part,
    DevUser,
    Account,
    RevOrg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkType {
    Issue,
    Ticket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkState {
    Open,
    InProgress,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartType {
    Enhancement,
}

/// Entity kinds that carry a workflow stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageEntityType {
    Issue,
    Ticket,
    Enhancement,
}

impl From<WorkType> for StageEntityType {
    fn from(value: WorkType) -> Self {
        match value {
            WorkType::Issue => StageEntityType::Issue,
            WorkType::Ticket => StageEntityType::Ticket,
        }
    }
}

impl From<PartType> for StageEntityType {
    fn from(value: PartType) -> Self {
        match value {
            PartType::Enhancement => StageEntityType::Enhancement,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingChannel {
    AmazonConnect,
    GoogleMeet,
    Offline,
    Other,
    Teams,
    Zoom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingState {
    Canceled,
    Completed,
    NoShow,
    Rescheduled,
    Scheduled,
    Waiting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SprintState {
    Active,
    Planned,
    Completed,
}

/// Inclusive timestamp window. `after <= before` is left to the remote API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DateRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchArgs {
    pub query: String,
    pub namespace: SearchNamespace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityIdArgs {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateWorkArgs {
    pub work_type: WorkType,
    pub title: String,
    pub applies_to_part: String,
    pub body: Option<String>,
    pub owned_by: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateWorkArgs {
    pub id: String,
    pub work_type: WorkType,
    pub title: Option<String>,
    pub body: Option<String>,
    pub applies_to_part: Option<String>,
    pub owned_by: Option<Vec<String>>,
    pub stage: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListWorksArgs {
    pub cursor: Option<Cursor>,
    pub types: Vec<WorkType>,
    pub applies_to_part: Vec<String>,
    pub created_by: Vec<String>,
    pub owned_by: Vec<String>,
    pub stage: Vec<String>,
    pub state: Vec<WorkState>,
    pub created_date: Option<DateRange>,
    pub modified_date: Option<DateRange>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePartArgs {
    pub part_type: PartType,
    pub name: String,
    pub owned_by: Vec<String>,
    pub parent_part: Vec<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePartArgs {
    pub id: String,
    pub part_type: PartType,
    pub name: Option<String>,
    pub description: Option<String>,
    pub owned_by: Option<Vec<String>>,
    pub target_close_date: Option<DateTime<Utc>>,
    pub target_start_date: Option<DateTime<Utc>>,
    pub stage: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPartsArgs {
    pub cursor: Option<Cursor>,
    pub part_type: PartType,
    pub owned_by: Vec<String>,
    pub parent_part: Vec<String>,
    pub created_by: Vec<String>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListMeetingsArgs {
    pub cursor: Option<Cursor>,
    pub channel: Vec<MeetingChannel>,
    pub state: Vec<MeetingState>,
    pub created_by: Vec<String>,
    pub organizer: Vec<String>,
    pub created_date: Option<DateRange>,
    pub scheduled_date: Option<DateRange>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageLookupArgs {
    pub entity_type: StageEntityType,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntryArgs {
    pub id: String,
    pub timeline_entry: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetSprintsArgs {
    pub ancestor_part_id: String,
    pub state: Option<SprintState>,
}

/// A validated invocation: one variant per catalog tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    Search(SearchArgs),
    GetCurrentUser,
    GetWork(EntityIdArgs),
    CreateWork(CreateWorkArgs),
    UpdateWork(UpdateWorkArgs),
    ListWorks(ListWorksArgs),
    GetPart(EntityIdArgs),
    CreatePart(CreatePartArgs),
    UpdatePart(UpdatePartArgs),
    ListParts(ListPartsArgs),
    ListMeetings(ListMeetingsArgs),
    ValidStageTransition(StageLookupArgs),
    AddTimelineEntry(TimelineEntryArgs),
    GetSprints(GetSprintsArgs),
}

impl ToolCall {
    pub fn tool(&self) -> ToolName {
        match self {
            ToolCall::Search(_) => ToolName::Search,
            ToolCall::GetCurrentUser => ToolName::GetCurrentUser,
            ToolCall::GetWork(_) => ToolName::GetWork,
            ToolCall::CreateWork(_) => ToolName::CreateWork,
            ToolCall::UpdateWork(_) => ToolName::UpdateWork,
            ToolCall::ListWorks(_) => ToolName::ListWorks,
            ToolCall::GetPart(_) => ToolName::GetPart,
            ToolCall::CreatePart(_) => ToolName::CreatePart,
            ToolCall::UpdatePart(_) => ToolName::UpdatePart,
            ToolCall::ListParts(_) => ToolName::ListParts,
            ToolCall::ListMeetings(_) => ToolName::ListMeetings,
            ToolCall::ValidStageTransition(_) => ToolName::ValidStageTransition,
            ToolCall::AddTimelineEntry(_) => ToolName::AddTimelineEntry,
            ToolCall::GetSprints(_) => ToolName::GetSprints,
        }
    }

    /// Stage change requested by a mutating call, if any.
    pub fn requested_stage(&self) -> Option<StageChange<'_>> {
        match self {
            ToolCall::UpdateWork(args) => args.stage.as_deref().map(|stage| StageChange {
                entity_type: args.work_type.into(),
                entity_id: &args.id,
                requested_stage: stage,
            }),
            ToolCall::UpdatePart(args) => args.stage.as_deref().map(|stage| StageChange {
                entity_type: args.part_type.into(),
                entity_id: &args.id,
                requested_stage: stage,
            }),
            _ => None,
        }
    }

    /// Pagination cursor supplied by the caller, for list tools.
    pub fn cursor(&self) -> Option<&Cursor> {
        match self {
            ToolCall::ListWorks(args) => args.cursor.as_ref(),
            ToolCall::ListParts(args) => args.cursor.as_ref(),
            ToolCall::ListMeetings(args) => args.cursor.as_ref(),
            _ => None,
        }
    }

    pub fn is_paginated(&self) -> bool {
        matches!(
            self,
            ToolCall::ListWorks(_) | ToolCall::ListParts(_) | ToolCall::ListMeetings(_)
        )
    }

    /// Converts validated arguments into the tool's typed shape.
    pub fn from_args(tool: ToolName, args: &NormalizedArgs) -> Result<Self, ValidationError> {
        let call = match tool {
            ToolName::Search => ToolCall::Search(SearchArgs {
                query: args.required_string("query")?,
                namespace: args.required_enum("namespace")?,
            }),
            ToolName::GetCurrentUser => ToolCall::GetCurrentUser,
            ToolName::GetWork => ToolCall::GetWork(EntityIdArgs {
                id: args.required_string("id")?,
            }),
            ToolName::CreateWork => ToolCall::CreateWork(CreateWorkArgs {
                work_type: args.required_enum("type")?,
                title: args.required_string("title")?,
                applies_to_part: args.required_string("applies_to_part")?,
                body: args.optional_string("body")?,
                owned_by: args.strings("owned_by")?,
            }),
            ToolName::UpdateWork => ToolCall::UpdateWork(UpdateWorkArgs {
                id: args.required_string("id")?,
                work_type: args.required_enum("type")?,
                title: args.optional_string("title")?,
                body: args.optional_string("body")?,
                applies_to_part: args.optional_string("applies_to_part")?,
                owned_by: args.optional_strings("owned_by")?,
                stage: trimmed(args.optional_string("stage")?),
            }),
            ToolName::ListWorks => ToolCall::ListWorks(ListWorksArgs {
                cursor: args.cursor("cursor")?,
                types: args.enums("type")?,
                applies_to_part: args.strings("applies_to_part")?,
                created_by: args.strings("created_by")?,
                owned_by: args.strings("owned_by")?,
                stage: args.strings("stage")?,
                state: args.enums("state")?,
                created_date: args.date_range("created_date")?,
                modified_date: args.date_range("modified_date")?,
                limit: args.optional_u64("limit")?,
            }),
            ToolName::GetPart => ToolCall::GetPart(EntityIdArgs {
                id: args.required_string("id")?,
            }),
            ToolName::CreatePart => ToolCall::CreatePart(CreatePartArgs {
                part_type: args.required_enum("type")?,
                name: args.required_string("name")?,
                owned_by: args.strings("owned_by")?,
                parent_part: args.strings("parent_part")?,
                description: args.optional_string("description")?,
            }),
            ToolName::UpdatePart => ToolCall::UpdatePart(UpdatePartArgs {
                id: args.required_string("id")?,
                part_type: args.required_enum("type")?,
                name: args.optional_string("name")?,
                description: args.optional_string("description")?,
                owned_by: args.optional_strings("owned_by")?,
                target_close_date: args.timestamp("target_close_date")?,
                target_start_date: args.timestamp("target_start_date")?,
                stage: trimmed(args.optional_string("stage")?),
            }),
            ToolName::ListParts => ToolCall::ListParts(ListPartsArgs {
                cursor: args.cursor("cursor")?,
                part_type: args.required_enum("type")?,
                owned_by: args.strings("owned_by")?,
                parent_part: args.strings("parent_part")?,
                created_by: args.strings("created_by")?,
                limit: args.optional_u64("limit")?,
            }),
            ToolName::ListMeetings => ToolCall::ListMeetings(ListMeetingsArgs {
                cursor: args.cursor("cursor")?,
                channel: args.enums("channel")?,
                state: args.enums("state")?,
                created_by: args.strings("created_by")?,
                organizer: args.strings("organizer")?,
                created_date: args.date_range("created_date")?,
                scheduled_date: args.date_range("scheduled_date")?,
                limit: args.optional_u64("limit")?,
            }),
            ToolName::ValidStageTransition => ToolCall::ValidStageTransition(StageLookupArgs {
                entity_type: args.required_enum("type")?,
                id: args.required_string("id")?,
            }),
            ToolName::AddTimelineEntry => ToolCall::AddTimelineEntry(TimelineEntryArgs {
                id: args.required_string("id")?,
                timeline_entry: args.required_string("timeline_entry")?,
            }),
            ToolName::GetSprints => ToolCall::GetSprints(GetSprintsArgs {
                ancestor_part_id: args.required_string("ancestor_part_id")?,
                state: args.optional_enum("state")?,
            }),
        };
        Ok(call)
    }
}

/// Stage names are compared and sent without surrounding whitespace.
fn trimmed(stage: Option<String>) -> Option<String> {
    stage.map(|name| name.trim().to_string())
}

/// A requested workflow stage change on one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageChange<'a> {
    pub entity_type: StageEntityType,
    pub entity_id: &'a str,
    pub requested_stage: &'a str,
}
