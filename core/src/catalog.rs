//! Schema registry: the static tool catalog.
//!
//! Built once at compile time and only ever read, so it can be shared across
//! concurrent invocations without synchronisation.

use serde_json::{Map, Value, json};

use crate::tools::ToolName;

pub const SEARCH_NAMESPACES: &[&str] = &[
    "article", "issue", "ticket", "part", "dev_user", "account", "rev_org",
];
pub const WORK_TYPES: &[&str] = &["issue", "ticket"];
pub const WORK_STATES: &[&str] = &["open", "in_progress", "closed"];
pub const PART_TYPES: &[&str] = &["enhancement"];
pub const STAGE_ENTITY_TYPES: &[&str] = &["issue", "ticket", "enhancement"];
pub const MEETING_CHANNELS: &[&str] = &[
    "amazon_connect",
    "google_meet",
    "offline",
    "other",
    "teams",
    "zoom",
];
pub const MEETING_STATES: &[&str] = &[
    "canceled",
    "completed",
    "no_show",
    "rescheduled",
    "scheduled",
    "waiting",
];
pub const SPRINT_STATES: &[&str] = &["active", "planned", "completed"];
pub const CURSOR_MODES: &[&str] = &["after", "before"];

/// Declared kind of a single parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    /// Non-negative integer.
    Integer,
    Object(ObjectShape),
    Enum(&'static [&'static str]),
    Array(ItemKind),
}

/// Element constraint for array parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    String,
    Enum(&'static [&'static str]),
}

/// Known inner shapes of object parameters. Checked when arguments are
/// converted into their typed form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectShape {
    Cursor,
    DateRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct ToolSpec {
    pub tool: ToolName,
    pub description: &'static str,
    pub parameters: &'static [ParameterSpec],
}

impl ToolSpec {
    pub fn name(&self) -> &'static str {
        self.tool.as_str()
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|param| param.name == name)
    }

    /// JSON Schema advertised through `tools/list`.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in self.parameters {
            let mut schema = kind_schema(param.kind);
            if !param.description.is_empty() {
                schema["description"] = Value::String(param.description.to_string());
            }
            properties.insert(param.name.to_string(), schema);
            if param.required {
                required.push(Value::String(param.name.to_string()));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

fn enum_schema(values: &[&str]) -> Value {
    json!({ "type": "string", "enum": values })
}

fn kind_schema(kind: ParamKind) -> Value {
    match kind {
        ParamKind::String => json!({ "type": "string" }),
        ParamKind::Integer => json!({ "type": "integer", "minimum": 0 }),
        ParamKind::Enum(values) => enum_schema(values),
        ParamKind::Array(ItemKind::String) => {
            json!({ "type": "array", "items": { "type": "string" } })
        }
        ParamKind::Array(ItemKind::Enum(values)) => {
            json!({ "type": "array", "items": enum_schema(values) })
        }
        ParamKind::Object(ObjectShape::Cursor) => json!({
            "type": "object",
            "properties": {
                "next_cursor": { "type": "string" },
                "mode": enum_schema(CURSOR_MODES)
            },
            "required": ["next_cursor", "mode"]
        }),
        ParamKind::Object(ObjectShape::DateRange) => json!({
            "type": "object",
            "properties": {
                "after": { "type": "string", "format": "date-time" },
                "before": { "type": "string", "format": "date-time" }
            }
        }),
    }
}

const fn required(name: &'static str, kind: ParamKind) -> ParameterSpec {
    ParameterSpec {
        name,
        kind,
        required: true,
        description: "",
    }
}

const fn optional(name: &'static str, kind: ParamKind) -> ParameterSpec {
    ParameterSpec {
        name,
        kind,
        required: false,
        description: "",
    }
}

const fn described(spec: ParameterSpec, description: &'static str) -> ParameterSpec {
    ParameterSpec {
        description,
        ..spec
    }
}

const STRINGS: ParamKind = ParamKind::Array(ItemKind::String);
const CURSOR: ParameterSpec = described(
    optional("cursor", ParamKind::Object(ObjectShape::Cursor)),
    "Continuation cursor from a previous page (next_cursor + mode)",
);
const LIMIT: ParameterSpec = described(
    optional("limit", ParamKind::Integer),
    "The maximum number of items to return",
);

static CATALOG: &[ToolSpec] = &[
    ToolSpec {
        tool: ToolName::Search,
        description: "Search DevRev using the provided query",
        parameters: &[
            required("query", ParamKind::String),
            required("namespace", ParamKind::Enum(SEARCH_NAMESPACES)),
        ],
    },
    ToolSpec {
        tool: ToolName::GetCurrentUser,
        description: "Get the current user's information",
        parameters: &[],
    },
    ToolSpec {
        tool: ToolName::GetWork,
        description: "Get all information about a DevRev issue or ticket using its ID",
        parameters: &[required("id", ParamKind::String)],
    },
    ToolSpec {
        tool: ToolName::CreateWork,
        description: "Create a new issue or ticket in DevRev",
        parameters: &[
            required("type", ParamKind::Enum(WORK_TYPES)),
            required("title", ParamKind::String),
            optional("body", ParamKind::String),
            required("applies_to_part", ParamKind::String),
            described(
                optional("owned_by", STRINGS),
                "The user IDs of the owners of the work",
            ),
        ],
    },
    ToolSpec {
        tool: ToolName::UpdateWork,
        description: "Update an existing issue or ticket in DevRev",
        parameters: &[
            required("id", ParamKind::String),
            required("type", ParamKind::Enum(WORK_TYPES)),
            optional("title", ParamKind::String),
            optional("body", ParamKind::String),
            optional("applies_to_part", ParamKind::String),
            described(
                optional("owned_by", STRINGS),
                "The user IDs of the new owners of the work",
            ),
            described(
                optional("stage", ParamKind::String),
                "Target stage name; must be a legal transition from the current stage",
            ),
        ],
    },
    ToolSpec {
        tool: ToolName::ListWorks,
        description: "List works in DevRev, one page at a time",
        parameters: &[
            CURSOR,
            described(
                optional("type", ParamKind::Array(ItemKind::Enum(WORK_TYPES))),
                "The type of works to list",
            ),
            described(
                optional("applies_to_part", STRINGS),
                "The part IDs of the works to list",
            ),
            described(
                optional("created_by", STRINGS),
                "The user IDs of the creators of the works to list",
            ),
            described(
                optional("owned_by", STRINGS),
                "The user IDs of the owners of the works to list",
            ),
            described(
                optional("stage", STRINGS),
                "The stage names of the works to list",
            ),
            described(
                optional("state", ParamKind::Array(ItemKind::Enum(WORK_STATES))),
                "The state names of the works to list",
            ),
            optional("created_date", ParamKind::Object(ObjectShape::DateRange)),
            optional("modified_date", ParamKind::Object(ObjectShape::DateRange)),
            LIMIT,
        ],
    },
    ToolSpec {
        tool: ToolName::GetPart,
        description: "Get an existing part in DevRev",
        parameters: &[required("id", ParamKind::String)],
    },
    ToolSpec {
        tool: ToolName::CreatePart,
        description: "Create a new part in DevRev",
        parameters: &[
            required("type", ParamKind::Enum(PART_TYPES)),
            required("name", ParamKind::String),
            described(
                required("owned_by", STRINGS),
                "The user IDs of the owners of the part",
            ),
            described(
                required("parent_part", STRINGS),
                "The part IDs of the parent parts",
            ),
            described(
                optional("description", ParamKind::String),
                "The description of the part",
            ),
        ],
    },
    ToolSpec {
        tool: ToolName::UpdatePart,
        description: "Update an existing part in DevRev",
        parameters: &[
            required("id", ParamKind::String),
            required("type", ParamKind::Enum(PART_TYPES)),
            optional("name", ParamKind::String),
            optional("description", ParamKind::String),
            described(
                optional("owned_by", STRINGS),
                "The user IDs of the owners of the part",
            ),
            described(
                optional("target_close_date", ParamKind::String),
                "The target closed date of the part, for example: 2025-06-03T00:00:00Z",
            ),
            described(
                optional("target_start_date", ParamKind::String),
                "The target start date of the part, for example: 2025-06-03T00:00:00Z",
            ),
            described(
                optional("stage", ParamKind::String),
                "Target stage name; must be a legal transition from the current stage",
            ),
        ],
    },
    ToolSpec {
        tool: ToolName::ListParts,
        description: "List parts in DevRev, one page at a time",
        parameters: &[
            CURSOR,
            required("type", ParamKind::Enum(PART_TYPES)),
            described(
                optional("owned_by", STRINGS),
                "The user IDs of the owners of the parts to list",
            ),
            described(
                optional("parent_part", STRINGS),
                "The part IDs of the parent parts",
            ),
            described(
                optional("created_by", STRINGS),
                "The user IDs of the creators of the parts to list",
            ),
            LIMIT,
        ],
    },
    ToolSpec {
        tool: ToolName::ListMeetings,
        description: "List meetings in DevRev, one page at a time",
        parameters: &[
            CURSOR,
            optional("channel", ParamKind::Array(ItemKind::Enum(MEETING_CHANNELS))),
            optional("state", ParamKind::Array(ItemKind::Enum(MEETING_STATES))),
            optional("created_by", STRINGS),
            optional("organizer", STRINGS),
            optional("created_date", ParamKind::Object(ObjectShape::DateRange)),
            optional("scheduled_date", ParamKind::Object(ObjectShape::DateRange)),
            LIMIT,
        ],
    },
    ToolSpec {
        tool: ToolName::ValidStageTransition,
        description: "List the stages a work item or part can legally move to from its current stage",
        parameters: &[
            required("type", ParamKind::Enum(STAGE_ENTITY_TYPES)),
            required("id", ParamKind::String),
        ],
    },
    ToolSpec {
        tool: ToolName::AddTimelineEntry,
        description: "Add a comment to the timeline of a work item or part",
        parameters: &[
            required("id", ParamKind::String),
            required("timeline_entry", ParamKind::String),
        ],
    },
    ToolSpec {
        tool: ToolName::GetSprints,
        description: "Get the sprints of a part, optionally filtered by state",
        parameters: &[
            required("ancestor_part_id", ParamKind::String),
            optional("state", ParamKind::Enum(SPRINT_STATES)),
        ],
    },
];

pub fn catalog() -> &'static [ToolSpec] {
    CATALOG
}

pub fn lookup(tool_name: &str) -> Option<&'static ToolSpec> {
    let tool = ToolName::parse(tool_name)?;
    CATALOG.iter().find(|spec| spec.tool == tool)
}
