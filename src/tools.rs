//! Tool catalogue.
//!
//! Each tool is a row: name, description, Graph API endpoint, and argument
//! list. Argument names are the friendly names clients see; the request
//! builder maps them onto Graph API names. List tools get `page_size` and
//! `page_cursor` automatically.

use serde_json::{json, Map, Value};

use crate::graph::Endpoint;
use crate::mcp::protocol::ToolDefinition;

/// JSON type of a tool argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// String.
    String,
    /// Integer.
    Integer,
    /// Boolean.
    Boolean,
    /// Array of strings.
    StringArray,
    /// Array of objects (filters, specs).
    ObjectArray,
    /// Arbitrary object (targeting specs and similar).
    Object,
    /// Preset name or `{since, until}` object.
    DateRange,
}

impl ParamKind {
    fn schema(self) -> Value {
        match self {
            Self::String => json!({"type": "string"}),
            Self::Integer => json!({"type": "integer"}),
            Self::Boolean => json!({"type": "boolean"}),
            Self::StringArray => json!({"type": "array", "items": {"type": "string"}}),
            Self::ObjectArray => json!({"type": "array", "items": {"type": "object"}}),
            Self::Object => json!({"type": "object"}),
            Self::DateRange => json!({
                "oneOf": [
                    {"type": "string"},
                    {
                        "type": "object",
                        "properties": {
                            "since": {"type": "string", "description": "YYYY-MM-DD"},
                            "until": {"type": "string", "description": "YYYY-MM-DD"}
                        },
                        "required": ["since", "until"]
                    }
                ]
            }),
        }
    }
}

/// One tool argument.
#[derive(Debug, Clone, Copy)]
pub struct Param {
    /// Argument name.
    pub name: &'static str,
    /// JSON type.
    pub kind: ParamKind,
    /// What the argument does.
    pub description: &'static str,
    /// Whether the argument must be supplied.
    pub required: bool,
}

impl Param {
    const fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            required: true,
        }
    }

    const fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            required: false,
        }
    }
}

/// A tool exposed over MCP.
#[derive(Debug, Clone, Copy)]
pub struct ToolSpec {
    /// Tool name.
    pub name: &'static str,
    /// What the tool does.
    pub description: &'static str,
    /// Graph API endpoint.
    pub endpoint: Endpoint,
    /// Tool-specific arguments.
    pub params: &'static [Param],
}

const PAGE_SIZE: Param = Param::optional("page_size", ParamKind::Integer, "Items per page");
const PAGE_CURSOR: Param = Param::optional(
    "page_cursor",
    ParamKind::String,
    "next_page_cursor from the previous page; repeat the same filter arguments",
);

const FIELDS: Param = Param::optional(
    "fields",
    ParamKind::String,
    "Comma-separated Graph API fields to return",
);
const AD_ACCOUNT_ID: Param = Param::required(
    "ad_account_id",
    ParamKind::String,
    "Ad account id, with or without the act_ prefix",
);
const EFFECTIVE_STATUS: Param = Param::optional(
    "effective_status",
    ParamKind::StringArray,
    "Only return objects with these effective statuses, e.g. [\"ACTIVE\"]",
);
const FILTERING: Param = Param::optional(
    "filtering",
    ParamKind::ObjectArray,
    "Graph API filter objects: {field, operator, value}",
);
const STATUS: Param = Param::optional("status", ParamKind::String, "ACTIVE or PAUSED");
const DAILY_BUDGET: Param = Param::optional(
    "daily_budget",
    ParamKind::Integer,
    "Daily budget in the account currency's minor unit",
);
const LIFETIME_BUDGET: Param = Param::optional(
    "lifetime_budget",
    ParamKind::Integer,
    "Lifetime budget in the account currency's minor unit",
);
const BID_STRATEGY: Param = Param::optional(
    "bid_strategy",
    ParamKind::String,
    "e.g. LOWEST_COST_WITHOUT_CAP",
);

const ACCOUNT_FIELDS: &str =
    "id,name,account_id,account_status,currency,timezone_name,amount_spent,balance,business";
const CAMPAIGN_FIELDS: &str = "id,name,objective,status,effective_status,daily_budget,\
    lifetime_budget,buying_type,start_time,stop_time,created_time,updated_time,bid_strategy";
const ADSET_FIELDS: &str = "id,name,campaign_id,status,effective_status,daily_budget,\
    lifetime_budget,billing_event,optimization_goal,bid_amount,start_time,end_time,targeting";
const AD_FIELDS: &str =
    "id,name,adset_id,campaign_id,status,effective_status,creative,created_time,updated_time";
const CREATIVE_FIELDS: &str =
    "id,name,title,body,image_url,image_hash,thumbnail_url,object_story_spec,call_to_action_type";
const INSIGHT_FIELDS: &str = "account_id,campaign_id,campaign_name,adset_id,adset_name,ad_id,\
    ad_name,impressions,clicks,spend,reach,frequency,cpc,cpm,ctr,actions,date_start,date_stop";

static CATALOGUE: &[ToolSpec] = &[
    ToolSpec {
        name: "list_ad_accounts",
        description: "List ad accounts the authenticated user can access.",
        endpoint: Endpoint::get("me/adaccounts")
            .paginated()
            .with_defaults(&[("fields", ACCOUNT_FIELDS)]),
        params: &[FIELDS],
    },
    ToolSpec {
        name: "read_ad_account",
        description: "Fetch one ad account.",
        endpoint: Endpoint::get("{ad_account_id}").with_defaults(&[("fields", ACCOUNT_FIELDS)]),
        params: &[AD_ACCOUNT_ID, FIELDS],
    },
    ToolSpec {
        name: "list_campaigns",
        description: "List campaigns in an ad account.",
        endpoint: Endpoint::get("{ad_account_id}/campaigns")
            .paginated()
            .with_defaults(&[("fields", CAMPAIGN_FIELDS)]),
        params: &[AD_ACCOUNT_ID, EFFECTIVE_STATUS, FILTERING, FIELDS],
    },
    ToolSpec {
        name: "read_campaign",
        description: "Fetch one campaign.",
        endpoint: Endpoint::get("{campaign_id}").with_defaults(&[("fields", CAMPAIGN_FIELDS)]),
        params: &[
            Param::required("campaign_id", ParamKind::String, "Campaign id"),
            FIELDS,
        ],
    },
    ToolSpec {
        name: "create_campaign",
        description: "Create a campaign. New campaigns are PAUSED unless status is given.",
        endpoint: Endpoint::post("{ad_account_id}/campaigns")
            .with_defaults(&[("status", "PAUSED"), ("special_ad_categories", "[]")]),
        params: &[
            AD_ACCOUNT_ID,
            Param::required("name", ParamKind::String, "Campaign name"),
            Param::required("objective", ParamKind::String, "e.g. OUTCOME_TRAFFIC"),
            STATUS,
            Param::optional(
                "special_ad_categories",
                ParamKind::StringArray,
                "e.g. [\"HOUSING\"]; empty when none apply",
            ),
            DAILY_BUDGET,
            LIFETIME_BUDGET,
            BID_STRATEGY,
        ],
    },
    ToolSpec {
        name: "update_campaign",
        description: "Update a campaign's name, status, budget, or bid strategy.",
        endpoint: Endpoint::post("{campaign_id}"),
        params: &[
            Param::required("campaign_id", ParamKind::String, "Campaign id"),
            Param::optional("name", ParamKind::String, "New name"),
            STATUS,
            DAILY_BUDGET,
            LIFETIME_BUDGET,
            BID_STRATEGY,
        ],
    },
    ToolSpec {
        name: "list_ad_sets",
        description: "List ad sets in an ad account.",
        endpoint: Endpoint::get("{ad_account_id}/adsets")
            .paginated()
            .with_defaults(&[("fields", ADSET_FIELDS)]),
        params: &[AD_ACCOUNT_ID, EFFECTIVE_STATUS, FILTERING, FIELDS],
    },
    ToolSpec {
        name: "read_ad_set",
        description: "Fetch one ad set, including targeting.",
        endpoint: Endpoint::get("{adset_id}").with_defaults(&[("fields", ADSET_FIELDS)]),
        params: &[
            Param::required("ad_set_id", ParamKind::String, "Ad set id"),
            FIELDS,
        ],
    },
    ToolSpec {
        name: "update_ad_set",
        description: "Update an ad set's status, budget, bid, or targeting.",
        endpoint: Endpoint::post("{adset_id}"),
        params: &[
            Param::required("ad_set_id", ParamKind::String, "Ad set id"),
            Param::optional("name", ParamKind::String, "New name"),
            STATUS,
            DAILY_BUDGET,
            LIFETIME_BUDGET,
            Param::optional("bid_amount", ParamKind::Integer, "Bid cap in minor units"),
            Param::optional("targeting", ParamKind::Object, "Full targeting spec"),
        ],
    },
    ToolSpec {
        name: "list_ads",
        description: "List ads in an ad account.",
        endpoint: Endpoint::get("{ad_account_id}/ads")
            .paginated()
            .with_defaults(&[("fields", AD_FIELDS)]),
        params: &[AD_ACCOUNT_ID, EFFECTIVE_STATUS, FILTERING, FIELDS],
    },
    ToolSpec {
        name: "read_ad",
        description: "Fetch one ad.",
        endpoint: Endpoint::get("{ad_id}").with_defaults(&[("fields", AD_FIELDS)]),
        params: &[Param::required("ad_id", ParamKind::String, "Ad id"), FIELDS],
    },
    ToolSpec {
        name: "update_ad",
        description: "Update an ad's name or status.",
        endpoint: Endpoint::post("{ad_id}"),
        params: &[
            Param::required("ad_id", ParamKind::String, "Ad id"),
            Param::optional("name", ParamKind::String, "New name"),
            STATUS,
        ],
    },
    ToolSpec {
        name: "list_ad_creatives",
        description: "List the creatives attached to an ad.",
        endpoint: Endpoint::get("{ad_id}/adcreatives")
            .paginated()
            .with_defaults(&[("fields", CREATIVE_FIELDS)]),
        params: &[Param::required("ad_id", ParamKind::String, "Ad id"), FIELDS],
    },
    ToolSpec {
        name: "list_insights",
        description: "Performance insights for an account, campaign, ad set, or ad. \
            date_range takes a preset (last_7d, last_30d, maximum, ...) or {since, until}.",
        endpoint: Endpoint::get("{object_id}/insights")
            .paginated()
            .with_defaults(&[("fields", INSIGHT_FIELDS)]),
        params: &[
            Param::required(
                "object_id",
                ParamKind::String,
                "Ad account (act_...), campaign, ad set, or ad id",
            ),
            Param::optional("level", ParamKind::String, "account, campaign, adset, or ad"),
            Param::optional("date_range", ParamKind::DateRange, "Preset name or {since, until}"),
            Param::optional(
                "time_increment",
                ParamKind::String,
                "1 for daily rows, monthly, or all_days",
            ),
            Param::optional("breakdowns", ParamKind::StringArray, "e.g. [\"age\", \"gender\"]"),
            Param::optional(
                "action_breakdowns",
                ParamKind::StringArray,
                "e.g. [\"action_type\"]",
            ),
            FILTERING,
            FIELDS,
        ],
    },
    ToolSpec {
        name: "search_interests",
        description: "Search targetable interests by keyword.",
        endpoint: Endpoint::get("search")
            .paginated()
            .with_defaults(&[("type", "adinterest")]),
        params: &[Param::required("q", ParamKind::String, "Search keyword")],
    },
    ToolSpec {
        name: "search_geo_locations",
        description: "Search targetable locations (countries, regions, cities, zips).",
        endpoint: Endpoint::get("search")
            .paginated()
            .with_defaults(&[("type", "adgeolocation")]),
        params: &[
            Param::required("q", ParamKind::String, "Search keyword"),
            Param::optional(
                "location_types",
                ParamKind::StringArray,
                "e.g. [\"country\", \"city\"]",
            ),
        ],
    },
];

/// All tools.
#[must_use]
pub fn catalogue() -> &'static [ToolSpec] {
    CATALOGUE
}

/// Looks up a tool by name.
#[must_use]
pub fn find(name: &str) -> Option<&'static ToolSpec> {
    CATALOGUE.iter().find(|tool| tool.name == name)
}

impl ToolSpec {
    /// Arguments including the pagination pair for list tools.
    pub fn all_params(&self) -> impl Iterator<Item = &Param> {
        let paging: &[Param] = if self.endpoint.paginated {
            &[PAGE_SIZE, PAGE_CURSOR]
        } else {
            &[]
        };
        self.params.iter().chain(paging)
    }

    /// JSON Schema of the arguments.
    #[must_use]
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in self.all_params() {
            let mut schema = param.kind.schema();
            schema["description"] = json!(param.description);
            properties.insert(param.name.to_string(), schema);
            if param.required {
                required.push(param.name);
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// `tools/list` entry.
    #[must_use]
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.to_string(),
            description: self.description.to_string(),
            input_schema: self.input_schema(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{build_request, ToolRequest};
    use std::collections::HashSet;

    #[test]
    fn names_are_unique() {
        let names: HashSet<_> = catalogue().iter().map(|t| t.name).collect();
        assert_eq!(names.len(), catalogue().len());
    }

    #[test]
    fn list_tools_expose_pagination_arguments() {
        let schema = find("list_campaigns").unwrap().input_schema();
        assert!(schema["properties"]["page_cursor"].is_object());
        assert!(schema["properties"]["page_size"].is_object());
        assert_eq!(schema["required"], json!(["ad_account_id"]));

        let read = find("read_campaign").unwrap().input_schema();
        assert!(read["properties"].get("page_cursor").is_none());
    }

    #[test]
    fn only_reads_are_idempotent() {
        for tool in catalogue() {
            let is_read = tool.name.starts_with("list_")
                || tool.name.starts_with("read_")
                || tool.name.starts_with("search_");
            assert_eq!(tool.endpoint.is_idempotent(), is_read, "{}", tool.name);
        }
    }

    #[test]
    fn every_path_placeholder_is_reachable_from_required_arguments() {
        for tool in catalogue() {
            let mut args = Map::new();
            for param in tool.params.iter().filter(|p| p.required) {
                args.insert(param.name.to_string(), json!("1"));
            }
            let request = ToolRequest::new(tool.name, args);
            assert!(
                build_request("https://graph.facebook.com", "v25.0", &tool.endpoint, &request).is_ok(),
                "{}",
                tool.name
            );
        }
    }

    #[test]
    fn date_range_schema_accepts_both_shapes() {
        let schema = find("list_insights").unwrap().input_schema();
        assert_eq!(schema["properties"]["date_range"]["oneOf"].as_array().unwrap().len(), 2);
    }
}
