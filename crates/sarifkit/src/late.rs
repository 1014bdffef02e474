//! The late patch set: the schema rounds between the 2018-10-10 checkpoint
//! and 2.1.0 rtm.5, oldest first.
//!
//! A log stamped with a known prerelease version, or with a 2.1.0 draft
//! `$schema`, enters at the first round it predates. Everything else runs all
//! of them. Each patch only fires on the legacy shape it rewrites, so a tree
//! that is already current passes through unchanged.

use std::collections::HashMap;

use serde_json::{Map, Value, json};

use crate::equality::NodeKey;
use crate::json::{ObjectExt, for_each_object, objects_in};
use crate::upgrade::{NO_MESSAGE_PROVIDED, NOTIFICATION_ARRAYS, Patch, apply};

/// One round of breaking schema changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Round {
    /// Committee drafts 25 through 30; dictionaries become arrays.
    Tc25,
    Tc31,
    Tc32,
    Tc33,
    Tc34,
    Tc35,
    Rtm0,
    Rtm1,
    Rtm5,
}

impl Round {
    pub const ALL: [Round; 9] = [
        Round::Tc25,
        Round::Tc31,
        Round::Tc32,
        Round::Tc33,
        Round::Tc34,
        Round::Tc35,
        Round::Rtm0,
        Round::Rtm1,
        Round::Rtm5,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Round::Tc25 => "tc25-30",
            Round::Tc31 => "tc31",
            Round::Tc32 => "tc32",
            Round::Tc33 => "tc33",
            Round::Tc34 => "tc34",
            Round::Tc35 => "tc35",
            Round::Rtm0 => "rtm0",
            Round::Rtm1 => "rtm1",
            Round::Rtm5 => "rtm5",
        }
    }

    fn patches(self) -> &'static [(&'static str, Patch)] {
        match self {
            Round::Tc25 => TC25_30,
            Round::Tc31 => TC31,
            Round::Tc32 => TC32,
            Round::Tc33 => TC33,
            Round::Tc34 => TC34,
            Round::Tc35 => TC35,
            Round::Rtm0 => RTM0,
            Round::Rtm1 => RTM1,
            Round::Rtm5 => RTM5,
        }
    }
}

/// Apply `first` and every later round. Returns whether anything changed.
pub(crate) fn apply_from(first: Round, root: &mut Value) -> bool {
    let mut modified = false;
    for round in Round::ALL.into_iter().filter(|round| *round >= first) {
        modified |= apply(round.name(), round.patches(), root);
    }
    modified
}

const TC25_30: &[(&str, Patch)] = &[
    ("architecture", remove_run_architecture),
    ("logical-location-dictionary", logical_locations_to_array),
    ("file-dictionary", files_to_array),
    ("rule-dictionary", rules_to_array),
    ("rule-default-level", remap_open_default_level),
    ("result-message", ensure_result_messages),
    ("tool-file-version", update_legacy_tools),
    ("column-kind", default_column_kind),
];

const TC31: &[(&str, Patch)] = &[
    ("rule-descriptors", move_rule_descriptors),
    ("tool-driver", split_tool_drivers),
    ("markdown-mime-type", rename_rich_text_mime_type),
    ("baseline-state", rename_existing_baseline_state),
    ("result-kind", set_result_kind),
    ("thread-flow-location-kinds", wrap_thread_flow_location_kind),
    ("files-to-artifacts", rename_files_to_artifacts),
    ("file-member-names", rename_file_members),
];

const TC32: &[(&str, Patch)] = &[
    ("descriptor-property-types", update_descriptor_property_types),
    ("tool-notifications", update_tool_notifications),
    ("external-property-files", rename_external_property_file_members),
    ("tool-component-artifact-index", wrap_tool_component_artifact_index),
];

const TC33: &[(&str, Patch)] = &[
    ("external-property-driver", rename_external_property_tool),
    ("external-property-references", rename_external_property_files),
    ("notification-references", update_notification_references),
    ("suppression-states", suppression_states_to_suppressions),
    ("guid-names", rename_instance_guids),
    ("logical-location-objects", gather_logical_location_fields),
    ("tool-language", move_tool_language_to_run),
    ("descriptor-arrays", rename_descriptor_arrays),
    ("stack-frame-addresses", move_stack_frame_addresses),
    ("message-ids", rename_message_ids),
];

const TC34: &[(&str, Patch)] = &[("state-strings", state_strings_to_objects)];

const TC35: &[(&str, Patch)] = &[
    ("tool-component-locations", artifact_indices_to_locations),
    ("default-encoding", rename_default_encoding),
    ("location-ids", hoist_physical_location_ids),
    ("redaction-tokens", wrap_redaction_token),
    ("suppression-kinds", rename_suppression_kinds),
    ("notification-locations", wrap_notification_physical_location),
    ("fix-artifact-changes", rename_fix_changes),
    ("artifact-roles", rename_artifact_roles),
];

const RTM0: &[(&str, Patch)] = &[("execution-successful", set_execution_successful)];

const RTM1: &[(&str, Patch)] = &[("logical-location-array", wrap_logical_locations)];

const RTM5: &[(&str, Patch)] = &[("suppression-status", rename_suppression_state)];

const DEFAULT_LANGUAGE: &str = "en-US";

const TOOL_PATHS: &[&str] = &["runs[].tool", "runs[].conversion.tool"];

const TOOL_COMPONENT_PATHS: &[&str] = &[
    "runs[].tool.driver",
    "runs[].tool.extensions[]",
    "runs[].conversion.tool.driver",
    "runs[].conversion.tool.extensions[]",
];

const DESCRIPTOR_PATHS: &[&str] = &[
    "runs[].tool.driver.ruleDescriptors[]",
    "runs[].tool.driver.notificationDescriptors[]",
    "runs[].tool.extensions[].ruleDescriptors[]",
    "runs[].tool.extensions[].notificationDescriptors[]",
    "runs[].conversion.tool.driver.ruleDescriptors[]",
    "runs[].conversion.tool.driver.notificationDescriptors[]",
    "runs[].conversion.tool.extensions[].ruleDescriptors[]",
    "runs[].conversion.tool.extensions[].notificationDescriptors[]",
];

const INVOCATION_PATHS: &[&str] = &[
    "runs[].invocations[]",
    "runs[].conversion.invocation",
    "inlineExternalProperties[].invocations[]",
    "inlineExternalProperties[].conversion.invocation",
];

const NOTIFICATION_PATHS: &[&str] = &[
    "runs[].invocations[].toolExecutionNotifications[]",
    "runs[].invocations[].toolConfigurationNotifications[]",
    "runs[].conversion.invocation.toolExecutionNotifications[]",
    "runs[].conversion.invocation.toolConfigurationNotifications[]",
];

/// Every place a `location` object can appear under a run.
const LOCATION_PATHS: &[&str] = &[
    "runs[].results[].locations[]",
    "runs[].results[].relatedLocations[]",
    "runs[].results[].stacks[].frames[].location",
    "runs[].results[].codeFlows[].threadFlows[].locations[].location",
    "runs[].results[].codeFlows[].threadFlows[].locations[].stack.frames[].location",
    "runs[].results[].suppressions[].location",
    "runs[].threadFlowLocations[].location",
    "runs[].threadFlowLocations[].stack.frames[].location",
    "runs[].invocations[].toolExecutionNotifications[].locations[]",
    "runs[].invocations[].toolConfigurationNotifications[].locations[]",
    "runs[].conversion.invocation.toolExecutionNotifications[].locations[]",
    "runs[].conversion.invocation.toolConfigurationNotifications[].locations[]",
    "runs[].invocations[].toolExecutionNotifications[].exception.stack.frames[].location",
    "runs[].invocations[].toolExecutionNotifications[].exception.innerExceptions[].stack.frames[].location",
    "runs[].invocations[].toolConfigurationNotifications[].exception.stack.frames[].location",
    "runs[].invocations[].toolConfigurationNotifications[].exception.innerExceptions[].stack.frames[].location",
    "runs[].conversion.invocation.toolExecutionNotifications[].exception.stack.frames[].location",
    "runs[].conversion.invocation.toolExecutionNotifications[].exception.innerExceptions[].stack.frames[].location",
    "runs[].conversion.invocation.toolConfigurationNotifications[].exception.stack.frames[].location",
    "runs[].conversion.invocation.toolConfigurationNotifications[].exception.innerExceptions[].stack.frames[].location",
];

const STACK_FRAME_PATHS: &[&str] = &[
    "runs[].results[].stacks[].frames[]",
    "runs[].results[].codeFlows[].threadFlows[].locations[].stack.frames[]",
    "runs[].invocations[].toolExecutionNotifications[].exception.stack.frames[]",
    "runs[].invocations[].toolExecutionNotifications[].exception.innerExceptions[].stack.frames[]",
    "runs[].invocations[].toolConfigurationNotifications[].exception.stack.frames[]",
    "runs[].invocations[].toolConfigurationNotifications[].exception.innerExceptions[].stack.frames[]",
    "runs[].conversion.invocation.toolExecutionNotifications[].exception.stack.frames[]",
    "runs[].conversion.invocation.toolExecutionNotifications[].exception.innerExceptions[].stack.frames[]",
    "runs[].conversion.invocation.toolConfigurationNotifications[].exception.stack.frames[]",
    "runs[].conversion.invocation.toolConfigurationNotifications[].exception.innerExceptions[].stack.frames[]",
];

const STATE_PATHS: &[&str] = &[
    "runs[].results[].graphTraversals[].edgeTraversals[].finalState",
    "runs[].results[].graphTraversals[].initialState",
    "runs[].results[].graphTraversals[].immutableState",
    "runs[].results[].codeFlows[].threadFlows[].initialState",
    "runs[].results[].codeFlows[].threadFlows[].immutableState",
    "runs[].results[].codeFlows[].threadFlows[].locations[].state",
    "runs[].threadFlowLocations[].state",
    "inlineExternalProperties[].results[].graphTraversals[].edgeTraversals[].finalState",
    "inlineExternalProperties[].results[].graphTraversals[].initialState",
    "inlineExternalProperties[].results[].graphTraversals[].immutableState",
    "inlineExternalProperties[].results[].codeFlows[].threadFlows[].initialState",
    "inlineExternalProperties[].results[].codeFlows[].threadFlows[].immutableState",
    "inlineExternalProperties[].results[].codeFlows[].threadFlows[].locations[].state",
    "inlineExternalProperties[].threadFlowLocations[].state",
];

const ALL_TOOL_COMPONENT_PATHS: &[&str] = &[
    "runs[].tool.driver",
    "runs[].tool.extensions[]",
    "runs[].taxonomies[]",
    "runs[].policies[]",
    "runs[].translations[]",
    "runs[].conversion.tool.driver",
    "runs[].conversion.tool.extensions[]",
    "inlineExternalProperties[].driver",
    "inlineExternalProperties[].extensions[]",
    "inlineExternalProperties[].taxonomies[]",
    "inlineExternalProperties[].policies[]",
    "inlineExternalProperties[].translations[]",
    "inlineExternalProperties[].conversion.tool.driver",
    "inlineExternalProperties[].conversion.tool.extensions[]",
];

fn for_each_at<F>(root: &mut Value, paths: &[&str], action: &mut F) -> bool
where
    F: FnMut(&mut Map<String, Value>) -> bool,
{
    let mut modified = false;
    for path in paths {
        modified |= for_each_object(root, path, action);
    }
    modified
}

/// Rename members anywhere below `object`, leaving property bags alone.
/// A renamed member keeps its position.
fn rename_members(object: &mut Map<String, Value>, renames: &[(&str, &str)]) -> bool {
    let mut changed = false;
    for (key, mut value) in std::mem::take(object) {
        if key != "properties" {
            changed |= rename_members_in(&mut value, renames);
        }
        let key = match renames.iter().find(|(from, _)| *from == key) {
            Some((_, to)) => {
                changed = true;
                (*to).to_string()
            }
            None => key,
        };
        object.insert(key, value);
    }
    changed
}

fn rename_members_in(value: &mut Value, renames: &[(&str, &str)]) -> bool {
    match value {
        Value::Object(object) => rename_members(object, renames),
        Value::Array(items) => {
            let mut changed = false;
            for item in items {
                changed |= rename_members_in(item, renames);
            }
            changed
        }
        _ => false,
    }
}

/// Plain-string values of a map become `{ "text": … }`.
fn to_multiformat_strings(strings: &mut Map<String, Value>) -> bool {
    let mut changed = false;
    for value in strings.values_mut() {
        if let Some(text) = value.as_str().map(str::to_string) {
            *value = json!({ "text": text });
            changed = true;
        }
    }
    changed
}

/// Append `items` to the array at `key`, creating it when absent.
fn extend_array(object: &mut Map<String, Value>, key: &str, items: Vec<Value>) {
    match object.get_mut(key) {
        Some(Value::Array(existing)) => existing.extend(items),
        _ => {
            object.insert(key.to_string(), Value::Array(items));
        }
    }
}

// ============================================================================
// TC25 through TC30
// ============================================================================

fn remove_run_architecture(root: &mut Value) -> bool {
    for_each_object(root, "runs[]", &mut |run| run.remove_present("architecture"))
}

/// A dictionary being flattened into an array. Entries may name a parent by
/// its key; parents are placed before their children.
#[derive(Debug, Default)]
struct Flattened {
    entries: Vec<Value>,
    /// Dictionary key → array position.
    positions: HashMap<String, usize>,
}

/// `runs[].logicalLocations` keyed by fully qualified name → array. Equal
/// entries collapse into one. Locations naming an entry through
/// `fullyQualifiedLogicalName` get its `logicalLocationIndex`.
fn logical_locations_to_array(root: &mut Value) -> bool {
    for_each_object(root, "runs[]", &mut |run| {
        let Some(Value::Object(dictionary)) = run.get_mut("logicalLocations") else {
            return false;
        };
        let mut pending = std::mem::take(dictionary);
        let mut table = Flattened::default();
        let mut by_value = HashMap::new();
        while let Some(key) = pending.keys().next().cloned() {
            place_logical_location(&key, &mut pending, &mut table, &mut by_value);
        }
        run.insert("logicalLocations".to_string(), Value::Array(table.entries));

        let positions = table.positions;
        fill_references(run, "logicalLocations", &mut |_, object| {
            if object.contains_key("logicalLocationIndex") {
                return false;
            }
            let Some(&index) = object
                .string("fullyQualifiedLogicalName")
                .and_then(|name| positions.get(name))
            else {
                return false;
            };
            object.insert("logicalLocationIndex".to_string(), Value::from(index));
            true
        });
        true
    })
}

fn place_logical_location(
    key: &str,
    pending: &mut Map<String, Value>,
    table: &mut Flattened,
    by_value: &mut HashMap<NodeKey, usize>,
) -> Option<usize> {
    if let Some(&index) = table.positions.get(key) {
        return Some(index);
    }
    let Some(Value::Object(mut entry)) = pending.shift_remove(key) else {
        return None;
    };

    if let Some(parent_key) = entry.shift_remove("parentKey") {
        let parent = parent_key
            .as_str()
            .and_then(|parent| place_logical_location(parent, pending, table, by_value));
        if let Some(parent) = parent {
            entry.insert("parentIndex".to_string(), Value::from(parent));
        }
    }
    // The key is the fully qualified name unless the entry carries one.
    if entry.string("fullyQualifiedName").is_none_or(str::is_empty) {
        entry.insert(
            "fullyQualifiedName".to_string(),
            Value::String(key.to_string()),
        );
    }

    let entry = Value::Object(entry);
    let value_key = NodeKey::of(&entry);
    let index = match by_value.get(&value_key) {
        Some(&index) => index,
        None => {
            let index = table.entries.len();
            table.entries.push(entry);
            by_value.insert(value_key, index);
            index
        }
    };
    table.positions.insert(key.to_string(), index);
    Some(index)
}

/// `runs[].files` keyed by `uri` (or `#uriBaseId#uri`) → array. Every entry
/// gets a `fileLocation` with its own index, and file references across the
/// run get the index of the entry they name.
fn files_to_array(root: &mut Value) -> bool {
    for_each_object(root, "runs[]", &mut |run| {
        let Some(Value::Object(dictionary)) = run.get_mut("files") else {
            return false;
        };
        let mut pending = std::mem::take(dictionary);
        let mut table = Flattened::default();
        while let Some(key) = pending.keys().next().cloned() {
            place_file(&key, &mut pending, &mut table);
        }
        run.insert("files".to_string(), Value::Array(table.entries));

        let positions = table.positions;
        fill_references(run, "files", &mut |key, object| {
            if !matches!(key, "fileLocation" | "artifactLocation" | "analysisTarget")
                || object.contains_key("index")
            {
                return false;
            }
            let Some(&index) = file_key(object).and_then(|key| positions.get(&key)) else {
                return false;
            };
            object.insert("index".to_string(), Value::from(index));
            true
        });
        true
    })
}

fn place_file(key: &str, pending: &mut Map<String, Value>, table: &mut Flattened) -> Option<usize> {
    if let Some(&index) = table.positions.get(key) {
        return Some(index);
    }
    let Some(Value::Object(mut file)) = pending.shift_remove(key) else {
        return None;
    };

    if let Some(parent_key) = file.shift_remove("parentKey") {
        let parent = parent_key
            .as_str()
            .and_then(|parent| place_file(parent, pending, table));
        if let Some(parent) = parent {
            file.insert("parentIndex".to_string(), Value::from(parent));
        }
    }

    let index = table.entries.len();
    let (base, uri) = split_file_key(key);
    let mut location = Map::new();
    location.insert("uri".to_string(), Value::String(uri.to_string()));
    if let Some(base) = base {
        location.insert("uriBaseId".to_string(), Value::String(base.to_string()));
    }
    location.insert("index".to_string(), Value::from(index));
    file.insert("fileLocation".to_string(), Value::Object(location));

    table.entries.push(Value::Object(file));
    table.positions.insert(key.to_string(), index);
    Some(index)
}

/// `#SRCROOT#src/a.c` → (`SRCROOT`, `src/a.c`); anything else is a bare uri.
fn split_file_key(key: &str) -> (Option<&str>, &str) {
    key.strip_prefix('#')
        .and_then(|rest| rest.split_once('#'))
        .map_or((None, key), |(base, uri)| (Some(base), uri))
}

/// The dictionary key a file reference would have been filed under.
fn file_key(reference: &Map<String, Value>) -> Option<String> {
    let uri = reference.string("uri")?;
    Some(match reference.string("uriBaseId") {
        Some(base) => format!("#{base}#{uri}"),
        None => uri.to_string(),
    })
}

/// Offer every object below `run` (except the table at `table_key`) to
/// `fill`, along with the member name it is stored under.
fn fill_references<F>(run: &mut Map<String, Value>, table_key: &str, fill: &mut F) -> bool
where
    F: FnMut(&str, &mut Map<String, Value>) -> bool,
{
    let mut changed = false;
    for (key, child) in run.iter_mut() {
        if key != table_key {
            changed |= fill_below(key, child, fill);
        }
    }
    changed
}

fn fill_below<F>(key: &str, value: &mut Value, fill: &mut F) -> bool
where
    F: FnMut(&str, &mut Map<String, Value>) -> bool,
{
    match value {
        Value::Object(object) => {
            let mut changed = fill(key, object);
            for (child_key, child) in object.iter_mut() {
                changed |= fill_below(child_key, child, fill);
            }
            changed
        }
        Value::Array(items) => {
            let mut changed = false;
            for item in items {
                changed |= fill_below(key, item, fill);
            }
            changed
        }
        _ => false,
    }
}

/// `runs[].resources.rules` keyed by rule key → array. Rules without an `id`
/// take their key. Results naming a rule by key get its `ruleIndex` and its
/// real `ruleId`.
fn rules_to_array(root: &mut Value) -> bool {
    for_each_object(root, "runs[]", &mut |run| {
        let Some(Value::Object(dictionary)) = run
            .get_mut("resources")
            .and_then(|resources| resources.get_mut("rules"))
        else {
            return false;
        };

        let dictionary = std::mem::take(dictionary);
        let mut positions = HashMap::with_capacity(dictionary.len());
        let mut ids = Vec::with_capacity(dictionary.len());
        let mut rules = Vec::with_capacity(dictionary.len());
        for (key, mut rule) in dictionary {
            if let Some(object) = rule.as_object_mut()
                && !object.contains_key("id")
            {
                object.insert("id".to_string(), Value::String(key.clone()));
            }
            ids.push(rule.get("id").and_then(Value::as_str).map(str::to_string));
            positions.insert(key, rules.len());
            rules.push(rule);
        }
        if let Some(resources) = run.get_mut("resources").and_then(Value::as_object_mut) {
            resources.insert("rules".to_string(), Value::Array(rules));
        }

        for result in objects_in(run, "results") {
            let Some(&index) = result.string("ruleId").and_then(|key| positions.get(key)) else {
                continue;
            };
            if result
                .get("ruleIndex")
                .and_then(Value::as_i64)
                .is_some_and(|existing| existing >= 0)
            {
                continue;
            }
            result.insert("ruleIndex".to_string(), Value::from(index));
            if let Some(Some(id)) = ids.get(index) {
                result.set_if_different("ruleId", id);
            }
        }
        true
    })
}

fn remap_open_default_level(root: &mut Value) -> bool {
    for_each_object(
        root,
        "runs[].resources.rules[].configuration",
        &mut |configuration| {
            if configuration.string("defaultLevel") != Some("open") {
                return false;
            }
            configuration.insert("defaultLevel".to_string(), json!("note"));
            true
        },
    )
}

fn ensure_result_messages(root: &mut Value) -> bool {
    for_each_object(root, "runs[].results[]", &mut |result| {
        match result.get("message") {
            Some(message) if !message.is_null() => false,
            _ => {
                result.insert("message".to_string(), json!({ "text": NO_MESSAGE_PROVIDED }));
                true
            }
        }
    })
}

/// `fileVersion` → `dottedQuadFileVersion`. A tool not yet split into a
/// driver also gets the default `language`.
fn update_legacy_tools(root: &mut Value) -> bool {
    for_each_at(root, TOOL_PATHS, &mut |tool| {
        let mut changed = tool.rename("fileVersion", "dottedQuadFileVersion");
        if !tool.contains_key("driver") && !tool.contains_key("language") {
            tool.insert("language".to_string(), json!(DEFAULT_LANGUAGE));
            changed = true;
        }
        changed
    })
}

/// Columns used to be counted in UTF-16 code units; the new default differs.
fn default_column_kind(root: &mut Value) -> bool {
    for_each_object(root, "runs[]", &mut |run| {
        if run.contains_key("columnKind") {
            return false;
        }
        run.insert("columnKind".to_string(), json!("utf16CodeUnits"));
        true
    })
}

// ============================================================================
// TC31
// ============================================================================

/// `run.resources` dissolves into the tool: `messageStrings` →
/// `globalMessageStrings`, `rules` → `ruleDescriptors` with renamed
/// configuration members.
fn move_rule_descriptors(root: &mut Value) -> bool {
    for_each_object(root, "runs[]", &mut |run| {
        if !run.get("resources").is_some_and(Value::is_object) {
            return false;
        }
        let Some(Value::Object(mut resources)) = run.shift_remove("resources") else {
            return false;
        };
        let tool = run
            .entry("tool")
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(tool) = tool.as_object_mut() else {
            return true;
        };

        if let Some(Value::Object(mut strings)) = resources.shift_remove("messageStrings") {
            to_multiformat_strings(&mut strings);
            tool.insert("globalMessageStrings".to_string(), Value::Object(strings));
        }
        if let Some(Value::Array(mut rules)) = resources.shift_remove("rules") {
            for rule in rules.iter_mut().filter_map(Value::as_object_mut) {
                rule.rename("configuration", "defaultConfiguration");
                if let Some(Value::Object(configuration)) = rule.get_mut("defaultConfiguration") {
                    configuration.rename("defaultLevel", "level");
                    configuration.rename("defaultRank", "rank");
                }
            }
            tool.insert("ruleDescriptors".to_string(), Value::Array(rules));
        }
        true
    })
}

fn split_tool_drivers(root: &mut Value) -> bool {
    for_each_at(root, TOOL_PATHS, &mut split_tool)
}

/// The tool's own members move into `tool.driver`; only `language` stays.
fn split_tool(tool: &mut Map<String, Value>) -> bool {
    if tool.contains_key("driver") {
        return false;
    }
    let mut driver = std::mem::take(tool);
    driver.remove_present("sarifLoggerVersion");
    let language = driver
        .shift_remove("language")
        .unwrap_or_else(|| json!(DEFAULT_LANGUAGE));
    merge_rich_message_strings(&mut driver);

    tool.insert("language".to_string(), language);
    tool.insert("driver".to_string(), Value::Object(driver));
    true
}

/// `richMessageStrings` folds into `messageStrings` as markdown.
fn merge_rich_message_strings(component: &mut Map<String, Value>) {
    for descriptor in objects_in(component, "ruleDescriptors") {
        let rich = match descriptor.shift_remove("richMessageStrings") {
            Some(Value::Object(rich)) => rich,
            _ => Map::new(),
        };
        let Some(Value::Object(strings)) = descriptor.get_mut("messageStrings") else {
            continue;
        };
        for (name, value) in strings.iter_mut() {
            let Some(text) = value.as_str().map(str::to_string) else {
                continue;
            };
            let mut multiformat = Map::new();
            multiformat.insert("text".to_string(), Value::String(text));
            if let Some(markdown) = rich.get(name).and_then(Value::as_str) {
                multiformat.insert("markdown".to_string(), Value::String(markdown.to_string()));
            }
            *value = Value::Object(multiformat);
        }
    }
}

fn rename_rich_text_mime_type(root: &mut Value) -> bool {
    for_each_object(root, "runs[]", &mut |run| {
        run.rename("richTextMimeType", "markdownMessageMimeType")
    })
}

fn rename_existing_baseline_state(root: &mut Value) -> bool {
    for_each_object(root, "runs[].results[]", &mut |result| {
        if result.string("baselineState") != Some("existing") {
            return false;
        }
        result.insert("baselineState".to_string(), json!("unchanged"));
        true
    })
}

/// Non-failure levels move to `kind`; failures are marked `fail`.
fn set_result_kind(root: &mut Value) -> bool {
    for_each_object(root, "runs[].results[]", &mut |result| {
        let Some(level) = result.string("level").map(str::to_string) else {
            return false;
        };
        match level.as_str() {
            "open" | "notApplicable" | "pass" => {
                result.insert("kind".to_string(), Value::String(level));
                result.insert("level".to_string(), json!("none"));
                true
            }
            "error" | "warning" | "note" if !result.contains_key("kind") => {
                result.insert("kind".to_string(), json!("fail"));
                true
            }
            _ => false,
        }
    })
}

fn wrap_thread_flow_location_kind(root: &mut Value) -> bool {
    for_each_object(
        root,
        "runs[].results[].codeFlows[].threadFlows[].locations[]",
        &mut |step| {
            if step.contains_key("kinds") {
                return false;
            }
            let Some(kind) = step.shift_remove("kind") else {
                return false;
            };
            step.insert("kinds".to_string(), Value::Array(vec![kind]));
            true
        },
    )
}

fn rename_files_to_artifacts(root: &mut Value) -> bool {
    for_each_object(root, "runs[]", &mut |run| {
        let Some(Value::Array(files)) = run.get_mut("files") else {
            return false;
        };
        for file in files.iter_mut().filter_map(Value::as_object_mut) {
            file.rename("fileLocation", "location");
        }
        run.rename("files", "artifacts")
    })
}

const FILE_MEMBER_RENAMES: &[(&str, &str)] = &[
    ("richText", "markdown"),
    ("fileChange", "artifactChange"),
    ("fileLocation", "artifactLocation"),
    ("fileIndex", "artifactIndex"),
    ("fileChanges", "changes"),
];

fn rename_file_members(root: &mut Value) -> bool {
    for_each_object(root, "runs[]", &mut |run| {
        rename_members(run, FILE_MEMBER_RENAMES)
    })
}

// ============================================================================
// TC32
// ============================================================================

/// Descriptor `name` is a plain string; descriptions lose the message-only
/// members.
fn update_descriptor_property_types(root: &mut Value) -> bool {
    for_each_at(root, DESCRIPTOR_PATHS, &mut |descriptor| {
        let mut changed = false;
        if let Some(text) = descriptor
            .get("name")
            .and_then(|name| name.get("text"))
            .cloned()
        {
            descriptor.insert("name".to_string(), text);
            changed = true;
        }
        for key in ["shortDescription", "fullDescription"] {
            if let Some(Value::Object(description)) = descriptor.get_mut(key) {
                changed |= description.remove_present("messageId")
                    | description.remove_present("arguments");
            }
        }
        changed
    })
}

/// Exception messages go back to plain strings, and the notification arrays
/// take their `tool*Notifications` names.
fn update_tool_notifications(root: &mut Value) -> bool {
    for_each_at(root, INVOCATION_PATHS, &mut |invocation| {
        let mut changed = false;
        for key in NOTIFICATION_ARRAYS {
            for notification in objects_in(invocation, key) {
                if let Some(Value::Object(exception)) = notification.get_mut("exception") {
                    changed |= exception_message_to_string(exception);
                }
            }
        }
        changed
            | invocation.rename("toolNotifications", "toolExecutionNotifications")
            | invocation.rename("configurationNotifications", "toolConfigurationNotifications")
    })
}

fn exception_message_to_string(exception: &mut Map<String, Value>) -> bool {
    let mut changed = false;
    if let Some(text) = exception
        .get("message")
        .and_then(|message| message.get("text"))
        .cloned()
    {
        exception.insert("message".to_string(), text);
        changed = true;
    }
    for inner in objects_in(exception, "innerExceptions") {
        changed |= exception_message_to_string(inner);
    }
    changed
}

fn rename_external_property_file_members(root: &mut Value) -> bool {
    for_each_object(root, "runs[].externalPropertyFiles", &mut |files| {
        rename_members(files, &[("instanceGuid", "guid"), ("artifactLocation", "location")])
    })
}

fn wrap_tool_component_artifact_index(root: &mut Value) -> bool {
    for_each_at(root, TOOL_COMPONENT_PATHS, &mut |component| {
        if component.contains_key("artifactIndices") {
            return false;
        }
        let Some(index) = component.shift_remove("artifactIndex") else {
            return false;
        };
        component.insert("artifactIndices".to_string(), Value::Array(vec![index]));
        true
    })
}

// ============================================================================
// TC33
// ============================================================================

fn rename_external_property_tool(root: &mut Value) -> bool {
    for_each_object(root, "runs[].externalPropertyFiles", &mut |files| {
        files.rename("tool", "driver")
    })
}

fn rename_external_property_files(root: &mut Value) -> bool {
    for_each_object(root, "runs[]", &mut |run| {
        run.get("externalPropertyFiles").is_some_and(Value::is_object)
            && run.rename("externalPropertyFiles", "externalPropertyFileReferences")
    })
}

/// `id` → `descriptor.id`; `ruleId`/`ruleIndex` → `associatedRule`.
fn update_notification_references(root: &mut Value) -> bool {
    for_each_at(root, NOTIFICATION_PATHS, &mut |notification| {
        let mut changed = false;
        if let Some(id) = notification.shift_remove("id") {
            notification.insert("descriptor".to_string(), json!({ "id": id }));
            changed = true;
        }
        let mut rule = Map::new();
        if let Some(id) = notification.shift_remove("ruleId") {
            rule.insert("id".to_string(), id);
        }
        if let Some(index) = notification.shift_remove("ruleIndex") {
            rule.insert("index".to_string(), index);
        }
        if !rule.is_empty() {
            notification.insert("associatedRule".to_string(), Value::Object(rule));
            changed = true;
        }
        changed
    })
}

fn suppression_states_to_suppressions(root: &mut Value) -> bool {
    for_each_object(root, "runs[].results[]", &mut |result| {
        let Some(states) = result.shift_remove("suppressionStates") else {
            return false;
        };
        let suppressions: Vec<Value> = states
            .as_array()
            .into_iter()
            .flatten()
            .cloned()
            .map(|state| json!({ "kind": state }))
            .collect();
        if !suppressions.is_empty() {
            extend_array(result, "suppressions", suppressions);
        }
        true
    })
}

fn rename_instance_fields(node: &mut Map<String, Value>) -> bool {
    node.rename("instanceGuid", "guid") | node.rename("instanceId", "id")
}

/// `instanceGuid`/`instanceId` drop their prefix; `run.id` becomes
/// `automationDetails` and `run.aggregateIds` joins `runAggregates`.
fn rename_instance_guids(root: &mut Value) -> bool {
    let mut modified = for_each_object(root, "runs[]", &mut |run| {
        let mut changed = run.rename("baselineInstanceGuid", "baselineGuid");

        if run.get("id").is_some_and(Value::is_object)
            && !run.contains_key("automationDetails")
            && let Some(Value::Object(mut id)) = run.shift_remove("id")
        {
            rename_instance_fields(&mut id);
            run.insert("automationDetails".to_string(), Value::Object(id));
            changed = true;
        }

        if run.get("aggregateIds").is_some_and(Value::is_array)
            && let Some(Value::Array(mut aggregates)) = run.shift_remove("aggregateIds")
        {
            for aggregate in aggregates.iter_mut().filter_map(Value::as_object_mut) {
                rename_instance_fields(aggregate);
            }
            extend_array(run, "runAggregates", aggregates);
            changed = true;
        }
        changed
    });

    modified |= for_each_object(root, "runs[].results[]", &mut |result| {
        let mut changed = result.rename("instanceGuid", "guid");
        for key in ["resultProvenance", "provenance"] {
            if let Some(Value::Object(provenance)) = result.get_mut(key) {
                changed |= provenance.rename("firstDetectionRunInstanceGuid", "firstDetectionRunGuid")
                    | provenance.rename("lastDetectionRunInstanceGuid", "lastDetectionRunGuid");
            }
        }
        changed
    });
    modified
}

/// `fullyQualifiedLogicalName` and `logicalLocationIndex` on a location
/// become one `logicalLocation` object.
fn gather_logical_location_fields(root: &mut Value) -> bool {
    for_each_at(root, LOCATION_PATHS, &mut |location| {
        let mut logical = Map::new();
        if let Some(name) = location.shift_remove("fullyQualifiedLogicalName") {
            logical.insert("fullyQualifiedName".to_string(), name);
        }
        if let Some(index) = location.shift_remove("logicalLocationIndex") {
            logical.insert("index".to_string(), index);
        }
        if logical.is_empty() {
            return false;
        }
        location.insert("logicalLocation".to_string(), Value::Object(logical));
        true
    })
}

fn move_tool_language_to_run(root: &mut Value) -> bool {
    for_each_object(root, "runs[]", &mut |run| {
        let Some(language) = run
            .get_mut("tool")
            .and_then(Value::as_object_mut)
            .and_then(|tool| tool.shift_remove("language"))
        else {
            return false;
        };
        if !run.contains_key("language") {
            run.insert("language".to_string(), language);
        }
        true
    })
}

fn rename_descriptor_arrays(root: &mut Value) -> bool {
    for_each_at(root, TOOL_COMPONENT_PATHS, &mut |component| {
        component.rename("ruleDescriptors", "rules")
            | component.rename("notificationDescriptors", "notifications")
    })
}

/// Frame `address`/`offset` → `location.physicalLocation.address`.
fn move_stack_frame_addresses(root: &mut Value) -> bool {
    for_each_at(root, STACK_FRAME_PATHS, &mut |frame| {
        let mut address = Map::new();
        if let Some(base) = frame.shift_remove("address") {
            address.insert("baseAddress".to_string(), base);
        }
        if let Some(offset) = frame.shift_remove("offset") {
            address.insert("offset".to_string(), offset);
        }
        if address.is_empty() {
            return false;
        }
        let Some(physical) =
            object_at(frame, "location").and_then(|location| object_at(location, "physicalLocation"))
        else {
            return false;
        };
        physical.insert("address".to_string(), Value::Object(address));
        true
    })
}

/// The object at `key`, created when absent or not an object.
fn object_at<'a>(object: &'a mut Map<String, Value>, key: &str) -> Option<&'a mut Map<String, Value>> {
    let value = object
        .entry(key)
        .or_insert_with(|| Value::Object(Map::new()));
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    value.as_object_mut()
}

fn rename_message_ids(root: &mut Value) -> bool {
    for_each_object(root, "runs[]", &mut |run| {
        rename_members(run, &[("messageId", "id")])
    })
}

// ============================================================================
// TC34
// ============================================================================

fn state_strings_to_objects(root: &mut Value) -> bool {
    for_each_at(root, STATE_PATHS, &mut to_multiformat_strings)
}

// ============================================================================
// TC35
// ============================================================================

/// `artifactIndices: [n]` → `locations: [{ "index": n }]`.
fn artifact_indices_to_locations(root: &mut Value) -> bool {
    for_each_at(root, ALL_TOOL_COMPONENT_PATHS, &mut |component| {
        let Some(Value::Array(indices)) = component.get("artifactIndices") else {
            return false;
        };
        let locations: Vec<Value> = indices
            .iter()
            .map(|index| json!({ "index": index }))
            .collect();
        component.shift_remove("artifactIndices");
        extend_array(component, "locations", locations);
        true
    })
}

fn rename_default_encoding(root: &mut Value) -> bool {
    for_each_object(root, "runs[]", &mut |run| {
        run.rename("defaultFileEncoding", "defaultEncoding")
    })
}

fn hoist_physical_location_ids(root: &mut Value) -> bool {
    let paths = ["runs[].results[].locations[]", "runs[].results[].relatedLocations[]"];
    for_each_at(root, &paths, &mut |location| {
        let Some(id) = location
            .get_mut("physicalLocation")
            .and_then(Value::as_object_mut)
            .and_then(|physical| physical.shift_remove("id"))
        else {
            return false;
        };
        location.insert("id".to_string(), id);
        true
    })
}

fn wrap_redaction_token(root: &mut Value) -> bool {
    for_each_object(root, "runs[]", &mut |run| {
        let Some(token) = run.shift_remove("redactionToken") else {
            return false;
        };
        extend_array(run, "redactionTokens", vec![token]);
        true
    })
}

fn rename_suppression_kinds(root: &mut Value) -> bool {
    for_each_object(root, "runs[].results[].suppressions[]", &mut |suppression| {
        let renamed = match suppression.string("kind") {
            Some("suppressedInSource") => "inSource",
            Some("suppressedExternally") => "external",
            _ => return false,
        };
        suppression.insert("kind".to_string(), json!(renamed));
        true
    })
}

fn wrap_notification_physical_location(root: &mut Value) -> bool {
    for_each_at(root, NOTIFICATION_PATHS, &mut |notification| {
        let Some(physical) = notification.shift_remove("physicalLocation") else {
            return false;
        };
        extend_array(
            notification,
            "locations",
            vec![json!({ "physicalLocation": physical })],
        );
        true
    })
}

fn rename_fix_changes(root: &mut Value) -> bool {
    let paths = ["runs[].results[].fixes[]", "inlineExternalProperties[].results[].fixes[]"];
    for_each_at(root, &paths, &mut |fix| fix.rename("changes", "artifactChanges"))
}

/// `modifiedFile` → `modified` and friends; `traceFile` → `tracedFile`.
fn rename_artifact_roles(root: &mut Value) -> bool {
    let paths = ["runs[].artifacts[]", "inlineExternalProperties[].artifacts[]"];
    for_each_at(root, &paths, &mut |artifact| {
        let Some(Value::Array(roles)) = artifact.get_mut("roles") else {
            return false;
        };
        let mut changed = false;
        for role in roles.iter_mut() {
            let renamed = match role.as_str() {
                Some("traceFile") => Some("tracedFile".to_string()),
                Some(
                    name @ ("unmodifiedFile" | "modifiedFile" | "addedFile" | "deletedFile"
                    | "renamedFile" | "uncontrolledFile"),
                ) => name.strip_suffix("File").map(str::to_string),
                _ => None,
            };
            if let Some(renamed) = renamed {
                *role = Value::String(renamed);
                changed = true;
            }
        }
        changed
    })
}

// ============================================================================
// 2.1.0 release candidates
// ============================================================================

/// `toolExecutionSuccessful` → `executionSuccessful`; when neither is
/// present it is derived from `exitCode`.
fn set_execution_successful(root: &mut Value) -> bool {
    for_each_at(root, INVOCATION_PATHS, &mut |invocation| {
        if let Some(successful) = invocation.shift_remove("toolExecutionSuccessful") {
            invocation.insert("executionSuccessful".to_string(), successful);
            return true;
        }
        if invocation.contains_key("executionSuccessful") {
            return false;
        }
        let failed = invocation
            .get("exitCode")
            .and_then(Value::as_i64)
            .is_some_and(|code| code != 0);
        invocation.insert("executionSuccessful".to_string(), Value::Bool(!failed));
        true
    })
}

/// Singular `logicalLocation` → one-element `logicalLocations`.
fn wrap_logical_locations(root: &mut Value) -> bool {
    for_each_at(root, LOCATION_PATHS, &mut |location| {
        let Some(logical) = location.shift_remove("logicalLocation") else {
            return false;
        };
        extend_array(location, "logicalLocations", vec![logical]);
        true
    })
}

fn rename_suppression_state(root: &mut Value) -> bool {
    for_each_object(root, "runs[].results[].suppressions[]", &mut |suppression| {
        suppression.rename("state", "status")
    })
}
