//! Prerelease compatibility: rewrite logs written against historical schema
//! revisions into the current shape.
//!
//! The log is edited as a generic JSON tree (see the `json` module) because an
//! old log usually violates the current model. Patches come in two sets:
//!
//! - **core**: changes from the early prerelease rounds (renamed time
//!   fields, string→object migrations, run identity restructuring);
//! - **late**: the schema rounds from the 2018-10-10 checkpoint onwards (see
//!   [`Round`]), always applied after core because they assume its shape.
//!
//! A log declaring a known prerelease version, or 2.1.0 with a draft
//! `$schema`, gets only the rounds it predates.
//!
//! Every patch is idempotent and reports whether it changed the tree.

use serde_json::{Map, Value, json};

use crate::error::{Error, Result};
use crate::json::{ObjectExt, for_each_object, objects_in};
use crate::late::{self, Round};
use crate::types::{CURRENT_SCHEMA_URI, CURRENT_VERSION, SarifLog};

/// Prerelease versions that need the whole late patch set but not core.
pub const CHECKPOINT_VERSIONS: &[&str] = &[
    "2.0.0-csd.2.beta.2018-10-10",
    "2.0.0-csd.2.beta.2018-10-10.1",
    "2.0.0-csd.2.beta.2018-10-10.2",
];

/// Later prerelease versions, and the round each one starts at.
const PRERELEASE_ROUNDS: &[(&str, Round)] = &[
    ("2.0.0-csd.2.beta.2019-01-09", Round::Tc31),
    ("2.0.0-csd.2.beta.2019-01-24", Round::Tc32),
    ("2.0.0-csd.2.beta.2019-01-24.1", Round::Tc32),
    ("2.0.0-csd.2.beta.2019-02-20", Round::Tc33),
    ("2.0.0-csd.2.beta.2019-04-03", Round::Tc34),
];

/// `$schema` URIs of the 2.1.0 drafts, and the round each one starts at.
const DRAFT_SCHEMA_ROUNDS: &[(&str, Round)] = &[
    ("http://json.schemastore.org/sarif-2.1.0-beta.0", Round::Tc35),
    ("http://json.schemastore.org/sarif-2.1.0-beta.1", Round::Tc35),
    ("http://json.schemastore.org/sarif-2.1.0-beta.2", Round::Rtm0),
    ("http://json.schemastore.org/sarif-2.1.0-rtm.0", Round::Rtm1),
    ("https://schemastore.azurewebsites.net/schemas/json/sarif-2.1.0-rtm.0.json", Round::Rtm1),
    ("http://json.schemastore.org/sarif-2.1.0-rtm.1", Round::Rtm5),
    ("https://schemastore.azurewebsites.net/schemas/json/sarif-2.1.0-rtm.1.json", Round::Rtm5),
    ("http://json.schemastore.org/sarif-2.1.0-rtm.2", Round::Rtm5),
    ("https://schemastore.azurewebsites.net/schemas/json/sarif-2.1.0-rtm.2.json", Round::Rtm5),
    ("http://json.schemastore.org/sarif-2.1.0-rtm.3", Round::Rtm5),
    ("https://schemastore.azurewebsites.net/schemas/json/sarif-2.1.0-rtm.3.json", Round::Rtm5),
    ("http://json.schemastore.org/sarif-2.1.0-rtm.4", Round::Rtm5),
    ("https://schemastore.azurewebsites.net/schemas/json/sarif-2.1.0-rtm.4.json", Round::Rtm5),
];

/// Placeholder text for results that carry no message.
pub const NO_MESSAGE_PROVIDED: &str = "[No message provided].";

/// How a modified log is written back out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Formatting {
    #[default]
    Compact,
    Indented,
}

/// Output of [`upgrade`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upgraded {
    /// The upgraded log text. Identical to the input when `modified` is false.
    pub text: String,
    /// Whether any patch changed the log.
    pub modified: bool,
}

/// Which patches a log needs, decided from its declared `version` and
/// `$schema`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchPlan {
    /// Already current.
    Nothing,
    /// Known prerelease: the late rounds from this one on.
    Late(Round),
    /// Unknown, older, or forced: core set, then every late round.
    Full,
}

impl PatchPlan {
    /// Pick the plan for a declared version and schema.
    ///
    /// Unrecognized versions (including missing ones and anything newer than
    /// current) get the full set rather than an error. A 2.1.0 log is only
    /// patched when its schema names a 2.1.0 draft.
    pub fn for_version(version: Option<&str>, schema: Option<&str>, force_update: bool) -> Self {
        if force_update {
            return PatchPlan::Full;
        }
        match version {
            Some(CURRENT_VERSION) => {
                starting_round(DRAFT_SCHEMA_ROUNDS, schema).map_or(PatchPlan::Nothing, PatchPlan::Late)
            }
            Some(v) if CHECKPOINT_VERSIONS.contains(&v) => PatchPlan::Late(Round::Tc25),
            Some(v) => starting_round(PRERELEASE_ROUNDS, Some(v)).map_or(PatchPlan::Full, PatchPlan::Late),
            None => PatchPlan::Full,
        }
    }
}

fn starting_round(table: &[(&str, Round)], key: Option<&str>) -> Option<Round> {
    let key = key?;
    table
        .iter()
        .find(|(known, _)| *known == key)
        .map(|(_, round)| *round)
}

pub(crate) type Patch = fn(&mut Value) -> bool;

const CORE_PATCHES: &[(&str, Patch)] = &[
    ("version-and-schema", normalize_version_and_schema),
    ("rule-message-id", move_rule_message_ids),
    ("thread-flow-steps", update_thread_flow_steps),
    ("invocations", update_invocations),
    ("original-uri-base-ids", update_original_uri_base_ids),
    ("file-hashes", update_files),
    ("notifications", update_notifications),
    ("version-control", update_version_control_provenance),
    ("run-identity", restructure_run_identity),
];

const VERSION_PATCHES: &[(&str, Patch)] = &[("version-and-schema", normalize_version_and_schema)];

/// Upgrade `text` to the current schema.
///
/// When nothing changes, the input text is returned untouched so callers do
/// not see formatting churn.
///
/// ```
/// use sarifkit::v1::upgrade::{upgrade, Formatting};
///
/// let old = r#"{"version":"2.0.0","runs":[{"tool":{"name":"lint"},"results":[{"ruleId":"R1"}]}]}"#;
/// let upgraded = upgrade(old, false, Formatting::Compact).unwrap();
/// assert!(upgraded.modified);
/// assert!(upgraded.text.contains("[No message provided]."));
///
/// let again = upgrade(&upgraded.text, false, Formatting::Compact).unwrap();
/// assert!(!again.modified);
/// assert_eq!(again.text, upgraded.text);
/// ```
pub fn upgrade(text: &str, force_update: bool, formatting: Formatting) -> Result<Upgraded> {
    let mut root = parse_root(text)?;

    if !upgrade_value(&mut root, force_update) {
        return Ok(Upgraded {
            text: text.to_string(),
            modified: false,
        });
    }

    let text = match formatting {
        Formatting::Compact => serde_json::to_string(&root)?,
        Formatting::Indented => serde_json::to_string_pretty(&root)?,
    };
    Ok(Upgraded {
        text,
        modified: true,
    })
}

/// Upgrade `text` and map the result onto the typed model.
pub fn upgrade_to_log(text: &str, force_update: bool) -> Result<(SarifLog, bool)> {
    let mut root = parse_root(text)?;
    let modified = upgrade_value(&mut root, force_update);
    Ok((serde_json::from_value(root)?, modified))
}

/// Upgrade an already-parsed tree in place. Returns whether it changed.
pub fn upgrade_value(root: &mut Value, force_update: bool) -> bool {
    let declared = |key: &str| root.get(key).and_then(Value::as_str).map(str::to_string);
    let version = declared("version");
    let schema = declared("$schema");
    let plan = PatchPlan::for_version(version.as_deref(), schema.as_deref(), force_update);

    let modified = match plan {
        PatchPlan::Nothing => false,
        PatchPlan::Late(first) => apply_late(first, root),
        PatchPlan::Full => {
            let core = apply("core", CORE_PATCHES, root);
            apply_late(Round::Tc25, root) | core
        }
    };

    tracing::debug!(version = ?version, ?plan, modified, "upgraded log");
    modified
}

fn parse_root(text: &str) -> Result<Value> {
    if text.trim().is_empty() {
        return Err(Error::invalid_argument("text", "log text is empty"));
    }
    let root: Value = serde_json::from_str(text)?;
    if !root.is_object() {
        return Err(Error::invalid_argument(
            "text",
            "log root is not a JSON object",
        ));
    }
    Ok(root)
}

fn apply_late(first: Round, root: &mut Value) -> bool {
    let stamped = apply("late", VERSION_PATCHES, root);
    late::apply_from(first, root) | stamped
}

pub(crate) fn apply(set: &str, patches: &[(&str, Patch)], root: &mut Value) -> bool {
    let mut modified = false;
    for (name, patch) in patches {
        let changed = patch(root);
        if changed {
            tracing::trace!(set, patch = name, "patch applied");
        }
        modified |= changed;
    }
    modified
}

/// JSON scalar as bare text (strings without their quotes).
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// Patches shared by both sets
// ============================================================================

fn normalize_version_and_schema(root: &mut Value) -> bool {
    let mut modified = for_each_object(root, "", &mut |log| {
        log.set_if_different("version", CURRENT_VERSION)
            | log.set_if_different("$schema", CURRENT_SCHEMA_URI)
    });

    modified |= for_each_object(root, "inlineExternalProperties[]", &mut |props| {
        let mut changed = false;
        for (key, value) in [("version", CURRENT_VERSION), ("$schema", CURRENT_SCHEMA_URI)] {
            if props.string(key).is_some_and(|s| !s.is_empty()) {
                changed |= props.set_if_different(key, value);
            }
        }
        changed
    });

    modified
}

// ============================================================================
// Core patches
// ============================================================================

/// `result.ruleMessageId` → `result.message.id`
fn move_rule_message_ids(root: &mut Value) -> bool {
    for_each_object(root, "runs[].results[]", &mut |result| {
        let Some(message_id) = result.shift_remove("ruleMessageId") else {
            return false;
        };
        if message_id.is_null() {
            return true;
        }

        let message = result
            .entry("message")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(text) = message.as_str().map(str::to_string) {
            *message = json!({ "text": text });
        } else if !message.is_object() {
            *message = Value::Object(Map::new());
        }
        if let Some(message) = message.as_object_mut() {
            message.insert("id".to_string(), message_id);
        }
        true
    })
}

/// Thread-flow steps: `timestamp` → `executionTimeUtc`, `step` dropped.
fn update_thread_flow_steps(root: &mut Value) -> bool {
    for_each_object(
        root,
        "runs[].results[].codeFlows[].threadFlows[].locations[]",
        &mut |step| step.rename("timestamp", "executionTimeUtc") | step.remove_present("step"),
    )
}

fn update_invocations(root: &mut Value) -> bool {
    let mut update = |invocation: &mut Map<String, Value>| {
        replace_uri_string_with_location(invocation, "workingDirectory")
            | invocation.rename("startTime", "startTimeUtc")
            | invocation.rename("endTime", "endTimeUtc")
    };
    for_each_object(root, "runs[].invocations[]", &mut update)
        | for_each_object(root, "runs[].conversion.invocation", &mut update)
}

/// `"key": "file:///x"` → `"key": { "uri": "file:///x" }`
fn replace_uri_string_with_location(object: &mut Map<String, Value>, key: &str) -> bool {
    let Some(uri) = object.string(key).map(str::to_string) else {
        return false;
    };
    object.insert(key.to_string(), json!({ "uri": uri }));
    true
}

fn update_original_uri_base_ids(root: &mut Value) -> bool {
    for_each_object(root, "runs[]", &mut |run| {
        let Some(Value::Object(bases)) = run.get_mut("originalUriBaseIds") else {
            return false;
        };
        let mut changed = false;
        for value in bases.values_mut() {
            if let Some(uri) = value.as_str().map(str::to_string) {
                *value = json!({ "uri": uri });
                changed = true;
            }
        }
        changed
    })
}

/// Hash lists become algorithm-keyed maps; `lastModifiedTime` gains `Utc`.
///
/// Applies to the legacy `files` table (object or array form) and to
/// `artifacts`.
fn update_files(root: &mut Value) -> bool {
    let mut modified = for_each_object(root, "runs[]", &mut |run| {
        let Some(Value::Object(files)) = run.get_mut("files") else {
            return false;
        };
        let mut changed = false;
        for file in files.values_mut().filter_map(Value::as_object_mut) {
            changed |= update_file(file);
        }
        changed
    });
    modified |= for_each_object(root, "runs[].files[]", &mut update_file);
    modified |= for_each_object(root, "runs[].artifacts[]", &mut update_file);
    modified
}

fn update_file(file: &mut Map<String, Value>) -> bool {
    let mut changed = file.rename("lastModifiedTime", "lastModifiedTimeUtc");

    if let Some(Value::Array(hashes)) = file.get("hashes") {
        let mut by_algorithm = Map::new();
        for hash in hashes {
            if let Some(algorithm) = hash.get("algorithm").and_then(Value::as_str) {
                let value = hash.get("value").cloned().unwrap_or(Value::Null);
                by_algorithm.insert(algorithm.to_string(), value);
            }
        }
        file.insert("hashes".to_string(), Value::Object(by_algorithm));
        changed = true;
    }

    changed
}

pub(crate) const NOTIFICATION_ARRAYS: &[&str] = &[
    "configurationNotifications",
    "toolNotifications",
    "toolConfigurationNotifications",
    "toolExecutionNotifications",
];

fn update_notifications(root: &mut Value) -> bool {
    let mut update = |invocation: &mut Map<String, Value>| {
        let mut changed = false;
        for key in NOTIFICATION_ARRAYS {
            for notification in objects_in(invocation, key) {
                changed |= update_notification(notification);
            }
        }
        changed
    };
    for_each_object(root, "runs[].invocations[]", &mut update)
        | for_each_object(root, "runs[].conversion.invocation", &mut update)
}

fn update_notification(notification: &mut Map<String, Value>) -> bool {
    let mut changed = notification.rename("time", "timeUtc");
    if let Some(Value::Object(exception)) = notification.get_mut("exception") {
        changed |= update_exception(exception);
    }
    changed
}

/// `exception.message` string → message object, through every
/// `innerExceptions` level.
fn update_exception(exception: &mut Map<String, Value>) -> bool {
    let mut changed = false;
    if let Some(text) = exception.string("message").map(str::to_string) {
        exception.insert("message".to_string(), json!({ "text": text }));
        changed = true;
    }
    for inner in objects_in(exception, "innerExceptions") {
        changed |= update_exception(inner);
    }
    changed
}

fn update_version_control_provenance(root: &mut Value) -> bool {
    for_each_object(root, "runs[].versionControlProvenance[]", &mut |details| {
        details.rename("timestamp", "asOfTimeUtc")
            | details.rename("uri", "repositoryUri")
            | details.rename("tag", "revisionTag")
    })
}

/// Fold the scattered run identity properties into `automationDetails`, and
/// `automationLogicalId` into `runAggregates`.
fn restructure_run_identity(root: &mut Value) -> bool {
    for_each_object(root, "runs[]", &mut |run| {
        let mut changed = false;

        let logical_id = run.shift_remove("logicalId");
        let description = run.shift_remove("description");
        let instance_guid = run.shift_remove("instanceGuid");
        let correlation_guid = run.shift_remove("correlationGuid");

        if logical_id.is_some()
            || description.is_some()
            || instance_guid.is_some()
            || correlation_guid.is_some()
        {
            let mut details = match run.shift_remove("automationDetails") {
                Some(Value::Object(existing)) => existing,
                _ => Map::new(),
            };
            // Only a run identified by a guid can be given an instance id.
            if let (Some(logical_id), Some(guid)) = (&logical_id, &instance_guid) {
                details.insert(
                    "id".to_string(),
                    Value::String(format!("{}/{}", scalar_text(logical_id), scalar_text(guid))),
                );
            }
            if let Some(description) = description {
                details.insert("description".to_string(), description);
            }
            if let Some(guid) = instance_guid {
                details.insert("guid".to_string(), guid);
            }
            if let Some(guid) = correlation_guid {
                details.insert("correlationGuid".to_string(), guid);
            }
            run.insert("automationDetails".to_string(), Value::Object(details));
            changed = true;
        }

        if let Some(aggregate_id) = run.shift_remove("automationLogicalId") {
            let aggregate = json!({ "id": format!("{}/", scalar_text(&aggregate_id)) });
            match run.get_mut("runAggregates") {
                Some(Value::Array(aggregates)) => aggregates.push(aggregate),
                _ => {
                    run.insert("runAggregates".to_string(), json!([aggregate]));
                }
            }
            changed = true;
        }

        changed
    })
}
