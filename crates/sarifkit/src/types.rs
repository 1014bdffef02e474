use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// SARIF version string this crate reads and writes.
pub const CURRENT_VERSION: &str = "2.1.0";

/// Schema URI stamped on every upgraded log.
pub const CURRENT_SCHEMA_URI: &str =
    "https://schemastore.azurewebsites.net/schemas/json/sarif-2.1.0-rtm.5.json";

/// Optional table indices.
///
/// SARIF writes "no index" as `-1` (or omits the property). In memory that is
/// `None`; any negative value read from disk also becomes `None`, and `None`
/// is never written back.
mod sentinel {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<usize>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => s.serialize_u64(*v as u64),
            None => s.serialize_i64(-1),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<usize>, D::Error> {
        let raw = Option::<i64>::deserialize(d)?;
        Ok(raw.and_then(|v| usize::try_from(v).ok()))
    }
}

/// A SARIF log: the root of the document tree.
///
/// Every struct in this module keeps the properties it does not model in an
/// `extra` map, so reading and re-writing a log never loses data.
///
/// # JSON shape
///
/// ```json
/// {
///   "$schema": "https://schemastore.azurewebsites.net/schemas/json/sarif-2.1.0-rtm.5.json",
///   "version": "2.1.0",
///   "runs": [ { "tool": { "driver": { "name": "lint" } }, "results": [ … ] } ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SarifLog {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub runs: Vec<Run>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Run
// ============================================================================

/// One analysis session: its results plus the run-wide tables that results
/// point into by index.
///
/// | table | referenced from |
/// |---|---|
/// | `artifacts` | `artifactLocation.index`, `artifact.parentIndex` |
/// | `logical_locations` | `logicalLocation.index`, `logicalLocation.parentIndex` |
/// | `thread_flow_locations` | `threadFlowLocation.index` |
/// | `tool.driver.rules` | `result.ruleIndex`, `result.rule.index` |
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    #[serde(default)]
    pub tool: Tool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocations: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_uri_base_ids: Option<IndexMap<String, ArtifactLocation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Vec<Artifact>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_locations: Option<Vec<LogicalLocation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_flow_locations: Option<Vec<ThreadFlowLocation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<SarifResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_control_provenance: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automation_details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_aggregates: Option<Vec<Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The analysis tool that produced a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    #[serde(default)]
    pub driver: ToolComponent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<ToolComponent>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Tool driver or extension
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolComponent {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<ReportingDescriptor>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Rule metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportingDescriptor {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A result's pointer to its rule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportingDescriptorReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, with = "sentinel", skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_component: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A described input file or resource, tabled in [`Run::artifacts`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<ArtifactLocation>,
    #[serde(default, with = "sentinel", skip_serializing_if = "Option::is_none")]
    pub parent_index: Option<usize>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Result
// ============================================================================

/// A single finding.
///
/// Parts that this crate only ever keeps or drops wholesale (`graphs`,
/// `webRequest`, `suppressions`, …) stay as raw JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(default, with = "sentinel", skip_serializing_if = "Option::is_none")]
    pub rule_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<ReportingDescriptorReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default)]
    pub message: Message,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_target: Option<ArtifactLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<Location>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_locations: Option<Vec<Location>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_flows: Option<Vec<CodeFlow>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacks: Option<Vec<Stack>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graphs: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_traversals: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_request: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppressions: Option<Vec<Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// User-facing text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Locations
// ============================================================================

/// Where a result (or a step of a code flow) happened.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(default, with = "sentinel", skip_serializing_if = "Option::is_none")]
    pub id: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_location: Option<PhysicalLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_locations: Option<Vec<LogicalLocation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// File + region
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicalLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_location: Option<ArtifactLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_region: Option<Region>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A reference to an artifact, either inline (`uri` + `uriBaseId`), or by
/// `index` into [`Run::artifacts`], or both until consolidation collapses it
/// to the index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri_base_id: Option<String>,
    #[serde(default, with = "sentinel", skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A span inside an artifact, by line/column and/or by offsets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_column: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_column: Option<usize>,
    #[serde(default, with = "sentinel", skip_serializing_if = "Option::is_none")]
    pub char_offset: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub char_length: Option<usize>,
    #[serde(default, with = "sentinel", skip_serializing_if = "Option::is_none")]
    pub byte_offset: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byte_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A namespace, type, or member. Tabled in [`Run::logical_locations`];
/// `parent_index` links form the hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicalLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fully_qualified_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decorated_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, with = "sentinel", skip_serializing_if = "Option::is_none")]
    pub parent_index: Option<usize>,
    #[serde(default, with = "sentinel", skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Code flows and stacks
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeFlow {
    #[serde(default)]
    pub thread_flows: Vec<ThreadFlow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadFlow {
    #[serde(default)]
    pub locations: Vec<ThreadFlowLocation>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One step of an execution trace. Once consolidated, a step is a stub
/// holding only `index` into [`Run::thread_flow_locations`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadFlowLocation {
    #[serde(default, with = "sentinel", skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<Stack>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stack {
    #[serde(default)]
    pub frames: Vec<StackFrame>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Convenience methods
// ============================================================================

impl SarifLog {
    /// An empty log stamped with the current version and schema
    pub fn new() -> Self {
        Self {
            schema: Some(CURRENT_SCHEMA_URI.to_string()),
            version: CURRENT_VERSION.to_string(),
            runs: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Parse a log from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Add a run
    pub fn with_run(mut self, run: Run) -> Self {
        self.runs.push(run);
        self
    }
}

impl Run {
    /// Create a run for the named tool
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool: Tool {
                driver: ToolComponent {
                    name: tool_name.into(),
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Results, or an empty slice
    pub fn results(&self) -> &[SarifResult] {
        self.results.as_deref().unwrap_or(&[])
    }

    /// Rules of the tool driver, or an empty slice
    pub fn rules(&self) -> &[ReportingDescriptor] {
        self.tool.driver.rules.as_deref().unwrap_or(&[])
    }

    /// Append a result
    pub fn with_result(mut self, result: SarifResult) -> Self {
        self.results.get_or_insert_with(Vec::new).push(result);
        self
    }

    /// Append a rule to the driver
    pub fn with_rule(mut self, id: impl Into<String>) -> Self {
        self.tool
            .driver
            .rules
            .get_or_insert_with(Vec::new)
            .push(ReportingDescriptor {
                id: id.into(),
                ..Default::default()
            });
        self
    }

    /// Append an artifact for `uri`, optionally parented
    pub fn with_artifact(mut self, uri: impl Into<String>, parent_index: Option<usize>) -> Self {
        self.artifacts.get_or_insert_with(Vec::new).push(Artifact {
            location: Some(ArtifactLocation::from_uri(uri)),
            parent_index,
            ..Default::default()
        });
        self
    }

    /// Append a logical location, optionally parented
    pub fn with_logical_location(
        mut self,
        fully_qualified_name: impl Into<String>,
        parent_index: Option<usize>,
    ) -> Self {
        self.logical_locations
            .get_or_insert_with(Vec::new)
            .push(LogicalLocation {
                fully_qualified_name: Some(fully_qualified_name.into()),
                parent_index,
                ..Default::default()
            });
        self
    }
}

impl SarifResult {
    /// Create a result for `rule_id` with plain-text message
    pub fn new(rule_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            rule_id: Some(rule_id.into()),
            message: Message::text(text),
            ..Default::default()
        }
    }

    /// Point the result at a rule by index
    pub fn with_rule_index(mut self, index: usize) -> Self {
        self.rule_index = Some(index);
        self
    }

    /// Append a location
    pub fn with_location(mut self, location: Location) -> Self {
        self.locations.get_or_insert_with(Vec::new).push(location);
        self
    }

    /// Append a related location
    pub fn with_related_location(mut self, location: Location) -> Self {
        self.related_locations
            .get_or_insert_with(Vec::new)
            .push(location);
        self
    }

    /// Append a single-threaded code flow visiting `steps` in order
    pub fn with_code_flow(mut self, steps: Vec<Location>) -> Self {
        let thread_flow = ThreadFlow {
            locations: steps
                .into_iter()
                .map(|location| ThreadFlowLocation {
                    location: Some(location),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };
        self.code_flows.get_or_insert_with(Vec::new).push(CodeFlow {
            thread_flows: vec![thread_flow],
            ..Default::default()
        });
        self
    }

    /// Every thread-flow step of every code flow, in document order
    pub fn thread_flow_locations(&self) -> impl Iterator<Item = &ThreadFlowLocation> {
        self.code_flows
            .iter()
            .flatten()
            .flat_map(|cf| cf.thread_flows.iter())
            .flat_map(|tf| tf.locations.iter())
    }
}

impl Message {
    /// Plain-text message
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }
}

impl Location {
    /// A physical location in `uri` spanning `region`
    pub fn physical(uri: impl Into<String>, region: Region) -> Self {
        Self {
            physical_location: Some(PhysicalLocation {
                artifact_location: Some(ArtifactLocation::from_uri(uri)),
                region: Some(region),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// A physical location pointing at `artifacts[index]`
    pub fn in_artifact(index: usize, region: Region) -> Self {
        Self {
            physical_location: Some(PhysicalLocation {
                artifact_location: Some(ArtifactLocation::indexed(index)),
                region: Some(region),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Attach a logical location reference by index
    pub fn with_logical_index(mut self, index: usize) -> Self {
        self.logical_locations
            .get_or_insert_with(Vec::new)
            .push(LogicalLocation {
                index: Some(index),
                ..Default::default()
            });
        self
    }
}

impl ArtifactLocation {
    /// Inline reference by URI
    pub fn from_uri(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            ..Default::default()
        }
    }

    /// Reference by index into [`Run::artifacts`]
    pub fn indexed(index: usize) -> Self {
        Self {
            index: Some(index),
            ..Default::default()
        }
    }
}

impl Region {
    /// Lines `start..=end`
    pub fn lines(start: usize, end: usize) -> Self {
        Self {
            start_line: Some(start),
            end_line: Some(end),
            ..Default::default()
        }
    }

    /// A single line
    pub fn line(line: usize) -> Self {
        Self {
            start_line: Some(line),
            ..Default::default()
        }
    }
}

impl ThreadFlowLocation {
    /// A consolidated step referencing `run.threadFlowLocations[index]`
    pub fn indexed(index: usize) -> Self {
        Self {
            index: Some(index),
            ..Default::default()
        }
    }
}
