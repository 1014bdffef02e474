//! Shrink a run: drop configured result parts, collapse redundant
//! properties, deduplicate locations, and move code-flow steps into the
//! run-wide `threadFlowLocations` table.
//!
//! ```
//! use sarifkit::v1::consolidate::{consolidate_run, TrimPolicy};
//! use sarifkit::v1::types::{Location, Region, Run, SarifResult};
//!
//! let step = Location::physical("src/a.c", Region::line(4));
//! let mut run = Run::new("lint")
//!     .with_result(SarifResult::new("R1", "one").with_code_flow(vec![step.clone()]))
//!     .with_result(SarifResult::new("R2", "two").with_code_flow(vec![step]));
//!
//! let stats = consolidate_run(&mut run, &TrimPolicy::default());
//! assert_eq!(stats.total_thread_flow_locations, 2);
//! assert_eq!(stats.unique_thread_flow_locations, 1);
//! assert_eq!(run.thread_flow_locations.unwrap().len(), 1);
//! ```

use std::collections::HashSet;
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

use crate::equality::{Deduplicated, ValueKeyed};
use crate::types::{
    ArtifactLocation, Location, LogicalLocation, Message, PhysicalLocation, Region, Run,
    SarifLog, SarifResult, ThreadFlowLocation,
};

/// Which region representation to keep when a region carries several.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RegionComponents {
    #[default]
    LineAndColumn,
    ByteOffsetAndLength,
    CharOffsetAndLength,
    Full,
}

impl RegionComponents {
    fn keeps_lines(self) -> bool {
        matches!(self, RegionComponents::LineAndColumn | RegionComponents::Full)
    }

    fn keeps_bytes(self) -> bool {
        matches!(
            self,
            RegionComponents::ByteOffsetAndLength | RegionComponents::Full
        )
    }

    fn keeps_chars(self) -> bool {
        matches!(
            self,
            RegionComponents::CharOffsetAndLength | RegionComponents::Full
        )
    }
}

/// What to strip from every result.
///
/// Loadable from JSON, e.g. `{"removeCodeFlows": true, "messageLengthLimit": 200}`;
/// omitted fields take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrimPolicy {
    pub remove_code_flows: bool,
    pub remove_related_locations: bool,
    /// Covers both `graphs` and `graphTraversals`.
    pub remove_graphs: bool,
    pub remove_stacks: bool,
    pub remove_web_requests: bool,
    pub remove_web_responses: bool,
    pub remove_uri_base_ids: bool,
    /// Maximum message length in characters. `0` means no limit.
    pub message_length_limit: Option<usize>,
    pub region_components: RegionComponents,
}

/// Location counters for one consolidation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationStats {
    /// Locations and related locations, plus the logical locations nested in
    /// every trimmed location.
    pub total_locations: usize,
    pub unique_locations: usize,
    pub total_thread_flow_locations: usize,
    pub unique_thread_flow_locations: usize,
}

impl AddAssign for ConsolidationStats {
    fn add_assign(&mut self, other: Self) {
        self.total_locations += other.total_locations;
        self.unique_locations += other.unique_locations;
        self.total_thread_flow_locations += other.total_thread_flow_locations;
        self.unique_thread_flow_locations += other.unique_thread_flow_locations;
    }
}

/// Consolidation state for one run.
///
/// Create it with [`Consolidator::new`], feed it every result of the run with
/// [`Consolidator::trim`], then write the table back with
/// [`Consolidator::finish`].
#[derive(Debug)]
pub struct Consolidator {
    policy: TrimPolicy,
    thread_flow_locations: Deduplicated<ThreadFlowLocation>,
    had_table: bool,
    stats: ConsolidationStats,
}

impl Consolidator {
    /// Prepare `run` and take over its `threadFlowLocations` table.
    ///
    /// Existing table entries are trimmed and seeded into the lookup but
    /// never merged, because results may already point at them.
    pub fn new(run: &mut Run, policy: TrimPolicy) -> Self {
        if policy.remove_uri_base_ids {
            run.original_uri_base_ids = None;
        }

        for artifact in run.artifacts.iter_mut().flatten() {
            if let Some(location) = artifact.location.as_mut() {
                // The table position already is the index.
                location.index = None;
                if policy.remove_uri_base_ids {
                    location.uri_base_id = None;
                }
            }
        }

        let had_table = run.thread_flow_locations.is_some();
        let mut stats = ConsolidationStats::default();
        let mut existing = run.thread_flow_locations.take().unwrap_or_default();
        for entry in &mut existing {
            if let Some(location) = entry.location.as_mut() {
                trim_location(location, &policy, &mut stats);
            }
        }

        Self {
            policy,
            thread_flow_locations: Deduplicated::from_items(existing),
            had_table,
            stats,
        }
    }

    pub fn policy(&self) -> &TrimPolicy {
        &self.policy
    }

    /// Trim one result of the run this consolidator was created for.
    pub fn trim(&mut self, result: &mut SarifResult) {
        let policy = &self.policy;
        if policy.remove_code_flows {
            result.code_flows = None;
        }
        if policy.remove_related_locations {
            result.related_locations = None;
        }
        if policy.remove_graphs {
            result.graphs = None;
            result.graph_traversals = None;
        }
        if policy.remove_stacks {
            result.stacks = None;
        }
        if policy.remove_web_requests {
            result.web_request = None;
        }
        if policy.remove_web_responses {
            result.web_response = None;
        }

        if let Some(limit) = policy.message_length_limit.filter(|&l| l > 0) {
            truncate_message(&mut result.message, limit);
        }

        self.trim_locations(&mut result.locations);
        self.trim_locations(&mut result.related_locations);
        self.consolidate_code_flows(result);
    }

    /// Write the table back into `run` and report the counters.
    pub fn finish(mut self, run: &mut Run) -> ConsolidationStats {
        self.stats.unique_thread_flow_locations = self.thread_flow_locations.len();
        if self.had_table || !self.thread_flow_locations.is_empty() {
            run.thread_flow_locations = Some(self.thread_flow_locations.into_vec());
        }

        tracing::debug!(
            tool = %run.tool.driver.name,
            total_locations = self.stats.total_locations,
            unique_locations = self.stats.unique_locations,
            total_thread_flow_locations = self.stats.total_thread_flow_locations,
            unique_thread_flow_locations = self.stats.unique_thread_flow_locations,
            "consolidated run"
        );
        self.stats
    }

    fn trim_locations(&mut self, locations: &mut Option<Vec<Location>>) {
        let Some(list) = locations.as_mut() else {
            return;
        };
        let total = list.len();
        for location in list.iter_mut() {
            trim_location(location, &self.policy, &mut self.stats);
        }
        let mut seen = HashSet::new();
        list.retain(|location| seen.insert(location.node_key()));

        self.stats.total_locations += total;
        self.stats.unique_locations += list.len();
    }

    fn consolidate_code_flows(&mut self, result: &mut SarifResult) {
        let thread_flows = result
            .code_flows
            .iter_mut()
            .flatten()
            .flat_map(|code_flow| code_flow.thread_flows.iter_mut());

        for thread_flow in thread_flows {
            self.stats.total_thread_flow_locations += thread_flow.locations.len();

            for step in &mut thread_flow.locations {
                if let Some(location) = step.location.as_mut() {
                    trim_location(location, &self.policy, &mut self.stats);
                }
                // Already a reference into the table.
                if step.index.is_some() {
                    continue;
                }
                let (index, _) = self.thread_flow_locations.insert(std::mem::take(step));
                *step = ThreadFlowLocation::indexed(index);
            }
        }
    }
}

/// Consolidate every result of `run`, in order.
pub fn consolidate_run(run: &mut Run, policy: &TrimPolicy) -> ConsolidationStats {
    let mut consolidator = Consolidator::new(run, policy.clone());
    for result in run.results.iter_mut().flatten() {
        consolidator.trim(result);
    }
    consolidator.finish(run)
}

/// Consolidate every run of `log`; the counters are summed.
pub fn consolidate_log(log: &mut SarifLog, policy: &TrimPolicy) -> ConsolidationStats {
    let mut stats = ConsolidationStats::default();
    for run in &mut log.runs {
        stats += consolidate_run(run, policy);
    }
    stats
}

fn truncate_message(message: &mut Message, limit: usize) {
    for text in [message.text.as_mut(), message.markdown.as_mut()]
        .into_iter()
        .flatten()
    {
        let cut = text.char_indices().nth(limit).map(|(at, _)| at);
        if let Some(cut) = cut {
            text.truncate(cut);
        }
    }
}

/// Logical locations nested in `location` count towards the location
/// counters, like the location lists of a result.
fn trim_location(location: &mut Location, policy: &TrimPolicy, stats: &mut ConsolidationStats) {
    location.id = None;
    if let Some(physical) = location.physical_location.as_mut() {
        trim_physical_location(physical, policy);
    }
    if let Some(logical) = location.logical_locations.as_mut() {
        let total = logical.len();
        for entry in logical.iter_mut() {
            trim_logical_location(entry);
        }
        let mut seen = HashSet::new();
        logical.retain(|entry| seen.insert(entry.node_key()));

        stats.total_locations += total;
        stats.unique_locations += logical.len();
    }
}

fn trim_physical_location(physical: &mut PhysicalLocation, policy: &TrimPolicy) {
    if let Some(artifact) = physical.artifact_location.as_mut() {
        trim_artifact_location(artifact);
    }
    for region in [physical.region.as_mut(), physical.context_region.as_mut()]
        .into_iter()
        .flatten()
    {
        trim_region(region, policy.region_components);
    }
}

/// An indexed reference keeps only its index.
fn trim_logical_location(logical: &mut LogicalLocation) {
    if logical.index.is_none() {
        return;
    }
    logical.name = None;
    logical.fully_qualified_name = None;
    logical.decorated_name = None;
    logical.parent_index = None;
    logical.properties = None;
}

/// An indexed reference keeps only its index.
fn trim_artifact_location(artifact: &mut ArtifactLocation) {
    if artifact.index.is_none() {
        return;
    }
    artifact.uri = None;
    artifact.uri_base_id = None;
    artifact.description = None;
    artifact.properties = None;
}

fn trim_region(region: &mut Region, keep: RegionComponents) {
    if has_lines(region) {
        if region.end_line == region.start_line {
            region.end_line = None;
        }
        if region.start_column == Some(1) {
            region.start_column = None;
        }
    }

    // A representation is only dropped when another one remains.
    if !keep.keeps_lines() && (region.char_offset.is_some() || region.byte_offset.is_some()) {
        region.start_line = None;
        region.start_column = None;
        region.end_line = None;
        region.end_column = None;
    }

    if !keep.keeps_bytes() && (region.char_offset.is_some() || has_lines(region)) {
        region.byte_offset = None;
        region.byte_length = None;
    }

    if !keep.keeps_chars() && (region.byte_offset.is_some() || has_lines(region)) {
        region.char_offset = None;
        region.char_length = None;
    }
}

fn has_lines(region: &Region) -> bool {
    region.start_line.is_some_and(|line| line > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CodeFlow, ThreadFlow};
    use serde_json::json;

    fn region(value: serde_json::Value) -> Region {
        serde_json::from_value(value).unwrap()
    }

    fn trimmed(value: serde_json::Value, keep: RegionComponents) -> serde_json::Value {
        let mut r = region(value);
        trim_region(&mut r, keep);
        serde_json::to_value(&r).unwrap()
    }

    #[test]
    fn test_region_normalization() {
        assert_eq!(
            trimmed(
                json!({ "startLine": 5, "endLine": 5, "startColumn": 1 }),
                RegionComponents::LineAndColumn
            ),
            json!({ "startLine": 5 })
        );
    }

    #[test]
    fn test_region_offsets_dropped_when_lines_present() {
        assert_eq!(
            trimmed(
                json!({ "startLine": 5, "endColumn": 9, "byteOffset": 10, "byteLength": 3, "charOffset": 4, "charLength": 2 }),
                RegionComponents::LineAndColumn
            ),
            json!({ "startLine": 5, "endColumn": 9 })
        );
    }

    #[test]
    fn test_region_offsets_kept_without_lines() {
        assert_eq!(
            trimmed(
                json!({ "charOffset": 4, "charLength": 2 }),
                RegionComponents::LineAndColumn
            ),
            json!({ "charOffset": 4, "charLength": 2 })
        );
    }

    #[test]
    fn test_region_keep_bytes() {
        assert_eq!(
            trimmed(
                json!({ "startLine": 5, "endLine": 6, "byteOffset": 10, "byteLength": 3, "charOffset": 4 }),
                RegionComponents::ByteOffsetAndLength
            ),
            json!({ "byteOffset": 10, "byteLength": 3 })
        );
    }

    #[test]
    fn test_region_full_keeps_everything_but_defaults() {
        assert_eq!(
            trimmed(
                json!({ "startLine": 2, "endLine": 2, "startColumn": 1, "byteOffset": 0, "charOffset": 0 }),
                RegionComponents::Full
            ),
            json!({ "startLine": 2, "charOffset": 0, "byteOffset": 0 })
        );
    }

    #[test]
    fn test_duplicate_locations_collapse() {
        let location = Location::physical("a.c", Region::line(3));
        let mut run = Run::new("lint").with_result(
            SarifResult::new("R1", "m")
                .with_location(location.clone())
                .with_location(location),
        );

        let stats = consolidate_run(&mut run, &TrimPolicy::default());
        assert_eq!(run.results()[0].locations.as_ref().unwrap().len(), 1);
        assert_eq!(stats.total_locations, 2);
        assert_eq!(stats.unique_locations, 1);
    }

    #[test]
    fn test_logical_locations_count_towards_stats() {
        let result: SarifResult = serde_json::from_value(json!({
            "message": { "text": "m" },
            "locations": [{
                "logicalLocations": [
                    { "fullyQualifiedName": "ns::f" },
                    { "fullyQualifiedName": "ns::f" },
                    { "fullyQualifiedName": "ns::g" }
                ]
            }]
        }))
        .unwrap();
        let mut run = Run::new("lint").with_result(result);

        let stats = consolidate_run(&mut run, &TrimPolicy::default());
        let location = &run.results()[0].locations.as_ref().unwrap()[0];
        assert_eq!(location.logical_locations.as_ref().unwrap().len(), 2);
        // one location plus three logical entries, two of them unique
        assert_eq!(stats.total_locations, 4);
        assert_eq!(stats.unique_locations, 3);
    }

    #[test]
    fn test_locations_differing_only_by_id_collapse() {
        let mut a = Location::physical("a.c", Region::line(3));
        let mut b = a.clone();
        a.id = Some(0);
        b.id = Some(1);
        let other = Location::physical("b.c", Region::line(1));
        let mut run = Run::new("lint").with_result(
            SarifResult::new("R1", "m")
                .with_location(a)
                .with_location(other)
                .with_location(b),
        );

        consolidate_run(&mut run, &TrimPolicy::default());
        let locations = run.results()[0].locations.as_ref().unwrap();
        assert_eq!(locations.len(), 2);
        assert_eq!(locations[0].id, None);
        let uri = |l: &Location| {
            l.physical_location.as_ref().unwrap().artifact_location.as_ref().unwrap().uri.clone()
        };
        assert_eq!(uri(&locations[0]).as_deref(), Some("a.c"));
        assert_eq!(uri(&locations[1]).as_deref(), Some("b.c"));
    }

    #[test]
    fn test_code_flow_steps_become_stubs() {
        let a = Location::physical("a.c", Region::line(1));
        let b = Location::physical("a.c", Region::line(9));
        let mut run = Run::new("lint")
            .with_result(SarifResult::new("R1", "m").with_code_flow(vec![a.clone(), b.clone()]))
            .with_result(SarifResult::new("R1", "n").with_code_flow(vec![b, a]));

        let stats = consolidate_run(&mut run, &TrimPolicy::default());
        assert_eq!(stats.total_thread_flow_locations, 4);
        assert_eq!(stats.unique_thread_flow_locations, 2);

        let table = run.thread_flow_locations.as_ref().unwrap();
        assert_eq!(table.len(), 2);
        let second: Vec<Option<usize>> = run.results()[1]
            .thread_flow_locations()
            .map(|step| step.index)
            .collect();
        assert_eq!(second, vec![Some(1), Some(0)]);
        for step in run.results()[1].thread_flow_locations() {
            assert_eq!(step, &ThreadFlowLocation::indexed(step.index.unwrap()));
        }
    }

    #[test]
    fn test_trim_twice_is_stable() {
        let a = Location::physical("a.c", Region::lines(1, 1));
        let mut run = Run::new("lint").with_result(
            SarifResult::new("R1", "m")
                .with_location(a.clone())
                .with_code_flow(vec![a.clone(), a]),
        );

        consolidate_run(&mut run, &TrimPolicy::default());
        let once = run.clone();
        consolidate_run(&mut run, &TrimPolicy::default());
        assert_eq!(run, once);
        assert_eq!(run.thread_flow_locations.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_existing_table_entries_reused() {
        let a = Location::physical("a.c", Region::line(1));
        let mut run = Run::new("lint")
            .with_result(SarifResult::new("R1", "m").with_code_flow(vec![a.clone()]));
        run.thread_flow_locations = Some(vec![
            ThreadFlowLocation {
                location: Some(a.clone()),
                ..Default::default()
            },
            ThreadFlowLocation {
                location: Some(a),
                ..Default::default()
            },
        ]);

        consolidate_run(&mut run, &TrimPolicy::default());
        // pre-existing duplicates stay; the new step resolves to the first
        assert_eq!(run.thread_flow_locations.as_ref().unwrap().len(), 2);
        let step = run.results()[0].thread_flow_locations().next().unwrap();
        assert_eq!(step.index, Some(0));
    }

    #[test]
    fn test_indexed_steps_left_alone() {
        let mut result = SarifResult::new("R1", "m");
        result.code_flows = Some(vec![CodeFlow {
            thread_flows: vec![ThreadFlow {
                locations: vec![ThreadFlowLocation::indexed(0)],
                ..Default::default()
            }],
            ..Default::default()
        }]);
        let mut run = Run::new("lint").with_result(result);
        run.thread_flow_locations = Some(vec![ThreadFlowLocation::default()]);

        consolidate_run(&mut run, &TrimPolicy::default());
        assert_eq!(run.thread_flow_locations.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_no_table_created_without_code_flows() {
        let mut run = Run::new("lint").with_result(SarifResult::new("R1", "m"));
        consolidate_run(&mut run, &TrimPolicy::default());
        assert!(run.thread_flow_locations.is_none());
    }

    #[test]
    fn test_removals() {
        let mut result: SarifResult = serde_json::from_value(json!({
            "message": { "text": "m" },
            "codeFlows": [],
            "relatedLocations": [{}],
            "graphs": [{}],
            "graphTraversals": [{}],
            "stacks": [],
            "webRequest": { "method": "GET" },
            "webResponse": { "statusCode": 200 }
        }))
        .unwrap();
        let policy = TrimPolicy {
            remove_code_flows: true,
            remove_related_locations: true,
            remove_graphs: true,
            remove_stacks: true,
            remove_web_requests: true,
            remove_web_responses: true,
            ..Default::default()
        };
        let mut run = Run::new("lint");
        let mut consolidator = Consolidator::new(&mut run, policy);
        consolidator.trim(&mut result);
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({ "message": { "text": "m" } })
        );
    }

    #[test]
    fn test_message_truncated_to_exact_chars() {
        let mut message = Message {
            text: Some("héllo wörld".to_string()),
            markdown: Some("**bold**".to_string()),
            ..Default::default()
        };
        truncate_message(&mut message, 5);
        assert_eq!(message.text.as_deref(), Some("héllo"));
        assert_eq!(message.markdown.as_deref(), Some("**bol"));

        let mut short = Message::text("hi");
        truncate_message(&mut short, 5);
        assert_eq!(short.text.as_deref(), Some("hi"));
    }

    #[test]
    fn test_zero_limit_disables_truncation() {
        let mut run = Run::new("lint").with_result(SarifResult::new("R1", "a long message"));
        let policy = TrimPolicy {
            message_length_limit: Some(0),
            ..Default::default()
        };
        consolidate_run(&mut run, &policy);
        assert_eq!(run.results()[0].message.text.as_deref(), Some("a long message"));
    }

    #[test]
    fn test_indexed_references_collapse_to_index() {
        let mut location: Location = serde_json::from_value(json!({
            "physicalLocation": {
                "artifactLocation": { "uri": "a.c", "uriBaseId": "SRC", "index": 2 }
            },
            "logicalLocations": [
                { "fullyQualifiedName": "ns::f", "index": 1, "parentIndex": 0 },
                { "fullyQualifiedName": "ns::g" }
            ]
        }))
        .unwrap();
        let mut stats = ConsolidationStats::default();
        trim_location(&mut location, &TrimPolicy::default(), &mut stats);
        assert_eq!(stats.total_locations, 2);
        assert_eq!(stats.unique_locations, 2);
        assert_eq!(
            serde_json::to_value(&location).unwrap(),
            json!({
                "physicalLocation": { "artifactLocation": { "index": 2 } },
                "logicalLocations": [ { "index": 1 }, { "fullyQualifiedName": "ns::g" } ]
            })
        );
    }

    #[test]
    fn test_artifact_indices_and_uri_base_ids() {
        let mut run: Run = serde_json::from_value(json!({
            "tool": { "driver": { "name": "lint" } },
            "originalUriBaseIds": { "SRC": { "uri": "file:///src/" } },
            "artifacts": [ { "location": { "uri": "a.c", "uriBaseId": "SRC", "index": 0 } } ]
        }))
        .unwrap();
        let policy = TrimPolicy {
            remove_uri_base_ids: true,
            ..Default::default()
        };
        consolidate_run(&mut run, &policy);
        assert!(run.original_uri_base_ids.is_none());
        let location = run.artifacts.as_ref().unwrap()[0].location.as_ref().unwrap();
        assert_eq!(location, &ArtifactLocation::from_uri("a.c"));
    }

    #[test]
    fn test_policy_from_json() {
        let policy: TrimPolicy = serde_json::from_str(
            r#"{"removeCodeFlows": true, "messageLengthLimit": 80, "regionComponents": "charOffsetAndLength"}"#,
        )
        .unwrap();
        assert!(policy.remove_code_flows);
        assert!(!policy.remove_stacks);
        assert_eq!(policy.message_length_limit, Some(80));
        assert_eq!(policy.region_components, RegionComponents::CharOffsetAndLength);
    }

    #[test]
    fn test_consolidate_log_sums_runs() {
        let location = Location::physical("a.c", Region::line(3));
        let run = Run::new("lint").with_result(
            SarifResult::new("R1", "m")
                .with_location(location.clone())
                .with_location(location),
        );
        let mut log = SarifLog::new().with_run(run.clone()).with_run(run);
        let stats = consolidate_log(&mut log, &TrimPolicy::default());
        assert_eq!(stats.total_locations, 4);
        assert_eq!(stats.unique_locations, 2);
    }
}
