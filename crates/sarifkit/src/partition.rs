//! Split or subset a log by its results.
//!
//! Every output run carries its own compacted copy of the run tables
//! (`artifacts`, `logicalLocations`, `threadFlowLocations` and the driver's
//! `rules`) holding exactly what its results reach, parents included, with
//! every reference renumbered to match.
//!
//! ```
//! use sarifkit::v1::partition::partition;
//! use sarifkit::v1::types::{Location, Region, Run, SarifLog, SarifResult};
//!
//! let log = SarifLog::new().with_run(
//!     Run::new("lint")
//!         .with_artifact("a.c", None)
//!         .with_artifact("b.c", None)
//!         .with_result(SarifResult::new("R1", "one").with_location(Location::in_artifact(1, Region::line(2))))
//!         .with_result(SarifResult::new("R2", "two").with_location(Location::in_artifact(0, Region::line(7)))),
//! );
//!
//! let by_rule = partition(&log, |result| result.rule_id.clone());
//! assert_eq!(by_rule.len(), 2);
//!
//! let r1 = &by_rule["R1"].runs[0];
//! assert_eq!(r1.artifacts.as_ref().unwrap().len(), 1);
//! let location = &r1.results()[0].locations.as_ref().unwrap()[0];
//! let reference = location.physical_location.as_ref().unwrap().artifact_location.as_ref().unwrap();
//! assert_eq!(reference.index, Some(0));
//! ```

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

use indexmap::IndexMap;

use crate::query;
use crate::refs::{self, IndexVisitor};
use crate::types::{Run, SarifLog, SarifResult, Tool, ToolComponent};

/// A log holding only the results `predicate` accepts.
///
/// Runs whose results all pass are copied unchanged; the others are
/// compacted. Runs that end up empty are kept, with no results.
pub fn filter<P>(log: &SarifLog, mut predicate: P) -> SarifLog
where
    P: FnMut(&SarifResult) -> bool,
{
    let mut filtered = empty_like(log);

    for run in &log.runs {
        let kept: Vec<SarifResult> = run
            .results()
            .iter()
            .filter(|result| predicate(result))
            .cloned()
            .collect();

        if kept.len() == run.results().len() {
            filtered.runs.push(run.clone());
        } else {
            filtered.runs.push(compact_run(run, kept));
        }
    }

    filtered
}

/// Group results by `key_fn`, cloning what each partition needs.
///
/// `None` discards a result. Partitions are ordered by first appearance of
/// their key, and a partition only holds runs that contributed results to it.
/// The source log is left untouched and every partition is independent.
pub fn partition<K, F>(log: &SarifLog, mut key_fn: F) -> IndexMap<K, SarifLog>
where
    K: Eq + Hash + Clone,
    F: FnMut(&SarifResult) -> Option<K>,
{
    let mut partitions = IndexMap::new();

    for run in &log.runs {
        let mut groups: IndexMap<K, Vec<SarifResult>> = IndexMap::new();
        for result in run.results() {
            if let Some(key) = key_fn(result) {
                groups.entry(key).or_default().push(result.clone());
            }
        }
        add_groups(&mut partitions, log, run, groups);
    }

    partitions
}

/// [`partition`] for a log the caller no longer needs: results are moved
/// into their partitions instead of cloned.
pub fn partition_owned<K, F>(mut log: SarifLog, mut key_fn: F) -> IndexMap<K, SarifLog>
where
    K: Eq + Hash + Clone,
    F: FnMut(&SarifResult) -> Option<K>,
{
    let mut partitions = IndexMap::new();
    let runs = std::mem::take(&mut log.runs);

    for mut run in runs {
        let mut groups: IndexMap<K, Vec<SarifResult>> = IndexMap::new();
        for result in run.results.take().unwrap_or_default() {
            if let Some(key) = key_fn(&result) {
                groups.entry(key).or_default().push(result);
            }
        }
        add_groups(&mut partitions, &log, &run, groups);
    }

    partitions
}

fn add_groups<K>(
    partitions: &mut IndexMap<K, SarifLog>,
    log: &SarifLog,
    run: &Run,
    groups: IndexMap<K, Vec<SarifResult>>,
) where
    K: Eq + Hash + Clone,
{
    for (key, results) in groups {
        let compacted = compact_run(run, results);
        partitions
            .entry(key)
            .or_insert_with(|| empty_like(log))
            .runs
            .push(compacted);
    }
}

fn empty_like(log: &SarifLog) -> SarifLog {
    SarifLog {
        schema: log.schema.clone(),
        version: log.version.clone(),
        runs: Vec::new(),
        extra: log.extra.clone(),
    }
}

// ============================================================================
// Compaction
// ============================================================================

/// Indices a set of results reaches in each table.
#[derive(Debug, Default)]
struct Reachable {
    artifacts: BTreeSet<usize>,
    logical_locations: BTreeSet<usize>,
    thread_flow_locations: BTreeSet<usize>,
    rules: BTreeSet<usize>,
}

impl IndexVisitor for Reachable {
    fn artifact(&mut self, index: &mut Option<usize>) {
        self.artifacts.extend(*index);
    }

    fn logical_location(&mut self, index: &mut Option<usize>) {
        self.logical_locations.extend(*index);
    }

    fn thread_flow_location(&mut self, index: &mut Option<usize>) {
        self.thread_flow_locations.extend(*index);
    }

    fn rule(&mut self, index: &mut Option<usize>) {
        self.rules.extend(*index);
    }
}

/// Old index → new index, per table.
#[derive(Debug, Default)]
struct Renumber {
    artifacts: HashMap<usize, usize>,
    logical_locations: HashMap<usize, usize>,
    thread_flow_locations: HashMap<usize, usize>,
    rules: HashMap<usize, usize>,
    /// References whose target was not kept, which are removed.
    dropped: usize,
}

impl Renumber {
    fn apply(map: &HashMap<usize, usize>, index: &mut Option<usize>, dropped: &mut usize) {
        if let Some(old) = *index {
            *index = map.get(&old).copied();
            if index.is_none() {
                *dropped += 1;
            }
        }
    }
}

impl IndexVisitor for Renumber {
    fn artifact(&mut self, index: &mut Option<usize>) {
        Self::apply(&self.artifacts, index, &mut self.dropped);
    }

    fn logical_location(&mut self, index: &mut Option<usize>) {
        Self::apply(&self.logical_locations, index, &mut self.dropped);
    }

    fn thread_flow_location(&mut self, index: &mut Option<usize>) {
        Self::apply(&self.thread_flow_locations, index, &mut self.dropped);
    }

    fn rule(&mut self, index: &mut Option<usize>) {
        Self::apply(&self.rules, index, &mut self.dropped);
    }
}

/// Keep the `keep` entries of `table` in their original order.
fn compact<T: Clone>(
    table: Option<&Vec<T>>,
    keep: &BTreeSet<usize>,
) -> (Option<Vec<T>>, HashMap<usize, usize>) {
    let Some(table) = table else {
        return (None, HashMap::new());
    };
    let mut kept = Vec::with_capacity(keep.len());
    let mut renumber = HashMap::with_capacity(keep.len());
    for &old in keep {
        if let Some(entry) = table.get(old) {
            renumber.insert(old, kept.len());
            kept.push(entry.clone());
        }
    }
    ((!kept.is_empty()).then_some(kept), renumber)
}

/// A copy of `source` holding `results` and the table entries they reach.
fn compact_run(source: &Run, mut results: Vec<SarifResult>) -> Run {
    let mut reachable = Reachable::default();
    for result in &mut results {
        refs::visit_result(result, &mut reachable);

        let by_id = result.rule_index.is_none()
            && result.rule.as_ref().is_none_or(|rule| rule.index.is_none());
        if by_id
            && let Some(position) = result
                .rule_id
                .as_deref()
                .and_then(|id| query::rule_position(source, id))
        {
            reachable.rules.insert(position);
        }
    }

    let source_steps = source.thread_flow_locations.as_deref().unwrap_or(&[]);
    for &index in &reachable.thread_flow_locations.clone() {
        if let Some(entry) = source_steps.get(index) {
            refs::visit_thread_flow_location(&mut entry.clone(), &mut reachable);
        }
    }

    for index in reachable.artifacts.clone() {
        reachable
            .artifacts
            .extend(query::artifact_ancestors(source, index));
    }
    for index in reachable.logical_locations.clone() {
        reachable
            .logical_locations
            .extend(query::logical_location_ancestors(source, index));
    }

    let mut renumber = Renumber::default();
    let (mut artifacts, map) = compact(source.artifacts.as_ref(), &reachable.artifacts);
    renumber.artifacts = map;
    let (mut logical_locations, map) =
        compact(source.logical_locations.as_ref(), &reachable.logical_locations);
    renumber.logical_locations = map;
    let (mut thread_flow_locations, map) = compact(
        source.thread_flow_locations.as_ref(),
        &reachable.thread_flow_locations,
    );
    renumber.thread_flow_locations = map;
    let (rules, map) = compact(source.tool.driver.rules.as_ref(), &reachable.rules);
    renumber.rules = map;

    for (position, artifact) in artifacts.iter_mut().flatten().enumerate() {
        renumber.artifact(&mut artifact.parent_index);
        if let Some(location) = artifact.location.as_mut()
            && location.index.is_some()
        {
            location.index = Some(position);
        }
    }
    for (position, logical) in logical_locations.iter_mut().flatten().enumerate() {
        renumber.logical_location(&mut logical.parent_index);
        if logical.index.is_some() {
            logical.index = Some(position);
        }
    }
    for (position, entry) in thread_flow_locations.iter_mut().flatten().enumerate() {
        refs::visit_thread_flow_location(entry, &mut renumber);
        if entry.index.is_some() {
            entry.index = Some(position);
        }
    }
    for result in &mut results {
        refs::visit_result(result, &mut renumber);
    }
    if renumber.dropped > 0 {
        tracing::warn!(
            tool = %source.tool.driver.name,
            dropped = renumber.dropped,
            "results referenced missing table entries; references removed"
        );
    }

    // Run-level data may point at entries no result reached.
    let mut tool = Tool {
        driver: ToolComponent {
            rules,
            ..source.tool.driver.clone()
        },
        ..source.tool.clone()
    };
    let mut invocations = source.invocations.clone();
    let mut extra = source.extra.clone();
    let mut run_level = Renumber {
        dropped: 0,
        ..renumber
    };
    refs::visit_tool(&mut tool, &mut run_level);
    for invocation in invocations.iter_mut().flatten() {
        refs::visit_value(invocation, &mut run_level);
    }
    refs::visit_object(&mut extra, &mut run_level);
    if run_level.dropped > 0 {
        tracing::debug!(
            dropped = run_level.dropped,
            "removed run-level references to entries outside the partition"
        );
    }

    let run = Run {
        tool,
        invocations,
        original_uri_base_ids: source.original_uri_base_ids.clone(),
        artifacts,
        logical_locations,
        thread_flow_locations,
        results: Some(results),
        version_control_provenance: source.version_control_provenance.clone(),
        automation_details: source.automation_details.clone(),
        run_aggregates: source.run_aggregates.clone(),
        extra,
    };
    debug_assert!(
        query::check_run(&run).is_ok(),
        "compacted run has dangling references"
    );
    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consolidate::{TrimPolicy, consolidate_run};
    use crate::types::{Location, Region};
    use serde_json::json;

    /// Three files under `src/`, two logical locations under one namespace,
    /// three rules, and one result per rule.
    fn sample_log() -> SarifLog {
        let run = Run::new("lint")
            .with_rule("R1")
            .with_rule("R2")
            .with_rule("R3")
            .with_artifact("src/", None)
            .with_artifact("src/a.c", Some(0))
            .with_artifact("src/b.c", Some(0))
            .with_artifact("README", None)
            .with_logical_location("ns", None)
            .with_logical_location("ns::f", Some(0))
            .with_logical_location("ns::g", Some(0))
            .with_result(
                SarifResult::new("R1", "first")
                    .with_rule_index(0)
                    .with_location(Location::in_artifact(1, Region::line(1)).with_logical_index(1)),
            )
            .with_result(
                SarifResult::new("R2", "second")
                    .with_rule_index(1)
                    .with_location(Location::in_artifact(2, Region::line(2)).with_logical_index(2)),
            )
            .with_result(
                SarifResult::new("R3", "third")
                    .with_rule_index(2)
                    .with_location(Location::in_artifact(3, Region::line(3))),
            );
        SarifLog::new().with_run(run)
    }

    fn artifact_index(result: &SarifResult) -> Option<usize> {
        result.locations.as_ref()?[0]
            .physical_location
            .as_ref()?
            .artifact_location
            .as_ref()?
            .index
    }

    fn uris(run: &Run) -> Vec<String> {
        run.artifacts
            .iter()
            .flatten()
            .filter_map(|a| a.location.as_ref()?.uri.clone())
            .collect()
    }

    #[test]
    fn test_filter_always_true_keeps_everything() {
        let log = sample_log();
        let filtered = filter(&log, |_| true);
        assert_eq!(filtered, log);
        assert_eq!(filtered.runs[0].results().len(), log.runs[0].results().len());
    }

    #[test]
    fn test_filter_compacts_tables() {
        let log = sample_log();
        let filtered = filter(&log, |r| r.rule_id.as_deref() == Some("R2"));
        let run = &filtered.runs[0];

        assert_eq!(run.results().len(), 1);
        assert_eq!(uris(run), vec!["src/", "src/b.c"]);
        let artifacts = run.artifacts.as_ref().unwrap();
        assert_eq!(artifacts[1].parent_index, Some(0));
        assert_eq!(artifact_index(&run.results()[0]), Some(1));

        let logical = run.logical_locations.as_ref().unwrap();
        assert_eq!(logical.len(), 2);
        assert_eq!(logical[1].fully_qualified_name.as_deref(), Some("ns::g"));
        assert_eq!(logical[1].parent_index, Some(0));
        let location = &run.results()[0].locations.as_ref().unwrap()[0];
        assert_eq!(location.logical_locations.as_ref().unwrap()[0].index, Some(1));

        assert_eq!(run.rules().len(), 1);
        assert_eq!(run.rules()[0].id, "R2");
        assert_eq!(run.results()[0].rule_index, Some(0));
        assert!(query::check_references(&filtered).is_ok());
    }

    #[test]
    fn test_filter_nothing_kept() {
        let filtered = filter(&sample_log(), |_| false);
        let run = &filtered.runs[0];
        assert!(run.results().is_empty());
        assert!(run.artifacts.is_none());
        assert!(run.rules().is_empty());
    }

    #[test]
    fn test_partition_by_rule_is_complete() {
        let log = sample_log();
        let partitions = partition(&log, |r| r.rule_id.clone());
        let keys: Vec<&str> = partitions.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["R1", "R2", "R3"]);

        let mut messages: Vec<String> = partitions
            .values()
            .flat_map(|p| p.runs.iter())
            .flat_map(|run| run.results().iter())
            .filter_map(|r| r.message.text.clone())
            .collect();
        messages.sort();
        assert_eq!(messages, vec!["first", "second", "third"]);

        let r3 = &partitions["R3"].runs[0];
        assert_eq!(uris(r3), vec!["README"]);
        assert!(r3.logical_locations.is_none());
        assert_eq!(artifact_index(&r3.results()[0]), Some(0));

        for partition in partitions.values() {
            assert!(query::check_references(partition).is_ok());
        }
        // source untouched
        assert_eq!(log, sample_log());
    }

    #[test]
    fn test_partition_null_key_discards() {
        let partitions = partition(&sample_log(), |r| {
            (r.rule_id.as_deref() != Some("R2")).then_some("kept")
        });
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions["kept"].runs[0].results().len(), 2);
        assert_eq!(
            uris(&partitions["kept"].runs[0]),
            vec!["src/", "src/a.c", "README"]
        );
    }

    #[test]
    fn test_partition_keys_merge_by_value() {
        let partitions = partition(&sample_log(), |r| {
            Some(format!("{}", r.rule_id.as_deref() == Some("R3")))
        });
        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions["false"].runs[0].results().len(), 2);
    }

    #[test]
    fn test_partition_owned_matches_partition() {
        let log = sample_log();
        let cloned = partition(&log, |r| r.rule_id.clone());
        let moved = partition_owned(log, |r| r.rule_id.clone());
        assert_eq!(cloned, moved);
    }

    #[test]
    fn test_partition_only_runs_with_results() {
        let other = Run::new("other").with_result(SarifResult::new("R9", "x"));
        let log = sample_log().with_run(other);
        let partitions = partition(&log, |r| r.rule_id.clone());
        assert_eq!(partitions["R1"].runs.len(), 1);
        assert_eq!(partitions["R9"].runs.len(), 1);
        assert_eq!(partitions["R9"].runs[0].tool.driver.name, "other");
    }

    #[test]
    fn test_rule_kept_by_id_alone() {
        let run = Run::new("lint")
            .with_rule("R1")
            .with_rule("R2")
            .with_result(SarifResult::new("R2", "m"));
        let log = SarifLog::new().with_run(run.with_result(SarifResult::new("R1", "n")));
        let filtered = filter(&log, |r| r.rule_id.as_deref() == Some("R2"));
        let rules = filtered.runs[0].rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, "R2");
    }

    #[test]
    fn test_thread_flow_table_compacted() {
        let a = Location::in_artifact(0, Region::line(1));
        let b = Location::in_artifact(1, Region::line(2));
        let mut run = Run::new("lint")
            .with_artifact("a.c", None)
            .with_artifact("b.c", None)
            .with_result(SarifResult::new("R1", "m").with_code_flow(vec![a.clone()]))
            .with_result(SarifResult::new("R2", "n").with_code_flow(vec![b, a]));
        consolidate_run(&mut run, &TrimPolicy::default());
        let log = SarifLog::new().with_run(run);

        let filtered = filter(&log, |r| r.rule_id.as_deref() == Some("R1"));
        let run = &filtered.runs[0];
        let table = run.thread_flow_locations.as_ref().unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(uris(run), vec!["a.c"]);
        let step = run.results()[0].thread_flow_locations().next().unwrap();
        assert_eq!(step.index, Some(0));
        assert!(query::check_references(&filtered).is_ok());
    }

    #[test]
    fn test_self_indexed_artifact_locations_renumbered() {
        let log: SarifLog = serde_json::from_value(json!({
            "version": "2.1.0",
            "runs": [{
                "tool": { "driver": { "name": "lint" } },
                "artifacts": [
                    { "location": { "uri": "a.c", "index": 0 } },
                    { "location": { "uri": "b.c", "index": 1 } }
                ],
                "results": [
                    { "ruleId": "R1", "message": { "text": "m" }, "analysisTarget": { "index": 0 } },
                    { "ruleId": "R2", "message": { "text": "n" }, "analysisTarget": { "index": 1 } }
                ]
            }]
        }))
        .unwrap();
        let filtered = filter(&log, |r| r.rule_id.as_deref() == Some("R2"));
        let run = &filtered.runs[0];
        let artifact = &run.artifacts.as_ref().unwrap()[0];
        assert_eq!(artifact.location.as_ref().unwrap().index, Some(0));
        assert_eq!(
            run.results()[0].analysis_target.as_ref().unwrap().index,
            Some(0)
        );
    }

    #[test]
    fn test_run_level_references_outside_partition_removed() {
        let log: SarifLog = serde_json::from_value(json!({
            "version": "2.1.0",
            "runs": [{
                "tool": { "driver": { "name": "lint" } },
                "artifacts": [ { "location": { "uri": "a.c" } }, { "location": { "uri": "b.c" } } ],
                "invocations": [{
                    "executionSuccessful": true,
                    "toolExecutionNotifications": [{
                        "message": { "text": "skipped" },
                        "locations": [
                            { "physicalLocation": { "artifactLocation": { "uri": "a.c", "index": 0 } } },
                            { "physicalLocation": { "artifactLocation": { "uri": "b.c", "index": 1 } } }
                        ]
                    }]
                }],
                "results": [
                    { "ruleId": "R1", "message": { "text": "m" }, "analysisTarget": { "index": 1 } },
                    { "ruleId": "R2", "message": { "text": "n" }, "analysisTarget": { "index": 0 } }
                ]
            }]
        }))
        .unwrap();

        let filtered = filter(&log, |r| r.rule_id.as_deref() == Some("R1"));
        let invocation = &filtered.runs[0].invocations.as_ref().unwrap()[0];
        let locations = &invocation["toolExecutionNotifications"][0]["locations"];
        assert_eq!(
            locations[0]["physicalLocation"]["artifactLocation"],
            json!({ "uri": "a.c" })
        );
        assert_eq!(
            locations[1]["physicalLocation"]["artifactLocation"],
            json!({ "uri": "b.c", "index": 0 })
        );
    }

    #[test]
    fn test_notification_rule_references_follow_compaction() {
        let mut run = Run::new("lint")
            .with_rule("R1")
            .with_rule("R2")
            .with_rule("R3")
            .with_result(SarifResult::new("R1", "a").with_rule_index(0))
            .with_result(SarifResult::new("R2", "b").with_rule_index(1))
            .with_result(SarifResult::new("R3", "c").with_rule_index(2));
        run.invocations = Some(vec![json!({
            "executionSuccessful": true,
            "toolExecutionNotifications": [
                { "message": { "text": "slow" }, "associatedRule": { "id": "R2", "index": 1 } },
                { "message": { "text": "noisy" }, "associatedRule": { "id": "R3", "index": 2 } }
            ]
        })]);
        let log = SarifLog::new().with_run(run);

        let filtered = filter(&log, |r| r.rule_id.as_deref() != Some("R2"));
        let run = &filtered.runs[0];
        let ids: Vec<&str> = run.rules().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["R1", "R3"]);

        let notifications = &run.invocations.as_ref().unwrap()[0]["toolExecutionNotifications"];
        // R2 is gone: the index goes, the id stays
        assert_eq!(notifications[0]["associatedRule"], json!({ "id": "R2" }));
        assert_eq!(notifications[1]["associatedRule"], json!({ "id": "R3", "index": 1 }));
        assert!(query::check_references(&filtered).is_ok());
    }

    #[test]
    fn test_thread_flow_table_self_index_renumbered() {
        let log: SarifLog = serde_json::from_value(json!({
            "version": "2.1.0",
            "runs": [{
                "tool": { "driver": { "name": "lint" } },
                "threadFlowLocations": [
                    { "index": 0, "location": { "message": { "text": "first" } } },
                    { "index": 1, "location": { "message": { "text": "second" } } }
                ],
                "results": [
                    { "ruleId": "R1", "message": { "text": "m" },
                      "codeFlows": [{ "threadFlows": [{ "locations": [{ "index": 0 }] }] }] },
                    { "ruleId": "R2", "message": { "text": "n" },
                      "codeFlows": [{ "threadFlows": [{ "locations": [{ "index": 1 }] }] }] }
                ]
            }]
        }))
        .unwrap();

        let filtered = filter(&log, |r| r.rule_id.as_deref() == Some("R2"));
        let run = &filtered.runs[0];
        let table = run.thread_flow_locations.as_ref().unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].index, Some(0));
        let step = run.results()[0].thread_flow_locations().next().unwrap();
        assert_eq!(step.index, Some(0));
    }
}
