//! Lookups over a run's tables and the references into them.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::refs::{self, IndexVisitor};
use crate::types::{Run, SarifLog, SarifResult};

/// Walk a parent chain starting at `start` (inclusive).
///
/// Stops at the root, at an out-of-range parent, or when an index repeats.
fn parent_chain(len: usize, start: usize, parent_of: impl Fn(usize) -> Option<usize>) -> Vec<usize> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = Some(start);

    while let Some(index) = current {
        if index >= len || !seen.insert(index) {
            break;
        }
        chain.push(index);
        current = parent_of(index);
    }

    chain
}

/// `run.artifacts[index]` followed by its parents, nearest first.
///
/// # Examples
///
/// ```
/// use sarifkit::v1::{query, Run};
///
/// let run = Run::new("lint")
///     .with_artifact("src/", None)
///     .with_artifact("src/net/", Some(0))
///     .with_artifact("src/net/tcp.c", Some(1));
///
/// assert_eq!(query::artifact_ancestors(&run, 2), vec![2, 1, 0]);
/// assert!(query::artifact_ancestors(&run, 9).is_empty());
/// ```
pub fn artifact_ancestors(run: &Run, index: usize) -> Vec<usize> {
    let artifacts = run.artifacts.as_deref().unwrap_or(&[]);
    parent_chain(artifacts.len(), index, |i| artifacts[i].parent_index)
}

/// `run.logicalLocations[index]` followed by its parents, nearest first.
pub fn logical_location_ancestors(run: &Run, index: usize) -> Vec<usize> {
    let logical = run.logical_locations.as_deref().unwrap_or(&[]);
    parent_chain(logical.len(), index, |i| logical[i].parent_index)
}

/// Every `ruleId` used by the run's results.
pub fn referenced_rule_ids(run: &Run) -> HashSet<&str> {
    run.results()
        .iter()
        .filter_map(|r| r.rule_id.as_deref())
        .collect()
}

/// Results reporting `rule_id`.
pub fn results_by_rule<'a>(run: &'a Run, rule_id: &str) -> Vec<&'a SarifResult> {
    run.results()
        .iter()
        .filter(|r| r.rule_id.as_deref() == Some(rule_id))
        .collect()
}

/// Position of the driver rule whose id is `rule_id`.
pub fn rule_position(run: &Run, rule_id: &str) -> Option<usize> {
    run.rules().iter().position(|rule| rule.id == rule_id)
}

/// Absolute URI of an `originalUriBaseIds` entry, following `uriBaseId`
/// links between entries.
///
/// Returns `None` for unknown names and for cyclic definitions.
///
/// ```
/// use sarifkit::v1::{query, Run};
/// use serde_json::json;
///
/// let run: Run = serde_json::from_value(json!({
///     "tool": { "driver": { "name": "lint" } },
///     "originalUriBaseIds": {
///         "REPO": { "uri": "file:///work/repo/" },
///         "SRC": { "uri": "src/", "uriBaseId": "REPO" }
///     }
/// })).unwrap();
///
/// assert_eq!(query::resolve_uri_base_id(&run, "SRC").as_deref(), Some("file:///work/repo/src/"));
/// assert_eq!(query::resolve_uri_base_id(&run, "NOPE"), None);
/// ```
pub fn resolve_uri_base_id(run: &Run, name: &str) -> Option<String> {
    let bases = run.original_uri_base_ids.as_ref()?;
    let mut visited = HashSet::new();
    let mut parts = Vec::new();
    let mut current = name;

    loop {
        if !visited.insert(current) {
            return None;
        }
        let entry = bases.get(current)?;
        parts.push(entry.uri.as_deref().unwrap_or(""));
        match entry.uri_base_id.as_deref() {
            Some(parent) => current = parent,
            None => break,
        }
    }

    Some(parts.into_iter().rev().collect())
}

/// Check that every table index in `log` is in bounds.
///
/// Reports the first dangling reference found.
pub fn check_references(log: &SarifLog) -> Result<()> {
    log.runs.iter().try_for_each(check_run)
}

/// [`check_references`] for a single run.
pub fn check_run(run: &Run) -> Result<()> {
    let mut check = BoundsCheck {
        artifacts: run.artifacts.as_ref().map_or(0, Vec::len),
        logical_locations: run.logical_locations.as_ref().map_or(0, Vec::len),
        thread_flow_locations: run.thread_flow_locations.as_ref().map_or(0, Vec::len),
        rules: run.rules().len(),
        dangling: None,
    };

    for artifact in run.artifacts.iter().flatten() {
        check.check("artifacts", artifact.parent_index, check.artifacts);
    }
    for logical in run.logical_locations.iter().flatten() {
        check.check(
            "logicalLocations",
            logical.parent_index,
            check.logical_locations,
        );
    }
    for entry in run.thread_flow_locations.iter().flatten() {
        refs::visit_thread_flow_location(&mut entry.clone(), &mut check);
    }
    for result in run.results() {
        refs::visit_result(&mut result.clone(), &mut check);
    }
    refs::visit_tool(&mut run.tool.clone(), &mut check);
    for invocation in run.invocations.iter().flatten() {
        refs::visit_value(&mut invocation.clone(), &mut check);
    }
    refs::visit_object(&mut run.extra.clone(), &mut check);

    match check.dangling {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

struct BoundsCheck {
    artifacts: usize,
    logical_locations: usize,
    thread_flow_locations: usize,
    rules: usize,
    dangling: Option<Error>,
}

impl BoundsCheck {
    fn check(&mut self, table: &'static str, index: Option<usize>, len: usize) {
        if let Some(index) = index
            && index >= len
            && self.dangling.is_none()
        {
            self.dangling = Some(Error::DanglingIndex { table, index, len });
        }
    }
}

impl IndexVisitor for BoundsCheck {
    fn artifact(&mut self, index: &mut Option<usize>) {
        self.check("artifacts", *index, self.artifacts);
    }

    fn logical_location(&mut self, index: &mut Option<usize>) {
        self.check("logicalLocations", *index, self.logical_locations);
    }

    fn thread_flow_location(&mut self, index: &mut Option<usize>) {
        self.check("threadFlowLocations", *index, self.thread_flow_locations);
    }

    fn rule(&mut self, index: &mut Option<usize>) {
        self.check("rules", *index, self.rules);
    }
}
