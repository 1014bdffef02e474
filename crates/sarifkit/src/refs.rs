//! Walk every index-bearing reference reachable from a result.
//!
//! The same walk serves three callers: collecting what a set of results
//! references, rewriting references after tables are compacted, and bounds
//! checking. Each gets every index slot as `&mut Option<usize>`; setting it to
//! `None` removes the reference.

use serde_json::{Map, Value};

use crate::json::objects_in;
use crate::types::{Location, SarifResult, Stack, ThreadFlowLocation, Tool};

pub(crate) trait IndexVisitor {
    fn artifact(&mut self, index: &mut Option<usize>);
    fn logical_location(&mut self, index: &mut Option<usize>);
    fn thread_flow_location(&mut self, index: &mut Option<usize>);
    fn rule(&mut self, index: &mut Option<usize>);
}

pub(crate) fn visit_result<V: IndexVisitor>(result: &mut SarifResult, visitor: &mut V) {
    visitor.rule(&mut result.rule_index);
    if let Some(rule) = result.rule.as_mut()
        && rule.tool_component.is_none()
    {
        visitor.rule(&mut rule.index);
    }

    if let Some(target) = result.analysis_target.as_mut() {
        visitor.artifact(&mut target.index);
    }

    for location in result
        .locations
        .iter_mut()
        .flatten()
        .chain(result.related_locations.iter_mut().flatten())
    {
        visit_location(location, visitor);
    }

    for stack in result.stacks.iter_mut().flatten() {
        visit_stack(stack, visitor);
    }

    let steps = result
        .code_flows
        .iter_mut()
        .flatten()
        .flat_map(|code_flow| code_flow.thread_flows.iter_mut())
        .flat_map(|thread_flow| thread_flow.locations.iter_mut());
    for step in steps {
        visitor.thread_flow_location(&mut step.index);
        visit_thread_flow_location(step, visitor);
    }

    let blobs = result
        .graphs
        .iter_mut()
        .flatten()
        .chain(result.graph_traversals.iter_mut().flatten())
        .chain(result.suppressions.iter_mut().flatten())
        .chain(result.web_request.iter_mut())
        .chain(result.web_response.iter_mut());
    for blob in blobs {
        visit_value(blob, visitor);
    }
    visit_object(&mut result.extra, visitor);
}

/// The body of a step: its location and stack. The step's own `index` is
/// the caller's business.
pub(crate) fn visit_thread_flow_location<V: IndexVisitor>(
    step: &mut ThreadFlowLocation,
    visitor: &mut V,
) {
    if let Some(location) = step.location.as_mut() {
        visit_location(location, visitor);
    }
    if let Some(stack) = step.stack.as_mut() {
        visit_stack(stack, visitor);
    }
}

pub(crate) fn visit_location<V: IndexVisitor>(location: &mut Location, visitor: &mut V) {
    if let Some(artifact) = location
        .physical_location
        .as_mut()
        .and_then(|physical| physical.artifact_location.as_mut())
    {
        visitor.artifact(&mut artifact.index);
    }
    for logical in location.logical_locations.iter_mut().flatten() {
        visitor.logical_location(&mut logical.index);
        visitor.logical_location(&mut logical.parent_index);
    }
}

fn visit_stack<V: IndexVisitor>(stack: &mut Stack, visitor: &mut V) {
    for location in stack.frames.iter_mut().filter_map(|f| f.location.as_mut()) {
        visit_location(location, visitor);
    }
}

/// Tool components list artifact references under `locations`.
pub(crate) fn visit_tool<V: IndexVisitor>(tool: &mut Tool, visitor: &mut V) {
    let components = std::iter::once(&mut tool.driver).chain(tool.extensions.iter_mut().flatten());
    for component in components {
        for reference in objects_in(&mut component.extra, "locations") {
            visit_index_property(reference, "index", |i| visitor.artifact(i));
        }
        visit_object(&mut component.extra, visitor);
    }
    visit_object(&mut tool.extra, visitor);
}

/// Untyped JSON: artifact references are objects stored under
/// `artifactLocation` or `analysisTarget`; logical references are the
/// members of `logicalLocations` arrays; rule references are stored under
/// `associatedRule` or `rule`, and only point at the driver's rules when they
/// name no `toolComponent`.
pub(crate) fn visit_value<V: IndexVisitor>(value: &mut Value, visitor: &mut V) {
    match value {
        Value::Object(object) => visit_object(object, visitor),
        Value::Array(items) => {
            for item in items {
                visit_value(item, visitor);
            }
        }
        _ => {}
    }
}

pub(crate) fn visit_object<V: IndexVisitor>(object: &mut Map<String, Value>, visitor: &mut V) {
    for (key, child) in object.iter_mut() {
        match key.as_str() {
            "artifactLocation" | "analysisTarget" => {
                if let Some(reference) = child.as_object_mut() {
                    visit_index_property(reference, "index", |i| visitor.artifact(i));
                }
            }
            "associatedRule" | "rule" => {
                if let Some(reference) = child.as_object_mut()
                    && !reference.contains_key("toolComponent")
                {
                    visit_index_property(reference, "index", |i| visitor.rule(i));
                }
            }
            "logicalLocations" => {
                for reference in child
                    .as_array_mut()
                    .into_iter()
                    .flatten()
                    .filter_map(Value::as_object_mut)
                {
                    visit_index_property(reference, "index", |i| visitor.logical_location(i));
                    visit_index_property(reference, "parentIndex", |i| {
                        visitor.logical_location(i)
                    });
                }
            }
            _ => {}
        }
        visit_value(child, visitor);
    }
}

fn visit_index_property(
    object: &mut Map<String, Value>,
    key: &str,
    visit: impl FnOnce(&mut Option<usize>),
) {
    // Negative sentinels and non-numbers are not references.
    let Some(current) = object.get(key).and_then(Value::as_u64) else {
        return;
    };
    let mut index = usize::try_from(current).ok();
    visit(&mut index);
    match index {
        Some(index) => {
            object.insert(key.to_string(), Value::from(index));
        }
        None => {
            object.shift_remove(key);
        }
    }
}
