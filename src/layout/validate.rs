use std::collections::{HashMap, HashSet};

use super::{LayoutError, LayoutGraph, LayoutNode, LayoutOutput, OutputNode};
use crate::view_state::Point;

/// Checks engine output against the input it was produced from. Anything that
/// would corrupt the geometry cache is rejected here.
pub fn validate_output(input: &LayoutGraph, output: &LayoutOutput) -> Result<(), LayoutError> {
    if output.root.id != input.root.id {
        return Err(LayoutError::invalid(format!(
            "output root {} does not match scope {}",
            output.root.id, input.root.id
        )));
    }

    let expected = input_parents(&input.root);
    let mut seen: HashMap<&str, Option<&str>> = HashMap::new();
    let mut problem = None;
    collect_output(&output.root, None, &mut seen, &mut problem);
    if let Some(problem) = problem {
        return Err(LayoutError::invalid(problem));
    }

    for (id, parent) in &expected {
        match seen.get(id) {
            None => return Err(LayoutError::invalid(format!("missing node {id}"))),
            Some(actual) if actual != parent => {
                return Err(LayoutError::invalid(format!(
                    "node {id} placed under {} instead of {}",
                    actual.unwrap_or("nothing"),
                    parent.unwrap_or("nothing")
                )));
            }
            Some(_) => {}
        }
    }
    if let Some(id) = seen.keys().find(|id| !expected.contains_key(*id)) {
        return Err(LayoutError::invalid(format!("unknown node {id}")));
    }

    validate_edges(input, output)?;
    check_degenerate(&output.root)
}

fn input_parents(root: &LayoutNode) -> HashMap<&str, Option<&str>> {
    fn visit<'a>(node: &'a LayoutNode, parent: Option<&'a str>, out: &mut HashMap<&'a str, Option<&'a str>>) {
        out.insert(node.id.as_str(), parent);
        for child in &node.children {
            visit(child, Some(node.id.as_str()), out);
        }
    }
    let mut out = HashMap::new();
    visit(root, None, &mut out);
    out
}

fn collect_output<'a>(
    node: &'a OutputNode,
    parent: Option<&'a str>,
    seen: &mut HashMap<&'a str, Option<&'a str>>,
    problem: &mut Option<String>,
) {
    if problem.is_some() {
        return;
    }
    if seen.insert(node.id.as_str(), parent).is_some() {
        *problem = Some(format!("node {} appears more than once", node.id));
        return;
    }
    let numbers = [node.x, node.y, node.width, node.height];
    if numbers.iter().any(|n| !n.is_finite()) {
        *problem = Some(format!("node {} has non-finite geometry", node.id));
        return;
    }
    if node.width < 0.0 || node.height < 0.0 {
        *problem = Some(format!("node {} has a negative size", node.id));
        return;
    }
    for child in &node.children {
        collect_output(child, Some(node.id.as_str()), seen, problem);
    }
}

fn validate_edges(input: &LayoutGraph, output: &LayoutOutput) -> Result<(), LayoutError> {
    let expected: HashMap<&str, (&str, &str)> = input
        .edges()
        .into_iter()
        .map(|edge| (edge.id.as_str(), (edge.source.as_str(), edge.target.as_str())))
        .collect();

    let mut found = HashSet::new();
    let mut result = Ok(());
    output.root.walk(&mut |node| {
        if result.is_err() {
            return;
        }
        for edge in &node.edges {
            let Some((source, target)) = expected.get(edge.id.as_str()) else {
                result = Err(LayoutError::invalid(format!("unknown edge {}", edge.id)));
                return;
            };
            if edge.source != *source || edge.target != *target {
                result = Err(LayoutError::invalid(format!(
                    "edge {} endpoints do not match its input",
                    edge.id
                )));
                return;
            }
            if edge.sections.is_empty() {
                result = Err(LayoutError::invalid(format!("edge {} has no sections", edge.id)));
                return;
            }
            let finite = |p: &Point| p.x.is_finite() && p.y.is_finite();
            let all_finite = edge.sections.iter().all(|section| {
                finite(&section.start) && finite(&section.end) && section.bends.iter().all(finite)
            });
            if !all_finite {
                result = Err(LayoutError::invalid(format!(
                    "edge {} has non-finite points",
                    edge.id
                )));
                return;
            }
            if !found.insert(edge.id.as_str()) {
                result = Err(LayoutError::invalid(format!("edge {} appears more than once", edge.id)));
                return;
            }
        }
    });
    result?;

    if let Some(id) = expected.keys().find(|id| !found.contains(*id)) {
        return Err(LayoutError::invalid(format!("missing edge {id}")));
    }
    Ok(())
}

/// Every non-root entity sitting at the origin means the engine did nothing. A
/// lone child may legitimately sit there.
fn check_degenerate(root: &OutputNode) -> Result<(), LayoutError> {
    let mut count = 0;
    let mut at_origin = 0;
    for child in &root.children {
        child.walk(&mut |node| {
            count += 1;
            if node.x == 0.0 && node.y == 0.0 {
                at_origin += 1;
            }
        });
    }
    if count > 1 && at_origin == count {
        tracing::warn!(count, "layout output collapsed to the origin");
        return Err(LayoutError::Degenerate { count });
    }
    Ok(())
}
