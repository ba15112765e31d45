// DBGp Client - Remote Script Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Building model values from response documents.

use std::path::PathBuf;

use dbgp_common::{DebuggerConfig, StackFrame, VariableNode};
use dbgp_protocol::{path_from_uri, Element, Response};

/// Local path for an engine file URI. URIs that are not `file://` (such as
/// `dbgp://` for evaluated code) are kept verbatim.
pub fn local_path(uri: &str, config: &DebuggerConfig) -> PathBuf {
    match path_from_uri(uri) {
        Ok(path) => config.to_local(&path),
        Err(_) => PathBuf::from(uri),
    }
}

/// Frames of a `stack_get` response, innermost first, indexed by position.
pub fn parse_stack(response: &Response, config: &DebuggerConfig) -> Vec<StackFrame> {
    let mut frames: Vec<StackFrame> = response
        .root()
        .children_named("stack")
        .enumerate()
        .map(|(pos, el)| {
            let index = el.attr("level").and_then(|l| l.trim().parse().ok()).unwrap_or(pos);
            let file = el.attr("filename").map(|uri| local_path(uri, config)).unwrap_or_default();
            let line = el.attr("lineno").and_then(|l| l.trim().parse().ok()).unwrap_or(0);
            let function = el.attr("where").unwrap_or("{main}");
            StackFrame::new(index, file, line, function)
        })
        .collect();

    frames.sort_by_key(|f| f.index);
    for (i, frame) in frames.iter_mut().enumerate() {
        frame.index = i;
    }
    frames
}

/// A `<property>` element and its inline descendants.
pub fn parse_property(el: &Element) -> VariableNode {
    let children = parse_properties(el);
    let name = el.attr("name").unwrap_or_default().to_string();
    let full_name = el.attr("fullname").map(str::to_string).unwrap_or_else(|| name.clone());
    let has_children = el.attr("children").is_some_and(|c| c.trim() == "1");

    let declared_child_count = match el.attr("numchildren").and_then(|n| n.trim().parse().ok()) {
        Some(n) => n,
        None if has_children => children.len().max(1),
        None => children.len(),
    };

    let value = if el.text.is_empty() { None } else { Some(el.decoded_text()) };

    VariableNode {
        name,
        full_name,
        class_name: el.attr("classname").filter(|c| !c.is_empty()).map(str::to_string),
        var_type: el.attr("type").unwrap_or_default().to_string(),
        value,
        address: el.attr("address").map(str::to_string),
        declared_child_count,
        children,
        page_size: el.attr("pagesize").and_then(|p| p.trim().parse().ok()).unwrap_or(0),
    }
}

/// All `<property>` children of `parent`.
pub fn parse_properties(parent: &Element) -> Vec<VariableNode> {
    parent.children_named("property").map(parse_property).collect()
}

/// One-line rendering of an evaluation result.
pub fn format_value(node: &VariableNode) -> String {
    match (&node.value, node.var_type.as_str()) {
        (Some(value), "string") => format!("{value:?}"),
        (Some(value), _) => value.clone(),
        (None, _) if !node.is_leaf() => {
            format!("{} [{}]", node.display_type(), node.declared_child_count)
        }
        (None, _) => node.display_type(),
    }
}

/// Rendering of an `eval` response.
pub fn format_eval(response: &Response) -> String {
    match response.root().child("property") {
        Some(property) => format_value(&parse_property(property)),
        None => String::new(),
    }
}
