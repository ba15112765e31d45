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

use serde::{Deserialize, Serialize};

/// One property reported by the engine, possibly with a partial child list.
///
/// Engines truncate large structures: `declared_child_count` is what the
/// engine says exists, `children` is what has been received so far. Once the
/// two agree the node is fully loaded.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VariableNode {
    /// Short name as displayed (`$x`, `[0]`, `prop`).
    pub name: String,
    /// Expression that evaluates to this property, used for fetches.
    pub full_name: String,
    /// Class of an object value.
    pub class_name: Option<String>,
    /// Engine type name (`int`, `array`, `object`, ...).
    pub var_type: String,
    /// Decoded scalar value, if any.
    pub value: Option<String>,
    /// Engine-side handle.
    pub address: Option<String>,
    /// Number of children the engine reports.
    pub declared_child_count: usize,
    /// Children received so far.
    pub children: Vec<VariableNode>,
    /// Children per page, as reported by the engine (0 when unknown).
    pub page_size: usize,
}

impl VariableNode {
    /// Whether the property can never have children.
    pub fn is_leaf(&self) -> bool {
        self.declared_child_count == 0 && self.children.is_empty()
    }

    /// Whether every declared child is present.
    pub fn is_fully_loaded(&self) -> bool {
        self.children.len() >= self.declared_child_count
    }

    /// Type as shown to the user: `Class (object)` for objects, otherwise the type.
    pub fn display_type(&self) -> String {
        match self.class_name.as_deref() {
            Some(class) if !class.is_empty() => format!("{class} ({})", self.var_type),
            _ => self.var_type.clone(),
        }
    }

    /// Page to request to continue loading children.
    pub fn next_page(&self) -> usize {
        if self.page_size == 0 {
            0
        } else {
            self.children.len() / self.page_size
        }
    }

    /// Appends newly fetched children, skipping ones already held.
    ///
    /// Returns how many children were added. A fetch that adds nothing lowers
    /// the declared count to what is held, so the node reads as complete and
    /// is not fetched again.
    pub fn merge_children(&mut self, fetched: Vec<Self>) -> usize {
        let before = self.children.len();
        for child in fetched {
            if !self.children.iter().any(|c| c.full_name == child.full_name) {
                self.children.push(child);
            }
        }

        let added = self.children.len() - before;
        if added == 0 || self.children.len() > self.declared_child_count {
            self.declared_child_count = self.children.len();
        }
        added
    }

    /// Finds a descendant (or self) by full name.
    pub fn find(&self, full_name: &str) -> Option<&Self> {
        if self.full_name == full_name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(full_name))
    }

    /// Mutable variant of [`VariableNode::find`].
    pub fn find_mut(&mut self, full_name: &str) -> Option<&mut Self> {
        if self.full_name == full_name {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(full_name))
    }
}

/// Finds a node by full name anywhere in a list of trees.
pub fn find_variable<'a>(roots: &'a [VariableNode], full_name: &str) -> Option<&'a VariableNode> {
    roots.iter().find_map(|n| n.find(full_name))
}

/// Mutable variant of [`find_variable`].
pub fn find_variable_mut<'a>(
    roots: &'a mut [VariableNode],
    full_name: &str,
) -> Option<&'a mut VariableNode> {
    roots.iter_mut().find_map(|n| n.find_mut(full_name))
}
