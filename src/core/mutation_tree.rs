//! Structure of the mutations applied to the compiler under test.
//!
//! The mutation tool emits a JSON document describing, per source file, a tree of syntax
//! nodes and the mutations attached to each node. Two builds of the compiler (the mutated
//! build and the coverage-tracking build) are instrumented independently; their documents
//! must describe the same tree, or mutation ids would mean different things in each build.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::types::{AppError, AppResult, MutationId};

pub type NodeId = usize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MutationInfo {
    #[serde(default)]
    info_for_files: Vec<FileInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileInfo {
    mutation_tree_root: JsonNode,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonNode {
    #[serde(default)]
    children: Vec<JsonNode>,
    /// Each group is keyed by its mutation kind (`replaceExpr`, `removeStmt`, ...).
    #[serde(default)]
    mutation_groups: Vec<HashMap<String, JsonGroup>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonGroup {
    mutation_id: Option<MutationId>,
    #[serde(default)]
    instances: Vec<JsonInstance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonInstance {
    mutation_id: MutationId,
}

impl JsonNode {
    fn mutation_ids(&self) -> Vec<MutationId> {
        let mut ids = Vec::new();
        for group in &self.mutation_groups {
            for body in group.values() {
                ids.extend(body.mutation_id);
                ids.extend(body.instances.iter().map(|i| i.mutation_id));
            }
        }
        ids
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationTree {
    mutation_to_node: BTreeMap<MutationId, NodeId>,
    parent_of: BTreeMap<NodeId, Option<NodeId>>,
    node_count: usize,
    mutation_count: u64,
}

impl MutationTree {
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text).map_err(|reason| AppError::MutationInfo {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Trees mirror the compiler's syntax trees and can nest far deeper than serde_json's
    /// default recursion limit, so parsing grows the stack on demand instead.
    pub fn from_json(text: &str) -> Result<Self, String> {
        let mut de = serde_json::Deserializer::from_str(text);
        de.disable_recursion_limit();
        let info = MutationInfo::deserialize(serde_stacker::Deserializer::new(&mut de))
            .map_err(|e| e.to_string())?;
        de.end().map_err(|e| e.to_string())?;
        let mut tree = MutationTree::default();
        for file in &info.info_for_files {
            let root = tree.new_node(None);
            tree.populate(&file.mutation_tree_root, root)?;
        }
        Ok(tree)
    }

    fn new_node(&mut self, parent: Option<NodeId>) -> NodeId {
        let id = self.node_count;
        self.node_count += 1;
        self.parent_of.insert(id, parent);
        id
    }

    fn populate(&mut self, node: &JsonNode, node_id: NodeId) -> Result<(), String> {
        for child in &node.children {
            let child_id = self.new_node(Some(node_id));
            self.populate(child, child_id)?;
        }
        for mutation_id in node.mutation_ids() {
            if let Some(previous) = self.mutation_to_node.insert(mutation_id, node_id) {
                return Err(format!(
                    "mutation {mutation_id} is attached to nodes {previous} and {node_id}"
                ));
            }
            self.mutation_count = self.mutation_count.max(mutation_id + 1);
        }
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn mutation_count(&self) -> u64 {
        self.mutation_count
    }

    pub fn node_of(&self, mutation: MutationId) -> Option<NodeId> {
        self.mutation_to_node.get(&mutation).copied()
    }

    pub fn parent_of(&self, node: NodeId) -> Option<NodeId> {
        self.parent_of.get(&node).copied().flatten()
    }

    /// Fails with a description of the first attribute on which the trees disagree.
    pub fn check_consistent_with(&self, other: &MutationTree) -> AppResult<()> {
        if self.mutation_to_node != other.mutation_to_node {
            let diverging = self
                .mutation_to_node
                .iter()
                .find(|(id, node)| other.mutation_to_node.get(id) != Some(node))
                .map(|(id, _)| *id)
                .or_else(|| {
                    other
                        .mutation_to_node
                        .keys()
                        .find(|id| !self.mutation_to_node.contains_key(id))
                        .copied()
                });
            return Err(AppError::InconsistentMutationTrees(match diverging {
                Some(id) => format!("mutation {id} is attached to different nodes"),
                None => "mutation-to-node maps differ".to_string(),
            }));
        }
        if self.parent_of != other.parent_of {
            return Err(AppError::InconsistentMutationTrees(
                "node parent maps differ".to_string(),
            ));
        }
        if self.node_count != other.node_count {
            return Err(AppError::InconsistentMutationTrees(format!(
                "{} nodes vs {} nodes",
                self.node_count, other.node_count
            )));
        }
        if self.mutation_count != other.mutation_count {
            return Err(AppError::InconsistentMutationTrees(format!(
                "{} mutations vs {} mutations",
                self.mutation_count, other.mutation_count
            )));
        }
        Ok(())
    }
}
