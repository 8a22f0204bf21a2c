//! Repair permission graph
//!
//! Mirrors the exploded element tree. A body may only be dragged home once
//! its element's parent is back in place, so repairs propagate top-down.
//! Invisible wrapper elements never become bodies; permission passes straight
//! through them to their children.

use std::collections::HashMap;

use super::body::BodyId;
use crate::platform::ElementId;

/// Where a source element stands in the repair process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Replaced by a body (or just hidden)
    Hidden,
    /// Transparent wrapper, hidden without a body
    SkipMarked,
    /// Back in place
    Repaired,
}

/// What the explosion did with an element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// Became this body
    Physical(BodyId),
    /// Transparent container, its children explode instead
    Skip,
    /// Left alone (too small, or its visual could not be made). Relays
    /// permission like a wrapper so its children are not stranded.
    Inert,
}

impl NodeRole {
    /// Passes repair permission straight through to its children
    #[inline]
    pub fn relays(&self) -> bool {
        !matches!(self, NodeRole::Physical(_))
    }
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<ElementId>,
    children: Vec<ElementId>,
    role: NodeRole,
    state: NodeState,
    repairable: bool,
}

impl Node {
    fn new(parent: Option<ElementId>, role: NodeRole, state: NodeState) -> Self {
        Self {
            parent,
            children: Vec::new(),
            role,
            state,
            repairable: false,
        }
    }
}

/// Per-session repair state, keyed by source element
#[derive(Debug, Clone)]
pub struct RepairGraph {
    root: ElementId,
    nodes: HashMap<ElementId, Node>,
}

impl RepairGraph {
    /// Graph holding only the explosion root, which counts as repaired
    pub fn new(root: ElementId) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(root, Node::new(None, NodeRole::Inert, NodeState::Repaired));
        Self { root, nodes }
    }

    pub fn root(&self) -> ElementId {
        self.root
    }

    /// Record an element under `parent`. Parents must be inserted first.
    pub fn insert(&mut self, id: ElementId, parent: ElementId, role: NodeRole) {
        let state = match role {
            NodeRole::Skip => NodeState::SkipMarked,
            _ => NodeState::Hidden,
        };
        self.nodes.insert(id, Node::new(Some(parent), role, state));
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.push(id);
        }
    }

    pub fn state(&self, id: ElementId) -> Option<NodeState> {
        self.nodes.get(&id).map(|n| n.state)
    }

    pub fn is_repairable(&self, id: ElementId) -> bool {
        self.nodes.get(&id).is_some_and(|n| n.repairable)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Number of elements in `state`
    pub fn count(&self, state: NodeState) -> usize {
        self.nodes.values().filter(|n| n.state == state).count()
    }

    /// One-time pass after every element is recorded.
    ///
    /// Chains of wrappers hanging off the root are treated as repaired, then
    /// every body whose parent element is repaired gets permission. Returns
    /// those bodies.
    pub fn bootstrap(&mut self) -> Vec<BodyId> {
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let children = match self.nodes.get(&id) {
                Some(n) if n.state == NodeState::Repaired => n.children.clone(),
                _ => continue,
            };
            for child in children {
                if let Some(node) = self.nodes.get_mut(&child) {
                    if node.role.relays() {
                        node.state = NodeState::Repaired;
                        stack.push(child);
                    }
                }
            }
        }

        let mut allowed = Vec::new();
        let ids: Vec<ElementId> = self.nodes.keys().copied().collect();
        for id in ids {
            let parent_repaired = self
                .nodes
                .get(&id)
                .and_then(|n| n.parent)
                .and_then(|p| self.state(p))
                == Some(NodeState::Repaired);
            if !parent_repaired {
                continue;
            }
            if let Some(node) = self.nodes.get_mut(&id) {
                node.repairable = true;
                if let NodeRole::Physical(body) = node.role {
                    allowed.push(body);
                }
            }
        }
        allowed.sort();
        allowed
    }

    /// Put `id` back in place and pass permission to its children, through
    /// any wrappers. Returns bodies that may now be repaired.
    pub fn repair(&mut self, id: ElementId) -> Vec<BodyId> {
        let mut allowed = Vec::new();
        let mut stack = vec![id];

        while let Some(next) = stack.pop() {
            let children = match self.nodes.get_mut(&next) {
                Some(node) => {
                    node.state = NodeState::Repaired;
                    node.children.clone()
                }
                None => continue,
            };
            for child in children {
                let Some(node) = self.nodes.get_mut(&child) else {
                    continue;
                };
                node.repairable = true;
                match node.role {
                    NodeRole::Physical(body) => allowed.push(body),
                    NodeRole::Skip | NodeRole::Inert => stack.push(child),
                }
            }
        }

        log::debug!("repaired {}: {} bodies now repairable", id, allowed.len());
        allowed
    }
}
