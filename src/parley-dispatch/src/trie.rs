//! Multi-path command trie.
//!
//! Every command is stored under each of its name paths. Nodes live in an
//! arena so that each can point back at its parent; removal prunes nodes left
//! with neither items nor edges, all the way up to (not including) the root.
//!
//! The trie does no locking of its own. Callers serialize mutations; iteration
//! that may interleave with mutations goes through [`TrieCursor`], which fails
//! instead of skipping or repeating items.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use slotmap::{SlotMap, new_key_type};
use tracing::trace;

use crate::command::{Command, CommandId};
use crate::config::NameComparer;
use crate::error::TrieError;

new_key_type! {
    /// Handle to a trie node.
    pub struct NodeKey;
}

#[derive(Debug, Default)]
struct TrieNode {
    segment: String,
    parent: Option<NodeKey>,
    items: IndexMap<CommandId, Arc<Command>>,
    edges: HashMap<String, NodeKey>,
}

impl TrieNode {
    fn is_dead(&self) -> bool {
        self.items.is_empty() && self.edges.is_empty()
    }
}

/// Registry of commands indexed by name path.
#[derive(Debug)]
pub struct CommandTrie {
    comparer: NameComparer,
    nodes: SlotMap<NodeKey, TrieNode>,
    root: NodeKey,
    members: IndexMap<CommandId, Arc<Command>>,
    version: u64,
}

impl Default for CommandTrie {
    fn default() -> Self {
        Self::new(NameComparer::default())
    }
}

impl CommandTrie {
    /// Create an empty trie comparing segments with `comparer`.
    pub fn new(comparer: NameComparer) -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(TrieNode::default());
        Self {
            comparer,
            nodes,
            root,
            members: IndexMap::new(),
            version: 0,
        }
    }

    pub fn root(&self) -> NodeKey {
        self.root
    }

    /// Number of distinct commands.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Number of live nodes, including the root.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Counter bumped by every structural mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn contains(&self, id: CommandId) -> bool {
        self.members.contains_key(&id)
    }

    pub fn get(&self, id: CommandId) -> Option<&Arc<Command>> {
        self.members.get(&id)
    }

    /// Position of a command in registration order.
    pub fn position(&self, id: CommandId) -> Option<usize> {
        self.members.get_index_of(&id)
    }

    /// Insert `command` under every one of its paths.
    ///
    /// Returns `false` without touching anything if it is already a member.
    pub fn insert(&mut self, command: Arc<Command>) -> bool {
        let id = command.id();
        if self.members.contains_key(&id) {
            return false;
        }

        for path in command.name_paths() {
            let mut node = self.root;
            for segment in path.segments() {
                node = self.child_or_insert(node, segment);
            }
            if let Some(terminal) = self.nodes.get_mut(node) {
                terminal.items.insert(id, Arc::clone(&command));
            }
        }

        trace!("Inserted command {} ({})", command.name(), id);
        self.members.insert(id, command);
        self.version += 1;
        true
    }

    /// Remove `command` from every one of its paths.
    ///
    /// Returns `false` without touching anything if it is not a member.
    pub fn remove(&mut self, command: &Command) -> bool {
        let id = command.id();
        if self.members.shift_remove(&id).is_none() {
            return false;
        }

        for path in command.name_paths() {
            let Some(node) = self.descend(path.segments()) else {
                continue;
            };
            if let Some(terminal) = self.nodes.get_mut(node) {
                terminal.items.shift_remove(&id);
            }
            self.prune(node);
        }

        trace!("Removed command {} ({})", command.name(), id);
        self.version += 1;
        true
    }

    /// Follow `path` from the root.
    pub fn descend<S: AsRef<str>>(&self, path: &[S]) -> Option<NodeKey> {
        path.iter()
            .try_fold(self.root, |node, segment| self.child(node, segment.as_ref()))
    }

    /// Follow a single edge.
    pub fn child(&self, node: NodeKey, segment: &str) -> Option<NodeKey> {
        let key = self.comparer.normalize(segment);
        self.nodes.get(node)?.edges.get(key.as_ref()).copied()
    }

    /// Commands stored exactly at `node`, in insertion order.
    pub fn items(&self, node: NodeKey) -> impl Iterator<Item = &Arc<Command>> {
        self.nodes
            .get(node)
            .into_iter()
            .flat_map(|n| n.items.values())
    }

    /// Edge labels leaving `node` with their targets.
    pub fn edges(&self, node: NodeKey) -> impl Iterator<Item = (&str, NodeKey)> {
        self.nodes
            .get(node)
            .into_iter()
            .flat_map(|n| n.edges.iter().map(|(label, &key)| (label.as_str(), key)))
    }

    /// Commands at `node` followed, when `recursive`, by those of every
    /// sub-tree. A command reachable through several paths appears once.
    pub fn collect(&self, node: NodeKey, recursive: bool) -> Vec<Arc<Command>> {
        let mut found: IndexMap<CommandId, Arc<Command>> = IndexMap::new();
        let mut stack = vec![node];
        while let Some(key) = stack.pop() {
            let Some(current) = self.nodes.get(key) else {
                continue;
            };
            for (id, command) in &current.items {
                found.entry(*id).or_insert_with(|| Arc::clone(command));
            }
            if recursive {
                let mut children: Vec<(&String, &NodeKey)> = current.edges.iter().collect();
                children.sort_unstable_by(|a, b| b.0.cmp(a.0));
                stack.extend(children.into_iter().map(|(_, &child)| child));
            }
        }
        found.into_values().collect()
    }

    /// All members in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Command>> {
        self.members.values()
    }

    /// Detached iterator over the members that detects interleaved mutation.
    pub fn cursor(&self) -> TrieCursor {
        TrieCursor {
            version: self.version,
            position: 0,
        }
    }

    fn child_or_insert(&mut self, node: NodeKey, segment: &str) -> NodeKey {
        let key = self.comparer.normalize(segment).into_owned();
        if let Some(existing) = self.nodes.get(node).and_then(|n| n.edges.get(&key)) {
            return *existing;
        }

        let child = self.nodes.insert(TrieNode {
            segment: key.clone(),
            parent: Some(node),
            ..Default::default()
        });
        if let Some(parent) = self.nodes.get_mut(node) {
            parent.edges.insert(key, child);
        }
        child
    }

    fn prune(&mut self, mut node: NodeKey) {
        while node != self.root {
            let Some(current) = self.nodes.get(node) else {
                return;
            };
            if !current.is_dead() {
                return;
            }
            let parent = current.parent;
            let segment = current.segment.clone();
            self.nodes.remove(node);

            let Some(parent) = parent else {
                return;
            };
            if let Some(parent_node) = self.nodes.get_mut(parent) {
                parent_node.edges.remove(&segment);
            }
            node = parent;
        }
    }

    #[cfg(test)]
    fn dead_nodes(&self) -> usize {
        self.nodes
            .iter()
            .filter(|(key, node)| *key != self.root && node.is_dead())
            .count()
    }
}

/// Fail-fast cursor over a trie's members.
///
/// Holds no borrow, so a caller can release its lock between steps. Any
/// mutation after the cursor was created makes every later step fail with
/// [`TrieError::ConcurrentModification`].
#[derive(Debug, Clone)]
pub struct TrieCursor {
    version: u64,
    position: usize,
}

impl TrieCursor {
    /// Advance, returning `None` once every member has been seen.
    pub fn next(&mut self, trie: &CommandTrie) -> Option<Result<Arc<Command>, TrieError>> {
        if trie.version != self.version {
            return Some(Err(TrieError::ConcurrentModification {
                expected: self.version,
                found: trie.version,
            }));
        }
        let (_, command) = trie.members.get_index(self.position)?;
        self.position += 1;
        Some(Ok(Arc::clone(command)))
    }
}
