//! Arena-allocated prefix tree.
//!
//! Generic ordered-map trie used in two unrelated roles: the query-count
//! trie behind the most-popular-completion engine, and the live-beam
//! frontier of the beam search (keyed by emitted label sequence, valued
//! by the beam state). Nodes live in a flat arena and reference each
//! other by index, with explicit parent ids; erasing a leaf only clears
//! its value and the subtree leaf counts, so node ids stay valid.

use std::collections::BTreeMap;

/// Index of a node in the tree arena.
pub type NodeId = usize;

#[derive(Debug)]
struct Node<K, V> {
    parent: Option<NodeId>,
    key: Option<K>,
    children: BTreeMap<K, NodeId>,
    data: Option<V>,
    num_leafs: usize,
    depth: usize,
}

/// An ordered prefix tree with per-subtree leaf counts.
#[derive(Debug)]
pub struct PrefixTree<K, V> {
    nodes: Vec<Node<K, V>>,
}

impl<K: Ord + Clone, V> Default for PrefixTree<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Clone, V> PrefixTree<K, V> {
    /// Create a tree holding only the root.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                key: None,
                children: BTreeMap::new(),
                data: None,
                num_leafs: 0,
                depth: 0,
            }],
        }
    }

    /// The root node id.
    pub fn root(&self) -> NodeId {
        0
    }

    /// Number of leaves (nodes carrying a value) in the tree.
    pub fn len(&self) -> usize {
        self.nodes[0].num_leafs
    }

    /// Whether the tree has no leaves.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The value at `node`, if it is a leaf.
    pub fn data(&self, node: NodeId) -> Option<&V> {
        self.nodes[node].data.as_ref()
    }

    /// Mutable access to the value at `node`.
    pub fn data_mut(&mut self, node: NodeId) -> Option<&mut V> {
        self.nodes[node].data.as_mut()
    }

    /// Number of keys on the path from the root to `node`.
    pub fn depth(&self, node: NodeId) -> usize {
        self.nodes[node].depth
    }

    /// Children of `node` in ascending key order.
    pub fn children(&self, node: NodeId) -> impl Iterator<Item = (&K, NodeId)> {
        self.nodes[node].children.iter().map(|(k, &id)| (k, id))
    }

    /// Reconstruct the key sequence from the root to `node`.
    pub fn prefix(&self, node: NodeId) -> Vec<K> {
        let mut keys = Vec::with_capacity(self.nodes[node].depth);
        let mut current = node;
        while let Some(parent) = self.nodes[current].parent {
            keys.push(self.nodes[current].key.clone().expect("non-root node has a key"));
            current = parent;
        }
        keys.reverse();
        keys
    }

    /// Locate the node at `keys` relative to `from`, without creating.
    fn descend(&self, from: NodeId, keys: &[K]) -> Option<NodeId> {
        let mut node = from;
        for key in keys {
            node = *self.nodes[node].children.get(key)?;
        }
        Some(node)
    }

    /// Locate the node at `keys` relative to `from`, creating as needed.
    fn descend_or_create(&mut self, from: NodeId, keys: &[K]) -> NodeId {
        let mut node = from;
        for key in keys {
            if let Some(&child) = self.nodes[node].children.get(key) {
                node = child;
            } else {
                let child = self.nodes.len();
                let depth = self.nodes[node].depth + 1;
                self.nodes.push(Node {
                    parent: Some(node),
                    key: Some(key.clone()),
                    children: BTreeMap::new(),
                    data: None,
                    num_leafs: 0,
                    depth,
                });
                self.nodes[node].children.insert(key.clone(), child);
                node = child;
            }
        }
        node
    }

    fn bump_leaf_counts(&mut self, mut node: NodeId, delta: isize) {
        loop {
            let count = &mut self.nodes[node].num_leafs;
            *count = count.checked_add_signed(delta).expect("leaf count underflow");
            match self.nodes[node].parent {
                Some(parent) => node = parent,
                None => break,
            }
        }
    }

    /// Insert `value` at `keys` below the root. Returns `false` if a
    /// value is already present there.
    pub fn insert(&mut self, keys: &[K], value: V) -> bool {
        self.insert_at(self.root(), keys, value)
    }

    /// Insert `value` at `keys` relative to `node`.
    pub fn insert_at(&mut self, node: NodeId, keys: &[K], value: V) -> bool {
        let target = self.descend_or_create(node, keys);
        if self.nodes[target].data.is_some() {
            return false;
        }
        self.nodes[target].data = Some(value);
        self.bump_leaf_counts(target, 1);
        true
    }

    /// Insert `value` at `keys`, or merge it into the existing value.
    pub fn upsert<F>(&mut self, keys: &[K], value: V, merge: F)
    where
        F: FnOnce(&mut V, V),
    {
        let target = self.descend_or_create(self.root(), keys);
        match &mut self.nodes[target].data {
            Some(existing) => merge(existing, value),
            slot @ None => {
                *slot = Some(value);
                self.bump_leaf_counts(target, 1);
            }
        }
    }

    /// Remove the value at `node`. The node id remains valid; only the
    /// value and the subtree leaf counts change.
    pub fn erase(&mut self, node: NodeId) {
        assert!(self.nodes[node].data.is_some(), "not a leaf");
        self.nodes[node].data = None;
        self.bump_leaf_counts(node, -1);
    }

    /// Find the node at `keys` below the root, if present.
    pub fn find(&self, keys: &[K]) -> Option<NodeId> {
        self.descend(self.root(), keys)
    }

    /// All leaves reachable under `keys`, in breadth-first order.
    pub fn find_all(&self, keys: &[K]) -> Vec<NodeId> {
        if self.is_empty() {
            return Vec::new();
        }
        let Some(start) = self.find(keys) else {
            return Vec::new();
        };

        let mut leafs = Vec::new();
        let mut queue = std::collections::VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            if self.nodes[node].data.is_some() {
                leafs.push(node);
            }
            for (_, child) in self.nodes[node].children.iter() {
                if self.nodes[*child].num_leafs > 0 {
                    queue.push_back(*child);
                }
            }
        }
        leafs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_find_all() {
        let mut tree: PrefixTree<u8, u32> = PrefixTree::new();
        assert!(tree.insert(b"cat", 1));
        assert!(tree.insert(b"car", 2));
        assert!(tree.insert(b"dog", 3));
        assert!(!tree.insert(b"cat", 9));
        assert_eq!(tree.len(), 3);

        let under_ca = tree.find_all(b"ca");
        let values: Vec<u32> = under_ca.iter().map(|&n| *tree.data(n).unwrap()).collect();
        assert_eq!(values.len(), 2);
        assert!(values.contains(&1) && values.contains(&2));
        assert!(tree.find_all(b"x").is_empty());
    }

    #[test]
    fn prefix_reconstruction_and_depth() {
        let mut tree: PrefixTree<u8, ()> = PrefixTree::new();
        tree.insert(b"abc", ());
        let leaf = tree.find(b"abc").unwrap();
        assert_eq!(tree.prefix(leaf), b"abc".to_vec());
        assert_eq!(tree.depth(leaf), 3);
    }

    #[test]
    fn erase_decrements_counts() {
        let mut tree: PrefixTree<u8, ()> = PrefixTree::new();
        tree.insert(b"ab", ());
        tree.insert(b"ac", ());
        let ab = tree.find(b"ab").unwrap();
        tree.erase(ab);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.find_all(b"a").len(), 1);
        // the erased path can be reused
        assert!(tree.insert(b"ab", ()));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn relative_insert_extends_a_leaf() {
        let mut tree: PrefixTree<u8, u32> = PrefixTree::new();
        tree.insert(b"ab", 1);
        let leaf = tree.find(b"ab").unwrap();
        assert!(tree.insert_at(leaf, b"c", 2));
        let abc = tree.find(b"abc").unwrap();
        assert_eq!(tree.data(abc), Some(&2));
        assert_eq!(tree.depth(abc), 3);
    }

    #[test]
    fn upsert_merges_counts() {
        let mut tree: PrefixTree<u8, u64> = PrefixTree::new();
        tree.upsert(b"cat", 1, |a, b| *a += b);
        tree.upsert(b"cat", 2, |a, b| *a += b);
        assert_eq!(tree.data(tree.find(b"cat").unwrap()), Some(&3));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn children_are_ordered() {
        let mut tree: PrefixTree<u8, ()> = PrefixTree::new();
        tree.insert(b"b", ());
        tree.insert(b"a", ());
        tree.insert(b"c", ());
        let keys: Vec<u8> = tree.children(tree.root()).map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![b'a', b'b', b'c']);
    }
}
