//! Node pool and open list for the polygon graph search
//!
//! Nodes are addressed by index into the pool, the queue stores indices and reads the
//! costs from the pool, so neither holds references into the other.

use glam::Vec3;

use crate::PolyRef;

/// Search state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeFlags(u8);

impl NodeFlags {
    pub const OPEN: NodeFlags = NodeFlags(0x01);
    pub const CLOSED: NodeFlags = NodeFlags(0x02);

    pub fn contains(&self, flag: NodeFlags) -> bool {
        self.0 & flag.0 != 0
    }

    pub fn insert(&mut self, flag: NodeFlags) {
        self.0 |= flag.0;
    }

    pub fn remove(&mut self, flag: NodeFlags) {
        self.0 &= !flag.0;
    }
}

pub type NodeIndex = u16;

pub const NULL_IDX: NodeIndex = NodeIndex::MAX;

/// Node of the polygon graph search
#[derive(Debug, Clone)]
pub struct Node {
    /// Point where the path enters the polygon
    pub pos: Vec3,
    /// Cost from the start to this node
    pub cost: f32,
    /// Cost plus the heuristic
    pub total: f32,
    pub parent: NodeIndex,
    pub flags: NodeFlags,
    pub id: PolyRef,
}

impl Node {
    fn new(id: PolyRef) -> Self {
        Self {
            pos: Vec3::ZERO,
            cost: 0.0,
            total: 0.0,
            parent: NULL_IDX,
            flags: NodeFlags::default(),
            id,
        }
    }
}

/// Fixed capacity node storage with a hash lookup by polygon
#[derive(Debug)]
pub struct NodePool {
    nodes: Vec<Node>,
    first: Vec<NodeIndex>,
    next: Vec<NodeIndex>,
    max_nodes: usize,
    hash_size: usize,
}

impl NodePool {
    /// `hash_size` must be a power of two
    pub fn new(max_nodes: usize, hash_size: usize) -> Self {
        let max_nodes = max_nodes.min(NULL_IDX as usize);
        Self {
            nodes: Vec::with_capacity(max_nodes),
            first: vec![NULL_IDX; hash_size],
            next: Vec::with_capacity(max_nodes),
            max_nodes,
            hash_size,
        }
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.next.clear();
        self.first.fill(NULL_IDX);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn max_nodes(&self) -> usize {
        self.max_nodes
    }

    /// Index of the node for `id`, allocating it if needed
    ///
    /// Returns `None` once the pool is full.
    pub fn get_node(&mut self, id: PolyRef) -> Option<NodeIndex> {
        if let Some(idx) = self.find_node(id) {
            return Some(idx);
        }
        if self.nodes.len() >= self.max_nodes {
            return None;
        }
        let idx = self.nodes.len() as NodeIndex;
        let bucket = self.bucket(id);
        self.nodes.push(Node::new(id));
        self.next.push(self.first[bucket]);
        self.first[bucket] = idx;
        Some(idx)
    }

    pub fn find_node(&self, id: PolyRef) -> Option<NodeIndex> {
        let mut idx = self.first[self.bucket(id)];
        while idx != NULL_IDX {
            if self.nodes[idx as usize].id == id {
                return Some(idx);
            }
            idx = self.next[idx as usize];
        }
        None
    }

    pub fn node(&self, idx: NodeIndex) -> &Node {
        &self.nodes[idx as usize]
    }

    pub fn node_mut(&mut self, idx: NodeIndex) -> &mut Node {
        &mut self.nodes[idx as usize]
    }

    fn bucket(&self, id: PolyRef) -> usize {
        let mut a = id.id();
        a = a.wrapping_add(!(a << 15));
        a ^= a >> 10;
        a = a.wrapping_add(a << 3);
        a ^= a >> 6;
        a = a.wrapping_add(!(a << 11));
        a ^= a >> 16;
        a as usize & (self.hash_size - 1)
    }
}

/// Binary min-heap of node indices ordered by total cost
#[derive(Debug, Default)]
pub struct NodeQueue {
    heap: Vec<NodeIndex>,
}

impl NodeQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: Vec::with_capacity(capacity),
        }
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn push(&mut self, pool: &NodePool, idx: NodeIndex) {
        self.heap.push(idx);
        self.bubble_up(pool, self.heap.len() - 1);
    }

    pub fn pop(&mut self, pool: &NodePool) -> Option<NodeIndex> {
        if self.heap.is_empty() {
            return None;
        }
        let top = self.heap.swap_remove(0);
        if !self.heap.is_empty() {
            self.trickle_down(pool, 0);
        }
        Some(top)
    }

    /// Restores the heap after the total of `idx` decreased
    pub fn modify(&mut self, pool: &NodePool, idx: NodeIndex) {
        if let Some(i) = self.heap.iter().position(|&n| n == idx) {
            self.bubble_up(pool, i);
        }
    }

    fn bubble_up(&mut self, pool: &NodePool, mut i: usize) {
        let total = pool.node(self.heap[i]).total;
        while i > 0 {
            let parent = (i - 1) / 2;
            if pool.node(self.heap[parent]).total <= total {
                break;
            }
            self.heap.swap(i, parent);
            i = parent;
        }
    }

    fn trickle_down(&mut self, pool: &NodePool, mut i: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * i + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let child = if right < len
                && pool.node(self.heap[right]).total < pool.node(self.heap[left]).total
            {
                right
            } else {
                left
            };
            if pool.node(self.heap[i]).total <= pool.node(self.heap[child]).total {
                break;
            }
            self.heap.swap(i, child);
            i = child;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_pool() {
        let mut pool = NodePool::new(16, 8);

        let a = pool.get_node(PolyRef::new(1)).unwrap();
        assert_eq!(pool.node(a).id, PolyRef::new(1));
        assert_eq!(pool.get_node(PolyRef::new(1)), Some(a));
        assert_eq!(pool.find_node(PolyRef::new(1)), Some(a));
        assert_eq!(pool.find_node(PolyRef::new(2)), None);

        pool.clear();
        assert_eq!(pool.node_count(), 0);
        assert_eq!(pool.find_node(PolyRef::new(1)), None);
    }

    #[test]
    fn test_node_pool_capacity() {
        let mut pool = NodePool::new(3, 4);
        for i in 1..=3 {
            assert!(pool.get_node(PolyRef::new(i)).is_some());
        }
        assert!(pool.get_node(PolyRef::new(4)).is_none());
        // Existing nodes still resolve when full.
        assert!(pool.get_node(PolyRef::new(2)).is_some());
    }

    #[test]
    fn test_node_queue() {
        let mut pool = NodePool::new(16, 8);
        let mut queue = NodeQueue::new(16);

        for (id, total) in [(1, 5.0), (2, 3.0), (3, 7.0), (4, 1.0)] {
            let idx = pool.get_node(PolyRef::new(id)).unwrap();
            pool.node_mut(idx).total = total;
            queue.push(&pool, idx);
        }

        // Lower the cost of node 3 below everything else.
        let three = pool.find_node(PolyRef::new(3)).unwrap();
        pool.node_mut(three).total = 0.5;
        queue.modify(&pool, three);

        let order: Vec<u32> = std::iter::from_fn(|| queue.pop(&pool))
            .map(|idx| pool.node(idx).id.id())
            .collect();
        assert_eq!(order, vec![3, 4, 2, 1]);
        assert!(queue.is_empty());
    }
}
