//! Index-addressed doubly linked recency list.
//!
//! Nodes live in a slot arena and link to each other by slot index, so
//! move-to-front and removal are O(1) and never touch the owning map.
//! The front is the most recently used entry, the back the least.

/// Handle to a node in a [`RecencyList`]. Valid until the node is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle(usize);

#[derive(Debug)]
struct Node<T> {
    value: T,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug)]
pub struct RecencyList<T> {
    slots: Vec<Option<Node<T>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<T> Default for RecencyList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RecencyList<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a value at the most-recent end.
    pub fn push_front(&mut self, value: T) -> NodeHandle {
        let node = Node {
            value,
            prev: None,
            next: self.head,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };

        match self.head {
            Some(old_head) => self.node_mut(old_head).prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
        self.len += 1;
        NodeHandle(idx)
    }

    /// Move an existing node to the most-recent end. Stale handles are ignored.
    pub fn move_to_front(&mut self, handle: NodeHandle) {
        if !self.contains(handle) || self.head == Some(handle.0) {
            return;
        }
        self.unlink(handle.0);
        let idx = handle.0;
        let old_head = self.head;
        {
            let node = self.node_mut(idx);
            node.prev = None;
            node.next = old_head;
        }
        match old_head {
            Some(h) => self.node_mut(h).prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }

    /// Remove a node and return its value.
    pub fn remove(&mut self, handle: NodeHandle) -> Option<T> {
        if !self.contains(handle) {
            return None;
        }
        self.unlink(handle.0);
        let node = self.slots[handle.0].take()?;
        self.free.push(handle.0);
        self.len -= 1;
        Some(node.value)
    }

    pub fn get(&self, handle: NodeHandle) -> Option<&T> {
        self.slots.get(handle.0)?.as_ref().map(|n| &n.value)
    }

    pub fn get_mut(&mut self, handle: NodeHandle) -> Option<&mut T> {
        self.slots.get_mut(handle.0)?.as_mut().map(|n| &mut n.value)
    }

    /// The least recently used entry.
    pub fn back(&self) -> Option<(NodeHandle, &T)> {
        let idx = self.tail?;
        self.slots[idx].as_ref().map(|n| (NodeHandle(idx), &n.value))
    }

    /// Iterate from most to least recent.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    fn contains(&self, handle: NodeHandle) -> bool {
        matches!(self.slots.get(handle.0), Some(Some(_)))
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node<T> {
        self.slots[idx]
            .as_mut()
            .expect("recency list link points at an empty slot")
    }

    /// Detach a node from its neighbours, fixing head/tail. Leaves the slot occupied.
    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.node_mut(idx);
            (node.prev.take(), node.next.take())
        };
        match prev {
            Some(p) => self.node_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev = prev,
            None => self.tail = prev,
        }
    }
}

pub struct Iter<'a, T> {
    list: &'a RecencyList<T>,
    cursor: Option<usize>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cursor?;
        let node = self.list.slots[idx].as_ref()?;
        self.cursor = node.next;
        Some(&node.value)
    }
}
