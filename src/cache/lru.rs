//! LRU List Module
//!
//! Index-based doubly linked recency order over the cache's entry slots.

// == Link ==
#[derive(Debug, Clone, Copy, Default)]
struct Link {
    /// Neighbour closer to the head (more recently used)
    prev: Option<usize>,
    /// Neighbour closer to the tail (less recently used)
    next: Option<usize>,
}

// == LRU List ==
/// Tracks access order for LRU eviction over slot indices.
///
/// Slots are linked through explicit prev/next indices where:
/// - Head = Most recently used
/// - Tail = Least recently used
///
/// Every operation is O(1); nothing here owns entry data, so unlinking a slot
/// while walking the list never invalidates the walk.
#[derive(Debug, Default)]
pub struct LruList {
    /// Per-slot links, `None` when the slot is not in the list
    links: Vec<Option<Link>>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl LruList {
    // == Constructor ==
    /// Creates a new empty LRU list.
    pub fn new() -> Self {
        Self::default()
    }

    // == Push Front ==
    /// Links a slot at the most recently used position.
    ///
    /// If the slot is already linked it is moved instead.
    pub fn push_front(&mut self, slot: usize) {
        if self.contains(slot) {
            self.touch(slot);
            return;
        }
        if slot >= self.links.len() {
            self.links.resize(slot + 1, None);
        }

        self.links[slot] = Some(Link {
            prev: None,
            next: self.head,
        });
        if let Some(old_head) = self.head {
            self.link_mut(old_head).prev = Some(slot);
        }
        self.head = Some(slot);
        if self.tail.is_none() {
            self.tail = Some(slot);
        }
        self.len += 1;
    }

    // == Touch ==
    /// Marks a slot as recently used (moves to head).
    ///
    /// Unlinked slots are ignored.
    pub fn touch(&mut self, slot: usize) {
        if !self.contains(slot) || self.head == Some(slot) {
            return;
        }
        self.remove(slot);
        self.push_front(slot);
    }

    // == Remove ==
    /// Unlinks a slot from the list. Returns false if it was not linked.
    pub fn remove(&mut self, slot: usize) -> bool {
        let Some(link) = self.links.get_mut(slot).and_then(Option::take) else {
            return false;
        };

        match link.prev {
            Some(prev) => self.link_mut(prev).next = link.next,
            None => self.head = link.next,
        }
        match link.next {
            Some(next) => self.link_mut(next).prev = link.prev,
            None => self.tail = link.prev,
        }
        self.len -= 1;
        true
    }

    // == Peek Oldest ==
    /// Returns the least recently used slot without removing it.
    pub fn peek_oldest(&self) -> Option<usize> {
        self.tail
    }

    // == Newer ==
    /// Returns the slot one step closer to the head, used to walk the list
    /// from the tail during eviction.
    pub fn newer(&self, slot: usize) -> Option<usize> {
        self.links.get(slot).copied().flatten().and_then(|l| l.prev)
    }

    // == Length ==
    /// Returns the number of linked slots.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    // == Contains ==
    /// Checks if a slot is linked.
    pub fn contains(&self, slot: usize) -> bool {
        matches!(self.links.get(slot), Some(Some(_)))
    }

    // == Iterate ==
    /// Iterates slots from least to most recently used.
    pub fn iter_oldest_first(&self) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(self.tail, move |&slot| self.newer(slot))
    }

    fn link_mut(&mut self, slot: usize) -> &mut Link {
        self.links[slot]
            .as_mut()
            .expect("linked neighbour must have a link")
    }
}
