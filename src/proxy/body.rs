//! Response Buffer
//!
//! Accumulates a copy of the upstream response as it streams to the client,
//! up to the per-object limit.

// == Response Buffer ==
/// Bounded copy of a response, kept as a cache candidate.
#[derive(Debug)]
pub struct ResponseBuffer {
    data: Vec<u8>,
    limit: usize,
    /// Bytes seen, including any past the limit
    total: usize,
    oversized: bool,
}

impl ResponseBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            data: Vec::new(),
            limit,
            total: 0,
            oversized: false,
        }
    }

    // == Push ==
    /// Appends a chunk. Once the total passes the limit the copy is dropped
    /// and further chunks are only counted.
    pub fn push(&mut self, chunk: &[u8]) {
        self.total += chunk.len();
        if self.oversized {
            return;
        }
        if self.total > self.limit {
            self.oversized = true;
            self.data = Vec::new();
            return;
        }
        self.data.extend_from_slice(chunk);
    }

    pub fn is_oversized(&self) -> bool {
        self.oversized
    }

    /// Total bytes pushed.
    pub fn total(&self) -> usize {
        self.total
    }

    /// The complete response, or `None` if it outgrew the limit.
    pub fn into_body(self) -> Option<Vec<u8>> {
        (!self.oversized).then_some(self.data)
    }
}
