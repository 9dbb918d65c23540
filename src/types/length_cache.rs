//! Per-write-cycle memo of variable payload lengths.
//!
//! A two-pass writer first probes every value with `validate_and_get_length`,
//! which appends each variable length with [`LengthCache::set`]. After
//! [`LengthCache::rewind`] the write pass replays them in the same order with
//! [`LengthCache::get`] instead of re-encoding.

#[derive(Debug, Clone, Default)]
pub struct LengthCache {
    lengths: Vec<usize>,
    position: usize,
    populated: bool,
}

impl LengthCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once a probe pass has completed and been rewound.
    pub fn is_populated(&self) -> bool {
        self.populated
    }

    /// Record a computed length and return it.
    pub fn set(&mut self, len: usize) -> usize {
        self.lengths.push(len);
        self.position += 1;
        len
    }

    /// Next recorded length, or `None` when the probe pass recorded fewer.
    pub fn get(&mut self) -> Option<usize> {
        let len = self.lengths.get(self.position).copied()?;
        self.position += 1;
        Some(len)
    }

    /// Replay the next recorded length if populated, otherwise compute and record it.
    pub fn get_or_insert_with(&mut self, compute: impl FnOnce() -> usize) -> usize {
        if self.populated {
            if let Some(len) = self.get() {
                return len;
            }
        }
        self.set(compute())
    }

    /// Append a zero entry to be filled once nested lengths are known.
    /// Containers record their own length ahead of their elements so the
    /// write pass replays them in write order.
    pub fn placeholder(&mut self) -> usize {
        self.set(0);
        self.lengths.len() - 1
    }

    pub fn fill(&mut self, slot: usize, len: usize) -> usize {
        self.lengths[slot] = len;
        len
    }

    /// Start replaying from the first recorded length.
    pub fn rewind(&mut self) {
        self.position = 0;
        self.populated = true;
    }

    /// Forget everything. Only the owner of the write cycle calls this.
    pub fn clear(&mut self) {
        self.lengths.clear();
        self.position = 0;
        self.populated = false;
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_then_replay() {
        let mut cache = LengthCache::new();
        assert_eq!(cache.set(5), 5);
        assert_eq!(cache.set(11), 11);
        assert!(!cache.is_populated());

        cache.rewind();
        assert!(cache.is_populated());
        assert_eq!(cache.get(), Some(5));
        assert_eq!(cache.get(), Some(11));
        assert_eq!(cache.get(), None);
    }

    #[test]
    fn test_placeholder_keeps_container_first() {
        let mut cache = LengthCache::new();
        let slot = cache.placeholder();
        cache.set(5);
        cache.fill(slot, 17);
        cache.rewind();
        assert_eq!(cache.get(), Some(17));
        assert_eq!(cache.get(), Some(5));
    }

    #[test]
    fn test_get_or_insert_with_only_computes_once() {
        let mut cache = LengthCache::new();
        assert_eq!(cache.get_or_insert_with(|| 9), 9);
        cache.rewind();
        assert_eq!(cache.get_or_insert_with(|| unreachable!()), 9);
    }

    #[test]
    fn test_clear_resets() {
        let mut cache = LengthCache::new();
        cache.set(3);
        cache.rewind();
        cache.clear();
        assert!(cache.is_empty());
        assert!(!cache.is_populated());
    }
}
