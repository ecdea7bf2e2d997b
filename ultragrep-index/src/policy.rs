use ultragrep_core::Request;

use crate::timestamp::TimestampEntry;

/// Default bucket width in seconds.
pub const DEFAULT_GRANULARITY: u64 = 10;

/// Decides which completed requests become timestamp index entries: at most
/// one per time bucket, and only when the bucket moves forward.
#[derive(Debug, Clone)]
pub struct IndexingPolicy {
    granularity: u64,
    last_indexed: Option<u64>,
}

impl IndexingPolicy {
    pub fn new(granularity: u64) -> Self {
        Self {
            granularity: granularity.max(1),
            last_indexed: None,
        }
    }

    /// Continues after an existing entry, e.g. when resuming a build.
    pub fn resume_after(granularity: u64, last: Option<TimestampEntry>) -> Self {
        let mut policy = Self::new(granularity);
        policy.last_indexed = last.map(|entry| entry.time);
        policy
    }

    pub fn granularity(&self) -> u64 {
        self.granularity
    }

    pub fn observe(&mut self, request: &Request) -> Option<TimestampEntry> {
        self.observe_time(request.time, request.offset)
    }

    pub fn observe_time(&mut self, time: u64, offset: u64) -> Option<TimestampEntry> {
        if time == 0 {
            return None;
        }
        let bucket = time - time % self.granularity;
        match self.last_indexed {
            Some(last) if bucket <= last => None,
            _ => {
                self.last_indexed = Some(bucket);
                Some(TimestampEntry::new(bucket, offset))
            }
        }
    }
}

impl Default for IndexingPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_GRANULARITY)
    }
}
