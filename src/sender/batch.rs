//! Byte-bounded batching of encoded records.

use super::Record;

/// Encoded records delivered in one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub records: Vec<Record>,
    pub buffer: Vec<u8>,
}

impl Batch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn push(&mut self, record: Record, line: &str) {
        self.records.push(record);
        self.buffer.extend_from_slice(line.as_bytes());
    }
}

/// Packs encoded records into batches of at most `max_bytes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchBuilder {
    max_bytes: usize,
}

impl BatchBuilder {
    /// A limit of zero puts every record in its own batch.
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    /// Group `(record, line)` pairs in order.
    ///
    /// A record is never split; one whose line alone exceeds the limit forms
    /// a singleton batch. No batch is empty.
    #[must_use]
    pub fn build<I>(&self, encoded: I) -> Vec<Batch>
    where
        I: IntoIterator<Item = (Record, String)>,
    {
        let mut batches = Vec::new();
        let mut current = Batch::default();
        for (record, line) in encoded {
            if !current.is_empty() && current.buffer.len() + line.len() > self.max_bytes {
                batches.push(std::mem::take(&mut current));
            }
            current.push(record, &line);
        }
        if !current.is_empty() {
            batches.push(current);
        }
        batches
    }
}
