use crate::records::MessageRecord;
use crate::store::MirrorStore;
use anyhow::{bail, Result};

pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Pending message rows waiting for the next flush.
#[derive(Debug)]
pub struct BatchBuffer {
    rows: Vec<MessageRecord>,
    capacity: usize,
    flushes: usize,
}

impl BatchBuffer {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            bail!("batch_size must be greater than 0");
        }
        Ok(Self {
            rows: Vec::with_capacity(capacity),
            capacity,
            flushes: 0,
        })
    }

    /// Appends a row and reports whether the buffer is now full.
    pub fn push(&mut self, record: MessageRecord) -> bool {
        self.rows.push(record);
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.rows.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Writes the pending rows in one upsert.
    ///
    /// Rows are only discarded once the store reports success, so a failed
    /// flush leaves them pending.
    pub async fn flush<M>(&mut self, store: &M) -> Result<usize>
    where
        M: MirrorStore + ?Sized,
    {
        if self.rows.is_empty() {
            return Ok(0);
        }
        let written = store.upsert_messages(&self.rows).await?;
        self.rows.clear();
        self.flushes += 1;
        Ok(written)
    }
}
