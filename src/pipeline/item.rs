//! # Work items and their in-pipeline envelope.

use crate::gate::Ticket;

/// A unit of work travelling through the pipeline.
///
/// `id` is chosen by the caller and is what the sinks report against.
/// `seq` is assigned by [`Pipeline::submit`](crate::Pipeline::submit) in
/// submission order; it lets a sink restore order after parallel stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem<T> {
    /// Caller-assigned identifier.
    pub id: u64,
    /// Stage input/output value.
    pub payload: T,
    seq: u64,
}

impl<T> WorkItem<T> {
    /// Creates an item; `seq` is assigned on submission.
    pub fn new(id: u64, payload: T) -> Self {
        Self {
            id,
            payload,
            seq: 0,
        }
    }

    /// Submission order, starting from 0 for the first accepted item.
    #[inline]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Consumes the item and returns its payload.
    pub fn into_payload(self) -> T {
        self.payload
    }

    pub(crate) fn with_seq(mut self, seq: u64) -> Self {
        self.seq = seq;
        self
    }
}

/// Queue element: the item plus the admission ticket travelling with it.
///
/// Dropping the envelope returns the ticket to the gate.
pub(crate) struct Envelope<T> {
    pub(crate) item: WorkItem<T>,
    pub(crate) ticket: Option<Ticket>,
}

impl<T> Envelope<T> {
    pub(crate) fn new(item: WorkItem<T>, ticket: Option<Ticket>) -> Self {
        Self { item, ticket }
    }
}
