//! Events exchanged between the memory worker and the UI worker.
//!
//! Both workers share a single bounded bus. The memory worker is the
//! producer of observation events; the UI worker additionally feeds its own
//! input events through the same bus so that all state mutation happens on
//! one consumer.

/// Capacity of the worker-to-UI bus.
pub const BUS_CAPACITY: usize = 100;

/// How many messages the UI drains per tick.
pub const BATCH_SIZE: usize = 30;

/// How a query editing session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryEditEnd {
    /// Commit the edit buffer as the new query.
    Confirm,
    /// Throw the edit buffer away.
    Discard,
}

/// One state-change event, consumed exactly once from the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Whether the observed generator is currently being mirrored.
    OnlineStatus(bool),
    /// The live index cursor of the observed generator.
    MtiValue(u32),
    /// Projection of upcoming outputs reduced modulo 100.
    NextPercentages(Vec<i32>),
    /// The terminal was resized.
    Resized { cols: u16, rows: u16 },
    /// Show or hide the processed-message counter.
    ToggleMessageCount,
    /// Enter query editing mode.
    BeginQueryEdit,
    /// Leave query editing mode.
    EndQueryEdit(QueryEditEnd),
    /// A key accepted while editing the query.
    QueryChar(char),
    /// Delete the last character of the edit buffer.
    QueryBackspace,
}

/// Builds the bounded bus shared by the two workers.
pub fn bus() -> (
    crossbeam_channel::Sender<Message>,
    crossbeam_channel::Receiver<Message>,
) {
    crossbeam_channel::bounded(BUS_CAPACITY)
}
