use tokio::sync::mpsc;

use crate::remote::Table;

/// Kind of write a store operation issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
  Create,
  Update,
  Delete,
  Upsert,
}

/// Notifications published by the data store
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
  /// A fetch for this table started
  Loading(Table),
  /// A fetch replaced the cached rows
  Loaded { table: Table, rows: usize },
  /// A fetch failed; cached rows were kept
  FetchFailed { table: Table, message: String },
  /// A write succeeded
  Written { table: Table, op: WriteOp, id: String },
  /// A write failed; nothing was changed locally
  WriteFailed {
    table: Table,
    op: WriteOp,
    message: String,
  },
}

impl StoreEvent {
  pub fn table(&self) -> Table {
    match self {
      Self::Loading(table) => *table,
      Self::Loaded { table, .. }
      | Self::FetchFailed { table, .. }
      | Self::Written { table, .. }
      | Self::WriteFailed { table, .. } => *table,
    }
  }

  /// Whether this event ends a fetch.
  pub fn is_fetch_settled(&self) -> bool {
    matches!(self, Self::Loaded { .. } | Self::FetchFailed { .. })
  }
}

/// Receiving end of the store's event channel
pub struct EventHandler {
  tx: mpsc::UnboundedSender<StoreEvent>,
  rx: mpsc::UnboundedReceiver<StoreEvent>,
}

impl EventHandler {
  pub fn new() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self { tx, rx }
  }

  /// Sender to hand to the store
  pub fn sender(&self) -> mpsc::UnboundedSender<StoreEvent> {
    self.tx.clone()
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<StoreEvent> {
    self.rx.recv().await
  }

  /// Next already-published event, without waiting
  #[cfg(test)]
  pub fn try_next(&mut self) -> Option<StoreEvent> {
    self.rx.try_recv().ok()
  }

  /// Wait until a fetch of `table` settles, skipping unrelated events.
  pub async fn settled(&mut self, table: Table) -> Option<StoreEvent> {
    while let Some(event) = self.next().await {
      if event.table() == table && event.is_fetch_settled() {
        return Some(event);
      }
    }
    None
  }
}
