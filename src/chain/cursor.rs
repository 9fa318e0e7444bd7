use log::debug;

use crate::{
    chain::{Chain, ChainError, ColumnBuffer, ColumnHandle, Result, schema::SchemaBinder},
    store::ShardStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// No row loaded yet
    Unopened,
    /// A row is loaded and its [`Record`] may be read
    Active,
    /// Past the last row; terminal
    Exhausted,
}

/// View over the bound buffers for the current row.
///
/// Borrowed from the cursor, so it cannot outlive the next `advance()`.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    binder: &'a SchemaBinder,
    global_index: usize,
    shard: usize,
    local_index: usize,
}

impl<'a> Record<'a> {
    pub fn global_index(&self) -> usize {
        self.global_index
    }

    pub fn shard(&self) -> usize {
        self.shard
    }

    pub fn local_index(&self) -> usize {
        self.local_index
    }

    pub fn column(&self, handle: ColumnHandle) -> &'a ColumnBuffer {
        self.binder.buffer(handle)
    }

    /// Looks a column up by name; prefer [`Record::column`] in loops
    pub fn get(&self, name: &str) -> Option<&'a ColumnBuffer> {
        self.binder.buffer_by_name(name)
    }
}

/// Walks a chain's rows in shard order, switching shards transparently
pub struct RecordCursor<'c, S: ShardStore> {
    chain: &'c mut Chain<S>,
    next: usize,
    state: CursorState,
}

impl<'c, S: ShardStore> RecordCursor<'c, S> {
    pub(crate) fn new(chain: &'c mut Chain<S>) -> Self {
        RecordCursor {
            chain,
            next: 0,
            state: CursorState::Unopened,
        }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Global index the next `advance()` will load
    pub fn position(&self) -> usize {
        self.next
    }

    /// Moves to the next row and loads every bound column.
    ///
    /// Returns `Ok(None)` at end of stream; buffers are left untouched and the
    /// chain's open shards are released.
    pub fn advance(&mut self) -> Result<Option<Record<'_>>> {
        if self.state == CursorState::Exhausted {
            return Ok(None);
        }
        if self.state == CursorState::Unopened && self.chain.config().eager_schema_check {
            self.chain.validate_schema()?;
        }

        let index = self.next;
        let (shard, local) = match self.chain.locate(index) {
            Ok(position) => position,
            Err(ChainError::IndexOutOfRange { .. }) => {
                debug!("cursor exhausted after {} rows", index);
                self.state = CursorState::Exhausted;
                self.chain.release();
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        // No-op unless the shard changed or columns were declared since binding
        self.chain.activate(shard)?;
        self.chain.load_row(shard, local)?;

        self.next += 1;
        self.state = CursorState::Active;
        Ok(Some(Record {
            binder: self.chain.binder(),
            global_index: index,
            shard,
            local_index: local,
        }))
    }
}
