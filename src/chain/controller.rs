use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use log::{debug, info};
use lru::LruCache;

use crate::{
    chain::{
        ChainError, ColumnHandle, Result, ValueKind, cursor::RecordCursor, schema::SchemaBinder,
    },
    store::{ShardStore, ShardTable},
};

/// Chain construction options
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Table to resolve in every shard; `None` for single-table files
    pub table: Option<String>,
    /// Upper bound on simultaneously open shard tables
    pub max_open_shards: NonZeroUsize,
    /// Check every shard against the declared columns before the first row
    pub eager_schema_check: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            table: None,
            max_open_shards: NonZeroUsize::MIN,
            eager_schema_check: false,
        }
    }
}

impl ChainConfig {
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_max_open_shards(mut self, n: NonZeroUsize) -> Self {
        self.max_open_shards = n;
        self
    }

    pub fn with_eager_schema_check(mut self, enabled: bool) -> Self {
        self.eager_schema_check = enabled;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardInfo {
    pub path: PathBuf,
    pub row_count: usize,
}

/// Ordered shards presented as one logical row sequence.
///
/// Owns the store, the open-table cache and the schema binder, so buffer
/// identity is chain-scoped while column slots are shard-scoped.
pub struct Chain<S: ShardStore> {
    store: S,
    config: ChainConfig,
    shards: Vec<ShardInfo>,
    // offsets[k] = first global row of shard k; offsets[n] = total rows
    offsets: Vec<usize>,
    open: LruCache<usize, S::Table>,
    active: Option<usize>,
    binder: SchemaBinder,
}

impl<S: ShardStore> std::fmt::Debug for Chain<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("shards", &self.shards)
            .field("config", &self.config)
            .field("active", &self.active)
            .field("open", &self.open.len())
            .field("binder", &self.binder)
            .finish()
    }
}

impl<S: ShardStore> Chain<S> {
    /// Opens every path once to read its row count. The first
    /// `max_open_shards` tables stay open for the scan; the rest are closed.
    pub fn build(paths: &[PathBuf], store: S, config: ChainConfig) -> Result<Self> {
        let mut open = LruCache::new(config.max_open_shards);
        let mut shards = Vec::with_capacity(paths.len());
        let mut offsets = Vec::with_capacity(paths.len() + 1);
        offsets.push(0);

        for (index, path) in paths.iter().enumerate() {
            let table = store.open(path, config.table.as_deref())?;
            let row_count = table.row_count();
            offsets.push(offsets[index] + row_count);
            shards.push(ShardInfo {
                path: path.clone(),
                row_count,
            });
            if index < config.max_open_shards.get() {
                open.put(index, table);
            }
        }

        let chain = Chain {
            store,
            config,
            shards,
            offsets,
            open,
            active: None,
            binder: SchemaBinder::new(),
        };
        info!(
            "built chain of {} shards with {} rows",
            chain.shards.len(),
            chain.row_count()
        );
        Ok(chain)
    }

    pub fn row_count(&self) -> usize {
        self.offsets.last().copied().unwrap_or_default()
    }

    pub fn shards(&self) -> &[ShardInfo] {
        &self.shards
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// First global row of every shard, plus the total as last entry
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn active_shard(&self) -> Option<usize> {
        self.active
    }

    pub fn open_shards(&self) -> usize {
        self.open.len()
    }

    pub fn binder(&self) -> &SchemaBinder {
        &self.binder
    }

    /// Maps a global row to `(shard, local row)`
    pub fn locate(&self, global: usize) -> Result<(usize, usize)> {
        if global >= self.row_count() {
            return Err(ChainError::IndexOutOfRange {
                index: global,
                row_count: self.row_count(),
            });
        }
        // Last shard starting at or before `global`; skips empty shards
        let shard = self.offsets.partition_point(|&o| o <= global) - 1;
        Ok((shard, global - self.offsets[shard]))
    }

    pub fn declare(&mut self, name: &str, kind: ValueKind) -> Result<ColumnHandle> {
        self.binder.declare(name, kind)
    }

    /// Declares `name` with the kind the first shard reports for it
    pub fn declare_inferred(&mut self, name: &str) -> Result<ColumnHandle> {
        if let Some(handle) = self.binder.handle(name) {
            return Ok(handle);
        }
        let first = self.shards.first().ok_or_else(|| {
            ChainError::InvalidArgument(format!("cannot infer `{name}` on an empty chain"))
        })?;
        let kind = match self.open.peek(&0) {
            Some(table) => table.column_kind(name),
            None => self
                .store
                .open(&first.path, self.config.table.as_deref())?
                .column_kind(name),
        }
        .ok_or_else(|| ChainError::UnknownColumn {
            column: name.to_string(),
            path: first.path.clone(),
        })?;
        self.binder.declare(name, kind)
    }

    /// Makes `shard` the active one: opens it if needed and re-binds all
    /// declared columns against it.
    pub fn activate(&mut self, shard: usize) -> Result<()> {
        if self.active == Some(shard) && self.binder.is_bound_to(shard) {
            return Ok(());
        }
        let info = self.shards.get(shard).ok_or(ChainError::IndexOutOfRange {
            index: shard,
            row_count: self.shards.len(),
        })?;

        if !self.open.contains(&shard) {
            let table = self.store.open(&info.path, self.config.table.as_deref())?;
            debug!("opened shard {} ({})", shard, info.path.display());
            if let Some((evicted, _)) = self.open.push(shard, table) {
                debug!("closed shard {}", evicted);
            }
        }

        // Binding is only valid for the table it was made against
        self.active = None;
        let table = self.open.get_mut(&shard).ok_or_else(|| {
            ChainError::InvalidArgument(format!("shard {shard} is not open"))
        })?;
        self.binder.bind(shard, table)?;
        self.active = Some(shard);
        Ok(())
    }

    /// Loads `local` of the active shard into the bound buffers
    pub(crate) fn load_row(&mut self, shard: usize, local: usize) -> Result<()> {
        let table = self.open.get_mut(&shard).ok_or_else(|| {
            ChainError::InvalidArgument(format!("shard {shard} is not open"))
        })?;
        self.binder.load_from(table, local)
    }

    /// Checks that every shard provides every declared column with its kind
    pub fn validate_schema(&self) -> Result<()> {
        for (index, info) in self.shards.iter().enumerate() {
            let columns = match self.open.peek(&index) {
                Some(table) => table.columns(),
                None => self
                    .store
                    .open(&info.path, self.config.table.as_deref())?
                    .columns(),
            };
            for declared in self.binder.columns() {
                match columns.iter().find(|c| c.name == declared.name) {
                    None => {
                        return Err(ChainError::SchemaMismatch {
                            column: declared.name.clone(),
                            path: info.path.clone(),
                        });
                    }
                    Some(c) if c.kind != declared.kind => {
                        return Err(ChainError::KindMismatch {
                            column: declared.name.clone(),
                            expected: declared.kind,
                            found: c.kind,
                        });
                    }
                    Some(_) => {}
                }
            }
        }
        debug!("schema validated across {} shards", self.shards.len());
        Ok(())
    }

    /// Closes every open table
    pub fn release(&mut self) {
        if !self.open.is_empty() {
            debug!("releasing {} open shards", self.open.len());
        }
        self.open.clear();
        self.active = None;
        self.binder.unbind();
    }

    /// Cursor over every row in shard order. The chain stays borrowed for the
    /// cursor's lifetime, so there is at most one.
    pub fn cursor(&mut self) -> RecordCursor<'_, S> {
        RecordCursor::new(self)
    }

    pub fn path_of(&self, shard: usize) -> Option<&Path> {
        self.shards.get(shard).map(|s| s.path.as_path())
    }
}
