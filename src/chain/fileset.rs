use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use log::debug;
use walkdir::WalkDir;

use crate::{
    chain::{Chain, ChainConfig, ChainError, Result},
    store::ShardStore,
};

/// Ordered list of shard paths, resolved into a [`Chain`] by [`FileSet::build`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSet {
    paths: Vec<PathBuf>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a shard; order of insertion is the chain order
    pub fn add(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.paths.push(path.into());
        self
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Every file under `dir` with extension `ext`, in sorted path order
    pub fn discover(dir: impl AsRef<Path>, ext: &str) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(ChainError::NotFound(dir.to_path_buf()));
        }
        let ext = ext.trim_start_matches('.');

        let mut paths = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.file_type().is_file()
                && entry.path().extension().is_some_and(|e| e == ext)
            {
                paths.push(entry.into_path());
            }
        }
        paths.sort();
        debug!("discovered {} .{} files under {}", paths.len(), ext, dir.display());
        Ok(FileSet { paths })
    }

    /// Splits the set by file-name prefix before the first `_`
    /// (`Ar42_rtd_slim_000000.csv` belongs to `Ar42`). Each group keeps the
    /// relative order of its files.
    pub fn group_by_prefix(&self) -> BTreeMap<String, FileSet> {
        let mut groups: BTreeMap<String, FileSet> = BTreeMap::new();
        for path in &self.paths {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let prefix = stem.split('_').next().unwrap_or_default().to_string();
            groups.entry(prefix).or_default().add(path.clone());
        }
        groups
    }

    /// Opens every shard once to count its rows. Fails with
    /// [`ChainError::NotFound`] on the first path that cannot be opened.
    pub fn build<S: ShardStore>(&self, store: S, config: ChainConfig) -> Result<Chain<S>> {
        Chain::build(&self.paths, store, config)
    }
}

impl From<Vec<PathBuf>> for FileSet {
    fn from(paths: Vec<PathBuf>) -> Self {
        FileSet { paths }
    }
}

impl<P: Into<PathBuf>> FromIterator<P> for FileSet {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        FileSet {
            paths: iter.into_iter().map(Into::into).collect(),
        }
    }
}
