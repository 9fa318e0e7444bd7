use log::{debug, info};

use crate::{
    chain::{
        Chain, ChainError, ColumnHandle, Record, Result,
        cuts::{CompiledCut, Cut, compile_all, pass_all},
    },
    store::ShardStore,
};

/// Fixed-range 1D histogram with half-open bins `[lower, upper)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    lower: f64,
    upper: f64,
    bin_width: f64,
    counts: Vec<f64>,
    underflow: f64,
    overflow: f64,
    total_filled: f64,
    entries: u64,
}

impl Histogram {
    pub fn new(n_bins: usize, lower: f64, upper: f64) -> Result<Self> {
        if n_bins == 0 {
            return Err(ChainError::InvalidHistogram("n_bins must be > 0".into()));
        }
        if !lower.is_finite() || !upper.is_finite() || lower >= upper {
            return Err(ChainError::InvalidHistogram(format!(
                "invalid range [{lower}, {upper})"
            )));
        }
        Ok(Histogram {
            lower,
            upper,
            bin_width: (upper - lower) / n_bins as f64,
            counts: vec![0.0; n_bins],
            underflow: 0.0,
            overflow: 0.0,
            total_filled: 0.0,
            entries: 0,
        })
    }

    pub fn fill(&mut self, value: f64) {
        self.fill_weighted(value, 1.0);
    }

    /// `value < lower` goes to underflow; `value >= upper` and NaN to overflow
    pub fn fill_weighted(&mut self, value: f64, weight: f64) {
        self.total_filled += weight;
        self.entries += 1;

        if value < self.lower {
            self.underflow += weight;
        } else if value >= self.upper || value.is_nan() {
            self.overflow += weight;
        } else {
            // Rounding may push values just below `upper` past the last bin
            let bin = ((value - self.lower) / self.bin_width).floor() as usize;
            let bin = bin.min(self.counts.len() - 1);
            self.counts[bin] += weight;
        }
    }

    pub fn n_bins(&self) -> usize {
        self.counts.len()
    }

    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    pub fn underflow(&self) -> f64 {
        self.underflow
    }

    pub fn overflow(&self) -> f64 {
        self.overflow
    }

    /// Summed weight of every fill, including under- and overflow
    pub fn total_filled(&self) -> f64 {
        self.total_filled
    }

    /// Number of fill calls
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Lower edge of `bin`
    pub fn bin_lower(&self, bin: usize) -> f64 {
        self.lower + bin as f64 * self.bin_width
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            lower: self.lower,
            upper: self.upper,
            bin_width: self.bin_width,
            counts: self.counts.clone(),
            underflow: self.underflow,
            overflow: self.overflow,
            total_filled: self.total_filled,
            entries: self.entries,
        }
    }
}

/// Finished histogram, read-only
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    pub lower: f64,
    pub upper: f64,
    pub bin_width: f64,
    pub counts: Vec<f64>,
    pub underflow: f64,
    pub overflow: f64,
    pub total_filled: f64,
    pub entries: u64,
}

impl HistogramSnapshot {
    /// Summed weight of the in-range bins
    pub fn integral(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// `(lower edge, upper edge, count)` per bin
    pub fn bins(&self) -> impl Iterator<Item = (f64, f64, f64)> + '_ {
        self.counts.iter().enumerate().map(|(i, &c)| {
            let lo = self.lower + i as f64 * self.bin_width;
            (lo, lo + self.bin_width, c)
        })
    }
}

/// Binning of a drained histogram
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangeSpec {
    Fixed { n_bins: usize, lower: f64, upper: f64 },
    /// Range from the minimum and maximum passing value, found in a first pass
    Auto { n_bins: usize },
}

/// Histogram fed from chain records, filtered by cuts
#[derive(Debug)]
pub struct HistogramAggregator {
    range: RangeSpec,
    weight: f64,
    cuts: Vec<Cut>,
}

impl HistogramAggregator {
    pub fn new(range: RangeSpec) -> Self {
        HistogramAggregator {
            range,
            weight: 1.0,
            cuts: Vec::new(),
        }
    }

    pub fn fixed(n_bins: usize, lower: f64, upper: f64) -> Self {
        Self::new(RangeSpec::Fixed {
            n_bins,
            lower,
            upper,
        })
    }

    /// Add a cut; all cuts must pass for a record to be filled
    pub fn with_cut(mut self, cut: Cut) -> Self {
        self.cuts.push(cut);
        self
    }

    pub fn with_cuts(mut self, cuts: impl IntoIterator<Item = Cut>) -> Self {
        self.cuts.extend(cuts);
        self
    }

    /// Weight applied to every fill
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Compiles the cuts against `chain` and returns an empty histogram to be
    /// fed record by record. Needs a fixed range.
    pub fn prepare<S: ShardStore>(&self, chain: &mut Chain<S>) -> Result<FilteredHistogram> {
        let RangeSpec::Fixed {
            n_bins,
            lower,
            upper,
        } = self.range
        else {
            return Err(ChainError::InvalidHistogram(
                "automatic range is only available through drain_chain".into(),
            ));
        };
        Ok(FilteredHistogram {
            histogram: Histogram::new(n_bins, lower, upper)?,
            cuts: compile_all(&self.cuts, chain)?,
        })
    }

    /// Walks the whole chain and bins `column`.
    ///
    /// Scalar columns fill once per row, sequence columns once per contained
    /// scalar. Rows failing any cut are skipped and not counted anywhere.
    pub fn drain_chain<S: ShardStore>(
        &self,
        chain: &mut Chain<S>,
        column: &str,
    ) -> Result<HistogramSnapshot> {
        let handle = chain.declare_inferred(column)?;

        let mut filtered = match self.range {
            RangeSpec::Fixed { .. } => self.prepare(chain)?,
            RangeSpec::Auto { n_bins } => {
                if n_bins == 0 {
                    return Err(ChainError::InvalidHistogram("n_bins must be > 0".into()));
                }
                let cuts = compile_all(&self.cuts, chain)?;
                let (lower, upper) = auto_range(chain, &cuts, handle, n_bins)?;
                debug!("auto range for `{}`: [{}, {})", column, lower, upper);
                FilteredHistogram {
                    histogram: Histogram::new(n_bins, lower, upper)?,
                    cuts,
                }
            }
        };

        let mut cursor = chain.cursor();
        while let Some(record) = cursor.advance()? {
            filtered.fill_each(&record, record.column(handle).flat_values(), self.weight);
        }

        let snapshot = filtered.snapshot();
        info!(
            "filled `{}`: {} entries, {} underflow, {} overflow",
            column, snapshot.entries, snapshot.underflow, snapshot.overflow
        );
        Ok(snapshot)
    }
}

/// Histogram guarded by compiled cuts, see [`HistogramAggregator::prepare`]
pub struct FilteredHistogram {
    histogram: Histogram,
    cuts: Vec<CompiledCut>,
}

impl std::fmt::Debug for FilteredHistogram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilteredHistogram")
            .field("histogram", &self.histogram)
            .field("cuts", &self.cuts.len())
            .finish()
    }
}

impl FilteredHistogram {
    /// Fills `value` if every cut passes on `record`; returns whether it did
    pub fn fill(&mut self, record: &Record<'_>, value: f64, weight: f64) -> bool {
        self.fill_each(record, std::iter::once(value), weight)
    }

    fn fill_each(
        &mut self,
        record: &Record<'_>,
        values: impl Iterator<Item = f64>,
        weight: f64,
    ) -> bool {
        if !pass_all(&self.cuts, record) {
            return false;
        }
        for value in values {
            self.histogram.fill_weighted(value, weight);
        }
        true
    }

    pub fn histogram(&self) -> &Histogram {
        &self.histogram
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        self.histogram.snapshot()
    }
}

/// First pass for [`RangeSpec::Auto`]: `[min, max]` of the passing values, with
/// the upper edge raised by 1% of a bin so the maximum lands in the last bin
fn auto_range<S: ShardStore>(
    chain: &mut Chain<S>,
    cuts: &[CompiledCut],
    handle: ColumnHandle,
    n_bins: usize,
) -> Result<(f64, f64)> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut cursor = chain.cursor();
    while let Some(record) = cursor.advance()? {
        if !pass_all(cuts, &record) {
            continue;
        }
        for v in record.column(handle).flat_values().filter(|v| v.is_finite()) {
            min = min.min(v);
            max = max.max(v);
        }
    }

    if min > max {
        // Nothing passed
        return Ok((0.0, 1.0));
    }
    if min == max {
        return Ok((min - 0.5, max + 0.5));
    }
    let bin_width = (max - min) / n_bins as f64;
    Ok((min, max + 0.01 * bin_width))
}

/// Number of rows passing all `cuts`
pub fn count_rows<S: ShardStore>(chain: &mut Chain<S>, cuts: &[Cut]) -> Result<u64> {
    let compiled = compile_all(cuts, chain)?;
    let mut count = 0;
    let mut cursor = chain.cursor();
    while let Some(record) = cursor.advance()? {
        if pass_all(&compiled, &record) {
            count += 1;
        }
    }
    Ok(count)
}
