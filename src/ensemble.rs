//! Ensemble aggregation.
//!
//! The reduction runs in two stages, and the order matters:
//!
//! 1. **Cross-model**: for each year and cell, the min, quartiles and max
//!    across ensemble members.
//! 2. **Cross-year**: for each of those five channels independently, the
//!    median across the years of the window.
//!
//! After stage 2 the channels are medians of per-year statistics. They give a
//! central estimate and a spread band for the window, but they are not exact
//! percentiles of the pooled model-year distribution. The `P25` channel, for
//! instance, is the median over years of each year's cross-model first
//! quartile.

use std::collections::BTreeMap;
use std::fmt;

use ndarray::{Array2, Zip};

use crate::{
    grid::{GridError, GridSpec},
    temporal::AnnualStack,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Statistic {
    Min,
    P25,
    Median,
    P75,
    Max,
}

impl Statistic {
    pub const ALL: [Statistic; 5] = [
        Statistic::Min,
        Statistic::P25,
        Statistic::Median,
        Statistic::P75,
        Statistic::Max,
    ];

    pub fn probability(&self) -> f64 {
        match self {
            Statistic::Min => 0.0,
            Statistic::P25 => 0.25,
            Statistic::Median => 0.5,
            Statistic::P75 => 0.75,
            Statistic::Max => 1.0,
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn name(&self) -> &'static str {
        match self {
            Statistic::Min => "min",
            Statistic::P25 => "p25",
            Statistic::Median => "median",
            Statistic::P75 => "p75",
            Statistic::Max => "max",
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Five grids, one per [`Statistic`], in `Statistic::ALL` order.
pub type Channels<T> = [T; 5];

/// Five-channel raster aligned to its source grid.
#[derive(Debug, Clone)]
pub struct SummaryRaster {
    spec: GridSpec,
    channels: Channels<Array2<f64>>,
}

impl SummaryRaster {
    pub fn new(spec: GridSpec, channels: Channels<Array2<f64>>) -> Result<Self, GridError> {
        if let Some(bad) = channels.iter().find(|c| c.dim() != spec.shape()) {
            return Err(GridError::ShapeMismatch {
                expected: format!("{:?}", spec.shape()),
                found: format!("{:?}", bad.dim()),
            });
        }

        Ok(SummaryRaster { spec, channels })
    }

    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    pub fn channel(&self, statistic: Statistic) -> &Array2<f64> {
        &self.channels[statistic.index()]
    }

    /// Values of every channel at `(row, col)`, `None` where missing.
    pub fn values_at(&self, row: usize, col: usize) -> Channels<Option<f64>> {
        std::array::from_fn(|i| finite(self.channels[i][[row, col]]))
    }
}

pub(crate) fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Quantile with linear interpolation between order statistics
/// (`h = (n - 1) p`), ignoring non-finite values.
pub fn quantile(values: &[f64], p: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    Some(quantile_sorted(&sorted, p))
}

fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    let h = (sorted.len() - 1) as f64 * p.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;

    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Stage A: per year, the five cross-model statistics for every cell.
///
/// A member missing a year simply does not contribute to that year.
pub fn cross_model(stacks: &[AnnualStack]) -> Result<BTreeMap<i32, Channels<Array2<f64>>>, GridError> {
    let spec = reference_spec(stacks)?;

    let years: std::collections::BTreeSet<i32> =
        stacks.iter().flat_map(|s| s.years.keys().copied()).collect();

    let mut per_year = BTreeMap::new();
    for year in years {
        let grids: Vec<&Array2<f64>> = stacks.iter().filter_map(|s| s.years.get(&year)).collect();
        per_year.insert(year, reduce_cells(&spec, &grids, |cell| {
            let mut sorted: Vec<f64> = cell.iter().copied().filter(|v| v.is_finite()).collect();
            sorted.sort_by(f64::total_cmp);
            let stats = Statistic::ALL.map(|s| {
                if sorted.is_empty() {
                    f64::NAN
                } else {
                    quantile_sorted(&sorted, s.probability())
                }
            });
            debug_assert!(is_ordered(&stats));
            stats
        }));
    }

    Ok(per_year)
}

/// Stage B: per channel, the median across years for every cell.
pub fn cross_year(spec: GridSpec, per_year: &BTreeMap<i32, Channels<Array2<f64>>>) -> Result<SummaryRaster, GridError> {
    if per_year.is_empty() {
        return Err(GridError::EmptyEnsemble);
    }

    let channels = Statistic::ALL.map(|s| {
        let grids: Vec<&Array2<f64>> = per_year.values().map(|c| &c[s.index()]).collect();
        let [median] = reduce_cells(&spec, &grids, |cell| [quantile(cell, 0.5).unwrap_or(f64::NAN)]);
        median
    });

    SummaryRaster::new(spec, channels)
}

/// Runs both stages over one window's ensemble.
pub fn summarize(stacks: &[AnnualStack]) -> Result<SummaryRaster, GridError> {
    let spec = reference_spec(stacks)?;
    let per_year = cross_model(stacks)?;

    cross_year(spec, &per_year)
}

fn reference_spec(stacks: &[AnnualStack]) -> Result<GridSpec, GridError> {
    let first = stacks.first().ok_or(GridError::EmptyEnsemble)?;
    for stack in &stacks[1..] {
        first.spec.ensure_aligned(&stack.spec)?;
    }

    Ok(first.spec)
}

// Applies `reduce` to the values of every cell across `grids`.
fn reduce_cells<const N: usize, F>(spec: &GridSpec, grids: &[&Array2<f64>], reduce: F) -> [Array2<f64>; N]
where
    F: Fn(&[f64]) -> [f64; N],
{
    let mut out: [Array2<f64>; N] = std::array::from_fn(|_| Array2::from_elem(spec.shape(), f64::NAN));
    let mut cell = Vec::with_capacity(grids.len());

    for row in 0..spec.rows {
        for col in 0..spec.cols {
            cell.clear();
            cell.extend(grids.iter().map(|g| g[[row, col]]));
            for (channel, value) in out.iter_mut().zip(reduce(&cell)) {
                channel[[row, col]] = value;
            }
        }
    }

    out
}

/// Checks the monotone ordering of a five-channel cell, skipping missing.
pub fn is_ordered(values: &Channels<f64>) -> bool {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    finite.windows(2).all(|w| w[0] <= w[1])
}

/// Cell-wise combination of two aligned channel sets.
pub(crate) fn zip_channels<F>(a: &SummaryRaster, b: &SummaryRaster, f: F) -> Result<SummaryRaster, GridError>
where
    F: Fn(f64, f64) -> f64 + Copy,
{
    a.spec.ensure_aligned(&b.spec)?;

    let channels = Statistic::ALL.map(|s| {
        let mut out = Array2::from_elem(a.spec.shape(), f64::NAN);
        Zip::from(&mut out)
            .and(a.channel(s))
            .and(b.channel(s))
            .for_each(|o, &x, &y| *o = f(x, y));
        out
    });

    SummaryRaster::new(a.spec, channels)
}

// -- Tests -------------------------------------------------------------------
