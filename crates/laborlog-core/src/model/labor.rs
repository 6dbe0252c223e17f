use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Worker-weighted elapsed time, stored as integer labor-milliseconds.
///
/// One worker engaged for one second is 1000. Integer storage keeps split
/// and merge exact: the pieces of an interval always sum to the whole.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LaborTime(i64);

impl LaborTime {
    pub const ZERO: Self = Self(0);

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub const fn from_secs(secs: i64) -> Self {
        Self(secs * 1000)
    }

    /// Labor for `workers` people engaged for `elapsed`. Negative spans count as zero.
    pub fn for_workers(elapsed: Duration, workers: u32) -> Self {
        let millis = elapsed.num_milliseconds().max(0);
        Self(millis.saturating_mul(i64::from(workers)))
    }

    pub const fn as_millis(self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1000.0
    }

    /// Labor-hours, the unit committed work logs are recorded in.
    pub fn as_hours_f64(self) -> f64 {
        self.0 as f64 / 3_600_000.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::Add for LaborTime {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::AddAssign for LaborTime {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for LaborTime {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, l| acc + l)
    }
}

impl<'a> std::iter::Sum<&'a LaborTime> for LaborTime {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl std::fmt::Display for LaborTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}h", self.as_hours_f64())
    }
}

/// Accumulated labor for one local calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyLabor {
    pub date: NaiveDate,
    pub labor: LaborTime,
}

impl DailyLabor {
    pub fn new(date: NaiveDate, labor: LaborTime) -> Self {
        Self { date, labor }
    }
}
