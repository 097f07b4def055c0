//! Statistics applied to an ROI and the name-keyed registry that holds them.
//!
//! Built-in statistics form the closed [`Statistic`] enum. Anything else is
//! registered through the [`Reducer`] trait, either as a trait object or as
//! a plain [`ReduceFn`] function pointer.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ndarray::ArrayView2;

use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Reduces an ROI view to a single scalar.
pub trait Reducer: Send + Sync {
    /// Computes the statistic over `region`.
    ///
    /// # Errors
    /// Implementations return an error when the statistic cannot be computed.
    fn reduce(&self, region: ArrayView2<'_, f64>) -> Result<f64>;
}

/// Signature of a plain-function reducer.
pub type ReduceFn = fn(ArrayView2<'_, f64>) -> f64;

/// Adapter turning a [`ReduceFn`] into a [`Reducer`].
#[derive(Clone, Copy)]
pub struct FnReducer(pub ReduceFn);

impl Reducer for FnReducer {
    fn reduce(&self, region: ArrayView2<'_, f64>) -> Result<f64> {
        Ok((self.0)(region))
    }
}

/// Built-in statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Statistic {
    Min,
    Max,
    Mean,
    /// Population standard deviation (ddof = 0).
    Std,
    /// Total intensity.
    Sum,
}

impl Statistic {
    /// Every built-in, in registry order.
    pub const ALL: [Statistic; 5] = [
        Statistic::Std,
        Statistic::Mean,
        Statistic::Min,
        Statistic::Max,
        Statistic::Sum,
    ];

    /// Registry name of the statistic.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Statistic::Min => "min",
            Statistic::Max => "max",
            Statistic::Mean => "mean",
            Statistic::Std => "std",
            Statistic::Sum => "sum",
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Statistic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Statistic::ALL
            .into_iter()
            .find(|stat| stat.name() == s)
            .ok_or_else(|| Error::UnknownStatistic(s.to_string()))
    }
}

impl Reducer for Statistic {
    fn reduce(&self, region: ArrayView2<'_, f64>) -> Result<f64> {
        if region.is_empty() {
            return Err(Error::EmptyInput("statistic over an empty region"));
        }
        let value = match self {
            Statistic::Min => region.fold(f64::INFINITY, |acc, &v| acc.min(v)),
            Statistic::Max => region.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v)),
            Statistic::Mean => region
                .mean()
                .ok_or(Error::EmptyInput("mean over an empty region"))?,
            Statistic::Std => region.std(0.0),
            Statistic::Sum => region.sum(),
        };
        Ok(value)
    }
}

/// What to do when a name is registered twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum InsertPolicy {
    /// Replace the existing reducer.
    #[default]
    Overwrite,
    /// Fail with [`Error::DuplicateStatistic`].
    Reject,
}

/// Ordered name to reducer map.
#[derive(Clone)]
pub struct StatisticRegistry {
    entries: Vec<(String, Arc<dyn Reducer>)>,
    policy: InsertPolicy,
}

impl Default for StatisticRegistry {
    fn default() -> Self {
        let mut registry = Self::empty(InsertPolicy::default());
        for stat in Statistic::ALL {
            let reducer: Arc<dyn Reducer> = Arc::new(stat);
            registry.entries.push((stat.name().to_string(), reducer));
        }
        registry
    }
}

impl fmt::Debug for StatisticRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatisticRegistry")
            .field("names", &self.names().collect::<Vec<_>>())
            .field("policy", &self.policy)
            .finish()
    }
}

impl StatisticRegistry {
    /// Creates a registry holding the built-in statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with no statistics at all.
    #[must_use]
    pub fn empty(policy: InsertPolicy) -> Self {
        Self {
            entries: Vec::new(),
            policy,
        }
    }

    /// Sets the duplicate-name policy.
    #[must_use]
    pub fn with_policy(mut self, policy: InsertPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Current duplicate-name policy.
    #[must_use]
    pub fn policy(&self) -> InsertPolicy {
        self.policy
    }

    /// Registers a reducer under `name`.
    ///
    /// Returns the reducer it replaced, if any.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateStatistic`] if the name exists and the
    /// policy is [`InsertPolicy::Reject`].
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        reducer: Arc<dyn Reducer>,
    ) -> Result<Option<Arc<dyn Reducer>>> {
        let name = name.into();
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            return match self.policy {
                InsertPolicy::Reject => Err(Error::DuplicateStatistic(name)),
                InsertPolicy::Overwrite => {
                    log::debug!("overwriting statistic '{name}'");
                    Ok(Some(std::mem::replace(&mut slot.1, reducer)))
                }
            };
        }
        self.entries.push((name, reducer));
        Ok(None)
    }

    /// Registers a plain function under `name`.
    ///
    /// # Errors
    /// See [`Self::insert`].
    pub fn add_fn(&mut self, name: impl Into<String>, func: ReduceFn) -> Result<()> {
        self.insert(name, Arc::new(FnReducer(func))).map(|_| ())
    }

    /// Removes the reducer registered under `name`.
    ///
    /// # Errors
    /// Returns [`Error::UnknownStatistic`] if nothing is registered under it.
    pub fn remove(&mut self, name: &str) -> Result<Arc<dyn Reducer>> {
        let idx = self
            .entries
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| Error::UnknownStatistic(name.to_string()))?;
        Ok(self.entries.remove(idx).1)
    }

    /// Replaces the whole registry content.
    ///
    /// # Errors
    /// Under [`InsertPolicy::Reject`], fails on a name repeated inside
    /// `reducers`; the registry is left empty of the remaining entries.
    pub fn set<I, S>(&mut self, reducers: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, Arc<dyn Reducer>)>,
        S: Into<String>,
    {
        self.entries.clear();
        for (name, reducer) in reducers {
            self.insert(name, reducer)?;
        }
        Ok(())
    }

    /// Looks up a reducer by name.
    ///
    /// # Errors
    /// Returns [`Error::UnknownStatistic`] if the name is not registered.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Reducer>> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, reducer)| Arc::clone(reducer))
            .ok_or_else(|| Error::UnknownStatistic(name.to_string()))
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    /// Registered names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Number of registered statistics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no statistic is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
