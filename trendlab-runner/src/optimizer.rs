//! ParameterOptimizer — Cartesian-product grid search ranked by a chosen
//! metric, evaluated in parallel across a worker pool.
//!
//! Each combination is independent: the only shared state is the read-mostly,
//! internally synchronized historical data cache. A combination that panics
//! or errors is retained with zeroed metrics and an error flag rather than
//! aborting the whole sweep.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use trendlab_core::data::{BrokerDataSource, HistoricalDataCache};
use trendlab_core::engine::{run_backtest, BacktestConfig, CancellationToken};
use trendlab_core::strategy::Strategy;

use crate::metrics::PerformanceMetrics;

/// A single candidate value for a swept parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

/// One fully-resolved combination of parameter name -> value.
pub type ParamSet = HashMap<String, ParamValue>;

/// The mapping from parameter name to its candidate values, enumerated as a
/// Cartesian product.
#[derive(Debug, Clone, Default)]
pub struct ParameterSpace {
    params: Vec<(String, Vec<ParamValue>)>,
}

impl ParameterSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, values: Vec<ParamValue>) -> Self {
        self.params.push((name.into(), values));
        self
    }

    /// Total combinations before any constraint filtering.
    pub fn size(&self) -> usize {
        self.params.iter().map(|(_, v)| v.len()).product()
    }

    /// Enumerate the full Cartesian product.
    pub fn combinations(&self) -> Vec<ParamSet> {
        if self.params.is_empty() {
            return Vec::new();
        }
        let mut out = vec![ParamSet::new()];
        for (name, values) in &self.params {
            let mut next = Vec::with_capacity(out.len() * values.len());
            for partial in &out {
                for v in values {
                    let mut extended = partial.clone();
                    extended.insert(name.clone(), v.clone());
                    next.push(extended);
                }
            }
            out = next;
        }
        out
    }
}

/// How to rank results by a named metric: most metrics rank best-first
/// (descending); drawdown-like metrics rank best-first ascending (smaller
/// drawdown is better).
#[derive(Debug, Clone, Copy)]
pub struct OptimizationMetric {
    extract: fn(&PerformanceMetrics) -> f64,
    ascending: bool,
}

impl OptimizationMetric {
    pub fn custom(extract: fn(&PerformanceMetrics) -> f64, ascending: bool) -> Self {
        Self { extract, ascending }
    }

    pub fn net_profit() -> Self {
        Self::custom(|m| m.net_profit, false)
    }

    pub fn sharpe_ratio() -> Self {
        Self::custom(|m| m.sharpe_ratio, false)
    }

    pub fn profit_factor() -> Self {
        Self::custom(|m| m.profit_factor, false)
    }

    pub fn expected_value() -> Self {
        Self::custom(|m| m.expected_value, false)
    }

    /// Drawdown-like: smaller is better, so this ranks ascending.
    pub fn max_drawdown() -> Self {
        Self::custom(|m| m.max_drawdown, true)
    }

    fn value(&self, metrics: &PerformanceMetrics) -> f64 {
        (self.extract)(metrics)
    }

    /// Score an already-computed metrics bundle the same way ranking does.
    pub fn score(&self, metrics: &PerformanceMetrics) -> f64 {
        self.value(metrics)
    }
}

/// Outcome of evaluating one parameter combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub params: ParamSet,
    pub metrics: PerformanceMetrics,
    pub metric_value: f64,
    pub error: Option<String>,
}

#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("parameter space has no combinations")]
    EmptySpace,
}

/// Run a full grid search: enumerate, constrain, evaluate in parallel, rank.
///
/// `factory` builds a strategy instance from a resolved parameter set.
/// `constraint`, if given, filters out invalid combinations before they are
/// evaluated at all (e.g. `short_period < long_period`).
///
/// `cancel`, if given, is checked before each combination starts evaluating.
/// Once set, combinations not yet dispatched are skipped rather than run;
/// combinations already in flight on another worker thread finish normally.
/// Skipped combinations are retained with an error flag, same as a genuine
/// evaluation failure, so `results.len()` always equals the combination count.
#[allow(clippy::too_many_arguments)]
pub fn optimize(
    space: &ParameterSpace,
    constraint: Option<&(dyn Fn(&ParamSet) -> bool + Sync)>,
    factory: &(dyn Fn(&ParamSet) -> Box<dyn Strategy> + Sync),
    config_template: &BacktestConfig,
    cache: &HistoricalDataCache,
    broker: Option<&dyn BrokerDataSource>,
    metric: OptimizationMetric,
    cancel: Option<&CancellationToken>,
) -> Result<Vec<OptimizationResult>, OptimizerError> {
    let combos: Vec<ParamSet> = space
        .combinations()
        .into_iter()
        .filter(|p| constraint.map_or(true, |c| c(p)))
        .collect();

    if combos.is_empty() {
        return Err(OptimizerError::EmptySpace);
    }

    let total = combos.len();
    let completed = AtomicUsize::new(0);
    let best_seen = std::sync::Mutex::new(f64::NEG_INFINITY);

    let mut results: Vec<OptimizationResult> = combos
        .par_iter()
        .map(|params| {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return OptimizationResult {
                    params: params.clone(),
                    metrics: PerformanceMetrics::compute(
                        &[config_template.initial_balance],
                        &[],
                        config_template.initial_balance,
                    ),
                    metric_value: if metric.ascending { f64::INFINITY } else { f64::NEG_INFINITY },
                    error: Some("cancelled before evaluation".to_string()),
                };
            }

            let result = evaluate_one(params, factory, config_template, cache, broker, metric);

            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            {
                let mut best = best_seen.lock().unwrap();
                if result.metric_value > *best {
                    *best = result.metric_value;
                }
                if done % 10 == 0 || done == total {
                    tracing::info!(completed = done, total, best_metric = *best, "optimizer progress");
                }
            }

            result
        })
        .collect();

    results.sort_by(|a, b| {
        let ord = a
            .metric_value
            .partial_cmp(&b.metric_value)
            .unwrap_or(std::cmp::Ordering::Equal);
        if metric.ascending {
            ord
        } else {
            ord.reverse()
        }
    });

    Ok(results)
}

fn evaluate_one(
    params: &ParamSet,
    factory: &(dyn Fn(&ParamSet) -> Box<dyn Strategy> + Sync),
    config_template: &BacktestConfig,
    cache: &HistoricalDataCache,
    broker: Option<&dyn BrokerDataSource>,
    metric: OptimizationMetric,
) -> OptimizationResult {
    let strategy = factory(params);
    match run_backtest(config_template, strategy.as_ref(), cache, broker, None, None) {
        Ok(result) => {
            let metrics =
                PerformanceMetrics::compute(&result.equity_curve, &result.trades, config_template.initial_balance);
            let metric_value = metric.value(&metrics);
            OptimizationResult {
                params: params.clone(),
                metrics,
                metric_value,
                error: None,
            }
        }
        Err(e) => OptimizationResult {
            params: params.clone(),
            metrics: PerformanceMetrics::compute(&[config_template.initial_balance], &[], config_template.initial_balance),
            metric_value: if metric.ascending { f64::INFINITY } else { f64::NEG_INFINITY },
            error: Some(e.to_string()),
        },
    }
}
