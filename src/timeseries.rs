// 📅 Time-Series Decomposer - spending over time
// Bucket a value field by date, split it into trend + seasonal + residual,
// and test the bucketed series for stationarity (augmented Dickey-Fuller).
//
// Buckets are contiguous: a month with no spending is a 0, not a gap.

use crate::config::TimeSeriesConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{AnalysisError, Result};
use crate::record::{Column, RecordTable};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// BUCKETS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketWidth {
    Daily,
    Weekly, // Monday-based
    Monthly,
    Quarterly,
}

impl BucketWidth {
    /// Ordinal of the bucket containing `date`; consecutive buckets differ by 1.
    pub fn index(&self, date: NaiveDate) -> i64 {
        let year = date.year() as i64;
        let month0 = date.month0() as i64;
        match self {
            BucketWidth::Daily => date.num_days_from_ce() as i64,
            // 0001-01-01 is a Monday and day 1 of the common era.
            BucketWidth::Weekly => (date.num_days_from_ce() as i64 - 1).div_euclid(7),
            BucketWidth::Monthly => year * 12 + month0,
            BucketWidth::Quarterly => year * 4 + month0 / 3,
        }
    }

    pub fn label(&self, index: i64) -> String {
        let from_days = |days: i64| {
            i32::try_from(days)
                .ok()
                .and_then(NaiveDate::from_num_days_from_ce_opt)
                .map_or_else(|| index.to_string(), |d| d.format("%Y-%m-%d").to_string())
        };
        match self {
            BucketWidth::Daily => from_days(index),
            BucketWidth::Weekly => from_days(index * 7 + 1),
            BucketWidth::Monthly => {
                format!("{:04}-{:02}", index.div_euclid(12), index.rem_euclid(12) + 1)
            }
            BucketWidth::Quarterly => {
                format!("{:04}-Q{}", index.div_euclid(4), index.rem_euclid(4) + 1)
            }
        }
    }
}

// ============================================================================
// RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesDecomposition {
    pub value_field: Column,
    pub period: usize,
    pub bucket: BucketWidth,
    pub bucket_labels: Vec<String>,
    pub observed: Vec<f64>,
    /// Centered moving average. The first and last `period / 2` buckets are
    /// averages over the partial window that fits.
    pub trend: Vec<f64>,
    pub seasonal: Vec<f64>,
    pub residual: Vec<f64>,
    /// `None` when the ADF regression could not be fitted; see `adf_error`.
    pub adf: Option<AdfResult>,
    pub adf_error: Option<String>,
    pub is_stationary: Option<bool>,
}

impl SeriesDecomposition {
    pub fn len(&self) -> usize {
        self.observed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observed.is_empty()
    }

    pub fn summary(&self) -> String {
        let stationarity = match (&self.adf, self.is_stationary) {
            (Some(adf), Some(stationary)) => format!(
                "ADF {:.3} (lags {}), p = {:.4} -> {}",
                adf.statistic,
                adf.lags,
                adf.p_value,
                if stationary { "stationary" } else { "non-stationary" }
            ),
            _ => format!("ADF unavailable: {}", self.adf_error.as_deref().unwrap_or("-")),
        };
        format!(
            "{} {:?} buckets ({} .. {}), period {}; {}",
            self.len(),
            self.bucket,
            self.bucket_labels.first().map_or("-", String::as_str),
            self.bucket_labels.last().map_or("-", String::as_str),
            self.period,
            stationarity
        )
    }
}

// ============================================================================
// DECOMPOSER
// ============================================================================

pub struct Decomposer {
    pub bucket: BucketWidth,
    pub stationarity_alpha: f64,
    pub adf_lags: Option<usize>,
}

impl Decomposer {
    pub fn new(bucket: BucketWidth) -> Self {
        Decomposer {
            bucket,
            stationarity_alpha: 0.05,
            adf_lags: None,
        }
    }

    pub fn from_config(config: &TimeSeriesConfig) -> Self {
        Decomposer {
            bucket: config.bucket,
            stationarity_alpha: config.stationarity_alpha,
            adf_lags: config.adf_lags,
        }
    }

    pub fn decompose(
        &self,
        table: &RecordTable,
        value_field: Column,
        period: usize,
        diag: &mut Diagnostics,
    ) -> Result<SeriesDecomposition> {
        if period < 2 {
            return Err(AnalysisError::Computation(format!(
                "period must be at least 2, got {}",
                period
            )));
        }
        table.require_columns(&[Column::Date, value_field])?;

        let (labels, observed) = self.bucket_series(table, value_field, diag);
        let required = 2 * period;
        if observed.len() < required {
            return Err(AnalysisError::InsufficientHistory {
                required,
                available: observed.len(),
            });
        }

        let trend = centered_moving_average(&observed, period);
        let seasonal = seasonal_component(&observed, &trend, period);
        let residual: Vec<f64> = observed
            .iter()
            .zip(&trend)
            .zip(&seasonal)
            .map(|((o, t), s)| o - t - s)
            .collect();

        // The decomposition stands on its own; a failed stationarity test is
        // reported next to it.
        let (adf, adf_error) = match adf_test(&observed, self.adf_lags) {
            Ok(adf) => (Some(adf), None),
            Err(e) => {
                diag.warn(format!("stationarity test failed: {}", e));
                (None, Some(e.to_string()))
            }
        };
        let is_stationary = adf.as_ref().map(|a| a.p_value < self.stationarity_alpha);

        let decomposition = SeriesDecomposition {
            value_field,
            period,
            bucket: self.bucket,
            bucket_labels: labels,
            observed,
            trend,
            seasonal,
            residual,
            adf,
            adf_error,
            is_stationary,
        };

        diag.info(format!("decomposed: {}", decomposition.summary()));
        Ok(decomposition)
    }

    /// Sum `value_field` into contiguous buckets from the first to the last date.
    fn bucket_series(
        &self,
        table: &RecordTable,
        value_field: Column,
        diag: &mut Diagnostics,
    ) -> (Vec<String>, Vec<f64>) {
        let mut sums: BTreeMap<i64, f64> = BTreeMap::new();
        let mut skipped = 0;

        for record in table.records() {
            match (record.parsed_date(), record.numeric(value_field)) {
                (Some(date), Some(value)) => *sums.entry(self.bucket.index(date)).or_insert(0.0) += value,
                _ => skipped += 1,
            }
        }

        if skipped > 0 {
            diag.warn(format!(
                "skipped {} record(s) without a parseable date or {}",
                skipped, value_field
            ));
        }

        let (first, last) = match (sums.keys().next(), sums.keys().next_back()) {
            (Some(&first), Some(&last)) => (first, last),
            _ => return (Vec::new(), Vec::new()),
        };

        (first..=last)
            .map(|i| (self.bucket.label(i), sums.get(&i).copied().unwrap_or(0.0)))
            .unzip()
    }
}

impl Default for Decomposer {
    fn default() -> Self {
        Self::from_config(&TimeSeriesConfig::default())
    }
}

/// Centered moving average. Even windows use the 2xMA weighting (half weight
/// on both ends); near the edges the window shrinks to what is available.
fn centered_moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let half_w = window / 2;
    let mut result = vec![0.0; n];

    for i in 0..n {
        let start = i.saturating_sub(half_w);
        let end = (i + half_w + 1).min(n);

        if window % 2 == 0 && i >= half_w && i + half_w < n {
            let mut sum = 0.0;
            let mut weight = 0.0;
            for j in start..end {
                let w = if j == start || j == end - 1 { 0.5 } else { 1.0 };
                sum += values[j] * w;
                weight += w;
            }
            result[i] = sum / weight;
        } else {
            result[i] = values[start..end].iter().sum::<f64>() / (end - start) as f64;
        }
    }

    result
}

/// Mean deviation from trend per phase, taken over buckets with a full
/// window, centered to zero and repeated across the whole series.
fn seasonal_component(observed: &[f64], trend: &[f64], period: usize) -> Vec<f64> {
    let n = observed.len();
    let half_w = period / 2;
    let mut phase_sum = vec![0.0; period];
    let mut phase_count = vec![0usize; period];

    for i in half_w..n.saturating_sub(half_w) {
        phase_sum[i % period] += observed[i] - trend[i];
        phase_count[i % period] += 1;
    }

    let mut pattern: Vec<f64> = phase_sum
        .iter()
        .zip(&phase_count)
        .map(|(s, &c)| if c > 0 { s / c as f64 } else { 0.0 })
        .collect();

    let mean = pattern.iter().sum::<f64>() / period as f64;
    for p in pattern.iter_mut() {
        *p -= mean;
    }

    (0..n).map(|i| pattern[i % period]).collect()
}

// ============================================================================
// AUGMENTED DICKEY-FULLER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdfResult {
    /// t-statistic of the lagged level coefficient.
    pub statistic: f64,
    pub p_value: f64,
    /// Lagged differences actually used.
    pub lags: usize,
    /// Upper bound the lag search started from.
    pub max_lag: usize,
    pub n_obs: usize,
}

/// Schwert's rule of thumb, 12 * (n/100)^(1/4) rounded up, capped so the
/// regression keeps at least half the series.
pub fn schwert_max_lag(n: usize) -> usize {
    let schwert = (12.0 * (n as f64 / 100.0).powf(0.25)).ceil() as usize;
    schwert.min((n / 2).saturating_sub(2))
}

/// ADF test with a constant:
/// `dy_t = a + b*y_{t-1} + sum_i g_i*dy_{t-i} + e_t`, statistic = b / se(b).
///
/// With `lags = None` the lag order is picked by AIC among 0..=`schwert_max_lag(n)`,
/// all candidates fitted on the same sample. A fixed `lags` is used as given.
/// Either way a singular regression is retried with one lag fewer.
///
/// A regression that fits exactly with no level effect is a deterministic
/// unit root: statistic 0.
pub fn adf_test(series: &[f64], lags: Option<usize>) -> Result<AdfResult> {
    let n = series.len();
    if n < 4 {
        return Err(AnalysisError::InsufficientHistory {
            required: 4,
            available: n,
        });
    }

    let (start, max_lag) = match lags {
        Some(lags) => (lags, lags),
        None => {
            let max_lag = schwert_max_lag(n);
            (select_lag_by_aic(series, max_lag).unwrap_or(max_lag), max_lag)
        }
    };
    let mut last_error = None;

    for lags in (0..=start).rev() {
        match adf_regression(series, lags) {
            Ok((statistic, n_obs)) => {
                return Ok(AdfResult {
                    statistic,
                    p_value: mackinnon_p_value(statistic),
                    lags,
                    max_lag,
                    n_obs,
                });
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(last_error.unwrap_or_else(|| {
        AnalysisError::Computation("ADF regression could not be fitted".to_string())
    }))
}

/// Lag order with the lowest AIC; ties go to fewer lags. `None` if no
/// candidate regression could be fitted.
fn select_lag_by_aic(y: &[f64], max_lag: usize) -> Option<usize> {
    let first = max_lag + 1;
    let mut best: Option<(usize, f64)> = None;

    for lags in 0..=max_lag {
        let (rows, response) = adf_design(y, lags, first);
        let Some(fit) = fit_ols(&rows, &response) else {
            continue;
        };
        // Gaussian AIC up to a constant shared by every candidate.
        let m = fit.n_obs as f64;
        let aic = m * (fit.ssr / m).ln() + 2.0 * (lags + 2) as f64;
        if best.map_or(true, |(_, b)| aic < b) {
            best = Some((lags, aic));
        }
    }

    best.map(|(lags, _)| lags)
}

/// Regressors `[1, y_{t-1}, dy_{t-1} .. dy_{t-lags}]` and response `dy_t`
/// for `t` in `first..n`.
fn adf_design(y: &[f64], lags: usize, first: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut rows = Vec::new();
    let mut response = Vec::new();
    for t in first..y.len() {
        let mut x = Vec::with_capacity(lags + 2);
        x.push(1.0);
        x.push(y[t - 1]);
        for i in 1..=lags {
            x.push(y[t - i] - y[t - i - 1]);
        }
        rows.push(x);
        response.push(y[t] - y[t - 1]);
    }
    (rows, response)
}

struct OlsFit {
    beta: Vec<f64>,
    inverse: Vec<Vec<f64>>,
    ssr: f64,
    n_obs: usize,
}

/// Least squares via the normal equations; `None` when there are no residual
/// degrees of freedom or `X'X` is singular.
fn fit_ols(rows: &[Vec<f64>], response: &[f64]) -> Option<OlsFit> {
    let k = rows.first()?.len();
    let m = rows.len();
    if m <= k {
        return None;
    }

    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for (x, dy) in rows.iter().zip(response) {
        for i in 0..k {
            xty[i] += x[i] * dy;
            for j in 0..k {
                xtx[i][j] += x[i] * x[j];
            }
        }
    }

    let inverse = invert(&xtx)?;
    let beta: Vec<f64> = (0..k)
        .map(|i| (0..k).map(|j| inverse[i][j] * xty[j]).sum())
        .collect();

    let ssr: f64 = rows
        .iter()
        .zip(response)
        .map(|(x, dy)| {
            let fitted: f64 = x.iter().zip(&beta).map(|(a, b)| a * b).sum();
            (dy - fitted).powi(2)
        })
        .sum();

    Some(OlsFit {
        beta,
        inverse,
        ssr,
        n_obs: m,
    })
}

fn adf_regression(y: &[f64], lags: usize) -> Result<(f64, usize)> {
    let (rows, response) = adf_design(y, lags, lags + 1);
    let k = lags + 2;
    if rows.len() <= k {
        return Err(AnalysisError::Computation(format!(
            "{} observations for {} regressors",
            rows.len(),
            k
        )));
    }

    let fit = fit_ols(&rows, &response).ok_or_else(|| {
        AnalysisError::Computation(format!("singular ADF regression at {} lag(s)", lags))
    })?;
    let m = fit.n_obs;

    let total: f64 = response.iter().map(|v| v * v).sum();
    if fit.ssr <= 1e-20 * total {
        let (lo, hi) = rows
            .iter()
            .map(|x| x[1])
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
        let dy_scale = response.iter().fold(0.0, |acc: f64, v| acc.max(v.abs()));
        if fit.beta[1].abs() * (hi - lo) <= 1e-8 * dy_scale {
            return Ok((0.0, m));
        }
        return Err(AnalysisError::Computation(
            "ADF regression fits exactly with a level effect; statistic undefined".to_string(),
        ));
    }

    let sigma2 = fit.ssr / (m - k) as f64;
    let se = (sigma2 * fit.inverse[1][1]).sqrt();
    let statistic = fit.beta[1] / se;
    if !statistic.is_finite() {
        return Err(AnalysisError::Computation(format!(
            "non-finite ADF statistic at {} lag(s)",
            lags
        )));
    }

    Ok((statistic, m))
}

/// Gauss-Jordan inverse with partial pivoting; `None` when singular.
fn invert(a: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let k = a.len();
    let scale = (0..k).map(|i| a[i][i].abs()).fold(0.0, f64::max).max(f64::MIN_POSITIVE);
    let mut m: Vec<Vec<f64>> = a
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut r = row.clone();
            r.extend((0..k).map(|j| if i == j { 1.0 } else { 0.0 }));
            r
        })
        .collect();

    for col in 0..k {
        let pivot_row = (col..k).max_by(|&r1, &r2| m[r1][col].abs().total_cmp(&m[r2][col].abs()))?;
        if m[pivot_row][col].abs() <= 1e-10 * scale {
            return None;
        }
        m.swap(col, pivot_row);

        let pivot = m[col][col];
        for v in m[col].iter_mut() {
            *v /= pivot;
        }
        let pivot_values = m[col].clone();
        for (r, row) in m.iter_mut().enumerate() {
            if r == col {
                continue;
            }
            let factor = row[col];
            if factor != 0.0 {
                for (v, p) in row.iter_mut().zip(&pivot_values) {
                    *v -= factor * p;
                }
            }
        }
    }

    Some(m.into_iter().map(|row| row[k..].to_vec()).collect())
}

// MacKinnon (1994) response-surface coefficients, constant-only regression,
// one integrated variable.
const TAU_MAX: f64 = 2.74;
const TAU_MIN: f64 = -18.83;
const TAU_STAR: f64 = -1.61;
const TAU_SMALL_P: [f64; 3] = [2.1659, 1.4412, 0.038269];
const TAU_LARGE_P: [f64; 4] = [1.7339, 0.93202, -0.12745, -0.010368];

/// Approximate p-value of an ADF statistic.
pub fn mackinnon_p_value(statistic: f64) -> f64 {
    if statistic > TAU_MAX {
        return 1.0;
    }
    if statistic < TAU_MIN {
        return 0.0;
    }
    let coefficients: &[f64] = if statistic <= TAU_STAR {
        &TAU_SMALL_P
    } else {
        &TAU_LARGE_P
    };
    let z = coefficients
        .iter()
        .rev()
        .fold(0.0, |acc, c| acc * statistic + c);
    normal_cdf(z)
}

/// Standard normal CDF.
fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Error function (Abramowitz & Stegun 7.1.26, |error| < 1.5e-7).
fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    sign * y
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    /// Deterministic noise in [-0.5, 0.5) (splitmix64 finalizer).
    fn noise(i: usize) -> f64 {
        let mut x = (i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        x ^= x >> 30;
        x = x.wrapping_mul(0xBF58_476D_1CE4_E5B9);
        x ^= x >> 27;
        x = x.wrapping_mul(0x94D0_49BB_1331_11EB);
        x ^= x >> 31;
        (x >> 11) as f64 / (1u64 << 53) as f64 - 0.5
    }

    fn monthly_table(values: &[f64]) -> RecordTable {
        let records = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let date = format!("{:04}-{:02}-15", 2020 + i / 12, i % 12 + 1);
                Record::payment("Roads", "Acme", *v).with_date(&date)
            })
            .collect();
        RecordTable::from_records(records)
    }

    fn seasonal_values(months: usize) -> Vec<f64> {
        (0..months)
            .map(|t| {
                let season = [5.0, 3.0, 0.0, -2.0, -4.0, -6.0, -4.0, -1.0, 1.0, 2.0, 3.0, 3.0][t % 12];
                1000.0 + 4.0 * t as f64 + 50.0 * season + 20.0 * noise(t)
            })
            .collect()
    }

    #[test]
    fn test_components_add_back_to_observed() {
        let table = monthly_table(&seasonal_values(36));
        let result = Decomposer::default()
            .decompose(&table, Column::Amount, 12, &mut Diagnostics::new())
            .unwrap();

        println!("{}", result.summary());

        assert_eq!(result.len(), 36);
        assert_eq!(result.bucket_labels[0], "2020-01");
        assert_eq!(result.bucket_labels[35], "2022-12");
        for i in 0..result.len() {
            let rebuilt = result.trend[i] + result.seasonal[i] + result.residual[i];
            assert!((rebuilt - result.observed[i]).abs() < 1e-9);
        }

        // Seasonal pattern repeats and is centered.
        assert_eq!(result.seasonal[0], result.seasonal[12]);
        let one_period: f64 = result.seasonal[..12].iter().sum();
        assert!(one_period.abs() < 1e-9);

        // January should come out above June.
        assert!(result.seasonal[0] > result.seasonal[5]);
    }

    #[test]
    fn test_too_few_buckets_is_insufficient_history() {
        let table = monthly_table(&seasonal_values(23));
        let err = Decomposer::default()
            .decompose(&table, Column::Amount, 12, &mut Diagnostics::new())
            .unwrap_err();

        assert_eq!(
            err,
            AnalysisError::InsufficientHistory {
                required: 24,
                available: 23
            }
        );
    }

    #[test]
    fn test_linear_trend_is_not_stationary() {
        // 12 monthly buckets, linear growth, no seasonality.
        let values: Vec<f64> = (0..12).map(|t| 100.0 + 10.0 * t as f64 + noise(t)).collect();

        let adf = adf_test(&values, None).unwrap();
        assert_eq!(adf.max_lag, 4);
        assert_eq!(adf.lags, 3);
        assert!(adf.p_value >= 0.05, "p = {}", adf.p_value);

        let result = Decomposer::default()
            .decompose(&monthly_table(&values), Column::Amount, 6, &mut Diagnostics::new())
            .unwrap();
        assert_eq!(result.is_stationary, Some(false));
        assert_eq!(result.adf, Some(adf));
    }

    #[test]
    fn test_exact_line_is_a_unit_root() {
        let values: Vec<f64> = (0..12).map(|t| 100.0 + 10.0 * t as f64).collect();

        let adf = adf_test(&values, None).unwrap();

        assert_eq!(adf.statistic, 0.0);
        assert_eq!(adf.lags, 0);
        assert!(adf.p_value > 0.9, "p = {}", adf.p_value);
    }

    #[test]
    fn test_exact_line_decomposes_as_non_stationary() {
        for (months, period) in [(12, 6), (24, 12)] {
            let values: Vec<f64> = (0..months).map(|t| 100.0 + 10.0 * t as f64).collect();

            let result = Decomposer::default()
                .decompose(&monthly_table(&values), Column::Amount, period, &mut Diagnostics::new())
                .unwrap();

            println!("{}", result.summary());
            assert_eq!(result.len(), months);
            assert_eq!(result.is_stationary, Some(false));
            assert!(result.adf_error.is_none());
        }
    }

    #[test]
    fn test_failed_adf_keeps_decomposition() {
        // Exact geometric decay: dy_t = -0.5 * y_{t-1} with no error term.
        let values: Vec<f64> = (0..24).map(|t| 1024.0 * 0.5f64.powi(t)).collect();
        let mut diag = Diagnostics::new();

        let result = Decomposer::default()
            .decompose(&monthly_table(&values), Column::Amount, 12, &mut diag)
            .unwrap();

        assert_eq!(result.len(), 24);
        assert!(result.adf.is_none());
        assert_eq!(result.is_stationary, None);
        assert!(result.adf_error.as_deref().unwrap().contains("fits exactly"));
        assert!(diag.events().iter().any(|e| e.message.contains("stationarity test failed")));
    }

    #[test]
    fn test_noise_is_stationary() {
        let values: Vec<f64> = (0..60).map(|t| 10.0 * noise(t)).collect();

        let adf = adf_test(&values, None).unwrap();

        assert_eq!(adf.max_lag, 11);
        assert_eq!(adf.lags, 1);
        assert_eq!(adf.n_obs, 58);
        assert!(adf.statistic < -3.0);
        assert!(adf.p_value < 0.05);
    }

    #[test]
    fn test_fixed_lag_override() {
        let values: Vec<f64> = (0..60).map(|t| 10.0 * noise(t)).collect();

        let adf = adf_test(&values, Some(2)).unwrap();

        assert_eq!(adf.lags, 2);
        assert_eq!(adf.max_lag, 2);
        assert_eq!(adf.n_obs, 57);
        assert!(adf.p_value < 0.05);
    }

    #[test]
    fn test_schwert_max_lag() {
        assert_eq!(schwert_max_lag(4), 0);
        assert_eq!(schwert_max_lag(12), 4);
        assert_eq!(schwert_max_lag(60), 11);
        assert_eq!(schwert_max_lag(100), 12);
        assert_eq!(schwert_max_lag(400), 17);
    }

    #[test]
    fn test_gaps_become_zero_buckets() {
        let table = RecordTable::from_records(vec![
            Record::payment("Roads", "Acme", 10.0).with_date("2024-01-03"),
            Record::payment("Roads", "Acme", 5.0).with_date("2024-01-28"),
            Record::payment("Roads", "Acme", 7.0).with_date("2024-04-10"),
            Record::payment("Roads", "Acme", 9.0).with_date("not a date"),
        ]);
        let mut diag = Diagnostics::new();

        let (labels, values) = Decomposer::new(BucketWidth::Monthly).bucket_series(&table, Column::Amount, &mut diag);

        assert_eq!(labels, vec!["2024-01", "2024-02", "2024-03", "2024-04"]);
        assert_eq!(values, vec![15.0, 0.0, 0.0, 7.0]);
        assert!(diag.events().iter().any(|e| e.message.contains("skipped 1")));
    }

    #[test]
    fn test_bucket_labels() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 16).unwrap(); // Thursday
        for (width, label) in [
            (BucketWidth::Daily, "2024-05-16"),
            (BucketWidth::Weekly, "2024-05-13"),
            (BucketWidth::Monthly, "2024-05"),
            (BucketWidth::Quarterly, "2024-Q2"),
        ] {
            assert_eq!(width.label(width.index(date)), label);
        }
    }

    #[test]
    fn test_missing_date_column() {
        let table = RecordTable::from_records(vec![Record::payment("Roads", "Acme", 1.0)]);
        let err = Decomposer::default()
            .decompose(&table, Column::Amount, 12, &mut Diagnostics::new())
            .unwrap_err();
        assert!(matches!(err, AnalysisError::MissingField(_)));
    }

    #[test]
    fn test_p_value_reference_points() {
        assert!((mackinnon_p_value(-2.86) - 0.05).abs() < 0.002);
        assert!(mackinnon_p_value(0.0) > 0.9);
        assert_eq!(mackinnon_p_value(5.0), 1.0);
        assert_eq!(mackinnon_p_value(-25.0), 0.0);
    }
}
