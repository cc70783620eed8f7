//! QUEST adaptive threshold estimation (Watson & Pelli, 1983).
//!
//! The posterior over threshold lives on a fixed grid of offsets around the
//! starting guess. Each response multiplies it by a Weibull likelihood whose
//! origin is shifted so that a stimulus exactly at threshold is detected with
//! probability `p_threshold`.

use serde::{Deserialize, Serialize};

use crate::EstimatorError;

/// Adaptive estimator driven by binary responses
pub trait Estimator {
    /// Intensity to present next, clamped to the estimator's bounds.
    fn next_intensity(&mut self) -> Result<f64, EstimatorError>;

    /// Fold in one response at the intensity actually presented.
    fn add_response(&mut self, intensity: f64, correct: bool);

    fn trial_count(&self) -> usize;

    fn state(&self) -> EstimatorState;

    fn threshold(&self) -> Option<ThresholdEstimate> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimatorState {
    Fresh,
    HasHistory,
    /// The design trial budget is used up; further calls are still accepted
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdEstimate {
    pub mean: f64,
    pub sd: f64,
}

/// Which posterior statistic becomes the next intensity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EstimateMethod {
    Quantile { q: f64 },
    Mean,
    Mode,
}

impl Default for EstimateMethod {
    fn default() -> Self {
        EstimateMethod::Quantile { q: 0.5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestParams {
    pub start: f64,
    pub start_sd: f64,
    pub p_threshold: f64,
    pub beta: f64,
    pub delta: f64,
    pub gamma: f64,
    pub grain: f64,
    /// Width of the threshold grid around `start`
    pub range: f64,
    pub min: f64,
    pub max: f64,
    /// Design trial budget
    pub trials: usize,
    pub method: EstimateMethod,
}

impl Default for QuestParams {
    fn default() -> Self {
        Self {
            start: 4.0,
            start_sd: 0.5,
            p_threshold: 0.75,
            beta: 3.5,
            delta: 0.01,
            gamma: 0.5,
            grain: 0.01,
            range: 5.0,
            min: 1.0,
            max: 7.0,
            trials: 20,
            method: EstimateMethod::default(),
        }
    }
}

impl QuestParams {
    pub fn validate(&self) -> Result<(), EstimatorError> {
        let invalid = |msg: String| Err(EstimatorError::InvalidParams(msg));
        let finite = [
            self.start,
            self.start_sd,
            self.p_threshold,
            self.beta,
            self.delta,
            self.gamma,
            self.grain,
            self.range,
            self.min,
            self.max,
        ];
        if finite.iter().any(|v| !v.is_finite()) {
            return invalid("parameters must be finite".into());
        }
        if self.start_sd <= 0.0 || self.grain <= 0.0 || self.range <= 0.0 || self.beta <= 0.0 {
            return invalid("start_sd, grain, range and beta must be positive".into());
        }
        if self.range / self.grain > 100_000.0 {
            return invalid(format!(
                "grid of {} points is too fine",
                self.range / self.grain
            ));
        }
        if !(0.0..1.0).contains(&self.delta) || !(0.0..1.0).contains(&self.gamma) {
            return invalid("delta and gamma must lie in [0, 1)".into());
        }
        if !(self.p_threshold > self.gamma && self.p_threshold < 1.0) {
            return invalid(format!(
                "p_threshold {} must lie between gamma {} and 1",
                self.p_threshold, self.gamma
            ));
        }
        if self.min > self.max {
            return invalid(format!("min {} exceeds max {}", self.min, self.max));
        }
        if !(self.min..=self.max).contains(&self.start) {
            return invalid(format!(
                "start {} outside [{}, {}]",
                self.start, self.min, self.max
            ));
        }
        if let EstimateMethod::Quantile { q } = self.method {
            if !(0.0..=1.0).contains(&q) {
                return invalid(format!("quantile {q} outside [0, 1]"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Quest {
    params: QuestParams,
    half: i64,
    /// Threshold offsets from `start`, one per grid point
    x: Vec<f64>,
    pdf: Vec<f64>,
    /// P(positive response) at stimulus-minus-threshold offsets, on a grid
    /// twice as wide as `x`
    p2: Vec<f64>,
    history: Vec<(f64, bool)>,
    degenerate: bool,
}

impl Quest {
    pub fn new(params: QuestParams) -> Result<Self, EstimatorError> {
        params.validate()?;

        let half = (params.range / params.grain / 2.0).ceil() as i64;
        let dim = 2 * half;
        let grain = params.grain;

        let x: Vec<f64> = (-half..=half).map(|i| i as f64 * grain).collect();
        let mut pdf: Vec<f64> = x
            .iter()
            .map(|x| (-0.5 * (x / params.start_sd).powi(2)).exp())
            .collect();
        let total: f64 = pdf.iter().sum();
        pdf.iter_mut().for_each(|p| *p /= total);

        let x2: Vec<f64> = (-dim..=dim).map(|i| i as f64 * grain).collect();
        let unshifted: Vec<f64> = x2.iter().map(|&x| weibull(&params, x)).collect();
        let shift = threshold_offset(&unshifted, &x2, params.p_threshold).ok_or_else(|| {
            EstimatorError::InvalidParams("psychometric function is flat over the grid".into())
        })?;
        let p2 = x2.iter().map(|&x| weibull(&params, x + shift)).collect();

        Ok(Self {
            params,
            half,
            x,
            pdf,
            p2,
            history: Vec::new(),
            degenerate: false,
        })
    }

    pub fn history(&self) -> &[(f64, bool)] {
        &self.history
    }

    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }

    /// Posterior mean threshold.
    pub fn mean(&self) -> f64 {
        let total: f64 = self.pdf.iter().sum();
        let weighted: f64 = self.pdf.iter().zip(&self.x).map(|(p, x)| p * x).sum();
        self.params.start + weighted / total
    }

    /// Posterior mode (grid point of highest density).
    pub fn mode(&self) -> f64 {
        let best = self
            .pdf
            .iter()
            .enumerate()
            .fold(0, |best, (i, p)| if *p > self.pdf[best] { i } else { best });
        self.params.start + self.x[best]
    }

    pub fn quantile(&self, q: f64) -> f64 {
        let total: f64 = self.pdf.iter().sum();
        let target = q * total;
        let mut cumulative = 0.0;
        for (i, p) in self.pdf.iter().enumerate() {
            let next = cumulative + p;
            if next >= target {
                if i == 0 || *p <= 0.0 {
                    return self.params.start + self.x[i];
                }
                let frac = (target - cumulative) / p;
                let x = self.x[i - 1] + frac * (self.x[i] - self.x[i - 1]);
                return self.params.start + x;
            }
            cumulative = next;
        }
        self.params.start + self.x[self.x.len() - 1]
    }

    /// Posterior standard deviation.
    pub fn sd(&self) -> f64 {
        let total: f64 = self.pdf.iter().sum();
        let mean: f64 = self.pdf.iter().zip(&self.x).map(|(p, x)| p * x).sum::<f64>() / total;
        let second: f64 = self.pdf.iter().zip(&self.x).map(|(p, x)| p * x * x).sum::<f64>() / total;
        (second - mean * mean).max(0.0).sqrt()
    }

    fn estimate(&self) -> f64 {
        match self.params.method {
            EstimateMethod::Quantile { q } => self.quantile(q),
            EstimateMethod::Mean => self.mean(),
            EstimateMethod::Mode => self.mode(),
        }
    }
}

impl Estimator for Quest {
    fn next_intensity(&mut self) -> Result<f64, EstimatorError> {
        if self.degenerate {
            return Err(EstimatorError::Degenerate);
        }
        let estimate = self.estimate();
        if !estimate.is_finite() {
            return Err(EstimatorError::NonFinite(estimate));
        }
        Ok(estimate.clamp(self.params.min, self.params.max))
    }

    fn add_response(&mut self, intensity: f64, correct: bool) {
        self.history.push((intensity, correct));
        if self.degenerate {
            return;
        }

        // Offset of the stimulus from the starting guess, in grid steps,
        // limited so the lookup window stays inside the likelihood table.
        let steps = ((intensity - self.params.start) / self.params.grain).round();
        let k = if steps.is_finite() {
            (steps as i64).clamp(-self.half, self.half)
        } else {
            0
        };
        let dim = 2 * self.half;

        for (idx, p) in self.pdf.iter_mut().enumerate() {
            let i = idx as i64 - self.half;
            let j = (dim - i + k) as usize;
            let likelihood = self.p2[j];
            *p *= if correct { likelihood } else { 1.0 - likelihood };
        }

        let total: f64 = self.pdf.iter().sum();
        if total.is_finite() && total > 0.0 {
            self.pdf.iter_mut().for_each(|p| *p /= total);
        } else {
            self.degenerate = true;
        }
    }

    fn trial_count(&self) -> usize {
        self.history.len()
    }

    fn state(&self) -> EstimatorState {
        match self.history.len() {
            0 => EstimatorState::Fresh,
            n if n >= self.params.trials => EstimatorState::Exhausted,
            _ => EstimatorState::HasHistory,
        }
    }

    fn threshold(&self) -> Option<ThresholdEstimate> {
        if self.degenerate {
            return None;
        }
        Some(ThresholdEstimate {
            mean: self.mean(),
            sd: self.sd(),
        })
    }
}

fn weibull(params: &QuestParams, x: f64) -> f64 {
    let QuestParams {
        beta, delta, gamma, ..
    } = *params;
    delta * gamma + (1.0 - delta) * (1.0 - (1.0 - gamma) * (-(10f64.powf(beta * x))).exp())
}

/// Offset at which `p` crosses `target`, interpolated over the points where
/// `p` is still changing.
fn threshold_offset(p: &[f64], x: &[f64], target: f64) -> Option<f64> {
    let points: Vec<(f64, f64)> = p
        .windows(2)
        .zip(x)
        .filter(|(w, _)| w[1] != w[0])
        .map(|(w, x)| (w[0], *x))
        .collect();
    let (first, last) = (points.first()?, points.last()?);
    if points.len() < 2 {
        return None;
    }
    if target <= first.0 {
        return Some(first.1);
    }
    if target >= last.0 {
        return Some(last.1);
    }
    points.windows(2).find_map(|w| {
        let ((p0, x0), (p1, x1)) = (w[0], w[1]);
        (target >= p0 && target <= p1).then(|| x0 + (target - p0) / (p1 - p0) * (x1 - x0))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn quest() -> Quest {
        Quest::new(QuestParams::default()).unwrap()
    }

    #[test]
    fn fresh_estimate_is_the_starting_guess() {
        let mut q = quest();
        assert_eq!(q.state(), EstimatorState::Fresh);
        let first = q.next_intensity().unwrap();
        assert!((first - 4.0).abs() < 0.02, "got {first}");
        assert!((q.mean() - 4.0).abs() < 0.02);
        assert!((q.sd() - 0.5).abs() < 0.02);
    }

    #[test]
    fn shifted_likelihood_hits_target_at_threshold() {
        let q = quest();
        let dim = 2 * q.half as usize;
        assert!((q.p2[dim] - 0.75).abs() < 1e-3, "got {}", q.p2[dim]);
        assert!(q.p2.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn next_stays_within_bounds_for_any_responses() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..40 {
            let mut q = quest();
            for _ in 0..40 {
                let level = q.next_intensity().unwrap();
                assert!((1.0..=7.0).contains(&level), "out of bounds: {level}");
                q.add_response(level.round(), rng.random_bool(0.5));
            }
            let level = q.next_intensity().unwrap();
            assert!((1.0..=7.0).contains(&level));
        }
    }

    #[test]
    fn extreme_presented_levels_stay_in_bounds() {
        let mut q = quest();
        for _ in 0..30 {
            q.add_response(1e9, false);
        }
        assert!(!q.is_degenerate());
        let high = q.next_intensity().unwrap();
        assert!(high > 5.5 && high <= 7.0, "got {high}");

        let mut q = quest();
        for _ in 0..30 {
            q.add_response(-1e9, true);
        }
        let low = q.next_intensity().unwrap();
        assert!((1.0..2.5).contains(&low), "got {low}");
    }

    #[test]
    fn trial_count_tracks_responses() {
        let mut q = quest();
        for n in 1..=20 {
            let level = q.next_intensity().unwrap();
            q.add_response(level, n % 3 == 0);
            assert_eq!(q.trial_count(), n);
            assert_eq!(q.history().len(), n);
            assert_eq!(q.history()[n - 1], (level, n % 3 == 0));
        }
        assert_eq!(q.state(), EstimatorState::Exhausted);

        // Still usable past the budget.
        q.add_response(4.0, true);
        assert_eq!(q.trial_count(), 21);
        assert!(q.next_intensity().is_ok());
    }

    #[test]
    fn state_moves_from_fresh_to_history() {
        let mut q = quest();
        q.add_response(4.0, true);
        assert_eq!(q.state(), EstimatorState::HasHistory);
    }

    #[test]
    fn detections_lower_and_misses_raise_the_estimate() {
        let mut down = quest();
        let mut up = quest();
        for _ in 0..10 {
            let level = down.next_intensity().unwrap().round();
            down.add_response(level, true);
            let level = up.next_intensity().unwrap().round();
            up.add_response(level, false);
        }
        assert!(down.next_intensity().unwrap() < 4.0);
        assert!(up.next_intensity().unwrap() > 4.0);
    }

    #[test]
    fn converges_toward_a_simulated_threshold() {
        let params = QuestParams {
            start_sd: 2.0,
            ..QuestParams::default()
        };
        let mut q = Quest::new(params.clone()).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let true_threshold = 5.0;
        for _ in 0..200 {
            let level = q.next_intensity().unwrap();
            let p = weibull(&params, level - true_threshold + shift_for(&params));
            q.add_response(level, rng.random_bool(p));
        }
        let estimate = q.mean();
        assert!((estimate - true_threshold).abs() < 0.6, "estimate {estimate}");
    }

    fn shift_for(params: &QuestParams) -> f64 {
        let q = Quest::new(params.clone()).unwrap();
        let dim = 2 * q.half;
        let x2: Vec<f64> = (-dim..=dim).map(|i| i as f64 * params.grain).collect();
        let raw: Vec<f64> = x2.iter().map(|&x| weibull(params, x)).collect();
        threshold_offset(&raw, &x2, params.p_threshold).unwrap()
    }

    #[test]
    fn estimate_methods_agree_on_a_fresh_prior() {
        for method in [
            EstimateMethod::Mean,
            EstimateMethod::Mode,
            EstimateMethod::Quantile { q: 0.5 },
        ] {
            let mut q = Quest::new(QuestParams {
                method,
                ..QuestParams::default()
            })
            .unwrap();
            let v = q.next_intensity().unwrap();
            assert!((v - 4.0).abs() < 0.02, "{method:?} gave {v}");
        }
    }

    #[test]
    fn rejects_invalid_parameters() {
        let bad = [
            QuestParams {
                start_sd: 0.0,
                ..QuestParams::default()
            },
            QuestParams {
                min: 8.0,
                ..QuestParams::default()
            },
            QuestParams {
                p_threshold: 0.4,
                ..QuestParams::default()
            },
            QuestParams {
                start: 9.0,
                ..QuestParams::default()
            },
            QuestParams {
                method: EstimateMethod::Quantile { q: 1.5 },
                ..QuestParams::default()
            },
        ];
        for params in bad {
            assert!(matches!(
                Quest::new(params),
                Err(EstimatorError::InvalidParams(_))
            ));
        }
    }

    #[test]
    fn threshold_summary_is_reported() {
        let mut q = quest();
        q.add_response(4.0, true);
        let summary = q.threshold().unwrap();
        assert!(summary.mean < 4.0);
        assert!(summary.sd > 0.0 && summary.sd < 0.5);
    }
}
