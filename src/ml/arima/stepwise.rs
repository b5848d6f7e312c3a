use std::collections::HashMap;
use tracing::debug;

use super::model::{ArimaModel, ArimaOrder, InformationCriterion};

/// Bounds on the orders the search may visit.
#[derive(Debug, Clone, Copy)]
pub struct SearchLimits {
    pub max_p: usize,
    pub max_q: usize,
    pub max_order: usize,
    pub max_steps: usize,
}

/// One evaluated candidate, kept for diagnostics.
#[derive(Debug, Clone)]
pub struct CandidateTrace {
    pub order: ArimaOrder,
    pub score: Option<f64>,
    pub rejection: Option<String>,
}

/// Stepwise search over (p, q, constant) for a fixed differencing order.
///
/// Starts from a handful of small models, then repeatedly moves to the first
/// neighbour that strictly improves the criterion. Candidates that cannot be
/// estimated are recorded and skipped.
pub struct StepwiseSearch<'a> {
    data: &'a [f64],
    d: usize,
    criterion: InformationCriterion,
    limits: SearchLimits,
    cache: HashMap<(usize, usize, bool), Option<(ArimaModel, f64)>>,
    trace: Vec<CandidateTrace>,
}

impl<'a> StepwiseSearch<'a> {
    pub fn new(data: &'a [f64], d: usize, criterion: InformationCriterion, limits: SearchLimits) -> Self {
        Self {
            data,
            d,
            criterion,
            limits,
            cache: HashMap::new(),
            trace: Vec::new(),
        }
    }

    /// Run the search. `None` when every candidate was rejected.
    pub fn run(mut self) -> (Option<ArimaModel>, Vec<CandidateTrace>) {
        let allow_constant = self.d < 2;
        let mut starts = vec![(2, 2, allow_constant), (0, 0, allow_constant), (1, 0, allow_constant), (0, 1, allow_constant)];
        if allow_constant {
            starts.push((0, 0, false));
        }

        let mut best: Option<((usize, usize, bool), f64)> = None;
        for (p, q, c) in starts {
            if let Some(score) = self.evaluate(p, q, c) {
                if best.map_or(true, |(_, s)| score < s) {
                    best = Some(((p, q, c), score));
                }
            }
        }

        let mut steps = 0;
        while let Some(((p, q, c), score)) = best {
            if steps >= self.limits.max_steps {
                debug!(steps, "stepwise search exhausted its move budget");
                break;
            }
            let mut improved = None;
            for (np, nq, nc) in self.neighbours(p, q, c) {
                if let Some(candidate) = self.evaluate(np, nq, nc) {
                    if candidate < score {
                        improved = Some(((np, nq, nc), candidate));
                        break;
                    }
                }
            }
            match improved {
                Some(next) => {
                    best = Some(next);
                    steps += 1;
                }
                None => break,
            }
        }

        let model = best.and_then(|(key, _)| self.cache.remove(&key).flatten().map(|(m, _)| m));
        (model, self.trace)
    }

    fn neighbours(&self, p: usize, q: usize, c: bool) -> Vec<(usize, usize, bool)> {
        const MOVES: [(isize, isize); 8] = [(-1, 0), (1, 0), (0, -1), (0, 1), (-1, -1), (1, 1), (-1, 1), (1, -1)];
        let mut out = Vec::with_capacity(MOVES.len() + 1);
        for (dp, dq) in MOVES {
            let np = p as isize + dp;
            let nq = q as isize + dq;
            if np < 0 || nq < 0 {
                continue;
            }
            out.push((np as usize, nq as usize, c));
        }
        if self.d < 2 {
            out.push((p, q, !c));
        }
        out.retain(|&(np, nq, _)| np <= self.limits.max_p && nq <= self.limits.max_q && np + nq <= self.limits.max_order);
        out
    }

    fn evaluate(&mut self, p: usize, q: usize, constant: bool) -> Option<f64> {
        if p > self.limits.max_p || q > self.limits.max_q || p + q > self.limits.max_order {
            return None;
        }
        if let Some(cached) = self.cache.get(&(p, q, constant)) {
            return cached.as_ref().map(|(_, s)| *s);
        }

        let order = ArimaOrder::new(p, self.d, q, constant);
        let result = ArimaModel::fit(self.data, order).and_then(|model| {
            let score = model.criterion(self.criterion);
            if score.is_finite() {
                Ok((model, score))
            } else {
                Err(format!("{} has a non-finite {:?}", order, self.criterion))
            }
        });

        let entry = match result {
            Ok((model, score)) => {
                debug!(%order, score, "candidate fitted");
                self.trace.push(CandidateTrace { order, score: Some(score), rejection: None });
                Some((model, score))
            }
            Err(reason) => {
                debug!(%order, %reason, "candidate skipped");
                self.trace.push(CandidateTrace { order, score: None, rejection: Some(reason) });
                None
            }
        };
        let score = entry.as_ref().map(|(_, s)| *s);
        self.cache.insert((p, q, constant), entry);
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn limits() -> SearchLimits {
        SearchLimits { max_p: 5, max_q: 5, max_order: 5, max_steps: 100 }
    }

    fn ar_series(n: usize) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(11);
        let mut data = vec![10.0];
        for i in 1..n {
            let shock: f64 = rng.gen_range(-1.0..1.0);
            data.push(10.0 + 0.6 * (data[i - 1] - 10.0) + shock);
        }
        data
    }

    #[test]
    fn test_search_selects_a_model() {
        let data = ar_series(120);
        let (model, trace) = StepwiseSearch::new(&data, 0, InformationCriterion::Aic, limits()).run();
        let model = model.unwrap();
        assert!(model.aic.is_finite());
        assert!(trace.len() >= 4);
        let best = trace.iter().filter_map(|t| t.score).fold(f64::INFINITY, f64::min);
        assert_eq!(model.aic, best);
    }

    #[test]
    fn test_search_is_deterministic() {
        let data = ar_series(80);
        let (a, _) = StepwiseSearch::new(&data, 0, InformationCriterion::Bic, limits()).run();
        let (b, _) = StepwiseSearch::new(&data, 0, InformationCriterion::Bic, limits()).run();
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.order, b.order);
        assert_eq!(a.ar_coeffs, b.ar_coeffs);
        assert_eq!(a.forecast(5), b.forecast(5));
    }

    #[test]
    fn test_limits_bound_the_neighbourhood() {
        let data = ar_series(40);
        let search = StepwiseSearch::new(&data, 1, InformationCriterion::Aic, SearchLimits { max_p: 1, max_q: 1, max_order: 1, max_steps: 10 });
        let neighbours = search.neighbours(1, 0, true);
        assert!(neighbours.iter().all(|(p, q, _)| p + q <= 1));
        assert!(neighbours.contains(&(1, 0, false)));

        let search = StepwiseSearch::new(&data, 2, InformationCriterion::Aic, limits());
        assert!(search.neighbours(0, 0, false).iter().all(|(_, _, c)| !c));
    }

    #[test]
    fn test_too_short_series_rejects_everything() {
        let data = [1.0, 2.0];
        let (model, trace) = StepwiseSearch::new(&data, 0, InformationCriterion::Aic, limits()).run();
        assert!(model.is_none());
        assert!(trace.iter().all(|t| t.rejection.is_some()));
    }
}
