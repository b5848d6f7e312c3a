use ndarray::{s, Array1, Array2, Dimension, Zip};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-8;
/// Global gradient norm above which a batch gradient is rescaled.
const CLIP_NORM: f64 = 5.0;

/// Training report after model fit
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub samples: usize,
    pub epochs: usize,
    pub final_loss: f64,
    pub loss_history: Vec<f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct TrainingOptions {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
}

/// Weights of a single-layer LSTM over scalar inputs plus a linear head.
/// Gate blocks are stacked as [input, forget, candidate, output].
#[derive(Debug, Clone)]
struct Params {
    w: Array1<f64>,
    u: Array2<f64>,
    b: Array1<f64>,
    head_w: Array2<f64>,
    head_b: Array1<f64>,
}

impl Params {
    fn zeros(hidden: usize, outputs: usize) -> Self {
        Self {
            w: Array1::zeros(4 * hidden),
            u: Array2::zeros((4 * hidden, hidden)),
            b: Array1::zeros(4 * hidden),
            head_w: Array2::zeros((outputs, hidden)),
            head_b: Array1::zeros(outputs),
        }
    }

    fn scale(&mut self, factor: f64) {
        self.w.mapv_inplace(|v| v * factor);
        self.u.mapv_inplace(|v| v * factor);
        self.b.mapv_inplace(|v| v * factor);
        self.head_w.mapv_inplace(|v| v * factor);
        self.head_b.mapv_inplace(|v| v * factor);
    }

    fn norm(&self) -> f64 {
        let sq = |a: f64, v: &f64| a + v * v;
        let total = self.w.iter().fold(0.0, sq)
            + self.u.iter().fold(0.0, sq)
            + self.b.iter().fold(0.0, sq)
            + self.head_w.iter().fold(0.0, sq)
            + self.head_b.iter().fold(0.0, sq);
        total.sqrt()
    }
}

/// Per-step activations kept for backpropagation through time.
struct StepCache {
    x: f64,
    h_prev: Array1<f64>,
    c_prev: Array1<f64>,
    i: Array1<f64>,
    f: Array1<f64>,
    g: Array1<f64>,
    o: Array1<f64>,
    c: Array1<f64>,
    tanh_c: Array1<f64>,
}

struct Adam {
    m: Params,
    v: Params,
    t: i32,
}

/// Sequence-to-horizon regressor: reads a window one value at a time and maps
/// the final hidden state to every horizon step at once.
pub struct LstmNetwork {
    hidden: usize,
    outputs: usize,
    params: Params,
    rng: StdRng,
}

impl LstmNetwork {
    /// New network. With `seed` the initial weights and batch order are
    /// reproducible; without it they come from OS entropy.
    pub fn new(hidden: usize, outputs: usize, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let limit = (1.0 / hidden as f64).sqrt();
        let mut params = Params::zeros(hidden, outputs);
        params.w.mapv_inplace(|_| rng.gen_range(-limit..limit));
        params.u.mapv_inplace(|_| rng.gen_range(-limit..limit));
        params.head_w.mapv_inplace(|_| rng.gen_range(-limit..limit));
        // Forget gate starts open
        params.b.slice_mut(s![hidden..2 * hidden]).fill(1.0);

        Self {
            hidden,
            outputs,
            params,
            rng,
        }
    }

    pub fn outputs(&self) -> usize {
        self.outputs
    }

    pub fn predict(&self, input: &[f64]) -> Vec<f64> {
        let (h, _) = self.forward(input);
        self.head(&h).to_vec()
    }

    /// Train on `inputs[n, seq_len]` against `targets[n, outputs]` with Adam
    /// and mean squared error, reshuffling the samples every epoch.
    pub fn train(&mut self, inputs: &Array2<f64>, targets: &Array2<f64>, options: TrainingOptions) -> TrainingReport {
        let samples = inputs.nrows();
        let batch_size = options.batch_size.max(1).min(samples.max(1));
        let mut adam = Adam {
            m: Params::zeros(self.hidden, self.outputs),
            v: Params::zeros(self.hidden, self.outputs),
            t: 0,
        };
        let mut order: Vec<usize> = (0..samples).collect();
        let mut loss_history = Vec::with_capacity(options.epochs);

        for epoch in 0..options.epochs {
            order.shuffle(&mut self.rng);
            let mut epoch_loss = 0.0;

            for batch in order.chunks(batch_size) {
                let mut grads = Params::zeros(self.hidden, self.outputs);
                let denom = (batch.len() * self.outputs) as f64;
                for &row in batch {
                    let input = inputs.row(row).to_vec();
                    let target = targets.row(row).to_vec();
                    epoch_loss += self.accumulate_gradients(&input, &target, denom, &mut grads) * denom;
                }

                let norm = grads.norm();
                if norm > CLIP_NORM {
                    grads.scale(CLIP_NORM / norm);
                }
                self.adam_step(&mut adam, &grads, options.learning_rate);
            }

            let loss = epoch_loss / (samples * self.outputs).max(1) as f64;
            loss_history.push(loss);
            if epoch % 10 == 0 || epoch + 1 == options.epochs {
                debug!(epoch, loss, "lstm epoch");
            }
        }

        TrainingReport {
            samples,
            epochs: options.epochs,
            final_loss: loss_history.last().copied().unwrap_or(f64::NAN),
            loss_history,
        }
    }

    fn head(&self, h: &Array1<f64>) -> Array1<f64> {
        self.params.head_w.dot(h) + &self.params.head_b
    }

    fn step(&self, x: f64, h_prev: &Array1<f64>, c_prev: &Array1<f64>) -> StepCache {
        let n = self.hidden;
        let z = &self.params.w * x + self.params.u.dot(h_prev) + &self.params.b;
        let i = z.slice(s![0..n]).mapv(sigmoid);
        let f = z.slice(s![n..2 * n]).mapv(sigmoid);
        let g = z.slice(s![2 * n..3 * n]).mapv(f64::tanh);
        let o = z.slice(s![3 * n..4 * n]).mapv(sigmoid);
        let c = &f * c_prev + &i * &g;
        let tanh_c = c.mapv(f64::tanh);
        StepCache {
            x,
            h_prev: h_prev.clone(),
            c_prev: c_prev.clone(),
            i,
            f,
            g,
            o,
            c,
            tanh_c,
        }
    }

    fn forward(&self, input: &[f64]) -> (Array1<f64>, Array1<f64>) {
        let mut h = Array1::zeros(self.hidden);
        let mut c = Array1::zeros(self.hidden);
        for &x in input {
            let cache = self.step(x, &h, &c);
            h = &cache.o * &cache.tanh_c;
            c = cache.c;
        }
        (h, c)
    }

    /// Forward and backward pass for one sample. Adds d(loss)/d(params) into
    /// `grads`, where loss is the squared error divided by `denom`, and returns
    /// that loss.
    fn accumulate_gradients(&self, input: &[f64], target: &[f64], denom: f64, grads: &mut Params) -> f64 {
        let n = self.hidden;
        let mut caches = Vec::with_capacity(input.len());
        let mut h = Array1::zeros(n);
        let mut c = Array1::zeros(n);
        for &x in input {
            let cache = self.step(x, &h, &c);
            h = &cache.o * &cache.tanh_c;
            c = cache.c.clone();
            caches.push(cache);
        }

        let y = self.head(&h);
        let diff = &y - &Array1::from(target.to_vec());
        let loss = diff.iter().map(|d| d * d).sum::<f64>() / denom;
        let dy = diff.mapv(|d| 2.0 * d / denom);

        add_outer(&mut grads.head_w, &dy, &h);
        grads.head_b += &dy;

        let mut dh = self.params.head_w.t().dot(&dy);
        let mut dc = Array1::<f64>::zeros(n);
        let mut dz = Array1::<f64>::zeros(4 * n);

        for cache in caches.iter().rev() {
            let d_o = &dh * &cache.tanh_c;
            dc = dc + &dh * &cache.o * &cache.tanh_c.mapv(|t| 1.0 - t * t);

            let d_i = &dc * &cache.g;
            let d_g = &dc * &cache.i;
            let d_f = &dc * &cache.c_prev;

            dz.slice_mut(s![0..n]).assign(&(d_i * &cache.i.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![n..2 * n]).assign(&(d_f * &cache.f.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![2 * n..3 * n]).assign(&(d_g * &cache.g.mapv(|v| 1.0 - v * v)));
            dz.slice_mut(s![3 * n..4 * n]).assign(&(d_o * &cache.o.mapv(|v| v * (1.0 - v))));

            grads.w.scaled_add(cache.x, &dz);
            add_outer(&mut grads.u, &dz, &cache.h_prev);
            grads.b += &dz;

            dh = self.params.u.t().dot(&dz);
            dc = &dc * &cache.f;
        }

        loss
    }

    fn adam_step(&mut self, adam: &mut Adam, grads: &Params, learning_rate: f64) {
        adam.t += 1;
        let lr_t = learning_rate * (1.0 - ADAM_BETA2.powi(adam.t)).sqrt() / (1.0 - ADAM_BETA1.powi(adam.t));
        adam_update(&mut self.params.w, &grads.w, &mut adam.m.w, &mut adam.v.w, lr_t);
        adam_update(&mut self.params.u, &grads.u, &mut adam.m.u, &mut adam.v.u, lr_t);
        adam_update(&mut self.params.b, &grads.b, &mut adam.m.b, &mut adam.v.b, lr_t);
        adam_update(&mut self.params.head_w, &grads.head_w, &mut adam.m.head_w, &mut adam.v.head_w, lr_t);
        adam_update(&mut self.params.head_b, &grads.head_b, &mut adam.m.head_b, &mut adam.v.head_b, lr_t);
    }
}

fn adam_update<D: Dimension>(
    param: &mut ndarray::Array<f64, D>,
    grad: &ndarray::Array<f64, D>,
    m: &mut ndarray::Array<f64, D>,
    v: &mut ndarray::Array<f64, D>,
    lr_t: f64,
) {
    Zip::from(param).and(grad).and(m).and(v).for_each(|p, &g, m, v| {
        *m = ADAM_BETA1 * *m + (1.0 - ADAM_BETA1) * g;
        *v = ADAM_BETA2 * *v + (1.0 - ADAM_BETA2) * g * g;
        *p -= lr_t * *m / (v.sqrt() + ADAM_EPSILON);
    });
}

fn add_outer(target: &mut Array2<f64>, a: &Array1<f64>, b: &Array1<f64>) {
    for (mut row, &ai) in target.rows_mut().into_iter().zip(a.iter()) {
        row.scaled_add(ai, b);
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(epochs: usize) -> TrainingOptions {
        TrainingOptions { epochs, batch_size: 8, learning_rate: 0.01 }
    }

    fn sine_windows(samples: usize, seq_len: usize, outputs: usize) -> (Array2<f64>, Array2<f64>) {
        let wave = |t: usize| 0.5 + 0.4 * (t as f64 * 0.3).sin();
        let x = Array2::from_shape_fn((samples, seq_len), |(i, t)| wave(i + t));
        let y = Array2::from_shape_fn((samples, outputs), |(i, k)| wave(i + seq_len + k));
        (x, y)
    }

    #[test]
    fn test_training_reduces_loss() {
        let (x, y) = sine_windows(40, 12, 3);
        let mut net = LstmNetwork::new(8, 3, Some(1));
        let report = net.train(&x, &y, options(60));
        assert_eq!(report.loss_history.len(), 60);
        assert!(report.final_loss < report.loss_history[0]);
        assert!(report.final_loss.is_finite());
    }

    #[test]
    fn test_seeded_networks_are_reproducible() {
        let (x, y) = sine_windows(20, 8, 2);
        let mut a = LstmNetwork::new(6, 2, Some(42));
        let mut b = LstmNetwork::new(6, 2, Some(42));
        a.train(&x, &y, options(5));
        b.train(&x, &y, options(5));
        let input: Vec<f64> = x.row(0).to_vec();
        assert_eq!(a.predict(&input), b.predict(&input));
    }

    #[test]
    fn test_zero_input_and_target_stay_at_zero() {
        let x = Array2::zeros((10, 5));
        let y = Array2::zeros((10, 2));
        let mut net = LstmNetwork::new(4, 2, None);
        let report = net.train(&x, &y, options(3));
        assert_eq!(report.final_loss, 0.0);
        assert_eq!(net.predict(&[0.0; 5]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let net = LstmNetwork::new(3, 2, Some(5));
        let input = [0.2, 0.7, 0.4];
        let target = [0.5, 0.1];
        let mut grads = Params::zeros(3, 2);
        net.accumulate_gradients(&input, &target, 2.0, &mut grads);

        let loss = |n: &LstmNetwork| {
            let out = n.predict(&input);
            out.iter().zip(target).map(|(o, t)| (o - t).powi(2)).sum::<f64>() / 2.0
        };
        let eps = 1e-6;
        for idx in [(0, 0), (5, 2), (11, 1)] {
            let mut plus = LstmNetwork::new(3, 2, Some(5));
            plus.params.u[idx] += eps;
            let mut minus = LstmNetwork::new(3, 2, Some(5));
            minus.params.u[idx] -= eps;
            let numeric = (loss(&plus) - loss(&minus)) / (2.0 * eps);
            assert!((numeric - grads.u[idx]).abs() < 1e-6, "u{:?}: {} vs {}", idx, numeric, grads.u[idx]);
        }
    }
}
