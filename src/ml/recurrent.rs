//! Recurrent sequence forecaster: stacked LSTM with a linear output unit
//!
//! Trained fresh per request on min-max scaled feature windows against the
//! scaled next-day close, with backpropagation through time and Adam.
//! Gate layout in the fused weight matrix is `[input, forget, cell, output]`.

use ndarray::{s, Array, Array1, Array2, Axis, Dimension, Zip};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::config::{RecurrentConfig, RolloutConfig};
use crate::error::{ForecastError, Result};
use crate::ml::forecaster::{FeatureRollout, ForecastContext, Forecaster};
use crate::ml::indicators::FeatureTable;
use crate::ml::scaler::MinMaxScaler;
use crate::types::ModelKind;

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-7;

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

/// Activations of one timestep kept for the backward pass
#[derive(Debug, Clone)]
struct StepCache {
    /// `[x_t, h_{t-1}]`
    input: Array2<f64>,
    i: Array2<f64>,
    f: Array2<f64>,
    g: Array2<f64>,
    o: Array2<f64>,
    c_prev: Array2<f64>,
    tanh_c: Array2<f64>,
}

#[derive(Debug, Clone)]
struct LstmLayer {
    input_size: usize,
    hidden_size: usize,
    /// (4 * hidden, input + hidden)
    weights: Array2<f64>,
    bias: Array1<f64>,
}

impl LstmLayer {
    fn new(input_size: usize, hidden_size: usize, rng: &mut StdRng) -> Self {
        let limit = (1.0 / hidden_size as f64).sqrt();
        let weights = Array2::from_shape_fn((4 * hidden_size, input_size + hidden_size), |_| {
            rng.random_range(-limit..limit)
        });
        // Forget gate starts open
        let bias = Array1::from_shape_fn(4 * hidden_size, |k| {
            if (hidden_size..2 * hidden_size).contains(&k) {
                1.0
            } else {
                0.0
            }
        });
        Self {
            input_size,
            hidden_size,
            weights,
            bias,
        }
    }

    /// Run a batch through every timestep; returns hidden states per step
    fn forward(&self, xs: &[Array2<f64>]) -> (Vec<Array2<f64>>, Vec<StepCache>) {
        let h = self.hidden_size;
        let batch = xs.first().map_or(0, |x| x.nrows());
        let mut h_prev = Array2::<f64>::zeros((batch, h));
        let mut c_prev = Array2::<f64>::zeros((batch, h));
        let mut outputs = Vec::with_capacity(xs.len());
        let mut caches = Vec::with_capacity(xs.len());

        for x in xs {
            let input = Array2::from_shape_fn((batch, self.input_size + h), |(r, c)| {
                if c < self.input_size {
                    x[[r, c]]
                } else {
                    h_prev[[r, c - self.input_size]]
                }
            });
            let gates = input.dot(&self.weights.t()) + &self.bias;
            let i = gates.slice(s![.., 0..h]).mapv(sigmoid);
            let f = gates.slice(s![.., h..2 * h]).mapv(sigmoid);
            let g = gates.slice(s![.., 2 * h..3 * h]).mapv(f64::tanh);
            let o = gates.slice(s![.., 3 * h..]).mapv(sigmoid);

            let c = &f * &c_prev + &i * &g;
            let tanh_c = c.mapv(f64::tanh);
            let h_next = &o * &tanh_c;

            caches.push(StepCache {
                input,
                i,
                f,
                g,
                o,
                c_prev,
                tanh_c,
            });
            outputs.push(h_next.clone());
            h_prev = h_next;
            c_prev = c;
        }
        (outputs, caches)
    }

    /// Backpropagate `grad_outputs` (one per step); returns input gradients
    /// per step plus weight and bias gradients
    fn backward(
        &self,
        caches: &[StepCache],
        grad_outputs: &[Array2<f64>],
    ) -> (Vec<Array2<f64>>, Array2<f64>, Array1<f64>) {
        let h = self.hidden_size;
        let batch = caches.first().map_or(0, |c| c.input.nrows());
        let mut d_weights = Array2::<f64>::zeros(self.weights.raw_dim());
        let mut d_bias = Array1::<f64>::zeros(self.bias.len());
        let mut dh_next = Array2::<f64>::zeros((batch, h));
        let mut dc_next = Array2::<f64>::zeros((batch, h));
        let mut d_inputs = vec![Array2::<f64>::zeros((batch, self.input_size)); caches.len()];

        for t in (0..caches.len()).rev() {
            let cache = &caches[t];
            let dh = &grad_outputs[t] + &dh_next;

            let d_o = &dh * &cache.tanh_c * &cache.o.mapv(|v| v * (1.0 - v));
            let dc = &dh * &cache.o * &cache.tanh_c.mapv(|v| 1.0 - v * v) + &dc_next;
            let d_i = &dc * &cache.g * &cache.i.mapv(|v| v * (1.0 - v));
            let d_f = &dc * &cache.c_prev * &cache.f.mapv(|v| v * (1.0 - v));
            let d_g = &dc * &cache.i * &cache.g.mapv(|v| 1.0 - v * v);

            let mut d_gates = Array2::<f64>::zeros((batch, 4 * h));
            d_gates.slice_mut(s![.., 0..h]).assign(&d_i);
            d_gates.slice_mut(s![.., h..2 * h]).assign(&d_f);
            d_gates.slice_mut(s![.., 2 * h..3 * h]).assign(&d_g);
            d_gates.slice_mut(s![.., 3 * h..]).assign(&d_o);

            d_weights += &d_gates.t().dot(&cache.input);
            d_bias += &d_gates.sum_axis(Axis(0));

            let d_input = d_gates.dot(&self.weights);
            d_inputs[t] = d_input.slice(s![.., ..self.input_size]).to_owned();
            dh_next = d_input.slice(s![.., self.input_size..]).to_owned();
            dc_next = &dc * &cache.f;
        }
        (d_inputs, d_weights, d_bias)
    }
}

#[derive(Debug, Clone)]
struct Gradients {
    layers: Vec<(Array2<f64>, Array1<f64>)>,
    output_weights: Array1<f64>,
    output_bias: Array1<f64>,
}

/// Adam first/second moment estimates for one parameter
#[derive(Debug, Clone)]
struct Moments<D: Dimension> {
    m: Array<f64, D>,
    v: Array<f64, D>,
}

impl<D: Dimension> Moments<D> {
    fn zeros(shape: D) -> Self {
        Self {
            m: Array::zeros(shape.clone()),
            v: Array::zeros(shape),
        }
    }

    fn update(&mut self, param: &mut Array<f64, D>, grad: &Array<f64, D>, lr: f64, step: i32) {
        let bias1 = 1.0 - BETA1.powi(step);
        let bias2 = 1.0 - BETA2.powi(step);
        Zip::from(param)
            .and(&mut self.m)
            .and(&mut self.v)
            .and(grad)
            .for_each(|p, m, v, &g| {
                *m = BETA1 * *m + (1.0 - BETA1) * g;
                *v = BETA2 * *v + (1.0 - BETA2) * g * g;
                *p -= lr * (*m / bias1) / ((*v / bias2).sqrt() + ADAM_EPSILON);
            });
    }
}

#[derive(Debug, Clone)]
struct AdamState {
    layers: Vec<(Moments<ndarray::Ix2>, Moments<ndarray::Ix1>)>,
    output_weights: Moments<ndarray::Ix1>,
    output_bias: Moments<ndarray::Ix1>,
    step: i32,
}

/// Stacked LSTM regressor producing one value per sequence
#[derive(Debug, Clone)]
pub struct LstmNetwork {
    layers: Vec<LstmLayer>,
    output_weights: Array1<f64>,
    output_bias: Array1<f64>,
}

impl LstmNetwork {
    pub fn new(input_size: usize, hidden_size: usize, layers: usize, rng: &mut StdRng) -> Self {
        let stack = (0..layers)
            .map(|k| {
                let width = if k == 0 { input_size } else { hidden_size };
                LstmLayer::new(width, hidden_size, rng)
            })
            .collect();
        let limit = (6.0 / (hidden_size + 1) as f64).sqrt();
        let output_weights = Array1::from_shape_fn(hidden_size, |_| rng.random_range(-limit..limit));
        Self {
            layers: stack,
            output_weights,
            output_bias: Array1::zeros(1),
        }
    }

    /// Train on scaled sequences (each `sequence_length x input_size`)
    pub fn fit(sequences: &[Vec<Vec<f64>>], targets: &[f64], config: &RecurrentConfig) -> Result<Self> {
        let model = ModelKind::Recurrent.name();
        if sequences.is_empty() || sequences.len() != targets.len() {
            return Err(ForecastError::fit(model, "no aligned training sequences"));
        }
        if config.hidden_size == 0 || config.layers == 0 || config.batch_size == 0 {
            return Err(ForecastError::fit(model, "hidden_size, layers and batch_size must be positive"));
        }
        let input_size = sequences[0].first().map_or(0, |r| r.len());
        if input_size == 0 {
            return Err(ForecastError::fit(model, "empty input sequences"));
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut network = Self::new(input_size, config.hidden_size, config.layers, &mut rng);
        let mut adam = network.adam_state();
        let mut order: Vec<usize> = (0..sequences.len()).collect();

        for epoch in 0..config.epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;
            for batch in order.chunks(config.batch_size) {
                let xs = time_major(sequences, batch);
                let ys = Array1::from_iter(batch.iter().map(|&k| targets[k]));
                let (loss, grads) = network.loss_and_gradients(&xs, &ys);
                if !loss.is_finite() {
                    return Err(ForecastError::fit(model, format!("loss diverged in epoch {}", epoch + 1)));
                }
                epoch_loss += loss * batch.len() as f64;
                network.apply(&grads, &mut adam, config.learning_rate);
            }
            tracing::debug!(
                "LSTM epoch {}/{}: mse {:.6}",
                epoch + 1,
                config.epochs,
                epoch_loss / sequences.len() as f64
            );
        }
        Ok(network)
    }

    /// Output for a single sequence (oldest step first)
    pub fn predict(&self, sequence: &[Vec<f64>]) -> f64 {
        let xs: Vec<Array2<f64>> = sequence
            .iter()
            .map(|step| Array2::from_shape_fn((1, step.len()), |(_, c)| step[c]))
            .collect();
        let (predictions, _, _) = self.forward(&xs);
        predictions.get(0).copied().unwrap_or(f64::NAN)
    }

    fn forward(&self, xs: &[Array2<f64>]) -> (Array1<f64>, Vec<Vec<StepCache>>, Vec<Array2<f64>>) {
        let mut inputs = xs.to_vec();
        let mut caches = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let (outputs, layer_caches) = layer.forward(&inputs);
            caches.push(layer_caches);
            inputs = outputs;
        }
        let predictions = match inputs.last() {
            Some(last) => last.dot(&self.output_weights) + self.output_bias[0],
            None => Array1::zeros(0),
        };
        (predictions, caches, inputs)
    }

    fn loss_and_gradients(&self, xs: &[Array2<f64>], targets: &Array1<f64>) -> (f64, Gradients) {
        let (predictions, caches, top_outputs) = self.forward(xs);
        let batch = targets.len().max(1) as f64;
        let diff = &predictions - targets;
        let loss = diff.mapv(|d| d * d).sum() / batch;
        let d_pred = diff.mapv(|d| 2.0 * d / batch);

        let hidden = self.output_weights.len();
        let steps = xs.len();
        let mut output_weights = Array1::<f64>::zeros(hidden);
        let mut grad_outputs = vec![Array2::<f64>::zeros((d_pred.len(), hidden)); steps];
        if let Some(last) = top_outputs.last() {
            output_weights = last.t().dot(&d_pred);
            grad_outputs[steps - 1] = Array2::from_shape_fn((d_pred.len(), hidden), |(r, c)| {
                d_pred[r] * self.output_weights[c]
            });
        }
        let output_bias = Array1::from_elem(1, d_pred.sum());

        let mut layers = vec![(Array2::zeros((0, 0)), Array1::zeros(0)); self.layers.len()];
        for (k, layer) in self.layers.iter().enumerate().rev() {
            let (d_inputs, d_weights, d_bias) = layer.backward(&caches[k], &grad_outputs);
            layers[k] = (d_weights, d_bias);
            grad_outputs = d_inputs;
        }

        (
            loss,
            Gradients {
                layers,
                output_weights,
                output_bias,
            },
        )
    }

    fn adam_state(&self) -> AdamState {
        AdamState {
            layers: self
                .layers
                .iter()
                .map(|l| (Moments::zeros(l.weights.raw_dim()), Moments::zeros(l.bias.raw_dim())))
                .collect(),
            output_weights: Moments::zeros(self.output_weights.raw_dim()),
            output_bias: Moments::zeros(self.output_bias.raw_dim()),
            step: 0,
        }
    }

    fn apply(&mut self, grads: &Gradients, adam: &mut AdamState, lr: f64) {
        adam.step += 1;
        let step = adam.step;
        for ((layer, (dw, db)), (mw, mb)) in self
            .layers
            .iter_mut()
            .zip(&grads.layers)
            .zip(adam.layers.iter_mut())
        {
            mw.update(&mut layer.weights, dw, lr, step);
            mb.update(&mut layer.bias, db, lr, step);
        }
        adam.output_weights
            .update(&mut self.output_weights, &grads.output_weights, lr, step);
        adam.output_bias
            .update(&mut self.output_bias, &grads.output_bias, lr, step);
    }
}

/// Reorder `batch` sequences into one (batch x input) matrix per timestep
fn time_major(sequences: &[Vec<Vec<f64>>], batch: &[usize]) -> Vec<Array2<f64>> {
    let steps = sequences[batch[0]].len();
    let width = sequences[batch[0]].first().map_or(0, |r| r.len());
    (0..steps)
        .map(|t| Array2::from_shape_fn((batch.len(), width), |(r, c)| sequences[batch[r]][t][c]))
        .collect()
}

/// LSTM forecaster over scaled feature windows
#[derive(Debug, Clone, Default)]
pub struct RecurrentForecaster {
    recurrent: RecurrentConfig,
    rollout: RolloutConfig,
}

impl RecurrentForecaster {
    pub fn new(recurrent: RecurrentConfig, rollout: RolloutConfig) -> Self {
        Self { recurrent, rollout }
    }
}

impl Forecaster for RecurrentForecaster {
    fn kind(&self) -> ModelKind {
        ModelKind::Recurrent
    }

    fn forecast(&self, table: &FeatureTable, ctx: &ForecastContext) -> Result<Vec<f64>> {
        let name = self.kind().name();
        let window = self.recurrent.sequence_length.max(1);
        let features = table.feature_matrix();
        let closes = table.closes();
        let n = features.len();
        if n <= window {
            return Err(ForecastError::fit(
                name,
                format!("need more than {} rows, got {}", window, n),
            ));
        }

        let feature_scaler =
            MinMaxScaler::fit(&features).ok_or_else(|| ForecastError::fit(name, "empty features"))?;
        let close_scaler =
            MinMaxScaler::fit_column(&closes).ok_or_else(|| ForecastError::fit(name, "empty closes"))?;
        let scaled: Vec<Vec<f64>> = features.iter().map(|r| feature_scaler.transform(r)).collect();

        let mut sequences = Vec::with_capacity(n - window);
        let mut targets = Vec::with_capacity(n - window);
        for t in (window - 1)..(n - 1) {
            sequences.push(scaled[t + 1 - window..=t].to_vec());
            targets.push(close_scaler.transform_value(0, closes[t + 1]));
        }

        let network = LstmNetwork::fit(&sequences, &targets, &self.recurrent)?;

        FeatureRollout::new(&self.rollout, ctx.sentiment).run(
            self.kind(),
            features[n - window..].to_vec(),
            ctx.horizon,
            |raw| {
                let scaled_window: Vec<Vec<f64>> =
                    raw.iter().map(|r| feature_scaler.transform(r)).collect();
                Ok(close_scaler.inverse_value(0, network.predict(&scaled_window)))
            },
        )
    }
}
