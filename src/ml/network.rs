use anyhow::{anyhow, Result};
use ndarray::{Array1, Array2, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use crate::config::ModelSettings;

use super::features::TrainingSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Relu,
    Linear,
}

impl Activation {
    fn apply(&self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::Relu => z.mapv(|v| v.max(0.0)),
            Activation::Linear => z.clone(),
        }
    }

    fn derivative(&self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::Relu => z.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Activation::Linear => Array2::ones(z.dim()),
        }
    }
}

/// Fully connected layer: `activation(input . weights + biases)`
#[derive(Debug, Clone)]
pub struct DenseLayer {
    pub weights: Array2<f64>,
    pub biases: Array1<f64>,
    pub activation: Activation,
}

impl DenseLayer {
    /// Glorot-uniform weights, zero biases
    fn new(input_size: usize, output_size: usize, activation: Activation, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (input_size + output_size) as f64).sqrt();
        Self {
            weights: Array2::random_using((input_size, output_size), Uniform::new(-limit, limit), rng),
            biases: Array1::zeros(output_size),
            activation,
        }
    }

    fn pre_activation(&self, input: &Array2<f64>) -> Array2<f64> {
        input.dot(&self.weights) + &self.biases
    }

    pub fn num_parameters(&self) -> usize {
        self.weights.len() + self.biases.len()
    }
}

/// Adam moment estimates for one layer
#[derive(Debug, Clone)]
struct Moments {
    m_w: Array2<f64>,
    v_w: Array2<f64>,
    m_b: Array1<f64>,
    v_b: Array1<f64>,
}

impl Moments {
    fn for_layer(layer: &DenseLayer) -> Self {
        Self {
            m_w: Array2::zeros(layer.weights.dim()),
            v_w: Array2::zeros(layer.weights.dim()),
            m_b: Array1::zeros(layer.biases.len()),
            v_b: Array1::zeros(layer.biases.len()),
        }
    }
}

/// Adaptive moment estimation with the usual defaults
#[derive(Debug, Clone)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    t: i32,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            t: 0,
        }
    }

    fn step(&mut self) {
        self.t += 1;
    }

    fn update(&self, layer: &mut DenseLayer, moments: &mut Moments, grad_w: &Array2<f64>, grad_b: &Array1<f64>) {
        let bc1 = 1.0 - self.beta1.powi(self.t);
        let bc2 = 1.0 - self.beta2.powi(self.t);

        moments.m_w = &moments.m_w * self.beta1 + grad_w * (1.0 - self.beta1);
        moments.v_w = &moments.v_w * self.beta2 + &(grad_w * grad_w) * (1.0 - self.beta2);
        let m_hat = &moments.m_w / bc1;
        let v_hat = &moments.v_w / bc2;
        layer.weights = &layer.weights - &(m_hat * self.learning_rate / (v_hat.mapv(f64::sqrt) + self.epsilon));

        moments.m_b = &moments.m_b * self.beta1 + grad_b * (1.0 - self.beta1);
        moments.v_b = &moments.v_b * self.beta2 + &(grad_b * grad_b) * (1.0 - self.beta2);
        let m_hat = &moments.m_b / bc1;
        let v_hat = &moments.v_b / bc2;
        layer.biases = &layer.biases - &(m_hat * self.learning_rate / (v_hat.mapv(f64::sqrt) + self.epsilon));
    }
}

/// Training report after model fit
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub samples: usize,
    pub epochs: usize,
    pub initial_loss: f64,
    pub final_loss: f64,
}

/// Intermediate values from one forward pass, kept for backpropagation
struct ForwardPass {
    inputs: Vec<Array2<f64>>,
    pre_activations: Vec<Array2<f64>>,
    output: Array2<f64>,
}

/// Feed-forward regressor trained with mean squared error.
///
/// Built fresh for every forecast and dropped after one inference; nothing
/// here is persisted.
pub struct NeuralRegressor {
    layers: Vec<DenseLayer>,
    moments: Vec<Moments>,
    optimizer: Adam,
    epochs: usize,
    batch_size: usize,
    shuffle: bool,
    rng: StdRng,
}

impl NeuralRegressor {
    /// ReLU hidden layers of the configured widths and a linear output layer
    pub fn new(input_size: usize, output_size: usize, settings: &ModelSettings) -> Self {
        let mut rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut layers = Vec::with_capacity(settings.hidden_layers.len() + 1);
        let mut fan_in = input_size;
        for &width in &settings.hidden_layers {
            layers.push(DenseLayer::new(fan_in, width, Activation::Relu, &mut rng));
            fan_in = width;
        }
        layers.push(DenseLayer::new(fan_in, output_size, Activation::Linear, &mut rng));

        let moments = layers.iter().map(Moments::for_layer).collect();

        Self {
            layers,
            moments,
            optimizer: Adam::new(settings.learning_rate),
            epochs: settings.epochs,
            batch_size: settings.batch_size.max(1),
            shuffle: settings.shuffle,
            rng,
        }
    }

    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    pub fn num_parameters(&self) -> usize {
        self.layers.iter().map(|l| l.num_parameters()).sum()
    }

    fn forward_pass(&self, input: &Array2<f64>) -> ForwardPass {
        let mut inputs = Vec::with_capacity(self.layers.len());
        let mut pre_activations = Vec::with_capacity(self.layers.len());
        let mut output = input.clone();

        for layer in &self.layers {
            let z = layer.pre_activation(&output);
            let activated = layer.activation.apply(&z);
            inputs.push(output);
            pre_activations.push(z);
            output = activated;
        }

        ForwardPass { inputs, pre_activations, output }
    }

    pub fn predict(&self, input: &Array2<f64>) -> Array2<f64> {
        self.forward_pass(input).output
    }

    /// Mean over every element, matching a per-sample mean then batch mean
    pub fn mse(predictions: &Array2<f64>, targets: &Array2<f64>) -> f64 {
        let diff = predictions - targets;
        (&diff * &diff).sum() / diff.len().max(1) as f64
    }

    fn train_batch(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> f64 {
        let pass = self.forward_pass(x);
        let loss = Self::mse(&pass.output, y);

        let mut gradient = 2.0 * (&pass.output - y) / pass.output.len().max(1) as f64;
        self.optimizer.step();

        for i in (0..self.layers.len()).rev() {
            let layer = &self.layers[i];
            let delta = &gradient * &layer.activation.derivative(&pass.pre_activations[i]);
            let grad_w = pass.inputs[i].t().dot(&delta);
            let grad_b = delta.sum_axis(Axis(0));
            gradient = delta.dot(&layer.weights.t());

            self.optimizer.update(&mut self.layers[i], &mut self.moments[i], &grad_w, &grad_b);
        }

        loss
    }

    fn train_epoch(&mut self, data: &TrainingSet) -> f64 {
        let n = data.len();
        let mut indices: Vec<usize> = (0..n).collect();
        if self.shuffle {
            indices.shuffle(&mut self.rng);
        }

        let mut weighted_loss = 0.0;
        for batch in indices.chunks(self.batch_size) {
            let x = data.features.select(Axis(0), batch);
            let y = data.labels.select(Axis(0), batch);
            weighted_loss += self.train_batch(&x, &y) * batch.len() as f64;
        }
        weighted_loss / n as f64
    }

    /// Fixed number of full passes, no early stopping, no validation split
    pub fn fit(&mut self, data: &TrainingSet) -> Result<TrainingReport> {
        self.fit_until(data, &AtomicBool::new(false))
    }

    /// Same as `fit`, but gives up between epochs once `cancel` is set
    pub fn fit_until(&mut self, data: &TrainingSet, cancel: &AtomicBool) -> Result<TrainingReport> {
        if data.is_empty() {
            return Err(anyhow!("Cannot fit on an empty training set"));
        }
        if data.features.ncols() != self.layers[0].weights.nrows() {
            return Err(anyhow!(
                "Feature width mismatch: {} != {}",
                data.features.ncols(),
                self.layers[0].weights.nrows()
            ));
        }

        let initial_loss = Self::mse(&self.predict(&data.features), &data.labels);
        let mut final_loss = initial_loss;

        for epoch in 0..self.epochs {
            if cancel.load(Ordering::Relaxed) {
                return Err(anyhow!("Training cancelled after {} epochs", epoch));
            }
            final_loss = self.train_epoch(data);
            if !final_loss.is_finite() {
                return Err(anyhow!("Loss diverged at epoch {}", epoch + 1));
            }
        }

        debug!(
            "Regressor fit: {} samples, {} epochs, loss {:.4} -> {:.4}",
            data.len(), self.epochs, initial_loss, final_loss
        );

        Ok(TrainingReport {
            samples: data.len(),
            epochs: self.epochs,
            initial_loss,
            final_loss,
        })
    }
}
