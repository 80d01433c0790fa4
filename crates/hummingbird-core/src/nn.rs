//! Policies map an observation to an action. The learner proper lives outside
//! this crate; these stand in for it when driving episodes locally.
//!
//! `NeuralNet` is a trivial feedforward network: 10 inputs → 16 hidden (tanh)
//! → 5 outputs (tanh). Stack-allocated, no heap. 261 weights total.

use crate::agent::{ActionVector, Observation, ACTION_SIZE, OBSERVATION_SIZE};
use rand::Rng;

const INPUT_SIZE: usize = OBSERVATION_SIZE;
const HIDDEN_SIZE: usize = 16;
const OUTPUT_SIZE: usize = ACTION_SIZE;

/// Anything that turns observations into actions, one decision per tick.
pub trait Policy {
    fn kind(&self) -> &'static str;

    fn act(&mut self, observation: &Observation) -> ActionVector;
}

impl<P: Policy + ?Sized> Policy for Box<P> {
    fn kind(&self) -> &'static str {
        (**self).kind()
    }

    fn act(&mut self, observation: &Observation) -> ActionVector {
        (**self).act(observation)
    }
}

#[derive(Clone, Debug)]
pub struct NeuralNet {
    // input→hidden (10×16) + hidden bias (16) + hidden→output (16×5) + output bias (5)
    // = 261 parameters
    pub w_ih: [[f32; HIDDEN_SIZE]; INPUT_SIZE],
    pub b_h: [f32; HIDDEN_SIZE],
    pub w_ho: [[f32; OUTPUT_SIZE]; HIDDEN_SIZE],
    pub b_o: [f32; OUTPUT_SIZE],
}

impl NeuralNet {
    pub const WEIGHT_COUNT: usize =
        INPUT_SIZE * HIDDEN_SIZE + HIDDEN_SIZE + HIDDEN_SIZE * OUTPUT_SIZE + OUTPUT_SIZE;

    /// Create a NN from an iterator of f32 values. Panics if fewer than WEIGHT_COUNT values.
    pub fn from_weights(mut weights: impl Iterator<Item = f32>) -> Self {
        let mut nn = Self {
            w_ih: [[0.0; HIDDEN_SIZE]; INPUT_SIZE],
            b_h: [0.0; HIDDEN_SIZE],
            w_ho: [[0.0; OUTPUT_SIZE]; HIDDEN_SIZE],
            b_o: [0.0; OUTPUT_SIZE],
        };
        let slots = nn
            .w_ih
            .iter_mut()
            .flatten()
            .chain(nn.b_h.iter_mut())
            .chain(nn.w_ho.iter_mut().flatten())
            .chain(nn.b_o.iter_mut());
        for slot in slots {
            *slot = weights
                .next()
                .expect("insufficient weights: need WEIGHT_COUNT (261) elements");
        }
        nn
    }

    /// Uniform weights in `[-1, 1]`.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let weights: Vec<f32> = (0..Self::WEIGHT_COUNT)
            .map(|_| rng.random::<f32>() * 2.0 - 1.0)
            .collect();
        Self::from_weights(weights.into_iter())
    }

    /// Weights in `from_weights` order.
    pub fn to_weight_vec(&self) -> Vec<f32> {
        self.w_ih
            .iter()
            .flatten()
            .chain(&self.b_h)
            .chain(self.w_ho.iter().flatten())
            .chain(&self.b_o)
            .copied()
            .collect()
    }

    /// Forward pass. Returns `[move_x, move_y, move_z, pitch, yaw]`.
    pub fn forward(&self, input: &[f32; INPUT_SIZE]) -> [f32; OUTPUT_SIZE] {
        let hidden = dense_tanh(input, &self.w_ih, &self.b_h);
        dense_tanh(&hidden, &self.w_ho, &self.b_o)
    }
}

/// `tanh(bias + input · weights)` for one fully connected layer.
fn dense_tanh<const N: usize, const M: usize>(
    input: &[f32; N],
    weights: &[[f32; M]; N],
    bias: &[f32; M],
) -> [f32; M] {
    let mut out = *bias;
    for (x, row) in input.iter().zip(weights) {
        for (o, w) in out.iter_mut().zip(row) {
            *o += x * w;
        }
    }
    out.map(f32::tanh)
}

impl Policy for NeuralNet {
    fn kind(&self) -> &'static str {
        "neural"
    }

    fn act(&mut self, observation: &Observation) -> ActionVector {
        self.forward(observation)
    }
}

/// Uniform random actions in `[-1, 1]`, ignoring observations.
pub struct RandomPolicy<R> {
    rng: R,
}

impl<R: Rng> RandomPolicy<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> Policy for RandomPolicy<R> {
    fn kind(&self) -> &'static str {
        "random"
    }

    fn act(&mut self, _observation: &Observation) -> ActionVector {
        std::array::from_fn(|_| self.rng.random_range(-1.0f32..=1.0))
    }
}

/// Hovers in place.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdlePolicy;

impl Policy for IdlePolicy {
    fn kind(&self) -> &'static str {
        "idle"
    }

    fn act(&mut self, _observation: &Observation) -> ActionVector {
        [0.0; ACTION_SIZE]
    }
}
