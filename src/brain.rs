use crate::car::{ControlOutputs, SensorVector, NUM_DECISIONS, NUM_RADARS};
use crate::simulation::Controller;
use rand::Rng;

// --- Gene Range Constants ---

pub const MIN_WEIGHT: f64 = -3.0;
pub const MAX_WEIGHT: f64 = 3.0;

pub const NUM_INPUTS: usize = NUM_RADARS;
pub const NUM_OUTPUTS: usize = NUM_DECISIONS;

// --- Genome ---

/// Weights of a fixed-topology feed-forward net: inputs -> tanh hidden layer -> linear outputs.
///
/// Flat layout, row-major per receiving node: `hidden * (inputs + 1)` hidden weights
/// (last of each row is the bias) followed by `outputs * (hidden + 1)` output weights.
#[derive(Debug, Clone, PartialEq)]
pub struct NeuralGenome {
    pub hidden_nodes: usize,
    pub weights: Vec<f64>,
}

impl NeuralGenome {
    pub fn gene_count(hidden_nodes: usize) -> usize {
        hidden_nodes * (NUM_INPUTS + 1) + NUM_OUTPUTS * (hidden_nodes + 1)
    }

    pub fn new_random<R: Rng + ?Sized>(hidden_nodes: usize, rng: &mut R) -> Self {
        let weights = (0..Self::gene_count(hidden_nodes))
            .map(|_| rng.gen_range(MIN_WEIGHT..=MAX_WEIGHT))
            .collect();
        Self { hidden_nodes, weights }
    }

    // Flat list used by crossover
    pub fn to_flat_list(&self) -> Vec<f64> {
        self.weights.clone()
    }

    /// Rebuilds a genome from a flat list. Short lists are zero-padded, long lists truncated,
    /// so the result always matches the topology.
    pub fn from_flat_list(hidden_nodes: usize, genes: &[f64]) -> Self {
        let mut weights = genes.to_vec();
        weights.resize(Self::gene_count(hidden_nodes), 0.0);
        Self { hidden_nodes, weights }
    }

    pub fn controller(&self) -> NeuralController {
        NeuralController {
            genome: self.clone(),
            hidden: vec![0.0; self.hidden_nodes],
        }
    }
}

// --- Controller ---

/// Stateless evaluator for a genome. The hidden buffer is only scratch space.
#[derive(Debug, Clone)]
pub struct NeuralController {
    genome: NeuralGenome,
    hidden: Vec<f64>,
}

impl Controller for NeuralController {
    fn activate(&mut self, inputs: &SensorVector) -> ControlOutputs {
        let weights = &self.genome.weights;
        let hidden_stride = NUM_INPUTS + 1;
        for (h, value) in self.hidden.iter_mut().enumerate() {
            let row = &weights[h * hidden_stride..(h + 1) * hidden_stride];
            let sum: f64 = inputs.iter().zip(row).map(|(i, w)| *i as f64 * w).sum();
            *value = (sum + row[NUM_INPUTS]).tanh();
        }

        let offset = self.genome.hidden_nodes * hidden_stride;
        let output_stride = self.genome.hidden_nodes + 1;
        let mut outputs = [0.0; NUM_OUTPUTS];
        for (o, out) in outputs.iter_mut().enumerate() {
            let row = &weights[offset + o * output_stride..offset + (o + 1) * output_stride];
            let sum: f64 = self.hidden.iter().zip(row).map(|(h, w)| h * w).sum();
            *out = sum + row[self.genome.hidden_nodes];
        }
        outputs
    }
}
