use std::{
    collections::HashMap,
    fs::{self, File},
    io::{BufReader, Write},
    path::Path,
};

use candle_core::{DType, Tensor};
use candle_nn::{Linear, Module, Optimizer, VarBuilder, VarMap, linear, loss};
use candle_optimisers::adam::{Adam, ParamsAdam};
use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    config::OptimizerConfig,
    device::DEVICE,
    error::{Error, Result},
    state::{STATE_DIM, State},
};

const PARAMS_FILE: &str = "qnet.safetensors";
const ARCH_FILE: &str = "qnet.yaml";

/// Snapshot of every named parameter of a network.
pub type Weights = HashMap<String, Tensor>;

/// Action-value function approximator used by the agent.
pub trait QFunction {
    type Weights;

    /// Action values for each state, one row per state.
    fn predict(&self, states: &[State]) -> Result<Vec<Vec<f32>>>;

    /// Single gradient step towards `targets` with MSE loss. Returns the loss.
    fn fit(&mut self, states: &[State], targets: &[Vec<f32>]) -> Result<f32>;

    fn get_weights(&self) -> Result<Self::Weights>;

    fn set_weights(&mut self, weights: &Self::Weights) -> Result<()>;
}

/// Architecture of [`MultiLayerPerceptron`], saved next to its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpConfig {
    /// Layer widths from input to output, e.g. `[8, 256, 128, 4]`.
    pub topology: Vec<usize>,
    pub optimizer: OptimizerConfig,
}

impl MlpConfig {
    pub fn new(in_dim: usize, hidden: &[usize], out_dim: usize, optimizer: OptimizerConfig) -> Self {
        let mut topology = Vec::with_capacity(hidden.len() + 2);
        topology.push(in_dim);
        topology.extend_from_slice(hidden);
        topology.push(out_dim);
        Self {
            topology,
            optimizer,
        }
    }

    pub fn out_dim(&self) -> usize {
        self.topology.last().copied().unwrap_or(0)
    }
}

/// Feed-forward network with ReLU hidden layers and a linear head.
pub struct MultiLayerPerceptron {
    layers: Vec<Linear>,
    var_map: VarMap,
    config: MlpConfig,
    optimiser: Adam,
}

impl MultiLayerPerceptron {
    pub fn new(config: MlpConfig) -> Result<Self> {
        let topology = &config.topology;
        if topology.len() < 2 {
            return Err(Error::DimensionMismatch {
                expected: 2,
                actual: topology.len(),
            });
        }
        let vm = VarMap::new();
        let vb = VarBuilder::from_varmap(&vm, DType::F32, &DEVICE);
        let mut layers: Vec<Linear> = Vec::with_capacity(topology.len() - 1);

        for i in 0..(topology.len() - 1) {
            layers.push(linear(topology[i], topology[i + 1], vb.pp(i))?);
        }

        let adam = Adam::new(
            vm.all_vars(),
            ParamsAdam {
                lr: config.optimizer.lr,
                ..Default::default()
            },
        )?;

        Ok(Self {
            layers,
            var_map: vm,
            config,
            optimiser: adam,
        })
    }

    pub fn config(&self) -> &MlpConfig {
        &self.config
    }

    pub fn output(&self, inputs: &Tensor) -> Result<Tensor> {
        let mut x = inputs.clone();
        for layer in self.layers.iter().take(self.layers.len() - 1) {
            x = layer.forward(&x)?;
            x = x.relu()?;
        }
        if let Some(last_layer) = self.layers.last() {
            x = last_layer.forward(&x)?;
        }
        Ok(x)
    }

    fn input_tensor(states: &[State]) -> Result<Tensor> {
        Ok(Tensor::from_vec(
            State::flatten(states),
            (states.len(), STATE_DIM),
            &DEVICE,
        )?)
    }

    /// Writes parameters and architecture into `dir`.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        self.var_map.save(dir.join(PARAMS_FILE))?;
        let mut file = File::create(dir.join(ARCH_FILE))?;
        file.write_all(serde_yaml::to_string(&self.config)?.as_bytes())?;
        info!("Saved Q-network to {:?}", dir);
        Ok(())
    }

    /// Rebuilds a network written by [`MultiLayerPerceptron::save`].
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let rdr = BufReader::new(File::open(dir.join(ARCH_FILE))?);
        let config: MlpConfig = serde_yaml::from_reader(rdr)?;
        let mut mlp = Self::new(config)?;
        mlp.var_map.load(dir.join(PARAMS_FILE))?;
        info!("Loaded Q-network from {:?}", dir);
        Ok(mlp)
    }
}

impl QFunction for MultiLayerPerceptron {
    type Weights = Weights;

    fn predict(&self, states: &[State]) -> Result<Vec<Vec<f32>>> {
        let input_tensor = Self::input_tensor(states)?;
        Ok(self.output(&input_tensor)?.to_vec2::<f32>()?)
    }

    fn fit(&mut self, states: &[State], targets: &[Vec<f32>]) -> Result<f32> {
        if states.len() != targets.len() {
            return Err(Error::DimensionMismatch {
                expected: states.len(),
                actual: targets.len(),
            });
        }
        let out_dim = self.config.out_dim();
        let mut flat = Vec::with_capacity(targets.len() * out_dim);
        for row in targets {
            if row.len() != out_dim {
                return Err(Error::DimensionMismatch {
                    expected: out_dim,
                    actual: row.len(),
                });
            }
            flat.extend_from_slice(row);
        }

        let input_tensor = Self::input_tensor(states)?;
        let target_tensor = Tensor::from_vec(flat, (targets.len(), out_dim), &DEVICE)?;
        let predicted = self.output(&input_tensor)?;
        let loss = loss::mse(&predicted, &target_tensor)?;
        self.optimiser.backward_step(&loss)?;

        Ok(loss.to_scalar::<f32>()?)
    }

    fn get_weights(&self) -> Result<Weights> {
        let vars = self.var_map.data().lock().map_err(|_| Error::LockPoisoned)?;
        let mut weights = HashMap::with_capacity(vars.len());
        for (name, var) in vars.iter() {
            // Deep copy so later optimiser steps do not leak into the snapshot.
            weights.insert(name.clone(), var.as_tensor().copy()?);
        }
        Ok(weights)
    }

    fn set_weights(&mut self, weights: &Weights) -> Result<()> {
        let vars = self.var_map.data().lock().map_err(|_| Error::LockPoisoned)?;
        for (name, var) in vars.iter() {
            let source = weights
                .get(name)
                .ok_or_else(|| Error::MissingParameter(name.clone()))?;
            var.set(source)?;
        }
        Ok(())
    }
}
