//! Configuration of the agent, the training driver and the environment.
//!
//! Every section has defaults matching the reference run, so an absent or
//! partial YAML file is fine.
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    lunar_lander::LunarLanderConfig,
};

/// Adam optimiser settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub lr: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self { lr: 1e-3 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Widths of the hidden layers of both Q-networks.
    pub hidden_units: Vec<usize>,
    pub replay_capacity: usize,
    pub gamma: f32,
    pub batch_size: usize,
    /// No learning happens until the replay buffer holds this many transitions.
    pub min_replay_size: usize,
    /// Completed episodes between target-network syncs.
    pub update_target_every: usize,
    pub optimizer: OptimizerConfig,
    pub seed: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            hidden_units: vec![256, 128],
            replay_capacity: 1 << 16,
            gamma: 0.99,
            batch_size: 64,
            min_replay_size: 10_000,
            update_target_every: 5,
            optimizer: OptimizerConfig::default(),
            seed: None,
        }
    }
}

impl AgentConfig {
    /// Rejects settings under which `learn` could not draw a full mini-batch.
    pub fn validate(&self) -> Result<()> {
        if self.replay_capacity == 0 {
            return Err(Error::InvalidConfig("replay_capacity must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be positive".into()));
        }
        if self.min_replay_size < self.batch_size {
            return Err(Error::InvalidConfig(format!(
                "min_replay_size ({}) is smaller than batch_size ({})",
                self.min_replay_size, self.batch_size
            )));
        }
        if self.replay_capacity < self.batch_size {
            return Err(Error::InvalidConfig(format!(
                "replay_capacity ({}) is smaller than batch_size ({})",
                self.replay_capacity, self.batch_size
            )));
        }
        Ok(())
    }

    pub fn replay_capacity(mut self, v: usize) -> Self {
        self.replay_capacity = v;
        self
    }

    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    pub fn min_replay_size(mut self, v: usize) -> Self {
        self.min_replay_size = v;
        self
    }

    pub fn update_target_every(mut self, v: usize) -> Self {
        self.update_target_every = v;
        self
    }

    pub fn hidden_units(mut self, v: Vec<usize>) -> Self {
        self.hidden_units = v;
        self
    }

    pub fn seed(mut self, v: u64) -> Self {
        self.seed = Some(v);
        self
    }
}

/// Which epsilon the evaluation episodes act with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalEpsilon {
    /// Strictly greedy.
    Greedy,
    /// Whatever epsilon training ended with.
    Final,
    Fixed(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub num_episodes: usize,
    pub epsilon_start: f64,
    pub epsilon_decay: f64,
    pub epsilon_min: f64,
    /// Number of trailing episodes averaged for the solved check.
    pub solve_window: usize,
    pub solve_threshold: f32,
    pub stop_when_solved: bool,
    /// Episodes between progress lines.
    pub log_interval: usize,
    pub eval_episodes: usize,
    pub eval_epsilon: EvalEpsilon,
    pub report_dir: String,
    pub model_dir: String,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            num_episodes: 2000,
            epsilon_start: 1.0,
            epsilon_decay: 0.998,
            epsilon_min: 0.0,
            solve_window: 100,
            solve_threshold: 200.0,
            stop_when_solved: false,
            log_interval: 10,
            eval_episodes: 100,
            eval_epsilon: EvalEpsilon::Final,
            report_dir: "./report".to_string(),
            model_dir: "./model_lunarlander".to_string(),
        }
    }
}

impl TrainerConfig {
    pub fn num_episodes(mut self, v: usize) -> Self {
        self.num_episodes = v;
        self
    }

    pub fn eval_episodes(mut self, v: usize) -> Self {
        self.eval_episodes = v;
        self
    }

    pub fn eval_epsilon(mut self, v: EvalEpsilon) -> Self {
        self.eval_epsilon = v;
        self
    }

    pub fn stop_when_solved(mut self, v: bool) -> Self {
        self.stop_when_solved = v;
        self
    }
}

/// Whole-run configuration, read from `dqn_lunarlander.yaml` when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DqnLunarLanderConfig {
    pub agent: AgentConfig,
    pub trainer: TrainerConfig,
    pub env: LunarLanderConfig,
}

impl DqnLunarLanderConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let config = serde_yaml::from_reader(rdr)?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn yaml_round_trip() -> Result<()> {
        let tmp_dir = TempDir::new("dqn_config")?;
        let path = tmp_dir.path().join("config.yaml");
        let mut config = DqnLunarLanderConfig::default();
        config.agent = config.agent.batch_size(32).seed(3);
        config.trainer = config.trainer.eval_epsilon(EvalEpsilon::Fixed(0.05));

        config.save(&path)?;
        assert_eq!(DqnLunarLanderConfig::load(&path)?, config);
        Ok(())
    }

    #[test]
    fn partial_yaml_uses_defaults() -> Result<()> {
        let config: DqnLunarLanderConfig =
            serde_yaml::from_str("trainer:\n  num_episodes: 3\n")?;
        assert_eq!(config.trainer.num_episodes, 3);
        assert_eq!(config.trainer.epsilon_decay, 0.998);
        assert_eq!(config.agent, AgentConfig::default());
        Ok(())
    }

    #[test]
    fn default_agent_config_is_valid() -> Result<()> {
        AgentConfig::default().validate()
    }

    #[test]
    fn rejects_configs_without_a_full_batch() {
        let base = AgentConfig::default();
        for config in [
            base.clone().batch_size(0),
            base.clone().replay_capacity(0),
            base.clone().min_replay_size(2),
            base.clone().replay_capacity(32),
        ] {
            assert!(
                matches!(config.validate(), Err(Error::InvalidConfig(_))),
                "{:?}",
                config
            );
        }
    }

    #[test]
    fn zero_capacity_from_yaml_is_an_error() -> Result<()> {
        let config: DqnLunarLanderConfig =
            serde_yaml::from_str("agent:\n  replay_capacity: 0\n")?;
        assert!(config.agent.validate().is_err());
        Ok(())
    }
}
