use std::path::Path;

use log::debug;
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    config::AgentConfig,
    error::{Error, Result},
    experience::{ReplayBuffer, Transition},
    mlp::{MlpConfig, MultiLayerPerceptron, QFunction},
    state::{Action, State},
};

/// Index of the first maximum.
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate().skip(1) {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

/// Q-learning target for the taken action.
///
/// Terminal transitions do not bootstrap past the end of the episode.
pub fn td_target(reward: f32, terminal: bool, gamma: f32, max_next_q: f32) -> f32 {
    if terminal {
        reward
    } else {
        reward + gamma * max_next_q
    }
}

/// DQN agent with an online network, a target network and a replay buffer.
pub struct DqnAgent<Q: QFunction> {
    online: Q,
    target: Q,

    replay_buffer: ReplayBuffer,
    gamma: f32,
    batch_size: usize,
    min_replay_size: usize,
    update_target_every: usize,

    // Completed episodes since the last target sync.
    target_update_counter: usize,
    n_updates: usize,
    rng: StdRng,
}

impl DqnAgent<MultiLayerPerceptron> {
    /// Builds both networks as `state_dim -> hidden_units.. -> action_count` MLPs.
    pub fn with_mlp(config: &AgentConfig, state_dim: usize, action_count: usize) -> Result<Self> {
        let mlp_config = MlpConfig::new(
            state_dim,
            &config.hidden_units,
            action_count,
            config.optimizer.clone(),
        );
        let online = MultiLayerPerceptron::new(mlp_config.clone())?;
        let target = MultiLayerPerceptron::new(mlp_config)?;
        Self::new(online, target, config)
    }

    /// Persists the online network.
    pub fn save_model(&self, dir: impl AsRef<Path>) -> Result<()> {
        self.online.save(dir)
    }
}

impl<Q: QFunction> DqnAgent<Q> {
    /// The target network starts as a copy of the online network.
    pub fn new(online: Q, mut target: Q, config: &AgentConfig) -> Result<Self> {
        config.validate()?;
        target.set_weights(&online.get_weights()?)?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            online,
            target,
            replay_buffer: ReplayBuffer::new(config.replay_capacity),
            gamma: config.gamma,
            batch_size: config.batch_size,
            min_replay_size: config.min_replay_size,
            update_target_every: config.update_target_every,
            target_update_counter: 0,
            n_updates: 0,
            rng,
        })
    }

    /// Epsilon-greedy action. `epsilon` is expected in `[0, 1]`.
    pub fn select_action(&mut self, state: &State, epsilon: f64) -> Result<Action> {
        if self.rng.random::<f64>() < epsilon {
            let i = self.rng.random_range(0..Action::ALL.len());
            return Ok(Action::ALL[i]);
        }
        let q_values = self.online.predict(std::slice::from_ref(state))?;
        let row = q_values.first().ok_or(Error::DimensionMismatch {
            expected: 1,
            actual: 0,
        })?;
        Action::try_from(argmax(row))
    }

    pub fn record(&mut self, transition: Transition) {
        self.replay_buffer.push(transition);
    }

    /// One gradient step on a sampled mini-batch.
    ///
    /// Returns `None` while the replay buffer is still warming up, otherwise the loss.
    pub fn learn(&mut self, episode_terminal: bool) -> Result<Option<f32>> {
        if self.replay_buffer.len() < self.min_replay_size {
            return Ok(None);
        }

        let minibatch = self.replay_buffer.sample(self.batch_size, &mut self.rng);
        if minibatch.len() != self.batch_size {
            return Err(Error::DimensionMismatch {
                expected: self.batch_size,
                actual: minibatch.len(),
            });
        }
        let states: Vec<State> = minibatch.iter().map(|t| *t.state()).collect();
        let next_states: Vec<State> = minibatch.iter().map(|t| *t.next_state()).collect();

        let mut current_q_list = self.online.predict(&states)?;
        let future_q_list = self.target.predict(&next_states)?;

        for (i, transition) in minibatch.iter().enumerate() {
            let max_future_q = future_q_list[i]
                .iter()
                .copied()
                .fold(f32::NEG_INFINITY, f32::max);
            let target = td_target(
                transition.reward(),
                transition.terminal(),
                self.gamma,
                max_future_q,
            );

            let row_len = current_q_list[i].len();
            let slot = current_q_list[i]
                .get_mut(transition.action().index())
                .ok_or(Error::DimensionMismatch {
                    expected: Action::ALL.len(),
                    actual: row_len,
                })?;
            *slot = target;
        }

        let loss = self.online.fit(&states, &current_q_list)?;
        self.n_updates += 1;

        if episode_terminal {
            self.target_update_counter += 1;
        }
        if self.target_update_counter > self.update_target_every {
            self.target.set_weights(&self.online.get_weights()?)?;
            self.target_update_counter = 0;
            debug!("Target network synced after {} updates", self.n_updates);
        }

        Ok(Some(loss))
    }

    pub fn replay_buffer(&self) -> &ReplayBuffer {
        &self.replay_buffer
    }

    pub fn target_update_counter(&self) -> usize {
        self.target_update_counter
    }

    /// Number of gradient steps taken so far.
    pub fn n_updates(&self) -> usize {
        self.n_updates
    }

    pub fn online(&self) -> &Q {
        &self.online
    }

    pub fn target(&self) -> &Q {
        &self.target
    }
}
