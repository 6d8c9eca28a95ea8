use log::{debug, info};
use rand::Rng;

use crate::{
    agent::DqnAgent,
    config::{EvalEpsilon, TrainerConfig},
    environment::Environment,
    error::Result,
    experience::Transition,
    mlp::QFunction,
    state::Action,
};

const PROGRESS_WINDOW: usize = 20;

/// Multiplicative per-episode decay floored at `min`.
#[derive(Debug, Clone, PartialEq)]
pub struct EpsilonSchedule {
    value: f64,
    decay: f64,
    min: f64,
}

impl EpsilonSchedule {
    pub fn new(start: f64, decay: f64, min: f64) -> Self {
        Self {
            value: start.max(min),
            decay,
            min,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn decay(&mut self) -> f64 {
        self.value = (self.value * self.decay).max(self.min);
        self.value
    }
}

/// Outcome of an episode played without learning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalEpisode {
    pub reward: f32,
    pub steps: usize,
}

/// Arithmetic mean, 0 for an empty slice.
pub fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

/// Drives episodes, owns the epsilon schedule and the reward history.
pub struct Trainer {
    config: TrainerConfig,
    epsilon: EpsilonSchedule,
    episode_rewards: Vec<f32>,
    episode_epsilons: Vec<f64>,
    solved_at: Option<usize>,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Self {
        let epsilon = EpsilonSchedule::new(
            config.epsilon_start,
            config.epsilon_decay,
            config.epsilon_min,
        );
        Self {
            config,
            epsilon,
            episode_rewards: Vec::new(),
            episode_epsilons: Vec::new(),
            solved_at: None,
        }
    }

    /// Plays one training episode, learning after every step, then decays epsilon.
    pub fn run_episode<E, Q>(&mut self, env: &mut E, agent: &mut DqnAgent<Q>) -> Result<f32>
    where
        E: Environment,
        Q: QFunction,
    {
        let epsilon = self.epsilon.value();
        let mut state = env.reset()?;
        let mut episode_reward = 0.0;

        loop {
            let action = agent.select_action(&state, epsilon)?;
            let outcome = env.step(action)?;
            episode_reward += outcome.reward;

            agent.record(Transition::new(
                state,
                action,
                outcome.reward,
                outcome.next_state,
                outcome.done,
            ));
            agent.learn(outcome.done)?;

            state = outcome.next_state;
            if outcome.done {
                break;
            }
        }

        self.episode_rewards.push(episode_reward);
        self.episode_epsilons.push(epsilon);
        self.epsilon.decay();
        Ok(episode_reward)
    }

    /// Runs the configured number of training episodes.
    ///
    /// Stops early once solved only when `stop_when_solved` is set.
    pub fn train<E, Q>(&mut self, env: &mut E, agent: &mut DqnAgent<Q>) -> Result<()>
    where
        E: Environment,
        Q: QFunction,
    {
        info!("Epsilon start: {}", self.epsilon.value());
        for episode_num in 1..=self.config.num_episodes {
            self.run_episode(env, agent)?;

            if self.config.log_interval > 0 && episode_num % self.config.log_interval == 0 {
                let recent = &self.episode_rewards
                    [self.episode_rewards.len().saturating_sub(PROGRESS_WINDOW)..];
                info!(
                    "Episode Num: {}; Average Reward: {:.2}; Epsilon value: {:.4}; Replay size: {}",
                    episode_num,
                    mean(recent),
                    self.epsilon.value(),
                    agent.replay_buffer().len()
                );
            }

            if self.check_solved(episode_num) && self.config.stop_when_solved {
                break;
            }
        }
        Ok(())
    }

    /// Flags the task as solved the first time the trailing mean reaches the threshold.
    fn check_solved(&mut self, episode_num: usize) -> bool {
        if self.solved_at.is_some() {
            return true;
        }
        let window = self.config.solve_window;
        if window == 0 || self.episode_rewards.len() < window {
            return false;
        }
        let trailing = mean(&self.episode_rewards[self.episode_rewards.len() - window..]);
        if trailing >= self.config.solve_threshold {
            info!(
                "Task Solved at episode #: {} with epsilon: {}",
                episode_num,
                self.epsilon.value()
            );
            self.solved_at = Some(episode_num);
            return true;
        }
        false
    }

    pub fn eval_epsilon(&self) -> f64 {
        match self.config.eval_epsilon {
            EvalEpsilon::Greedy => 0.0,
            EvalEpsilon::Final => self.epsilon.value(),
            EvalEpsilon::Fixed(v) => v,
        }
    }

    /// Plays `eval_episodes` episodes without recording or learning.
    pub fn evaluate<E, Q>(&self, env: &mut E, agent: &mut DqnAgent<Q>) -> Result<Vec<EvalEpisode>>
    where
        E: Environment,
        Q: QFunction,
    {
        let epsilon = self.eval_epsilon();
        let mut results = Vec::with_capacity(self.config.eval_episodes);
        for episode_num in 1..=self.config.eval_episodes {
            let mut state = env.reset()?;
            let mut total_reward = 0.0;
            let mut steps = 0;
            loop {
                let action = agent.select_action(&state, epsilon)?;
                let outcome = env.step(action)?;
                total_reward += outcome.reward;
                steps += 1;
                state = outcome.next_state;
                if outcome.done {
                    break;
                }
            }
            debug!(
                "Eval episode {}/{}: reward {:.2}, steps {}",
                episode_num,
                self.config.eval_episodes,
                total_reward,
                steps
            );
            results.push(EvalEpisode {
                reward: total_reward,
                steps,
            });
        }
        Ok(results)
    }

    /// One episode of the equiprobable random policy, capped at `max_steps`.
    pub fn random_baseline<E, R>(env: &mut E, rng: &mut R, max_steps: usize) -> Result<EvalEpisode>
    where
        E: Environment,
        R: Rng + ?Sized,
    {
        env.reset()?;
        let mut total_reward = 0.0;
        let mut steps = 0;
        while steps < max_steps {
            let action = Action::try_from(rng.random_range(0..env.action_count()))?;
            let outcome = env.step(action)?;
            total_reward += outcome.reward;
            steps += 1;
            if outcome.done {
                break;
            }
        }
        Ok(EvalEpisode {
            reward: total_reward,
            steps,
        })
    }

    pub fn episode_rewards(&self) -> &[f32] {
        &self.episode_rewards
    }

    /// Epsilon in effect during each training episode.
    pub fn episode_epsilons(&self) -> &[f64] {
        &self.episode_epsilons
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon.value()
    }

    pub fn solved_at(&self) -> Option<usize> {
        self.solved_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AgentConfig,
        environment::{StepInfo, StepOutcome},
        mlp::MultiLayerPerceptron,
        state::{ACTION_COUNT, STATE_DIM, State},
    };
    use rand::{SeedableRng, rngs::StdRng};

    /// Fixed-length episodes paying a constant reward per step.
    struct StubEnv {
        episode_len: usize,
        reward: f32,
        t: usize,
    }

    impl StubEnv {
        fn new(episode_len: usize, reward: f32) -> Self {
            Self {
                episode_len,
                reward,
                t: 0,
            }
        }
    }

    impl Environment for StubEnv {
        fn reset(&mut self) -> Result<State> {
            self.t = 0;
            Ok(State::default())
        }

        fn step(&mut self, _action: Action) -> Result<StepOutcome> {
            self.t += 1;
            Ok(StepOutcome {
                next_state: State::default(),
                reward: self.reward,
                done: self.t >= self.episode_len,
                info: StepInfo {
                    steps: self.t,
                    ..StepInfo::default()
                },
            })
        }

        fn action_count(&self) -> usize {
            ACTION_COUNT
        }

        fn state_dim(&self) -> usize {
            STATE_DIM
        }
    }

    fn agent(min_replay_size: usize) -> DqnAgent<MultiLayerPerceptron> {
        let config = AgentConfig::default()
            .hidden_units(vec![8])
            .batch_size(min_replay_size.min(4))
            .min_replay_size(min_replay_size)
            .seed(0);
        DqnAgent::with_mlp(&config, STATE_DIM, ACTION_COUNT).unwrap()
    }

    fn quiet(config: TrainerConfig) -> TrainerConfig {
        TrainerConfig {
            log_interval: 0,
            ..config
        }
    }

    #[test]
    fn epsilon_decays_to_floor() {
        let mut schedule = EpsilonSchedule::new(1.0, 0.998, 0.0);
        for _ in 0..500 {
            schedule.decay();
        }
        assert!((schedule.value() - 0.998f64.powi(500)).abs() < 1e-12);

        let mut floored = EpsilonSchedule::new(1.0, 0.998, 0.5);
        for n in 1..=1000 {
            let v = floored.decay();
            assert!((v - 0.5f64.max(0.998f64.powi(n))).abs() < 1e-12);
            assert!(v >= 0.5);
        }
        assert_eq!(floored.value(), 0.5);
    }

    #[test]
    fn single_terminal_step_episode() -> Result<()> {
        let mut env = StubEnv::new(1, 100.0);
        let mut agent = agent(2);
        let mut trainer = Trainer::new(quiet(TrainerConfig::default().num_episodes(1)));

        trainer.train(&mut env, &mut agent)?;

        assert_eq!(agent.replay_buffer().len(), 1);
        assert_eq!(agent.n_updates(), 0);
        assert_eq!(trainer.episode_rewards(), &[100.0]);
        assert_eq!(trainer.episode_epsilons(), &[1.0]);
        assert!((trainer.epsilon() - 0.998).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn learning_runs_once_buffer_is_warm() -> Result<()> {
        let mut env = StubEnv::new(5, -1.0);
        let mut agent = agent(3);
        let mut trainer = Trainer::new(quiet(TrainerConfig::default().num_episodes(2)));

        trainer.train(&mut env, &mut agent)?;

        // Steps 3..=10 each learn once on a batch of 3.
        assert_eq!(agent.replay_buffer().len(), 10);
        assert_eq!(agent.n_updates(), 8);
        assert_eq!(trainer.episode_rewards(), &[-5.0, -5.0]);
        Ok(())
    }

    #[test]
    fn solved_is_reported_once_and_training_continues() -> Result<()> {
        let mut env = StubEnv::new(1, 250.0);
        let mut agent = agent(usize::MAX);
        let mut trainer = Trainer::new(quiet(TrainerConfig::default().num_episodes(150)));

        trainer.train(&mut env, &mut agent)?;

        assert_eq!(trainer.solved_at(), Some(100));
        assert_eq!(trainer.episode_rewards().len(), 150);
        Ok(())
    }

    #[test]
    fn stop_when_solved_halts_training() -> Result<()> {
        let mut env = StubEnv::new(1, 250.0);
        let mut agent = agent(usize::MAX);
        let config = TrainerConfig::default()
            .num_episodes(150)
            .stop_when_solved(true);
        let mut trainer = Trainer::new(quiet(config));

        trainer.train(&mut env, &mut agent)?;

        assert_eq!(trainer.solved_at(), Some(100));
        assert_eq!(trainer.episode_rewards().len(), 100);
        Ok(())
    }

    #[test]
    fn below_threshold_is_never_solved() -> Result<()> {
        let mut env = StubEnv::new(1, 199.0);
        let mut agent = agent(usize::MAX);
        let mut trainer = Trainer::new(quiet(TrainerConfig::default().num_episodes(120)));

        trainer.train(&mut env, &mut agent)?;
        assert_eq!(trainer.solved_at(), None);
        Ok(())
    }

    #[test]
    fn evaluation_neither_records_nor_learns() -> Result<()> {
        let mut env = StubEnv::new(7, 2.0);
        let mut agent = agent(1);
        let trainer = Trainer::new(quiet(
            TrainerConfig::default()
                .eval_episodes(3)
                .eval_epsilon(EvalEpsilon::Greedy),
        ));

        let results = trainer.evaluate(&mut env, &mut agent)?;

        assert_eq!(
            results,
            vec![
                EvalEpisode {
                    reward: 14.0,
                    steps: 7
                };
                3
            ]
        );
        assert!(agent.replay_buffer().is_empty());
        assert_eq!(agent.n_updates(), 0);
        Ok(())
    }

    #[test]
    fn eval_epsilon_follows_config() {
        let base = TrainerConfig::default();
        let greedy = Trainer::new(base.clone().eval_epsilon(EvalEpsilon::Greedy));
        let fixed = Trainer::new(base.clone().eval_epsilon(EvalEpsilon::Fixed(0.05)));
        let last = Trainer::new(base.eval_epsilon(EvalEpsilon::Final));
        assert_eq!(greedy.eval_epsilon(), 0.0);
        assert_eq!(fixed.eval_epsilon(), 0.05);
        assert_eq!(last.eval_epsilon(), last.epsilon());
    }

    #[test]
    fn random_baseline_respects_step_cap() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(9);
        let mut long = StubEnv::new(usize::MAX, 1.0);
        let capped = Trainer::random_baseline(&mut long, &mut rng, 1000)?;
        assert_eq!(capped.steps, 1000);

        let mut short = StubEnv::new(4, 1.0);
        let done = Trainer::random_baseline(&mut short, &mut rng, 1000)?;
        assert_eq!(done.steps, 4);
        assert_eq!(done.reward, 4.0);
        Ok(())
    }
}
