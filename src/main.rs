use std::{path::Path, time::Instant};

use anyhow::{Context, Result};
use log::info;

use lunarlander_dqn::{
    agent::DqnAgent,
    config::DqnLunarLanderConfig,
    environment::Environment,
    lunar_lander::LunarLander,
    report,
    trainer::{Trainer, mean},
};

const CONFIG_PATH: &str = "dqn_lunarlander.yaml";
const RANDOM_BASELINE_STEPS: usize = 1000;

fn load_config() -> Result<DqnLunarLanderConfig> {
    if Path::new(CONFIG_PATH).exists() {
        info!("Loading configuration from {}", CONFIG_PATH);
        DqnLunarLanderConfig::load(CONFIG_PATH)
            .with_context(|| format!("failed to read {}", CONFIG_PATH))
    } else {
        info!("No {} found, using defaults", CONFIG_PATH);
        Ok(DqnLunarLanderConfig::default())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = load_config()?;
    let mut env = LunarLander::new(config.env.clone());
    info!(
        "LunarLander: {} observations, {} actions",
        env.state_dim(),
        env.action_count()
    );

    let baseline = Trainer::random_baseline(&mut env, &mut rand::rng(), RANDOM_BASELINE_STEPS)?;
    info!(
        "Random policy: reward {:.2} after {} steps",
        baseline.reward, baseline.steps
    );

    let mut agent = DqnAgent::with_mlp(&config.agent, env.state_dim(), env.action_count())?;
    info!(
        "Replay capacity {}, learning starts after {} transitions",
        agent.replay_buffer().capacity(),
        config.agent.min_replay_size
    );
    let mut trainer = Trainer::new(config.trainer.clone());

    let start = Instant::now();
    trainer.train(&mut env, &mut agent)?;
    let rewards = trainer.episode_rewards();
    info!(
        "Trained {} episodes in {}s; mean reward of the last 100: {:.2}",
        rewards.len(),
        start.elapsed().as_secs(),
        mean(&rewards[rewards.len().saturating_sub(100)..])
    );
    if let Some(episode) = trainer.solved_at() {
        info!("Solved at episode {}", episode);
    }
    report::write_training_report(
        &config.trainer.report_dir,
        rewards,
        trainer.episode_epsilons(),
    )?;

    info!(
        "Evaluating {} episodes with epsilon {}",
        config.trainer.eval_episodes,
        trainer.eval_epsilon()
    );
    let results = trainer.evaluate(&mut env, &mut agent)?;
    let eval_rewards: Vec<f32> = results.iter().map(|r| r.reward).collect();
    let eval_steps: Vec<f32> = results.iter().map(|r| r.steps as f32).collect();
    info!(
        "Average Reward: {:.2}; Average Iteration #: {:.1}",
        mean(&eval_rewards),
        mean(&eval_steps)
    );
    report::write_evaluation_report(&config.trainer.report_dir, &results)?;
    config.save(Path::new(&config.trainer.report_dir).join("config.yaml"))?;

    agent
        .save_model(&config.trainer.model_dir)
        .with_context(|| format!("failed to save model to {}", config.trainer.model_dir))?;

    Ok(())
}
