//! Deep Q-Network agent for the LunarLander task: online and target
//! Q-networks, experience replay, epsilon-greedy exploration and a native
//! lander simulator.

pub mod agent;
pub mod config;
pub mod device;
pub mod environment;
pub mod error;
pub mod experience;
pub mod lunar_lander;
pub mod mlp;
pub mod report;
pub mod state;
pub mod trainer;
