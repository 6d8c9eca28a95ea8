use crate::{
    error::Result,
    state::{Action, State},
};

/// Diagnostic details of a step, not used for learning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepInfo {
    pub steps: usize,
    pub crashed: bool,
    pub at_rest: bool,
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub next_state: State,
    pub reward: f32,
    pub done: bool,
    pub info: StepInfo,
}

/// Episodic control task with a continuous observation and a discrete action set.
pub trait Environment {
    fn reset(&mut self) -> Result<State>;

    fn step(&mut self, action: Action) -> Result<StepOutcome>;

    fn action_count(&self) -> usize;

    fn state_dim(&self) -> usize;
}
