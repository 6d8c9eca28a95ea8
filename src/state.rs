use crate::error::{Error, Result};

pub const STATE_DIM: usize = 8;
pub const ACTION_COUNT: usize = 4;

/// Observation of the lander, already normalised by the environment.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct State {
    pub x: f32,
    pub y: f32,
    pub x_velocity: f32,
    pub y_velocity: f32,
    pub angle: f32,
    pub angular_velocity: f32,
    /// 1.0 when the leg touches the ground, 0.0 otherwise.
    pub leg0_contact: f32,
    pub leg1_contact: f32,
}

impl State {
    pub fn to_array(&self) -> [f32; STATE_DIM] {
        [
            self.x,
            self.y,
            self.x_velocity,
            self.y_velocity,
            self.angle,
            self.angular_velocity,
            self.leg0_contact,
            self.leg1_contact,
        ]
    }

    pub fn from_array(values: [f32; STATE_DIM]) -> Self {
        Self {
            x: values[0],
            y: values[1],
            x_velocity: values[2],
            y_velocity: values[3],
            angle: values[4],
            angular_velocity: values[5],
            leg0_contact: values[6],
            leg1_contact: values[7],
        }
    }

    /// Flattens a batch of states into a row-major buffer of shape `(n, STATE_DIM)`.
    pub fn flatten(states: &[State]) -> Vec<f32> {
        let mut input_vec: Vec<f32> = Vec::with_capacity(states.len() * STATE_DIM);
        for state in states {
            input_vec.extend_from_slice(&state.to_array());
        }
        input_vec
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Noop = 0,
    FireLeft = 1,
    FireMain = 2,
    FireRight = 3,
}

impl Action {
    pub const ALL: [Action; ACTION_COUNT] = [
        Action::Noop,
        Action::FireLeft,
        Action::FireMain,
        Action::FireRight,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<usize> for Action {
    type Error = Error;

    fn try_from(value: usize) -> Result<Self> {
        Action::ALL
            .get(value)
            .copied()
            .ok_or(Error::InvalidAction(value))
    }
}
