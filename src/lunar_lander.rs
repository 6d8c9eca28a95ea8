//! A lightweight LunarLander simulation.
//!
//! Rigid-body rendition of the classic control task on flat terrain. The
//! observation layout, action meanings and reward shaping follow the Gym
//! environment; the contact model is simplified (inelastic legs, hull contact
//! or a hard touchdown ends the episode as a crash).
use log::trace;
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::{
    environment::{Environment, StepInfo, StepOutcome},
    error::Result,
    state::{ACTION_COUNT, Action, STATE_DIM, State},
};

const FPS: f32 = 50.0;
const SCALE: f32 = 30.0;
const VIEWPORT_W: f32 = 600.0;
const VIEWPORT_H: f32 = 400.0;
const GRAVITY: f32 = -10.0;

const W: f32 = VIEWPORT_W / SCALE;
const H: f32 = VIEWPORT_H / SCALE;
const HELIPAD_Y: f32 = H / 4.0;

const LEG_AWAY: f32 = 20.0 / SCALE;
const LEG_DOWN: f32 = 18.0 / SCALE;
// Hull corners relative to the body centre.
const HULL: [(f32, f32); 6] = [
    (-14.0 / SCALE, 17.0 / SCALE),
    (-17.0 / SCALE, 0.0),
    (-17.0 / SCALE, -10.0 / SCALE),
    (17.0 / SCALE, -10.0 / SCALE),
    (17.0 / SCALE, 0.0),
    (14.0 / SCALE, 17.0 / SCALE),
];

const MAIN_ENGINE_ACCEL: f32 = 18.0;
const MAIN_ENGINE_DISPERSION: f32 = 1.0 / SCALE;
const SIDE_ENGINE_ACCEL: f32 = 2.5;
const SIDE_ENGINE_ANGULAR_ACCEL: f32 = 4.0;

const CRASH_SPEED: f32 = 2.5;
const CONTACT_EPS: f32 = 0.01;
const GROUND_FRICTION: f32 = 0.9;
const CONTACT_SPIN_DAMPING: f32 = 0.8;
const LEVELING_ANGULAR_ACCEL: f32 = 2.0;
const REST_SPEED: f32 = 0.05;
const REST_SPIN: f32 = 0.05;
const REST_FRAMES: usize = 25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LunarLanderConfig {
    /// Episodes are cut after this many steps.
    pub max_episode_steps: usize,
    /// Bound of the uniformly drawn initial velocity, per axis.
    pub initial_random_velocity: f32,
    pub seed: Option<u64>,
}

impl Default for LunarLanderConfig {
    fn default() -> Self {
        Self {
            max_episode_steps: 1000,
            initial_random_velocity: 2.0,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Body {
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    angle: f32,
    omega: f32,
}

impl Body {
    /// World position of a point given relative to the body centre.
    fn world(&self, (px, py): (f32, f32)) -> (f32, f32) {
        let (sin, cos) = self.angle.sin_cos();
        (
            self.x + px * cos - py * sin,
            self.y + px * sin + py * cos,
        )
    }

    fn leg_tips(&self) -> [(f32, f32); 2] {
        [
            self.world((-LEG_AWAY, -LEG_DOWN)),
            self.world((LEG_AWAY, -LEG_DOWN)),
        ]
    }
}

pub struct LunarLander {
    config: LunarLanderConfig,
    rng: StdRng,
    body: Body,
    legs: [bool; 2],
    prev_shaping: f32,
    steps: usize,
    rest_frames: usize,
    game_over: bool,
}

impl LunarLander {
    pub fn new(config: LunarLanderConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut env = Self {
            config,
            rng,
            body: Body::default(),
            legs: [false; 2],
            prev_shaping: 0.0,
            steps: 0,
            rest_frames: 0,
            game_over: false,
        };
        env.reset_body();
        env
    }

    fn reset_body(&mut self) {
        let v = self.config.initial_random_velocity;
        self.body = Body {
            x: W / 2.0,
            y: H,
            vx: self.rng.random_range(-v..=v),
            vy: self.rng.random_range(-v..=v),
            angle: 0.0,
            omega: 0.0,
        };
        self.legs = [false; 2];
        self.steps = 0;
        self.rest_frames = 0;
        self.game_over = false;
        self.prev_shaping = Self::shaping(&self.observe());
    }

    fn observe(&self) -> State {
        let b = &self.body;
        State {
            x: (b.x - W / 2.0) / (W / 2.0),
            y: (b.y - (HELIPAD_Y + LEG_DOWN)) / (H / 2.0),
            x_velocity: b.vx * (W / 2.0) / FPS,
            y_velocity: b.vy * (H / 2.0) / FPS,
            angle: b.angle,
            angular_velocity: 20.0 * b.omega / FPS,
            leg0_contact: if self.legs[0] { 1.0 } else { 0.0 },
            leg1_contact: if self.legs[1] { 1.0 } else { 0.0 },
        }
    }

    fn shaping(s: &State) -> f32 {
        -100.0 * (s.x * s.x + s.y * s.y).sqrt()
            - 100.0 * (s.x_velocity * s.x_velocity + s.y_velocity * s.y_velocity).sqrt()
            - 100.0 * s.angle.abs()
            + 10.0 * s.leg0_contact
            + 10.0 * s.leg1_contact
    }

    /// Applies engine thrust and returns `(main_power, side_power)` for the fuel penalty.
    fn fire_engines(&mut self, action: Action, dt: f32) -> (f32, f32) {
        let (sin, cos) = self.body.angle.sin_cos();
        let up = (-sin, cos);
        let right = (cos, sin);
        match action {
            Action::Noop => (0.0, 0.0),
            Action::FireMain => {
                let dispersion = self.rng.random_range(-1.0..1.0) * MAIN_ENGINE_DISPERSION;
                self.body.vx += (up.0 + right.0 * dispersion) * MAIN_ENGINE_ACCEL * dt;
                self.body.vy += (up.1 + right.1 * dispersion) * MAIN_ENGINE_ACCEL * dt;
                (1.0, 0.0)
            }
            Action::FireLeft | Action::FireRight => {
                // The left engine pushes the lander right and spins it clockwise.
                let direction = if action == Action::FireLeft { 1.0 } else { -1.0 };
                self.body.vx += direction * right.0 * SIDE_ENGINE_ACCEL * dt;
                self.body.vy += direction * right.1 * SIDE_ENGINE_ACCEL * dt;
                self.body.omega -= direction * SIDE_ENGINE_ANGULAR_ACCEL * dt;
                (0.0, 1.0)
            }
        }
    }

    fn resolve_ground_contact(&mut self, dt: f32) {
        let tips = self.body.leg_tips();
        let lowest = tips[0].1.min(tips[1].1);
        if lowest < HELIPAD_Y {
            self.body.y += HELIPAD_Y - lowest;
            if self.body.vy < 0.0 {
                if -self.body.vy > CRASH_SPEED {
                    trace!("hard touchdown at {:.2}", -self.body.vy);
                    self.game_over = true;
                }
                self.body.vy = 0.0;
            }
            self.body.vx *= GROUND_FRICTION;
        }

        let tips = self.body.leg_tips();
        self.legs = [
            tips[0].1 <= HELIPAD_Y + CONTACT_EPS,
            tips[1].1 <= HELIPAD_Y + CONTACT_EPS,
        ];
        match self.legs {
            [true, true] => self.body.omega *= CONTACT_SPIN_DAMPING,
            [true, false] | [false, true] => {
                self.body.omega *= CONTACT_SPIN_DAMPING;
                self.body.omega -= self.body.angle.signum() * LEVELING_ANGULAR_ACCEL * dt;
            }
            [false, false] => {}
        }

        let hull_bottom = HULL
            .iter()
            .map(|p| self.body.world(*p).1)
            .fold(f32::INFINITY, f32::min);
        if hull_bottom < HELIPAD_Y {
            self.game_over = true;
        }
    }

    fn update_rest(&mut self) -> bool {
        let speed = (self.body.vx * self.body.vx + self.body.vy * self.body.vy).sqrt();
        if self.legs == [true, true] && speed < REST_SPEED && self.body.omega.abs() < REST_SPIN {
            self.rest_frames += 1;
        } else {
            self.rest_frames = 0;
        }
        self.rest_frames >= REST_FRAMES
    }

    #[cfg(test)]
    fn place(&mut self, x: f32, y: f32, angle: f32) {
        self.body = Body {
            x,
            y,
            angle,
            ..Body::default()
        };
        self.prev_shaping = Self::shaping(&self.observe());
    }
}

impl Environment for LunarLander {
    fn reset(&mut self) -> Result<State> {
        self.reset_body();
        Ok(self.observe())
    }

    fn step(&mut self, action: Action) -> Result<StepOutcome> {
        let dt = 1.0 / FPS;
        let (m_power, s_power) = self.fire_engines(action, dt);

        self.body.vy += GRAVITY * dt;
        self.body.x += self.body.vx * dt;
        self.body.y += self.body.vy * dt;
        self.body.angle += self.body.omega * dt;
        self.resolve_ground_contact(dt);
        self.steps += 1;

        let state = self.observe();
        let shaping = Self::shaping(&state);
        let mut reward = shaping - self.prev_shaping;
        self.prev_shaping = shaping;
        reward -= m_power * 0.30;
        reward -= s_power * 0.03;

        let at_rest = self.update_rest();
        let crashed = self.game_over || state.x.abs() >= 1.0;
        let truncated = self.steps >= self.config.max_episode_steps;
        if crashed {
            reward = -100.0;
        } else if at_rest {
            reward = 100.0;
        }

        Ok(StepOutcome {
            next_state: state,
            reward,
            done: crashed || at_rest || truncated,
            info: StepInfo {
                steps: self.steps,
                crashed,
                at_rest,
                truncated,
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
