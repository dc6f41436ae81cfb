//! Crow agents: a fixed pool of independent perched/flying state machines.
//!
//! A perched crow idles with a small rotational wobble until its own dwell
//! timer runs out, then takes off toward a random perch point.  The flight
//! follows a bowed arc built from nested lerps (see [`flight_arc`]) while
//! tilt and opacity pulse with `sin(progress·π)`.  On arrival the crow
//! perches again with a freshly drawn dwell time.
//!
//! Crows never coordinate; each evolves from its own timer and phase.

use std::f32::consts::{PI, TAU};

use bevy::math::Vec2;
use rand::Rng;

/// Configures the crow pool.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct CrowConfig {
    pub count: usize,
    /// Seed of the crow RNG (spawn jitter, dwell times, destinations).
    pub seed: u64,
    /// Half-span of the wing "V" in local units.
    pub wing_span: f32,
    /// How far the body sits below the wing tips.
    pub wing_dip: f32,
    /// Per-crow uniform scale range.
    pub scale_min: f32,
    pub scale_max: f32,
    /// Upper bound for the random initial timer, staggering first take-offs.
    pub initial_timer_max: f32,
    /// Perched dwell range in seconds.
    pub dwell_min: f32,
    pub dwell_max: f32,
    /// Flight progress gained per second (`1 / flight_rate` ≈ flight time).
    pub flight_rate: f32,
    /// Height the arc's control point rises above the higher endpoint.
    pub lift: f32,
    /// Peak tilt mid-flight (radians).
    pub flight_tilt: f32,
    /// Opacity while perched.
    pub rest_alpha: f32,
    /// Opacity at take-off and landing.
    pub flight_alpha: f32,
    /// Extra opacity at mid-flight.
    pub flight_alpha_pulse: f32,
    /// Half-width of the random rest rotation.
    pub rest_jitter: f32,
    /// Idle wobble rate (rad/s) and amplitude (radians).
    pub idle_rate: f32,
    pub idle_wobble: f32,
    /// Perch point position along each branch (fraction of its points).
    pub perch_fraction: f32,
    /// Perches must be at least this far above the tree base.
    pub min_perch_height: f32,
}

impl Default for CrowConfig {
    fn default() -> Self {
        Self {
            count: 50,
            seed: 0x0c70_5eed,
            wing_span: 0.12,
            wing_dip: 0.02,
            scale_min: 0.85,
            scale_max: 1.2,
            initial_timer_max: 9.0,
            dwell_min: 7.0,
            dwell_max: 17.0,
            flight_rate: 0.12,
            lift: 0.7,
            flight_tilt: 0.35,
            rest_alpha: 0.85,
            flight_alpha: 0.75,
            flight_alpha_pulse: 0.10,
            rest_jitter: 0.125,
            idle_rate: 0.6,
            idle_wobble: 0.06,
            perch_fraction: 0.86,
            min_perch_height: 1.1,
        }
    }
}

/// Error returned by [`CrowConfig::validate`].
#[derive(Debug, Clone, PartialEq)]
pub enum CrowError {
    /// A field was NaN or infinite.
    NonFinite { name: &'static str, value: f32 },
    /// A range, rate or fraction was unusable.
    Invalid(&'static str),
}

impl std::fmt::Display for CrowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrowError::NonFinite { name, value } => {
                write!(f, "crow {name} must be finite (got {value})")
            }
            CrowError::Invalid(reason) => write!(f, "invalid crow config: {reason}"),
        }
    }
}

impl std::error::Error for CrowError {}

impl CrowConfig {
    /// Reject configurations the random draws in [`Crow::spawn`] and
    /// [`Crow::advance`] cannot sample from.
    pub fn validate(&self) -> Result<(), CrowError> {
        for (name, value) in [
            ("wing_span", self.wing_span),
            ("wing_dip", self.wing_dip),
            ("scale_min", self.scale_min),
            ("scale_max", self.scale_max),
            ("initial_timer_max", self.initial_timer_max),
            ("dwell_min", self.dwell_min),
            ("dwell_max", self.dwell_max),
            ("flight_rate", self.flight_rate),
            ("lift", self.lift),
            ("flight_tilt", self.flight_tilt),
            ("rest_alpha", self.rest_alpha),
            ("flight_alpha", self.flight_alpha),
            ("flight_alpha_pulse", self.flight_alpha_pulse),
            ("rest_jitter", self.rest_jitter),
            ("idle_rate", self.idle_rate),
            ("idle_wobble", self.idle_wobble),
            ("perch_fraction", self.perch_fraction),
            ("min_perch_height", self.min_perch_height),
        ] {
            if !value.is_finite() {
                return Err(CrowError::NonFinite { name, value });
            }
        }

        // Sampling also fails when the span of a range overflows.
        if !(self.dwell_min >= 0.0
            && self.dwell_min < self.dwell_max
            && (self.dwell_max - self.dwell_min).is_finite())
        {
            return Err(CrowError::Invalid(
                "dwell_min must be non-negative and below dwell_max",
            ));
        }
        if !(self.scale_min > 0.0
            && self.scale_min < self.scale_max
            && (self.scale_max - self.scale_min).is_finite())
        {
            return Err(CrowError::Invalid(
                "scale_min must be positive and below scale_max",
            ));
        }
        if self.initial_timer_max < 0.0 {
            return Err(CrowError::Invalid("initial_timer_max must be non-negative"));
        }
        if !(self.rest_jitter >= 0.0 && (self.rest_jitter * 2.0).is_finite()) {
            return Err(CrowError::Invalid("rest_jitter must be non-negative"));
        }
        if self.flight_rate <= 0.0 {
            return Err(CrowError::Invalid("flight_rate must be positive"));
        }
        if !(0.0..=1.0).contains(&self.perch_fraction) {
            return Err(CrowError::Invalid("perch_fraction must lie in [0, 1]"));
        }
        Ok(())
    }

    /// The crow sprite: one three-point "V" polyline.
    pub fn wing_lines(&self) -> Vec<Vec<Vec2>> {
        vec![vec![
            Vec2::new(-self.wing_span, 0.0),
            Vec2::new(0.0, -self.wing_dip),
            Vec2::new(self.wing_span, 0.0),
        ]]
    }

    fn draw_dwell<R: Rng>(&self, rng: &mut R) -> f32 {
        rng.random_range(self.dwell_min..self.dwell_max)
    }

    fn draw_rest_rotation<R: Rng>(&self, rng: &mut R) -> f32 {
        if self.rest_jitter > 0.0 {
            rng.random_range(-self.rest_jitter..self.rest_jitter)
        } else {
            0.0
        }
    }
}

/// In-flight payload; only exists while the crow is flying.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Flight {
    /// Fraction of the flight completed, in `[0, 1]`.
    pub progress: f32,
    pub from: Vec2,
    pub to: Vec2,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CrowState {
    /// Sitting on a perch until the timer passes `dwell` seconds.
    Perched { dwell: f32 },
    Flying(Flight),
}

/// What happened to a crow during one [`Crow::advance`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CrowTransition {
    TookOff,
    Landed,
}

/// One crow, in the tree root's local space.
#[derive(Clone, Debug)]
pub struct Crow {
    pub position: Vec2,
    /// Rotation about the view axis (radians).
    pub rotation: f32,
    pub alpha: f32,
    pub scale: f32,
    /// Seconds since entering the current state.
    pub timer: f32,
    /// Phase offset of the idle wobble.
    pub phase: f32,
    /// Rotation the idle wobble oscillates around.
    pub rest_rotation: f32,
    pub state: CrowState,
}

impl Crow {
    /// Spawn a perched crow with randomized scale, timing and phase.
    pub fn spawn<R: Rng>(perch: Vec2, config: &CrowConfig, rng: &mut R) -> Self {
        let rest_rotation = config.draw_rest_rotation(rng);
        Self {
            position: perch,
            rotation: rest_rotation,
            alpha: config.rest_alpha,
            scale: rng.random_range(config.scale_min..config.scale_max),
            timer: if config.initial_timer_max > 0.0 {
                rng.random_range(0.0..config.initial_timer_max)
            } else {
                0.0
            },
            phase: rng.random_range(0.0..TAU),
            rest_rotation,
            state: CrowState::Perched {
                dwell: config.draw_dwell(rng),
            },
        }
    }

    pub fn is_flying(&self) -> bool {
        matches!(self.state, CrowState::Flying(_))
    }

    /// Flight progress, or `None` while perched.
    pub fn flight_progress(&self) -> Option<f32> {
        match self.state {
            CrowState::Flying(f) => Some(f.progress),
            CrowState::Perched { .. } => None,
        }
    }

    /// Step the state machine by `dt` seconds at scene time `elapsed`.
    ///
    /// `perches` are the candidate destinations; with none available the
    /// crow takes off and lands on its own spot.
    pub fn advance<R: Rng>(
        &mut self,
        dt: f32,
        elapsed: f32,
        perches: &[Vec2],
        config: &CrowConfig,
        rng: &mut R,
    ) -> Option<CrowTransition> {
        self.timer += dt;
        match self.state {
            CrowState::Perched { dwell } => {
                self.rotation = self.rest_rotation
                    + (elapsed * config.idle_rate + self.phase).sin() * config.idle_wobble;
                if self.timer <= dwell {
                    return None;
                }
                let to = if perches.is_empty() {
                    self.position
                } else {
                    perches[rng.random_range(0..perches.len())]
                };
                self.timer = 0.0;
                self.state = CrowState::Flying(Flight {
                    progress: 0.0,
                    from: self.position,
                    to,
                });
                Some(CrowTransition::TookOff)
            }
            CrowState::Flying(mut flight) => {
                flight.progress = (flight.progress + dt * config.flight_rate).min(1.0);
                let pulse = (flight.progress * PI).sin();
                self.position = flight_arc(flight.from, flight.to, flight.progress, config.lift);
                self.rotation = pulse * config.flight_tilt;
                self.alpha = config.flight_alpha + pulse * config.flight_alpha_pulse;

                if flight.progress < 1.0 {
                    self.state = CrowState::Flying(flight);
                    return None;
                }
                self.position = flight.to;
                self.timer = 0.0;
                self.alpha = config.rest_alpha;
                self.rest_rotation = config.draw_rest_rotation(rng);
                self.rotation = self.rest_rotation;
                self.state = CrowState::Perched {
                    dwell: config.draw_dwell(rng),
                };
                Some(CrowTransition::Landed)
            }
        }
    }
}

/// Position along a flight at progress `t`.
///
/// `x` is a straight lerp.  `y` lerps between two lerps that share a
/// control height `max(from.y, to.y) + lift`, giving a parabola-like bow
/// without evaluating a bezier.
pub fn flight_arc(from: Vec2, to: Vec2, t: f32, lift: f32) -> Vec2 {
    let mid_y = from.y.max(to.y) + lift;
    let x = lerp(from.x, to.x, t);
    let y = lerp(lerp(from.y, mid_y, t), lerp(mid_y, to.y, t), t);
    Vec2::new(x, y)
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
