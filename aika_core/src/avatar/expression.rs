use rand::Rng;
use serde::{Deserialize, Serialize};

use super::mood::MoodState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expression {
    #[default]
    Neutral,
    Curious,
    Happy,
    Sleepy,
    Focused,
    Sad,
    Bored,
    Excited,
    Surprised,
    Suspicious,
    Angry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EyeSide {
    Left,
    Right,
}

impl EyeSide {
    pub const BOTH: [EyeSide; 2] = [EyeSide::Left, EyeSide::Right];

    pub fn index(self) -> usize {
        match self {
            EyeSide::Left => 0,
            EyeSide::Right => 1,
        }
    }
}

impl Expression {
    pub const ALL: [Expression; 11] = [
        Expression::Neutral,
        Expression::Curious,
        Expression::Happy,
        Expression::Sleepy,
        Expression::Focused,
        Expression::Sad,
        Expression::Bored,
        Expression::Excited,
        Expression::Surprised,
        Expression::Suspicious,
        Expression::Angry,
    ];

    /// Autonomous pick weights, parallel to [`Expression::ALL`].
    pub const WEIGHTS: [u32; 11] = [22, 18, 14, 12, 10, 8, 6, 5, 3, 2, 1];

    pub fn label(self) -> &'static str {
        match self {
            Expression::Neutral => "neutral",
            Expression::Curious => "curious",
            Expression::Happy => "happy",
            Expression::Sleepy => "sleepy",
            Expression::Focused => "focused",
            Expression::Sad => "sad",
            Expression::Bored => "bored",
            Expression::Excited => "excited",
            Expression::Surprised => "surprised",
            Expression::Suspicious => "suspicious",
            Expression::Angry => "angry",
        }
    }

    /// Weighted pick for the idle "personality" expression.
    pub fn pick_weighted(rng: &mut impl Rng) -> Expression {
        let total: u32 = Self::WEIGHTS.iter().sum();
        let mut roll = rng.gen_range(0..total);
        for (expression, weight) in Self::ALL.iter().zip(Self::WEIGHTS) {
            if roll < weight {
                return *expression;
            }
            roll -= weight;
        }
        Expression::Neutral
    }

    fn base_open(self) -> f32 {
        match self {
            Expression::Neutral => 0.96,
            Expression::Curious => 1.0,
            Expression::Angry => 0.58,
            Expression::Surprised => 1.12,
            Expression::Sleepy => 0.48,
            Expression::Focused => 0.78,
            Expression::Sad => 0.60,
            Expression::Happy => 0.75,
            Expression::Suspicious => 0.8,
            Expression::Bored => 0.5,
            Expression::Excited => 1.1,
        }
    }
}

/// Pick the expression for this frame.
///
/// `override_expression` is the explicit override, or the autonomous random
/// pick when no explicit override is set.
pub fn compute_expression(
    mood: MoodState,
    override_expression: Option<Expression>,
    pointer_near: f32,
) -> Expression {
    if let Some(expression) = override_expression {
        return expression;
    }
    match mood {
        MoodState::Error => Expression::Angry,
        MoodState::Standby => Expression::Sleepy,
        MoodState::Listening if pointer_near > 0.2 => Expression::Curious,
        MoodState::Speaking => Expression::Curious,
        _ => Expression::Neutral,
    }
}

/// Tuning for the autonomous gaze walk. Intervals are in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazeParams {
    pub range: f32,
    pub move_speed: f32,
    pub interval_min: f32,
    pub interval_max: f32,
    pub center_chance: f32,
    pub idle_drift: f32,
    pub glance_chance: f32,
    pub y_bias: f32,
    pub speed_vary: f32,
}

impl GazeParams {
    #[allow(clippy::too_many_arguments)]
    const fn new(
        range: f32,
        move_speed: f32,
        interval_min: f32,
        interval_max: f32,
        center_chance: f32,
        idle_drift: f32,
        glance_chance: f32,
        y_bias: f32,
        speed_vary: f32,
    ) -> Self {
        Self {
            range,
            move_speed,
            interval_min,
            interval_max,
            center_chance,
            idle_drift,
            glance_chance,
            y_bias,
            speed_vary,
        }
    }

    pub fn for_expression(expression: Expression) -> Self {
        match expression {
            Expression::Sleepy => Self::new(0.5, 5.0, 3.5, 6.0, 0.55, 0.02, 0.0, 0.08, 0.12),
            Expression::Bored => Self::new(0.6, 5.5, 3.0, 5.5, 0.5, 0.025, 0.05, 0.06, 0.14),
            Expression::Sad => Self::new(0.75, 6.0, 2.5, 4.5, 0.35, 0.03, 0.08, 0.2, 0.15),
            Expression::Curious => Self::new(1.0, 7.5, 0.5, 1.8, 0.08, 0.06, 0.28, 0.0, 0.18),
            Expression::Excited => Self::new(1.0, 8.0, 0.4, 1.4, 0.05, 0.08, 0.35, -0.05, 0.2),
            Expression::Surprised => Self::new(1.0, 7.8, 0.45, 1.5, 0.1, 0.07, 0.3, 0.0, 0.2),
            Expression::Angry => Self::new(0.9, 7.0, 1.2, 2.8, 0.2, 0.04, 0.15, -0.1, 0.18),
            Expression::Focused => Self::new(0.65, 6.0, 2.2, 4.2, 0.4, 0.018, 0.06, 0.0, 0.12),
            Expression::Suspicious => Self::new(0.85, 6.5, 1.8, 3.5, 0.3, 0.035, 0.18, 0.02, 0.15),
            Expression::Happy => Self::new(0.95, 7.2, 0.9, 2.4, 0.15, 0.055, 0.22, -0.06, 0.18),
            Expression::Neutral => Self::new(0.95, 7.0, 1.0, 2.8, 0.16, 0.045, 0.2, 0.0, 0.18),
        }
    }
}

/// Half-height of the open lid at horizontal position `x_norm` (-1 left edge,
/// 1 right edge), as a fraction of the eye radius. Always in `[0.18, 1.2]`.
pub fn lid_cutoff_at_x(expression: Expression, x_norm: f32, side: EyeSide) -> f32 {
    let x = if x_norm.is_finite() { x_norm.clamp(-1.0, 1.0) } else { 0.0 };
    let center = 1.0 - x.abs();

    let tilt = match expression {
        Expression::Angry => {
            let dir = match side {
                EyeSide::Left => 1.0,
                EyeSide::Right => -1.0,
            };
            0.22 * dir * x
        }
        Expression::Sad => -0.18 * center,
        _ => 0.0,
    };
    let center_lift = match expression {
        Expression::Curious => 0.08 * center,
        Expression::Happy => -0.06 * center,
        Expression::Excited => 0.1 * center,
        _ => 0.0,
    };

    (expression.base_open() + tilt + center_lift).clamp(0.18, 1.2)
}
