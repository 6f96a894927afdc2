use rand::Rng;

use super::expression::Expression;

/// Lid counts as open below this closure.
const OPEN_THRESHOLD: f32 = 0.02;
const VELOCITY_DAMPING: f32 = 0.78;
/// Gap between the two halves of a double blink, in seconds.
const DOUBLE_BLINK_GAP: f64 = 0.12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlinkStyle {
    #[default]
    Normal,
    Slow,
    Double,
}

impl BlinkStyle {
    pub fn for_expression(expression: Expression) -> Self {
        match expression {
            Expression::Sleepy => BlinkStyle::Slow,
            Expression::Surprised => BlinkStyle::Double,
            _ => BlinkStyle::Normal,
        }
    }

    fn open_force(self) -> f32 {
        match self {
            BlinkStyle::Slow => 0.075,
            _ => 0.1,
        }
    }
}

/// Lid closure as a damped impulse: `value` 0 is fully open, 1 fully shut.
/// Times are engine seconds.
#[derive(Debug, Clone)]
pub struct BlinkState {
    value: f32,
    velocity: f32,
    next_at: f64,
    double_pending: u8,
    style: BlinkStyle,
}

impl BlinkState {
    pub fn new(now: f64, rng: &mut impl Rng) -> Self {
        Self {
            value: 0.0,
            velocity: 0.0,
            next_at: now + 0.9 + rng.gen::<f64>() * 1.4,
            double_pending: 0,
            style: BlinkStyle::Normal,
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn style(&self) -> BlinkStyle {
        self.style
    }

    pub fn is_open(&self) -> bool {
        self.value <= OPEN_THRESHOLD
    }

    /// Force a blink now; `strength` 1.0 is a normal blink.
    pub fn trigger(&mut self, now: f64, strength: f32, rng: &mut impl Rng) {
        let strength = if strength.is_finite() { strength.max(0.0) } else { 1.0 };
        self.velocity = self.velocity.max(0.14 * strength);
        self.next_at = now + 1.1 + rng.gen::<f64>() * 1.8;
    }

    pub fn update(&mut self, now: f64, dt: f32, expression: Expression, rng: &mut impl Rng) {
        self.style = BlinkStyle::for_expression(expression);

        if now >= self.next_at && self.is_open() {
            self.schedule(now, rng);
        }

        self.value += self.velocity;
        self.velocity *= VELOCITY_DAMPING;
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.value -= (self.style.open_force() + self.value * 0.06) * dt * 60.0;
        self.value = if self.value.is_finite() {
            self.value.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    fn schedule(&mut self, now: f64, rng: &mut impl Rng) {
        if self.style == BlinkStyle::Double && self.double_pending == 0 && rng.gen::<f32>() < 0.35 {
            self.double_pending = 2;
        }

        if self.double_pending > 0 {
            self.velocity += 0.2 + rng.gen::<f32>() * 0.05;
            self.double_pending -= 1;
            self.next_at = if self.double_pending > 0 {
                now + DOUBLE_BLINK_GAP
            } else {
                now + 1.4 + rng.gen::<f64>() * 2.2
            };
            return;
        }

        let (impulse, next) = match self.style {
            BlinkStyle::Slow => (
                0.16 + rng.gen::<f32>() * 0.06,
                2.0 + rng.gen::<f64>() * 3.2,
            ),
            _ => (
                0.22 + rng.gen::<f32>() * 0.08,
                1.8 + rng.gen::<f64>() * 2.8,
            ),
        };
        self.velocity += impulse;
        self.next_at = now + next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn blinks_close_then_reopen() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut blink = BlinkState::new(0.0, &mut rng);
        let dt = 1.0 / 60.0;

        let mut peak: f32 = 0.0;
        let mut now = 0.0;
        for _ in 0..600 {
            now += dt as f64;
            blink.update(now, dt, Expression::Neutral, &mut rng);
            peak = peak.max(blink.value());
            assert!((0.0..=1.0).contains(&blink.value()));
        }
        assert!(peak > 0.1, "never blinked: {}", peak);
    }

    #[test]
    fn trigger_starts_a_blink_immediately() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut blink = BlinkState::new(0.0, &mut rng);
        blink.trigger(0.0, 1.2, &mut rng);
        blink.update(0.0, 0.0, Expression::Neutral, &mut rng);
        assert!(blink.value() > 0.15);
        assert!(!blink.is_open());
    }

    #[test]
    fn garbage_inputs_keep_value_in_range() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut blink = BlinkState::new(0.0, &mut rng);
        blink.trigger(0.0, f32::NAN, &mut rng);
        blink.update(0.0, f32::INFINITY, Expression::Sleepy, &mut rng);
        assert!((0.0..=1.0).contains(&blink.value()));
        blink.trigger(0.0, 1000.0, &mut rng);
        blink.update(0.0, 0.016, Expression::Surprised, &mut rng);
        assert!((0.0..=1.0).contains(&blink.value()));
    }

    #[test]
    fn style_follows_expression() {
        assert_eq!(BlinkStyle::for_expression(Expression::Sleepy), BlinkStyle::Slow);
        assert_eq!(BlinkStyle::for_expression(Expression::Surprised), BlinkStyle::Double);
        assert_eq!(BlinkStyle::for_expression(Expression::Angry), BlinkStyle::Normal);
    }

    fn scheduled(seed: u64, style: BlinkStyle, now: f64) -> (BlinkState, StdRng) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut blink = BlinkState::new(0.0, &mut rng);
        blink.style = style;
        blink.schedule(now, &mut rng);
        (blink, rng)
    }

    #[test]
    fn surprised_sometimes_queues_a_second_impulse() {
        let now = 10.0;
        let mut doubles = 0;
        for seed in 0..400 {
            let (mut blink, mut rng) = scheduled(seed, BlinkStyle::Double, now);

            if blink.double_pending == 1 {
                doubles += 1;
                assert!(blink.velocity >= 0.2 && blink.velocity <= 0.25 + f32::EPSILON);
                assert!((blink.next_at - (now + 0.12)).abs() < 1e-9);

                let second = blink.next_at;
                blink.schedule(second, &mut rng);
                assert_eq!(blink.double_pending, 0);
                assert!(blink.next_at >= second + 1.4 && blink.next_at <= second + 3.6);
            } else {
                assert_eq!(blink.double_pending, 0);
                assert!(blink.next_at >= now + 1.8);
            }
        }
        // Roughly 35% of 400.
        assert!((90..=190).contains(&doubles), "doubles: {}", doubles);
    }

    #[test]
    fn other_styles_never_double() {
        for seed in 0..100 {
            for style in [BlinkStyle::Normal, BlinkStyle::Slow] {
                let (blink, _) = scheduled(seed, style, 5.0);
                assert_eq!(blink.double_pending, 0);
                assert!(blink.next_at >= 5.0 + 1.8);
            }
        }
    }

    #[test]
    fn surprised_eyes_blink_twice_in_quick_succession() {
        let mut rng = StdRng::seed_from_u64(21);
        let mut blink = BlinkState::new(0.0, &mut rng);
        let dt = 1.0 / 60.0;

        let mut onsets = Vec::new();
        let mut now = 0.0;
        for _ in 0..(120 * 60) {
            now += dt as f64;
            let was_open = blink.is_open();
            blink.update(now, dt, Expression::Surprised, &mut rng);
            if was_open && !blink.is_open() {
                onsets.push(now);
            }
        }
        assert!(onsets.len() > 10);
        assert!(
            onsets.windows(2).any(|pair| pair[1] - pair[0] < 0.5),
            "no double blink among {:?}",
            onsets
        );
    }
}
