//! Per-frame animation state for the pixel eyes.
//!
//! `tick` advances time and rolls every random number the frame needs;
//! `render` is then a pure function of the returned [`FrameState`].

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::blink::BlinkState;
use super::expression::{compute_expression, Expression, EyeSide, GazeParams};
use super::gaze::{sanitize, AvatarRect, GazeController, GazeInputs};
use super::mood::MoodState;
use super::raster::{draw_eye, EyeCanvas};
use crate::scheduler::MAX_FRAME_DT;

const SCAN_SPEED: f32 = 0.70;
const RANDOM_EXPRESSION_GAP: f64 = 6.0;
const RANDOM_EXPRESSION_CHANCE: f32 = 0.2;
const GLITCH_GAP: f64 = 2.2;
const GLITCH_CHANCE: f32 = 0.18;
const RESPONSE_BLINK_GAP: f64 = 0.7;
const RESPONSE_BLINK_CHANCE: f32 = 0.22;
const RESPONSE_BLINK_STRENGTH: f32 = 0.9;
const HURT_PEAK: f32 = 0.95;
const HURT_DECAY: f32 = 0.85;

/// What the app tells the engine each frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AvatarInputs {
    pub mood: MoodState,
    pub expression_override: Option<Expression>,
    pub follow_cursor: bool,
    pub cyan_accents: bool,
    pub pointer: Option<[f32; 2]>,
    pub rect: Option<AvatarRect>,
}

/// Random values rolled for one eye.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EyeNoise {
    pub jitter: [f32; 2],
    pub flicker_roll: f32,
    pub pupil_alpha_roll: f32,
}

/// Everything needed to paint one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameState {
    /// Animation phase in seconds.
    pub time: f32,
    pub mood: MoodState,
    pub expression: Expression,
    pub blink: f32,
    pub gaze: [f32; 2],
    pub pointer_near: f32,
    pub scan_phase: f32,
    pub hurt: f32,
    pub error_flash: f32,
    pub cyan_accents: bool,
    pub glitch: bool,
    pub eyes: [EyeNoise; 2],
}

#[derive(Debug, Clone, Copy)]
struct RandomExpression {
    expression: Expression,
    expires_at: f64,
}

pub struct EyesEngine {
    rng: StdRng,
    time: f64,
    scan_phase: f32,
    gaze: GazeController,
    blink: BlinkState,
    random_expression: Option<RandomExpression>,
    last_random_pick: f64,
    hurt: f32,
    last_glitch_at: Option<f64>,
    last_response_blink_at: Option<f64>,
    glitch_pending: bool,
    pending_blink: Option<f32>,
    was_following: bool,
}

impl EyesEngine {
    /// `seed` makes the animation reproducible; `None` seeds from entropy.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(rng)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(Some(seed))
    }

    fn with_rng(mut rng: StdRng) -> Self {
        let blink = BlinkState::new(0.0, &mut rng);
        Self {
            rng,
            time: 0.0,
            scan_phase: 0.0,
            gaze: GazeController::new(),
            blink,
            random_expression: None,
            last_random_pick: 0.0,
            hurt: 0.0,
            last_glitch_at: None,
            last_response_blink_at: None,
            glitch_pending: false,
            pending_blink: None,
            was_following: false,
        }
    }

    /// Engine time in seconds.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn random_expression(&self) -> Option<Expression> {
        self.random_expression.map(|r| r.expression)
    }

    /// Glance at a screen point for `duration`.
    pub fn look_at(&mut self, point: [f32; 2], duration: Duration) {
        self.gaze.set_look_at(point, self.time, duration.as_secs_f64());
    }

    pub fn clear_look_at(&mut self) {
        self.gaze.clear_look_at();
    }

    /// Blink on the next tick.
    pub fn trigger_blink(&mut self, strength: f32) {
        let strength = if strength.is_finite() { strength.max(0.0) } else { 1.0 };
        self.pending_blink = Some(self.pending_blink.map_or(strength, |s| s.max(strength)));
    }

    /// Red flash and a glitch, decaying over the next frames.
    pub fn hurt(&mut self) {
        self.hurt = HURT_PEAK;
        self.glitch_pending = true;
    }

    pub fn recenter(&mut self) {
        self.gaze.recenter();
    }

    pub fn tick(&mut self, dt: f32, inputs: &AvatarInputs) -> FrameState {
        let dt = if dt.is_finite() { dt.clamp(0.0, MAX_FRAME_DT) } else { 0.0 };
        self.time += dt as f64;
        let now = self.time;
        let mood = inputs.mood;

        if mood == MoodState::Listening {
            self.scan_phase = (self.scan_phase + dt * SCAN_SPEED).rem_euclid(1.0);
        }

        if self.was_following && !inputs.follow_cursor {
            self.gaze.recenter();
        }
        self.was_following = inputs.follow_cursor;

        let override_expression = self.update_random_expression(now, inputs.expression_override);

        let gaze_expression =
            compute_expression(mood, override_expression, self.gaze.pointer_near());
        let gaze_inputs = GazeInputs {
            rect: inputs.rect,
            pointer: inputs.pointer,
            follow_cursor: inputs.follow_cursor,
        };
        self.gaze.update(
            now,
            dt,
            &gaze_inputs,
            &GazeParams::for_expression(gaze_expression),
            &mut self.rng,
        );

        let mut glitch = std::mem::take(&mut self.glitch_pending);
        if mood.is_responding() {
            if elapsed_since(self.last_glitch_at, now) > GLITCH_GAP
                && self.rng.gen::<f32>() < GLITCH_CHANCE
            {
                glitch = true;
                self.last_glitch_at = Some(now);
            }
            if elapsed_since(self.last_response_blink_at, now) > RESPONSE_BLINK_GAP
                && self.rng.gen::<f32>() < RESPONSE_BLINK_CHANCE
                && self.blink.is_open()
            {
                self.blink.trigger(now, RESPONSE_BLINK_STRENGTH, &mut self.rng);
                self.last_response_blink_at = Some(now);
            }
        }
        if let Some(strength) = self.pending_blink.take() {
            self.blink.trigger(now, strength, &mut self.rng);
        }

        let pointer_near = self.gaze.pointer_near();
        let expression = compute_expression(mood, override_expression, pointer_near);
        self.blink.update(now, dt, expression, &mut self.rng);

        let hurt = self.hurt;
        let eyes = [self.roll_eye_noise(mood, hurt), self.roll_eye_noise(mood, hurt)];
        let smoothed = self.gaze.smoothed();

        let frame = FrameState {
            time: self.time as f32,
            mood,
            expression,
            blink: self.blink.value(),
            gaze: [sanitize(smoothed[0]), sanitize(smoothed[1])],
            pointer_near,
            scan_phase: self.scan_phase,
            hurt,
            error_flash: if mood == MoodState::Error { 1.0 } else { 0.0 },
            cyan_accents: inputs.cyan_accents,
            glitch,
            eyes,
        };

        self.hurt = if self.hurt > 0.001 { self.hurt * HURT_DECAY } else { 0.0 };
        frame
    }

    /// Paint `frame` into whichever canvases exist.
    pub fn render(
        &self,
        frame: &FrameState,
        left: Option<&mut EyeCanvas>,
        right: Option<&mut EyeCanvas>,
    ) {
        if let Some(canvas) = left {
            draw_eye(canvas, frame, EyeSide::Left);
        }
        if let Some(canvas) = right {
            draw_eye(canvas, frame, EyeSide::Right);
        }
    }

    /// Explicit overrides win and cancel any random pick.
    fn update_random_expression(
        &mut self,
        now: f64,
        explicit: Option<Expression>,
    ) -> Option<Expression> {
        if explicit.is_some() {
            self.random_expression = None;
            return explicit;
        }

        if self.random_expression.is_some_and(|r| now >= r.expires_at) {
            self.random_expression = None;
        }

        if self.random_expression.is_none() && now - self.last_random_pick > RANDOM_EXPRESSION_GAP {
            self.last_random_pick = now;
            if self.rng.gen::<f32>() < RANDOM_EXPRESSION_CHANCE {
                let expression = Expression::pick_weighted(&mut self.rng);
                let hold = 1.8 + self.rng.gen::<f64>() * 3.5;
                tracing::debug!("Random expression {} for {:.1}s", expression.label(), hold);
                self.random_expression = Some(RandomExpression {
                    expression,
                    expires_at: now + hold,
                });
            }
        }

        self.random_expression.map(|r| r.expression)
    }

    fn roll_eye_noise(&mut self, mood: MoodState, hurt: f32) -> EyeNoise {
        let rng = &mut self.rng;
        let mut jitter = [0.0f32; 2];
        let mut nudge = |rng: &mut StdRng, amount: f32| {
            jitter[0] += (rng.gen::<f32>() - 0.5) * amount;
            jitter[1] += (rng.gen::<f32>() - 0.5) * amount;
        };

        match mood {
            MoodState::Speaking => nudge(rng, 0.85),
            MoodState::Thinking => nudge(rng, 0.35),
            _ => {}
        }
        if mood.is_responding() && rng.gen::<f32>() < 0.028 {
            nudge(rng, 2.5);
        }
        if hurt > 0.3 {
            nudge(rng, 2.2);
        }

        EyeNoise {
            jitter,
            flicker_roll: rng.gen(),
            pupil_alpha_roll: rng.gen(),
        }
    }
}

fn elapsed_since(at: Option<f64>, now: f64) -> f64 {
    at.map_or(f64::INFINITY, |at| now - at)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(mood: MoodState) -> AvatarInputs {
        AvatarInputs {
            mood,
            cyan_accents: true,
            ..AvatarInputs::default()
        }
    }

    #[test]
    fn same_seed_gives_same_frames() {
        let mut a = EyesEngine::with_seed(42);
        let mut b = EyesEngine::with_seed(42);
        let mut canvas_a = EyeCanvas::new();
        let mut canvas_b = EyeCanvas::new();

        for i in 0..400 {
            let mood = if i < 200 { MoodState::Speaking } else { MoodState::Listening };
            let fa = a.tick(1.0 / 60.0, &inputs(mood));
            let fb = b.tick(1.0 / 60.0, &inputs(mood));
            assert_eq!(fa, fb);
            a.render(&fa, Some(&mut canvas_a), None);
            b.render(&fb, Some(&mut canvas_b), None);
            assert_eq!(canvas_a, canvas_b);
        }
    }

    #[test]
    fn dt_is_clamped() {
        let mut engine = EyesEngine::with_seed(1);
        engine.tick(5.0, &inputs(MoodState::Idle));
        assert!((engine.time() - MAX_FRAME_DT as f64).abs() < 1e-6);
        engine.tick(f32::NAN, &inputs(MoodState::Idle));
        engine.tick(-1.0, &inputs(MoodState::Idle));
        assert!((engine.time() - MAX_FRAME_DT as f64).abs() < 1e-6);
    }

    #[test]
    fn garbage_pointer_keeps_frame_in_range() {
        let mut engine = EyesEngine::with_seed(3);
        let input = AvatarInputs {
            follow_cursor: true,
            pointer: Some([f32::NAN, f32::NEG_INFINITY]),
            rect: Some(AvatarRect::new([0.0, 0.0], [100.0, 100.0])),
            ..inputs(MoodState::Listening)
        };
        for _ in 0..120 {
            let frame = engine.tick(0.016, &input);
            for value in frame.gaze {
                assert!(value.is_finite() && (-1.0..=1.0).contains(&value));
            }
            assert!((0.0..=1.0).contains(&frame.blink));
            assert!((0.0..1.0).contains(&frame.scan_phase));
        }
    }

    #[test]
    fn hurt_flashes_then_decays() {
        let mut engine = EyesEngine::with_seed(8);
        engine.hurt();
        let first = engine.tick(0.016, &inputs(MoodState::Idle));
        assert!((first.hurt - HURT_PEAK).abs() < 1e-6);
        assert!(first.glitch);

        let second = engine.tick(0.016, &inputs(MoodState::Idle));
        assert!(second.hurt < first.hurt);
        assert!(!second.glitch);

        let mut last = second;
        for _ in 0..200 {
            last = engine.tick(0.016, &inputs(MoodState::Idle));
        }
        assert_eq!(last.hurt, 0.0);
    }

    #[test]
    fn error_mood_sets_flash_and_angry_face() {
        let mut engine = EyesEngine::with_seed(4);
        let frame = engine.tick(0.016, &inputs(MoodState::Error));
        assert_eq!(frame.error_flash, 1.0);
        assert_eq!(frame.expression, Expression::Angry);

        let frame = engine.tick(0.016, &inputs(MoodState::Idle));
        assert_eq!(frame.error_flash, 0.0);
    }

    #[test]
    fn explicit_override_beats_random_pick() {
        let mut engine = EyesEngine::with_seed(5);
        let input = AvatarInputs {
            expression_override: Some(Expression::Sad),
            ..inputs(MoodState::Idle)
        };
        for _ in 0..1000 {
            let frame = engine.tick(MAX_FRAME_DT, &input);
            assert_eq!(frame.expression, Expression::Sad);
        }
        assert_eq!(engine.random_expression(), None);
    }

    #[test]
    fn random_expression_eventually_appears_when_idle() {
        let mut engine = EyesEngine::with_seed(6);
        let mut seen = false;
        // Ten minutes of engine time at the largest step.
        for _ in 0..18_000 {
            engine.tick(MAX_FRAME_DT, &inputs(MoodState::Idle));
            seen |= engine.random_expression().is_some();
        }
        assert!(seen);
    }

    #[test]
    fn trigger_blink_closes_lids() {
        let mut engine = EyesEngine::with_seed(7);
        engine.trigger_blink(1.2);
        let frame = engine.tick(0.0, &inputs(MoodState::Idle));
        assert!(frame.blink > 0.15);
    }

    #[test]
    fn look_at_steers_gaze_toward_point() {
        let mut engine = EyesEngine::with_seed(9);
        let input = AvatarInputs {
            rect: Some(AvatarRect::new([0.0, 0.0], [100.0, 100.0])),
            ..inputs(MoodState::Idle)
        };
        engine.look_at([100.0, 50.0], Duration::from_secs(5));
        let mut frame = engine.tick(0.016, &input);
        for _ in 0..60 {
            frame = engine.tick(0.016, &input);
        }
        assert!(frame.gaze[0] > 0.9);
        assert!(frame.gaze[1].abs() < 0.05);
    }

    #[test]
    fn render_skips_missing_canvases() {
        let mut engine = EyesEngine::with_seed(10);
        let frame = engine.tick(0.016, &inputs(MoodState::Thinking));
        let mut right = EyeCanvas::new();
        engine.render(&frame, None, Some(&mut right));
        assert!(right.painted() > 0);
        engine.render(&frame, None, None);
    }
}
