//! Software rasterizer for one 32x32 eye.
//!
//! Everything here is a pure function of a [`FrameState`]: randomness is
//! rolled by the engine during `tick`, so the same frame always paints the
//! same pixels.

use std::f32::consts::TAU;

use super::engine::FrameState;
use super::expression::{lid_cutoff_at_x, Expression, EyeSide};
use super::mood::MoodState;

pub const EYE_SIZE: usize = 32;
pub const EYE_RADIUS: f32 = 12.0;

pub const DEFAULT_TINT: [f32; 3] = [235.0, 245.0, 255.0];
pub const CYAN_TINT: [f32; 3] = [80.0, 240.0, 255.0];
pub const ERROR_TINT: [f32; 3] = [255.0, 70.0, 70.0];

const PUPIL_COLOR: [f32; 3] = [8.0, 10.0, 16.0];
const PUPIL_ERROR_COLOR: [f32; 3] = [30.0, 6.0, 10.0];
const HIGHLIGHT_COLOR: [f32; 3] = [255.0, 255.0, 255.0];
const MAX_PUPIL_MOVE: f32 = 2.6;
const CONVERGENCE: f32 = 0.22;
const SCAN_BAND: [f32; 7] = [0.06, 0.12, 0.2, 0.22, 0.2, 0.12, 0.06];

/// Straight-alpha RGBA pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EyeCanvas {
    pixels: Vec<u8>,
}

impl Default for EyeCanvas {
    fn default() -> Self {
        Self::new()
    }
}

impl EyeCanvas {
    pub fn new() -> Self {
        Self {
            pixels: vec![0; EYE_SIZE * EYE_SIZE * 4],
        }
    }

    pub fn size(&self) -> [usize; 2] {
        [EYE_SIZE, EYE_SIZE]
    }

    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    pub fn as_rgba(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: usize, y: usize) -> [u8; 4] {
        let i = (y * EYE_SIZE + x) * 4;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }

    /// Number of pixels with any coverage.
    pub fn painted(&self) -> usize {
        self.pixels.chunks_exact(4).filter(|p| p[3] > 0).count()
    }

    /// Composite one pixel source-over. Out-of-bounds writes are ignored.
    pub fn fill_pixel(&mut self, x: i32, y: i32, rgb: [f32; 3], alpha: f32) {
        if x < 0 || y < 0 || x >= EYE_SIZE as i32 || y >= EYE_SIZE as i32 {
            return;
        }
        if !alpha.is_finite() || alpha <= 0.0 {
            return;
        }
        let src_a = alpha.min(1.0);
        let i = (y as usize * EYE_SIZE + x as usize) * 4;
        let dst_a = self.pixels[i + 3] as f32 / 255.0;
        let out_a = src_a + dst_a * (1.0 - src_a);

        for c in 0..3 {
            let src = rgb[c].trunc().clamp(0.0, 255.0);
            let dst = self.pixels[i + c] as f32;
            let blended = (src * src_a + dst * dst_a * (1.0 - src_a)) / out_a;
            self.pixels[i + c] = blended.round().clamp(0.0, 255.0) as u8;
        }
        self.pixels[i + 3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    }
}

/// Mood-driven surface look for one eye.
#[derive(Debug, Clone, Copy)]
struct EyeLook {
    glow: f32,
    flicker: f32,
    shimmer: f32,
    pupil_radius: f32,
    tint: [f32; 3],
}

impl EyeLook {
    fn new(frame: &FrameState, side: EyeSide) -> Self {
        let phase = frame.time;
        let right = side == EyeSide::Right;
        let noise = frame.eyes[side.index()];
        let mut look = Self {
            glow: 0.55,
            flicker: 0.0,
            shimmer: 0.0,
            pupil_radius: 3.1,
            tint: DEFAULT_TINT,
        };

        match frame.mood {
            MoodState::Idle => {
                look.glow = 0.48 + 0.08 * (phase * 1.1).sin();
                look.pupil_radius = 3.0 + 0.12 * (phase * 0.7 + if right { 0.4 } else { 0.0 }).sin();
            }
            MoodState::Listening => {
                look.glow = 0.52 + 0.12 * (phase * 1.7).sin();
                look.flicker = 0.12 + 0.12 * noise.flicker_roll;
                look.pupil_radius = 3.0;
                if frame.cyan_accents {
                    look.tint = CYAN_TINT;
                }
            }
            MoodState::Thinking => {
                look.glow = 0.52 + 0.08 * (phase * 0.6).sin();
                look.shimmer = 0.6 + 0.4 * (phase * 0.9).sin();
                look.pupil_radius = 2.85;
            }
            MoodState::Speaking => {
                look.glow = 0.58 + 0.22 * (phase * 2.6).sin();
                look.pupil_radius =
                    3.2 + 0.2 * (phase * 2.2 + if right { 0.35 } else { 0.0 }).sin();
            }
            MoodState::Error => {
                look.glow = 0.72;
                look.pupil_radius = 3.0;
                look.tint = ERROR_TINT;
            }
            MoodState::Standby => {
                look.glow = 0.38 + 0.05 * (phase * 0.6).sin();
                look.pupil_radius = 2.9;
            }
        }
        look
    }
}

fn mix(color: [f32; 3], toward: [f32; 3], amount: f32) -> [f32; 3] {
    [
        color[0] * (1.0 - amount) + toward[0] * amount,
        color[1] * (1.0 - amount) + toward[1] * amount,
        color[2] * (1.0 - amount) + toward[2] * amount,
    ]
}

/// Lid half-height at column `x`, narrowed as the lid closes.
fn open_cutoff(expression: Expression, x: usize, side: EyeSide, lid_open: f32) -> f32 {
    let center = EYE_SIZE as f32 / 2.0;
    let x_norm = ((x as f32 + 0.5 - center) / EYE_RADIUS).clamp(-1.0, 1.0);
    let cutoff = lid_cutoff_at_x(expression, x_norm, side) * (0.18 + 0.82 * lid_open);
    cutoff.clamp(0.1, 1.2)
}

/// Paint one eye for `frame` into `canvas`, replacing its contents.
pub fn draw_eye(canvas: &mut EyeCanvas, frame: &FrameState, side: EyeSide) {
    canvas.clear();

    let size = EYE_SIZE as f32;
    let (cx, cy) = (size / 2.0, size / 2.0);
    let left = side == EyeSide::Left;
    let phase = frame.time;
    let look = EyeLook::new(frame, side);
    let noise = frame.eyes[side.index()];
    let expression = frame.expression;

    let blink = if frame.blink.is_finite() { frame.blink.clamp(0.0, 1.0) } else { 0.0 };
    let lid_open = 1.0 - blink;
    let err = frame.error_flash.clamp(0.0, 1.0);
    let hurt = frame.hurt.clamp(0.0, 1.0);
    let [jx, jy] = noise.jitter;

    let convergence = if left { CONVERGENCE } else { -CONVERGENCE };
    let pupil_offset_x = frame.gaze[0] * MAX_PUPIL_MOVE + convergence;
    let pupil_offset_y = frame.gaze[1] * MAX_PUPIL_MOVE * (1.0 - 0.75 * blink);
    let micro_x = 0.35 * (phase * 0.8 + if left { 0.0 } else { 0.5 }).sin();
    let micro_y = 0.28 * (phase * 0.65 + if left { 0.2 } else { 0.55 }).sin();
    let px = cx + pupil_offset_x + micro_x + jx;
    let py = cy + pupil_offset_y + micro_y + jy;

    // Socket.
    for y in 0..EYE_SIZE {
        for x in 0..EYE_SIZE {
            let dx = x as f32 + 0.5 - (cx + jx);
            let dy = y as f32 + 0.5 - (cy + jy);
            let d = dx.hypot(dy);
            if d > EYE_RADIUS {
                continue;
            }

            let y_norm = (y as f32 + 0.5 - cy) / EYE_RADIUS;
            if y_norm.abs() > open_cutoff(expression, x, side, lid_open) {
                continue;
            }

            let edge = ((EYE_RADIUS - d) / 3.0).clamp(0.0, 1.0);
            let mut alpha = (0.14 + 0.58 * edge) * look.glow;
            alpha *= 1.0 - look.flicker * 0.4;

            if look.shimmer != 0.0 {
                let sheen = (x + y) as f32 / (size * 2.0);
                alpha *= 0.78 + 0.28 * ((sheen * 6.0 + phase * 0.7) * TAU).sin() * look.shimmer;
            }

            let mut color = look.tint;
            if frame.cyan_accents && frame.mood != MoodState::Error {
                let accent = ((1.0 - x as f32 / (size * 0.9)) * (1.0 - y as f32 / (size * 0.9)))
                    .clamp(0.0, 1.0);
                color = mix(color, CYAN_TINT, 0.1 * accent);
            }
            if err > 0.001 {
                color = mix(color, ERROR_TINT, err);
                alpha = (alpha * (1.0 + err * 0.35)).min(1.0);
            }
            if hurt > 0.001 {
                color = mix(color, ERROR_TINT, hurt);
                alpha = (alpha * (1.0 + hurt * 0.28)).min(1.0);
            }

            canvas.fill_pixel(x as i32, y as i32, color, alpha);
        }
    }

    // Pupil and highlight.
    let pupil_hide = if expression == Expression::Sleepy { 0.7 } else { 0.85 };
    if blink < pupil_hide {
        let mut alpha = match frame.mood {
            MoodState::Speaking => 0.92,
            _ => 0.86,
        };
        if frame.mood == MoodState::Listening {
            alpha *= 0.88 + noise.pupil_alpha_roll * 0.08;
        }
        let color = if frame.mood == MoodState::Error || err > 0.001 {
            PUPIL_ERROR_COLOR
        } else {
            PUPIL_COLOR
        };

        for y in 0..EYE_SIZE {
            for x in 0..EYE_SIZE {
                let y_norm = (y as f32 + 0.5 - cy) / EYE_RADIUS;
                if y_norm.abs() > open_cutoff(expression, x, side, lid_open) {
                    continue;
                }
                let d = (x as f32 + 0.5 - px).hypot(y as f32 + 0.5 - py);
                if d <= look.pupil_radius {
                    canvas.fill_pixel(x as i32, y as i32, color, alpha);
                }
            }
        }

        if blink < 0.75 {
            let hx = (px - 1.6).round() as i32;
            let hy = (py - 1.8).round() as i32;
            let alpha = if frame.mood == MoodState::Thinking { 0.58 } else { 0.46 };
            canvas.fill_pixel(hx, hy, HIGHLIGHT_COLOR, alpha);
            canvas.fill_pixel(hx + 1, hy, HIGHLIGHT_COLOR, alpha);
        }
    }

    draw_eyebrow(canvas, expression, side, look.tint);
    draw_lid_edge(canvas, expression, side, phase, look.tint);

    if frame.mood == MoodState::Listening && blink < 0.9 {
        let scan = frame.scan_phase.rem_euclid(1.0);
        let y_center = scan * (size + 12.0) - 6.0;
        let half = SCAN_BAND.len() as f32 / 2.0;
        for (i, alpha) in SCAN_BAND.iter().enumerate() {
            let row = (y_center + i as f32 - half).floor() as i32;
            if !(0..EYE_SIZE as i32).contains(&row) {
                continue;
            }
            for x in 0..EYE_SIZE as i32 {
                canvas.fill_pixel(x, row, CYAN_TINT, *alpha);
            }
        }
    }
}

fn draw_eyebrow(canvas: &mut EyeCanvas, expression: Expression, side: EyeSide, tint: [f32; 3]) {
    if expression != Expression::Angry {
        return;
    }
    const Y: i32 = 6;
    const LEN: i32 = 10;
    let start_x = if side == EyeSide::Left { 9 } else { 12 };
    for i in 0..LEN {
        let drop = if side == EyeSide::Left { i / 4 } else { (LEN - 1 - i) / 4 };
        canvas.fill_pixel(start_x + i, Y + drop, tint, 0.18);
    }
}

fn draw_lid_edge(
    canvas: &mut EyeCanvas,
    expression: Expression,
    side: EyeSide,
    phase: f32,
    tint: [f32; 3],
) {
    let edge_alpha = match expression {
        Expression::Angry => 0.12,
        Expression::Bored => 0.08,
        Expression::Sleepy => 0.1,
        _ => return,
    };
    let center = EYE_SIZE as f32 / 2.0;
    let pulse = 0.85 + 0.15 * (phase * 1.2).sin();

    for x in 0..EYE_SIZE {
        let x_norm = (x as f32 + 0.5 - center) / EYE_RADIUS;
        let cutoff = lid_cutoff_at_x(expression, x_norm.clamp(-1.0, 1.0), side);
        let y = (center - cutoff * EYE_RADIUS).round();
        let d = (x as f32 + 0.5 - center).hypot(y + 0.5 - center);
        if d <= EYE_RADIUS + 0.5 {
            canvas.fill_pixel(x as i32, y as i32, tint, edge_alpha * pulse);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avatar::engine::EyeNoise;

    fn frame(mood: MoodState, expression: Expression) -> FrameState {
        FrameState {
            time: 1.0,
            mood,
            expression,
            blink: 0.0,
            gaze: [0.0, 0.0],
            pointer_near: 0.0,
            scan_phase: 0.5,
            hurt: 0.0,
            error_flash: if mood == MoodState::Error { 1.0 } else { 0.0 },
            cyan_accents: true,
            glitch: false,
            eyes: [EyeNoise::default(); 2],
        }
    }

    #[test]
    fn fill_pixel_composites_source_over() {
        let mut canvas = EyeCanvas::new();
        canvas.fill_pixel(0, 0, [255.0, 0.0, 0.0], 1.0);
        assert_eq!(canvas.pixel(0, 0), [255, 0, 0, 255]);

        canvas.fill_pixel(0, 0, [0.0, 0.0, 255.0], 0.5);
        let [r, _, b, a] = canvas.pixel(0, 0);
        assert_eq!(a, 255);
        assert!((126..=129).contains(&r) && (126..=129).contains(&b));

        canvas.fill_pixel(-1, 40, [1.0, 1.0, 1.0], 1.0);
        canvas.fill_pixel(3, 3, [1.0, 1.0, 1.0], f32::NAN);
        assert_eq!(canvas.painted(), 1);
    }

    #[test]
    fn open_eye_has_dark_pupil_at_center() {
        let mut canvas = EyeCanvas::new();
        draw_eye(&mut canvas, &frame(MoodState::Idle, Expression::Neutral), EyeSide::Left);

        assert!(canvas.painted() > 200);
        let [r, g, b, a] = canvas.pixel(16, 16);
        assert!(a > 200);
        assert!(r < 120 && g < 120 && b < 140, "pupil too bright: {:?}", [r, g, b]);
        assert_eq!(canvas.pixel(0, 0)[3], 0);
    }

    #[test]
    fn error_mood_tints_red() {
        let mut canvas = EyeCanvas::new();
        draw_eye(&mut canvas, &frame(MoodState::Error, Expression::Angry), EyeSide::Right);
        let [r, g, _, a] = canvas.pixel(16, 22);
        assert!(a > 0);
        assert!(r > g, "expected red tint, got {:?}", canvas.pixel(16, 22));
    }

    #[test]
    fn closed_lids_cover_less_than_open_ones() {
        let mut open = EyeCanvas::new();
        draw_eye(&mut open, &frame(MoodState::Idle, Expression::Neutral), EyeSide::Left);

        let mut shut = EyeCanvas::new();
        let closed = FrameState {
            blink: 1.0,
            ..frame(MoodState::Idle, Expression::Neutral)
        };
        draw_eye(&mut shut, &closed, EyeSide::Left);

        assert!(shut.painted() < open.painted() / 2);
    }

    #[test]
    fn angry_eyebrow_is_drawn() {
        let mut canvas = EyeCanvas::new();
        draw_eye(&mut canvas, &frame(MoodState::Error, Expression::Angry), EyeSide::Left);
        assert!(canvas.pixel(9, 6)[3] > 0);
    }

    #[test]
    fn non_finite_frame_values_do_not_panic() {
        let mut canvas = EyeCanvas::new();
        let broken = FrameState {
            blink: f32::NAN,
            gaze: [f32::NAN, f32::INFINITY],
            hurt: f32::NAN,
            ..frame(MoodState::Speaking, Expression::Curious)
        };
        draw_eye(&mut canvas, &broken, EyeSide::Left);
        assert!(canvas.painted() > 0);
    }
}
