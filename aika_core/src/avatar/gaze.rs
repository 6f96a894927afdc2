use rand::Rng;

use super::expression::GazeParams;

/// Smoothed gaze follows raw gaze by this fraction per frame.
pub const GAZE_FOLLOW: f32 = 0.1;

/// Non-finite becomes 0, everything else is clamped to `[-1, 1]`.
pub fn sanitize(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Screen-space rectangle of the avatar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AvatarRect {
    pub min: [f32; 2],
    pub max: [f32; 2],
}

impl AvatarRect {
    pub fn new(min: [f32; 2], max: [f32; 2]) -> Self {
        Self { min, max }
    }

    pub fn center(&self) -> [f32; 2] {
        [
            (self.min[0] + self.max[0]) * 0.5,
            (self.min[1] + self.max[1]) * 0.5,
        ]
    }

    pub fn contains(&self, point: [f32; 2]) -> bool {
        point[0] >= self.min[0]
            && point[0] <= self.max[0]
            && point[1] >= self.min[1]
            && point[1] <= self.max[1]
    }

    /// Point relative to the center in half-extents; a zero extent maps to 0.
    pub fn normalize(&self, point: [f32; 2]) -> [f32; 2] {
        let center = self.center();
        let half_w = (self.max[0] - self.min[0]) * 0.5;
        let half_h = (self.max[1] - self.min[1]) * 0.5;
        let dx = if half_w != 0.0 { (point[0] - center[0]) / half_w } else { 0.0 };
        let dy = if half_h != 0.0 { (point[1] - center[1]) / half_h } else { 0.0 };
        [dx, dy]
    }
}

/// Temporary gaze target, e.g. a button that was just pressed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookAt {
    pub point: [f32; 2],
    pub expires_at: f64,
}

/// Where the gaze source comes from this frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GazeInputs {
    pub rect: Option<AvatarRect>,
    pub pointer: Option<[f32; 2]>,
    pub follow_cursor: bool,
}

#[derive(Debug, Clone, Default)]
pub struct GazeController {
    raw: [f32; 2],
    smoothed: [f32; 2],
    target: [f32; 2],
    next_target_at: f64,
    pointer_near: f32,
    look_at: Option<LookAt>,
}

impl GazeController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(&self) -> [f32; 2] {
        self.raw
    }

    pub fn smoothed(&self) -> [f32; 2] {
        self.smoothed
    }

    pub fn pointer_near(&self) -> f32 {
        self.pointer_near
    }

    pub fn set_look_at(&mut self, point: [f32; 2], now: f64, duration_secs: f64) {
        self.look_at = Some(LookAt {
            point,
            expires_at: now + duration_secs.max(0.0),
        });
    }

    pub fn clear_look_at(&mut self) {
        self.look_at = None;
    }

    pub fn look_at_active(&self, now: f64) -> bool {
        self.look_at.is_some_and(|look| now < look.expires_at)
    }

    pub fn recenter(&mut self) {
        self.raw = [0.0, 0.0];
        self.smoothed = [0.0, 0.0];
        self.pointer_near = 0.0;
    }

    /// Advance one frame. Source priority: unexpired look-at, then the
    /// pointer when following the cursor, then the autonomous walk.
    pub fn update(
        &mut self,
        now: f64,
        dt: f32,
        inputs: &GazeInputs,
        params: &GazeParams,
        rng: &mut impl Rng,
    ) {
        if !self.look_at_active(now) {
            self.look_at = None;
        }

        match (self.look_at, inputs.rect) {
            (Some(look), Some(rect)) => {
                self.raw = rect.normalize(look.point);
                self.pointer_near = 0.0;
            }
            _ if inputs.follow_cursor => self.follow_pointer(inputs),
            _ => self.walk(now, dt, params, rng),
        }

        self.raw = [sanitize(self.raw[0]), sanitize(self.raw[1])];
        self.pointer_near = if self.pointer_near.is_finite() {
            self.pointer_near.clamp(0.0, 1.0)
        } else {
            0.0
        };

        for axis in 0..2 {
            let next = self.smoothed[axis] + (self.raw[axis] - self.smoothed[axis]) * GAZE_FOLLOW;
            self.smoothed[axis] = sanitize(next);
        }
    }

    fn follow_pointer(&mut self, inputs: &GazeInputs) {
        let (Some(pointer), Some(rect)) = (inputs.pointer, inputs.rect) else {
            self.raw = [0.0, 0.0];
            self.pointer_near = 0.0;
            return;
        };

        let [dx, dy] = rect.normalize(pointer);
        self.raw = [dx, dy];
        self.pointer_near = if rect.contains(pointer) {
            1.25 - dx.hypot(dy)
        } else {
            0.0
        };
    }

    fn walk(&mut self, now: f64, dt: f32, params: &GazeParams, rng: &mut impl Rng) {
        if now >= self.next_target_at {
            let glance = params.glance_chance > 0.0 && rng.gen::<f32>() < params.glance_chance;
            let range = if glance { params.range * 0.4 } else { params.range };

            if !glance && rng.gen::<f32>() < params.center_chance {
                self.target = [0.0, 0.0];
            } else {
                self.target = [
                    sanitize((rng.gen::<f32>() * 2.0 - 1.0) * range),
                    sanitize((rng.gen::<f32>() * 2.0 - 1.0) * range + params.y_bias),
                ];
            }

            let (min, max) = if glance {
                (0.2, 0.6)
            } else {
                (params.interval_min, params.interval_max)
            };
            let interval = min + rng.gen::<f32>() * (max - min);
            self.next_target_at = now + interval as f64;
        }

        let speed = 1.0 + (rng.gen::<f32>() - 0.5) * params.speed_vary;
        let step = (params.move_speed * speed * dt).min(1.0);
        for axis in 0..2 {
            self.raw[axis] += (self.target[axis] - self.raw[axis]) * step;
            self.raw[axis] += (rng.gen::<f32>() - 0.5) * params.idle_drift;
        }
        self.pointer_near = 0.0;
    }
}
