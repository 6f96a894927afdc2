use std::time::{Duration, Instant};

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use super::expression::Expression;
use crate::config::AikaConfig;

/// Clicks further apart than this start a new count.
pub const CLICK_WINDOW: Duration = Duration::from_secs(2);
pub const RAGE_CLICKS: u32 = 5;
pub const DEFAULT_WAKE_WORD: &str = "aika";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoodState {
    #[default]
    Idle,
    Listening,
    Thinking,
    Speaking,
    Error,
    Standby,
}

impl MoodState {
    pub fn label(self) -> &'static str {
        match self {
            MoodState::Idle => "idle",
            MoodState::Listening => "listening",
            MoodState::Thinking => "thinking",
            MoodState::Speaking => "speaking",
            MoodState::Error => "error",
            MoodState::Standby => "standby",
        }
    }

    pub fn is_responding(self) -> bool {
        matches!(self, MoodState::Thinking | MoodState::Speaking)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VoiceState {
    pub enabled: bool,
    pub wake_word_mode: bool,
    pub wake_word_heard: bool,
}

impl VoiceState {
    pub fn from_config(config: &AikaConfig) -> Self {
        Self {
            enabled: config.voice,
            wake_word_mode: config.wake_word_mode,
            wake_word_heard: false,
        }
    }

    /// Turning voice off forgets the wake word.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.wake_word_heard = false;
        }
    }

    /// Feed recognized text; returns `true` when it woke the assistant.
    pub fn hear(&mut self, matcher: &WakeWordMatcher, text: &str) -> bool {
        if !self.enabled || !self.wake_word_mode || self.wake_word_heard {
            return false;
        }
        if matcher.matches(text) {
            tracing::info!("Wake word heard");
            self.wake_word_heard = true;
            return true;
        }
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MoodInputs {
    pub is_loading: bool,
    pub is_streaming: bool,
    pub voice_enabled: bool,
    pub wake_word_mode: bool,
    pub wake_word_heard: bool,
}

/// Priority: thinking, speaking, listening, standby, idle.
pub fn derive_mood(inputs: &MoodInputs) -> MoodState {
    if inputs.is_loading {
        MoodState::Thinking
    } else if inputs.is_streaming {
        MoodState::Speaking
    } else if inputs.voice_enabled && (!inputs.wake_word_mode || inputs.wake_word_heard) {
        MoodState::Listening
    } else if inputs.voice_enabled && inputs.wake_word_mode {
        MoodState::Standby
    } else {
        MoodState::Idle
    }
}

/// Case-insensitive whole-word match of the wake word.
#[derive(Debug, Clone)]
pub struct WakeWordMatcher {
    word: String,
    pattern: Option<Regex>,
}

impl WakeWordMatcher {
    pub fn new(word: &str) -> Self {
        let word = match word.trim() {
            "" => DEFAULT_WAKE_WORD.to_string(),
            other => other.to_lowercase(),
        };
        let pattern = match Regex::new(&format!(r"(?i)\b{}\b", regex_lite::escape(&word))) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!("Wake word pattern for {:?} failed ({}); using word split", word, e);
                None
            }
        };
        Self { word, pattern }
    }

    pub fn word(&self) -> &str {
        &self.word
    }

    pub fn matches(&self, text: &str) -> bool {
        match &self.pattern {
            Some(re) => re.is_match(text),
            None => text
                .split(|c: char| !c.is_alphanumeric())
                .any(|token| token.eq_ignore_ascii_case(&self.word)),
        }
    }
}

impl Default for WakeWordMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_WAKE_WORD)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickReaction {
    Hurt,
    /// Fifth rapid click: error mood and an angry override until the revert.
    Rage,
}

#[derive(Debug, Clone, Copy)]
pub struct MoodSettings {
    pub error_revert: Duration,
    pub click_rage: bool,
}

impl Default for MoodSettings {
    fn default() -> Self {
        Self {
            error_revert: Duration::from_millis(2500),
            click_rage: true,
        }
    }
}

impl MoodSettings {
    pub fn from_config(config: &AikaConfig) -> Self {
        Self {
            error_revert: config.error_revert(),
            click_rage: config.avatar_click_rage,
        }
    }
}

/// Owns the avatar's mood and expression override for the app's lifetime.
///
/// Timers are deadlines checked in [`MoodController::update`]; nothing runs in
/// the background, so [`MoodController::teardown`] only has to forget them.
#[derive(Debug)]
pub struct MoodController {
    mood: MoodState,
    expression_override: Option<Expression>,
    override_until: Option<Instant>,
    error_until: Option<Instant>,
    clicks: u32,
    last_click_at: Option<Instant>,
    settings: MoodSettings,
}

impl MoodController {
    pub fn new(settings: MoodSettings) -> Self {
        Self {
            mood: MoodState::Idle,
            expression_override: None,
            override_until: None,
            error_until: None,
            clicks: 0,
            last_click_at: None,
            settings,
        }
    }

    pub fn mood(&self) -> MoodState {
        self.mood
    }

    pub fn expression_override(&self) -> Option<Expression> {
        self.expression_override
    }

    pub fn set_settings(&mut self, settings: MoodSettings) {
        self.settings = settings;
    }

    /// Expire timers, then follow the app state unless an error is showing.
    pub fn update(&mut self, now: Instant, inputs: &MoodInputs) -> MoodState {
        if self.override_until.is_some_and(|until| now >= until) {
            self.clear_override();
        }
        if self.error_until.is_some_and(|until| now >= until) {
            self.error_until = None;
            self.mood = MoodState::Idle;
        }

        if self.error_until.is_none() {
            self.mood = derive_mood(inputs);
        }
        self.mood
    }

    pub fn set_mood(&mut self, mood: MoodState) {
        self.mood = mood;
    }

    pub fn flash_error(&mut self, now: Instant) {
        tracing::debug!("Avatar error flash");
        self.mood = MoodState::Error;
        self.error_until = Some(now + self.settings.error_revert);
    }

    pub fn is_error_active(&self) -> bool {
        self.error_until.is_some()
    }

    /// Hold `expression` for `duration`, or until cleared when `None`.
    pub fn set_override(&mut self, expression: Expression, now: Instant, duration: Option<Duration>) {
        self.expression_override = Some(expression);
        self.override_until = duration.map(|d| now + d);
    }

    pub fn clear_override(&mut self) {
        self.expression_override = None;
        self.override_until = None;
    }

    pub fn register_avatar_click(&mut self, now: Instant) -> ClickReaction {
        let expired = self
            .last_click_at
            .map_or(true, |last| now.saturating_duration_since(last) > CLICK_WINDOW);
        if expired {
            self.clicks = 0;
        }
        self.last_click_at = Some(now);
        self.clicks += 1;

        if self.settings.click_rage && self.clicks >= RAGE_CLICKS {
            self.clicks = 0;
            self.flash_error(now);
            self.set_override(Expression::Angry, now, Some(self.settings.error_revert));
            tracing::info!("Avatar clicked {} times; raging", RAGE_CLICKS);
            return ClickReaction::Rage;
        }
        ClickReaction::Hurt
    }

    pub fn teardown(&mut self) {
        self.expression_override = None;
        self.override_until = None;
        self.error_until = None;
        self.clicks = 0;
        self.last_click_at = None;
        self.mood = MoodState::Idle;
    }
}

impl Default for MoodController {
    fn default() -> Self {
        Self::new(MoodSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(is_loading: bool, is_streaming: bool) -> MoodInputs {
        MoodInputs {
            is_loading,
            is_streaming,
            ..MoodInputs::default()
        }
    }

    #[test]
    fn derive_mood_priority() {
        assert_eq!(derive_mood(&inputs(false, false)), MoodState::Idle);
        assert_eq!(derive_mood(&inputs(true, true)), MoodState::Thinking);
        assert_eq!(derive_mood(&inputs(false, true)), MoodState::Speaking);

        let voice = MoodInputs {
            voice_enabled: true,
            ..MoodInputs::default()
        };
        assert_eq!(derive_mood(&voice), MoodState::Listening);

        let waiting = MoodInputs {
            wake_word_mode: true,
            ..voice
        };
        assert_eq!(derive_mood(&waiting), MoodState::Standby);

        let woken = MoodInputs {
            wake_word_heard: true,
            ..waiting
        };
        assert_eq!(derive_mood(&woken), MoodState::Listening);
    }

    #[test]
    fn loading_then_streaming_has_no_idle_flash() {
        let mut controller = MoodController::default();
        let now = Instant::now();
        assert_eq!(controller.update(now, &inputs(false, false)), MoodState::Idle);
        assert_eq!(controller.update(now, &inputs(true, false)), MoodState::Thinking);
        assert_eq!(controller.update(now, &inputs(false, true)), MoodState::Speaking);
    }

    #[test]
    fn error_flash_holds_then_reverts() {
        let mut controller = MoodController::default();
        let start = Instant::now();
        controller.flash_error(start);

        assert_eq!(
            controller.update(start + Duration::from_millis(1000), &inputs(true, false)),
            MoodState::Error
        );
        assert_eq!(
            controller.update(start + Duration::from_millis(2600), &inputs(true, false)),
            MoodState::Thinking
        );
    }

    #[test]
    fn override_clears_itself() {
        let mut controller = MoodController::default();
        let start = Instant::now();
        controller.set_override(Expression::Happy, start, Some(Duration::from_secs(1)));
        controller.update(start + Duration::from_millis(500), &MoodInputs::default());
        assert_eq!(controller.expression_override(), Some(Expression::Happy));
        controller.update(start + Duration::from_secs(2), &MoodInputs::default());
        assert_eq!(controller.expression_override(), None);
    }

    #[test]
    fn five_rapid_clicks_rage() {
        let mut controller = MoodController::default();
        let start = Instant::now();
        for i in 0..4 {
            let at = start + Duration::from_millis(300 * i);
            assert_eq!(controller.register_avatar_click(at), ClickReaction::Hurt);
        }
        let fifth = start + Duration::from_millis(1200);
        assert_eq!(controller.register_avatar_click(fifth), ClickReaction::Rage);
        assert_eq!(controller.mood(), MoodState::Error);
        assert_eq!(controller.expression_override(), Some(Expression::Angry));

        let later = fifth + Duration::from_millis(2600);
        assert_eq!(controller.update(later, &MoodInputs::default()), MoodState::Idle);
        assert_eq!(controller.expression_override(), None);
    }

    #[test]
    fn slow_clicks_reset_the_counter() {
        let mut controller = MoodController::default();
        let start = Instant::now();
        for i in 0..10 {
            let at = start + Duration::from_millis(2100 * i);
            assert_eq!(controller.register_avatar_click(at), ClickReaction::Hurt);
        }
    }

    #[test]
    fn rage_can_be_disabled() {
        let mut controller = MoodController::new(MoodSettings {
            click_rage: false,
            ..MoodSettings::default()
        });
        let start = Instant::now();
        for i in 0..8 {
            let at = start + Duration::from_millis(100 * i);
            assert_eq!(controller.register_avatar_click(at), ClickReaction::Hurt);
        }
        assert_eq!(controller.mood(), MoodState::Idle);
    }

    #[test]
    fn teardown_forgets_pending_timers() {
        let mut controller = MoodController::default();
        let start = Instant::now();
        controller.flash_error(start);
        controller.set_override(Expression::Sad, start, None);
        controller.teardown();
        assert!(!controller.is_error_active());
        assert_eq!(controller.expression_override(), None);
        assert_eq!(controller.update(start, &inputs(false, true)), MoodState::Speaking);
    }

    #[test]
    fn wake_word_matches_whole_word_only() {
        let matcher = WakeWordMatcher::default();
        assert!(matcher.matches("hey Aika, what's up"));
        assert!(matcher.matches("AIKA"));
        assert!(!matcher.matches("haikai"));

        let custom = WakeWordMatcher::new("Nova");
        assert_eq!(custom.word(), "nova");
        assert!(custom.matches("ok nova"));
        assert!(!custom.matches("ok aika"));
    }

    #[test]
    fn voice_off_resets_wake_word() {
        let matcher = WakeWordMatcher::default();
        let mut voice = VoiceState {
            enabled: true,
            wake_word_mode: true,
            wake_word_heard: false,
        };
        assert!(!voice.hear(&matcher, "hello there"));
        assert!(voice.hear(&matcher, "aika are you there"));
        assert!(voice.wake_word_heard);

        voice.set_enabled(false);
        assert!(!voice.wake_word_heard);
    }
}
