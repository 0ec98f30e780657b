//! Keystroke cadence synthesis
//!
//! Turns text into a keystroke schedule with humanlike rhythm:
//! - per-character delay from a words-per-minute rate (5 characters per word),
//!   jittered by ±30%
//! - 100-300 ms pauses between words, with a 5% chance of a 1-3 s thinking pause
//! - occasional wrong characters that are noticed, deleted and retyped
//!
//! The output is consumed by a keystroke-injection surface; nothing here
//! performs I/O.

use crate::error::GovernError;
use crate::motion::check_probability;
use crate::timing::{symmetric, uniform_millis};
use crate::types::{KeyAction, Keystroke, TypingPlan};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const CHARS_PER_WORD: f64 = 5.0;
const KEY_JITTER: f64 = 0.3;

const WORD_PAUSE_MS: (u64, u64) = (100, 300);
const THINK_PAUSE_PROBABILITY: f64 = 0.05;
const THINK_PAUSE_MS: (u64, u64) = (1000, 3000);

/// How long a wrong character sits before the typist notices it
const TYPO_HOLD: Duration = Duration::from_millis(300);
const TYPO_NOTICE: Duration = Duration::from_millis(200);
/// Settle time after the corrective backspace
const DELETE_SETTLE: Duration = Duration::from_millis(100);

/// Typo rate used by [`KeystrokeSynthesizer::plan_with_corrections`]
const CORRECTION_MODE_TYPO_PROBABILITY: f64 = 0.05;
const CORRECTION_NOTICE_MS: (u64, u64) = (200, 500);

/// Typing tuning, the `typing` section of the configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypingConfig {
    /// Words-per-minute bounds used when no explicit rate is requested
    pub wpm_range: [u32; 2],
    /// Chance of a wrong character at each position
    pub typo_probability: f64,
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            wpm_range: [40, 80],
            typo_probability: 0.02,
        }
    }
}

impl TypingConfig {
    pub fn validate(&self) -> Result<(), GovernError> {
        let [min, max] = self.wpm_range;
        if min == 0 || min > max {
            return Err(GovernError::InvalidRange {
                name: "typing.wpm_range".to_string(),
                min: min as f64,
                max: max as f64,
            });
        }
        check_probability("typing.typo_probability", self.typo_probability)
    }
}

/// Keystroke schedule planner
pub struct KeystrokeSynthesizer<R: Rng = StdRng> {
    config: TypingConfig,
    rng: R,
}

impl KeystrokeSynthesizer<StdRng> {
    pub fn seeded(config: TypingConfig, seed: u64) -> Result<Self, GovernError> {
        Self::new(config, StdRng::seed_from_u64(seed))
    }

    pub fn from_os_rng(config: TypingConfig) -> Result<Self, GovernError> {
        Self::new(config, StdRng::from_os_rng())
    }
}

impl<R: Rng> KeystrokeSynthesizer<R> {
    pub fn new(config: TypingConfig, rng: R) -> Result<Self, GovernError> {
        config.validate()?;
        Ok(Self { config, rng })
    }

    /// Plan typing at a rate drawn uniformly from the configured WPM range
    pub fn plan_typing(&mut self, text: &str) -> TypingPlan {
        let wpm = self.random_wpm();
        self.plan_typing_at(text, wpm)
    }

    /// Plan typing at a fixed words-per-minute rate (0 means "pick one")
    pub fn plan_typing_at(&mut self, text: &str, wpm: u32) -> TypingPlan {
        let wpm = if wpm == 0 { self.random_wpm() } else { wpm };
        let base_ms = base_delay_ms(wpm);

        let words: Vec<&str> = text.split(' ').collect();
        let last_word = words.len().saturating_sub(1);
        let mut keystrokes = Vec::with_capacity(text.len() + words.len());

        for (word_idx, word) in words.iter().enumerate() {
            let char_count = word.chars().count();

            for (char_idx, ch) in word.chars().enumerate() {
                let is_final_char = word_idx == last_word && char_idx + 1 == char_count;

                if !is_final_char && self.rng.random_bool(self.config.typo_probability) {
                    let wrong = self.random_wrong_char(ch);
                    keystrokes.push(correction(KeyAction::Emit(wrong), TYPO_HOLD + TYPO_NOTICE));
                    keystrokes.push(correction(KeyAction::DeleteBackward, DELETE_SETTLE));
                }

                let delay = self.key_delay(base_ms);
                keystrokes.push(emit(ch, delay));
            }

            if word_idx < last_word {
                let mut pause = uniform_millis(&mut self.rng, WORD_PAUSE_MS.0, WORD_PAUSE_MS.1);
                if self.rng.random_bool(THINK_PAUSE_PROBABILITY) {
                    pause += uniform_millis(&mut self.rng, THINK_PAUSE_MS.0, THINK_PAUSE_MS.1);
                }
                keystrokes.push(emit(' ', pause));
            }
        }

        TypingPlan { wpm, keystrokes }
    }

    /// Plan typing with a heavier typo rate and keyboard-adjacent mistakes
    ///
    /// Used for longer free text where visible self-correction is expected.
    /// There are no word pauses; every character except the last may be
    /// preceded by a neighbouring wrong key.
    pub fn plan_with_corrections(&mut self, text: &str) -> TypingPlan {
        let wpm = self.random_wpm();
        let base_ms = base_delay_ms(wpm);
        let total = text.chars().count();
        let mut keystrokes = Vec::with_capacity(total * 2);

        for (i, ch) in text.chars().enumerate() {
            if i + 1 < total && self.rng.random_bool(CORRECTION_MODE_TYPO_PROBABILITY) {
                let wrong = self.adjacent_wrong_char(ch);
                let notice =
                    uniform_millis(&mut self.rng, CORRECTION_NOTICE_MS.0, CORRECTION_NOTICE_MS.1);
                let hold = Duration::from_secs_f64(base_ms / 1000.0) + notice;
                keystrokes.push(correction(KeyAction::Emit(wrong), hold));
                keystrokes.push(correction(KeyAction::DeleteBackward, DELETE_SETTLE));
            }

            let delay = self.key_delay(base_ms);
            keystrokes.push(emit(ch, delay));
        }

        TypingPlan { wpm, keystrokes }
    }

    fn random_wpm(&mut self) -> u32 {
        let [min, max] = self.config.wpm_range;
        self.rng.random_range(min..=max)
    }

    /// Base delay ±30%
    fn key_delay(&mut self, base_ms: f64) -> Duration {
        let ms = base_ms + symmetric(&mut self.rng, base_ms * KEY_JITTER);
        Duration::from_secs_f64(ms.max(0.0) / 1000.0)
    }

    /// Random letter different from the intended one, matching its case
    fn random_wrong_char(&mut self, intended: char) -> char {
        let lower = intended.to_ascii_lowercase();
        let mut wrong = lower;
        while wrong == lower {
            wrong = (b'a' + self.rng.random_range(0..26u8)) as char;
        }
        match_case(wrong, intended)
    }

    /// QWERTY neighbour of the intended key, or any other letter
    fn adjacent_wrong_char(&mut self, intended: char) -> char {
        let neighbours = qwerty_neighbours(intended.to_ascii_lowercase());
        if neighbours.is_empty() {
            return self.random_wrong_char(intended);
        }
        let pick = neighbours[self.rng.random_range(0..neighbours.len())];
        match_case(pick, intended)
    }
}

/// Milliseconds per character at `wpm`
fn base_delay_ms(wpm: u32) -> f64 {
    let chars_per_second = wpm as f64 * CHARS_PER_WORD / 60.0;
    1000.0 / chars_per_second
}

fn emit(ch: char, delay: Duration) -> Keystroke {
    Keystroke {
        action: KeyAction::Emit(ch),
        delay,
        correction: false,
    }
}

fn correction(action: KeyAction, delay: Duration) -> Keystroke {
    Keystroke {
        action,
        delay,
        correction: true,
    }
}

fn match_case(c: char, like: char) -> char {
    if like.is_ascii_uppercase() {
        c.to_ascii_uppercase()
    } else {
        c
    }
}

/// Keys physically adjacent on a US QWERTY layout
fn qwerty_neighbours(c: char) -> &'static [char] {
    match c {
        'q' => &['w', 'a', 's'],
        'w' => &['q', 'e', 'a', 's', 'd'],
        'e' => &['w', 'r', 's', 'd', 'f'],
        'r' => &['e', 't', 'd', 'f', 'g'],
        't' => &['r', 'y', 'f', 'g', 'h'],
        'y' => &['t', 'u', 'g', 'h', 'j'],
        'u' => &['y', 'i', 'h', 'j', 'k'],
        'i' => &['u', 'o', 'j', 'k', 'l'],
        'o' => &['i', 'p', 'k', 'l'],
        'p' => &['o', 'l'],
        'a' => &['q', 'w', 's', 'z'],
        's' => &['a', 'w', 'e', 'd', 'x', 'z'],
        'd' => &['s', 'e', 'r', 'f', 'c', 'x'],
        'f' => &['d', 'r', 't', 'g', 'v', 'c'],
        'g' => &['f', 't', 'y', 'h', 'b', 'v'],
        'h' => &['g', 'y', 'u', 'j', 'n', 'b'],
        'j' => &['h', 'u', 'i', 'k', 'm', 'n'],
        'k' => &['j', 'i', 'o', 'l', 'm'],
        'l' => &['k', 'o', 'p'],
        'z' => &['a', 's', 'x'],
        'x' => &['z', 's', 'd', 'c'],
        'c' => &['x', 'd', 'f', 'v'],
        'v' => &['c', 'f', 'g', 'b'],
        'b' => &['v', 'g', 'h', 'n'],
        'n' => &['b', 'h', 'j', 'm'],
        'm' => &['n', 'j', 'k'],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn synth(seed: u64) -> KeystrokeSynthesizer {
        KeystrokeSynthesizer::seeded(TypingConfig::default(), seed).unwrap()
    }

    #[test]
    fn test_plan_reproduces_text() {
        let mut s = synth(1);
        let texts = [
            "Hi Jane, great to connect!",
            "a",
            "",
            "double  space and trailing ",
            "ünïcödé words too",
        ];
        for text in texts {
            let plan = s.plan_typing(text);
            assert_eq!(plan.resulting_text(), text);
        }
    }

    #[test]
    fn test_wpm_within_range() {
        let mut s = synth(2);
        for _ in 0..200 {
            let plan = s.plan_typing("hello");
            assert!((40..=80).contains(&plan.wpm));
        }
    }

    #[test]
    fn test_key_delay_respects_jitter_bounds() {
        let config = TypingConfig {
            typo_probability: 0.0,
            ..TypingConfig::default()
        };
        let mut s = KeystrokeSynthesizer::seeded(config, 3).unwrap();
        // 60 wpm = 5 chars/s = 200 ms base, ±30%
        let plan = s.plan_typing_at("abcdefghijklmnopqrstuvwxyz", 60);
        assert_eq!(plan.wpm, 60);
        for key in &plan.keystrokes {
            let ms = key.delay.as_secs_f64() * 1000.0;
            assert!((140.0..=260.0).contains(&ms), "delay {} ms", ms);
        }
    }

    #[test]
    fn test_word_pauses() {
        let config = TypingConfig {
            typo_probability: 0.0,
            ..TypingConfig::default()
        };
        let mut s = KeystrokeSynthesizer::seeded(config, 4).unwrap();
        let mut saw_think_pause = false;
        for _ in 0..200 {
            let plan = s.plan_typing_at("one two", 60);
            let space = plan
                .keystrokes
                .iter()
                .find(|k| k.action == KeyAction::Emit(' '))
                .unwrap();
            let ms = space.delay.as_millis();
            assert!(ms >= 100 && ms < 3300, "space pause {}", ms);
            if ms >= 1100 {
                saw_think_pause = true;
            }
        }
        assert!(saw_think_pause);
    }

    #[test]
    fn test_think_pause_rate() {
        let config = TypingConfig {
            typo_probability: 0.0,
            ..TypingConfig::default()
        };
        let mut s = KeystrokeSynthesizer::seeded(config, 9).unwrap();
        let text = vec!["w"; 2_001].join(" ");
        let (mut spaces, mut thinking) = (0, 0);
        for _ in 0..5 {
            let plan = s.plan_typing_at(&text, 60);
            for key in plan.keystrokes.iter().filter(|k| k.action == KeyAction::Emit(' ')) {
                spaces += 1;
                // plain word pauses stay under 300 ms
                if key.delay >= Duration::from_millis(1_000) {
                    thinking += 1;
                }
            }
        }
        assert_eq!(spaces, 10_000);
        let rate = thinking as f64 / spaces as f64;
        assert!((0.04..0.06).contains(&rate), "think pause rate {}", rate);
    }

    #[test]
    fn test_correction_mode_typo_rate() {
        let mut s = synth(10);
        let text = "a".repeat(20_001);
        let plan = s.plan_with_corrections(&text);
        let rate = plan.typo_count() as f64 / 20_000.0;
        assert!((0.04..0.06).contains(&rate), "correction typo rate {}", rate);
    }

    #[test]
    fn test_typo_sequence_shape() {
        let config = TypingConfig {
            typo_probability: 1.0,
            ..TypingConfig::default()
        };
        let mut s = KeystrokeSynthesizer::seeded(config, 5).unwrap();
        let plan = s.plan_typing_at("ab", 60);

        // 'a' gets a typo, final 'b' never does
        assert_eq!(plan.keystrokes.len(), 4);
        let wrong = plan.keystrokes[0];
        assert!(wrong.correction);
        assert_ne!(wrong.action, KeyAction::Emit('a'));
        assert_eq!(wrong.delay, Duration::from_millis(500));
        assert_eq!(plan.keystrokes[1].action, KeyAction::DeleteBackward);
        assert_eq!(plan.keystrokes[2].action, KeyAction::Emit('a'));
        assert_eq!(plan.keystrokes[3].action, KeyAction::Emit('b'));
        assert_eq!(plan.typo_count(), 1);
        assert_eq!(plan.resulting_text(), "ab");
    }

    #[test]
    fn test_typo_rate_near_configured() {
        let mut s = synth(6);
        let text = "the quick brown fox jumps over the lazy dog ".repeat(50);
        let plan = s.plan_typing(&text);
        let letters = text.chars().filter(|c| *c != ' ').count();
        let rate = plan.typo_count() as f64 / letters as f64;
        assert!((0.008..0.035).contains(&rate), "typo rate {}", rate);
    }

    #[test]
    fn test_correction_mode_uses_neighbours() {
        let mut s = synth(7);
        let text = "sssssssssssssssssssssssssssssssssssssssssssssssssssssssssss".repeat(4);
        let plan = s.plan_with_corrections(&text);
        assert_eq!(plan.resulting_text(), text);
        assert!(plan.typo_count() > 0);
        for key in plan.keystrokes.iter().filter(|k| k.correction) {
            if let KeyAction::Emit(c) = key.action {
                assert!(qwerty_neighbours('s').contains(&c));
            }
        }
    }

    #[test]
    fn test_wrong_char_keeps_case() {
        let mut s = synth(8);
        for _ in 0..50 {
            let c = s.random_wrong_char('Q');
            assert!(c.is_ascii_uppercase());
            assert_ne!(c, 'Q');
        }
    }

    #[test]
    fn test_rejects_zero_wpm_range() {
        let config = TypingConfig {
            wpm_range: [0, 10],
            ..TypingConfig::default()
        };
        assert!(KeystrokeSynthesizer::seeded(config, 0).is_err());
    }
}
