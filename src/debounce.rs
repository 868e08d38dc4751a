//! Edge detection with a minimum inter-event interval
//!
//! The joystick streams its button bytes on every poll for as long as a button
//! is held. [`EdgeDebouncer`] turns that level signal into one event per press:
//!
//! 1. Idle clears the remembered button and emits nothing (no release events).
//! 2. Within `window` of the last emission, everything is suppressed.
//! 3. The same button as last time (still held) is suppressed.
//! 4. Anything else is emitted and remembered.
//!
//! Idle is handled first so that press, release, press of one button counts
//! as two edges once the window has passed, while a held button never
//! re-fires.

use std::time::{Duration, Instant};

/// Default minimum spacing between two emitted presses
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);

/// Per-tick input to the debouncer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level<T> {
    Idle,
    Active(T),
}

/// Edge-triggered, rate-limited press detector
#[derive(Debug, Clone)]
pub struct EdgeDebouncer<T> {
    window: Duration,
    last_action: Option<T>,
    last_press: Option<Instant>,
}

impl<T: Copy + PartialEq> EdgeDebouncer<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_action: None,
            last_press: None,
        }
    }

    /// Feed one observation; returns the value on a new press edge
    pub fn feed(&mut self, level: Level<T>, now: Instant) -> Option<T> {
        let action = match level {
            Level::Idle => {
                self.last_action = None;
                return None;
            }
            Level::Active(action) => action,
        };

        if let Some(last) = self.last_press {
            if now.saturating_duration_since(last) < self.window {
                return None;
            }
        }

        if self.last_action == Some(action) {
            return None;
        }

        self.last_action = Some(action);
        self.last_press = Some(now);
        Some(action)
    }

    /// Forget everything (used when the device reconnects)
    pub fn reset(&mut self) {
        self.last_action = None;
        self.last_press = None;
    }

    pub fn last_action(&self) -> Option<T> {
        self.last_action
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl<T: Copy + PartialEq> Default for EdgeDebouncer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_first_press_fires() {
        let mut deb = EdgeDebouncer::default();
        assert_eq!(deb.feed(Level::Active('x'), Instant::now()), Some('x'));
    }

    #[test]
    fn test_held_button_fires_once() {
        let mut deb = EdgeDebouncer::default();
        let t0 = Instant::now();

        let fired: Vec<_> = (0..10)
            .filter_map(|i| deb.feed(Level::Active('x'), t0 + ms(i * 10)))
            .collect();
        assert_eq!(fired, vec!['x']);

        // Still held well past the window
        assert_eq!(deb.feed(Level::Active('x'), t0 + ms(500)), None);
    }

    #[test]
    fn test_release_then_press_fires_again() {
        let mut deb = EdgeDebouncer::default();
        let t0 = Instant::now();

        assert_eq!(deb.feed(Level::Active('x'), t0), Some('x'));
        assert_eq!(deb.feed(Level::Idle, t0 + ms(30)), None);
        assert_eq!(deb.feed(Level::Active('x'), t0 + ms(60)), Some('x'));
    }

    #[test]
    fn test_repress_inside_window_fires_once_window_passes() {
        let mut deb = EdgeDebouncer::default();
        let t0 = Instant::now();

        assert_eq!(deb.feed(Level::Active('x'), t0), Some('x'));
        assert_eq!(deb.feed(Level::Idle, t0 + ms(10)), None);
        assert_eq!(deb.feed(Level::Active('x'), t0 + ms(20)), None);
        // Same press still held after the window closes: counts as the new edge
        assert_eq!(deb.feed(Level::Active('x'), t0 + ms(50)), Some('x'));
    }

    #[test]
    fn test_other_button_inside_window_suppressed() {
        let mut deb = EdgeDebouncer::default();
        let t0 = Instant::now();

        assert_eq!(deb.feed(Level::Active('x'), t0), Some('x'));
        assert_eq!(deb.feed(Level::Active('y'), t0 + ms(40)), None);
        assert_eq!(deb.feed(Level::Active('y'), t0 + ms(55)), Some('y'));
    }

    #[test]
    fn test_idle_clears_last_action() {
        let mut deb = EdgeDebouncer::default();
        let t0 = Instant::now();

        deb.feed(Level::Active(3u8), t0);
        assert_eq!(deb.last_action(), Some(3));
        deb.feed(Level::Idle, t0 + ms(5));
        assert_eq!(deb.last_action(), None);
    }

    #[test]
    fn test_reset_forgets_window() {
        let mut deb = EdgeDebouncer::new(ms(100));
        let t0 = Instant::now();

        deb.feed(Level::Active(1u8), t0);
        deb.reset();
        assert_eq!(deb.feed(Level::Active(1u8), t0 + ms(1)), Some(1));
    }
}
