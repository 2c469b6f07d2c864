use serde::{Deserialize, Serialize};

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Pomodoro,
    Free,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Pomodoro => "pomodoro",
            SessionMode::Free => "free",
        }
    }
}

impl std::str::FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pomodoro" => Ok(SessionMode::Pomodoro),
            "free" => Ok(SessionMode::Free),
            other => Err(format!("unknown session mode: {other}")),
        }
    }
}

/// Per-session timing configuration. Fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub mode: SessionMode,
    /// Work phase length. Ignored in free mode.
    pub work_minutes: u32,
    /// Break phase length. Ignored in free mode.
    pub break_minutes: u32,
    pub afk_timeout_minutes: u32,
    /// 0 disables microbreak reminders.
    pub microbreak_interval_minutes: u32,
}

impl SessionConfig {
    pub fn pomodoro(work_minutes: u32, break_minutes: u32) -> Self {
        Self {
            mode: SessionMode::Pomodoro,
            work_minutes,
            break_minutes,
            ..Self::default()
        }
    }

    pub fn free() -> Self {
        Self {
            mode: SessionMode::Free,
            ..Self::default()
        }
    }

    pub fn with_afk_timeout(mut self, minutes: u32) -> Self {
        self.afk_timeout_minutes = minutes;
        self
    }

    pub fn with_microbreak_interval(mut self, minutes: u32) -> Self {
        self.microbreak_interval_minutes = minutes;
        self
    }

    /// # Errors
    /// Returns `InvalidConfig` naming the first zero duration the mode needs.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.mode == SessionMode::Pomodoro {
            if self.work_minutes == 0 {
                return Err(SessionError::invalid(
                    "work_minutes",
                    "must be greater than zero",
                ));
            }
            if self.break_minutes == 0 {
                return Err(SessionError::invalid(
                    "break_minutes",
                    "must be greater than zero",
                ));
            }
        }
        if self.afk_timeout_minutes == 0 {
            return Err(SessionError::invalid(
                "afk_timeout_minutes",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn work_ms(&self) -> u64 {
        minutes_to_ms(self.work_minutes)
    }

    pub fn break_ms(&self) -> u64 {
        minutes_to_ms(self.break_minutes)
    }

    pub fn afk_timeout_ms(&self) -> u64 {
        minutes_to_ms(self.afk_timeout_minutes)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: SessionMode::Pomodoro,
            work_minutes: 25,
            break_minutes: 5,
            afk_timeout_minutes: 5,
            microbreak_interval_minutes: 0,
        }
    }
}

fn minutes_to_ms(minutes: u32) -> u64 {
    u64::from(minutes).saturating_mul(60_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pomodoro_requires_positive_phases() {
        let err = SessionConfig::pomodoro(0, 5).validate().unwrap_err();
        assert!(matches!(err, SessionError::InvalidConfig { ref field, .. } if field == "work_minutes"));

        let err = SessionConfig::pomodoro(25, 0).validate().unwrap_err();
        assert!(matches!(err, SessionError::InvalidConfig { ref field, .. } if field == "break_minutes"));
    }

    #[test]
    fn free_mode_ignores_phase_lengths() {
        let cfg = SessionConfig {
            work_minutes: 0,
            break_minutes: 0,
            ..SessionConfig::free()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn afk_timeout_required_in_every_mode() {
        for cfg in [SessionConfig::free(), SessionConfig::default()] {
            let err = cfg.with_afk_timeout(0).validate().unwrap_err();
            assert!(matches!(err, SessionError::InvalidConfig { ref field, .. } if field == "afk_timeout_minutes"));
        }
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("Pomodoro".parse::<SessionMode>(), Ok(SessionMode::Pomodoro));
        assert_eq!("free".parse::<SessionMode>(), Ok(SessionMode::Free));
        assert!("sprint".parse::<SessionMode>().is_err());
    }
}
