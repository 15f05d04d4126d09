//! Engine configuration.

use serde::Deserialize;

use crate::error::ValidationError;

/// Tunables for a [`crate::VocabCache`].
///
/// Deserializes from any serde format; missing fields take their defaults.
///
/// # Examples
///
/// ```
/// use lexiq::EngineConfig;
///
/// let cfg: EngineConfig = serde_json::from_str(r#"{ "debounce_ms": 100 }"#).unwrap();
/// assert_eq!(cfg.debounce_ms, 100);
/// assert_eq!(cfg.write_cooldown_ms, 1000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum gap between accepted writes, measured from the last accepted write.
    pub write_cooldown_ms: u64,
    /// Quiet period before a `DataChanged` event fires.
    pub debounce_ms: u64,
    /// Per-subscriber event buffer.
    pub event_capacity: usize,
    /// Local-day offset from UTC, in minutes, used for today's counters.
    pub day_offset_minutes: i32,
    /// Spawn the background thread that flushes debounced notifications.
    pub auto_pump: bool,
    /// Pump tick.
    pub pump_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            write_cooldown_ms: 1000,
            debounce_ms: 250,
            event_capacity: 256,
            day_offset_minutes: 0,
            auto_pump: true,
            pump_interval_ms: 25,
        }
    }
}

impl EngineConfig {
    const MAX_DAY_OFFSET_MINUTES: i32 = 14 * 60;

    /// Configuration for deterministic tests: no pump, no cooldown.
    #[must_use]
    pub fn manual() -> Self {
        Self {
            write_cooldown_ms: 0,
            auto_pump: false,
            ..Self::default()
        }
    }

    /// Validates ranges and returns the config unchanged.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` naming the offending field.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.event_capacity == 0 {
            return Err(invalid("event_capacity", "must be at least 1"));
        }
        if self.auto_pump && self.pump_interval_ms == 0 {
            return Err(invalid("pump_interval_ms", "must be at least 1 when auto_pump is set"));
        }
        if self.day_offset_minutes.abs() > Self::MAX_DAY_OFFSET_MINUTES {
            return Err(invalid(
                "day_offset_minutes",
                &format!(
                    "must be within ±{} (got {})",
                    Self::MAX_DAY_OFFSET_MINUTES,
                    self.day_offset_minutes
                ),
            ));
        }
        Ok(self)
    }
}

fn invalid(field: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidConfig {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(EngineConfig::default().validate().is_ok());
        assert!(EngineConfig::manual().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let cfg = EngineConfig {
            event_capacity: 0,
            ..EngineConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, ValidationError::InvalidConfig { ref field, .. } if field == "event_capacity"));
    }

    #[test]
    fn test_rejects_out_of_range_offset() {
        let cfg = EngineConfig {
            day_offset_minutes: -15 * 60,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_zero_pump_interval_allowed_without_pump() {
        let cfg = EngineConfig {
            pump_interval_ms: 0,
            auto_pump: false,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }
}
