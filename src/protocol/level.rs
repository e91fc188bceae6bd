//! Fader level conversions
//!
//! The console carries fader positions as a 7-bit value spanning
//! -54 dB (0) to +10 dB (127). The mapping is linear in dB and lossy:
//! 64 dB over 128 steps is roughly 0.5 dB per step.

/// Bottom of the fader range in dB
pub const MIN_DB: f64 = -54.0;

/// Top of the fader range in dB
pub const MAX_DB: f64 = 10.0;

/// Width of the fader range in dB
const SPAN_DB: f64 = MAX_DB - MIN_DB;

/// Highest 7-bit level
pub const MAX_LEVEL: u8 = 127;

/// dB covered by one level step
pub const STEP_DB: f64 = SPAN_DB / MAX_LEVEL as f64;

/// Clamp a dB value into the fader range
pub fn clamp_db(db: f64) -> f64 {
    db.clamp(MIN_DB, MAX_DB)
}

/// Convert dB to a 7-bit level: `round((db + 54) * 127 / 64)`, clamped
pub fn db_to_level(db: f64) -> u8 {
    let level = (((db - MIN_DB) * MAX_LEVEL as f64) / SPAN_DB).round();
    level.clamp(0.0, MAX_LEVEL as f64) as u8
}

/// Convert a 7-bit level to dB: `level * 64 / 127 - 54`
pub fn level_to_db(level: u8) -> f64 {
    (level as f64 * SPAN_DB) / MAX_LEVEL as f64 + MIN_DB
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_boundaries_are_exact() {
        assert_eq!(db_to_level(-54.0), 0);
        assert_eq!(db_to_level(10.0), 127);
        assert_eq!(level_to_db(0), -54.0);
        assert_eq!(level_to_db(127), 10.0);
    }

    #[test]
    fn test_out_of_range_clamps() {
        assert_eq!(db_to_level(-90.0), 0);
        assert_eq!(db_to_level(25.0), 127);
        assert_eq!(clamp_db(-100.0), MIN_DB);
        assert_eq!(clamp_db(12.5), MAX_DB);
        assert_eq!(clamp_db(-6.0), -6.0);
    }

    #[test]
    fn test_unity_gain() {
        // 54 * 127 / 64 = 107.16
        assert_eq!(db_to_level(0.0), 107);
        assert!((level_to_db(107) - (-0.0787)).abs() < 0.001);
    }

    proptest! {
        #[test]
        fn prop_quantization_within_one_step(db in -54.0f64..=10.0) {
            let back = level_to_db(db_to_level(db));
            prop_assert!((back - db).abs() <= STEP_DB);
        }

        #[test]
        fn prop_level_round_trips(level in 0u8..=127) {
            prop_assert_eq!(db_to_level(level_to_db(level)), level);
        }
    }
}
