// Trigger-differential velocity mapping.
// Right trigger drives forward, left trigger drives reverse; each trigger is
// dead-zone gated on its own before the two are combined.

use crate::input::TriggerPair;

/// Gate one trigger reading: anything at or below the dead-zone reads as
/// fully released.
fn gate(value: f32, dead_zone: f32) -> f32 {
    if value > dead_zone { value } else { 0.0 }
}

/// Compute the commanded velocity for one trigger pair.
///
/// # Arguments
/// * `pair` - normalized trigger depressions in [0.0, 1.0]
/// * `max_speed` - full-depression speed in degrees per second
/// * `dead_zone` - per-trigger release threshold
///
/// # Returns
/// A velocity in [-max_speed, +max_speed], rounded to the nearest integer.
pub fn target(pair: TriggerPair, max_speed: i32, dead_zone: f32) -> i32 {
    let left = gate(pair.left, dead_zone);
    let right = gate(pair.right, dead_zone);

    let velocity = ((right - left) * max_speed as f32).round() as i32;
    velocity.clamp(-max_speed, max_speed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: i32 = 1_000;
    const DEAD_ZONE: f32 = 0.05;

    #[test]
    fn test_released_triggers_read_zero() {
        for pair in [
            TriggerPair::ZERO,
            TriggerPair::new(0.04, 0.0),
            TriggerPair::new(0.0, 0.04),
            TriggerPair::new(0.03, 0.049),
        ] {
            assert_eq!(target(pair, MAX, DEAD_ZONE), 0, "pair {pair:?}");
        }
    }

    #[test]
    fn test_dead_zone_boundary_is_inclusive() {
        // A reading exactly at the dead-zone still counts as released.
        assert_eq!(target(TriggerPair::new(0.0, DEAD_ZONE), MAX, DEAD_ZONE), 0);
    }

    #[test]
    fn test_right_trigger_drives_forward() {
        assert_eq!(target(TriggerPair::new(0.0, 0.8), MAX, DEAD_ZONE), 800);
        assert_eq!(target(TriggerPair::new(0.0, 1.0), MAX, DEAD_ZONE), 1_000);
    }

    #[test]
    fn test_left_trigger_drives_reverse() {
        assert_eq!(target(TriggerPair::new(0.8, 0.0), MAX, DEAD_ZONE), -800);
        assert_eq!(target(TriggerPair::new(1.0, 0.0), MAX, DEAD_ZONE), -1_000);
    }

    #[test]
    fn test_balanced_triggers_cancel() {
        assert_eq!(target(TriggerPair::new(0.7, 0.7), MAX, DEAD_ZONE), 0);
        assert_eq!(target(TriggerPair::new(1.0, 1.0), MAX, DEAD_ZONE), 0);
    }

    #[test]
    fn test_each_trigger_is_gated_before_subtraction() {
        // A sub-dead-zone left trigger must not shave the right trigger's
        // contribution.
        assert_eq!(target(TriggerPair::new(0.04, 0.8), MAX, DEAD_ZONE), 800);
    }

    #[test]
    fn test_rounds_to_nearest() {
        // 0.0625 is exact in binary: 62.5 rounds away from zero.
        assert_eq!(target(TriggerPair::new(0.0, 0.0625), MAX, DEAD_ZONE), 63);
        assert_eq!(target(TriggerPair::new(0.0625, 0.0), MAX, DEAD_ZONE), -63);
    }

    #[test]
    fn test_scales_with_max_speed() {
        // Small SPIKE motor limit.
        assert_eq!(target(TriggerPair::new(0.0, 1.0), 660, DEAD_ZONE), 660);
        assert_eq!(target(TriggerPair::new(0.5, 0.0), 660, DEAD_ZONE), -330);
    }
}
