//! Servo sweep geometry.
//!
//! The sweep is a pure function of the current angle and heading; the rig
//! applies the result to device state and the servo.

use serde::{Deserialize, Serialize};

use crate::{config::SweepCfg, state::Heading};

/// Limits and increment of the back-and-forth servo motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepBounds {
    pub min_angle: i32,
    pub max_angle: i32,
    pub step: i32,
}

impl Default for SweepBounds {
    fn default() -> Self {
        Self {
            min_angle: 30,
            max_angle: 150,
            step: 2,
        }
    }
}

impl From<&SweepCfg> for SweepBounds {
    fn from(cfg: &SweepCfg) -> Self {
        Self {
            min_angle: cfg.min_angle,
            max_angle: cfg.max_angle,
            step: cfg.step,
        }
    }
}

/// Outcome of one sweep tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepStep {
    pub angle: i32,
    pub heading: Heading,
    /// Set when the step landed on a bound; the caller holds there briefly.
    pub dwell: bool,
}

impl SweepBounds {
    /// Advances one step and reverses at the bounds.
    ///
    /// Reaching or passing a bound clamps to it and flips the heading, so
    /// from any starting angle the result is always within
    /// `min_angle..=max_angle`.
    pub fn advance(&self, angle: i32, heading: Heading) -> SweepStep {
        let next = angle.saturating_add(heading.sign() * self.step);

        if next >= self.max_angle {
            SweepStep {
                angle: self.max_angle,
                heading: Heading::Down,
                dwell: true,
            }
        } else if next <= self.min_angle {
            SweepStep {
                angle: self.min_angle,
                heading: Heading::Up,
                dwell: true,
            }
        } else {
            SweepStep {
                angle: next,
                heading,
                dwell: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn mid_range_step_keeps_heading() {
        let step = SweepBounds::default().advance(90, Heading::Up);
        assert_eq!(
            step,
            SweepStep {
                angle: 92,
                heading: Heading::Up,
                dwell: false
            }
        );
    }

    #[test]
    fn upper_bound_clamps_and_reverses() {
        let bounds = SweepBounds::default();
        assert_eq!(bounds.advance(148, Heading::Up).angle, 150);
        assert_eq!(bounds.advance(148, Heading::Up).heading, Heading::Down);
        assert!(bounds.advance(148, Heading::Up).dwell);
        // one short of the bound does not flip
        assert_eq!(bounds.advance(146, Heading::Up).heading, Heading::Up);
    }

    #[test]
    fn lower_bound_clamps_and_reverses() {
        let step = SweepBounds::default().advance(32, Heading::Down);
        assert_eq!(
            step,
            SweepStep {
                angle: 30,
                heading: Heading::Up,
                dwell: true
            }
        );
    }

    #[test]
    fn parked_servo_snaps_to_lower_bound() {
        // after "servo off" the angle sits at 0, below the sweep range
        let step = SweepBounds::default().advance(0, Heading::Up);
        assert_eq!(step.angle, 30);
        assert_eq!(step.heading, Heading::Up);
    }

    #[test]
    fn full_cycle_visits_both_bounds() {
        let bounds = SweepBounds::default();
        let (mut angle, mut heading) = (30, Heading::Up);
        let mut flips = 0;
        for _ in 0..120 {
            let step = bounds.advance(angle, heading);
            if step.heading != heading {
                flips += 1;
            }
            angle = step.angle;
            heading = step.heading;
        }
        // 60 steps per leg
        assert_eq!(flips, 2);
        assert_eq!(angle, 30);
    }

    fn heading() -> impl Strategy<Value = Heading> {
        prop_oneof![Just(Heading::Up), Just(Heading::Down)]
    }

    proptest! {
        #[test]
        fn angle_never_leaves_bounds(
            start in -360i32..360,
            initial in heading(),
            ticks in 1usize..400,
        ) {
            let bounds = SweepBounds::default();
            let (mut angle, mut heading) = (start, initial);
            for _ in 0..ticks {
                let step = bounds.advance(angle, heading);
                prop_assert!((bounds.min_angle..=bounds.max_angle).contains(&step.angle));
                angle = step.angle;
                heading = step.heading;
            }
        }

        #[test]
        fn heading_flips_only_on_bounds(
            start in 30i32..=150,
            initial in heading(),
        ) {
            let bounds = SweepBounds::default();
            let step = bounds.advance(start, initial);
            if step.heading != initial {
                prop_assert!(step.angle == bounds.min_angle || step.angle == bounds.max_angle);
                prop_assert!(step.dwell);
            } else {
                prop_assert!(!step.dwell);
            }
        }
    }
}
