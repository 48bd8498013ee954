//! Stage weighting for the overall 0–100 job progress scale.
//!
//! | Stage      | Range    |
//! |------------|----------|
//! | Start      | 0        |
//! | Storyboard | 0 → 10   |
//! | Shots      | 10 → 85  |
//! | Assembly   | 85 → 95  |
//! | Finalize   | 95 → 100 |

pub const PROGRESS_START: f64 = 0.0;
pub const PROGRESS_STORYBOARD_IN_FLIGHT: f64 = 5.0;
pub const PROGRESS_STORYBOARD_DONE: f64 = 10.0;
pub const PROGRESS_SHOTS_START: f64 = 10.0;
pub const PROGRESS_SHOTS_SPAN: f64 = 75.0;
pub const PROGRESS_ASSEMBLY: f64 = 85.0;
pub const PROGRESS_FINALIZING: f64 = 95.0;
pub const PROGRESS_COMPLETE: f64 = 100.0;

/// Fraction of a shot's share that its own sub-progress may consume. The
/// rest is reached only once the shot's artifact is in place.
pub const SHOT_HEADROOM: f64 = 0.9;

/// Map a stage's sub-progress (0–100) onto the overall scale.
///
/// `sub` is clamped to `[0, 100]`.
pub fn map_progress(stage_base: f64, stage_share: f64, sub: f64) -> f64 {
    let sub = if sub.is_finite() { sub.clamp(0.0, 100.0) } else { 0.0 };
    stage_base + (sub / 100.0) * stage_share
}

/// Points of the overall scale owned by each shot.
pub fn shot_share(shot_count: usize) -> f64 {
    if shot_count == 0 {
        return 0.0;
    }
    PROGRESS_SHOTS_SPAN / shot_count as f64
}

/// Overall progress at which shot `index` (0-based) starts.
pub fn shot_base(index: usize, shot_count: usize) -> f64 {
    PROGRESS_SHOTS_START + index as f64 * shot_share(shot_count)
}

/// Overall progress for sub-progress `sub` of shot `index`.
pub fn shot_progress(index: usize, shot_count: usize, sub: f64) -> f64 {
    map_progress(
        shot_base(index, shot_count),
        shot_share(shot_count) * SHOT_HEADROOM,
        sub,
    )
}

/// Overall progress once shot `index` has its artifact in place.
pub fn shot_done(index: usize, shot_count: usize) -> f64 {
    shot_base(index + 1, shot_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn map_progress_endpoints() {
        assert!(close(map_progress(10.0, 20.0, 0.0), 10.0));
        assert!(close(map_progress(10.0, 20.0, 100.0), 30.0));
        assert!(close(map_progress(10.0, 20.0, 50.0), 20.0));
    }

    #[test]
    fn map_progress_clamps_sub() {
        assert!(close(map_progress(10.0, 20.0, 250.0), 30.0));
        assert!(close(map_progress(10.0, 20.0, -5.0), 10.0));
    }

    #[test]
    fn three_shots_split_the_range() {
        assert!(close(shot_share(3), 25.0));
        assert!(close(shot_base(0, 3), 10.0));
        assert!(close(shot_base(1, 3), 35.0));
        assert!(close(shot_base(2, 3), 60.0));
        assert!(close(shot_done(2, 3), PROGRESS_ASSEMBLY));
    }

    #[test]
    fn shot_progress_stays_below_next_base() {
        for n in 1..=10 {
            for i in 0..n {
                let top = shot_progress(i, n, 100.0);
                assert!(top < shot_done(i, n));
                assert!(top >= shot_base(i, n));
            }
        }
    }

    #[test]
    fn shot_progress_matches_headroom_formula() {
        // base_1 + 0.5 * 25 * 0.9
        assert!(close(shot_progress(1, 3, 50.0), 35.0 + 11.25));
    }

    #[test]
    fn zero_shots_has_no_share() {
        assert_eq!(shot_share(0), 0.0);
        assert!(close(shot_base(0, 0), PROGRESS_SHOTS_START));
    }
}
