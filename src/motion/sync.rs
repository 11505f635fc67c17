//! Cross-motor trajectory time-matching.

use super::profile::Trajectory;

/// Convergence tolerance as a fraction of the longest total time.
const TIME_MATCH_TOLERANCE: f32 = 0.01;

/// Rescale iterations; triangular profiles need a few passes because their
/// duration is not linear in peak velocity.
const MAX_RESCALE_PASSES: usize = 8;

/// Rescale every profile to match the longest total time.
///
/// Each shorter profile's peak/max velocity is reduced by the ratio of its
/// own total time to the longest and the profile regenerated; the rescale
/// repeats until every total time is within 1% of the longest. Callers then
/// start every profile with one shared timestamp.
pub fn synchronize(trajectories: &mut [Trajectory]) {
    let longest = trajectories
        .iter()
        .map(|t| t.total_time())
        .fold(0.0_f32, f32::max);
    if longest <= 0.0 {
        return;
    }

    for trajectory in trajectories.iter_mut() {
        if trajectory.total_time() <= 0.0 {
            continue;
        }
        for _ in 0..MAX_RESCALE_PASSES {
            let own = trajectory.total_time();
            if own >= longest * (1.0 - TIME_MATCH_TOLERANCE) {
                break;
            }
            let scale = own / longest;
            *trajectory = trajectory.with_scaled_velocity(scale);
        }
    }
}
