//! Normalised penalties over a simulated trajectory set. Each penalty lies
//! in `[0, 1]`; the combined objective is their sum.

use crate::simulation::trajectory::TrainTrajectorySet;
use crate::{RailError, Result};

/// Minimum separation between train centres beyond the half train lengths.
pub const SAFETY_DISTANCE: f64 = 100.0;

pub fn combined_objective(traj_set: &TrainTrajectorySet) -> Result<f64> {
    Ok(collision_penalty(traj_set)?
        + destination_penalty(traj_set)?
        + stop_penalty(traj_set)?)
}

/// Scans all train pairs with overlapping schedules for separation
/// violations. When two trains are far apart, the scan skips the timesteps
/// during which they provably cannot meet. Each pair contributes the mean
/// violation over its overlap window.
pub fn collision_penalty(traj_set: &TrainTrajectorySet) -> Result<f64> {
    let train_list = traj_set.instance.instance.timetable.get_train_list();
    let n = train_list.size();
    if n < 2 {
        return Ok(0.0);
    }
    let n_pairs = n * (n - 1) / 2;
    let mut score = 0.0;

    for tr1 in 0..n {
        let train1 = train_list.get_train(tr1)?;
        let traj1 = traj_set.get_traj(tr1)?;
        for tr2 in tr1 + 1..n {
            let train2 = train_list.get_train(tr2)?;
            let traj2 = traj_set.get_traj(tr2)?;

            let first = traj1.first_timestep().max(traj2.first_timestep());
            let last = traj1.last_timestep().min(traj2.last_timestep());
            if last < first {
                continue;
            }

            let required_dist = 0.5 * train1.length + 0.5 * train2.length + SAFETY_DISTANCE;
            let max_approach_speed = train1.max_speed + train2.max_speed;
            if 2.0 * required_dist < max_approach_speed {
                return Err(RailError::Consistency(
                    "time resolution too coarse for collision scan".to_string(),
                ));
            }

            let mut pair_score = 0.0;
            let mut timestep = first;
            while timestep <= last {
                let dist = traj_set.train_distance(tr1, tr2, timestep)?;
                if dist >= required_dist {
                    if dist.is_finite() {
                        let safe_steps = ((dist - required_dist) / max_approach_speed).floor();
                        timestep += (safe_steps as usize).max(1);
                    } else {
                        timestep += 1;
                    }
                } else {
                    pair_score += 1.0 - dist / required_dist;
                    timestep += 1;
                }
            }
            score += pair_score / (last - first + 1) as f64;
        }
    }
    Ok(score / n_pairs as f64)
}

/// Distance of each train's final position from its scheduled exit, divided
/// by the largest distance to that exit anywhere in the network. An exit
/// that cannot be reached from the train's final position is an error.
pub fn destination_penalty(traj_set: &TrainTrajectorySet) -> Result<f64> {
    let sim = traj_set.instance;
    let timetable = &sim.instance.timetable;
    let n = timetable.get_train_list().size();
    if n == 0 {
        return Ok(0.0);
    }
    let mut score = 0.0;
    for tr in 0..n {
        let exit = timetable.get_schedule(tr)?.exit;
        let traj = traj_set.get_traj(tr)?;
        let dist = traj_set.train_vertex_distance(tr, exit, traj.last_timestep())?;
        if !dist.is_finite() {
            return Err(RailError::Consistency(format!(
                "train {} cannot reach its exit from its final position",
                timetable.get_train(tr)?.name
            )));
        }
        let max_dist = sim.max_distance_to_vertex(exit)?;
        if max_dist <= 0.0 {
            return Err(RailError::Consistency(
                "exit vertex has no incoming path to normalise against".to_string(),
            ));
        }
        score += dist / max_dist;
    }
    Ok(score / n as f64)
}

/// Fraction of scheduled stops that were not realised by a planned-stop
/// transition. Visiting more stops than scheduled is a hard error.
pub fn stop_penalty(traj_set: &TrainTrajectorySet) -> Result<f64> {
    let timetable = &traj_set.instance.instance.timetable;
    let n = timetable.get_train_list().size();
    let mut scheduled = 0;
    let mut visited = 0;
    for tr in 0..n {
        let n_scheduled = timetable.get_schedule(tr)?.stops.len();
        let n_visited = traj_set.get_traj(tr)?.visited_stop_count();
        if n_visited > n_scheduled {
            return Err(RailError::Consistency(format!(
                "train {} visited more stops than scheduled",
                timetable.get_train(tr)?.name
            )));
        }
        scheduled += n_scheduled;
        visited += n_visited;
    }
    if scheduled == 0 {
        return Ok(0.0);
    }
    Ok((scheduled - visited) as f64 / scheduled as f64)
}
