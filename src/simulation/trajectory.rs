use crate::railway::network::Network;
use crate::railway::trains::Train;
use crate::railway::{EdgeId, TrainId};
use crate::simulation::solution::{RoutingSolution, SpeedTargets};
use crate::simulation::SimulationInstance;
use crate::{RailError, Result};

/// Bound on the number of edge segments walked while reconstructing one
/// train; exceeding it means the construction does not terminate.
const MAX_SEGMENTS: usize = 1000;

const EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy)]
pub struct TrainState {
    pub timestep: usize,
    pub edge: EdgeId,
    /// Measured along the edge in its natural direction, independent of the
    /// direction of travel.
    pub position: f64,
    /// True when the edge was entered at its source side.
    pub orientation: bool,
    /// Signed along the edge's natural direction.
    pub speed: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Normal,
    DeadEnd,
    OverSpeed,
    PlannedStop,
    TimeEnd,
}

#[derive(Debug, Clone, Copy)]
struct ExitEvent {
    timestep: usize,
    /// Overshoot beyond the edge boundary.
    residual: f64,
    speed: f64,
    /// True when the train left over the target end of the edge.
    forward: bool,
}

/// Positions and speeds of one train on one edge, one entry per timestep
/// starting at `initial_timestep`.
#[derive(Debug)]
pub struct EdgeTrajectory {
    pub edge: EdgeId,
    pub orientation: bool,
    pub initial_timestep: usize,
    pub positions: Vec<f64>,
    pub speeds: Vec<f64>,
    pub outcome: Option<TransitionOutcome>,
}

impl EdgeTrajectory {
    /// Integrates from `initial` until the position leaves the edge or the
    /// horizon is reached. Speed approaches the active target by at most the
    /// train's acceleration (respectively deceleration) per step and is
    /// clamped to the edge and train speed caps; position advances by the
    /// step's mean speed.
    fn integrate(
        network: &Network,
        train: &Train,
        targets: &SpeedTargets,
        initial: TrainState,
        horizon: usize,
    ) -> Result<(EdgeTrajectory, Option<ExitEvent>)> {
        let edge = network.get_edge(initial.edge)?;
        let vmax = train.max_speed.min(edge.max_speed);
        let mut traj = EdgeTrajectory {
            edge: initial.edge,
            orientation: initial.orientation,
            initial_timestep: initial.timestep,
            positions: vec![initial.position.max(0.0).min(edge.length)],
            speeds: vec![initial.speed],
            outcome: None,
        };

        // Entry beyond the edge bounds transfers on immediately.
        if initial.position > edge.length {
            let exit = ExitEvent {
                timestep: initial.timestep,
                residual: initial.position - edge.length,
                speed: initial.speed,
                forward: true,
            };
            return Ok((traj, Some(exit)));
        }
        if initial.position < 0.0 {
            let exit = ExitEvent {
                timestep: initial.timestep,
                residual: -initial.position,
                speed: initial.speed,
                forward: false,
            };
            return Ok((traj, Some(exit)));
        }

        let mut t = initial.timestep;
        let mut v = initial.speed;
        let mut pos = initial.position;
        while t < horizon {
            t += 1;
            let target = targets
                .target_at(t)
                .unwrap_or(initial.speed)
                .max(-vmax)
                .min(vmax);
            let mut next_v = if target > v {
                (v + train.acceleration).min(target)
            } else if target < v {
                (v - train.deceleration).max(target)
            } else {
                v
            };
            next_v = next_v.max(-vmax).min(vmax);
            let next_pos = pos + (v + next_v) / 2.0;
            if next_pos > edge.length {
                let exit = ExitEvent {
                    timestep: t,
                    residual: next_pos - edge.length,
                    speed: next_v,
                    forward: true,
                };
                return Ok((traj, Some(exit)));
            }
            if next_pos < 0.0 {
                let exit =
                    ExitEvent { timestep: t, residual: -next_pos, speed: next_v, forward: false };
                return Ok((traj, Some(exit)));
            }
            traj.positions.push(next_pos);
            traj.speeds.push(next_v);
            v = next_v;
            pos = next_pos;
        }
        Ok((traj, None))
    }

    pub fn last_timestep(&self) -> usize {
        self.initial_timestep + self.positions.len() - 1
    }

    fn simulate_braking(
        pos: f64,
        v: f64,
        target_abs: f64,
        decel: f64,
        length: f64,
    ) -> Option<Vec<(f64, f64)>> {
        let sign = if v >= 0.0 { 1.0 } else { -1.0 };
        let mut states = Vec::new();
        let mut v = v;
        let mut pos = pos;
        while v.abs() > target_abs + EPS {
            let next_v = sign * (v.abs() - decel).max(target_abs);
            let next_pos = pos + (v + next_v) / 2.0;
            if next_pos < 0.0 || next_pos > length {
                return None;
            }
            states.push((next_pos, next_v));
            v = next_v;
            pos = next_pos;
        }
        Some(states)
    }

    /// Replaces the tail from the earliest timestep at which decelerating to
    /// `target_abs` keeps the train on the edge. Prefers a point where
    /// braking is actually needed; with `allow_trivial`, a point already at
    /// or below the target speed is accepted as a fallback. Returns the
    /// timestep and position at which the target speed is reached.
    fn brake_tail(
        &mut self,
        target_abs: f64,
        decel: f64,
        length: f64,
        allow_trivial: bool,
    ) -> Option<(usize, f64)> {
        let mut choice = None;
        for i in 0..self.positions.len() {
            if self.speeds[i].abs() <= target_abs + EPS {
                continue;
            }
            if let Some(states) =
                Self::simulate_braking(self.positions[i], self.speeds[i], target_abs, decel, length)
            {
                choice = Some((i, states));
                break;
            }
        }
        if choice.is_none() && allow_trivial {
            if let Some(i) = (0..self.positions.len()).find(|&i| self.speeds[i].abs() <= target_abs + EPS)
            {
                choice = Some((i, Vec::new()));
            }
        }
        let (i, states) = choice?;
        self.positions.truncate(i + 1);
        self.speeds.truncate(i + 1);
        for (p, v) in states {
            self.positions.push(p);
            self.speeds.push(v);
        }
        Some((self.last_timestep(), *self.positions.last().unwrap()))
    }

    /// Keeps the train standing at its current position through `until`.
    fn hold_until(&mut self, until: usize) {
        let pos = *self.positions.last().unwrap();
        while self.last_timestep() < until {
            self.positions.push(pos);
            self.speeds.push(0.0);
        }
    }

    /// After braking to a nonzero cap, coast at that speed until the edge is
    /// left again. `None` when the horizon is reached first.
    fn coast_out(&mut self, length: f64, horizon: usize) -> Option<ExitEvent> {
        let v = *self.speeds.last().unwrap();
        let mut pos = *self.positions.last().unwrap();
        loop {
            if self.last_timestep() >= horizon {
                return None;
            }
            let next_pos = pos + v;
            if next_pos > length {
                return Some(ExitEvent {
                    timestep: self.last_timestep() + 1,
                    residual: next_pos - length,
                    speed: v,
                    forward: true,
                });
            }
            if next_pos < 0.0 {
                return Some(ExitEvent {
                    timestep: self.last_timestep() + 1,
                    residual: -next_pos,
                    speed: v,
                    forward: false,
                });
            }
            self.positions.push(next_pos);
            self.speeds.push(v);
            pos = next_pos;
        }
    }

    fn clip_to(&mut self, horizon: usize) {
        if self.last_timestep() > horizon {
            let keep = horizon + 1 - self.initial_timestep;
            self.positions.truncate(keep);
            self.speeds.truncate(keep);
        }
    }
}

/// Continuous trajectory of one train, reconstructed edge by edge from a
/// routing solution.
#[derive(Debug)]
pub struct TrainTrajectory {
    pub train: TrainId,
    segments: Vec<EdgeTrajectory>,
    visited_stops: usize,
}

impl TrainTrajectory {
    pub fn new(sim: &SimulationInstance, tr: TrainId, solution: &RoutingSolution) -> Result<Self> {
        let network = &sim.instance.network;
        let timetable = &sim.instance.timetable;
        let train = timetable.get_train(tr)?;
        let schedule = timetable.get_schedule(tr)?;
        let horizon = sim.n_timesteps;

        let first_edge = *network.out_edges(schedule.entry).first().ok_or_else(|| {
            RailError::Consistency(format!(
                "entry vertex {} has no outgoing edge",
                network.get_vertex(schedule.entry).map(|v| v.name.clone()).unwrap_or_default()
            ))
        })?;
        let mut state = TrainState {
            timestep: schedule.t_0.0 as usize,
            edge: first_edge,
            position: 0.0,
            orientation: true,
            speed: schedule.v_0,
        };

        let mut segments: Vec<EdgeTrajectory> = Vec::new();
        let mut visited_stops = 0;
        let mut switch_idx = 0;

        for _ in 0..MAX_SEGMENTS {
            let (mut seg, exit) =
                EdgeTrajectory::integrate(network, train, &solution.v_targets, state, horizon)?;
            let exit = match exit {
                Some(exit) => exit,
                None => {
                    seg.outcome = Some(TransitionOutcome::TimeEnd);
                    segments.push(seg);
                    return Ok(TrainTrajectory { train: tr, segments, visited_stops });
                }
            };
            let edge_length = network.get_edge(seg.edge)?.length;

            // A pending scheduled stop on this edge forces a halt when the
            // train would leave during the forced stopping interval.
            let pending = schedule.stops.get(visited_stops);
            let planned_stop = match pending {
                Some(stop) => {
                    let (fa, fb) = stop.forced_stopping_interval();
                    let tracks = &timetable.get_station_list().get_station(&stop.station)?.tracks;
                    let t = exit.timestep as i64;
                    if tracks.contains(&seg.edge) && fa <= t && t <= fb {
                        Some(fb)
                    } else {
                        None
                    }
                }
                None => None,
            };
            if let Some(hold_end) = planned_stop {
                let (stop_t, stop_pos) = seg
                    .brake_tail(0.0, train.deceleration, edge_length, true)
                    .ok_or_else(|| {
                        RailError::Consistency(format!(
                            "train {} cannot brake for its scheduled stop",
                            train.name
                        ))
                    })?;
                if stop_t > horizon {
                    seg.clip_to(horizon);
                    seg.outcome = Some(TransitionOutcome::TimeEnd);
                    segments.push(seg);
                    return Ok(TrainTrajectory { train: tr, segments, visited_stops });
                }
                visited_stops += 1;
                let resume = (hold_end.max(stop_t as i64)) as usize;
                seg.outcome = Some(TransitionOutcome::PlannedStop);
                if resume >= horizon {
                    seg.hold_until(horizon);
                    segments.push(seg);
                    return Ok(TrainTrajectory { train: tr, segments, visited_stops });
                }
                seg.hold_until(resume);
                state = TrainState {
                    timestep: resume,
                    edge: seg.edge,
                    position: stop_pos,
                    orientation: seg.orientation,
                    speed: 0.0,
                };
                segments.push(seg);
                continue;
            }

            let candidates: Vec<EdgeId> = if exit.forward {
                network.get_successors(seg.edge).to_vec()
            } else {
                let source = network.get_edge(seg.edge)?.source;
                network
                    .in_edges(source)
                    .iter()
                    .cloned()
                    .filter(|&g| network.is_valid_successor(g, seg.edge))
                    .collect()
            };

            if candidates.is_empty() {
                // Dead end: stop on the edge and wait until the speed targets
                // point back into it.
                let (stop_t, stop_pos) = seg
                    .brake_tail(0.0, train.deceleration, edge_length, true)
                    .ok_or_else(|| {
                        RailError::Consistency(format!(
                            "train {} cannot brake before a dead end",
                            train.name
                        ))
                    })?;
                if stop_t > horizon {
                    seg.clip_to(horizon);
                    seg.outcome = Some(TransitionOutcome::TimeEnd);
                    segments.push(seg);
                    return Ok(TrainTrajectory { train: tr, segments, visited_stops });
                }
                seg.outcome = Some(TransitionOutcome::DeadEnd);
                let mut resume = None;
                let mut t = stop_t;
                while let Some(tc) = solution.v_targets.next_change_after(t) {
                    let target = solution.v_targets.target_at(tc).unwrap_or(0.0);
                    if (exit.forward && target < 0.0) || (!exit.forward && target > 0.0) {
                        resume = Some(tc);
                        break;
                    }
                    t = tc;
                }
                match resume.filter(|&tc| tc < horizon) {
                    None => {
                        seg.hold_until(horizon);
                        segments.push(seg);
                        return Ok(TrainTrajectory { train: tr, segments, visited_stops });
                    }
                    Some(tc) => {
                        seg.hold_until(tc);
                        state = TrainState {
                            timestep: tc,
                            edge: seg.edge,
                            position: stop_pos,
                            orientation: seg.orientation,
                            speed: 0.0,
                        };
                        segments.push(seg);
                        continue;
                    }
                }
            }

            // The switch direction selects among the candidates by scaled
            // lottery.
            let direction = *solution.switch_directions.get(switch_idx).ok_or_else(|| {
                RailError::OutOfRange(format!(
                    "train {} needs more than {} switch directions",
                    train.name,
                    solution.switch_directions.len()
                ))
            })?;
            switch_idx += 1;
            let pick = ((direction * candidates.len() as f64).floor() as usize)
                .min(candidates.len() - 1);
            let next_edge = candidates[pick];
            let next = network.get_edge(next_edge)?;
            let cap = next.max_speed.min(train.max_speed);

            let exit = if exit.speed.abs() > cap + EPS {
                // Too fast for the next edge: brake to its cap on the current
                // edge, then roll out over the boundary at cap speed.
                seg.brake_tail(cap, train.deceleration, edge_length, false)
                    .ok_or_else(|| {
                        RailError::Consistency(format!(
                            "train {} cannot brake to {} before edge end",
                            train.name, cap
                        ))
                    })?;
                seg.outcome = Some(TransitionOutcome::OverSpeed);
                match seg.coast_out(edge_length, horizon) {
                    Some(exit) => exit,
                    None => {
                        seg.outcome = Some(TransitionOutcome::TimeEnd);
                        segments.push(seg);
                        return Ok(TrainTrajectory { train: tr, segments, visited_stops });
                    }
                }
            } else {
                seg.outcome = Some(TransitionOutcome::Normal);
                exit
            };

            state = TrainState {
                timestep: exit.timestep,
                edge: next_edge,
                position: if exit.forward { exit.residual } else { next.length - exit.residual },
                orientation: exit.forward,
                speed: exit.speed,
            };
            segments.push(seg);
        }
        Err(RailError::Consistency(
            "trajectory construction did not terminate".to_string(),
        ))
    }

    pub fn first_timestep(&self) -> usize {
        self.segments[0].initial_timestep
    }

    pub fn last_timestep(&self) -> usize {
        self.segments.last().unwrap().last_timestep()
    }

    pub fn visited_stop_count(&self) -> usize {
        self.visited_stops
    }

    pub fn segments(&self) -> &[EdgeTrajectory] {
        &self.segments
    }

    pub fn get_state(&self, timestep: usize) -> Result<TrainState> {
        if timestep < self.first_timestep() || timestep > self.last_timestep() {
            return Err(RailError::OutOfRange(format!(
                "timestep {} outside trajectory [{}, {}]",
                timestep,
                self.first_timestep(),
                self.last_timestep()
            )));
        }
        let seg = self
            .segments
            .iter()
            .find(|s| s.initial_timestep <= timestep && timestep <= s.last_timestep())
            .ok_or_else(|| RailError::OutOfRange(format!("timestep {} not covered", timestep)))?;
        let i = timestep - seg.initial_timestep;
        Ok(TrainState {
            timestep,
            edge: seg.edge,
            position: seg.positions[i],
            orientation: seg.orientation,
            speed: seg.speeds[i],
        })
    }

    pub fn final_state(&self) -> TrainState {
        self.get_state(self.last_timestep()).unwrap()
    }
}

/// All simulated trains of an instance. Construction is per train; a failed
/// train aborts the set construction.
#[derive(Debug)]
pub struct TrainTrajectorySet<'a> {
    pub instance: &'a SimulationInstance<'a>,
    trajectories: Vec<TrainTrajectory>,
}

impl<'a> TrainTrajectorySet<'a> {
    pub fn new(sim: &'a SimulationInstance<'a>, solutions: &[RoutingSolution]) -> Result<Self> {
        let n = sim.instance.timetable.get_train_list().size();
        if solutions.len() != n {
            return Err(RailError::InvalidInput(format!(
                "{} routing solutions for {} trains",
                solutions.len(),
                n
            )));
        }
        let mut trajectories = Vec::with_capacity(n);
        for (tr, solution) in solutions.iter().enumerate() {
            trajectories.push(TrainTrajectory::new(sim, tr, solution)?);
        }
        Ok(TrainTrajectorySet { instance: sim, trajectories })
    }

    pub fn get_traj(&self, tr: TrainId) -> Result<&TrainTrajectory> {
        self.trajectories
            .get(tr)
            .ok_or_else(|| RailError::NotFound(format!("trajectory for train index {}", tr)))
    }

    pub fn size(&self) -> usize {
        self.trajectories.len()
    }

    /// Path distance between two train centres at a common timestep.
    pub fn train_distance(&self, tr1: TrainId, tr2: TrainId, timestep: usize) -> Result<f64> {
        let network = &self.instance.instance.network;
        let s1 = self.get_traj(tr1)?.get_state(timestep)?;
        let s2 = self.get_traj(tr2)?.get_state(timestep)?;
        let len1 = network.get_edge(s1.edge)?.length;
        let len2 = network.get_edge(s2.edge)?.length;

        if s1.edge == s2.edge {
            return Ok((s1.position - s2.position).abs());
        }
        let mut best = f64::INFINITY;
        if network.get_reverse_edge_index(s1.edge) == Some(s2.edge) {
            best = best.min((s1.position - (len2 - s2.position)).abs());
        }
        // Path distances run from the end of one edge through the full other
        // edge, so the candidates below are never negative.
        let fwd = self.instance.shortest_paths[s1.edge][s2.edge];
        if fwd.is_finite() {
            best = best.min((len1 - s1.position) + fwd - (len2 - s2.position));
        }
        let bwd = self.instance.shortest_paths[s2.edge][s1.edge];
        if bwd.is_finite() {
            best = best.min((len2 - s2.position) + bwd - (len1 - s1.position));
        }
        Ok(best)
    }

    /// Path distance from a train's centre to a vertex at a timestep.
    pub fn train_vertex_distance(&self, tr: TrainId, vertex: usize, timestep: usize) -> Result<f64> {
        let state = self.get_traj(tr)?.get_state(timestep)?;
        self.instance.distance_to_vertex(state.edge, state.position, vertex)
    }
}
