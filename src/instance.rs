use crate::railway::network::{Network, SeparationType};
use crate::railway::routes::RouteMap;
use crate::railway::timetable::Timetable;
use crate::railway::{EdgeId, TrainId, VertexId};
use crate::{RailError, Result};

/// Bundle of network, timetable and routes with cross-component consistency
/// rules; the input to both the simulator and the MIP builders.
#[derive(Debug, Default)]
pub struct VssGenerationTimetable {
    pub network: Network,
    pub timetable: Timetable,
    pub routes: RouteMap,
}

impl VssGenerationTimetable {
    pub fn new(network: Network, timetable: Timetable, routes: RouteMap) -> Self {
        VssGenerationTimetable { network, timetable, routes }
    }

    /// Discretizes the network and rewrites station tracks and routes to the
    /// new edge chains in one step.
    pub fn discretize(&mut self, separation_type: SeparationType) -> Result<()> {
        let new_edges = self.network.discretize(separation_type)?;
        self.timetable.update_after_discretization(&new_edges);
        self.routes.update_after_discretization(&new_edges);
        Ok(())
    }

    /// Trains whose route intersects the given edge set.
    pub fn trains_in_section(&self, section: &[EdgeId]) -> Vec<TrainId> {
        let mut trains = Vec::new();
        for tr in 0..self.timetable.get_train_list().size() {
            let name = &self.timetable.get_train(tr).unwrap().name;
            if let Ok(route) = self.routes.get_route(name) {
                if route.edges().iter().any(|e| section.contains(e)) {
                    trains.push(tr);
                }
            }
        }
        trains
    }

    /// Trains whose schedule interval contains `t`.
    pub fn trains_at_t(&self, t: i64) -> Result<Vec<TrainId>> {
        if t < 0 {
            return Err(RailError::InvalidInput("time must be non-negative".to_string()));
        }
        let mut trains = Vec::new();
        for tr in 0..self.timetable.get_train_list().size() {
            let (t0, tn) = self.timetable.time_interval(tr)?;
            if t0 <= t && t <= tn {
                trains.push(tr);
            }
        }
        Ok(trains)
    }

    pub fn max_t(&self) -> i64 {
        self.timetable.max_t()
    }

    /// Candidate edges for a train's path. With fixed routes this is the
    /// stored route; otherwise every edge is routable.
    pub fn edges_used_by_train(&self, tr: TrainId, fix_routes: bool) -> Result<Vec<EdgeId>> {
        let train = self.timetable.get_train(tr)?;
        if fix_routes {
            if let Ok(route) = self.routes.get_route(&train.name) {
                return Ok(route.edges().to_vec());
            }
        }
        Ok((0..self.network.number_of_edges()).collect())
    }

    pub fn vertices_used_by_train(&self, tr: TrainId, fix_routes: bool) -> Result<Vec<VertexId>> {
        let edges = self.edges_used_by_train(tr, fix_routes)?;
        let mut vertices = Vec::new();
        for e in edges {
            let edge = self.network.get_edge(e)?;
            for &v in &[edge.source, edge.target] {
                if !vertices.contains(&v) {
                    vertices.push(v);
                }
            }
        }
        Ok(vertices)
    }

    pub fn sections_used_by_train(
        &self,
        tr: TrainId,
        sections: &[Vec<EdgeId>],
        fix_routes: bool,
    ) -> Result<Vec<usize>> {
        let edges = self.edges_used_by_train(tr, fix_routes)?;
        Ok((0..sections.len())
            .filter(|&s| sections[s].iter().any(|e| edges.contains(e)))
            .collect())
    }

    /// Trains that may use the given edge under the current route fixing.
    pub fn trains_on_edge(&self, e: EdgeId, fix_routes: bool) -> Result<Vec<TrainId>> {
        let mut trains = Vec::new();
        for tr in 0..self.timetable.get_train_list().size() {
            if self.edges_used_by_train(tr, fix_routes)?.contains(&e) {
                trains.push(tr);
            }
        }
        Ok(trains)
    }

    /// Vertices at which a train can come to a halt for a scheduled stop:
    /// targets of the station's tracks restricted to the candidate edges.
    pub fn possible_stop_vertices(
        &self,
        tr: TrainId,
        station: &str,
        edges: &[EdgeId],
    ) -> Result<Vec<VertexId>> {
        self.timetable.get_train(tr)?;
        let tracks = &self.timetable.get_station_list().get_station(station)?.tracks;
        let mut vertices = Vec::new();
        for &track in tracks {
            if !edges.contains(&track) {
                continue;
            }
            let v = self.network.get_edge(track)?.target;
            if !vertices.contains(&v) {
                vertices.push(v);
            }
        }
        Ok(vertices)
    }

    /// Combined consistency over all components, plus the route/schedule
    /// coupling: routes respect successors, start at the entry, end at the
    /// exit, and touch every scheduled stop's station.
    pub fn check_consistency(&self, every_train_must_have_route: bool) -> bool {
        let train_list = self.timetable.get_train_list();
        if !self.timetable.check_consistency(&self.network) {
            return false;
        }
        if !self.routes.check_consistency(train_list, &self.network, every_train_must_have_route) {
            return false;
        }
        for tr in 0..train_list.size() {
            let train = train_list.get_train(tr).unwrap();
            let schedule = match self.timetable.get_schedule(tr) {
                Ok(s) => s,
                Err(_) => return false,
            };
            let route = match self.routes.get_route(&train.name) {
                Ok(r) if !r.is_empty() => r,
                _ => continue,
            };
            let first = self.network.get_edge(route.edges()[0]).unwrap();
            let last = self.network.get_edge(*route.edges().last().unwrap()).unwrap();
            if first.source != schedule.entry || last.target != schedule.exit {
                return false;
            }
            for stop in &schedule.stops {
                let station = match self.timetable.get_station_list().get_station(&stop.station) {
                    Ok(s) => s,
                    Err(_) => return false,
                };
                if !station.tracks.iter().any(|t| route.contains_edge(*t)) {
                    return false;
                }
            }
        }
        true
    }
}
