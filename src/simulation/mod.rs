pub mod solution;
pub mod trajectory;
pub mod objectives;

use crate::instance::VssGenerationTimetable;
use crate::railway::{EdgeId, VertexId, INF};
use crate::{RailError, Result};

/// Immutable view of an instance prepared for simulation: the edge-pair
/// shortest path matrix and the global timestep horizon (one second per
/// step). Shared read-only by all per-train trajectory constructions.
#[derive(Debug)]
pub struct SimulationInstance<'a> {
    pub instance: &'a VssGenerationTimetable,
    pub shortest_paths: Vec<Vec<f64>>,
    pub n_timesteps: usize,
}

impl<'a> SimulationInstance<'a> {
    pub fn new(instance: &'a VssGenerationTimetable) -> Result<Self> {
        let max_t = instance.max_t();
        if max_t <= 0 {
            return Err(RailError::InvalidInput("timetable horizon is empty".to_string()));
        }
        Ok(SimulationInstance {
            shortest_paths: instance.network.all_edge_pairs_shortest_paths(),
            n_timesteps: max_t as usize,
            instance,
        })
    }

    /// Path distance from a position on an edge (measured from the edge
    /// source) to a vertex, following the successor relation. `INF` when the
    /// vertex cannot be reached.
    pub fn distance_to_vertex(&self, e: EdgeId, position: f64, v: VertexId) -> Result<f64> {
        let network = &self.instance.network;
        let edge = network.get_edge(e)?;
        if !network.has_vertex_index(v) {
            return Err(RailError::NotFound(format!("vertex index {}", v)));
        }
        let mut best = INF;
        if edge.source == v {
            best = position;
        }
        for &f in network.in_edges(v) {
            let d = self.shortest_paths[e][f];
            if d < INF {
                best = best.min(edge.length - position + d);
            }
        }
        Ok(best)
    }

    /// Largest finite distance from any network position to the vertex; the
    /// normaliser of the destination penalty.
    pub fn max_distance_to_vertex(&self, v: VertexId) -> Result<f64> {
        let network = &self.instance.network;
        let mut max_dist: f64 = 0.0;
        let mut reachable = false;
        for e in 0..network.number_of_edges() {
            let d = self.distance_to_vertex(e, 0.0, v)?;
            if d < INF {
                reachable = true;
                max_dist = max_dist.max(d);
            }
        }
        if !reachable {
            return Err(RailError::Consistency(format!(
                "vertex {} is not reachable from anywhere",
                network.get_vertex(v)?.name
            )));
        }
        Ok(max_dist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::fixtures::simple_station_instance;

    #[test]
    fn test_distance_to_vertex() {
        let instance = simple_station_instance();
        let sim = SimulationInstance::new(&instance).unwrap();
        let network = &instance.network;

        let l0_l1 = network.get_edge_index_by_names("l0", "l1").unwrap();
        let l1 = network.get_vertex_index("l1").unwrap();
        let l3 = network.get_vertex_index("l3").unwrap();
        let r0 = network.get_vertex_index("r0").unwrap();

        assert_eq!(sim.distance_to_vertex(l0_l1, 0.0, l1).unwrap(), 5.0);
        assert_eq!(sim.distance_to_vertex(l0_l1, 2.0, l1).unwrap(), 3.0);
        // l0 -> l1 -> l2 -> l3: 5 + 500 + 500
        assert_eq!(sim.distance_to_vertex(l0_l1, 0.0, l3).unwrap(), 1005.0);
        // through the station to the right end
        assert_eq!(sim.distance_to_vertex(l0_l1, 5.0, r0).unwrap(), 1815.0);
    }

    #[test]
    fn test_max_distance_normalizer() {
        let instance = simple_station_instance();
        let sim = SimulationInstance::new(&instance).unwrap();
        let r0 = instance.network.get_vertex_index("r0").unwrap();
        // The farthest position is the start of l0 -> l1.
        assert_eq!(sim.max_distance_to_vertex(r0).unwrap(), 1820.0);
    }
}
