use std::collections::HashMap;

use crate::railway::network::Network;
use crate::railway::trains::TrainList;
use crate::railway::EdgeId;
use crate::{RailError, Result};

/// An ordered edge sequence in which consecutive edges are valid successors.
#[derive(Debug, Clone, Default)]
pub struct Route {
    edges: Vec<EdgeId>,
}

impl Route {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn size(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn edges(&self) -> &[EdgeId] {
        &self.edges
    }

    pub fn get_edge(&self, i: usize) -> Result<EdgeId> {
        self.edges
            .get(i)
            .cloned()
            .ok_or_else(|| RailError::OutOfRange(format!("route position {}", i)))
    }

    pub fn contains_edge(&self, e: EdgeId) -> bool {
        self.edges.contains(&e)
    }

    pub fn push_back(&mut self, e: EdgeId, network: &Network) -> Result<()> {
        if !network.has_edge_index(e) {
            return Err(RailError::NotFound(format!("edge index {}", e)));
        }
        if let Some(&last) = self.edges.last() {
            if !network.is_valid_successor(last, e) {
                return Err(RailError::Consistency(
                    "edge is not a valid successor of the route end".to_string(),
                ));
            }
        }
        self.edges.push(e);
        Ok(())
    }

    pub fn push_front(&mut self, e: EdgeId, network: &Network) -> Result<()> {
        if !network.has_edge_index(e) {
            return Err(RailError::NotFound(format!("edge index {}", e)));
        }
        if let Some(&first) = self.edges.first() {
            if !network.is_valid_successor(e, first) {
                return Err(RailError::Consistency(
                    "route start is not a valid successor of the edge".to_string(),
                ));
            }
        }
        self.edges.insert(0, e);
        Ok(())
    }

    pub fn length(&self, network: &Network) -> Result<f64> {
        let mut len = 0.0;
        for &e in &self.edges {
            len += network.get_edge(e)?.length;
        }
        Ok(len)
    }

    /// Cumulative start and end position of an edge along the route.
    pub fn edge_pos(&self, e: EdgeId, network: &Network) -> Result<(f64, f64)> {
        let mut pos = 0.0;
        for &f in &self.edges {
            let len = network.get_edge(f)?.length;
            if f == e {
                return Ok((pos, pos + len));
            }
            pos += len;
        }
        Err(RailError::NotFound(format!("edge {} is not on the route", e)))
    }

    /// For a set of edges (e.g. a station), the smallest start and largest
    /// end position among those on the route.
    pub fn edge_pos_of_set(&self, edges: &[EdgeId], network: &Network) -> Result<(f64, f64)> {
        let mut result: Option<(f64, f64)> = None;
        for &e in edges {
            if let Ok((start, end)) = self.edge_pos(e, network) {
                result = Some(match result {
                    None => (start, end),
                    Some((lo, hi)) => (lo.min(start), hi.max(end)),
                });
            }
        }
        result.ok_or_else(|| RailError::NotFound("no edge of the set is on the route".to_string()))
    }

    pub fn update_after_discretization(&mut self, new_edges: &[(EdgeId, Vec<EdgeId>)]) {
        for &(old, ref chain) in new_edges {
            if let Some(pos) = self.edges.iter().position(|&e| e == old) {
                self.edges.splice(pos..pos + 1, chain.iter().cloned());
            }
        }
    }

    pub fn check_consistency(&self, network: &Network) -> bool {
        for pair in self.edges.windows(2) {
            if !network.is_valid_successor(pair[0], pair[1]) {
                return false;
            }
        }
        self.edges.iter().all(|&e| network.has_edge_index(e))
    }
}

/// Train name to route. Routes are optional per train; consistency of the
/// map against a train list and network is checked explicitly.
#[derive(Debug, Default)]
pub struct RouteMap {
    routes: HashMap<String, Route>,
}

impl RouteMap {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn size(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn has_route(&self, train: &str) -> bool {
        self.routes.contains_key(train)
    }

    pub fn add_empty_route(&mut self, train: &str) -> Result<()> {
        if self.routes.contains_key(train) {
            return Err(RailError::Duplicate(format!("route for train {}", train)));
        }
        self.routes.insert(train.to_string(), Route::new());
        Ok(())
    }

    /// Like `add_empty_route`, but only for trains known to the catalogue.
    pub fn add_empty_route_for(&mut self, train: &str, train_list: &TrainList) -> Result<()> {
        if !train_list.has_train(train) {
            return Err(RailError::NotFound(format!("train {}", train)));
        }
        self.add_empty_route(train)
    }

    pub fn get_route(&self, train: &str) -> Result<&Route> {
        self.routes
            .get(train)
            .ok_or_else(|| RailError::NotFound(format!("route for train {}", train)))
    }

    pub fn push_back_edge(&mut self, train: &str, e: EdgeId, network: &Network) -> Result<()> {
        let route = self
            .routes
            .get_mut(train)
            .ok_or_else(|| RailError::NotFound(format!("route for train {}", train)))?;
        route.push_back(e, network)
    }

    pub fn push_back_edge_by_names(
        &mut self,
        train: &str,
        source: &str,
        target: &str,
        network: &Network,
    ) -> Result<()> {
        let e = network.get_edge_index_by_names(source, target)?;
        self.push_back_edge(train, e, network)
    }

    pub fn push_front_edge(&mut self, train: &str, e: EdgeId, network: &Network) -> Result<()> {
        let route = self
            .routes
            .get_mut(train)
            .ok_or_else(|| RailError::NotFound(format!("route for train {}", train)))?;
        route.push_front(e, network)
    }

    pub fn push_front_edge_by_names(
        &mut self,
        train: &str,
        source: &str,
        target: &str,
        network: &Network,
    ) -> Result<()> {
        let e = network.get_edge_index_by_names(source, target)?;
        self.push_front_edge(train, e, network)
    }

    pub fn length(&self, train: &str, network: &Network) -> Result<f64> {
        self.get_route(train)?.length(network)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Route)> {
        self.routes.iter()
    }

    pub fn update_after_discretization(&mut self, new_edges: &[(EdgeId, Vec<EdgeId>)]) {
        for route in self.routes.values_mut() {
            route.update_after_discretization(new_edges);
        }
    }

    pub fn check_consistency(
        &self,
        train_list: &TrainList,
        network: &Network,
        every_train_must_have_route: bool,
    ) -> bool {
        for (train, route) in &self.routes {
            if !train_list.has_train(train) {
                return false;
            }
            if !route.check_consistency(network) {
                return false;
            }
        }
        if every_train_must_have_route {
            for train in train_list.iter() {
                match self.routes.get(&train.name) {
                    Some(route) if !route.is_empty() => {}
                    _ => return false,
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::railway::network::VertexType;

    fn route_network() -> Network {
        let mut network = Network::new();
        for name in &["l0", "l1", "l2", "l3", "g00"] {
            network.add_vertex(name, VertexType::Ttd).unwrap();
        }
        let e0 = network.add_edge_by_names("l0", "l1", 5.0, 30.0, false, 0.0).unwrap();
        let e1 = network.add_edge_by_names("l1", "l2", 500.0, 30.0, false, 0.0).unwrap();
        let e2 = network.add_edge_by_names("l2", "l3", 500.0, 30.0, false, 0.0).unwrap();
        let e3 = network.add_edge_by_names("l3", "g00", 5.0, 30.0, false, 0.0).unwrap();
        network.add_successor(e0, e1).unwrap();
        network.add_successor(e1, e2).unwrap();
        network.add_successor(e2, e3).unwrap();
        network
    }

    #[test]
    fn test_route_map() {
        let network = route_network();
        let mut trains = TrainList::new();
        trains.add_train("tr1", 100.0, 83.33, 2.0, 1.0, true).unwrap();
        trains.add_train("tr2", 100.0, 27.78, 2.0, 1.0, true).unwrap();

        let mut routes = RouteMap::new();
        assert!(routes.add_empty_route_for("tr3", &trains).is_err());

        routes.add_empty_route_for("tr1", &trains).unwrap();
        routes.push_back_edge_by_names("tr1", "l1", "l2", &network).unwrap();
        // unknown edge
        assert!(routes.push_back_edge_by_names("tr1", "l0", "l2", &network).is_err());
        // not a successor of the route end
        assert!(routes.push_back_edge_by_names("tr1", "l0", "l1", &network).is_err());
        routes.push_back_edge_by_names("tr1", "l2", "l3", &network).unwrap();
        assert!(routes.push_front_edge_by_names("tr1", "l3", "g00", &network).is_err());
        routes.push_front_edge_by_names("tr1", "l0", "l1", &network).unwrap();

        let route = routes.get_route("tr1").unwrap();
        assert_eq!(route.size(), 3);
        let names: Vec<_> = route
            .edges()
            .iter()
            .map(|&e| {
                let edge = network.get_edge(e).unwrap();
                (
                    network.get_vertex(edge.source).unwrap().name.clone(),
                    network.get_vertex(edge.target).unwrap().name.clone(),
                )
            })
            .collect();
        assert_eq!(
            names,
            vec![
                ("l0".to_string(), "l1".to_string()),
                ("l1".to_string(), "l2".to_string()),
                ("l2".to_string(), "l3".to_string())
            ]
        );
        assert_eq!(route.length(&network).unwrap(), 1005.0);

        assert!(routes.check_consistency(&trains, &network, false));
        assert!(!routes.check_consistency(&trains, &network, true));

        routes.add_empty_route("tr2").unwrap();
        assert!(!routes.check_consistency(&trains, &network, true));
        routes.push_back_edge_by_names("tr2", "l0", "l1", &network).unwrap();
        assert!(routes.check_consistency(&trains, &network, true));
    }

    #[test]
    fn test_edge_positions() {
        let mut network = Network::new();
        for name in &["v0", "v1", "v2", "v3"] {
            network.add_vertex(name, VertexType::Ttd).unwrap();
        }
        let v0_v1 = network.add_edge_by_names("v0", "v1", 10.0, 5.0, false, 0.0).unwrap();
        let v1_v2 = network.add_edge_by_names("v1", "v2", 20.0, 5.0, false, 0.0).unwrap();
        let v2_v3 = network.add_edge_by_names("v2", "v3", 30.0, 5.0, false, 0.0).unwrap();
        let v3_v2 = network.add_edge_by_names("v3", "v2", 30.0, 5.0, false, 0.0).unwrap();
        let v2_v1 = network.add_edge_by_names("v2", "v1", 20.0, 5.0, false, 0.0).unwrap();
        network.add_successor(v0_v1, v1_v2).unwrap();
        network.add_successor(v1_v2, v2_v3).unwrap();

        let mut routes = RouteMap::new();
        routes.add_empty_route("tr1").unwrap();
        routes.push_back_edge("tr1", v0_v1, &network).unwrap();
        routes.push_back_edge("tr1", v1_v2, &network).unwrap();
        routes.push_back_edge("tr1", v2_v3, &network).unwrap();

        let route = routes.get_route("tr1").unwrap();
        assert_eq!(route.edge_pos(v0_v1, &network).unwrap(), (0.0, 10.0));
        assert_eq!(route.edge_pos(v1_v2, &network).unwrap(), (10.0, 30.0));
        assert_eq!(route.edge_pos(v2_v3, &network).unwrap(), (30.0, 60.0));
        assert!(route.edge_pos(v2_v1, &network).is_err());

        let station = vec![v1_v2, v2_v1, v2_v3, v3_v2];
        assert_eq!(route.edge_pos_of_set(&station, &network).unwrap(), (10.0, 60.0));
        assert_eq!(route.length(&network).unwrap(), 60.0);
    }

    #[test]
    fn test_route_discretization_rewrite() {
        let mut network = Network::new();
        for name in &["a", "b", "c"] {
            network.add_vertex(name, VertexType::Ttd).unwrap();
        }
        let ab = network.add_edge_by_names("a", "b", 100.0, 10.0, false, 0.0).unwrap();
        let bc = network.add_edge_by_names("b", "c", 40.0, 10.0, true, 10.0).unwrap();
        network.add_successor(ab, bc).unwrap();

        let mut routes = RouteMap::new();
        routes.add_empty_route("tr1").unwrap();
        routes.push_back_edge("tr1", ab, &network).unwrap();
        routes.push_back_edge("tr1", bc, &network).unwrap();

        let rewrites = network.discretize(crate::railway::network::SeparationType::Uniform).unwrap();
        routes.update_after_discretization(&rewrites);

        let route = routes.get_route("tr1").unwrap();
        assert_eq!(route.size(), 5);
        assert_eq!(route.edges()[0], ab);
        assert!(route.check_consistency(&network));
        assert_eq!(route.length(&network).unwrap(), 140.0);
    }
}
