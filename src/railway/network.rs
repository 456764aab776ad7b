use smallvec::SmallVec;
use std::collections::HashMap;

use crate::railway::{EdgeId, VertexId, INF};
use crate::{RailError, Result};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VertexType {
    NoBorder,
    NoBorderVSS,
    Vss,
    Ttd,
}

impl VertexType {
    /// Train detection borders separate sections; the other kinds are interior.
    pub fn is_border(self) -> bool {
        match self {
            VertexType::Vss | VertexType::Ttd => true,
            VertexType::NoBorder | VertexType::NoBorderVSS => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Vertex {
    pub name: String,
    pub kind: VertexType,
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub source: VertexId,
    pub target: VertexId,
    pub length: f64,
    pub max_speed: f64,
    pub breakable: bool,
    pub min_block_length: f64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SeparationType {
    Uniform,
}

type EdgeList = SmallVec<[EdgeId; 4]>;

/// Directed multigraph of the track layout. Vertices and edges are stable
/// indices; everything else (stations, routes, timetable) refers to them by
/// index, so edges are never removed, only rewritten in place by
/// `separate_edge`.
#[derive(Debug, Default)]
pub struct Network {
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    successors: Vec<EdgeList>,
    vertex_names: HashMap<String, VertexId>,
    edge_ids: HashMap<(VertexId, VertexId), EdgeId>,
    out_edges: Vec<EdgeList>,
    in_edges: Vec<EdgeList>,
}

impl Network {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add_vertex(&mut self, name: &str, kind: VertexType) -> Result<VertexId> {
        if self.vertex_names.contains_key(name) {
            return Err(RailError::Duplicate(format!("vertex {}", name)));
        }
        let v = self.vertices.len();
        self.vertices.push(Vertex { name: name.to_string(), kind });
        self.vertex_names.insert(name.to_string(), v);
        self.out_edges.push(SmallVec::new());
        self.in_edges.push(SmallVec::new());
        Ok(v)
    }

    pub fn add_edge(
        &mut self,
        source: VertexId,
        target: VertexId,
        length: f64,
        max_speed: f64,
        breakable: bool,
        min_block_length: f64,
    ) -> Result<EdgeId> {
        if source >= self.vertices.len() {
            return Err(RailError::NotFound(format!("vertex index {}", source)));
        }
        if target >= self.vertices.len() {
            return Err(RailError::NotFound(format!("vertex index {}", target)));
        }
        if source == target {
            return Err(RailError::InvalidInput("self-loop edge".to_string()));
        }
        if self.edge_ids.contains_key(&(source, target)) {
            return Err(RailError::Duplicate(format!(
                "edge {} -> {}",
                self.vertices[source].name, self.vertices[target].name
            )));
        }
        if length <= 0.0 {
            return Err(RailError::InvalidInput("edge length must be positive".to_string()));
        }
        if max_speed <= 0.0 {
            return Err(RailError::InvalidInput("edge max speed must be positive".to_string()));
        }
        if min_block_length < 0.0 {
            return Err(RailError::InvalidInput("negative min block length".to_string()));
        }
        if breakable && length < 2.0 * min_block_length {
            return Err(RailError::InvalidInput(
                "breakable edge shorter than two minimal blocks".to_string(),
            ));
        }
        let e = self.edges.len();
        self.edges.push(Edge { source, target, length, max_speed, breakable, min_block_length });
        self.successors.push(SmallVec::new());
        self.edge_ids.insert((source, target), e);
        self.out_edges[source].push(e);
        self.in_edges[target].push(e);
        Ok(e)
    }

    pub fn add_edge_by_names(
        &mut self,
        source: &str,
        target: &str,
        length: f64,
        max_speed: f64,
        breakable: bool,
        min_block_length: f64,
    ) -> Result<EdgeId> {
        let s = self.get_vertex_index(source)?;
        let t = self.get_vertex_index(target)?;
        self.add_edge(s, t, length, max_speed, breakable, min_block_length)
    }

    /// Registers `e2` as a legal through-movement after `e1`. Idempotent.
    pub fn add_successor(&mut self, e1: EdgeId, e2: EdgeId) -> Result<()> {
        if e1 >= self.edges.len() || e2 >= self.edges.len() {
            return Err(RailError::NotFound(format!("edge index {}", e1.max(e2))));
        }
        if self.edges[e1].target != self.edges[e2].source {
            return Err(RailError::Consistency(
                "successor edge does not start at the predecessor's target".to_string(),
            ));
        }
        if !self.successors[e1].contains(&e2) {
            self.successors[e1].push(e2);
        }
        Ok(())
    }

    pub fn number_of_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn number_of_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn has_vertex_index(&self, v: VertexId) -> bool {
        v < self.vertices.len()
    }

    pub fn has_vertex(&self, name: &str) -> bool {
        self.vertex_names.contains_key(name)
    }

    pub fn get_vertex(&self, v: VertexId) -> Result<&Vertex> {
        self.vertices
            .get(v)
            .ok_or_else(|| RailError::NotFound(format!("vertex index {}", v)))
    }

    pub fn get_vertex_index(&self, name: &str) -> Result<VertexId> {
        self.vertex_names
            .get(name)
            .cloned()
            .ok_or_else(|| RailError::NotFound(format!("vertex {}", name)))
    }

    pub fn has_edge_index(&self, e: EdgeId) -> bool {
        e < self.edges.len()
    }

    pub fn has_edge(&self, source: VertexId, target: VertexId) -> bool {
        self.edge_ids.contains_key(&(source, target))
    }

    pub fn has_edge_by_names(&self, source: &str, target: &str) -> bool {
        match (self.vertex_names.get(source), self.vertex_names.get(target)) {
            (Some(&s), Some(&t)) => self.has_edge(s, t),
            _ => false,
        }
    }

    pub fn get_edge(&self, e: EdgeId) -> Result<&Edge> {
        self.edges
            .get(e)
            .ok_or_else(|| RailError::NotFound(format!("edge index {}", e)))
    }

    pub fn get_edge_index(&self, source: VertexId, target: VertexId) -> Result<EdgeId> {
        self.edge_ids.get(&(source, target)).cloned().ok_or_else(|| {
            RailError::NotFound(format!("edge {} -> {}", source, target))
        })
    }

    pub fn get_edge_index_by_names(&self, source: &str, target: &str) -> Result<EdgeId> {
        let s = self.get_vertex_index(source)?;
        let t = self.get_vertex_index(target)?;
        self.edge_ids.get(&(s, t)).cloned().ok_or_else(|| {
            RailError::NotFound(format!("edge {} -> {}", source, target))
        })
    }

    pub fn change_vertex_name(&mut self, v: VertexId, new_name: &str) -> Result<()> {
        if !self.has_vertex_index(v) {
            return Err(RailError::NotFound(format!("vertex index {}", v)));
        }
        if self.vertex_names.contains_key(new_name) {
            return Err(RailError::Duplicate(format!("vertex {}", new_name)));
        }
        let old = self.vertices[v].name.clone();
        self.vertex_names.remove(&old);
        self.vertex_names.insert(new_name.to_string(), v);
        self.vertices[v].name = new_name.to_string();
        Ok(())
    }

    pub fn change_vertex_type(&mut self, v: VertexId, kind: VertexType) -> Result<()> {
        if !self.has_vertex_index(v) {
            return Err(RailError::NotFound(format!("vertex index {}", v)));
        }
        self.vertices[v].kind = kind;
        Ok(())
    }

    pub fn change_edge_length(&mut self, e: EdgeId, length: f64) -> Result<()> {
        if length <= 0.0 {
            return Err(RailError::InvalidInput("edge length must be positive".to_string()));
        }
        self.get_edge(e)?;
        self.edges[e].length = length;
        Ok(())
    }

    pub fn change_edge_max_speed(&mut self, e: EdgeId, max_speed: f64) -> Result<()> {
        if max_speed <= 0.0 {
            return Err(RailError::InvalidInput("edge max speed must be positive".to_string()));
        }
        self.get_edge(e)?;
        self.edges[e].max_speed = max_speed;
        Ok(())
    }

    pub fn change_edge_min_block_length(&mut self, e: EdgeId, min_block_length: f64) -> Result<()> {
        if min_block_length < 0.0 {
            return Err(RailError::InvalidInput("negative min block length".to_string()));
        }
        self.get_edge(e)?;
        self.edges[e].min_block_length = min_block_length;
        Ok(())
    }

    pub fn change_edge_breakable(&mut self, e: EdgeId, breakable: bool) -> Result<()> {
        self.get_edge(e)?;
        self.edges[e].breakable = breakable;
        Ok(())
    }

    pub fn out_edges(&self, v: VertexId) -> &[EdgeId] {
        &self.out_edges[v]
    }

    pub fn in_edges(&self, v: VertexId) -> &[EdgeId] {
        &self.in_edges[v]
    }

    pub fn neighbors(&self, v: VertexId) -> Vec<VertexId> {
        let mut ns = Vec::new();
        for &e in self.out_edges[v].iter() {
            if !ns.contains(&self.edges[e].target) {
                ns.push(self.edges[e].target);
            }
        }
        for &e in self.in_edges[v].iter() {
            if !ns.contains(&self.edges[e].source) {
                ns.push(self.edges[e].source);
            }
        }
        ns
    }

    pub fn get_successors(&self, e: EdgeId) -> &[EdgeId] {
        &self.successors[e]
    }

    pub fn is_valid_successor(&self, e1: EdgeId, e2: EdgeId) -> bool {
        e1 < self.edges.len() && self.successors[e1].contains(&e2)
    }

    pub fn get_reverse_edge_index(&self, e: EdgeId) -> Option<EdgeId> {
        let edge = self.edges.get(e)?;
        self.edge_ids.get(&(edge.target, edge.source)).cloned()
    }

    pub fn vertices_by_type(&self, kind: VertexType) -> Vec<VertexId> {
        (0..self.vertices.len()).filter(|&v| self.vertices[v].kind == kind).collect()
    }

    pub fn breakable_edges(&self) -> Vec<EdgeId> {
        (0..self.edges.len()).filter(|&e| self.edges[e].breakable).collect()
    }

    /// Groups edges into (forward, reverse) pairs, orienting each pair by
    /// ascending endpoint index. Edges without a reverse partner in the list
    /// are kept alone. With `sort`, the result is ordered by first element.
    pub fn combine_reverse_edges(
        &self,
        edges: &[EdgeId],
        sort: bool,
    ) -> Result<Vec<(EdgeId, Option<EdgeId>)>> {
        let mut pairs: Vec<(EdgeId, Option<EdgeId>)> = Vec::new();
        let mut seen: Vec<EdgeId> = Vec::new();
        for &e in edges {
            if seen.contains(&e) {
                continue;
            }
            let edge = self.get_edge(e)?;
            let rev = self
                .get_reverse_edge_index(e)
                .filter(|r| edges.contains(r));
            match rev {
                Some(r) => {
                    seen.push(e);
                    seen.push(r);
                    if edge.source < edge.target {
                        pairs.push((e, Some(r)));
                    } else {
                        pairs.push((r, Some(e)));
                    }
                }
                None => {
                    seen.push(e);
                    pairs.push((e, None));
                }
            }
        }
        if sort {
            pairs.sort_by_key(|p| p.0);
        }
        Ok(pairs)
    }

    /// Shared endpoint of two reverse-combined edge pairs, if any.
    pub fn common_vertex(
        &self,
        pair1: (EdgeId, Option<EdgeId>),
        pair2: (EdgeId, Option<EdgeId>),
    ) -> Option<VertexId> {
        let e1 = self.edges.get(pair1.0)?;
        let e2 = self.edges.get(pair2.0)?;
        for &v in &[e1.source, e1.target] {
            if v == e2.source || v == e2.target {
                return Some(v);
            }
        }
        None
    }

    /// Number of section separators that fit strictly inside a breakable
    /// edge: a chain of `floor(length / min_block_length)` blocks has one
    /// separator less than blocks.
    pub fn max_vss_on_edge(&self, e: EdgeId) -> Result<usize> {
        let edge = self.get_edge(e)?;
        if !edge.breakable || edge.min_block_length <= 0.0 {
            return Ok(0);
        }
        let blocks = (edge.length / edge.min_block_length).floor() as usize;
        Ok(blocks.saturating_sub(1))
    }

    pub fn maximal_vertex_speed(&self, v: VertexId, edges: &[EdgeId]) -> f64 {
        let mut speed: f64 = 0.0;
        for &e in edges {
            let edge = &self.edges[e];
            if edge.source == v || edge.target == v {
                speed = speed.max(edge.max_speed);
            }
        }
        speed
    }

    pub fn minimal_neighboring_edge_length(&self, v: VertexId) -> f64 {
        let mut len = INF;
        for &e in self.out_edges[v].iter().chain(self.in_edges[v].iter()) {
            len = len.min(self.edges[e].length);
        }
        len
    }

    /// Maximal sets of unbreakable edges joined across `NoBorder` vertices
    /// (and closed under reverse pairing). Edges touching a `NoBorderVSS`
    /// vertex belong to the VSS candidate sections instead.
    pub fn unbreakable_sections(&self) -> Vec<Vec<EdgeId>> {
        let eligible = |e: EdgeId| {
            let edge = &self.edges[e];
            !edge.breakable
                && self.vertices[edge.source].kind != VertexType::NoBorderVSS
                && self.vertices[edge.target].kind != VertexType::NoBorderVSS
        };
        self.edge_sections(&eligible, VertexType::NoBorder)
    }

    /// Maximal sets of edges joined across `NoBorderVSS` vertices; these are
    /// the places where variable section separators may be introduced.
    pub fn no_border_vss_sections(&self) -> Vec<Vec<EdgeId>> {
        let eligible = |e: EdgeId| {
            let edge = &self.edges[e];
            !edge.breakable
                && (self.vertices[edge.source].kind == VertexType::NoBorderVSS
                    || self.vertices[edge.target].kind == VertexType::NoBorderVSS)
        };
        self.edge_sections(&eligible, VertexType::NoBorderVSS)
    }

    fn edge_sections(&self, eligible: &dyn Fn(EdgeId) -> bool, interior: VertexType) -> Vec<Vec<EdgeId>> {
        let mut assigned = vec![false; self.edges.len()];
        let mut sections = Vec::new();
        for start in 0..self.edges.len() {
            if assigned[start] || !eligible(start) {
                continue;
            }
            let mut section = Vec::new();
            let mut queue = vec![start];
            assigned[start] = true;
            while let Some(e) = queue.pop() {
                section.push(e);
                let mut reach = |f: EdgeId, assigned: &mut Vec<bool>, queue: &mut Vec<EdgeId>| {
                    if !assigned[f] && eligible(f) {
                        assigned[f] = true;
                        queue.push(f);
                    }
                };
                // Edges meeting at an interior vertex belong together.
                for &v in &[self.edges[e].source, self.edges[e].target] {
                    if self.vertices[v].kind != interior {
                        continue;
                    }
                    for &f in self.out_edges[v].iter().chain(self.in_edges[v].iter()) {
                        reach(f, &mut assigned, &mut queue);
                    }
                }
                if let Some(r) = self.get_reverse_edge_index(e) {
                    reach(r, &mut assigned, &mut queue);
                }
            }
            sections.push(section);
        }
        sections
    }

    /// Replaces the breakable edge `u -> v` (and its reverse, if present) by a
    /// chain of equal-length unbreakable edges through fresh `NoBorderVSS`
    /// vertices. The last chain edge reuses the old edge index so that
    /// external references stay valid; the returned lists are in chain order
    /// and therefore end with the old index.
    pub fn separate_edge(
        &mut self,
        u: VertexId,
        v: VertexId,
        separation_type: SeparationType,
    ) -> Result<(Vec<EdgeId>, Vec<EdgeId>)> {
        match separation_type {
            SeparationType::Uniform => self.separate_edge_uniform(u, v),
        }
    }

    pub fn separate_edge_by_names(
        &mut self,
        u: &str,
        v: &str,
        separation_type: SeparationType,
    ) -> Result<(Vec<EdgeId>, Vec<EdgeId>)> {
        let u = self.get_vertex_index(u)?;
        let v = self.get_vertex_index(v)?;
        self.separate_edge(u, v, separation_type)
    }

    fn separate_edge_uniform(&mut self, u: VertexId, v: VertexId) -> Result<(Vec<EdgeId>, Vec<EdgeId>)> {
        let e = self.get_edge_index(u, v)?;
        let edge = self.edges[e].clone();
        if !edge.breakable || edge.min_block_length <= 0.0 {
            return Err(RailError::InvalidInput(format!(
                "edge {} -> {} is not breakable",
                self.vertices[u].name, self.vertices[v].name
            )));
        }
        let k = (edge.length / edge.min_block_length).floor() as usize;
        if k < 2 {
            return Err(RailError::Consistency(
                "breakable edge shorter than two minimal blocks".to_string(),
            ));
        }
        let section_length = edge.length / k as f64;
        let reverse = self.get_reverse_edge_index(e);

        // Fresh interior vertices u_v_0 .. u_v_{k-2}.
        let mut chain_vertices = Vec::with_capacity(k + 1);
        chain_vertices.push(u);
        for i in 0..k - 1 {
            let name = format!("{}_{}_{}", self.vertices[u].name, self.vertices[v].name, i);
            let w = self.add_vertex(&name, VertexType::NoBorderVSS)?;
            chain_vertices.push(w);
        }
        chain_vertices.push(v);

        let forward = self.build_chain(e, &chain_vertices, section_length)?;
        let reverse_chain = match reverse {
            Some(r) => {
                let mut rev_vertices: Vec<VertexId> = chain_vertices.clone();
                rev_vertices.reverse();
                self.build_chain(r, &rev_vertices, section_length)?
            }
            None => Vec::new(),
        };
        Ok((forward, reverse_chain))
    }

    /// Rewrites edge `e` into a chain along `vertices`, reusing `e` as the
    /// final link. Chain interiors get exactly one successor each, so no
    /// turnaround is possible inside the chain.
    fn build_chain(&mut self, e: EdgeId, vertices: &[VertexId], section_length: f64) -> Result<Vec<EdgeId>> {
        let k = vertices.len() - 1;
        let old_source = self.edges[e].source;
        let old_target = self.edges[e].target;
        let max_speed = self.edges[e].max_speed;

        let mut chain = Vec::with_capacity(k);
        for i in 0..k - 1 {
            let f = self.add_edge(vertices[i], vertices[i + 1], section_length, max_speed, false, 0.0)?;
            chain.push(f);
        }

        // The old edge becomes the last link: new source, shortened, unbreakable.
        self.edge_ids.remove(&(old_source, old_target));
        let new_source = vertices[k - 1];
        self.out_edges[old_source].retain(|&mut f| f != e);
        self.out_edges[new_source].push(e);
        self.edge_ids.insert((new_source, old_target), e);
        {
            let edge = &mut self.edges[e];
            edge.source = new_source;
            edge.length = section_length;
            edge.breakable = false;
            edge.min_block_length = 0.0;
        }

        // Incoming successor references move to the head of the chain.
        let head = chain[0];
        for f in 0..self.successors.len() {
            if f == e || chain.contains(&f) {
                continue;
            }
            for s in self.successors[f].iter_mut() {
                if *s == e {
                    *s = head;
                }
            }
        }
        for i in 0..k - 1 {
            let next = if i + 1 < k - 1 { chain[i + 1] } else { e };
            self.successors[chain[i]].clear();
            self.successors[chain[i]].push(next);
        }

        chain.push(e);
        Ok(chain)
    }

    /// Separates every breakable edge (together with its reverse) and returns
    /// the rewrite map consumed by the timetable and route updates.
    pub fn discretize(&mut self, separation_type: SeparationType) -> Result<Vec<(EdgeId, Vec<EdgeId>)>> {
        let candidates = self.breakable_edges();
        let mut rewrites = Vec::new();
        for e in candidates {
            if !self.edges[e].breakable {
                // Already handled as the reverse of an earlier edge.
                continue;
            }
            let reverse = self.get_reverse_edge_index(e);
            let (u, v) = (self.edges[e].source, self.edges[e].target);
            let (forward, backward) = self.separate_edge(u, v, separation_type)?;
            rewrites.push((e, forward));
            if let Some(r) = reverse {
                rewrites.push((r, backward));
            }
        }
        Ok(rewrites)
    }

    /// Minimum path length from the end of `e1` to the end of `e2` along the
    /// successor relation, by Floyd-Warshall on the edge graph. Arcs are
    /// weighted with the successor edge's length; unreachable pairs are `INF`.
    pub fn all_edge_pairs_shortest_paths(&self) -> Vec<Vec<f64>> {
        let n = self.edges.len();
        let mut dist = vec![vec![INF; n]; n];
        for e in 0..n {
            dist[e][e] = 0.0;
            for &s in self.successors[e].iter() {
                dist[e][s] = dist[e][s].min(self.edges[s].length);
            }
        }
        for k in 0..n {
            for i in 0..n {
                if dist[i][k] == INF {
                    continue;
                }
                for j in 0..n {
                    let through = dist[i][k] + dist[k][j];
                    if through < dist[i][j] {
                        dist[i][j] = through;
                    }
                }
            }
        }
        dist
    }

    /// Checks the preconditions of the VSS transformation: `NoBorderVSS`
    /// vertices must be plain through-points bounded away from `NoBorder`
    /// vertices, breakable edges must run between borders with a usable
    /// block length, and reverse pairs must agree on length and breakability.
    pub fn is_consistent_for_transformation(&self) -> bool {
        for v in 0..self.vertices.len() {
            if self.vertices[v].kind != VertexType::NoBorderVSS {
                continue;
            }
            let ns = self.neighbors(v);
            if ns.len() > 2 {
                return false;
            }
            if self.in_edges[v].len() != self.out_edges[v].len() || self.in_edges[v].len() > 2 {
                return false;
            }
            if ns.iter().any(|&n| self.vertices[n].kind == VertexType::NoBorder) {
                return false;
            }
        }
        for e in 0..self.edges.len() {
            let edge = &self.edges[e];
            if edge.breakable {
                if edge.min_block_length <= 0.0 || edge.length < 2.0 * edge.min_block_length {
                    return false;
                }
                if !self.vertices[edge.source].kind.is_border()
                    || !self.vertices[edge.target].kind.is_border()
                {
                    return false;
                }
            }
            if let Some(r) = self.get_reverse_edge_index(e) {
                let rev = &self.edges[r];
                if rev.length != edge.length || rev.breakable != edge.breakable {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic_network() -> (Network, [EdgeId; 4]) {
        let mut network = Network::new();
        network.add_vertex("v0", VertexType::NoBorder).unwrap();
        network.add_vertex("v1", VertexType::Vss).unwrap();
        network.add_vertex("v2", VertexType::Ttd).unwrap();
        let e0 = network.add_edge_by_names("v0", "v1", 1.0, 2.0, false, 0.0).unwrap();
        let e1 = network.add_edge_by_names("v1", "v2", 3.0, 4.0, true, 1.5).unwrap();
        let e2 = network.add_edge_by_names("v1", "v0", 1.0, 2.0, false, 0.0).unwrap();
        let e3 = network.add_edge_by_names("v2", "v0", 10.0, 20.0, true, 2.0).unwrap();
        network.add_successor(e0, e1).unwrap();
        network.add_successor(e3, e0).unwrap();
        (network, [e0, e1, e2, e3])
    }

    #[test]
    fn test_network_functions() {
        let (network, [e0, e1, e2, e3]) = basic_network();

        assert_eq!(network.get_vertex_index("v0").unwrap(), 0);
        assert_eq!(network.get_edge_index_by_names("v0", "v1").unwrap(), e0);
        assert_eq!(network.get_edge(e1).unwrap().source, 1);
        assert_eq!(network.get_edge(e1).unwrap().target, 2);
        assert!(network.has_vertex("v1"));
        assert!(!network.has_vertex("v3"));
        assert!(network.has_edge_by_names("v1", "v0"));
        assert!(!network.has_edge_by_names("v0", "v2"));

        let mut out1 = network.out_edges(1).to_vec();
        out1.sort();
        assert_eq!(out1, vec![e1, e2]);
        assert_eq!(network.in_edges(1), &[e0]);
        let mut ns = network.neighbors(1);
        ns.sort();
        assert_eq!(ns, vec![0, 2]);

        assert_eq!(network.get_successors(e0), &[e1]);
        assert!(network.is_valid_successor(e0, e1));
        assert!(!network.is_valid_successor(e0, e2));

        assert_eq!(network.get_reverse_edge_index(e0), Some(e2));
        assert_eq!(network.get_reverse_edge_index(e1), None);

        // One separator less than the number of minimal blocks that fit.
        assert_eq!(network.max_vss_on_edge(e0).unwrap(), 0);
        assert_eq!(network.max_vss_on_edge(e1).unwrap(), 1);
        assert_eq!(network.max_vss_on_edge(e3).unwrap(), 4);

        assert_eq!(network.number_of_vertices(), 3);
        assert_eq!(network.number_of_edges(), 4);
    }

    #[test]
    fn test_add_edge_validation() {
        let mut network = Network::new();
        network.add_vertex("a", VertexType::Ttd).unwrap();
        network.add_vertex("b", VertexType::Ttd).unwrap();
        assert!(network.add_edge_by_names("a", "b", 0.0, 10.0, false, 0.0).is_err());
        assert!(network.add_edge_by_names("a", "b", 100.0, 0.0, false, 0.0).is_err());
        assert!(network.add_edge_by_names("a", "c", 100.0, 10.0, false, 0.0).is_err());
        // breakable edge must fit two minimal blocks
        assert!(network.add_edge_by_names("a", "b", 15.0, 10.0, true, 10.0).is_err());
        network.add_edge_by_names("a", "b", 20.0, 10.0, true, 10.0).unwrap();
        assert!(network.add_edge_by_names("a", "b", 20.0, 10.0, false, 0.0).is_err());
        assert!(network.add_vertex("a", VertexType::NoBorder).is_err());
    }

    #[test]
    fn test_rename_and_property_changes() {
        let (mut network, [e0, e1, ..]) = basic_network();
        network.change_vertex_name(0, "v0_tmp").unwrap();
        assert!(network.has_vertex("v0_tmp"));
        assert!(!network.has_vertex("v0"));
        assert_eq!(network.get_vertex_index("v0_tmp").unwrap(), 0);
        network.change_vertex_name(0, "v0").unwrap();

        network.change_edge_length(e0, 2.0).unwrap();
        assert_eq!(network.get_edge(e0).unwrap().length, 2.0);
        network.change_edge_max_speed(e0, 3.0).unwrap();
        assert_eq!(network.get_edge(e0).unwrap().max_speed, 3.0);
        network.change_edge_breakable(e1, false).unwrap();
        assert!(!network.get_edge(e1).unwrap().breakable);
        assert!(network.change_edge_length(e0, -1.0).is_err());
    }

    #[test]
    fn test_successor_endpoint_check() {
        let (mut network, [e0, _, e2, e3]) = basic_network();
        // target(e3) = v0 = source(e0): fine, and idempotent
        network.add_successor(e3, e0).unwrap();
        assert_eq!(network.get_successors(e3), &[e0]);
        // target(e0) = v1 != source(e3) = v2
        assert!(network.add_successor(e0, e3).is_err());
        assert!(network.add_successor(e2, e2).is_err());
    }

    #[test]
    fn test_sections() {
        let mut network = Network::new();
        network.add_vertex("v0", VertexType::Ttd).unwrap();
        network.add_vertex("v1", VertexType::NoBorder).unwrap();
        network.add_vertex("v20", VertexType::Ttd).unwrap();
        network.add_vertex("v21", VertexType::NoBorder).unwrap();
        network.add_vertex("v30", VertexType::NoBorder).unwrap();
        network.add_vertex("v31", VertexType::Vss).unwrap();
        network.add_vertex("v4", VertexType::Ttd).unwrap();
        network.add_vertex("v5", VertexType::Vss).unwrap();
        network.add_vertex("v6", VertexType::NoBorderVSS).unwrap();
        network.add_vertex("v7", VertexType::Ttd).unwrap();

        let v0_v1 = network.add_edge_by_names("v0", "v1", 1.0, 1.0, false, 0.0).unwrap();
        let v1_v20 = network.add_edge_by_names("v1", "v20", 1.0, 1.0, false, 0.0).unwrap();
        let v20_v30 = network.add_edge_by_names("v20", "v30", 1.0, 1.0, false, 0.0).unwrap();
        let v30_v4 = network.add_edge_by_names("v30", "v4", 1.0, 1.0, false, 0.0).unwrap();
        let v4_v5 = network.add_edge_by_names("v4", "v5", 1.0, 1.0, false, 0.0).unwrap();
        let v5_v6 = network.add_edge_by_names("v5", "v6", 1.0, 1.0, false, 0.0).unwrap();
        let v6_v7 = network.add_edge_by_names("v6", "v7", 1.0, 1.0, false, 0.0).unwrap();
        let v7_v6 = network.add_edge_by_names("v7", "v6", 1.0, 1.0, false, 0.0).unwrap();
        let v6_v5 = network.add_edge_by_names("v6", "v5", 1.0, 1.0, false, 0.0).unwrap();
        let v5_v4 = network.add_edge_by_names("v5", "v4", 1.0, 1.0, false, 0.0).unwrap();
        network.add_edge_by_names("v4", "v31", 1.0, 1.0, true, 0.5).unwrap();
        let v31_v21 = network.add_edge_by_names("v31", "v21", 1.0, 1.0, false, 0.0).unwrap();
        let v21_v1 = network.add_edge_by_names("v21", "v1", 1.0, 1.0, false, 0.0).unwrap();
        let v1_v0 = network.add_edge_by_names("v1", "v0", 1.0, 1.0, false, 0.0).unwrap();

        let vss_sections = network.no_border_vss_sections();
        assert_eq!(vss_sections.len(), 1);
        let mut s = vss_sections[0].clone();
        s.sort();
        let mut expected = vec![v5_v6, v6_v7, v7_v6, v6_v5];
        expected.sort();
        assert_eq!(s, expected);

        let pair1 = (v5_v6, Some(v6_v5));
        let pair2 = (v6_v7, Some(v7_v6));
        assert_eq!(network.common_vertex(pair1, pair2), network.get_vertex_index("v6").ok());

        let mut sections = network.unbreakable_sections();
        assert_eq!(sections.len(), 3);
        for s in sections.iter_mut() {
            s.sort();
        }
        let find = |sections: &[Vec<EdgeId>], e: EdgeId| {
            sections.iter().position(|s| s.contains(&e)).unwrap()
        };
        let s0 = find(&sections, v0_v1);
        let s1 = find(&sections, v20_v30);
        let s2 = find(&sections, v4_v5);
        assert_ne!(s0, s1);
        assert_ne!(s0, s2);
        assert_ne!(s1, s2);
        let mut expected0 = vec![v0_v1, v1_v20, v31_v21, v21_v1, v1_v0];
        expected0.sort();
        assert_eq!(sections[s0], expected0);
        let mut expected1 = vec![v20_v30, v30_v4];
        expected1.sort();
        assert_eq!(sections[s1], expected1);
        let mut expected2 = vec![v4_v5, v5_v4];
        expected2.sort();
        assert_eq!(sections[s2], expected2);

        // The partition covers each eligible edge exactly once.
        let total: usize = sections.iter().map(|s| s.len()).sum();
        assert_eq!(total, 9);
    }

    #[test]
    fn test_transformation_consistency() {
        let mut network = Network::new();
        let v0 = network.add_vertex("v0", VertexType::Ttd).unwrap();
        let v1 = network.add_vertex("v1", VertexType::NoBorderVSS).unwrap();
        network.add_vertex("v2", VertexType::Ttd).unwrap();
        network.add_vertex("v3", VertexType::Vss).unwrap();
        network.add_edge_by_names("v0", "v1", 100.0, 100.0, false, 0.0).unwrap();
        network.add_edge_by_names("v1", "v2", 100.0, 100.0, false, 0.0).unwrap();
        network.add_edge_by_names("v1", "v3", 100.0, 100.0, false, 0.0).unwrap();
        let _ = v0;

        // v1 branches out twice, not a plain through-point
        assert!(!network.is_consistent_for_transformation());
        network.change_vertex_type(v1, VertexType::NoBorder).unwrap();
        assert!(network.is_consistent_for_transformation());

        network.add_vertex("v4", VertexType::NoBorder).unwrap();
        let v5 = network.add_vertex("v5", VertexType::NoBorderVSS).unwrap();
        let v6 = network.add_vertex("v6", VertexType::Vss).unwrap();
        network.add_edge_by_names("v2", "v4", 100.0, 100.0, false, 0.0).unwrap();
        network.add_edge_by_names("v4", "v5", 100.0, 100.0, false, 0.0).unwrap();
        network.add_edge_by_names("v5", "v6", 100.0, 100.0, false, 0.0).unwrap();

        // a NoBorderVSS vertex next to a NoBorder vertex
        assert!(!network.is_consistent_for_transformation());
        network.change_vertex_type(v5, VertexType::NoBorder).unwrap();
        assert!(network.is_consistent_for_transformation());
        let _ = v6;

        let v7 = network.add_vertex("v7", VertexType::Ttd).unwrap();
        let v6_v7 = network.add_edge_by_names("v6", "v7", 100.0, 100.0, true, 0.0).unwrap();
        // breakable without a usable block length
        assert!(!network.is_consistent_for_transformation());
        network.change_edge_min_block_length(v6_v7, 1.0).unwrap();
        assert!(network.is_consistent_for_transformation());

        // breakable edges must run between borders
        network.change_vertex_type(v7, VertexType::NoBorder).unwrap();
        assert!(!network.is_consistent_for_transformation());
        network.change_vertex_type(v7, VertexType::Vss).unwrap();
        assert!(network.is_consistent_for_transformation());

        network.add_vertex("v8", VertexType::Ttd).unwrap();
        let v7_v8 = network.add_edge_by_names("v7", "v8", 100.0, 100.0, false, 0.0).unwrap();
        let v8_v7 = network.add_edge_by_names("v8", "v7", 50.0, 50.0, false, 0.0).unwrap();
        // reverse pair length mismatch
        assert!(!network.is_consistent_for_transformation());
        network.change_edge_length(v8_v7, 100.0).unwrap();
        assert!(network.is_consistent_for_transformation());
        network.change_edge_breakable(v8_v7, true).unwrap();
        assert!(!network.is_consistent_for_transformation());
        let _ = v7_v8;
    }

    fn separation_network(with_reverse: bool) -> (Network, EdgeId, Option<EdgeId>) {
        let mut network = Network::new();
        for name in &["v00", "v01", "v1", "v2", "v30", "v31"] {
            network.add_vertex(name, VertexType::Ttd).unwrap();
        }
        let v00_v1 = network.add_edge_by_names("v00", "v1", 100.0, 100.0, false, 0.0).unwrap();
        let v01_v1 = network.add_edge_by_names("v01", "v1", 100.0, 100.0, false, 0.0).unwrap();
        let v1_v2 = network.add_edge_by_names("v1", "v2", 44.0, 100.0, true, 10.0).unwrap();
        let v2_v30 = network.add_edge_by_names("v2", "v30", 100.0, 100.0, false, 0.0).unwrap();
        let v2_v31 = network.add_edge_by_names("v2", "v31", 100.0, 100.0, false, 0.0).unwrap();
        network.add_successor(v00_v1, v1_v2).unwrap();
        network.add_successor(v01_v1, v1_v2).unwrap();
        network.add_successor(v1_v2, v2_v30).unwrap();
        network.add_successor(v1_v2, v2_v31).unwrap();
        if !with_reverse {
            return (network, v1_v2, None);
        }
        let v1_v00 = network.add_edge_by_names("v1", "v00", 100.0, 100.0, false, 0.0).unwrap();
        let v1_v01 = network.add_edge_by_names("v1", "v01", 100.0, 100.0, false, 0.0).unwrap();
        let v2_v1 = network.add_edge_by_names("v2", "v1", 44.0, 100.0, true, 10.0).unwrap();
        let v30_v2 = network.add_edge_by_names("v30", "v2", 100.0, 100.0, false, 0.0).unwrap();
        let v31_v2 = network.add_edge_by_names("v31", "v2", 100.0, 100.0, false, 0.0).unwrap();
        network.add_successor(v30_v2, v2_v1).unwrap();
        network.add_successor(v31_v2, v2_v1).unwrap();
        network.add_successor(v2_v1, v1_v00).unwrap();
        network.add_successor(v2_v1, v1_v01).unwrap();
        (network, v1_v2, Some(v2_v1))
    }

    #[test]
    fn test_uniform_edge_separation() {
        let (mut network, v1_v2, _) = separation_network(false);
        let (forward, backward) =
            network.separate_edge_by_names("v1", "v2", SeparationType::Uniform).unwrap();

        assert_eq!(forward.len(), 4);
        assert!(backward.is_empty());

        assert_eq!(network.number_of_vertices(), 9);
        for name in &["v1_v2_0", "v1_v2_1", "v1_v2_2"] {
            let v = network.get_vertex_index(name).unwrap();
            assert_eq!(network.get_vertex(v).unwrap().kind, VertexType::NoBorderVSS);
        }

        assert_eq!(network.number_of_edges(), 8);
        assert!(!network.has_edge_by_names("v1", "v2"));
        for (s, t) in &[
            ("v1", "v1_v2_0"),
            ("v1_v2_0", "v1_v2_1"),
            ("v1_v2_1", "v1_v2_2"),
            ("v1_v2_2", "v2"),
        ] {
            let e = network.get_edge_index_by_names(s, t).unwrap();
            let edge = network.get_edge(e).unwrap();
            assert_eq!(edge.length, 11.0);
            assert_eq!(edge.max_speed, 100.0);
            assert!(!edge.breakable);
        }

        assert_eq!(forward[0], network.get_edge_index_by_names("v1", "v1_v2_0").unwrap());
        assert_eq!(forward[1], network.get_edge_index_by_names("v1_v2_0", "v1_v2_1").unwrap());
        assert_eq!(forward[2], network.get_edge_index_by_names("v1_v2_1", "v1_v2_2").unwrap());
        assert_eq!(forward[3], network.get_edge_index_by_names("v1_v2_2", "v2").unwrap());
        assert_eq!(*forward.last().unwrap(), v1_v2);

        // Incoming successors now point at the chain head, the chain runs
        // straight through, and the old out-of-v2 successors survive.
        let v00_v1 = network.get_edge_index_by_names("v00", "v1").unwrap();
        assert_eq!(network.get_successors(v00_v1), &[forward[0]]);
        assert_eq!(network.get_successors(forward[0]), &[forward[1]]);
        assert_eq!(network.get_successors(forward[1]), &[forward[2]]);
        assert_eq!(network.get_successors(forward[2]), &[forward[3]]);
        let mut after = network.get_successors(forward[3]).to_vec();
        after.sort();
        let mut expected_after = vec![
            network.get_edge_index_by_names("v2", "v30").unwrap(),
            network.get_edge_index_by_names("v2", "v31").unwrap(),
        ];
        expected_after.sort();
        assert_eq!(after, expected_after);
    }

    #[test]
    fn test_uniform_edge_separation_reverse() {
        let (mut network, v1_v2, v2_v1) = separation_network(true);
        let v2_v1 = v2_v1.unwrap();
        let (forward, backward) =
            network.separate_edge_by_names("v1", "v2", SeparationType::Uniform).unwrap();

        assert_eq!(forward.len(), 4);
        assert_eq!(backward.len(), 4);
        assert_eq!(network.number_of_vertices(), 9);
        assert_eq!(network.number_of_edges(), 16);
        assert!(!network.has_edge_by_names("v1", "v2"));
        assert!(!network.has_edge_by_names("v2", "v1"));

        assert_eq!(*forward.last().unwrap(), v1_v2);
        assert_eq!(*backward.last().unwrap(), v2_v1);
        assert_eq!(backward[0], network.get_edge_index_by_names("v2", "v1_v2_2").unwrap());
        assert_eq!(backward[1], network.get_edge_index_by_names("v1_v2_2", "v1_v2_1").unwrap());
        assert_eq!(backward[2], network.get_edge_index_by_names("v1_v2_1", "v1_v2_0").unwrap());
        assert_eq!(backward[3], network.get_edge_index_by_names("v1_v2_0", "v1").unwrap());

        for (s, t) in &[
            ("v2", "v1_v2_2"),
            ("v1_v2_2", "v1_v2_1"),
            ("v1_v2_1", "v1_v2_0"),
            ("v1_v2_0", "v1"),
        ] {
            let e = network.get_edge_index_by_names(s, t).unwrap();
            let edge = network.get_edge(e).unwrap();
            assert_eq!(edge.length, 11.0);
            assert!(!edge.breakable);
        }

        let v30_v2 = network.get_edge_index_by_names("v30", "v2").unwrap();
        assert_eq!(network.get_successors(v30_v2), &[backward[0]]);
        assert_eq!(network.get_successors(backward[0]), &[backward[1]]);
        assert_eq!(network.get_successors(backward[2]), &[backward[3]]);
        let mut after = network.get_successors(backward[3]).to_vec();
        after.sort();
        let mut expected_after = vec![
            network.get_edge_index_by_names("v1", "v00").unwrap(),
            network.get_edge_index_by_names("v1", "v01").unwrap(),
        ];
        expected_after.sort();
        assert_eq!(after, expected_after);

        // Reverse pairing still holds along the whole chain.
        for (f, b) in forward.iter().zip(backward.iter().rev()) {
            assert_eq!(network.get_reverse_edge_index(*f), Some(*b));
        }
    }

    #[test]
    fn test_combine_reverse_edges() {
        let mut network = Network::new();
        for name in &["v0", "v1", "v2", "v3", "v4", "v5"] {
            network.add_vertex(name, VertexType::Ttd).unwrap();
        }
        let v0_v1 = network.add_edge_by_names("v0", "v1", 100.0, 100.0, false, 0.0).unwrap();
        let v2_v1 = network.add_edge_by_names("v2", "v1", 100.0, 100.0, false, 0.0).unwrap();
        let v1_v0 = network.add_edge_by_names("v1", "v0", 100.0, 100.0, false, 0.0).unwrap();
        let v1_v2 = network.add_edge_by_names("v1", "v2", 100.0, 100.0, false, 0.0).unwrap();
        let v2_v3 = network.add_edge_by_names("v2", "v3", 100.0, 100.0, false, 0.0).unwrap();
        let v3_v4 = network.add_edge_by_names("v3", "v4", 100.0, 100.0, false, 0.0).unwrap();
        let v4_v3 = network.add_edge_by_names("v4", "v3", 100.0, 100.0, false, 0.0).unwrap();
        network.add_edge_by_names("v4", "v5", 100.0, 100.0, false, 0.0).unwrap();
        network.add_edge_by_names("v5", "v4", 100.0, 100.0, false, 0.0).unwrap();

        let to_combine = vec![v3_v4, v4_v3, v2_v1, v1_v2, v1_v0, v0_v1, v2_v3];
        let combined = network.combine_reverse_edges(&to_combine, true).unwrap();
        let expected = vec![
            (v0_v1, Some(v1_v0)),
            (v2_v1, Some(v1_v2)),
            (v2_v3, None),
            (v3_v4, Some(v4_v3)),
        ];
        // Each pair is oriented by ascending endpoint index.
        let expected = expected
            .into_iter()
            .map(|(a, b)| {
                let edge = network.get_edge(a).unwrap();
                if edge.source < edge.target {
                    (a, b)
                } else {
                    (b.unwrap(), Some(a))
                }
            })
            .collect::<Vec<_>>();
        assert_eq!(combined, expected);
    }

    #[test]
    fn test_floyd_warshall() {
        let mut network = Network::new();
        for name in &["v1", "v2", "v3", "v4", "v5", "v6"] {
            network.add_vertex(name, VertexType::Ttd).unwrap();
        }
        let v1_v2 = network.add_edge_by_names("v1", "v2", 100.0, 10.0, false, 0.0).unwrap();
        let v2_v3 = network.add_edge_by_names("v2", "v3", 200.0, 10.0, false, 0.0).unwrap();
        let v3_v2 = network.add_edge_by_names("v3", "v2", 200.0, 10.0, false, 0.0).unwrap();
        let v3_v4 = network.add_edge_by_names("v3", "v4", 300.0, 10.0, false, 0.0).unwrap();
        let v4_v3 = network.add_edge_by_names("v4", "v3", 300.0, 10.0, false, 0.0).unwrap();
        let v4_v5 = network.add_edge_by_names("v4", "v5", 400.0, 10.0, false, 0.0).unwrap();
        let v5_v4 = network.add_edge_by_names("v5", "v4", 400.0, 10.0, false, 0.0).unwrap();
        let v4_v1 = network.add_edge_by_names("v4", "v1", 500.0, 10.0, false, 0.0).unwrap();
        let v3_v5 = network.add_edge_by_names("v3", "v5", 500.0, 10.0, false, 0.0).unwrap();
        let v5_v6 = network.add_edge_by_names("v5", "v6", 1000.0, 10.0, false, 0.0).unwrap();
        let v6_v5 = network.add_edge_by_names("v6", "v5", 1000.0, 10.0, false, 0.0).unwrap();

        network.add_successor(v1_v2, v2_v3).unwrap();
        network.add_successor(v2_v3, v3_v4).unwrap();
        network.add_successor(v2_v3, v3_v5).unwrap();
        network.add_successor(v3_v4, v4_v5).unwrap();
        network.add_successor(v3_v4, v4_v1).unwrap();
        network.add_successor(v4_v3, v3_v2).unwrap();
        network.add_successor(v4_v5, v5_v6).unwrap();
        network.add_successor(v5_v4, v4_v3).unwrap();
        network.add_successor(v4_v1, v1_v2).unwrap();
        network.add_successor(v3_v5, v5_v6).unwrap();
        network.add_successor(v6_v5, v5_v4).unwrap();

        let d = network.all_edge_pairs_shortest_paths();

        assert_eq!(d[v1_v2][v1_v2], 0.0);
        assert_eq!(d[v1_v2][v2_v3], 200.0);
        assert_eq!(d[v1_v2][v3_v4], 500.0);
        assert_eq!(d[v1_v2][v3_v5], 700.0);
        assert_eq!(d[v1_v2][v4_v5], 900.0);
        assert_eq!(d[v1_v2][v5_v6], 1700.0);
        assert_eq!(d[v1_v2][v4_v1], 1000.0);
        assert_eq!(d[v1_v2][v3_v2], INF);
        assert_eq!(d[v1_v2][v6_v5], INF);

        assert_eq!(d[v3_v4][v1_v2], 600.0);
        assert_eq!(d[v3_v4][v2_v3], 800.0);
        assert_eq!(d[v3_v4][v3_v5], 1300.0);

        assert_eq!(d[v4_v1][v1_v2], 100.0);
        assert_eq!(d[v4_v1][v5_v6], 1800.0);

        assert_eq!(d[v6_v5][v5_v4], 400.0);
        assert_eq!(d[v6_v5][v4_v3], 700.0);
        assert_eq!(d[v6_v5][v3_v2], 900.0);
        assert_eq!(d[v5_v6][v3_v2], INF);

        // Floyd-Warshall fixed point: no relaxation is possible afterwards.
        let n = network.number_of_edges();
        for a in 0..n {
            for b in 0..n {
                for c in 0..n {
                    if d[a][b] < INF && d[b][c] < INF {
                        assert!(d[a][c] <= d[a][b] + d[b][c] + 1e-9);
                    }
                }
            }
        }
    }

    #[test]
    fn test_discretize_rewrites_both_directions() {
        let (mut network, v1_v2, v2_v1) = separation_network(true);
        let rewrites = network.discretize(SeparationType::Uniform).unwrap();
        assert_eq!(rewrites.len(), 2);
        assert_eq!(rewrites[0].0, v1_v2);
        assert_eq!(rewrites[1].0, v2_v1.unwrap());
        assert_eq!(rewrites[0].1.len(), 4);
        assert_eq!(rewrites[1].1.len(), 4);
        // Chain lengths add up to the replaced edge length.
        let total: f64 = rewrites[0]
            .1
            .iter()
            .map(|&e| network.get_edge(e).unwrap().length)
            .sum();
        assert!((total - 44.0).abs() < 1e-9);
        assert!(network.breakable_edges().is_empty());
    }
}
