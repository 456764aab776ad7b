//! Moving-block MIP assembly: trains occupy a dynamic envelope instead of
//! fixed blocks, so the model routes each train over edge-usage variables
//! with velocity-extended copies that keep speed profiles kinematically
//! feasible, plus relative-order variables per edge and TTD section.

use log::{debug, info};

use crate::instance::VssGenerationTimetable;
use crate::planner::eom::possible_by_eom;
use crate::planner::model::{LinExpr, Model, MultiArray, Sense};
use crate::planner::{ModelDetail, SolverStatus, VelocityRefinementStrategy};
use crate::railway::{EdgeId, TrainId};
use crate::{RailError, Result};

#[derive(Debug)]
pub struct MovingBlockModel {
    pub model: Model,
    /// Edge used by train: `(tr, e)`.
    pub x: MultiArray,
    /// Velocity-extended edge usage: `(tr, e, i, j)`.
    pub y: MultiArray,
    /// Relative order of two trains on an edge: `(tr1, tr2, e)`.
    pub order: MultiArray,
    /// TTD section used / ordered: `(tr, ttd)` and `(tr1, tr2, ttd)`.
    pub x_ttd: MultiArray,
    pub order_ttd: MultiArray,
    /// Timing variables per vertex or TTD section.
    pub t_front_arrival: MultiArray,
    pub t_front_departure: MultiArray,
    pub t_rear_departure: MultiArray,
    pub t_ttd_departure: MultiArray,
    /// Stop realisation: `(tr, stop, v)`.
    pub stop: MultiArray,
    pub velocity_extensions: Vec<Vec<Vec<f64>>>,
    pub ttd_sections: Vec<Vec<EdgeId>>,
}

pub struct MovingBlockModelBuilder<'a> {
    instance: &'a VssGenerationTimetable,
    detail: ModelDetail,
}

impl<'a> MovingBlockModelBuilder<'a> {
    pub fn new(instance: &'a VssGenerationTimetable, detail: ModelDetail) -> Self {
        MovingBlockModelBuilder { instance, detail }
    }

    pub fn solve(
        &self,
        time_limit: Option<u64>,
        debug_output: bool,
    ) -> Result<(MovingBlockModel, SolverStatus)> {
        if !self.instance.network.is_consistent_for_transformation() {
            return Err(RailError::Consistency(
                "instance is not consistent for transformation".to_string(),
            ));
        }
        info!("create moving block model");
        let built = self.build()?;
        info!(
            "model assembled with {} variables and {} constraints",
            built.model.num_variables(),
            built.model.num_constraints()
        );
        if debug_output {
            for c in built.model.constraints() {
                debug!("constraint {}", c.name);
            }
        }
        Ok((built, SolverStatus::NotSolved { time_limit }))
    }

    pub fn build(&self) -> Result<MovingBlockModel> {
        let network = &self.instance.network;
        let timetable = &self.instance.timetable;
        let num_tr = timetable.get_train_list().size();
        let num_edges = network.number_of_edges();
        let num_vertices = network.number_of_vertices();
        let max_t = self.instance.max_t() as f64;

        let ttd_sections = network.unbreakable_sections();
        let num_ttd = ttd_sections.len();
        let velocity_extensions = self.velocity_extensions()?;
        let max_vel = velocity_extensions
            .iter()
            .flat_map(|per_vertex| per_vertex.iter().map(|v| v.len()))
            .max()
            .unwrap_or(0);
        let max_stops = (0..num_tr)
            .map(|tr| timetable.get_schedule(tr).map(|s| s.stops.len()).unwrap_or(0))
            .max()
            .unwrap_or(0);

        let mut model = Model::new();
        let mut x = MultiArray::new(&[num_tr, num_edges]);
        let mut y = MultiArray::new(&[num_tr, num_edges, max_vel, max_vel]);
        let mut order = MultiArray::new(&[num_tr, num_tr, num_edges]);
        let mut x_ttd = MultiArray::new(&[num_tr, num_ttd]);
        let mut order_ttd = MultiArray::new(&[num_tr, num_tr, num_ttd]);
        let mut t_front_arrival = MultiArray::new(&[num_tr, num_vertices]);
        let mut t_front_departure = MultiArray::new(&[num_tr, num_vertices]);
        let mut t_rear_departure = MultiArray::new(&[num_tr, num_vertices]);
        let mut t_ttd_departure = MultiArray::new(&[num_tr, num_ttd]);
        let mut stop = MultiArray::new(&[num_tr, max_stops, num_vertices]);

        // Timing variables over the vertices and sections each train can use.
        for tr in 0..num_tr {
            let train = timetable.get_train(tr)?;
            let leaving_time = self.approximate_leaving_time(tr)?;
            for v in self.instance.vertices_used_by_train(tr, self.detail.fix_routes)? {
                let vertex = &network.get_vertex(v)?.name;
                t_front_arrival.set(
                    &[tr, v],
                    model.add_continuous(format!("t_front_arrival_{}_{}", train.name, vertex), 0.0, max_t),
                );
                t_front_departure.set(
                    &[tr, v],
                    model.add_continuous(
                        format!("t_front_departure_{}_{}", train.name, vertex),
                        0.0,
                        max_t + leaving_time,
                    ),
                );
                t_rear_departure.set(
                    &[tr, v],
                    model.add_continuous(
                        format!("t_rear_departure_{}_{}", train.name, vertex),
                        0.0,
                        max_t + leaving_time,
                    ),
                );
            }
            for ttd in self.instance.sections_used_by_train(tr, &ttd_sections, self.detail.fix_routes)? {
                t_ttd_departure.set(
                    &[tr, ttd],
                    model.add_continuous(
                        format!("t_ttd_departure_{}_{}", train.name, ttd),
                        0.0,
                        max_t + leaving_time,
                    ),
                );
                x_ttd.set(
                    &[tr, ttd],
                    model.add_binary(format!("x_ttd_{}_{}", train.name, ttd)),
                );
            }
        }

        // Edge usage and velocity-extended usage.
        for tr in 0..num_tr {
            let train = timetable.get_train(tr)?;
            for e in self.instance.edges_used_by_train(tr, self.detail.fix_routes)? {
                let edge = network.get_edge(e)?;
                x.set(&[tr, e], model.add_binary(format!("x_{}_{}", train.name, e)));
                let v1_values = &velocity_extensions[tr][edge.source];
                let v2_values = &velocity_extensions[tr][edge.target];
                for (i, &v1) in v1_values.iter().enumerate() {
                    for (j, &v2) in v2_values.iter().enumerate() {
                        if possible_by_eom(v1, v2, train.acceleration, train.deceleration, edge.length) {
                            y.set(
                                &[tr, e, i, j],
                                model.add_binary(format!("y_{}_{}_{}_{}", train.name, e, i, j)),
                            );
                        }
                    }
                }
            }
        }

        // Relative order of train pairs sharing an edge or a TTD section.
        for e in 0..num_edges {
            let trains_on_e = self.instance.trains_on_edge(e, self.detail.fix_routes)?;
            for &tr1 in &trains_on_e {
                for &tr2 in &trains_on_e {
                    if tr1 != tr2 {
                        order.set(
                            &[tr1, tr2, e],
                            model.add_binary(format!("order_{}_{}_{}", tr1, tr2, e)),
                        );
                    }
                }
            }
        }
        let mut sections_by_train = Vec::with_capacity(num_tr);
        for tr in 0..num_tr {
            sections_by_train
                .push(self.instance.sections_used_by_train(tr, &ttd_sections, self.detail.fix_routes)?);
        }
        for ttd in 0..num_ttd {
            let trains_in_ttd: Vec<TrainId> =
                (0..num_tr).filter(|&tr| sections_by_train[tr].contains(&ttd)).collect();
            for &tr1 in &trains_in_ttd {
                for &tr2 in &trains_in_ttd {
                    if tr1 != tr2 {
                        order_ttd.set(
                            &[tr1, tr2, ttd],
                            model.add_binary(format!("order_ttd_{}_{}_{}", tr1, tr2, ttd)),
                        );
                    }
                }
            }
        }

        // Stop realisation variables over the candidate halt vertices.
        for tr in 0..num_tr {
            let train = timetable.get_train(tr)?;
            let edges = self.instance.edges_used_by_train(tr, self.detail.fix_routes)?;
            let schedule = timetable.get_schedule(tr)?;
            for (s, scheduled_stop) in schedule.stops.iter().enumerate() {
                for v in
                    self.instance.possible_stop_vertices(tr, &scheduled_stop.station, &edges)?
                {
                    stop.set(
                        &[tr, s, v],
                        model.add_binary(format!("stop_{}_{}_{}", train.name, s, v)),
                    );
                }
            }
        }

        self.set_objective(&mut model, &t_rear_departure)?;
        self.create_general_path_constraints(&mut model, &x, &y, &velocity_extensions)?;

        Ok(MovingBlockModel {
            model,
            x,
            y,
            order,
            x_ttd,
            order_ttd,
            t_front_arrival,
            t_front_departure,
            t_rear_departure,
            t_ttd_departure,
            stop,
            velocity_extensions,
            ttd_sections,
        })
    }

    /// Weighted deviation of each train's rear clearing its exit vertex from
    /// the earliest scheduled exit time.
    fn set_objective(&self, model: &mut Model, t_rear_departure: &MultiArray) -> Result<()> {
        let timetable = &self.instance.timetable;
        let mut objective = LinExpr::new();
        for tr in 0..timetable.get_train_list().size() {
            let schedule = timetable.get_schedule(tr)?;
            if let Some(var) = t_rear_departure.get(&[tr, schedule.exit]) {
                objective.add_term(var, 1.0);
                objective.add_constant(-(schedule.t_n.0 as f64));
            }
        }
        model.set_objective(objective);
        Ok(())
    }

    /// Path constraints: edge aggregation over velocity extensions, unit
    /// degree at entry and exit, and per-speed-level flow conservation at
    /// interior vertices.
    fn create_general_path_constraints(
        &self,
        model: &mut Model,
        x: &MultiArray,
        y: &MultiArray,
        velocity_extensions: &[Vec<Vec<f64>>],
    ) -> Result<()> {
        let network = &self.instance.network;
        let timetable = &self.instance.timetable;
        for tr in 0..timetable.get_train_list().size() {
            let train = timetable.get_train(tr)?;
            let edges_used = self.instance.edges_used_by_train(tr, self.detail.fix_routes)?;

            for &e in &edges_used {
                let edge = network.get_edge(e)?;
                let mut expr = LinExpr::var(x.get(&[tr, e]).unwrap());
                let v1_values = &velocity_extensions[tr][edge.source];
                let v2_values = &velocity_extensions[tr][edge.target];
                for i in 0..v1_values.len() {
                    for j in 0..v2_values.len() {
                        if let Some(var) = y.get(&[tr, e, i, j]) {
                            expr.add_term(var, -1.0);
                        }
                    }
                }
                model.add_constr(
                    expr,
                    Sense::Eq,
                    0.0,
                    format!(
                        "aggregate_edge_velocity_extension_{}_{}-{}",
                        train.name,
                        network.get_vertex(edge.source)?.name,
                        network.get_vertex(edge.target)?.name
                    ),
                );
            }

            let schedule = timetable.get_schedule(tr)?;
            for v in self.instance.vertices_used_by_train(tr, self.detail.fix_routes)? {
                let vertex_name = &network.get_vertex(v)?.name;
                if v == schedule.entry {
                    let expr = self.degree_expr(x, tr, network.out_edges(v), &edges_used);
                    model.add_constr(
                        expr,
                        Sense::Eq,
                        1.0,
                        format!("entry_vertex_{}_{}", train.name, vertex_name),
                    );
                } else if v == schedule.exit {
                    let expr = self.degree_expr(x, tr, network.in_edges(v), &edges_used);
                    model.add_constr(
                        expr,
                        Sense::Eq,
                        1.0,
                        format!("exit_vertex_{}_{}", train.name, vertex_name),
                    );
                } else {
                    let in_expr = self.degree_expr(x, tr, network.in_edges(v), &edges_used);
                    let out_expr = self.degree_expr(x, tr, network.out_edges(v), &edges_used);
                    model.add_constr(
                        in_expr,
                        Sense::Le,
                        1.0,
                        format!("in_edges_{}_{}", train.name, vertex_name),
                    );
                    model.add_constr(
                        out_expr,
                        Sense::Le,
                        1.0,
                        format!("out_edges_{}_{}", train.name, vertex_name),
                    );

                    let v_values = &velocity_extensions[tr][v];
                    for (i, &level) in v_values.iter().enumerate() {
                        let mut expr = LinExpr::new();
                        for &e in network.in_edges(v) {
                            if !edges_used.contains(&e) {
                                continue;
                            }
                            let source = network.get_edge(e)?.source;
                            for j in 0..velocity_extensions[tr][source].len() {
                                if let Some(var) = y.get(&[tr, e, j, i]) {
                                    expr.add_term(var, 1.0);
                                }
                            }
                        }
                        for &e in network.out_edges(v) {
                            if !edges_used.contains(&e) {
                                continue;
                            }
                            let target = network.get_edge(e)?.target;
                            for j in 0..velocity_extensions[tr][target].len() {
                                if let Some(var) = y.get(&[tr, e, i, j]) {
                                    expr.add_term(var, -1.0);
                                }
                            }
                        }
                        if !expr.is_empty() {
                            model.add_constr(
                                expr,
                                Sense::Eq,
                                0.0,
                                format!(
                                    "vertex_velocity_extension_flow_condition_{}_{}_{}",
                                    train.name, vertex_name, level
                                ),
                            );
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn degree_expr(&self, x: &MultiArray, tr: TrainId, edges: &[EdgeId], used: &[EdgeId]) -> LinExpr {
        let mut expr = LinExpr::new();
        for &e in edges {
            if used.contains(&e) {
                if let Some(var) = x.get(&[tr, e]) {
                    expr.add_term(var, 1.0);
                }
            }
        }
        expr
    }

    /// Upper bound on the time the full train needs to clear a vertex after
    /// its front has departed, assuming a worst-case crawl of 1 m/s.
    fn approximate_leaving_time(&self, tr: TrainId) -> Result<f64> {
        Ok(self.instance.timetable.get_train(tr)?.length)
    }

    /// Discrete speed levels per train and vertex. The entry vertex carries
    /// only the scheduled entry speed.
    pub fn velocity_extensions(&self) -> Result<Vec<Vec<Vec<f64>>>> {
        match self.detail.velocity_refinement_strategy {
            VelocityRefinementStrategy::None => self.velocity_extensions_none(),
            VelocityRefinementStrategy::MinOneStep => self.velocity_extensions_min_one_step(),
        }
    }

    fn velocity_extensions_none(&self) -> Result<Vec<Vec<Vec<f64>>>> {
        let network = &self.instance.network;
        let timetable = &self.instance.timetable;
        let num_tr = timetable.get_train_list().size();
        let mut extensions = Vec::with_capacity(num_tr);
        for tr in 0..num_tr {
            let train = timetable.get_train(tr)?;
            let schedule = timetable.get_schedule(tr)?;
            let edges = self.instance.edges_used_by_train(tr, self.detail.fix_routes)?;
            let mut per_vertex = Vec::with_capacity(network.number_of_vertices());
            for v in 0..network.number_of_vertices() {
                if v == schedule.entry {
                    per_vertex.push(vec![schedule.v_0]);
                    continue;
                }
                let max_vertex_speed =
                    network.maximal_vertex_speed(v, &edges).min(train.max_speed);
                let mut levels = vec![0.0];
                let mut speed: f64 = 0.0;
                while speed < max_vertex_speed {
                    speed = (speed + self.detail.max_velocity_delta).min(max_vertex_speed);
                    levels.push(speed);
                }
                per_vertex.push(levels);
            }
            extensions.push(per_vertex);
        }
        Ok(extensions)
    }

    fn velocity_extensions_min_one_step(&self) -> Result<Vec<Vec<Vec<f64>>>> {
        let network = &self.instance.network;
        let timetable = &self.instance.timetable;
        let num_tr = timetable.get_train_list().size();
        let mut extensions = Vec::with_capacity(num_tr);
        for tr in 0..num_tr {
            let train = timetable.get_train(tr)?;
            let schedule = timetable.get_schedule(tr)?;
            let edges = self.instance.edges_used_by_train(tr, self.detail.fix_routes)?;
            let speed_change = train.acceleration.min(train.deceleration);
            let mut per_vertex = Vec::with_capacity(network.number_of_vertices());
            for v in 0..network.number_of_vertices() {
                if v == schedule.entry {
                    per_vertex.push(vec![schedule.v_0]);
                    continue;
                }
                let max_vertex_speed =
                    network.maximal_vertex_speed(v, &edges).min(train.max_speed);
                let mut min_n_length = network.minimal_neighboring_edge_length(v);
                if min_n_length > train.length && schedule.exit == v {
                    min_n_length = train.length;
                }
                let mut levels = vec![0.0];
                let mut speed: f64 = 0.0;
                while speed < max_vertex_speed {
                    speed = (speed + self.detail.max_velocity_delta)
                        .min((speed * speed + 2.0 * speed_change * min_n_length).sqrt())
                        .min(max_vertex_speed);
                    levels.push(speed);
                }
                per_vertex.push(levels);
            }
            extensions.push(per_vertex);
        }
        Ok(extensions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::fixtures::simple_station_instance;
    use crate::railway::network::{Network, VertexType};
    use crate::railway::routes::RouteMap;
    use crate::railway::timetable::Timetable;

    #[test]
    fn test_min_one_step_velocity_extensions() {
        // A middle vertex between two 50 m edges; train caps at 30 m/s.
        let mut network = Network::new();
        for name in &["a", "m", "b"] {
            network.add_vertex(name, VertexType::Ttd).unwrap();
        }
        network.add_edge_by_names("a", "m", 50.0, 30.0, false, 0.0).unwrap();
        network.add_edge_by_names("m", "b", 50.0, 30.0, false, 0.0).unwrap();
        let mut timetable = Timetable::new();
        timetable
            .add_train("tr1", 100.0, 30.0, 1.0, 1.0, 0, 0.0, "a", 600, 0.0, "b", &network)
            .unwrap();
        let instance = VssGenerationTimetable::new(network, timetable, RouteMap::new());
        let builder = MovingBlockModelBuilder::new(
            &instance,
            ModelDetail {
                fix_routes: false,
                velocity_refinement_strategy: VelocityRefinementStrategy::MinOneStep,
                max_velocity_delta: 5.0,
            },
        );
        let extensions = builder.velocity_extensions().unwrap();
        let m = instance.network.get_vertex_index("m").unwrap();
        let levels = &extensions[0][m];

        // Levels grow by at most delta and at most the one-edge reachability
        // bound sqrt(v^2 + 2 a l).
        assert_eq!(levels[0], 0.0);
        assert_eq!(levels[1], 5.0);
        assert_eq!(levels[2], 10.0);
        assert!((levels[3] - 200f64.sqrt()).abs() < 1e-9);
        assert!((levels[4] - 300f64.sqrt()).abs() < 1e-9);
        assert_eq!(*levels.last().unwrap(), 30.0);
        for pair in levels.windows(2) {
            assert!(pair[1] > pair[0]);
            assert!(pair[1] - pair[0] <= 5.0 + 1e-9);
            assert!(pair[1] * pair[1] - pair[0] * pair[0] <= 2.0 * 50.0 + 1e-6);
        }

        // The entry vertex only carries the scheduled entry speed.
        let a = instance.network.get_vertex_index("a").unwrap();
        assert_eq!(extensions[0][a], vec![0.0]);
    }

    #[test]
    fn test_moving_block_model_on_fixed_route() {
        let instance = simple_station_instance();
        let builder = MovingBlockModelBuilder::new(&instance, ModelDetail::default());
        let (built, status) = builder.solve(Some(60), false).unwrap();
        assert_eq!(status, SolverStatus::NotSolved { time_limit: Some(60) });

        let network = &instance.network;
        let route = instance.routes.get_route("tr1").unwrap();

        // tr1 (fixed route): an x variable exactly for each route edge.
        for e in 0..network.number_of_edges() {
            let expected = route.contains_edge(e);
            assert_eq!(built.x.get(&[0, e]).is_some(), expected, "edge {}", e);
        }

        // Entry and exit unit-degree constraints exist for both trains.
        for name in &["tr1", "tr2"] {
            assert!(built
                .model
                .find_constraint(&format!("entry_vertex_{}_l0", name))
                .is_some());
            assert!(built
                .model
                .find_constraint(&format!("exit_vertex_{}_r0", name))
                .is_some());
        }

        // Each used edge aggregates into at least one feasible velocity pair.
        let first_edge = route.edges()[0];
        let agg = built
            .model
            .find_constraint("aggregate_edge_velocity_extension_tr1_l0-l1")
            .unwrap();
        assert!(agg.expr.terms.len() > 1);
        assert_eq!(agg.expr.terms[0].0, built.x.get(&[0, first_edge]).unwrap());

        // The objective charges each train's rear departure at its exit.
        let objective = built.model.objective();
        assert_eq!(objective.terms.len(), 2);
        assert_eq!(objective.constant, -(645.0 + 420.0));
    }

    #[test]
    fn test_y_variables_respect_eom() {
        let instance = simple_station_instance();
        let builder = MovingBlockModelBuilder::new(&instance, ModelDetail::default());
        let built = builder.build().unwrap();

        let network = &instance.network;
        let timetable = &instance.timetable;
        for tr in 0..timetable.get_train_list().size() {
            let train = timetable.get_train(tr).unwrap();
            for e in 0..network.number_of_edges() {
                if built.x.get(&[tr, e]).is_none() {
                    continue;
                }
                let edge = network.get_edge(e).unwrap();
                let v1_values = &built.velocity_extensions[tr][edge.source];
                let v2_values = &built.velocity_extensions[tr][edge.target];
                for (i, &v1) in v1_values.iter().enumerate() {
                    for (j, &v2) in v2_values.iter().enumerate() {
                        let feasible = possible_by_eom(
                            v1,
                            v2,
                            train.acceleration,
                            train.deceleration,
                            edge.length,
                        );
                        assert_eq!(built.y.get(&[tr, e, i, j]).is_some(), feasible);
                    }
                }
            }
        }
    }

    #[test]
    fn test_inconsistent_instance_is_rejected() {
        let mut instance = simple_station_instance();
        // A breakable edge without a usable block length breaks the
        // transformation preconditions.
        let e = instance.network.get_edge_index_by_names("l1", "l2").unwrap();
        instance.network.change_edge_breakable(e, true).unwrap();
        let builder = MovingBlockModelBuilder::new(&instance, ModelDetail::default());
        match builder.solve(None, false) {
            Err(RailError::Consistency(_)) => {}
            other => panic!("expected consistency error, got {:?}", other),
        }
    }
}
