//! VSS-generation MIP assembly with free routes: a time-expanded occupation
//! model. Per timestep each train occupies a connected edge path described
//! by entry/exit positions (`e_lda`/`e_mu`) plus the portions hanging in
//! (`len_in`) and out (`len_out`) of the network; candidate section
//! separators on breakable edges get position variables tied to the
//! occupation fronts and rears.

use log::{debug, info};

use crate::instance::VssGenerationTimetable;
use crate::planner::model::{LinExpr, Model, MultiArray, Sense};
use crate::planner::SolverStatus;
use crate::railway::EdgeId;
use crate::{RailError, Result};

#[derive(Debug)]
pub struct VssModel {
    pub model: Model,
    /// Occupation of an edge at a timestep: `(tr, t, e)`.
    pub x: MultiArray,
    /// Occupation of a vertex: `(tr, t, v)`.
    pub x_v: MultiArray,
    /// Velocity at the timestep boundaries: `(tr, t)`.
    pub v: MultiArray,
    /// Occupied interval `[e_lda, e_mu]` on each edge: `(tr, t, e)`.
    pub e_lda: MultiArray,
    pub e_mu: MultiArray,
    /// Occupation shared between consecutive timesteps: `(tr, t, e)`.
    pub overlap: MultiArray,
    /// Train length still outside the network at entry / already out at exit.
    pub len_in: MultiArray,
    pub x_in: MultiArray,
    pub len_out: MultiArray,
    pub x_out: MultiArray,
    /// Candidate separator positions on breakable edges: `(e_idx, vss)`.
    pub b_pos: MultiArray,
    /// Separator is at the train's front / rear: `(tr, t, e_idx, vss)`.
    pub b_front: MultiArray,
    pub b_rear: MultiArray,
    pub breakable_edges: Vec<EdgeId>,
    pub train_interval: Vec<(usize, usize)>,
    pub dt: i64,
}

pub struct VssFreeRoutesModelBuilder<'a> {
    instance: &'a VssGenerationTimetable,
    dt: i64,
}

impl<'a> VssFreeRoutesModelBuilder<'a> {
    pub fn new(instance: &'a VssGenerationTimetable, dt: i64) -> Self {
        VssFreeRoutesModelBuilder { instance, dt }
    }

    pub fn solve(&self, time_limit: Option<u64>, debug_output: bool) -> Result<(VssModel, SolverStatus)> {
        if !self.instance.network.is_consistent_for_transformation() {
            return Err(RailError::Consistency(
                "instance is not consistent for transformation".to_string(),
            ));
        }
        info!("create VSS generation model with free routes");
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

    pub fn build(&self) -> Result<VssModel> {
        if self.dt <= 0 {
            return Err(RailError::InvalidInput("timestep width must be positive".to_string()));
        }
        let network = &self.instance.network;
        let timetable = &self.instance.timetable;
        let num_tr = timetable.get_train_list().size();
        let num_edges = network.number_of_edges();
        let num_vertices = network.number_of_vertices();

        let mut train_interval = Vec::with_capacity(num_tr);
        let mut num_t = 0;
        for tr in 0..num_tr {
            let interval = timetable.time_index_interval(tr, self.dt, true)?;
            num_t = num_t.max(interval.1);
            train_interval.push(interval);
        }
        let t_dim = num_t + 2;

        let breakable_edges = network.breakable_edges();
        let num_breakable = breakable_edges.len();
        let mut max_vss = 0;
        for &e in &breakable_edges {
            max_vss = max_vss.max(network.max_vss_on_edge(e)?);
        }

        let mut model = Model::new();
        let mut x = MultiArray::new(&[num_tr, t_dim, num_edges]);
        let mut x_v = MultiArray::new(&[num_tr, t_dim, num_vertices]);
        let mut v = MultiArray::new(&[num_tr, t_dim]);
        let mut e_lda = MultiArray::new(&[num_tr, t_dim, num_edges]);
        let mut e_mu = MultiArray::new(&[num_tr, t_dim, num_edges]);
        let mut overlap = MultiArray::new(&[num_tr, t_dim, num_edges]);
        let mut len_in = MultiArray::new(&[num_tr, t_dim]);
        let mut x_in = MultiArray::new(&[num_tr, t_dim]);
        let mut len_out = MultiArray::new(&[num_tr, t_dim]);
        let mut x_out = MultiArray::new(&[num_tr, t_dim]);
        let mut b_pos = MultiArray::new(&[num_breakable, max_vss]);
        let mut b_front = MultiArray::new(&[num_tr, t_dim, num_breakable, max_vss]);
        let mut b_rear = MultiArray::new(&[num_tr, t_dim, num_breakable, max_vss]);

        for (e_idx, &e) in breakable_edges.iter().enumerate() {
            let length = network.get_edge(e)?.length;
            for vss in 0..network.max_vss_on_edge(e)? {
                b_pos.set(
                    &[e_idx, vss],
                    model.add_continuous(format!("b_pos_{}_{}", e_idx, vss), 0.0, length),
                );
            }
        }

        for tr in 0..num_tr {
            let train = timetable.get_train(tr)?;
            let (first, last) = train_interval[tr];
            for t in first..=last {
                for e in 0..num_edges {
                    let length = network.get_edge(e)?.length;
                    if t < last {
                        overlap.set(
                            &[tr, t, e],
                            model.add_continuous(
                                format!("overlap_{}_{}_{}", train.name, t, e),
                                0.0,
                                length,
                            ),
                        );
                    }
                    x.set(&[tr, t, e], model.add_binary(format!("x_{}_{}_{}", train.name, t, e)));
                    e_lda.set(
                        &[tr, t, e],
                        model.add_continuous(format!("e_lda_{}_{}_{}", train.name, t, e), 0.0, length),
                    );
                    e_mu.set(
                        &[tr, t, e],
                        model.add_continuous(format!("e_mu_{}_{}_{}", train.name, t, e), 0.0, length),
                    );
                }
                for vertex in 0..num_vertices {
                    x_v.set(
                        &[tr, t, vertex],
                        model.add_binary(format!("x_v_{}_{}_{}", train.name, t, vertex)),
                    );
                }
                len_in.set(
                    &[tr, t],
                    model.add_continuous(format!("len_in_{}_{}", train.name, t), 0.0, train.length),
                );
                x_in.set(&[tr, t], model.add_binary(format!("x_in_{}_{}", train.name, t)));
                len_out.set(
                    &[tr, t],
                    model.add_continuous(format!("len_out_{}_{}", train.name, t), 0.0, train.length),
                );
                x_out.set(&[tr, t], model.add_binary(format!("x_out_{}_{}", train.name, t)));
                for (e_idx, &e) in breakable_edges.iter().enumerate() {
                    for vss in 0..network.max_vss_on_edge(e)? {
                        b_front.set(
                            &[tr, t, e_idx, vss],
                            model.add_binary(format!("b_front_{}_{}_{}_{}", train.name, t, e_idx, vss)),
                        );
                        b_rear.set(
                            &[tr, t, e_idx, vss],
                            model.add_binary(format!("b_rear_{}_{}_{}_{}", train.name, t, e_idx, vss)),
                        );
                    }
                }
            }
            for t in first..=last + 1 {
                v.set(
                    &[tr, t],
                    model.add_continuous(format!("v_{}_{}", train.name, t), 0.0, train.max_speed),
                );
            }
        }

        let mut built = VssModel {
            model,
            x,
            x_v,
            v,
            e_lda,
            e_mu,
            overlap,
            len_in,
            x_in,
            len_out,
            x_out,
            b_pos,
            b_front,
            b_rear,
            breakable_edges,
            train_interval,
            dt: self.dt,
        };
        self.create_position_constraints(&mut built)?;
        self.create_overlap_constraints(&mut built)?;
        self.create_boundary_constraints(&mut built)?;
        self.create_occupation_constraints(&mut built)?;
        self.create_vss_constraints(&mut built)?;
        Ok(built)
    }

    /// The occupied length matches the train plus its travel during the
    /// step, occupation forms a simple connected path, and movement obeys
    /// switches and never goes backwards.
    fn create_position_constraints(&self, built: &mut VssModel) -> Result<()> {
        let network = &self.instance.network;
        let timetable = &self.instance.timetable;
        let num_edges = network.number_of_edges();
        let num_vertices = network.number_of_vertices();
        let dt = self.dt as f64;

        for tr in 0..timetable.get_train_list().size() {
            let train = timetable.get_train(tr)?;
            let schedule = timetable.get_schedule(tr)?;
            let (first, last) = built.train_interval[tr];
            for t in first..=last {
                // sum_e (e_mu - e_lda) + len_in + len_out
                //   = len + (v(t) + v(t+1)) / 2 * dt
                let mut expr = LinExpr::var(built.len_in.get(&[tr, t]).unwrap());
                expr.add_term(built.len_out.get(&[tr, t]).unwrap(), 1.0);
                for e in 0..num_edges {
                    expr.add_term(built.e_mu.get(&[tr, t, e]).unwrap(), 1.0);
                    expr.add_term(built.e_lda.get(&[tr, t, e]).unwrap(), -1.0);
                }
                expr.add_term(built.v.get(&[tr, t]).unwrap(), -dt / 2.0);
                expr.add_term(built.v.get(&[tr, t + 1]).unwrap(), -dt / 2.0);
                built.model.add_constr(
                    expr,
                    Sense::Eq,
                    train.length,
                    format!("train_pos_len_{}_{}", train.name, t),
                );

                // x_v bounded by the incident occupations on both sides.
                for vertex in 0..num_vertices {
                    let mut rhs_in = LinExpr::new();
                    for &e in network.in_edges(vertex) {
                        rhs_in.add_term(built.x.get(&[tr, t, e]).unwrap(), 1.0);
                    }
                    if vertex == schedule.entry {
                        rhs_in.add_term(built.x_in.get(&[tr, t]).unwrap(), 1.0);
                    }
                    let mut rhs_out = LinExpr::new();
                    for &e in network.out_edges(vertex) {
                        rhs_out.add_term(built.x.get(&[tr, t, e]).unwrap(), 1.0);
                    }
                    if vertex == schedule.exit {
                        rhs_out.add_term(built.x_out.get(&[tr, t]).unwrap(), 1.0);
                    }
                    let x_v_var = built.x_v.get(&[tr, t, vertex]).unwrap();
                    let mut both = LinExpr::var(x_v_var);
                    both.add_expr(&rhs_in.clone().scaled(-1.0));
                    both.add_expr(&rhs_out.clone().scaled(-1.0));
                    built.model.add_constr(
                        both,
                        Sense::Le,
                        0.0,
                        format!("train_pos_x_v_{}_{}_{}", train.name, t, vertex),
                    );
                    // x_v >= sum of either side alone
                    built.model.add_constr(
                        rhs_out.minus(&LinExpr::var(x_v_var)),
                        Sense::Le,
                        0.0,
                        format!("train_pos_x_v_out_{}_{}_{}", train.name, t, vertex),
                    );
                    built.model.add_constr(
                        rhs_in.minus(&LinExpr::var(x_v_var)),
                        Sense::Le,
                        0.0,
                        format!("train_pos_x_v_in_{}_{}_{}", train.name, t, vertex),
                    );
                }

                // sum_e x_e = sum_v x_v - 1
                let mut path = LinExpr::new();
                for e in 0..num_edges {
                    path.add_term(built.x.get(&[tr, t, e]).unwrap(), 1.0);
                }
                for vertex in 0..num_vertices {
                    path.add_term(built.x_v.get(&[tr, t, vertex]).unwrap(), -1.0);
                }
                built.model.add_constr(
                    path,
                    Sense::Eq,
                    -1.0,
                    format!("train_pos_simple_connected_path_{}_{}", train.name, t),
                );

                for e1 in 0..num_edges {
                    let edge = network.get_edge(e1)?;
                    let length = edge.length;
                    for &e2 in network.out_edges(edge.target) {
                        if t < last && network.is_valid_successor(e1, e2) {
                            // no going backwards:
                            // x_e1(t+1) <= x_e1(t) + 1 - x_e2(t)
                            let mut expr = LinExpr::var(built.x.get(&[tr, t + 1, e1]).unwrap());
                            expr.add_term(built.x.get(&[tr, t, e1]).unwrap(), -1.0);
                            expr.add_term(built.x.get(&[tr, t, e2]).unwrap(), 1.0);
                            built.model.add_constr(
                                expr,
                                Sense::Le,
                                1.0,
                                format!("train_pos_no_backwards_{}_{}_{}_{}", train.name, t, e1, e2),
                            );
                        } else if !network.is_valid_successor(e1, e2) {
                            // illegal movement over the switch
                            let mut expr = LinExpr::var(built.x.get(&[tr, t, e1]).unwrap());
                            expr.add_term(built.x.get(&[tr, t, e2]).unwrap(), 1.0);
                            built.model.add_constr(
                                expr,
                                Sense::Le,
                                1.0,
                                format!("train_pos_switches_{}_{}_{}_{}", train.name, t, e1, e2),
                            );
                        }
                    }

                    if t < last {
                        // only moving forward on an edge:
                        // e_lda(t) <= e_lda(t+1) + len * (1 - x(t+1))
                        let mut expr = LinExpr::var(built.e_lda.get(&[tr, t, e1]).unwrap());
                        expr.add_term(built.e_lda.get(&[tr, t + 1, e1]).unwrap(), -1.0);
                        expr.add_term(built.x.get(&[tr, t + 1, e1]).unwrap(), length);
                        built.model.add_constr(
                            expr,
                            Sense::Le,
                            length,
                            format!("train_pos_e_lda_{}_{}_{}", train.name, t, e1),
                        );
                        let mut expr = LinExpr::var(built.e_mu.get(&[tr, t, e1]).unwrap());
                        expr.add_term(built.e_mu.get(&[tr, t + 1, e1]).unwrap(), -1.0);
                        expr.add_term(built.x.get(&[tr, t + 1, e1]).unwrap(), length);
                        built.model.add_constr(
                            expr,
                            Sense::Le,
                            length,
                            format!("train_pos_e_mu_{}_{}_{}", train.name, t, e1),
                        );
                    }
                }

                if t < last {
                    // len_in never grows, len_out never shrinks
                    let mut expr = LinExpr::var(built.len_in.get(&[tr, t + 1]).unwrap());
                    expr.add_term(built.len_in.get(&[tr, t]).unwrap(), -1.0);
                    built.model.add_constr(
                        expr,
                        Sense::Le,
                        0.0,
                        format!("train_pos_len_in_{}_{}", train.name, t),
                    );
                    let mut expr = LinExpr::var(built.len_out.get(&[tr, t]).unwrap());
                    expr.add_term(built.len_out.get(&[tr, t + 1]).unwrap(), -1.0);
                    built.model.add_constr(
                        expr,
                        Sense::Le,
                        0.0,
                        format!("train_pos_len_out_{}_{}", train.name, t),
                    );
                }
            }
        }
        Ok(())
    }

    /// The part of the occupation shared between consecutive timesteps must
    /// amount to the train length and sit at the front of the movement.
    fn create_overlap_constraints(&self, built: &mut VssModel) -> Result<()> {
        let network = &self.instance.network;
        let timetable = &self.instance.timetable;
        let num_edges = network.number_of_edges();

        for tr in 0..timetable.get_train_list().size() {
            let train = timetable.get_train(tr)?;
            let schedule = timetable.get_schedule(tr)?;
            let (first, last) = built.train_interval[tr];
            if last == first {
                continue;
            }
            for t in first..last {
                let mut expr = LinExpr::var(built.len_in.get(&[tr, t + 1]).unwrap());
                expr.add_term(built.len_out.get(&[tr, t]).unwrap(), 1.0);
                for e in 0..num_edges {
                    expr.add_term(built.overlap.get(&[tr, t, e]).unwrap(), 1.0);
                }
                built.model.add_constr(
                    expr,
                    Sense::Eq,
                    train.length,
                    format!("train_pos_overlap_len_{}_{}", train.name, t),
                );

                for e in 0..num_edges {
                    let edge = network.get_edge(e)?;
                    let length = edge.length;
                    let overlap_var = built.overlap.get(&[tr, t, e]).unwrap();

                    // overlap >= e_mu(t) - e_lda(t+1) when occupied at t+1
                    let mut expr = LinExpr::var(overlap_var);
                    expr.add_term(built.e_mu.get(&[tr, t, e]).unwrap(), -1.0);
                    expr.add_term(built.e_lda.get(&[tr, t + 1, e]).unwrap(), 1.0);
                    expr.add_term(built.x.get(&[tr, t + 1, e]).unwrap(), -length);
                    built.model.add_constr(
                        expr,
                        Sense::Ge,
                        -length,
                        format!("train_pos_overlap_e_lb_{}_{}_{}", train.name, t, e),
                    );
                    // overlap <= e_mu(t) - e_lda(t+1)
                    let mut expr = LinExpr::var(overlap_var);
                    expr.add_term(built.e_mu.get(&[tr, t, e]).unwrap(), -1.0);
                    expr.add_term(built.e_lda.get(&[tr, t + 1, e]).unwrap(), 1.0);
                    built.model.add_constr(
                        expr,
                        Sense::Le,
                        0.0,
                        format!("train_pos_overlap_e_ub_{}_{}_{}", train.name, t, e),
                    );
                    // overlap <= len * x at both timesteps
                    for (suffix, t_x) in &[("t", t), ("tp1", t + 1)] {
                        let mut expr = LinExpr::var(overlap_var);
                        expr.add_term(built.x.get(&[tr, *t_x, e]).unwrap(), -length);
                        built.model.add_constr(
                            expr,
                            Sense::Le,
                            0.0,
                            format!("train_pos_overlap_e_{}_{}_{}_{}", suffix, train.name, t, e),
                        );
                    }

                    // overlap only at the front of the movement
                    for &e2 in network.get_successors(e) {
                        let mut expr = LinExpr::var(overlap_var);
                        expr.add_term(built.overlap.get(&[tr, t, e2]).unwrap(), -length);
                        expr.add_term(built.x.get(&[tr, t, e2]).unwrap(), length);
                        built.model.add_constr(
                            expr,
                            Sense::Le,
                            length,
                            format!("train_pos_overlap_at_front_{}_{}_{}_{}", train.name, t, e, e2),
                        );
                    }
                    if edge.source == schedule.entry {
                        let mut expr = LinExpr::var(built.len_in.get(&[tr, t]).unwrap());
                        expr.add_term(overlap_var, -train.length);
                        expr.add_term(built.x.get(&[tr, t, e]).unwrap(), train.length);
                        built.model.add_constr(
                            expr,
                            Sense::Le,
                            train.length,
                            format!("train_pos_overlap_at_front_{}_{}_len_in_{}", train.name, t, e),
                        );
                    }
                    if edge.target == schedule.exit {
                        let mut expr = LinExpr::var(overlap_var);
                        expr.add_term(built.len_out.get(&[tr, t]).unwrap(), -length);
                        expr.add_term(built.x_out.get(&[tr, t]).unwrap(), length);
                        built.model.add_constr(
                            expr,
                            Sense::Le,
                            length,
                            format!("train_pos_overlap_at_front_{}_{}_len_out_{}", train.name, t, e),
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// At its first timestep a train is fully outside the network; at its
    /// last it has fully left.
    fn create_boundary_constraints(&self, built: &mut VssModel) -> Result<()> {
        let timetable = &self.instance.timetable;
        for tr in 0..timetable.get_train_list().size() {
            let train = timetable.get_train(tr)?;
            let (first, last) = built.train_interval[tr];
            built.model.add_constr(
                LinExpr::var(built.len_in.get(&[tr, first]).unwrap()),
                Sense::Eq,
                train.length,
                format!("train_boundary_len_in_{}_{}", train.name, first),
            );
            built.model.add_constr(
                LinExpr::var(built.len_out.get(&[tr, last]).unwrap()),
                Sense::Eq,
                train.length,
                format!("train_boundary_len_out_{}_{}", train.name, last),
            );
        }
        Ok(())
    }

    /// Couples the interval variables to the occupation indicators.
    fn create_occupation_constraints(&self, built: &mut VssModel) -> Result<()> {
        let network = &self.instance.network;
        let timetable = &self.instance.timetable;
        let num_edges = network.number_of_edges();

        for tr in 0..timetable.get_train_list().size() {
            let train = timetable.get_train(tr)?;
            let schedule = timetable.get_schedule(tr)?;
            let (first, last) = built.train_interval[tr];
            for e in 0..num_edges {
                let edge = network.get_edge(e)?;
                let length = edge.length;
                for t in first..=last {
                    let x_var = built.x.get(&[tr, t, e]).unwrap();
                    let lda = built.e_lda.get(&[tr, t, e]).unwrap();
                    let mu = built.e_mu.get(&[tr, t, e]).unwrap();

                    // e_lda <= e_mu
                    let expr = LinExpr::var(lda).minus(&LinExpr::var(mu));
                    built.model.add_constr(
                        expr,
                        Sense::Le,
                        0.0,
                        format!("train_occupation_mu_lda_{}_{}_{}", train.name, t, e),
                    );
                    // e_mu <= len * x
                    let mut expr = LinExpr::var(mu);
                    expr.add_term(x_var, -length);
                    built.model.add_constr(
                        expr,
                        Sense::Le,
                        0.0,
                        format!("train_occupation_mu_x_{}_{}_{}", train.name, t, e),
                    );

                    // e_mu = len when not the last occupied edge:
                    // e_mu + len * (1 - x) >= len * (sum_out x + [exit] x_out)
                    let mut expr = LinExpr::var(mu);
                    expr.add_term(x_var, -length);
                    for &e2 in network.out_edges(edge.target) {
                        expr.add_term(built.x.get(&[tr, t, e2]).unwrap(), -length);
                    }
                    if edge.target == schedule.exit {
                        expr.add_term(built.x_out.get(&[tr, t]).unwrap(), -length);
                    }
                    built.model.add_constr(
                        expr,
                        Sense::Ge,
                        -length,
                        format!("train_occupation_mu_full_if_not_last_{}_{}_{}", train.name, t, e),
                    );

                    // e_lda = 0 when not the first occupied edge:
                    // e_lda <= len * (2 - x - sum_in x - [entry] x_in)
                    let mut expr = LinExpr::var(lda);
                    expr.add_term(x_var, length);
                    for &e2 in network.in_edges(edge.source) {
                        expr.add_term(built.x.get(&[tr, t, e2]).unwrap(), length);
                    }
                    if edge.source == schedule.entry {
                        expr.add_term(built.x_in.get(&[tr, t]).unwrap(), length);
                    }
                    built.model.add_constr(
                        expr,
                        Sense::Le,
                        2.0 * length,
                        format!("train_occupation_lda_zero_if_not_first_{}_{}_{}", train.name, t, e),
                    );

                    // x = 0 when the interval is empty: x <= e_mu - e_lda
                    let mut expr = LinExpr::var(x_var);
                    expr.add_term(mu, -1.0);
                    expr.add_term(lda, 1.0);
                    built.model.add_constr(
                        expr,
                        Sense::Le,
                        0.0,
                        format!("train_occupation_x_zero_if_empty_{}_{}_{}", train.name, t, e),
                    );
                }
            }

            for t in first..=last {
                // x_in = 1 iff len_in > 0; same for x_out.
                let mut expr = LinExpr::var(built.x_in.get(&[tr, t]).unwrap());
                expr.add_term(built.len_in.get(&[tr, t]).unwrap(), -1.0);
                built.model.add_constr(
                    expr,
                    Sense::Le,
                    0.0,
                    format!("train_occupation_x_in_only_if_{}_{}", train.name, t),
                );
                let mut expr = LinExpr::var(built.len_in.get(&[tr, t]).unwrap());
                expr.add_term(built.x_in.get(&[tr, t]).unwrap(), -train.length);
                built.model.add_constr(
                    expr,
                    Sense::Le,
                    0.0,
                    format!("train_occupation_x_in_if_{}_{}", train.name, t),
                );
                let mut expr = LinExpr::var(built.x_out.get(&[tr, t]).unwrap());
                expr.add_term(built.len_out.get(&[tr, t]).unwrap(), -1.0);
                built.model.add_constr(
                    expr,
                    Sense::Le,
                    0.0,
                    format!("train_occupation_x_out_only_if_{}_{}", train.name, t),
                );
                let mut expr = LinExpr::var(built.len_out.get(&[tr, t]).unwrap());
                expr.add_term(built.x_out.get(&[tr, t]).unwrap(), -train.length);
                built.model.add_constr(
                    expr,
                    Sense::Le,
                    0.0,
                    format!("train_occupation_x_out_if_{}_{}", train.name, t),
                );
            }
        }
        Ok(())
    }

    /// Candidate separators divide occupations on breakable edges: a
    /// separator marked as a train's front bounds its rear interval and vice
    /// versa.
    fn create_vss_constraints(&self, built: &mut VssModel) -> Result<()> {
        let network = &self.instance.network;
        let timetable = &self.instance.timetable;
        for tr in 0..timetable.get_train_list().size() {
            let train = timetable.get_train(tr)?;
            let (first, last) = built.train_interval[tr];
            for (e_idx, &e) in built.breakable_edges.iter().enumerate() {
                let length = network.get_edge(e)?.length;
                for t in first..=last {
                    for vss in 0..network.max_vss_on_edge(e)? {
                        let b_pos = built.b_pos.get(&[e_idx, vss]).unwrap();
                        // e_lda <= b_pos + len * (1 - b_front)
                        let mut expr = LinExpr::var(built.e_lda.get(&[tr, t, e]).unwrap());
                        expr.add_term(b_pos, -1.0);
                        expr.add_term(built.b_front.get(&[tr, t, e_idx, vss]).unwrap(), length);
                        built.model.add_constr(
                            expr,
                            Sense::Le,
                            length,
                            format!("vss_lda_b_pos_b_front_{}_{}_{}_{}", train.name, t, e, vss),
                        );
                        // b_pos <= e_mu + len * (1 - b_rear)
                        let mut expr = LinExpr::var(b_pos);
                        expr.add_term(built.e_mu.get(&[tr, t, e]).unwrap(), -1.0);
                        expr.add_term(built.b_rear.get(&[tr, t, e_idx, vss]).unwrap(), length);
                        built.model.add_constr(
                            expr,
                            Sense::Le,
                            length,
                            format!("vss_b_pos_mu_b_rear_{}_{}_{}_{}", train.name, t, e, vss),
                        );
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::railway::network::{Network, VertexType};
    use crate::railway::routes::RouteMap;
    use crate::railway::timetable::Timetable;

    /// Two TTD borders around one breakable edge.
    fn breakable_instance() -> VssGenerationTimetable {
        let mut network = Network::new();
        for name in &["a", "b", "c", "d"] {
            network.add_vertex(name, VertexType::Ttd).unwrap();
        }
        let ab = network.add_edge_by_names("a", "b", 100.0, 20.0, false, 0.0).unwrap();
        let bc = network.add_edge_by_names("b", "c", 44.0, 20.0, true, 10.0).unwrap();
        let cd = network.add_edge_by_names("c", "d", 100.0, 20.0, false, 0.0).unwrap();
        network.add_successor(ab, bc).unwrap();
        network.add_successor(bc, cd).unwrap();
        let mut timetable = Timetable::new();
        timetable
            .add_train("tr1", 50.0, 20.0, 1.0, 1.0, 0, 0.0, "a", 120, 10.0, "d", &network)
            .unwrap();
        VssGenerationTimetable::new(network, timetable, RouteMap::new())
    }

    #[test]
    fn test_vss_model_variables() {
        let instance = breakable_instance();
        let builder = VssFreeRoutesModelBuilder::new(&instance, 15);
        let (built, status) = builder.solve(Some(120), false).unwrap();
        assert_eq!(status, SolverStatus::NotSolved { time_limit: Some(120) });

        // 44 / 10 blocks allow 3 separators on the breakable edge.
        assert_eq!(built.breakable_edges.len(), 1);
        assert_eq!(built.b_pos.iter_set().count(), 3);
        let b = built.b_pos.get(&[0, 0]).unwrap();
        assert_eq!(built.model.variable(b).ub, 44.0);

        // (0, ceil(120/15)) time grid for the single train.
        assert_eq!(built.train_interval[0], (0, 8));
        for t in 0..=8 {
            assert!(built.x.get(&[0, t, 0]).is_some());
            assert!(built.e_lda.get(&[0, t, 1]).is_some());
            assert!(built.e_mu.get(&[0, t, 1]).is_some());
        }
        // v runs one step past the interval end.
        assert!(built.v.get(&[0, 9]).is_some());
        // overlap only exists strictly inside the interval.
        assert!(built.overlap.get(&[0, 7, 0]).is_some());
        assert!(built.overlap.get(&[0, 8, 0]).is_none());

        // e_lda/e_mu are bounded by their edge length.
        let lda = built.e_lda.get(&[0, 0, 1]).unwrap();
        assert_eq!(built.model.variable(lda).ub, 44.0);
    }

    #[test]
    fn test_vss_model_constraints() {
        let instance = breakable_instance();
        let builder = VssFreeRoutesModelBuilder::new(&instance, 15);
        let built = builder.build().unwrap();

        // Boundary conditions pin the train outside the network at both ends.
        let len_in = built.model.find_constraint("train_boundary_len_in_tr1_0").unwrap();
        assert_eq!(len_in.sense, Sense::Eq);
        assert_eq!(len_in.rhs, 50.0);
        assert!(built.model.find_constraint("train_boundary_len_out_tr1_8").is_some());

        // Position length constraint ties the occupation to the velocity.
        let pos = built.model.find_constraint("train_pos_len_tr1_0").unwrap();
        assert_eq!(pos.sense, Sense::Eq);
        assert_eq!(pos.rhs, 50.0);
        assert!(pos.expr.terms.iter().any(|&(v, c)| {
            Some(v) == built.v.get(&[0, 0]) && (c + 7.5).abs() < 1e-9
        }));

        // Each candidate separator bounds front and rear occupations.
        assert!(built
            .model
            .find_constraint("vss_lda_b_pos_b_front_tr1_0_1_0")
            .is_some());
        assert!(built
            .model
            .find_constraint("vss_b_pos_mu_b_rear_tr1_0_1_2")
            .is_some());

        // No objective: the free-route VSS model is a feasibility model here.
        assert!(built.model.objective().is_empty());
    }

    #[test]
    fn test_invalid_timestep_width() {
        let instance = breakable_instance();
        let builder = VssFreeRoutesModelBuilder::new(&instance, 0);
        assert!(builder.build().is_err());
    }
}
