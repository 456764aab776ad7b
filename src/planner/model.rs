//! Data model for assembled MIP formulations. The builders in this module's
//! siblings only produce variables, constraints and an objective; handing
//! the model to an actual solver binding is out of scope.

pub type VarId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Binary,
    Continuous,
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub var_type: VarType,
    pub lb: f64,
    pub ub: f64,
}

/// Linear expression `sum(coeff * var) + constant`.
#[derive(Debug, Clone, Default)]
pub struct LinExpr {
    pub terms: Vec<(VarId, f64)>,
    pub constant: f64,
}

impl LinExpr {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn var(v: VarId) -> Self {
        LinExpr { terms: vec![(v, 1.0)], constant: 0.0 }
    }

    pub fn add_term(&mut self, v: VarId, coeff: f64) {
        self.terms.push((v, coeff));
    }

    pub fn add_constant(&mut self, c: f64) {
        self.constant += c;
    }

    pub fn add_expr(&mut self, other: &LinExpr) {
        self.terms.extend(other.terms.iter().cloned());
        self.constant += other.constant;
    }

    pub fn scaled(mut self, factor: f64) -> Self {
        for term in self.terms.iter_mut() {
            term.1 *= factor;
        }
        self.constant *= factor;
        self
    }

    pub fn minus(mut self, other: &LinExpr) -> Self {
        for &(v, c) in &other.terms {
            self.terms.push((v, -c));
        }
        self.constant -= other.constant;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Le,
    Eq,
    Ge,
}

#[derive(Debug, Clone)]
pub struct Constraint {
    pub name: String,
    pub expr: LinExpr,
    pub sense: Sense,
    pub rhs: f64,
}

/// A minimisation model under construction.
#[derive(Debug, Default)]
pub struct Model {
    variables: Vec<Variable>,
    constraints: Vec<Constraint>,
    objective: LinExpr,
}

impl Model {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add_binary(&mut self, name: String) -> VarId {
        self.add_var(name, VarType::Binary, 0.0, 1.0)
    }

    pub fn add_continuous(&mut self, name: String, lb: f64, ub: f64) -> VarId {
        self.add_var(name, VarType::Continuous, lb, ub)
    }

    fn add_var(&mut self, name: String, var_type: VarType, lb: f64, ub: f64) -> VarId {
        let id = self.variables.len();
        self.variables.push(Variable { name, var_type, lb, ub });
        id
    }

    pub fn add_constr(&mut self, expr: LinExpr, sense: Sense, rhs: f64, name: String) {
        self.constraints.push(Constraint { name, expr, sense, rhs });
    }

    pub fn set_objective(&mut self, objective: LinExpr) {
        self.objective = objective;
    }

    pub fn objective(&self) -> &LinExpr {
        &self.objective
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn variable(&self, id: VarId) -> &Variable {
        &self.variables[id]
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn find_constraint(&self, name: &str) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.name == name)
    }
}

/// Dense multi-index variable store. Cells for index tuples that never got a
/// variable (e.g. kinematically impossible speed pairs) stay `None` and are
/// never read by the constraint builders.
#[derive(Debug)]
pub struct MultiArray {
    dims: Vec<usize>,
    data: Vec<Option<VarId>>,
}

impl MultiArray {
    pub fn new(dims: &[usize]) -> Self {
        let size = dims.iter().product();
        MultiArray { dims: dims.to_vec(), data: vec![None; size] }
    }

    fn offset(&self, index: &[usize]) -> usize {
        assert_eq!(index.len(), self.dims.len(), "index rank mismatch");
        let mut offset = 0;
        for (i, (&x, &d)) in index.iter().zip(self.dims.iter()).enumerate() {
            assert!(x < d, "index {} out of bounds in dimension {}", x, i);
            offset = offset * d + x;
        }
        offset
    }

    pub fn set(&mut self, index: &[usize], var: VarId) {
        let offset = self.offset(index);
        self.data[offset] = Some(var);
    }

    pub fn get(&self, index: &[usize]) -> Option<VarId> {
        self.data[self.offset(index)]
    }

    pub fn iter_set(&self) -> impl Iterator<Item = VarId> + '_ {
        self.data.iter().filter_map(|v| *v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_assembly() {
        let mut model = Model::new();
        let x = model.add_binary("x".to_string());
        let t = model.add_continuous("t".to_string(), 0.0, 600.0);

        let mut expr = LinExpr::var(x);
        expr.add_term(t, 2.0);
        model.add_constr(expr, Sense::Le, 10.0, "cap".to_string());
        model.set_objective(LinExpr::var(t));

        assert_eq!(model.num_variables(), 2);
        assert_eq!(model.num_constraints(), 1);
        assert_eq!(model.variable(x).var_type, VarType::Binary);
        assert_eq!(model.variable(t).ub, 600.0);
        let c = model.find_constraint("cap").unwrap();
        assert_eq!(c.sense, Sense::Le);
        assert_eq!(c.expr.terms.len(), 2);
    }

    #[test]
    fn test_multi_array_indexing() {
        let mut arr = MultiArray::new(&[2, 3, 4]);
        assert_eq!(arr.get(&[1, 2, 3]), None);
        arr.set(&[0, 0, 0], 7);
        arr.set(&[1, 2, 3], 9);
        assert_eq!(arr.get(&[0, 0, 0]), Some(7));
        assert_eq!(arr.get(&[1, 2, 3]), Some(9));
        assert_eq!(arr.get(&[0, 2, 3]), None);
        assert_eq!(arr.iter_set().count(), 2);
    }

    #[test]
    #[should_panic]
    fn test_multi_array_bounds() {
        let arr = MultiArray::new(&[2, 2]);
        arr.get(&[2, 0]);
    }
}
