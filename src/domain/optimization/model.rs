use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ConversionError;

/// Index of a decision variable inside its [`OptimizationModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(pub usize);

/// A continuous decision variable with bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub lower: f64,
    /// `None` means unbounded above.
    pub upper: Option<f64>,
}

/// `Σ coefficient · variable`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearExpr {
    pub terms: Vec<(VarId, f64)>,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self { terms: Vec::new() }
    }

    pub fn add(&mut self, var: VarId, coefficient: f64) -> &mut Self {
        self.terms.push((var, coefficient));
        self
    }

    pub fn with(mut self, var: VarId, coefficient: f64) -> Self {
        self.terms.push((var, coefficient));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Evaluates the expression for the given variable values; missing values count as zero.
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.terms.iter().map(|(var, c)| c * values.get(var.0).copied().unwrap_or(0.0)).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    LessEqual,
    Equal,
    GreaterEqual,
}

impl fmt::Display for Sense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sense::LessEqual => write!(f, "<="),
            Sense::Equal => write!(f, "="),
            Sense::GreaterEqual => write!(f, ">="),
        }
    }
}

/// A named linear constraint `expr <sense> rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub name: String,
    pub expr: LinearExpr,
    pub sense: Sense,
    pub rhs: f64,
}

impl Constraint {
    pub fn is_satisfied(&self, values: &[f64], tolerance: f64) -> bool {
        let lhs = self.expr.evaluate(values);
        match self.sense {
            Sense::LessEqual => lhs <= self.rhs + tolerance,
            Sense::Equal => (lhs - self.rhs).abs() <= tolerance,
            Sense::GreaterEqual => lhs >= self.rhs - tolerance,
        }
    }
}

/// Minimization objective with linear and diagonal quadratic terms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Objective {
    pub linear: Vec<(VarId, f64)>,
    /// `(variable, coefficient)` contributing `coefficient · variable²`.
    pub quadratic: Vec<(VarId, f64)>,
}

impl Objective {
    pub fn is_quadratic(&self) -> bool {
        !self.quadratic.is_empty()
    }

    pub fn evaluate(&self, values: &[f64]) -> f64 {
        let value = |var: &VarId| values.get(var.0).copied().unwrap_or(0.0);
        let linear: f64 = self.linear.iter().map(|(var, c)| c * value(var)).sum();
        let quadratic: f64 = self.quadratic.iter().map(|(var, c)| c * value(var) * value(var)).sum();
        linear + quadratic
    }
}

/// Which link-utilization measure the solver minimizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UtilizationObjective {
    /// Minimize the sum (and thereby the mean) of link utilizations.
    Average,
    /// Minimize the largest link utilization.
    Max,
    /// Minimize the sum of squared link utilizations, a convex congestion proxy.
    Squared,
}

impl FromStr for UtilizationObjective {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "average" => Ok(UtilizationObjective::Average),
            "max" => Ok(UtilizationObjective::Max),
            "squared" => Ok(UtilizationObjective::Squared),
            _ => Err(ConversionError::UnknownObjective(s.to_string())),
        }
    }
}

impl fmt::Display for UtilizationObjective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UtilizationObjective::Average => write!(f, "average"),
            UtilizationObjective::Max => write!(f, "max"),
            UtilizationObjective::Squared => write!(f, "squared"),
        }
    }
}

/// The objective as formulated, with the state each kind needs.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectiveState {
    Average,
    /// Carries the auxiliary variable that bounds every link utilization from above.
    Max { max_utilization: VarId },
    Squared,
}

impl ObjectiveState {
    pub fn kind(&self) -> UtilizationObjective {
        match self {
            ObjectiveState::Average => UtilizationObjective::Average,
            ObjectiveState::Max { .. } => UtilizationObjective::Max,
            ObjectiveState::Squared => UtilizationObjective::Squared,
        }
    }
}

/// Solver-agnostic description of a minimization problem over continuous variables.
#[derive(Debug, Clone, Default)]
pub struct OptimizationModel {
    name: String,
    variables: Vec<Variable>,
    index: HashMap<String, VarId>,
    constraints: Vec<Constraint>,
    objective: Objective,
}

impl OptimizationModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a variable; a second variable with the same name returns the existing id.
    pub fn add_variable(&mut self, name: impl Into<String>, lower: f64, upper: Option<f64>) -> VarId {
        let name = name.into();

        if let Some(existing) = self.index.get(&name) {
            log::debug!("DuplicateVariable: Model {} already defines {}.", self.name, name);
            return *existing;
        }

        let id = VarId(self.variables.len());
        self.index.insert(name.clone(), id);
        self.variables.push(Variable { name, lower, upper });
        id
    }

    pub fn add_constraint(&mut self, name: impl Into<String>, expr: LinearExpr, sense: Sense, rhs: f64) {
        self.constraints.push(Constraint { name: name.into(), expr, sense, rhs });
    }

    pub fn set_objective(&mut self, objective: Objective) {
        self.objective = objective;
    }

    pub fn variable(&self, id: VarId) -> Option<&Variable> {
        self.variables.get(id.0)
    }

    pub fn variable_id(&self, name: &str) -> Option<VarId> {
        self.index.get(name).copied()
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn constraint(&self, name: &str) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.name == name)
    }

    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    /// Orders a name-keyed solution by variable id. Fails on the first variable without a value.
    pub fn dense_values(&self, values: &HashMap<String, f64>) -> Result<Vec<f64>, String> {
        self.variables.iter().map(|v| values.get(&v.name).copied().ok_or_else(|| v.name.clone())).collect()
    }

    /// Names of the constraints violated by `values`.
    pub fn violated_constraints(&self, values: &[f64], tolerance: f64) -> Vec<String> {
        self.constraints.iter().filter(|c| !c.is_satisfied(values, tolerance)).map(|c| c.name.clone()).collect()
    }
}
