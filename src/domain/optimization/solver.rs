use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;

use crate::api::solution_dto::SolutionDto;
use crate::domain::optimization::lp_writer::{LpNames, sanitize, write_lp};
use crate::domain::optimization::model::OptimizationModel;
use crate::error::SolverError;
use crate::loader::parser::parse_json_file;

/// What a solver reports back for one model.
#[derive(Debug, Clone, PartialEq)]
pub enum SolverOutcome {
    /// Variable values keyed by model variable name.
    Optimal { objective: Option<f64>, values: HashMap<String, f64> },

    /// The model has no feasible point. `conflicting` names the constraints the solver blames.
    Infeasible { conflicting: Vec<String> },
}

/// The external numerical optimization capability.
pub trait OptimizationSolver: std::fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn solve(&self, model: &OptimizationModel) -> Result<SolverOutcome, SolverError>;
}

/// Cheaply clonable handle so every bucket context can own its solver reference.
#[derive(Debug, Clone)]
pub struct SharedSolver(pub Arc<dyn OptimizationSolver>);

impl SharedSolver {
    pub fn new<S: OptimizationSolver + 'static>(solver: S) -> Self {
        SharedSolver(Arc::new(solver))
    }
}

impl std::ops::Deref for SharedSolver {
    type Target = dyn OptimizationSolver;
    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

/// Exchanges models with an out-of-process solver through the file system.
///
/// `solve` writes `<dir>/<model>.lp` and reads the answer from `<dir>/<model>.sol.json`. If no
/// answer exists yet the solver is reported unavailable; the exported model stays on disk so an
/// external solver run can pick it up.
#[derive(Debug, Clone)]
pub struct FileExchangeSolver {
    directory: PathBuf,
}

impl FileExchangeSolver {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self { directory: directory.into() }
    }

    pub fn model_path(&self, model: &OptimizationModel) -> PathBuf {
        self.directory.join(format!("{}.lp", file_stem(model.name())))
    }

    pub fn solution_path(&self, model: &OptimizationModel) -> PathBuf {
        self.directory.join(format!("{}.sol.json", file_stem(model.name())))
    }

    fn export(&self, model: &OptimizationModel) -> Result<PathBuf, SolverError> {
        let path = self.model_path(model);

        let io_error = |e: std::io::Error| SolverError::Unavailable(format!("cannot write {}: {}", path.display(), e));

        fs::create_dir_all(&self.directory).map_err(io_error)?;
        let file = File::create(&path).map_err(io_error)?;
        let mut writer = BufWriter::new(file);
        write_lp(model, &mut writer).map_err(io_error)?;

        log::debug!("ModelExported: Wrote {} ({} variables, {} constraints).", path.display(), model.variables().len(), model.constraints().len());
        Ok(path)
    }
}

impl OptimizationSolver for FileExchangeSolver {
    fn name(&self) -> &'static str {
        "file-exchange"
    }

    fn solve(&self, model: &OptimizationModel) -> Result<SolverOutcome, SolverError> {
        self.export(model)?;

        let solution_path = self.solution_path(model);
        if !solution_path.exists() {
            return Err(SolverError::Unavailable(format!("no solution file at {}", solution_path.display())));
        }

        let dto: SolutionDto = parse_json_file(&solution_path).map_err(|e| SolverError::Unavailable(e.to_string()))?;

        match dto {
            SolutionDto::Optimal { objective, values } => {
                // Solution files are keyed by LP names.
                let names = LpNames::new(model);
                let mut by_model_name = HashMap::with_capacity(values.len());

                for (lp_name, var) in names.iter() {
                    if let (Some(value), Some(variable)) = (values.get(lp_name), model.variable(var)) {
                        by_model_name.insert(variable.name.clone(), *value);
                    }
                }

                Ok(SolverOutcome::Optimal { objective, values: by_model_name })
            }
            SolutionDto::Infeasible { conflicting } => {
                // Conflict sets name constraints by their LP names too.
                let by_lp_name: HashMap<String, &str> = model.constraints().iter().map(|c| (sanitize(&c.name), c.name.as_str())).collect();
                let conflicting = conflicting.into_iter().map(|name| by_lp_name.get(&name).map(|n| n.to_string()).unwrap_or(name)).collect();

                Ok(SolverOutcome::Infeasible { conflicting })
            }
            SolutionDto::Error { code, message } => Err(SolverError::Backend { code, message }),
        }
    }
}

fn file_stem(name: &str) -> String {
    name.chars().map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' }).collect()
}
