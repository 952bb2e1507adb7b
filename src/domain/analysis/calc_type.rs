use std::fmt;
use std::str::FromStr;

use crate::domain::optimization::model::UtilizationObjective;
use crate::error::ConversionError;

/// Which pipeline a run uses to assign ratios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalcType {
    /// Heuristic propagation with an even split at every router.
    Baseline,
    /// Heuristic propagation seeded with a ratio table from an earlier run.
    Ratios,
    /// Path-ratio solver form, average utilization objective.
    Average,
    /// Path-ratio solver form, maximum utilization objective.
    Max,
    /// Path-ratio solver form, squared utilization objective.
    Squared,
    /// Edge-flow solver form followed by flow decomposition.
    Paths,
}

impl CalcType {
    pub fn uses_solver(&self) -> bool {
        !matches!(self, CalcType::Baseline | CalcType::Ratios)
    }

    /// Objective of the path-ratio form. `None` for the heuristic and edge-flow pipelines.
    pub fn path_ratio_objective(&self) -> Option<UtilizationObjective> {
        match self {
            CalcType::Average => Some(UtilizationObjective::Average),
            CalcType::Max => Some(UtilizationObjective::Max),
            CalcType::Squared => Some(UtilizationObjective::Squared),
            _ => None,
        }
    }
}

impl FromStr for CalcType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "baseline" => Ok(CalcType::Baseline),
            "ratios" => Ok(CalcType::Ratios),
            "average" => Ok(CalcType::Average),
            "max" => Ok(CalcType::Max),
            "squared" => Ok(CalcType::Squared),
            "paths" => Ok(CalcType::Paths),
            _ => Err(ConversionError::UnknownCalcType(s.to_string())),
        }
    }
}

impl fmt::Display for CalcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CalcType::Baseline => "baseline",
            CalcType::Ratios => "ratios",
            CalcType::Average => "average",
            CalcType::Max => "max",
            CalcType::Squared => "squared",
            CalcType::Paths => "paths",
        };
        write!(f, "{}", name)
    }
}
