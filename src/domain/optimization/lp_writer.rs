use std::collections::HashSet;
use std::io::{self, Write};

use crate::domain::optimization::model::{LinearExpr, OptimizationModel, Sense, VarId};

/// Terms per line. CPLEX LP files must not exceed 510 characters per line.
const TERMS_PER_LINE: usize = 8;

/// LP-safe variable names for one model, indexed like the model's variables.
///
/// Characters outside the LP name alphabet are replaced by `_`; names that collide after
/// replacement get a `#<index>` suffix.
#[derive(Debug, Clone)]
pub struct LpNames {
    names: Vec<String>,
}

impl LpNames {
    pub fn new(model: &OptimizationModel) -> Self {
        let mut taken: HashSet<String> = HashSet::new();
        let mut names = Vec::with_capacity(model.variables().len());

        for (index, variable) in model.variables().iter().enumerate() {
            let mut name = sanitize(&variable.name);
            if !taken.insert(name.clone()) {
                name = format!("{}#{}", name, index);
                taken.insert(name.clone());
            }
            names.push(name);
        }

        Self { names }
    }

    pub fn get(&self, var: VarId) -> &str {
        self.names.get(var.0).map(|s| s.as_str()).unwrap_or("_")
    }

    /// `(lp name, model variable index)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, VarId)> {
        self.names.iter().enumerate().map(|(index, name)| (name.as_str(), VarId(index)))
    }
}

pub fn sanitize(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || "!\"#$%&()/,.;?@_`'{}|~".contains(c) { c } else { '_' })
        .collect();

    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E') {
        out.insert(0, '_');
    }

    out
}

/// Renders `model` in CPLEX LP text format.
pub fn write_lp<W: Write>(model: &OptimizationModel, out: &mut W) -> io::Result<()> {
    let names = LpNames::new(model);

    writeln!(out, "\\ Model {}", model.name())?;
    writeln!(out, "Minimize")?;

    let objective = model.objective();
    let mut line = String::from(" obj:");
    push_terms(&mut line, objective.linear.iter(), &names, false);

    if objective.is_quadratic() {
        line.push_str(if objective.linear.is_empty() { " [" } else { " + [" });
        // LP quadratic objectives are written as `[ 2 q ] / 2`.
        let doubled: Vec<(VarId, f64)> = objective.quadratic.iter().map(|(var, c)| (*var, 2.0 * c)).collect();
        push_terms(&mut line, doubled.iter(), &names, true);
        line.push_str(" ] / 2");
    }
    writeln!(out, "{}", line)?;

    writeln!(out, "Subject To")?;
    for constraint in model.constraints() {
        let mut line = format!(" {}:", sanitize(&constraint.name));
        write_expr(&mut line, &constraint.expr, &names, model);
        line.push_str(&format!(" {} {}", constraint.sense, constraint.rhs));
        writeln!(out, "{}", line)?;
    }

    writeln!(out, "Bounds")?;
    for (index, variable) in model.variables().iter().enumerate() {
        let name = names.get(VarId(index));
        match variable.upper {
            Some(upper) => writeln!(out, " {} <= {} <= {}", variable.lower, name, upper)?,
            None if variable.lower != 0.0 => writeln!(out, " {} >= {}", name, variable.lower)?,
            None => {}
        }
    }

    writeln!(out, "End")?;
    Ok(())
}

pub fn to_lp_string(model: &OptimizationModel) -> String {
    let mut buffer = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write_lp(model, &mut buffer);
    String::from_utf8_lossy(&buffer).into_owned()
}

fn write_expr(line: &mut String, expr: &LinearExpr, names: &LpNames, model: &OptimizationModel) {
    if expr.is_empty() {
        // An empty row still constrains its right-hand side.
        if !model.variables().is_empty() {
            line.push_str(&format!(" 0 {}", names.get(VarId(0))));
        }
        return;
    }

    push_terms(line, expr.terms.iter(), names, false);
}

fn push_terms<'t, I>(line: &mut String, terms: I, names: &LpNames, squared: bool)
where
    I: Iterator<Item = &'t (VarId, f64)>,
{
    let suffix = if squared { " ^2" } else { "" };

    for (index, (var, coefficient)) in terms.enumerate() {
        if index > 0 && index % TERMS_PER_LINE == 0 {
            line.push_str("\n   ");
        }

        let sign = if *coefficient < 0.0 { "-" } else { "+" };
        if index == 0 && sign == "+" {
            line.push_str(&format!(" {} {}{}", coefficient.abs(), names.get(*var), suffix));
        } else {
            line.push_str(&format!(" {} {} {}{}", sign, coefficient.abs(), names.get(*var), suffix));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::optimization::model::{LinearExpr, Objective};

    #[test]
    fn test_sanitize_replaces_forbidden_characters() {
        assert_eq!(sanitize("r_A;G|A;B;G"), "r_A;G|A;B;G");
        assert_eq!(sanitize("u_R 1;R-2"), "u_R_1;R_2");
        assert_eq!(sanitize("1abc"), "_1abc");
    }

    #[test]
    fn test_lp_contains_all_sections() {
        let mut model = OptimizationModel::new("bucket");
        let x = model.add_variable("x", 0.0, Some(1.0));
        let y = model.add_variable("y", 0.0, None);
        model.add_constraint("c1", LinearExpr::new().with(x, 1.0).with(y, -2.0), Sense::LessEqual, 4.0);
        model.set_objective(Objective { linear: vec![(x, 1.0)], quadratic: vec![(y, 1.0)] });

        let lp = to_lp_string(&model);

        assert!(lp.contains("Minimize\n obj: 1 x + [ 2 y ^2 ] / 2"));
        assert!(lp.contains(" c1: 1 x - 2 y <= 4"));
        assert!(lp.contains(" 0 <= x <= 1"));
        assert!(lp.trim_end().ends_with("End"));
    }
}
