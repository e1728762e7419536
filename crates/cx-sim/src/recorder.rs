//! Maps a model's visible variables onto results columns.

use cx_model::{EquationModel, Units, VarKind};
use cx_results::{ColumnInfo, compare_uri};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    State(usize),
    Algebraic(usize),
    Parameter(usize),
}

/// Column layout of a model's recorded points.
#[derive(Debug, Clone)]
pub struct Recorder {
    columns: Vec<ColumnInfo>,
    sources: Vec<(Source, Units)>,
}

impl Recorder {
    /// One column per visible variable, ordered case-insensitively by uri.
    /// Values are recorded in each variable's declared unit.
    pub fn for_model(model: &EquationModel) -> Self {
        let mut pairs: Vec<(ColumnInfo, (Source, Units))> = model
            .visible_variables()
            .map(|v| {
                let source = match v.kind {
                    VarKind::State => Source::State(v.slot),
                    VarKind::Algebraic => Source::Algebraic(v.slot),
                    VarKind::Constant | VarKind::ExternalInput => Source::Parameter(v.slot),
                };
                (
                    ColumnInfo::new(&v.component, &v.name, v.units.label.clone()),
                    (source, v.units.clone()),
                )
            })
            .collect();
        pairs.sort_by(|a, b| compare_uri(&a.0.uri, &b.0.uri));

        let (columns, sources) = pairs.into_iter().unzip();
        Self { columns, sources }
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    /// Column values for one point.
    pub fn values(&self, states: &[f64], algebraic: &[f64], parameters: &[f64]) -> Vec<f64> {
        self.sources
            .iter()
            .map(|(source, units)| {
                let value = match *source {
                    Source::State(i) => states[i],
                    Source::Algebraic(i) => algebraic[i],
                    Source::Parameter(i) => parameters[i],
                };
                units.apply(value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cx_model::{Expr, ModelBuilder};

    #[test]
    fn columns_sorted_and_mapped() {
        let mut b = ModelBuilder::new("m");
        b.component("cell");
        b.add_constant("k", 2.0);
        b.add_state("Y", 1.0, -Expr::var("k") * Expr::var("Y"));
        b.add_algebraic("a", 0.0);
        b.add_residual(Expr::var("a") - Expr::var("Y"));
        b.add_state("hidden", 0.0, Expr::num(0.0));
        let hidden = b.lookup("hidden").unwrap();
        b.set_visible(hidden, false).unwrap();
        let model = b.build().unwrap();

        let rec = Recorder::for_model(&model);
        let uris: Vec<_> = rec.columns().iter().map(|c| c.uri.as_str()).collect();
        assert_eq!(uris, ["cell/a", "cell/k", "cell/Y"]);
        assert_eq!(rec.values(&[5.0, 9.0], &[6.0], &[2.0]), vec![6.0, 2.0, 5.0]);
    }

    #[test]
    fn values_are_scaled_to_declared_units() {
        let mut b = ModelBuilder::new("m");
        b.add_state("V", 0.25, Expr::num(0.0));
        let v = b.lookup("V").unwrap();
        b.set_units(v, Units::new("mV", 1e3)).unwrap();
        let model = b.build().unwrap();

        let rec = Recorder::for_model(&model);
        assert_eq!(rec.columns()[0].unit, "mV");
        assert_eq!(rec.values(&[0.25], &[], &[]), vec![250.0]);
    }
}
