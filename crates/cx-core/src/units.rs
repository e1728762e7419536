// cx-core/src/units.rs

use uom::si::f64::Ratio as UomRatio;

/// Dimensionless scale factor carried with variable unit metadata.
///
/// The engine never interprets unit labels; it only multiplies by this
/// ratio when a driver asks for unit-aware values.
pub type Ratio = UomRatio;

#[inline]
pub fn unitless(v: f64) -> Ratio {
    use uom::si::ratio::ratio;
    Ratio::new::<ratio>(v)
}

#[inline]
pub fn ratio_value(r: Ratio) -> f64 {
    use uom::si::ratio::ratio;
    r.get::<ratio>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_round_trip() {
        let r = unitless(1e-3);
        assert_eq!(ratio_value(r), 1e-3);
    }
}
