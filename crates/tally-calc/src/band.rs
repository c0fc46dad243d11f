//! Combining uncertainties into count errors and per-bin error bands.
//!
//! Variations are expressed as fractions of the nominal value and added in
//! quadrature, so distinct sources are treated as uncorrelated.

use serde::{Deserialize, Serialize};
use tally_core::{Error, Measurement, Result, Uncertainty, Value, multiply};
use tally_model::{Process, Region};

use crate::calculation::Calculation;

/// Upward error assigned to ratio points whose varied-up denominator is 0.
const RATIO_UP_SENTINEL: f64 = -100.0;
/// Downward error assigned to ratio points whose varied-down denominator is 0.
const RATIO_DOWN_SENTINEL: f64 = 100.0;

/// `sqrt(Σ xᵢ²)`.
pub fn sum_quadrature<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    values.into_iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Ratio of the integrals of a shape variation and its nominal result, or
/// 0 when the nominal integral is 0.
pub fn to_overall(shape: &Value, nominal: &Value) -> Result<f64> {
    let nominal = nominal.integral()?;
    let shape = shape.integral()?;
    if nominal == 0.0 {
        return Ok(0.0);
    }
    Ok(shape / nominal)
}

/// Convert overall factors into shape variations of `nominal`.
///
/// Without overall factors the uncertainty is returned unchanged. With
/// them, any existing shape components are replaced.
pub fn to_shape(uncertainty: &Uncertainty, nominal: &Value) -> Uncertainty {
    match uncertainty.overall_pair() {
        Some((up, down)) => Uncertainty::shape(multiply(up, nominal), multiply(down, nominal)),
        None => uncertainty.clone(),
    }
}

fn fractional(nominal: f64, varied: f64) -> f64 {
    (varied / nominal - 1.0).abs()
}

/// Absolute `(up, down)` error on a count from one uncertainty source.
///
/// Overall and shape components both contribute when present and are added
/// in quadrature. A non-positive nominal count has zero error.
pub fn count_uncertainty(nominal: f64, uncertainty: &Uncertainty) -> Result<(f64, f64)> {
    if nominal <= 0.0 {
        return Ok((0.0, 0.0));
    }
    let mut ups = Vec::with_capacity(2);
    let mut downs = Vec::with_capacity(2);
    if let Some((u, d)) = uncertainty.overall_pair() {
        ups.push((u - 1.0).abs());
        downs.push((d - 1.0).abs());
    }
    if let Some((u, d)) = uncertainty.shape_pair() {
        ups.push(fractional(nominal, u.as_scalar()?));
        downs.push(fractional(nominal, d.as_scalar()?));
    }
    Ok((sum_quadrature(ups) * nominal, sum_quadrature(downs) * nominal))
}

/// Quadrature sum of per-source `(up, down)` count errors.
pub fn combine_count_uncertainties(errors: &[(f64, f64)]) -> (f64, f64) {
    (sum_quadrature(errors.iter().map(|e| e.0)), sum_quadrature(errors.iter().map(|e| e.1)))
}

/// Per-bin asymmetric error band over the in-range bins of a 1-D
/// measurement. Points sit at bin centers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    /// Bin centers.
    pub x: Vec<f64>,
    /// Half bin widths.
    pub x_err: Vec<f64>,
    /// Point values.
    pub y: Vec<f64>,
    /// Upward errors.
    pub y_err_high: Vec<f64>,
    /// Downward errors.
    pub y_err_low: Vec<f64>,
    /// Display title.
    pub title: String,
}

impl Band {
    /// Band with zero values and errors at the bins of `m`.
    pub fn empty(m: &Measurement) -> Result<Self> {
        if m.dimensions() != 1 {
            return Err(Error::TypeMismatch(format!(
                "uncertainty bands need a 1-D measurement, got {} axes",
                m.dimensions()
            )));
        }
        let edges = m.axis_edges(0);
        let n = edges.len() - 1;
        Ok(Self {
            x: edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect(),
            x_err: edges.windows(2).map(|w| 0.5 * (w[1] - w[0])).collect(),
            y: vec![0.0; n],
            y_err_high: vec![0.0; n],
            y_err_low: vec![0.0; n],
            title: String::new(),
        })
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Whether the band has no points.
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

fn shape_measurements<'a>(
    nominal: &Measurement,
    uncertainty: &'a Uncertainty,
) -> Result<Option<(&'a Measurement, &'a Measurement)>> {
    let Some((up, down)) = uncertainty.shape_pair() else {
        return Ok(None);
    };
    let (up, down) = (up.as_measurement()?, down.as_measurement()?);
    if !nominal.same_binning(up) || !nominal.same_binning(down) {
        return Err(Error::TypeMismatch(
            "shape variations must share the nominal binning".to_string(),
        ));
    }
    Ok(Some((up, down)))
}

/// Error band of one uncertainty source on a 1-D `nominal` measurement.
///
/// Point values are left at 0; set them when combining with
/// [`combine_uncertainty_bands`]. Bins with non-positive content get zero
/// error. With `include_statistical`, each bin also carries its statistical
/// error `content / sqrt(entries)`.
pub fn uncertainty_band(
    nominal: &Measurement,
    uncertainty: &Uncertainty,
    include_statistical: bool,
) -> Result<Band> {
    let mut band = Band::empty(nominal)?;
    let shapes = shape_measurements(nominal, uncertainty)?;
    let overall = uncertainty.overall_pair();
    for point in 0..band.len() {
        let bin = point + 1;
        let content = nominal.content(bin);
        if content <= 0.0 {
            continue;
        }
        let mut ups = Vec::with_capacity(3);
        let mut downs = Vec::with_capacity(3);
        if let Some((u, d)) = overall {
            ups.push((u - 1.0).abs());
            downs.push((d - 1.0).abs());
        }
        if let Some((u, d)) = shapes {
            ups.push(fractional(content, u.content(bin)));
            downs.push(fractional(content, d.content(bin)));
        }
        let entries = nominal.entries()[bin];
        if include_statistical && entries > 0.0 {
            let stat = 1.0 / entries.sqrt();
            ups.push(stat);
            downs.push(stat);
        }
        band.y_err_high[point] = sum_quadrature(ups) * content;
        band.y_err_low[point] = sum_quadrature(downs) * content;
    }
    Ok(band)
}

/// Quadrature sum of bands with identical points.
///
/// With `base`, point values are set to its in-range bin contents. The
/// title defaults to "Uncertainty".
pub fn combine_uncertainty_bands(
    bands: &[Band],
    base: Option<&Measurement>,
    title: Option<&str>,
) -> Result<Band> {
    let Some(first) = bands.first() else {
        return Err(Error::Data("no uncertainty bands to combine".to_string()));
    };
    if bands.iter().any(|b| b.x != first.x) {
        return Err(Error::TypeMismatch("uncertainty bands have different points".to_string()));
    }
    let mut out = first.clone();
    out.title = title.unwrap_or("Uncertainty").to_string();
    if let Some(base) = base {
        if base.dimensions() != 1 || base.n_bins(0) != out.len() {
            return Err(Error::TypeMismatch(
                "band base must be 1-D with one bin per point".to_string(),
            ));
        }
        for i in 0..out.len() {
            out.y[i] = base.content(i + 1);
        }
    }
    for i in 0..out.len() {
        out.y_err_high[i] = sum_quadrature(bands.iter().map(|b| b.y_err_high[i]));
        out.y_err_low[i] = sum_quadrature(bands.iter().map(|b| b.y_err_low[i]));
    }
    Ok(out)
}

/// Re-express a band on `denominator` for a ratio plot centered at 1.
///
/// The errors are those of `denominator / (denominator ± error)`. Negative
/// values are clamped to 0 and a zero varied denominator yields an
/// out-of-range error so the band leaves the plot.
pub fn ratio_uncertainty_band(denominator: &Measurement, band: &Band) -> Result<Band> {
    if denominator.dimensions() != 1 || denominator.n_bins(0) != band.len() {
        return Err(Error::TypeMismatch(
            "ratio denominator must be 1-D with one bin per band point".to_string(),
        ));
    }
    let mut out = band.clone();
    for point in 0..out.len() {
        let value = denominator.content(point + 1);
        let up = (value + band.y_err_high[point]).max(0.0);
        let down = (value - band.y_err_low[point]).max(0.0);
        let value = value.max(0.0);
        let ratio_up = if up != 0.0 { value / up } else { RATIO_UP_SENTINEL };
        let ratio_down = if down != 0.0 { value / down } else { RATIO_DOWN_SENTINEL };
        out.y[point] = 1.0;
        out.y_err_high[point] = 1.0 - ratio_up;
        out.y_err_low[point] = ratio_down - 1.0;
    }
    Ok(out)
}

/// Evaluate `nominal` and `uncertainty` on `(process, region)` and return
/// the count error. Both must produce counts.
pub fn count_uncertainty_for(
    nominal: &dyn Calculation,
    uncertainty: &dyn Calculation,
    process: &Process,
    region: &Region,
) -> Result<(f64, f64)> {
    let n = nominal.call(process, region)?.as_scalar()?;
    let u = uncertainty.call(process, region)?;
    count_uncertainty(n, u.as_uncertainty()?)
}

/// Evaluate `nominal` and `uncertainty` on `(process, region)` and return
/// the error band. Both must produce 1-D measurements.
pub fn uncertainty_band_for(
    nominal: &dyn Calculation,
    uncertainty: &dyn Calculation,
    process: &Process,
    region: &Region,
    include_statistical: bool,
) -> Result<Band> {
    let n = nominal.call(process, region)?;
    let u = uncertainty.call(process, region)?;
    uncertainty_band(n.as_measurement()?, u.as_uncertainty()?, include_statistical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn hist(contents: &[f64]) -> Measurement {
        let edges: Vec<f64> = (0..=contents.len()).map(|i| i as f64).collect();
        let mut m = Measurement::new(vec![edges]).unwrap();
        for (i, c) in contents.iter().enumerate() {
            m.fill(&[i as f64 + 0.5], *c);
        }
        m
    }

    #[test]
    fn quadrature() {
        assert_relative_eq!(sum_quadrature([3.0, 4.0]), 5.0);
        assert_eq!(sum_quadrature(Vec::<f64>::new()), 0.0);
    }

    #[test]
    fn to_overall_handles_zero_nominal() {
        assert_eq!(to_overall(&Value::Scalar(5.0), &Value::Scalar(0.0)).unwrap(), 0.0);
        assert_relative_eq!(to_overall(&Value::Scalar(6.0), &Value::Scalar(4.0)).unwrap(), 1.5);
        let u = Value::uncertainty(Uncertainty::overall(1.0, 1.0));
        assert!(to_overall(&u, &Value::Scalar(1.0)).is_err());
    }

    #[test]
    fn to_shape_without_overall_is_identity() {
        let u = Uncertainty::shape(Value::Scalar(2.0), Value::Scalar(1.0));
        assert_eq!(to_shape(&u, &Value::Scalar(10.0)), u);
    }

    proptest! {
        #[test]
        fn overall_shape_round_trip(
            up in 0.5f64..2.0,
            down in 0.5f64..2.0,
            level in 0.1f64..100.0,
            n in 1usize..8,
        ) {
            let nominal = Value::Measurement(hist(&vec![level; n]));
            let shaped = to_shape(&Uncertainty::overall(up, down), &nominal);
            let (su, sd) = shaped.shape_pair().unwrap();
            prop_assert!((to_overall(su, &nominal).unwrap() - up).abs() < 1e-9);
            prop_assert!((to_overall(sd, &nominal).unwrap() - down).abs() < 1e-9);
        }
    }

    #[test]
    fn count_uncertainty_combines_components() {
        let u = Uncertainty {
            overall_up: Some(1.1),
            overall_down: Some(0.9),
            shape_up: Some(Value::Scalar(105.0)),
            shape_down: Some(Value::Scalar(98.0)),
        };
        let (up, down) = count_uncertainty(100.0, &u).unwrap();
        assert_relative_eq!(up, (0.01f64 + 0.0025).sqrt() * 100.0, epsilon = 1e-9);
        assert_relative_eq!(down, (0.01f64 + 0.0004).sqrt() * 100.0, epsilon = 1e-9);
        assert_eq!(count_uncertainty(0.0, &u).unwrap(), (0.0, 0.0));
    }

    #[test]
    fn combined_count_uncertainties() {
        let (u, d) = combine_count_uncertainties(&[(3.0, 1.0), (4.0, 0.0)]);
        assert_relative_eq!(u, 5.0);
        assert_relative_eq!(d, 1.0);
    }

    #[test]
    fn band_points_and_errors() {
        let nominal = hist(&[10.0, 0.0, 20.0]);
        let up = hist(&[12.0, 5.0, 20.0]);
        let down = hist(&[9.0, 0.0, 18.0]);
        let u = Uncertainty::shape(Value::Measurement(up), Value::Measurement(down));
        let band = uncertainty_band(&nominal, &u, false).unwrap();
        assert_eq!(band.x, vec![0.5, 1.5, 2.5]);
        assert_eq!(band.x_err, vec![0.5; 3]);
        assert_eq!(band.y, vec![0.0; 3]);
        assert_relative_eq!(band.y_err_high[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(band.y_err_low[0], 1.0, epsilon = 1e-12);
        assert_eq!(band.y_err_high[1], 0.0);
        assert_relative_eq!(band.y_err_low[2], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn band_statistical_term() {
        let mut nominal = Measurement::new(vec![vec![0.0, 1.0]]).unwrap();
        for _ in 0..4 {
            nominal.fill(&[0.5], 2.5);
        }
        let band = uncertainty_band(&nominal, &Uncertainty::default(), true).unwrap();
        // 10 / sqrt(4)
        assert_relative_eq!(band.y_err_high[0], 5.0, epsilon = 1e-12);
        assert_relative_eq!(band.y_err_low[0], 5.0, epsilon = 1e-12);
    }

    #[test]
    fn band_rejects_multi_dimensional_nominal() {
        let m = Measurement::new(vec![vec![0.0, 1.0], vec![0.0, 1.0]]).unwrap();
        assert!(uncertainty_band(&m, &Uncertainty::default(), false).is_err());
    }

    #[test]
    fn combine_bands() {
        let nominal = hist(&[10.0, 10.0]);
        let a = uncertainty_band(&nominal, &Uncertainty::overall(1.3, 0.7), false).unwrap();
        let b = uncertainty_band(&nominal, &Uncertainty::overall(1.4, 0.6), false).unwrap();
        let c = combine_uncertainty_bands(&[a, b], Some(&nominal), None).unwrap();
        assert_eq!(c.title, "Uncertainty");
        assert_eq!(c.y, vec![10.0, 10.0]);
        assert_relative_eq!(c.y_err_high[1], 5.0, epsilon = 1e-9);
        assert_relative_eq!(c.y_err_low[0], 5.0, epsilon = 1e-9);
        assert!(combine_uncertainty_bands(&[], None, None).is_err());
    }

    #[test]
    fn ratio_band() {
        let nominal = hist(&[10.0, 0.0, 4.0]);
        let mut band = Band::empty(&nominal).unwrap();
        band.y_err_high = vec![10.0, 0.0, 1.0];
        band.y_err_low = vec![5.0, 0.0, 4.0];
        let r = ratio_uncertainty_band(&nominal, &band).unwrap();
        assert_eq!(r.y, vec![1.0; 3]);
        assert_relative_eq!(r.y_err_high[0], 0.5);
        assert_relative_eq!(r.y_err_low[0], 1.0);
        assert_eq!(r.y_err_high[1], 1.0 - RATIO_UP_SENTINEL);
        assert_eq!(r.y_err_low[1], RATIO_DOWN_SENTINEL - 1.0);
        assert_relative_eq!(r.y_err_high[2], 0.2);
        assert_eq!(r.y_err_low[2], RATIO_DOWN_SENTINEL - 1.0);
    }
}
