use crate::spectrum::Spectrum;

/// Gaussian width used for synthetic profile peaks
pub const PEAK_WIDTH: f64 = 0.1;

pub fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    let step = (stop - start) / (num - 1) as f64;
    (0..num).map(|i| start + step * i as f64).collect()
}

/// Render a weighted sum of stick spectra as a noiseless profile sampled at `x`
pub fn gaussian_broaden(x: &[f64], components: &[(&Spectrum, f64)]) -> Spectrum {
    let intensity = x
        .iter()
        .map(|xi| {
            components
                .iter()
                .map(|(sticks, weight)| {
                    sticks
                        .iter()
                        .map(|(mz, int)| {
                            let z = (xi - mz) / PEAK_WIDTH;
                            weight * int * (-0.5 * z * z).exp()
                        })
                        .sum::<f64>()
                })
                .sum()
        })
        .collect();
    Spectrum::new(x.to_vec(), intensity).unwrap()
}

/// A sampling grid covering every pattern with a 5% margin on either side, as the
/// synthetic spectra are generated.
pub fn covering_grid(patterns: &[&Spectrum], num: usize) -> Vec<f64> {
    let lo = patterns
        .iter()
        .filter_map(|p| p.min_mz())
        .fold(f64::INFINITY, f64::min);
    let hi = patterns
        .iter()
        .filter_map(|p| p.max_mz())
        .fold(f64::NEG_INFINITY, f64::max);
    linspace(lo * 0.95, hi * 1.05, num)
}
