use log::*;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{
    Rng,
    SeedableRng,
};
use rand_distr::{
    Distribution,
    Normal,
};

use crate::data_structs::{
    Channel,
    CrosstalkModel,
    IntensityFrame,
};
use crate::error::{
    CrosstalkError,
    Result,
};
use crate::with_field_fn;

/// Peaks further than this many widths from a sample contribute nothing.
const PEAK_SUPPORT: f64 = 8.0;
const MAX_MODEL_ATTEMPTS: usize = 100;

/// A generated trace together with the ground truth used to make it.
#[derive(Debug, Clone)]
pub struct SyntheticSample {
    /// Observed (mixed, noisy) intensities.
    pub frame: IntensityFrame,
    /// Mixing matrix applied to the pure signal.
    pub model: CrosstalkModel,
    /// Base called at every peak, in time order.
    pub bases: Vec<Channel>,
}

/// Generator of synthetic four-channel sequencing traces.
///
/// Every base of a random sequence produces a Gaussian peak in its own
/// channel. The pure traces are mixed by a crosstalk matrix and Gaussian
/// noise is added.
#[derive(Debug, Clone)]
pub struct SyntheticTrace {
    /// Number of bases.
    pub n:           usize,
    /// Distance between consecutive peaks, in base units.
    pub peak_space:  usize,
    /// Peak standard deviation, in base units.
    pub peak_width:  f64,
    pub peak_height: f64,
    /// Samples per base unit.
    pub detail:      usize,
    /// Noise standard deviation relative to `peak_height`.
    pub noise_level: f64,
    /// Relative spread of peak heights around `peak_height`.
    pub peak_rand:   f64,
    /// Mixing matrix; a random banded matrix is drawn when `None`.
    pub model:       Option<CrosstalkModel>,
    pub seed:        Option<u64>,
}

impl Default for SyntheticTrace {
    fn default() -> Self {
        Self {
            n:           1000,
            peak_space:  10,
            peak_width:  1.3,
            peak_height: 1000.0,
            detail:      3,
            noise_level: 0.007,
            peak_rand:   0.5,
            model:       None,
            seed:        None,
        }
    }
}

impl SyntheticTrace {
    with_field_fn!(n, usize);

    with_field_fn!(peak_space, usize);

    with_field_fn!(peak_width, f64);

    with_field_fn!(peak_height, f64);

    with_field_fn!(detail, usize);

    with_field_fn!(noise_level, f64);

    with_field_fn!(peak_rand, f64);

    with_field_fn!(model, Option<CrosstalkModel>);

    with_field_fn!(seed, Option<u64>);

    fn validate(&self) -> Result<()> {
        if self.detail == 0 || self.peak_space == 0 {
            return Err(CrosstalkError::Parameter(
                "peak_space and detail must be positive".into(),
            ));
        }
        if !(self.peak_width > 0.0) || !(self.peak_height > 0.0) {
            return Err(CrosstalkError::Parameter(
                "peak_width and peak_height must be positive".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.peak_rand) || self.noise_level < 0.0 {
            return Err(CrosstalkError::Parameter(format!(
                "peak_rand must lie in [0, 1) and noise_level must be \
                 non-negative (got {}, {})",
                self.peak_rand, self.noise_level
            )));
        }
        Ok(())
    }

    pub fn generate(&self) -> Result<SyntheticSample> {
        self.validate()?;
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let model = match &self.model {
            Some(model) => model.clone(),
            None => random_crosstalk(&mut rng)?,
        };

        let bases = (0..self.n)
            .map(|_| *Channel::ALL.choose(&mut rng).unwrap_or(&Channel::A))
            .collect::<Vec<_>>();

        let slot = self.peak_space * self.detail;
        let len = slot * self.n;
        let width = self.peak_width * self.detail as f64;
        let support = (PEAK_SUPPORT * width).ceil() as usize;

        let mut pure = Array2::<f64>::zeros((len, 4));
        for (k, base) in bases.iter().enumerate() {
            let amplitude = if self.peak_rand > 0.0 {
                rng.gen_range(
                    self.peak_height * (1.0 - self.peak_rand)
                        ..self.peak_height * (1.0 + self.peak_rand),
                )
            }
            else {
                self.peak_height
            };
            let center = k * slot + rng.gen_range(0..self.detail);

            let start = center.saturating_sub(support);
            let end = (center + support + 1).min(len);
            for t in start..end {
                let d = t as f64 - center as f64;
                pure[(t, base.index())] +=
                    amplitude * (-(d * d) / (2.0 * width * width)).exp();
            }
        }

        let mut observed = model.mix(&IntensityFrame::try_from_array(pure)?)?.into_inner();

        let sd = self.peak_height * self.noise_level;
        if sd > 0.0 {
            let noise = Normal::new(0.0, sd)
                .map_err(|e| CrosstalkError::Parameter(e.to_string()))?;
            observed.mapv_inplace(|v| v + noise.sample(&mut rng));
        }

        debug!(
            "Generated synthetic trace: {} bases, {} positions, noise sd {:.3}",
            self.n, len, sd
        );

        Ok(SyntheticSample {
            frame: IntensityFrame::from_array_floored(observed)?,
            model,
            bases,
        })
    }
}

/// Draws a banded crosstalk matrix: unit diagonal, with leakage into the
/// spectrally neighbouring channels decaying with distance.
pub fn random_crosstalk<R: Rng>(rng: &mut R) -> Result<CrosstalkModel> {
    for _ in 0..MAX_MODEL_ATTEMPTS {
        let profiles = (0..4).map(|_| leakage_profile(rng)).collect::<Vec<_>>();
        // Column `j` is the seven-wide profile of channel `j`, centred on the
        // diagonal.
        let rows = std::array::from_fn(|i| {
            std::array::from_fn(|j| profiles[j][3 + i - j])
        });
        match CrosstalkModel::try_from_rows(rows) {
            Ok(model) => return Ok(model),
            Err(e) => trace!("Rejected random crosstalk matrix: {}", e),
        }
    }
    Err(CrosstalkError::Model(format!(
        "could not draw an invertible crosstalk matrix in {} attempts",
        MAX_MODEL_ATTEMPTS
    )))
}

/// Seven leakage values with `1.0` in the middle, each further value drawn
/// below the smaller of the current ends.
fn leakage_profile<R: Rng>(rng: &mut R) -> [f64; 7] {
    let mut profile = std::collections::VecDeque::from([1.0_f64]);
    for _ in 0..3 {
        let front = *profile.front().unwrap_or(&1.0);
        let back = *profile.back().unwrap_or(&1.0);
        let cur_min = front.min(back);
        profile.push_back(rng.gen::<f64>() * cur_min);
        profile.push_front(rng.gen::<f64>() * cur_min);
    }
    std::array::from_fn(|i| profile[i])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_generation_is_reproducible() {
        let config = SyntheticTrace::default().with_n(50).with_seed(Some(42));
        let first = config.generate().unwrap();
        let second = config.generate().unwrap();

        assert_eq!(first.frame, second.frame);
        assert_eq!(first.bases, second.bases);
        assert_eq!(first.model, second.model);
        assert_eq!(first.frame.len(), 50 * 10 * 3);
        assert_eq!(first.bases.len(), 50);
    }

    #[test]
    fn random_crosstalk_is_banded() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..20 {
            let model = random_crosstalk(&mut rng).unwrap();
            for ch in Channel::ALL {
                assert_eq!(model.leakage(ch, ch), 1.0);
            }
            for j in 0..4 {
                for i in 0..4 {
                    let value = model.mixing()[(i, j)];
                    assert!((0.0..=1.0).contains(&value));
                }
            }
            // Leakage never grows with spectral distance.
            assert!(
                model.leakage(Channel::A, Channel::C)
                    >= model.leakage(Channel::A, Channel::G)
            );
            assert!(
                model.leakage(Channel::A, Channel::G)
                    >= model.leakage(Channel::A, Channel::T)
            );
        }
    }

    #[test]
    fn noiseless_peaks_follow_the_mixing_model() {
        let model = CrosstalkModel::try_from_rows([
            [1.0, 0.2, 0.0, 0.0],
            [0.1, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
        .unwrap();
        let sample = SyntheticTrace::default()
            .with_n(20)
            .with_noise_level(0.0)
            .with_peak_rand(0.0)
            .with_model(Some(model))
            .with_seed(Some(1))
            .generate()
            .unwrap();

        for (k, base) in sample.bases.iter().enumerate() {
            // Peak centre lies within the first `detail` samples of the slot.
            let peak = (k * 30..k * 30 + 3)
                .filter_map(|t| sample.frame.row(t))
                .max_by(|a, b| a[base.index()].total_cmp(&b[base.index()]))
                .unwrap();
            assert!((peak[base.index()] - 1000.0).abs() < 1e-6);
            if *base == Channel::A {
                assert!((peak[Channel::C.index()] - 100.0).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let err = SyntheticTrace::default().with_detail(0).generate().unwrap_err();
        assert!(matches!(err, CrosstalkError::Parameter(_)));
    }
}
