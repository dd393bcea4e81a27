use nalgebra::{
    Matrix4,
    Vector4,
};
use ndarray::{
    Array2,
    Axis,
    Zip,
};
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
};

use super::{
    Channel,
    IntensityFrame,
};
use crate::error::{
    CrosstalkError,
    Result,
};

/// Smallest absolute determinant accepted for a mixing matrix.
pub const SINGULAR_DETERMINANT: f64 = 1e-12;

/// Linear crosstalk model.
///
/// `mixing[(i, j)]` is the fraction of the true signal of channel `j` that
/// is observed in channel `i`, so `observed = mixing * true`. Rows and
/// columns follow the canonical channel order. The inverse is computed once
/// at construction; a model always holds an invertible matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct CrosstalkModel {
    mixing:   Matrix4<f64>,
    unmixing: Matrix4<f64>,
}

impl CrosstalkModel {
    /// No crosstalk. Used when no instrument calibration is available.
    pub fn identity() -> Self {
        Self {
            mixing:   Matrix4::identity(),
            unmixing: Matrix4::identity(),
        }
    }

    pub fn try_new(mixing: Matrix4<f64>) -> Result<Self> {
        if mixing.iter().any(|v| !v.is_finite()) {
            return Err(CrosstalkError::Model(
                "mixing matrix contains non-finite entries".into(),
            ));
        }
        let det = mixing.determinant();
        if det.abs() < SINGULAR_DETERMINANT {
            return Err(CrosstalkError::Model(format!(
                "mixing matrix is singular (determinant {:e})",
                det
            )));
        }
        let unmixing = mixing
            .try_inverse()
            .filter(|inv| inv.iter().all(|v| v.is_finite()))
            .ok_or_else(|| {
                CrosstalkError::Model("mixing matrix is not invertible".into())
            })?;

        Ok(Self { mixing, unmixing })
    }

    /// Row-major constructor: `rows[i][j]` is the leakage of channel `j`
    /// into channel `i`.
    pub fn try_from_rows(rows: [[f64; 4]; 4]) -> Result<Self> {
        Self::try_new(Matrix4::from_fn(|i, j| rows[i][j]))
    }

    pub fn mixing(&self) -> &Matrix4<f64> {
        &self.mixing
    }

    pub fn unmixing(&self) -> &Matrix4<f64> {
        &self.unmixing
    }

    pub fn to_rows(&self) -> [[f64; 4]; 4] {
        let mut rows = [[0.0; 4]; 4];
        for (i, row) in rows.iter_mut().enumerate() {
            for (j, value) in row.iter_mut().enumerate() {
                *value = self.mixing[(i, j)];
            }
        }
        rows
    }

    /// Leakage of the true signal of `from` into the observed `into` channel.
    pub fn leakage(
        &self,
        from: Channel,
        into: Channel,
    ) -> f64 {
        self.mixing[(into.index(), from.index())]
    }

    /// Scales every column to sum to one.
    pub fn column_normalized(&self) -> Result<Self> {
        let mut normalized = self.mixing;
        for mut column in normalized.column_iter_mut() {
            let sum = column.sum();
            if sum.abs() < f64::EPSILON {
                return Err(CrosstalkError::Model(
                    "cannot normalize a mixing column that sums to zero".into(),
                ));
            }
            column /= sum;
        }
        Self::try_new(normalized)
    }

    /// Mean absolute element-wise difference between two mixing matrices.
    pub fn difference(
        &self,
        other: &Self,
    ) -> f64 {
        (self.mixing - other.mixing).abs().mean()
    }

    /// Unmixes a single observation without clamping.
    #[inline]
    pub fn unmix(
        &self,
        observed: [f64; 4],
    ) -> [f64; 4] {
        let out = self.unmixing * Vector4::from(observed);
        [out[0], out[1], out[2], out[3]]
    }

    /// Applies the forward model to every position, as the instrument would.
    pub fn mix(
        &self,
        frame: &IntensityFrame,
    ) -> Result<IntensityFrame> {
        let mut out = Array2::zeros(frame.data().raw_dim());
        Zip::from(out.axis_iter_mut(Axis(0)))
            .and(frame.data().axis_iter(Axis(0)))
            .par_for_each(|mut dst, src| {
                let mixed =
                    self.mixing * Vector4::new(src[0], src[1], src[2], src[3]);
                for (d, m) in dst.iter_mut().zip(mixed.iter()) {
                    *d = *m;
                }
            });
        // Negative leakage coefficients can push a mixed value below zero.
        IntensityFrame::from_array_floored(out)
    }
}

impl Default for CrosstalkModel {
    fn default() -> Self {
        Self::identity()
    }
}

/// On-disk calibration layout.
#[derive(Serialize, Deserialize)]
struct CalibrationRecord {
    channels: [Channel; 4],
    mixing:   [[f64; 4]; 4],
}

impl Serialize for CrosstalkModel {
    fn serialize<S>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer, {
        CalibrationRecord {
            channels: Channel::ALL,
            mixing:   self.to_rows(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CrosstalkModel {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>, {
        let record = CalibrationRecord::deserialize(deserializer)?;

        // Reorder into the canonical channel order.
        let mut rows = [[0.0; 4]; 4];
        for (i, row_ch) in record.channels.iter().enumerate() {
            for (j, col_ch) in record.channels.iter().enumerate() {
                rows[row_ch.index()][col_ch.index()] = record.mixing[i][j];
            }
        }
        let mut seen = [false; 4];
        record.channels.iter().for_each(|ch| seen[ch.index()] = true);
        if !seen.iter().all(|s| *s) {
            return Err(serde::de::Error::custom(
                "calibration channels must list A, C, G, T exactly once",
            ));
        }

        CrosstalkModel::try_from_rows(rows).map_err(serde::de::Error::custom)
    }
}
