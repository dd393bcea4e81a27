use itertools::Itertools;
use ndarray::{
    Array1,
    Array2,
    ArrayView1,
    Axis,
};
use polars::prelude::*;

use super::Channel;
use crate::error::{
    CrosstalkError,
    Result,
};

/// Per-position four-channel intensities in canonical `(A, C, G, T)` order.
///
/// Every value is finite and non-negative. A frame with zero positions is
/// valid. Frames are immutable once built; transformations return new
/// frames.
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityFrame {
    data: Array2<f64>,
}

impl IntensityFrame {
    // CONSTRUCTORS
    pub fn empty() -> Self {
        Self {
            data: Array2::zeros((0, 4)),
        }
    }

    /// Wraps an `(n, 4)` array after validating shape and values.
    pub fn try_from_array(data: Array2<f64>) -> Result<Self> {
        if data.ncols() != 4 {
            return Err(CrosstalkError::Schema(format!(
                "expected 4 channels, found {}",
                data.ncols()
            )));
        }
        check_values(&data)?;
        Ok(Self { data })
    }

    pub fn try_from_rows(rows: &[[f64; 4]]) -> Result<Self> {
        let data = Array2::from_shape_fn((rows.len(), 4), |(i, j)| rows[i][j]);
        Self::try_from_array(data)
    }

    pub fn try_from_columns(
        a: Vec<f64>,
        c: Vec<f64>,
        g: Vec<f64>,
        t: Vec<f64>,
    ) -> Result<Self> {
        if ![a.len(), c.len(), g.len(), t.len()].iter().all_equal() {
            return Err(CrosstalkError::Schema(format!(
                "channel lengths differ: A={}, C={}, G={}, T={}",
                a.len(),
                c.len(),
                g.len(),
                t.len()
            )));
        }
        let mut data = Array2::zeros((a.len(), 4));
        for (channel, values) in Channel::ALL.iter().zip([a, c, g, t]) {
            data.column_mut(channel.index())
                .assign(&Array1::from(values));
        }
        Self::try_from_array(data)
    }

    /// Builds a frame from a table with four numeric columns labelled A, C,
    /// G and T (in any order, case-insensitive).
    pub fn try_from_df(df: &DataFrame) -> Result<Self> {
        let layout = ChannelLayout::try_from_df(df)?;
        let mut data = Array2::zeros((df.height(), 4));

        for (name, channel) in layout.names.iter().zip(layout.channels.iter()) {
            let values = numeric_column(df.column(name.as_str())?, name)?;
            data.column_mut(channel.index())
                .assign(&Array1::from(values));
        }

        Self::try_from_array(data)
    }

    /// Builds a frame from values that may have dropped below zero during
    /// signal processing; negatives are floored at zero.
    pub(crate) fn from_array_floored(mut data: Array2<f64>) -> Result<Self> {
        data.mapv_inplace(|v| if v < 0.0 { 0.0 } else { v });
        Self::try_from_array(data)
    }

    // CONVERSION
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn into_inner(self) -> Array2<f64> {
        self.data
    }

    /// Converts to a DataFrame with `Float64` columns `A, C, G, T`.
    pub fn to_df(&self) -> Result<DataFrame> {
        ChannelLayout::canonical().to_df(self)
    }

    // ACCESS
    pub fn len(&self) -> usize {
        self.data.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn row(
        &self,
        index: usize,
    ) -> Option<[f64; 4]> {
        (index < self.len()).then(|| {
            let row = self.data.row(index);
            [row[0], row[1], row[2], row[3]]
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = [f64; 4]> + '_ {
        self.data
            .axis_iter(Axis(0))
            .map(|row| [row[0], row[1], row[2], row[3]])
    }

    pub fn channel(
        &self,
        channel: Channel,
    ) -> ArrayView1<'_, f64> {
        self.data.column(channel.index())
    }
}

fn check_values(data: &Array2<f64>) -> Result<()> {
    for ((pos, ch), value) in data.indexed_iter() {
        let channel = Channel::from_index(ch).unwrap_or(Channel::A);
        if value.is_nan() {
            return Err(CrosstalkError::DataIntegrity(format!(
                "missing value in channel {} at position {}",
                channel, pos
            )));
        }
        if value.is_infinite() {
            return Err(CrosstalkError::DataIntegrity(format!(
                "non-finite value in channel {} at position {}",
                channel, pos
            )));
        }
        if *value < 0.0 {
            return Err(CrosstalkError::DataIntegrity(format!(
                "negative value {} in channel {} at position {}",
                value, channel, pos
            )));
        }
    }
    Ok(())
}

fn numeric_column(
    column: &Column,
    name: &str,
) -> Result<Vec<f64>> {
    let dtype = column.dtype();
    if !(dtype.is_integer() || dtype.is_float()) {
        return Err(CrosstalkError::DataIntegrity(format!(
            "channel column '{}' is not numeric ({})",
            name, dtype
        )));
    }
    if column.null_count() > 0 {
        return Err(CrosstalkError::DataIntegrity(format!(
            "channel column '{}' has {} missing values",
            name,
            column.null_count()
        )));
    }

    let casted = column
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    Ok(casted.f64()?.into_no_null_iter().collect())
}

/// Column names and their channels, in the order a caller's table used them.
///
/// Lets corrected data be written back with the caller's labels and column
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelLayout {
    names:    [PlSmallStr; 4],
    channels: [Channel; 4],
}

impl ChannelLayout {
    pub fn canonical() -> Self {
        Self::from_order(Channel::ALL)
    }

    /// Layout with upper-case labels in the given order.
    pub fn from_order(channels: [Channel; 4]) -> Self {
        Self {
            names: channels.map(|ch| PlSmallStr::from(ch.as_str())),
            channels,
        }
    }

    /// Reads the layout from a table's column labels. Exactly four columns
    /// are required and their labels must map one-to-one onto A, C, G, T.
    pub fn try_from_df(df: &DataFrame) -> Result<Self> {
        let names = df.get_column_names();
        if names.len() != 4 {
            return Err(CrosstalkError::Schema(format!(
                "expected exactly 4 channel columns, found {} ({})",
                names.len(),
                names.iter().join(", ")
            )));
        }

        let channels = names
            .iter()
            .map(|name| name.as_str().parse::<Channel>())
            .collect::<Result<Vec<_>>>()?;

        let duplicated = channels
            .iter()
            .duplicates()
            .map(|ch| ch.to_string())
            .collect_vec();
        if !duplicated.is_empty() {
            return Err(CrosstalkError::Schema(format!(
                "ambiguous channel labels: {} given more than once ({})",
                duplicated.join(", "),
                names.iter().join(", ")
            )));
        }

        Ok(Self {
            names:    [
                names[0].clone(),
                names[1].clone(),
                names[2].clone(),
                names[3].clone(),
            ],
            channels: [channels[0], channels[1], channels[2], channels[3]],
        })
    }

    pub fn channels(&self) -> &[Channel; 4] {
        &self.channels
    }

    pub fn names(&self) -> &[PlSmallStr; 4] {
        &self.names
    }

    /// Writes the frame as a table with this layout's labels and order.
    pub fn to_df(
        &self,
        frame: &IntensityFrame,
    ) -> Result<DataFrame> {
        let columns = self
            .names
            .iter()
            .zip(self.channels.iter())
            .map(|(name, channel)| {
                Column::new(name.clone(), frame.channel(*channel).to_vec())
            })
            .collect_vec();
        Ok(DataFrame::new(columns)?)
    }
}
