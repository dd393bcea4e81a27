use std::fs::File;
use std::path::Path;

use anyhow::{
    anyhow,
    Context,
};
use itertools::Itertools;
use polars::prelude::*;
use xtalk::data_structs::ChannelLayout;
use xtalk::{
    Channel,
    CrosstalkModel,
    IntensityFrame,
};

pub const SEPARATOR: u8 = b';';

/// Reads a header-less `;`-separated trace. The first four columns are the
/// channels in `order`; further columns are ignored. A file without any
/// rows reads as an empty trace.
pub fn read_trace(
    path: &Path,
    order: &[Channel; 4],
) -> anyhow::Result<DataFrame> {
    let size = std::fs::metadata(path)
        .with_context(|| format!("Failed to read {}", path.display()))?
        .len();
    if size == 0 {
        return empty_trace(order);
    }

    let df = match CsvReadOptions::default()
        .with_has_header(false)
        .with_parse_options(CsvParseOptions::default().with_separator(SEPARATOR))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
    {
        Ok(df) => df,
        Err(PolarsError::NoData(_)) => return empty_trace(order),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()))
        },
    };

    if df.width() < 4 {
        return Err(anyhow!(
            "{} has {} columns, expected at least 4",
            path.display(),
            df.width()
        ));
    }

    let columns = df
        .get_columns()
        .iter()
        .take(4)
        .zip(order.iter())
        .map(|(column, channel)| column.clone().with_name(channel.as_str().into()))
        .collect_vec();
    Ok(DataFrame::new(columns)?)
}

fn empty_trace(order: &[Channel; 4]) -> anyhow::Result<DataFrame> {
    let columns = order
        .iter()
        .map(|channel| Column::new(channel.as_str().into(), Vec::<f64>::new()))
        .collect_vec();
    Ok(DataFrame::new(columns)?)
}

/// Writes a header-less `;`-separated trace in the layout's column order.
pub fn write_trace(
    path: &Path,
    frame: &IntensityFrame,
    layout: &ChannelLayout,
) -> anyhow::Result<()> {
    let mut df = layout.to_df(frame)?;
    let mut file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    CsvWriter::new(&mut file)
        .include_header(false)
        .with_separator(SEPARATOR)
        .finish(&mut df)?;
    Ok(())
}

pub fn read_model(path: &Path) -> anyhow::Result<CrosstalkModel> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open calibration {}", path.display()))?;
    serde_json::from_reader(file)
        .with_context(|| format!("Invalid calibration {}", path.display()))
}

pub fn write_model(
    path: &Path,
    model: &CrosstalkModel,
) -> anyhow::Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, model)?;
    Ok(())
}

pub fn format_model(model: &CrosstalkModel) -> String {
    let header = format!(
        "      {}",
        Channel::ALL.iter().map(|c| format!("{:>8}", c)).join("")
    );
    let rows = model
        .to_rows()
        .iter()
        .zip(Channel::ALL.iter())
        .map(|(row, channel)| {
            format!(
                "{:>6}{}",
                channel.as_str(),
                row.iter().map(|v| format!("{:>8.4}", v)).join("")
            )
        })
        .join("\n");
    format!("{}\n{}", header, rows)
}
