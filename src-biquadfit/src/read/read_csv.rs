use std::fs::File;
use std::path::Path;

use crate::Curve;
use crate::error::{FitError, Result};
use ndarray::Array1;

/// Load frequency response data from a CSV or text file
///
/// Expected formats:
/// - 2 columns: frequency, spl
/// - 4 columns: freq_left, spl_left, freq_right, spl_right (averaged)
///
/// Comma, semicolon, tab and space separated files are accepted. Lines
/// starting with `#` and rows that do not parse as numbers (headers) are
/// skipped.
pub fn load_frequency_response(path: &Path) -> Result<(Array1<f64>, Array1<f64>)> {
    let delimiter = sniff_delimiter(path)?;
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .delimiter(delimiter)
        .from_reader(file);

    let mut frequencies = Vec::new();
    let mut spl_values = Vec::new();
    let mut detected_columns = 0;

    for record in reader.records() {
        let record = record?;
        let parts: Vec<f64> = match record
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
        {
            Ok(parts) => parts,
            // header or garbage line
            Err(_) => continue,
        };

        if detected_columns == 0 && parts.len() >= 2 {
            detected_columns = parts.len();
        }

        if detected_columns >= 4 && parts.len() >= 4 {
            frequencies.push(parts[0]);
            spl_values.push((parts[1] + parts[3]) / 2.0);
        } else if parts.len() >= 2 {
            frequencies.push(parts[0]);
            spl_values.push(parts[1]);
        }
    }

    if frequencies.is_empty() {
        return Err(FitError::input(format!(
            "no frequency response data found in {}",
            path.display()
        )));
    }

    Ok((Array1::from_vec(frequencies), Array1::from_vec(spl_values)))
}

fn sniff_delimiter(path: &Path) -> Result<u8> {
    let text = std::fs::read_to_string(path)?;
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .unwrap_or("");
    Ok(if line.contains(',') {
        b','
    } else if line.contains(';') {
        b';'
    } else if line.contains('\t') {
        b'\t'
    } else {
        b' '
    })
}

/// Read a frequency response curve from a CSV file
pub fn read_curve_from_csv(path: &Path) -> Result<Curve> {
    let (freq, spl) = load_frequency_response(path)?;
    Ok(Curve::new(freq, spl))
}

/// Write several curves sharing one grid as CSV columns.
///
/// The first column is `frequency`, followed by one column per `(name, values)`.
pub fn write_curves_to_csv(
    path: &Path,
    freq: &Array1<f64>,
    columns: &[(&str, &Array1<f64>)],
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    let mut header = vec!["frequency"];
    header.extend(columns.iter().map(|(name, _)| *name));
    writer.write_record(&header)?;
    for (i, f) in freq.iter().enumerate() {
        let mut row = vec![format!("{:.2}", f)];
        row.extend(columns.iter().map(|(_, v)| format!("{:.4}", v[i])));
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}
