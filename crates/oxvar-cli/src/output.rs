use crate::error::Result;
use nalgebra::DVector;
use oxvar::core::control::ControlIncrement;
use serde::Serialize;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use tracing::info;

#[derive(Debug, Serialize)]
struct IncrementRecord<'a> {
    component: &'a str,
    index: usize,
    increment: f64,
    /// Only state rows have an analysis value.
    analysis: Option<f64>,
}

fn writer(path: Option<&Path>) -> Result<csv::Writer<Box<dyn Write>>> {
    let sink: Box<dyn Write> = match path {
        Some(path) => {
            info!("Writing CSV output to {:?}", path);
            Box::new(File::create(path)?)
        }
        None => Box::new(io::stdout()),
    };
    Ok(csv::Writer::from_writer(sink))
}

/// One row per state component, followed by one row per auxiliary control variable.
pub fn write_increment(
    path: Option<&Path>,
    increment: &ControlIncrement<DVector<f64>>,
    analysis: &DVector<f64>,
) -> Result<()> {
    let mut wtr = writer(path)?;
    for (index, (dx, xa)) in increment.state().iter().zip(analysis.iter()).enumerate() {
        wtr.serialize(IncrementRecord {
            component: "state",
            index,
            increment: *dx,
            analysis: Some(*xa),
        })?;
    }
    for slot in 0..increment.n_aux() {
        let label = format!("aux{}", slot);
        for (index, value) in increment.aux(slot).into_iter().flatten().enumerate() {
            wtr.serialize(IncrementRecord {
                component: &label,
                index,
                increment: *value,
                analysis: None,
            })?;
        }
    }
    wtr.flush()?;
    Ok(())
}

/// A grid-index column followed by one column per member perturbation.
pub fn write_perturbations(
    path: Option<&Path>,
    names: &[String],
    perturbations: &[DVector<f64>],
) -> Result<()> {
    let mut wtr = writer(path)?;
    let mut header = vec!["index".to_string()];
    header.extend(names.iter().cloned());
    wtr.write_record(&header)?;

    let rows = perturbations.first().map_or(0, |p| p.len());
    for i in 0..rows {
        let mut record = vec![i.to_string()];
        record.extend(perturbations.iter().map(|p| p[i].to_string()));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}
