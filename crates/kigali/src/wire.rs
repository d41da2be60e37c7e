//! The engine's wire output.
//!
//! Successful runs emit an `OK` preamble, a blank line, and a CSV body with
//! one row per (scenario, trial, year, application, substance). Every cell
//! is `"<value> <units>"` with locale-independent decimal rendering. Error
//! responses are a single prefixed line followed by a blank line.

use engine::EngineResult;
use primitives::{EngineError, Quantity};
use std::io::{self, Write};

/// Column order of the CSV body.
pub const COLUMNS: [&str; 19] = [
    "scenario",
    "trial",
    "year",
    "application",
    "substance",
    "domestic",
    "import",
    "recycle",
    "domesticConsumption",
    "importConsumption",
    "recycleConsumption",
    "population",
    "populationNew",
    "rechargeEmissions",
    "eolEmissions",
    "energyConsumption",
    "initialChargeValue",
    "initialChargeConsumption",
    "importNewPopulation",
];

fn cell(quantity: &Quantity) -> String {
    quantity.to_string()
}

fn csv_to_io(error: csv::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, error)
}

/// Writes the `OK` preamble and the result rows.
pub fn write_results<W: Write>(mut out: W, results: &[EngineResult]) -> io::Result<()> {
    out.write_all(b"OK\n\n")?;
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(COLUMNS).map_err(csv_to_io)?;
    for result in results {
        writer
            .write_record([
                result.scenario.clone(),
                result.trial.to_string(),
                result.year.to_string(),
                result.application.clone(),
                result.substance.clone(),
                cell(&result.domestic),
                cell(&result.import),
                cell(&result.recycle),
                cell(&result.domestic_consumption),
                cell(&result.import_consumption),
                cell(&result.recycle_consumption),
                cell(&result.population),
                cell(&result.population_new),
                cell(&result.recharge_emissions),
                cell(&result.eol_emissions),
                cell(&result.energy_consumption),
                cell(&result.trade.value),
                cell(&result.trade.consumption),
                cell(&result.trade.new_population),
            ])
            .map_err(csv_to_io)?;
    }
    writer.flush()
}

/// Writes a script (compile-time) error response.
pub fn write_compile_error<W: Write>(mut out: W, message: &str) -> io::Result<()> {
    write!(out, "Compilation Error: {message}\n\n")
}

/// Writes an engine (run-time) error response.
pub fn write_runtime_error<W: Write>(mut out: W, error: &EngineError) -> io::Result<()> {
    write!(out, "Runtime Error: {error}\n\n")
}
