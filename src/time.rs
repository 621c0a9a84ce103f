use hifitime::Epoch;
use std::str::FromStr;

use crate::constants::{StepIndex, HOURS_PER_DAY, MJD};
use crate::stormtrack_errors::StormTrackError;

/// Transformation from a date in the format YYYY-MM-ddTHH:mm:ss to modified julian date (MJD)
///
/// Argument
/// --------
/// * `date`: a date string in the format YYYY-MM-ddTHH:mm:ss
///
/// Return
/// ------
/// * the input date as a modified julian date (MJD, UTC)
pub fn date_to_mjd(date: &str) -> Result<MJD, StormTrackError> {
    Epoch::from_str(date)
        .map(|e| e.to_mjd_utc_days())
        .map_err(|_| StormTrackError::InvalidTimestamp(date.to_string()))
}

/// Transformation from a modified julian date (MJD) to Gregorian calendar components
///
/// Argument
/// --------
/// * `mjd`: a modified julian date (UTC)
///
/// Return
/// ------
/// * (year, month, day, hour) of the corresponding UTC date
pub fn mjd_to_date(mjd: MJD) -> (i32, u8, u8, u8) {
    let (year, month, day, hour, _, _, _) = Epoch::from_mjd_utc(mjd).to_gregorian_utc();
    (year, month, day, hour)
}

/// Calculate the step number of a time point, with the first time point of a run
/// having a step number of one.
///
/// The step number is the nearest multiple of the output period, so time points
/// that drift by less than half a period from the nominal grid still map to the
/// expected step.
///
/// Arguments
/// ---------
/// * `first`: MJD of the first time point of the run
/// * `time`: MJD of the time point to convert
/// * `time_period_hours`: the period in hours between time points in the data
///
/// Return
/// ------
/// * the 1-based time step index at the specified time point
pub fn step_of(first: MJD, time: MJD, time_period_hours: f64) -> StepIndex {
    let elapsed_hours = (time - first) * HOURS_PER_DAY;
    (elapsed_hours / time_period_hours).round() as StepIndex + 1
}

/// Calculate the nominal MJD of a given step number.
///
/// Inverse of [`step_of`] on the nominal time grid.
pub fn time_at_step(first: MJD, step: StepIndex, time_period_hours: f64) -> MJD {
    first + (step as f64 - 1.0) * time_period_hours / HOURS_PER_DAY
}
