//! Output filename derivation.
//!
//! Merged artifacts are named `<channel_code>_<HH-MM-SS>_<HH-MM-SS>.<ext>`,
//! where the time components come from the job's window timestamps.

use thiserror::Error;

/// Errors deriving an output filename.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamingError {
    #[error("Channel code is empty")]
    EmptyChannel,

    #[error("Timestamp has no time-of-day component: {0:?}")]
    MissingTime(String),
}

/// Extract the time-of-day portion of a timestamp for use in a filename.
///
/// Takes the text after the last `T` (the whole string when there is none),
/// replaces `:` with `-` and drops fractional seconds.
///
/// # Examples
/// ```
/// use clipmerge_models::time_of_day_component;
/// assert_eq!(time_of_day_component("2024-01-01T10:05:30.123").unwrap(), "10-05-30");
/// assert_eq!(time_of_day_component("2024-01-01T10-07-00.000").unwrap(), "10-07-00");
/// ```
pub fn time_of_day_component(timestamp: &str) -> Result<String, NamingError> {
    let time = timestamp.rsplit('T').next().unwrap_or_default().trim();
    let time = time.replace(':', "-");
    let whole_seconds = time.split('.').next().unwrap_or_default();

    if whole_seconds.is_empty() {
        return Err(NamingError::MissingTime(timestamp.to_string()));
    }

    Ok(whole_seconds.to_string())
}

/// Build the merged artifact filename for a channel and time window.
pub fn merged_filename(
    channel_code: &str,
    window_start: &str,
    window_end: &str,
    extension: &str,
) -> Result<String, NamingError> {
    if channel_code.trim().is_empty() {
        return Err(NamingError::EmptyChannel);
    }

    let start = time_of_day_component(window_start)?;
    let end = time_of_day_component(window_end)?;

    Ok(format!(
        "{}_{}_{}.{}",
        channel_code,
        start,
        end,
        extension.trim_start_matches('.')
    ))
}
