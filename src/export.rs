use crate::error::{LimitsError, Result};
use crate::schema::DashboardView;

/// The only export format currently supported.
pub const FORMAT_CSV: &str = "csv";

pub fn validate_format(format: &str) -> Result<()> {
    if format.eq_ignore_ascii_case(FORMAT_CSV) {
        Ok(())
    } else {
        Err(LimitsError::Validation(format!(
            "Unsupported export format '{}'; expected '{}'",
            format, FORMAT_CSV
        )))
    }
}

/// Projects a dashboard into a two-column `month,value` CSV stream, where
/// `value` is the cumulative total through the month.
pub fn dashboard_to_csv(view: &DashboardView) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["month", "value"])?;
    for entry in &view.months {
        writer.write_record([entry.month.to_string(), format!("{:.2}", entry.value)])?;
    }
    writer.flush()?;

    let bytes = writer
        .into_inner()
        .map_err(|err| LimitsError::Io(err.into_error()))?;
    String::from_utf8(bytes)
        .map_err(|err| LimitsError::Validation(format!("CSV output was not UTF-8: {}", err)))
}
