//! Machine-readable output

use serde::Serialize;

use crate::cli::Format;
use crate::error::Result;

pub fn print<T: Serialize + ?Sized>(value: &T, format: Format) -> Result<()> {
    let text = match format {
        Format::Yaml => serde_yaml::to_string(value)?,
        Format::Json => serde_json::to_string_pretty(value)? + "\n",
    };
    print!("{text}");
    Ok(())
}
