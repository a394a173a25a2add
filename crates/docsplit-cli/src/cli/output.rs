//! JSON output and error reporting shared by the commands.

use anyhow::Result;
use docsplit_core::error::EngineError;
use serde::Serialize;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print an engine error as JSON on stdout and turn it into a CLI error.
///
/// A busy rejection prints the admission body (counts and limits).
pub fn report(err: EngineError) -> anyhow::Error {
    let body = match &err {
        EngineError::Busy(busy) => serde_json::to_value(busy).ok(),
        other => Some(serde_json::json!({
            "error": format!("{:#}", other),
            "error_code": other.code(),
        })),
    };
    if let Some(body) = body {
        let _ = print_json(&body);
    }
    anyhow::Error::new(err)
}
