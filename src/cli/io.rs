//! JSON output for the CLI
//!
//! - One JSON object per line on stdout
//! - `{"status": "ok", "data": ...}` or `{"status": "error", "code": ..., "message": ...}`

use std::io::{self, Write};

use serde::Serialize;
use serde_json::{json, Value};

use crate::errors::{EvcError, EvcResult};

fn write_line(value: &Value) -> EvcResult<()> {
    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, value).map_err(|e| EvcError::storage(e.to_string()))?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}

/// Write a success response to stdout
pub fn write_response<T: Serialize>(data: &T) -> EvcResult<()> {
    let data = serde_json::to_value(data).map_err(|e| EvcError::storage(e.to_string()))?;
    write_line(&json!({
        "status": "ok",
        "data": data
    }))
}

/// Write an error response to stdout
pub fn write_error(error: &EvcError) -> EvcResult<()> {
    write_line(&json!({
        "status": "error",
        "code": error.code(),
        "message": error.to_string()
    }))
}
