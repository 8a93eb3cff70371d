use std::io::Write;

use crate::error::TransferError;

/// Write any serializable value as pretty-printed JSON
pub fn write_json<T, W>(data: &T, mut writer: W) -> Result<(), TransferError>
where
    T: serde::Serialize + ?Sized,
    W: Write,
{
    serde_json::to_writer_pretty(&mut writer, data)?;
    writeln!(writer).map_err(serde_json::Error::io)?;
    writer.flush().map_err(serde_json::Error::io)?;
    Ok(())
}
