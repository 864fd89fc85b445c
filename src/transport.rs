//! Line-oriented verdict stream: one query in, one JSON verdict out.

use crate::error::Result;
use crate::security::SqlValidator;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, trace};

/// Verdict written for each input line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineVerdict {
    pub query: String,
    pub accepted: bool,
    pub reason: Option<String>,
}

/// Counters reported when the input stream ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub accepted: u64,
    pub rejected: u64,
}

/// Validate one candidate query.
pub fn judge(validator: &SqlValidator, query: &str) -> LineVerdict {
    let verdict = validator.validate(query).verdict();
    LineVerdict {
        query: query.to_string(),
        accepted: verdict.accepted,
        reason: verdict.reason,
    }
}

/// Read queries line by line until EOF, writing a verdict line for each.
///
/// Blank lines are skipped. Invalid UTF-8 is decoded lossily and judged
/// like any other input.
pub async fn serve<R, W>(validator: &SqlValidator, mut reader: R, mut writer: W) -> Result<StreamStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut stats = StreamStats::default();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                error!("Error reading input: {}", e);
                return Err(e.into());
            }
        }

        let line = String::from_utf8_lossy(&buf);
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        trace!("Received line: {}", query);

        let verdict = judge(validator, query);
        if verdict.accepted {
            stats.accepted += 1;
        } else {
            stats.rejected += 1;
        }

        let json = serde_json::to_string(&verdict)?;
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    debug!(
        accepted = stats.accepted,
        rejected = stats.rejected,
        "Input stream closed"
    );
    Ok(stats)
}
