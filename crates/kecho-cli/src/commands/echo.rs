//! `kecho echo [TEXT]` — write once, then drain the session to stdout.

use super::Target;
use anyhow::{Context, Result};
use std::io::{Read, Write};
use tracing::info;

pub async fn run(target: &Target, text: Option<String>, chunk: usize) -> Result<()> {
    anyhow::ensure!(chunk > 0, "--chunk must be at least 1");

    let payload = match text {
        Some(text) => text.into_bytes(),
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
    };

    let mut client = target.connect().await?;
    let written = client.write(&payload).await.context("write failed")?;
    let echoed = client.drain(chunk).await.context("read failed")?;
    client.close().await.context("close failed")?;
    info!(written, echoed = echoed.len(), chunk, "echo complete");

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&echoed)?;
    stdout.flush()?;
    Ok(())
}
