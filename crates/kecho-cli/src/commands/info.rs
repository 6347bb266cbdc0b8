//! `kecho info` — describe the endpoint as JSON.

use super::Target;
use anyhow::{bail, Result};
use kecho_core::{Request, Response};

pub async fn run(target: &Target) -> Result<()> {
    let mut client = target.connect().await?;
    let response = client.call(&Request::Info).await?;
    client.close().await?;

    match response {
        Response::Info { .. } => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        other => bail!("unexpected response to info: {other:?}"),
    }
}
