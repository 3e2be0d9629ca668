//! LED commands: led, all

use std::path::Path;

use crate::cli::LedAction;

use super::connect;

/// Switch one LED and print its new state
pub async fn led(socket: &Path, index: usize, action: LedAction) -> anyhow::Result<()> {
    let endpoint = format!("led{index}");
    let mut client = connect(socket).await?;
    client.write(&endpoint, action.token()).await?;
    print!("{}", client.read(&endpoint).await?);
    Ok(())
}

/// Switch every LED and print the result
pub async fn all(socket: &Path, action: LedAction) -> anyhow::Result<()> {
    let mut client = connect(socket).await?;
    client.write("all", action.token()).await?;
    print!("{}", client.read("all").await?);
    Ok(())
}
