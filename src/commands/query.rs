//! Query commands: status, button, endpoints, press

use std::path::Path;

use pressled_core::protocol::{opcode, status_bits};

use super::connect;

/// Print every LED followed by the button block
pub async fn status(socket: &Path) -> anyhow::Result<()> {
    let mut client = connect(socket).await?;
    print!("{}", client.read("all").await?);

    // Peek rather than consume the pressed flag
    let bits = client.control("button", opcode::BUTTON_GET_STATUS).await?;
    let mask = client.control("all", opcode::GET_STATUS).await?;
    println!("LED mask: 0b{:08b}", mask);
    println!(
        "Button: {} (pressed since last read: {})",
        if bits & status_bits::BUTTON_HELD != 0 {
            "held"
        } else {
            "up"
        },
        bits & status_bits::PRESSED_LATCH != 0
    );
    Ok(())
}

/// Print the button status text, optionally resetting first
pub async fn button(socket: &Path, reset: bool) -> anyhow::Result<()> {
    let mut client = connect(socket).await?;
    if reset {
        client.write("button", "r").await?;
        println!("Button state reset");
    }
    print!("{}", client.read("button").await?);
    Ok(())
}

pub async fn endpoints(socket: &Path) -> anyhow::Result<()> {
    let mut client = connect(socket).await?;
    for name in client.endpoints().await? {
        println!("{name}");
    }
    Ok(())
}

/// Tap the simulated button
pub async fn press(socket: &Path, times: u32, interval_ms: u64) -> anyhow::Result<()> {
    let mut client = connect(socket).await?;
    client.press(times, interval_ms).await?;
    println!("Pressed {times} time(s)");
    Ok(())
}
