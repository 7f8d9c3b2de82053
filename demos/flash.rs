//! Flash an Intel HEX file to a board over a serial port.
//!
//! ```text
//! cargo run --example flash -- /dev/ttyACM0 uno firmware.hex [boards.json]
//! ```
//!
//! Set `RUST_LOG=stk500_uploader=debug` to see every command. Ctrl-C cancels
//! between pages.

use std::process::ExitCode;

use stk500_uploader::{BoardTable, SerialTransport, UploadProgress, Uploader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let [port, board_id, hex_path, rest @ ..] = args.as_slice() else {
        let ids = BoardTable::builtin().ids().join(", ");
        return Err(format!(
            "usage: flash <port> <board> <file.hex> [boards.json]\nboards: {}",
            ids
        )
        .into());
    };

    let mut boards = BoardTable::builtin();
    if let Some(path) = rest.first() {
        boards.extend(BoardTable::from_json(&std::fs::read_to_string(path)?)?);
    }
    let board = boards.require(board_id)?.clone();
    let firmware = std::fs::read_to_string(hex_path)?;

    let uploader = Uploader::new(board);
    let cancel = uploader.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let report = uploader
        .upload(
            SerialTransport::new(port.as_str()),
            &firmware,
            |p: &UploadProgress| println!("[{:3}%] {:?}: {}", p.percent, p.stage, p.message),
        )
        .await?;

    println!(
        "Wrote {} bytes in {} pages ({} sync attempts, {:.1?})",
        report.bytes_written, report.pages_written, report.sync_attempts, report.elapsed
    );
    Ok(())
}
