//! Connects to a running Interval channel, prints every rollup it receives
//! and optionally sends `stop` after a number of frames.

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// WebSocket endpoint of the polling channel
    #[clap(short, long, default_value = "ws://localhost:4006/ws")]
    url: String,

    /// Number of rollup frames to print before exiting (0 = run forever)
    #[clap(short, long, default_value_t = 5)]
    frames: usize,

    /// Send `{"message":"stop"}` before disconnecting
    #[clap(short, long)]
    stop: bool,
}

fn print_rollup(text: &str) {
    match serde_json::from_str::<Vec<Value>>(text) {
        Ok(rows) => {
            println!("----- rollup ({} rows) -----", rows.len());
            for row in rows {
                println!(
                    "lane {:>9}: ng {:>5}  ok {:>5}  total {:>5}",
                    row["lane_no"], row["ng_count_today"], row["ok_count_today"], row["total"]
                );
            }
        }
        // Error replies are plain text.
        Err(_) => println!("server says: {}", text),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    println!("Connecting to {}...", args.url);
    let (ws_stream, _) = connect_async(args.url.as_str()).await?;
    let (mut write, mut read) = ws_stream.split();
    println!("Connected. Press Ctrl+C to stop.");

    let mut seen = 0;
    while let Some(msg) = read.next().await {
        match msg? {
            Message::Text(text) => {
                print_rollup(text.as_str());
                seen += 1;
                if args.frames != 0 && seen >= args.frames {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    if args.stop {
        let stop = json!({ "message": "stop" }).to_string();
        write.send(Message::Text(stop.into())).await?;
        println!("Stop sent.");
    }
    write.send(Message::Close(None)).await?;
    Ok(())
}
