//! A throwaway mining pool for manually exercising the coordinator against
//! the real Stratum dialect (§4.1, §6) without a live Zcash pool. Accepts
//! one connection at a time, replies to subscribe/authorize, then emits a
//! `mining.set_target` followed by a `mining.notify` every few seconds.
//! Not part of the coordinator proper; a development fixture only.

use rand::Rng;
use serde_json::{json, Value};
use std::error::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Duration;

const NONCE_LEFT_HEX: &str = "0a";
const TARGET_HEX: &str = "0000ffff0000000000000000000000000000000000000000000000000000";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let addr = std::env::var("MOCK_POOL_ADDR").unwrap_or_else(|_| "127.0.0.1:13333".to_string());
    let listener = TcpListener::bind(&addr).await?;
    log::info!("mock pool listening on {addr}");

    loop {
        let (socket, peer) = listener.accept().await?;
        log::info!("coordinator connected from {peer}");
        if let Err(err) = serve(socket).await {
            log::warn!("connection from {peer} ended: {err}");
        }
    }
}

async fn serve(socket: TcpStream) -> Result<(), Box<dyn Error>> {
    let (read_half, mut writer) = socket.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    let subscribe = read_request(&mut reader, &mut line).await?;
    log::info!("<- {subscribe}");
    let id = subscribe["id"].as_u64().unwrap_or(0);
    let response = json!({"id": id, "result": [null, NONCE_LEFT_HEX], "error": null});
    send(&mut writer, &response).await?;

    let authorize = read_request(&mut reader, &mut line).await?;
    log::info!("<- {authorize}");
    let id = authorize["id"].as_u64().unwrap_or(0);
    let response = json!({"id": id, "result": true, "error": null});
    send(&mut writer, &response).await?;

    let target_notice = json!({
        "id": null,
        "method": "mining.set_target",
        "params": [TARGET_HEX],
    });
    send(&mut writer, &target_notice).await?;

    let mut job_seq = 0u64;
    loop {
        job_seq += 1;
        let notify = random_notify(job_seq);
        send(&mut writer, &notify).await?;

        tokio::select! {
            result = read_request(&mut reader, &mut line) => {
                let request = result?;
                if request["method"] == "mining.submit" {
                    log::info!("<- share: {}", request["params"]);
                    let id = request["id"].as_u64().unwrap_or(0);
                    let response = json!({"id": id, "result": true, "error": null});
                    send(&mut writer, &response).await?;
                }
            }
            _ = tokio::time::sleep(Duration::from_secs(30)) => {}
        }
    }
}

fn random_notify(job_seq: u64) -> Value {
    let mut rng = rand::thread_rng();
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as u32;
    json!({
        "id": null,
        "method": "mining.notify",
        "params": [
            format!("job{job_seq}"),
            "04000000",
            hex::encode(rng.gen::<[u8; 32]>()),
            hex::encode(rng.gen::<[u8; 32]>()),
            "0".repeat(64),
            hex::encode(now.to_be_bytes()),
            "1d00ffff",
            true,
        ],
    })
}

async fn read_request(
    reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
    line: &mut String,
) -> std::io::Result<Value> {
    line.clear();
    let n = reader.read_line(line).await?;
    if n == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "coordinator closed the connection",
        ));
    }
    serde_json::from_str(line.trim())
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
}

async fn send(
    writer: &mut tokio::net::tcp::OwnedWriteHalf,
    value: &Value,
) -> std::io::Result<()> {
    writer.write_all(format!("{value}\n").as_bytes()).await
}
