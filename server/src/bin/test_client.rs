use futures_util::{SinkExt, StreamExt};
use shared::{decode_frame, encode_frame, ClientInput, Snapshot};
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:3000".to_string());

    println!("Connecting to {}", url);
    let (mut ws, _) = connect_async(&url).await?;
    println!("Connected");

    // Steer in a slow circle and print whatever snapshots come back
    for i in 0..10 {
        let angle = i as f32 / 5.0;
        let input = ClientInput {
            vel_x: angle.sin() * 4.0,
            vel_y: angle.cos() * 4.0,
        };

        let payload = bincode::serialize(&input)?;
        println!("Sending input: {:?}", input);
        ws.send(Message::Binary(encode_frame(&payload)?)).await?;

        // Read snapshots for roughly one second before the next input
        let window = tokio::time::Instant::now() + Duration::from_secs(1);
        loop {
            let remaining = window.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }

            let msg = match timeout(remaining, ws.next()).await {
                Err(_) => break,
                Ok(None) => {
                    println!("Server closed the connection");
                    return Ok(());
                }
                Ok(Some(msg)) => msg?,
            };

            if let Message::Binary(data) = msg {
                let payload = decode_frame(&mut data.as_slice())?;
                let snapshot: Snapshot = bincode::deserialize(&payload)?;
                println!(
                    "Snapshot - time: {:.2}, entities: {}",
                    snapshot.time,
                    snapshot.entities.len()
                );
                for e in &snapshot.entities {
                    println!(
                        "  Entity {}: pos=({:.2}, {:.2}), vel=({:.2}, {:.2})",
                        e.id, e.x, e.y, e.vel_x, e.vel_y
                    );
                }
            }
        }
    }

    println!("Closing connection");
    ws.close(None).await?;
    println!("Test client finished");

    Ok(())
}
