use std::net::SocketAddr;
use log::{debug, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tokio_util::sync::CancellationToken;

use crate::relay::event_bus::{EventBus, RelayMessage};

async fn serve_subscriber(
    cancel: CancellationToken,
    mut stream: TcpStream,
    address: SocketAddr,
    mut messages: Receiver<RelayMessage>,
) {
    'mainloop: loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break 'mainloop;
            },
            message = messages.recv() => match message {
                Ok(message) => {
                    let mut line = match serde_json::to_string(&message) {
                        Ok(line) => line,
                        Err(err) => {
                            warn!("Failed to encode relay message: {}", err);
                            continue;
                        },
                    };
                    line.push('\n');

                    if let Err(err) = stream.write_all(line.as_bytes()).await {
                        info!("Subscriber {} disconnected: {}", address, err);
                        break 'mainloop;
                    }
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Subscriber {} lagged, {} events were dropped", address, skipped);
                },
                Err(RecvError::Closed) => {
                    break 'mainloop;
                },
            },
        }
    }

    debug!("Stopped relaying to {}", address);
}

/// Accepts subscribers until `cancel` is cancelled. Every subscriber receives each event
/// published on `bus` after it connected, as one JSON object per line.
pub async fn serve(cancel: CancellationToken, listener: TcpListener, bus: EventBus) {
    'mainloop: loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break 'mainloop;
            },
            accepted = listener.accept() => match accepted {
                Ok((stream, address)) => {
                    info!("Subscriber {} connected", address);
                    let messages = bus.subscribe();
                    spawn(serve_subscriber(cancel.child_token(), stream, address, messages));
                },
                Err(err) => {
                    warn!("Failed to accept subscriber: {}", err);
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::time::sleep;

    use crate::device::types::EventKind;
    use crate::relay::event_bus::EventPublisher;

    #[tokio::test]
    async fn subscribers_receive_json_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let bus = EventBus::new();
        let cancel = CancellationToken::new();
        let server = spawn(serve(cancel.clone(), listener, bus.clone()));

        let client = TcpStream::connect(address).await.unwrap();
        while bus.subscriber_count() == 0 {
            sleep(Duration::from_millis(5)).await;
        }

        bus.publish(EventKind::Presence, "PRESENT");
        bus.publish(EventKind::Gesture, "RIGHT");

        let mut lines = BufReader::new(client).lines();
        let first: serde_json::Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        let second: serde_json::Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();

        assert_eq!(first["notification"], "RETRIEVED_GESTURE");
        assert_eq!(first["kind"], "PRESENCE");
        assert_eq!(first["payload"], "PRESENT");
        assert_eq!(second["kind"], "GESTURE");
        assert_eq!(second["payload"], "RIGHT");

        cancel.cancel();
        server.await.unwrap();
    }
}
