//! WebSocket push channel

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::ChannelEvent;

/// Connect to `url` on a background task and stream its events
///
/// The returned receiver yields [`ChannelEvent::Connected`] once the
/// handshake completes, then one [`ChannelEvent::Message`] per text frame,
/// and finally a single [`ChannelEvent::Closed`].
pub fn subscribe(url: String, buffer: usize) -> (mpsc::Receiver<ChannelEvent>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let task = tokio::spawn(run(url, tx));
    (rx, task)
}

async fn run(url: String, tx: mpsc::Sender<ChannelEvent>) {
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "Push channel connection failed");
            let _ = tx.send(ChannelEvent::closed(e.to_string())).await;
            return;
        }
    };
    tracing::info!(url = %url, "Push channel connected");
    if tx.send(ChannelEvent::Connected).await.is_err() {
        return;
    }

    let (mut sink, mut source) = stream.split();
    let reason = loop {
        let frame = tokio::select! {
            frame = source.next() => frame,
            _ = tx.closed() => {
                tracing::debug!("Push channel receiver dropped, closing connection");
                let _ = sink.send(Message::Close(None)).await;
                return;
            }
        };

        let event = match frame {
            Some(Ok(Message::Text(text))) => ChannelEvent::Message(text),
            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                Ok(text) => ChannelEvent::Message(text),
                Err(_) => {
                    tracing::debug!("Ignoring non UTF-8 binary frame");
                    continue;
                }
            },
            Some(Ok(Message::Close(frame))) => {
                break frame.map(|f| f.reason.into_owned()).filter(|r| !r.is_empty());
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Push channel error");
                break Some(e.to_string());
            }
            None => break None,
        };

        if tx.send(event).await.is_err() {
            return;
        }
    };

    tracing::info!(reason = reason.as_deref().unwrap_or("none"), "Push channel closed");
    let _ = tx.send(ChannelEvent::Closed { reason }).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_endpoint_reports_closed() {
        // Port 9 (discard) is not expected to speak WebSocket
        let (mut rx, task) = subscribe("ws://127.0.0.1:9/ws?formId=f1".to_string(), 4);
        match rx.recv().await {
            Some(ChannelEvent::Closed { reason }) => assert!(reason.is_some()),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(rx.recv().await.is_none());
        task.await.unwrap();
    }
}
