use std::sync::Arc;

use anyhow::{
    Error,
    Result,
};
use tokio::sync::mpsc;

use crate::core::request::Request;

/// A single message exchanged on a streaming call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamMessage {
    pub body: Vec<u8>,
}

/// The caller half of a streaming call.
///
/// Messages sent here arrive at the matching [`ServerStream`], and vice
/// versa. Closing either half ends the stream for both.
#[derive(Debug)]
pub struct ClientStream {
    request: Arc<Request>,
    tx: Option<mpsc::Sender<StreamMessage>>,
    rx: mpsc::Receiver<StreamMessage>,
}

/// The handler half of a streaming call.
#[derive(Debug)]
pub struct ServerStream {
    request: Arc<Request>,
    tx: Option<mpsc::Sender<StreamMessage>>,
    rx: mpsc::Receiver<StreamMessage>,
}

/// Creates a connected pair of stream halves for the given call metadata.
pub fn stream_pair(request: Request, buffer: usize) -> (ClientStream, ServerStream) {
    let request = Arc::new(request);
    let (client_tx, server_rx) = mpsc::channel(buffer);
    let (server_tx, client_rx) = mpsc::channel(buffer);
    (
        ClientStream {
            request: request.clone(),
            tx: Some(client_tx),
            rx: client_rx,
        },
        ServerStream {
            request,
            tx: Some(server_tx),
            rx: server_rx,
        },
    )
}

macro_rules! stream_half {
    ($type:ty) => {
        impl $type {
            /// The metadata of the call that opened this stream.
            pub fn request(&self) -> &Request {
                &self.request
            }

            /// Sends a message to the other half.
            pub async fn send_message(&mut self, message: StreamMessage) -> Result<()> {
                match &self.tx {
                    Some(tx) => tx.send(message).await.map_err(|_| Error::msg("stream closed")),
                    None => Err(Error::msg("stream closed")),
                }
            }

            /// Receives the next message, or `None` once the other half has
            /// closed.
            pub async fn receive_message(&mut self) -> Option<StreamMessage> {
                self.rx.recv().await
            }

            /// Closes this half's sending side.
            pub fn close(&mut self) {
                self.tx = None;
            }
        }
    };
}

stream_half!(ClientStream);
stream_half!(ServerStream);

#[cfg(test)]
mod stream_test {
    use crate::{
        core::request::Request,
        transport::stream::{
            StreamMessage,
            stream_pair,
        },
    };

    #[tokio::test]
    async fn halves_exchange_messages() {
        let (mut client, mut server) = stream_pair(Request::default(), 4);
        client
            .send_message(StreamMessage {
                body: b"ping".to_vec(),
            })
            .await
            .unwrap();
        assert_eq!(
            server.receive_message().await,
            Some(StreamMessage {
                body: b"ping".to_vec()
            }),
        );

        server
            .send_message(StreamMessage {
                body: b"pong".to_vec(),
            })
            .await
            .unwrap();
        assert_eq!(
            client.receive_message().await,
            Some(StreamMessage {
                body: b"pong".to_vec()
            }),
        );
    }

    #[tokio::test]
    async fn close_ends_the_stream() {
        let (mut client, mut server) = stream_pair(Request::default(), 1);
        client.close();
        assert_eq!(server.receive_message().await, None);
        assert_matches::assert_matches!(
            client.send_message(StreamMessage::default()).await,
            Err(err) => assert_eq!(err.to_string(), "stream closed")
        );
    }
}
