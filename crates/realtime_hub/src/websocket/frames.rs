use crate::domain::{InboundFrame, OutboundFrame};
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::{future, Sink, SinkExt, Stream, StreamExt};

impl From<OutboundFrame> for Message {
    fn from(frame: OutboundFrame) -> Self {
        match frame {
            OutboundFrame::Payload(payload) => Message::Text(payload),
            OutboundFrame::Ping => Message::Ping(Bytes::new()),
            OutboundFrame::Close => Message::Close(None),
        }
    }
}

impl From<&Message> for InboundFrame {
    fn from(message: &Message) -> Self {
        match message {
            Message::Close(_) => InboundFrame::Close,
            _ => InboundFrame::Data,
        }
    }
}

/// Split an upgraded socket into session-level frame sink and stream halves
pub fn split_socket(
    socket: WebSocket,
) -> (
    impl Sink<OutboundFrame, Error = axum::Error> + Unpin + Send,
    impl Stream<Item = Result<InboundFrame, axum::Error>> + Unpin + Send,
) {
    let (sink, stream) = socket.split();
    let sink = sink.with(|frame: OutboundFrame| future::ready(Ok::<_, axum::Error>(Message::from(frame))));
    let stream = stream.map(|message| message.map(|message| InboundFrame::from(&message)));
    (sink, stream)
}
