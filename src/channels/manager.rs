//! Owns every active channel and routes replies back to the right one.

use async_trait::async_trait;
use futures::stream;

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse};
use crate::error::ChannelError;
use crate::replies::ReplySink;

/// Registry of channels.
#[derive(Default)]
pub struct ChannelManager {
    channels: Vec<Box<dyn Channel>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, channel: Box<dyn Channel>) {
        tracing::info!(channel = channel.name(), "Channel registered");
        self.channels.push(channel);
    }

    pub fn names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    fn get(&self, name: &str) -> Result<&dyn Channel, ChannelError> {
        self.channels
            .iter()
            .find(|c| c.name() == name)
            .map(|c| &**c)
            .ok_or_else(|| ChannelError::UnknownChannel {
                name: name.to_string(),
            })
    }

    /// Start every channel and merge their inbound streams.
    pub async fn start_all(&self) -> Result<MessageStream, ChannelError> {
        let mut streams = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            if let Err(e) = channel.health_check().await {
                tracing::warn!(channel = channel.name(), error = %e, "Channel health check failed");
            }
            streams.push(channel.start().await?);
        }
        Ok(Box::pin(stream::select_all(streams)))
    }

    /// Send a response on the channel the message came from.
    pub async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        self.get(&msg.channel)?.respond(msg, response).await
    }

    pub async fn shutdown_all(&self) -> Result<(), ChannelError> {
        for channel in &self.channels {
            if let Err(e) = channel.shutdown().await {
                tracing::warn!(channel = channel.name(), error = %e, "Channel shutdown failed");
            }
        }
        Ok(())
    }
}

/// Reply sink bound to the conversation of one inbound message.
pub struct ChannelSink<'a> {
    channels: &'a ChannelManager,
    message: &'a IncomingMessage,
}

impl<'a> ChannelSink<'a> {
    pub fn new(channels: &'a ChannelManager, message: &'a IncomingMessage) -> Self {
        Self { channels, message }
    }
}

#[async_trait]
impl ReplySink for ChannelSink<'_> {
    async fn send(&self, text: &str) -> Result<(), ChannelError> {
        self.channels
            .respond(self.message, OutgoingResponse::text(text))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use futures::StreamExt;

    use super::*;

    struct FakeChannel {
        name: &'static str,
        inbound: Vec<&'static str>,
        sent: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Channel for FakeChannel {
        fn name(&self) -> &str {
            self.name
        }

        async fn start(&self) -> Result<MessageStream, ChannelError> {
            let name = self.name;
            let msgs: Vec<_> = self
                .inbound
                .iter()
                .map(|text| IncomingMessage::new(name, "u1", text))
                .collect();
            Ok(Box::pin(stream::iter(msgs)))
        }

        async fn respond(
            &self,
            _msg: &IncomingMessage,
            response: OutgoingResponse,
        ) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push(response.content);
            Ok(())
        }
    }

    fn fake(name: &'static str, inbound: Vec<&'static str>) -> (Box<dyn Channel>, Arc<Mutex<Vec<String>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let channel = FakeChannel {
            name,
            inbound,
            sent: Arc::clone(&sent),
        };
        (Box::new(channel), sent)
    }

    #[tokio::test]
    async fn merges_streams_from_all_channels() {
        let mut manager = ChannelManager::new();
        let (a, _) = fake("a", vec!["one", "two"]);
        let (b, _) = fake("b", vec!["three"]);
        manager.add(a);
        manager.add(b);
        assert_eq!(manager.names(), vec!["a", "b"]);

        let mut contents: Vec<String> = manager
            .start_all()
            .await
            .unwrap()
            .map(|m| m.content)
            .collect()
            .await;
        contents.sort();
        assert_eq!(contents, vec!["one", "three", "two"]);
    }

    #[tokio::test]
    async fn sink_routes_to_originating_channel() {
        let mut manager = ChannelManager::new();
        let (a, sent_a) = fake("a", vec![]);
        let (b, sent_b) = fake("b", vec![]);
        manager.add(a);
        manager.add(b);

        let msg = IncomingMessage::new("b", "u1", "hola");
        ChannelSink::new(&manager, &msg).send("respuesta").await.unwrap();

        assert!(sent_a.lock().unwrap().is_empty());
        assert_eq!(*sent_b.lock().unwrap(), vec!["respuesta".to_string()]);
    }

    #[tokio::test]
    async fn unknown_channel_is_an_error() {
        let manager = ChannelManager::new();
        let msg = IncomingMessage::new("ghost", "u1", "hola");
        let err = manager
            .respond(&msg, OutgoingResponse::text("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::UnknownChannel { .. }));
    }
}
