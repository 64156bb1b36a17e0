//! Sending composed messages through the platform.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::platform::Platform;
use crate::types::SenderId;

use super::chunk::{MAX_MESSAGE_LENGTH, chunk_text};
use super::message::{Button, Element, MAX_ELEMENTS, OutboundMessage};
use super::NotifyError;

/// Sends notifications, splitting anything too large for one message.
pub struct Composer<P> {
    platform: Arc<P>,
}

impl<P> Clone for Composer<P> {
    fn clone(&self) -> Self {
        Composer {
            platform: Arc::clone(&self.platform),
        }
    }
}

impl<P: Platform> Composer<P> {
    pub fn new(platform: Arc<P>) -> Self {
        Composer { platform }
    }

    pub fn platform(&self) -> &Arc<P> {
        &self.platform
    }

    /// Sends a single message as-is.
    pub async fn send(&self, to: &SenderId, message: &OutboundMessage) -> Result<(), NotifyError> {
        self.send_part(to, message, 1, 1).await
    }

    /// Sends text, split into as many messages as it needs.
    pub async fn send_text(&self, to: &SenderId, text: &str) -> Result<(), NotifyError> {
        let chunks = chunk_text(text, MAX_MESSAGE_LENGTH);
        let total = chunks.len();
        for (i, chunk) in chunks.into_iter().enumerate() {
            self.send_part(to, &OutboundMessage::text(chunk), i + 1, total)
                .await?;
        }
        Ok(())
    }

    /// Sends text with buttons attached to its final chunk.
    ///
    /// Earlier chunks go out as plain text. The whole send fails on the first
    /// chunk that is not delivered, so the buttons are only ever seen
    /// together with the complete text.
    pub async fn send_long_with_buttons(
        &self,
        to: &SenderId,
        text: &str,
        buttons: Vec<Button>,
    ) -> Result<(), NotifyError> {
        let mut chunks = chunk_text(text, MAX_MESSAGE_LENGTH);
        let last = chunks.pop().unwrap_or_default();
        let last = OutboundMessage::buttons(last, buttons)?;
        let total = chunks.len() + 1;

        for (i, chunk) in chunks.into_iter().enumerate() {
            self.send_part(to, &OutboundMessage::text(chunk), i + 1, total)
                .await?;
        }
        self.send_part(to, &last, total, total).await
    }

    /// Sends elements as carousels of at most [`MAX_ELEMENTS`] each.
    pub async fn send_carousel(
        &self,
        to: &SenderId,
        elements: Vec<Element>,
    ) -> Result<(), NotifyError> {
        let batches: Vec<Vec<Element>> = elements
            .chunks(MAX_ELEMENTS)
            .map(<[Element]>::to_vec)
            .collect();
        let total = batches.len();
        for (i, batch) in batches.into_iter().enumerate() {
            let message = OutboundMessage::carousel(batch)?;
            self.send_part(to, &message, i + 1, total).await?;
        }
        Ok(())
    }

    async fn send_part(
        &self,
        to: &SenderId,
        message: &OutboundMessage,
        part: usize,
        total: usize,
    ) -> Result<(), NotifyError> {
        debug!(recipient = %to, part, total, "Sending message");
        self.platform
            .send_message(to, message)
            .await
            .map_err(|source| {
                warn!(recipient = %to, part, total, error = %source, "Failed to send message");
                NotifyError::Send {
                    part,
                    total,
                    source,
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Action;
    use crate::notify::ComposeError;
    use crate::test_utils::MockPlatform;

    fn composer() -> (Arc<MockPlatform>, Composer<MockPlatform>) {
        let platform = Arc::new(MockPlatform::new());
        (Arc::clone(&platform), Composer::new(platform))
    }

    #[tokio::test]
    async fn long_text_puts_buttons_on_last_chunk() {
        let (platform, composer) = composer();
        let to = SenderId::new("M1");
        let text = "x".repeat(MAX_MESSAGE_LENGTH * 2 + 5);

        composer
            .send_long_with_buttons(&to, &text, vec![Button::action("Post", &Action::SendPending)])
            .await
            .unwrap();

        let sent = platform.messages_to(&to);
        assert_eq!(sent.len(), 3);
        assert!(matches!(&sent[0], OutboundMessage::Text(t) if t.chars().count() == MAX_MESSAGE_LENGTH));
        assert!(matches!(&sent[1], OutboundMessage::Text(_)));
        assert!(matches!(&sent[2], OutboundMessage::Buttons { text, buttons } if text.len() == 5 && buttons.len() == 1));
    }

    #[tokio::test]
    async fn failed_chunk_fails_the_whole_send() {
        let (platform, composer) = composer();
        let to = SenderId::new("M1");
        platform.fail_sends_after(1);

        let text = "y".repeat(MAX_MESSAGE_LENGTH * 3);
        let result = composer
            .send_long_with_buttons(&to, &text, vec![Button::url("a", "u")])
            .await;

        assert!(matches!(
            result,
            Err(NotifyError::Send {
                part: 2,
                total: 3,
                ..
            })
        ));
        // Nothing after the failed chunk goes out.
        assert_eq!(platform.messages_to(&to).len(), 1);
    }

    #[tokio::test]
    async fn too_many_buttons_sends_nothing() {
        let (platform, composer) = composer();
        let to = SenderId::new("M1");

        let result = composer
            .send_long_with_buttons(&to, "hi", vec![Button::url("a", "u"); 4])
            .await;

        assert!(matches!(
            result,
            Err(NotifyError::Compose(ComposeError::TooManyButtons(4)))
        ));
        assert!(platform.messages_to(&to).is_empty());
    }

    #[tokio::test]
    async fn carousel_is_batched_by_ten() {
        let (platform, composer) = composer();
        let to = SenderId::new("M1");
        let elements: Vec<Element> = (0..23).map(|i| Element::new(format!("P{}", i), "")).collect();

        composer.send_carousel(&to, elements).await.unwrap();

        let sizes: Vec<usize> = platform
            .messages_to(&to)
            .iter()
            .map(|m| match m {
                OutboundMessage::Carousel(elements) => elements.len(),
                other => panic!("unexpected message {:?}", other),
            })
            .collect();
        assert_eq!(sizes, vec![10, 10, 3]);
    }

    #[tokio::test]
    async fn short_text_is_one_message() {
        let (platform, composer) = composer();
        let to = SenderId::new("U1");

        composer.send_text(&to, "hello").await.unwrap();

        assert_eq!(platform.texts_to(&to), vec!["hello".to_string()]);
    }
}
