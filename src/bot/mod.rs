//! The chatbot: turns messages and button taps into moderation work.
//!
//! [`Chatbot`] is the single place messaging events are interpreted. Text
//! messages from the admin may be [`commands`]; postbacks are routed through
//! the [`persona`]'s action registry to the moderation engine or to the
//! onboarding flow (login, page listing, page registration).

mod commands;
mod persona;
mod profile;

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::actions::{Action, ActionError};
use crate::config::Config;
use crate::moderation::{ModerationError, Moderator};
use crate::notify::{Button, ComposeError, Composer, Element, NotifyError, OutboundMessage};
use crate::persistence::Store;
use crate::platform::{ManagedPage, Platform, PlatformError, object_url};
use crate::types::SenderId;
use crate::worker::{HandlerKind, UnitHandler, WorkUnit};

pub use commands::{AdminCommand, parse_admin_command};
pub use persona::{MODERATOR_SCOPES, Persona};
pub use profile::messenger_profile;

use persona::phrases;

/// Messages shorter than this are not forwarded to the admin while offline.
const FORWARD_MIN_LENGTH: usize = 5;

#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Moderation(#[from] ModerationError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

pub struct Chatbot<P, S> {
    moderator: Moderator<P, S>,
    composer: Composer<P>,
    persona: Persona,
    config: Arc<Config>,
}

impl<P: Platform, S: Store> Chatbot<P, S> {
    pub fn new(platform: Arc<P>, store: Arc<S>, config: Arc<Config>, persona: Persona) -> Self {
        Chatbot {
            moderator: Moderator::new(Arc::clone(&platform), store, Arc::clone(&config)),
            composer: Composer::new(platform),
            persona,
            config,
        }
    }

    pub fn moderator(&self) -> &Moderator<P, S> {
        &self.moderator
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn is_admin(&self, sender: &SenderId) -> bool {
        self.config.admin_sender_id.as_ref() == Some(sender)
    }

    // ─── Events ───────────────────────────────────────────────────────────────

    /// Handles a text message.
    ///
    /// Admin commands run even while the bot is disabled. Other messages get
    /// the offline reply when disabled and are otherwise only logged.
    #[instrument(skip_all, fields(sender = %sender))]
    pub async fn received_message(&self, sender: &SenderId, text: &str) -> Result<(), BotError> {
        info!(text, "Received message");
        if self.is_admin(sender)
            && let Some(command) = parse_admin_command(text)
        {
            return self.run_admin_command(sender, command).await;
        }

        if self.config.disabled {
            self.composer.send_text(sender, phrases::OFFLINE).await?;
            if text.chars().count() > FORWARD_MIN_LENGTH
                && let Some(admin) = &self.config.admin_sender_id
            {
                self.composer
                    .send_text(admin, &format!("{}:\n\"{}\"", sender, text))
                    .await?;
            }
            return Ok(());
        }

        debug!("No handler for plain messages");
        Ok(())
    }

    /// Handles a button tap.
    ///
    /// A payload that does not route to an action is reported back to the
    /// sender and returned as an error.
    #[instrument(skip_all, fields(sender = %sender))]
    pub async fn received_postback(&self, sender: &SenderId, payload: &str) -> Result<(), BotError> {
        info!(payload, "Received postback");
        if self.config.disabled {
            self.composer.send_text(sender, phrases::OFFLINE).await?;
            return Ok(());
        }

        let action = match self.persona.registry().route(payload) {
            Ok(action) => action,
            Err(e) => {
                warn!(error = %e, "Could not route postback");
                self.reply(sender, &error_report(&e)).await;
                return Err(e.into());
            }
        };
        self.run_action(sender, action).await
    }

    /// Runs a unit in the caller's task, reporting a failure the same way a
    /// worker would.
    pub async fn run_inline(&self, unit: &WorkUnit) {
        if let Err(e) = self.handle(unit).await {
            warn!(kind = unit.kind.as_str(), sender = %unit.sender, error = %e, "Inline handler failed");
            self.report_error(&e.to_string()).await;
        }
    }

    async fn run_action(&self, sender: &SenderId, action: Action) -> Result<(), BotError> {
        debug!(action = action.kind().name(), "Running action");
        match action {
            Action::SendWelcome => {
                self.composer.send_text(sender, phrases::WELCOME).await?;
                self.send_login(sender).await
            }
            // Listing pages needs a user token, which only the login provides.
            Action::ListPages => self.send_login(sender).await,
            Action::ManagePage {
                page_id,
                name,
                token,
            } => {
                self.moderator
                    .manage_channel(sender, &page_id, &name, &token)
                    .await?;
                Ok(())
            }
            Action::AcceptItem { item_id } => {
                self.moderator.approve(sender, item_id).await?;
                Ok(())
            }
            Action::RejectItem { item_id } => {
                self.moderator.reject(sender, item_id).await?;
                Ok(())
            }
            Action::SendPending => {
                self.moderator.send_pending(sender).await?;
                Ok(())
            }
        }
    }

    async fn run_admin_command(&self, sender: &SenderId, command: AdminCommand) -> Result<(), BotError> {
        info!(?command, "Running admin command");
        self.composer
            .send_text(sender, command.acknowledgement())
            .await?;
        match command {
            AdminCommand::Setup => {
                self.composer
                    .platform()
                    .set_messenger_profile(&messenger_profile())
                    .await?;
            }
            AdminCommand::IndexItems => {
                let updated = self.moderator.index_items().await?;
                self.reply(sender, &format!("Updated {} items", updated)).await;
            }
        }
        Ok(())
    }

    // ─── Onboarding ───────────────────────────────────────────────────────────

    /// Asks `sender` to grant page access.
    pub async fn send_login(&self, sender: &SenderId) -> Result<(), BotError> {
        let url = self.config.login_url(sender, self.persona.scopes);
        let message =
            OutboundMessage::buttons(phrases::LOGIN_PROMPT, vec![Button::url(phrases::LOGIN_BUTTON, url)])?;
        self.composer.send(sender, &message).await?;
        Ok(())
    }

    /// Completes a login: exchanges `code` and offers the user's pages.
    ///
    /// If the pages cannot be read the user is asked to log in again and
    /// the platform error is returned. Returns the number of pages offered.
    #[instrument(skip_all, fields(sender = %sender))]
    pub async fn logged_in(&self, sender: &SenderId, code: &str) -> Result<usize, BotError> {
        let (user_token, pages) = match self.fetch_managed_pages(sender, code).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "Could not access pages");
                self.composer.send_text(sender, phrases::LOGIN_FAILED).await?;
                self.send_login(sender).await?;
                return Err(e.into());
            }
        };
        info!(pages = pages.len(), "Login successful");

        if pages.is_empty() {
            self.composer.send_text(sender, phrases::NO_PAGES).await?;
            return Ok(0);
        }

        self.composer.send_text(sender, phrases::PAGES_FOUND).await?;
        let mut elements = Vec::with_capacity(pages.len());
        for page in &pages {
            elements.push(self.page_element(page, &user_token).await?);
        }
        self.composer.send_carousel(sender, elements).await?;
        Ok(pages.len())
    }

    async fn fetch_managed_pages(
        &self,
        sender: &SenderId,
        code: &str,
    ) -> Result<(String, Vec<ManagedPage>), PlatformError> {
        let platform = self.composer.platform();
        let user_token = platform
            .exchange_code(&self.config.login_redirect_uri(sender), code)
            .await?;
        let pages = platform.managed_pages(&user_token).await?;
        Ok((user_token, pages))
    }

    async fn page_element(&self, page: &ManagedPage, user_token: &str) -> Result<Element, ComposeError> {
        let picture = match self
            .composer
            .platform()
            .page_picture_url(&page.id, user_token)
            .await
        {
            Ok(picture) => picture,
            Err(e) => {
                warn!(page = %page.id, error = %e, "Could not read page picture");
                None
            }
        };

        let mut element = Element::new(page.name.as_str(), "")
            .with_url(object_url(page.id.as_str()))
            .with_image(picture);
        element.add_button(Button::action(
            phrases::MANAGE_BUTTON,
            &Action::ManagePage {
                page_id: page.id.clone(),
                name: page.name.clone(),
                token: page.access_token.clone(),
            },
        ))?;
        Ok(element)
    }

    // ─── Reporting ────────────────────────────────────────────────────────────

    /// Tells the admin about a failure, if an admin is configured.
    pub async fn report_error(&self, error: &str) {
        let Some(admin) = &self.config.admin_sender_id else {
            warn!(error, "No admin configured, dropping error report");
            return;
        };
        self.reply(admin, &format!("Error Occurred:\t{}", error)).await;
    }

    async fn reply(&self, to: &SenderId, text: &str) {
        if let Err(e) = self.composer.send_text(to, text).await {
            warn!(recipient = %to, error = %e, "Failed to send reply");
        }
    }
}

fn error_report(error: &impl std::fmt::Display) -> String {
    format!("Error Occurred:\t{}", error)
}

impl<P: Platform, S: Store> UnitHandler for Chatbot<P, S> {
    type Error = BotError;

    async fn handle(&self, unit: &WorkUnit) -> Result<(), BotError> {
        match unit.kind {
            HandlerKind::Message => self.received_message(&unit.sender, &unit.data).await,
            HandlerKind::Postback => self.received_postback(&unit.sender, &unit.data).await,
        }
    }

    async fn report(&self, _unit: &WorkUnit, error: &str) {
        self.report_error(error).await;
    }
}
