use crate::application::terminal::TerminalEvent;
use crate::domain::ports::{NumericInputKind, Prompt, PromptHandler, PromptPolicy, PromptResponse};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use tracing::{debug, warn};

/// Resolves device-originated prompts against the configured policy so a
/// transaction in flight never stalls on an absent human. Notifications are
/// republished on the terminal event stream; response prompts are answered
/// exactly once, strictly one at a time.
pub struct InteractionBridge {
    policy: Arc<dyn PromptPolicy>,
    events: broadcast::Sender<TerminalEvent>,
    gate: Mutex<()>,
}

impl InteractionBridge {
    pub fn new(policy: Arc<dyn PromptPolicy>, events: broadcast::Sender<TerminalEvent>) -> Self {
        Self {
            policy,
            events,
            gate: Mutex::new(()),
        }
    }

    fn publish(&self, event: TerminalEvent) {
        // No subscribers is fine; events are advisory.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl PromptHandler for InteractionBridge {
    async fn on_prompt(&self, prompt: Prompt) -> PromptResponse {
        match prompt {
            Prompt::DisplayText(text) => {
                self.publish(TerminalEvent::Display(text));
                PromptResponse::Acknowledged
            }
            Prompt::Wait(message) => {
                self.publish(TerminalEvent::Display(message));
                PromptResponse::Acknowledged
            }
            Prompt::PromptForCard(text) => {
                self.publish(TerminalEvent::CardPrompt(text));
                PromptResponse::Acknowledged
            }
            Prompt::RemoveCard => {
                self.publish(TerminalEvent::Display("Remove card".to_string()));
                PromptResponse::Acknowledged
            }
            Prompt::CardRemoved => {
                self.publish(TerminalEvent::Display("Card removed".to_string()));
                PromptResponse::Acknowledged
            }
            Prompt::ChoiceSelection { options } => {
                let _gate = self.gate.lock().await;
                let index = self.policy.choice_selection(&options).await;
                debug!(?options, index, "choice selection resolved");
                PromptResponse::Selection(index as i32)
            }
            Prompt::ApplicationSelection { candidates } => {
                let _gate = self.gate.lock().await;
                match self.policy.application_selection(&candidates).await {
                    Some(index) => PromptResponse::Selection(index as i32),
                    None => {
                        warn!("application selection with no candidates, aborting");
                        PromptResponse::Selection(-1)
                    }
                }
            }
            Prompt::NumericInput { kind } => {
                let _gate = self.gate.lock().await;
                PromptResponse::Digits(self.policy.numeric_input(kind).await)
            }
            Prompt::AmountConfirmation { amount } => {
                let _gate = self.gate.lock().await;
                self.publish(TerminalEvent::Display(format!("Confirm amount: {amount}")));
                PromptResponse::Confirmation(self.policy.amount_confirmation(amount).await)
            }
        }
    }
}

/// Unattended-lane policy: first option, zero digits, confirm everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoDefaultPolicy;

#[async_trait]
impl PromptPolicy for AutoDefaultPolicy {
    async fn choice_selection(&self, _options: &[String]) -> usize {
        0
    }

    async fn application_selection(&self, candidates: &[String]) -> Option<usize> {
        if candidates.is_empty() { None } else { Some(0) }
    }

    async fn numeric_input(&self, _kind: NumericInputKind) -> String {
        "0".to_string()
    }

    async fn amount_confirmation(&self, _amount: Decimal) -> bool {
        true
    }
}

/// A prompt handed to an external answerer, with a one-shot slot for the
/// reply.
pub struct RelayedPrompt {
    pub prompt: Prompt,
    pub respond: oneshot::Sender<PromptResponse>,
}

/// Attended-lane policy: each prompt is relayed over a channel to whoever
/// drives the UI. If the relay has hung up or replies with the wrong shape,
/// the automatic defaults apply so the transaction still terminates.
pub struct HumanRelayPolicy {
    relay: mpsc::Sender<RelayedPrompt>,
    fallback: AutoDefaultPolicy,
}

impl HumanRelayPolicy {
    pub fn new(relay: mpsc::Sender<RelayedPrompt>) -> Self {
        Self {
            relay,
            fallback: AutoDefaultPolicy,
        }
    }

    async fn relay(&self, prompt: Prompt) -> Option<PromptResponse> {
        let (respond, rx) = oneshot::channel();
        if self.relay.send(RelayedPrompt { prompt, respond }).await.is_err() {
            warn!("prompt relay closed, falling back to defaults");
            return None;
        }
        rx.await.ok()
    }
}

#[async_trait]
impl PromptPolicy for HumanRelayPolicy {
    async fn choice_selection(&self, options: &[String]) -> usize {
        match self
            .relay(Prompt::ChoiceSelection {
                options: options.to_vec(),
            })
            .await
        {
            Some(PromptResponse::Selection(i)) if i >= 0 && (i as usize) < options.len() => {
                i as usize
            }
            _ => self.fallback.choice_selection(options).await,
        }
    }

    async fn application_selection(&self, candidates: &[String]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        match self
            .relay(Prompt::ApplicationSelection {
                candidates: candidates.to_vec(),
            })
            .await
        {
            Some(PromptResponse::Selection(i)) if i >= 0 && (i as usize) < candidates.len() => {
                Some(i as usize)
            }
            _ => self.fallback.application_selection(candidates).await,
        }
    }

    async fn numeric_input(&self, kind: NumericInputKind) -> String {
        match self.relay(Prompt::NumericInput { kind }).await {
            Some(PromptResponse::Digits(d)) => d,
            _ => self.fallback.numeric_input(kind).await,
        }
    }

    async fn amount_confirmation(&self, amount: Decimal) -> bool {
        match self.relay(Prompt::AmountConfirmation { amount }).await {
            Some(PromptResponse::Confirmation(c)) => c,
            _ => self.fallback.amount_confirmation(amount).await,
        }
    }
}
