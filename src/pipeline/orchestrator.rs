//! Orchestrator — runs one message through the quote pipeline.
//!
//! Stages run strictly in order; the first failing stage aborts the run:
//!
//! `FetchMessage → ExtractLocation → NormalizeLocation → GeocodeOrigin →
//! GeocodeDestination → ComputeDistance → LoadTemplate → ComposeReply →
//! ResolveRecipient → Dispatch → Done`
//!
//! There is no recovery across stage boundaries. Rate-limit retry and
//! fallback narrowing live inside the geocoder.

use std::sync::Arc;

use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::channels::email::is_sender_allowed;
use crate::channels::email_types::InboundMessage;
use crate::channels::mailbox::Mailbox;
use crate::config::QuoteConfig;
use crate::error::{ConfigError, ExtractionError, LocationRole, MailboxError, PipelineError};
use crate::geo::{DistanceCalculator, Geocoder, GeocodingProvider, RoutingProvider};
use crate::pipeline::composer::{ReplyComposer, load_template};
use crate::pipeline::dispatch::Dispatcher;
use crate::pipeline::extract::LocationExtractor;
use crate::pipeline::types::{QuoteReply, QuoteSummary};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FetchMessage,
    ExtractLocation,
    NormalizeLocation,
    GeocodeOrigin,
    GeocodeDestination,
    ComputeDistance,
    LoadTemplate,
    ComposeReply,
    ResolveRecipient,
    Dispatch,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Self::FetchMessage => "fetch_message",
            Self::ExtractLocation => "extract_location",
            Self::NormalizeLocation => "normalize_location",
            Self::GeocodeOrigin => "geocode_origin",
            Self::GeocodeDestination => "geocode_destination",
            Self::ComputeDistance => "compute_distance",
            Self::LoadTemplate => "load_template",
            Self::ComposeReply => "compose_reply",
            Self::ResolveRecipient => "resolve_recipient",
            Self::Dispatch => "dispatch",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Terminal state of a run.
#[derive(Debug)]
pub enum RunOutcome {
    Done(QuoteSummary),
    Aborted { stage: Stage, error: PipelineError },
}

impl RunOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    /// Stage the run stopped at, if it aborted.
    pub fn aborted_at(&self) -> Option<Stage> {
        match self {
            Self::Done(_) => None,
            Self::Aborted { stage, .. } => Some(*stage),
        }
    }

    /// 0 when done, otherwise the failure category's code.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Done(_) => 0,
            Self::Aborted { error, .. } => error.exit_code(),
        }
    }
}

/// Sequences the quote pipeline over its collaborators.
pub struct Orchestrator {
    config: Arc<QuoteConfig>,
    mailbox: Arc<dyn Mailbox>,
    extractor: LocationExtractor,
    geocoder: Geocoder,
    distance: DistanceCalculator,
    composer: ReplyComposer,
    dispatcher: Dispatcher,
}

impl Orchestrator {
    /// Wire the pipeline. Fails only if the marker or corrections are unusable.
    pub fn new(
        config: Arc<QuoteConfig>,
        mailbox: Arc<dyn Mailbox>,
        geocoding: Arc<dyn GeocodingProvider>,
        routing: Arc<dyn RoutingProvider>,
        composer: ReplyComposer,
    ) -> Result<Self, ConfigError> {
        let extractor = LocationExtractor::new(&config.marker, config.corrections.clone())?;
        let geocoder = Geocoder::new(geocoding, config.geocode_retry);
        let dispatcher = Dispatcher::new(
            Arc::clone(&mailbox),
            config.reply_subject.clone(),
            config.dry_run,
        );

        Ok(Self {
            config,
            mailbox,
            extractor,
            geocoder,
            distance: DistanceCalculator::new(routing),
            composer,
            dispatcher,
        })
    }

    /// Run the pipeline once.
    pub async fn run(&self) -> RunOutcome {
        let run_id = Uuid::new_v4();
        let span = info_span!("quote_run", %run_id);

        let mut stage = Stage::FetchMessage;
        let result = self.execute(&mut stage).instrument(span.clone()).await;

        let _guard = span.enter();
        match result {
            Ok(summary) => {
                info!(
                    message_id = %summary.message_id,
                    recipient = %summary.recipient,
                    destination = %summary.destination,
                    km = %summary.distance,
                    sent = summary.receipt.is_some(),
                    "Quote run done"
                );
                RunOutcome::Done(summary)
            }
            Err(error) => {
                warn!(
                    stage = %stage,
                    category = error.category(),
                    error = %error,
                    "Quote run aborted"
                );
                RunOutcome::Aborted { stage, error }
            }
        }
    }

    /// The stage sequence. `stage` always names the stage currently running,
    /// so on error it names the one that failed.
    async fn execute(&self, stage: &mut Stage) -> Result<QuoteSummary, PipelineError> {
        *stage = Stage::FetchMessage;
        let message = self.fetch_message().await?;

        *stage = Stage::ExtractLocation;
        let token = self.extractor.extract(&message.body).ok_or_else(|| {
            ExtractionError::MarkerNotFound {
                marker: self.extractor.marker().to_string(),
            }
        })?;
        info!(token = %token.as_str(), "Location extracted");

        *stage = Stage::NormalizeLocation;
        let destination = self.extractor.normalize(&token);
        if destination.as_str() != token.as_str() {
            info!(from = %token.as_str(), to = %destination, "Location corrected");
        }

        *stage = Stage::GeocodeOrigin;
        let origin = self
            .geocoder
            .resolve(&self.config.base_location)
            .await
            .map_err(|source| PipelineError::Geocode {
                role: LocationRole::Origin,
                source,
            })?;

        *stage = Stage::GeocodeDestination;
        let target = self
            .geocoder
            .resolve(destination.as_str())
            .await
            .map_err(|source| PipelineError::Geocode {
                role: LocationRole::Destination,
                source,
            })?;

        *stage = Stage::ComputeDistance;
        let distance = self.distance.compute_km(origin, target).await?;

        *stage = Stage::LoadTemplate;
        let template = load_template(&self.config.template_path).await?;

        *stage = Stage::ComposeReply;
        let body = self
            .composer
            .compose(&template, &message.content(), distance)
            .await?;

        *stage = Stage::ResolveRecipient;
        let recipient = self.mailbox.resolve_reply_address(&message)?;

        *stage = Stage::Dispatch;
        let receipt = self.dispatcher.send(&recipient, &body).await?;

        Ok(QuoteSummary {
            message_id: message.id,
            recipient,
            destination,
            distance,
            reply: QuoteReply {
                subject: self.dispatcher.subject().to_string(),
                body,
            },
            receipt,
        })
    }

    async fn fetch_message(&self) -> Result<InboundMessage, MailboxError> {
        let folder = &self.config.inbox_folder;
        let message = self
            .mailbox
            .fetch_latest(folder)
            .await?
            .ok_or_else(|| MailboxError::Empty {
                folder: folder.clone(),
            })?;

        if !is_sender_allowed(&self.config.allowed_senders, &message.sender) {
            return Err(MailboxError::SenderNotAllowed {
                sender: message.sender,
            });
        }

        info!(
            id = %message.id,
            sender = %message.sender,
            subject = %message.subject,
            mailbox = self.mailbox.name(),
            "Fetched latest message"
        );
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::*;
    use crate::channels::mailbox::SendReceipt;
    use crate::error::{GeocodeError, LlmError, RouteError};
    use crate::geo::{Coordinate, GeocodeCandidate, Route};
    use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};
    use crate::retry::RetryPolicy;

    struct OneMessage {
        message: Option<InboundMessage>,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl Mailbox for OneMessage {
        fn name(&self) -> &str {
            "one-message"
        }

        async fn fetch_latest(&self, _folder: &str) -> Result<Option<InboundMessage>, MailboxError> {
            Ok(self.message.clone())
        }

        async fn send(&self, to: &str, _subject: &str, _body: &str) -> Result<SendReceipt, MailboxError> {
            self.sent.lock().unwrap().push(to.to_string());
            Ok(SendReceipt {
                message_id: "<r@test>".into(),
            })
        }
    }

    /// Geocodes everything to the same point unless the query is listed as unknown.
    struct EverywhereGeocoder {
        unknown: Vec<&'static str>,
    }

    #[async_trait::async_trait]
    impl GeocodingProvider for EverywhereGeocoder {
        fn name(&self) -> &str {
            "everywhere"
        }

        async fn search(&self, query: &str, _limit: usize) -> Result<Vec<GeocodeCandidate>, GeocodeError> {
            if self.unknown.contains(&query) {
                Ok(vec![])
            } else {
                Ok(vec![GeocodeCandidate::new(46.75, 7.62)])
            }
        }
    }

    struct StraightRouter;

    #[async_trait::async_trait]
    impl RoutingProvider for StraightRouter {
        fn name(&self) -> &str {
            "straight"
        }

        async fn route(&self, _o: Coordinate, _d: Coordinate) -> Result<Vec<Route>, RouteError> {
            Ok(vec![Route {
                distance: 12_000.0,
                duration: None,
            }])
        }
    }

    struct EchoLlm;

    #[async_trait::async_trait]
    impl LlmProvider for EchoLlm {
        fn model_name(&self) -> &str {
            "echo"
        }

        fn cost_per_token(&self) -> (Decimal, Decimal) {
            (Decimal::ZERO, Decimal::ZERO)
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            Ok(CompletionResponse {
                content: "Quote: 60 CHF".into(),
                input_tokens: 10,
                output_tokens: 5,
            })
        }
    }

    fn message(sender: &str, body: &str) -> InboundMessage {
        InboundMessage {
            id: "<m1@test>".into(),
            subject: "Transport".into(),
            body: body.into(),
            sender: sender.into(),
            reply_to: None,
            received_at: Utc::now(),
        }
    }

    fn template_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1.50 CHF per km").unwrap();
        file
    }

    fn orchestrator(
        config: QuoteConfig,
        mailbox: Arc<OneMessage>,
        unknown: Vec<&'static str>,
    ) -> Orchestrator {
        Orchestrator::new(
            Arc::new(config),
            mailbox,
            Arc::new(EverywhereGeocoder { unknown }),
            Arc::new(StraightRouter),
            ReplyComposer::new(Arc::new(EchoLlm)),
        )
        .unwrap()
    }

    fn config(template: &tempfile::NamedTempFile) -> QuoteConfig {
        let mut config = QuoteConfig::new("Thun");
        config.template_path = template.path().to_path_buf();
        config.geocode_retry = RetryPolicy::immediate(1);
        config
    }

    fn mailbox(message: Option<InboundMessage>) -> Arc<OneMessage> {
        Arc::new(OneMessage {
            message,
            sent: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn empty_folder_aborts_at_fetch() {
        let template = template_file();
        let outcome = orchestrator(config(&template), mailbox(None), vec![]).run().await;
        assert_eq!(outcome.aborted_at(), Some(Stage::FetchMessage));
        assert_eq!(outcome.exit_code(), 10);
    }

    #[tokio::test]
    async fn disallowed_sender_aborts_at_fetch() {
        let template = template_file();
        let mut config = config(&template);
        config.allowed_senders = vec!["@customers.ch".into()];
        let mb = mailbox(Some(message("spam@elsewhere.com", "LOCATION: Bern")));

        let outcome = orchestrator(config, mb.clone(), vec![]).run().await;
        match outcome {
            RunOutcome::Aborted {
                stage: Stage::FetchMessage,
                error: PipelineError::Mailbox(MailboxError::SenderNotAllowed { sender }),
            } => assert_eq!(sender, "spam@elsewhere.com"),
            other => panic!("Expected sender rejection, got {other:?}"),
        }
        assert!(mb.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_base_location_aborts_at_origin() {
        let template = template_file();
        let mb = mailbox(Some(message("a@b.ch", "LOCATION: Bern")));
        let outcome = orchestrator(config(&template), mb, vec!["Thun"]).run().await;
        match outcome {
            RunOutcome::Aborted {
                stage: Stage::GeocodeOrigin,
                error:
                    PipelineError::Geocode {
                        role: LocationRole::Origin,
                        ..
                    },
            } => {}
            other => panic!("Expected origin failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_template_aborts_before_generation() {
        let template = template_file();
        let mut config = config(&template);
        config.template_path = template.path().with_extension("missing");
        let mb = mailbox(Some(message("a@b.ch", "LOCATION: Bern")));

        let outcome = orchestrator(config, mb.clone(), vec![]).run().await;
        assert_eq!(outcome.aborted_at(), Some(Stage::LoadTemplate));
        assert_eq!(outcome.exit_code(), 14);
        assert!(mb.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrected_destination_and_reply_to_used() {
        let template = template_file();
        let mut msg = message("office@b.ch", "Hi\nlocation: Zuerich\nThanks");
        msg.reply_to = Some("orders@b.ch".into());
        let mb = mailbox(Some(msg));

        let outcome = orchestrator(config(&template), mb.clone(), vec![]).run().await;
        let RunOutcome::Done(summary) = outcome else {
            panic!("Expected Done, got {outcome:?}");
        };
        assert_eq!(summary.destination.as_str(), "Zürich");
        assert_eq!(summary.recipient, "orders@b.ch");
        assert_eq!(summary.distance.to_string(), "12.00");
        assert_eq!(summary.reply.body, "Quote: 60 CHF");
        assert_eq!(mb.sent.lock().unwrap().as_slice(), &["orders@b.ch".to_string()]);
    }

    #[tokio::test]
    async fn dry_run_completes_without_sending() {
        let template = template_file();
        let mut config = config(&template);
        config.dry_run = true;
        let mb = mailbox(Some(message("a@b.ch", "LOCATION: Bern")));

        let outcome = orchestrator(config, mb.clone(), vec![]).run().await;
        assert!(outcome.is_done());
        assert_eq!(outcome.exit_code(), 0);
        let RunOutcome::Done(summary) = outcome else {
            unreachable!()
        };
        assert!(summary.receipt.is_none());
        assert!(mb.sent.lock().unwrap().is_empty());
    }
}
