use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::Instrument;

use crate::{
    classify::classify,
    credentials::{
        AuthExpiryReactor, CredentialProvider, CredentialStore, MemoryCredentialStore, NavigateFn,
    },
    dispatch::Dispatcher,
    errors::{Error, Result},
    http::{AskOptions, HeaderList},
    stream::AskStream,
    telemetry::{AskRequestMetrics, MetricsCallbacks, Telemetry},
    timer::CancellationTimer,
    ASK_DEADLINE, ASK_PATH, DEFAULT_BASE_URL, DEFAULT_CLIENT_HEADER, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_CREDENTIAL_KEY,
};

/// Question payload accepted by the ask endpoint.
///
/// [`Client::ask`] takes any serializable body; this is the common shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AskRequest {
    pub question: String,
    pub strategy_model: String,
    pub answer_model: String,
    pub final_answer_model: String,
}

impl AskRequest {
    /// Ask `question` using the same model for every stage.
    pub fn new(question: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            question: question.into(),
            strategy_model: model.clone(),
            answer_model: model.clone(),
            final_answer_model: model,
        }
    }
}

#[derive(Clone, Default)]
pub struct Config {
    pub base_url: Option<String>,
    pub http_client: Option<reqwest::Client>,
    /// Override the connect timeout (defaults to 5s).
    pub connect_timeout: Option<Duration>,
    pub client_header: Option<String>,
    /// Default extra headers applied to all requests.
    pub default_headers: Option<HeaderList>,
    /// Where the host persists its credential blob (defaults to an empty in-memory store).
    pub credential_store: Option<Arc<dyn CredentialStore>>,
    /// Name of the credential blob (defaults to `auth-storage`).
    pub credential_key: Option<String>,
    /// Invoked after a 401 has cleared the stored credential.
    pub on_auth_expired: Option<NavigateFn>,
    pub metrics: Option<MetricsCallbacks>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("connect_timeout", &self.connect_timeout)
            .field("client_header", &self.client_header)
            .field("default_headers", &self.default_headers)
            .field("credential_key", &self.credential_key)
            .field(
                "on_auth_expired",
                &self.on_auth_expired.as_ref().map(|_| "callback"),
            )
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

/// Ask client. Cheap to clone; concurrent calls are fully independent.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    dispatcher: Dispatcher,
    credentials: CredentialProvider,
    reactor: AuthExpiryReactor,
    telemetry: Telemetry,
    deadline: Duration,
}

impl Client {
    pub fn new(cfg: Config) -> Result<Self> {
        let base_source = cfg
            .base_url
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base = format!("{}/", base_source.trim().trim_end_matches('/'));
        let base_url = reqwest::Url::parse(&base)
            .map_err(|err| Error::Config(format!("invalid base url: {err}")))?;

        let http = match cfg.http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .connect_timeout(cfg.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT))
                .build()
                .map_err(|err| Error::Config(format!("failed to build http client: {err}")))?,
        };

        let client_header = cfg
            .client_header
            .filter(|s| !s.trim().is_empty())
            .or_else(|| Some(DEFAULT_CLIENT_HEADER.to_string()));

        let store: Arc<dyn CredentialStore> = cfg
            .credential_store
            .unwrap_or_else(|| Arc::new(MemoryCredentialStore::new()));
        let key = cfg
            .credential_key
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CREDENTIAL_KEY.to_string());

        Ok(Self {
            inner: Arc::new(ClientInner {
                dispatcher: Dispatcher::new(http, base_url, client_header, cfg.default_headers),
                credentials: CredentialProvider::new(store.clone(), key.clone()),
                reactor: AuthExpiryReactor::new(store, key, cfg.on_auth_expired),
                telemetry: Telemetry::new(cfg.metrics),
                deadline: ASK_DEADLINE,
            }),
        })
    }

    /// Shorten the per-call deadline; only used to exercise expiry in tests.
    #[cfg(test)]
    pub(crate) fn with_deadline(self, deadline: Duration) -> Self {
        let inner = &self.inner;
        Self {
            inner: Arc::new(ClientInner {
                dispatcher: inner.dispatcher.clone(),
                credentials: inner.credentials.clone(),
                reactor: inner.reactor.clone(),
                telemetry: inner.telemetry.clone(),
                deadline,
            }),
        }
    }

    pub fn credentials(&self) -> &CredentialProvider {
        &self.inner.credentials
    }

    /// Ask the knowledge base a question, returning the live answer stream.
    pub async fn ask<R>(&self, req: &R) -> Result<AskStream>
    where
        R: Serialize + ?Sized,
    {
        self.ask_with_options(req, AskOptions::default()).await
    }

    pub async fn ask_with_options<R>(&self, req: &R, options: AskOptions) -> Result<AskStream>
    where
        R: Serialize + ?Sized,
    {
        let body = serde_json::to_vec(req)?;
        let token = self.inner.credentials.get_token();
        let builder = self.inner.dispatcher.build(
            ASK_PATH,
            body,
            token.as_deref(),
            options.request_id.as_deref(),
            &options.headers,
        )?;

        let deadline = self.inner.deadline;
        let start = Instant::now();
        let timer = CancellationTimer::arm(deadline, move || {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                deadline_ms = deadline.as_millis() as u64,
                "ask deadline elapsed; cancelling request"
            );
        });

        let cancel = timer.handle();
        let send = self.inner.dispatcher.send(builder, &cancel);
        #[cfg(feature = "tracing")]
        let send = send.instrument(tracing::debug_span!(
            "notebook_ask.ask",
            path = ASK_PATH,
            request_id = ?options.request_id,
            has_token = token.is_some(),
        ));
        let raw = send.await;
        timer.disarm();

        let result = classify(raw);
        match &result {
            Ok(_stream) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    status = %_stream.status(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "ask stream opened"
                );
            }
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    kind = %err.kind(),
                    status = ?err.status(),
                    error = %err,
                    "ask request failed"
                );
                if err.is_auth_expired() {
                    self.inner.reactor.on_auth_expired();
                }
            }
        }

        if self.inner.telemetry.enabled() {
            let (status, error, request_id) = match &result {
                Ok(stream) => (
                    Some(stream.status().as_u16()),
                    None,
                    stream.request_id().map(|s| s.to_string()),
                ),
                Err(err) => (err.status(), Some(err.kind()), None),
            };
            self.inner.telemetry.record(AskRequestMetrics {
                latency: start.elapsed(),
                status,
                error,
                request_id: request_id.or(options.request_id),
            });
        }

        result
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("dispatcher", &self.inner.dispatcher)
            .field("credentials", &self.inner.credentials)
            .field("deadline", &self.inner.deadline)
            .finish()
    }
}
