//! The narrow interface to domains owned elsewhere (orders, leads,
//! appointments, products, tickets, search). The core only ever sees
//! display-safe [`DataCard`] projections.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

use huddle_types::models::{DataCard, LookupKind};

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("no lookup registered for {0}")]
    Unsupported(LookupKind),
    #[error("lookup service unavailable: {0}")]
    Unavailable(String),
    #[error("lookup returned an unexpected payload: {0}")]
    Malformed(String),
}

/// One implementation per referenced domain.
/// `Ok(None)` means the record does not exist.
#[async_trait]
pub trait RecordLookup: Send + Sync {
    async fn resolve(&self, kind: LookupKind, identifier: &str) -> Result<Option<DataCard>, LookupError>;
}

/// Routes a lookup to the collaborator registered for its kind.
#[derive(Clone, Default)]
pub struct LookupRegistry {
    lookups: HashMap<LookupKind, Arc<dyn RecordLookup>>,
}

impl LookupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: LookupKind, lookup: Arc<dyn RecordLookup>) -> &mut Self {
        self.lookups.insert(kind, lookup);
        self
    }

    /// Register one collaborator for every kind.
    pub fn register_all(&mut self, lookup: Arc<dyn RecordLookup>) -> &mut Self {
        for kind in ALL_KINDS {
            self.lookups.insert(kind, lookup.clone());
        }
        self
    }

    pub async fn resolve(&self, kind: LookupKind, identifier: &str) -> Result<Option<DataCard>, LookupError> {
        let lookup = self.lookups.get(&kind).ok_or(LookupError::Unsupported(kind))?;
        let card = lookup.resolve(kind, identifier).await?;
        match card {
            Some(card) if card.kind() != kind => Err(LookupError::Malformed(format!(
                "asked for {} but got {}",
                kind,
                card.kind()
            ))),
            other => Ok(other),
        }
    }
}

const ALL_KINDS: [LookupKind; 6] = [
    LookupKind::Order,
    LookupKind::Lead,
    LookupKind::Appointment,
    LookupKind::Product,
    LookupKind::Ticket,
    LookupKind::Search,
];

/// Lookup over HTTP against the platform's record service.
///
/// `GET {base}/{kind}s/{id}` for records and `GET {base}/search?q=` for
/// search; the service answers with a `DataCard` JSON body, 404 when absent.
pub struct HttpLookup {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLookup {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LookupError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LookupError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RecordLookup for HttpLookup {
    async fn resolve(&self, kind: LookupKind, identifier: &str) -> Result<Option<DataCard>, LookupError> {
        let request = match kind {
            LookupKind::Search => self
                .client
                .get(format!("{}/search", self.base_url))
                .query(&[("q", identifier)]),
            _ => {
                let mut url = reqwest::Url::parse(&format!("{}/", self.base_url))
                    .map_err(|e| LookupError::Unavailable(e.to_string()))?;
                url.path_segments_mut()
                    .map_err(|_| LookupError::Unavailable("base URL cannot be a base".into()))?
                    .pop_if_empty()
                    .push(&format!("{}s", kind))
                    .push(identifier);
                self.client.get(url)
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| LookupError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!("{} {} not found upstream", kind, identifier);
                Ok(None)
            }
            status if status.is_success() => response
                .json::<DataCard>()
                .await
                .map(Some)
                .map_err(|e| LookupError::Malformed(e.to_string())),
            status => Err(LookupError::Unavailable(format!("upstream returned {}", status))),
        }
    }
}

/// In-process lookup backed by a fixed table. Used in development and tests;
/// `with_delay` simulates a slow collaborator.
#[derive(Default)]
pub struct StaticLookup {
    records: HashMap<(LookupKind, String), DataCard>,
    delay: Option<Duration>,
    fail: bool,
}

impl StaticLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, identifier: impl Into<String>, card: DataCard) -> Self {
        self.records.insert((card.kind(), identifier.into()), card);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every lookup errors, as if the collaborator were down.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl RecordLookup for StaticLookup {
    async fn resolve(&self, kind: LookupKind, identifier: &str) -> Result<Option<DataCard>, LookupError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(LookupError::Unavailable("static lookup set to fail".into()));
        }
        Ok(self.records.get(&(kind, identifier.to_string())).cloned())
    }
}
