//! Relying party trust registry.
//!
//! Each [`ServiceProvider`] owns its trusted certificates and reads and
//! writes its metadata through injected [`MetadataFetcher`] and
//! [`MetadataStore`] implementations. A refresh only replaces the stored
//! metadata after the fetched document passed the trust gate; every failure
//! leaves the previous state untouched.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use idp_crypto::{Certificate, DigestAlgorithm};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::ServiceProviderConfig;
use crate::error::{SamlError, SamlResult};
use crate::metadata::{IncomingMetadata, PersistedMetadata};
use crate::saml_response::ResponseSigning;
use crate::signature::XmlSignatureValidator;
use crate::types::{EncryptionOptions, ResponseContextBuilder};

/// Default bound on a metadata fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Retrieves a metadata document.
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    /// Fetches the raw document at `url`.
    async fn fetch(&self, url: &str) -> SamlResult<Vec<u8>>;
}

/// Holds trusted metadata per relying party.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Returns the persisted metadata, if any.
    async fn get(&self, identifier: &str) -> SamlResult<Option<PersistedMetadata>>;

    /// Replaces the persisted metadata.
    async fn put(&self, identifier: &str, metadata: PersistedMetadata) -> SamlResult<()>;
}

/// Process-local metadata store.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    entries: DashMap<String, PersistedMetadata>,
}

impl InMemoryMetadataStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of relying parties with stored metadata.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get(&self, identifier: &str) -> SamlResult<Option<PersistedMetadata>> {
        Ok(self.entries.get(identifier).map(|e| e.value().clone()))
    }

    async fn put(&self, identifier: &str, metadata: PersistedMetadata) -> SamlResult<()> {
        self.entries.insert(identifier.to_string(), metadata);
        Ok(())
    }
}

/// Reads metadata from local paths and `file://` URLs.
#[derive(Debug, Clone, Default)]
pub struct FileMetadataFetcher {
    base_dir: Option<PathBuf>,
}

impl FileMetadataFetcher {
    /// Creates a fetcher that resolves relative paths against the working directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves relative paths against `base_dir`.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn resolve(&self, url: &str) -> PathBuf {
        let path = PathBuf::from(url.strip_prefix("file://").unwrap_or(url));
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        }
    }
}

#[async_trait]
impl MetadataFetcher for FileMetadataFetcher {
    async fn fetch(&self, url: &str) -> SamlResult<Vec<u8>> {
        if url.contains("://") && !url.starts_with("file://") {
            return Err(SamlError::MetadataFetch(format!(
                "unsupported metadata location {url}"
            )));
        }
        let path = self.resolve(url);
        tokio::fs::read(&path)
            .await
            .map_err(|e| SamlError::MetadataFetch(format!("{}: {e}", path.display())))
    }
}

/// Returns true if metadata may be trusted.
///
/// When a signature is not required this is always true. Otherwise a
/// trusted certificate must have verified the document.
#[must_use]
pub const fn valid_signature(matching_cert: Option<&Certificate>, require_signature: bool) -> bool {
    !require_signature || matching_cert.is_some()
}

/// A relying party and its trust state.
pub struct ServiceProvider {
    config: ServiceProviderConfig,
    certs: Vec<Certificate>,
    fetcher: Arc<dyn MetadataFetcher>,
    store: Arc<dyn MetadataStore>,
    fetch_timeout: Duration,
    current: RwLock<Option<Arc<PersistedMetadata>>>,
    /// Bumped on every successful refresh; a store read only fills the
    /// cache if no refresh landed while it was in flight.
    generation: AtomicU64,
}

impl fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceProvider")
            .field("identifier", &self.config.identifier)
            .field("certs", &self.certs)
            .field("metadata_url", &self.config.metadata_url)
            .field("fetch_timeout", &self.fetch_timeout)
            .finish_non_exhaustive()
    }
}

impl ServiceProvider {
    /// Creates a relying party from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MissingField`] for an empty identifier,
    /// [`SamlError::Key`] if a configured certificate does not parse and
    /// [`SamlError::InvalidConfiguration`] if responses must be encrypted but
    /// no certificate is configured.
    pub fn new(
        config: ServiceProviderConfig,
        fetcher: Arc<dyn MetadataFetcher>,
        store: Arc<dyn MetadataStore>,
    ) -> SamlResult<Self> {
        if config.identifier.trim().is_empty() {
            return Err(SamlError::MissingField("identifier"));
        }
        let certs = config
            .certs
            .iter()
            .map(|c| Certificate::parse(c).map_err(SamlError::from))
            .collect::<SamlResult<Vec<_>>>()?;
        if config.encrypt_responses && certs.is_empty() {
            return Err(SamlError::InvalidConfiguration(format!(
                "{} encrypts responses but has no certificate",
                config.identifier
            )));
        }
        Ok(Self {
            config,
            certs,
            fetcher,
            store,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            current: RwLock::new(None),
            generation: AtomicU64::new(0),
        })
    }

    /// Sets the bound on metadata fetches.
    #[must_use]
    pub const fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Returns the entity ID.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.config.identifier
    }

    /// Returns the static configuration.
    #[must_use]
    pub const fn config(&self) -> &ServiceProviderConfig {
        &self.config
    }

    /// Returns the trusted signing certificates.
    #[must_use]
    pub fn certs(&self) -> &[Certificate] {
        &self.certs
    }

    /// Returns true if the relying party may receive assertions.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.config.active
    }

    /// Returns the response signing policy.
    #[must_use]
    pub const fn signing_policy(&self) -> ResponseSigning {
        ResponseSigning::from_sp_flag(self.config.signed_response_message_requested)
    }

    /// Returns encryption settings when responses must be encrypted.
    ///
    /// The first trusted certificate is the recipient. Without a configured
    /// cipher the default block encryption is used.
    #[must_use]
    pub fn encryption_options(&self) -> Option<EncryptionOptions> {
        if !self.config.encrypt_responses {
            return None;
        }
        let block_encryption = self.config.block_encryption.unwrap_or_default();
        let cert = self.certs.first()?;
        Some(EncryptionOptions::new(cert.clone()).with_block_encryption(block_encryption))
    }

    /// Starts a response context addressed to this relying party.
    #[must_use]
    pub fn response_context(&self) -> ResponseContextBuilder {
        let mut builder = ResponseContextBuilder::default()
            .audience_uri(self.identifier())
            .encryption_opts(self.encryption_options());
        if let Some(acs_url) = &self.config.acs_url {
            builder = builder.saml_acs_url(acs_url);
        }
        builder
    }

    /// Returns the trusted metadata, reading through to the store when the
    /// in-memory copy was invalidated.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub async fn current_metadata(&self) -> SamlResult<Option<Arc<PersistedMetadata>>> {
        let cached = self.current.read().clone();
        if cached.is_some() {
            return Ok(cached);
        }
        let generation = self.generation.load(Ordering::Acquire);
        let loaded = self.store.get(self.identifier()).await?.map(Arc::new);
        if let Some(metadata) = &loaded {
            let mut current = self.current.write();
            if self.generation.load(Ordering::Acquire) == generation {
                *current = Some(Arc::clone(metadata));
            }
        }
        Ok(loaded)
    }

    /// Returns true if fetched metadata must be signed by a trusted certificate.
    ///
    /// True when explicitly configured, or when the persisted metadata asks
    /// for signed assertions.
    pub async fn should_validate_signature(&self) -> bool {
        if self.config.validate_signature {
            return true;
        }
        match self.current_metadata().await {
            Ok(metadata) => metadata.is_some_and(|m| m.sign_assertions),
            Err(err) => {
                warn!(sp = %self.identifier(), error = %err, "could not read persisted metadata");
                false
            }
        }
    }

    /// Refreshes metadata, requiring a signature when
    /// [`should_validate_signature`](Self::should_validate_signature) says so.
    pub async fn refresh(&self) -> Option<Arc<PersistedMetadata>> {
        let require_signature = self.should_validate_signature().await;
        self.refresh_metadata(require_signature).await
    }

    /// Fetches, validates and persists metadata.
    ///
    /// Returns the new metadata, or `None` if anything failed. Failures are
    /// logged and never change the persisted state.
    pub async fn refresh_metadata(&self, require_signature: bool) -> Option<Arc<PersistedMetadata>> {
        match self.try_refresh_metadata(require_signature).await {
            Ok(metadata) => Some(metadata),
            Err(err) => {
                warn!(
                    sp = %self.identifier(),
                    kind = %err.kind(),
                    error = %err,
                    "metadata refresh skipped"
                );
                None
            }
        }
    }

    /// Like [`refresh_metadata`](Self::refresh_metadata) but returns the error.
    ///
    /// # Errors
    ///
    /// - [`SamlError::MissingField`] without a metadata URL
    /// - [`SamlError::MetadataTimeout`] / [`SamlError::MetadataFetch`] for transport failures
    /// - [`SamlError::UntrustedMetadata`] when a signature is required and no
    ///   trusted certificate verifies the document
    /// - parse and store errors
    pub async fn try_refresh_metadata(&self, require_signature: bool) -> SamlResult<Arc<PersistedMetadata>> {
        let url = self
            .config
            .metadata_url
            .as_deref()
            .ok_or(SamlError::MissingField("metadata_url"))?;

        let bytes = tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(url))
            .await
            .map_err(|_| SamlError::MetadataTimeout(self.fetch_timeout))??;
        let xml = String::from_utf8(bytes).map_err(|e| SamlError::XmlParse(e.to_string()))?;
        let incoming = IncomingMetadata::parse(&xml)?;

        let matching_cert = self.find_matching_cert(&incoming);
        if !valid_signature(matching_cert, require_signature) {
            return Err(SamlError::UntrustedMetadata(self.identifier().to_string()));
        }
        if incoming.entity_id() != self.identifier() {
            warn!(
                sp = %self.identifier(),
                entity_id = %incoming.entity_id(),
                "metadata entity ID differs from configured identifier"
            );
        }

        let metadata = incoming.into_persisted(Utc::now());
        self.store.put(self.identifier(), metadata.clone()).await?;
        {
            let mut current = self.current.write();
            self.generation.fetch_add(1, Ordering::AcqRel);
            *current = None;
        }

        info!(
            sp = %self.identifier(),
            signed = matching_cert.is_some(),
            sign_assertions = metadata.sign_assertions,
            "metadata refreshed"
        );
        Ok(Arc::new(metadata))
    }

    fn find_matching_cert<'a>(&'a self, incoming: &IncomingMetadata) -> Option<&'a Certificate> {
        if !incoming.is_signed() {
            debug!(sp = %self.identifier(), "metadata is unsigned");
            return None;
        }
        let root = &incoming.document().root;
        for cert in &self.certs {
            let validator = XmlSignatureValidator::new(vec![cert.clone()]);
            match validator.validate_element(root) {
                Ok(_) => return Some(cert),
                Err(err) => debug!(
                    sp = %self.identifier(),
                    fingerprint = %cert.fingerprint(DigestAlgorithm::Sha256),
                    error = %err,
                    "certificate does not verify metadata"
                ),
            }
        }
        None
    }
}

/// All configured relying parties, keyed by identifier.
#[derive(Debug, Default)]
pub struct ServiceProviderRegistry {
    providers: DashMap<String, Arc<ServiceProvider>>,
}

impl ServiceProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from configuration, sharing one fetcher and store.
    ///
    /// # Errors
    ///
    /// Returns the first relying party that fails to load, or
    /// [`SamlError::InvalidConfiguration`] for a duplicate identifier.
    pub fn from_configs(
        configs: impl IntoIterator<Item = ServiceProviderConfig>,
        fetcher: Arc<dyn MetadataFetcher>,
        store: Arc<dyn MetadataStore>,
        fetch_timeout: Duration,
    ) -> SamlResult<Self> {
        let registry = Self::new();
        for config in configs {
            let sp = ServiceProvider::new(config, Arc::clone(&fetcher), Arc::clone(&store))?
                .with_fetch_timeout(fetch_timeout);
            let identifier = sp.identifier().to_string();
            if registry.register(sp).is_some() {
                return Err(SamlError::InvalidConfiguration(format!(
                    "duplicate service provider {identifier}"
                )));
            }
        }
        Ok(registry)
    }

    /// Adds or replaces a relying party. Returns the replaced one.
    pub fn register(&self, sp: ServiceProvider) -> Option<Arc<ServiceProvider>> {
        self.providers
            .insert(sp.identifier().to_string(), Arc::new(sp))
    }

    /// Looks up a relying party.
    #[must_use]
    pub fn get(&self, identifier: &str) -> Option<Arc<ServiceProvider>> {
        self.providers.get(identifier).map(|e| Arc::clone(e.value()))
    }

    /// Looks up an active relying party.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::UnknownServiceProvider`] if it is not registered
    /// or not active.
    pub fn require(&self, identifier: &str) -> SamlResult<Arc<ServiceProvider>> {
        self.get(identifier)
            .filter(|sp| sp.is_active())
            .ok_or_else(|| SamlError::UnknownServiceProvider(identifier.to_string()))
    }

    /// Returns the registered identifiers, sorted.
    #[must_use]
    pub fn identifiers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Returns the number of relying parties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns true if no relying party is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Refreshes every relying party that has a metadata URL, concurrently.
    ///
    /// Returns `(identifier, refreshed)` pairs sorted by identifier.
    pub async fn refresh_all(&self) -> Vec<(String, bool)> {
        let providers: Vec<Arc<ServiceProvider>> = self
            .providers
            .iter()
            .filter(|e| e.value().config().metadata_url.is_some())
            .map(|e| Arc::clone(e.value()))
            .collect();

        let handles: Vec<_> = providers
            .into_iter()
            .map(|sp| {
                tokio::spawn(async move {
                    let refreshed = sp.refresh().await.is_some();
                    (sp.identifier().to_string(), refreshed)
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(err) => warn!(error = %err, "metadata refresh task failed"),
            }
        }
        results.sort();
        results
    }
}
