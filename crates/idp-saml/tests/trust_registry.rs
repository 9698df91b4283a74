//! Relying party metadata refresh and the trust gate.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use idp_saml::{
    MetadataStore, PersistedMetadata, SamlError, ServiceProviderConfig, ServiceProviderRegistry,
};

use crate::common::{self, FakeFetcher, RecordingStore};

fn requiring_signature() -> ServiceProviderConfig {
    ServiceProviderConfig {
        validate_signature: true,
        ..common::sp_config()
    }
}

#[tokio::test]
async fn test_untrusted_signer_changes_nothing() -> anyhow::Result<()> {
    let body = common::signed_sp_metadata(common::UNTRUSTED_KEY, common::UNTRUSTED_CERT, true);
    let fetcher = FakeFetcher::serving(body);
    let store = Arc::new(RecordingStore::default());
    let previous = PersistedMetadata {
        entity_id: common::SP_ENTITY_ID.to_string(),
        display_name: Some("previous".to_string()),
        ..PersistedMetadata::default()
    };
    store.put(common::SP_ENTITY_ID, previous.clone()).await?;
    let puts_before = store.put_count();

    let sp = common::service_provider(requiring_signature(), fetcher.clone(), store.clone());

    assert!(sp.refresh().await.is_none());
    let err = sp.try_refresh_metadata(true).await.unwrap_err();
    assert!(matches!(err, SamlError::UntrustedMetadata(_)));

    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.put_count(), puts_before);
    let current = sp.current_metadata().await?;
    assert_eq!(current.as_deref(), Some(&previous));
    Ok(())
}

#[tokio::test]
async fn test_trusted_signer_is_persisted() -> anyhow::Result<()> {
    let body = common::signed_sp_metadata(common::SP_KEY, common::SP_CERT, true);
    let store = Arc::new(RecordingStore::default());
    let sp = common::service_provider(requiring_signature(), FakeFetcher::serving(body), store.clone());

    let refreshed = sp
        .refresh()
        .await
        .ok_or_else(|| anyhow::anyhow!("refresh rejected trusted metadata"))?;
    assert_eq!(refreshed.entity_id, common::SP_ENTITY_ID);
    assert!(refreshed.sign_assertions);
    assert!(refreshed.fetched_at.is_some());
    assert_eq!(
        refreshed.default_acs().map(|acs| acs.location.as_str()),
        Some("http://sp.example.com/acs")
    );

    assert_eq!(store.put_count(), 1);
    let current = sp
        .current_metadata()
        .await?
        .ok_or_else(|| anyhow::anyhow!("nothing persisted"))?;
    assert_eq!(*current, *refreshed);
    Ok(())
}

#[tokio::test]
async fn test_unsigned_metadata_accepted_only_when_not_required() -> anyhow::Result<()> {
    let store = Arc::new(RecordingStore::default());
    let sp = common::service_provider(
        common::sp_config(),
        FakeFetcher::serving(common::sp_metadata(false)),
        store.clone(),
    );
    assert!(!sp.should_validate_signature().await);
    assert!(sp.refresh().await.is_some());
    assert_eq!(store.put_count(), 1);

    let strict_store = Arc::new(RecordingStore::default());
    let strict = common::service_provider(
        requiring_signature(),
        FakeFetcher::serving(common::sp_metadata(false)),
        strict_store.clone(),
    );
    assert!(strict.refresh().await.is_none());
    assert_eq!(strict_store.put_count(), 0);
    assert!(strict.current_metadata().await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_persisted_flag_turns_on_signature_checks() -> anyhow::Result<()> {
    let store = Arc::new(RecordingStore::default());
    let sp = common::service_provider(
        common::sp_config(),
        FakeFetcher::serving(common::sp_metadata(true)),
        store.clone(),
    );

    // First fetch is unsigned but allowed; it asks for signed assertions.
    assert!(sp.refresh().await.is_some());
    assert!(sp.should_validate_signature().await);

    // The same unsigned document is now refused.
    assert!(sp.refresh().await.is_none());
    assert_eq!(store.put_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_fetch_failure_is_swallowed() -> anyhow::Result<()> {
    let store = Arc::new(RecordingStore::default());
    let sp = common::service_provider(common::sp_config(), FakeFetcher::failing(), store.clone());

    assert!(sp.refresh_metadata(false).await.is_none());
    let err = sp.try_refresh_metadata(false).await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(store.put_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_registry_refreshes_every_provider() -> anyhow::Result<()> {
    let body = common::signed_sp_metadata(common::SP_KEY, common::SP_CERT, true);
    let store = Arc::new(RecordingStore::default());
    let without_url = ServiceProviderConfig {
        identifier: "http://static.example.com".to_string(),
        metadata_url: None,
        ..common::sp_config()
    };
    let registry = ServiceProviderRegistry::from_configs(
        [requiring_signature(), without_url],
        FakeFetcher::serving(body),
        store.clone(),
        Duration::from_secs(1),
    )?;

    assert_eq!(
        registry.identifiers(),
        ["http://sp.example.com", "http://static.example.com"]
    );
    let results = registry.refresh_all().await;
    assert_eq!(results, [(common::SP_ENTITY_ID.to_string(), true)]);
    assert_eq!(store.put_count(), 1);

    let sp = registry.require(common::SP_ENTITY_ID)?;
    assert!(sp.current_metadata().await?.is_some());
    Ok(())
}
