//! Template seeding from an asset bundle.
//!
//! `backfill_all` is the explicit operator action. `backfill_if_missing` and
//! `ensure_seeded` are the automatic paths (startup and renderer self-heal)
//! and are disabled in production.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use core_config::Environment;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::assets::{AssetFile, AssetSource};
use super::store::TemplateStore;
use crate::error::NotificationResult;
use crate::models::{TemplateDraft, UpsertOutcome};

#[derive(Debug, Default, Deserialize)]
struct Sidecar {
    subject: Option<String>,
    text: Option<String>,
}

/// Turn one asset file into upsert content. `None` when it has no HTML body.
pub fn resolve_asset(file: &AssetFile) -> Option<TemplateDraft> {
    let Some(html) = &file.body else {
        warn!(template = %file.name, "Template asset has no HTML body, skipping");
        return None;
    };

    let sidecar = match file.sidecar.as_deref().map(serde_json::from_str::<Sidecar>) {
        None => Sidecar::default(),
        Some(Ok(sidecar)) => sidecar,
        Some(Err(e)) => {
            warn!(template = %file.name, error = %e, "Invalid template sidecar, using defaults");
            Sidecar::default()
        }
    };

    Some(TemplateDraft {
        name: file.name.clone(),
        subject: sidecar.subject.unwrap_or_else(|| file.name.clone()),
        html: html.clone(),
        text: sidecar.text,
    })
}

/// Writes bundled templates into a [`TemplateStore`].
pub struct TemplateSeeder {
    store: Arc<dyn TemplateStore>,
    assets: Arc<dyn AssetSource>,
    environment: Environment,
    seeded: Mutex<bool>,
    backfill_runs: AtomicUsize,
}

impl TemplateSeeder {
    pub fn new(
        store: Arc<dyn TemplateStore>,
        assets: Arc<dyn AssetSource>,
        environment: Environment,
    ) -> Self {
        Self {
            store,
            assets,
            environment,
            seeded: Mutex::new(false),
            backfill_runs: AtomicUsize::new(0),
        }
    }

    /// Automatic backfill is off in production.
    pub fn auto_backfill_enabled(&self) -> bool {
        !self.environment.is_production()
    }

    /// Number of `backfill_all` runs in this process.
    pub fn backfill_runs(&self) -> usize {
        self.backfill_runs.load(Ordering::SeqCst)
    }

    pub async fn upsert(
        &self,
        name: &str,
        subject: &str,
        html: &str,
        text: Option<&str>,
    ) -> NotificationResult<UpsertOutcome> {
        let draft = TemplateDraft {
            name: name.to_string(),
            subject: subject.to_string(),
            html: html.to_string(),
            text: text.map(str::to_string),
        };
        self.store.upsert(&draft).await
    }

    /// Upsert every bundled template. Returns the number upserted, unchanged
    /// templates included.
    pub async fn backfill_all(&self) -> NotificationResult<usize> {
        self.backfill_runs.fetch_add(1, Ordering::SeqCst);
        let bundle = self.assets.load()?;

        let mut upserted = 0;
        let mut changed = 0;
        for draft in bundle.templates.iter().filter_map(resolve_asset) {
            let outcome = self.store.upsert(&draft).await?;
            if outcome != UpsertOutcome::Unchanged {
                changed += 1;
            }
            upserted += 1;
        }

        info!(
            source = %self.assets.describe(),
            upserted,
            changed,
            "Template backfill complete"
        );
        Ok(upserted)
    }

    /// Backfill only when some bundled template is absent from the store.
    pub async fn backfill_if_missing(&self) -> NotificationResult<bool> {
        if !self.auto_backfill_enabled() {
            debug!("Template backfill disabled in production");
            return Ok(false);
        }

        let bundled = self.assets.load()?.template_names();
        let stored: HashSet<String> = self.store.names().await?.into_iter().collect();
        let missing: Vec<&String> = bundled.iter().filter(|name| !stored.contains(*name)).collect();

        if missing.is_empty() {
            debug!(templates = bundled.len(), "All bundled templates present");
            return Ok(false);
        }

        info!(missing = ?missing, "Bundled templates missing from store, backfilling");
        self.backfill_all().await?;
        Ok(true)
    }

    /// Run `backfill_if_missing` at most once per process. Concurrent callers
    /// wait for the first one and then return without scanning again.
    ///
    /// A failed attempt does not count, so the next caller retries.
    pub async fn ensure_seeded(&self) -> NotificationResult<bool> {
        let mut seeded = self.seeded.lock().await;
        if *seeded {
            return Ok(false);
        }

        let backfilled = self.backfill_if_missing().await?;
        *seeded = true;
        Ok(backfilled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::assets::MemoryAssets;
    use crate::templates::store::InMemoryTemplateStore;

    fn assets() -> Arc<MemoryAssets> {
        Arc::new(
            MemoryAssets::new()
                .with_template("welcome", "<p>Hi {{name}}</p>", Some(r#"{"subject":"Welcome {{name}}","text":"Hi {{name}}"}"#))
                .with_template("broken-sidecar", "<p>x</p>", Some("{ not json"))
                .with_template("no-sidecar", "<p>y</p>", None)
                .with_orphan_sidecar("no-body", r#"{"subject":"Nobody"}"#),
        )
    }

    fn seeder(store: Arc<InMemoryTemplateStore>, environment: Environment) -> TemplateSeeder {
        TemplateSeeder::new(store, assets(), environment)
    }

    #[test]
    fn test_resolve_asset_fallbacks() {
        let broken = AssetFile {
            name: "broken".into(),
            body: Some("<p/>".into()),
            sidecar: Some("{".into()),
        };
        let draft = resolve_asset(&broken).unwrap();
        assert_eq!(draft.subject, "broken");
        assert_eq!(draft.text, None);

        let bodiless = AssetFile {
            name: "ghost".into(),
            body: None,
            sidecar: Some(r#"{"subject":"Boo"}"#.into()),
        };
        assert!(resolve_asset(&bodiless).is_none());
    }

    #[tokio::test]
    async fn test_backfill_all_skips_bodiless_assets() {
        let store = Arc::new(InMemoryTemplateStore::new());
        let seeder = seeder(store.clone(), Environment::Development);

        assert_eq!(seeder.backfill_all().await.unwrap(), 3);

        let welcome = store.find("welcome").await.unwrap().unwrap();
        assert_eq!(welcome.subject, "Welcome {{name}}");
        assert_eq!(welcome.text.as_deref(), Some("Hi {{name}}"));
        assert_eq!(store.find("broken-sidecar").await.unwrap().unwrap().subject, "broken-sidecar");
        assert!(store.find("no-body").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_backfill_all_is_idempotent() {
        let store = Arc::new(InMemoryTemplateStore::new());
        let seeder = seeder(store.clone(), Environment::Development);

        let first_count = seeder.backfill_all().await.unwrap();
        let first = store.snapshot().await;
        let second_count = seeder.backfill_all().await.unwrap();

        assert_eq!(first_count, second_count);
        assert_eq!(store.snapshot().await, first);
        assert_eq!(seeder.backfill_runs(), 2);
    }

    #[tokio::test]
    async fn test_backfill_if_missing() {
        let store = Arc::new(InMemoryTemplateStore::new());
        let seeder = seeder(store.clone(), Environment::Development);

        assert!(seeder.backfill_if_missing().await.unwrap());
        assert!(!seeder.backfill_if_missing().await.unwrap());
        assert_eq!(seeder.backfill_runs(), 1);
    }

    #[tokio::test]
    async fn test_production_disables_automatic_backfill() {
        let store = Arc::new(InMemoryTemplateStore::new());
        let seeder = seeder(store.clone(), Environment::Production);

        assert!(!seeder.backfill_if_missing().await.unwrap());
        assert!(!seeder.ensure_seeded().await.unwrap());
        assert!(store.is_empty().await);

        // Explicit operator backfill still works
        assert_eq!(seeder.backfill_all().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_ensure_seeded_runs_once() {
        let store = Arc::new(InMemoryTemplateStore::new());
        let seeder = Arc::new(seeder(store.clone(), Environment::Development));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let seeder = seeder.clone();
                tokio::spawn(async move { seeder.ensure_seeded().await.unwrap() })
            })
            .collect();

        let mut backfilled = 0;
        for handle in handles {
            if handle.await.unwrap() {
                backfilled += 1;
            }
        }

        assert_eq!(backfilled, 1);
        assert_eq!(seeder.backfill_runs(), 1);
        assert_eq!(store.len().await, 3);
    }
}
