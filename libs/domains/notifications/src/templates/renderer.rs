use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::cache::{CompiledTemplate, EvictionPolicy, TemplateCache};
use super::seeder::TemplateSeeder;
use super::store::TemplateStore;
use crate::error::{NotificationError, NotificationResult};
use crate::models::RenderedEmail;

/// Compiles named templates against a context, caching parsed templates.
///
/// On a store miss the renderer asks the seeder to self-heal once per
/// process, then gives up with [`NotificationError::TemplateNotFound`].
pub struct TemplateRenderer {
    store: Arc<dyn TemplateStore>,
    seeder: Option<Arc<TemplateSeeder>>,
    cache: TemplateCache,
}

impl TemplateRenderer {
    pub fn new(
        store: Arc<dyn TemplateStore>,
        partials: &[(String, String)],
        policy: EvictionPolicy,
    ) -> NotificationResult<Self> {
        Ok(Self {
            store,
            seeder: None,
            cache: TemplateCache::new(policy, partials)?,
        })
    }

    /// Enable the self-heal backfill on a store miss.
    pub fn with_seeder(mut self, seeder: Arc<TemplateSeeder>) -> Self {
        self.seeder = Some(seeder);
        self
    }

    pub async fn compile(&self, name: &str, context: &Value) -> NotificationResult<RenderedEmail> {
        if let Some(rendered) = self.cache.render(name, context) {
            return rendered;
        }

        let template = match self.store.find(name).await? {
            Some(template) => template,
            None => {
                self.self_heal(name).await;
                self.store
                    .find(name)
                    .await?
                    .ok_or_else(|| NotificationError::TemplateNotFound(name.to_string()))?
            }
        };

        debug!(template = %name, "Compiling template");
        let compiled = CompiledTemplate::compile(&template)?;
        self.cache.insert_and_render(compiled, context)
    }

    /// Serialize a typed context and compile.
    pub async fn compile_with<C: Serialize + Sync>(
        &self,
        name: &str,
        context: &C,
    ) -> NotificationResult<RenderedEmail> {
        let context = serde_json::to_value(context)?;
        self.compile(name, &context).await
    }

    async fn self_heal(&self, name: &str) {
        let Some(seeder) = &self.seeder else {
            return;
        };
        match seeder.ensure_seeded().await {
            Ok(true) => debug!(template = %name, "Backfilled templates after store miss"),
            Ok(false) => {}
            Err(e) => warn!(template = %name, error = %e, "Template self-heal failed"),
        }
    }

    pub fn invalidate(&self, name: &str) -> bool {
        self.cache.invalidate(name)
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all()
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.cache.contains(name)
    }
}
