use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::error::NotificationResult;
use crate::models::{Template, TemplateDraft, UpsertOutcome};

/// Persistence for named templates.
///
/// Implementations must keep a content-identical upsert a no-op, so the
/// stored row (including `updated_at`) is untouched.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Exact-match lookup by name
    async fn find(&self, name: &str) -> NotificationResult<Option<Template>>;

    /// Create or overwrite a template
    async fn upsert(&self, draft: &TemplateDraft) -> NotificationResult<UpsertOutcome>;

    /// All stored template names
    async fn names(&self) -> NotificationResult<Vec<String>>;
}

/// In-process template store for tests and local runs.
#[derive(Default)]
pub struct InMemoryTemplateStore {
    templates: RwLock<BTreeMap<String, Template>>,
}

impl InMemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored template, ordered by name.
    pub async fn snapshot(&self) -> Vec<Template> {
        self.templates.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.templates.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.templates.read().await.is_empty()
    }
}

#[async_trait]
impl TemplateStore for InMemoryTemplateStore {
    async fn find(&self, name: &str) -> NotificationResult<Option<Template>> {
        Ok(self.templates.read().await.get(name).cloned())
    }

    async fn upsert(&self, draft: &TemplateDraft) -> NotificationResult<UpsertOutcome> {
        let mut templates = self.templates.write().await;

        let outcome = match templates.get(&draft.name) {
            Some(existing) if draft.matches(existing) => return Ok(UpsertOutcome::Unchanged),
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Created,
        };

        templates.insert(
            draft.name.clone(),
            Template {
                name: draft.name.clone(),
                subject: draft.subject.clone(),
                html: draft.html.clone(),
                text: draft.text.clone(),
                updated_at: Utc::now(),
            },
        );
        Ok(outcome)
    }

    async fn names(&self) -> NotificationResult<Vec<String>> {
        Ok(self.templates.read().await.keys().cloned().collect())
    }
}
