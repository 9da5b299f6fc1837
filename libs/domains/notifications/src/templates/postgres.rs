use async_trait::async_trait;
use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder, QuerySelect};

use super::entity;
use super::store::TemplateStore;
use crate::error::NotificationResult;
use crate::models::{Template, TemplateDraft, UpsertOutcome};

/// Postgres-backed template store (`email_templates`).
pub struct PgTemplateStore {
    db: DatabaseConnection,
}

impl PgTemplateStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TemplateStore for PgTemplateStore {
    async fn find(&self, name: &str) -> NotificationResult<Option<Template>> {
        let model = entity::Entity::find_by_id(name.to_string())
            .one(&self.db)
            .await?;

        Ok(model.map(Into::into))
    }

    async fn upsert(&self, draft: &TemplateDraft) -> NotificationResult<UpsertOutcome> {
        let existing = self.find(&draft.name).await?;
        let outcome = match &existing {
            Some(template) if draft.matches(template) => {
                tracing::debug!(template = %draft.name, "Template unchanged, skipping write");
                return Ok(UpsertOutcome::Unchanged);
            }
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Created,
        };

        let now = Utc::now();
        let active_model = entity::ActiveModel {
            name: Set(draft.name.clone()),
            subject: Set(draft.subject.clone()),
            html: Set(draft.html.clone()),
            text: Set(draft.text.clone()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        // A concurrent seeder may have inserted the row since the read above
        entity::Entity::insert(active_model)
            .on_conflict(
                OnConflict::column(entity::Column::Name)
                    .update_columns([
                        entity::Column::Subject,
                        entity::Column::Html,
                        entity::Column::Text,
                        entity::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;

        tracing::info!(template = %draft.name, outcome = ?outcome, "Upserted template");
        Ok(outcome)
    }

    async fn names(&self) -> NotificationResult<Vec<String>> {
        let names = entity::Entity::find()
            .select_only()
            .column(entity::Column::Name)
            .order_by_asc(entity::Column::Name)
            .into_tuple::<String>()
            .all(&self.db)
            .await?;

        Ok(names)
    }
}
