use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Named notification templates; `name` is the lookup key
        manager
            .create_table(
                Table::create()
                    .table(EmailTemplates::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EmailTemplates::Name)
                            .string_len(128)
                            .not_null()
                            .primary_key(),
                    )
                    .col(text(EmailTemplates::Subject))
                    .col(text(EmailTemplates::Html))
                    .col(text_null(EmailTemplates::Text))
                    .col(
                        timestamp_with_time_zone(EmailTemplates::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(EmailTemplates::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_email_templates_updated_at")
                    .table(EmailTemplates::Table)
                    .col(EmailTemplates::UpdatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EmailTemplates::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum EmailTemplates {
    Table,
    Name,
    Subject,
    Html,
    Text,
    CreatedAt,
    UpdatedAt,
}
