//! create grants table migration.
//!
//! both foreign keys restrict deletion: a user or server row can only be
//! removed once every grant against it has been revoked on the remote host.

use sea_orm_migration::prelude::*;

use super::m20260301_000001_create_users::Users;
use super::m20260301_000002_create_servers::Servers;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Grants::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Grants::UserId).big_integer().not_null())
                    .col(ColumnDef::new(Grants::ServerId).big_integer().not_null())
                    .col(
                        ColumnDef::new(Grants::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_grants")
                            .col(Grants::UserId)
                            .col(Grants::ServerId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_grants_user")
                            .from(Grants::Table, Grants::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_grants_server")
                            .from(Grants::Table, Grants::ServerId)
                            .to(Servers::Table, Servers::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // index on server_id for server-side cascades
        manager
            .create_index(
                Index::create()
                    .name("idx_grants_server_id")
                    .table(Grants::Table)
                    .col(Grants::ServerId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Grants::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Grants {
    Table,
    UserId,
    ServerId,
    CreatedAt,
}
