//! Sea-ORM migrations for podium-store database schema

pub use sea_orm_migration::prelude::*;

mod m20260301_000001_create_users_table;
mod m20260301_000002_create_conversations_table;
mod m20260301_000003_create_conversation_members_table;
mod m20260301_000004_create_messages_table;
mod m20260302_000001_create_notifications_table;
mod m20260302_000002_create_presence_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_create_users_table::Migration),
            Box::new(m20260301_000002_create_conversations_table::Migration),
            Box::new(m20260301_000003_create_conversation_members_table::Migration),
            Box::new(m20260301_000004_create_messages_table::Migration),
            Box::new(m20260302_000001_create_notifications_table::Migration),
            Box::new(m20260302_000002_create_presence_table::Migration),
        ]
    }
}
