use sea_orm::entity::prelude::*;

/// Auth events handed to the delivery subsystem. Insert-only from this
/// service; the consumer stamps `processed_at`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "outbox_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// One of the `EVENT_*` kinds.
    pub kind: String,
    pub user_id: Option<Uuid>,
    pub payload: Json,
    /// `{kind}:{subject}`; a replayed publish is rejected by the store.
    #[sea_orm(unique)]
    pub idempotency_key: String,
    pub created_at: DateTimeUtc,
    pub processed_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
