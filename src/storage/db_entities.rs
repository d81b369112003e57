//! SeaORM entity models used by the database storage backend.
//!
//! These structs map to the SQLite tables created by `database_storage`:
//! - `users`: tenant identities
//! - `containers`: container records, reserved or committed

/// Users table entity model.
pub mod users {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "users")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        #[sea_orm(unique)]
        pub username: String,
        #[sea_orm(unique)]
        pub email: String,
        pub password_hash: String,
        /// RFC3339 creation timestamp
        pub created_at: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(has_many = "super::containers::Entity")]
        Containers,
    }

    impl Related<super::containers::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Containers.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

/// Containers table entity model.
///
/// Status and phase are stored as lowercase strings.
pub mod containers {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "containers")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        /// Unset while the record is only a reservation
        pub runtime_id: Option<String>,
        #[sea_orm(unique)]
        pub name: String,
        pub port: i32,
        pub status: String,
        pub phase: String,
        pub owner_id: i64,
        /// RFC3339 creation timestamp
        pub created_at: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        /// Belongs to a user
        #[sea_orm(
            belongs_to = "super::users::Entity",
            from = "Column::OwnerId",
            to = "super::users::Column::Id"
        )]
        Owner,
    }

    impl Related<super::users::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Owner.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}
