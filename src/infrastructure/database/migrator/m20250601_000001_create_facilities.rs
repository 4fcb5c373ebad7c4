//! Create facilities table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Facilities::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Facilities::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Facilities::Name).string().not_null())
                    .col(ColumnDef::new(Facilities::BaseRate).big_integer().not_null())
                    .col(
                        ColumnDef::new(Facilities::Capacity)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Facilities::AvailableSlots)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Facilities::Latitude).double())
                    .col(ColumnDef::new(Facilities::Longitude).double())
                    .col(
                        ColumnDef::new(Facilities::Revision)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Facilities::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .check(Expr::col(Facilities::AvailableSlots).gte(0))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Facilities::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Facilities {
    Table,
    Id,
    Name,
    BaseRate,
    Capacity,
    AvailableSlots,
    Latitude,
    Longitude,
    Revision,
    CreatedAt,
}
