use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "cab_trip_data_migration"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CabTripData::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CabTripData::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CabTripData::Medallion).string_len(64).not_null())
                    .col(ColumnDef::new(CabTripData::HackLicense).string_len(64).null())
                    .col(ColumnDef::new(CabTripData::PickupDatetime).date_time().not_null())
                    .col(ColumnDef::new(CabTripData::DropoffDatetime).date_time().null())
                    .col(ColumnDef::new(CabTripData::PassengerCount).integer().null())
                    .to_owned(),
            )
            .await?;

        // Both aggregate queries group by cab and pickup day; the by-keys one also filters on them.
        manager
            .create_index(
                Index::create()
                    .name("idx-cab_trip_data-medallion-pickup_datetime")
                    .table(CabTripData::Table)
                    .col(CabTripData::Medallion)
                    .col(CabTripData::PickupDatetime)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CabTripData::Table).if_exists().to_owned())
            .await
    }
}

#[derive(Iden)]
enum CabTripData {
    Table,
    Id,
    Medallion,
    HackLicense,
    PickupDatetime,
    DropoffDatetime,
    PassengerCount,
}
