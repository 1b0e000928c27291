//! Embedded schema migrations. Run on startup when `auto_migrate` is set,
//! and unconditionally by the test harness.

use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_products_table::Migration),
            Box::new(m20240101_000002_create_inventory_batches_table::Migration),
            Box::new(m20240101_000003_create_orders_tables::Migration),
            Box::new(m20240101_000004_create_packages_tables::Migration),
            Box::new(m20240101_000005_create_transports_tables::Migration),
            Box::new(m20240101_000006_create_returns_tables::Migration),
        ]
    }
}

mod m20240101_000001_create_products_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::Sku).string().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(
                            ColumnDef::new(Products::UnitPrice)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::ReorderThreshold)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Products::ShelfLifeDays).integer().null())
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_sku")
                        .table(Products::Table)
                        .col(Products::Sku)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Products {
        Table,
        Id,
        Sku,
        Name,
        UnitPrice,
        ReorderThreshold,
        ShelfLifeDays,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_inventory_batches_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_inventory_batches_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryBatches::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryBatches::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryBatches::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(InventoryBatches::BatchNumber)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryBatches::OriginalQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryBatches::CurrentQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryBatches::DamagedQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryBatches::ManufactureDate)
                                .date()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryBatches::ExpirationDate)
                                .date()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryBatches::SupplierId).uuid().null())
                        .col(ColumnDef::new(InventoryBatches::WarehouseId).uuid().null())
                        .col(
                            ColumnDef::new(InventoryBatches::ReceivedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryBatches::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryBatches::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_batches_batch_number")
                        .table(InventoryBatches::Table)
                        .col(InventoryBatches::BatchNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_batches_product_id")
                        .table(InventoryBatches::Table)
                        .col(InventoryBatches::ProductId)
                        .to_owned(),
                )
                .await?;

            // FEFO scans order by expiration date within a product.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_batches_expiration")
                        .table(InventoryBatches::Table)
                        .col(InventoryBatches::ProductId)
                        .col(InventoryBatches::ExpirationDate)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryBatches::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum InventoryBatches {
        Table,
        Id,
        ProductId,
        BatchNumber,
        OriginalQuantity,
        CurrentQuantity,
        DamagedQuantity,
        ManufactureDate,
        ExpirationDate,
        SupplierId,
        WarehouseId,
        ReceivedAt,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_orders_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_orders_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::OrderNumber).string().not_null())
                        .col(ColumnDef::new(Orders::Status).text().not_null())
                        .col(ColumnDef::new(Orders::CreatedBy).uuid().null())
                        .col(ColumnDef::new(Orders::Notes).string().null())
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Orders::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_order_number")
                        .table(Orders::Table)
                        .col(Orders::OrderNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Orders {
        Table,
        Id,
        OrderNumber,
        Status,
        CreatedBy,
        Notes,
        CreatedAt,
        UpdatedAt,
        Version,
    }

    #[derive(DeriveIden)]
    pub(super) enum OrderItems {
        Table,
        Id,
        OrderId,
        ProductId,
        Quantity,
    }
}

mod m20240101_000004_create_packages_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_packages_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Packages::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Packages::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Packages::PackageCode).string().not_null())
                        .col(ColumnDef::new(Packages::OrderId).uuid().not_null())
                        .col(ColumnDef::new(Packages::Status).text().not_null())
                        .col(
                            ColumnDef::new(Packages::TotalValue)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Packages::WeightKg)
                                .decimal_len(10, 3)
                                .null(),
                        )
                        .col(ColumnDef::new(Packages::DimensionsCm).string().null())
                        .col(ColumnDef::new(Packages::Notes).string().null())
                        .col(
                            ColumnDef::new(Packages::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Packages::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_packages_package_code")
                        .table(Packages::Table)
                        .col(Packages::PackageCode)
                        .unique()
                        .to_owned(),
                )
                .await?;

            // One primary package per order.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_packages_order_id")
                        .table(Packages::Table)
                        .col(Packages::OrderId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PackageItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PackageItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PackageItems::PackageId).uuid().not_null())
                        .col(ColumnDef::new(PackageItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(PackageItems::BatchId).uuid().not_null())
                        .col(ColumnDef::new(PackageItems::Quantity).integer().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_package_items_package_id")
                        .table(PackageItems::Table)
                        .col(PackageItems::PackageId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(BatchAllocations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(BatchAllocations::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(BatchAllocations::BatchId).uuid().not_null())
                        .col(
                            ColumnDef::new(BatchAllocations::PackageId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BatchAllocations::ProductId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BatchAllocations::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BatchAllocations::ReturnedQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(BatchAllocations::AllocatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_batch_allocations_batch_id")
                        .table(BatchAllocations::Table)
                        .col(BatchAllocations::BatchId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_batch_allocations_package_id")
                        .table(BatchAllocations::Table)
                        .col(BatchAllocations::PackageId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(BatchAllocations::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PackageItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Packages::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Packages {
        Table,
        Id,
        PackageCode,
        OrderId,
        Status,
        TotalValue,
        WeightKg,
        DimensionsCm,
        Notes,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum PackageItems {
        Table,
        Id,
        PackageId,
        ProductId,
        BatchId,
        Quantity,
    }

    #[derive(DeriveIden)]
    pub(super) enum BatchAllocations {
        Table,
        Id,
        BatchId,
        PackageId,
        ProductId,
        Quantity,
        ReturnedQuantity,
        AllocatedAt,
    }
}

mod m20240101_000005_create_transports_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_transports_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Transports::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Transports::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Transports::PackageId).uuid().not_null())
                        .col(ColumnDef::new(Transports::TransporterId).uuid().not_null())
                        .col(ColumnDef::new(Transports::Status).text().not_null())
                        .col(
                            ColumnDef::new(Transports::IsReturnLeg)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Transports::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Transports::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_transports_package_id")
                        .table(Transports::Table)
                        .col(Transports::PackageId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(TransportEvents::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(TransportEvents::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TransportEvents::TransportId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(TransportEvents::Status).text().not_null())
                        .col(ColumnDef::new(TransportEvents::Location).string().null())
                        .col(ColumnDef::new(TransportEvents::Notes).string().null())
                        .col(ColumnDef::new(TransportEvents::UpdatedBy).string().null())
                        .col(
                            ColumnDef::new(TransportEvents::RecordedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_transport_events_transport_id")
                        .table(TransportEvents::Table)
                        .col(TransportEvents::TransportId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(TransportEvents::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Transports::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Transports {
        Table,
        Id,
        PackageId,
        TransporterId,
        Status,
        IsReturnLeg,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum TransportEvents {
        Table,
        Id,
        TransportId,
        Status,
        Location,
        Notes,
        UpdatedBy,
        RecordedAt,
    }
}

mod m20240101_000006_create_returns_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000006_create_returns_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Returns::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Returns::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Returns::PackageId).uuid().not_null())
                        .col(ColumnDef::new(Returns::Reason).string().not_null())
                        .col(ColumnDef::new(Returns::Status).text().not_null())
                        .col(ColumnDef::new(Returns::TransporterId).uuid().null())
                        .col(ColumnDef::new(Returns::TransportId).uuid().null())
                        .col(ColumnDef::new(Returns::WarehouseId).uuid().null())
                        .col(ColumnDef::new(Returns::ProcessedBy).string().null())
                        .col(ColumnDef::new(Returns::Notes).string().null())
                        .col(
                            ColumnDef::new(Returns::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Returns::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_returns_package_id")
                        .table(Returns::Table)
                        .col(Returns::PackageId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ReturnItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ReturnItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ReturnItems::ReturnId).uuid().not_null())
                        .col(ColumnDef::new(ReturnItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(ReturnItems::BatchId).uuid().not_null())
                        .col(ColumnDef::new(ReturnItems::Quantity).integer().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_return_items_return_id")
                        .table(ReturnItems::Table)
                        .col(ReturnItems::ReturnId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ReturnItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Returns::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Returns {
        Table,
        Id,
        PackageId,
        Reason,
        Status,
        TransporterId,
        TransportId,
        WarehouseId,
        ProcessedBy,
        Notes,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum ReturnItems {
        Table,
        Id,
        ReturnId,
        ProductId,
        BatchId,
        Quantity,
    }
}
