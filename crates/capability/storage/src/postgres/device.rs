//! Postgres 设备存储实现

use crate::error::StorageError;
use crate::models::{DeviceFilter, DeviceRecord};
use crate::traits::DeviceStore;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

pub struct PgDeviceStore {
    pub pool: PgPool,
}

impl PgDeviceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn device_from_row(row: &PgRow) -> Result<DeviceRecord, StorageError> {
    Ok(DeviceRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        device_type: row.try_get("device_type")?,
        generation: row.try_get("generation")?,
        enabled: row.try_get("enabled")?,
    })
}

#[async_trait::async_trait]
impl DeviceStore for PgDeviceStore {
    async fn create_device(&self, record: DeviceRecord) -> Result<DeviceRecord, StorageError> {
        let row = sqlx::query(
            "insert into devices (name, address, device_type, generation, enabled) \
             values ($1, $2, $3, $4, $5) \
             returning id, name, address, device_type, generation, enabled",
        )
        .bind(&record.name)
        .bind(&record.address)
        .bind(&record.device_type)
        .bind(record.generation)
        .bind(record.enabled)
        .fetch_one(&self.pool)
        .await?;
        device_from_row(&row)
    }

    async fn find_device(&self, device_id: i64) -> Result<Option<DeviceRecord>, StorageError> {
        let row = sqlx::query(
            "select id, name, address, device_type, generation, enabled \
             from devices where id = $1",
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(device_from_row).transpose()
    }

    async fn list_devices(
        &self,
        filter: Option<&DeviceFilter>,
    ) -> Result<Vec<DeviceRecord>, StorageError> {
        let filter = filter.cloned().unwrap_or_default();
        let rows = sqlx::query(
            "select id, name, address, device_type, generation, enabled \
             from devices \
             where (cardinality($1::text[]) = 0 or device_type = any($1)) \
             and (cardinality($2::int4[]) = 0 or generation = any($2)) \
             and ($3 = false or enabled) \
             order by id",
        )
        .bind(&filter.device_types)
        .bind(&filter.generations)
        .bind(filter.enabled_only)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(device_from_row).collect()
    }
}
