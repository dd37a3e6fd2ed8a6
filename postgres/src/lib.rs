//! `PostgreSQL` storage for the dispensary.
//!
//! [`PgDispensaryStore`] hands out [`PgUnitOfWork`]s, each wrapping one
//! database transaction. `lock_*` reads use `SELECT … FOR UPDATE`, so the
//! row stays locked until the transaction commits or rolls back; the
//! transaction rolls back automatically when the unit is dropped.
//!
//! The schema lives in `migrations/` and is applied with
//! [`PgDispensaryStore::migrate`].
//!
//! # Example
//!
//! ```ignore
//! use dispensary_postgres::PgDispensaryStore;
//!
//! let store = PgDispensaryStore::connect("postgres://localhost/dispensary", 10, 30).await?;
//! store.migrate().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod rows;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dispensary_core::store::{DispensaryStore, StoreError, UnitOfWork};
use dispensary_core::{
    Dispense, DispenseId, DispenseLine, Medicine, MedicineId, Prescription, PrescriptionId,
    PrescriptionItem, PrescriptionItemId,
};
use rows::{DISPENSE_COLUMNS, ITEM_COLUMNS, LINE_COLUMNS, MEDICINE_COLUMNS, PRESCRIPTION_COLUMNS};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;

/// Map a sqlx error, separating constraint violations from other failures.
fn db_error(context: &str, error: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &error {
        // 23xxx: integrity constraint violation class
        if db.code().is_some_and(|code| code.starts_with("23")) {
            return StoreError::ConstraintViolation(format!("{context}: {db}"));
        }
    }
    StoreError::DatabaseError(format!("{context}: {error}"))
}

/// Connection pool based [`DispensaryStore`].
#[derive(Clone, Debug)]
pub struct PgDispensaryStore {
    pool: PgPool,
}

impl PgDispensaryStore {
    /// Connect a new pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if the database cannot be reached
    /// within `connect_timeout_secs`.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| db_error("Failed to connect", e))?;
        Ok(Self { pool })
    }

    /// The underlying pool
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Migration failed: {e}")))
    }
}

#[async_trait]
impl DispensaryStore for PgDispensaryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to start transaction", e))?;
        Ok(Box::new(PgUnitOfWork { tx: Some(tx) }))
    }
}

/// One database transaction.
pub struct PgUnitOfWork {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgUnitOfWork {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        self.tx.as_mut().ok_or(StoreError::Finished)
    }

    async fn fetch_medicine(
        &mut self,
        id: MedicineId,
        lock: bool,
    ) -> Result<Option<Medicine>, StoreError> {
        let sql = format!(
            "SELECT {MEDICINE_COLUMNS} FROM medicines WHERE id = $1{}",
            if lock { " FOR UPDATE" } else { "" }
        );
        let tx = self.tx()?;
        sqlx::query(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| db_error("Failed to load medicine", e))?
            .as_ref()
            .map(rows::medicine)
            .transpose()
    }

    async fn fetch_prescription(
        &mut self,
        id: PrescriptionId,
        lock: bool,
    ) -> Result<Option<Prescription>, StoreError> {
        let sql = format!(
            "SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions WHERE id = $1{}",
            if lock { " FOR UPDATE" } else { "" }
        );
        let tx = self.tx()?;
        sqlx::query(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| db_error("Failed to load prescription", e))?
            .as_ref()
            .map(rows::prescription)
            .transpose()
    }

    async fn fetch_dispense(
        &mut self,
        id: DispenseId,
        lock: bool,
    ) -> Result<Option<Dispense>, StoreError> {
        let sql = format!(
            "SELECT {DISPENSE_COLUMNS} FROM dispenses WHERE id = $1{}",
            if lock { " FOR UPDATE" } else { "" }
        );
        let tx = self.tx()?;
        sqlx::query(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| db_error("Failed to load dispense", e))?
            .as_ref()
            .map(rows::dispense)
            .transpose()
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn medicine(&mut self, id: MedicineId) -> Result<Option<Medicine>, StoreError> {
        self.fetch_medicine(id, false).await
    }

    async fn lock_medicine(&mut self, id: MedicineId) -> Result<Option<Medicine>, StoreError> {
        self.fetch_medicine(id, true).await
    }

    async fn insert_medicine(&mut self, medicine: &Medicine) -> Result<(), StoreError> {
        let tx = self.tx()?;
        sqlx::query(
            r"
            INSERT INTO medicines (
                id, name, generic_name, form, strength, unit, stock, is_active,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ",
        )
        .bind(*medicine.id.as_uuid())
        .bind(&medicine.name)
        .bind(&medicine.generic_name)
        .bind(&medicine.form)
        .bind(&medicine.strength)
        .bind(&medicine.unit)
        .bind(medicine.stock)
        .bind(medicine.is_active)
        .bind(medicine.created_at)
        .bind(medicine.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| db_error("Failed to insert medicine", e))?;
        Ok(())
    }

    async fn set_medicine_stock(
        &mut self,
        id: MedicineId,
        stock: Decimal,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let tx = self.tx()?;
        let result = sqlx::query("UPDATE medicines SET stock = $2, updated_at = $3 WHERE id = $1")
            .bind(*id.as_uuid())
            .bind(stock)
            .bind(updated_at)
            .execute(&mut **tx)
            .await
            .map_err(|e| db_error("Failed to update stock", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DatabaseError(format!("medicine {id} missing")));
        }
        Ok(())
    }

    async fn prescription(
        &mut self,
        id: PrescriptionId,
    ) -> Result<Option<Prescription>, StoreError> {
        self.fetch_prescription(id, false).await
    }

    async fn lock_prescription(
        &mut self,
        id: PrescriptionId,
    ) -> Result<Option<Prescription>, StoreError> {
        self.fetch_prescription(id, true).await
    }

    async fn insert_prescription(&mut self, p: &Prescription) -> Result<(), StoreError> {
        let tx = self.tx()?;
        sqlx::query(
            r"
            INSERT INTO prescriptions (
                id, encounter_id, status, valid_from, valid_to, notes,
                created_at, created_by, updated_at, updated_by,
                canceled_at, canceled_by, canceled_reason
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ",
        )
        .bind(*p.id.as_uuid())
        .bind(*p.encounter_id.as_uuid())
        .bind(p.status.as_str())
        .bind(p.valid_from)
        .bind(p.valid_to)
        .bind(&p.notes)
        .bind(p.created_at)
        .bind(p.created_by.map(|a| *a.as_uuid()))
        .bind(p.updated_at)
        .bind(p.updated_by.map(|a| *a.as_uuid()))
        .bind(p.canceled_at)
        .bind(p.canceled_by.map(|a| *a.as_uuid()))
        .bind(&p.canceled_reason)
        .execute(&mut **tx)
        .await
        .map_err(|e| db_error("Failed to insert prescription", e))?;
        Ok(())
    }

    async fn update_prescription(&mut self, p: &Prescription) -> Result<(), StoreError> {
        let tx = self.tx()?;
        let result = sqlx::query(
            r"
            UPDATE prescriptions
            SET status = $2, valid_from = $3, valid_to = $4, notes = $5,
                updated_at = $6, updated_by = $7,
                canceled_at = $8, canceled_by = $9, canceled_reason = $10
            WHERE id = $1
            ",
        )
        .bind(*p.id.as_uuid())
        .bind(p.status.as_str())
        .bind(p.valid_from)
        .bind(p.valid_to)
        .bind(&p.notes)
        .bind(p.updated_at)
        .bind(p.updated_by.map(|a| *a.as_uuid()))
        .bind(p.canceled_at)
        .bind(p.canceled_by.map(|a| *a.as_uuid()))
        .bind(&p.canceled_reason)
        .execute(&mut **tx)
        .await
        .map_err(|e| db_error("Failed to update prescription", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DatabaseError(format!(
                "prescription {} missing",
                p.id
            )));
        }
        Ok(())
    }

    async fn prescription_items(
        &mut self,
        prescription_id: PrescriptionId,
    ) -> Result<Vec<PrescriptionItem>, StoreError> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM prescription_items WHERE prescription_id = $1 ORDER BY seq"
        );
        let tx = self.tx()?;
        let records = sqlx::query(&sql)
            .bind(*prescription_id.as_uuid())
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| db_error("Failed to load prescription items", e))?;
        records.iter().map(rows::item).collect()
    }

    async fn prescription_item(
        &mut self,
        id: PrescriptionItemId,
    ) -> Result<Option<PrescriptionItem>, StoreError> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM prescription_items WHERE id = $1");
        let tx = self.tx()?;
        sqlx::query(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| db_error("Failed to load prescription item", e))?
            .as_ref()
            .map(rows::item)
            .transpose()
    }

    async fn insert_prescription_item(&mut self, item: &PrescriptionItem) -> Result<(), StoreError> {
        let tx = self.tx()?;
        sqlx::query(
            r"
            INSERT INTO prescription_items (
                id, prescription_id, medicine_id, quantity_prescribed, unit_prescribed,
                dose, frequency, duration, notes, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ",
        )
        .bind(*item.id.as_uuid())
        .bind(*item.prescription_id.as_uuid())
        .bind(*item.medicine_id.as_uuid())
        .bind(item.quantity_prescribed)
        .bind(&item.unit_prescribed)
        .bind(&item.dose)
        .bind(&item.frequency)
        .bind(&item.duration)
        .bind(&item.notes)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| db_error("Failed to insert prescription item", e))?;
        Ok(())
    }

    async fn delete_prescription_item(&mut self, id: PrescriptionItemId) -> Result<(), StoreError> {
        let tx = self.tx()?;
        sqlx::query("DELETE FROM prescription_items WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&mut **tx)
            .await
            .map_err(|e| db_error("Failed to delete prescription item", e))?;
        Ok(())
    }

    async fn item_has_dispense_lines(&mut self, id: PrescriptionItemId) -> Result<bool, StoreError> {
        let tx = self.tx()?;
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM dispense_lines WHERE prescription_item_id = $1)",
        )
        .bind(*id.as_uuid())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| db_error("Failed to check dispense lines", e))?;
        Ok(exists)
    }

    async fn dispense(&mut self, id: DispenseId) -> Result<Option<Dispense>, StoreError> {
        self.fetch_dispense(id, false).await
    }

    async fn lock_dispense(&mut self, id: DispenseId) -> Result<Option<Dispense>, StoreError> {
        self.fetch_dispense(id, true).await
    }

    async fn insert_dispense(&mut self, d: &Dispense) -> Result<(), StoreError> {
        let tx = self.tx()?;
        sqlx::query(
            r"
            INSERT INTO dispenses (
                id, prescription_id, status, dispensed_at, dispensed_by, notes,
                created_at, created_by, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(*d.id.as_uuid())
        .bind(*d.prescription_id.as_uuid())
        .bind(d.status.as_str())
        .bind(d.dispensed_at)
        .bind(d.dispensed_by.map(|a| *a.as_uuid()))
        .bind(&d.notes)
        .bind(d.created_at)
        .bind(d.created_by.map(|a| *a.as_uuid()))
        .bind(d.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| db_error("Failed to insert dispense", e))?;
        Ok(())
    }

    async fn update_dispense(&mut self, d: &Dispense) -> Result<(), StoreError> {
        let tx = self.tx()?;
        let result = sqlx::query(
            r"
            UPDATE dispenses
            SET status = $2, dispensed_at = $3, dispensed_by = $4, notes = $5, updated_at = $6
            WHERE id = $1
            ",
        )
        .bind(*d.id.as_uuid())
        .bind(d.status.as_str())
        .bind(d.dispensed_at)
        .bind(d.dispensed_by.map(|a| *a.as_uuid()))
        .bind(&d.notes)
        .bind(d.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| db_error("Failed to update dispense", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DatabaseError(format!("dispense {} missing", d.id)));
        }
        Ok(())
    }

    async fn dispense_lines(
        &mut self,
        dispense_id: DispenseId,
    ) -> Result<Vec<DispenseLine>, StoreError> {
        let sql =
            format!("SELECT {LINE_COLUMNS} FROM dispense_lines WHERE dispense_id = $1 ORDER BY seq");
        let tx = self.tx()?;
        let records = sqlx::query(&sql)
            .bind(*dispense_id.as_uuid())
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| db_error("Failed to load dispense lines", e))?;
        records.iter().map(rows::line).collect()
    }

    async fn insert_dispense_line(&mut self, line: &DispenseLine) -> Result<(), StoreError> {
        let tx = self.tx()?;
        sqlx::query(
            r"
            INSERT INTO dispense_lines (
                id, dispense_id, prescription_item_id, quantity_dispensed, notes, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(*line.id.as_uuid())
        .bind(*line.dispense_id.as_uuid())
        .bind(*line.prescription_item_id.as_uuid())
        .bind(line.quantity_dispensed)
        .bind(&line.notes)
        .bind(line.created_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| db_error("Failed to insert dispense line", e))?;
        Ok(())
    }

    async fn completed_quantity(
        &mut self,
        item_id: PrescriptionItemId,
    ) -> Result<Decimal, StoreError> {
        let tx = self.tx()?;
        let (total,): (Decimal,) = sqlx::query_as(
            r"
            SELECT COALESCE(SUM(l.quantity_dispensed), 0)
            FROM dispense_lines l
            JOIN dispenses d ON d.id = l.dispense_id
            WHERE l.prescription_item_id = $1 AND d.status = 'COMPLETED'
            ",
        )
        .bind(*item_id.as_uuid())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| db_error("Failed to sum completed quantity", e))?;
        Ok(total)
    }

    async fn pending_quantity(
        &mut self,
        dispense_id: DispenseId,
        item_id: PrescriptionItemId,
    ) -> Result<Decimal, StoreError> {
        let tx = self.tx()?;
        let (total,): (Decimal,) = sqlx::query_as(
            r"
            SELECT COALESCE(SUM(quantity_dispensed), 0)
            FROM dispense_lines
            WHERE dispense_id = $1 AND prescription_item_id = $2
            ",
        )
        .bind(*dispense_id.as_uuid())
        .bind(*item_id.as_uuid())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| db_error("Failed to sum dispense quantity", e))?;
        Ok(total)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::Finished)?;
        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit transaction", e))
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::Finished)?;
        tx.rollback()
            .await
            .map_err(|e| db_error("Failed to roll back transaction", e))?;
        tracing::trace!("Transaction rolled back");
        Ok(())
    }
}
