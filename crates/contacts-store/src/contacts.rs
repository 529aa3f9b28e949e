//! PostgreSQL contact store

use async_trait::async_trait;
use contacts_core::{
    Contact, ContactFields, ContactId, ContactStore, CoreError, Result, UserId,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::error::store_error;

const COLUMNS: &str = "id, first_name, last_name, phone, email, address, postal_code, note, \
                       created_by, created_at, updated_at";

/// Contacts in the `contacts` table, always filtered by `created_by`
#[derive(Clone)]
pub struct PgContactStore {
    pool: PgPool,
}

impl PgContactStore {
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn contact_from_row(row: &PgRow) -> std::result::Result<Contact, sqlx::Error> {
    Ok(Contact {
        id: ContactId::new(row.try_get("id")?),
        fields: ContactFields {
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            phone: row.try_get("phone")?,
            email: row.try_get("email")?,
            address: row.try_get("address")?,
            postal_code: row.try_get("postal_code")?,
            note: row.try_get("note")?,
        },
        created_by: UserId::new(row.try_get("created_by")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl ContactStore for PgContactStore {
    async fn insert(&self, contact: &Contact) -> Result<Contact> {
        let f = &contact.fields;
        sqlx::query(
            r"INSERT INTO contacts
                 (id, first_name, last_name, phone, email, address, postal_code, note,
                  created_by, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
               ON CONFLICT (id) DO NOTHING",
        )
        .bind(contact.id.as_uuid())
        .bind(&f.first_name)
        .bind(&f.last_name)
        .bind(&f.phone)
        .bind(f.email.as_deref())
        .bind(f.address.as_deref())
        .bind(f.postal_code.as_deref())
        .bind(f.note.as_deref())
        .bind(contact.created_by.as_uuid())
        .bind(contact.created_at)
        .bind(contact.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        self.get(&contact.created_by, &contact.id)
            .await?
            .ok_or_else(|| {
                CoreError::Integrity(format!("contact id {} is owned by another user", contact.id))
            })
    }

    async fn get(&self, owner: &UserId, id: &ContactId) -> Result<Option<Contact>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM contacts WHERE id = $1 AND created_by = $2"
        ))
        .bind(id.as_uuid())
        .bind(owner.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.as_ref()
            .map(contact_from_row)
            .transpose()
            .map_err(store_error)
    }

    async fn update(
        &self,
        owner: &UserId,
        id: &ContactId,
        fields: &ContactFields,
    ) -> Result<Option<Contact>> {
        let row = sqlx::query(&format!(
            "UPDATE contacts
             SET first_name = $3, last_name = $4, phone = $5, email = $6,
                 address = $7, postal_code = $8, note = $9, updated_at = NOW()
             WHERE id = $1 AND created_by = $2
             RETURNING {COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(owner.as_uuid())
        .bind(&fields.first_name)
        .bind(&fields.last_name)
        .bind(&fields.phone)
        .bind(fields.email.as_deref())
        .bind(fields.address.as_deref())
        .bind(fields.postal_code.as_deref())
        .bind(fields.note.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.as_ref()
            .map(contact_from_row)
            .transpose()
            .map_err(store_error)
    }

    async fn delete(&self, owner: &UserId, id: &ContactId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM contacts WHERE id = $1 AND created_by = $2")
            .bind(id.as_uuid())
            .bind(owner.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, owner: &UserId) -> Result<Vec<Contact>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM contacts WHERE created_by = $1 ORDER BY created_at DESC"
        ))
        .bind(owner.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.iter()
            .map(contact_from_row)
            .collect::<std::result::Result<_, _>>()
            .map_err(store_error)
    }
}
