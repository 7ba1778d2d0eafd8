//! Contact repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide the store operations the identity pipeline needs.
//! - Keep SQL details inside the persistence boundary.
//! - Report uniqueness races as `RepoError::Conflict`.
//!
//! # Invariants
//! - Links may only target rows that are currently primaries, so the store
//!   never holds a secondary-of-secondary chain.
//! - Read paths reject invalid persisted rows instead of masking them.
//! - Every mutation refreshes `updated_at`; `created_at` is never written.

use crate::db::DbError;
use crate::model::contact::{
    Contact, ContactId, ContactValidationError, LinkPrecedence, NewContact,
};
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, Row, Transaction, TransactionBehavior,
};
use std::error::Error;
use std::fmt::{Display, Formatter};

const CONTACT_SELECT_SQL: &str = "SELECT
    id,
    email,
    phone_number,
    linked_id,
    link_precedence,
    created_at,
    updated_at,
    deleted_at
FROM contacts";

/// Current time in epoch milliseconds, evaluated by SQLite.
const NOW_MS_SQL: &str = "CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for contact persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(ContactValidationError),
    Db(DbError),
    NotFound(ContactId),
    /// Another row already holds the same `(email, phone_number)` pair.
    Conflict,
    /// Link target is missing or is not a primary.
    InvalidLink { target_id: ContactId },
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "contact not found: {id}"),
            Self::Conflict => write!(f, "contact with the same email and phone already exists"),
            Self::InvalidLink { target_id } => {
                write!(f, "link target {target_id} is not a primary contact")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted contact data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) => None,
            Self::Conflict => None,
            Self::InvalidLink { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<ContactValidationError> for RepoError {
    fn from(value: ContactValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        if is_unique_violation(&value) {
            return Self::Conflict;
        }
        Self::Db(DbError::Sqlite(value))
    }
}

/// Store operations used by the identity pipeline.
///
/// All list operations return rows ordered by `id ASC`.
pub trait ContactRepository {
    /// Rows whose email equals `email` or whose phone equals `phone_number`.
    /// Absent inputs never match absent stored values.
    fn find_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> RepoResult<Vec<Contact>>;

    fn find_by_ids(&self, ids: &[ContactId]) -> RepoResult<Vec<Contact>>;

    /// Secondaries whose `linked_id` is one of `primary_ids`.
    fn find_by_linked_ids(&self, primary_ids: &[ContactId]) -> RepoResult<Vec<Contact>>;

    fn get_contact(&self, id: ContactId) -> RepoResult<Option<Contact>>;

    /// Inserts a row and returns it with store-assigned id and timestamps.
    ///
    /// # Errors
    /// - `Conflict` when the `(email, phone_number)` pair already exists.
    /// - `InvalidLink` when `linked_id` does not name a primary.
    fn insert_contact(&self, contact: &NewContact) -> RepoResult<Contact>;

    /// Turns `id` into a secondary of `primary_id`.
    fn link_to_primary(&self, id: ContactId, primary_id: ContactId) -> RepoResult<Contact>;

    /// Turns `id` into a primary with no link.
    fn promote_to_primary(&self, id: ContactId) -> RepoResult<Contact>;

    /// Re-points every secondary of `from_primary` to `to_primary`.
    /// Returns the number of rows moved.
    fn relink_secondaries(&self, from_primary: ContactId, to_primary: ContactId)
        -> RepoResult<usize>;

    /// Runs `work` atomically: commits on `Ok`, rolls back on `Err`.
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        Self: Sized,
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<RepoError>;
}

/// SQLite-backed contact repository.
pub struct SqliteContactRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteContactRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn query_contacts(&self, sql: &str, bind_values: Vec<Value>) -> RepoResult<Vec<Contact>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut contacts = Vec::new();
        while let Some(row) = rows.next()? {
            contacts.push(parse_contact_row(row)?);
        }
        Ok(contacts)
    }

    fn require_contact(&self, id: ContactId) -> RepoResult<Contact> {
        self.get_contact(id)?.ok_or(RepoError::NotFound(id))
    }

    fn ensure_primary(&self, target_id: ContactId) -> RepoResult<()> {
        match self.get_contact(target_id)? {
            Some(target) if target.is_primary() => Ok(()),
            _ => Err(RepoError::InvalidLink { target_id }),
        }
    }
}

impl ContactRepository for SqliteContactRepository<'_> {
    fn find_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> RepoResult<Vec<Contact>> {
        if email.is_none() && phone_number.is_none() {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(&format!(
            "{CONTACT_SELECT_SQL}
             WHERE email = ?1
                OR phone_number = ?2
             ORDER BY id ASC;"
        ))?;
        let mut rows = stmt.query(params![email, phone_number])?;
        let mut contacts = Vec::new();
        while let Some(row) = rows.next()? {
            contacts.push(parse_contact_row(row)?);
        }
        Ok(contacts)
    }

    fn find_by_ids(&self, ids: &[ContactId]) -> RepoResult<Vec<Contact>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "{CONTACT_SELECT_SQL} WHERE id IN ({}) ORDER BY id ASC;",
            placeholders(ids.len())
        );
        self.query_contacts(&sql, ids.iter().copied().map(Value::Integer).collect())
    }

    fn find_by_linked_ids(&self, primary_ids: &[ContactId]) -> RepoResult<Vec<Contact>> {
        if primary_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "{CONTACT_SELECT_SQL} WHERE linked_id IN ({}) ORDER BY id ASC;",
            placeholders(primary_ids.len())
        );
        self.query_contacts(
            &sql,
            primary_ids.iter().copied().map(Value::Integer).collect(),
        )
    }

    fn get_contact(&self, id: ContactId) -> RepoResult<Option<Contact>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CONTACT_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_contact_row(row)?));
        }
        Ok(None)
    }

    fn insert_contact(&self, contact: &NewContact) -> RepoResult<Contact> {
        contact.validate()?;
        if let Some(target_id) = contact.linked_id {
            self.ensure_primary(target_id)?;
        }

        self.conn.execute(
            "INSERT INTO contacts (
                email,
                phone_number,
                linked_id,
                link_precedence
            ) VALUES (?1, ?2, ?3, ?4);",
            params![
                contact.email.as_deref(),
                contact.phone_number.as_deref(),
                contact.linked_id,
                contact.link_precedence().as_str(),
            ],
        )?;

        self.require_contact(self.conn.last_insert_rowid())
    }

    fn link_to_primary(&self, id: ContactId, primary_id: ContactId) -> RepoResult<Contact> {
        if id == primary_id {
            return Err(RepoError::Validation(ContactValidationError::SelfLink(id)));
        }
        self.ensure_primary(primary_id)?;

        let changed = self.conn.execute(
            &format!(
                "UPDATE contacts
                 SET linked_id = ?2,
                     link_precedence = 'secondary',
                     updated_at = {NOW_MS_SQL}
                 WHERE id = ?1;"
            ),
            params![id, primary_id],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        self.require_contact(id)
    }

    fn promote_to_primary(&self, id: ContactId) -> RepoResult<Contact> {
        let changed = self.conn.execute(
            &format!(
                "UPDATE contacts
                 SET linked_id = NULL,
                     link_precedence = 'primary',
                     updated_at = {NOW_MS_SQL}
                 WHERE id = ?1;"
            ),
            [id],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        self.require_contact(id)
    }

    fn relink_secondaries(
        &self,
        from_primary: ContactId,
        to_primary: ContactId,
    ) -> RepoResult<usize> {
        if from_primary == to_primary {
            return Ok(0);
        }
        self.ensure_primary(to_primary)?;

        let changed = self.conn.execute(
            &format!(
                "UPDATE contacts
                 SET linked_id = ?2,
                     updated_at = {NOW_MS_SQL}
                 WHERE linked_id = ?1
                   AND id <> ?2;"
            ),
            params![from_primary, to_primary],
        )?;

        Ok(changed)
    }

    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        Self: Sized,
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<RepoError>,
    {
        // Immediate takes the write lock up front so the cluster read and the
        // writes that depend on it cannot interleave with another writer.
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(RepoError::from)?;
        let value = work(self)?;
        tx.commit().map_err(RepoError::from)?;
        Ok(value)
    }
}

/// Returns the ids of every contact whose `linked_id` does not point at a
/// primary. Used by consistency checks; empty on a healthy store.
pub fn find_broken_links(conn: &Connection) -> RepoResult<Vec<ContactId>> {
    let mut stmt = conn.prepare(
        "SELECT child.id
         FROM contacts AS child
         LEFT JOIN contacts AS parent ON parent.id = child.linked_id
         WHERE child.linked_id IS NOT NULL
           AND (parent.id IS NULL OR parent.link_precedence <> 'primary')
         ORDER BY child.id ASC;",
    )?;
    let ids = stmt
        .query_map([], |row| row.get::<_, ContactId>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Counts rows holding exactly the given `(email, phone_number)` pair.
pub fn count_pair(
    conn: &Connection,
    email: Option<&str>,
    phone_number: Option<&str>,
) -> RepoResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*)
         FROM contacts
         WHERE email IS ?1
           AND phone_number IS ?2;",
        params![email, phone_number],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count)
}

fn parse_contact_row(row: &Row<'_>) -> RepoResult<Contact> {
    let precedence_text: String = row.get("link_precedence")?;
    let link_precedence = LinkPrecedence::parse(&precedence_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid link precedence `{precedence_text}` in contacts.link_precedence"
        ))
    })?;

    let contact = Contact {
        id: row.get("id")?,
        email: row.get("email")?,
        phone_number: row.get("phone_number")?,
        linked_id: row.get("linked_id")?,
        link_precedence,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        deleted_at: row.get("deleted_at")?,
    };
    contact.validate()?;
    Ok(contact)
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}
