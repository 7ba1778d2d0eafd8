//! In-memory contact repository.
//!
//! # Responsibility
//! - Provide a store double with the same contract as the SQLite repository.
//! - Let callers seed arbitrary rows, including legacy inconsistent ones.
//!
//! # Invariants
//! - Timestamps come from a logical millisecond clock that advances on every
//!   mutation, so insertion order equals `created_at` order unless seeded.
//! - A failed transaction restores the exact pre-transaction state.

use crate::model::contact::{
    Contact, ContactId, ContactValidationError, LinkPrecedence, NewContact,
};
use crate::repo::contact_repo::{ContactRepository, RepoError, RepoResult};
use std::cell::RefCell;

const CLOCK_START_MS: i64 = 1_700_000_000_000;

#[derive(Debug, Clone)]
struct MemoryState {
    rows: Vec<Contact>,
    next_id: ContactId,
    clock_ms: i64,
}

impl MemoryState {
    fn tick(&mut self) -> i64 {
        self.clock_ms += 1;
        self.clock_ms
    }

    fn row(&self, id: ContactId) -> Option<&Contact> {
        self.rows.iter().find(|row| row.id == id)
    }

    fn row_mut(&mut self, id: ContactId) -> Option<&mut Contact> {
        self.rows.iter_mut().find(|row| row.id == id)
    }

    fn ensure_primary(&self, target_id: ContactId) -> RepoResult<()> {
        match self.row(target_id) {
            Some(target) if target.is_primary() => Ok(()),
            _ => Err(RepoError::InvalidLink { target_id }),
        }
    }
}

/// `RefCell`-backed store double; single-threaded by construction.
#[derive(Debug)]
pub struct InMemoryContactRepository {
    state: RefCell<MemoryState>,
}

impl Default for InMemoryContactRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryContactRepository {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(MemoryState {
                rows: Vec::new(),
                next_id: 1,
                clock_ms: CLOCK_START_MS,
            }),
        }
    }

    /// Stores `contact` exactly as given, bypassing link checks.
    ///
    /// Used to reproduce timestamp ties and pre-existing data.
    ///
    /// # Errors
    /// - `Conflict` when the id or the `(email, phone_number)` pair is taken.
    pub fn seed(&self, contact: Contact) -> RepoResult<()> {
        let mut state = self.state.borrow_mut();
        if state.row(contact.id).is_some()
            || pair_taken(&state.rows, &contact.email, &contact.phone_number)
        {
            return Err(RepoError::Conflict);
        }
        state.next_id = state.next_id.max(contact.id + 1);
        state.clock_ms = state.clock_ms.max(contact.updated_at);
        state.rows.push(contact);
        state.rows.sort_by_key(|row| row.id);
        Ok(())
    }

    /// Snapshot of every stored row, ordered by id.
    pub fn all_contacts(&self) -> Vec<Contact> {
        self.state.borrow().rows.clone()
    }

    fn select(&self, predicate: impl Fn(&Contact) -> bool) -> Vec<Contact> {
        self.state
            .borrow()
            .rows
            .iter()
            .filter(|row| predicate(row))
            .cloned()
            .collect()
    }
}

impl ContactRepository for InMemoryContactRepository {
    fn find_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> RepoResult<Vec<Contact>> {
        Ok(self.select(|row| {
            (email.is_some() && row.email.as_deref() == email)
                || (phone_number.is_some() && row.phone_number.as_deref() == phone_number)
        }))
    }

    fn find_by_ids(&self, ids: &[ContactId]) -> RepoResult<Vec<Contact>> {
        Ok(self.select(|row| ids.contains(&row.id)))
    }

    fn find_by_linked_ids(&self, primary_ids: &[ContactId]) -> RepoResult<Vec<Contact>> {
        Ok(self.select(|row| {
            row.linked_id
                .is_some_and(|linked_id| primary_ids.contains(&linked_id))
        }))
    }

    fn get_contact(&self, id: ContactId) -> RepoResult<Option<Contact>> {
        Ok(self.state.borrow().row(id).cloned())
    }

    fn insert_contact(&self, contact: &NewContact) -> RepoResult<Contact> {
        contact.validate()?;
        let mut state = self.state.borrow_mut();
        if let Some(target_id) = contact.linked_id {
            state.ensure_primary(target_id)?;
        }
        if pair_taken(&state.rows, &contact.email, &contact.phone_number) {
            return Err(RepoError::Conflict);
        }

        let now = state.tick();
        let row = Contact {
            id: state.next_id,
            email: contact.email.clone(),
            phone_number: contact.phone_number.clone(),
            linked_id: contact.linked_id,
            link_precedence: contact.link_precedence(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        state.next_id += 1;
        state.rows.push(row.clone());
        Ok(row)
    }

    fn link_to_primary(&self, id: ContactId, primary_id: ContactId) -> RepoResult<Contact> {
        if id == primary_id {
            return Err(RepoError::Validation(ContactValidationError::SelfLink(id)));
        }
        let mut state = self.state.borrow_mut();
        state.ensure_primary(primary_id)?;
        let now = state.tick();
        let row = state.row_mut(id).ok_or(RepoError::NotFound(id))?;
        row.linked_id = Some(primary_id);
        row.link_precedence = LinkPrecedence::Secondary;
        row.updated_at = now;
        Ok(row.clone())
    }

    fn promote_to_primary(&self, id: ContactId) -> RepoResult<Contact> {
        let mut state = self.state.borrow_mut();
        let now = state.tick();
        let row = state.row_mut(id).ok_or(RepoError::NotFound(id))?;
        row.linked_id = None;
        row.link_precedence = LinkPrecedence::Primary;
        row.updated_at = now;
        Ok(row.clone())
    }

    fn relink_secondaries(
        &self,
        from_primary: ContactId,
        to_primary: ContactId,
    ) -> RepoResult<usize> {
        if from_primary == to_primary {
            return Ok(0);
        }
        let mut state = self.state.borrow_mut();
        state.ensure_primary(to_primary)?;
        let now = state.tick();
        let mut moved = 0;
        for row in state
            .rows
            .iter_mut()
            .filter(|row| row.linked_id == Some(from_primary) && row.id != to_primary)
        {
            row.linked_id = Some(to_primary);
            row.updated_at = now;
            moved += 1;
        }
        Ok(moved)
    }

    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        Self: Sized,
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<RepoError>,
    {
        let snapshot = self.state.borrow().clone();
        let result = work(self);
        if result.is_err() {
            *self.state.borrow_mut() = snapshot;
        }
        result
    }
}

fn pair_taken(rows: &[Contact], email: &Option<String>, phone_number: &Option<String>) -> bool {
    rows.iter()
        .any(|row| &row.email == email && &row.phone_number == phone_number)
}
