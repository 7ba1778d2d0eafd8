//! Identity resolution pipeline.
//!
//! # Responsibility
//! - Chain match finding, cluster expansion, primary selection,
//!   reconciliation and view building for one fact.
//! - Build read-only views of an existing cluster.
//!
//! # Invariants
//! - Functions here never open transactions; callers wrap them.
//! - The returned view is read back from the store after all writes.

pub mod cluster;
pub mod reconcile;
pub mod select;
pub mod view;

use crate::model::contact::{Contact, ContactId, NewContact};
use crate::model::fact::ValidatedFact;
use crate::repo::contact_repo::{ContactRepository, RepoError, RepoResult};
use cluster::{expand_cluster, find_matches};
use reconcile::{reconcile, ReconcileOutcome};
use select::select_primary;
use view::{build_view, ContactView};

/// Result of resolving one fact against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub view: ContactView,
    /// Contacts that matched the fact directly.
    pub matched: usize,
    /// Size of the expanded cluster before any insert.
    pub cluster_size: usize,
    /// `None` when nothing matched and a fresh primary was created.
    pub reconciliation: Option<ReconcileOutcome>,
}

impl Resolution {
    /// Whether this resolution inserted a row (primary or secondary).
    pub fn created_contact(&self) -> bool {
        match &self.reconciliation {
            Some(outcome) => outcome.created.is_some(),
            None => true,
        }
    }
}

/// Resolves `fact` to its cluster, reconciling the store on the way.
///
/// # Errors
/// - `Conflict` when an insert loses a race on the `(email, phone)` pair.
/// - Any other repository error unchanged.
pub fn resolve<R: ContactRepository>(repo: &R, fact: &ValidatedFact) -> RepoResult<Resolution> {
    let matches = find_matches(repo, fact)?;
    if matches.is_empty() {
        let primary = repo.insert_contact(&NewContact::primary(
            fact.email().map(str::to_string),
            fact.phone_number().map(str::to_string),
        ))?;
        return Ok(Resolution {
            view: build_view(&primary, &[]),
            matched: 0,
            cluster_size: 0,
            reconciliation: None,
        });
    }

    let matched = matches.len();
    let cluster = expand_cluster(repo, matches)?;
    let primary_id = select_primary(&cluster)
        .map(|primary| primary.id)
        .ok_or_else(|| RepoError::InvalidData("expanded cluster is empty".to_string()))?;
    let outcome = reconcile(repo, &cluster, primary_id, fact)?;
    let view = load_view(repo, &outcome.primary)?;

    Ok(Resolution {
        view,
        matched,
        cluster_size: cluster.len(),
        reconciliation: Some(outcome),
    })
}

/// Builds the view for `primary` from its currently stored secondaries.
pub fn load_view<R: ContactRepository>(repo: &R, primary: &Contact) -> RepoResult<ContactView> {
    let mut secondaries = repo.find_by_linked_ids(&[primary.id])?;
    secondaries.sort_by_key(Contact::seniority);
    Ok(build_view(primary, &secondaries))
}

/// Read-only view of the cluster containing contact `id`.
///
/// # Errors
/// - `NotFound` when `id` does not exist.
/// - `InvalidLink` when the contact points at a row that is not a primary.
pub fn cluster_view<R: ContactRepository>(repo: &R, id: ContactId) -> RepoResult<ContactView> {
    let contact = repo.get_contact(id)?.ok_or(RepoError::NotFound(id))?;
    let primary = match contact.linked_id {
        Some(primary_id) => repo
            .get_contact(primary_id)?
            .filter(Contact::is_primary)
            .ok_or(RepoError::InvalidLink {
                target_id: primary_id,
            })?,
        None => contact,
    };
    load_view(repo, &primary)
}
