//! Match finding and cluster expansion.
//!
//! # Responsibility
//! - Fetch the contacts that share a channel with the incoming fact.
//! - Expand those matches one link hop in each direction.
//!
//! # Invariants
//! - One hop reaches the whole cluster because the store never holds
//!   secondary-of-secondary chains.
//! - A cluster holds each contact once, keyed by id.

use crate::model::contact::{Contact, ContactId};
use crate::model::fact::ValidatedFact;
use crate::repo::contact_repo::{ContactRepository, RepoResult};
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

/// Working set of contacts connected to one fact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cluster {
    members: BTreeMap<ContactId, Contact>,
}

impl Cluster {
    pub fn from_contacts(contacts: impl IntoIterator<Item = Contact>) -> Self {
        let mut cluster = Self::default();
        cluster.absorb(contacts);
        cluster
    }

    /// Adds contacts, keeping the first copy seen for each id.
    pub fn absorb(&mut self, contacts: impl IntoIterator<Item = Contact>) {
        for contact in contacts {
            self.members.entry(contact.id).or_insert(contact);
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn get(&self, id: ContactId) -> Option<&Contact> {
        self.members.get(&id)
    }

    pub fn contains(&self, id: ContactId) -> bool {
        self.members.contains_key(&id)
    }

    /// Members in ascending id order.
    pub fn members(&self) -> impl Iterator<Item = &Contact> {
        self.members.values()
    }

    pub fn carries_email(&self, email: &str) -> bool {
        self.members()
            .any(|member| member.email.as_deref() == Some(email))
    }

    pub fn carries_phone_number(&self, phone_number: &str) -> bool {
        self.members()
            .any(|member| member.phone_number.as_deref() == Some(phone_number))
    }
}

/// Contacts whose email or phone exactly equals the fact's values.
pub fn find_matches<R: ContactRepository>(
    repo: &R,
    fact: &ValidatedFact,
) -> RepoResult<Vec<Contact>> {
    repo.find_by_email_or_phone(fact.email(), fact.phone_number())
}

/// Expands direct matches into the full cluster.
///
/// Pass one fetches the primaries that matched secondaries point to. Pass two
/// fetches every secondary of every primary collected so far, including the
/// primaries found by pass one.
pub fn expand_cluster<R: ContactRepository>(
    repo: &R,
    matches: Vec<Contact>,
) -> RepoResult<Cluster> {
    let matched = matches.len();
    let mut cluster = Cluster::from_contacts(matches);

    let missing_primaries: Vec<ContactId> = cluster
        .members()
        .filter_map(|member| member.linked_id)
        .filter(|linked_id| !cluster.contains(*linked_id))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if !missing_primaries.is_empty() {
        cluster.absorb(repo.find_by_ids(&missing_primaries)?);
    }

    let primary_ids: Vec<ContactId> = cluster
        .members()
        .filter(|member| member.is_primary())
        .map(|member| member.id)
        .collect();
    if !primary_ids.is_empty() {
        cluster.absorb(repo.find_by_linked_ids(&primary_ids)?);
    }

    debug!(
        "event=cluster_expand module=identity status=ok matched={} cluster_size={}",
        matched,
        cluster.len()
    );
    Ok(cluster)
}
