//! Cluster reconciliation.
//!
//! # Responsibility
//! - Re-parent every non-primary member of a cluster onto the selected primary.
//! - Decide whether the incoming fact adds a channel value and, if so, store
//!   it as a new secondary.
//!
//! # Invariants
//! - Demoting a former primary moves all of its secondaries with it, so no
//!   row is left pointing at a secondary.
//! - Members already linked to the selected primary are not rewritten.
//! - A new secondary is inserted only when the fact carries an email or phone
//!   that no cluster member carries.
//! - Callers run this inside one store transaction.

use crate::identity::cluster::Cluster;
use crate::model::contact::{Contact, ContactId, NewContact};
use crate::model::fact::ValidatedFact;
use crate::repo::contact_repo::{ContactRepository, RepoError, RepoResult};
use std::collections::BTreeSet;

/// Store changes made by one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Primary after reconciliation.
    pub primary: Contact,
    /// Whether the selected record had to be promoted from secondary.
    pub promoted: bool,
    /// Former primaries demoted to secondaries.
    pub demoted: Vec<ContactId>,
    /// Cluster secondaries re-pointed from a stale primary.
    pub relinked: Vec<ContactId>,
    /// Rows moved along with a demoted primary.
    pub cascaded: usize,
    /// Secondary inserted for the fact's new channel value.
    pub created: Option<Contact>,
}

/// Returns whether `fact` carries a channel value absent from `cluster`.
///
/// Each channel is judged on its own: a value is new when it is present,
/// differs from the primary's, and no secondary carries it either.
pub fn is_new_information(cluster: &Cluster, fact: &ValidatedFact) -> bool {
    let email_is_new = fact
        .email()
        .is_some_and(|email| !cluster.carries_email(email));
    let phone_is_new = fact
        .phone_number()
        .is_some_and(|phone| !cluster.carries_phone_number(phone));
    email_is_new || phone_is_new
}

/// Makes `primary_id` the only primary of `cluster` and records new info.
///
/// # Errors
/// - `NotFound` when `primary_id` is not a cluster member.
/// - `Conflict` when a concurrent writer stored the fact's pair first.
pub fn reconcile<R: ContactRepository>(
    repo: &R,
    cluster: &Cluster,
    primary_id: ContactId,
    fact: &ValidatedFact,
) -> RepoResult<ReconcileOutcome> {
    let selected = cluster
        .get(primary_id)
        .ok_or(RepoError::NotFound(primary_id))?;
    let promoted = !selected.is_primary();
    let primary = if promoted {
        repo.promote_to_primary(primary_id)?
    } else {
        selected.clone()
    };

    let mut demoted = Vec::new();
    let mut cascaded = 0;
    let mut settled = BTreeSet::new();

    // Former primaries go first so their secondaries move in one statement.
    for member in cluster
        .members()
        .filter(|member| member.id != primary.id && member.is_primary())
    {
        cascaded += repo.relink_secondaries(member.id, primary.id)?;
        repo.link_to_primary(member.id, primary.id)?;
        demoted.push(member.id);
        settled.extend(
            cluster
                .members()
                .filter(|other| other.linked_id == Some(member.id))
                .map(|other| other.id),
        );
    }

    let mut relinked = Vec::new();
    for member in cluster
        .members()
        .filter(|member| member.id != primary.id && !member.is_primary())
    {
        if member.is_secondary_of(primary.id) || settled.contains(&member.id) {
            continue;
        }
        repo.link_to_primary(member.id, primary.id)?;
        relinked.push(member.id);
    }

    let created = if is_new_information(cluster, fact) {
        Some(repo.insert_contact(&NewContact::secondary(
            fact.email().map(str::to_string),
            fact.phone_number().map(str::to_string),
            primary.id,
        ))?)
    } else {
        None
    };

    Ok(ReconcileOutcome {
        primary,
        promoted,
        demoted,
        relinked,
        cascaded,
        created,
    })
}

#[cfg(test)]
mod tests {
    use super::{is_new_information, reconcile};
    use crate::identity::cluster::{expand_cluster, find_matches, Cluster};
    use crate::identity::select::select_primary;
    use crate::model::contact::{Contact, LinkPrecedence, NewContact};
    use crate::model::fact::{ContactFact, ValidatedFact};
    use crate::repo::contact_repo::ContactRepository;
    use crate::repo::memory_contact_repo::InMemoryContactRepository;

    fn some(value: &str) -> Option<String> {
        Some(value.to_string())
    }

    fn fact(email: Option<&str>, phone: Option<&str>) -> ValidatedFact {
        ContactFact::new(email.map(str::to_string), phone.map(str::to_string))
            .validate()
            .unwrap()
    }

    fn cluster_for(repo: &InMemoryContactRepository, fact: &ValidatedFact) -> Cluster {
        expand_cluster(repo, find_matches(repo, fact).unwrap()).unwrap()
    }

    #[test]
    fn known_email_with_unseen_phone_creates_one_secondary() {
        let repo = InMemoryContactRepository::new();
        let primary = repo
            .insert_contact(&NewContact::primary(some("lorraine@hillvalley.edu"), some("123456")))
            .unwrap();

        let incoming = fact(Some("lorraine@hillvalley.edu"), Some("717171"));
        let cluster = cluster_for(&repo, &incoming);
        let outcome = reconcile(&repo, &cluster, primary.id, &incoming).unwrap();

        let created = outcome.created.unwrap();
        assert_eq!(created.linked_id, Some(primary.id));
        assert_eq!(created.link_precedence, LinkPrecedence::Secondary);
        assert_eq!(created.phone_number.as_deref(), Some("717171"));
        assert!(outcome.demoted.is_empty());
        assert_eq!(repo.all_contacts().len(), 2);
    }

    #[test]
    fn fact_covered_by_primary_and_secondary_creates_nothing() {
        let repo = InMemoryContactRepository::new();
        let primary = repo
            .insert_contact(&NewContact::primary(some("a@x.com"), some("111")))
            .unwrap();
        repo.insert_contact(&NewContact::secondary(some("b@x.com"), some("222"), primary.id))
            .unwrap();

        let incoming = fact(Some("b@x.com"), Some("111"));
        let cluster = cluster_for(&repo, &incoming);
        assert!(!is_new_information(&cluster, &incoming));

        let outcome = reconcile(&repo, &cluster, primary.id, &incoming).unwrap();
        assert!(outcome.created.is_none());
        assert!(outcome.relinked.is_empty());
        assert_eq!(repo.all_contacts().len(), 2);
    }

    #[test]
    fn known_secondary_email_with_unseen_phone_creates_one_secondary() {
        let repo = InMemoryContactRepository::new();
        let primary = repo
            .insert_contact(&NewContact::primary(some("a@x.com"), some("111")))
            .unwrap();
        repo.insert_contact(&NewContact::secondary(some("b@x.com"), some("111"), primary.id))
            .unwrap();

        let incoming = fact(Some("b@x.com"), Some("333"));
        let cluster = cluster_for(&repo, &incoming);
        assert!(is_new_information(&cluster, &incoming));

        let outcome = reconcile(&repo, &cluster, primary.id, &incoming).unwrap();
        let created = outcome.created.unwrap();
        assert!(created.is_secondary_of(primary.id));
        assert_eq!(created.email.as_deref(), Some("b@x.com"));
        assert_eq!(created.phone_number.as_deref(), Some("333"));
        assert_eq!(repo.all_contacts().len(), 3);

        let cluster = cluster_for(&repo, &incoming);
        assert!(!is_new_information(&cluster, &incoming));
        let repeat = reconcile(&repo, &cluster, primary.id, &incoming).unwrap();
        assert!(repeat.created.is_none());
        assert_eq!(repo.all_contacts().len(), 3);
    }

    #[test]
    fn merging_primaries_cascades_to_their_secondaries() {
        let repo = InMemoryContactRepository::new();
        let older = repo
            .insert_contact(&NewContact::primary(some("a@x.com"), None))
            .unwrap();
        let younger = repo
            .insert_contact(&NewContact::primary(None, some("555-1111")))
            .unwrap();
        let younger_child = repo
            .insert_contact(&NewContact::secondary(
                some("c@x.com"),
                some("555-1111"),
                younger.id,
            ))
            .unwrap();

        let incoming = fact(Some("a@x.com"), Some("555-1111"));
        let cluster = cluster_for(&repo, &incoming);
        let primary_id = select_primary(&cluster).unwrap().id;
        assert_eq!(primary_id, older.id);

        let outcome = reconcile(&repo, &cluster, primary_id, &incoming).unwrap();
        assert_eq!(outcome.demoted, vec![younger.id]);
        assert_eq!(outcome.cascaded, 1);
        assert!(outcome.relinked.is_empty());
        assert!(outcome.created.is_none());

        for row in repo.all_contacts() {
            if row.id == older.id {
                assert!(row.is_primary());
            } else {
                assert!(row.is_secondary_of(older.id), "row {} not re-parented", row.id);
            }
        }
        assert!(repo.get_contact(younger_child.id).unwrap().unwrap().is_secondary_of(older.id));
    }

    #[test]
    fn secondary_selected_as_primary_is_promoted() {
        let repo = InMemoryContactRepository::new();
        let base = Contact {
            id: 1,
            email: some("old@x.com"),
            phone_number: None,
            linked_id: None,
            link_precedence: LinkPrecedence::Primary,
            created_at: 500,
            updated_at: 500,
            deleted_at: None,
        };
        repo.seed(base.clone()).unwrap();
        // Legacy row: older than its own primary.
        repo.seed(Contact {
            id: 2,
            email: some("old@x.com"),
            phone_number: some("42"),
            linked_id: Some(1),
            link_precedence: LinkPrecedence::Secondary,
            created_at: 100,
            updated_at: 100,
            ..base
        })
        .unwrap();

        let incoming = fact(Some("old@x.com"), None);
        let cluster = cluster_for(&repo, &incoming);
        let primary_id = select_primary(&cluster).unwrap().id;
        assert_eq!(primary_id, 2);

        let outcome = reconcile(&repo, &cluster, primary_id, &incoming).unwrap();
        assert!(outcome.promoted);
        assert_eq!(outcome.demoted, vec![1]);
        assert!(outcome.primary.is_primary());
        assert!(repo.get_contact(1).unwrap().unwrap().is_secondary_of(2));
    }
}
