//! Primary selection.
//!
//! The primary is the member with the smallest `(created_at, id)`: the oldest
//! record, and the lowest id when creation times tie.

use crate::identity::cluster::Cluster;
use crate::model::contact::Contact;

/// Picks the canonical primary of `cluster`; `None` only for an empty cluster.
pub fn select_primary(cluster: &Cluster) -> Option<&Contact> {
    cluster.members().min_by_key(|member| member.seniority())
}
