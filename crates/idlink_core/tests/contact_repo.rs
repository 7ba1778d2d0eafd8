use idlink_core::db::open_db_in_memory;
use idlink_core::repo::contact_repo::find_broken_links;
use idlink_core::{
    ContactRepository, ContactValidationError, LinkPrecedence, NewContact, RepoError,
    SqliteContactRepository,
};

fn some(value: &str) -> Option<String> {
    Some(value.to_string())
}

#[test]
fn insert_and_lookup_round_trip_on_sqlite() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteContactRepository::new(&conn);

    let primary = repo
        .insert_contact(&NewContact::primary(some("doc@hillvalley.edu"), some("121")))
        .unwrap();
    assert!(primary.is_primary());
    assert!(primary.created_at > 0);
    assert_eq!(primary.created_at, primary.updated_at);
    assert!(primary.deleted_at.is_none());

    let secondary = repo
        .insert_contact(&NewContact::secondary(
            some("emmett@hillvalley.edu"),
            some("121"),
            primary.id,
        ))
        .unwrap();
    assert_eq!(secondary.link_precedence, LinkPrecedence::Secondary);
    assert_eq!(secondary.linked_id, Some(primary.id));

    let by_phone = repo.find_by_email_or_phone(None, Some("121")).unwrap();
    assert_eq!(
        by_phone.iter().map(|row| row.id).collect::<Vec<_>>(),
        vec![primary.id, secondary.id]
    );

    let by_email = repo
        .find_by_email_or_phone(Some("emmett@hillvalley.edu"), None)
        .unwrap();
    assert_eq!(by_email.len(), 1);
    assert_eq!(by_email[0], secondary);

    assert_eq!(repo.find_by_linked_ids(&[primary.id]).unwrap(), vec![secondary.clone()]);
    assert_eq!(repo.find_by_ids(&[secondary.id, 404]).unwrap(), vec![secondary]);
    assert!(repo.get_contact(404).unwrap().is_none());
}

#[test]
fn lookup_without_channels_matches_nothing() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteContactRepository::new(&conn);
    repo.insert_contact(&NewContact::primary(None, some("1")))
        .unwrap();

    assert!(repo.find_by_email_or_phone(None, None).unwrap().is_empty());
    assert!(repo.find_by_ids(&[]).unwrap().is_empty());
    assert!(repo.find_by_linked_ids(&[]).unwrap().is_empty());
}

#[test]
fn duplicate_pair_is_reported_as_conflict() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteContactRepository::new(&conn);

    repo.insert_contact(&NewContact::primary(some("a@x.com"), some("1")))
        .unwrap();
    let err = repo
        .insert_contact(&NewContact::primary(some("a@x.com"), some("1")))
        .unwrap_err();
    assert!(matches!(err, RepoError::Conflict));

    repo.insert_contact(&NewContact::primary(some("b@x.com"), None))
        .unwrap();
    let err = repo
        .insert_contact(&NewContact::primary(some("b@x.com"), None))
        .unwrap_err();
    assert!(matches!(err, RepoError::Conflict), "absent phone must still collide");
}

#[test]
fn links_only_target_primaries() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteContactRepository::new(&conn);

    let primary = repo
        .insert_contact(&NewContact::primary(some("a@x.com"), None))
        .unwrap();
    let secondary = repo
        .insert_contact(&NewContact::secondary(some("a@x.com"), some("1"), primary.id))
        .unwrap();

    let err = repo
        .insert_contact(&NewContact::secondary(some("c@x.com"), None, secondary.id))
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidLink { target_id } if target_id == secondary.id));

    let err = repo.link_to_primary(primary.id, 404).unwrap_err();
    assert!(matches!(err, RepoError::InvalidLink { target_id: 404 }));

    let err = repo.link_to_primary(primary.id, primary.id).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(ContactValidationError::SelfLink(_))
    ));

    assert!(find_broken_links(&conn).unwrap().is_empty());
}

#[test]
fn demotion_and_cascade_update_rows() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteContactRepository::new(&conn);

    let older = repo
        .insert_contact(&NewContact::primary(some("a@x.com"), None))
        .unwrap();
    let younger = repo
        .insert_contact(&NewContact::primary(None, some("2")))
        .unwrap();
    let child = repo
        .insert_contact(&NewContact::secondary(some("c@x.com"), some("2"), younger.id))
        .unwrap();

    let moved = repo.relink_secondaries(younger.id, older.id).unwrap();
    assert_eq!(moved, 1);
    let demoted = repo.link_to_primary(younger.id, older.id).unwrap();
    assert_eq!(demoted.link_precedence, LinkPrecedence::Secondary);
    assert_eq!(demoted.created_at, younger.created_at);
    assert!(demoted.updated_at >= younger.updated_at);

    let child = repo.get_contact(child.id).unwrap().unwrap();
    assert!(child.is_secondary_of(older.id));
    assert!(find_broken_links(&conn).unwrap().is_empty());

    assert_eq!(repo.relink_secondaries(older.id, older.id).unwrap(), 0);
}

#[test]
fn promote_turns_secondary_into_primary() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteContactRepository::new(&conn);

    let primary = repo
        .insert_contact(&NewContact::primary(some("a@x.com"), None))
        .unwrap();
    let secondary = repo
        .insert_contact(&NewContact::secondary(some("a@x.com"), some("1"), primary.id))
        .unwrap();

    let promoted = repo.promote_to_primary(secondary.id).unwrap();
    assert!(promoted.is_primary());
    assert!(promoted.linked_id.is_none());

    let err = repo.promote_to_primary(404).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(404)));
}

#[test]
fn failed_transaction_rolls_back_on_sqlite() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteContactRepository::new(&conn);

    let result: Result<(), RepoError> = repo.transaction(|repo| {
        repo.insert_contact(&NewContact::primary(some("a@x.com"), None))?;
        repo.insert_contact(&NewContact::primary(some("a@x.com"), None))?;
        Ok(())
    });
    assert!(matches!(result, Err(RepoError::Conflict)));
    assert!(repo
        .find_by_email_or_phone(Some("a@x.com"), None)
        .unwrap()
        .is_empty());

    let committed = repo
        .transaction(|repo| repo.insert_contact(&NewContact::primary(some("a@x.com"), None)))
        .unwrap();
    assert_eq!(repo.get_contact(committed.id).unwrap(), Some(committed));
}

#[test]
fn soft_deleted_marker_is_read_back() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteContactRepository::new(&conn);

    let primary = repo
        .insert_contact(&NewContact::primary(some("a@x.com"), None))
        .unwrap();
    conn.execute(
        "UPDATE contacts SET deleted_at = 1700000000000 WHERE id = ?1;",
        [primary.id],
    )
    .unwrap();

    let loaded = repo.get_contact(primary.id).unwrap().unwrap();
    assert!(loaded.is_deleted());
    assert_eq!(loaded.deleted_at, Some(1_700_000_000_000));
}

#[test]
fn corrupted_precedence_is_rejected_on_read() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteContactRepository::new(&conn);

    let primary = repo
        .insert_contact(&NewContact::primary(some("a@x.com"), None))
        .unwrap();
    conn.execute_batch("PRAGMA ignore_check_constraints = ON;")
        .unwrap();
    conn.execute(
        "UPDATE contacts SET link_precedence = 'tertiary' WHERE id = ?1;",
        [primary.id],
    )
    .unwrap();

    let err = repo.get_contact(primary.id).unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(_)));
}
