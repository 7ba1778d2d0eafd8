use idlink_core::db::migrations::latest_version;
use idlink_core::db::{open_db, open_db_in_memory, DbError};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "contacts");
    assert_index_exists(&conn, "contacts_email_phone_uq");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("idlink.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "contacts");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn schema_rejects_inconsistent_link_rows() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO contacts (email, link_precedence) VALUES ('a@x.com', 'primary');",
        [],
    )
    .unwrap();

    let primary_with_link = conn.execute(
        "INSERT INTO contacts (email, linked_id, link_precedence)
         VALUES ('b@x.com', 1, 'primary');",
        [],
    );
    assert!(primary_with_link.is_err());

    let orphan_secondary = conn.execute(
        "INSERT INTO contacts (email, link_precedence) VALUES ('c@x.com', 'secondary');",
        [],
    );
    assert!(orphan_secondary.is_err());

    let no_channel = conn.execute("INSERT INTO contacts (link_precedence) VALUES ('primary');", []);
    assert!(no_channel.is_err());
}

#[test]
fn schema_treats_absent_phone_as_part_of_the_unique_pair() {
    let conn = open_db_in_memory().unwrap();
    conn.execute("INSERT INTO contacts (email) VALUES ('a@x.com');", [])
        .unwrap();

    let duplicate = conn.execute("INSERT INTO contacts (email) VALUES ('a@x.com');", []);
    assert!(duplicate.is_err());

    conn.execute(
        "INSERT INTO contacts (email, phone_number, linked_id, link_precedence)
         VALUES ('a@x.com', '555', 1, 'secondary');",
        [],
    )
    .unwrap();
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    assert_schema_object_exists(conn, "table", table_name);
}

fn assert_index_exists(conn: &Connection, index_name: &str) {
    assert_schema_object_exists(conn, "index", index_name);
}

fn assert_schema_object_exists(conn: &Connection, kind: &str, name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = ?1 AND name = ?2
            );",
            [kind, name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "{kind} {name} does not exist");
}
