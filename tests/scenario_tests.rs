//! End-to-end scenarios exercising the whole bridge surface together.

use std::sync::{Arc, Mutex};

use quartzite::prelude::*;
use quartzite::{Backup, HookAction};

#[test]
fn test_insert_and_query() {
   let conn = Connection::open_memory().unwrap();
   conn
      .exec_raw("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")
      .unwrap();

   conn
      .execute("INSERT INTO users (name) VALUES (?1)", &["Alice".into()])
      .unwrap();
   conn
      .execute("INSERT INTO users (name) VALUES (?1)", &["Bob".into()])
      .unwrap();

   let rows = conn.query("SELECT * FROM users ORDER BY id").unwrap();
   assert_eq!(rows.len(), 2);
   assert_eq!(rows[0].get_by_name_as::<String>("name").unwrap(), "Alice");
   assert_eq!(rows[1].get_by_name_as::<String>("name").unwrap(), "Bob");

   assert_eq!(conn.last_insert_rowid(), 2);
   assert_eq!(conn.changes(), 1, "changes reflects the last statement");
}

#[test]
fn test_transaction_rollback_leaves_no_rows() {
   let conn = Connection::open_memory().unwrap();
   conn.exec_raw("CREATE TABLE t (v INTEGER)").unwrap();

   let result: Result<()> = conn.transaction(|c| {
      c.exec_raw("INSERT INTO t VALUES (1)")?;
      Err(Error::ReadOnly)
   });
   assert!(result.is_err());

   let count: i64 = conn
      .query_one("SELECT count(*) FROM t")
      .unwrap()
      .unwrap()
      .get_as(0)
      .unwrap();
   assert_eq!(count, 0);
}

#[test]
fn test_savepoint_partial_rollback_inside_committed_transaction() {
   let conn = Connection::open_memory().unwrap();
   conn.exec_raw("CREATE TABLE t (v INTEGER)").unwrap();

   conn
      .transaction(|c| {
         c.exec_raw("INSERT INTO t VALUES (1)")?;
         let inner: Result<()> = c.with_savepoint("sp1", |c| {
            c.exec_raw("INSERT INTO t VALUES (2)")?;
            Err(Error::ReadOnly)
         });
         assert!(inner.is_err());
         Ok(())
      })
      .unwrap();

   let rows = conn.query("SELECT v FROM t").unwrap();
   assert_eq!(rows.len(), 1);
   assert_eq!(rows[0].get_as::<i64>(0).unwrap(), 1);
}

#[test]
fn test_aggregate_product_including_empty_table() {
   let conn = Connection::open_memory().unwrap();
   conn.exec_raw("CREATE TABLE nums (v INTEGER)").unwrap();
   conn
      .create_aggregate_function(
         "product",
         1,
         || Value::Integer(1),
         |acc, args| {
            Ok(Value::Integer(
               acc.as_integer().unwrap_or(1) * args[0].as_integer().unwrap_or(1),
            ))
         },
         Ok,
      )
      .unwrap();

   // Empty table: final runs on an unset accumulator and yields NULL.
   let row = conn.query_one("SELECT product(v) FROM nums").unwrap().unwrap();
   assert_eq!(row.get(0), Some(&Value::Null));

   conn.exec_raw("INSERT INTO nums VALUES (2), (3), (4)").unwrap();
   let row = conn.query_one("SELECT product(v) FROM nums").unwrap().unwrap();
   assert_eq!(row.get(0), Some(&Value::Integer(24)));
}

#[test]
fn test_update_hook_sees_insert_update_delete_in_order() {
   let conn = Connection::open_memory().unwrap();
   conn
      .exec_raw("CREATE TABLE tracked (id INTEGER PRIMARY KEY, v TEXT)")
      .unwrap();

   let log: Arc<Mutex<Vec<(HookAction, String, i64)>>> = Arc::new(Mutex::new(Vec::new()));
   let sink = Arc::clone(&log);
   conn
      .set_update_hook(move |action, table, rowid| {
         sink.lock().unwrap().push((action, table.to_string(), rowid));
      })
      .unwrap();

   conn.exec_raw("INSERT INTO tracked (v) VALUES ('a')").unwrap();
   conn.exec_raw("UPDATE tracked SET v = 'b' WHERE id = 1").unwrap();
   conn.exec_raw("DELETE FROM tracked WHERE id = 1").unwrap();

   assert_eq!(
      *log.lock().unwrap(),
      vec![
         (HookAction::Insert, "tracked".to_string(), 1),
         (HookAction::Update, "tracked".to_string(), 1),
         (HookAction::Delete, "tracked".to_string(), 1),
      ]
   );
}

#[test]
fn test_blob_streaming() {
   let conn = Connection::open_memory().unwrap();
   conn
      .exec_raw("CREATE TABLE blobs (id INTEGER PRIMARY KEY, data BLOB)")
      .unwrap();
   conn
      .exec_raw("INSERT INTO blobs (data) VALUES (zeroblob(10240))")
      .unwrap();

   let mut blob = conn
      .open_blob("blobs", "data", 1, BlobMode::ReadWrite)
      .unwrap();
   assert_eq!(blob.bytes().unwrap(), 10240);
   blob.write(0, &[0xA0, 0xA0, 0xA0, 0xA0]).unwrap();
   blob.write(5120, &[0xA5, 0xA5, 0xA5, 0xA5]).unwrap();
   blob.close().unwrap();

   let mut blob = conn
      .open_blob("blobs", "data", 1, BlobMode::ReadOnly)
      .unwrap();
   assert_eq!(blob.read(0, 4).unwrap(), vec![0xA0; 4]);
   assert_eq!(blob.read(5120, 4).unwrap(), vec![0xA5; 4]);
   blob.close().unwrap();
   // Close stays idempotent through the public API.
   blob.close().unwrap();
}

#[test]
fn test_array_vtable_count_and_delete() {
   let conn = Connection::open_memory().unwrap();
   let table = ArrayTable::new(vec![
      SchemaColumn::new("id", "INTEGER"),
      SchemaColumn::new("name", "TEXT"),
   ]);
   conn.create_module("people_mod", table.clone()).unwrap();
   conn
      .exec_raw("CREATE VIRTUAL TABLE people USING people_mod")
      .unwrap();

   let first_rowid = table.insert(vec![Value::Integer(1), Value::Text("Alice".into())]);
   conn
      .exec_raw("INSERT INTO people (id, name) VALUES (2, 'Bob')")
      .unwrap();

   let count: i64 = conn
      .query_one("SELECT count(*) FROM people")
      .unwrap()
      .unwrap()
      .get_as(0)
      .unwrap();
   assert_eq!(count, 2);

   conn
      .execute(
         "DELETE FROM people WHERE rowid = ?1",
         &[first_rowid.into()],
      )
      .unwrap();
   let count: i64 = conn
      .query_one("SELECT count(*) FROM people")
      .unwrap()
      .unwrap()
      .get_as(0)
      .unwrap();
   assert_eq!(count, 1);
}

#[test]
fn test_backup_progress_in_chunks() {
   let src = Connection::open_memory().unwrap();
   src
      .exec_raw("CREATE TABLE payloads (id INTEGER PRIMARY KEY, data BLOB)")
      .unwrap();
   src
      .transaction(|c| {
         for _ in 0..100 {
            c.exec_raw("INSERT INTO payloads (data) VALUES (randomblob(1024))")?;
         }
         Ok(())
      })
      .unwrap();

   let dest = Connection::open_memory().unwrap();
   let mut backup = Backup::init(&dest, &src).unwrap();
   while backup.step(5).unwrap() {
      assert!(backup.remaining() >= 0);
   }
   backup.finish().unwrap();

   let count: i64 = dest
      .query_one("SELECT count(*) FROM payloads")
      .unwrap()
      .unwrap()
      .get_as(0)
      .unwrap();
   assert_eq!(count, 100);
}
