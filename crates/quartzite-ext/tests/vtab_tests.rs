//! End-to-end virtual-table tests: modules driven through real SQL.

use quartzite_core::{Connection, Value};
use quartzite_ext::{
   ArrayTable, ConstraintOp, Generator, IndexInfo, ModuleExt, SchemaColumn, VtabModule,
};

fn array_conn() -> (Connection, ArrayTable) {
   let conn = Connection::open_memory().unwrap();
   let table = ArrayTable::new(vec![
      SchemaColumn::new("id", "INTEGER"),
      SchemaColumn::new("name", "TEXT"),
   ]);
   conn.create_module("array_mod", table.clone()).unwrap();
   conn
      .exec_raw("CREATE VIRTUAL TABLE items USING array_mod")
      .unwrap();
   (conn, table)
}

#[test]
fn test_array_table_mixed_host_and_sql_inserts() {
   let (conn, table) = array_conn();

   table.insert(vec![Value::Integer(1), Value::Text("Alice".into())]);
   conn
      .exec_raw("INSERT INTO items (id, name) VALUES (2, 'Bob')")
      .unwrap();

   let count: i64 = conn
      .query_one("SELECT count(*) FROM items")
      .unwrap()
      .unwrap()
      .get_as(0)
      .unwrap();
   assert_eq!(count, 2);

   let rows = conn.query("SELECT id, name FROM items ORDER BY id").unwrap();
   assert_eq!(rows[0].get(1), Some(&Value::Text("Alice".into())));
   assert_eq!(rows[1].get(1), Some(&Value::Text("Bob".into())));
}

#[test]
fn test_array_table_insert_reports_rowid_and_select_finds_it() {
   let (conn, _table) = array_conn();

   conn
      .exec_raw("INSERT INTO items (id, name) VALUES (7, 'Greta')")
      .unwrap();
   let rowid = conn.last_insert_rowid();
   assert_eq!(rowid, 1, "first array rowid is 1");

   let row = conn
      .query_with("SELECT name FROM items WHERE rowid = ?1", &[rowid.into()])
      .unwrap()
      .pop()
      .expect("row addressable by the reported rowid");
   assert_eq!(row.get(0), Some(&Value::Text("Greta".into())));
}

#[test]
fn test_array_table_sql_update_and_delete() {
   let (conn, table) = array_conn();
   table.insert(vec![Value::Integer(1), Value::Text("a".into())]);
   table.insert(vec![Value::Integer(2), Value::Text("b".into())]);

   conn
      .exec_raw("UPDATE items SET name = 'renamed' WHERE id = 1")
      .unwrap();
   let rows = table.rows();
   assert_eq!(rows[0].values[1], Value::Text("renamed".into()));

   conn.exec_raw("DELETE FROM items WHERE id = 2").unwrap();
   assert_eq!(table.len(), 1);

   let count: i64 = conn
      .query_one("SELECT count(*) FROM items")
      .unwrap()
      .unwrap()
      .get_as(0)
      .unwrap();
   assert_eq!(count, 1);
}

#[test]
fn test_array_table_host_delete_visible_from_sql() {
   let (conn, table) = array_conn();
   let rowid = table.insert(vec![Value::Integer(1), Value::Text("a".into())]);
   table.insert(vec![Value::Integer(2), Value::Text("b".into())]);

   assert!(table.delete_row(rowid));
   let count: i64 = conn
      .query_one("SELECT count(*) FROM items")
      .unwrap()
      .unwrap()
      .get_as(0)
      .unwrap();
   assert_eq!(count, 1);
}

#[test]
fn test_array_table_where_clause_filters() {
   let (conn, table) = array_conn();
   for i in 1..=5 {
      table.insert(vec![Value::Integer(i), Value::Text(format!("row{i}"))]);
   }

   let rows = conn
      .query("SELECT name FROM items WHERE id > 3 ORDER BY id")
      .unwrap();
   assert_eq!(rows.len(), 2);
   assert_eq!(rows[0].get(0), Some(&Value::Text("row4".into())));
}

#[test]
fn test_generator_series_through_sql() {
   let conn = Connection::open_memory().unwrap();
   let series = Generator::new(
      vec![
         SchemaColumn::new("n", "INTEGER"),
         SchemaColumn::new("square", "INTEGER"),
      ],
      || 1i64,
      |n| *n <= 5,
      |n| vec![Value::Integer(*n), Value::Integer(n * n)],
      |n| *n += 1,
   );
   conn.create_module("squares_mod", series).unwrap();
   conn
      .exec_raw("CREATE VIRTUAL TABLE squares USING squares_mod")
      .unwrap();

   let rows = conn.query("SELECT n, square FROM squares ORDER BY n").unwrap();
   assert_eq!(rows.len(), 5);
   assert_eq!(rows[4].get(1), Some(&Value::Integer(25)));

   let sum: i64 = conn
      .query_one("SELECT sum(square) FROM squares")
      .unwrap()
      .unwrap()
      .get_as(0)
      .unwrap();
   assert_eq!(sum, 55);
}

#[test]
fn test_generator_custom_rowid() {
   let conn = Connection::open_memory().unwrap();
   let series = Generator::new(
      vec![SchemaColumn::new("n", "INTEGER")],
      || 10i64,
      |n| *n <= 12,
      |n| vec![Value::Integer(*n)],
      |n| *n += 1,
   )
   .with_rowid(|n| *n);
   conn.create_module("seq_mod", series).unwrap();
   conn.exec_raw("CREATE VIRTUAL TABLE seq USING seq_mod").unwrap();

   let rows = conn.query("SELECT rowid, n FROM seq").unwrap();
   assert_eq!(rows[0].get(0), Some(&Value::Integer(10)));
   assert_eq!(rows[2].get(0), Some(&Value::Integer(12)));
}

#[test]
fn test_generator_rejects_writes_with_read_only() {
   let conn = Connection::open_memory().unwrap();
   let series = Generator::new(
      vec![SchemaColumn::new("n", "INTEGER")],
      || 1i64,
      |n| *n <= 1,
      |n| vec![Value::Integer(*n)],
      |n| *n += 1,
   );
   conn.create_module("ro_mod", series).unwrap();
   conn.exec_raw("CREATE VIRTUAL TABLE ro USING ro_mod").unwrap();

   let err = conn.exec_raw("INSERT INTO ro (n) VALUES (9)").unwrap_err();
   match err {
      quartzite_core::Error::Sqlite { message, .. } => {
         assert!(
            message.contains("read-only"),
            "expected read-only failure, got: {message}"
         );
      }
      other => panic!("expected engine error, got {other:?}"),
   }
}

/// A module that records what the planner offered it and consumes an
/// equality constraint on its first column.
struct PlannedTable;

struct PlannedCursor {
   rows: Vec<i64>,
   pos: usize,
}

impl VtabModule for PlannedTable {
   type Cursor = PlannedCursor;

   fn schema(&self) -> Vec<SchemaColumn> {
      vec![SchemaColumn::new("v", "INTEGER")]
   }

   fn best_index(&self, info: &mut IndexInfo) -> quartzite_core::Result<()> {
      for (i, constraint) in info.constraints.iter().enumerate() {
         if constraint.usable && constraint.column == 0 && constraint.op == ConstraintOp::Eq {
            info.constraint_usage[i].argv_index = 1;
            info.constraint_usage[i].omit = true;
            info.idx_num = 1;
            info.estimated_cost = 1.0;
            info.estimated_rows = 1;
            return Ok(());
         }
      }
      Ok(())
   }

   fn open(
      &self,
      idx_num: i32,
      _idx_str: Option<&str>,
      args: &[Value],
   ) -> quartzite_core::Result<PlannedCursor> {
      // idx_num 1 means the equality value arrives as the first filter arg.
      let rows = if idx_num == 1 {
         let wanted = args[0].as_integer().unwrap_or(i64::MIN);
         (1..=100).filter(|v| *v == wanted).collect()
      } else {
         (1..=100).collect()
      };
      Ok(PlannedCursor { rows, pos: 0 })
   }

   fn next(&self, cursor: &mut PlannedCursor) -> quartzite_core::Result<()> {
      cursor.pos += 1;
      Ok(())
   }

   fn eof(&self, cursor: &PlannedCursor) -> bool {
      cursor.pos >= cursor.rows.len()
   }

   fn column(&self, cursor: &PlannedCursor, _idx: usize) -> quartzite_core::Result<Value> {
      Ok(Value::Integer(cursor.rows[cursor.pos]))
   }

   fn rowid(&self, cursor: &PlannedCursor) -> quartzite_core::Result<i64> {
      Ok(cursor.rows[cursor.pos])
   }
}

#[test]
fn test_best_index_consumes_equality_constraint() {
   let conn = Connection::open_memory().unwrap();
   conn.create_module("planned_mod", PlannedTable).unwrap();
   conn
      .exec_raw("CREATE VIRTUAL TABLE planned USING planned_mod")
      .unwrap();

   // The equality constraint reaches open() as a filter argument.
   let rows = conn.query("SELECT v FROM planned WHERE v = 42").unwrap();
   assert_eq!(rows.len(), 1);
   assert_eq!(rows[0].get(0), Some(&Value::Integer(42)));

   // Full scans still work through the default plan.
   let all = conn.query("SELECT v FROM planned").unwrap();
   assert_eq!(all.len(), 100);
}

#[test]
fn test_two_virtual_tables_join() {
   let conn = Connection::open_memory().unwrap();
   let left = ArrayTable::new(vec![SchemaColumn::new("id", "INTEGER")]);
   let right = ArrayTable::new(vec![
      SchemaColumn::new("id", "INTEGER"),
      SchemaColumn::new("label", "TEXT"),
   ]);
   left.insert(vec![Value::Integer(1)]);
   left.insert(vec![Value::Integer(2)]);
   right.insert(vec![Value::Integer(2), Value::Text("two".into())]);

   conn.create_module("left_mod", left).unwrap();
   conn.create_module("right_mod", right).unwrap();
   conn.exec_raw("CREATE VIRTUAL TABLE l USING left_mod").unwrap();
   conn.exec_raw("CREATE VIRTUAL TABLE r USING right_mod").unwrap();

   let rows = conn
      .query("SELECT r.label FROM l JOIN r ON l.id = r.id")
      .unwrap();
   assert_eq!(rows.len(), 1);
   assert_eq!(rows[0].get(0), Some(&Value::Text("two".into())));
}
