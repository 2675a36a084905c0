use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("campus.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Creates all tables idempotently. Split from `open_db` so tests can run
/// against an in-memory connection.
pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS academic_sessions(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            is_current INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS families(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            phone TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            family_id TEXT NOT NULL,
            name TEXT NOT NULL,
            class_name TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            base_fee_override INTEGER,
            FOREIGN KEY(family_id) REFERENCES families(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_family ON students(family_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS batches(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            teacher_name TEXT NOT NULL,
            schedule TEXT NOT NULL,
            fee INTEGER NOT NULL DEFAULT 0,
            active INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_batches_teacher ON batches(teacher_name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            batch_id TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(batch_id) REFERENCES batches(id),
            UNIQUE(student_id, batch_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_student ON enrollments(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_batch ON enrollments(batch_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS fee_structures(
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            class_name TEXT NOT NULL,
            monthly_fee INTEGER NOT NULL,
            admission_fee INTEGER NOT NULL DEFAULT 0,
            active INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(session_id) REFERENCES academic_sessions(id),
            UNIQUE(session_id, class_name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_fee_structures_session ON fee_structures(session_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS ledger_transactions(
            id TEXT PRIMARY KEY,
            family_id TEXT NOT NULL,
            amount INTEGER NOT NULL,
            type TEXT NOT NULL,
            category TEXT NOT NULL,
            note TEXT,
            receipt_number TEXT NOT NULL UNIQUE,
            void INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            FOREIGN KEY(family_id) REFERENCES families(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_ledger_family ON ledger_transactions(family_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS audit_log(
            id TEXT PRIMARY KEY,
            action TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_log(entity_type, entity_id)",
        [],
    )?;

    // Workspaces created before ledger notes existed lack the column.
    ensure_ledger_note(conn)?;

    Ok(())
}

fn ensure_ledger_note(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "ledger_transactions", "note")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE ledger_transactions ADD COLUMN note TEXT", [])?;
    Ok(())
}

/// Receipt numbers look like `R-20260830-0007`: a per-day sequence.
pub fn next_receipt_number(conn: &Connection, today: chrono::NaiveDate) -> anyhow::Result<String> {
    let prefix = format!("R-{}-", today.format("%Y%m%d"));
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM ledger_transactions WHERE receipt_number LIKE ?",
        [format!("{}%", prefix)],
        |r| r.get(0),
    )?;
    Ok(format!("{}{:04}", prefix, count + 1))
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
