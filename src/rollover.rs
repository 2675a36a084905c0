use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Class labels advance one step per academic year. Labels outside this
/// table (custom cohort names) are left untouched by promotion.
const CLASS_PROGRESSION: &[(&str, &str)] = &[
    ("Class 1", "Class 2"),
    ("Class 2", "Class 3"),
    ("Class 3", "Class 4"),
    ("Class 4", "Class 5"),
    ("Class 5", "Class 6"),
    ("Class 6", "Class 7"),
    ("Class 7", "Class 8"),
    ("Class 8", "Class 9"),
    ("Class 9", "Class 10"),
    ("Class 10", "Class 11"),
    ("Class 11", "Class 12"),
    ("Class 12", "Alumni"),
];

pub fn next_class_label(current: &str) -> Option<&'static str> {
    CLASS_PROGRESSION
        .iter()
        .find(|(from, _)| *from == current)
        .map(|(_, to)| *to)
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransitionOptions {
    pub promote_students: bool,
    pub reset_enrollments: bool,
    pub reset_fee_overrides: bool,
    pub copy_fee_structures: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionReport {
    pub previous_session_id: Option<String>,
    pub target_session_id: String,
    pub promoted_students: usize,
    pub enrollments_reset: usize,
    pub fee_structures_copied: usize,
}

/// Performs the yearly rollover as one all-or-nothing transaction: promote
/// active students along the class progression, optionally clearing fee
/// overrides, deactivate every enrollment, copy the old session's fee
/// structures under the target session, then swap the current-session flag.
/// Any failure rolls the whole thing back; exactly one session is current
/// after a successful return.
pub fn transition_to_new_session(
    conn: &Connection,
    target_session_id: &str,
    options: &TransitionOptions,
) -> anyhow::Result<TransitionReport> {
    let target: Option<String> = conn
        .query_row(
            "SELECT id FROM academic_sessions WHERE id = ?",
            [target_session_id],
            |r| r.get(0),
        )
        .optional()?;
    if target.is_none() {
        anyhow::bail!("target session not found: {}", target_session_id);
    }

    let tx = conn.unchecked_transaction()?;

    let current_session_id: Option<String> = tx
        .query_row(
            "SELECT id FROM academic_sessions WHERE is_current = 1",
            [],
            |r| r.get(0),
        )
        .optional()?;

    let mut promoted_students = 0usize;
    if options.promote_students {
        let mut stmt = tx.prepare("SELECT id, class_name FROM students WHERE active = 1")?;
        let rows = stmt
            .query_map([], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        for (student_id, class_name) in rows {
            let Some(next) = next_class_label(&class_name) else {
                continue;
            };
            if options.reset_fee_overrides {
                tx.execute(
                    "UPDATE students SET class_name = ?, base_fee_override = NULL WHERE id = ?",
                    (next, &student_id),
                )?;
            } else {
                tx.execute(
                    "UPDATE students SET class_name = ? WHERE id = ?",
                    (next, &student_id),
                )?;
            }
            promoted_students += 1;
        }
    } else if options.reset_fee_overrides {
        tx.execute(
            "UPDATE students SET base_fee_override = NULL WHERE active = 1",
            [],
        )?;
    }

    let mut enrollments_reset = 0usize;
    if options.reset_enrollments {
        enrollments_reset = tx.execute("UPDATE enrollments SET active = 0 WHERE active = 1", [])?;
    }

    let mut fee_structures_copied = 0usize;
    if options.copy_fee_structures {
        if let Some(old_session_id) = current_session_id.as_deref() {
            let mut stmt = tx.prepare(
                "SELECT class_name, monthly_fee, admission_fee
                 FROM fee_structures
                 WHERE session_id = ? AND active = 1",
            )?;
            let rows = stmt
                .query_map([old_session_id], |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, i64>(1)?,
                        r.get::<_, i64>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            for (class_name, monthly_fee, admission_fee) in rows {
                tx.execute(
                    "INSERT INTO fee_structures(id, session_id, class_name, monthly_fee, admission_fee, active)
                     VALUES(?, ?, ?, ?, ?, 1)",
                    (
                        Uuid::new_v4().to_string(),
                        target_session_id,
                        &class_name,
                        monthly_fee,
                        admission_fee,
                    ),
                )?;
                fee_structures_copied += 1;
            }
        }
    }

    // Flag swap last: clear every current marker, then set the target, so a
    // committed transaction always leaves exactly one current session.
    tx.execute("UPDATE academic_sessions SET is_current = 0 WHERE is_current = 1", [])?;
    tx.execute(
        "UPDATE academic_sessions SET is_current = 1 WHERE id = ?",
        [target_session_id],
    )?;

    tx.commit()?;

    Ok(TransitionReport {
        previous_session_id: current_session_id,
        target_session_id: target_session_id.to_string(),
        promoted_students,
        enrollments_reset,
        fee_structures_copied,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        db::init_schema(&conn).expect("schema");
        conn
    }

    fn seed_session(conn: &Connection, id: &str, name: &str, current: bool) {
        conn.execute(
            "INSERT INTO academic_sessions(id, name, start_date, end_date, is_current)
             VALUES(?, ?, '2026-04-01', '2027-03-31', ?)",
            (id, name, current as i64),
        )
        .expect("session");
    }

    fn seed_student(conn: &Connection, id: &str, class_name: &str, override_fee: Option<i64>) {
        conn.execute("INSERT OR IGNORE INTO families(id, name) VALUES('f1', 'Khan')", [])
            .expect("family");
        conn.execute(
            "INSERT INTO students(id, family_id, name, class_name, active, base_fee_override)
             VALUES(?, 'f1', 'Student', ?, 1, ?)",
            (id, class_name, override_fee),
        )
        .expect("student");
    }

    fn student_class(conn: &Connection, id: &str) -> String {
        conn.query_row("SELECT class_name FROM students WHERE id = ?", [id], |r| {
            r.get(0)
        })
        .expect("class")
    }

    fn current_sessions(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT id FROM academic_sessions WHERE is_current = 1")
            .expect("stmt");
        stmt.query_map([], |r| r.get::<_, String>(0))
            .expect("rows")
            .collect::<Result<Vec<_>, _>>()
            .expect("collect")
    }

    #[test]
    fn progression_table_covers_all_classes() {
        assert_eq!(next_class_label("Class 1"), Some("Class 2"));
        assert_eq!(next_class_label("Class 11"), Some("Class 12"));
        assert_eq!(next_class_label("Class 12"), Some("Alumni"));
        assert_eq!(next_class_label("Alumni"), None);
        assert_eq!(next_class_label("Playgroup"), None);
    }

    #[test]
    fn transition_swaps_current_flag_atomically() {
        let conn = test_conn();
        seed_session(&conn, "s-old", "2026-27", true);
        seed_session(&conn, "s-new", "2027-28", false);

        let report = transition_to_new_session(&conn, "s-new", &TransitionOptions::default())
            .expect("transition");
        assert_eq!(report.previous_session_id.as_deref(), Some("s-old"));
        assert_eq!(current_sessions(&conn), vec!["s-new".to_string()]);
    }

    #[test]
    fn promotion_advances_classes_and_clears_overrides() {
        let conn = test_conn();
        seed_session(&conn, "s-old", "2026-27", true);
        seed_session(&conn, "s-new", "2027-28", false);
        seed_student(&conn, "st1", "Class 1", Some(1200));
        seed_student(&conn, "st2", "Class 12", None);
        seed_student(&conn, "st3", "Playgroup", Some(900));

        let opts = TransitionOptions {
            promote_students: true,
            reset_fee_overrides: true,
            ..Default::default()
        };
        let report = transition_to_new_session(&conn, "s-new", &opts).expect("transition");

        assert_eq!(report.promoted_students, 2);
        assert_eq!(student_class(&conn, "st1"), "Class 2");
        assert_eq!(student_class(&conn, "st2"), "Alumni");
        assert_eq!(student_class(&conn, "st3"), "Playgroup");

        let override_st1: Option<i64> = conn
            .query_row(
                "SELECT base_fee_override FROM students WHERE id = 'st1'",
                [],
                |r| r.get(0),
            )
            .expect("override");
        assert_eq!(override_st1, None);
    }

    #[test]
    fn inactive_students_are_not_promoted() {
        let conn = test_conn();
        seed_session(&conn, "s-old", "2026-27", true);
        seed_session(&conn, "s-new", "2027-28", false);
        seed_student(&conn, "st1", "Class 3", None);
        conn.execute("UPDATE students SET active = 0 WHERE id = 'st1'", [])
            .expect("deactivate");

        let opts = TransitionOptions {
            promote_students: true,
            ..Default::default()
        };
        transition_to_new_session(&conn, "s-new", &opts).expect("transition");
        assert_eq!(student_class(&conn, "st1"), "Class 3");
    }

    #[test]
    fn reset_enrollments_deactivates_every_row() {
        let conn = test_conn();
        seed_session(&conn, "s-old", "2026-27", true);
        seed_session(&conn, "s-new", "2027-28", false);
        seed_student(&conn, "st1", "Class 1", None);
        conn.execute(
            "INSERT INTO batches(id, name, teacher_name, schedule, fee, active)
             VALUES('b1', 'Math A', 'Iqbal', 'MWF 16:00-17:00', 2000, 1)",
            [],
        )
        .expect("batch");
        conn.execute(
            "INSERT INTO enrollments(id, student_id, batch_id, active) VALUES('e1', 'st1', 'b1', 1)",
            [],
        )
        .expect("enrollment");

        let opts = TransitionOptions {
            reset_enrollments: true,
            ..Default::default()
        };
        let report = transition_to_new_session(&conn, "s-new", &opts).expect("transition");
        assert_eq!(report.enrollments_reset, 1);

        let active: i64 = conn
            .query_row("SELECT COUNT(*) FROM enrollments WHERE active = 1", [], |r| {
                r.get(0)
            })
            .expect("count");
        assert_eq!(active, 0);
    }

    #[test]
    fn fee_structures_copy_forward_under_target_session() {
        let conn = test_conn();
        seed_session(&conn, "s-old", "2026-27", true);
        seed_session(&conn, "s-new", "2027-28", false);
        conn.execute(
            "INSERT INTO fee_structures(id, session_id, class_name, monthly_fee, admission_fee, active)
             VALUES('fs1', 's-old', 'Class 1', 3100, 5000, 1),
                   ('fs2', 's-old', 'Class 2', 3300, 5000, 1),
                   ('fs3', 's-old', 'Class 3', 3500, 5000, 0)",
            [],
        )
        .expect("fee structures");

        let opts = TransitionOptions {
            copy_fee_structures: true,
            ..Default::default()
        };
        let report = transition_to_new_session(&conn, "s-new", &opts).expect("transition");
        assert_eq!(report.fee_structures_copied, 2);

        let copied: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM fee_structures WHERE session_id = 's-new' AND active = 1",
                [],
                |r| r.get(0),
            )
            .expect("count");
        assert_eq!(copied, 2);

        let fee: i64 = conn
            .query_row(
                "SELECT monthly_fee FROM fee_structures
                 WHERE session_id = 's-new' AND class_name = 'Class 2'",
                [],
                |r| r.get(0),
            )
            .expect("fee");
        assert_eq!(fee, 3300);
    }

    #[test]
    fn missing_target_session_changes_nothing() {
        let conn = test_conn();
        seed_session(&conn, "s-old", "2026-27", true);
        seed_student(&conn, "st1", "Class 1", Some(1200));

        let opts = TransitionOptions {
            promote_students: true,
            reset_enrollments: true,
            reset_fee_overrides: true,
            copy_fee_structures: true,
        };
        let err = transition_to_new_session(&conn, "missing", &opts).unwrap_err();
        assert!(err.to_string().contains("target session not found"));

        assert_eq!(student_class(&conn, "st1"), "Class 1");
        assert_eq!(current_sessions(&conn), vec!["s-old".to_string()]);
    }

    #[test]
    fn repeated_transition_keeps_single_current_session() {
        let conn = test_conn();
        seed_session(&conn, "s1", "2026-27", true);
        seed_session(&conn, "s2", "2027-28", false);
        seed_session(&conn, "s3", "2028-29", false);

        transition_to_new_session(&conn, "s2", &TransitionOptions::default()).expect("first");
        transition_to_new_session(&conn, "s3", &TransitionOptions::default()).expect("second");
        assert_eq!(current_sessions(&conn), vec!["s3".to_string()]);
    }
}
