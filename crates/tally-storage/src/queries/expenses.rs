// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Expense CRUD operations, scoped by owner.
//!
//! Ownership is checked inside the same `call` that mutates, so the check and
//! the write see one consistent row.

use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use tally_core::{
    ExpenseFilter, ExpenseRecord, ExpenseUpdate, NewExpense, RecordId, RecordPage, TallyError,
};

use crate::database::{format_timestamp, map_tr_err, parse_timestamp, Database};

const COLUMNS: &str =
    "id, owner_id, amount, category, note, comment, created_at, updated_at, deleted_at";

/// Result of looking up a live row on behalf of an owner.
enum Owned<T> {
    Found(T),
    Missing,
    Foreign,
}

impl<T> Owned<T> {
    fn into_result(self, id: RecordId) -> Result<T, TallyError> {
        match self {
            Owned::Found(value) => Ok(value),
            Owned::Missing => Err(TallyError::NotFound(format!("expense {id}"))),
            Owned::Foreign => Err(TallyError::Forbidden),
        }
    }
}

fn row_to_record(row: &Row<'_>) -> Result<ExpenseRecord, rusqlite::Error> {
    let created: String = row.get(6)?;
    let updated: String = row.get(7)?;
    let deleted: Option<String> = row.get(8)?;
    Ok(ExpenseRecord {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        amount: row.get(2)?,
        category: row.get(3)?,
        note: row.get(4)?,
        comment: row.get(5)?,
        created_at: parse_timestamp(6, &created)?,
        updated_at: parse_timestamp(7, &updated)?,
        deleted_at: deleted.map(|d| parse_timestamp(8, &d)).transpose()?,
    })
}

/// Load a live row and classify it against `owner_id`.
fn load_owned(
    conn: &rusqlite::Connection,
    owner_id: &str,
    id: RecordId,
) -> Result<Owned<ExpenseRecord>, rusqlite::Error> {
    let record = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM expenses WHERE id = ?1 AND deleted_at IS NULL"),
            params![id],
            row_to_record,
        )
        .optional()?;
    Ok(match record {
        None => Owned::Missing,
        Some(r) if r.owner_id != owner_id => Owned::Foreign,
        Some(r) => Owned::Found(r),
    })
}

/// Insert a new expense and return it with its assigned id.
pub async fn insert_expense(db: &Database, expense: NewExpense) -> Result<ExpenseRecord, TallyError> {
    db.connection()
        .call(move |conn| -> Result<ExpenseRecord, rusqlite::Error> {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO expenses (owner_id, amount, category, note, comment, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    expense.owner_id,
                    expense.amount,
                    expense.category,
                    expense.note,
                    expense.comment,
                    format_timestamp(&expense.created_at),
                    format_timestamp(&now),
                ],
            )?;
            let id = conn.last_insert_rowid();
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM expenses WHERE id = ?1"),
                params![id],
                row_to_record,
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch one live expense of `owner_id`.
pub async fn get_expense(
    db: &Database,
    owner_id: &str,
    id: RecordId,
) -> Result<ExpenseRecord, TallyError> {
    let owner_id = owner_id.to_string();
    db.connection()
        .call(move |conn| load_owned(conn, &owner_id, id))
        .await
        .map_err(map_tr_err)?
        .into_result(id)
}

/// Apply the present fields of `update` and refresh `updated_at`.
pub async fn update_expense(
    db: &Database,
    owner_id: &str,
    id: RecordId,
    update: ExpenseUpdate,
) -> Result<ExpenseRecord, TallyError> {
    let owner_id = owner_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Owned<ExpenseRecord>, rusqlite::Error> {
            let tx = conn.transaction()?;
            if let owned @ (Owned::Missing | Owned::Foreign) = load_owned(&tx, &owner_id, id)? {
                return Ok(owned);
            }
            tx.execute(
                "UPDATE expenses SET
                    category = COALESCE(?2, category),
                    amount = COALESCE(?3, amount),
                    note = COALESCE(?4, note),
                    created_at = COALESCE(?5, created_at),
                    updated_at = ?6
                 WHERE id = ?1",
                params![
                    id,
                    update.category,
                    update.amount,
                    update.note,
                    update.created_at.as_ref().map(format_timestamp),
                    format_timestamp(&Utc::now()),
                ],
            )?;
            let updated = load_owned(&tx, &owner_id, id)?;
            tx.commit()?;
            Ok(updated)
        })
        .await
        .map_err(map_tr_err)?
        .into_result(id)
}

/// Mark an expense deleted. Deleting an already deleted row is `NotFound`.
pub async fn soft_delete_expense(
    db: &Database,
    owner_id: &str,
    id: RecordId,
) -> Result<(), TallyError> {
    let owner_id = owner_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Owned<()>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let outcome = match load_owned(&tx, &owner_id, id)? {
                Owned::Found(_) => {
                    let now = format_timestamp(&Utc::now());
                    tx.execute(
                        "UPDATE expenses SET deleted_at = ?2, updated_at = ?2 WHERE id = ?1",
                        params![id, now],
                    )?;
                    Owned::Found(())
                }
                Owned::Missing => Owned::Missing,
                Owned::Foreign => Owned::Foreign,
            };
            tx.commit()?;
            Ok(outcome)
        })
        .await
        .map_err(map_tr_err)?
        .into_result(id)
}

/// List live expenses matching `filter`, newest first.
pub async fn list_expenses(db: &Database, filter: ExpenseFilter) -> Result<RecordPage, TallyError> {
    let page = filter.effective_page();
    let page_size = filter.effective_page_size();
    let offset = filter.offset();

    let mut clauses = vec!["owner_id = ?", "deleted_at IS NULL"];
    let mut args = vec![Value::Text(filter.owner_id)];
    if let Some(category) = filter.category {
        clauses.push("category = ?");
        args.push(Value::Text(category));
    }
    if let Some(start) = filter.start {
        clauses.push("created_at >= ?");
        args.push(Value::Text(format_timestamp(&start)));
    }
    if let Some(end) = filter.end {
        clauses.push("created_at < ?");
        args.push(Value::Text(format_timestamp(&end)));
    }
    let where_sql = clauses.join(" AND ");

    let (total, items) = db
        .connection()
        .call(move |conn| -> Result<(u64, Vec<ExpenseRecord>), rusqlite::Error> {
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM expenses WHERE {where_sql}"),
                params_from_iter(args.iter()),
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM expenses WHERE {where_sql}
                 ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
            ))?;
            let paged = args
                .iter()
                .cloned()
                .chain([Value::Integer(i64::from(page_size)), Value::Integer(offset as i64)]);
            let items = stmt
                .query_map(params_from_iter(paged), row_to_record)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok((total.max(0) as u64, items))
        })
        .await
        .map_err(map_tr_err)?;

    Ok(RecordPage {
        items,
        total,
        page,
        page_size,
    })
}
