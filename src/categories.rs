// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::errors::{Error, Result};
use crate::models::Category;
use rusqlite::{Connection, OptionalExtension, params};

/// Shared categories plus the user's own, ordered by name.
pub fn list(conn: &Connection, user_id: i64) -> Result<Vec<Category>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM categories WHERE user_id IS NULL OR user_id=?1 ORDER BY name",
        Category::COLUMNS
    ))?;
    let rows = stmt.query_map(params![user_id], Category::from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn get(conn: &Connection, user_id: i64, id: i64) -> Result<Category> {
    let cat = conn
        .query_row(
            &format!("SELECT {} FROM categories WHERE id=?1", Category::COLUMNS),
            params![id],
            Category::from_row,
        )
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("category {}", id)))?;
    match cat.user_id {
        Some(owner) if owner != user_id => Err(Error::NotFound(format!("category {}", id))),
        _ => Ok(cat),
    }
}

/// Resolves `"A:B"` style names case-insensitively; falls back to the last
/// segment when the full path is unknown.
pub fn find_by_name(conn: &Connection, user_id: i64, name: &str) -> Result<Option<Category>> {
    let name = name.trim();
    if name.is_empty() {
        return Ok(None);
    }
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM categories
         WHERE (user_id IS NULL OR user_id=?1) AND name=?2 COLLATE NOCASE
         ORDER BY user_id IS NULL, id LIMIT 1",
        Category::COLUMNS
    ))?;
    if let Some(cat) = stmt
        .query_row(params![user_id, name], Category::from_row)
        .optional()?
    {
        return Ok(Some(cat));
    }
    let leaf = name.rsplit(':').next().unwrap_or(name).trim();
    if leaf != name && !leaf.is_empty() {
        let mut by_leaf = conn.prepare(&format!(
            "SELECT {} FROM categories
             WHERE (user_id IS NULL OR user_id=?1)
               AND (name=?2 COLLATE NOCASE OR name LIKE ?3)
             ORDER BY user_id IS NULL, id LIMIT 1",
            Category::COLUMNS
        ))?;
        return Ok(by_leaf
            .query_row(
                params![user_id, leaf, format!("%:{}", leaf)],
                Category::from_row,
            )
            .optional()?);
    }
    Ok(None)
}

pub fn create(conn: &Connection, user_id: i64, name: &str, income: bool) -> Result<Category> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::invalid("Category name is required"));
    }
    conn.execute(
        "INSERT INTO categories(user_id, category_type_id, name) VALUES (?1, ?2, ?3)",
        params![user_id, if income { 2 } else { 1 }, name],
    )?;
    get(conn, user_id, conn.last_insert_rowid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::models::CATEGORY_INTEREST_INCOME;

    #[test]
    fn hierarchical_lookup_falls_back_to_leaf() {
        let conn = open_in_memory().unwrap();
        let full = find_by_name(&conn, 1, "food:groceries").unwrap().unwrap();
        assert_eq!(full.name, "Food:Groceries");
        let leaf = find_by_name(&conn, 1, "Household:Groceries").unwrap().unwrap();
        assert_eq!(leaf.id, full.id);
        let income = find_by_name(&conn, 1, "Interest Income").unwrap().unwrap();
        assert_eq!(income.id, CATEGORY_INTEREST_INCOME);
        assert!(find_by_name(&conn, 1, "Nope").unwrap().is_none());
    }

    #[test]
    fn private_categories_are_scoped() {
        let conn = open_in_memory().unwrap();
        conn.execute("INSERT INTO users(login) VALUES ('a'), ('b')", [])
            .unwrap();
        let cat = create(&conn, 1, "Hobbies", false).unwrap();
        assert!(get(&conn, 1, cat.id).is_ok());
        assert!(matches!(get(&conn, 2, cat.id), Err(Error::NotFound(_))));
    }
}
