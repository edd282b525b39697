mod auth;
pub use auth::*;
mod user;
pub use user::*;
mod tag;
pub use tag::*;
mod ingredient;
pub use ingredient::*;
mod marker;
pub use marker::*;
mod recipe;
pub use recipe::*;
mod subscription;
pub use subscription::*;
mod shopping;
pub use shopping::*;

use std::path::Path;

use sqlx::{Executor, QueryBuilder, Sqlite, SqlitePool};

use crate::error::AppResult;

pub async fn prepare_db(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    pool.execute(include_str!("sql/schema.sql")).await?;
    Ok(())
}

/// Loads `[{"name": .., "measurement_unit": ..}]` into the ingredient table,
/// skipping pairs that already exist. Returns the number of new rows.
pub async fn import_ingredients(pool: &SqlitePool, path: &Path) -> anyhow::Result<u64> {
    let raw = tokio::fs::read_to_string(path).await?;
    let ingredients: Vec<NewIngredient> = serde_json::from_str(&raw)?;

    let mut tx = pool.begin().await?;
    let mut inserted = 0;
    for ingredient in &ingredients {
        inserted += sqlx::query(
            "INSERT OR IGNORE INTO ingredients (name, measurement_unit) VALUES (?, ?)",
        )
        .bind(&ingredient.name)
        .bind(&ingredient.measurement_unit)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    }
    tx.commit().await?;

    tracing::info!(
        "imported {inserted} of {} ingredients from {}",
        ingredients.len(),
        path.display()
    );
    Ok(inserted)
}

/// Appends `(?, ?, ...)` with one bind per id.
pub(crate) fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    qb.push("(");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
}

/// Counts how many of the distinct `ids` exist in `table`.
pub(crate) async fn count_existing(
    pool: &SqlitePool,
    table: &'static str,
    ids: &[i64],
) -> AppResult<i64> {
    if ids.is_empty() {
        return Ok(0);
    }

    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) FROM {table} WHERE id IN "));
    push_id_list(&mut qb, ids);

    Ok(qb.build_query_scalar::<i64>().fetch_one(pool).await?)
}
