use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::error::{on_conflict, AppResult};

use super::{RecipeId, UserId};

/// A `(user, recipe)` table whose rows only record that a pair exists.
pub trait Marker: Send + Sync + 'static {
    const TABLE: &'static str;
    /// Message for a second insert of the same pair.
    const DUPLICATE: &'static str;
}

pub struct Favorite;

impl Marker for Favorite {
    const TABLE: &'static str = "favorites";
    const DUPLICATE: &'static str = "recipe is already in favorites";
}

pub struct ShoppingCartItem;

impl Marker for ShoppingCartItem {
    const TABLE: &'static str = "shopping_cart";
    const DUPLICATE: &'static str = "recipe is already in the shopping cart";
}

/// Inserts the marker row. A pair that already exists is a validation error.
pub async fn add_marker<M: Marker>(
    pool: &SqlitePool,
    user_id: UserId,
    recipe_id: RecipeId,
) -> AppResult<()> {
    sqlx::query(&format!(
        "INSERT INTO {} (user_id, recipe_id) VALUES (?, ?)",
        M::TABLE
    ))
    .bind(user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(|err| on_conflict(err, M::DUPLICATE))?;

    tracing::debug!(table = M::TABLE, user_id, recipe_id, "marker added");
    Ok(())
}

/// Deletes the marker row if present; an absent row is not an error.
pub async fn remove_marker<M: Marker>(
    pool: &SqlitePool,
    user_id: UserId,
    recipe_id: RecipeId,
) -> AppResult<()> {
    sqlx::query(&format!(
        "DELETE FROM {} WHERE user_id = ? AND recipe_id = ?",
        M::TABLE
    ))
    .bind(user_id)
    .bind(recipe_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Pushes a boolean expression that is true when `viewer` has marked the
/// `recipes` row of the enclosing query. Anonymous viewers get a constant.
pub(crate) fn push_marker_exists<M: Marker>(
    qb: &mut QueryBuilder<'_, Sqlite>,
    viewer: Option<UserId>,
) {
    match viewer {
        Some(user_id) => {
            qb.push(format!(
                "EXISTS (SELECT 1 FROM {table} WHERE {table}.recipe_id = recipes.id AND {table}.user_id = ",
                table = M::TABLE
            ));
            qb.push_bind(user_id);
            qb.push(")");
        }
        None => {
            qb.push("FALSE");
        }
    }
}
