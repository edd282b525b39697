use sqlx::{FromRow, SqlitePool};

use crate::error::AppResult;

use super::UserId;

#[derive(Debug, PartialEq, FromRow)]
pub struct ShoppingListLine {
    pub name: String,
    pub measurement_unit: String,
    pub total: i64,
}

/// Sums every ingredient of every recipe in the user's cart, grouped by
/// (name, unit), largest total first.
pub async fn shopping_list(pool: &SqlitePool, user_id: UserId) -> AppResult<Vec<ShoppingListLine>> {
    let lines = sqlx::query_as::<_, ShoppingListLine>(
        "SELECT ingredients.name,
                ingredients.measurement_unit,
                SUM(recipe_ingredients.amount) AS total
         FROM recipe_ingredients
         INNER JOIN ingredients ON ingredients.id = recipe_ingredients.ingredient_id
         INNER JOIN shopping_cart ON shopping_cart.recipe_id = recipe_ingredients.recipe_id
         WHERE shopping_cart.user_id = ?
         GROUP BY ingredients.name, ingredients.measurement_unit
         ORDER BY total DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(lines)
}

/// One `"<name> - <total> <unit>"` line per group, then `footer`.
pub fn render_shopping_list(lines: &[ShoppingListLine], footer: &str) -> String {
    let mut catalog = lines
        .iter()
        .map(|line| format!("{} - {} {}", line.name, line.total, line.measurement_unit))
        .collect::<Vec<_>>()
        .join("\n");
    catalog.push_str(footer);
    catalog
}
