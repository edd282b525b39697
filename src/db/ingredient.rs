use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};

use crate::error::{AppError, AppResult, DBError};

use super::{push_id_list, RecipeId};

pub type IngredientId = i64;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Ingredient {
    pub id: IngredientId,
    pub name: String,
    pub measurement_unit: String,
}

#[derive(Debug, Deserialize)]
pub struct NewIngredient {
    pub name: String,
    pub measurement_unit: String,
}

/// An ingredient line of a recipe, as rendered in the read representation.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RecipeIngredient {
    #[serde(skip)]
    pub recipe_id: RecipeId,
    pub id: IngredientId,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i64,
}

/// Ingredients whose name starts with `prefix`, ordered by name.
///
/// Matching goes through SQLite `LIKE`, so case folding only applies to ASCII.
pub async fn list_ingredients(pool: &SqlitePool, prefix: Option<&str>) -> AppResult<Vec<Ingredient>> {
    let mut qb =
        QueryBuilder::<Sqlite>::new("SELECT id, name, measurement_unit FROM ingredients");

    if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
        qb.push(r" WHERE name LIKE ");
        qb.push_bind(format!("{}%", escape_like(prefix)));
        qb.push(r" ESCAPE '\'");
    }
    qb.push(" ORDER BY name, id");

    let ingredients = qb.build_query_as::<Ingredient>().fetch_all(pool).await?;
    Ok(ingredients)
}

pub async fn get_ingredient(pool: &SqlitePool, ingredient_id: IngredientId) -> AppResult<Ingredient> {
    sqlx::query_as::<_, Ingredient>(
        "SELECT id, name, measurement_unit FROM ingredients WHERE id = ?",
    )
    .bind(ingredient_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::DBError(DBError::NotFound))
}

pub(crate) async fn ingredients_for_recipes(
    pool: &SqlitePool,
    recipe_ids: &[RecipeId],
) -> AppResult<HashMap<RecipeId, Vec<RecipeIngredient>>> {
    let mut by_recipe: HashMap<RecipeId, Vec<RecipeIngredient>> = HashMap::new();
    if recipe_ids.is_empty() {
        return Ok(by_recipe);
    }

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT recipe_ingredients.recipe_id,
                ingredients.id,
                ingredients.name,
                ingredients.measurement_unit,
                recipe_ingredients.amount
         FROM recipe_ingredients
         INNER JOIN ingredients ON ingredients.id = recipe_ingredients.ingredient_id
         WHERE recipe_ingredients.recipe_id IN ",
    );
    push_id_list(&mut qb, recipe_ids);
    qb.push(" ORDER BY recipe_ingredients.id");

    for row in qb
        .build_query_as::<RecipeIngredient>()
        .fetch_all(pool)
        .await?
    {
        by_recipe.entry(row.recipe_id).or_default().push(row);
    }
    Ok(by_recipe)
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
