use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use crate::{
    error::{AppError, AppResult, DBError},
    pagination::Pager,
};

use super::{
    count_existing, ingredients_for_recipes, profiles_by_ids, push_id_list, push_marker_exists,
    tags_for_recipes, Favorite, IngredientId, RecipeIngredient, ShoppingCartItem, Tag, TagId,
    UserId, UserProfile,
};

pub type RecipeId = i64;

/// Full read representation of a recipe for one viewer.
#[derive(Debug, Serialize)]
pub struct Recipe {
    pub id: RecipeId,
    pub tags: Vec<Tag>,
    pub author: UserProfile,
    pub ingredients: Vec<RecipeIngredient>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RecipeSummary {
    pub id: RecipeId,
    #[serde(skip)]
    pub author_id: UserId,
    pub name: String,
    pub image: String,
    pub cooking_time: i64,
}

#[derive(Debug, FromRow)]
struct RecipeRow {
    id: RecipeId,
    author_id: UserId,
    name: String,
    text: String,
    image: String,
    cooking_time: i64,
    is_favorited: bool,
    is_in_shopping_cart: bool,
}

/// Listing filters. Kinds combine with AND, slugs within `tags` with OR.
#[derive(Debug, Default, Clone)]
pub struct RecipeFilter {
    pub tags: Vec<String>,
    pub author: Option<UserId>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IngredientAmount {
    pub ingredient_id: IngredientId,
    pub amount: i64,
}

#[derive(Debug)]
pub struct NewRecipe {
    pub name: String,
    pub text: String,
    pub image: String,
    pub cooking_time: i64,
    pub tags: Vec<TagId>,
    pub ingredients: Vec<IngredientAmount>,
}

/// Partial update. `tags` and `ingredients` replace the stored sets
/// wholesale when present and non-empty.
#[derive(Debug, Default)]
pub struct RecipeChanges {
    pub name: Option<String>,
    pub text: Option<String>,
    pub image: Option<String>,
    pub cooking_time: Option<i64>,
    pub tags: Option<Vec<TagId>>,
    pub ingredients: Option<Vec<IngredientAmount>>,
}

/// `SELECT` over `recipes` with both per-viewer flags computed set-wise.
/// Every recipe read goes through here so listing and detail cannot drift.
fn annotated_recipes(viewer: Option<UserId>) -> QueryBuilder<'static, Sqlite> {
    let mut qb = QueryBuilder::new(
        "SELECT recipes.id, recipes.author_id, recipes.name, recipes.text,
                recipes.image, recipes.cooking_time, ",
    );
    push_marker_exists::<Favorite>(&mut qb, viewer);
    qb.push(" AS is_favorited, ");
    push_marker_exists::<ShoppingCartItem>(&mut qb, viewer);
    qb.push(" AS is_in_shopping_cart FROM recipes WHERE 1 = 1");
    qb
}

fn push_filter(qb: &mut QueryBuilder<'static, Sqlite>, viewer: Option<UserId>, filter: &RecipeFilter) {
    if !filter.tags.is_empty() {
        qb.push(
            " AND EXISTS (SELECT 1 FROM recipe_tags
                          INNER JOIN tags ON tags.id = recipe_tags.tag_id
                          WHERE recipe_tags.recipe_id = recipes.id AND tags.slug IN (",
        );
        let mut slugs = qb.separated(", ");
        for slug in &filter.tags {
            slugs.push_bind(slug.clone());
        }
        slugs.push_unseparated("))");
    }

    if let Some(author) = filter.author {
        qb.push(" AND recipes.author_id = ");
        qb.push_bind(author);
    }

    if filter.is_favorited {
        qb.push(" AND ");
        push_marker_exists::<Favorite>(qb, viewer);
    }

    if filter.is_in_shopping_cart {
        qb.push(" AND ");
        push_marker_exists::<ShoppingCartItem>(qb, viewer);
    }
}

pub async fn list_recipes(
    pool: &SqlitePool,
    viewer: Option<UserId>,
    filter: &RecipeFilter,
    pager: Pager,
) -> AppResult<(Vec<Recipe>, i64)> {
    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM recipes WHERE 1 = 1");
    push_filter(&mut count, viewer, filter);
    let count = count.build_query_scalar::<i64>().fetch_one(pool).await?;

    let mut qb = annotated_recipes(viewer);
    push_filter(&mut qb, viewer, filter);
    qb.push(" ORDER BY recipes.pub_date DESC, recipes.id DESC LIMIT ");
    qb.push_bind(pager.limit);
    qb.push(" OFFSET ");
    qb.push_bind(pager.offset());

    let rows = qb.build_query_as::<RecipeRow>().fetch_all(pool).await?;
    tracing::debug!(?filter, found = rows.len(), total = count, "listed recipes");

    Ok((hydrate(pool, rows, viewer).await?, count))
}

pub async fn retrieve_recipe(
    pool: &SqlitePool,
    recipe_id: RecipeId,
    viewer: Option<UserId>,
) -> AppResult<Recipe> {
    let mut qb = annotated_recipes(viewer);
    qb.push(" AND recipes.id = ");
    qb.push_bind(recipe_id);

    let row = qb
        .build_query_as::<RecipeRow>()
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::DBError(DBError::NotFound))?;

    hydrate(pool, vec![row], viewer)
        .await?
        .pop()
        .ok_or(AppError::DBError(DBError::NotFound))
}

/// Attaches tags, ingredients and authors with one query each.
async fn hydrate(
    pool: &SqlitePool,
    rows: Vec<RecipeRow>,
    viewer: Option<UserId>,
) -> AppResult<Vec<Recipe>> {
    let ids: Vec<RecipeId> = rows.iter().map(|row| row.id).collect();
    let mut author_ids: Vec<UserId> = rows.iter().map(|row| row.author_id).collect();
    author_ids.sort_unstable();
    author_ids.dedup();

    let mut tags = tags_for_recipes(pool, &ids).await?;
    let mut ingredients = ingredients_for_recipes(pool, &ids).await?;
    let authors = profiles_by_ids(pool, &author_ids, viewer).await?;

    rows.into_iter()
        .map(|row| -> AppResult<Recipe> {
            let author = authors
                .get(&row.author_id)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("recipe {} has no author row", row.id))?;

            Ok(Recipe {
                id: row.id,
                tags: tags.remove(&row.id).unwrap_or_default(),
                author,
                ingredients: ingredients.remove(&row.id).unwrap_or_default(),
                is_favorited: row.is_favorited,
                is_in_shopping_cart: row.is_in_shopping_cart,
                name: row.name,
                image: row.image,
                text: row.text,
                cooking_time: row.cooking_time,
            })
        })
        .collect()
}

pub async fn recipe_author(pool: &SqlitePool, recipe_id: RecipeId) -> AppResult<UserId> {
    sqlx::query_scalar("SELECT author_id FROM recipes WHERE id = ?")
        .bind(recipe_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::DBError(DBError::NotFound))
}

pub async fn recipe_summary(
    pool: &SqlitePool,
    recipe_id: RecipeId,
) -> AppResult<Option<RecipeSummary>> {
    let summary = sqlx::query_as::<_, RecipeSummary>(
        "SELECT id, author_id, name, image, cooking_time FROM recipes WHERE id = ?",
    )
    .bind(recipe_id)
    .fetch_optional(pool)
    .await?;
    Ok(summary)
}

/// Fails with a validation error unless every tag and ingredient id exists.
async fn ensure_references(
    pool: &SqlitePool,
    tags: Option<&[TagId]>,
    ingredients: Option<&[IngredientAmount]>,
) -> AppResult<()> {
    if let Some(tags) = tags {
        let mut ids = tags.to_vec();
        ids.sort_unstable();
        ids.dedup();
        if count_existing(pool, "tags", &ids).await? != ids.len() as i64 {
            return Err(AppError::validation("unknown tag id"));
        }
    }

    if let Some(ingredients) = ingredients {
        let mut ids: Vec<_> = ingredients.iter().map(|i| i.ingredient_id).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != ingredients.len() {
            return Err(AppError::validation("ingredients must not repeat"));
        }
        if count_existing(pool, "ingredients", &ids).await? != ids.len() as i64 {
            return Err(AppError::validation("unknown ingredient id"));
        }
    }

    Ok(())
}

async fn set_tags(
    conn: &mut SqliteConnection,
    recipe_id: RecipeId,
    tags: &[TagId],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = ?")
        .bind(recipe_id)
        .execute(&mut *conn)
        .await?;

    if tags.is_empty() {
        return Ok(());
    }

    let mut qb = QueryBuilder::<Sqlite>::new("INSERT OR IGNORE INTO recipe_tags (recipe_id, tag_id) ");
    qb.push_values(tags, |mut row, tag_id| {
        row.push_bind(recipe_id).push_bind(*tag_id);
    });
    qb.build().execute(&mut *conn).await?;
    Ok(())
}

async fn set_ingredients(
    conn: &mut SqliteConnection,
    recipe_id: RecipeId,
    ingredients: &[IngredientAmount],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = ?")
        .bind(recipe_id)
        .execute(&mut *conn)
        .await?;

    if ingredients.is_empty() {
        return Ok(());
    }

    let mut qb = QueryBuilder::<Sqlite>::new(
        "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ",
    );
    qb.push_values(ingredients, |mut row, item| {
        row.push_bind(recipe_id)
            .push_bind(item.ingredient_id)
            .push_bind(item.amount);
    });
    qb.build().execute(&mut *conn).await?;
    Ok(())
}

/// Inserts the recipe with its tag links and ingredient rows in one
/// transaction.
pub async fn create_recipe(
    pool: &SqlitePool,
    author_id: UserId,
    recipe: NewRecipe,
) -> AppResult<RecipeId> {
    ensure_references(
        pool,
        Some(recipe.tags.as_slice()),
        Some(recipe.ingredients.as_slice()),
    )
    .await?;

    let mut tx = pool.begin().await?;

    let recipe_id: RecipeId = sqlx::query_scalar(
        "INSERT INTO recipes (author_id, name, text, image, cooking_time, pub_date)
         VALUES (?, ?, ?, ?, ?, ?)
         RETURNING id",
    )
    .bind(author_id)
    .bind(&recipe.name)
    .bind(&recipe.text)
    .bind(&recipe.image)
    .bind(recipe.cooking_time)
    .bind(Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string())
    .fetch_one(&mut *tx)
    .await?;

    set_tags(&mut tx, recipe_id, &recipe.tags).await?;
    set_ingredients(&mut tx, recipe_id, &recipe.ingredients).await?;

    tx.commit().await?;

    tracing::info!(recipe_id, author_id, "recipe created");
    Ok(recipe_id)
}

/// Applies `changes` in one transaction. Empty tag or ingredient lists leave
/// the stored sets alone.
pub async fn update_recipe(
    pool: &SqlitePool,
    recipe_id: RecipeId,
    changes: RecipeChanges,
) -> AppResult<()> {
    let tags = changes.tags.filter(|tags| !tags.is_empty());
    let ingredients = changes.ingredients.filter(|items| !items.is_empty());
    ensure_references(pool, tags.as_deref(), ingredients.as_deref()).await?;

    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        "UPDATE recipes
            SET name = COALESCE(?, name),
                text = COALESCE(?, text),
                image = COALESCE(?, image),
                cooking_time = COALESCE(?, cooking_time)
          WHERE id = ?",
    )
    .bind(changes.name)
    .bind(changes.text)
    .bind(changes.image)
    .bind(changes.cooking_time)
    .bind(recipe_id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(DBError::NotFound.into());
    }

    if let Some(tags) = &tags {
        set_tags(&mut tx, recipe_id, tags).await?;
    }
    if let Some(ingredients) = &ingredients {
        set_ingredients(&mut tx, recipe_id, ingredients).await?;
    }

    tx.commit().await?;

    tracing::info!(recipe_id, "recipe updated");
    Ok(())
}

pub async fn delete_recipe(pool: &SqlitePool, recipe_id: RecipeId) -> AppResult<()> {
    let deleted = sqlx::query("DELETE FROM recipes WHERE id = ?")
        .bind(recipe_id)
        .execute(pool)
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(DBError::NotFound.into());
    }
    Ok(())
}

/// Up to `limit` newest recipes of each author, plus each author's total.
pub(crate) async fn recent_recipes_by_author(
    pool: &SqlitePool,
    author_ids: &[UserId],
    limit: i64,
) -> AppResult<(HashMap<UserId, Vec<RecipeSummary>>, HashMap<UserId, i64>)> {
    let mut recipes: HashMap<UserId, Vec<RecipeSummary>> = HashMap::new();
    if author_ids.is_empty() {
        return Ok((recipes, HashMap::new()));
    }

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT author_id, COUNT(*) FROM recipes WHERE author_id IN ",
    );
    push_id_list(&mut qb, author_ids);
    qb.push(" GROUP BY author_id");
    let counts: HashMap<UserId, i64> = qb
        .build_query_as::<(UserId, i64)>()
        .fetch_all(pool)
        .await?
        .into_iter()
        .collect();

    if limit > 0 {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, author_id, name, image, cooking_time FROM (
                SELECT recipes.*, ROW_NUMBER() OVER (
                    PARTITION BY author_id ORDER BY pub_date DESC, id DESC
                ) AS position
                FROM recipes
                WHERE author_id IN ",
        );
        push_id_list(&mut qb, author_ids);
        qb.push(") WHERE position <= ");
        qb.push_bind(limit);
        qb.push(" ORDER BY author_id, position");

        for summary in qb.build_query_as::<RecipeSummary>().fetch_all(pool).await? {
            recipes.entry(summary.author_id).or_default().push(summary);
        }
    }

    Ok((recipes, counts))
}
