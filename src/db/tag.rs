use std::collections::HashMap;

use serde::Serialize;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};

use crate::error::{AppError, AppResult, DBError};

use super::{push_id_list, RecipeId};

pub type TagId = i64;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub color: String,
    pub slug: String,
}

#[derive(FromRow)]
struct RecipeTag {
    recipe_id: RecipeId,
    #[sqlx(flatten)]
    tag: Tag,
}

pub async fn list_tags(pool: &SqlitePool) -> AppResult<Vec<Tag>> {
    let tags = sqlx::query_as::<_, Tag>("SELECT id, name, color, slug FROM tags ORDER BY id")
        .fetch_all(pool)
        .await?;
    Ok(tags)
}

pub async fn get_tag(pool: &SqlitePool, tag_id: TagId) -> AppResult<Tag> {
    sqlx::query_as::<_, Tag>("SELECT id, name, color, slug FROM tags WHERE id = ?")
        .bind(tag_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::DBError(DBError::NotFound))
}

pub(crate) async fn tags_for_recipes(
    pool: &SqlitePool,
    recipe_ids: &[RecipeId],
) -> AppResult<HashMap<RecipeId, Vec<Tag>>> {
    let mut by_recipe: HashMap<RecipeId, Vec<Tag>> = HashMap::new();
    if recipe_ids.is_empty() {
        return Ok(by_recipe);
    }

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT recipe_tags.recipe_id, tags.id, tags.name, tags.color, tags.slug
         FROM recipe_tags
         INNER JOIN tags ON tags.id = recipe_tags.tag_id
         WHERE recipe_tags.recipe_id IN ",
    );
    push_id_list(&mut qb, recipe_ids);
    qb.push(" ORDER BY tags.id");

    for row in qb.build_query_as::<RecipeTag>().fetch_all(pool).await? {
        by_recipe.entry(row.recipe_id).or_default().push(row.tag);
    }
    Ok(by_recipe)
}
