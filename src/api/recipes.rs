use std::sync::Arc;

use axum::{
    extract::{OriginalUri, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use axum_extra::extract::Query;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    auth::{self, AuthHeader},
    config::Config,
    db::{self, IngredientAmount, IngredientId, Marker, RecipeFilter, RecipeId, TagId, UserId},
    error::{AppError, AppResult},
    image::ImageStore,
    pagination::Pager,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct IngredientInput {
    id: IngredientId,
    amount: i64,
}

impl From<&IngredientInput> for IngredientAmount {
    fn from(input: &IngredientInput) -> Self {
        IngredientAmount {
            ingredient_id: input.id,
            amount: input.amount,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRecipe {
    #[validate(length(min = 1, message = "at least one ingredient is required"))]
    ingredients: Vec<IngredientInput>,
    #[validate(length(min = 1, message = "at least one tag is required"))]
    tags: Vec<TagId>,
    image: String,
    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    name: String,
    #[validate(length(min = 1, message = "text can't be blank"))]
    text: String,
    #[validate(range(min = 1, message = "cooking time must be at least 1 minute"))]
    cooking_time: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRecipe {
    #[serde(default)]
    ingredients: Option<Vec<IngredientInput>>,
    #[serde(default)]
    tags: Option<Vec<TagId>>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    name: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, message = "text can't be blank"))]
    text: Option<String>,
    #[serde(default)]
    #[validate(range(min = 1, message = "cooking time must be at least 1 minute"))]
    cooking_time: Option<i64>,
}

fn ingredient_amounts(inputs: &[IngredientInput]) -> AppResult<Vec<IngredientAmount>> {
    if inputs.iter().any(|input| input.amount < 1) {
        return Err(AppError::validation("ingredient amount must be at least 1"));
    }
    Ok(inputs.iter().map(IngredientAmount::from).collect())
}

fn dedup_tags(mut tags: Vec<TagId>) -> Vec<TagId> {
    tags.sort_unstable();
    tags.dedup();
    tags
}

#[derive(Debug, Deserialize)]
pub struct ListRecipesQuery {
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    is_favorited: Option<String>,
    #[serde(default)]
    is_in_shopping_cart: Option<String>,
    #[serde(default)]
    page: Option<String>,
    #[serde(default)]
    limit: Option<String>,
}

impl ListRecipesQuery {
    fn filter(&self) -> AppResult<RecipeFilter> {
        let author = match self.author.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                raw.parse::<UserId>()
                    .map_err(|_| AppError::validation("author must be a user id"))?,
            ),
        };

        Ok(RecipeFilter {
            tags: self.tags.iter().filter(|t| !t.is_empty()).cloned().collect(),
            author,
            is_favorited: is_truthy(self.is_favorited.as_deref()),
            is_in_shopping_cart: is_truthy(self.is_in_shopping_cart.as_deref()),
        })
    }
}

fn is_truthy(flag: Option<&str>) -> bool {
    matches!(
        flag.map(|f| f.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

/// Rejects anyone but the recipe's author.
async fn ensure_author(pool: &SqlitePool, recipe_id: RecipeId, user_id: UserId) -> AppResult<()> {
    if db::recipe_author(pool, recipe_id).await? != user_id {
        return Err(AppError::Forbidden("only the author can change this recipe"));
    }
    Ok(())
}

// GET /api/recipes
pub async fn get_recipes(
    State(pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<ListRecipesQuery>,
    token: AuthHeader,
) -> AppResult<impl IntoResponse> {
    let viewer = auth::viewer(&pool, token).await?;
    let filter = params.filter()?;
    let pager = Pager::parse(params.page.as_deref(), params.limit.as_deref(), config.page_size)?;

    let (recipes, count) = db::list_recipes(&pool, viewer, &filter, pager).await?;
    Ok(Json(pager.finish(recipes, count, &uri)?))
}

// GET /api/recipes/:id
pub async fn get_recipe(
    State(pool): State<SqlitePool>,
    Path(recipe_id): Path<RecipeId>,
    token: AuthHeader,
) -> AppResult<impl IntoResponse> {
    let viewer = auth::viewer(&pool, token).await?;
    let recipe = db::retrieve_recipe(&pool, recipe_id, viewer).await?;
    Ok(Json(recipe))
}

// POST /api/recipes
pub async fn create_recipe(
    State(pool): State<SqlitePool>,
    State(images): State<ImageStore>,
    token: AuthHeader,
    Json(recipe): Json<CreateRecipe>,
) -> AppResult<impl IntoResponse> {
    let user_id = auth::require_user(&pool, token).await?;
    recipe.validate()?;
    let ingredients = ingredient_amounts(&recipe.ingredients)?;

    let image = images.save(&recipe.image).await?;

    let created = db::create_recipe(
        &pool,
        user_id,
        db::NewRecipe {
            name: recipe.name,
            text: recipe.text,
            image: image.clone(),
            cooking_time: recipe.cooking_time,
            tags: dedup_tags(recipe.tags),
            ingredients,
        },
    )
    .await;

    let recipe_id = match created {
        Ok(recipe_id) => recipe_id,
        Err(err) => {
            images.discard(&image).await;
            return Err(err);
        }
    };

    let recipe = db::retrieve_recipe(&pool, recipe_id, Some(user_id)).await?;
    Ok((StatusCode::CREATED, Json(recipe)))
}

// PATCH /api/recipes/:id
pub async fn update_recipe(
    State(pool): State<SqlitePool>,
    State(images): State<ImageStore>,
    Path(recipe_id): Path<RecipeId>,
    token: AuthHeader,
    Json(changes): Json<UpdateRecipe>,
) -> AppResult<impl IntoResponse> {
    let user_id = auth::require_user(&pool, token).await?;
    ensure_author(&pool, recipe_id, user_id).await?;
    changes.validate()?;

    let ingredients = changes
        .ingredients
        .as_deref()
        .map(ingredient_amounts)
        .transpose()?;

    let image = match changes.image.as_deref() {
        Some(data) => Some(images.save(data).await?),
        None => None,
    };

    let updated = db::update_recipe(
        &pool,
        recipe_id,
        db::RecipeChanges {
            name: changes.name,
            text: changes.text,
            image: image.clone(),
            cooking_time: changes.cooking_time,
            tags: changes.tags.map(dedup_tags),
            ingredients,
        },
    )
    .await;

    if let Err(err) = updated {
        if let Some(image) = &image {
            images.discard(image).await;
        }
        return Err(err);
    }

    let recipe = db::retrieve_recipe(&pool, recipe_id, Some(user_id)).await?;
    Ok(Json(recipe))
}

// DELETE /api/recipes/:id
pub async fn delete_recipe(
    State(pool): State<SqlitePool>,
    Path(recipe_id): Path<RecipeId>,
    token: AuthHeader,
) -> AppResult<impl IntoResponse> {
    let user_id = auth::require_user(&pool, token).await?;
    ensure_author(&pool, recipe_id, user_id).await?;

    db::delete_recipe(&pool, recipe_id).await?;
    tracing::info!(recipe_id, user_id, "recipe deleted");

    Ok(StatusCode::NO_CONTENT)
}

// POST /api/recipes/:id/favorite, POST /api/recipes/:id/shopping_cart
pub async fn add_marker<M: Marker>(
    State(pool): State<SqlitePool>,
    Path(recipe_id): Path<RecipeId>,
    token: AuthHeader,
) -> AppResult<impl IntoResponse> {
    let user_id = auth::require_user(&pool, token).await?;

    let Some(summary) = db::recipe_summary(&pool, recipe_id).await? else {
        return Err(AppError::validation("recipe does not exist"));
    };

    db::add_marker::<M>(&pool, user_id, recipe_id).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

// DELETE /api/recipes/:id/favorite, DELETE /api/recipes/:id/shopping_cart
pub async fn remove_marker<M: Marker>(
    State(pool): State<SqlitePool>,
    Path(recipe_id): Path<RecipeId>,
    token: AuthHeader,
) -> AppResult<impl IntoResponse> {
    let user_id = auth::require_user(&pool, token).await?;
    db::remove_marker::<M>(&pool, user_id, recipe_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// GET /api/recipes/download_shopping_cart
pub async fn download_shopping_cart(
    State(pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    token: AuthHeader,
) -> AppResult<impl IntoResponse> {
    let user_id = auth::require_user(&pool, token).await?;

    let lines = db::shopping_list(&pool, user_id).await?;
    let catalog = db::render_shopping_list(&lines, &config.shopping_list_footer);

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"shopping_list.txt\"",
            ),
        ],
        catalog,
    ))
}
