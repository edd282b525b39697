use serde::Serialize;
use sqlx::SqlitePool;

use crate::{
    error::{on_conflict, AppError, AppResult},
    pagination::Pager,
};

use super::{profiles_query, recent_recipes_by_author, user_exists, RecipeSummary, UserId, UserProfile};

/// An author the caller follows, with a capped slice of their recipes.
#[derive(Debug, Serialize)]
pub struct SubscribedAuthor {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub recipes: Vec<RecipeSummary>,
    pub recipes_count: i64,
}

/// Self-subscription is refused here rather than left to the store.
pub async fn subscribe(pool: &SqlitePool, author_id: UserId, subscriber_id: UserId) -> AppResult<()> {
    if author_id == subscriber_id {
        return Err(AppError::validation("you cannot subscribe to yourself"));
    }
    if !user_exists(pool, author_id).await? {
        return Err(AppError::validation("author does not exist"));
    }

    sqlx::query("INSERT INTO subscriptions (author_id, subscriber_id) VALUES (?, ?)")
        .bind(author_id)
        .bind(subscriber_id)
        .execute(pool)
        .await
        .map_err(|err| on_conflict(err, "already subscribed to this author"))?;

    tracing::info!(author_id, subscriber_id, "subscribed");
    Ok(())
}

pub async fn unsubscribe(pool: &SqlitePool, author_id: UserId, subscriber_id: UserId) -> AppResult<()> {
    sqlx::query("DELETE FROM subscriptions WHERE author_id = ? AND subscriber_id = ?")
        .bind(author_id)
        .bind(subscriber_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn list_subscriptions(
    pool: &SqlitePool,
    subscriber_id: UserId,
    pager: Pager,
    recipes_limit: i64,
) -> AppResult<(Vec<SubscribedAuthor>, i64)> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions WHERE subscriber_id = ?")
        .bind(subscriber_id)
        .fetch_one(pool)
        .await?;

    let mut qb = profiles_query(Some(subscriber_id));
    qb.push(" WHERE users.id IN (SELECT author_id FROM subscriptions WHERE subscriber_id = ");
    qb.push_bind(subscriber_id);
    qb.push(") ORDER BY users.id LIMIT ");
    qb.push_bind(pager.limit);
    qb.push(" OFFSET ");
    qb.push_bind(pager.offset());
    let authors = qb.build_query_as::<UserProfile>().fetch_all(pool).await?;

    let author_ids: Vec<UserId> = authors.iter().map(|author| author.id).collect();
    let (mut recipes, counts) = recent_recipes_by_author(pool, &author_ids, recipes_limit).await?;

    let authors = authors
        .into_iter()
        .map(|profile| SubscribedAuthor {
            recipes: recipes.remove(&profile.id).unwrap_or_default(),
            recipes_count: counts.get(&profile.id).copied().unwrap_or(0),
            profile,
        })
        .collect();

    Ok((authors, count))
}
