//! Batched reference population: one `$in` query per referenced collection

use anyhow::{Context, Result};
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Document};
use mongodb::Database;
use std::collections::BTreeSet;

use crate::metrics::track_db_operation;
use crate::models::assignment::TitleLookup;
use crate::models::user::{User, UserLookup, UserSummary};
use crate::models::{COURSES, USERS};

fn unique(ids: impl IntoIterator<Item = ObjectId>) -> Vec<ObjectId> {
    ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect()
}

pub async fn user_summaries(
    mongo: &Database,
    ids: impl IntoIterator<Item = ObjectId>,
) -> Result<UserLookup> {
    let ids = unique(ids);
    let mut lookup = UserLookup::new();
    if ids.is_empty() {
        return Ok(lookup);
    }

    let docs: Vec<Document> = track_db_operation("find", USERS, async {
        mongo
            .collection::<Document>(USERS)
            .find(doc! { "_id": { "$in": ids } })
            .projection(doc! { "firstName": 1, "lastName": 1, "email": 1 })
            .await?
            .try_collect::<Vec<Document>>()
            .await
    })
    .await
    .context("Failed to query referenced users")?;

    for d in docs {
        if let Ok(id) = d.get_object_id("_id") {
            lookup.insert(
                id,
                UserSummary {
                    id: id.to_hex(),
                    first_name: d.get_str("firstName").unwrap_or_default().to_string(),
                    last_name: d.get_str("lastName").unwrap_or_default().to_string(),
                    email: d.get_str("email").unwrap_or_default().to_string(),
                },
            );
        }
    }
    Ok(lookup)
}

pub async fn titles(
    mongo: &Database,
    collection: &str,
    ids: impl IntoIterator<Item = ObjectId>,
) -> Result<TitleLookup> {
    let ids = unique(ids);
    let mut lookup = TitleLookup::new();
    if ids.is_empty() {
        return Ok(lookup);
    }

    let docs: Vec<Document> = mongo
        .collection::<Document>(collection)
        .find(doc! { "_id": { "$in": ids } })
        .projection(doc! { "title": 1 })
        .await
        .with_context(|| format!("Failed to query referenced {}", collection))?
        .try_collect()
        .await
        .with_context(|| format!("Failed to read referenced {}", collection))?;

    for d in docs {
        if let (Ok(id), Ok(title)) = (d.get_object_id("_id"), d.get_str("title")) {
            lookup.insert(id, title.to_string());
        }
    }
    Ok(lookup)
}

pub async fn course_titles(
    mongo: &Database,
    ids: impl IntoIterator<Item = ObjectId>,
) -> Result<TitleLookup> {
    titles(mongo, COURSES, ids).await
}

pub async fn find_user(mongo: &Database, id: &ObjectId) -> Result<Option<User>> {
    mongo
        .collection::<User>(USERS)
        .find_one(doc! { "_id": id })
        .await
        .context("Failed to query user")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_dedupes_ids() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        let ids = unique(vec![a, b, a, a]);
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a) && ids.contains(&b));
    }
}
