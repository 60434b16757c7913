use crate::config::Config;
use crate::models::datetime::to_bson;
use crate::models::user::{normalize_email, UserRole, UserStatus};
use crate::models::{NOTIFICATIONS, USERS};
use crate::services::auth_service::hash_password;
use anyhow::{bail, Context, Result};
use chrono::Utc;
use mongodb::{
    bson::{doc, Document},
    options::IndexOptions,
    Database, IndexModel,
};
use serde::Deserialize;
use std::path::Path;
use tokio::fs;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSeed {
    pub email: String,
    /// Plain-text password from the seed file, hashed before storage
    pub password: String,
    #[serde(default = "default_first_name")]
    pub first_name: String,
    #[serde(default = "default_last_name")]
    pub last_name: String,
}

fn default_first_name() -> String {
    "System".to_string()
}

fn default_last_name() -> String {
    "Administrator".to_string()
}

impl AdminSeed {
    fn into_document(self) -> Result<Document> {
        if self.password.len() < 6 {
            bail!("Admin seed password must be at least 6 characters");
        }
        let now = to_bson(&Utc::now());
        Ok(doc! {
            "email": normalize_email(&self.email),
            "password": hash_password(&self.password)?,
            "firstName": self.first_name.trim(),
            "lastName": self.last_name.trim(),
            "role": UserRole::Admin.as_str(),
            "status": UserStatus::Active.as_str(),
            "enrolledCourses": [],
            "createdAt": now,
            "updatedAt": now,
        })
    }
}

/// Creates the admin named in the seed file unless that email already exists
pub async fn bootstrap_admin(config: &Config, mongo: &Database) -> Result<()> {
    let path = match &config.admin_seed_file {
        Some(path) if !path.is_empty() => Path::new(path),
        _ => {
            tracing::debug!("No admin seed file configured, skipping bootstrap");
            return Ok(());
        }
    };

    if !path.exists() {
        tracing::warn!("Admin seed file {} not found, skipping bootstrap", path.display());
        return Ok(());
    }

    let contents = fs::read_to_string(path)
        .await
        .context("Failed to read admin seed file")?;
    let seed: AdminSeed =
        serde_json::from_str(&contents).context("Failed to parse admin seed file")?;

    let email = normalize_email(&seed.email);
    let document = seed.into_document()?;
    let update = mongo
        .collection::<Document>(USERS)
        .update_one(
            doc! { "email": email.as_str() },
            doc! { "$setOnInsert": document },
        )
        .upsert(true)
        .await
        .context("Failed to upsert seed admin")?;

    if update.upserted_id.is_some() {
        tracing::info!(email = %email, "Seed admin created");
    } else {
        tracing::info!(email = %email, "Seed admin already exists, skipped");
    }
    Ok(())
}

/// Index creation failures are logged; the API still serves without them
pub async fn ensure_indexes(mongo: &Database) {
    let email = IndexModel::builder()
        .keys(doc! { "email": 1 })
        .options(IndexOptions::builder().unique(true).build())
        .build();
    if let Err(e) = mongo.collection::<Document>(USERS).create_index(email).await {
        tracing::warn!(error = %e, "Failed to ensure unique email index");
    }

    let inbox = IndexModel::builder()
        .keys(doc! { "recipient": 1, "isRead": 1, "createdAt": -1 })
        .build();
    if let Err(e) = mongo
        .collection::<Document>(NOTIFICATIONS)
        .create_index(inbox)
        .await
    {
        tracing::warn!(error = %e, "Failed to ensure notification index");
    }
}
