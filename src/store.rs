//! Supabase (PostgREST) client backing the catalogue: collections, cards,
//! reference vocabularies, and card-image storage.
//!
//! The relational schema itself lives in Supabase; this module is the whole
//! data-access surface the rest of the service sees.

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::import::{ReferenceIds, ReferenceSets};
use crate::schema::{Card, Collection, NewCard, User, VocabEntry, VocabKind};

#[derive(Clone)]
pub struct Store {
    client: Client,
    base_url: String,
    service_role_key: String,
    storage_bucket: String,
}

impl Store {
    /// Create a store from environment variables.
    pub fn from_env(client: Client) -> Result<Self> {
        let base_url =
            std::env::var("SUPABASE_URL").map_err(|_| anyhow!("SUPABASE_URL not set"))?;
        let service_role_key = std::env::var("SUPABASE_SERVICE_ROLE_KEY")
            .map_err(|_| anyhow!("SUPABASE_SERVICE_ROLE_KEY not set"))?;
        let storage_bucket =
            std::env::var("STORAGE_BUCKET").unwrap_or_else(|_| "card-images".to_string());

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_role_key,
            storage_bucket,
        })
    }

    /// GET rows from the REST API.
    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}/rest/v1/{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("GET {} failed: {} - {}", path, status, text));
        }

        Ok(resp.json().await?)
    }

    /// POST a JSON body to a table, returning the inserted representation.
    async fn post_returning(&self, table: &str, body: &Value) -> Result<Value> {
        let url = format!("{}/rest/v1/{}", self.base_url, table);
        let resp = self
            .client
            .post(&url)
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("INSERT into {} failed: {} - {}", table, status, text));
        }

        Ok(resp.json().await?)
    }

    /// PATCH rows matched by a filter.
    async fn patch(&self, path: &str, set: &Value) -> Result<()> {
        let url = format!("{}/rest/v1/{}", self.base_url, path);
        let resp = self
            .client
            .patch(&url)
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=minimal")
            .json(set)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("UPDATE {} failed: {} - {}", path, status, text));
        }

        Ok(())
    }

    /// DELETE rows matched by a filter.
    async fn delete(&self, path: &str) -> Result<()> {
        let url = format!("{}/rest/v1/{}", self.base_url, path);
        let resp = self
            .client
            .delete(&url)
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("DELETE {} failed: {} - {}", path, status, text));
        }

        Ok(())
    }

    fn first_row<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
        let row = value
            .as_array()
            .and_then(|rows| rows.first().cloned())
            .ok_or_else(|| anyhow!("insert returned no rows"))?;
        Ok(serde_json::from_value(row)?)
    }

    // ========================================================================
    // Users
    // ========================================================================

    pub async fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let rows: Vec<User> = self
            .get_json(&format!("users?id=eq.{}&select=*&limit=1", user_id))
            .await?;
        Ok(rows.into_iter().next())
    }

    // ========================================================================
    // Collections
    // ========================================================================

    pub async fn list_collections(&self, user_id: i64) -> Result<Vec<Collection>> {
        self.get_json(&format!(
            "collections?userId=eq.{}&select=*&order=createdAt.desc",
            user_id
        ))
        .await
    }

    pub async fn get_collection(&self, collection_id: i64) -> Result<Option<Collection>> {
        let rows: Vec<Collection> = self
            .get_json(&format!(
                "collections?id=eq.{}&select=*&limit=1",
                collection_id
            ))
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn create_collection(
        &self,
        user_id: i64,
        name: &str,
        description: Option<&str>,
        category_id: Option<i64>,
    ) -> Result<Collection> {
        let inserted = self
            .post_returning(
                "collections",
                &json!({
                    "userId": user_id,
                    "name": name,
                    "description": description,
                    "categoryId": category_id,
                }),
            )
            .await?;
        Self::first_row(inserted)
    }

    pub async fn update_collection(&self, collection_id: i64, set: Value) -> Result<()> {
        self.patch(&format!("collections?id=eq.{}", collection_id), &set)
            .await
    }

    /// Cards cascade via the schema's foreign key.
    pub async fn delete_collection(&self, collection_id: i64) -> Result<()> {
        self.delete(&format!("collections?id=eq.{}", collection_id))
            .await
    }

    // ========================================================================
    // Cards
    // ========================================================================

    pub async fn list_cards(&self, collection_id: i64) -> Result<Vec<Card>> {
        self.get_json(&format!(
            "cards?collectionId=eq.{}&select=*&order=createdAt.desc",
            collection_id
        ))
        .await
    }

    pub async fn get_card(&self, card_id: i64) -> Result<Option<Card>> {
        let rows: Vec<Card> = self
            .get_json(&format!("cards?id=eq.{}&select=*&limit=1", card_id))
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn create_card(&self, card: &NewCard) -> Result<Card> {
        let inserted = self
            .post_returning("cards", &serde_json::to_value(card)?)
            .await?;
        Self::first_row(inserted)
    }

    /// Insert a whole import batch as one array POST. PostgREST executes the
    /// array as a single statement, so the batch commits or fails as a unit.
    pub async fn insert_cards(&self, cards: &[NewCard]) -> Result<usize> {
        if cards.is_empty() {
            return Ok(0);
        }

        let url = format!("{}/rest/v1/cards", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=minimal")
            .json(cards)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Bulk card insert failed: {} - {}", status, text));
        }

        info!("Inserted {} cards", cards.len());
        Ok(cards.len())
    }

    pub async fn update_card(&self, card_id: i64, set: Value) -> Result<()> {
        self.patch(&format!("cards?id=eq.{}", card_id), &set).await
    }

    pub async fn delete_card(&self, card_id: i64) -> Result<()> {
        self.delete(&format!("cards?id=eq.{}", card_id)).await
    }

    // ========================================================================
    // Reference vocabularies
    // ========================================================================

    pub async fn list_vocab(&self, kind: VocabKind) -> Result<Vec<VocabEntry>> {
        self.get_json(&format!("{}?select=id,name&order=name.asc", kind.table()))
            .await
    }

    pub async fn create_vocab(&self, kind: VocabKind, name: &str) -> Result<VocabEntry> {
        let inserted = self
            .post_returning(kind.table(), &json!({ "name": name }))
            .await?;
        Self::first_row(inserted)
    }

    pub async fn rename_vocab(&self, kind: VocabKind, id: i64, name: &str) -> Result<()> {
        self.patch(
            &format!("{}?id=eq.{}", kind.table(), id),
            &json!({ "name": name }),
        )
        .await
    }

    pub async fn delete_vocab(&self, kind: VocabKind, id: i64) -> Result<()> {
        self.delete(&format!("{}?id=eq.{}", kind.table(), id)).await
    }

    /// Snapshot every card-referenced vocabulary for the validator. Taken
    /// fresh on each call; never reused across requests.
    pub async fn load_reference_sets(&self) -> Result<ReferenceSets> {
        let vocab = self.load_card_vocab().await?;
        Ok(ReferenceSets::from_entries(
            vocab.iter().map(|(k, e)| (*k, e.as_slice())),
        ))
    }

    /// Independent snapshot for the importer's name → id resolution.
    pub async fn load_reference_ids(&self) -> Result<ReferenceIds> {
        let vocab = self.load_card_vocab().await?;
        Ok(ReferenceIds::from_entries(
            vocab.iter().map(|(k, e)| (*k, e.as_slice())),
        ))
    }

    async fn load_card_vocab(&self) -> Result<Vec<(VocabKind, Vec<VocabEntry>)>> {
        let mut vocab = Vec::with_capacity(VocabKind::CARD_REFS.len());
        for kind in VocabKind::CARD_REFS {
            let entries = self.list_vocab(kind).await?;
            debug!("Loaded {} {} entries", entries.len(), kind.label());
            vocab.push((kind, entries));
        }
        Ok(vocab)
    }

    // ========================================================================
    // Storage
    // ========================================================================

    /// Upload an object to the card-image bucket, returning its public URL.
    pub async fn upload_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        let url = format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url, self.storage_bucket, key
        );

        let resp = self
            .client
            .post(&url)
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
            .header("Content-Type", content_type)
            .body(bytes)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Storage upload of {} failed: {} - {}", key, status, text));
        }

        Ok(format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.storage_bucket, key
        ))
    }
}
