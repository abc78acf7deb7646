//! In-memory article store. Also answers ownership lookups for `article`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use turnstile_auth::{AuthResult, OwnershipLookup};

#[derive(Debug, Clone, Serialize)]
pub struct Article {
    pub id: u64,
    pub title: String,
    pub body: String,
    pub author_id: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewArticle {
    pub title: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Default)]
pub struct ArticleStore {
    articles: Arc<DashMap<u64, Article>>,
    next_id: Arc<AtomicU64>,
}

impl ArticleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, author_id: u64, new: NewArticle) -> Article {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let article = Article {
            id,
            title: new.title,
            body: new.body,
            author_id,
            created_at: OffsetDateTime::now_utc(),
        };
        self.articles.insert(id, article.clone());
        article
    }

    pub fn get(&self, id: u64) -> Option<Article> {
        self.articles.get(&id).map(|a| a.clone())
    }

    pub fn list(&self) -> Vec<Article> {
        let mut all: Vec<_> = self.articles.iter().map(|a| a.clone()).collect();
        all.sort_by_key(|a| a.id);
        all
    }

    pub fn remove(&self, id: u64) -> Option<Article> {
        self.articles.remove(&id).map(|(_, a)| a)
    }
}

#[async_trait]
impl OwnershipLookup for ArticleStore {
    async fn owner_of(&self, resource_id: &str) -> AuthResult<Option<u64>> {
        let Ok(id) = resource_id.parse::<u64>() else {
            return Ok(None);
        };
        Ok(self.articles.get(&id).map(|a| a.author_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_owner_of() {
        let store = ArticleStore::new();
        let article = store.create(
            7,
            NewArticle {
                title: "Hello".into(),
                body: String::new(),
            },
        );

        assert_eq!(store.owner_of(&article.id.to_string()).await.unwrap(), Some(7));
        assert_eq!(store.owner_of("999").await.unwrap(), None);
        assert_eq!(store.owner_of("not-a-number").await.unwrap(), None);

        store.remove(article.id);
        assert_eq!(store.owner_of(&article.id.to_string()).await.unwrap(), None);
    }
}
