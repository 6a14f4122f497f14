//! InMemoryApplicationStore - 開発用のスナップショット保存先
//!
//! JSON にシリアライズして保持するので、永続化できない値が混ざれば
//! 本番の保存先と同じく StoreError になります。

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use crate::domain::{Application, ApplicationId, StoreError};
use crate::ports::ApplicationStore;

#[derive(Default)]
pub struct InMemoryApplicationStore {
    documents: Mutex<BTreeMap<ApplicationId, String>>,
    failing: AtomicBool,
}

impl InMemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 事前にアプリケーションを入れておく（起動時の復元テスト用）
    pub fn with_applications(apps: impl IntoIterator<Item = Application>) -> Result<Self, StoreError> {
        let mut documents = BTreeMap::new();
        for app in apps {
            documents.insert(app.id.clone(), serde_json::to_string(&app)?);
        }
        Ok(Self {
            documents: Mutex::new(documents),
            failing: AtomicBool::new(false),
        })
    }

    /// 以降の persist / remove を全て失敗させる
    pub fn fail_writes(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes are disabled".into()));
        }
        Ok(())
    }

    /// 保存されている内容を読み戻す
    pub async fn stored(&self, id: &ApplicationId) -> Result<Option<Application>, StoreError> {
        let documents = self.documents.lock().await;
        match documents.get(id) {
            Some(doc) => Ok(Some(serde_json::from_str(doc)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ApplicationStore for InMemoryApplicationStore {
    async fn load_all(&self) -> Result<Vec<Application>, StoreError> {
        let documents = self.documents.lock().await;
        documents
            .values()
            .map(|doc| serde_json::from_str(doc).map_err(StoreError::from))
            .collect()
    }

    async fn persist(&self, app: &Application) -> Result<(), StoreError> {
        self.check_writable()?;
        let doc = serde_json::to_string(app)?;
        self.documents.lock().await.insert(app.id.clone(), doc);
        Ok(())
    }

    async fn remove(&self, id: &ApplicationId) -> Result<(), StoreError> {
        self.check_writable()?;
        self.documents.lock().await.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::application::fixtures::two_tier_app;

    #[tokio::test]
    async fn persist_overwrites_and_remove_deletes() {
        let store = InMemoryApplicationStore::new();
        let mut app = two_tier_app();
        store.persist(&app).await.unwrap();

        app.children.groups.pop();
        store.persist(&app).await.unwrap();

        let stored = store.stored(&app.id).await.unwrap().unwrap();
        assert_eq!(stored.children.groups.len(), 1);
        assert_eq!(store.load_all().await.unwrap().len(), 1);

        store.remove(&app.id).await.unwrap();
        assert!(store.stored(&app.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failing_writes_keep_the_previous_document() {
        let store = InMemoryApplicationStore::new();
        let mut app = two_tier_app();
        store.persist(&app).await.unwrap();
        store.fail_writes();

        app.children.groups.clear();
        assert!(matches!(store.persist(&app).await, Err(StoreError::Unavailable(_))));
        assert!(store.remove(&app.id).await.is_err());
        assert_eq!(store.stored(&app.id).await.unwrap().unwrap().children.groups.len(), 2);
    }
}
