//! ApplicationHolder - スナップショットと読み書きロック
//!
//! # 設計原則
//! - スナップショットはプロセス内で 1 つ（tokio RwLock の内側）
//! - 読み取りは何本でも並行、書き込みは排他
//! - 変更は必ず `write()` のガード経由、永続化もガード経由（ロックの内側で行う）
//! - ガードは RAII なので、どの経路で抜けてもロックは解放される

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;

use crate::domain::{Application, ApplicationId, Applications, StoreError};
use crate::ports::ApplicationStore;

pub struct ApplicationHolder {
    applications: RwLock<Applications>,
    store: Arc<dyn ApplicationStore>,
}

impl ApplicationHolder {
    /// 空のスナップショットで作る
    pub fn new(store: Arc<dyn ApplicationStore>) -> Self {
        Self {
            applications: RwLock::new(Applications::new()),
            store,
        }
    }

    /// ストアからスナップショットを復元して作る
    pub async fn load(store: Arc<dyn ApplicationStore>) -> Result<Self, StoreError> {
        let applications: Applications = store.load_all().await?.into_iter().collect();
        info!(applications = applications.len(), "snapshot restored");
        Ok(Self {
            applications: RwLock::new(applications),
            store,
        })
    }

    /// 共有ロック
    pub async fn read(&self) -> RwLockReadGuard<'_, Applications> {
        self.applications.read().await
    }

    /// 排他ロック
    pub async fn write(&self) -> ApplicationsWriteGuard<'_> {
        ApplicationsWriteGuard {
            guard: self.applications.write().await,
            store: self.store.as_ref(),
        }
    }

    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, Applications>> {
        self.applications.try_read().ok()
    }

    pub fn try_write(&self) -> Option<ApplicationsWriteGuard<'_>> {
        let guard = self.applications.try_write().ok()?;
        Some(ApplicationsWriteGuard {
            guard,
            store: self.store.as_ref(),
        })
    }

    pub async fn get_applications(&self) -> Vec<Application> {
        self.read().await.iter().cloned().collect()
    }

    pub async fn get_application(&self, id: &ApplicationId) -> Option<Application> {
        self.read().await.get(id).cloned()
    }
}

/// ApplicationsWriteGuard は排他ロック中のスナップショット
pub struct ApplicationsWriteGuard<'a> {
    guard: RwLockWriteGuard<'a, Applications>,
    store: &'a dyn ApplicationStore,
}

impl ApplicationsWriteGuard<'_> {
    /// アプリケーションを永続化する（存在しなければ何もしない）
    pub async fn persist(&self, id: &ApplicationId) -> Result<(), StoreError> {
        match self.guard.get(id) {
            Some(app) => self.store.persist(app).await,
            None => Ok(()),
        }
    }

    /// スナップショットとストアの両方から削除する
    pub async fn remove(&mut self, id: &ApplicationId) -> Result<Option<Application>, StoreError> {
        let removed = self.guard.remove(id);
        if removed.is_some() {
            self.store.remove(id).await?;
        }
        Ok(removed)
    }
}

impl Deref for ApplicationsWriteGuard<'_> {
    type Target = Applications;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl DerefMut for ApplicationsWriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::domain::application::fixtures::two_tier_app;
    use crate::impls::InMemoryApplicationStore;

    fn holder() -> (Arc<InMemoryApplicationStore>, ApplicationHolder) {
        let store = Arc::new(InMemoryApplicationStore::new());
        let holder = ApplicationHolder::new(store.clone());
        (store, holder)
    }

    #[tokio::test]
    async fn shared_guards_do_not_block_each_other() {
        let (_, holder) = holder();
        let first = holder.read().await;
        let second = tokio::time::timeout(Duration::from_millis(100), holder.read())
            .await
            .expect("second reader should not wait");
        assert!(holder.try_read().is_some());
        assert!(holder.try_write().is_none());
        drop((first, second));
        assert!(holder.try_write().is_some());
    }

    #[tokio::test]
    async fn exclusive_guard_blocks_everyone_until_release() {
        let (_, holder) = holder();
        let holder = Arc::new(holder);
        let writer = holder.write().await;

        assert!(holder.try_read().is_none());
        assert!(holder.try_write().is_none());

        let waiting_reader = {
            let holder = holder.clone();
            tokio::spawn(async move { holder.read().await.len() })
        };
        let waiting_writer = {
            let holder = holder.clone();
            tokio::spawn(async move {
                let mut apps = holder.write().await;
                apps.insert(two_tier_app());
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting_reader.is_finished());
        assert!(!waiting_writer.is_finished());

        drop(writer);
        waiting_writer.await.unwrap();
        let seen = waiting_reader.await.unwrap();
        assert!(seen <= 1);
        assert_eq!(holder.read().await.len(), 1);
    }

    #[tokio::test]
    async fn persists_and_removes_through_the_store() {
        let (store, holder) = holder();
        let app = two_tier_app();
        let id = app.id.clone();

        {
            let mut apps = holder.write().await;
            apps.insert(app);
            apps.persist(&id).await.unwrap();
        }
        assert!(store.stored(&id).await.unwrap().is_some());
        assert_eq!(holder.get_application(&id).await.map(|a| a.id), Some(id.clone()));

        {
            let mut apps = holder.write().await;
            assert!(apps.remove(&id).await.unwrap().is_some());
            assert!(apps.remove(&id).await.unwrap().is_none());
        }
        assert!(store.stored(&id).await.unwrap().is_none());
        assert!(holder.get_applications().await.is_empty());
    }

    #[tokio::test]
    async fn load_restores_the_snapshot() {
        let store = Arc::new(InMemoryApplicationStore::with_applications([two_tier_app()]).unwrap());
        let holder = ApplicationHolder::load(store).await.unwrap();
        assert_eq!(holder.get_applications().await.len(), 1);
    }
}
