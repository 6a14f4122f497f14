//! IdGenerator port - スケールアウト用 instance id の生成
//!
//! min/max が両方 1 のグループは親の instance id を再利用するので、
//! ここが呼ばれるのは本当にスケールするグループだけです。
//!
//! # 実装
//! - **UlidGenerator**: `<alias>-<ULID>` 形式（本番用）

use ulid::Ulid;

use crate::domain::{ComponentId, InstanceId};
use crate::ports::Clock;

/// IdGenerator はコンポーネント内で一意な instance id を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数スレッドから使える）
pub trait IdGenerator: Send + Sync {
    fn generate_instance_id(&self, component: &ComponentId) -> InstanceId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使って ULID の timestamp 部分を決めるので、
/// テストでは FixedClock で時刻部分を固定できます。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_instance_id(&self, component: &ComponentId) -> InstanceId {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        let alias = match component {
            ComponentId::Application(id) => id.as_str(),
            ComponentId::Group(id) => id.as_str(),
            ComponentId::Cluster(id) => id.as_str(),
        };
        InstanceId::new(format!("{alias}-{}", ulid.to_string().to_lowercase()))
    }
}
