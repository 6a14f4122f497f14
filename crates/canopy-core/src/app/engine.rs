//! Engine - ポート・スナップショット・モニタを束ねる内部状態と Effect ドライバ
//!
//! # ドライバ（drive）
//! 1. Effect をスタックに積む（先頭が先に処理されるよう逆順）
//! 2. 1 つ取り出して処理し、返ってきた続きを同じく逆順で積む
//! 3. スタックが空になるまで繰り返す（深さ優先、呼び出し元に戻る前に伝播が完了する）
//!
//! # ロック順序
//! スナップショット（共有 / 排他）→ モニタレジストリ の順でのみ取得します。
//! どちらも Effect 1 つの処理の内側で解放し、await を跨いで保持しません。

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use crate::app::holder::ApplicationHolder;
use crate::domain::{ApplicationId, OrchestrationError};
use crate::monitor::{Effect, MonitorEnv, MonitorRegistry, MonitorSettings};
use crate::placement::AlgorithmRegistry;
use crate::ports::{CloudController, EventSink, IdGenerator, PolicyStore, TopologyView};

pub(crate) struct Engine {
    pub(crate) holder: Arc<ApplicationHolder>,
    pub(crate) monitors: Mutex<MonitorRegistry>,
    pub(crate) policies: Arc<dyn PolicyStore>,
    pub(crate) algorithms: AlgorithmRegistry,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) controller: Arc<dyn CloudController>,
    pub(crate) topology: Arc<dyn TopologyView>,
    pub(crate) settings: MonitorSettings,
}

impl Engine {
    pub(crate) fn monitor_env(&self) -> MonitorEnv<'_> {
        MonitorEnv {
            policies: self.policies.as_ref(),
            algorithms: &self.algorithms,
            ids: self.ids.as_ref(),
        }
    }

    /// Effect を深さ優先で全て処理する
    ///
    /// NotFound / InvalidTransition / MonitorNotFound はその枝だけ捨てて続行し、
    /// それ以外のエラーは残りを処理せずに返します。
    pub(crate) async fn drive(
        &self,
        application_id: &ApplicationId,
        effects: Vec<Effect>,
    ) -> Result<(), OrchestrationError> {
        let mut pending: Vec<Effect> = effects.into_iter().rev().collect();
        while let Some(effect) = pending.pop() {
            let follow_ups = match effect {
                Effect::Lifecycle(command) => self.apply_lifecycle(command).await,
                Effect::Publish(event) => {
                    self.events.publish(event);
                    Vec::new()
                }
                Effect::RegisterClusterMonitor(cluster_id) => {
                    self.monitors.lock().await.register_cluster(cluster_id);
                    Vec::new()
                }
                Effect::DeregisterClusterMonitor(cluster_id) => {
                    self.monitors.lock().await.deregister_cluster(&cluster_id);
                    Vec::new()
                }
                effect => match self.apply_to_tree(application_id, effect).await {
                    Ok(follow_ups) => follow_ups,
                    Err(e) if e.is_routine() => {
                        warn!(
                            application_id = %application_id,
                            error = %e,
                            "propagation skipped for this branch"
                        );
                        Vec::new()
                    }
                    Err(e) => return Err(e),
                },
            };
            pending.extend(follow_ups.into_iter().rev());
        }
        Ok(())
    }

    async fn apply_to_tree(
        &self,
        application_id: &ApplicationId,
        effect: Effect,
    ) -> Result<Vec<Effect>, OrchestrationError> {
        let apps = self.holder.read().await;
        let app = apps
            .get(application_id)
            .ok_or_else(|| OrchestrationError::not_found(application_id))?;
        let mut registry = self.monitors.lock().await;
        let tree = registry.tree_mut(application_id).ok_or_else(|| {
            OrchestrationError::MonitorNotFound(format!("monitor tree for {application_id}"))
        })?;
        tree.apply(effect, app, &self.monitor_env())
    }
}
