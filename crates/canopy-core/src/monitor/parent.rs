//! 親モニタ（Application / Group）に共通の子イベント処理

use tracing::{debug, info, warn};

use crate::domain::{
    ComponentId, InstanceId, LifecycleCommand, MonitorScalingEvent, MonitorStatusEvent, Status,
};
use crate::monitor::status_chain::ChildState;
use crate::monitor::{Effect, MonitorCore, MonitorCx};

pub(super) fn on_child_status_event(
    core: &mut MonitorCore,
    cx: &MonitorCx<'_>,
    event: &MonitorStatusEvent,
) -> Vec<Effect> {
    let key = (event.id.clone(), event.instance_id.clone());
    match event.status {
        Status::Active => {
            core.inactive.remove(&key);
            if core.startup.has_dependents(&event.id) {
                let started = start_ready_dependents(core, cx, &event.id, &event.instance_id);
                if !started.is_empty() {
                    return started;
                }
            }
            evaluate(core, cx, &event.instance_id)
        }
        Status::Inactive => {
            core.inactive.insert(key);
            if core.startup.has_dependents(&event.id) {
                debug!(
                    monitor = %core.component,
                    child = %event.id,
                    "inactive child has startup dependents; not propagated"
                );
                Vec::new()
            } else {
                evaluate(core, cx, &event.instance_id)
            }
        }
        Status::Created => {
            let mut effects = Vec::new();
            if core.terminating.remove(&key)
                && let ComponentId::Cluster(alias) = &event.id
                && let Some(cluster) = cx.app.cluster_recursively(alias)
            {
                effects.push(Effect::DeregisterClusterMonitor(cluster.cluster_id));
            }
            effects
        }
        Status::Terminating => {
            core.terminating.insert(key);
            Vec::new()
        }
        Status::Terminated => on_child_terminated(core, cx, event),
    }
}

fn on_child_terminated(
    core: &mut MonitorCore,
    cx: &MonitorCx<'_>,
    event: &MonitorStatusEvent,
) -> Vec<Effect> {
    let key = (event.id.clone(), event.instance_id.clone());
    if !core.terminating.remove(&key) {
        debug!(
            monitor = %core.component,
            child = %event.id,
            instance_id = %event.instance_id,
            "terminated child was not marked terminating"
        );
    }
    core.inactive.remove(&key);

    let mut effects = Vec::new();
    let child_monitor = core.children.get(&event.id).copied();
    if let Some(child_monitor) = child_monitor
        && cx
            .node(child_monitor)
            .is_none_or(|node| !node.core.has_live_instances())
    {
        core.children.remove(&event.id);
        effects.push(Effect::RemoveMonitor(child_monitor));
    }

    let Some(owner) = cx.app.instance_context(&core.component, &event.instance_id) else {
        debug!(
            monitor = %core.component,
            instance_id = %event.instance_id,
            "owning instance already gone"
        );
        return effects;
    };

    match owner.status {
        Status::Terminating => effects.extend(evaluate(core, cx, &event.instance_id)),
        Status::Created | Status::Active | Status::Inactive => {
            info!(
                monitor = %core.component,
                child = %event.id,
                instance_id = %event.instance_id,
                owner_status = %owner.status,
                "child terminated while owner is live; restarting it"
            );
            effects.push(Effect::StartChild {
                parent: core.id,
                child: event.id.clone(),
                parent_instance_ids: vec![event.instance_id.clone()],
            });
        }
        Status::Terminated => {}
    }
    effects
}

/// 子 `ready` の起動を待っていた兄弟のうち、依存が全て Active のものを起動する
fn start_ready_dependents(
    core: &MonitorCore,
    cx: &MonitorCx<'_>,
    ready: &ComponentId,
    instance_id: &InstanceId,
) -> Vec<Effect> {
    core.startup
        .dependents_of(ready)
        .into_iter()
        .filter(|dependent| {
            let started = core
                .child_monitor(cx, dependent)
                .is_some_and(|m| m.core.has_live_instance_for(instance_id));
            !started
                && core
                    .startup
                    .dependencies_of(dependent)
                    .iter()
                    .all(|dep| child_is_active(core, cx, dep, instance_id))
        })
        .map(|dependent| Effect::StartChild {
            parent: core.id,
            child: dependent,
            parent_instance_ids: vec![instance_id.clone()],
        })
        .collect()
}

fn child_is_active(
    core: &MonitorCore,
    cx: &MonitorCx<'_>,
    child: &ComponentId,
    instance_id: &InstanceId,
) -> bool {
    core.child_monitor(cx, child).is_some_and(|m| {
        let mut statuses = m.core.instances_with_parent(instance_id).map(|i| i.status);
        let first = statuses.next();
        first == Some(Status::Active) && statuses.all(|s| s == Status::Active)
    })
}

pub(super) fn child_states(
    core: &MonitorCore,
    cx: &MonitorCx<'_>,
    instance_id: &InstanceId,
) -> Vec<ChildState> {
    core.startup
        .members()
        .iter()
        .map(|child| {
            let statuses = core.child_monitor(cx, child).map(|m| {
                m.core
                    .instances_with_parent(instance_id)
                    .map(|i| i.status)
                    .collect()
            });
            ChildState::new(child.clone(), statuses)
        })
        .collect()
}

/// 状態チェーンを評価し、遷移が必要なら ApplicationBuilder へのコマンドを返す
pub(super) fn evaluate(
    core: &MonitorCore,
    cx: &MonitorCx<'_>,
    instance_id: &InstanceId,
) -> Vec<Effect> {
    let Some(owner) = cx.app.instance_context(&core.component, instance_id) else {
        debug!(
            monitor = %core.component,
            instance_id = %instance_id,
            "owning instance not in snapshot; nothing to evaluate"
        );
        return Vec::new();
    };
    let children = child_states(core, cx, instance_id);
    let Some(next) = cx.tree.chain().process(owner.status, &children) else {
        return Vec::new();
    };
    match lifecycle_command(core, cx, instance_id, next) {
        Some(command) => vec![Effect::Lifecycle(command)],
        None => {
            debug!(
                monitor = %core.component,
                instance_id = %instance_id,
                next = %next,
                "no lifecycle command for computed status"
            );
            Vec::new()
        }
    }
}

fn lifecycle_command(
    core: &MonitorCore,
    cx: &MonitorCx<'_>,
    instance_id: &InstanceId,
    next: Status,
) -> Option<LifecycleCommand> {
    let application_id = cx.app.id.clone();
    let instance_id = instance_id.clone();
    match (&core.component, next) {
        (ComponentId::Application(_), Status::Active) => Some(LifecycleCommand::ApplicationActivated {
            application_id,
            instance_id,
        }),
        (ComponentId::Application(_), Status::Terminated) => {
            Some(LifecycleCommand::ApplicationTerminated {
                application_id,
                instance_id,
            })
        }
        (ComponentId::Group(group_id), Status::Active) => Some(LifecycleCommand::GroupActivated {
            application_id,
            group_id: group_id.clone(),
            instance_id,
        }),
        (ComponentId::Group(group_id), Status::Inactive) => Some(LifecycleCommand::GroupInactive {
            application_id,
            group_id: group_id.clone(),
            instance_id,
        }),
        (ComponentId::Group(group_id), Status::Terminated) => {
            Some(LifecycleCommand::GroupTerminated {
                application_id,
                group_id: group_id.clone(),
                instance_id,
            })
        }
        _ => None,
    }
}

/// 子からのスケーリング要求を親と兄弟グループへ中継する
pub(super) fn on_child_scaling_event(
    core: &MonitorCore,
    cx: &MonitorCx<'_>,
    event: &MonitorScalingEvent,
) -> Vec<Effect> {
    let mut effects = Vec::new();

    if core.has_group_scaling_dependent
        && let Some(parent) = core.parent
    {
        effects.push(Effect::ScaleParent {
            target: parent,
            event: MonitorScalingEvent {
                id: core.component.clone(),
                ..event.clone()
            },
        });
    }

    let origin_scales_as_group = core
        .child_monitor(cx, &event.id)
        .is_some_and(|m| m.group_scaling_enabled());
    if origin_scales_as_group {
        for sibling in core.scaling.siblings_of(&event.id) {
            match core.children.get(&sibling) {
                Some(target) if cx.node(*target).is_some_and(|m| m.is_group()) => {
                    effects.push(Effect::ScaleChild {
                        target: *target,
                        event: event.clone(),
                    });
                }
                Some(_) => {}
                None => warn!(
                    monitor = %core.component,
                    sibling = %sibling,
                    "scaling sibling has no monitor; skipped"
                ),
            }
        }
    }
    effects
}

/// 親からのスケーリング要求をそのまま子へ流す
pub(super) fn forward_scaling_to_children(
    core: &MonitorCore,
    event: &MonitorScalingEvent,
) -> Vec<Effect> {
    core.children
        .values()
        .map(|target| Effect::ScaleChild {
            target: *target,
            event: event.clone(),
        })
        .collect()
}
