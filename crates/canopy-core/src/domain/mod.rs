//! Domain layer - ドメインモデル
//!
//! 永続化・外部サービスに依存しない型だけを置きます。

pub mod application;
pub mod commands;
pub mod dependency;
pub mod errors;
pub mod events;
pub mod ids;
pub mod instance;
pub mod policy;
pub mod status;

pub use application::{Application, Applications, Children, ClusterDataHolder, Group};
pub use commands::LifecycleCommand;
pub use dependency::{DependencyTree, ScalingDependencyTree};
pub use errors::{
    ControllerError, ErrorKind, OrchestrationError, PlacementError, StoreError,
};
pub use events::{LifecycleEvent, MonitorScalingEvent, MonitorStatusEvent};
pub use ids::{
    ApplicationId, ClusterId, ComponentId, GroupId, InstanceId, NetworkPartitionId, PartitionId,
};
pub use instance::{ApplicationInstance, GroupInstance, Instance, InstanceContext};
pub use policy::{ApplicationPolicy, DeploymentPolicy, NetworkPartitionPolicy, PartitionPolicy};
pub use status::{ApplicationStatus, ClusterStatus, GroupStatus, Lifecycle, Status};
