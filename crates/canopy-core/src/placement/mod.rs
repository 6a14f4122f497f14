//! Placement - パーティション配置アルゴリズム
//!
//! # 設計原則
//! - アルゴリズムは strategy（`PartitionAlgorithm`）で、タイブレークや公平性は全てここが持つ
//! - 名前での解決は閉じたレジストリ（`AlgorithmRegistry`）で行い、起動時に検証する
//! - モニタは候補リストを渡して 1 つ選んでもらうだけ

pub mod context;
pub mod one_after_another;
pub mod round_robin;

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::PlacementError;

pub use self::context::{NetworkPartitionContext, PartitionContext, PlacedInstance};
pub use self::one_after_another::OneAfterAnother;
pub use self::round_robin::RoundRobin;

/// PartitionAlgorithm は配置候補から 1 つを選ぶ
pub trait PartitionAlgorithm: Send + Sync {
    /// 設定で使う名前（例: "round-robin"）
    fn name(&self) -> &'static str;

    /// Index of the selected candidate, or None when no candidate can take an instance.
    fn select(&self, candidates: &[&PartitionContext]) -> Option<usize>;
}

/// RegistryError は AlgorithmRegistry の登録エラー
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("partition algorithm '{0}' is already registered")]
    AlreadyRegistered(String),
}

/// AlgorithmRegistry は名前 → アルゴリズムの閉じた対応表
///
/// # 使用例
/// ```ignore
/// let registry = AlgorithmRegistry::with_defaults();
/// let algorithm = registry.resolve("round-robin")?;
/// ```
#[derive(Clone)]
pub struct AlgorithmRegistry {
    algorithms: HashMap<&'static str, Arc<dyn PartitionAlgorithm>>,
}

impl AlgorithmRegistry {
    pub fn new() -> Self {
        Self {
            algorithms: HashMap::new(),
        }
    }

    /// round-robin と one-after-another を登録済みのレジストリ
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.algorithms.insert(RoundRobin.name(), Arc::new(RoundRobin));
        registry
            .algorithms
            .insert(OneAfterAnother.name(), Arc::new(OneAfterAnother));
        registry
    }

    pub fn register(&mut self, algorithm: Arc<dyn PartitionAlgorithm>) -> Result<(), RegistryError> {
        let name = algorithm.name();
        if self.algorithms.contains_key(name) {
            return Err(RegistryError::AlreadyRegistered(name.to_string()));
        }
        self.algorithms.insert(name, algorithm);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn PartitionAlgorithm>, PlacementError> {
        self.algorithms
            .get(name)
            .cloned()
            .ok_or_else(|| PlacementError::UnknownAlgorithm(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.algorithms.contains_key(name)
    }

    pub fn registered_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.algorithms.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FirstOnly;

    impl PartitionAlgorithm for FirstOnly {
        fn name(&self) -> &'static str {
            "first-only"
        }

        fn select(&self, candidates: &[&PartitionContext]) -> Option<usize> {
            (!candidates.is_empty()).then_some(0)
        }
    }

    #[test]
    fn defaults_resolve_by_name() {
        let registry = AlgorithmRegistry::with_defaults();
        assert_eq!(registry.registered_names(), vec!["one-after-another", "round-robin"]);
        assert_eq!(registry.resolve("round-robin").unwrap().name(), "round-robin");
        assert!(matches!(
            registry.resolve("random"),
            Err(PlacementError::UnknownAlgorithm(name)) if name == "random"
        ));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = AlgorithmRegistry::new();
        registry.register(Arc::new(FirstOnly)).unwrap();
        assert!(registry.contains("first-only"));
        assert!(matches!(
            registry.register(Arc::new(FirstOnly)),
            Err(RegistryError::AlreadyRegistered(_))
        ));
    }
}
