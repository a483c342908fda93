//! Deterministic A/B variant assignment.

use crate::VariantSelector;
use async_trait::async_trait;
use futureself_core::{ExperimentConfig, LetterResult, SubjectId, Variant};
use sha2::{Digest, Sha256};

/// Buckets subjects into variants by hashing `{experiment}:{subject}`.
///
/// The same subject always lands in the same arm of a given experiment.
#[derive(Debug, Clone)]
pub struct HashSplitSelector {
    variants: Vec<Variant>,
}

impl HashSplitSelector {
    pub fn new(variants: Vec<Variant>) -> Self {
        Self { variants }
    }

    pub fn from_config(config: &ExperimentConfig) -> Self {
        Self::new(config.variants.clone())
    }

    fn bucket(&self, experiment: &str, subject_id: SubjectId) -> Option<usize> {
        if self.variants.is_empty() {
            return None;
        }
        let digest = Sha256::digest(format!("{experiment}:{subject_id}").as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        Some((u64::from_be_bytes(prefix) % self.variants.len() as u64) as usize)
    }
}

#[async_trait]
impl VariantSelector for HashSplitSelector {
    async fn select_variant(
        &self,
        experiment: &str,
        subject_id: SubjectId,
    ) -> LetterResult<Option<Variant>> {
        Ok(self
            .bucket(experiment, subject_id)
            .and_then(|idx| self.variants.get(idx).cloned()))
    }
}
