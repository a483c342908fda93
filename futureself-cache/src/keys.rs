//! Cache key layout.
//!
//! ```text
//! {namespace}:sim:{subject}               simulation (derived data)
//! {namespace}:letter:{subject}:{variant}  letter (expensive artifact)
//! {namespace}:cron:{job}                  job lock
//! {idempotency}:{subject}:{variant}       idempotency marker
//! {retry}:{subject}                       retry queue entry
//! ```

use futureself_core::{CacheConfig, SubjectId, Variant};

/// Builds every key the pipeline writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeys {
    namespace: String,
    idempotency_namespace: String,
    retry_namespace: String,
}

impl CacheKeys {
    pub fn new(
        namespace: impl Into<String>,
        idempotency_namespace: impl Into<String>,
        retry_namespace: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            idempotency_namespace: idempotency_namespace.into(),
            retry_namespace: retry_namespace.into(),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            config.namespace.clone(),
            config.idempotency_namespace.clone(),
            config.retry_namespace.clone(),
        )
    }

    pub fn simulation(&self, subject_id: SubjectId) -> String {
        format!("{}:sim:{}", self.namespace, subject_id)
    }

    pub fn letter(&self, subject_id: SubjectId, variant: &Variant) -> String {
        format!("{}:letter:{}:{}", self.namespace, subject_id, variant)
    }

    /// Glob matching a subject's letters under every variant.
    pub fn letter_pattern(&self, subject_id: SubjectId) -> String {
        format!("{}:letter:{}:*", self.namespace, subject_id)
    }

    pub fn idempotency(&self, subject_id: SubjectId, variant: &Variant) -> String {
        format!("{}:{}:{}", self.idempotency_namespace, subject_id, variant)
    }

    pub fn retry(&self, subject_id: SubjectId) -> String {
        format!("{}:{}", self.retry_namespace, subject_id)
    }

    /// Glob matching every retry entry.
    pub fn retry_pattern(&self) -> String {
        format!("{}:*", self.retry_namespace)
    }

    /// Subject of a retry entry key, if the key belongs to the retry namespace.
    pub fn retry_subject(&self, key: &str) -> Option<SubjectId> {
        key.strip_prefix(&self.retry_namespace)?
            .strip_prefix(':')?
            .parse()
            .ok()
    }

    pub fn job_lock(&self, job_name: &str) -> String {
        format!("{}:cron:{}", self.namespace, job_name)
    }
}

impl Default for CacheKeys {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futureself_core::EntityIdType;

    #[test]
    fn test_key_layout() {
        let keys = CacheKeys::new("fs", "fs:idem", "fs:retry");
        let subject_id = SubjectId::now_v7();
        let variant = Variant::new("direct");

        assert_eq!(keys.simulation(subject_id), format!("fs:sim:{subject_id}"));
        assert_eq!(
            keys.letter(subject_id, &variant),
            format!("fs:letter:{subject_id}:direct")
        );
        assert_eq!(
            keys.idempotency(subject_id, &variant),
            format!("fs:idem:{subject_id}:direct")
        );
        assert_eq!(keys.retry(subject_id), format!("fs:retry:{subject_id}"));
        assert_eq!(keys.job_lock("weekly-letters"), "fs:cron:weekly-letters");
        assert_eq!(
            keys.letter_pattern(subject_id),
            format!("fs:letter:{subject_id}:*")
        );
    }

    #[test]
    fn test_letter_keys_partitioned_by_variant() {
        let keys = CacheKeys::default();
        let subject_id = SubjectId::now_v7();
        assert_ne!(
            keys.letter(subject_id, &Variant::new("encouraging")),
            keys.letter(subject_id, &Variant::new("direct"))
        );
    }

    #[test]
    fn test_retry_subject_parses_own_keys_only() {
        let keys = CacheKeys::default();
        let subject_id = SubjectId::now_v7();
        assert_eq!(keys.retry_subject(&keys.retry(subject_id)), Some(subject_id));
        assert_eq!(keys.retry_subject(&keys.simulation(subject_id)), None);
        assert_eq!(keys.retry_subject("futureself:retry:garbage"), None);
    }
}
