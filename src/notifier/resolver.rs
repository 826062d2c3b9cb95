use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::messages;
use crate::db::{DatabaseError, Standuper, Stores};

/// Non-reporters of one channel for one window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissList {
    /// Number of distinct standupers assigned to the channel.
    pub assigned: usize,
    /// Standupers without a submission, in assignment order.
    pub missing: Vec<Standuper>,
}

impl MissList {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn mentions(&self) -> Vec<String> {
        self.missing
            .iter()
            .map(|standuper| messages::mention(&standuper.user_id))
            .collect()
    }
}

/// Assigned minus submitted, keeping the assigned order. A user listed twice
/// is reported once.
pub fn missing_standupers(assigned: &[Standuper], submitted: &[String]) -> MissList {
    let submitted: HashSet<&str> = submitted.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    let mut result = MissList::default();

    for standuper in assigned {
        if !seen.insert(standuper.user_id.as_str()) {
            continue;
        }
        result.assigned += 1;
        if !submitted.contains(standuper.user_id.as_str()) {
            result.missing.push(standuper.clone());
        }
    }

    result
}

#[derive(Clone)]
pub struct NonReporterResolver {
    stores: Stores,
}

impl NonReporterResolver {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    /// Errors are returned rather than read as "everyone reported".
    pub async fn resolve(
        &self,
        channel_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<MissList, DatabaseError> {
        let assigned = self
            .stores
            .standupers
            .list_standupers(channel_id)
            .await
            .inspect_err(|err| {
                warn!(channel_id = %channel_id, "failed to list standupers: {}", err)
            })?;

        if assigned.is_empty() {
            return Ok(MissList::default());
        }

        let submitted = self
            .stores
            .standups
            .list_submitters_in_window(channel_id, window_start, window_end)
            .await
            .inspect_err(|err| {
                warn!(channel_id = %channel_id, "failed to list submitters: {}", err)
            })?;

        let result = missing_standupers(&assigned, &submitted);
        debug!(
            channel_id = %channel_id,
            assigned = result.assigned,
            missing = result.missing.len(),
            "resolved non-reporters"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{NonReporterResolver, missing_standupers};
    use crate::notifier::testing::{FakeStore, standuper};

    fn ids(list: &super::MissList) -> Vec<&str> {
        list.missing.iter().map(|s| s.user_id.as_str()).collect()
    }

    #[test]
    fn difference_keeps_assignment_order() {
        let assigned = vec![
            standuper("UC", "C1"),
            standuper("UA", "C1"),
            standuper("UB", "C1"),
        ];
        let result = missing_standupers(&assigned, &["UA".to_string()]);

        assert_eq!(result.assigned, 3);
        assert_eq!(ids(&result), vec!["UC", "UB"]);
        assert_eq!(result.mentions(), vec!["<@UC>", "<@UB>"]);
    }

    #[test]
    fn empty_assignment_is_always_compliant() {
        let result = missing_standupers(&[], &["UA".to_string(), "UZ".to_string()]);
        assert!(result.is_empty());
        assert_eq!(result.assigned, 0);
    }

    #[test]
    fn submitters_outside_assignment_are_ignored() {
        let assigned = vec![standuper("UA", "C1")];
        let result = missing_standupers(&assigned, &["UA".to_string(), "UX".to_string()]);
        assert!(result.is_empty());
        assert_eq!(result.assigned, 1);
    }

    #[test]
    fn duplicate_memberships_are_reported_once() {
        let assigned = vec![standuper("UA", "C1"), standuper("UA", "C1")];
        let result = missing_standupers(&assigned, &[]);
        assert_eq!(result.assigned, 1);
        assert_eq!(ids(&result), vec!["UA"]);
    }

    #[tokio::test]
    async fn resolve_uses_the_window() {
        let store = FakeStore::default();
        store.add_standuper("UA", "C1");
        store.add_standuper("UB", "C1");
        let day = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        store.add_standup("UA", "C1", day + Duration::hours(9));
        store.add_standup("UB", "C1", day - Duration::hours(1));

        let resolver = NonReporterResolver::new(store.stores());
        let result = resolver
            .resolve("C1", day, day + Duration::hours(24))
            .await
            .expect("resolve");

        assert_eq!(ids(&result), vec!["UB"]);
    }

    #[tokio::test]
    async fn resolve_propagates_store_errors() {
        let store = FakeStore::default();
        store.add_standuper("UA", "C1");
        store.fail_channel("C1");

        let resolver = NonReporterResolver::new(store.stores());
        let day = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();

        assert!(
            resolver
                .resolve("C1", day, day + Duration::hours(24))
                .await
                .is_err()
        );
    }
}
