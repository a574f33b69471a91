/// Sequential identifiers
///
/// Human-readable identifiers of the form `PREFIX-PERIOD-NNNNN` (invoice
/// numbers, appointment request references). The counter restarts at 1 for
/// every period and is kept in an explicit per-(prefix, period) counter row.
///
/// Generation does not lock: the unique constraint on the column that stores
/// the identifier is the backstop, and a collision surfaces as
/// `DatabaseError::DuplicateIdentifier` for the caller to retry.

use std::sync::Arc;

use crate::clock::Clock;
use crate::error::AppError;
use crate::storage::IdentifierRepository;

/// Zero-padded width of the counter
pub const SEQUENCE_WIDTH: usize = 5;

/// Attempts a caller makes before giving up on a colliding identifier
pub const MAX_IDENTIFIER_ATTEMPTS: usize = 3;

pub fn format_identifier(prefix: &str, period_key: &str, sequence: u32) -> String {
    format!("{}-{}-{:0width$}", prefix, period_key, sequence, width = SEQUENCE_WIDTH)
}

/// Trailing counter of `identifier` if it belongs to `prefix` and `period_key`.
pub fn parse_sequence(identifier: &str, prefix: &str, period_key: &str) -> Option<u32> {
    let digits = identifier
        .strip_prefix(prefix)?
        .strip_prefix('-')?
        .strip_prefix(period_key)?
        .strip_prefix('-')?;

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// `PREFIX-PERIOD-` part shared by every identifier of the period
pub fn period_prefix(prefix: &str, period_key: &str) -> String {
    format!("{}-{}-", prefix, period_key)
}

#[derive(Clone)]
pub struct IdentifierGenerator {
    repository: Arc<dyn IdentifierRepository>,
    clock: Arc<dyn Clock>,
}

impl IdentifierGenerator {
    pub fn new(repository: Arc<dyn IdentifierRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Next identifier for the period, starting at `PREFIX-PERIOD-00001`.
    pub async fn next(&self, prefix: &str, period_key: &str) -> Result<String, AppError> {
        let sequence = self.repository.increment_counter(prefix, period_key).await?;
        Ok(format_identifier(prefix, period_key, sequence))
    }

    /// Period key for "now": the calendar year.
    pub fn current_period(&self) -> String {
        self.clock.current_year().to_string()
    }

    pub async fn next_for_current_year(&self, prefix: &str) -> Result<String, AppError> {
        self.next(prefix, &self.current_period()).await
    }

    /// Move the counter past an identifier that already exists, e.g. one
    /// issued before the counter row existed. Identifiers of another prefix
    /// or period are ignored.
    pub async fn resync(&self, prefix: &str, period_key: &str, highest_issued: &str) -> Result<(), AppError> {
        match parse_sequence(highest_issued, prefix, period_key) {
            Some(sequence) => {
                tracing::warn!(
                    prefix = prefix,
                    period = period_key,
                    sequence = sequence,
                    "Identifier counter behind issued identifiers, resyncing"
                );
                self.repository.raise_counter(prefix, period_key, sequence).await
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::storage::MemoryStorage;
    use chrono::{TimeZone, Utc};

    fn generator() -> (IdentifierGenerator, MockClock) {
        let clock = MockClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap());
        let generator = IdentifierGenerator::new(Arc::new(MemoryStorage::new()), Arc::new(clock.clone()));
        (generator, clock)
    }

    #[test]
    fn test_format_identifier() {
        assert_eq!(format_identifier("INV", "2025", 1), "INV-2025-00001");
        assert_eq!(format_identifier("INV", "2025", 12345), "INV-2025-12345");
        assert_eq!(format_identifier("INV", "2025", 123456), "INV-2025-123456");
    }

    #[test]
    fn test_parse_sequence() {
        assert_eq!(parse_sequence("INV-2025-00042", "INV", "2025"), Some(42));
        assert_eq!(parse_sequence("INV-2024-00042", "INV", "2025"), None);
        assert_eq!(parse_sequence("APT-2025-00042", "INV", "2025"), None);
        assert_eq!(parse_sequence("INV-2025-", "INV", "2025"), None);
        assert_eq!(parse_sequence("INV-2025-00a42", "INV", "2025"), None);
    }

    #[tokio::test]
    async fn test_sequence_within_period() {
        let (generator, _) = generator();

        assert_eq!(generator.next("PREFIX", "2025").await.unwrap(), "PREFIX-2025-00001");
        assert_eq!(generator.next("PREFIX", "2025").await.unwrap(), "PREFIX-2025-00002");
    }

    #[tokio::test]
    async fn test_new_period_restarts_counter() {
        let (generator, _) = generator();
        for _ in 0..3 {
            generator.next("PREFIX", "2025").await.unwrap();
        }

        assert_eq!(generator.next("PREFIX", "2026").await.unwrap(), "PREFIX-2026-00001");
        assert_eq!(generator.next("PREFIX", "2025").await.unwrap(), "PREFIX-2025-00004");
    }

    #[tokio::test]
    async fn test_prefixes_are_independent() {
        let (generator, _) = generator();
        generator.next("INV", "2025").await.unwrap();

        assert_eq!(generator.next("APT", "2025").await.unwrap(), "APT-2025-00001");
    }

    #[tokio::test]
    async fn test_current_year_follows_clock() {
        let (generator, clock) = generator();
        assert_eq!(generator.next_for_current_year("INV").await.unwrap(), "INV-2025-00001");

        clock.set(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(generator.next_for_current_year("INV").await.unwrap(), "INV-2026-00001");
    }

    #[tokio::test]
    async fn test_resync_skips_past_existing_identifiers() {
        let (generator, _) = generator();
        generator.resync("INV", "2025", "INV-2025-00041").await.unwrap();
        assert_eq!(generator.next("INV", "2025").await.unwrap(), "INV-2025-00042");

        // never moves backwards
        generator.resync("INV", "2025", "INV-2025-00007").await.unwrap();
        assert_eq!(generator.next("INV", "2025").await.unwrap(), "INV-2025-00043");
    }
}
