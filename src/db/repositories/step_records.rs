use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

use crate::{
    db::{
        helpers::{format_date, to_i64},
        Database,
    },
    log_warn,
    models::StepRecord,
};

const ENABLE_LOGS: bool = true;

fn decode_payload(payload: &str) -> Result<StepRecord> {
    serde_json::from_str(payload).context("failed to decode step record payload")
}

impl Database {
    /// Insert or replace the record for its date.
    pub async fn upsert_step_record(&self, record: &StepRecord) -> Result<()> {
        let date = format_date(record.date);
        let steps = to_i64(record.steps)?;
        let updated_at = record.last_updated.to_rfc3339();
        let payload = serde_json::to_string(record).context("failed to encode step record")?;

        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO step_records (date, payload, steps, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(date) DO UPDATE SET
                     payload = excluded.payload,
                     steps = excluded.steps,
                     updated_at = excluded.updated_at",
                params![date, payload, steps, updated_at],
            )
            .context("failed to upsert step record")?;
            Ok(())
        })
        .await
    }

    pub async fn get_step_record(&self, date: NaiveDate) -> Result<Option<StepRecord>> {
        let key = format_date(date);
        self.execute(move |conn| {
            let payload: Option<String> = conn
                .query_row(
                    "SELECT payload FROM step_records WHERE date = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;

            payload.map(|raw| decode_payload(&raw)).transpose()
        })
        .await
    }

    /// Records in `[start, end]`, ordered by date. Rows that fail to decode
    /// are skipped.
    pub async fn get_step_records_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<StepRecord>> {
        let start = format_date(start);
        let end = format_date(end);
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT date, payload FROM step_records
                 WHERE date >= ?1 AND date <= ?2
                 ORDER BY date ASC",
            )?;

            let mut rows = stmt.query(params![start, end])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                let date: String = row.get(0)?;
                let payload: String = row.get(1)?;
                match decode_payload(&payload) {
                    Ok(record) => records.push(record),
                    Err(err) => log_warn!("skipping unreadable cached record for {date}: {err:#}"),
                }
            }
            Ok(records)
        })
        .await
    }

    /// Wipe every cached record. Returns the number of rows removed.
    pub async fn delete_all_step_records(&self) -> Result<usize> {
        self.execute(|conn| {
            let removed = conn
                .execute("DELETE FROM step_records", [])
                .context("failed to clear step records")?;
            Ok(removed)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StepSource;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    fn record(day: u32, steps: u64) -> StepRecord {
        let mut hourly = [0; 24];
        hourly[9] = steps;
        StepRecord::with_steps(date(day), steps, hourly, 10_000, StepSource::Device)
    }

    #[tokio::test]
    async fn upsert_replaces_existing_date() {
        let db = Database::in_memory().unwrap();
        db.upsert_step_record(&record(3, 100)).await.unwrap();
        db.upsert_step_record(&record(3, 450)).await.unwrap();

        let stored = db.get_step_record(date(3)).await.unwrap().unwrap();
        assert_eq!(stored.steps, 450);
        assert_eq!(stored.hourly_data[9], 450);
        assert_eq!(db.get_step_records_in_range(date(1), date(30)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_date_is_none() {
        let db = Database::in_memory().unwrap();
        assert!(db.get_step_record(date(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn range_is_inclusive_and_ordered() {
        let db = Database::in_memory().unwrap();
        for (day, steps) in [(9, 900), (2, 200), (5, 500), (12, 1200)] {
            db.upsert_step_record(&record(day, steps)).await.unwrap();
        }

        let found = db.get_step_records_in_range(date(2), date(9)).await.unwrap();
        let days: Vec<u64> = found.iter().map(|r| r.steps).collect();
        assert_eq!(days, vec![200, 500, 900]);
    }

    #[tokio::test]
    async fn corrupt_rows_are_skipped_in_ranges() {
        let db = Database::in_memory().unwrap();
        db.upsert_step_record(&record(4, 400)).await.unwrap();
        db.execute(|conn| {
            conn.execute(
                "INSERT INTO step_records (date, payload, steps, updated_at)
                 VALUES ('2024-06-05', '{not json', 0, '2024-06-05T00:00:00Z')",
                [],
            )?;
            Ok(())
        })
        .await
        .unwrap();

        let found = db.get_step_records_in_range(date(1), date(30)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(db.get_step_record(date(5)).await.is_err());
    }

    #[tokio::test]
    async fn delete_all_reports_removed_rows() {
        let db = Database::in_memory().unwrap();
        db.upsert_step_record(&record(1, 10)).await.unwrap();
        db.upsert_step_record(&record(2, 20)).await.unwrap();
        assert_eq!(db.delete_all_step_records().await.unwrap(), 2);
        assert!(db.get_step_records_in_range(date(1), date(30)).await.unwrap().is_empty());
    }
}
