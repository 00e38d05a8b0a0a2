//! Prediction model - the append-only prediction log

use serde::Serialize;
use serde_json::Value;
use sqlx::{FromRow, Row, SqlitePool};

use crate::model::encoder::{value_label, RawRecord};
use crate::model::inference::round2;
use crate::model::{Label, Verdict};

/// Upper bound for `recent`
pub const RECENT_LIMIT: i64 = 20;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct PredictionRecord {
    pub id: i64,
    pub timestamp: String,
    pub prediction: String,
    pub confidence: f64,
    pub protocol: String,
    pub service: String,
    pub flag: String,
    pub src_bytes: i64,
    pub dst_bytes: i64,
}

/// Row to append, before the store assigns an id
#[derive(Debug, Clone)]
pub struct NewPrediction {
    pub timestamp: String,
    pub prediction: Label,
    pub confidence: f64,
    pub protocol: String,
    pub service: String,
    pub flag: String,
    pub src_bytes: i64,
    pub dst_bytes: i64,
}

impl NewPrediction {
    /// Summarize a request record and its verdict, stamped with the current local time
    pub fn from_request(record: &RawRecord, verdict: &Verdict) -> Self {
        Self {
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
            prediction: verdict.label,
            confidence: round2(verdict.confidence),
            protocol: text_field(record, "protocol_type"),
            service: text_field(record, "service"),
            flag: text_field(record, "flag"),
            src_bytes: byte_field(record, "src_bytes"),
            dst_bytes: byte_field(record, "dst_bytes"),
        }
    }
}

fn text_field(record: &RawRecord, key: &str) -> String {
    record
        .get(key)
        .and_then(value_label)
        .unwrap_or_else(|| "unknown".to_string())
}

fn byte_field(record: &RawRecord, key: &str) -> i64 {
    match record.get(key) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
                .unwrap_or(0)
        }
        _ => 0,
    }
}

/// Aggregate counts over the whole log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionStats {
    pub total: i64,
    pub attacks: i64,
    pub normal: i64,
    pub attack_rate: f64,
}

impl PredictionStats {
    pub fn new(total: i64, attacks: i64, normal: i64) -> Self {
        let attack_rate = if total > 0 {
            round2(attacks as f64 / total as f64 * 100.0)
        } else {
            0.0
        };

        Self { total, attacks, normal, attack_rate }
    }
}

impl PredictionRecord {
    /// Append a prediction in its own transaction
    pub async fn record(pool: &SqlitePool, data: NewPrediction) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let id = sqlx::query(
            r#"
            INSERT INTO predictions (timestamp, prediction, confidence, protocol, service, flag, src_bytes, dst_bytes)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(&data.timestamp)
        .bind(data.prediction.as_str())
        .bind(data.confidence)
        .bind(&data.protocol)
        .bind(&data.service)
        .bind(&data.flag)
        .bind(data.src_bytes)
        .bind(data.dst_bytes)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        tx.commit().await?;

        Ok(Self {
            id,
            timestamp: data.timestamp,
            prediction: data.prediction.as_str().to_string(),
            confidence: data.confidence,
            protocol: data.protocol,
            service: data.service,
            flag: data.flag,
            src_bytes: data.src_bytes,
            dst_bytes: data.dst_bytes,
        })
    }

    /// Most recent predictions, newest first; `limit` is clamped to 1..=20
    pub async fn recent(pool: &SqlitePool, limit: i64) -> Result<Vec<Self>, sqlx::Error> {
        let limit = limit.clamp(1, RECENT_LIMIT);

        sqlx::query_as::<_, PredictionRecord>(
            r#"
            SELECT * FROM predictions
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#
        )
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    pub async fn aggregate(pool: &SqlitePool) -> Result<PredictionStats, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE prediction = 'Attack') AS attacks,
                COUNT(*) FILTER (WHERE prediction = 'Normal') AS normal
            FROM predictions
            "#
        )
        .fetch_one(pool)
        .await?;

        Ok(PredictionStats::new(
            row.get("total"),
            row.get("attacks"),
            row.get("normal"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use serde_json::json;

    async fn test_pool() -> (tempfile::TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("test.db").display());
        let pool = db::create_pool(&url).await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        (dir, pool)
    }

    fn entry(timestamp: &str, label: Label) -> NewPrediction {
        NewPrediction {
            timestamp: timestamp.to_string(),
            prediction: label,
            confidence: 88.5,
            protocol: "tcp".to_string(),
            service: "http".to_string(),
            flag: "SF".to_string(),
            src_bytes: 10,
            dst_bytes: 20,
        }
    }

    #[tokio::test]
    async fn test_record_assigns_increasing_ids() {
        let (_dir, pool) = test_pool().await;

        let first = PredictionRecord::record(&pool, entry("2024-01-01 00:00:00", Label::Attack)).await.unwrap();
        let second = PredictionRecord::record(&pool, entry("2024-01-01 00:00:00", Label::Normal)).await.unwrap();

        assert!(second.id > first.id);
        assert_eq!(first.prediction, "Attack");
    }

    #[tokio::test]
    async fn test_empty_stats_no_division() {
        let (_dir, pool) = test_pool().await;

        let stats = PredictionRecord::aggregate(&pool).await.unwrap();
        assert_eq!(stats, PredictionStats { total: 0, attacks: 0, normal: 0, attack_rate: 0.0 });
    }

    #[tokio::test]
    async fn test_stats_attack_rate() {
        let (_dir, pool) = test_pool().await;

        for i in 0..10 {
            let label = if i < 3 { Label::Attack } else { Label::Normal };
            PredictionRecord::record(&pool, entry("2024-01-01 00:00:00", label)).await.unwrap();
        }

        let stats = PredictionRecord::aggregate(&pool).await.unwrap();
        assert_eq!(stats.total, 10);
        assert_eq!(stats.attacks, 3);
        assert_eq!(stats.normal, 7);
        assert_eq!(stats.attack_rate, 30.0);

        // Reads do not change anything
        assert_eq!(PredictionRecord::aggregate(&pool).await.unwrap(), stats);
    }

    #[tokio::test]
    async fn test_recent_order_and_limit() {
        let (_dir, pool) = test_pool().await;

        for i in 0..25 {
            // Two rows per second so ties need the id tiebreak
            let ts = format!("2024-01-01 00:00:{:02}", i / 2);
            PredictionRecord::record(&pool, entry(&ts, Label::Normal)).await.unwrap();
        }
        PredictionRecord::record(&pool, entry("2023-12-31 23:59:59", Label::Attack)).await.unwrap();

        let recent = PredictionRecord::recent(&pool, RECENT_LIMIT).await.unwrap();
        assert_eq!(recent.len(), 20);
        assert_eq!(recent[0].timestamp, "2024-01-01 00:00:12");
        for pair in recent.windows(2) {
            assert!(
                (pair[0].timestamp.as_str(), pair[0].id) > (pair[1].timestamp.as_str(), pair[1].id),
                "not newest-first: {:?} then {:?}",
                pair[0],
                pair[1]
            );
        }

        let capped = PredictionRecord::recent(&pool, 500).await.unwrap();
        assert_eq!(capped.len(), 20);
        assert_eq!(PredictionRecord::recent(&pool, 3).await.unwrap().len(), 3);
    }

    #[test]
    fn test_summary_defaults() {
        let record = json!({ "service": "http", "src_bytes": "512", "dst_bytes": 12.9 })
            .as_object()
            .cloned()
            .unwrap();
        let verdict = Verdict { label: Label::Normal, confidence: 71.234 };

        let row = NewPrediction::from_request(&record, &verdict);
        assert_eq!(row.protocol, "unknown");
        assert_eq!(row.service, "http");
        assert_eq!(row.flag, "unknown");
        assert_eq!(row.src_bytes, 512);
        assert_eq!(row.dst_bytes, 12);
        assert_eq!(row.confidence, 71.23);
        assert_eq!(row.timestamp.len(), 19);
    }
}
