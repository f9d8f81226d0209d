//! Record repository and pgvector candidate index.

use async_trait::async_trait;
use pgvector::Vector;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, QueryBuilder, Row};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use petmatch_core::{
    defaults, Candidate, CandidateIndex, ColorSignature, Error, GeoPoint, ListRecordsRequest,
    ListRecordsResponse, NewRecord, PetAttributes, Record, RecordRepository, RecordStatus, Result,
};

const RECORD_COLUMNS: &str = "id, status, image_urls, embedding, dominant_colors, \
     color_percentages, attributes, description, contact_info, lat, lng, last_seen_at, \
     pet_name, owner_name, reward, owner_id, created_at, updated_at";

/// PostgreSQL implementation of [`RecordRepository`] and [`CandidateIndex`].
#[derive(Clone)]
pub struct PgRecordRepository {
    pool: Pool<Postgres>,
}

impl PgRecordRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

/// Escape `%`, `_` and `\` for use inside an ILIKE pattern.
pub(crate) fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn record_from_row(row: &PgRow) -> Result<Record> {
    let status: String = row.get("status");
    let embedding: Option<Vector> = row.get("embedding");
    let dominant_colors: Option<JsonValue> = row.get("dominant_colors");
    let color_percentages: Option<JsonValue> = row.get("color_percentages");
    let attributes_json: JsonValue = row.get("attributes");
    let id: Uuid = row.get("id");

    let attributes = serde_json::from_value::<PetAttributes>(attributes_json).unwrap_or_else(|e| {
        warn!(
            subsystem = "db",
            component = "records",
            record_id = %id,
            error = %e,
            "Unreadable attributes column, treating as empty"
        );
        PetAttributes::default()
    });

    let lat: Option<f64> = row.get("lat");
    let lng: Option<f64> = row.get("lng");
    let location = match (lat, lng) {
        (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
        _ => None,
    };

    Ok(Record {
        id,
        status: status.parse()?,
        image_urls: row.get("image_urls"),
        embedding: embedding.map(|v| v.to_vec()),
        colors: ColorSignature::from_stored(dominant_colors.as_ref(), color_percentages.as_ref()),
        attributes,
        description: row.get("description"),
        contact_info: row.get("contact_info"),
        location,
        last_seen_at: row.get("last_seen_at"),
        pet_name: row.get("pet_name"),
        owner_name: row.get("owner_name"),
        reward: row.get("reward"),
        owner_id: row.get("owner_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, req: &ListRecordsRequest) {
    if let Some(status) = req.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(species) = req.species.as_deref().filter(|s| !s.trim().is_empty()) {
        qb.push(" AND attributes->>'species' ILIKE ")
            .push_bind(format!("%{}%", escape_like(species.trim())));
    }
    if let Some(text) = req.text.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = format!("%{}%", escape_like(text.trim()));
        qb.push(" AND (pet_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR attributes->>'color_main' ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait]
impl RecordRepository for PgRecordRepository {
    #[instrument(skip(self, record), fields(subsystem = "db", component = "records", op = "insert", record_id = %record.id))]
    async fn insert(&self, record: NewRecord) -> Result<Record> {
        record.attributes.validate()?;
        let attributes = serde_json::to_value(&record.attributes)?;
        let sql = format!(
            "INSERT INTO pet_record (id, status, image_urls, attributes, description, \
             contact_info, lat, lng, last_seen_at, pet_name, owner_name, reward, owner_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {}",
            RECORD_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(record.id)
            .bind(record.status.as_str())
            .bind(&record.image_urls)
            .bind(attributes)
            .bind(&record.description)
            .bind(&record.contact_info)
            .bind(record.location.map(|p| p.lat))
            .bind(record.location.map(|p| p.lng))
            .bind(record.last_seen_at)
            .bind(&record.pet_name)
            .bind(&record.owner_name)
            .bind(&record.reward)
            .bind(&record.owner_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        record_from_row(&row)
    }

    async fn get(&self, id: Uuid) -> Result<Record> {
        let sql = format!("SELECT {} FROM pet_record WHERE id = $1", RECORD_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
            .ok_or(Error::RecordNotFound(id))?;
        record_from_row(&row)
    }

    #[instrument(skip(self, embedding, colors), fields(subsystem = "db", component = "records", op = "attach_signature", record_id = %id))]
    async fn attach_signature(
        &self,
        id: Uuid,
        embedding: &[f32],
        colors: &ColorSignature,
    ) -> Result<()> {
        let (dominant_colors, color_percentages) = if colors.is_empty() {
            (None, None)
        } else {
            (Some(colors.colors_json()), Some(colors.weights_json()))
        };
        let result = sqlx::query(
            "UPDATE pet_record
             SET embedding = $2, dominant_colors = $3, color_percentages = $4, updated_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(Vector::from(embedding.to_vec()))
        .bind(dominant_colors)
        .bind(color_percentages)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::RecordNotFound(id));
        }
        Ok(())
    }

    async fn update_status(&self, id: Uuid, status: RecordStatus) -> Result<Record> {
        let sql = format!(
            "UPDATE pet_record SET status = $2, updated_at = now() WHERE id = $1 RETURNING {}",
            RECORD_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
            .ok_or(Error::RecordNotFound(id))?;
        record_from_row(&row)
    }

    async fn list(&self, req: ListRecordsRequest) -> Result<ListRecordsResponse> {
        let limit = req
            .limit
            .unwrap_or(defaults::PAGE_LIMIT)
            .clamp(1, defaults::PAGE_LIMIT_MAX);
        let offset = req.offset.unwrap_or(0).max(0);

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM pet_record WHERE TRUE");
        push_filters(&mut count, &req);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM pet_record WHERE TRUE",
            RECORD_COLUMNS
        ));
        push_filters(&mut qb, &req);
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        let records = rows.iter().map(record_from_row).collect::<Result<Vec<_>>>()?;

        Ok(ListRecordsResponse { records, total })
    }

    async fn list_missing_signature(&self, limit: i64) -> Result<Vec<Record>> {
        let sql = format!(
            "SELECT {} FROM pet_record
             WHERE embedding IS NULL AND cardinality(image_urls) > 0
             ORDER BY created_at
             LIMIT $1",
            RECORD_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        rows.iter().map(record_from_row).collect()
    }
}

#[async_trait]
impl CandidateIndex for PgRecordRepository {
    #[instrument(skip(self, embedding), fields(subsystem = "db", component = "records", op = "query", status = %status))]
    async fn query(
        &self,
        embedding: &[f32],
        status: RecordStatus,
        floor: f32,
        limit: i64,
    ) -> Result<Vec<Candidate>> {
        let sql = format!(
            "SELECT {}, 1.0 - (embedding <=> $1::vector) AS similarity
             FROM pet_record
             WHERE status = $2
               AND embedding IS NOT NULL
               AND 1.0 - (embedding <=> $1::vector) >= $3
             ORDER BY embedding <=> $1::vector
             LIMIT $4",
            RECORD_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(Vector::from(embedding.to_vec()))
            .bind(status.as_str())
            .bind(floor as f64)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        let candidates = rows
            .iter()
            .map(|row| {
                let similarity: f64 = row.get("similarity");
                Ok(Candidate {
                    record: record_from_row(row)?,
                    similarity: (similarity as f32).clamp(0.0, 1.0),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(candidate_count = candidates.len(), "Candidate index query complete");
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("tabby"), "tabby");
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a_b\\c"), "a\\_b\\\\c");
    }

    #[test]
    fn test_filters_bind_only_supplied_fields() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 WHERE TRUE");
        push_filters(&mut qb, &ListRecordsRequest::default());
        assert_eq!(qb.sql(), "SELECT 1 WHERE TRUE");

        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 WHERE TRUE");
        push_filters(
            &mut qb,
            &ListRecordsRequest {
                status: Some(RecordStatus::Lost),
                species: Some("cat".into()),
                text: Some("  ".into()),
                ..Default::default()
            },
        );
        let sql = qb.sql();
        assert!(sql.contains("status = $1"));
        assert!(sql.contains("attributes->>'species' ILIKE $2"));
        assert!(!sql.contains("pet_name"));
    }
}
