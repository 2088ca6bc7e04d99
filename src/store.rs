use std::path::Path;

use anyhow::{Context, Result};
use geo::BoundingRect;
use geo_types::Geometry;
use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags, params_from_iter};
use tracing::debug;

use crate::config::AttributeType;
use crate::error::{TileError, TileResult};
use crate::registry::{FeatureCollection, Registry};
use crate::tiles::query::{LayerQuery, quote};

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub id: i64,
    pub geometry: Geometry<f64>,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewFeature {
    pub id: Option<i64>,
    pub geometry: Geometry<f64>,
    pub values: Vec<Value>,
}

pub struct SpatialStore {
    conn: Connection,
}

impl SpatialStore {
    pub fn create(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open spatial store: {}", path.display()))?;
        Ok(Self { conn })
    }

    pub fn open_readonly(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("failed to open spatial store: {}", path.display()))?;
        apply_read_pragmas(&conn)?;
        Ok(Self { conn })
    }

    pub fn ensure_schema(&self, registry: &Registry) -> Result<()> {
        for collection in registry.collections() {
            self.ensure_collection(collection)?;
        }
        Ok(())
    }

    pub fn ensure_collection(&self, collection: &FeatureCollection) -> Result<()> {
        let mut columns = vec![
            "id INTEGER PRIMARY KEY".to_string(),
            format!("{} TEXT NOT NULL", quote(&collection.geometry_column)),
        ];
        columns.extend(
            collection
                .attributes
                .iter()
                .map(|attr| format!("{} {}", quote(&attr.name), sql_type(attr.kind))),
        );
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} ({});
             CREATE VIRTUAL TABLE IF NOT EXISTS {} USING rtree(id, minx, maxx, miny, maxy);",
            quote(&collection.name),
            columns.join(", "),
            quote(&collection.index_table()),
        );
        self.conn
            .execute_batch(&ddl)
            .with_context(|| format!("failed to create schema for {}", collection.name))?;
        Ok(())
    }

    pub fn insert_features(
        &mut self,
        collection: &FeatureCollection,
        features: &[NewFeature],
    ) -> Result<usize> {
        let mut names = vec!["id".to_string(), quote(&collection.geometry_column)];
        names.extend(collection.attributes.iter().map(|attr| quote(&attr.name)));
        let placeholders = vec!["?"; names.len()].join(", ");
        let insert_feature = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(&collection.name),
            names.join(", "),
            placeholders
        );
        let insert_index = format!(
            "INSERT INTO {} (id, minx, maxx, miny, maxy) VALUES (?1, ?2, ?3, ?4, ?5)",
            quote(&collection.index_table())
        );

        let tx = self.conn.transaction().context("begin load transaction")?;
        let mut written = 0usize;
        {
            let mut feature_stmt = tx
                .prepare(&insert_feature)
                .context("prepare feature insert")?;
            let mut index_stmt = tx.prepare(&insert_index).context("prepare index insert")?;
            for feature in features {
                if feature.values.len() != collection.attributes.len() {
                    anyhow::bail!(
                        "feature has {} values but {} declares {} attributes",
                        feature.values.len(),
                        collection.name,
                        collection.attributes.len()
                    );
                }
                let Some(envelope) = feature.geometry.bounding_rect() else {
                    debug!(collection = %collection.name, "skipping empty geometry");
                    continue;
                };
                let geometry = geometry_to_text(&feature.geometry)?;
                let mut row = Vec::with_capacity(names.len());
                row.push(feature.id.map_or(Value::Null, Value::Integer));
                row.push(Value::Text(geometry));
                row.extend(feature.values.iter().cloned());
                feature_stmt
                    .execute(params_from_iter(row.iter()))
                    .with_context(|| format!("insert feature into {}", collection.name))?;
                let id = tx.last_insert_rowid();
                index_stmt
                    .execute(rusqlite::params![
                        id,
                        envelope.min().x,
                        envelope.max().x,
                        envelope.min().y,
                        envelope.max().y
                    ])
                    .with_context(|| format!("index feature {id} of {}", collection.name))?;
                written += 1;
            }
        }
        tx.commit().context("commit load transaction")?;
        Ok(written)
    }

    pub fn feature_count(&self, collection: &FeatureCollection) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote(&collection.name));
        let count: i64 = self
            .conn
            .query_row(&sql, [], |row| row.get(0))
            .with_context(|| format!("count features of {}", collection.name))?;
        Ok(count as u64)
    }

    // Runs a layer query. Rows come back ordered by id.
    pub fn fetch(&self, query: &LayerQuery) -> TileResult<Vec<FeatureRow>> {
        let mut stmt = self.conn.prepare_cached(&query.sql)?;
        let width = query.columns.len();
        let mut rows = stmt.query(params_from_iter(query.params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let text: String = row.get(1)?;
            let geometry = geometry_from_text(&text).map_err(|err| {
                TileError::Store(format!("feature {id} of {}: {err}", query.layer))
            })?;
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                values.push(row.get::<_, Value>(idx + 2)?);
            }
            out.push(FeatureRow {
                id,
                geometry,
                values,
            });
        }
        Ok(out)
    }
}

fn apply_read_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA query_only = ON;
        PRAGMA temp_store = MEMORY;
        PRAGMA cache_size = -20000;
        ",
    )
    .context("failed to apply read pragmas")?;
    Ok(())
}

fn sql_type(kind: AttributeType) -> &'static str {
    match kind {
        AttributeType::Integer | AttributeType::Boolean => "INTEGER",
        AttributeType::Float => "REAL",
        AttributeType::Text => "TEXT",
    }
}

pub fn geometry_to_text(geometry: &Geometry<f64>) -> Result<String> {
    let value = geojson::Geometry::new(geojson::Value::from(geometry));
    serde_json::to_string(&value).context("serialize geometry")
}

pub fn geometry_from_text(text: &str) -> Result<Geometry<f64>, String> {
    let parsed: geojson::Geometry =
        serde_json::from_str(text).map_err(|err| format!("invalid GeoJSON geometry: {err}"))?;
    Geometry::<f64>::try_from(parsed.value).map_err(|err| format!("unsupported geometry: {err}"))
}
