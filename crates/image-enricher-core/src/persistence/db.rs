use chrono::Utc;
use log::{info, warn};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, ToSql};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::error::{PersistenceError, PersistenceResult};
use super::models::{
    analysis_from_row, asset_from_row, category_at, exif_from_row, tag_from_row, AssetFilter,
    CollectionStats, LocationCount, TagCount, ANALYSIS_COLUMNS, ASSET_COLUMNS, EXIF_COLUMNS,
};
use crate::logging::log_db_modification;
use crate::types::{
    AnalysisRecord, ExifRecord, ImageAsset, MissingKind, NewAsset, Tag, TagCategory,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS images (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_path TEXT NOT NULL UNIQUE,
        file_name TEXT NOT NULL,
        file_size INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS exif_data (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        image_id INTEGER NOT NULL UNIQUE REFERENCES images(id) ON DELETE CASCADE,
        date_taken TEXT,
        camera_make TEXT,
        camera_model TEXT,
        lens_model TEXT,
        iso INTEGER,
        aperture REAL,
        shutter_speed TEXT,
        focal_length REAL,
        orientation INTEGER,
        width INTEGER,
        height INTEGER,
        gps_latitude REAL,
        gps_longitude REAL,
        gps_altitude REAL
    );

    CREATE INDEX IF NOT EXISTS idx_exif_date_taken ON exif_data(date_taken);
    CREATE INDEX IF NOT EXISTS idx_gps_coordinates ON exif_data(gps_latitude, gps_longitude);

    CREATE TABLE IF NOT EXISTS ai_analysis (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        image_id INTEGER NOT NULL UNIQUE REFERENCES images(id) ON DELETE CASCADE,
        analyzed_at TEXT NOT NULL,
        description TEXT,
        detected_objects TEXT,
        detected_people TEXT,
        detected_activities TEXT,
        scene_type TEXT,
        confidence_score REAL,
        raw_response TEXT
    );

    CREATE TABLE IF NOT EXISTS tags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        image_id INTEGER NOT NULL REFERENCES images(id) ON DELETE CASCADE,
        tag_name TEXT NOT NULL,
        tag_type TEXT NOT NULL,
        confidence REAL
    );

    CREATE INDEX IF NOT EXISTS idx_tag_name_type ON tags(tag_name, tag_type);
    CREATE INDEX IF NOT EXISTS idx_image_tags ON tags(image_id);
";

/// SQLite-backed record store.
///
/// The connection sits behind a mutex and every method holds it only for its
/// own statements, so callers never keep the database locked while doing
/// slow work such as a vision request.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating if needed) the database file at `path`
    pub fn open(path: &Path) -> PersistenceResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                PersistenceError::Initialization(format!(
                    "Failed to create {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let conn = Connection::open(path)?;
        let store = Self::init(conn)?;
        info!("Database initialized at {}", path.display());
        Ok(store)
    }

    /// Private in-memory database, used by tests and dry runs
    pub fn open_in_memory() -> PersistenceResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> PersistenceResult<Self> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 10000;",
        )
        .map_err(|e| PersistenceError::Initialization(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| PersistenceError::Initialization(format!("Failed to create schema: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> PersistenceResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| PersistenceError::Other("database lock poisoned".to_string()))
    }

    // -- Images --

    /// Insert newly scanned files in one transaction. Paths already present
    /// are ignored. Returns the number of rows added.
    pub fn insert_assets(&self, assets: &[NewAsset]) -> PersistenceResult<usize> {
        if assets.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now();
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO images (file_path, file_name, file_size, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
            )?;
            for asset in assets {
                inserted += stmt.execute(params![
                    asset.path.to_string_lossy().into_owned(),
                    asset.file_name,
                    asset.size as i64,
                    now,
                ])?;
            }
        }
        tx.commit()?;

        info!("Inserted {} of {} scanned images", inserted, assets.len());
        Ok(inserted)
    }

    /// Every stored path, read in one query
    pub fn list_known_paths(&self) -> PersistenceResult<HashSet<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT file_path FROM images")?;
        let paths = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(paths)
    }

    pub fn get_asset(&self, id: i64) -> PersistenceResult<Option<ImageAsset>> {
        let conn = self.conn()?;
        let asset = conn
            .query_row(
                &format!("SELECT {} FROM images WHERE id = ?1", ASSET_COLUMNS),
                [id],
                asset_from_row,
            )
            .optional()?;
        Ok(asset)
    }

    pub fn all_assets(&self) -> PersistenceResult<Vec<ImageAsset>> {
        self.query_assets(&AssetFilter::default())
    }

    /// Look up the given ids, skipping any that do not exist
    pub fn assets_by_ids(&self, ids: &[i64]) -> PersistenceResult<Vec<ImageAsset>> {
        let mut assets = Vec::with_capacity(ids.len());
        for &id in ids {
            match self.get_asset(id)? {
                Some(asset) => assets.push(asset),
                None => warn!("Requested image {} does not exist", id),
            }
        }
        Ok(assets)
    }

    /// Assets that have no record of the given kind yet
    pub fn find_assets_missing(&self, kind: MissingKind) -> PersistenceResult<Vec<ImageAsset>> {
        self.query_assets(&match kind {
            MissingKind::Exif => AssetFilter {
                has_exif: Some(false),
                ..Default::default()
            },
            MissingKind::Analysis => AssetFilter {
                has_analysis: Some(false),
                ..Default::default()
            },
        })
    }

    /// Remove an asset together with its EXIF, analysis and tags
    pub fn delete_asset(&self, id: i64) -> PersistenceResult<bool> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM images WHERE id = ?1", [id])? > 0;
        if removed {
            log_db_modification("delete_asset", id, None);
        }
        Ok(removed)
    }

    // -- EXIF --

    /// Store the EXIF record for an image. Records are written once; a second
    /// insert for the same image is rejected.
    pub fn insert_exif(&self, image_id: i64, exif: &ExifRecord) -> PersistenceResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        ensure_asset(&tx, image_id)?;
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM exif_data WHERE image_id = ?1)",
            [image_id],
            |row| row.get(0),
        )?;
        if exists {
            return Err(PersistenceError::Duplicate(format!(
                "EXIF data for image {}",
                image_id
            )));
        }

        tx.execute(
            &format!(
                "INSERT INTO exif_data (image_id, {}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                EXIF_COLUMNS
            ),
            params![
                image_id,
                exif.date_taken,
                exif.camera_make,
                exif.camera_model,
                exif.lens_model,
                exif.iso,
                exif.aperture,
                exif.shutter_speed,
                exif.focal_length,
                exif.orientation,
                exif.width,
                exif.height,
                exif.gps_latitude,
                exif.gps_longitude,
                exif.gps_altitude,
            ],
        )?;
        touch(&tx, image_id)?;
        tx.commit()?;

        log_db_modification("insert_exif", image_id, None);
        Ok(())
    }

    pub fn get_exif(&self, image_id: i64) -> PersistenceResult<Option<ExifRecord>> {
        let conn = self.conn()?;
        let exif = conn
            .query_row(
                &format!("SELECT {} FROM exif_data WHERE image_id = ?1", EXIF_COLUMNS),
                [image_id],
                exif_from_row,
            )
            .optional()?;
        Ok(exif)
    }

    // -- Analysis and tags --

    /// Replace the analysis and the whole tag set of an image atomically.
    ///
    /// Readers see either the previous analysis with its tags or the new one
    /// with its tags, never a mix.
    pub fn replace_analysis(
        &self,
        image_id: i64,
        analysis: &AnalysisRecord,
        tags: &[Tag],
    ) -> PersistenceResult<()> {
        let objects = serde_json::to_string(&analysis.result.objects)?;
        let people = serde_json::to_string(&analysis.result.people)?;
        let activities = serde_json::to_string(&analysis.result.activities)?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        ensure_asset(&tx, image_id)?;
        tx.execute("DELETE FROM ai_analysis WHERE image_id = ?1", [image_id])?;
        tx.execute("DELETE FROM tags WHERE image_id = ?1", [image_id])?;

        tx.execute(
            &format!(
                "INSERT INTO ai_analysis (image_id, {}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                ANALYSIS_COLUMNS
            ),
            params![
                image_id,
                analysis.analyzed_at,
                analysis.result.description,
                objects,
                people,
                activities,
                analysis.result.scene_type,
                analysis.result.confidence,
                analysis.raw_response,
            ],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO tags (image_id, tag_name, tag_type, confidence) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for tag in tags {
                stmt.execute(params![
                    image_id,
                    tag.name,
                    tag.category.as_str(),
                    tag.confidence
                ])?;
            }
        }

        touch(&tx, image_id)?;
        tx.commit()?;

        log_db_modification(
            "replace_analysis",
            image_id,
            Some(&format!("{} tags", tags.len())),
        );
        Ok(())
    }

    pub fn get_analysis(&self, image_id: i64) -> PersistenceResult<Option<AnalysisRecord>> {
        let conn = self.conn()?;
        let analysis = conn
            .query_row(
                &format!(
                    "SELECT {} FROM ai_analysis WHERE image_id = ?1",
                    ANALYSIS_COLUMNS
                ),
                [image_id],
                analysis_from_row,
            )
            .optional()?;
        Ok(analysis)
    }

    pub fn tags_for(&self, image_id: i64) -> PersistenceResult<Vec<Tag>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT image_id, tag_name, tag_type, confidence FROM tags WHERE image_id = ?1 ORDER BY id",
        )?;
        let tags = stmt
            .query_map([image_id], tag_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tags)
    }

    // -- Browsing --

    /// Assets matching every set field of `filter`, ordered by id
    pub fn query_assets(&self, filter: &AssetFilter) -> PersistenceResult<Vec<ImageAsset>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        match filter.has_exif {
            Some(true) => clauses
                .push("EXISTS (SELECT 1 FROM exif_data e WHERE e.image_id = images.id)".into()),
            Some(false) => clauses
                .push("NOT EXISTS (SELECT 1 FROM exif_data e WHERE e.image_id = images.id)".into()),
            None => {}
        }

        match filter.has_analysis {
            Some(true) => clauses
                .push("EXISTS (SELECT 1 FROM ai_analysis a WHERE a.image_id = images.id)".into()),
            Some(false) => clauses.push(
                "NOT EXISTS (SELECT 1 FROM ai_analysis a WHERE a.image_id = images.id)".into(),
            ),
            None => {}
        }

        if filter.tag.is_some() || filter.tag_category.is_some() {
            let mut tag_clause =
                String::from("EXISTS (SELECT 1 FROM tags t WHERE t.image_id = images.id");
            if let Some(name) = &filter.tag {
                values.push(Box::new(name.trim().to_lowercase()));
                tag_clause.push_str(&format!(" AND t.tag_name = ?{}", values.len()));
            }
            if let Some(category) = filter.tag_category {
                values.push(Box::new(category.as_str()));
                tag_clause.push_str(&format!(" AND t.tag_type = ?{}", values.len()));
            }
            tag_clause.push(')');
            clauses.push(tag_clause);
        }

        if let Some(bounds) = filter.within {
            let first = values.len() + 1;
            values.push(Box::new(bounds.min_latitude));
            values.push(Box::new(bounds.max_latitude));
            values.push(Box::new(bounds.min_longitude));
            values.push(Box::new(bounds.max_longitude));
            clauses.push(format!(
                "EXISTS (SELECT 1 FROM exif_data g WHERE g.image_id = images.id \
                 AND g.gps_latitude BETWEEN ?{} AND ?{} \
                 AND g.gps_longitude BETWEEN ?{} AND ?{})",
                first,
                first + 1,
                first + 2,
                first + 3
            ));
        }

        if let Some(needle) = &filter.name_contains {
            values.push(Box::new(format!("%{}%", escape_like(needle))));
            clauses.push(format!(
                "images.file_name LIKE ?{} ESCAPE '\\'",
                values.len()
            ));
        }

        let mut sql = format!("SELECT {} FROM images", ASSET_COLUMNS);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY images.id");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, filter.offset));
        } else if filter.offset > 0 {
            sql.push_str(&format!(" LIMIT -1 OFFSET {}", filter.offset));
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let assets = stmt
            .query_map(params_from_iter(values.iter()), asset_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(assets)
    }

    pub fn stats(&self) -> PersistenceResult<CollectionStats> {
        let conn = self.conn()?;
        let count = |sql: &str| -> rusqlite::Result<usize> {
            conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                .map(|n| n.max(0) as usize)
        };

        Ok(CollectionStats {
            total_images: count("SELECT COUNT(*) FROM images")?,
            with_exif: count("SELECT COUNT(*) FROM exif_data")?,
            with_analysis: count("SELECT COUNT(*) FROM ai_analysis")?,
            with_gps: count(
                "SELECT COUNT(*) FROM exif_data
                 WHERE gps_latitude IS NOT NULL AND gps_longitude IS NOT NULL",
            )?,
        })
    }

    /// Distinct tags with their usage counts, most used first
    pub fn tag_counts(&self, category: Option<TagCategory>) -> PersistenceResult<Vec<TagCount>> {
        let conn = self.conn()?;
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<TagCount> {
            Ok(TagCount {
                name: row.get(0)?,
                category: category_at(row, 1)?,
                count: row.get::<_, i64>(2)?.max(0) as usize,
            })
        };

        let counts = match category {
            Some(category) => {
                let mut stmt = conn.prepare(
                    "SELECT tag_name, tag_type, COUNT(*) AS n FROM tags WHERE tag_type = ?1
                     GROUP BY tag_name, tag_type ORDER BY n DESC, tag_name",
                )?;
                let counts = stmt
                    .query_map([category.as_str()], map_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                counts
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT tag_name, tag_type, COUNT(*) AS n FROM tags
                     GROUP BY tag_name, tag_type ORDER BY n DESC, tag_name",
                )?;
                let counts = stmt
                    .query_map([], map_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                counts
            }
        };
        Ok(counts)
    }

    /// Distinct GPS positions with the number of images taken there
    pub fn locations(&self) -> PersistenceResult<Vec<LocationCount>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT gps_latitude, gps_longitude, COUNT(*) FROM exif_data
             WHERE gps_latitude IS NOT NULL AND gps_longitude IS NOT NULL
             GROUP BY gps_latitude, gps_longitude",
        )?;
        let locations = stmt
            .query_map([], |row| {
                Ok(LocationCount {
                    latitude: row.get(0)?,
                    longitude: row.get(1)?,
                    count: row.get::<_, i64>(2)?.max(0) as usize,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(locations)
    }
}

fn ensure_asset(conn: &Connection, image_id: i64) -> PersistenceResult<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM images WHERE id = ?1)",
        [image_id],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(PersistenceError::NotFound(image_id))
    }
}

// `%` and `_` in a search string match themselves
fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn touch(conn: &Connection, image_id: i64) -> PersistenceResult<()> {
    conn.execute(
        "UPDATE images SET updated_at = ?1 WHERE id = ?2",
        params![Utc::now(), image_id],
    )?;
    Ok(())
}
