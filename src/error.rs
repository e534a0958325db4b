use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigratorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Config error: {0}")]
    Config(String),

    /// More than one inode row matched a key that the writer keeps unique.
    /// `rows` counts the rows fetched, which stops at two.
    #[error(
        "Ambiguous inode lookup: at least {rows} rows for parent_id={parent_id}, name={name:?}, partition_id={partition_id}"
    )]
    ResolutionAmbiguous {
        parent_id: i64,
        name: String,
        partition_id: i64,
        rows: usize,
    },

    #[error("Ambiguous inode lookup: at least {rows} rows for id={id}")]
    AmbiguousId { id: i64, rows: usize },

    #[error("Hierarchy error: {0}")]
    Hierarchy(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

impl MigratorError {
    /// True for failures that originate in the backing store or its pool.
    pub fn is_storage_error(&self) -> bool {
        matches!(self, MigratorError::Database(_) | MigratorError::Pool(_))
    }

    /// True for invariant violations in the inode table.
    pub fn is_ambiguous(&self) -> bool {
        matches!(
            self,
            MigratorError::ResolutionAmbiguous { .. } | MigratorError::AmbiguousId { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MigratorError>;
