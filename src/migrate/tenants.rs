use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::db::validate_identifier;
use crate::error::{MigratorError, Result};
use crate::migrate::table_exists;

/// A tenant of the platform, i.e. one row of the `project` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tenant {
    pub id: i64,
    pub name: String,
}

/// Loads the tenants to migrate.
///
/// With an empty `only` list every project is returned, ordered by id.
/// Otherwise each listed name must exist. Names are validated as SQL
/// identifiers because per-tenant steps interpolate them into DDL.
pub fn load_tenants(conn: &Connection, only: &[String]) -> Result<Vec<Tenant>> {
    if !table_exists(conn, "project")? {
        if only.is_empty() {
            return Ok(Vec::new());
        }
        return Err(MigratorError::Config(
            "tenants are configured but the project table does not exist".to_string(),
        ));
    }

    let tenants = if only.is_empty() {
        let mut stmt = conn.prepare("SELECT id, name FROM project ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Tenant {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    } else {
        let mut tenants = Vec::with_capacity(only.len());
        for name in only {
            let id: Option<i64> = conn
                .query_row(
                    "SELECT id FROM project WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?;
            let id = id.ok_or_else(|| MigratorError::Config(format!("unknown tenant {:?}", name)))?;
            tenants.push(Tenant {
                id,
                name: name.clone(),
            });
        }
        tenants
    };

    for tenant in &tenants {
        validate_identifier(&tenant.name)?;
    }
    Ok(tenants)
}
