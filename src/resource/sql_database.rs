//! Cloud SQL Database
//!
//! A database inside a Cloud SQL instance. Every mutating call returns an
//! operation that is polled to completion, and calls against one instance are
//! serialized through the instance lock because the API doesn't handle
//! concurrent database changes on the same instance.

use super::field::{
    build_mutation, convert_self_link_to_v1, expand_identity, flatten_string, FieldCodec,
    FieldValue,
};
use super::identity::{parse_import_id, replace_vars, vars, Vars};
use super::{schema, wait_if_operation, ResourceData};
use crate::error::{ProviderError, Result};
use crate::gcp::client::encode;
use crate::provider::ProviderContext;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const RESOURCE_KEY: &str = "sql_database";

/// User configuration of a database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqlDatabaseConfig {
    pub instance: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

/// Database as last read from the API
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SqlDatabaseState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
}

pub type SqlDatabase = ResourceData<SqlDatabaseConfig, SqlDatabaseState>;

/// `projects/{project}/instances/{instance}/databases/{name}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseId {
    pub project: String,
    pub instance: String,
    pub name: String,
}

impl DatabaseId {
    const EXPECTED: &'static str = "projects/{project}/instances/{instance}/databases/{name}";

    pub fn parse(id: &str) -> Result<Self> {
        let invalid = || ProviderError::InvalidId {
            kind: "database",
            id: id.to_string(),
            expected: Self::EXPECTED,
        };

        let parts: Vec<&str> = id.split('/').collect();
        match parts.as_slice() {
            ["projects", project, "instances", instance, "databases", name]
                if !project.is_empty() && !instance.is_empty() && !name.is_empty() =>
            {
                Ok(Self {
                    project: project.to_string(),
                    instance: instance.to_string(),
                    name: name.to_string(),
                })
            },
            _ => Err(invalid()),
        }
    }

    fn vars(&self) -> Vars {
        vars([
            ("project", self.project.as_str()),
            ("instance", self.instance.as_str()),
            ("name", self.name.as_str()),
        ])
    }

    /// Key of the instance lock guarding this database
    pub fn lock_key(&self) -> Result<String> {
        replace_vars(&schema(RESOURCE_KEY)?.lock_key, &self.vars())
    }
}

impl fmt::Display for DatabaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "projects/{}/instances/{}/databases/{}",
            self.project, self.instance, self.name
        )
    }
}

/// A database resource with the default timeouts
pub fn new(config: SqlDatabaseConfig) -> Result<SqlDatabase> {
    Ok(ResourceData::new(config, schema(RESOURCE_KEY)?.default_timeouts()))
}

fn fields() -> [FieldCodec<SqlDatabase>; 4] {
    [
        FieldCodec {
            name: "charset",
            wire: "charset",
            get: |d| FieldValue::configured_or_read(d.config.charset.as_ref(), d.state.charset.as_ref()),
            expand: expand_identity,
        },
        FieldCodec {
            name: "collation",
            wire: "collation",
            get: |d| {
                FieldValue::configured_or_read(d.config.collation.as_ref(), d.state.collation.as_ref())
            },
            expand: expand_identity,
        },
        FieldCodec {
            name: "name",
            wire: "name",
            get: |d| FieldValue::required(&d.config.name),
            expand: expand_identity,
        },
        FieldCodec {
            name: "instance",
            wire: "instance",
            get: |d| FieldValue::required(&d.config.instance),
            expand: expand_identity,
        },
    ]
}

/// Request body for a create or update call
pub fn build_request(db: &SqlDatabase) -> Result<serde_json::Map<String, Value>> {
    build_mutation(&fields(), db)
}

/// Identity the configuration describes
pub fn target(ctx: &ProviderContext, config: &SqlDatabaseConfig) -> Result<DatabaseId> {
    let project = ctx.project(config.project.as_deref())?;
    let id = DatabaseId {
        project,
        instance: config.instance.clone(),
        name: config.name.clone(),
    };
    // Validates that nothing is empty
    replace_vars(&schema(RESOURCE_KEY)?.id_template, &id.vars())?;
    Ok(id)
}

fn collection_url(ctx: &ProviderContext, id: &DatabaseId) -> String {
    ctx.client.sql_url(&format!(
        "projects/{}/instances/{}/databases",
        encode(&id.project),
        encode(&id.instance)
    ))
}

fn database_url(ctx: &ProviderContext, id: &DatabaseId) -> String {
    format!("{}/{}", collection_url(ctx, id), encode(&id.name))
}

pub async fn create(ctx: &ProviderContext, db: &mut SqlDatabase) -> Result<()> {
    let target = target(ctx, &db.config)?;

    {
        let _guard = ctx.locks.lock(&target.lock_key()?).await;

        let obj = build_request(db)?;
        tracing::debug!("Creating new Database: {:?}", obj);

        let res = ctx
            .client
            .post(&collection_url(ctx, &target), &Value::Object(obj), db.timeouts.create)
            .await?;
        wait_if_operation(ctx, &res, &target.project, "Creating Database", db.timeouts.create)
            .await?;

        db.set_id(target.to_string());
        tracing::info!("Finished creating Database {:?}", target.to_string());
    }

    read(ctx, db).await
}

pub async fn read(ctx: &ProviderContext, db: &mut SqlDatabase) -> Result<()> {
    let Some(id) = db.id.clone() else {
        return Ok(());
    };
    let target = DatabaseId::parse(&id)?;

    let res = match ctx.client.get(&database_url(ctx, &target)).await {
        Ok(res) => res,
        Err(e) if e.is_not_found() => {
            tracing::warn!("Removing SQLDatabase {:?} because it's gone", id);
            db.mark_absent();
            return Ok(());
        },
        Err(e) => return Err(e),
    };

    db.state = SqlDatabaseState {
        project: Some(target.project),
        instance: flatten_string(res.get("instance")),
        name: flatten_string(res.get("name")),
        charset: flatten_string(res.get("charset")),
        collation: flatten_string(res.get("collation")),
        self_link: flatten_string(res.get("selfLink")).map(|l| convert_self_link_to_v1(&l)),
    };
    Ok(())
}

pub async fn update(ctx: &ProviderContext, db: &mut SqlDatabase) -> Result<()> {
    let target = DatabaseId::parse(&db.require_id()?)?;

    {
        let _guard = ctx.locks.lock(&target.lock_key()?).await;

        let obj = build_request(db)?;
        tracing::debug!("Updating Database {:?}: {:?}", target.to_string(), obj);

        let res = ctx
            .client
            .put(&database_url(ctx, &target), &Value::Object(obj), db.timeouts.update)
            .await?;
        wait_if_operation(ctx, &res, &target.project, "Updating Database", db.timeouts.update)
            .await?;
    }

    read(ctx, db).await
}

pub async fn delete(ctx: &ProviderContext, db: &mut SqlDatabase) -> Result<()> {
    let Some(id) = db.id.clone() else {
        return Ok(());
    };
    let target = DatabaseId::parse(&id)?;
    let _guard = ctx.locks.lock(&target.lock_key()?).await;

    tracing::debug!("Deleting Database {:?}", id);
    match ctx.client.delete(&database_url(ctx, &target), db.timeouts.delete).await {
        Ok(res) => {
            wait_if_operation(ctx, &res, &target.project, "Deleting Database", db.timeouts.delete)
                .await?;
        },
        Err(e) if e.is_not_found() => {
            tracing::warn!("Database {:?} was already gone", id);
        },
        Err(e) => return Err(e),
    }

    db.mark_absent();
    tracing::info!("Finished deleting Database {:?}", id);
    Ok(())
}

/// Adopt an existing database. `instance_hint` supplies the instance when the
/// import id names only the database.
pub async fn import(
    ctx: &ProviderContext,
    import_id: &str,
    instance_hint: Option<&str>,
) -> Result<SqlDatabase> {
    let mut caps = parse_import_id(import_id, &schema(RESOURCE_KEY)?.import_formats)?;

    let project = ctx.project(caps.get("project").map(String::as_str))?;
    let instance = caps
        .remove("instance")
        .or_else(|| instance_hint.map(str::to_string))
        .ok_or_else(|| ProviderError::MissingValue("instance".to_string()))?;
    let name = caps
        .remove("name")
        .ok_or_else(|| ProviderError::MissingValue("name".to_string()))?;

    let mut db = new(SqlDatabaseConfig {
        instance,
        name,
        project: Some(project),
        ..Default::default()
    })?;
    let target = target(ctx, &db.config)?;
    db.set_id(target.to_string());

    read(ctx, &mut db).await?;
    if !db.is_present() {
        return Err(ProviderError::Api {
            status: 404,
            message: format!("cannot import non-existent Database {target}"),
        });
    }
    Ok(db)
}
