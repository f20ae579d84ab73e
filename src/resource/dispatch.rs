//! Dispatch
//!
//! Maps resource kinds named in manifests and on the command line to the
//! orchestrators of each resource type.

use super::bigquery_routine::{self, Routine, RoutineConfig, RoutineId};
use super::plan::{plan, Plan};
use super::schema;
use super::sql_database::{self, DatabaseId, SqlDatabase, SqlDatabaseConfig};
use crate::error::{ProviderError, Result};
use crate::provider::ProviderContext;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One desired resource, as written in a manifest document:
///
/// ```yaml
/// kind: sql_database
/// spec:
///   instance: prod1
///   name: orders
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", content = "spec", rename_all = "snake_case")]
pub enum Manifest {
    SqlDatabase(SqlDatabaseConfig),
    BigqueryRoutine(RoutineConfig),
}

/// Parse every YAML document in `text`
pub fn parse_manifests(text: &str) -> Result<Vec<Manifest>> {
    serde_yaml::Deserializer::from_str(text)
        .map(|doc| Manifest::deserialize(doc).map_err(|e| ProviderError::Manifest(e.to_string())))
        .collect()
}

/// Outcome of an operation, printed by the CLI
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub kind: &'static str,
    pub id: Option<String>,
    pub present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    pub state: Value,
}

/// A resource instance of any kind
#[derive(Debug, Clone)]
pub enum Resource {
    SqlDatabase(SqlDatabase),
    BigqueryRoutine(Routine),
}

impl Resource {
    /// Resource for a manifest, with its identity derived but not yet read
    pub fn from_manifest(ctx: &ProviderContext, manifest: Manifest) -> Result<Self> {
        match manifest {
            Manifest::SqlDatabase(config) => {
                let id = sql_database::target(ctx, &config)?;
                let mut db = sql_database::new(config)?;
                db.set_id(id.to_string());
                Ok(Self::SqlDatabase(db))
            },
            Manifest::BigqueryRoutine(config) => {
                let id = bigquery_routine::target(ctx, &config)?;
                let mut routine = bigquery_routine::new(config)?;
                routine.set_id(id.to_string());
                Ok(Self::BigqueryRoutine(routine))
            },
        }
    }

    /// Resource addressed by a canonical identity
    pub fn from_id(kind: &str, id: &str) -> Result<Self> {
        match kind {
            sql_database::RESOURCE_KEY => {
                let parsed = DatabaseId::parse(id)?;
                let mut db = sql_database::new(SqlDatabaseConfig {
                    instance: parsed.instance,
                    name: parsed.name,
                    project: Some(parsed.project),
                    ..Default::default()
                })?;
                db.set_id(id);
                Ok(Self::SqlDatabase(db))
            },
            bigquery_routine::RESOURCE_KEY => {
                let parsed = RoutineId::parse(id)?;
                let mut routine = bigquery_routine::new(RoutineConfig {
                    dataset_id: parsed.dataset_id,
                    routine_id: parsed.routine_id,
                    project: Some(parsed.project),
                    ..Default::default()
                })?;
                routine.set_id(id);
                Ok(Self::BigqueryRoutine(routine))
            },
            _ => Err(ProviderError::Manifest(format!("unknown resource kind {kind:?}"))),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::SqlDatabase(_) => sql_database::RESOURCE_KEY,
            Self::BigqueryRoutine(_) => bigquery_routine::RESOURCE_KEY,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Self::SqlDatabase(db) => db.id.as_deref(),
            Self::BigqueryRoutine(r) => r.id.as_deref(),
        }
    }

    pub fn is_present(&self) -> bool {
        self.id().is_some()
    }

    fn desired(&self) -> Result<Value> {
        Ok(match self {
            Self::SqlDatabase(db) => serde_json::to_value(&db.config)?,
            Self::BigqueryRoutine(r) => serde_json::to_value(&r.config)?,
        })
    }

    fn current(&self) -> Result<Value> {
        Ok(match self {
            Self::SqlDatabase(db) => serde_json::to_value(&db.state)?,
            Self::BigqueryRoutine(r) => serde_json::to_value(&r.state)?,
        })
    }

    pub async fn read(&mut self, ctx: &ProviderContext) -> Result<()> {
        match self {
            Self::SqlDatabase(db) => sql_database::read(ctx, db).await,
            Self::BigqueryRoutine(r) => bigquery_routine::read(ctx, r).await,
        }
    }

    pub async fn create(&mut self, ctx: &ProviderContext) -> Result<()> {
        match self {
            Self::SqlDatabase(db) => sql_database::create(ctx, db).await,
            Self::BigqueryRoutine(r) => bigquery_routine::create(ctx, r).await,
        }
    }

    pub async fn update(&mut self, ctx: &ProviderContext) -> Result<()> {
        match self {
            Self::SqlDatabase(db) => sql_database::update(ctx, db).await,
            Self::BigqueryRoutine(r) => bigquery_routine::update(ctx, r).await,
        }
    }

    pub async fn delete(&mut self, ctx: &ProviderContext) -> Result<()> {
        match self {
            Self::SqlDatabase(db) => sql_database::delete(ctx, db).await,
            Self::BigqueryRoutine(r) => bigquery_routine::delete(ctx, r).await,
        }
    }

    /// Compare the configuration with the last read state
    pub fn plan(&self) -> Result<Plan> {
        Ok(plan(
            schema(self.kind())?,
            self.is_present(),
            &self.desired()?,
            &self.current()?,
        ))
    }

    pub fn report(&self, plan: Option<Plan>) -> Result<Report> {
        Ok(Report {
            kind: self.kind(),
            id: self.id().map(str::to_string),
            present: self.is_present(),
            plan,
            state: self.current()?,
        })
    }
}

/// Read the current state of a manifest's resource and plan the change
pub async fn plan_manifest(ctx: &ProviderContext, manifest: Manifest) -> Result<(Resource, Plan)> {
    let mut resource = Resource::from_manifest(ctx, manifest)?;
    resource.read(ctx).await?;
    let plan = resource.plan()?;
    tracing::info!("Plan for {} {:?}: {:?}", resource.kind(), resource.id(), plan);
    Ok((resource, plan))
}

/// Bring the remote resource in line with the manifest
pub async fn apply(ctx: &ProviderContext, manifest: Manifest) -> Result<Report> {
    let (mut resource, plan) = plan_manifest(ctx, manifest).await?;

    match &plan {
        Plan::NoOp => {},
        Plan::Create => resource.create(ctx).await?,
        Plan::Update(_) => resource.update(ctx).await?,
        Plan::Replace(_) => {
            resource.delete(ctx).await?;
            resource.create(ctx).await?;
        },
    }

    resource.report(Some(plan))
}

/// Read a resource by canonical identity
pub async fn read_resource(ctx: &ProviderContext, kind: &str, id: &str) -> Result<Report> {
    let mut resource = Resource::from_id(kind, id)?;
    resource.read(ctx).await?;
    resource.report(None)
}

/// Import a resource by any accepted import id
pub async fn import_resource(
    ctx: &ProviderContext,
    kind: &str,
    import_id: &str,
    parent: Option<&str>,
) -> Result<Report> {
    let resource = match kind {
        sql_database::RESOURCE_KEY => {
            Resource::SqlDatabase(sql_database::import(ctx, import_id, parent).await?)
        },
        bigquery_routine::RESOURCE_KEY => {
            Resource::BigqueryRoutine(bigquery_routine::import(ctx, import_id, parent).await?)
        },
        _ => return Err(ProviderError::Manifest(format!("unknown resource kind {kind:?}"))),
    };
    resource.report(None)
}

/// Delete a resource by canonical identity
pub async fn delete_resource(ctx: &ProviderContext, kind: &str, id: &str) -> Result<Report> {
    let mut resource = Resource::from_id(kind, id)?;
    resource.delete(ctx).await?;
    resource.report(None)
}
