//! BigQuery Routine
//!
//! User-defined functions and stored procedures in a dataset. The routines
//! API answers synchronously; updates replace the whole routine.

use super::field::{
    build_mutation, expand_identity, flatten_i64, flatten_string, flatten_string_list,
    FieldCodec, FieldValue,
};
use super::identity::{parse_import_id, replace_vars, vars, Vars};
use super::standard_sql::{DataTypeConfig, SqlDataType};
use super::wire_enum::wire_enum;
use super::{schema, wait_if_operation, ResourceData};
use crate::error::{ProviderError, Result};
use crate::gcp::client::encode;
use crate::provider::ProviderContext;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

pub const RESOURCE_KEY: &str = "bigquery_routine";

wire_enum! {
    pub enum RoutineType {
        RoutineTypeUnspecified => "ROUTINE_TYPE_UNSPECIFIED",
        ScalarFunction => "SCALAR_FUNCTION",
        Procedure => "PROCEDURE",
    }
}

impl Default for RoutineType {
    fn default() -> Self {
        Self::RoutineTypeUnspecified
    }
}

wire_enum! {
    pub enum Language {
        LanguageUnspecified => "LANGUAGE_UNSPECIFIED",
        Sql => "SQL",
        Javascript => "JAVASCRIPT",
    }
}

wire_enum! {
    pub enum ArgumentKind {
        ArgumentKindUnspecified => "ARGUMENT_KIND_UNSPECIFIED",
        FixedType => "FIXED_TYPE",
        AnyType => "ANY_TYPE",
    }
}

wire_enum! {
    pub enum ArgumentMode {
        ModeUnspecified => "MODE_UNSPECIFIED",
        In => "IN",
        Out => "OUT",
        Inout => "INOUT",
    }
}

/// One input/output argument
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArgumentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argument_kind: Option<ArgumentKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ArgumentMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataTypeConfig>,
}

/// User configuration of a routine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutineConfig {
    pub dataset_id: String,
    pub routine_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub routine_type: RoutineType,
    pub definition_body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<ArgumentConfig>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<DataTypeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imported_libraries: Option<Vec<String>>,
}

/// Routine as last read from the API
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoutineState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routine_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routine_type: Option<RoutineType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<ArgumentConfig>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<DataTypeConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imported_libraries: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
}

pub type Routine = ResourceData<RoutineConfig, RoutineState>;

/// `projects/{project}/datasets/{dataset}/routines/{routine}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineId {
    pub project: String,
    pub dataset_id: String,
    pub routine_id: String,
}

impl RoutineId {
    const EXPECTED: &'static str = "projects/{project}/datasets/{dataset}/routines/{routine}";

    pub fn parse(id: &str) -> Result<Self> {
        let parts: Vec<&str> = id.split('/').collect();
        match parts.as_slice() {
            ["projects", project, "datasets", dataset, "routines", routine]
                if !project.is_empty() && !dataset.is_empty() && !routine.is_empty() =>
            {
                Ok(Self {
                    project: project.to_string(),
                    dataset_id: dataset.to_string(),
                    routine_id: routine.to_string(),
                })
            },
            _ => Err(ProviderError::InvalidId {
                kind: "routine",
                id: id.to_string(),
                expected: Self::EXPECTED,
            }),
        }
    }

    fn vars(&self) -> Vars {
        vars([
            ("project", self.project.as_str()),
            ("dataset_id", self.dataset_id.as_str()),
            ("routine_id", self.routine_id.as_str()),
        ])
    }

    /// Key of the dataset lock guarding this routine
    pub fn lock_key(&self) -> Result<String> {
        replace_vars(&schema(RESOURCE_KEY)?.lock_key, &self.vars())
    }

    fn reference(&self) -> Value {
        json!({
            "projectId": self.project,
            "datasetId": self.dataset_id,
            "routineId": self.routine_id,
        })
    }
}

impl fmt::Display for RoutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "projects/{}/datasets/{}/routines/{}",
            self.project, self.dataset_id, self.routine_id
        )
    }
}

/// A routine resource with the default timeouts. Enumerated settings must be
/// values this crate knows how to send.
pub fn new(config: RoutineConfig) -> Result<Routine> {
    config.routine_type.validate("routine_type")?;
    if let Some(language) = &config.language {
        language.validate("language")?;
    }
    Ok(ResourceData::new(config, schema(RESOURCE_KEY)?.default_timeouts()))
}

// =============================================================================
// Field codecs
// =============================================================================

fn expand_argument(arg: &ArgumentConfig) -> Result<Value> {
    let mut obj = Map::new();
    if let Some(name) = &arg.name {
        obj.insert("name".to_string(), json!(name));
    }
    if let Some(kind) = &arg.argument_kind {
        kind.validate("arguments")?;
        obj.insert("argumentKind".to_string(), json!(kind));
    }
    if let Some(mode) = &arg.mode {
        mode.validate("arguments")?;
        obj.insert("mode".to_string(), json!(mode));
    }
    if let Some(data_type) = &arg.data_type {
        obj.insert(
            "dataType".to_string(),
            SqlDataType::from_config(data_type, "arguments")?.to_wire(),
        );
    }
    Ok(Value::Object(obj))
}

fn expand_arguments(v: &Value) -> Result<Value> {
    if v.is_null() {
        return Ok(Value::Null);
    }
    let args: Vec<ArgumentConfig> = serde_json::from_value(v.clone())
        .map_err(|e| ProviderError::expand("arguments", e.to_string()))?;
    Ok(Value::Array(
        args.iter().map(expand_argument).collect::<Result<_>>()?,
    ))
}

fn expand_return_type(v: &Value) -> Result<Value> {
    if v.is_null() {
        return Ok(Value::Null);
    }
    let config: DataTypeConfig = serde_json::from_value(v.clone())
        .map_err(|e| ProviderError::expand("return_type", e.to_string()))?;
    Ok(SqlDataType::from_config(&config, "return_type")?.to_wire())
}

fn flatten_arguments(v: Option<&Value>) -> Result<Option<Vec<ArgumentConfig>>> {
    let Some(items) = v.and_then(|v| v.as_array()) else {
        return Ok(None);
    };

    let mut args = Vec::with_capacity(items.len());
    for item in items {
        let enum_field = |key: &str| item.get(key).cloned().unwrap_or(Value::Null);
        args.push(ArgumentConfig {
            name: flatten_string(item.get("name")),
            argument_kind: serde_json::from_value(enum_field("argumentKind"))
                .map_err(|e| ProviderError::flatten("arguments", e.to_string()))?,
            mode: serde_json::from_value(enum_field("mode"))
                .map_err(|e| ProviderError::flatten("arguments", e.to_string()))?,
            data_type: item
                .get("dataType")
                .map(|t| SqlDataType::from_wire(t, "arguments").map(|t| t.to_config()))
                .transpose()?,
        });
    }
    Ok(Some(args))
}

fn flatten_return_type(v: Option<&Value>) -> Result<Option<DataTypeConfig>> {
    v.map(|t| SqlDataType::from_wire(t, "return_type").map(|t| t.to_config()))
        .transpose()
}

fn flatten_enum<T: serde::de::DeserializeOwned>(v: Option<&Value>, field: &str) -> Result<Option<T>> {
    v.map(|v| serde_json::from_value(v.clone()))
        .transpose()
        .map_err(|e| ProviderError::flatten(field, e.to_string()))
}

fn fields() -> [FieldCodec<Routine>; 7] {
    [
        FieldCodec {
            name: "routine_type",
            wire: "routineType",
            get: |r| FieldValue::required(&r.config.routine_type),
            expand: expand_identity,
        },
        FieldCodec {
            name: "description",
            wire: "description",
            get: |r| FieldValue::configured_or_read(r.config.description.as_ref(), None),
            expand: expand_identity,
        },
        FieldCodec {
            name: "language",
            wire: "language",
            get: |r| FieldValue::configured_or_read(r.config.language.as_ref(), r.state.language.as_ref()),
            expand: expand_identity,
        },
        FieldCodec {
            name: "arguments",
            wire: "arguments",
            get: |r| FieldValue::configured_or_read(r.config.arguments.as_ref(), None),
            expand: expand_arguments,
        },
        FieldCodec {
            name: "return_type",
            wire: "returnType",
            get: |r| FieldValue::configured_or_read(r.config.return_type.as_ref(), None),
            expand: expand_return_type,
        },
        FieldCodec {
            name: "imported_libraries",
            wire: "importedLibraries",
            get: |r| FieldValue::configured_or_read(r.config.imported_libraries.as_ref(), None),
            expand: expand_identity,
        },
        FieldCodec {
            name: "definition_body",
            wire: "definitionBody",
            get: |r| FieldValue::required(&r.config.definition_body),
            expand: expand_identity,
        },
    ]
}

/// Full routine body for insert and update
pub fn build_request(routine: &Routine, target: &RoutineId) -> Result<Map<String, Value>> {
    let mut obj = build_mutation(&fields(), routine)?;
    obj.insert("routineReference".to_string(), target.reference());
    Ok(obj)
}

/// Identity the configuration describes
pub fn target(ctx: &ProviderContext, config: &RoutineConfig) -> Result<RoutineId> {
    let id = RoutineId {
        project: ctx.project(config.project.as_deref())?,
        dataset_id: config.dataset_id.clone(),
        routine_id: config.routine_id.clone(),
    };
    replace_vars(&schema(RESOURCE_KEY)?.id_template, &id.vars())?;
    Ok(id)
}

fn collection_url(ctx: &ProviderContext, id: &RoutineId) -> String {
    ctx.client.bigquery_url(&format!(
        "projects/{}/datasets/{}/routines",
        encode(&id.project),
        encode(&id.dataset_id)
    ))
}

fn routine_url(ctx: &ProviderContext, id: &RoutineId) -> String {
    format!("{}/{}", collection_url(ctx, id), encode(&id.routine_id))
}

/// Identity from the routineReference of an API response
fn id_from_response(res: &Value) -> Option<RoutineId> {
    let reference = res.get("routineReference")?;
    Some(RoutineId {
        project: flatten_string(reference.get("projectId"))?,
        dataset_id: flatten_string(reference.get("datasetId"))?,
        routine_id: flatten_string(reference.get("routineId"))?,
    })
}

// =============================================================================
// Orchestrators
// =============================================================================

pub async fn create(ctx: &ProviderContext, routine: &mut Routine) -> Result<()> {
    let target = target(ctx, &routine.config)?;
    tracing::info!("Creating BigQuery routine: {}", target.routine_id);

    {
        let _guard = ctx.locks.lock(&target.lock_key()?).await;

        let obj = build_request(routine, &target)?;
        let res = ctx
            .client
            .post(&collection_url(ctx, &target), &Value::Object(obj), routine.timeouts.create)
            .await?;
        wait_if_operation(ctx, &res, &target.project, "Creating Routine", routine.timeouts.create)
            .await?;

        let created = id_from_response(&res).unwrap_or(target);
        tracing::info!("BigQuery routine {} has been created", created.routine_id);
        routine.set_id(created.to_string());
    }

    read(ctx, routine).await
}

pub async fn read(ctx: &ProviderContext, routine: &mut Routine) -> Result<()> {
    let Some(id) = routine.id.clone() else {
        return Ok(());
    };
    tracing::info!("Reading BigQuery routine: {}", id);
    let target = RoutineId::parse(&id)?;

    let res = match ctx.client.get(&routine_url(ctx, &target)).await {
        Ok(res) => res,
        Err(e) if e.is_not_found() => {
            tracing::warn!("Removing BigQuery routine {:?} because it's gone", target.routine_id);
            routine.mark_absent();
            return Ok(());
        },
        Err(e) => return Err(e),
    };

    let reference = id_from_response(&res);
    routine.state = RoutineState {
        project: Some(target.project.clone()),
        dataset_id: Some(reference.as_ref().map_or(target.dataset_id.clone(), |r| r.dataset_id.clone())),
        routine_id: Some(reference.as_ref().map_or(target.routine_id.clone(), |r| r.routine_id.clone())),
        routine_type: flatten_enum(res.get("routineType"), "routine_type")?,
        definition_body: flatten_string(res.get("definitionBody")),
        description: flatten_string(res.get("description")),
        language: flatten_enum(res.get("language"), "language")?,
        arguments: flatten_arguments(res.get("arguments"))?,
        return_type: flatten_return_type(res.get("returnType"))?,
        imported_libraries: flatten_string_list(res.get("importedLibraries")),
        creation_time: flatten_i64(res.get("creationTime")),
        etag: flatten_string(res.get("etag")),
        last_modified_time: flatten_i64(res.get("lastModifiedTime")),
        self_link: flatten_string(res.get("selfLink")),
    };
    Ok(())
}

pub async fn update(ctx: &ProviderContext, routine: &mut Routine) -> Result<()> {
    let id = routine.require_id()?;
    tracing::info!("Updating BigQuery routine: {}", id);
    let target = RoutineId::parse(&id)?;

    {
        let _guard = ctx.locks.lock(&target.lock_key()?).await;

        let obj = build_request(routine, &target)?;
        let res = ctx
            .client
            .put(&routine_url(ctx, &target), &Value::Object(obj), routine.timeouts.update)
            .await?;
        wait_if_operation(ctx, &res, &target.project, "Updating Routine", routine.timeouts.update)
            .await?;
    }

    read(ctx, routine).await
}

pub async fn delete(ctx: &ProviderContext, routine: &mut Routine) -> Result<()> {
    let Some(id) = routine.id.clone() else {
        return Ok(());
    };
    tracing::info!("Deleting BigQuery routine: {}", id);
    let target = RoutineId::parse(&id)?;
    let _guard = ctx.locks.lock(&target.lock_key()?).await;

    match ctx.client.delete(&routine_url(ctx, &target), routine.timeouts.delete).await {
        Ok(_) => {},
        Err(e) if e.is_not_found() => {
            tracing::warn!("BigQuery routine {:?} was already gone", id);
        },
        Err(e) => return Err(e),
    }

    routine.mark_absent();
    Ok(())
}

/// Adopt an existing routine. `dataset_hint` supplies the dataset when the
/// import id names only the routine.
pub async fn import(
    ctx: &ProviderContext,
    import_id: &str,
    dataset_hint: Option<&str>,
) -> Result<Routine> {
    let mut caps = parse_import_id(import_id, &schema(RESOURCE_KEY)?.import_formats)?;

    let project = ctx.project(caps.get("project").map(String::as_str))?;
    let dataset_id = caps
        .remove("dataset_id")
        .or_else(|| dataset_hint.map(str::to_string))
        .ok_or_else(|| ProviderError::MissingValue("dataset_id".to_string()))?;
    let routine_id = caps
        .remove("routine_id")
        .ok_or_else(|| ProviderError::MissingValue("routine_id".to_string()))?;

    let mut routine = new(RoutineConfig {
        dataset_id,
        routine_id,
        project: Some(project),
        ..Default::default()
    })?;
    let target = target(ctx, &routine.config)?;
    routine.set_id(target.to_string());

    read(ctx, &mut routine).await?;
    if !routine.is_present() {
        return Err(ProviderError::Api {
            status: 404,
            message: format!("cannot import non-existent BigQuery routine {target}"),
        });
    }

    // Required fields come from what's there
    routine.config.routine_type = routine.state.routine_type.clone().unwrap_or_default();
    routine.config.definition_body = routine.state.definition_body.clone().unwrap_or_default();
    routine.config.description = routine.state.description.clone();
    routine.config.language = routine.state.language.clone();
    routine.config.arguments = routine.state.arguments.clone();
    routine.config.return_type = routine.state.return_type.clone();
    routine.config.imported_libraries = routine.state.imported_libraries.clone();
    Ok(routine)
}
