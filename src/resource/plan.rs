//! Plan
//!
//! Compares a desired configuration with the last read state of a resource
//! and decides what apply has to do. Changes to force-new fields can't be
//! made in place and turn the plan into a replacement.

use super::field::is_empty_value;
use super::registry::ResourceDef;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "fields", rename_all = "snake_case")]
pub enum Plan {
    Create,
    NoOp,
    /// In-place update of the listed fields
    Update(Vec<String>),
    /// Delete and recreate because the listed force-new fields changed
    Replace(Vec<String>),
}

impl Plan {
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::NoOp)
    }
}

/// Classify `desired` (serialized configuration) against `current`
/// (serialized state). Unset optional+computed fields keep whatever the
/// server chose; unset optional fields must be empty remotely.
pub fn plan(def: &ResourceDef, present: bool, desired: &Value, current: &Value) -> Plan {
    if !present {
        return Plan::Create;
    }

    let mut changed = Vec::new();
    let mut forced = Vec::new();

    for field in def.fields.iter().filter(|f| !f.is_output_only()) {
        let want = desired.get(&field.name).unwrap_or(&Value::Null);
        let have = current.get(&field.name).unwrap_or(&Value::Null);

        let differs = if want.is_null() {
            !field.computed && !is_empty_value(have)
        } else {
            want != have
        };
        if !differs {
            continue;
        }

        tracing::debug!("{}: {} changed from {} to {}", def.display_name, field.name, have, want);
        if field.force_new {
            forced.push(field.name.clone());
        } else {
            changed.push(field.name.clone());
        }
    }

    if !forced.is_empty() {
        Plan::Replace(forced)
    } else if !changed.is_empty() {
        Plan::Update(changed)
    } else {
        Plan::NoOp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::registry::get_resource;
    use serde_json::json;

    fn db() -> &'static ResourceDef {
        get_resource("sql_database").unwrap()
    }

    fn routine() -> &'static ResourceDef {
        get_resource("bigquery_routine").unwrap()
    }

    #[test]
    fn test_absent_resource_is_created() {
        assert_eq!(plan(db(), false, &json!({}), &json!({})), Plan::Create);
    }

    #[test]
    fn test_server_defaults_are_not_drift() {
        let desired = json!({"instance": "prod1", "name": "orders"});
        let current = json!({
            "project": "p", "instance": "prod1", "name": "orders",
            "charset": "UTF8", "collation": "en_US.UTF8", "self_link": "https://x"
        });
        assert!(plan(db(), true, &desired, &current).is_noop());
    }

    #[test]
    fn test_charset_change_is_in_place() {
        let desired = json!({"instance": "prod1", "name": "orders", "charset": "latin1"});
        let current = json!({"instance": "prod1", "name": "orders", "charset": "UTF8"});
        assert_eq!(
            plan(db(), true, &desired, &current),
            Plan::Update(vec!["charset".to_string()])
        );
    }

    #[test]
    fn test_name_change_forces_replacement() {
        let desired = json!({"instance": "prod1", "name": "orders_v2", "charset": "latin1"});
        let current = json!({"instance": "prod1", "name": "orders", "charset": "UTF8"});
        assert_eq!(
            plan(db(), true, &desired, &current),
            Plan::Replace(vec!["name".to_string()])
        );
    }

    #[test]
    fn test_removed_description_is_an_update() {
        let desired = json!({
            "routine_id": "f", "dataset_id": "d", "routine_type": "SCALAR_FUNCTION",
            "definition_body": "1"
        });
        let current = json!({
            "routine_id": "f", "dataset_id": "d", "routine_type": "SCALAR_FUNCTION",
            "definition_body": "1", "description": "old", "language": "SQL",
            "etag": "abc", "creation_time": 1
        });
        assert_eq!(
            plan(routine(), true, &desired, &current),
            Plan::Update(vec!["description".to_string()])
        );
    }
}
