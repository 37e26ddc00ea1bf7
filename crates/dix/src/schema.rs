//! 📐 Schema Registry: the one place that knows what a "client" is.
//!
//! 🎬 *[a file called `sentencing_client_record.json` walks into a bar]*
//! *[the bartender asks for ID. the file offers `external_id`. close enough.]*
//!
//! Every importable entity is a variant of [`EntityKind`], a closed enum, so there is
//! no stringly-typed dispatch anywhere past file-name detection. Each kind has one static
//! [`EntitySchema`] (see `schema/entities.rs`) describing its fields, key, references to
//! other entities, refinements and delete policy. [`SchemaRegistry`] is built once at
//! startup from those statics and works out the processing order (parents before children).
//!
//! 🧠 Knowledge graph:
//! - `sources` asks the registry which entity a file name belongs to
//! - `validate` walks `EntitySchema::fields` to type a row
//! - `planner` reads `delete_policy`
//! - `orchestrator` iterates `SchemaRegistry::order()` and checks `references`

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::common::{Fields, RawRecord, RecordKey};
use crate::errors::FieldError;

pub(crate) mod entities;

// ============================================================
// 🎭 EntityKind
// ============================================================

/// 🎭 Every entity the engine can import. Adding one means adding a variant, a schema
/// static, and an arm in [`EntityKind::schema`]. The compiler will find the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKind {
    Staff,
    Client,
    Case,
    Offense,
    Opportunity,
    Insight,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Staff,
        EntityKind::Client,
        EntityKind::Case,
        EntityKind::Offense,
        EntityKind::Opportunity,
        EntityKind::Insight,
    ];

    /// 🏷️ Canonical name, also the canonical file stem (`clients.csv`).
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Staff => "staff",
            EntityKind::Client => "clients",
            EntityKind::Case => "cases",
            EntityKind::Offense => "offenses",
            EntityKind::Opportunity => "opportunities",
            EntityKind::Insight => "insights",
        }
    }

    /// 📛 Other file stems the feeds have used for this entity over the years.
    pub fn file_stem_aliases(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Staff => &["sentencing_staff_record", "staff_record"],
            EntityKind::Client => &["sentencing_client_record", "client_record", "client"],
            EntityKind::Case => &["sentencing_case_record", "case_record", "case"],
            EntityKind::Offense => &["sentencing_offense_record", "offense_record", "offense", "charges"],
            EntityKind::Opportunity => &[
                "sentencing_opportunity_record",
                "sentencing_community_opportunity_record",
                "opportunity_record",
                "opportunity",
                "community_opportunities",
            ],
            EntityKind::Insight => &["sentencing_insight_record", "insight_record", "insight"],
        }
    }

    pub fn schema(&self) -> &'static EntitySchema {
        match self {
            EntityKind::Staff => &entities::STAFF,
            EntityKind::Client => &entities::CLIENT,
            EntityKind::Case => &entities::CASE,
            EntityKind::Offense => &entities::OFFENSE,
            EntityKind::Opportunity => &entities::OPPORTUNITY,
            EntityKind::Insight => &entities::INSIGHT,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for EntityKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

// ============================================================
// 🧱 Field specs
// ============================================================

/// 🎚️ One allowed enum value plus the spellings the feeds use for it.
#[derive(Debug)]
pub struct EnumVariant {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
}

/// 🧱 The primitive type a field is coerced into.
#[derive(Debug, Clone, Copy)]
pub enum FieldType {
    Text,
    Integer,
    Float,
    Boolean,
    /// 📅 `YYYY-MM-DD` or RFC 3339, normalized to a calendar date
    Date,
    /// ⏱️ RFC 3339, or a plain date at midnight UTC
    DateTime,
    Enum(&'static [EnumVariant]),
    /// 🗺️ one of the supported state codes (`US_IX` folds into `US_ID`)
    StateCode,
    /// 📚 JSON array of strings, as a real array or as a string holding one
    TextList,
    /// 🪪 JSON name object (`given_names`, `middle_names`, `surname`, `name_suffix`)
    /// flattened into one display string; plain strings pass through
    FullName,
    /// 📦 JSON object (or a string holding one) whose members are typed by their own specs,
    /// stored under the members' model names
    Object(&'static [FieldSpec]),
    /// 📚 JSON array of such objects, as a real array or as a string holding one
    ObjectList(&'static [FieldSpec]),
}

/// 🧱 One field of an entity schema.
#[derive(Debug)]
pub struct FieldSpec {
    /// 🏷️ model field name, what the report calls it (`externalId`)
    pub name: &'static str,
    /// 📄 feed column name (`external_id`); the model name is accepted too
    pub column: &'static str,
    pub field_type: FieldType,
    pub required: bool,
    /// 🪄 raw text run through the same coercion when the field is absent
    pub default: Option<&'static str>,
}

impl FieldSpec {
    pub const fn required(name: &'static str, column: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            column,
            field_type,
            required: true,
            default: None,
        }
    }

    pub const fn optional(name: &'static str, column: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            column,
            field_type,
            required: false,
            default: None,
        }
    }

    pub const fn with_default(self, default: &'static str) -> Self {
        Self {
            default: Some(default),
            ..self
        }
    }

    /// 🔍 Read this field's raw value from a row under either spelling.
    pub fn raw_value<'r>(&self, raw: &'r RawRecord) -> Option<&'r serde_json::Value> {
        raw.get_any(&[self.column, self.name])
    }
}

/// 🔗 "This field holds the key of a record in that entity."
#[derive(Debug)]
pub struct Reference {
    pub field: &'static str,
    pub entity: EntityKind,
}

/// 🧮 A cross-field rule, run after every field has been typed.
#[derive(Debug)]
pub struct Refinement {
    pub name: &'static str,
    pub check: fn(&Fields) -> Option<FieldError>,
}

/// 🪄 A field computed from the others (lock flags and friends). Part of the checksum.
#[derive(Debug)]
pub struct DerivedField {
    pub name: &'static str,
    pub compute: fn(&Fields) -> crate::common::FieldValue,
}

/// 🗑️ What to do with persisted records that are missing from an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletePolicy {
    /// delete them (scoped to the batch partition)
    Prune,
    /// keep them and warn; the feed is known to be incomplete for this entity
    Retain,
}

/// 📐 Everything the engine knows about one entity. Immutable, `'static`.
#[derive(Debug)]
pub struct EntitySchema {
    pub kind: EntityKind,
    pub fields: &'static [FieldSpec],
    /// 🔑 field names forming the natural key, in order
    pub key: &'static [&'static str],
    /// 🗺️ the field holding the state code, if rows carry one
    pub partition_field: Option<&'static str>,
    pub references: &'static [Reference],
    pub refinements: &'static [Refinement],
    pub derived: &'static [DerivedField],
    pub delete_policy: DeletePolicy,
}

impl EntitySchema {
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// 🔑 Best-effort key read straight off a raw row: trimmed text of each key column,
    /// defaults applied. `None` if any part is missing. Used for rows that failed
    /// validation, so their persisted twin doesn't get deleted out from under them.
    pub fn raw_key(&self, raw: &RawRecord) -> Option<RecordKey> {
        let mut parts = Vec::with_capacity(self.key.len());
        for key_field in self.key {
            let spec = self.field(key_field)?;
            let text = match spec.raw_value(raw) {
                Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
                Some(serde_json::Value::Number(n)) => n.to_string(),
                _ => spec.default?.to_string(),
            };
            parts.push(text);
        }
        Some(RecordKey::from_parts(parts))
    }
}

// ============================================================
// 📚 SchemaRegistry
// ============================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("entity {0} is registered twice")]
    Duplicate(EntityKind),
    #[error("{entity} references {missing}, which is not registered")]
    MissingReference {
        entity: EntityKind,
        missing: EntityKind,
    },
    #[error("entity references form a cycle through: {0:?}")]
    Cycle(Vec<EntityKind>),
}

/// 📚 The registry: schemas by kind, plus the topological processing order.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: BTreeMap<EntityKind, &'static EntitySchema>,
    order: Vec<EntityKind>,
    stems: BTreeMap<String, EntityKind>,
}

impl SchemaRegistry {
    /// 🏗️ The built-in registry with every entity the engine ships with.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_schemas(EntityKind::ALL.iter().map(|kind| kind.schema()))
    }

    /// 🏗️ Build a registry from schemas. Declaration order breaks ties in the
    /// topological sort, so the order is deterministic run to run.
    pub fn from_schemas<I>(schemas: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = &'static EntitySchema>,
    {
        let mut by_kind = BTreeMap::new();
        let mut declared = Vec::new();
        for schema in schemas {
            if by_kind.insert(schema.kind, schema).is_some() {
                return Err(RegistryError::Duplicate(schema.kind));
            }
            declared.push(schema.kind);
        }

        for schema in by_kind.values() {
            for reference in schema.references {
                // -- self-references don't constrain the order; everything else must exist
                if reference.entity != schema.kind && !by_kind.contains_key(&reference.entity) {
                    return Err(RegistryError::MissingReference {
                        entity: schema.kind,
                        missing: reference.entity,
                    });
                }
            }
        }

        let order = topological_order(&declared, &by_kind)?;

        let mut stems = BTreeMap::new();
        for kind in &declared {
            stems.insert(kind.name().to_string(), *kind);
            for alias in kind.file_stem_aliases() {
                stems.insert(alias.to_string(), *kind);
            }
        }

        Ok(Self {
            schemas: by_kind,
            order,
            stems,
        })
    }

    pub fn get(&self, kind: EntityKind) -> Option<&'static EntitySchema> {
        self.schemas.get(&kind).copied()
    }

    /// 🔄 Parents before children. Always.
    pub fn order(&self) -> &[EntityKind] {
        &self.order
    }

    /// 🔍 Which entity does this file stem belong to? Case-insensitive.
    pub fn entity_for_stem(&self, stem: &str) -> Option<EntityKind> {
        self.stems.get(&stem.trim().to_ascii_lowercase()).copied()
    }
}

/// 🔄 Kahn's algorithm over `references`. Ready nodes are taken in declaration order.
fn topological_order(
    declared: &[EntityKind],
    schemas: &BTreeMap<EntityKind, &'static EntitySchema>,
) -> Result<Vec<EntityKind>, RegistryError> {
    let mut pending_parents: BTreeMap<EntityKind, BTreeSet<EntityKind>> = BTreeMap::new();
    for kind in declared {
        let parents = schemas[kind]
            .references
            .iter()
            .map(|r| r.entity)
            .filter(|parent| parent != kind)
            .collect();
        pending_parents.insert(*kind, parents);
    }

    let mut order = Vec::with_capacity(declared.len());
    while order.len() < declared.len() {
        let next = declared
            .iter()
            .find(|kind| !order.contains(*kind) && pending_parents[*kind].is_empty())
            .copied();
        let Some(next) = next else {
            let stuck = declared
                .iter()
                .filter(|kind| !order.contains(*kind))
                .copied()
                .collect();
            return Err(RegistryError::Cycle(stuck));
        };
        order.push(next);
        for parents in pending_parents.values_mut() {
            parents.remove(&next);
        }
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(order: &[EntityKind], kind: EntityKind) -> usize {
        order
            .iter()
            .position(|k| *k == kind)
            .expect("💀 every builtin entity should be in the order")
    }

    #[test]
    fn the_one_where_parents_always_go_first() {
        let registry = SchemaRegistry::builtin().expect("💀 builtin registry must build");
        let order = registry.order();
        assert_eq!(order.len(), EntityKind::ALL.len());
        assert!(position(order, EntityKind::Staff) < position(order, EntityKind::Case));
        assert!(position(order, EntityKind::Client) < position(order, EntityKind::Case));
    }

    #[test]
    fn the_one_where_file_stems_find_their_entity() {
        let registry = SchemaRegistry::builtin().expect("💀 builtin registry must build");
        assert_eq!(registry.entity_for_stem("clients"), Some(EntityKind::Client));
        assert_eq!(registry.entity_for_stem("CASES"), Some(EntityKind::Case));
        assert_eq!(
            registry.entity_for_stem("sentencing_case_record"),
            Some(EntityKind::Case)
        );
        assert_eq!(
            registry.entity_for_stem("sentencing_community_opportunity_record"),
            Some(EntityKind::Opportunity)
        );
        assert_eq!(
            registry.entity_for_stem("sentencing_insight_record"),
            Some(EntityKind::Insight)
        );
        assert_eq!(registry.entity_for_stem("payroll"), None);
    }

    static LOOP_A: EntitySchema = EntitySchema {
        kind: EntityKind::Staff,
        fields: &[FieldSpec::required("externalId", "external_id", FieldType::Text)],
        key: &["externalId"],
        partition_field: None,
        references: &[Reference {
            field: "externalId",
            entity: EntityKind::Client,
        }],
        refinements: &[],
        derived: &[],
        delete_policy: DeletePolicy::Prune,
    };

    static LOOP_B: EntitySchema = EntitySchema {
        kind: EntityKind::Client,
        fields: &[FieldSpec::required("externalId", "external_id", FieldType::Text)],
        key: &["externalId"],
        partition_field: None,
        references: &[Reference {
            field: "externalId",
            entity: EntityKind::Staff,
        }],
        refinements: &[],
        derived: &[],
        delete_policy: DeletePolicy::Prune,
    };

    #[test]
    fn the_one_where_a_reference_cycle_is_refused_at_startup() {
        let result = SchemaRegistry::from_schemas([&LOOP_A, &LOOP_B]);
        assert!(matches!(result, Err(RegistryError::Cycle(stuck)) if stuck.len() == 2));
    }

    #[test]
    fn the_one_where_a_dangling_reference_is_refused_at_startup() {
        let result = SchemaRegistry::from_schemas([&LOOP_A]);
        assert_eq!(
            result.err(),
            Some(RegistryError::MissingReference {
                entity: EntityKind::Staff,
                missing: EntityKind::Client,
            })
        );
    }

    #[test]
    fn the_one_where_raw_keys_survive_broken_rows() {
        let mut columns = serde_json::Map::new();
        columns.insert("external_id".into(), serde_json::json!(" c-1 "));
        columns.insert("birth_date".into(), serde_json::json!("not a date"));
        let raw = RawRecord::new(1, 2, columns);
        assert_eq!(
            EntityKind::Client.schema().raw_key(&raw),
            Some(RecordKey::from_parts(["c-1"]))
        );

        let empty = RawRecord::new(2, 3, serde_json::Map::new());
        assert_eq!(EntityKind::Client.schema().raw_key(&empty), None);
    }
}
