//! Shared utilities for command handlers

use crate::cli::MappingArgs;
use crate::config::parse_file;
use crate::error::{Error, Result};
use serde::Deserialize;
use shapemap_core::{AutoMapper, Engine, Overrides, Record, RecordSchema};
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Layout of a schema file: a list of named record schemas
#[derive(Debug, Deserialize)]
struct SchemaFile {
    schemas: Vec<RecordSchema>,
}

/// Record schemas loaded from one file, by name
#[derive(Debug)]
pub struct Schemas {
    path: PathBuf,
    by_name: HashMap<String, Arc<RecordSchema>>,
}

impl Schemas {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = fs::read_to_string(path)?;
        let file: SchemaFile = parse_file(path, &content)?;

        let mut by_name = HashMap::with_capacity(file.schemas.len());
        for schema in file.schemas {
            let name = schema.name().to_string();
            if by_name.insert(name.clone(), Arc::new(schema)).is_some() {
                return Err(Error::InvalidFormat {
                    path: path.to_path_buf(),
                    expected: format!("unique schema names ('{}' is declared twice)", name),
                });
            }
        }

        tracing::debug!(path = %path.display(), schemas = by_name.len(), "Loaded record schemas");
        Ok(Self {
            path: path.to_path_buf(),
            by_name,
        })
    }

    pub fn get(&self, name: &str) -> Result<Arc<RecordSchema>> {
        self.by_name
            .get(name)
            .cloned()
            .ok_or_else(|| Error::SchemaNotFound {
                name: name.to_string(),
                path: self.path.clone(),
            })
    }
}

/// A cached record mapper together with the schema its input must follow
pub struct RecordMapping {
    pub source: Arc<RecordSchema>,
    pub mapper: AutoMapper<Record, Record>,
}

/// Plan the mapping described by the command-line arguments
pub fn record_mapping(engine: &Engine, args: &MappingArgs) -> Result<RecordMapping> {
    let schemas = Schemas::load(&args.schema)?;
    let source = schemas.get(&args.from)?;
    let target = schemas.get(&args.to)?;

    let mut overrides = Overrides::<Record, Record>::new();
    for (target_field, source_field) in &args.overrides {
        overrides = overrides.from_field(target_field, source_field);
    }
    for field in &args.exclude {
        overrides = overrides.exclude(field);
    }

    let mapper = engine.mapper_between(&source, &target, &overrides)?;
    Ok(RecordMapping { source, mapper })
}

/// Read a JSON document from a file, or from stdin for `-`
pub fn read_json_input(path: &Path) -> Result<serde_json::Value> {
    let content = if path == Path::new("-") {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        if !path.exists() {
            return Err(Error::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        fs::read_to_string(path)?
    };

    serde_json::from_str(&content).map_err(|e| Error::InvalidFormat {
        path: path.to_path_buf(),
        expected: format!("JSON ({})", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SCHEMAS: &str = r#"
[[schemas]]
name = "Person"
fields = [
    { name = "name", type = "string" },
    { name = "age", type = "i32" },
]

[[schemas]]
name = "PersonRow"
fields = [
    { name = "full_name", type = "string", required = true },
    { name = "age", type = "string" },
]
"#;

    fn engine() -> Engine {
        Engine::builder()
            .config(shapemap_core::MapperConfig::interpreted_only())
            .build()
            .unwrap()
    }

    #[test]
    fn test_load_and_look_up() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("schemas.toml");
        fs::write(&path, SCHEMAS).unwrap();

        let schemas = Schemas::load(&path).unwrap();
        assert_eq!(schemas.get("Person").unwrap().fields().len(), 2);
        assert!(matches!(schemas.get("Nobody"), Err(Error::SchemaNotFound { .. })));
    }

    #[test]
    fn test_duplicate_schema_names() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("schemas.json");
        fs::write(
            &path,
            r#"{"schemas": [{"name": "A", "fields": []}, {"name": "A", "fields": []}]}"#,
        )
        .unwrap();

        assert!(matches!(Schemas::load(&path), Err(Error::InvalidFormat { .. })));
    }

    #[test]
    fn test_record_mapping_uses_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("schemas.toml");
        fs::write(&path, SCHEMAS).unwrap();

        let args = MappingArgs {
            schema: path,
            from: "Person".to_string(),
            to: "PersonRow".to_string(),
            overrides: vec![("full_name".to_string(), "name".to_string())],
            exclude: Vec::new(),
        };
        let engine = engine();
        let mapping = record_mapping(&engine, &args).unwrap();

        let person = Record::from_json(
            mapping.source.clone(),
            &serde_json::json!({ "name": "Ann", "age": 30 }),
        )
        .unwrap();
        let row = mapping.mapper.transform(&person).unwrap();
        assert_eq!(row.to_json(), serde_json::json!({ "full_name": "Ann", "age": "30" }));
    }

    #[test]
    fn test_missing_required_binding_is_a_plan_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("schemas.toml");
        fs::write(&path, SCHEMAS).unwrap();

        let args = MappingArgs {
            schema: path,
            from: "Person".to_string(),
            to: "PersonRow".to_string(),
            overrides: Vec::new(),
            exclude: Vec::new(),
        };
        let engine = engine();
        let err = record_mapping(&engine, &args).err().unwrap();
        assert_eq!(err.exit_code(), 2);
    }
}
