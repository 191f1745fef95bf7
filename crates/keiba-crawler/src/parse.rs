use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use crate::error::ParseError;
use crate::site::{FieldSpec, Schema, SiteConfig, ValueKind};

lazy_static! {
    static ref CELLS: Selector = Selector::parse("th, td").unwrap();
}

/// A flat mapping of field name to value.
pub type Record = serde_json::Map<String, Value>;

/// Extracts records from raw page content according to a named schema.
pub trait RecordParser {
    fn parse(&self, schema: &str, content: &str, entity_id: &str)
        -> Result<Vec<Record>, ParseError>;
}

impl<P: RecordParser + ?Sized> RecordParser for Arc<P> {
    fn parse(
        &self,
        schema: &str,
        content: &str,
        entity_id: &str,
    ) -> Result<Vec<Record>, ParseError> {
        (**self).parse(schema, content, entity_id)
    }
}

/// Parser driven by the schemas of a [`SiteConfig`], compiled once.
#[derive(Debug)]
pub struct SchemaParser {
    schemas: HashMap<String, CompiledSchema>,
}

#[derive(Debug)]
enum CompiledSchema {
    Record {
        id_field: Option<String>,
        fields: Vec<CompiledField>,
    },
    Table {
        rows: Selector,
        fields: Vec<CompiledField>,
    },
}

#[derive(Debug)]
struct CompiledField {
    name: String,
    cell: Option<usize>,
    selector: Option<Selector>,
    attr: Option<String>,
    pattern: Option<Regex>,
    kind: ValueKind,
    format: String,
    required: bool,
}

impl SchemaParser {
    pub fn new(site: &SiteConfig) -> anyhow::Result<Self> {
        let mut schemas = HashMap::with_capacity(site.schemas.len());
        for (name, schema) in &site.schemas {
            let compiled =
                compile_schema(schema).with_context(|| format!("Invalid schema `{name}`"))?;
            schemas.insert(name.clone(), compiled);
        }

        for entity in [&site.entry, &site.result, &site.horse] {
            for name in [&entity.primary, &entity.details] {
                if !schemas.contains_key(name) {
                    anyhow::bail!("Schema `{name}` used by {} is not defined", entity.url);
                }
            }
        }

        Ok(Self { schemas })
    }
}

impl RecordParser for SchemaParser {
    fn parse(
        &self,
        schema: &str,
        content: &str,
        entity_id: &str,
    ) -> Result<Vec<Record>, ParseError> {
        let compiled = self
            .schemas
            .get(schema)
            .ok_or_else(|| ParseError::UnknownSchema(schema.to_string()))?;
        let document = Html::parse_document(content);

        match compiled {
            CompiledSchema::Record { id_field, fields } => {
                let mut record = read_fields(document.root_element(), fields)
                    .map_err(|field| missing_field(schema, entity_id, field))?;
                if record.is_empty() {
                    return Err(ParseError::MissingStructure {
                        schema: schema.to_string(),
                        entity_id: entity_id.to_string(),
                        what: "field".into(),
                    });
                }
                if let Some(id_field) = id_field {
                    record.insert(id_field.clone(), Value::String(entity_id.to_string()));
                }
                Ok(vec![record])
            }
            CompiledSchema::Table { rows, fields } => {
                let records = document
                    .select(rows)
                    .map(|row| read_fields(row, fields))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|field| missing_field(schema, entity_id, field))?;
                if records.is_empty() {
                    return Err(ParseError::MissingStructure {
                        schema: schema.to_string(),
                        entity_id: entity_id.to_string(),
                        what: "rows".into(),
                    });
                }
                Ok(records)
            }
        }
    }
}

fn missing_field(schema: &str, entity_id: &str, field: &str) -> ParseError {
    ParseError::MissingField {
        schema: schema.to_string(),
        entity_id: entity_id.to_string(),
        field: field.to_string(),
    }
}

fn compile_schema(schema: &Schema) -> anyhow::Result<CompiledSchema> {
    Ok(match schema {
        Schema::Record { id_field, fields } => CompiledSchema::Record {
            id_field: id_field.clone(),
            fields: compile_fields(fields)?,
        },
        Schema::Table { rows, fields } => CompiledSchema::Table {
            rows: compile_selector(rows)?,
            fields: compile_fields(fields)?,
        },
    })
}

fn compile_fields(fields: &[FieldSpec]) -> anyhow::Result<Vec<CompiledField>> {
    fields
        .iter()
        .map(|f| {
            let selector = f.selector.as_deref().map(compile_selector).transpose()?;
            let pattern = f
                .pattern
                .as_deref()
                .map(Regex::new)
                .transpose()
                .with_context(|| format!("Invalid pattern for field `{}`", f.name))?;
            Ok::<_, anyhow::Error>(CompiledField {
                name: f.name.clone(),
                cell: f.cell,
                selector,
                attr: f.attr.clone(),
                pattern,
                kind: f.kind,
                format: f.format.clone().unwrap_or_else(|| "%Y-%m-%d".into()),
                required: f.required,
            })
        })
        .collect()
}

fn compile_selector(selector: &str) -> anyhow::Result<Selector> {
    Selector::parse(selector).map_err(|e| anyhow!("Invalid selector `{selector}`: {e}"))
}

/// Reads every field below `scope`, returns the name of the first missing required field.
fn read_fields<'a>(scope: ElementRef, fields: &'a [CompiledField]) -> Result<Record, &'a str> {
    let mut record = Record::new();
    for field in fields {
        match field.read(scope) {
            Some(value) => {
                record.insert(field.name.clone(), value);
            }
            None if field.required => return Err(&field.name),
            None => (),
        }
    }
    Ok(record)
}

impl CompiledField {
    fn read(&self, scope: ElementRef) -> Option<Value> {
        let mut target = scope;
        if let Some(cell) = self.cell {
            target = target.select(&CELLS).nth(cell)?;
        }
        if let Some(selector) = &self.selector {
            target = target.select(selector).next()?;
        }

        let raw = match &self.attr {
            Some(attr) => target.value().attr(attr)?.trim().to_string(),
            None => collapse_whitespace(target.text()),
        };
        let raw = match &self.pattern {
            Some(re) => re.captures(&raw)?.get(1)?.as_str().to_string(),
            None => raw,
        };

        match self.kind {
            ValueKind::Text => Some(Value::String(raw)),
            ValueKind::Integer => Some(
                raw.replace(',', "")
                    .parse::<i64>()
                    .map(Value::from)
                    .unwrap_or(Value::String(raw)),
            ),
            ValueKind::Date => NaiveDate::parse_from_str(&raw, &self.format)
                .ok()
                .map(|d| Value::String(d.format("%Y-%m-%d").to_string())),
        }
    }
}

fn collapse_whitespace<'a>(text: impl Iterator<Item = &'a str>) -> String {
    text.flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_schemas_compile() {
        let site = SiteConfig::netkeiba().unwrap();
        SchemaParser::new(&site).unwrap();
    }

    #[test]
    fn whitespace_is_collapsed() {
        let text = ["  ディープ\n", "インパクト ", "\t(JPN)  "];
        assert_eq!(collapse_whitespace(text.into_iter()), "ディープ インパクト (JPN)");
    }
}
